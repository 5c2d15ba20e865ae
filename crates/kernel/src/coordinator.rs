use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex as SyncMutex;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::cancellation::CancellationToken;
use crate::error::KernelError;
use crate::hooks::{ApprovalDefault, ContextInjectionRole, HookRegistry, HookResult, MessageLevel};
use crate::traits::{
    ApprovalOutcome, ApprovalProvider, ChatMessage, ContextManager, DisplaySystem,
    ModuleSourceResolver, Orchestrator, Provider, Tool,
};

/// A module mounted on one of the coordinator's fixed slots.
///
/// The coordinator is keyed by string slot names (matching the reference
/// mount-point table), but each slot only ever accepts one capability trait;
/// this enum is the typed payload actually stored underneath that stringly
/// keyed API, so `get`/`mount` stay structurally faithful to the spec while
/// every caller who unwraps a variant gets a concrete trait object back.
#[derive(Clone)]
pub enum MountedModule {
    Orchestrator(Arc<dyn Orchestrator>),
    Context(Arc<dyn ContextManager>),
    ModuleSourceResolver(Arc<dyn ModuleSourceResolver>),
    Provider(Arc<dyn Provider>),
    Tool(Arc<dyn Tool>),
    /// `agents` overlays are app-opaque; the kernel stores and forwards them
    /// without interpreting their shape.
    Agent(Value),
}

impl MountedModule {
    fn derived_name(&self) -> Option<String> {
        match self {
            MountedModule::Provider(p) => Some(p.name().to_string()),
            MountedModule::Tool(t) => Some(t.name().to_string()),
            _ => None,
        }
    }
}

const SINGLE_SLOTS: &[&str] = &["orchestrator", "context", "module-source-resolver"];
const MULTI_SLOTS: &[&str] = &["providers", "tools", "agents"];

type CleanupFuture = BoxFuture<'static, Result<(), KernelError>>;
type CleanupFn = Box<dyn FnOnce() -> CleanupFuture + Send>;

pub type ContributorFn = Arc<dyn Fn() -> BoxFuture<'static, Option<Value>> + Send + Sync>;

struct Contributor {
    name: String,
    callback: ContributorFn,
}

/// The outcome [`Coordinator::process_hook_result`] asks the caller to act
/// on. `Continue`/`Deny` are the common cases the coordinator has already
/// fully applied (context append, approval dispatch, display dispatch);
/// `EphemeralInjection` hands the text back because appending it to "the
/// last tool-result message of the pending request" requires orchestrator
/// state the coordinator does not hold.
#[derive(Debug, Clone)]
pub enum HookPolicyOutcome {
    Continue,
    Deny { reason: Option<String> },
    EphemeralInjection {
        content: String,
        append_to_last_tool_result: bool,
    },
}

/// Per-session registry of mount points, capabilities, contribution
/// channels, and cleanup stack — the object every mounted module receives a
/// shared, non-owning handle to for the lifetime of the session.
///
/// Interior mutability follows the teacher's split between state that may
/// be held across an `.await` (`tokio::sync::RwLock` for the mount table and
/// contribution channels) and short, non-awaiting critical sections
/// (`parking_lot::Mutex` for the cleanup stack and capability map).
pub struct Coordinator {
    session_id: String,
    parent_id: Option<String>,

    single_slots: RwLock<HashMap<&'static str, MountedModule>>,
    multi_slots: RwLock<HashMap<&'static str, HashMap<String, MountedModule>>>,

    hooks: HookRegistry,
    cancellation: CancellationToken,

    capabilities: SyncMutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
    contributions: RwLock<HashMap<String, Vec<Contributor>>>,
    cleanup_stack: SyncMutex<Vec<CleanupFn>>,

    approval_system: Option<Arc<dyn ApprovalProvider>>,
    display_system: Option<Arc<dyn DisplaySystem>>,

    injection_budget_per_turn: Option<u64>,
    injection_size_limit: Option<u64>,
    current_turn_injections: SyncMutex<u64>,
}

impl Coordinator {
    pub fn new(session_id: impl Into<String>, parent_id: Option<String>) -> Self {
        let hooks = HookRegistry::new();
        Self {
            session_id: session_id.into(),
            parent_id,
            single_slots: RwLock::new(HashMap::new()),
            multi_slots: RwLock::new(HashMap::new()),
            hooks,
            cancellation: CancellationToken::new(),
            capabilities: SyncMutex::new(HashMap::new()),
            contributions: RwLock::new(HashMap::new()),
            cleanup_stack: SyncMutex::new(Vec::new()),
            approval_system: None,
            display_system: None,
            injection_budget_per_turn: None,
            injection_size_limit: None,
            current_turn_injections: SyncMutex::new(0),
        }
    }

    pub fn with_approval_system(mut self, approval: Arc<dyn ApprovalProvider>) -> Self {
        self.approval_system = Some(approval);
        self
    }

    pub fn with_display_system(mut self, display: Arc<dyn DisplaySystem>) -> Self {
        self.display_system = Some(display);
        self
    }

    pub fn with_injection_limits(mut self, budget_per_turn: Option<u64>, size_limit: Option<u64>) -> Self {
        self.injection_budget_per_turn = budget_per_turn;
        self.injection_size_limit = size_limit;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn injection_budget_per_turn(&self) -> Option<u64> {
        self.injection_budget_per_turn
    }

    pub fn injection_size_limit(&self) -> Option<u64> {
        self.injection_size_limit
    }

    /// Mounts `module` at `slot`. Single-holder slots (`orchestrator`,
    /// `context`, `module-source-resolver`) replace any prior holder
    /// (logged); multi-holder slots (`providers`, `tools`, `agents`) require
    /// a name, either given explicitly or derived from the module. Direct
    /// mounts to `hooks` and unknown slots are rejected.
    #[instrument(skip(self, module))]
    pub async fn mount(
        &self,
        slot: &str,
        module: MountedModule,
        name: Option<String>,
    ) -> Result<(), KernelError> {
        if slot == "hooks" {
            return Err(KernelError::UnknownSlot {
                slot: slot.to_string(),
            });
        }

        if let Some(&canonical) = SINGLE_SLOTS.iter().find(|s| **s == slot) {
            let mut slots = self.single_slots.write().await;
            if slots.contains_key(canonical) {
                warn!(slot = canonical, "replacing existing single-slot mount");
            }
            slots.insert(canonical, module);
            return Ok(());
        }

        if let Some(&canonical) = MULTI_SLOTS.iter().find(|s| **s == slot) {
            let name = name
                .or_else(|| module.derived_name())
                .ok_or_else(|| KernelError::ModuleLoad {
                    slot: slot.to_string(),
                    module: "<unnamed>".to_string(),
                    reason: "multi-holder slot requires an explicit or derivable name".to_string(),
                })?;
            let mut slots = self.multi_slots.write().await;
            slots.entry(canonical).or_default().insert(name, module);
            return Ok(());
        }

        Err(KernelError::UnknownSlot {
            slot: slot.to_string(),
        })
    }

    pub async fn unmount(&self, slot: &str, name: Option<&str>) -> Result<(), KernelError> {
        if let Some(&canonical) = SINGLE_SLOTS.iter().find(|s| **s == slot) {
            self.single_slots.write().await.remove(canonical);
            return Ok(());
        }
        if let Some(&canonical) = MULTI_SLOTS.iter().find(|s| **s == slot) {
            if let Some(name) = name {
                if let Some(map) = self.multi_slots.write().await.get_mut(canonical) {
                    map.remove(name);
                }
            }
            return Ok(());
        }
        Err(KernelError::UnknownSlot {
            slot: slot.to_string(),
        })
    }

    pub async fn get_single(&self, slot: &str) -> Option<MountedModule> {
        self.single_slots.read().await.get(slot).cloned()
    }

    pub async fn get_named(&self, slot: &str, name: &str) -> Option<MountedModule> {
        self.multi_slots
            .read()
            .await
            .get(slot)
            .and_then(|map| map.get(name).cloned())
    }

    pub async fn get_all(&self, slot: &str) -> HashMap<String, MountedModule> {
        self.multi_slots
            .read()
            .await
            .get(slot)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn orchestrator(&self) -> Option<Arc<dyn Orchestrator>> {
        match self.get_single("orchestrator").await {
            Some(MountedModule::Orchestrator(o)) => Some(o),
            _ => None,
        }
    }

    pub async fn context(&self) -> Option<Arc<dyn ContextManager>> {
        match self.get_single("context").await {
            Some(MountedModule::Context(c)) => Some(c),
            _ => None,
        }
    }

    pub async fn module_source_resolver(&self) -> Option<Arc<dyn ModuleSourceResolver>> {
        match self.get_single("module-source-resolver").await {
            Some(MountedModule::ModuleSourceResolver(r)) => Some(r),
            _ => None,
        }
    }

    pub async fn providers(&self) -> Vec<Arc<dyn Provider>> {
        self.get_all("providers")
            .await
            .into_values()
            .filter_map(|m| match m {
                MountedModule::Provider(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub async fn tools(&self) -> Vec<Arc<dyn Tool>> {
        self.get_all("tools")
            .await
            .into_values()
            .filter_map(|m| match m {
                MountedModule::Tool(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    /// Pushes a teardown onto the LIFO cleanup stack.
    pub fn register_cleanup(&self, cleanup: CleanupFn) {
        self.cleanup_stack.lock().push(cleanup);
    }

    /// Runs every registered cleanup in reverse registration order. A
    /// cleanup that errors is logged and does not stop the remaining stack
    /// from running.
    #[instrument(skip(self))]
    pub async fn cleanup(&self) {
        let stack: Vec<CleanupFn> = std::mem::take(&mut *self.cleanup_stack.lock());
        for cleanup in stack.into_iter().rev() {
            if let Err(err) = cleanup().await {
                warn!(error = %err, "cleanup callback failed");
            }
        }
    }

    pub fn register_capability<T: Any + Send + Sync>(&self, name: impl Into<String>, value: T) {
        self.capabilities.lock().insert(name.into(), Arc::new(value));
    }

    pub fn get_capability<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.capabilities
            .lock()
            .get(name)
            .and_then(|v| v.clone().downcast::<T>().ok())
    }

    pub async fn register_contributor(
        &self,
        channel: impl Into<String>,
        name: impl Into<String>,
        callback: ContributorFn,
    ) {
        let mut contributions = self.contributions.write().await;
        contributions
            .entry(channel.into())
            .or_default()
            .push(Contributor {
                name: name.into(),
                callback,
            });
    }

    /// Fans out to every contributor on `channel` in registration order,
    /// filtering `null` returns. Stops early (without raising) if
    /// cancellation has been requested.
    pub async fn collect_contributions(&self, channel: &str) -> Vec<Value> {
        let contributors: Vec<Contributor> = {
            let guard = self.contributions.read().await;
            match guard.get(channel) {
                Some(list) => list
                    .iter()
                    .map(|c| Contributor {
                        name: c.name.clone(),
                        callback: c.callback.clone(),
                    })
                    .collect(),
                None => return Vec::new(),
            }
        };

        let mut out = Vec::new();
        for contributor in contributors {
            if self.cancellation.is_cancelled() {
                break;
            }
            let value = (contributor.callback)().await;
            match value {
                Some(v) => out.push(v),
                None => {
                    continue;
                }
            }
        }
        out
    }

    pub fn request_cancel(&self, immediate: bool) -> bool {
        self.cancellation.request_cancellation(immediate)
    }

    pub fn reset_turn(&self) {
        *self.current_turn_injections.lock() = 0;
    }

    /// Applies the `inject_context`/`ask_user`/`user_message`/
    /// `suppress_output` side effects of a folded [`HookResult`], per §4.5.
    #[instrument(skip(self, result))]
    pub async fn process_hook_result(
        &self,
        result: HookResult,
        event: &str,
        hook_name: &str,
    ) -> Result<HookPolicyOutcome, KernelError> {
        match result {
            HookResult::Continue { side_effects, .. } => {
                if let Some(message) = side_effects.user_message {
                    let level = side_effects.user_message_level.unwrap_or(MessageLevel::Info);
                    self.dispatch_user_message(level, &message, hook_name).await;
                }
                Ok(HookPolicyOutcome::Continue)
            }
            HookResult::Modify { .. } => Ok(HookPolicyOutcome::Continue),
            HookResult::Deny { reason } => Ok(HookPolicyOutcome::Deny { reason }),
            HookResult::InjectContext {
                content,
                role,
                ephemeral,
                append_to_last_tool_result,
            } => {
                if let Some(limit) = self.injection_size_limit {
                    if content.len() as u64 > limit {
                        return Err(KernelError::InjectionTooLarge {
                            len: content.len() as u64,
                            limit,
                        });
                    }
                }

                let estimated_tokens = (content.len() as u64) / 4;
                {
                    let mut used = self.current_turn_injections.lock();
                    let projected = *used + estimated_tokens;
                    if let Some(budget) = self.injection_budget_per_turn {
                        if projected > budget {
                            warn!(
                                projected,
                                budget, "turn injection budget exceeded; accepting anyway (advisory)"
                            );
                        }
                    }
                    *used = projected;
                }

                if ephemeral {
                    return Ok(HookPolicyOutcome::EphemeralInjection {
                        content,
                        append_to_last_tool_result,
                    });
                }

                if let Some(context) = self.context().await {
                    let role_str = match role {
                        ContextInjectionRole::System => "system",
                        ContextInjectionRole::User => "user",
                        ContextInjectionRole::Assistant => "assistant",
                    };
                    let mut message = ChatMessage::new(role_str, content);
                    message.metadata = Some(serde_json::json!({
                        "source": "hook",
                        "hook_name": hook_name,
                        "event": event,
                    }));
                    context.add_message(message).await;
                }
                Ok(HookPolicyOutcome::Continue)
            }
            HookResult::AskUser {
                prompt,
                options,
                timeout_secs,
                default,
            } => {
                let Some(approval) = &self.approval_system else {
                    return Ok(HookPolicyOutcome::Deny {
                        reason: Some("no approval system mounted".to_string()),
                    });
                };

                let outcome = approval
                    .request_approval(&prompt, &options, timeout_secs, default)
                    .await;

                match outcome {
                    ApprovalOutcome::Allow => Ok(HookPolicyOutcome::Continue),
                    ApprovalOutcome::Deny => Ok(HookPolicyOutcome::Deny {
                        reason: Some("user denied approval request".to_string()),
                    }),
                    ApprovalOutcome::Timeout => match default {
                        ApprovalDefault::Allow => Ok(HookPolicyOutcome::Continue),
                        ApprovalDefault::Deny => Ok(HookPolicyOutcome::Deny {
                            reason: Some("approval request timed out".to_string()),
                        }),
                    },
                }
            }
        }
    }

    async fn dispatch_user_message(&self, level: MessageLevel, message: &str, source: &str) {
        if let Some(display) = &self.display_system {
            display.show_message(level, message, source).await;
        } else {
            match level {
                MessageLevel::Info => info!(source, "{message}"),
                MessageLevel::Warning => warn!(source, "{message}"),
                MessageLevel::Error => warn!(source, "{message}"),
            }
        }
    }
}
