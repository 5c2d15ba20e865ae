use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::coordinator::{Coordinator, MountedModule};
use crate::error::KernelError;
use crate::events::CanonicalEvent;
use crate::loader::{self, EnvOverrideResolver, LoadedModule, ModuleManifest};
use crate::mount_plan::{ModuleSpec, MountPlan, validate_mount_plan};
use crate::traits::ModuleSourceResolver;

/// Lifecycle state of a [`Session`]. Transitions are one-directional:
/// `Constructed -> Initializing -> Initialized -> Running ->
/// (Completed|Failed|Cancelled) -> Cleaned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionStatus {
    Constructed = 0,
    Initializing = 1,
    Initialized = 2,
    Running = 3,
    Completed = 4,
    Failed = 5,
    Cancelled = 6,
    Cleaned = 7,
}

impl SessionStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionStatus::Constructed,
            1 => SessionStatus::Initializing,
            2 => SessionStatus::Initialized,
            3 => SessionStatus::Running,
            4 => SessionStatus::Completed,
            5 => SessionStatus::Failed,
            6 => SessionStatus::Cancelled,
            _ => SessionStatus::Cleaned,
        }
    }
}

/// A single agent-turn session: a mount plan brought to life on a
/// [`Coordinator`], driven through `initialize -> execute -> cleanup`.
///
/// Owns its coordinator exclusively (per spec §5's ownership model): the
/// session holds the sole `Arc<Coordinator>` whose strong count it
/// controls, handing mounted modules a shared, non-owning clone.
pub struct Session {
    session_id: String,
    parent_id: Option<String>,
    plan: MountPlan,
    coordinator: Arc<Coordinator>,
    status: AtomicU8,
    resolver: Arc<dyn ModuleSourceResolver>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("parent_id", &self.parent_id)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Validates `plan` structurally (§4.6) and constructs the session's
    /// coordinator. Generates a `session_id` if `given_id` is absent. No I/O
    /// is performed.
    pub fn new(
        plan: MountPlan,
        given_id: Option<String>,
        parent_id: Option<String>,
    ) -> Result<Self, KernelError> {
        let validation = validate_mount_plan(&plan);
        if !validation.passed {
            return Err(KernelError::Validation {
                errors: validation
                    .errors
                    .into_iter()
                    .map(|e| format!("{}: {}", e.path, e.message))
                    .collect(),
            });
        }

        let session_id = given_id.unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        let coordinator = Arc::new(
            Coordinator::new(session_id.clone(), parent_id.clone()).with_injection_limits(
                plan.session.injection_budget_per_turn,
                plan.session.injection_size_limit,
            ),
        );

        let mut defaults = serde_json::Map::new();
        defaults.insert("session_id".to_string(), Value::String(session_id.clone()));
        if let Some(parent) = &parent_id {
            defaults.insert("parent_id".to_string(), Value::String(parent.clone()));
        }
        coordinator.hooks().set_default_fields(defaults);

        Ok(Self {
            session_id,
            parent_id,
            plan,
            coordinator,
            status: AtomicU8::new(SessionStatus::Constructed as u8),
            resolver: Arc::new(EnvOverrideResolver),
        })
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ModuleSourceResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn coordinator(&self) -> Arc<Coordinator> {
        self.coordinator.clone()
    }

    pub fn is_initialized(&self) -> bool {
        matches!(
            self.status(),
            SessionStatus::Initialized | SessionStatus::Running | SessionStatus::Completed
        )
    }

    /// Loads every declared module in order: orchestrator (required,
    /// fatal), context (required, fatal), providers, tools, hooks
    /// (non-required, logged and skipped on failure). Idempotent: a second
    /// call after a successful first is a no-op.
    #[instrument(skip(self), fields(session_id = %self.session_id))]
    pub async fn initialize(&self) -> Result<(), KernelError> {
        if self.is_initialized() {
            return Ok(());
        }
        self.status.store(SessionStatus::Initializing as u8, Ordering::Release);

        self.load_required("orchestrator", &self.plan.session.orchestrator)
            .await?;
        self.load_required("context", &self.plan.session.context)
            .await?;

        for spec in &self.plan.providers {
            self.load_optional("providers", spec).await;
        }
        for spec in &self.plan.tools {
            self.load_optional("tools", spec).await;
        }
        for spec in &self.plan.hooks {
            self.load_optional("hooks", spec).await;
        }

        self.status.store(SessionStatus::Initialized as u8, Ordering::Release);

        if self.parent_id.is_some() {
            self.coordinator
                .hooks()
                .emit(
                    CanonicalEvent::SessionFork.as_str(),
                    serde_json::json!({"parent_id": self.parent_id, "session_id": self.session_id}),
                )
                .await;
        }

        Ok(())
    }

    async fn load_required(&self, slot: &'static str, spec: &ModuleSpec) -> Result<(), KernelError> {
        match self.load_and_mount(slot, spec).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.status.store(SessionStatus::Failed as u8, Ordering::Release);
                Err(err)
            }
        }
    }

    async fn load_optional(&self, slot: &'static str, spec: &ModuleSpec) {
        if let Err(err) = self.load_and_mount(slot, spec).await {
            warn!(slot, module = %spec.module, error = %err, "optional module failed to load; skipping");
        }
    }

    async fn load_and_mount(&self, slot: &'static str, spec: &ModuleSpec) -> Result<(), KernelError> {
        let manifest: Option<ModuleManifest> = None;
        let loaded: LoadedModule =
            loader::load_module(slot, spec, manifest.as_ref(), self.resolver.as_ref()).await?;
        loader::mount_loaded_module(&self.coordinator, loaded).await
    }

    /// Requires prior [`Session::initialize`] — this kernel never
    /// auto-initializes on first `execute`, diverging deliberately from the
    /// reference implementation's convenience behavior (see `DESIGN.md`).
    #[instrument(skip(self, prompt), fields(session_id = %self.session_id))]
    pub async fn execute(&self, prompt: &str) -> Result<String, KernelError> {
        if !self.is_initialized() {
            return Err(KernelError::NotInitialized);
        }

        let event = if self.status() == SessionStatus::Completed {
            CanonicalEvent::SessionResume
        } else {
            CanonicalEvent::SessionStart
        };
        self.coordinator
            .hooks()
            .emit(
                event.as_str(),
                serde_json::json!({"session_id": self.session_id, "prompt_len": prompt.len()}),
            )
            .await;
        if self.plan.session.debug {
            let debug_event = match event {
                CanonicalEvent::SessionStart => CanonicalEvent::SessionStartDebug,
                _ => CanonicalEvent::SessionResumeDebug,
            };
            self.coordinator
                .hooks()
                .emit(debug_event.as_str(), serde_json::json!({}))
                .await;
        }

        self.status.store(SessionStatus::Running as u8, Ordering::Release);

        let orchestrator = self
            .coordinator
            .orchestrator()
            .await
            .ok_or(KernelError::NotInitialized)?;
        let context = self
            .coordinator
            .context()
            .await
            .ok_or(KernelError::NotInitialized)?;
        let providers = self.coordinator.providers().await;
        let tools = self.coordinator.tools().await;

        let result = orchestrator
            .execute(
                prompt,
                context,
                providers,
                tools,
                self.coordinator.hooks(),
                self.coordinator.clone(),
            )
            .await;

        let was_immediate = self.coordinator.cancellation().is_immediate();

        match result {
            Ok(output) => {
                self.status.store(SessionStatus::Completed as u8, Ordering::Release);
                if self.coordinator.cancellation().is_cancelled() {
                    self.coordinator
                        .hooks()
                        .emit(
                            CanonicalEvent::CancelCompleted.as_str(),
                            serde_json::json!({"was_immediate": was_immediate}),
                        )
                        .await;
                }
                Ok(output)
            }
            Err(err) => {
                if self.coordinator.cancellation().is_cancelled() {
                    self.status.store(SessionStatus::Cancelled as u8, Ordering::Release);
                    self.coordinator
                        .hooks()
                        .emit(
                            CanonicalEvent::CancelCompleted.as_str(),
                            serde_json::json!({"was_immediate": was_immediate}),
                        )
                        .await;
                    Err(KernelError::Cancelled { was_immediate })
                } else {
                    self.status.store(SessionStatus::Failed as u8, Ordering::Release);
                    Err(err)
                }
            }
        }
    }

    /// Idempotent: running cleanup twice is a no-op after the first
    /// succeeds.
    #[instrument(skip(self), fields(session_id = %self.session_id))]
    pub async fn cleanup(&self) {
        if self.status() == SessionStatus::Cleaned {
            return;
        }
        self.coordinator.cleanup().await;
        self.coordinator
            .hooks()
            .emit(CanonicalEvent::SessionEnd.as_str(), serde_json::json!({}))
            .await;
        self.status.store(SessionStatus::Cleaned as u8, Ordering::Release);
        info!("session cleaned up");
    }

    /// Scoped-resource helper: `initialize()`, run `body`, then `cleanup()`
    /// on every exit path including error — the Rust analogue of a
    /// `__aenter__`/`__aexit__` context manager.
    pub async fn run<F, Fut, T>(self, prompt: &str, body: F) -> Result<T, KernelError>
    where
        F: FnOnce(Arc<Coordinator>, String) -> Fut,
        Fut: std::future::Future<Output = Result<T, KernelError>>,
    {
        self.initialize().await?;
        let result = self.execute(prompt).await;
        let coordinator = self.coordinator();
        let outcome = match result {
            Ok(output) => body(coordinator, output).await,
            Err(err) => Err(err),
        };
        self.cleanup().await;
        outcome
    }
}

/// Wraps a [`Session`] and calls [`Session::cleanup`] best-effort from
/// `Drop` if the caller never did — the idiomatic Rust analogue of a
/// `__aenter__`/`__aexit__` context manager. `Drop` cannot run async code or
/// propagate a `Result`, so this is deliberately a last-resort safety net,
/// not a substitute for calling `cleanup()` on the ordinary path: a session
/// dropped without ever having its guard's cleanup awaited simply leaks its
/// coordinator's teardown stack (logged, not panicked).
pub struct SessionGuard {
    session: Option<Session>,
}

impl SessionGuard {
    pub fn new(session: Session) -> Self {
        Self {
            session: Some(session),
        }
    }

    pub fn session(&self) -> &Session {
        self.session.as_ref().expect("session taken")
    }

    /// Consumes the guard, running cleanup and handing back the inner
    /// session.
    pub async fn into_cleaned(mut self) -> Session {
        let session = self.session.take().expect("session taken");
        session.cleanup().await;
        session
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(session) = &self.session {
            if session.status() != SessionStatus::Cleaned {
                warn!(
                    session_id = %session.session_id,
                    "SessionGuard dropped without explicit cleanup; coordinator teardown stack was not run"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::HookResult;
    use crate::traits::{ChatMessage, ChatResponse, ContextManager, Orchestrator, Provider, Tool};
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct EchoOrchestrator;
    #[async_trait]
    impl Orchestrator for EchoOrchestrator {
        async fn execute(
            &self,
            prompt: &str,
            _context: Arc<dyn ContextManager>,
            _providers: Vec<Arc<dyn Provider>>,
            _tools: Vec<Arc<dyn Tool>>,
            _hooks: &crate::hooks::HookRegistry,
            _coordinator: Arc<Coordinator>,
        ) -> Result<String, KernelError> {
            Ok(prompt.to_string())
        }
    }

    struct MemContext {
        messages: tokio::sync::Mutex<Vec<ChatMessage>>,
    }
    impl MemContext {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                messages: tokio::sync::Mutex::new(Vec::new()),
            })
        }
    }
    #[async_trait]
    impl ContextManager for MemContext {
        async fn add_message(&self, message: ChatMessage) {
            self.messages.lock().await.push(message);
        }
        async fn get_messages(&self) -> Vec<ChatMessage> {
            self.messages.lock().await.clone()
        }
        async fn clear(&self) {
            self.messages.lock().await.clear();
        }
    }

    fn minimal_plan() -> MountPlan {
        MountPlan {
            session: crate::mount_plan::SessionSpec {
                orchestrator: ModuleSpec::new("echo"),
                context: ModuleSpec::new("mem"),
                injection_budget_per_turn: None,
                injection_size_limit: None,
                debug: false,
                raw_debug: false,
            },
            providers: vec![],
            tools: vec![],
            hooks: vec![],
            agents: HashMap::new(),
        }
    }

    async fn initialized_session() -> Session {
        let session = Session::new(minimal_plan(), Some("sess-1".to_string()), None).unwrap();
        session
            .coordinator()
            .mount(
                "orchestrator",
                MountedModule::Orchestrator(Arc::new(EchoOrchestrator)),
                None,
            )
            .await
            .unwrap();
        session
            .coordinator()
            .mount("context", MountedModule::Context(MemContext::new()), None)
            .await
            .unwrap();
        session.status.store(SessionStatus::Initialized as u8, Ordering::Release);
        session
    }

    #[test]
    fn construction_rejects_invalid_plan() {
        let mut plan = minimal_plan();
        plan.session.orchestrator.module = "".to_string();
        let err = Session::new(plan, None, None).unwrap_err();
        assert!(matches!(err, KernelError::Validation { .. }));
    }

    #[test]
    fn construction_generates_session_id_when_absent() {
        let session = Session::new(minimal_plan(), None, None).unwrap();
        assert!(!session.session_id().is_empty());
    }

    #[tokio::test]
    async fn execute_before_initialize_errors() {
        let session = Session::new(minimal_plan(), None, None).unwrap();
        let err = session.execute("hi").await.unwrap_err();
        assert!(matches!(err, KernelError::NotInitialized));
    }

    #[tokio::test]
    async fn minimal_turn_executes_and_returns_orchestrator_result() {
        let session = initialized_session().await;
        let output = session.execute("hello").await.unwrap();
        assert_eq!(output, "hello");
        assert_eq!(session.status(), SessionStatus::Completed);
    }

    #[tokio::test]
    async fn cleanup_is_idempotent() {
        let session = initialized_session().await;
        session.cleanup().await;
        assert_eq!(session.status(), SessionStatus::Cleaned);
        session.cleanup().await;
        assert_eq!(session.status(), SessionStatus::Cleaned);
    }

    #[tokio::test]
    async fn session_start_and_end_events_are_emitted_in_order() {
        let session = initialized_session().await;
        let seen = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        struct Recorder(Arc<tokio::sync::Mutex<Vec<String>>>);
        #[async_trait]
        impl crate::traits::HookHandler for Recorder {
            async fn call(&self, event: &str, _data: Value) -> Option<HookResult> {
                self.0.lock().await.push(event.to_string());
                Some(HookResult::continue_with(Value::Null))
            }
        }

        session
            .coordinator()
            .hooks()
            .register("session:start", "r", Arc::new(Recorder(seen.clone())), 0);
        session
            .coordinator()
            .hooks()
            .register("session:end", "r", Arc::new(Recorder(seen.clone())), 0);

        session.execute("hi").await.unwrap();
        session.cleanup().await;

        let events = seen.lock().await.clone();
        assert_eq!(events, vec!["session:start", "session:end"]);
    }

    #[tokio::test]
    async fn initialize_is_idempotent_after_success() {
        let session = initialized_session().await;
        session.initialize().await.unwrap();
        assert!(session.is_initialized());
    }

    #[tokio::test]
    async fn required_module_load_failure_is_fatal() {
        let session = Session::new(minimal_plan(), None, None).unwrap();
        let err = session.initialize().await.unwrap_err();
        assert!(matches!(err, KernelError::ModuleLoad { .. }));
        assert_eq!(session.status(), SessionStatus::Failed);
    }

    #[tokio::test]
    async fn session_guard_logs_but_does_not_panic_on_unclean_drop() {
        let session = initialized_session().await;
        let guard = SessionGuard::new(session);
        drop(guard);
    }

    #[tokio::test]
    async fn session_guard_into_cleaned_runs_cleanup() {
        let session = initialized_session().await;
        let guard = SessionGuard::new(session);
        let session = guard.into_cleaned().await;
        assert_eq!(session.status(), SessionStatus::Cleaned);
    }
}
