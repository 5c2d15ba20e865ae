use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::coordinator::Coordinator;
use crate::error::KernelError;
use crate::hooks::{ApprovalDefault, HookResult, MessageLevel};

/// A single chat message exchanged between the orchestrator and a provider.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    /// Provenance for messages the kernel appended on a module's behalf
    /// (e.g. `{"source": "hook", "hook_name": ..., "event": ...}` for a
    /// non-ephemeral `inject_context`). `None` for ordinary turn messages.
    pub metadata: Option<Value>,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            metadata: None,
        }
    }
}

/// Opaque structured response from a [`Provider::complete`] call. The kernel
/// does not interpret its contents; orchestrators and tools do.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone)]
pub struct ToolResult {
    pub success: bool,
    pub output: Option<String>,
    pub error: Option<String>,
}

impl ToolResult {
    /// On failure with no explicit output, `output` is auto-populated from
    /// `error`, per spec §6's structural `Tool` contract.
    pub fn normalized(mut self) -> Self {
        if !self.success && self.output.is_none() {
            self.output = self.error.clone();
        }
        self
    }
}

/// Module implementing the agent loop for one turn.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    async fn execute(
        &self,
        prompt: &str,
        context: Arc<dyn ContextManager>,
        providers: Vec<Arc<dyn Provider>>,
        tools: Vec<Arc<dyn Tool>>,
        hooks: &crate::hooks::HookRegistry,
        coordinator: Arc<Coordinator>,
    ) -> Result<String, KernelError>;
}

/// Module wrapping a remote LLM endpoint.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;
    async fn complete(&self, messages: &[ChatMessage]) -> Result<ChatResponse, KernelError>;
    fn parse_tool_calls(&self, _response: &ChatResponse) -> Vec<ToolCall> {
        Vec::new()
    }
}

/// A callable tool exposed to the orchestrator.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    async fn execute(&self, input: Value) -> ToolResult;
}

/// Module owning the conversation history presented to providers.
#[async_trait]
pub trait ContextManager: Send + Sync {
    async fn add_message(&self, message: ChatMessage);
    async fn get_messages(&self) -> Vec<ChatMessage>;
    async fn clear(&self);
    fn should_compact(&self) -> bool {
        false
    }
    async fn compact(&self) {}
}

/// A registered hook handler: `(event, data) -> HookResult | null`.
#[async_trait]
pub trait HookHandler: Send + Sync {
    async fn call(&self, event: &str, data: Value) -> Option<HookResult>;
}

/// The outcome of an approval request, as returned by an [`ApprovalProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Allow,
    Deny,
    Timeout,
}

/// Pluggable collaborator answering `ask_user` hook results.
#[async_trait]
pub trait ApprovalProvider: Send + Sync {
    async fn request_approval(
        &self,
        prompt: &str,
        options: &[String],
        timeout_secs: Option<f64>,
        default: ApprovalDefault,
    ) -> ApprovalOutcome;
}

/// Pluggable collaborator for displaying `user_message` side effects.
#[async_trait]
pub trait DisplaySystem: Send + Sync {
    async fn show_message(&self, level: MessageLevel, message: &str, source: &str);
}

/// Policy component mapping a module identifier and optional source hint to
/// a filesystem path. Deliberately app-layer: the kernel defines only this
/// contract (mirroring the reference implementation's `module_sources.py`,
/// which is a Protocol with no concrete policy baked in).
#[async_trait]
pub trait ModuleSourceResolver: Send + Sync {
    async fn resolve(&self, module_id: &str, source_hint: Option<&str>) -> Option<String>;
}
