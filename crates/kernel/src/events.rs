use std::fmt;
use std::str::FromStr;

/// Closed catalog of canonical `namespace:action` event names.
///
/// Applications must not invent names colliding with the reserved namespace
/// set (`session`, `prompt`, `plan`, `provider`, `llm`, `content_block`,
/// `thinking`, `tool`, `context`, `orchestrator`, `user`, `artifact`,
/// `policy`, `approval`, `cancel`); arbitrary app-defined events are free to
/// use any other namespace and are dispatched the same way via
/// [`crate::hooks::HookRegistry::emit`], which accepts any `&str` event name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CanonicalEvent {
    SessionStart,
    SessionStartDebug,
    SessionStartRaw,
    SessionResume,
    SessionResumeDebug,
    SessionResumeRaw,
    SessionFork,
    SessionEnd,
    PromptReceived,
    PromptCompleted,
    PlanCreated,
    PlanUpdated,
    PlanCompleted,
    ProviderRequest,
    ProviderResponse,
    ProviderError,
    LlmRequestPre,
    LlmRequestPost,
    ContentBlockStart,
    ContentBlockDelta,
    ContentBlockEnd,
    ThinkingStart,
    ThinkingDelta,
    ThinkingEnd,
    ToolPre,
    ToolPost,
    ToolError,
    ContextCompactPre,
    ContextCompactPost,
    ContextMessageAdded,
    OrchestratorTurnStart,
    OrchestratorTurnEnd,
    OrchestratorStep,
    UserMessage,
    UserNotification,
    ArtifactCreated,
    ArtifactUpdated,
    PolicyViolation,
    ApprovalRequested,
    ApprovalGranted,
    ApprovalDenied,
    ApprovalTimeout,
    CancelRequested,
    CancelCompleted,
}

impl CanonicalEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalEvent::SessionStart => "session:start",
            CanonicalEvent::SessionStartDebug => "session:start:debug",
            CanonicalEvent::SessionStartRaw => "session:start:raw",
            CanonicalEvent::SessionResume => "session:resume",
            CanonicalEvent::SessionResumeDebug => "session:resume:debug",
            CanonicalEvent::SessionResumeRaw => "session:resume:raw",
            CanonicalEvent::SessionFork => "session:fork",
            CanonicalEvent::SessionEnd => "session:end",
            CanonicalEvent::PromptReceived => "prompt:received",
            CanonicalEvent::PromptCompleted => "prompt:completed",
            CanonicalEvent::PlanCreated => "plan:created",
            CanonicalEvent::PlanUpdated => "plan:updated",
            CanonicalEvent::PlanCompleted => "plan:completed",
            CanonicalEvent::ProviderRequest => "provider:request",
            CanonicalEvent::ProviderResponse => "provider:response",
            CanonicalEvent::ProviderError => "provider:error",
            CanonicalEvent::LlmRequestPre => "llm:request:pre",
            CanonicalEvent::LlmRequestPost => "llm:request:post",
            CanonicalEvent::ContentBlockStart => "content_block:start",
            CanonicalEvent::ContentBlockDelta => "content_block:delta",
            CanonicalEvent::ContentBlockEnd => "content_block:end",
            CanonicalEvent::ThinkingStart => "thinking:start",
            CanonicalEvent::ThinkingDelta => "thinking:delta",
            CanonicalEvent::ThinkingEnd => "thinking:end",
            CanonicalEvent::ToolPre => "tool:pre",
            CanonicalEvent::ToolPost => "tool:post",
            CanonicalEvent::ToolError => "tool:error",
            CanonicalEvent::ContextCompactPre => "context:compact:pre",
            CanonicalEvent::ContextCompactPost => "context:compact:post",
            CanonicalEvent::ContextMessageAdded => "context:message:added",
            CanonicalEvent::OrchestratorTurnStart => "orchestrator:turn:start",
            CanonicalEvent::OrchestratorTurnEnd => "orchestrator:turn:end",
            CanonicalEvent::OrchestratorStep => "orchestrator:step",
            CanonicalEvent::UserMessage => "user:message",
            CanonicalEvent::UserNotification => "user:notification",
            CanonicalEvent::ArtifactCreated => "artifact:created",
            CanonicalEvent::ArtifactUpdated => "artifact:updated",
            CanonicalEvent::PolicyViolation => "policy:violation",
            CanonicalEvent::ApprovalRequested => "approval:requested",
            CanonicalEvent::ApprovalGranted => "approval:granted",
            CanonicalEvent::ApprovalDenied => "approval:denied",
            CanonicalEvent::ApprovalTimeout => "approval:timeout",
            CanonicalEvent::CancelRequested => "cancel:requested",
            CanonicalEvent::CancelCompleted => "cancel:completed",
        }
    }
}

impl fmt::Display for CanonicalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CanonicalEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_EVENTS
            .iter()
            .position(|name| *name == s)
            .map(|i| ALL_VARIANTS[i])
            .ok_or_else(|| format!("'{s}' is not a canonical event name"))
    }
}

const ALL_VARIANTS: &[CanonicalEvent] = &[
    CanonicalEvent::SessionStart,
    CanonicalEvent::SessionStartDebug,
    CanonicalEvent::SessionStartRaw,
    CanonicalEvent::SessionResume,
    CanonicalEvent::SessionResumeDebug,
    CanonicalEvent::SessionResumeRaw,
    CanonicalEvent::SessionFork,
    CanonicalEvent::SessionEnd,
    CanonicalEvent::PromptReceived,
    CanonicalEvent::PromptCompleted,
    CanonicalEvent::PlanCreated,
    CanonicalEvent::PlanUpdated,
    CanonicalEvent::PlanCompleted,
    CanonicalEvent::ProviderRequest,
    CanonicalEvent::ProviderResponse,
    CanonicalEvent::ProviderError,
    CanonicalEvent::LlmRequestPre,
    CanonicalEvent::LlmRequestPost,
    CanonicalEvent::ContentBlockStart,
    CanonicalEvent::ContentBlockDelta,
    CanonicalEvent::ContentBlockEnd,
    CanonicalEvent::ThinkingStart,
    CanonicalEvent::ThinkingDelta,
    CanonicalEvent::ThinkingEnd,
    CanonicalEvent::ToolPre,
    CanonicalEvent::ToolPost,
    CanonicalEvent::ToolError,
    CanonicalEvent::ContextCompactPre,
    CanonicalEvent::ContextCompactPost,
    CanonicalEvent::ContextMessageAdded,
    CanonicalEvent::OrchestratorTurnStart,
    CanonicalEvent::OrchestratorTurnEnd,
    CanonicalEvent::OrchestratorStep,
    CanonicalEvent::UserMessage,
    CanonicalEvent::UserNotification,
    CanonicalEvent::ArtifactCreated,
    CanonicalEvent::ArtifactUpdated,
    CanonicalEvent::PolicyViolation,
    CanonicalEvent::ApprovalRequested,
    CanonicalEvent::ApprovalGranted,
    CanonicalEvent::ApprovalDenied,
    CanonicalEvent::ApprovalTimeout,
    CanonicalEvent::CancelRequested,
    CanonicalEvent::CancelCompleted,
];

/// The full closed set of canonical event names, for validation tooling.
pub const ALL_EVENTS: &[&str] = &[
    "session:start",
    "session:start:debug",
    "session:start:raw",
    "session:resume",
    "session:resume:debug",
    "session:resume:raw",
    "session:fork",
    "session:end",
    "prompt:received",
    "prompt:completed",
    "plan:created",
    "plan:updated",
    "plan:completed",
    "provider:request",
    "provider:response",
    "provider:error",
    "llm:request:pre",
    "llm:request:post",
    "content_block:start",
    "content_block:delta",
    "content_block:end",
    "thinking:start",
    "thinking:delta",
    "thinking:end",
    "tool:pre",
    "tool:post",
    "tool:error",
    "context:compact:pre",
    "context:compact:post",
    "context:message:added",
    "orchestrator:turn:start",
    "orchestrator:turn:end",
    "orchestrator:step",
    "user:message",
    "user:notification",
    "artifact:created",
    "artifact:updated",
    "policy:violation",
    "approval:requested",
    "approval:granted",
    "approval:denied",
    "approval:timeout",
    "cancel:requested",
    "cancel:completed",
];

/// The set of reserved namespaces canonical events live in. Application
/// events must not be registered under these.
pub const RESERVED_NAMESPACES: &[&str] = &[
    "session",
    "prompt",
    "plan",
    "provider",
    "llm",
    "content_block",
    "thinking",
    "tool",
    "context",
    "orchestrator",
    "user",
    "artifact",
    "policy",
    "approval",
    "cancel",
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn all_events_has_no_duplicates() {
        let set: HashSet<&str> = ALL_EVENTS.iter().copied().collect();
        assert_eq!(set.len(), ALL_EVENTS.len());
    }

    #[test]
    fn all_events_matches_variant_table_length() {
        assert_eq!(ALL_EVENTS.len(), ALL_VARIANTS.len());
    }

    #[test]
    fn every_name_round_trips_through_from_str() {
        for name in ALL_EVENTS {
            let parsed = CanonicalEvent::from_str(name).unwrap();
            assert_eq!(parsed.as_str(), *name);
        }
    }

    #[test]
    fn every_name_is_single_colon_or_namespaced_lowercase() {
        for name in ALL_EVENTS {
            assert_eq!(*name, name.to_lowercase());
            assert!(name.contains(':'));
        }
    }

    #[test]
    fn unknown_name_does_not_parse() {
        assert!(CanonicalEvent::from_str("bogus:event").is_err());
    }

    #[test]
    fn every_canonical_event_namespace_is_reserved() {
        for name in ALL_EVENTS {
            let namespace = name.split(':').next().unwrap();
            assert!(
                RESERVED_NAMESPACES.contains(&namespace),
                "namespace '{namespace}' (from '{name}') missing from RESERVED_NAMESPACES"
            );
        }
    }
}
