use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role under which an injected context message is attributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextInjectionRole {
    System,
    User,
    Assistant,
}

/// Default decision when an approval request times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDefault {
    Allow,
    Deny,
}

/// Severity of a `user_message` side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

/// `user_message`/`suppress_output` side effects, attachable to a `continue`
/// result. The reference record carries these alongside any action, but in
/// practice they only ever accompany a handler that otherwise has nothing
/// special to report; modeling them on `Continue` keeps the sum type exact
/// without reintroducing an optional-field bag on every variant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SideEffects {
    #[serde(default)]
    pub suppress_output: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_message_level: Option<MessageLevel>,
}

/// The tagged outcome returned by a hook handler, folded across the chain by
/// the [`super::HookRegistry`].
///
/// One variant per action, per spec §9's re-architecture guidance ("dynamic
/// typing -> tagged unions"): this replaces the reference implementation's
/// single optional-field-carrying record with a Rust sum type, so a given
/// result can only carry the fields relevant to its action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HookResult {
    Continue {
        /// The (possibly unmodified) envelope data to carry forward.
        data: Value,
        #[serde(default)]
        side_effects: SideEffects,
    },
    Deny {
        reason: Option<String>,
    },
    Modify {
        data: Value,
    },
    InjectContext {
        content: String,
        role: ContextInjectionRole,
        ephemeral: bool,
        append_to_last_tool_result: bool,
    },
    AskUser {
        prompt: String,
        options: Vec<String>,
        timeout_secs: Option<f64>,
        default: ApprovalDefault,
    },
}

impl HookResult {
    pub fn continue_with(data: Value) -> Self {
        HookResult::Continue {
            data,
            side_effects: SideEffects::default(),
        }
    }

    pub fn continue_with_message(
        data: Value,
        message: impl Into<String>,
        level: MessageLevel,
    ) -> Self {
        HookResult::Continue {
            data,
            side_effects: SideEffects {
                suppress_output: false,
                user_message: Some(message.into()),
                user_message_level: Some(level),
            },
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        HookResult::Deny {
            reason: Some(reason.into()),
        }
    }

    pub fn modify(data: Value) -> Self {
        HookResult::Modify { data }
    }

    pub fn inject_context(content: impl Into<String>) -> Self {
        HookResult::InjectContext {
            content: content.into(),
            role: ContextInjectionRole::System,
            ephemeral: false,
            append_to_last_tool_result: false,
        }
    }

    pub fn ask_user(prompt: impl Into<String>) -> Self {
        HookResult::AskUser {
            prompt: prompt.into(),
            options: Vec::new(),
            timeout_secs: None,
            default: ApprovalDefault::Deny,
        }
    }

    /// The action name, matching the wire-level `action` tag.
    pub fn action_name(&self) -> &'static str {
        match self {
            HookResult::Continue { .. } => "continue",
            HookResult::Deny { .. } => "deny",
            HookResult::Modify { .. } => "modify",
            HookResult::InjectContext { .. } => "inject_context",
            HookResult::AskUser { .. } => "ask_user",
        }
    }

    /// The precedence rank used by the fold in [`super::HookRegistry::emit`].
    /// Lower ranks win: `deny` (0) > `ask_user` (1) > `inject_context` (2) >
    /// `modify`/`continue` (3, never compared against each other by rank).
    pub(super) fn precedence_rank(&self) -> u8 {
        match self {
            HookResult::Deny { .. } => 0,
            HookResult::AskUser { .. } => 1,
            HookResult::InjectContext { .. } => 2,
            HookResult::Modify { .. } | HookResult::Continue { .. } => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_names_match_wire_tag() {
        assert_eq!(HookResult::continue_with(Value::Null).action_name(), "continue");
        assert_eq!(HookResult::deny("no").action_name(), "deny");
        assert_eq!(HookResult::modify(Value::Null).action_name(), "modify");
        assert_eq!(HookResult::inject_context("hi").action_name(), "inject_context");
        assert_eq!(HookResult::ask_user("ok?").action_name(), "ask_user");
    }

    #[test]
    fn precedence_order_is_deny_askuser_inject_modify() {
        assert!(HookResult::deny("x").precedence_rank() < HookResult::ask_user("x").precedence_rank());
        assert!(
            HookResult::ask_user("x").precedence_rank() < HookResult::inject_context("x").precedence_rank()
        );
        assert!(
            HookResult::inject_context("x").precedence_rank()
                < HookResult::modify(Value::Null).precedence_rank()
        );
    }

    #[test]
    fn continue_with_message_carries_side_effects() {
        let result = HookResult::continue_with_message(Value::Null, "careful", MessageLevel::Warning);
        if let HookResult::Continue { side_effects, .. } = result {
            assert_eq!(side_effects.user_message.as_deref(), Some("careful"));
            assert_eq!(side_effects.user_message_level, Some(MessageLevel::Warning));
            assert!(!side_effects.suppress_output);
        } else {
            unreachable!();
        }
    }

    #[test]
    fn plain_continue_has_no_side_effects() {
        let result = HookResult::continue_with(Value::Null);
        if let HookResult::Continue { side_effects, .. } = result {
            assert!(side_effects.user_message.is_none());
            assert!(!side_effects.suppress_output);
        } else {
            unreachable!();
        }
    }

    #[test]
    fn serde_tag_round_trip() {
        let result = HookResult::ask_user("proceed?");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["action"], "ask_user");
        let back: HookResult = serde_json::from_value(json).unwrap();
        assert_eq!(back.action_name(), "ask_user");
    }
}
