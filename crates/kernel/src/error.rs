use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the kernel itself (not by mounted modules).
///
/// Module runtime faults use [`crate::llm_error::LlmError`] instead; hook-handler
/// and cleanup-callback faults are logged and swallowed at the point of
/// occurrence rather than represented here (see spec §7).
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub enum KernelError {
    #[error("mount plan failed validation: {errors:?}")]
    Validation { errors: Vec<String> },

    #[error("failed to load module '{module}' for slot '{slot}': {reason}")]
    ModuleLoad {
        slot: String,
        module: String,
        reason: String,
    },

    #[error("unknown mount slot '{slot}'")]
    UnknownSlot { slot: String },

    #[error("session was cancelled (immediate={was_immediate})")]
    Cancelled { was_immediate: bool },

    #[error("session has not been initialized")]
    NotInitialized,

    #[error("session is already initialized")]
    AlreadyInitialized,

    #[error("context injection of {len} bytes exceeds configured limit of {limit} bytes")]
    InjectionTooLarge { len: u64, limit: u64 },

    #[error("hook requested user approval but no approval system is mounted")]
    NoApprovalSystem,

    #[error("transport '{transport}' is not implemented")]
    TransportNotImplemented { transport: String },

    #[error("{0}")]
    Internal(String),
}

impl From<serde_json::Error> for KernelError {
    fn from(err: serde_json::Error) -> Self {
        KernelError::Internal(err.to_string())
    }
}
