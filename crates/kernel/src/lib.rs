//! Coordination kernel for a modular AI-agent runtime.
//!
//! The kernel assembles a *session* from independently authored modules
//! (orchestrators, providers, tools, hooks, context managers) declared in a
//! *mount plan*, wires them together through a [`Coordinator`], and drives a
//! single turn to completion with deterministic lifecycle semantics,
//! cooperative cancellation, and cross-cutting hook dispatch.
//!
//! # Architecture
//! The crate is organized into modules that handle different aspects of
//! coordination:

/// Two-state (graceful, immediate) cooperative cancellation signal.
pub mod cancellation;

/// Per-session registry of mount points, capabilities, contributions, and cleanups.
pub mod coordinator;

/// Kernel-level error type.
pub mod error;

/// Closed catalog of canonical `namespace:action` event names.
pub mod events;

/// Prioritized event dispatch: hook registration, envelope stamping, action folding.
pub mod hooks;

/// Module identifier resolution and transport dispatch (in-process, gRPC).
pub mod loader;

/// Structured LLM/provider error taxonomy and classification.
pub mod llm_error;

/// Mount plan data model and structural validator.
pub mod mount_plan;

/// Exponential backoff with jitter, keyed off the LLM error taxonomy.
pub mod retry;

/// Session lifecycle state machine.
pub mod session;

/// Narrow capability traits implemented by concrete modules.
pub mod traits;

/// Static contract checks for candidate module artifacts.
pub mod validators;

pub use cancellation::{CancellationState, CancellationToken};
pub use coordinator::{Coordinator, HookPolicyOutcome, MountedModule};
pub use error::KernelError;
pub use events::CanonicalEvent;
pub use hooks::{HookRegistry, HookResult};
pub use mount_plan::{ModuleSpec, MountPlan, validate_mount_plan, validate_raw_mount_plan};
pub use session::{Session, SessionGuard, SessionStatus};
