mod registry;
mod result;

pub use registry::{HandlerInfo, HookRegistry, Unregister};
pub use result::{ApprovalDefault, ContextInjectionRole, HookResult, MessageLevel, SideEffects};
