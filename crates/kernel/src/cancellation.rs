use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Cooperative cancellation state. Transitions are monotonic: `None < Graceful < Immediate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum CancellationState {
    None = 0,
    Graceful = 1,
    Immediate = 2,
}

impl CancellationState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => CancellationState::None,
            1 => CancellationState::Graceful,
            _ => CancellationState::Immediate,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CancellationState::None => "none",
            CancellationState::Graceful => "graceful",
            CancellationState::Immediate => "immediate",
        }
    }
}

/// Two-state cooperative cancellation signal, shared by every module mounted
/// on a session's coordinator.
///
/// Cheap to clone: internally `Arc`-backed, so every holder observes the same
/// underlying state. State only ever moves forward (`none -> graceful ->
/// immediate`); it never resets for the lifetime of the token.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    state: Arc<AtomicU8>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(CancellationState::None as u8)),
        }
    }

    /// Requests cancellation. Idempotent. `immediate=false` moves to
    /// `Graceful` unless already `Immediate`; `immediate=true` jumps straight
    /// to `Immediate` regardless of the current state.
    ///
    /// Returns `true` if this call actually changed the state (useful for
    /// deciding whether to emit `cancel:requested`).
    pub fn request_cancellation(&self, immediate: bool) -> bool {
        let target = if immediate {
            CancellationState::Immediate
        } else {
            CancellationState::Graceful
        };

        loop {
            let current = self.state.load(Ordering::Acquire);
            let current_state = CancellationState::from_u8(current);
            if current_state >= target {
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                target as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(_) => continue,
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) != CancellationState::None as u8
    }

    pub fn is_immediate(&self) -> bool {
        self.state.load(Ordering::Acquire) == CancellationState::Immediate as u8
    }

    pub fn state(&self) -> CancellationState {
        CancellationState::from_u8(self.state.load(Ordering::Acquire))
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
