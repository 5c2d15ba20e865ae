use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{error, instrument, warn};

use super::result::HookResult;
use crate::traits::HookHandler;

struct HandlerEntry {
    id: u64,
    name: String,
    priority: i64,
    insertion_order: u64,
    handler: Arc<dyn HookHandler>,
}

/// Inventory entry returned by [`HookRegistry::list_handlers`].
#[derive(Debug, Clone)]
pub struct HandlerInfo {
    pub event: String,
    pub name: String,
    pub priority: i64,
}

/// A live registration; dropping this does *not* unregister the handler —
/// call [`Unregister::unregister`] explicitly, matching the reference
/// implementation's explicit-unregister-handle contract.
pub struct Unregister {
    registry: Arc<Inner>,
    event: String,
    id: u64,
}

impl Unregister {
    pub fn unregister(self) {
        self.registry.remove(&self.event, self.id);
    }
}

struct Inner {
    handlers: Mutex<HashMap<String, Vec<HandlerEntry>>>,
    defaults: Mutex<Map<String, Value>>,
    sequence: AtomicU64,
    registration_counter: AtomicU64,
    handler_id_counter: AtomicU64,
}

impl Inner {
    fn remove(&self, event: &str, id: u64) {
        let mut handlers = self.handlers.lock();
        if let Some(list) = handlers.get_mut(event) {
            list.retain(|h| h.id != id);
        }
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::AcqRel)
    }
}

/// Priority-ordered hook dispatch: registration, envelope stamping
/// (`timestamp`/`event_id`/`sequence`), and action folding.
///
/// Cheap to clone: internally `Arc`-backed, sharing the same handler table
/// and monotonic sequence counter across clones (mirroring the coordinator's
/// single-registry-per-session ownership).
#[derive(Clone)]
pub struct HookRegistry {
    inner: Arc<Inner>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                handlers: Mutex::new(HashMap::new()),
                defaults: Mutex::new(Map::new()),
                sequence: AtomicU64::new(1),
                registration_counter: AtomicU64::new(0),
                handler_id_counter: AtomicU64::new(0),
            }),
        }
    }

    /// Registers `handler` for `event`. Lower `priority` runs earlier; ties
    /// are broken by registration order (stable). Returns an [`Unregister`]
    /// handle.
    pub fn register(
        &self,
        event: impl Into<String>,
        name: impl Into<String>,
        handler: Arc<dyn HookHandler>,
        priority: i64,
    ) -> Unregister {
        let event = event.into();
        let id = self.inner.handler_id_counter.fetch_add(1, Ordering::AcqRel);
        let insertion_order = self
            .inner
            .registration_counter
            .fetch_add(1, Ordering::AcqRel);

        let entry = HandlerEntry {
            id,
            name: name.into(),
            priority,
            insertion_order,
            handler,
        };

        let mut handlers = self.inner.handlers.lock();
        let list = handlers.entry(event.clone()).or_default();
        list.push(entry);
        list.sort_by_key(|h| (h.priority, h.insertion_order));
        drop(handlers);

        Unregister {
            registry: self.inner.clone(),
            event,
            id,
        }
    }

    /// Alias of [`HookRegistry::register`].
    pub fn on(
        &self,
        event: impl Into<String>,
        name: impl Into<String>,
        handler: Arc<dyn HookHandler>,
        priority: i64,
    ) -> Unregister {
        self.register(event, name, handler, priority)
    }

    /// Registers process-lifetime default envelope fields (e.g. `session_id`).
    /// Caller data in a given `emit` wins over these on non-infrastructure
    /// key collisions.
    pub fn set_default_fields(&self, fields: Map<String, Value>) {
        let mut defaults = self.inner.defaults.lock();
        for (k, v) in fields {
            defaults.insert(k, v);
        }
    }

    pub fn list_handlers(&self, event: Option<&str>) -> Vec<HandlerInfo> {
        let handlers = self.inner.handlers.lock();
        let mut out = Vec::new();
        for (ev, list) in handlers.iter() {
            if let Some(filter) = event {
                if ev != filter {
                    continue;
                }
            }
            for h in list {
                out.push(HandlerInfo {
                    event: ev.clone(),
                    name: h.name.clone(),
                    priority: h.priority,
                });
            }
        }
        out
    }

    fn session_id(&self) -> Option<String> {
        self.inner
            .defaults
            .lock()
            .get("session_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }

    fn build_envelope(&self, data: Value, sequence: u64, with_timestamp: bool) -> Value {
        let defaults = self.inner.defaults.lock().clone();
        let mut map = defaults;

        if let Value::Object(caller_fields) = data {
            for (k, v) in caller_fields {
                map.insert(k, v);
            }
        }

        let session_id = map
            .get("session_id")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();

        map.insert("event_id".to_string(), Value::String(format!("{session_id}:{sequence}")));
        map.insert("sequence".to_string(), Value::from(sequence));
        if with_timestamp {
            map.insert(
                "timestamp".to_string(),
                Value::String(humantime::format_rfc3339_millis(std::time::SystemTime::now()).to_string()),
            );
        }

        Value::Object(map)
    }

    /// Dispatches `event` through every registered handler in priority
    /// order, folding the chain into a single [`HookResult`] per the action
    /// precedence `deny > ask_user > inject_context > modify > continue`.
    #[instrument(skip(self, data), fields(event = %event.as_ref()))]
    pub async fn emit(&self, event: impl AsRef<str>, data: Value) -> HookResult {
        let event = event.as_ref();
        let sequence = self.inner.next_sequence();
        let mut current_data = self.build_envelope(data, sequence, true);

        let handlers: Vec<Arc<dyn HookHandler>> = {
            let table = self.inner.handlers.lock();
            table
                .get(event)
                .map(|list| list.iter().map(|h| h.handler.clone()).collect())
                .unwrap_or_default()
        };
        let names: Vec<String> = {
            let table = self.inner.handlers.lock();
            table
                .get(event)
                .map(|list| list.iter().map(|h| h.name.clone()).collect())
                .unwrap_or_default()
        };

        let mut pending_special: Option<HookResult> = None;

        for (handler, name) in handlers.into_iter().zip(names.into_iter()) {
            let outcome = handler.call(event, current_data.clone()).await;

            let result = match outcome {
                Some(r) => r,
                None => {
                    warn!(handler = %name, "hook handler returned no result; treated as continue");
                    continue;
                }
            };

            match &result {
                HookResult::Deny { .. } => return result,
                HookResult::Modify { data } => {
                    current_data = data.clone();
                }
                HookResult::InjectContext { .. } => {
                    pending_special = fold_inject_context(pending_special, result);
                }
                HookResult::AskUser { .. } => {
                    pending_special = Some(result);
                }
                HookResult::Continue { .. } => {}
            }
        }

        pending_special.unwrap_or_else(|| HookResult::continue_with(current_data))
    }

    /// Gathers non-null `data` returns from each handler, subject to a
    /// per-handler `timeout`. Handlers that time out or fail are skipped and
    /// logged. Shares the sequence counter with [`HookRegistry::emit`] but,
    /// intentionally, never stamps `timestamp` — `emit_and_collect` is an
    /// out-of-band query channel.
    #[instrument(skip(self, data), fields(event = %event.as_ref()))]
    pub async fn emit_and_collect(
        &self,
        event: impl AsRef<str>,
        data: Value,
        timeout: Duration,
    ) -> Vec<Value> {
        let event = event.as_ref();
        let sequence = self.inner.next_sequence();
        let envelope = self.build_envelope(data, sequence, false);

        let handlers: Vec<(Arc<dyn HookHandler>, String)> = {
            let table = self.inner.handlers.lock();
            table
                .get(event)
                .map(|list| {
                    list.iter()
                        .map(|h| (h.handler.clone(), h.name.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut results = Vec::new();
        for (handler, name) in handlers {
            match tokio::time::timeout(timeout, handler.call(event, envelope.clone())).await {
                Ok(Some(HookResult::Continue { data, .. })) if !data.is_null() => results.push(data),
                Ok(Some(_)) | Ok(None) => {}
                Err(_) => {
                    error!(handler = %name, "hook handler timed out during emit_and_collect");
                }
            }
        }
        results
    }
}

/// Applies the `ask_user`-beats-`inject_context` rule: once `ask_user` has
/// been recorded it is frozen; a fresh `inject_context` before that point
/// accumulates by concatenation; a later `ask_user` always overrides a
/// previously recorded `inject_context`, independent of arrival order.
fn fold_inject_context(pending: Option<HookResult>, new: HookResult) -> Option<HookResult> {
    match pending {
        Some(HookResult::AskUser { .. }) => pending,
        Some(HookResult::InjectContext {
            content: existing_content,
            role,
            ephemeral,
            append_to_last_tool_result,
        }) => {
            if let HookResult::InjectContext { content, .. } = &new {
                Some(HookResult::InjectContext {
                    content: format!("{existing_content}\n\n{content}"),
                    role,
                    ephemeral,
                    append_to_last_tool_result,
                })
            } else {
                Some(new)
            }
        }
        _ => Some(new),
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}
