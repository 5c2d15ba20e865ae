use crate::loader::ModuleManifest;

/// Severity of a single validator check result. Warnings never cause
/// failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckSeverity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub check_name: String,
    pub passed: bool,
    pub message: String,
    pub severity: CheckSeverity,
}

impl CheckResult {
    fn pass(check_name: &str, message: impl Into<String>) -> Self {
        Self {
            check_name: check_name.to_string(),
            passed: true,
            message: message.into(),
            severity: CheckSeverity::Info,
        }
    }

    fn fail(check_name: &str, message: impl Into<String>, severity: CheckSeverity) -> Self {
        Self {
            check_name: check_name.to_string(),
            passed: false,
            message: message.into(),
            severity,
        }
    }
}

/// The kind of capability contract to validate a candidate module against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Provider,
    Tool,
    Hook,
    Orchestrator,
    Context,
}

impl ModuleKind {
    fn label(&self) -> &'static str {
        match self {
            ModuleKind::Provider => "provider",
            ModuleKind::Tool => "tool",
            ModuleKind::Hook => "hook",
            ModuleKind::Orchestrator => "orchestrator",
            ModuleKind::Context => "context",
        }
    }
}

/// Validates a statically compiled, in-process candidate module by asserting
/// it implements the relevant capability trait, via the supplied
/// compile-time-checked marker rather than runtime introspection. There is
/// no dynamic `importlib`-style loading to inspect in a statically typed,
/// ahead-of-time-compiled language, so "artifact is importable and exposes
/// an async `mount(coordinator, config)` entry point with >= 2 parameters"
/// degrades to "the type implements the trait", which the compiler has
/// already enforced by the time this function can be called with
/// `implements_trait = true`.
pub fn validate_inproc_module(kind: ModuleKind, implements_trait: bool) -> Vec<CheckResult> {
    let label = kind.label();
    vec![if implements_trait {
        CheckResult::pass(
            "implements-capability-trait",
            format!("type implements the {label} capability trait"),
        )
    } else {
        CheckResult::fail(
            "implements-capability-trait",
            format!("type does not implement the {label} capability trait"),
            CheckSeverity::Error,
        )
    }]
}

/// Validates a `grpc`/`native`/`wasm` candidate module by parsing its
/// manifest and confirming it names a supported transport. Entry-point and
/// signature checking for these transports is deferred to load time, where
/// a missing or malformed remote spec surfaces as a
/// [`crate::error::KernelError::ModuleLoad`] with context (§4.7).
pub fn validate_remote_manifest(raw_manifest: &str) -> Vec<CheckResult> {
    let mut checks = Vec::new();

    match serde_json::from_str::<ModuleManifest>(raw_manifest) {
        Ok(manifest) => {
            checks.push(CheckResult::pass(
                "manifest-parses",
                "manifest parsed successfully",
            ));
            checks.push(CheckResult::pass(
                "manifest-names-supported-transport",
                format!("transport = {:?}", manifest.transport),
            ));
        }
        Err(err) => {
            checks.push(CheckResult::fail(
                "manifest-parses",
                format!("manifest failed to parse: {err}"),
                CheckSeverity::Error,
            ));
        }
    }

    checks
}
