use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry in a mount plan, referring to a single module with optional
/// config and source hint.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ModuleSpec {
    pub module: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ModuleSpec {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            config: None,
            source: None,
        }
    }
}

/// The `session` section of a mount plan.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionSpec {
    pub orchestrator: ModuleSpec,
    pub context: ModuleSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub injection_budget_per_turn: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub injection_size_limit: Option<u64>,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub raw_debug: bool,
}

/// A structured descriptor naming the modules to load and where to mount
/// them, per spec §3 / §6. Derives `Serialize`/`Deserialize`/`JsonSchema` so
/// an embedding app can load it from JSON, TOML, or YAML with no kernel-side
/// format-specific parsing code.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MountPlan {
    pub session: SessionSpec,
    #[serde(default)]
    pub providers: Vec<ModuleSpec>,
    #[serde(default)]
    pub tools: Vec<ModuleSpec>,
    #[serde(default)]
    pub hooks: Vec<ModuleSpec>,
    /// App-opaque mapping from agent name to config overlay. The kernel
    /// stores and forwards this but never interprets it.
    #[serde(default)]
    pub agents: HashMap<String, Value>,
}

/// Severity of a single validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ValidationFinding {
    pub path: String,
    pub message: String,
    pub severity: Severity,
}

/// Result of [`validate_mount_plan`]. A pure function of its input: identical
/// plans yield identical results.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub passed: bool,
    pub errors: Vec<ValidationFinding>,
    pub warnings: Vec<ValidationFinding>,
    pub checks: Vec<String>,
}

/// Structurally validates a mount plan before any module is loaded. Because
/// [`MountPlan`] is a typed `serde` struct, most of the reference
/// implementation's shape checks (is-a-mapping, has-required-keys,
/// module-spec-has-a-string-`module`) are already enforced by the type
/// system at deserialization time; this function performs the checks that
/// *do* require semantic validation beyond what the type alone guarantees
/// (non-empty `module` identifiers) and produces the same
/// `{passed, errors, warnings, checks}` shape the spec calls for.
pub fn validate_mount_plan(plan: &MountPlan) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut checks = Vec::new();

    checks.push("session.orchestrator.module non-empty".to_string());
    if plan.session.orchestrator.module.trim().is_empty() {
        errors.push(ValidationFinding {
            path: "session.orchestrator.module".to_string(),
            message: "must be a non-empty string".to_string(),
            severity: Severity::Error,
        });
    }

    checks.push("session.context.module non-empty".to_string());
    if plan.session.context.module.trim().is_empty() {
        errors.push(ValidationFinding {
            path: "session.context.module".to_string(),
            message: "must be a non-empty string".to_string(),
            severity: Severity::Error,
        });
    }

    for (section, specs) in [
        ("providers", &plan.providers),
        ("tools", &plan.tools),
        ("hooks", &plan.hooks),
    ] {
        checks.push(format!("{section}[] module specs non-empty"));
        for (i, spec) in specs.iter().enumerate() {
            if spec.module.trim().is_empty() {
                errors.push(ValidationFinding {
                    path: format!("{section}[{i}].module"),
                    message: "must be a non-empty string".to_string(),
                    severity: Severity::Error,
                });
            }
        }
    }

    let _ = &warnings; // reserved for unknown-top-level-key warnings once a raw Value is threaded through

    ValidationResult {
        passed: errors.is_empty(),
        errors,
        warnings,
        checks,
    }
}

/// Validates a mount plan supplied as a raw [`Value`], surfacing unknown
/// top-level keys as warnings (never errors) before falling back to
/// [`validate_mount_plan`] for the structural checks. This is the entry
/// point an app parsing an untyped JSON/TOML/YAML document should use.
pub fn validate_raw_mount_plan(raw: &Value) -> ValidationResult {
    const KNOWN_KEYS: &[&str] = &["session", "providers", "tools", "hooks", "agents"];

    let mut warnings = Vec::new();
    if let Value::Object(map) = raw {
        for key in map.keys() {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                warnings.push(ValidationFinding {
                    path: key.clone(),
                    message: "unknown top-level key".to_string(),
                    severity: Severity::Warning,
                });
            }
        }
    } else {
        return ValidationResult {
            passed: false,
            errors: vec![ValidationFinding {
                path: "$".to_string(),
                message: "mount plan must be a mapping".to_string(),
                severity: Severity::Error,
            }],
            warnings,
            checks: vec!["$ is a mapping".to_string()],
        };
    }

    match serde_json::from_value::<MountPlan>(raw.clone()) {
        Ok(plan) => {
            let mut result = validate_mount_plan(&plan);
            result.warnings.extend(warnings);
            result
        }
        Err(err) => ValidationResult {
            passed: false,
            errors: vec![ValidationFinding {
                path: "$".to_string(),
                message: err.to_string(),
                severity: Severity::Error,
            }],
            warnings,
            checks: vec!["$ matches mount plan schema".to_string()],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_plan() -> MountPlan {
        MountPlan {
            session: SessionSpec {
                orchestrator: ModuleSpec::new("loop-basic"),
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

    #[test]
    fn minimal_plan_passes() {
        let result = validate_mount_plan(&minimal_plan());
        assert!(result.passed);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn empty_orchestrator_module_is_an_error() {
        let mut plan = minimal_plan();
        plan.session.orchestrator.module = "".to_string();
        let result = validate_mount_plan(&plan);
        assert!(!result.passed);
        assert_eq!(result.errors[0].path, "session.orchestrator.module");
    }

    #[test]
    fn empty_provider_module_names_indexed_path() {
        let mut plan = minimal_plan();
        plan.providers.push(ModuleSpec::new(""));
        let result = validate_mount_plan(&plan);
        assert!(!result.passed);
        assert_eq!(result.errors[0].path, "providers[0].module");
    }

    #[test]
    fn validation_is_pure() {
        let plan = minimal_plan();
        let a = validate_mount_plan(&plan);
        let b = validate_mount_plan(&plan);
        assert_eq!(a.passed, b.passed);
        assert_eq!(a.errors.len(), b.errors.len());
        assert_eq!(a.checks, b.checks);
    }

    #[test]
    fn raw_plan_missing_context_fails_with_named_path() {
        let raw = serde_json::json!({
            "session": {
                "orchestrator": {"module": "loop-basic"}
            }
        });
        let result = validate_raw_mount_plan(&raw);
        assert!(!result.passed);
        assert!(!result.errors.is_empty());
    }

    #[test]
    fn raw_plan_unknown_top_level_key_is_a_warning_not_an_error() {
        let raw = serde_json::json!({
            "session": {
                "orchestrator": {"module": "loop-basic"},
                "context": {"module": "mem"}
            },
            "something_new": true
        });
        let result = validate_raw_mount_plan(&raw);
        assert!(result.passed);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].path, "something_new");
    }

    #[test]
    fn raw_plan_non_mapping_is_an_error() {
        let raw = serde_json::json!([1, 2, 3]);
        let result = validate_raw_mount_plan(&raw);
        assert!(!result.passed);
        assert_eq!(result.errors[0].path, "$");
    }

    #[test]
    fn agents_section_is_not_validated_as_module_list() {
        let mut plan = minimal_plan();
        plan.agents
            .insert("coder".to_string(), serde_json::json!({"anything": "goes"}));
        let result = validate_mount_plan(&plan);
        assert!(result.passed);
    }
}
