//! `ToolRegistry`: named, schema-validated tool execution with audit
//! recording.
//!
//! Execution pipeline for one call:
//!
//! 1. **Lookup** by name. An unknown name is `ToolError::NotFound` and is
//!    never recorded.
//! 2. **Validate** the parameters against the compiled JSON Schema. Every
//!    violation is collected, with its instance path, into one
//!    `ToolError::Validation`.
//! 3. **Run** the tool body. A panic inside the body is caught and reported
//!    as `ToolError::Execution`.
//! 4. **Record** a `ToolUsage`/`ToolResult` pair when asked to and a store is
//!    attached, whatever the outcome of steps 2 and 3. A recording failure is
//!    logged and never changes the returned result.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use helm_contracts::{
    error::ToolError,
    store::Record,
    tool::{ToolDefinition, ToolOutput, ToolResult, ToolSchema, ToolUsage},
};
use helm_core::traits::{RecordStore, ToolDispatcher};

/// A tool body over raw JSON parameters.
pub type ToolFn = Box<dyn Fn(&Value) -> Result<ToolOutput, ToolError> + Send + Sync>;

/// A typed parameter struct that declares its own schema.
///
/// ```rust,ignore
/// #[derive(Deserialize)]
/// struct EchoParams { text: String }
///
/// impl ToolParams for EchoParams {
///     fn schema() -> ToolSchema {
///         ToolSchema::new().required("text", ParamType::String, "Text to echo")
///     }
/// }
///
/// registry.register("echo", "Echo text back", |p: EchoParams| Ok(ToolOutput::ok(p.text)))?;
/// ```
pub trait ToolParams: DeserializeOwned {
    fn schema() -> ToolSchema;
}

struct RegisteredTool {
    definition: ToolDefinition,
    validator: jsonschema::Validator,
    run: ToolFn,
}

/// The tool registry. Built once at startup; definitions never change after
/// registration.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
    store: Option<Arc<dyn RecordStore>>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .field("recording", &self.store.is_some())
            .finish()
    }
}

impl ToolRegistry {
    /// A registry that never records usage.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that records every execution with `record = true` to `store`.
    pub fn with_store(store: Arc<dyn RecordStore>) -> Self {
        Self {
            tools: BTreeMap::new(),
            store: Some(store),
        }
    }

    /// Register a tool whose parameters deserialize into `P`.
    pub fn register<P, F>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        f: F,
    ) -> Result<(), ToolError>
    where
        P: ToolParams + 'static,
        F: Fn(P) -> Result<ToolOutput, ToolError> + Send + Sync + 'static,
    {
        self.register_with_permissions::<P, F>(name, description, Vec::new(), f)
    }

    /// `register`, plus permissions an agent must hold besides the tool name.
    pub fn register_with_permissions<P, F>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        required_permissions: Vec<String>,
        f: F,
    ) -> Result<(), ToolError>
    where
        P: ToolParams + 'static,
        F: Fn(P) -> Result<ToolOutput, ToolError> + Send + Sync + 'static,
    {
        let name = name.into();
        let tool = name.clone();
        let run = move |params: &Value| {
            let typed: P = serde_json::from_value(params.clone()).map_err(|e| {
                ToolError::Validation {
                    tool: tool.clone(),
                    reason: e.to_string(),
                }
            })?;
            f(typed)
        };
        self.register_tool(name, description, run, Some(P::schema()), required_permissions)
    }

    /// Register a tool over raw JSON parameters.
    ///
    /// With no schema the tool accepts any JSON object.
    pub fn register_tool<F>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        f: F,
        schema: Option<ToolSchema>,
        required_permissions: Vec<String>,
    ) -> Result<(), ToolError>
    where
        F: Fn(&Value) -> Result<ToolOutput, ToolError> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.tools.contains_key(&name) {
            warn!(tool = %name, "duplicate tool registration rejected");
            return Err(ToolError::AlreadyRegistered { tool: name });
        }

        let schema = schema.unwrap_or_default();
        let validator = compile_schema(&name, &schema)?;

        let definition = ToolDefinition {
            name: name.clone(),
            description: description.into(),
            schema,
            required_permissions,
        };
        info!(
            tool = %name,
            params = definition.schema.params.len(),
            required_permissions = ?definition.required_permissions,
            "tool registered"
        );
        self.tools.insert(
            name,
            RegisteredTool {
                definition,
                validator,
                run: Box::new(f),
            },
        );
        Ok(())
    }

    pub fn get_tool(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name).map(|t| &t.definition)
    }

    /// Registered tool names, sorted.
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Definitions of every registered tool, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    // ── Pipeline steps ────────────────────────────────────────────────────────

    fn validate(tool: &RegisteredTool, parameters: &Value) -> Result<(), ToolError> {
        let violations: Vec<String> = tool
            .validator
            .iter_errors(parameters)
            .map(|error| {
                let path = error.instance_path.to_string();
                let path = if path.is_empty() { "/".to_string() } else { path };
                format!("at {path}: {error}")
            })
            .collect();

        if violations.is_empty() {
            return Ok(());
        }
        Err(ToolError::Validation {
            tool: tool.definition.name.clone(),
            reason: violations.join("; "),
        })
    }

    fn invoke(tool: &RegisteredTool, parameters: &Value) -> Result<ToolOutput, ToolError> {
        match panic::catch_unwind(AssertUnwindSafe(|| (tool.run)(parameters))) {
            Ok(result) => result,
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "tool panicked".to_string());
                Err(ToolError::Execution {
                    tool: tool.definition.name.clone(),
                    reason,
                })
            }
        }
    }

    fn record_execution(
        &self,
        name: &str,
        parameters: &Value,
        agent_id: Option<&str>,
        outcome: &Result<ToolOutput, ToolError>,
        execution_time_secs: f64,
    ) {
        let Some(store) = &self.store else {
            return;
        };

        let usage_id = Uuid::new_v4().to_string();
        let result_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let (success, error_message, output_text, exit_code, result_data) = match outcome {
            Ok(output) => (
                output.success,
                None,
                output.output.clone(),
                output.exit_code,
                json!({
                    "success": output.success,
                    "output": output.output,
                    "exit_code": output.exit_code,
                    "data": output.data,
                }),
            ),
            Err(e) => (
                false,
                Some(e.to_string()),
                e.to_string(),
                None,
                json!({
                    "success": false,
                    "error": e.to_string(),
                    "error_type": e.kind(),
                }),
            ),
        };

        let usage = ToolUsage {
            id: usage_id.clone(),
            tool_type: name.to_string(),
            params: parameters.clone(),
            success,
            error_message,
            execution_time_secs,
            agent_id: agent_id.map(str::to_string),
            result_id: result_id.clone(),
            created_at: now,
        };
        let result = ToolResult {
            id: result_id,
            usage_id: usage_id.clone(),
            result_data,
            output_text,
            exit_code,
            created_at: now,
        };

        if let Err(e) = store.upsert(Record::ToolUsage(usage)) {
            warn!(tool = %name, error = %e, "failed to record tool usage");
            return;
        }
        if let Err(e) = store.upsert(Record::ToolResult(result)) {
            warn!(tool = %name, usage_id = %usage_id, error = %e, "failed to record tool result");
            return;
        }
        debug!(tool = %name, usage_id = %usage_id, success, "tool execution recorded");
    }
}

/// Check the declared parameter list and compile it to a validator.
fn compile_schema(tool: &str, schema: &ToolSchema) -> Result<jsonschema::Validator, ToolError> {
    let mut seen = HashSet::new();
    for param in &schema.params {
        if param.name.trim().is_empty() {
            return Err(ToolError::InvalidSchema {
                tool: tool.to_string(),
                reason: "parameter with an empty name".to_string(),
            });
        }
        if !seen.insert(param.name.as_str()) {
            return Err(ToolError::InvalidSchema {
                tool: tool.to_string(),
                reason: format!("parameter '{}' declared twice", param.name),
            });
        }
    }

    jsonschema::validator_for(&schema.to_json_schema()).map_err(|e| ToolError::InvalidSchema {
        tool: tool.to_string(),
        reason: e.to_string(),
    })
}

// ── ToolDispatcher impl ───────────────────────────────────────────────────────

impl ToolDispatcher for ToolRegistry {
    fn definition(&self, name: &str) -> Option<ToolDefinition> {
        self.get_tool(name).cloned()
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        ToolRegistry::definitions(self)
    }

    fn execute_tool(
        &self,
        name: &str,
        parameters: &Value,
        agent_id: Option<&str>,
        record: bool,
    ) -> Result<ToolOutput, ToolError> {
        // ── Step 1: Lookup ────────────────────────────────────────────────────
        let Some(tool) = self.tools.get(name) else {
            warn!(tool = %name, "tool not found");
            return Err(ToolError::NotFound {
                tool: name.to_string(),
            });
        };

        let started = Instant::now();

        // ── Steps 2–3: Validate, then run ─────────────────────────────────────
        let outcome = Self::validate(tool, parameters).and_then(|()| {
            debug!(tool = %name, agent_id = ?agent_id, "executing tool");
            Self::invoke(tool, parameters)
        });
        let elapsed = started.elapsed();
        let duration_ms = elapsed.as_millis() as u64;

        match &outcome {
            Ok(output) => info!(
                tool = %name,
                agent_id = ?agent_id,
                success = output.success,
                duration_ms,
                "tool executed"
            ),
            Err(e) => error!(
                tool = %name,
                agent_id = ?agent_id,
                error_type = e.kind(),
                error = %e,
                duration_ms,
                "tool execution failed"
            ),
        }

        // ── Step 4: Record ────────────────────────────────────────────────────
        if record {
            self.record_execution(name, parameters, agent_id, &outcome, elapsed.as_secs_f64());
        }
        outcome
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde::Deserialize;

    use helm_contracts::{
        store::{RecordFilter, RecordKind},
        tool::ParamType,
    };
    use helm_store::InMemoryRecordStore;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct AddParams {
        a: i64,
        b: i64,
    }

    impl ToolParams for AddParams {
        fn schema() -> ToolSchema {
            ToolSchema::new()
                .required("a", ParamType::Integer, "Left operand")
                .required("b", ParamType::Integer, "Right operand")
        }
    }

    fn add(p: AddParams) -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::ok((p.a + p.b).to_string()))
    }

    fn recording_registry() -> (ToolRegistry, Arc<InMemoryRecordStore>) {
        let store = Arc::new(InMemoryRecordStore::new());
        let mut registry = ToolRegistry::with_store(store.clone());
        registry.register("add", "Add two integers", add).unwrap();
        (registry, store)
    }

    fn usages(store: &InMemoryRecordStore) -> Vec<ToolUsage> {
        store
            .query(&RecordFilter::kind(RecordKind::ToolUsage))
            .unwrap()
            .into_iter()
            .filter_map(Record::into_tool_usage)
            .collect()
    }

    fn results(store: &InMemoryRecordStore) -> Vec<ToolResult> {
        store
            .query(&RecordFilter::kind(RecordKind::ToolResult))
            .unwrap()
            .into_iter()
            .filter_map(Record::into_tool_result)
            .collect()
    }

    // ── Registration ──────────────────────────────────────────────────────────

    #[test]
    fn typed_registration_derives_schema() {
        let (registry, _) = recording_registry();
        let def = registry.get_tool("add").unwrap();
        assert_eq!(def.schema.params.len(), 2);
        assert!(def.schema.param("a").unwrap().required);
        assert_eq!(def.schema.to_json_schema()["properties"]["b"]["type"], "integer");
    }

    #[test]
    fn duplicate_registration_keeps_the_first() {
        let (mut registry, _) = recording_registry();
        let err = registry
            .register_tool("add", "impostor", |_| Ok(ToolOutput::ok("impostor")), None, vec![])
            .unwrap_err();
        assert_eq!(err, ToolError::AlreadyRegistered { tool: "add".into() });

        let out = registry.execute_tool("add", &json!({"a": 1, "b": 2}), None, false).unwrap();
        assert_eq!(out.output, "3");
        assert_eq!(registry.get_tool("add").unwrap().description, "Add two integers");
    }

    #[test]
    fn malformed_schemas_are_rejected() {
        let mut registry = ToolRegistry::new();
        let twice = ToolSchema::new()
            .required("x", ParamType::String, "")
            .optional("x", ParamType::Integer, "");
        let err = registry
            .register_tool("twice", "", |_| Ok(ToolOutput::ok("")), Some(twice), vec![])
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidSchema { .. }));

        let blank = ToolSchema::new().required(" ", ParamType::String, "");
        let err = registry
            .register_tool("blank", "", |_| Ok(ToolOutput::ok("")), Some(blank), vec![])
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidSchema { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn names_and_definitions_are_sorted() {
        let mut registry = ToolRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry
                .register_tool(name, "", |_| Ok(ToolOutput::ok("")), None, vec![])
                .unwrap();
        }
        assert_eq!(registry.tool_names(), vec!["alpha", "mid", "zeta"]);
        let names: Vec<_> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn required_permissions_are_part_of_the_definition() {
        let mut registry = ToolRegistry::new();
        registry
            .register_with_permissions("add", "", vec!["math".to_string()], add)
            .unwrap();
        let def = ToolDispatcher::definition(&registry, "add").unwrap();
        assert_eq!(def.required_permissions, vec!["math".to_string()]);
    }

    // ── Execution ─────────────────────────────────────────────────────────────

    #[test]
    fn unknown_tool_is_not_found_and_not_recorded() {
        let (registry, store) = recording_registry();
        let err = registry.execute_tool("nope", &json!({}), Some("a"), true).unwrap_err();
        assert_eq!(err, ToolError::NotFound { tool: "nope".into() });
        assert!(usages(&store).is_empty());
    }

    #[test]
    fn validation_reports_every_violation_with_its_path() {
        let (registry, _) = recording_registry();
        let err = registry
            .execute_tool("add", &json!({"a": "one"}), None, false)
            .unwrap_err();
        match err {
            ToolError::Validation { tool, reason } => {
                assert_eq!(tool, "add");
                assert!(reason.contains("at /a:"), "{reason}");
                assert!(reason.contains("\"b\""), "{reason}");
                assert_eq!(reason.matches("; ").count(), 1, "{reason}");
            }
            other => panic!("expected Validation, got {:?}", other),
        }
    }

    #[test]
    fn invalid_parameters_never_reach_the_body() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut registry = ToolRegistry::new();
        registry
            .register("add", "", move |p: AddParams| {
                counter.fetch_add(1, Ordering::SeqCst);
                add(p)
            })
            .unwrap();

        assert!(registry.execute_tool("add", &json!({"a": 1}), None, false).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(registry.execute_tool("add", &json!({"a": 1, "b": 1}), None, false).is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn schemaless_tool_accepts_any_object() {
        let mut registry = ToolRegistry::new();
        registry
            .register_tool("echo", "", |p| Ok(ToolOutput::ok(p.to_string())), None, vec![])
            .unwrap();
        let out = registry.execute_tool("echo", &json!({"anything": [1, 2]}), None, false).unwrap();
        assert!(out.output.contains("anything"));
        assert!(registry.execute_tool("echo", &json!("not an object"), None, false).is_err());
    }

    #[test]
    fn panicking_body_is_an_execution_error() {
        let mut registry = ToolRegistry::new();
        registry
            .register_tool("boom", "", |_| panic!("kaboom"), None, vec![])
            .unwrap();
        match registry.execute_tool("boom", &json!({}), None, false).unwrap_err() {
            ToolError::Execution { tool, reason } => {
                assert_eq!(tool, "boom");
                assert_eq!(reason, "kaboom");
            }
            other => panic!("expected Execution, got {:?}", other),
        }
    }

    // ── Recording ─────────────────────────────────────────────────────────────

    #[test]
    fn success_writes_a_linked_usage_result_pair() {
        let (registry, store) = recording_registry();
        registry.execute_tool("add", &json!({"a": 2, "b": 3}), Some("agent-1"), true).unwrap();

        let usages = usages(&store);
        let results = results(&store);
        assert_eq!(usages.len(), 1);
        assert_eq!(results.len(), 1);

        let usage = &usages[0];
        assert!(usage.success);
        assert_eq!(usage.tool_type, "add");
        assert_eq!(usage.agent_id.as_deref(), Some("agent-1"));
        assert_eq!(usage.params["a"], 2);
        assert_eq!(usage.result_id, results[0].id);
        assert_eq!(results[0].usage_id, usage.id);
        assert_eq!(results[0].output_text, "5");
        assert!(store.verify_integrity());
    }

    #[test]
    fn failures_are_recorded_too() {
        let (mut registry, store) = recording_registry();
        registry
            .register_tool(
                "fail",
                "",
                |_| Err(ToolError::Execution { tool: "fail".into(), reason: "disk full".into() }),
                None,
                vec![],
            )
            .unwrap();

        assert!(registry.execute_tool("fail", &json!({}), None, true).is_err());
        assert!(registry.execute_tool("add", &json!({}), None, true).is_err());

        let usages = usages(&store);
        assert_eq!(usages.len(), 2);
        assert!(usages.iter().all(|u| !u.success));
        assert!(usages.iter().all(|u| u.error_message.is_some()));

        let mut kinds: Vec<_> = results(&store)
            .into_iter()
            .map(|r| r.result_data["error_type"].as_str().unwrap().to_string())
            .collect();
        kinds.sort();
        assert_eq!(kinds, vec!["execution", "validation"]);
    }

    #[test]
    fn record_flag_and_missing_store_skip_recording() {
        let (registry, store) = recording_registry();
        registry.execute_tool("add", &json!({"a": 1, "b": 1}), None, false).unwrap();
        assert!(store.is_empty().unwrap());

        let mut bare = ToolRegistry::new();
        bare.register("add", "", add).unwrap();
        assert_eq!(bare.execute_tool("add", &json!({"a": 1, "b": 1}), None, true).unwrap().output, "2");
    }
}
