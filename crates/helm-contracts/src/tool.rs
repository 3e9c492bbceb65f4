//! Tool definitions, declarative parameter schemas, and the audit pair.
//!
//! A `ToolSchema` is a flat list of `ParamSpec`s. It is rendered to JSON
//! Schema for validation and for function-calling prompts, so the same
//! declaration drives both the registry check and what the model sees.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// JSON type of a single tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    /// The JSON Schema `type` keyword for this parameter type.
    pub fn json_type(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.json_type())
    }
}

/// Declaration of one named parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
}

/// Declarative parameter schema for a tool.
///
/// ```rust,ignore
/// let schema = ToolSchema::new()
///     .required("command", ParamType::String, "Shell command to run")
///     .optional("timeout_secs", ParamType::Integer, "Upper bound on runtime");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    #[serde(default)]
    pub params: Vec<ParamSpec>,
}

impl ToolSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(
        mut self,
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            param_type,
            required: true,
            description: description.into(),
        });
        self
    }

    pub fn optional(
        mut self,
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            param_type,
            required: false,
            description: description.into(),
        });
        self
    }

    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Render as a JSON Schema object document.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for p in &self.params {
            let mut prop = Map::new();
            prop.insert("type".to_string(), json!(p.param_type.json_type()));
            if !p.description.is_empty() {
                prop.insert("description".to_string(), json!(p.description));
            }
            properties.insert(p.name.clone(), Value::Object(prop));
            if p.required {
                required.push(json!(p.name));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// A registered tool as seen by callers. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub schema: ToolSchema,
    /// Permissions an agent must hold, in addition to the tool name itself.
    #[serde(default)]
    pub required_permissions: Vec<String>,
}

impl ToolDefinition {
    /// The function-calling description handed to the model collaborator.
    pub fn to_function_schema(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.schema.to_json_schema(),
            }
        })
    }
}

/// What a tool body returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub output: String,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub data: Value,
}

impl ToolOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            exit_code: None,
            data: Value::Null,
        }
    }

    /// A completed run that reports failure, e.g. a non-zero exit code.
    pub fn unsuccessful(output: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self {
            success: false,
            output: output.into(),
            exit_code,
            data: Value::Null,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = Some(exit_code);
        self
    }
}

/// Audit record of one tool invocation. Never modified after it is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUsage {
    pub id: String,
    pub tool_type: String,
    pub params: Value,
    pub success: bool,
    #[serde(default)]
    pub error_message: Option<String>,
    pub execution_time_secs: f64,
    #[serde(default)]
    pub agent_id: Option<String>,
    /// Id of the paired `ToolResult`.
    pub result_id: String,
    pub created_at: DateTime<Utc>,
}

/// Output half of the audit pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub id: String,
    pub usage_id: String,
    pub result_data: Value,
    pub output_text: String,
    #[serde(default)]
    pub exit_code: Option<i32>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of an agent-level tool invocation.
///
/// Gate failures (not ready, missing permission) are returned as
/// `Err(AgentError)` by the wrapper. `Rejected` exists so the controller can
/// record such a failure as a step observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolInvocation {
    Completed { output: ToolOutput },
    ConfirmationRequired { confirmation_id: String, message: String },
    Failed { error: String, error_type: String },
    Rejected { error: String, error_type: String },
}

impl ToolInvocation {
    pub fn status(&self) -> &'static str {
        match self {
            ToolInvocation::Completed { .. } => "completed",
            ToolInvocation::ConfirmationRequired { .. } => "confirmation_required",
            ToolInvocation::Failed { .. } => "failed",
            ToolInvocation::Rejected { .. } => "rejected",
        }
    }

    /// True only when the tool ran and reported success.
    pub fn is_success(&self) -> bool {
        matches!(self, ToolInvocation::Completed { output } if output.success)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ToolInvocation::Failed { error, .. } | ToolInvocation::Rejected { error, .. } => {
                Some(error)
            }
            _ => None,
        }
    }

    /// Text fed back to the model as the tool result.
    pub fn observation_text(&self) -> String {
        match self {
            ToolInvocation::Completed { output } => output.output.clone(),
            ToolInvocation::ConfirmationRequired { message, .. } => message.clone(),
            ToolInvocation::Failed { error, error_type }
            | ToolInvocation::Rejected { error, error_type } => {
                format!("[{error_type}] {error}")
            }
        }
    }
}
