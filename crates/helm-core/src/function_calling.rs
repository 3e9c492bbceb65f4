//! Turning model completions into agent actions.
//!
//! Two tool names are reserved and never dispatched to the registry:
//! `finish` ends the task and `delegate` hands a sub-task to another agent
//! class.

use serde_json::{json, Map, Value};
use tracing::warn;

use helm_contracts::{
    error::FunctionCallError,
    execution::AgentAction,
    message::{Completion, ToolCall},
    tool::{ParamType, ToolDefinition, ToolSchema},
};

pub const FINISH_TOOL: &str = "finish";
pub const DELEGATE_TOOL: &str = "delegate";

/// Normalize tool-call arguments into a JSON object.
///
/// Providers send either an object or a JSON-encoded string. `null` is
/// treated as no arguments.
pub fn parse_arguments(raw: &Value) -> Result<Map<String, Value>, FunctionCallError> {
    match raw {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map.clone()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(FunctionCallError::Validation {
                reason: format!("arguments must be a JSON object, got {other}"),
            }),
            Err(e) => Err(FunctionCallError::Validation {
                reason: format!("failed to parse tool call arguments {s:?}: {e}"),
            }),
        },
        other => Err(FunctionCallError::Validation {
            reason: format!("arguments must be a JSON object, got {other}"),
        }),
    }
}

/// Convert one model tool call into an action.
///
/// `thought` is the assistant text that accompanied the call.
pub fn tool_call_to_action(
    call: &ToolCall,
    tools: &[ToolDefinition],
    thought: &str,
) -> Result<AgentAction, FunctionCallError> {
    let mut args = parse_arguments(&call.arguments)?;

    match call.name.as_str() {
        FINISH_TOOL => {
            let message = match args.remove("message") {
                Some(Value::String(s)) => s,
                Some(other) => other.to_string(),
                None => String::new(),
            };
            Ok(AgentAction::Finish { message })
        }
        DELEGATE_TOOL => {
            let agent_class = match args.remove("agent_class") {
                Some(Value::String(s)) if !s.is_empty() => s,
                _ => {
                    return Err(FunctionCallError::Validation {
                        reason: "delegate requires a non-empty 'agent_class' string".to_string(),
                    })
                }
            };
            let inputs = args.remove("inputs").unwrap_or_else(|| json!({}));
            Ok(AgentAction::Delegate { agent_class, inputs })
        }
        name => {
            if !tools.iter().any(|t| t.name == name) {
                return Err(FunctionCallError::NotExists {
                    tool: name.to_string(),
                });
            }
            Ok(AgentAction::ToolCall {
                tool_call_id: call.id.clone(),
                tool_name: name.to_string(),
                parameters: Value::Object(args),
                thought: thought.to_string(),
            })
        }
    }
}

/// Convert a completion into the actions it requests, in order.
///
/// Text without tool calls becomes a single `Message`. A call that cannot be
/// converted becomes an `Error` action in its place so the model sees the
/// problem on its next turn. Only the first call carries the thought.
pub fn response_to_actions(completion: &Completion, tools: &[ToolDefinition]) -> Vec<AgentAction> {
    let content = completion.content.clone().unwrap_or_default();

    if completion.tool_calls.is_empty() {
        return vec![AgentAction::Message { content }];
    }

    completion
        .tool_calls
        .iter()
        .enumerate()
        .map(|(i, call)| {
            let thought = if i == 0 { content.as_str() } else { "" };
            tool_call_to_action(call, tools, thought).unwrap_or_else(|e| {
                warn!(tool = %call.name, error = %e, "model issued an invalid tool call");
                AgentAction::Error {
                    error: e.to_string(),
                    error_type: error_type(&e).to_string(),
                }
            })
        })
        .collect()
}

fn error_type(e: &FunctionCallError) -> &'static str {
    match e {
        FunctionCallError::Validation { .. } => "function_call_validation",
        FunctionCallError::NotExists { .. } => "function_call_not_exists",
    }
}

/// Function-calling schemas for the model collaborator.
pub fn tool_definitions_to_schemas(defs: &[ToolDefinition]) -> Vec<Value> {
    defs.iter().map(ToolDefinition::to_function_schema).collect()
}

/// The definition advertised for the reserved `delegate` call.
pub fn delegate_definition(classes: &[String]) -> ToolDefinition {
    ToolDefinition {
        name: DELEGATE_TOOL.to_string(),
        description: format!(
            "Hand a sub-task to another agent and wait for its result. Available agent classes: {}",
            classes.join(", ")
        ),
        schema: ToolSchema::new()
            .required("agent_class", ParamType::String, "Agent class to run the sub-task")
            .optional("inputs", ParamType::Object, "Inputs for the sub-task"),
        required_permissions: vec![],
    }
}
