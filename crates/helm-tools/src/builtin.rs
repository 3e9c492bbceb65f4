//! Built-in tools available to every helm runtime.
//!
//! | Tool          | Effect                                              |
//! |---------------|-----------------------------------------------------|
//! | `think`       | Logs a thought. No side effects.                    |
//! | `finish`      | Returns the final message for the user.             |
//! | `run_command` | Runs a shell command and captures its output.       |
//! | `read_file`   | Reads a text file, optionally a 1-based line range. |

use std::fs;
use std::process::Command;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use helm_contracts::{
    error::ToolError,
    tool::{ParamType, ToolOutput, ToolSchema},
};

use crate::registry::{ToolParams, ToolRegistry};

// ── think ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ThinkParams {
    pub thought: String,
}

impl ToolParams for ThinkParams {
    fn schema() -> ToolSchema {
        ToolSchema::new().required("thought", ParamType::String, "The thought to log.")
    }
}

fn think(p: ThinkParams) -> Result<ToolOutput, ToolError> {
    info!(thought = %p.thought, "agent thought");
    Ok(ToolOutput::ok(p.thought.clone()).with_data(json!({ "thought": p.thought })))
}

// ── finish ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct FinishParams {
    pub message: String,
    /// "true", "false" or "partial".
    #[serde(default)]
    pub task_completed: Option<String>,
}

impl ToolParams for FinishParams {
    fn schema() -> ToolSchema {
        ToolSchema::new()
            .required("message", ParamType::String, "Final message to send to the user.")
            .optional(
                "task_completed",
                ParamType::String,
                "Whether the task was completed: true, false or partial.",
            )
    }
}

fn finish(p: FinishParams) -> Result<ToolOutput, ToolError> {
    Ok(ToolOutput::ok(p.message.clone()).with_data(json!({
        "message": p.message,
        "task_completed": p.task_completed,
    })))
}

// ── run_command ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct RunCommandParams {
    pub command: String,
    #[serde(default)]
    pub cwd: Option<String>,
}

impl ToolParams for RunCommandParams {
    fn schema() -> ToolSchema {
        ToolSchema::new()
            .required("command", ParamType::String, "The shell command to execute.")
            .optional("cwd", ParamType::String, "Working directory for the command.")
    }
}

/// Runs through `sh -c`. A non-zero exit is an unsuccessful output, not an
/// error; only a failure to spawn the shell is `ToolError::Execution`.
fn run_command(p: RunCommandParams) -> Result<ToolOutput, ToolError> {
    let mut command = Command::new("sh");
    command.arg("-c").arg(&p.command);
    if let Some(cwd) = &p.cwd {
        command.current_dir(cwd);
    }

    let output = command.output().map_err(|e| ToolError::Execution {
        tool: "run_command".to_string(),
        reason: format!("failed to spawn shell: {e}"),
    })?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    // Killed by a signal.
    let exit_code = output.status.code().unwrap_or(-1);
    debug!(command = %p.command, exit_code, "command finished");

    let data = json!({ "command": p.command, "exit_code": exit_code });
    if exit_code == 0 {
        Ok(ToolOutput::ok(text).with_exit_code(0).with_data(data))
    } else {
        Ok(ToolOutput::unsuccessful(text, Some(exit_code)).with_data(data))
    }
}

// ── read_file ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ReadFileParams {
    pub path: String,
    #[serde(default)]
    pub start_line: Option<usize>,
    #[serde(default)]
    pub end_line: Option<usize>,
}

impl ToolParams for ReadFileParams {
    fn schema() -> ToolSchema {
        ToolSchema::new()
            .required("path", ParamType::String, "Path of the file to read.")
            .optional("start_line", ParamType::Integer, "First line to return, 1-based.")
            .optional("end_line", ParamType::Integer, "Last line to return, inclusive.")
    }
}

fn read_file(p: ReadFileParams) -> Result<ToolOutput, ToolError> {
    let contents = fs::read_to_string(&p.path).map_err(|e| ToolError::Execution {
        tool: "read_file".to_string(),
        reason: format!("cannot read '{}': {e}", p.path),
    })?;
    let lines: Vec<&str> = contents.lines().collect();
    let total = lines.len();

    if let (Some(start), Some(end)) = (p.start_line, p.end_line) {
        if start > end {
            return Err(ToolError::Validation {
                tool: "read_file".to_string(),
                reason: format!("start_line {start} is after end_line {end}"),
            });
        }
    }
    // Ranges past the end of the file come back empty.
    let start = p.start_line.unwrap_or(1).max(1);
    let end = p.end_line.unwrap_or(total).min(total);

    let selected = if start > end {
        String::new()
    } else {
        lines[start - 1..end].join("\n")
    };
    Ok(ToolOutput::ok(selected).with_data(json!({
        "path": p.path,
        "total_lines": total,
        "start_line": start,
        "end_line": end,
    })))
}

/// Install `think`, `finish`, `run_command` and `read_file`.
pub fn register_builtin_tools(registry: &mut ToolRegistry) -> Result<(), ToolError> {
    registry.register(
        "think",
        "Log a thought without obtaining new information or changing anything.",
        think,
    )?;
    registry.register(
        "finish",
        "Signal that the current task is complete and report the outcome.",
        finish,
    )?;
    registry.register(
        "run_command",
        "Execute a shell command and return its combined output and exit code.",
        run_command,
    )?;
    registry.register(
        "read_file",
        "Read a text file, optionally limited to a 1-based inclusive line range.",
        read_file,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;

    use helm_core::traits::ToolDispatcher;

    use super::*;

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        register_builtin_tools(&mut registry).unwrap();
        registry
    }

    fn numbered_file(lines: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for n in 1..=lines {
            writeln!(file, "line {n}").unwrap();
        }
        file
    }

    #[test]
    fn all_builtins_are_registered() {
        assert_eq!(registry().tool_names(), vec!["finish", "read_file", "run_command", "think"]);
        let mut registry = registry();
        assert!(register_builtin_tools(&mut registry).is_err(), "second install collides");
    }

    #[test]
    fn think_echoes_the_thought() {
        let out = registry()
            .execute_tool("think", &json!({"thought": "try the cache"}), None, false)
            .unwrap();
        assert_eq!(out.output, "try the cache");
        assert!(out.success);
    }

    #[test]
    fn finish_returns_the_message() {
        let out = registry()
            .execute_tool("finish", &json!({"message": "done", "task_completed": "true"}), None, false)
            .unwrap();
        assert_eq!(out.output, "done");
        assert_eq!(out.data["task_completed"], "true");
    }

    // ── run_command ───────────────────────────────────────────────────────────

    #[test]
    fn command_output_and_exit_code() {
        let out = registry()
            .execute_tool("run_command", &json!({"command": "echo hello"}), None, false)
            .unwrap();
        assert!(out.success);
        assert_eq!(out.output.trim(), "hello");
        assert_eq!(out.exit_code, Some(0));
    }

    #[test]
    fn nonzero_exit_is_unsuccessful_not_an_error() {
        let out = registry()
            .execute_tool("run_command", &json!({"command": "echo oops >&2; exit 3"}), None, false)
            .unwrap();
        assert!(!out.success);
        assert_eq!(out.exit_code, Some(3));
        assert!(out.output.contains("oops"));
    }

    #[test]
    fn command_runs_in_the_given_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = registry()
            .execute_tool(
                "run_command",
                &json!({"command": "pwd", "cwd": dir.path().to_str().unwrap()}),
                None,
                false,
            )
            .unwrap();
        let reported = std::path::PathBuf::from(out.output.trim()).canonicalize().unwrap();
        assert_eq!(reported, dir.path().canonicalize().unwrap());
    }

    // ── read_file ─────────────────────────────────────────────────────────────

    #[test]
    fn reads_whole_file_and_ranges() {
        let file = numbered_file(5);
        let path = file.path().to_str().unwrap();
        let registry = registry();

        let whole = registry.execute_tool("read_file", &json!({"path": path}), None, false).unwrap();
        assert_eq!(whole.output.lines().count(), 5);
        assert_eq!(whole.data["total_lines"], 5);

        let range = registry
            .execute_tool("read_file", &json!({"path": path, "start_line": 2, "end_line": 4}), None, false)
            .unwrap();
        assert_eq!(range.output, "line 2\nline 3\nline 4");

        let clamped = registry
            .execute_tool("read_file", &json!({"path": path, "start_line": 4, "end_line": 99}), None, false)
            .unwrap();
        assert_eq!(clamped.output, "line 4\nline 5");
    }

    #[test]
    fn inverted_range_is_a_validation_error() {
        let file = numbered_file(5);
        let err = registry()
            .execute_tool(
                "read_file",
                &json!({"path": file.path().to_str().unwrap(), "start_line": 4, "end_line": 2}),
                None,
                false,
            )
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn range_past_end_of_file_is_empty() {
        let file = numbered_file(3);
        let out = registry()
            .execute_tool(
                "read_file",
                &json!({"path": file.path().to_str().unwrap(), "start_line": 5, "end_line": 99}),
                None,
                false,
            )
            .unwrap();
        assert_eq!(out.output, "");
        assert_eq!(out.data["total_lines"], 3);
    }

    #[test]
    fn missing_file_is_an_execution_error() {
        let err = registry()
            .execute_tool("read_file", &json!({"path": "/definitely/not/here.txt"}), None, false)
            .unwrap_err();
        assert_eq!(err.kind(), "execution");
    }

    #[test]
    fn negative_line_number_fails_before_reading() {
        let err = registry()
            .execute_tool("read_file", &json!({"path": "x", "start_line": -1}), None, false)
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }
}
