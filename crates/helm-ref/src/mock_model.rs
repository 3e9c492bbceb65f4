//! A scripted model client for the reference runtime.
//!
//! Completions are replayed in order, one per `complete` call. No provider is
//! contacted. A script shared between a parent and its delegates is consumed
//! in call order, which under synchronous delegation is the order the
//! scenario was written in.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde_json::{json, Value};
use tracing::debug;

use helm_contracts::{
    error::{HelmError, HelmResult},
    execution::Usage,
    message::{Completion, Message},
    tool::ToolDefinition,
};
use helm_core::traits::ModelClient;

#[derive(Debug, Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<Completion>>,
    /// Length of the conversation sent with each call.
    calls: Mutex<Vec<usize>>,
}

impl ScriptedModel {
    pub fn new(script: impl IntoIterator<Item = Completion>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Number of `complete` calls served so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Message counts of every call, in order.
    pub fn conversation_lengths(&self) -> Vec<usize> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl ModelClient for ScriptedModel {
    fn complete(&self, messages: &[Message], _tools: &[ToolDefinition]) -> HelmResult<Completion> {
        let mut calls = self.calls.lock().map_err(|e| HelmError::Model {
            reason: format!("scripted model lock poisoned: {e}"),
        })?;
        calls.push(messages.len());

        let mut script = self.script.lock().map_err(|e| HelmError::Model {
            reason: format!("scripted model lock poisoned: {e}"),
        })?;
        let completion = script.pop_front().ok_or_else(|| HelmError::Model {
            reason: format!("script exhausted after {} call(s)", calls.len() - 1),
        })?;
        debug!(
            call = calls.len(),
            tool_calls = completion.tool_calls.len(),
            "scripted completion served"
        );
        Ok(completion)
    }
}

// ── Script builders ──────────────────────────────────────────────────────────

/// A small flat charge so budget and token metrics move.
pub fn usage() -> Usage {
    Usage {
        prompt_tokens: 120,
        completion_tokens: 30,
        cost: 0.001,
    }
}

fn call(id: &str, name: &str, arguments: Value) -> Completion {
    let mut completion = Completion::tool_call(id, name, arguments);
    completion.usage = Some(usage());
    completion
}

pub fn think(id: &str, thought: &str) -> Completion {
    call(id, "think", json!({ "thought": thought }))
}

pub fn finish(id: &str, message: &str) -> Completion {
    call(id, "finish", json!({ "message": message }))
}

pub fn delegate(id: &str, agent_class: &str, task: &str) -> Completion {
    call(
        id,
        "delegate",
        json!({ "agent_class": agent_class, "inputs": { "task": task } }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_in_order_then_errors() {
        let model = ScriptedModel::new(vec![think("c1", "a"), finish("c2", "done")]);
        let first = model.complete(&[Message::user("go")], &[]).unwrap();
        assert_eq!(first.tool_calls[0].name, "think");
        let second = model.complete(&[], &[]).unwrap();
        assert_eq!(second.tool_calls[0].arguments["message"], "done");

        match model.complete(&[], &[]) {
            Err(HelmError::Model { reason }) => assert!(reason.contains("exhausted")),
            other => panic!("expected Model error, got {:?}", other),
        }
        assert_eq!(model.conversation_lengths(), vec![1, 0, 0]);
        assert_eq!(model.remaining(), 0);
    }
}
