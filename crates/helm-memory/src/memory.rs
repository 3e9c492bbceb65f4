//! Bounded conversation memory.

use std::collections::VecDeque;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use helm_contracts::message::{ConversationEvent, Message, Role, ToolCall};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub max_messages: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { max_messages: 100 }
    }
}

/// An ordered message log that drops its oldest entries past capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMemory {
    max_messages: usize,
    messages: VecDeque<Message>,
}

impl ConversationMemory {
    pub fn new(max_messages: usize) -> Self {
        Self {
            max_messages,
            messages: VecDeque::new(),
        }
    }

    pub fn from_config(config: &MemoryConfig) -> Self {
        Self::new(config.max_messages)
    }

    /// Rebuild a memory from stored messages, applying the capacity.
    pub fn from_messages(max_messages: usize, messages: impl IntoIterator<Item = Message>) -> Self {
        let mut memory = Self::new(max_messages);
        for m in messages {
            memory.add_message(m);
        }
        memory
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    pub fn add_message(&mut self, message: Message) {
        self.messages.push_back(message);
        while self.messages.len() > self.max_messages {
            self.messages.pop_front();
        }
    }

    /// All messages, oldest first.
    pub fn messages(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    /// Messages in `range`, clamped to what is stored.
    pub fn get_messages(&self, range: Range<usize>) -> Vec<Message> {
        let end = range.end.min(self.messages.len());
        let start = range.start.min(end);
        self.messages.range(start..end).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::User)
    }

    pub fn last_assistant_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }

    /// The first system message.
    pub fn system_message(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.role == Role::System)
    }

    /// Map raw events into messages, store them, and return them.
    ///
    /// Message sources `agent` and `assistant` become assistant turns,
    /// `system` a system turn, anything else a user turn. A tool call
    /// becomes an empty assistant turn carrying the call.
    pub fn process_events(&mut self, events: &[ConversationEvent]) -> Vec<Message> {
        let mut out = Vec::with_capacity(events.len());
        for event in events {
            let message = event_to_message(event);
            trace!(role = ?message.role, "event mapped to message");
            out.push(message.clone());
            self.add_message(message);
        }
        out
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::from_config(&MemoryConfig::default())
    }
}

fn event_to_message(event: &ConversationEvent) -> Message {
    let (message, timestamp) = match event {
        ConversationEvent::Message {
            source,
            content,
            timestamp,
        } => {
            let role = match source.as_str() {
                "agent" | "assistant" => Role::Assistant,
                "system" => Role::System,
                _ => Role::User,
            };
            (Message::new(role, content.clone()), timestamp)
        }
        ConversationEvent::ToolCall {
            id,
            tool_name,
            input,
            timestamp,
        } => {
            let call = ToolCall {
                id: id.clone(),
                name: tool_name.clone(),
                arguments: match input {
                    Value::Null => Value::Object(Default::default()),
                    other => other.clone(),
                },
            };
            (Message::assistant_with_tools("", vec![call]), timestamp)
        }
        ConversationEvent::ToolResult {
            tool_call_id,
            tool_name,
            result,
            timestamp,
        } => (
            Message::tool_result(tool_call_id.clone(), tool_name.clone(), result.clone()),
            timestamp,
        ),
    };
    match timestamp {
        Some(ts) => message.with_timestamp(*ts),
        None => message,
    }
}
