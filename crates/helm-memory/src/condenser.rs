//! History condensation under a message-count budget.
//!
//! `SummaryCondenser` output layout when the input is over budget:
//!
//! ```text
//! [system]? [summary] [tail..., with the last user message in its original position]
//! ```
//!
//! The summary marker takes one slot of the budget, so the output is never
//! longer than `max_messages`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use helm_contracts::{
    error::{HelmError, HelmResult},
    message::{Message, Role},
};

pub trait Condenser: Send + Sync {
    fn condense(&self, messages: &[Message]) -> Vec<Message>;

    fn name(&self) -> &'static str;
}

/// Returns its input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCondenser;

impl Condenser for NoOpCondenser {
    fn condense(&self, messages: &[Message]) -> Vec<Message> {
        messages.to_vec()
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    pub max_messages: usize,
    pub keep_system_message: bool,
    pub keep_last_user_message: bool,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            max_messages: 20,
            keep_system_message: true,
            keep_last_user_message: true,
        }
    }
}

/// Replaces older messages with a one-line omission marker.
#[derive(Debug, Clone, Default)]
pub struct SummaryCondenser {
    config: SummaryConfig,
}

impl SummaryCondenser {
    pub fn new(config: SummaryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SummaryConfig {
        &self.config
    }
}

pub fn summary_message(omitted: usize) -> Message {
    let mut message = Message::system(format!(
        "[Conversation history summary: {omitted} earlier messages omitted]"
    ));
    message.name = Some("summary".to_string());
    message
}

impl Condenser for SummaryCondenser {
    fn condense(&self, messages: &[Message]) -> Vec<Message> {
        let max = self.config.max_messages;
        if messages.len() <= max {
            return messages.to_vec();
        }

        let mut system_idx = if self.config.keep_system_message {
            messages.iter().position(|m| m.role == Role::System)
        } else {
            None
        };
        let mut user_idx = if self.config.keep_last_user_message {
            messages.iter().rposition(|m| m.role == Role::User)
        } else {
            None
        };

        // Anchors yield to the bound: the system message goes first.
        if max < usize::from(system_idx.is_some()) + usize::from(user_idx.is_some()) {
            system_idx = None;
        }
        if max == 0 {
            user_idx = None;
        }

        let reserved = usize::from(system_idx.is_some()) + usize::from(user_idx.is_some());
        let remaining = max.saturating_sub(reserved);

        // Tail slots left after the summary marker.
        let keep = remaining.saturating_sub(1);
        let mut kept: Vec<usize> = (0..messages.len())
            .rev()
            .filter(|i| Some(*i) != system_idx && Some(*i) != user_idx)
            .take(keep)
            .collect();
        kept.extend(user_idx);
        kept.sort_unstable();

        let omitted = messages.len() - reserved - keep;

        let mut out = Vec::with_capacity(max);
        if let Some(i) = system_idx {
            out.push(messages[i].clone());
        }
        if remaining > 0 {
            out.push(summary_message(omitted));
        }
        out.extend(kept.into_iter().map(|i| messages[i].clone()));

        debug!(
            before = messages.len(),
            after = out.len(),
            omitted,
            "conversation condensed"
        );
        out
    }

    fn name(&self) -> &'static str {
        "summary"
    }
}

/// Which condenser to build, as written in configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CondenserConfig {
    #[default]
    Noop,
    Summary(SummaryConfig),
}

impl CondenserConfig {
    pub fn validate(&self) -> HelmResult<()> {
        match self {
            CondenserConfig::Summary(c) if c.max_messages < 2 => Err(HelmError::Config {
                reason: format!(
                    "summary condenser max_messages must be at least 2, got {}",
                    c.max_messages
                ),
            }),
            _ => Ok(()),
        }
    }

    pub fn build(&self) -> Box<dyn Condenser> {
        match self {
            CondenserConfig::Noop => Box::new(NoOpCondenser),
            CondenserConfig::Summary(c) => Box::new(SummaryCondenser::new(c.clone())),
        }
    }
}
