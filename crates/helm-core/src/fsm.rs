//! A small, thread-safe, table-driven finite state machine.
//!
//! A machine is a list of `Transition`s `(from_states, event, guards) -> to`.
//! `trigger` scans the transitions registered for the event in registration
//! order and applies the first one whose source set contains the current
//! state and whose guards all pass. Guard evaluation, the state write, and
//! the transition hook all run under one mutex, so two racing callers can
//! never both observe the same source state.
//!
//! An event with no matching transition is not an error: `trigger` returns
//! `Ok(false)` and the invalid-transition hook fires.

use std::fmt::Debug;
use std::sync::Mutex;

use tracing::{debug, warn};

use helm_contracts::error::{HelmError, HelmResult};

/// A predicate over the trigger context.
pub type Guard<C> = Box<dyn Fn(&C) -> bool + Send + Sync>;

/// One row of the transition table.
pub struct Transition<S, E, C> {
    from: Vec<S>,
    event: E,
    to: S,
    guards: Vec<Guard<C>>,
}

impl<S: PartialEq, E, C> Transition<S, E, C> {
    /// Build a transition from any of `from` to `to` on `event`.
    ///
    /// # Panics
    ///
    /// Panics when `from` is empty. Such a row could never fire and always
    /// indicates a mistake in the table.
    pub fn new(from: impl IntoIterator<Item = S>, event: E, to: S) -> Self {
        let from: Vec<S> = from.into_iter().collect();
        assert!(!from.is_empty(), "transition must have at least one source state");
        Self { from, event, to, guards: Vec::new() }
    }

    /// Add a guard. All guards must pass for the transition to fire.
    pub fn guard(mut self, guard: impl Fn(&C) -> bool + Send + Sync + 'static) -> Self {
        self.guards.push(Box::new(guard));
        self
    }

    fn accepts(&self, state: &S, ctx: &C) -> bool {
        self.from.contains(state) && self.guards.iter().all(|g| g(ctx))
    }
}

/// Callbacks fired while the machine lock is held.
///
/// Hooks cannot fail the transition. Implementations that persist should
/// log their own errors.
pub trait TransitionHooks<S, E, C>: Send + Sync {
    fn on_transition(&self, _from: S, _event: E, _to: S, _ctx: &C) {}

    fn on_invalid_transition(&self, _state: S, _event: E, _ctx: &C) {}
}

/// Hooks that do nothing.
pub struct NoHooks;

impl<S, E, C> TransitionHooks<S, E, C> for NoHooks {}

/// The state machine itself. `C` is the context type passed to guards and
/// hooks.
pub struct StateMachine<S, E, C = ()> {
    state: Mutex<S>,
    transitions: Vec<Transition<S, E, C>>,
    hooks: Box<dyn TransitionHooks<S, E, C>>,
}

impl<S, E, C> StateMachine<S, E, C>
where
    S: Copy + PartialEq + Debug + Send + 'static,
    E: Copy + PartialEq + Debug + Send + 'static,
    C: 'static,
{
    pub fn new(initial: S, transitions: Vec<Transition<S, E, C>>) -> Self {
        Self {
            state: Mutex::new(initial),
            transitions,
            hooks: Box::new(NoHooks),
        }
    }

    pub fn with_hooks(mut self, hooks: impl TransitionHooks<S, E, C> + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    pub fn current_state(&self) -> HelmResult<S> {
        let state = self.state.lock().map_err(|e| HelmError::StateMachine {
            reason: format!("state lock poisoned: {e}"),
        })?;
        Ok(*state)
    }

    /// Fire `event`. Returns `Ok(true)` if a transition was applied.
    pub fn trigger(&self, event: E, ctx: &C) -> HelmResult<bool> {
        let mut state = self.state.lock().map_err(|e| HelmError::StateMachine {
            reason: format!("state lock poisoned: {e}"),
        })?;
        let from = *state;

        match self.find(event, from, ctx) {
            Some(to) => {
                *state = to;
                debug!(from = ?from, event = ?event, to = ?to, "state transition");
                self.hooks.on_transition(from, event, to, ctx);
                Ok(true)
            }
            None => {
                warn!(state = ?from, event = ?event, "invalid state transition");
                self.hooks.on_invalid_transition(from, event, ctx);
                Ok(false)
            }
        }
    }

    /// Whether `trigger(event, ctx)` would apply a transition right now.
    pub fn can_trigger(&self, event: E, ctx: &C) -> HelmResult<bool> {
        let state = self.current_state()?;
        Ok(self.find(event, state, ctx).is_some())
    }

    /// Events that would currently be accepted, in table order.
    pub fn available_events(&self, ctx: &C) -> HelmResult<Vec<E>> {
        let state = self.current_state()?;
        let mut events: Vec<E> = Vec::new();
        for t in &self.transitions {
            if t.accepts(&state, ctx) && !events.contains(&t.event) {
                events.push(t.event);
            }
        }
        Ok(events)
    }

    fn find(&self, event: E, state: S, ctx: &C) -> Option<S> {
        self.transitions
            .iter()
            .filter(|t| t.event == event)
            .find(|t| t.accepts(&state, ctx))
            .map(|t| t.to)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
