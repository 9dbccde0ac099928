//! Per-thread causal context: the scope stack, the linear chain tracker,
//! and the tables pairing "started" events with their closers.
//!
//! All state in this module is strictly thread-local. Consumers that want
//! a global tree reconstruct it from `parent_event_id` and
//! `emission_sequence`, never from thread identity.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Mismatch behaviour
// ---------------------------------------------------------------------------

/// What to do when the scope stack and the event stream disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MismatchBehavior {
    /// Log a warning and keep going.
    Warn,
    /// Panic. Only this variant propagates.
    Raise,
    /// Ignore silently.
    Silent,
}

/// Tunables for scope tracking on the current thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeConfig {
    /// Maximum scope depth; 0 disables the check. Exceeding the limit on a
    /// push is fatal, since it means closers are not being emitted.
    pub max_stack_depth: usize,
    /// Behaviour when a closer pops an opener of the wrong type.
    pub mismatch_behavior: MismatchBehavior,
    /// Behaviour when a closer arrives with nothing on the stack.
    pub empty_pop_behavior: MismatchBehavior,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            max_stack_depth: 100,
            mismatch_behavior: MismatchBehavior::Warn,
            empty_pop_behavior: MismatchBehavior::Warn,
        }
    }
}

/// Raised (as a panic payload message) when the stack depth limit is hit.
#[derive(Debug, thiserror::Error)]
#[error("event scope depth limit ({limit}) exceeded; a closing event is probably missing")]
pub struct StackDepthExceeded {
    /// The configured limit that was exceeded.
    pub limit: usize,
}

// ---------------------------------------------------------------------------
// Thread-local state
// ---------------------------------------------------------------------------

thread_local! {
    /// Open scopes: `(event_id, event_type)`, innermost last.
    static SCOPE_STACK: RefCell<Vec<(String, String)>> = const { RefCell::new(Vec::new()) };

    /// Per-thread config override; falls back to the default.
    static SCOPE_CONFIG: RefCell<Option<ScopeConfig>> = const { RefCell::new(None) };

    /// Id of the last event emitted on this thread.
    static LAST_EVENT_ID: RefCell<Option<String>> = const { RefCell::new(None) };

    /// Id of the event that causally triggered the current work.
    static TRIGGERING_EVENT_ID: RefCell<Option<String>> = const { RefCell::new(None) };
}

static DEFAULT_CONFIG: Lazy<ScopeConfig> = Lazy::new(ScopeConfig::default);

fn with_config<R>(f: impl FnOnce(&ScopeConfig) -> R) -> R {
    SCOPE_CONFIG.with(|cell| match cell.borrow().as_ref() {
        Some(cfg) => f(cfg),
        None => f(&DEFAULT_CONFIG),
    })
}

/// Install a scope config for the current thread. Test hook.
pub fn set_scope_config(config: Option<ScopeConfig>) {
    SCOPE_CONFIG.with(|cell| *cell.borrow_mut() = config);
}

// ---------------------------------------------------------------------------
// Scope stack
// ---------------------------------------------------------------------------

/// Id at the top of the stack: the parent for ordinary events.
pub fn current_parent_id() -> Option<String> {
    SCOPE_STACK.with(|stack| stack.borrow().last().map(|(id, _)| id.clone()))
}

/// Id one below the top: the parent for closing events, which must attach
/// to the scope that encloses the one they close.
pub fn enclosing_parent_id() -> Option<String> {
    SCOPE_STACK.with(|stack| {
        let s = stack.borrow();
        if s.len() >= 2 {
            Some(s[s.len() - 2].0.clone())
        } else {
            None
        }
    })
}

/// Push a newly opened scope.
///
/// # Panics
///
/// Panics with [`StackDepthExceeded`] when the configured depth limit is
/// reached; a runaway stack means closers are missing and the causal tree
/// is already unreconstructable.
pub fn push_scope(event_id: String, event_type: String) {
    let limit = with_config(|c| c.max_stack_depth);
    SCOPE_STACK.with(|stack| {
        let mut s = stack.borrow_mut();
        if limit > 0 && s.len() >= limit {
            panic!("{}", StackDepthExceeded { limit });
        }
        s.push((event_id, event_type));
    });
}

/// Pop the innermost open scope, if any.
pub fn pop_scope() -> Option<(String, String)> {
    SCOPE_STACK.with(|stack| stack.borrow_mut().pop())
}

/// Current depth of the scope stack. Used by tests asserting balance.
pub fn scope_depth() -> usize {
    SCOPE_STACK.with(|stack| stack.borrow().len())
}

/// Clear the scope stack. Test hook.
pub fn reset_scope_stack() {
    SCOPE_STACK.with(|stack| stack.borrow_mut().clear());
}

/// React to a closer that arrived with an empty stack.
pub fn handle_empty_pop(event_type: &str) {
    let msg = format!(
        "ending event '{}' emitted with an empty scope stack; missing starting event?",
        event_type
    );
    match with_config(|c| c.empty_pop_behavior) {
        MismatchBehavior::Raise => panic!("[EventBus] {}", msg),
        MismatchBehavior::Warn => log::warn!("[EventBus] {}", msg),
        MismatchBehavior::Silent => {}
    }
}

/// React to a closer whose popped opener has the wrong type.
pub fn handle_mismatch(event_type: &str, popped_type: &str, expected_opener: &str) {
    let msg = format!(
        "event pairing mismatch: '{}' closed '{}' (expected '{}')",
        event_type, popped_type, expected_opener
    );
    match with_config(|c| c.mismatch_behavior) {
        MismatchBehavior::Raise => panic!("[EventBus] {}", msg),
        MismatchBehavior::Warn => log::warn!("[EventBus] {}", msg),
        MismatchBehavior::Silent => {}
    }
}

// ---------------------------------------------------------------------------
// Linear chain + causal trigger
// ---------------------------------------------------------------------------

/// Id of the last event emitted on this thread.
pub fn last_event_id() -> Option<String> {
    LAST_EVENT_ID.with(|cell| cell.borrow().clone())
}

/// Record the last emitted event id.
pub fn set_last_event_id(event_id: String) {
    LAST_EVENT_ID.with(|cell| *cell.borrow_mut() = Some(event_id));
}

/// Forget the last emitted event id. Test hook.
pub fn reset_last_event_id() {
    LAST_EVENT_ID.with(|cell| *cell.borrow_mut() = None);
}

/// Id of the event that causally triggered the current execution context.
pub fn triggering_event_id() -> Option<String> {
    TRIGGERING_EVENT_ID.with(|cell| cell.borrow().clone())
}

/// Set (or clear) the causal trigger for the current thread.
pub fn set_triggering_event_id(event_id: Option<String>) {
    TRIGGERING_EVENT_ID.with(|cell| *cell.borrow_mut() = event_id);
}

// ---------------------------------------------------------------------------
// RAII guards
// ---------------------------------------------------------------------------

/// Pushes a scope on creation and pops it on drop. If the id is already on
/// the stack the guard takes no ownership, so nesting the same scope twice
/// is harmless.
pub struct ScopeGuard {
    owned: bool,
}

impl ScopeGuard {
    /// Enter a scope for `event_id` unless it is already open.
    pub fn enter(event_id: String, event_type: String) -> Self {
        let already_open =
            SCOPE_STACK.with(|stack| stack.borrow().iter().any(|(id, _)| *id == event_id));
        if !already_open {
            push_scope(event_id, event_type);
        }
        Self {
            owned: !already_open,
        }
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if self.owned {
            pop_scope();
        }
    }
}

/// Sets the triggering event id for the duration of a block, restoring the
/// previous trigger on drop.
pub struct TriggerGuard {
    previous: Option<String>,
}

impl TriggerGuard {
    /// Enter a triggered-by scope.
    pub fn enter(event_id: String) -> Self {
        let previous = triggering_event_id();
        set_triggering_event_id(Some(event_id));
        Self { previous }
    }
}

impl Drop for TriggerGuard {
    fn drop(&mut self) {
        set_triggering_event_id(self.previous.take());
    }
}

// ---------------------------------------------------------------------------
// Scope tables
// ---------------------------------------------------------------------------

/// Event types that open a scope.
pub static SCOPE_STARTING_EVENTS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "crew_kickoff_started",
        "crew_train_started",
        "crew_test_started",
        "agent_execution_started",
        "agent_evaluation_started",
        "lite_agent_execution_started",
        "agent_reasoning_started",
        "task_started",
        "llm_call_started",
        "llm_guardrail_started",
        "tool_usage_started",
        "mcp_connection_started",
        "mcp_tool_execution_started",
        "memory_retrieval_started",
        "memory_save_started",
        "memory_query_started",
        "knowledge_query_started",
        "knowledge_search_query_started",
    ]
    .into_iter()
    .collect()
});

/// Event types that close a scope.
pub static SCOPE_ENDING_EVENTS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| VALID_EVENT_PAIRS.keys().copied().collect());

/// For each closing event type, the opener it must match.
pub static VALID_EVENT_PAIRS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("crew_kickoff_completed", "crew_kickoff_started"),
        ("crew_kickoff_failed", "crew_kickoff_started"),
        ("crew_train_completed", "crew_train_started"),
        ("crew_train_failed", "crew_train_started"),
        ("crew_test_completed", "crew_test_started"),
        ("crew_test_failed", "crew_test_started"),
        ("agent_execution_completed", "agent_execution_started"),
        ("agent_execution_error", "agent_execution_started"),
        ("agent_evaluation_completed", "agent_evaluation_started"),
        ("agent_evaluation_failed", "agent_evaluation_started"),
        ("lite_agent_execution_completed", "lite_agent_execution_started"),
        ("lite_agent_execution_error", "lite_agent_execution_started"),
        ("agent_reasoning_completed", "agent_reasoning_started"),
        ("agent_reasoning_failed", "agent_reasoning_started"),
        ("task_completed", "task_started"),
        ("task_failed", "task_started"),
        ("llm_call_completed", "llm_call_started"),
        ("llm_call_failed", "llm_call_started"),
        ("llm_guardrail_completed", "llm_guardrail_started"),
        ("llm_guardrail_failed", "llm_guardrail_started"),
        ("tool_usage_finished", "tool_usage_started"),
        ("tool_usage_error", "tool_usage_started"),
        ("mcp_connection_completed", "mcp_connection_started"),
        ("mcp_connection_failed", "mcp_connection_started"),
        ("mcp_tool_execution_completed", "mcp_tool_execution_started"),
        ("mcp_tool_execution_failed", "mcp_tool_execution_started"),
        ("memory_retrieval_completed", "memory_retrieval_started"),
        ("memory_retrieval_failed", "memory_retrieval_started"),
        ("memory_save_completed", "memory_save_started"),
        ("memory_save_failed", "memory_save_started"),
        ("memory_query_completed", "memory_query_started"),
        ("memory_query_failed", "memory_query_started"),
        ("knowledge_query_completed", "knowledge_query_started"),
        ("knowledge_query_failed", "knowledge_query_started"),
        (
            "knowledge_search_query_completed",
            "knowledge_search_query_started",
        ),
        (
            "knowledge_search_query_failed",
            "knowledge_search_query_started",
        ),
    ]
    .into_iter()
    .collect()
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_closer_has_an_opener_in_the_starting_set() {
        for (closer, opener) in VALID_EVENT_PAIRS.iter() {
            assert!(
                SCOPE_STARTING_EVENTS.contains(opener),
                "{} closes {} which is not a starting event",
                closer,
                opener
            );
        }
    }

    #[test]
    fn every_opener_has_at_least_one_closer() {
        for opener in SCOPE_STARTING_EVENTS.iter() {
            assert!(
                VALID_EVENT_PAIRS.values().any(|o| o == opener),
                "{} has no closing event",
                opener
            );
        }
    }

    #[test]
    fn push_pop_balances() {
        reset_scope_stack();
        push_scope("a".into(), "task_started".into());
        push_scope("b".into(), "llm_call_started".into());
        assert_eq!(current_parent_id().as_deref(), Some("b"));
        assert_eq!(enclosing_parent_id().as_deref(), Some("a"));

        assert_eq!(pop_scope().map(|(id, _)| id).as_deref(), Some("b"));
        assert_eq!(pop_scope().map(|(id, _)| id).as_deref(), Some("a"));
        assert_eq!(pop_scope(), None);
        assert_eq!(scope_depth(), 0);
    }

    #[test]
    #[should_panic(expected = "depth limit")]
    fn push_past_depth_limit_is_fatal() {
        reset_scope_stack();
        set_scope_config(Some(ScopeConfig {
            max_stack_depth: 3,
            ..ScopeConfig::default()
        }));
        for i in 0..4 {
            push_scope(format!("evt-{}", i), "task_started".into());
        }
    }

    #[test]
    fn scope_guard_skips_reentry() {
        reset_scope_stack();
        let _outer = ScopeGuard::enter("same".into(), "task_started".into());
        assert_eq!(scope_depth(), 1);
        {
            let _inner = ScopeGuard::enter("same".into(), "task_started".into());
            assert_eq!(scope_depth(), 1);
        }
        // Inner guard owned nothing, so the scope survives its drop.
        assert_eq!(scope_depth(), 1);
    }

    #[test]
    fn trigger_guard_restores_previous_trigger() {
        set_triggering_event_id(Some("root".into()));
        {
            let _guard = TriggerGuard::enter("child".into());
            assert_eq!(triggering_event_id().as_deref(), Some("child"));
        }
        assert_eq!(triggering_event_id().as_deref(), Some("root"));
        set_triggering_event_id(None);
    }
}
