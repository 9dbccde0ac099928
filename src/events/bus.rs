//! The process-wide event bus.
//!
//! A single lazily-initialized bus owns the handler registry and a small
//! dedicated Tokio runtime for dispatch. Emission is cheap: the emitting
//! thread annotates the event with its causal chain, projects it to a
//! sendable header, and spawns handler tasks; only dependency-aware
//! dispatch waits between levels.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;

use crate::events::base_event::{next_emission_sequence, Event, EventHeader};
use crate::events::context::{
    current_parent_id, enclosing_parent_id, handle_empty_pop, handle_mismatch, last_event_id,
    pop_scope, push_scope, set_last_event_id, triggering_event_id, SCOPE_ENDING_EVENTS,
    SCOPE_STARTING_EVENTS, VALID_EVENT_PAIRS,
};
use crate::events::graph::{build_execution_plan, CircularDependencyError};

// ---------------------------------------------------------------------------
// Handler identity and dependencies
// ---------------------------------------------------------------------------

/// A handler callback. Receives the type-erased emitting source and the
/// flat header projection of the event.
pub type Handler = Arc<dyn Fn(&dyn Any, &EventHeader) + Send + Sync>;

static HANDLER_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque handler identifier: a human-readable name plus a process-unique
/// monotone number. Equality and hashing use only the number, so two
/// handlers may share a name.
#[derive(Clone)]
pub struct HandlerId {
    name: String,
    id: u64,
}

impl HandlerId {
    /// Mint a fresh id with the given display name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: HANDLER_COUNTER.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// The display name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandlerId({}:{})", self.id, self.name)
    }
}

impl PartialEq for HandlerId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for HandlerId {}

impl std::hash::Hash for HandlerId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Declares that a handler must run after another handler of the same
/// event type.
#[derive(Clone, Debug)]
pub struct Depends {
    /// The handler this one depends on.
    pub handler_id: HandlerId,
}

impl Depends {
    /// Depend on the given handler.
    pub fn new(handler_id: HandlerId) -> Self {
        Self { handler_id }
    }
}

#[derive(Clone)]
struct HandlerEntry {
    id: HandlerId,
    handler: Handler,
    dependencies: Vec<Depends>,
}

/// Ordered levels of handlers. Handlers within a level run concurrently;
/// levels run strictly in order.
pub type ExecutionPlan = Vec<std::collections::HashSet<HandlerId>>;

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

static GLOBAL_BUS: OnceLock<EventBus> = OnceLock::new();

/// The typed publish/subscribe core.
///
/// Handlers are keyed by the concrete event type (`TypeId`). The handler
/// map and the per-type execution-plan cache sit behind read-write locks
/// so the emit-heavy path takes only read locks.
pub struct EventBus {
    handlers: RwLock<HashMap<TypeId, Vec<HandlerEntry>>>,
    plan_cache: RwLock<HashMap<TypeId, ExecutionPlan>>,
    runtime: Runtime,
    pending: Mutex<Vec<JoinHandle<()>>>,
    shutting_down: RwLock<bool>,
}

impl EventBus {
    /// The process-wide bus, created on first use.
    pub fn global() -> &'static EventBus {
        GLOBAL_BUS.get_or_init(|| {
            let runtime = Builder::new_multi_thread()
                .worker_threads(2)
                .thread_name("troupe-events")
                .enable_all()
                .build()
                .expect("failed to build event dispatch runtime");
            EventBus {
                handlers: RwLock::new(HashMap::new()),
                plan_cache: RwLock::new(HashMap::new()),
                runtime,
                pending: Mutex::new(Vec::new()),
                shutting_down: RwLock::new(false),
            }
        })
    }

    // -- registration -------------------------------------------------------

    /// Register a handler for event type `E`, optionally declaring
    /// dependencies on other handlers of the same type. Invalidates the
    /// cached execution plan for `E`.
    pub fn on<E: Event + 'static>(
        &self,
        name: impl Into<String>,
        handler: impl Fn(&dyn Any, &EventHeader) + Send + Sync + 'static,
        dependencies: Option<Vec<Depends>>,
    ) -> HandlerId {
        let id = HandlerId::new(name);
        let entry = HandlerEntry {
            id: id.clone(),
            handler: Arc::new(handler),
            dependencies: dependencies.unwrap_or_default(),
        };
        let type_id = TypeId::of::<E>();
        self.handlers.write().entry(type_id).or_default().push(entry);
        self.plan_cache.write().remove(&type_id);
        id
    }

    /// Register a handler under a pre-minted [`HandlerId`]. Needed when two
    /// handlers declare dependencies on each other, since `Depends` takes an
    /// id that must exist before either registration.
    pub fn on_with_id<E: Event + 'static>(
        &self,
        id: HandlerId,
        handler: impl Fn(&dyn Any, &EventHeader) + Send + Sync + 'static,
        dependencies: Option<Vec<Depends>>,
    ) -> HandlerId {
        let entry = HandlerEntry {
            id: id.clone(),
            handler: Arc::new(handler),
            dependencies: dependencies.unwrap_or_default(),
        };
        let type_id = TypeId::of::<E>();
        self.handlers.write().entry(type_id).or_default().push(entry);
        self.plan_cache.write().remove(&type_id);
        id
    }

    /// Remove a handler. Invalidates the cached plan for `E`.
    pub fn off<E: Event + 'static>(&self, handler_id: &HandlerId) {
        let type_id = TypeId::of::<E>();
        {
            let mut map = self.handlers.write();
            if let Some(entries) = map.get_mut(&type_id) {
                entries.retain(|e| e.id != *handler_id);
                if entries.is_empty() {
                    map.remove(&type_id);
                }
            }
        }
        self.plan_cache.write().remove(&type_id);
    }

    // -- emission -----------------------------------------------------------

    /// Annotate `event` with its causal chain and dispatch it.
    ///
    /// Chain annotation runs on the emitting thread against that thread's
    /// scope stack:
    ///
    /// 1. `previous_event_id` and `triggered_by_event_id` are filled from
    ///    the thread-local trackers when unset.
    /// 2. `emission_sequence` is always assigned.
    /// 3. When `parent_event_id` is unset: closers attach to the enclosing
    ///    scope and pop (checking the pair table); openers attach to the
    ///    current scope and push; everything else attaches to the current
    ///    scope.
    ///
    /// # Panics
    ///
    /// Panics if the handlers registered for `E` declare a dependency
    /// cycle. Use [`validate_dependencies`](Self::validate_dependencies)
    /// to surface cycles eagerly instead.
    pub fn emit<E: Event + 'static>(&self, source: Arc<dyn Any + Send + Sync>, event: &mut E) {
        if event.previous_event_id().is_none() {
            event.set_previous_event_id(last_event_id());
        }
        if event.triggered_by_event_id().is_none() {
            event.set_triggered_by_event_id(triggering_event_id());
        }
        event.set_emission_sequence(Some(next_emission_sequence()));

        if event.parent_event_id().is_none() {
            let event_type = event.event_type().to_string();
            if SCOPE_ENDING_EVENTS.contains(event_type.as_str()) {
                event.set_parent_event_id(enclosing_parent_id());
                match pop_scope() {
                    None => handle_empty_pop(&event_type),
                    Some((_, popped_type)) => {
                        if let Some(expected) = VALID_EVENT_PAIRS.get(event_type.as_str()) {
                            if !popped_type.is_empty() && popped_type != *expected {
                                handle_mismatch(&event_type, &popped_type, expected);
                            }
                        }
                    }
                }
            } else if SCOPE_STARTING_EVENTS.contains(event_type.as_str()) {
                event.set_parent_event_id(current_parent_id());
                push_scope(event.event_id().to_string(), event_type);
            } else {
                event.set_parent_event_id(current_parent_id());
            }
        }

        set_last_event_id(event.event_id().to_string());

        if *self.shutting_down.read() {
            log::warn!("[EventBus] emit during shutdown ignored ({})", event.event_type());
            return;
        }

        let type_id = TypeId::of::<E>();
        let entries: Vec<HandlerEntry> = match self.handlers.read().get(&type_id) {
            Some(v) if !v.is_empty() => v.clone(),
            _ => return,
        };

        let has_deps = entries.iter().any(|e| !e.dependencies.is_empty());
        let header = Arc::new(EventHeader::project(event));
        if has_deps {
            self.dispatch_with_dependencies(type_id, source, header, &entries);
        } else {
            self.dispatch_simple(source, header, &entries);
        }
    }

    /// Simple path: every handler is independent, spawn them all.
    fn dispatch_simple(
        &self,
        source: Arc<dyn Any + Send + Sync>,
        header: Arc<EventHeader>,
        entries: &[HandlerEntry],
    ) {
        for entry in entries {
            let handler = entry.handler.clone();
            let src = source.clone();
            let evt = header.clone();
            let handle = self.runtime.spawn(async move {
                let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    handler(src.as_ref(), evt.as_ref());
                }));
                if let Err(payload) = outcome {
                    log::error!("[EventBus] handler panicked: {:?}", payload);
                }
            });
            self.pending.lock().push(handle);
        }
    }

    /// Dependency-aware path: run the cached plan level by level, waiting
    /// for each level to finish before starting the next.
    fn dispatch_with_dependencies(
        &self,
        type_id: TypeId,
        source: Arc<dyn Any + Send + Sync>,
        header: Arc<EventHeader>,
        entries: &[HandlerEntry],
    ) {
        let plan = {
            let cached = self.plan_cache.read().get(&type_id).cloned();
            match cached {
                Some(plan) => plan,
                None => {
                    let plan = Self::resolve_plan(entries)
                        .unwrap_or_else(|err| panic!("{}", err));
                    self.plan_cache.write().insert(type_id, plan.clone());
                    plan
                }
            }
        };

        let handler_map: HashMap<HandlerId, Handler> = entries
            .iter()
            .map(|e| (e.id.clone(), e.handler.clone()))
            .collect();

        for level in &plan {
            let mut handles = Vec::with_capacity(level.len());
            for handler_id in level {
                if let Some(handler) = handler_map.get(handler_id) {
                    let h = handler.clone();
                    let src = source.clone();
                    let evt = header.clone();
                    handles.push(self.runtime.spawn(async move {
                        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                            h(src.as_ref(), evt.as_ref());
                        }));
                        if let Err(payload) = outcome {
                            log::error!("[EventBus] handler panicked: {:?}", payload);
                        }
                    }));
                }
            }
            for handle in handles {
                let _ = self.runtime.block_on(handle);
            }
        }
    }

    fn resolve_plan(entries: &[HandlerEntry]) -> Result<ExecutionPlan, CircularDependencyError> {
        let ids: Vec<HandlerId> = entries.iter().map(|e| e.id.clone()).collect();
        let deps: HashMap<HandlerId, Vec<Depends>> = entries
            .iter()
            .map(|e| (e.id.clone(), e.dependencies.clone()))
            .collect();
        build_execution_plan(&ids, &deps)
    }

    // -- flush / shutdown ---------------------------------------------------

    /// Wait for every in-flight handler to finish. Returns `true` when all
    /// of them completed without being cancelled or panicking at the task
    /// level.
    pub fn flush(&self) -> bool {
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.pending.lock());
        let mut all_ok = true;
        for handle in handles {
            if let Err(e) = self.runtime.block_on(handle) {
                log::error!("[EventBus] handler task failed during flush: {e}");
                all_ok = false;
            }
        }
        all_ok
    }

    /// Stop accepting emissions. With `wait` the bus flushes first.
    /// In-flight handler tasks are never cancelled forcibly.
    pub fn shutdown(&self, wait: bool) {
        if wait {
            self.flush();
        }
        *self.shutting_down.write() = true;
        self.handlers.write().clear();
        self.plan_cache.write().clear();
    }

    /// Eagerly build the execution plan for every registered event type,
    /// surfacing dependency cycles before the first dispatch.
    pub fn validate_dependencies(&self) -> Result<(), CircularDependencyError> {
        let map = self.handlers.read();
        for entries in map.values() {
            if entries.iter().all(|e| e.dependencies.is_empty()) {
                continue;
            }
            Self::resolve_plan(entries)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::base_event::EventHeader;
    use crate::events::context::{reset_scope_stack, scope_depth};
    use crate::impl_event;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    // Local event types so tests do not collide through the global bus.
    #[derive(Debug, Clone)]
    struct PingEvent {
        header: EventHeader,
    }
    impl PingEvent {
        fn new() -> Self {
            Self {
                header: EventHeader::new("ping"),
            }
        }
    }
    impl_event!(PingEvent);

    #[derive(Debug, Clone)]
    struct OrderedEvent {
        header: EventHeader,
    }
    impl OrderedEvent {
        fn new() -> Self {
            Self {
                header: EventHeader::new("ordered"),
            }
        }
    }
    impl_event!(OrderedEvent);

    #[derive(Debug, Clone)]
    struct CyclicEvent {
        header: EventHeader,
    }
    impl_event!(CyclicEvent);

    #[test]
    fn handlers_receive_the_projected_header() {
        let bus = EventBus::global();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_handler = seen.clone();
        let id = bus.on::<PingEvent>(
            "count-pings",
            move |_source, header| {
                assert_eq!(header.event_type, "ping");
                assert!(header.emission_sequence.is_some());
                seen_in_handler.fetch_add(1, AtomicOrdering::SeqCst);
            },
            None,
        );

        let mut event = PingEvent::new();
        bus.emit(Arc::new(()), &mut event);
        assert!(bus.flush());
        assert_eq!(seen.load(AtomicOrdering::SeqCst), 1);
        bus.off::<PingEvent>(&id);
    }

    #[test]
    fn dependency_order_holds_for_every_edge() {
        let bus = EventBus::global();
        let trace: Arc<parking_lot::Mutex<Vec<&'static str>>> =
            Arc::new(parking_lot::Mutex::new(Vec::new()));

        let t1 = trace.clone();
        let first = bus.on::<OrderedEvent>(
            "first",
            move |_, _| {
                t1.lock().push("first");
            },
            None,
        );
        let t2 = trace.clone();
        let second = bus.on::<OrderedEvent>(
            "second",
            move |_, _| {
                t2.lock().push("second");
            },
            Some(vec![Depends::new(first.clone())]),
        );

        let mut event = OrderedEvent::new();
        bus.emit(Arc::new(()), &mut event);
        bus.flush();

        let order = trace.lock().clone();
        assert_eq!(order, vec!["first", "second"]);
        bus.off::<OrderedEvent>(&first);
        bus.off::<OrderedEvent>(&second);
    }

    #[test]
    fn validate_dependencies_reports_cycles() {
        let bus = EventBus::global();
        // Pre-mint both ids so each handler can depend on the other.
        let h1 = HandlerId::new("h1");
        let h2 = HandlerId::new("h2");
        bus.on_with_id::<CyclicEvent>(h1.clone(), |_, _| {}, Some(vec![Depends::new(h2.clone())]));
        bus.on_with_id::<CyclicEvent>(h2.clone(), |_, _| {}, Some(vec![Depends::new(h1.clone())]));

        let err = bus
            .validate_dependencies()
            .expect_err("cycle must be detected");
        assert!(err.handlers.contains(&h1));
        assert!(err.handlers.contains(&h2));

        bus.off::<CyclicEvent>(&h1);
        bus.off::<CyclicEvent>(&h2);
        assert!(bus.validate_dependencies().is_ok());
    }

    #[test]
    fn orphan_closer_warns_and_continues() {
        reset_scope_stack();
        let bus = EventBus::global();

        // A task_completed with no prior task_started: parent stays unset,
        // the empty pop is handled per config (Warn), nothing panics.
        #[derive(Debug, Clone)]
        struct OrphanCloser {
            header: EventHeader,
        }
        impl_event!(OrphanCloser);

        let mut event = OrphanCloser {
            header: EventHeader::new("task_completed"),
        };
        bus.emit(Arc::new(()), &mut event);
        assert!(event.header.parent_event_id.is_none());
        assert_eq!(scope_depth(), 0);

        // Subsequent emission still works.
        let mut next = OrphanCloser {
            header: EventHeader::new("task_completed"),
        };
        bus.emit(Arc::new(()), &mut next);
        assert_eq!(
            next.header.previous_event_id.as_deref(),
            Some(event.header.event_id.as_str())
        );
    }

    #[test]
    fn start_end_pair_balances_the_stack() {
        reset_scope_stack();
        let bus = EventBus::global();

        #[derive(Debug, Clone)]
        struct Lifecycle {
            header: EventHeader,
        }
        impl_event!(Lifecycle);

        let mut started = Lifecycle {
            header: EventHeader::new("task_started"),
        };
        bus.emit(Arc::new(()), &mut started);
        assert_eq!(scope_depth(), 1);

        let mut inner = Lifecycle {
            header: EventHeader::new("llm_call_started"),
        };
        bus.emit(Arc::new(()), &mut inner);
        assert_eq!(
            inner.header.parent_event_id.as_deref(),
            Some(started.header.event_id.as_str())
        );

        let mut inner_done = Lifecycle {
            header: EventHeader::new("llm_call_completed"),
        };
        bus.emit(Arc::new(()), &mut inner_done);
        assert_eq!(
            inner_done.header.parent_event_id.as_deref(),
            Some(started.header.event_id.as_str())
        );

        let mut done = Lifecycle {
            header: EventHeader::new("task_completed"),
        };
        bus.emit(Arc::new(()), &mut done);
        assert_eq!(scope_depth(), 0);
        assert!(done.header.parent_event_id.is_none());
    }
}
