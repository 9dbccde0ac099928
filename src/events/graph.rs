//! Handler dependency resolution.
//!
//! Handlers registered for one event type may declare dependencies on each
//! other. This module resolves that DAG into an execution plan — a sequence
//! of levels, each a set of handlers that may run in parallel — using
//! Kahn's algorithm. A positive in-degree left after the sort means the
//! graph has a cycle.

use std::collections::{HashMap, HashSet, VecDeque};

use super::bus::{Depends, ExecutionPlan, HandlerId};

/// Cycle among handler dependencies for a single event type.
#[derive(Debug, Clone, thiserror::Error)]
#[error("circular dependency among event handlers: {}", joined_names(.handlers))]
pub struct CircularDependencyError {
    /// Handlers participating in the cycle (order is not meaningful).
    pub handlers: Vec<HandlerId>,
}

fn joined_names(handlers: &[HandlerId]) -> String {
    handlers
        .iter()
        .take(5)
        .map(|h| h.name())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolve handler dependencies into ordered execution levels.
///
/// Level 0 holds handlers with no dependencies; level N holds handlers
/// whose dependencies all sit in levels `0..N`. For every edge `A → B`,
/// `A`'s level precedes `B`'s.
pub fn build_execution_plan(
    handler_ids: &[HandlerId],
    dependencies: &HashMap<HandlerId, Vec<Depends>>,
) -> Result<ExecutionPlan, CircularDependencyError> {
    let mut dependents: HashMap<HandlerId, HashSet<HandlerId>> = HashMap::new();
    let mut in_degree: HashMap<HandlerId, usize> = HashMap::new();

    for id in handler_ids {
        let deps = dependencies.get(id).map(Vec::as_slice).unwrap_or(&[]);
        // Only count dependencies on handlers actually registered for this
        // event type; a dangling Depends would deadlock the sort otherwise.
        let live: Vec<&Depends> = deps
            .iter()
            .filter(|d| handler_ids.contains(&d.handler_id))
            .collect();
        in_degree.insert(id.clone(), live.len());
        for dep in live {
            dependents
                .entry(dep.handler_id.clone())
                .or_default()
                .insert(id.clone());
        }
    }

    let mut queue: VecDeque<HandlerId> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(id, _)| id.clone())
        .collect();

    let mut levels: ExecutionPlan = Vec::new();

    while !queue.is_empty() {
        let mut level: HashSet<HandlerId> = HashSet::new();
        for _ in 0..queue.len() {
            let id = queue.pop_front().expect("queue length checked");
            if let Some(children) = dependents.get(&id) {
                for child in children {
                    if let Some(deg) = in_degree.get_mut(child) {
                        *deg -= 1;
                        if *deg == 0 {
                            queue.push_back(child.clone());
                        }
                    }
                }
            }
            level.insert(id);
        }
        levels.push(level);
    }

    let stuck: Vec<HandlerId> = in_degree
        .into_iter()
        .filter(|(_, deg)| *deg > 0)
        .map(|(id, _)| id)
        .collect();

    if stuck.is_empty() {
        Ok(levels)
    } else {
        Err(CircularDependencyError { handlers: stuck })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<HandlerId> {
        (0..n).map(|i| HandlerId::new(format!("h{}", i))).collect()
    }

    #[test]
    fn independent_handlers_share_one_level() {
        let handlers = ids(3);
        let plan = build_execution_plan(&handlers, &HashMap::new()).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].len(), 3);
    }

    #[test]
    fn chain_produces_one_handler_per_level() {
        let handlers = ids(3);
        let mut deps = HashMap::new();
        deps.insert(handlers[1].clone(), vec![Depends::new(handlers[0].clone())]);
        deps.insert(handlers[2].clone(), vec![Depends::new(handlers[1].clone())]);

        let plan = build_execution_plan(&handlers, &deps).unwrap();
        assert_eq!(plan.len(), 3);
        assert!(plan[0].contains(&handlers[0]));
        assert!(plan[1].contains(&handlers[1]));
        assert!(plan[2].contains(&handlers[2]));
    }

    #[test]
    fn diamond_puts_the_middle_in_parallel() {
        // h0 -> {h1, h2} -> h3
        let handlers = ids(4);
        let mut deps = HashMap::new();
        deps.insert(handlers[1].clone(), vec![Depends::new(handlers[0].clone())]);
        deps.insert(handlers[2].clone(), vec![Depends::new(handlers[0].clone())]);
        deps.insert(
            handlers[3].clone(),
            vec![
                Depends::new(handlers[1].clone()),
                Depends::new(handlers[2].clone()),
            ],
        );

        let plan = build_execution_plan(&handlers, &deps).unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[1].len(), 2);
        // Every dependency sits in an earlier level than its dependent.
        let level_of = |id: &HandlerId| plan.iter().position(|l| l.contains(id)).unwrap();
        assert!(level_of(&handlers[0]) < level_of(&handlers[1]));
        assert!(level_of(&handlers[1]) < level_of(&handlers[3]));
        assert!(level_of(&handlers[2]) < level_of(&handlers[3]));
    }

    #[test]
    fn two_handler_cycle_is_reported() {
        let handlers = ids(2);
        let mut deps = HashMap::new();
        deps.insert(handlers[0].clone(), vec![Depends::new(handlers[1].clone())]);
        deps.insert(handlers[1].clone(), vec![Depends::new(handlers[0].clone())]);

        let err = build_execution_plan(&handlers, &deps).unwrap_err();
        assert_eq!(err.handlers.len(), 2);
        assert!(err.handlers.contains(&handlers[0]));
        assert!(err.handlers.contains(&handlers[1]));
    }

    #[test]
    fn dangling_dependency_is_ignored() {
        let handlers = ids(1);
        let ghost = HandlerId::new("unregistered");
        let mut deps = HashMap::new();
        deps.insert(handlers[0].clone(), vec![Depends::new(ghost)]);

        let plan = build_execution_plan(&handlers, &deps).unwrap();
        assert_eq!(plan.len(), 1);
    }
}
