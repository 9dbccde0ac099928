//! Result cache for tool invocations, shared across an agent's loop
//! iterations so repeated identical calls are served locally.

use std::collections::HashMap;

use parking_lot::Mutex;

/// Keyed by `(tool name, serialized arguments)`.
#[derive(Default)]
pub struct ToolCache {
    entries: Mutex<HashMap<(String, String), String>>,
}

impl ToolCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached output for a previous identical invocation.
    pub fn read(&self, tool: &str, input: &str) -> Option<String> {
        self.entries
            .lock()
            .get(&(tool.to_string(), input.to_string()))
            .cloned()
    }

    /// Record an invocation's output.
    pub fn add(&self, tool: &str, input: &str, output: &str) {
        self.entries
            .lock()
            .insert((tool.to_string(), input.to_string()), output.to_string());
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_requires_same_tool_and_input() {
        let cache = ToolCache::new();
        cache.add("search", "{\"q\":1}", "found");
        assert_eq!(cache.read("search", "{\"q\":1}").as_deref(), Some("found"));
        assert!(cache.read("search", "{\"q\":2}").is_none());
        assert!(cache.read("other", "{\"q\":1}").is_none());

        cache.clear();
        assert!(cache.read("search", "{\"q\":1}").is_none());
    }
}
