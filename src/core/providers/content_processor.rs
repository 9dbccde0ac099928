//! Content processing seam. Default is identity; hosts can install a
//! processor (redaction, normalization) process-wide.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

/// Transforms content before the runtime uses it.
pub trait ContentProcessorProvider: Send + Sync {
    /// Process `content`, optionally informed by `context`.
    fn process(&self, content: &str, context: Option<&HashMap<String, String>>) -> String;
}

struct IdentityProcessor;

impl ContentProcessorProvider for IdentityProcessor {
    fn process(&self, content: &str, _context: Option<&HashMap<String, String>>) -> String {
        content.to_string()
    }
}

static PROCESSOR: Lazy<Mutex<Option<Arc<dyn ContentProcessorProvider>>>> =
    Lazy::new(|| Mutex::new(None));

/// Install a processor process-wide.
pub fn set_processor(processor: Arc<dyn ContentProcessorProvider>) {
    *PROCESSOR.lock() = Some(processor);
}

/// Clear the installed processor, restoring identity.
pub fn reset_processor() {
    *PROCESSOR.lock() = None;
}

/// Run content through the installed processor, or identity.
pub fn process_content(content: &str, context: Option<&HashMap<String, String>>) -> String {
    let processor = PROCESSOR.lock().clone();
    match processor {
        Some(processor) => processor.process(content, context),
        None => IdentityProcessor.process(content, context),
    }
}
