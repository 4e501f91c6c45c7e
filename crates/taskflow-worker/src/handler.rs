use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use taskflow_core::{HandlerError, TaskEnvelope};

/// Trait for task handlers.
///
/// A handler owns the side effect for one task type. It reports failures
/// through `HandlerError` so the pipeline can classify them; it must never
/// acknowledge, publish, or otherwise touch the broker itself. Because the
/// dedup check and handler execution are not atomic, a handler may rarely
/// run twice for the same task id and should be idempotent in effect.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn execute(&self, envelope: &TaskEnvelope) -> Result<(), HandlerError>;
}

/// Registry of task handlers by task type.
pub struct TaskHandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn TaskHandler>>>,
}

impl TaskHandlerRegistry {
    pub fn new() -> Self {
        TaskHandlerRegistry {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handler for a task type, replacing any previous one.
    pub fn register<H: TaskHandler + 'static>(&self, task_type: impl Into<String>, handler: H) {
        let mut handlers = self.handlers.write();
        handlers.insert(task_type.into(), Arc::new(handler));
    }

    /// Resolve a handler. `None` means the type is unregistered, which the
    /// pipeline treats as a permanent failure.
    pub fn get(&self, task_type: &str) -> Option<Arc<dyn TaskHandler>> {
        let handlers = self.handlers.read();
        handlers.get(task_type).cloned()
    }

    pub fn has_handler(&self, task_type: &str) -> bool {
        let handlers = self.handlers.read();
        handlers.contains_key(task_type)
    }

    /// All registered task types.
    pub fn task_types(&self) -> Vec<String> {
        let handlers = self.handlers.read();
        handlers.keys().cloned().collect()
    }
}

impl Default for TaskHandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    struct OkHandler;

    #[async_trait]
    impl TaskHandler for OkHandler {
        async fn execute(&self, _envelope: &TaskEnvelope) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_register_and_resolve() {
        let registry = TaskHandlerRegistry::new();
        registry.register("echo", OkHandler);

        assert!(registry.has_handler("echo"));
        assert!(!registry.has_handler("unknown"));

        let handler = registry.get("echo").unwrap();
        let envelope = TaskEnvelope::new("echo", Map::new());
        handler.execute(&envelope).await.unwrap();
    }

    #[test]
    fn test_task_types() {
        let registry = TaskHandlerRegistry::new();
        registry.register("a", OkHandler);
        registry.register("b", OkHandler);

        let mut types = registry.task_types();
        types.sort();
        assert_eq!(types, vec!["a".to_string(), "b".to_string()]);
    }
}
