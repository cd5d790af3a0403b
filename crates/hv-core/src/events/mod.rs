use std::sync::Arc;
use parking_lot::Mutex;
use ahash::AHashMap;

/// System-wide event bus.
///
/// Handlers run synchronously on the publishing task while the bus lock is
/// held, so a handler must not publish back into the same bus.
pub struct EventBus {
    handlers: Arc<Mutex<AHashMap<std::any::TypeId, Vec<Box<dyn EventHandler>>>>>,
}

/// Event trait that all events must implement
pub trait Event: Send + Sync + 'static {
    fn as_any(&self) -> &dyn std::any::Any;
}

/// Handler trait for event handlers
pub trait EventHandler: Send + Sync {
    fn handle(&mut self, event: &dyn Event);
}

/// Common system events
pub mod events {
    use super::Event;
    use crate::job::JobStatus;

    /// The seed snapshot finished (successfully or not)
    #[derive(Debug, Clone)]
    pub struct SeedLoaded {
        pub epoch: u64,
        pub record_count: usize,
        pub failed: bool,
    }

    /// A viewport session loaded every page it set out to load
    #[derive(Debug, Clone)]
    pub struct SessionCompleted {
        pub session_id: u64,
        pub bbox: String,
        pub pages: u32,
        pub records: usize,
    }

    /// A viewport session stopped at a failing page
    #[derive(Debug, Clone)]
    pub struct SessionFailed {
        pub session_id: u64,
        pub bbox: String,
        pub page: u32,
        pub error: String,
    }

    /// The store was reset by a filter or refresh change
    #[derive(Debug, Clone)]
    pub struct FilterChanged {
        pub filter: String,
        pub epoch: u64,
    }

    /// An ingestion job reported a new status
    #[derive(Debug, Clone)]
    pub struct JobStatusChanged {
        pub job_id: String,
        pub status: JobStatus,
        pub log_lines: usize,
    }

    // Implement Event trait for all event types
    macro_rules! impl_event {
        ($($t:ty),*) => {
            $(
                impl Event for $t {
                    fn as_any(&self) -> &dyn std::any::Any {
                        self
                    }
                }
            )*
        }
    }

    impl_event!(
        SeedLoaded,
        SessionCompleted,
        SessionFailed,
        FilterChanged,
        JobStatusChanged
    );
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Mutex::new(AHashMap::new())),
        }
    }

    /// Subscribe to events of a specific type
    pub fn subscribe<E: Event>(&self, handler: Box<dyn EventHandler>) {
        let type_id = std::any::TypeId::of::<E>();
        let mut handlers = self.handlers.lock();
        handlers.entry(type_id).or_insert_with(Vec::new).push(handler);
    }

    /// Subscribe with a closure that receives the concrete event type
    pub fn on<E, F>(&self, mut f: F)
    where
        E: Event,
        F: FnMut(&E) + Send + Sync + 'static,
    {
        self.subscribe::<E>(handler_from_fn(move |event: &dyn Event| {
            if let Some(event) = event.as_any().downcast_ref::<E>() {
                f(event);
            }
        }));
    }

    /// Publish an event
    pub fn publish<E: Event>(&self, event: E) {
        let type_id = std::any::TypeId::of::<E>();
        let mut handlers = self.handlers.lock();

        if let Some(event_handlers) = handlers.get_mut(&type_id) {
            for handler in event_handlers.iter_mut() {
                handler.handle(&event);
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper struct for creating event handlers from closures
pub struct ClosureEventHandler<F> {
    handler: F,
}

impl<F> EventHandler for ClosureEventHandler<F>
where
    F: FnMut(&dyn Event) + Send + Sync,
{
    fn handle(&mut self, event: &dyn Event) {
        (self.handler)(event);
    }
}

/// Create an event handler from a closure
pub fn handler_from_fn<F>(f: F) -> Box<dyn EventHandler>
where
    F: FnMut(&dyn Event) + Send + Sync + 'static,
{
    Box::new(ClosureEventHandler { handler: f })
}
