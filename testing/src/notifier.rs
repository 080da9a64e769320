use arena_core::event::{LifecycleEvent, LifecycleNotifier, NotifyError};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

/// Notifier that keeps every event it receives, in order.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<LifecycleEvent>>>,
}

impl RecordingNotifier {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All events received so far
    #[must_use]
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Event type names received so far, e.g. `"TicketPaid.v1"`
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events()
            .iter()
            .map(LifecycleEvent::event_type)
            .collect()
    }

    /// Forget recorded events
    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl LifecycleNotifier for RecordingNotifier {
    fn notify(
        &self,
        event: LifecycleEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        Box::pin(async { Ok(()) })
    }
}

/// Notifier whose every delivery fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingNotifier;

impl LifecycleNotifier for FailingNotifier {
    fn notify(
        &self,
        event: LifecycleEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        Box::pin(async move {
            Err(NotifyError(format!(
                "channel unavailable for {}",
                event.event_type()
            )))
        })
    }
}
