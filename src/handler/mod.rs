//! Observers of structural and flow-control events.
//!
//! Handlers are called synchronously on the dispatcher thread, in
//! registration order, with the pipeline lock held. They may call back into
//! the [`Pipeline`](crate::Pipeline) but must not block.
//!
//! Two ready-made handlers are provided:
//!
//! - [`event_handler`]: wraps a closure taking [`PipelineEvent`]
//! - [`ChannelHandler`]: forwards events into a tokio mpsc channel

mod channel;

pub use channel::ChannelHandler;

use std::sync::Arc;

use crate::component::ComponentRole;

/// A notification delivered to handlers, as a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineEvent {
    /// Output port settings changed on `port`.
    PortSettingsChanged(u32),
    /// The video decoder ran out of input while the clock is running.
    BufferStalled,
    /// End of stream reached `port`.
    EndOfStream(u32),
    /// The hardware finished with an input buffer of the role.
    BufferEmptied(ComponentRole),
    /// Periodic 100 ms tick.
    Tick,
}

/// An observer of pipeline events.
///
/// Every method has an empty default, so implementors only override what
/// they care about.
///
/// # Example
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use omx_pipeline::EventHandler;
///
/// #[derive(Default)]
/// struct StallCounter(AtomicUsize);
///
/// impl EventHandler for StallCounter {
///     fn buffer_stalled(&self) {
///         self.0.fetch_add(1, Ordering::Relaxed);
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    /// Output port settings changed. Called after the pipeline reacted.
    fn port_settings_changed(&self, _port: u32) {}

    /// The video decoder stalled.
    fn buffer_stalled(&self) {}

    /// End of stream reached `port`.
    fn end_of_stream(&self, _port: u32) {}

    /// An input buffer of `role` was consumed.
    fn buffer_emptied(&self, _role: ComponentRole) {}

    /// Periodic tick.
    fn tick(&self) {}
}

/// Dispatches `event` to the matching method of `handler`.
pub(crate) fn notify(handler: &dyn EventHandler, event: PipelineEvent) {
    match event {
        PipelineEvent::PortSettingsChanged(port) => handler.port_settings_changed(port),
        PipelineEvent::BufferStalled => handler.buffer_stalled(),
        PipelineEvent::EndOfStream(port) => handler.end_of_stream(port),
        PipelineEvent::BufferEmptied(role) => handler.buffer_emptied(role),
        PipelineEvent::Tick => handler.tick(),
    }
}

struct FnHandler<F>(F);

impl<F> EventHandler for FnHandler<F>
where
    F: Fn(PipelineEvent) + Send + Sync,
{
    fn port_settings_changed(&self, port: u32) {
        (self.0)(PipelineEvent::PortSettingsChanged(port));
    }

    fn buffer_stalled(&self) {
        (self.0)(PipelineEvent::BufferStalled);
    }

    fn end_of_stream(&self, port: u32) {
        (self.0)(PipelineEvent::EndOfStream(port));
    }

    fn buffer_emptied(&self, role: ComponentRole) {
        (self.0)(PipelineEvent::BufferEmptied(role));
    }

    fn tick(&self) {
        (self.0)(PipelineEvent::Tick);
    }
}

/// Creates a handler from a closure.
///
/// # Example
///
/// ```
/// use omx_pipeline::{event_handler, PipelineEvent};
///
/// let handler = event_handler(|event| {
///     if event != PipelineEvent::Tick {
///         println!("pipeline event: {event:?}");
///     }
/// });
/// ```
pub fn event_handler<F>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(PipelineEvent) + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

/// Ordered handler collection, owned by the pipeline state.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    /// Removes `handler` by identity. Returns whether it was registered.
    pub fn remove(&mut self, handler: &Arc<dyn EventHandler>) -> bool {
        let before = self.handlers.len();
        self.handlers
            .retain(|h| !std::ptr::addr_eq(Arc::as_ptr(h), Arc::as_ptr(handler)));
        self.handlers.len() != before
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    /// Snapshot for notification outside the state borrow.
    pub fn snapshot(&self) -> Vec<Arc<dyn EventHandler>> {
        self.handlers.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<(u8, PipelineEvent)>>>, tag: u8) -> Arc<dyn EventHandler> {
        let log = log.clone();
        event_handler(move |event| log.lock().push((tag, event)))
    }

    #[test]
    fn test_default_methods_do_nothing() {
        struct Silent;
        impl EventHandler for Silent {}

        let handler = Silent;
        notify(&handler, PipelineEvent::Tick);
        notify(&handler, PipelineEvent::EndOfStream(90));
    }

    #[test]
    fn test_closure_handler_receives_events() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handler = recorder(&log, 0);

        notify(handler.as_ref(), PipelineEvent::PortSettingsChanged(191));
        notify(handler.as_ref(), PipelineEvent::BufferEmptied(ComponentRole::AudioRender));

        assert_eq!(
            *log.lock(),
            vec![
                (0, PipelineEvent::PortSettingsChanged(191)),
                (0, PipelineEvent::BufferEmptied(ComponentRole::AudioRender)),
            ]
        );
    }

    #[test]
    fn test_registration_order_is_kept() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        registry.add(recorder(&log, 1));
        registry.add(recorder(&log, 2));
        registry.add(recorder(&log, 3));

        for handler in registry.snapshot() {
            notify(handler.as_ref(), PipelineEvent::Tick);
        }

        let tags: Vec<u8> = log.lock().iter().map(|(tag, _)| *tag).collect();
        assert_eq!(tags, vec![1, 2, 3]);
    }

    #[test]
    fn test_remove_by_identity() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        let first = recorder(&log, 1);
        let second = recorder(&log, 2);
        registry.add(first.clone());
        registry.add(second.clone());

        assert!(registry.remove(&first));
        assert!(!registry.remove(&first));
        assert_eq!(registry.len(), 1);

        for handler in registry.snapshot() {
            notify(handler.as_ref(), PipelineEvent::BufferStalled);
        }
        assert_eq!(*log.lock(), vec![(2, PipelineEvent::BufferStalled)]);
    }

    #[test]
    fn test_handler_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn EventHandler>();
    }
}
