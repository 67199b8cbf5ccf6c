//! Tokio mpsc channel handler.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::component::ComponentRole;
use crate::handler::{EventHandler, PipelineEvent};

/// Forwards pipeline events into a tokio mpsc channel.
///
/// Sending never blocks the dispatcher: when the channel is full or closed
/// the event is dropped and counted. Ticks are not forwarded unless enabled
/// with [`with_ticks`](Self::with_ticks), since they arrive ten times a
/// second.
///
/// # Example
///
/// ```
/// use omx_pipeline::{ChannelHandler, PipelineEvent};
/// use tokio::sync::mpsc;
///
/// let (tx, mut rx) = mpsc::channel::<PipelineEvent>(64);
/// let handler = ChannelHandler::new(tx);
///
/// // Register with Pipeline::add_event_handler(Arc::new(handler)), then:
/// // while let Some(event) = rx.recv().await { ... }
/// ```
pub struct ChannelHandler {
    sender: mpsc::Sender<PipelineEvent>,
    ticks: bool,
    dropped: AtomicU64,
}

impl ChannelHandler {
    /// Creates a handler forwarding everything except ticks.
    pub fn new(sender: mpsc::Sender<PipelineEvent>) -> Self {
        Self {
            sender,
            ticks: false,
            dropped: AtomicU64::new(0),
        }
    }

    /// Also forwards [`PipelineEvent::Tick`].
    pub fn with_ticks(mut self) -> Self {
        self.ticks = true;
        self
    }

    /// Number of events that could not be delivered.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn forward(&self, event: PipelineEvent) {
        if let Err(e) = self.sender.try_send(event) {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    tracing::warn!(?event, dropped, "event channel full, event dropped");
                }
                mpsc::error::TrySendError::Closed(_) => {
                    tracing::debug!(?event, dropped, "event channel closed, event dropped");
                }
            }
        }
    }
}

impl EventHandler for ChannelHandler {
    fn port_settings_changed(&self, port: u32) {
        self.forward(PipelineEvent::PortSettingsChanged(port));
    }

    fn buffer_stalled(&self) {
        self.forward(PipelineEvent::BufferStalled);
    }

    fn end_of_stream(&self, port: u32) {
        self.forward(PipelineEvent::EndOfStream(port));
    }

    fn buffer_emptied(&self, role: ComponentRole) {
        self.forward(PipelineEvent::BufferEmptied(role));
    }

    fn tick(&self) {
        if self.ticks {
            self.forward(PipelineEvent::Tick);
        }
    }
}
