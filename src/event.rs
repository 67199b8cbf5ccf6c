//! Hardware callbacks turned into queued pipeline events.
//!
//! Hardware callback threads never touch pipeline state. The
//! [`CallbackRouter`] installed at init turns every notification into an
//! [`Event`] on the dispatcher queue, and every command completion or error
//! into an acknowledgement on the [`AckBoard`].

use std::sync::Arc;

use crossbeam_channel::Sender;

use crate::command::{AckBoard, Command};
use crate::component::ComponentRole;
use crate::error::ErrorCode;
use crate::hardware::{ComponentHandle, ConfigIndex, HardwareCallbacks};

/// A hardware notification waiting for the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Event {
    /// Output port settings changed.
    PortSettingsChanged { port: u32 },
    /// A config value changed.
    ConfigChanged { index: ConfigIndex },
    /// End of stream reached a port.
    EndOfStream { port: u32 },
    /// An input buffer of `role` was consumed.
    BufferEmptied { role: ComponentRole },
}

/// Message on the dispatcher queue.
#[derive(Debug)]
pub(crate) enum DispatchMessage {
    Event(Event),
    /// Ends the dispatcher loop.
    Stop,
}

/// The pipeline's [`HardwareCallbacks`] implementation.
pub(crate) struct CallbackRouter {
    events: Sender<DispatchMessage>,
    acks: Arc<AckBoard>,
}

impl CallbackRouter {
    pub fn new(events: Sender<DispatchMessage>, acks: Arc<AckBoard>) -> Self {
        Self { events, acks }
    }

    fn enqueue(&self, event: Event) {
        if self.events.send(DispatchMessage::Event(event)).is_err() {
            tracing::trace!(?event, "dispatcher gone, event dropped");
        }
    }
}

impl HardwareCallbacks for CallbackRouter {
    fn buffer_emptied(&self, handle: ComponentHandle) {
        self.enqueue(Event::BufferEmptied {
            role: handle.role(),
        });
    }

    fn port_settings_changed(&self, _handle: ComponentHandle, port: u32) {
        self.enqueue(Event::PortSettingsChanged { port });
    }

    fn config_changed(&self, _handle: ComponentHandle, index: ConfigIndex) {
        self.enqueue(Event::ConfigChanged { index });
    }

    fn end_of_stream(&self, _handle: ComponentHandle, port: u32) {
        self.enqueue(Event::EndOfStream { port });
    }

    fn error(&self, handle: ComponentHandle, code: ErrorCode) {
        if code != ErrorCode::SAME_STATE {
            tracing::error!(role = %handle.role(), %code, "component error");
        }
        self.acks.post_error(handle, code);
    }

    fn command_complete(&self, handle: ComponentHandle, command: Command) {
        self.acks.post_complete(handle, command);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentState;
    use std::time::Duration;

    fn router() -> (
        CallbackRouter,
        crossbeam_channel::Receiver<DispatchMessage>,
        Arc<AckBoard>,
    ) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let acks = Arc::new(AckBoard::new());
        (CallbackRouter::new(tx, acks.clone()), rx, acks)
    }

    fn next_event(rx: &crossbeam_channel::Receiver<DispatchMessage>) -> Event {
        match rx.try_recv() {
            Ok(DispatchMessage::Event(event)) => event,
            other => panic!("expected an event, got {other:?}"),
        }
    }

    #[test]
    fn test_notifications_are_queued_in_order() {
        let (router, rx, _) = router();
        let decoder = ComponentHandle::new(1, ComponentRole::Decoder);

        router.port_settings_changed(decoder, 131);
        router.config_changed(decoder, ConfigIndex::BufferStall);
        router.end_of_stream(decoder, 90);
        router.buffer_emptied(decoder);

        assert_eq!(next_event(&rx), Event::PortSettingsChanged { port: 131 });
        assert_eq!(
            next_event(&rx),
            Event::ConfigChanged {
                index: ConfigIndex::BufferStall
            }
        );
        assert_eq!(next_event(&rx), Event::EndOfStream { port: 90 });
        assert_eq!(
            next_event(&rx),
            Event::BufferEmptied {
                role: ComponentRole::Decoder
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_acks_bypass_the_queue() {
        let (router, rx, acks) = router();
        let clock = ComponentHandle::new(2, ComponentRole::Clock);
        let cmd = Command::StateSet(ComponentState::Idle);

        router.command_complete(clock, cmd);
        assert!(rx.try_recv().is_err());
        assert_eq!(acks.wait(clock, cmd, Duration::from_millis(10)), Ok(()));
    }

    #[test]
    fn test_send_after_dispatcher_exit_is_harmless() {
        let (router, rx, _) = router();
        drop(rx);
        router.end_of_stream(ComponentHandle::new(3, ComponentRole::Render), 90);
    }
}
