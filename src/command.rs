//! Acknowledgement board for asynchronous component commands.
//!
//! State changes and port flushes are requested with
//! [`Hardware::send_command`](crate::hardware::Hardware::send_command) and
//! complete later on a hardware callback thread. The board collects those
//! completions (and component errors) so the requesting thread can block
//! with a bounded timeout. Acknowledgements bypass the event dispatcher:
//! the dispatcher itself issues state changes while holding the pipeline
//! lock and must be able to receive the answer.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::component::ComponentState;
use crate::error::{ErrorCode, HardwareError};
use crate::hardware::ComponentHandle;

/// Upper bound on unclaimed acknowledgements kept around.
const MAX_PENDING_ACKS: usize = 64;

/// An asynchronous command sent to a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Move the component to the given state.
    StateSet(ComponentState),
    /// Return all buffers queued on the given port.
    Flush(u32),
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Complete(Command),
    Error(ErrorCode),
}

#[derive(Debug, Clone, Copy)]
struct Ack {
    handle: ComponentHandle,
    outcome: Outcome,
}

/// Collects command completions posted by hardware callback threads.
#[derive(Debug, Default)]
pub(crate) struct AckBoard {
    acks: Mutex<Vec<Ack>>,
    signal: Condvar,
}

impl AckBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `command` finished on `handle`.
    pub fn post_complete(&self, handle: ComponentHandle, command: Command) {
        self.post(Ack {
            handle,
            outcome: Outcome::Complete(command),
        });
    }

    /// Records an error reported by `handle`.
    pub fn post_error(&self, handle: ComponentHandle, code: ErrorCode) {
        self.post(Ack {
            handle,
            outcome: Outcome::Error(code),
        });
    }

    fn post(&self, ack: Ack) {
        let mut acks = self.acks.lock();
        if acks.len() >= MAX_PENDING_ACKS {
            acks.remove(0);
        }
        acks.push(ack);
        drop(acks);
        self.signal.notify_all();
    }

    /// Drops stale acknowledgements for `handle` before a new command.
    pub fn clear(&self, handle: ComponentHandle) {
        self.acks.lock().retain(|ack| ack.handle != handle);
    }

    /// Blocks until `command` completes on `handle`, the component reports
    /// an error, or `timeout` elapses.
    ///
    /// A `SameState` error counts as completion.
    pub fn wait(
        &self,
        handle: ComponentHandle,
        command: Command,
        timeout: Duration,
    ) -> Result<(), HardwareError> {
        let deadline = Instant::now() + timeout;
        let mut acks = self.acks.lock();

        loop {
            let found = acks.iter().position(|ack| {
                ack.handle == handle
                    && match ack.outcome {
                        Outcome::Complete(done) => done == command,
                        Outcome::Error(_) => true,
                    }
            });

            if let Some(index) = found {
                let ack = acks.remove(index);
                return match ack.outcome {
                    Outcome::Complete(_) => Ok(()),
                    Outcome::Error(ErrorCode::SAME_STATE) => Ok(()),
                    Outcome::Error(code) => Err(HardwareError::Code(code)),
                };
            }

            if self.signal.wait_until(&mut acks, deadline).timed_out() {
                return Err(HardwareError::Timeout);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentRole;
    use std::sync::Arc;

    fn handle(id: u64) -> ComponentHandle {
        ComponentHandle::new(id, ComponentRole::Clock)
    }

    #[test]
    fn test_wait_returns_posted_completion() {
        let board = AckBoard::new();
        let cmd = Command::StateSet(ComponentState::Idle);
        board.post_complete(handle(1), cmd);

        assert_eq!(board.wait(handle(1), cmd, Duration::from_millis(10)), Ok(()));
    }

    #[test]
    fn test_wait_ignores_other_handles_and_commands() {
        let board = AckBoard::new();
        board.post_complete(handle(2), Command::StateSet(ComponentState::Idle));
        board.post_complete(handle(1), Command::Flush(100));

        let result = board.wait(
            handle(1),
            Command::StateSet(ComponentState::Idle),
            Duration::from_millis(20),
        );
        assert_eq!(result, Err(HardwareError::Timeout));
    }

    #[test]
    fn test_wait_reports_component_error() {
        let board = AckBoard::new();
        board.post_error(handle(1), ErrorCode::INSUFFICIENT_RESOURCES);

        let result = board.wait(
            handle(1),
            Command::StateSet(ComponentState::Executing),
            Duration::from_millis(10),
        );
        assert_eq!(
            result,
            Err(HardwareError::Code(ErrorCode::INSUFFICIENT_RESOURCES))
        );
    }

    #[test]
    fn test_same_state_error_counts_as_success() {
        let board = AckBoard::new();
        board.post_error(handle(1), ErrorCode::SAME_STATE);

        let result = board.wait(
            handle(1),
            Command::StateSet(ComponentState::Idle),
            Duration::from_millis(10),
        );
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_clear_drops_stale_acks() {
        let board = AckBoard::new();
        let cmd = Command::Flush(100);
        board.post_complete(handle(1), cmd);
        board.clear(handle(1));

        assert_eq!(
            board.wait(handle(1), cmd, Duration::from_millis(10)),
            Err(HardwareError::Timeout)
        );
    }

    #[test]
    fn test_wait_wakes_on_post_from_other_thread() {
        let board = Arc::new(AckBoard::new());
        let cmd = Command::StateSet(ComponentState::Executing);

        let poster = {
            let board = board.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                board.post_complete(handle(7), cmd);
            })
        };

        assert_eq!(board.wait(handle(7), cmd, Duration::from_secs(5)), Ok(()));
        poster.join().unwrap();
    }
}
