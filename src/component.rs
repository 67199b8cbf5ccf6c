//! Component registry: one hardware handle per role.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::buffer::BufferHeader;
use crate::command::{AckBoard, Command};
use crate::error::{HardwareError, PipelineError};
use crate::hardware::{
    ComponentHandle, Config, ConfigIndex, Hardware, Parameter, ParameterIndex, SubmitRejected,
};

/// The fixed set of hardware components a pipeline can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentRole {
    /// Video decoder.
    Decoder,
    /// Video effects (deinterlacer).
    Fx,
    /// Video scheduler, presents decoded frames against the clock.
    Scheduler,
    /// Video render.
    Render,
    /// Audio render.
    AudioRender,
    /// Shared media clock.
    Clock,
}

impl ComponentRole {
    /// Every role, in slot order.
    pub const ALL: [Self; 6] = [
        Self::Decoder,
        Self::Fx,
        Self::Scheduler,
        Self::Render,
        Self::AudioRender,
        Self::Clock,
    ];

    /// Name the hardware knows this component by.
    pub fn hardware_name(self) -> &'static str {
        match self {
            Self::Decoder => "video_decode",
            Self::Fx => "image_fx",
            Self::Scheduler => "video_scheduler",
            Self::Render => "video_render",
            Self::AudioRender => "audio_render",
            Self::Clock => "clock",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ComponentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.hardware_name())
    }
}

/// Component states, in bring-up order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentState {
    /// Created, no resources allocated.
    Loaded,
    /// Resources allocated, not processing.
    Idle,
    /// Processing buffers.
    Executing,
}

impl ComponentState {
    /// The neighbouring state one rung closer to `target`.
    fn step_toward(self, target: Self) -> Self {
        match (self, target) {
            (Self::Loaded, _) => Self::Idle,
            (Self::Executing, _) => Self::Idle,
            (Self::Idle, other) => other,
        }
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Loaded => "loaded",
            Self::Idle => "idle",
            Self::Executing => "executing",
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct ComponentEntry {
    handle: ComponentHandle,
    state: ComponentState,
}

/// Owns the live component handles and gates every hardware call on them.
///
/// All access happens under the pipeline lock.
pub(crate) struct ComponentRegistry {
    hardware: Arc<dyn Hardware>,
    acks: Arc<AckBoard>,
    slots: [Option<ComponentEntry>; 6],
    state_change_timeout: Duration,
    flush_timeout: Duration,
}

impl ComponentRegistry {
    pub fn new(
        hardware: Arc<dyn Hardware>,
        acks: Arc<AckBoard>,
        state_change_timeout: Duration,
        flush_timeout: Duration,
    ) -> Self {
        Self {
            hardware,
            acks,
            slots: [None; 6],
            state_change_timeout,
            flush_timeout,
        }
    }

    pub fn hardware(&self) -> &Arc<dyn Hardware> {
        &self.hardware
    }

    /// Creates the component for `role`.
    pub fn create(
        &mut self,
        role: ComponentRole,
        enable_input_buffers: bool,
    ) -> Result<ComponentHandle, PipelineError> {
        if self.slots[role.slot()].is_some() {
            return Err(PipelineError::ComponentExists { role });
        }

        let handle = self
            .hardware
            .create_component(role, enable_input_buffers)
            .map_err(|source| PipelineError::ComponentCreateFailed { role, source })?;

        tracing::debug!(%role, ?handle, enable_input_buffers, "component created");
        self.slots[role.slot()] = Some(ComponentEntry {
            handle,
            state: ComponentState::Loaded,
        });
        Ok(handle)
    }

    /// Releases the component for `role`. Missing handles are ignored.
    pub fn cleanup(&mut self, role: ComponentRole) {
        if let Some(entry) = self.slots[role.slot()].take() {
            self.acks.clear(entry.handle);
            self.hardware.destroy_component(entry.handle);
            tracing::debug!(%role, "component released");
        }
    }

    pub fn cleanup_all(&mut self) {
        for role in ComponentRole::ALL {
            self.cleanup(role);
        }
    }

    pub fn handle(&self, role: ComponentRole) -> Option<ComponentHandle> {
        self.slots[role.slot()].map(|entry| entry.handle)
    }

    pub fn state(&self, role: ComponentRole) -> Option<ComponentState> {
        self.slots[role.slot()].map(|entry| entry.state)
    }

    pub fn exists(&self, role: ComponentRole) -> bool {
        self.slots[role.slot()].is_some()
    }

    /// Moves `role` to `target`, one acknowledged rung at a time.
    ///
    /// Blocks for at most the state change timeout per rung. On failure the
    /// recorded state is the last acknowledged one.
    pub fn change_state(
        &mut self,
        role: ComponentRole,
        target: ComponentState,
    ) -> Result<(), PipelineError> {
        let mut entry = self.slots[role.slot()].ok_or(PipelineError::ComponentMissing { role })?;

        while entry.state != target {
            let next = entry.state.step_toward(target);
            let result = self.request(entry.handle, Command::StateSet(next), self.state_change_timeout);
            if let Err(source) = result {
                self.slots[role.slot()] = Some(entry);
                return Err(PipelineError::StateChangeFailed {
                    role,
                    to: next,
                    source,
                });
            }
            tracing::debug!(%role, from = %entry.state, to = %next, "state changed");
            entry.state = next;
        }

        self.slots[role.slot()] = Some(entry);
        Ok(())
    }

    /// Returns all buffers queued on `port` of `role` to their owner.
    pub fn flush(&mut self, role: ComponentRole, port: u32) -> Result<(), PipelineError> {
        let handle = self.handle(role).ok_or(PipelineError::ComponentMissing { role })?;
        self.request(handle, Command::Flush(port), self.flush_timeout)
            .map_err(|source| PipelineError::FlushFailed { role, port, source })
    }

    fn request(
        &self,
        handle: ComponentHandle,
        command: Command,
        timeout: Duration,
    ) -> Result<(), HardwareError> {
        self.acks.clear(handle);
        self.hardware.send_command(handle, command)?;
        self.acks.wait(handle, command, timeout)
    }

    pub fn enable_port_buffers(
        &mut self,
        role: ComponentRole,
        port: u32,
    ) -> Result<(), PipelineError> {
        let handle = self.handle(role).ok_or(PipelineError::ComponentMissing { role })?;
        self.hardware
            .enable_port_buffers(handle, port)
            .map_err(|source| PipelineError::PortBuffersFailed { role, port, source })
    }

    /// Frees the buffers of `port`, handing back every descriptor the
    /// pipeline still owns.
    pub fn disable_port_buffers(
        &mut self,
        role: ComponentRole,
        port: u32,
        owned: Vec<BufferHeader>,
    ) {
        match self.handle(role) {
            Some(handle) => self.hardware.disable_port_buffers(handle, port, owned),
            None => tracing::debug!(%role, port, "no component to disable port buffers on"),
        }
    }

    fn require(&self, role: ComponentRole) -> Result<ComponentHandle, HardwareError> {
        self.handle(role).ok_or(HardwareError::NoHandle(role))
    }

    pub fn get_parameter(
        &self,
        role: ComponentRole,
        index: ParameterIndex,
        port: u32,
    ) -> Result<Parameter, HardwareError> {
        self.hardware.get_parameter(self.require(role)?, index, port)
    }

    pub fn set_parameter(&self, role: ComponentRole, param: &Parameter) -> Result<(), HardwareError> {
        self.hardware.set_parameter(self.require(role)?, param)
    }

    pub fn get_config(
        &self,
        role: ComponentRole,
        index: ConfigIndex,
        port: u32,
    ) -> Result<Config, HardwareError> {
        self.hardware.get_config(self.require(role)?, index, port)
    }

    pub fn set_config(&self, role: ComponentRole, config: &Config) -> Result<(), HardwareError> {
        self.hardware.set_config(self.require(role)?, config)
    }

    pub fn input_buffer(&self, role: ComponentRole, port: u32) -> Option<BufferHeader> {
        self.hardware.get_input_buffer(self.handle(role)?, port)
    }

    /// Submits `buffer`. On failure the buffer comes back to the caller.
    pub fn empty_buffer(
        &self,
        role: ComponentRole,
        buffer: BufferHeader,
    ) -> Result<(), SubmitRejected> {
        match self.handle(role) {
            Some(handle) => self.hardware.empty_buffer(handle, buffer),
            None => Err(SubmitRejected {
                buffer,
                error: HardwareError::NoHandle(role),
            }),
        }
    }
}

/// Registry wired to `mock` with short timeouts. Events are discarded.
#[cfg(test)]
pub(crate) fn test_registry(mock: &Arc<crate::hardware::mock::MockHardware>) -> ComponentRegistry {
    use crate::event::CallbackRouter;

    let acks = Arc::new(AckBoard::new());
    let (events, _) = crossbeam_channel::unbounded();
    mock.register_callbacks(Arc::new(CallbackRouter::new(events, acks.clone())));
    ComponentRegistry::new(
        mock.clone(),
        acks,
        Duration::from_millis(50),
        Duration::from_millis(50),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{HardwareCall, MockHardware};

    fn registry(mock: &Arc<MockHardware>) -> ComponentRegistry {
        test_registry(mock)
    }

    #[test]
    fn test_double_create_fails() {
        let mock = Arc::new(MockHardware::new());
        let mut reg = registry(&mock);

        reg.create(ComponentRole::Clock, false).unwrap();
        let err = reg.create(ComponentRole::Clock, false).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ComponentExists {
                role: ComponentRole::Clock
            }
        ));
    }

    #[test]
    fn test_cleanup_then_create_succeeds() {
        let mock = Arc::new(MockHardware::new());
        let mut reg = registry(&mock);

        reg.create(ComponentRole::Render, false).unwrap();
        reg.cleanup(ComponentRole::Render);
        assert!(!reg.exists(ComponentRole::Render));
        reg.create(ComponentRole::Render, false).unwrap();
        assert_eq!(reg.state(ComponentRole::Render), Some(ComponentState::Loaded));
    }

    #[test]
    fn test_cleanup_missing_is_noop() {
        let mock = Arc::new(MockHardware::new());
        let mut reg = registry(&mock);

        reg.cleanup(ComponentRole::Decoder);
        assert_eq!(mock.count(|c| matches!(c, HardwareCall::DestroyComponent { .. })), 0);
    }

    #[test]
    fn test_create_failure_is_reported() {
        let mock = Arc::new(MockHardware::new());
        mock.fail_create(ComponentRole::Fx);
        let mut reg = registry(&mock);

        let err = reg.create(ComponentRole::Fx, false).unwrap_err();
        assert!(matches!(err, PipelineError::ComponentCreateFailed { .. }));
        assert!(!reg.exists(ComponentRole::Fx));
    }

    #[test]
    fn test_change_state_walks_through_idle() {
        let mock = Arc::new(MockHardware::new());
        let mut reg = registry(&mock);
        reg.create(ComponentRole::Clock, false).unwrap();

        reg.change_state(ComponentRole::Clock, ComponentState::Executing)
            .unwrap();

        assert_eq!(reg.state(ComponentRole::Clock), Some(ComponentState::Executing));
        assert_eq!(
            mock.state_requests(ComponentRole::Clock),
            vec![ComponentState::Idle, ComponentState::Executing]
        );
    }

    #[test]
    fn test_change_state_to_current_state_is_noop() {
        let mock = Arc::new(MockHardware::new());
        let mut reg = registry(&mock);
        reg.create(ComponentRole::Clock, false).unwrap();

        reg.change_state(ComponentRole::Clock, ComponentState::Loaded)
            .unwrap();
        assert!(mock.state_requests(ComponentRole::Clock).is_empty());
    }

    #[test]
    fn test_change_state_times_out_without_ack() {
        let mock = Arc::new(MockHardware::new());
        let mut reg = registry(&mock);
        reg.create(ComponentRole::AudioRender, true).unwrap();
        mock.drop_acks(true);

        let err = reg
            .change_state(ComponentRole::AudioRender, ComponentState::Idle)
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::StateChangeFailed {
                source: HardwareError::Timeout,
                ..
            }
        ));
        assert_eq!(
            reg.state(ComponentRole::AudioRender),
            Some(ComponentState::Loaded)
        );
    }

    #[test]
    fn test_change_state_missing_component() {
        let mock = Arc::new(MockHardware::new());
        let mut reg = registry(&mock);

        let err = reg
            .change_state(ComponentRole::Scheduler, ComponentState::Idle)
            .unwrap_err();
        assert!(matches!(err, PipelineError::ComponentMissing { .. }));
    }

    #[test]
    fn test_flush_waits_for_ack() {
        let mock = Arc::new(MockHardware::new());
        let mut reg = registry(&mock);
        reg.create(ComponentRole::AudioRender, true).unwrap();

        reg.flush(ComponentRole::AudioRender, 100).unwrap();

        mock.drop_acks(true);
        let err = reg.flush(ComponentRole::AudioRender, 100).unwrap_err();
        assert!(matches!(err, PipelineError::FlushFailed { port: 100, .. }));
    }
}
