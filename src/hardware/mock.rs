//! In-process hardware for testing without a device.
//!
//! [`MockHardware`] keeps just enough component state to answer the
//! protocol: component states, stored configs and parameters, per-port
//! buffer pools and the buffers currently submitted. Every call is recorded
//! as a [`HardwareCall`] and failures can be injected per operation.
//! Callbacks are delivered synchronously on whichever thread triggers them,
//! so tests can fire events from any number of threads.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use omx_pipeline::hardware::mock::MockHardware;
//! use omx_pipeline::{ComponentRole, Pipeline};
//!
//! let hw = Arc::new(MockHardware::new());
//! let pipeline = Pipeline::builder(hw.clone()).display(0, 1).init().unwrap();
//!
//! assert!(hw.is_alive(ComponentRole::Clock));
//! pipeline.deinit();
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::audio::AudioEncoding;
use crate::buffer::{BufferFlags, BufferHeader};
use crate::clock::{ClockStateConfig, Ticks};
use crate::command::Command;
use crate::component::{ComponentRole, ComponentState};
use crate::error::{ErrorCode, HardwareError};
use crate::hardware::{
    ComponentHandle, Config, ConfigIndex, Hardware, HardwareCallbacks, Parameter, ParameterIndex,
    PortDefinition, SubmitRejected, TunnelSpec,
};

/// Buffers per port when no definition was configured.
const DEFAULT_BUFFER_COUNT: u32 = 16;
/// Buffer size when no definition was configured.
const DEFAULT_BUFFER_SIZE: u32 = 2048;

/// One recorded call into [`MockHardware`].
#[derive(Debug, Clone, PartialEq)]
pub enum HardwareCall {
    /// `create_component`.
    CreateComponent {
        /// Requested role.
        role: ComponentRole,
        /// Input buffer management requested.
        enable_input_buffers: bool,
    },
    /// `destroy_component`.
    DestroyComponent {
        /// Destroyed role.
        role: ComponentRole,
    },
    /// `send_command`.
    SendCommand {
        /// Target role.
        role: ComponentRole,
        /// Command sent.
        command: Command,
    },
    /// `get_parameter`.
    GetParameter {
        /// Target role.
        role: ComponentRole,
        /// Index read.
        index: ParameterIndex,
        /// Port read.
        port: u32,
    },
    /// `set_parameter`.
    SetParameter {
        /// Target role.
        role: ComponentRole,
        /// Block written.
        param: Parameter,
        /// Whether the mock accepted it.
        accepted: bool,
    },
    /// `get_config`.
    GetConfig {
        /// Target role.
        role: ComponentRole,
        /// Index read.
        index: ConfigIndex,
        /// Port read.
        port: u32,
    },
    /// `set_config`.
    SetConfig {
        /// Target role.
        role: ComponentRole,
        /// Block written.
        config: Config,
        /// Whether the mock accepted it.
        accepted: bool,
    },
    /// `enable_port_buffers`.
    EnablePortBuffers {
        /// Target role.
        role: ComponentRole,
        /// Port enabled.
        port: u32,
    },
    /// `disable_port_buffers`.
    DisablePortBuffers {
        /// Target role.
        role: ComponentRole,
        /// Port disabled.
        port: u32,
        /// Descriptors handed back by the caller.
        returned: usize,
    },
    /// `get_input_buffer`.
    GetInputBuffer {
        /// Target role.
        role: ComponentRole,
        /// Port asked.
        port: u32,
        /// Whether a buffer was handed out.
        granted: bool,
    },
    /// `empty_buffer`.
    EmptyBuffer {
        /// Target role.
        role: ComponentRole,
        /// Descriptor id.
        buffer: u32,
        /// Flags at submit time.
        flags: BufferFlags,
        /// Timestamp at submit time.
        timestamp: Ticks,
        /// Whether the mock accepted it.
        accepted: bool,
    },
    /// `setup_tunnel`.
    SetupTunnel {
        /// Source role.
        source: ComponentRole,
        /// Source port.
        source_port: u32,
        /// Sink role.
        sink: ComponentRole,
        /// Sink port.
        sink_port: u32,
        /// Whether negotiation succeeded.
        accepted: bool,
    },
    /// `disable_tunnel`.
    DisableTunnel {
        /// Source port.
        source_port: u32,
        /// Sink port.
        sink_port: u32,
    },
    /// `teardown_tunnel`.
    TeardownTunnel {
        /// Source port.
        source_port: u32,
        /// Sink port.
        sink_port: u32,
    },
    /// `flush_tunnel`.
    FlushTunnel {
        /// Source port.
        source_port: u32,
        /// Sink port.
        sink_port: u32,
    },
}

struct MockComponent {
    role: ComponentRole,
    state: ComponentState,
    input_buffers: bool,
    configs: HashMap<ConfigIndex, Config>,
    params: HashMap<(ParameterIndex, u32), Parameter>,
    free: HashMap<u32, Vec<BufferHeader>>,
    in_flight: Vec<BufferHeader>,
}

#[derive(Default)]
struct Inner {
    next_handle: u64,
    next_buffer: u32,
    components: HashMap<u64, MockComponent>,
    calls: Vec<HardwareCall>,
    port_definitions: HashMap<(ComponentRole, u32), PortDefinition>,
    fail_create: HashSet<ComponentRole>,
    fail_empty: u32,
    fail_tunnel_ports: HashSet<u32>,
    fail_get_config: HashSet<ConfigIndex>,
    fail_set_config: HashSet<ConfigIndex>,
    fail_set_parameter: HashSet<ParameterIndex>,
    drop_acks: bool,
    stalled: bool,
    media_time: Ticks,
    audio_latency: u32,
}

impl Inner {
    fn component(&mut self, handle: ComponentHandle) -> Result<&mut MockComponent, HardwareError> {
        self.components
            .get_mut(&handle.id())
            .ok_or(HardwareError::Code(ErrorCode::BAD_PARAMETER))
    }

    fn live(&self, role: ComponentRole) -> Option<(u64, &MockComponent)> {
        self.components
            .iter()
            .find(|(_, c)| c.role == role)
            .map(|(id, c)| (*id, c))
    }

    fn live_mut(&mut self, role: ComponentRole) -> Option<&mut MockComponent> {
        self.components.values_mut().find(|c| c.role == role)
    }
}

enum Ack {
    Complete(ComponentHandle, Command),
    Error(ComponentHandle, ErrorCode),
}

/// An in-process [`Hardware`] implementation.
pub struct MockHardware {
    inner: Mutex<Inner>,
    callbacks: RwLock<Option<Arc<dyn HardwareCallbacks>>>,
}

impl MockHardware {
    /// Creates a mock with no components.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            callbacks: RwLock::new(None),
        }
    }

    fn callbacks(&self) -> Option<Arc<dyn HardwareCallbacks>> {
        self.callbacks.read().clone()
    }

    fn deliver(&self, ack: Ack) {
        let Some(callbacks) = self.callbacks() else {
            return;
        };
        match ack {
            Ack::Complete(handle, command) => callbacks.command_complete(handle, command),
            Ack::Error(handle, code) => callbacks.error(handle, code),
        }
    }

    fn handle_of(&self, role: ComponentRole) -> Option<ComponentHandle> {
        self.inner
            .lock()
            .live(role)
            .map(|(id, _)| ComponentHandle::new(id, role))
    }

    // --- failure injection ---

    /// Makes every `create_component` for `role` fail.
    pub fn fail_create(&self, role: ComponentRole) {
        self.inner.lock().fail_create.insert(role);
    }

    /// Makes the next `count` buffer submits fail.
    pub fn fail_next_empty(&self, count: u32) {
        self.inner.lock().fail_empty = count;
    }

    /// Makes tunnel setup from `source_port` fail.
    pub fn fail_tunnel_setup(&self, source_port: u32) {
        self.inner.lock().fail_tunnel_ports.insert(source_port);
    }

    /// Makes reads of `index` fail.
    pub fn fail_get_config(&self, index: ConfigIndex) {
        self.inner.lock().fail_get_config.insert(index);
    }

    /// Makes writes of `index` fail.
    pub fn fail_set_config(&self, index: ConfigIndex) {
        self.inner.lock().fail_set_config.insert(index);
    }

    /// Makes writes of parameter `index` fail.
    pub fn fail_set_parameter(&self, index: ParameterIndex) {
        self.inner.lock().fail_set_parameter.insert(index);
    }

    /// Stops (or resumes) acknowledging commands.
    pub fn drop_acks(&self, drop: bool) {
        self.inner.lock().drop_acks = drop;
    }

    // --- simulated device state ---

    /// Sets the buffer definition reported for `port` of `role` until the
    /// pipeline overrides it.
    pub fn set_port_buffers(&self, role: ComponentRole, port: u32, count: u32, size: u32) {
        self.inner.lock().port_definitions.insert(
            (role, port),
            PortDefinition {
                port,
                buffer_size: size,
                buffer_count_actual: count,
                buffer_count_min: 1,
            },
        );
    }

    /// Sets the decoder stall indicator.
    pub fn set_stalled(&self, stalled: bool) {
        self.inner.lock().stalled = stalled;
    }

    /// Sets the clock's current media time.
    pub fn set_media_time(&self, ticks: Ticks) {
        self.inner.lock().media_time = ticks;
    }

    /// Sets the reported audio render latency.
    pub fn set_audio_latency(&self, latency: u32) {
        self.inner.lock().audio_latency = latency;
    }

    // --- callbacks ---

    /// Reports new output port settings on `role`.
    pub fn fire_port_settings_changed(&self, role: ComponentRole, port: u32) {
        if let (Some(handle), Some(cb)) = (self.handle_of(role), self.callbacks()) {
            cb.port_settings_changed(handle, port);
        }
    }

    /// Reports a config change on `role`.
    pub fn fire_config_changed(&self, role: ComponentRole, index: ConfigIndex) {
        if let (Some(handle), Some(cb)) = (self.handle_of(role), self.callbacks()) {
            cb.config_changed(handle, index);
        }
    }

    /// Reports end of stream on `port` of `role`.
    pub fn fire_end_of_stream(&self, role: ComponentRole, port: u32) {
        if let (Some(handle), Some(cb)) = (self.handle_of(role), self.callbacks()) {
            cb.end_of_stream(handle, port);
        }
    }

    /// Reports an error on `role`.
    pub fn fire_error(&self, role: ComponentRole, code: ErrorCode) {
        if let (Some(handle), Some(cb)) = (self.handle_of(role), self.callbacks()) {
            cb.error(handle, code);
        }
    }

    /// Consumes every submitted buffer of `role`, returning them to their
    /// port's free list and reporting each as emptied. Returns the count.
    pub fn complete_buffers(&self, role: ComponentRole) -> usize {
        let (handle, count) = {
            let mut inner = self.inner.lock();
            let Some((id, _)) = inner.live(role) else {
                return 0;
            };
            let Some(component) = inner.components.get_mut(&id) else {
                return 0;
            };
            let done = std::mem::take(&mut component.in_flight);
            let count = done.len();
            for mut buffer in done {
                buffer.reset();
                component.free.entry(buffer.port()).or_default().push(buffer);
            }
            (ComponentHandle::new(id, role), count)
        };

        if let Some(cb) = self.callbacks() {
            for _ in 0..count {
                cb.buffer_emptied(handle);
            }
        }
        count
    }

    // --- inspection ---

    /// Every call so far.
    pub fn calls(&self) -> Vec<HardwareCall> {
        self.inner.lock().calls.clone()
    }

    /// Number of calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&HardwareCall) -> bool) -> usize {
        self.inner.lock().calls.iter().filter(|c| pred(c)).count()
    }

    /// Forgets the recorded calls.
    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }

    /// State change requests sent to `role`, in order.
    pub fn state_requests(&self, role: ComponentRole) -> Vec<ComponentState> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                HardwareCall::SendCommand {
                    role: r,
                    command: Command::StateSet(state),
                } if *r == role => Some(*state),
                _ => None,
            })
            .collect()
    }

    /// Configs `role` accepted, in order.
    pub fn set_configs(&self, role: ComponentRole) -> Vec<Config> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                HardwareCall::SetConfig {
                    role: r,
                    config,
                    accepted: true,
                } if *r == role => Some(config.clone()),
                _ => None,
            })
            .collect()
    }

    /// Parameters `role` accepted, in order.
    pub fn set_parameters(&self, role: ComponentRole) -> Vec<Parameter> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                HardwareCall::SetParameter {
                    role: r,
                    param,
                    accepted: true,
                } if *r == role => Some(param.clone()),
                _ => None,
            })
            .collect()
    }

    /// Last accepted config of `index` on `role`.
    pub fn config(&self, role: ComponentRole, index: ConfigIndex) -> Option<Config> {
        let inner = self.inner.lock();
        inner.live(role)?.1.configs.get(&index).cloned()
    }

    /// Whether a component for `role` exists.
    pub fn is_alive(&self, role: ComponentRole) -> bool {
        self.inner.lock().live(role).is_some()
    }

    /// Current state of `role`'s component.
    pub fn component_state(&self, role: ComponentRole) -> Option<ComponentState> {
        self.inner.lock().live(role).map(|(_, c)| c.state)
    }

    /// Free buffers waiting on `port` of `role`.
    pub fn free_buffers(&self, role: ComponentRole, port: u32) -> usize {
        let inner = self.inner.lock();
        inner
            .live(role)
            .and_then(|(_, c)| c.free.get(&port))
            .map_or(0, Vec::len)
    }

    /// Buffers of `role` submitted and not yet completed.
    pub fn in_flight(&self, role: ComponentRole) -> usize {
        self.inner.lock().live(role).map_or(0, |(_, c)| c.in_flight.len())
    }

    fn default_definition(inner: &Inner, role: ComponentRole, port: u32) -> PortDefinition {
        inner
            .port_definitions
            .get(&(role, port))
            .copied()
            .unwrap_or(PortDefinition {
                port,
                buffer_size: DEFAULT_BUFFER_SIZE,
                buffer_count_actual: DEFAULT_BUFFER_COUNT,
                buffer_count_min: 1,
            })
    }
}

impl Default for MockHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockHardware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MockHardware")
            .field("components", &inner.components.len())
            .field("calls", &inner.calls.len())
            .finish()
    }
}

impl Hardware for MockHardware {
    fn register_callbacks(&self, callbacks: Arc<dyn HardwareCallbacks>) {
        *self.callbacks.write() = Some(callbacks);
    }

    fn create_component(
        &self,
        role: ComponentRole,
        enable_input_buffers: bool,
    ) -> Result<ComponentHandle, HardwareError> {
        let mut inner = self.inner.lock();
        inner.calls.push(HardwareCall::CreateComponent {
            role,
            enable_input_buffers,
        });

        if inner.fail_create.contains(&role) {
            return Err(HardwareError::Code(ErrorCode::INSUFFICIENT_RESOURCES));
        }

        inner.next_handle += 1;
        let id = inner.next_handle;
        inner.components.insert(
            id,
            MockComponent {
                role,
                state: ComponentState::Loaded,
                input_buffers: enable_input_buffers,
                configs: HashMap::new(),
                params: HashMap::new(),
                free: HashMap::new(),
                in_flight: Vec::new(),
            },
        );
        Ok(ComponentHandle::new(id, role))
    }

    fn destroy_component(&self, handle: ComponentHandle) {
        let mut inner = self.inner.lock();
        inner.calls.push(HardwareCall::DestroyComponent {
            role: handle.role(),
        });
        inner.components.remove(&handle.id());
    }

    fn send_command(&self, handle: ComponentHandle, command: Command) -> Result<(), HardwareError> {
        let ack = {
            let mut inner = self.inner.lock();
            inner.calls.push(HardwareCall::SendCommand {
                role: handle.role(),
                command,
            });
            let drop_acks = inner.drop_acks;
            let component = inner.component(handle)?;

            let ack = match command {
                Command::StateSet(target) if target == component.state => {
                    Ack::Error(handle, ErrorCode::SAME_STATE)
                }
                Command::StateSet(target) => {
                    let allowed = matches!(
                        (component.state, target),
                        (ComponentState::Loaded, ComponentState::Idle)
                            | (ComponentState::Idle, _)
                            | (ComponentState::Executing, ComponentState::Idle)
                    );
                    if !allowed {
                        Ack::Error(handle, ErrorCode::INCORRECT_STATE_TRANSITION)
                    } else {
                        if !drop_acks {
                            component.state = target;
                        }
                        Ack::Complete(handle, command)
                    }
                }
                Command::Flush(_) => Ack::Complete(handle, command),
            };
            if drop_acks {
                return Ok(());
            }
            ack
        };

        self.deliver(ack);
        Ok(())
    }

    fn get_parameter(
        &self,
        handle: ComponentHandle,
        index: ParameterIndex,
        port: u32,
    ) -> Result<Parameter, HardwareError> {
        let mut inner = self.inner.lock();
        inner.calls.push(HardwareCall::GetParameter {
            role: handle.role(),
            index,
            port,
        });

        let default = Self::default_definition(&inner, handle.role(), port);
        let component = inner.component(handle)?;
        if let Some(param) = component.params.get(&(index, port)) {
            return Ok(param.clone());
        }
        match index {
            ParameterIndex::PortDefinition => Ok(Parameter::PortDefinition(default)),
            ParameterIndex::AudioPortFormat => Ok(Parameter::AudioPortFormat {
                port,
                encoding: AudioEncoding::AutoDetect,
            }),
            _ => Err(HardwareError::Code(ErrorCode::UNSUPPORTED_INDEX)),
        }
    }

    fn set_parameter(&self, handle: ComponentHandle, param: &Parameter) -> Result<(), HardwareError> {
        let mut inner = self.inner.lock();
        let accepted = !inner.fail_set_parameter.contains(&param.index())
            && inner.components.contains_key(&handle.id());
        inner.calls.push(HardwareCall::SetParameter {
            role: handle.role(),
            param: param.clone(),
            accepted,
        });
        if !accepted {
            return Err(HardwareError::Code(ErrorCode::BAD_PARAMETER));
        }

        let component = inner.component(handle)?;
        component
            .params
            .insert((param.index(), param.port()), param.clone());
        Ok(())
    }

    fn get_config(
        &self,
        handle: ComponentHandle,
        index: ConfigIndex,
        port: u32,
    ) -> Result<Config, HardwareError> {
        let mut inner = self.inner.lock();
        inner.calls.push(HardwareCall::GetConfig {
            role: handle.role(),
            index,
            port,
        });
        if inner.fail_get_config.contains(&index) {
            return Err(HardwareError::Code(ErrorCode::UNDEFINED));
        }

        let (stalled, media_time, latency) = (inner.stalled, inner.media_time, inner.audio_latency);
        let component = inner.component(handle)?;
        match index {
            ConfigIndex::CurrentMediaTime => Ok(Config::CurrentMediaTime {
                port,
                timestamp: media_time,
            }),
            ConfigIndex::BufferStall => Ok(Config::BufferStall { port, stalled }),
            ConfigIndex::AudioRenderingLatency => {
                Ok(Config::AudioRenderingLatency { port, latency })
            }
            ConfigIndex::ClockState => Ok(component
                .configs
                .get(&index)
                .cloned()
                .unwrap_or(Config::ClockState(ClockStateConfig::default()))),
            _ => component
                .configs
                .get(&index)
                .cloned()
                .ok_or(HardwareError::Code(ErrorCode::UNSUPPORTED_INDEX)),
        }
    }

    fn set_config(&self, handle: ComponentHandle, config: &Config) -> Result<(), HardwareError> {
        let mut inner = self.inner.lock();
        let index = config.index();
        let accepted =
            !inner.fail_set_config.contains(&index) && inner.components.contains_key(&handle.id());
        inner.calls.push(HardwareCall::SetConfig {
            role: handle.role(),
            config: config.clone(),
            accepted,
        });
        if !accepted {
            return Err(HardwareError::Code(ErrorCode::BAD_PARAMETER));
        }

        inner.component(handle)?.configs.insert(index, config.clone());
        Ok(())
    }

    fn enable_port_buffers(&self, handle: ComponentHandle, port: u32) -> Result<(), HardwareError> {
        let mut inner = self.inner.lock();
        inner.calls.push(HardwareCall::EnablePortBuffers {
            role: handle.role(),
            port,
        });

        let fallback = Self::default_definition(&inner, handle.role(), port);
        let first_id = inner.next_buffer;
        let component = inner.component(handle)?;
        if !component.input_buffers {
            return Err(HardwareError::Code(ErrorCode::BAD_PARAMETER));
        }

        let definition = match component.params.get(&(ParameterIndex::PortDefinition, port)) {
            Some(Parameter::PortDefinition(def)) => *def,
            _ => fallback,
        };
        let buffers: Vec<_> = (0..definition.buffer_count_actual)
            .map(|i| {
                BufferHeader::new(
                    first_id + i,
                    port,
                    definition.buffer_size as usize,
                )
            })
            .collect();
        component.free.insert(port, buffers);
        inner.next_buffer = first_id + definition.buffer_count_actual;
        Ok(())
    }

    fn disable_port_buffers(&self, handle: ComponentHandle, port: u32, returned: Vec<BufferHeader>) {
        let mut inner = self.inner.lock();
        inner.calls.push(HardwareCall::DisablePortBuffers {
            role: handle.role(),
            port,
            returned: returned.len(),
        });
        if let Ok(component) = inner.component(handle) {
            component.free.remove(&port);
            component.in_flight.retain(|b| b.port() != port);
        }
    }

    fn get_input_buffer(&self, handle: ComponentHandle, port: u32) -> Option<BufferHeader> {
        let mut inner = self.inner.lock();
        let buffer = inner
            .component(handle)
            .ok()
            .and_then(|c| c.free.get_mut(&port))
            .and_then(Vec::pop);
        inner.calls.push(HardwareCall::GetInputBuffer {
            role: handle.role(),
            port,
            granted: buffer.is_some(),
        });
        buffer
    }

    fn empty_buffer(
        &self,
        handle: ComponentHandle,
        buffer: BufferHeader,
    ) -> Result<(), SubmitRejected> {
        let mut inner = self.inner.lock();
        let injected = inner.fail_empty > 0;
        if injected {
            inner.fail_empty -= 1;
        }
        let alive = inner.components.contains_key(&handle.id());
        let accepted = !injected && alive;

        inner.calls.push(HardwareCall::EmptyBuffer {
            role: handle.role(),
            buffer: buffer.id(),
            flags: buffer.flags(),
            timestamp: buffer.timestamp(),
            accepted,
        });

        if !accepted {
            return Err(SubmitRejected {
                buffer,
                error: HardwareError::Code(ErrorCode::UNDEFINED),
            });
        }
        if let Ok(component) = inner.component(handle) {
            component.in_flight.push(buffer);
        }
        Ok(())
    }

    fn setup_tunnel(&self, tunnel: &TunnelSpec, _timeout: Duration) -> Result<(), HardwareError> {
        let mut inner = self.inner.lock();
        let accepted = !inner.fail_tunnel_ports.contains(&tunnel.source_port);
        inner.calls.push(HardwareCall::SetupTunnel {
            source: tunnel.source.role(),
            source_port: tunnel.source_port,
            sink: tunnel.sink.role(),
            sink_port: tunnel.sink_port,
            accepted,
        });
        if accepted {
            Ok(())
        } else {
            Err(HardwareError::Code(ErrorCode::PORTS_NOT_COMPATIBLE))
        }
    }

    fn disable_tunnel(&self, tunnel: &TunnelSpec) {
        self.inner.lock().calls.push(HardwareCall::DisableTunnel {
            source_port: tunnel.source_port,
            sink_port: tunnel.sink_port,
        });
    }

    fn teardown_tunnel(&self, tunnel: &TunnelSpec) {
        self.inner.lock().calls.push(HardwareCall::TeardownTunnel {
            source_port: tunnel.source_port,
            sink_port: tunnel.sink_port,
        });
    }

    fn flush_tunnel(&self, tunnel: &TunnelSpec) {
        self.inner.lock().calls.push(HardwareCall::FlushTunnel {
            source_port: tunnel.source_port,
            sink_port: tunnel.sink_port,
        });
    }
}
