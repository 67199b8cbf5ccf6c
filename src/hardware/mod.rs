//! The fixed hardware component protocol.
//!
//! The pipeline never talks to decoders, renderers or the clock directly.
//! Everything goes through the [`Hardware`] trait: create/destroy, typed
//! get/set of parameters and configs, buffer exchange, tunnels, and
//! asynchronous commands. Completions and notifications come back on
//! hardware-owned threads through [`HardwareCallbacks`].
//!
//! [`MockHardware`](mock::MockHardware) implements the protocol in-process
//! for tests and demos.

pub mod mock;

use std::sync::Arc;
use std::time::Duration;

use crate::audio::{AacParams, AudioEncoding, DdpParams, DtsParams, Mp3Params, PcmParams};
use crate::buffer::BufferHeader;
use crate::clock::{ClockReference, ClockStateConfig, LatencyTarget, Ticks};
use crate::command::Command;
use crate::component::ComponentRole;
use crate::display::DisplayRegion;
use crate::error::{ErrorCode, HardwareError};

/// Opaque handle to a live hardware component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentHandle {
    id: u64,
    role: ComponentRole,
}

impl ComponentHandle {
    /// Creates a handle. Only [`Hardware`] implementations should need this.
    pub fn new(id: u64, role: ComponentRole) -> Self {
        Self { id, role }
    }

    /// Implementation-defined identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Role the component was created for.
    pub fn role(&self) -> ComponentRole {
        self.role
    }
}

/// Both ends of a tunnel, as handed to the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelSpec {
    /// Component owning the output port.
    pub source: ComponentHandle,
    /// Output port.
    pub source_port: u32,
    /// Component owning the input port.
    pub sink: ComponentHandle,
    /// Input port.
    pub sink_port: u32,
}

/// Config indices the pipeline reads, writes or gets notified about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigIndex {
    /// Clock state, wait mask and offset.
    ClockState,
    /// Current media time of the clock.
    CurrentMediaTime,
    /// Playback scale of the clock.
    TimeScale,
    /// Which port's timestamps drive the clock.
    ActiveRefClock,
    /// Current audio reference time.
    CurrentAudioReference,
    /// Current video reference time.
    CurrentVideoReference,
    /// Latency target tuning.
    LatencyTarget,
    /// Decoder buffer stall indicator.
    BufferStall,
    /// Audio volume.
    AudioVolume,
    /// Audio mute.
    AudioMute,
    /// Audio output destination.
    AudioDestination,
    /// Audio render latency.
    AudioRenderingLatency,
    /// Display region of the video render.
    DisplayRegion,
    /// Any index the pipeline has no name for.
    Other(u32),
}

/// A typed config block.
#[derive(Debug, Clone, PartialEq)]
pub enum Config {
    /// Clock state change.
    ClockState(ClockStateConfig),
    /// Media time read from `port`.
    CurrentMediaTime {
        /// Port queried.
        port: u32,
        /// Time in hardware ticks.
        timestamp: Ticks,
    },
    /// Clock scale, 16.16 fixed point.
    TimeScale(i32),
    /// Active reference clock.
    ActiveRefClock(ClockReference),
    /// Re-arm the audio reference on `port`.
    CurrentAudioReference {
        /// Clock port.
        port: u32,
    },
    /// Re-arm the video reference on `port`.
    CurrentVideoReference {
        /// Clock port.
        port: u32,
    },
    /// Latency target tuning.
    LatencyTarget(LatencyTarget),
    /// Stall state of `port`.
    BufferStall {
        /// Port queried.
        port: u32,
        /// Whether the port is stalled.
        stalled: bool,
    },
    /// Output volume.
    AudioVolume {
        /// Audio render port.
        port: u32,
        /// Linear (percent) rather than millibel scale.
        linear: bool,
        /// Volume value.
        value: i32,
    },
    /// Output mute.
    AudioMute {
        /// Audio render port.
        port: u32,
        /// Mute state.
        mute: bool,
    },
    /// Audio output device name (`"local"`, `"hdmi"`).
    AudioDestination(String),
    /// Audio render latency.
    AudioRenderingLatency {
        /// Audio render port.
        port: u32,
        /// Latency in samples.
        latency: u32,
    },
    /// Display region settings.
    DisplayRegion(DisplayRegion),
}

impl Config {
    /// The index this block is read or written through.
    pub fn index(&self) -> ConfigIndex {
        match self {
            Self::ClockState(_) => ConfigIndex::ClockState,
            Self::CurrentMediaTime { .. } => ConfigIndex::CurrentMediaTime,
            Self::TimeScale(_) => ConfigIndex::TimeScale,
            Self::ActiveRefClock(_) => ConfigIndex::ActiveRefClock,
            Self::CurrentAudioReference { .. } => ConfigIndex::CurrentAudioReference,
            Self::CurrentVideoReference { .. } => ConfigIndex::CurrentVideoReference,
            Self::LatencyTarget(_) => ConfigIndex::LatencyTarget,
            Self::BufferStall { .. } => ConfigIndex::BufferStall,
            Self::AudioVolume { .. } => ConfigIndex::AudioVolume,
            Self::AudioMute { .. } => ConfigIndex::AudioMute,
            Self::AudioDestination(_) => ConfigIndex::AudioDestination,
            Self::AudioRenderingLatency { .. } => ConfigIndex::AudioRenderingLatency,
            Self::DisplayRegion(_) => ConfigIndex::DisplayRegion,
        }
    }
}

/// Parameter indices the pipeline reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterIndex {
    /// Port encoding.
    AudioPortFormat,
    /// Port buffer count and size.
    PortDefinition,
    /// PCM stream description.
    AudioPcm,
    /// MP3 stream description.
    AudioMp3,
    /// AC3/EAC3 stream description.
    AudioDdp,
    /// AAC stream description.
    AudioAac,
    /// DTS stream description.
    AudioDts,
}

/// Buffer requirements of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PortDefinition {
    /// Port index.
    pub port: u32,
    /// Size of each buffer in bytes.
    pub buffer_size: u32,
    /// Number of buffers to allocate.
    pub buffer_count_actual: u32,
    /// Minimum number of buffers the port accepts.
    pub buffer_count_min: u32,
}

/// A typed parameter block.
#[derive(Debug, Clone, PartialEq)]
pub enum Parameter {
    /// Encoding of `port`.
    AudioPortFormat {
        /// Port index.
        port: u32,
        /// Encoding.
        encoding: AudioEncoding,
    },
    /// Buffer requirements.
    PortDefinition(PortDefinition),
    /// PCM stream.
    AudioPcm(PcmParams),
    /// MP3 stream.
    AudioMp3(Mp3Params),
    /// AC3/EAC3 stream.
    AudioDdp(DdpParams),
    /// AAC stream.
    AudioAac(AacParams),
    /// DTS stream.
    AudioDts(DtsParams),
}

impl Parameter {
    /// The index this block is read or written through.
    pub fn index(&self) -> ParameterIndex {
        match self {
            Self::AudioPortFormat { .. } => ParameterIndex::AudioPortFormat,
            Self::PortDefinition(_) => ParameterIndex::PortDefinition,
            Self::AudioPcm(_) => ParameterIndex::AudioPcm,
            Self::AudioMp3(_) => ParameterIndex::AudioMp3,
            Self::AudioDdp(_) => ParameterIndex::AudioDdp,
            Self::AudioAac(_) => ParameterIndex::AudioAac,
            Self::AudioDts(_) => ParameterIndex::AudioDts,
        }
    }

    /// Port the block applies to.
    pub fn port(&self) -> u32 {
        match self {
            Self::AudioPortFormat { port, .. } => *port,
            Self::PortDefinition(def) => def.port,
            Self::AudioPcm(p) => p.port,
            Self::AudioMp3(p) => p.port,
            Self::AudioDdp(p) => p.port,
            Self::AudioAac(p) => p.port,
            Self::AudioDts(p) => p.port,
        }
    }
}

/// A buffer the hardware refused, handed back so it is never lost.
#[derive(Debug)]
pub struct SubmitRejected {
    /// The refused buffer.
    pub buffer: BufferHeader,
    /// Why it was refused.
    pub error: HardwareError,
}

/// Notifications delivered on hardware-owned threads.
///
/// Implementations must not block and must not touch pipeline state; the
/// pipeline's implementation only enqueues.
pub trait HardwareCallbacks: Send + Sync {
    /// A submitted input buffer was consumed and is owned by the hardware
    /// again.
    fn buffer_emptied(&self, handle: ComponentHandle);

    /// Output port settings of `port` changed; downstream tunnels must be
    /// (re)negotiated.
    fn port_settings_changed(&self, handle: ComponentHandle, port: u32);

    /// A config value changed on the component.
    fn config_changed(&self, handle: ComponentHandle, index: ConfigIndex);

    /// A buffer flagged end-of-stream reached `port`.
    fn end_of_stream(&self, handle: ComponentHandle, port: u32);

    /// The component reported an error.
    fn error(&self, handle: ComponentHandle, code: ErrorCode);

    /// An asynchronous command finished.
    fn command_complete(&self, handle: ComponentHandle, command: Command);
}

/// The hardware component protocol.
///
/// Every call is synchronous except [`send_command`](Hardware::send_command),
/// whose completion arrives through
/// [`HardwareCallbacks::command_complete`].
pub trait Hardware: Send + Sync {
    /// Installs the callback sink. Called once during pipeline init.
    fn register_callbacks(&self, callbacks: Arc<dyn HardwareCallbacks>);

    /// Creates a component for `role` with all ports disabled, optionally
    /// enabling input buffer management.
    fn create_component(
        &self,
        role: ComponentRole,
        enable_input_buffers: bool,
    ) -> Result<ComponentHandle, HardwareError>;

    /// Destroys a component and everything it owns.
    fn destroy_component(&self, handle: ComponentHandle);

    /// Starts an asynchronous command.
    fn send_command(&self, handle: ComponentHandle, command: Command) -> Result<(), HardwareError>;

    /// Reads a parameter block of `port`.
    fn get_parameter(
        &self,
        handle: ComponentHandle,
        index: ParameterIndex,
        port: u32,
    ) -> Result<Parameter, HardwareError>;

    /// Writes a parameter block.
    fn set_parameter(&self, handle: ComponentHandle, param: &Parameter) -> Result<(), HardwareError>;

    /// Reads a config block of `port`.
    fn get_config(
        &self,
        handle: ComponentHandle,
        index: ConfigIndex,
        port: u32,
    ) -> Result<Config, HardwareError>;

    /// Writes a config block.
    fn set_config(&self, handle: ComponentHandle, config: &Config) -> Result<(), HardwareError>;

    /// Allocates the buffers of an input port.
    fn enable_port_buffers(&self, handle: ComponentHandle, port: u32) -> Result<(), HardwareError>;

    /// Frees the buffers of an input port. `returned` holds the descriptors
    /// the caller still owned.
    fn disable_port_buffers(&self, handle: ComponentHandle, port: u32, returned: Vec<BufferHeader>);

    /// Takes a free input buffer of `port`, if any.
    fn get_input_buffer(&self, handle: ComponentHandle, port: u32) -> Option<BufferHeader>;

    /// Submits a filled buffer. Ownership passes to the hardware on success
    /// and comes back in the error otherwise.
    fn empty_buffer(&self, handle: ComponentHandle, buffer: BufferHeader)
        -> Result<(), SubmitRejected>;

    /// Negotiates a tunnel, blocking for up to `timeout` (zero means the
    /// implementation default).
    fn setup_tunnel(&self, tunnel: &TunnelSpec, timeout: Duration) -> Result<(), HardwareError>;

    /// Stops data flow through a tunnel.
    fn disable_tunnel(&self, tunnel: &TunnelSpec);

    /// Releases a disabled tunnel.
    fn teardown_tunnel(&self, tunnel: &TunnelSpec);

    /// Drops all data queued in a tunnel.
    fn flush_tunnel(&self, tunnel: &TunnelSpec);
}
