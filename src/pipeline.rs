//! The pipeline handle.

use std::cell::RefCell;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use parking_lot::{Mutex, ReentrantMutex};

use crate::audio::{self, AudioCodec, AudioFormat, AudioPort};
use crate::buffer::BufferHeader;
use crate::builder::PipelineBuilder;
use crate::clock::{ClockReference, INVALID_PTS};
use crate::command::AckBoard;
use crate::component::{ComponentRegistry, ComponentRole, ComponentState};
use crate::config::PipelineConfig;
use crate::dispatcher::{self, Dispatch};
use crate::display::{self, DisplayRegion};
use crate::error::{HardwareError, PipelineError};
use crate::event::{CallbackRouter, DispatchMessage, Event};
use crate::handler::{notify, EventHandler};
use crate::hardware::{Config, ConfigIndex, Hardware, Parameter, ParameterIndex};
use crate::state::PipelineState;
use crate::tunnel::{TunnelId, TunnelState};

struct Inner {
    state: ReentrantMutex<RefCell<PipelineState>>,
    events: Sender<DispatchMessage>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    /// Stops the dispatcher and releases the hardware. Idempotent.
    fn shutdown(&self) {
        let dispatcher = self.dispatcher.lock().take();
        if let Some(handle) = dispatcher {
            if self.events.send(DispatchMessage::Stop).is_err() {
                tracing::trace!("event queue already closed");
            }
            if handle.thread().id() == thread::current().id() {
                tracing::debug!("shutting down from the dispatcher thread");
            } else if handle.join().is_err() {
                tracing::error!("event dispatcher panicked");
            }
        }

        let handlers = {
            let guard = self.state.lock();
            let mut state = guard.borrow_mut();
            let was_running = state.running;
            let handlers = state.shut_down();
            if was_running {
                tracing::info!("pipeline deinitialized");
            }
            handlers
        };
        // Handlers may own pipeline clones; release them outside the borrow.
        drop(handlers);
    }
}

impl Dispatch for Inner {
    fn dispatch(&self, event: Event) {
        let guard = self.state.lock();
        let (notification, handlers) = {
            let mut state = guard.borrow_mut();
            if !state.running {
                return;
            }
            (state.handle_event(event), state.handlers.snapshot())
        };

        if let Some(notification) = notification {
            for handler in &handlers {
                notify(handler.as_ref(), notification);
            }
        }
    }

    fn tick(&self) {
        let guard = self.state.lock();
        let handlers = {
            let mut state = guard.borrow_mut();
            if !state.running {
                return;
            }
            state.tick();
            state.handlers.snapshot()
        };

        for handler in &handlers {
            handler.tick();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Handle to an initialized hardware pipeline.
///
/// A `Pipeline` is created by [`PipelineBuilder::init()`] or
/// [`Pipeline::init()`] and owns the clock, the audio render and the video
/// render path. Cloning is cheap and every clone refers to the same
/// pipeline; calls from any thread are serialized by the pipeline lock.
///
/// # Lifecycle
///
/// 1. Created by [`init()`](Self::init) or the builder
/// 2. Hardware events are handled on a background dispatcher thread
/// 3. Call [`deinit()`](Self::deinit) to release the hardware
/// 4. Dropping the last clone also deinitializes
///
/// Handlers that hold a clone keep the pipeline alive until
/// [`deinit()`](Self::deinit) is called.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use omx_pipeline::hardware::mock::MockHardware;
/// use omx_pipeline::{AudioCodec, AudioPort, Pipeline};
///
/// let hw = Arc::new(MockHardware::new());
/// let pipeline = Pipeline::init(hw, 0, 0)?;
///
/// pipeline.setup_audio_render(AudioCodec::Pcm, 2, AudioPort::Hdmi, 48000, 0)?;
/// if let Some(mut buf) = pipeline.get_audio_buffer(0) {
///     buf.append(&[0; 1024]);
///     pipeline.empty_audio_buffer(buf);
/// }
///
/// pipeline.deinit();
/// # Ok::<(), omx_pipeline::PipelineError>(())
/// ```
///
/// [`PipelineBuilder::init()`]: crate::PipelineBuilder::init
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

impl Pipeline {
    /// Creates a builder for a pipeline on `hardware`.
    pub fn builder(hardware: Arc<dyn Hardware>) -> PipelineBuilder {
        PipelineBuilder::new(hardware)
    }

    /// Initializes a pipeline with default configuration on the given
    /// display and layer.
    ///
    /// # Errors
    ///
    /// Returns an error if a component, tunnel or state transition of the
    /// clock and audio path cannot be brought up. Everything created up to
    /// that point is released again.
    pub fn init(hardware: Arc<dyn Hardware>, display: u32, layer: i32) -> Result<Self, PipelineError> {
        Self::builder(hardware).display(display, layer).init()
    }

    pub(crate) fn start(
        hardware: Arc<dyn Hardware>,
        config: PipelineConfig,
        display: u32,
        layer: i32,
        handlers: Vec<Arc<dyn EventHandler>>,
    ) -> Result<Self, PipelineError> {
        let acks = Arc::new(AckBoard::new());
        let (events, queue) = crossbeam_channel::unbounded();
        hardware.register_callbacks(Arc::new(CallbackRouter::new(events.clone(), acks.clone())));

        let components = ComponentRegistry::new(
            hardware,
            acks,
            config.state_change_timeout,
            config.flush_timeout,
        );
        let tick_interval = config.tick_interval;
        let mut state = PipelineState::new(components, config)?;
        for handler in handlers {
            state.handlers.add(handler);
        }

        if let Err(e) = state.bring_up(display, layer) {
            tracing::error!(error = %e, "pipeline bring-up failed");
            state.shut_down();
            return Err(e);
        }

        let inner = Arc::new(Inner {
            state: ReentrantMutex::new(RefCell::new(state)),
            events,
            dispatcher: Mutex::new(None),
        });
        let handle = dispatcher::spawn(Arc::downgrade(&inner), queue, tick_interval)
            .map_err(PipelineError::DispatcherSpawn)?;
        *inner.dispatcher.lock() = Some(handle);

        let display_id = display;
        tracing::info!(display_id, layer, "pipeline initialized");
        Ok(Self { inner })
    }

    /// Stops event handling, idles the clock and audio render, and releases
    /// every component. Removes all handlers.
    ///
    /// Idempotent. May be called from a handler.
    pub fn deinit(&self) {
        self.inner.shutdown();
    }

    /// Whether the pipeline is initialized and not yet deinitialized.
    pub fn is_running(&self) -> bool {
        self.inner.state.lock().borrow().running
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut PipelineState) -> R) -> Result<R, PipelineError> {
        let guard = self.inner.state.lock();
        let mut state = guard.borrow_mut();
        if !state.running {
            tracing::debug!("pipeline call after deinit");
            return Err(PipelineError::NotRunning);
        }
        Ok(f(&mut state))
    }

    fn try_with_state<R>(
        &self,
        f: impl FnOnce(&mut PipelineState) -> Result<R, PipelineError>,
    ) -> Result<R, PipelineError> {
        self.with_state(f)?
    }

    fn with_components<R>(&self, f: impl FnOnce(&mut ComponentRegistry) -> R) -> R {
        let guard = self.inner.state.lock();
        let mut state = guard.borrow_mut();
        f(&mut state.components)
    }

    // --- handlers ---

    /// Registers `handler`. Handlers are notified in registration order.
    pub fn add_event_handler(&self, handler: Arc<dyn EventHandler>) {
        let guard = self.inner.state.lock();
        guard.borrow_mut().handlers.add(handler);
    }

    /// Removes `handler`, compared by identity. Returns whether it was
    /// registered.
    pub fn remove_event_handler(&self, handler: &Arc<dyn EventHandler>) -> bool {
        let guard = self.inner.state.lock();
        let removed = guard.borrow_mut().handlers.remove(handler);
        removed
    }

    // --- audio ---

    /// Configures the audio render for a stream and starts it.
    ///
    /// Rejected parameter and config calls are logged and skipped. A running
    /// audio path is stopped first.
    ///
    /// # Errors
    ///
    /// Returns an error if the port buffers, the state change to executing
    /// or the clock tunnel cannot be brought up.
    pub fn setup_audio_render(
        &self,
        codec: AudioCodec,
        channels: u32,
        port: AudioPort,
        sample_rate: u32,
        frame_size: u32,
    ) -> Result<(), PipelineError> {
        let format = AudioFormat {
            codec,
            channels,
            port,
            sample_rate,
            frame_size,
        };
        self.try_with_state(|state| state.setup_audio_render(&format))
    }

    /// Idles the audio render and hands every spare buffer back.
    pub fn stop_audio(&self) {
        self.with_state(PipelineState::stop_audio).unwrap_or_default();
    }

    /// Drops queued audio.
    pub fn flush_audio(&self) {
        self.with_state(PipelineState::flush_audio).unwrap_or_default();
    }

    /// Takes an audio input buffer stamped with `pts` (90 kHz).
    ///
    /// Pass [`INVALID_PTS`] for data without a timestamp. Returns `None`
    /// when no buffer is free.
    pub fn get_audio_buffer(&self, pts: i64) -> Option<BufferHeader> {
        self.with_state(|state| state.get_audio_buffer(pts))
            .ok()
            .flatten()
    }

    /// Submits an audio buffer.
    ///
    /// Returns `false` when the hardware refused it; the buffer is then kept
    /// for the next [`get_audio_buffer()`](Self::get_audio_buffer). A buffer
    /// taken before [`stop_audio()`](Self::stop_audio) is dropped instead.
    pub fn empty_audio_buffer(&self, buffer: BufferHeader) -> bool {
        self.with_state(|state| state.empty_audio_buffer(buffer))
            .unwrap_or_default()
    }

    /// Sets the volume, `0..=255`.
    pub fn set_volume(&self, volume: u8) {
        self.with_state(|state| audio::set_volume(&state.components, volume))
            .unwrap_or_default();
    }

    /// Mutes or unmutes the audio render.
    pub fn set_mute(&self, mute: bool) {
        self.with_state(|state| audio::set_mute(&state.components, mute))
            .unwrap_or_default();
    }

    /// Audio render latency, 0 when unavailable.
    pub fn audio_latency(&self) -> u32 {
        self.with_state(|state| state.clock.audio_latency(&state.components))
            .unwrap_or_default()
    }

    /// Audio buffer occupancy over the last 1.6 seconds, `0..=100`.
    pub fn buffer_usage(&self) -> u32 {
        self.with_state(|state| state.audio.usage_percent())
            .unwrap_or_default()
    }

    // --- video ---

    /// Takes a video decoder input buffer stamped with `pts`.
    pub fn get_video_buffer(&self, pts: i64) -> Option<BufferHeader> {
        self.with_state(|state| state.video.acquire(&state.components, pts))
            .ok()
            .flatten()
    }

    /// Submits a video decoder input buffer. Refused buffers are kept for
    /// the next [`get_video_buffer()`](Self::get_video_buffer).
    pub fn empty_video_buffer(&self, buffer: BufferHeader) -> bool {
        self.with_state(|state| state.video.release(&state.components, buffer))
            .unwrap_or_default()
    }

    /// Video buffer occupancy over the last 1.6 seconds, `0..=100`.
    pub fn video_buffer_usage(&self) -> u32 {
        self.with_state(|state| state.video.usage_percent())
            .unwrap_or_default()
    }

    // --- display ---

    /// Fill the screen or letterbox; `noaspect` ignores the stream's aspect
    /// ratio.
    pub fn set_display_mode(&self, fill: bool, noaspect: bool) {
        self.with_state(|state| {
            display::apply(
                &state.components,
                DisplayRegion::mode(fill, noaspect),
                "display mode",
            );
        })
        .unwrap_or_default();
    }

    /// Sets the pixel aspect ratio.
    pub fn set_pixel_aspect_ratio(&self, width: i32, height: i32) {
        self.with_state(|state| {
            display::apply(
                &state.components,
                DisplayRegion::pixel_aspect(width, height),
                "pixel aspect ratio",
            );
        })
        .unwrap_or_default();
    }

    /// Sets the destination rectangle. All zero means fullscreen.
    pub fn set_display_region(&self, x: i32, y: i32, width: i32, height: i32) {
        self.with_state(|state| {
            display::apply(
                &state.components,
                DisplayRegion::destination(x, y, width, height),
                "display region",
            );
        })
        .unwrap_or_default();
    }

    /// Moves the video to another display and layer.
    pub fn set_display(&self, display: u32, layer: i32) {
        self.with_state(|state| state.set_display(display, layer))
            .unwrap_or_default();
    }

    // --- clock ---

    /// Starts the clock, optionally waiting for the first video and/or audio
    /// timestamp. Waiting for audio marks the next audio buffer as the start
    /// time.
    pub fn start_clock(&self, wait_for_video: bool, wait_for_audio: bool) {
        self.with_state(|state| state.start_clock(wait_for_video, wait_for_audio))
            .unwrap_or_default();
    }

    /// Stops the clock.
    pub fn stop_clock(&self) {
        self.with_state(|state| state.clock.stop(&state.components))
            .unwrap_or_default();
    }

    /// Sets the playback speed, 16.16 fixed point. Zero pauses.
    pub fn set_clock_scale(&self, scale: i32) {
        self.with_state(|state| state.clock.set_scale(&state.components, scale))
            .unwrap_or_default();
    }

    /// The last scale the hardware accepted.
    pub fn clock_scale(&self) -> i32 {
        self.with_state(|state| state.clock.scale())
            .unwrap_or_default()
    }

    /// Selects which stream drives the clock.
    pub fn set_clock_reference(&self, reference: ClockReference) {
        self.with_state(|state| state.clock.select_reference(&state.components, reference))
            .unwrap_or_default();
    }

    /// The selected clock reference.
    pub fn clock_reference(&self) -> ClockReference {
        self.with_state(|state| state.clock.reference())
            .unwrap_or_default()
    }

    /// Current media time (90 kHz), or [`INVALID_PTS`].
    pub fn media_time(&self) -> i64 {
        self.with_state(|state| state.clock.media_time(&state.components))
            .unwrap_or(INVALID_PTS)
    }

    /// Re-arms the reference time of the active reference's clock port.
    pub fn reset_clock_reference(&self) {
        self.with_state(|state| state.clock.reset_reference(&state.components))
            .unwrap_or_default();
    }

    /// Whether the clock reports the running state.
    pub fn is_clock_running(&self) -> bool {
        self.with_state(|state| state.clock.is_running(&state.components))
            .unwrap_or_default()
    }

    // --- components and tunnels ---

    /// Creates a component, typically the video decoder or fx.
    pub fn create_component(
        &self,
        role: ComponentRole,
        enable_input_buffers: bool,
    ) -> Result<(), PipelineError> {
        self.try_with_state(|state| {
            state
                .components
                .create(role, enable_input_buffers)
                .map(|_| ())
        })
    }

    /// Releases a component. Missing components are ignored.
    pub fn cleanup_component(&self, role: ComponentRole) {
        self.with_components(|components| components.cleanup(role));
    }

    /// The recorded state of a component, `None` if it does not exist.
    pub fn component_state(&self, role: ComponentRole) -> Option<ComponentState> {
        self.with_components(|components| components.state(role))
    }

    /// Moves a component to `target`, through every intermediate state.
    pub fn change_component_state(
        &self,
        role: ComponentRole,
        target: ComponentState,
    ) -> Result<(), PipelineError> {
        self.try_with_state(|state| state.components.change_state(role, target))
    }

    /// Flushes one port of a component.
    pub fn flush_component(&self, role: ComponentRole, port: u32) -> Result<(), PipelineError> {
        self.try_with_state(|state| state.components.flush(role, port))
    }

    /// Allocates the input buffers of a port.
    pub fn enable_port_buffers(&self, role: ComponentRole, port: u32) -> Result<(), PipelineError> {
        self.try_with_state(|state| state.components.enable_port_buffers(role, port))
    }

    /// Frees the buffers of a port, handing back the caller's descriptors.
    pub fn disable_port_buffers(&self, role: ComponentRole, port: u32, returned: Vec<BufferHeader>) {
        self.with_components(|components| components.disable_port_buffers(role, port, returned));
    }

    /// Reads a parameter block.
    pub fn get_parameter(
        &self,
        role: ComponentRole,
        index: ParameterIndex,
        port: u32,
    ) -> Result<Parameter, HardwareError> {
        self.with_components(|components| components.get_parameter(role, index, port))
    }

    /// Writes a parameter block.
    pub fn set_parameter(&self, role: ComponentRole, param: &Parameter) -> Result<(), HardwareError> {
        self.with_components(|components| components.set_parameter(role, param))
    }

    /// Reads a config block.
    pub fn get_config(
        &self,
        role: ComponentRole,
        index: ConfigIndex,
        port: u32,
    ) -> Result<Config, HardwareError> {
        self.with_components(|components| components.get_config(role, index, port))
    }

    /// Writes a config block.
    pub fn set_config(&self, role: ComponentRole, config: &Config) -> Result<(), HardwareError> {
        self.with_components(|components| components.set_config(role, config))
    }

    /// Negotiates a tunnel. Both endpoints must exist.
    pub fn setup_tunnel(&self, id: TunnelId) -> Result<(), PipelineError> {
        self.try_with_state(|state| {
            let timeout = state.config.tunnel_setup_timeout;
            state.tunnels.setup(id, &state.components, timeout)
        })
    }

    /// Flushes a set up tunnel.
    pub fn flush_tunnel(&self, id: TunnelId) -> Result<(), PipelineError> {
        self.try_with_state(|state| state.tunnels.flush(id, &state.components))
    }

    /// Disables a set up tunnel.
    pub fn disable_tunnel(&self, id: TunnelId) -> Result<(), PipelineError> {
        self.try_with_state(|state| state.tunnels.disable(id, &state.components))
    }

    /// Tears down a disabled tunnel whose endpoints are not executing.
    pub fn teardown_tunnel(&self, id: TunnelId) -> Result<(), PipelineError> {
        self.try_with_state(|state| state.tunnels.teardown(id, &state.components))
    }

    /// Current state of a tunnel.
    pub fn tunnel_state(&self, id: TunnelId) -> TunnelState {
        let guard = self.inner.state.lock();
        let state = guard.borrow().tunnels.state(id);
        state
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
