//! Pipeline state guarded by the pipeline lock.

use std::sync::Arc;

use crate::audio::{self, AudioFormat};
use crate::buffer::{BufferHeader, BufferPool};
use crate::clock::{ClockController, ClockReference};
use crate::component::{ComponentRegistry, ComponentRole, ComponentState};
use crate::config::PipelineConfig;
use crate::display::{self, DisplayRegion};
use crate::error::PipelineError;
use crate::event::Event;
use crate::handler::{EventHandler, HandlerRegistry, PipelineEvent};
use crate::hardware::{Config, ConfigIndex};
use crate::ports::{
    PortTable, AUDIO_RENDER_INPUT_PORT, DECODER_INPUT_PORT, DECODER_OUTPUT_PORT, DEFAULT_TUNNELS,
    PORT_SETTINGS_ACTIONS,
};
use crate::tunnel::{TunnelId, TunnelManager, TunnelState};

/// Components created at init, in creation order, with their input buffer
/// setting.
const INIT_COMPONENTS: [(ComponentRole, bool); 4] = [
    (ComponentRole::Render, false),
    (ComponentRole::Clock, false),
    (ComponentRole::AudioRender, true),
    (ComponentRole::Scheduler, false),
];

/// Everything the pipeline lock protects.
pub(crate) struct PipelineState {
    pub components: ComponentRegistry,
    pub tunnels: TunnelManager,
    pub ports: PortTable,
    pub clock: ClockController,
    pub audio: BufferPool,
    pub video: BufferPool,
    pub handlers: HandlerRegistry,
    pub config: PipelineConfig,
    pub running: bool,
    audio_buffers_enabled: bool,
}

impl PipelineState {
    /// Declares the tunnel graph and validates the port table against it.
    pub fn new(components: ComponentRegistry, config: PipelineConfig) -> Result<Self, PipelineError> {
        let mut tunnels = TunnelManager::new();
        for decl in DEFAULT_TUNNELS {
            tunnels.declare(decl)?;
        }
        let ports = PortTable::validate(&PORT_SETTINGS_ACTIONS, &tunnels)?;

        Ok(Self {
            components,
            tunnels,
            ports,
            clock: ClockController::new(),
            audio: BufferPool::new(
                ComponentRole::AudioRender,
                AUDIO_RENDER_INPUT_PORT,
                config.audio_buffer_count,
            ),
            video: BufferPool::new(
                ComponentRole::Decoder,
                DECODER_INPUT_PORT,
                config.video_buffer_count,
            ),
            handlers: HandlerRegistry::new(),
            config,
            running: false,
            audio_buffers_enabled: false,
        })
    }

    /// Creates the always-present components and brings the clock path up.
    pub fn bring_up(&mut self, display: u32, layer: i32) -> Result<(), PipelineError> {
        for (role, input_buffers) in INIT_COMPONENTS {
            self.components.create(role, input_buffers)?;
        }

        let timeout = self.config.tunnel_setup_timeout;
        self.tunnels
            .setup(TunnelId::ClockToScheduler, &self.components, timeout)?;
        self.tunnels
            .setup(TunnelId::ClockToAudioRender, &self.components, timeout)?;

        self.components
            .change_state(ComponentRole::Clock, ComponentState::Executing)?;
        self.components
            .change_state(ComponentRole::AudioRender, ComponentState::Idle)?;

        self.set_display(display, layer);
        self.clock.set_latency_targets(&self.components);
        self.clock
            .select_reference(&self.components, ClockReference::Video);
        self.flush_audio();

        self.running = true;
        Ok(())
    }

    /// Releases everything the pipeline holds. Safe to call more than once
    /// and after a partial bring-up.
    ///
    /// Returns the removed handlers so the caller can drop them outside the
    /// state borrow.
    pub fn shut_down(&mut self) -> Vec<Arc<dyn EventHandler>> {
        self.running = false;

        if self.tunnels.state(TunnelId::ClockToAudioRender) == TunnelState::SetUp {
            if let Err(e) = self
                .tunnels
                .disable(TunnelId::ClockToAudioRender, &self.components)
            {
                tracing::error!(error = %e, "failed to disable clock to audio render tunnel");
            }
        }

        for role in [ComponentRole::Clock, ComponentRole::AudioRender] {
            if self.components.exists(role) {
                if let Err(e) = self.components.change_state(role, ComponentState::Idle) {
                    tracing::error!(error = %e, "failed to idle component");
                }
            }
        }

        self.disable_audio_buffers();
        self.components.cleanup_all();

        let handlers = self.handlers.snapshot();
        self.handlers.clear();
        handlers
    }

    // --- event dispatch ---

    /// Applies `event` and returns the notification handlers should get.
    pub fn handle_event(&mut self, event: Event) -> Option<PipelineEvent> {
        match event {
            Event::PortSettingsChanged { port } => {
                self.port_settings_changed(port);
                Some(PipelineEvent::PortSettingsChanged(port))
            }
            Event::ConfigChanged { index } => {
                let stalled = index == ConfigIndex::BufferStall
                    && !self.clock.is_frozen()
                    && self.decoder_stalled();
                stalled.then_some(PipelineEvent::BufferStalled)
            }
            Event::EndOfStream { port } => Some(PipelineEvent::EndOfStream(port)),
            Event::BufferEmptied { role } => {
                self.buffer_emptied(role);
                Some(PipelineEvent::BufferEmptied(role))
            }
        }
    }

    fn port_settings_changed(&mut self, port: u32) {
        tracing::debug!(port, "port settings changed");
        let Some(action) = self.ports.lookup(port) else {
            return;
        };

        let timeout = self.config.tunnel_setup_timeout;
        if let Err(e) = self.tunnels.setup(action.tunnel, &self.components, timeout) {
            tracing::error!(error = %e, tunnel = %action.tunnel, "failed to set up tunnel");
        }
        if let Err(e) = self
            .components
            .change_state(action.enable, ComponentState::Executing)
        {
            tracing::error!(error = %e, role = %action.enable, "failed to enable component");
        }
    }

    fn decoder_stalled(&self) -> bool {
        match self.components.get_config(
            ComponentRole::Decoder,
            ConfigIndex::BufferStall,
            DECODER_OUTPUT_PORT,
        ) {
            Ok(Config::BufferStall { stalled, .. }) => stalled,
            Ok(_) => false,
            Err(e) => {
                tracing::error!(error = %e, "failed to get video decoder stall config");
                false
            }
        }
    }

    fn buffer_emptied(&mut self, role: ComponentRole) {
        match role {
            ComponentRole::AudioRender => self.audio.buffer_emptied(),
            ComponentRole::Decoder => self.video.buffer_emptied(),
            other => tracing::debug!(role = %other, "buffer emptied on untracked component"),
        }
    }

    pub fn tick(&mut self) {
        self.audio.tick();
        self.video.tick();
    }

    // --- audio ---

    /// Configures the audio render for `format` and starts it.
    ///
    /// A running audio path is stopped first. Rejected get/set calls are
    /// logged and skipped; buffer, state and tunnel failures are returned.
    pub fn setup_audio_render(&mut self, format: &AudioFormat) -> Result<(), PipelineError> {
        tracing::debug!(
            codec = %format.codec,
            channels = format.channels,
            port = ?format.port,
            sample_rate = format.sample_rate,
            "setting up audio render"
        );

        if self.components.state(ComponentRole::AudioRender) == Some(ComponentState::Executing) {
            self.stop_audio();
        }

        // Spares from an earlier allocation must not outlive it.
        self.disable_audio_buffers();

        audio::configure_format(&self.components, format);

        let count = self.config.audio_buffer_count;
        audio::configure_buffers(&self.components, count, self.config.audio_buffer_size);
        self.audio.reset(count);

        self.components
            .enable_port_buffers(ComponentRole::AudioRender, AUDIO_RENDER_INPUT_PORT)?;
        self.audio_buffers_enabled = true;

        self.components
            .change_state(ComponentRole::AudioRender, ComponentState::Executing)?;
        self.tunnels.setup(
            TunnelId::ClockToAudioRender,
            &self.components,
            self.config.tunnel_setup_timeout,
        )?;
        Ok(())
    }

    /// Puts the audio render back to idle and frees its buffers.
    pub fn stop_audio(&mut self) {
        if self.tunnels.state(TunnelId::ClockToAudioRender) == TunnelState::SetUp {
            if let Err(e) = self
                .tunnels
                .flush(TunnelId::ClockToAudioRender, &self.components)
            {
                tracing::error!(error = %e, "failed to flush clock to audio render tunnel");
            }
            if let Err(e) = self
                .tunnels
                .disable(TunnelId::ClockToAudioRender, &self.components)
            {
                tracing::error!(error = %e, "failed to disable clock to audio render tunnel");
            }
        }

        if let Err(e) = self
            .components
            .change_state(ComponentRole::AudioRender, ComponentState::Idle)
        {
            tracing::error!(error = %e, "failed to idle audio render");
        }
        self.disable_audio_buffers();
    }

    fn disable_audio_buffers(&mut self) {
        let spares = self.audio.drain_spares();
        if !self.audio_buffers_enabled {
            return;
        }
        tracing::debug!(spares = spares.len(), "disabling audio render buffers");
        self.components.disable_port_buffers(
            ComponentRole::AudioRender,
            AUDIO_RENDER_INPUT_PORT,
            spares,
        );
        self.audio_buffers_enabled = false;
    }

    /// Drops queued audio and resynchronizes the audio clock port.
    pub fn flush_audio(&mut self) {
        if let Err(e) = self
            .components
            .flush(ComponentRole::AudioRender, AUDIO_RENDER_INPUT_PORT)
        {
            tracing::error!(error = %e, "failed to flush audio render");
        }
        if let Err(e) = self
            .tunnels
            .flush(TunnelId::ClockToAudioRender, &self.components)
        {
            tracing::debug!(error = %e, "clock to audio render tunnel not flushed");
        }
    }

    pub fn get_audio_buffer(&mut self, pts: i64) -> Option<BufferHeader> {
        self.audio.acquire(&self.components, pts)
    }

    /// Submits `buffer`. A buffer from port buffers that were already
    /// disabled is dropped and never requeued.
    pub fn empty_audio_buffer(&mut self, buffer: BufferHeader) -> bool {
        if !self.audio_buffers_enabled {
            tracing::warn!(buffer = buffer.id(), "dropping audio buffer submitted after stop");
            return false;
        }
        self.audio.release(&self.components, buffer)
    }

    // --- clock ---

    pub fn start_clock(&mut self, wait_for_video: bool, wait_for_audio: bool) {
        if wait_for_audio {
            self.audio.arm_start_time();
        }
        self.clock
            .start(&self.components, wait_for_video, wait_for_audio);
    }

    // --- display ---

    pub fn set_display(&self, display: u32, layer: i32) {
        display::apply(
            &self.components,
            DisplayRegion::display(display, layer),
            "display and layer",
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioCodec, AudioPort};
    use crate::component::test_registry;
    use crate::hardware::mock::{HardwareCall, MockHardware};
    use crate::ports::FX_OUTPUT_PORT;

    fn state(mock: &Arc<MockHardware>) -> PipelineState {
        let mut state = PipelineState::new(test_registry(mock), PipelineConfig::default()).unwrap();
        state.bring_up(0, 1).unwrap();
        state
    }

    fn pcm_stereo() -> AudioFormat {
        AudioFormat {
            codec: AudioCodec::Pcm,
            channels: 2,
            port: AudioPort::Hdmi,
            sample_rate: 48000,
            frame_size: 0,
        }
    }

    #[test]
    fn test_bring_up_creates_clock_path() {
        let mock = Arc::new(MockHardware::new());
        let state = state(&mock);

        assert!(state.running);
        assert_eq!(
            state.components.state(ComponentRole::Clock),
            Some(ComponentState::Executing)
        );
        assert_eq!(
            state.components.state(ComponentRole::AudioRender),
            Some(ComponentState::Idle)
        );
        assert_eq!(
            state.tunnels.state(TunnelId::ClockToScheduler),
            TunnelState::SetUp
        );
        assert_eq!(
            state.tunnels.state(TunnelId::FxToScheduler),
            TunnelState::Declared
        );
        assert_eq!(state.clock.reference(), ClockReference::Video);
    }

    #[test]
    fn test_bring_up_fails_on_create() {
        let mock = Arc::new(MockHardware::new());
        mock.fail_create(ComponentRole::AudioRender);
        let mut state = PipelineState::new(test_registry(&mock), PipelineConfig::default()).unwrap();

        let err = state.bring_up(0, 0).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ComponentCreateFailed {
                role: ComponentRole::AudioRender,
                ..
            }
        ));
        assert!(!state.running);

        state.shut_down();
        assert!(!mock.is_alive(ComponentRole::Render));
        assert!(!mock.is_alive(ComponentRole::Clock));
    }

    #[test]
    fn test_unmapped_port_is_ignored_but_reported() {
        let mock = Arc::new(MockHardware::new());
        let mut state = state(&mock);
        mock.clear_calls();

        let event = state.handle_event(Event::PortSettingsChanged { port: 131 });
        assert_eq!(event, Some(PipelineEvent::PortSettingsChanged(131)));
        assert_eq!(
            mock.count(|c| matches!(c, HardwareCall::SetupTunnel { .. })),
            0
        );
    }

    #[test]
    fn test_fx_port_settings_bring_up_scheduler() {
        let mock = Arc::new(MockHardware::new());
        let mut state = state(&mock);
        state.components.create(ComponentRole::Fx, false).unwrap();
        mock.clear_calls();

        state.handle_event(Event::PortSettingsChanged {
            port: FX_OUTPUT_PORT,
        });

        assert_eq!(
            state.tunnels.state(TunnelId::FxToScheduler),
            TunnelState::SetUp
        );
        assert_eq!(
            state.components.state(ComponentRole::Scheduler),
            Some(ComponentState::Executing)
        );
    }

    #[test]
    fn test_stall_needs_running_clock() {
        let mock = Arc::new(MockHardware::new());
        let mut state = state(&mock);
        state.components.create(ComponentRole::Decoder, true).unwrap();
        mock.set_stalled(true);

        let stall = Event::ConfigChanged {
            index: ConfigIndex::BufferStall,
        };
        // Scale starts at zero: frozen.
        assert_eq!(state.handle_event(stall), None);

        state.clock.set_scale(&state.components, crate::clock::NORMAL_SCALE);
        assert_eq!(state.handle_event(stall), Some(PipelineEvent::BufferStalled));

        mock.set_stalled(false);
        assert_eq!(state.handle_event(stall), None);

        let other = Event::ConfigChanged {
            index: ConfigIndex::TimeScale,
        };
        mock.set_stalled(true);
        assert_eq!(state.handle_event(other), None);
    }

    #[test]
    fn test_buffer_emptied_routes_to_pool() {
        let mock = Arc::new(MockHardware::new());
        let mut state = state(&mock);
        state.setup_audio_render(&pcm_stereo()).unwrap();

        let buf = state.get_audio_buffer(0).unwrap();
        assert!(state.empty_audio_buffer(buf));
        assert_eq!(state.audio.outstanding(), 1);

        let event = state.handle_event(Event::BufferEmptied {
            role: ComponentRole::AudioRender,
        });
        assert_eq!(
            event,
            Some(PipelineEvent::BufferEmptied(ComponentRole::AudioRender))
        );
        assert_eq!(state.audio.outstanding(), 0);

        state.handle_event(Event::BufferEmptied {
            role: ComponentRole::Render,
        });
        assert_eq!(state.audio.outstanding(), 0);
    }

    #[test]
    fn test_stop_audio_returns_spares() {
        let mock = Arc::new(MockHardware::new());
        let mut state = state(&mock);
        state.setup_audio_render(&pcm_stereo()).unwrap();

        let first = state.get_audio_buffer(0).unwrap();
        let second = state.get_audio_buffer(3600).unwrap();
        mock.fail_next_empty(2);
        assert!(!state.empty_audio_buffer(first));
        assert!(!state.empty_audio_buffer(second));
        assert_eq!(state.audio.spare_count(), 2);

        state.stop_audio();

        assert_eq!(state.audio.spare_count(), 0);
        assert!(mock.calls().contains(&HardwareCall::DisablePortBuffers {
            role: ComponentRole::AudioRender,
            port: AUDIO_RENDER_INPUT_PORT,
            returned: 2,
        }));
        assert_eq!(
            state.tunnels.state(TunnelId::ClockToAudioRender),
            TunnelState::Disabled
        );
        assert_eq!(
            state.components.state(ComponentRole::AudioRender),
            Some(ComponentState::Idle)
        );
    }

    #[test]
    fn test_buffer_held_across_stop_is_not_reused() {
        let mock = Arc::new(MockHardware::new());
        let mut state = state(&mock);
        state.setup_audio_render(&pcm_stereo()).unwrap();

        let stale = state.get_audio_buffer(0).unwrap();
        let stale_id = stale.id();
        state.stop_audio();

        assert!(!state.empty_audio_buffer(stale));
        assert_eq!(state.audio.spare_count(), 0);
        assert_eq!(
            mock.count(|c| matches!(c, HardwareCall::EmptyBuffer { .. })),
            0
        );

        state.setup_audio_render(&pcm_stereo()).unwrap();
        let fresh = state.get_audio_buffer(3600).unwrap();
        assert_ne!(fresh.id(), stale_id);
        assert_eq!(state.audio.outstanding(), 1);
    }

    #[test]
    fn test_setup_returns_spares_from_failed_setup() {
        let mock = Arc::new(MockHardware::new());
        let mut state = state(&mock);

        mock.drop_acks(true);
        assert!(state.setup_audio_render(&pcm_stereo()).is_err());
        mock.drop_acks(false);

        let buf = state.get_audio_buffer(0).unwrap();
        mock.fail_next_empty(1);
        assert!(!state.empty_audio_buffer(buf));
        assert_eq!(state.audio.spare_count(), 1);

        state.setup_audio_render(&pcm_stereo()).unwrap();

        assert_eq!(state.audio.spare_count(), 0);
        assert!(mock.calls().contains(&HardwareCall::DisablePortBuffers {
            role: ComponentRole::AudioRender,
            port: AUDIO_RENDER_INPUT_PORT,
            returned: 1,
        }));
    }

    #[test]
    fn test_setup_audio_render_twice_restarts() {
        let mock = Arc::new(MockHardware::new());
        let mut state = state(&mock);

        state.setup_audio_render(&pcm_stereo()).unwrap();
        state.setup_audio_render(&pcm_stereo()).unwrap();

        assert_eq!(
            state.components.state(ComponentRole::AudioRender),
            Some(ComponentState::Executing)
        );
        assert_eq!(
            mock.count(|c| matches!(c, HardwareCall::DisablePortBuffers { .. })),
            1
        );
    }

    #[test]
    fn test_start_clock_arms_audio_start_time() {
        let mock = Arc::new(MockHardware::new());
        let mut state = state(&mock);

        state.start_clock(false, false);
        assert!(!state.audio.start_time_pending());

        state.start_clock(true, true);
        assert!(state.audio.start_time_pending());
    }

    #[test]
    fn test_shut_down_is_idempotent() {
        let mock = Arc::new(MockHardware::new());
        let mut state = state(&mock);
        state.setup_audio_render(&pcm_stereo()).unwrap();

        state.shut_down();
        let calls = mock.calls().len();
        state.shut_down();

        assert_eq!(mock.calls().len(), calls);
        for role in ComponentRole::ALL {
            assert!(!mock.is_alive(role));
        }
    }
}
