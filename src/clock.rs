//! Shared media clock control and time unit conversion.
//!
//! Callers speak 90 kHz presentation timestamps; the clock component counts
//! in microsecond ticks. The two are related by `ticks = pts * 100 / 9`.

use std::fmt;

use crate::component::{ComponentRegistry, ComponentRole};
use crate::hardware::{Config, ConfigIndex};
use crate::ports::{
    ALL_PORTS, AUDIO_RENDER_INPUT_PORT, CLOCK_AUDIO_PORT, CLOCK_VIDEO_PORT, RENDER_INPUT_PORT,
};

/// Timestamp value meaning "no valid time".
pub const INVALID_PTS: i64 = -1;

/// Clock scale for normal speed playback, 16.16 fixed point.
pub const NORMAL_SCALE: i32 = 1 << 16;

/// Pre-roll applied at clock start, in milliseconds.
const PRE_ROLL_MS: i64 = 0;

/// Wait-mask bit for the video clock port.
pub const WAIT_FOR_VIDEO: u32 = 1 << 0;
/// Wait-mask bit for the audio clock port.
pub const WAIT_FOR_AUDIO: u32 = 1 << 1;

/// A 64-bit tick count split into the two halves the hardware exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Ticks {
    /// Low 32 bits.
    pub low: u32,
    /// High 32 bits.
    pub high: u32,
}

impl Ticks {
    /// Splits a signed tick count.
    pub fn from_i64(value: i64) -> Self {
        Self {
            low: value as u32,
            high: (value >> 32) as u32,
        }
    }

    /// Joins the halves into a signed tick count.
    pub fn to_i64(self) -> i64 {
        (i64::from(self.high as i32) << 32) | i64::from(self.low)
    }
}

impl From<i64> for Ticks {
    fn from(value: i64) -> Self {
        Self::from_i64(value)
    }
}

/// Converts a presentation timestamp to clock ticks (truncating).
pub fn pts_to_ticks(pts: i64) -> Ticks {
    Ticks::from_i64(pts.saturating_mul(100) / 9)
}

/// Converts clock ticks to a presentation timestamp, rounding to nearest.
///
/// Rounding makes `ticks_to_pts(pts_to_ticks(x)) == x` for every timestamp
/// that does not saturate. A media time read from the clock can therefore
/// be one above a truncating `ticks * 9 / 100`.
pub fn ticks_to_pts(ticks: Ticks) -> i64 {
    let scaled = ticks.to_i64().saturating_mul(9);
    if scaled >= 0 {
        scaled.saturating_add(50) / 100
    } else {
        -(scaled.saturating_neg().saturating_add(50) / 100)
    }
}

/// Which stream's timestamps drive the shared clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ClockReference {
    /// Free running.
    #[default]
    None,
    /// Audio render timestamps.
    Audio,
    /// Video scheduler timestamps.
    Video,
}

impl fmt::Display for ClockReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Audio => "audio",
            Self::Video => "video",
        })
    }
}

/// Run state of the clock component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ClockState {
    /// Not running.
    #[default]
    Stopped,
    /// Waiting for the first timestamp on every port in the wait mask.
    WaitingForStartTime,
    /// Running.
    Running,
}

/// Clock state config block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockStateConfig {
    /// Requested state.
    pub state: ClockState,
    /// Ports that must deliver a start time (`WAIT_FOR_*` bits).
    pub wait_mask: u32,
    /// Offset applied to the start time.
    pub offset: Ticks,
}

/// Latency target tuning block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyTarget {
    /// Port the target applies to.
    pub port: u32,
    /// Whether latency adjustment is enabled.
    pub enabled: bool,
    /// Filter length.
    pub filter: u32,
    /// Target latency.
    pub target: u32,
    /// Averaging shift.
    pub shift: u32,
    /// Speed adjustment factor.
    pub speed_factor: i32,
    /// Interpolation factor.
    pub inter_factor: i32,
    /// Adjustment cap.
    pub adj_cap: i32,
}

impl LatencyTarget {
    /// Tuning for the clock component.
    pub const CLOCK: Self = Self {
        port: ALL_PORTS,
        enabled: true,
        filter: 10,
        target: 0,
        shift: 3,
        speed_factor: -60,
        inter_factor: 100,
        adj_cap: 100,
    };

    /// Tuning for the video render input port.
    pub const VIDEO_RENDER: Self = Self {
        port: RENDER_INPUT_PORT,
        enabled: true,
        filter: 2,
        target: 4000,
        shift: 3,
        speed_factor: -135,
        inter_factor: 500,
        adj_cap: 20,
    };
}

/// Tracks the selected reference and scale of the clock component.
#[derive(Debug, Default)]
pub(crate) struct ClockController {
    reference: ClockReference,
    scale: i32,
}

impl ClockController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reference(&self) -> ClockReference {
        self.reference
    }

    pub fn scale(&self) -> i32 {
        self.scale
    }

    /// Zero scale means the clock is paused.
    pub fn is_frozen(&self) -> bool {
        self.scale == 0
    }

    /// Selects the reference. The new selection is recorded even if the
    /// hardware refuses it.
    pub fn select_reference(&mut self, components: &ComponentRegistry, reference: ClockReference) {
        if self.reference == reference {
            return;
        }

        match components.set_config(ComponentRole::Clock, &Config::ActiveRefClock(reference)) {
            Ok(()) => tracing::debug!(%reference, "set active clock reference"),
            Err(e) => tracing::error!(error = %e, "failed to set active clock reference"),
        }
        self.reference = reference;
    }

    pub fn start(&self, components: &ComponentRegistry, wait_for_video: bool, wait_for_audio: bool) {
        tracing::debug!(wait_for_video, wait_for_audio, "starting clock");

        let mut config = ClockStateConfig {
            state: ClockState::Running,
            wait_mask: 0,
            offset: Ticks::from_i64(-1000 * PRE_ROLL_MS),
        };
        if wait_for_video {
            config.state = ClockState::WaitingForStartTime;
            config.wait_mask |= WAIT_FOR_VIDEO;
        }
        if wait_for_audio {
            config.state = ClockState::WaitingForStartTime;
            config.wait_mask |= WAIT_FOR_AUDIO;
        }

        if let Err(e) = components.set_config(ComponentRole::Clock, &Config::ClockState(config)) {
            tracing::error!(error = %e, "failed to start clock");
        }
    }

    pub fn stop(&self, components: &ComponentRegistry) {
        let config = ClockStateConfig {
            state: ClockState::Stopped,
            wait_mask: 0,
            offset: Ticks::from_i64(-1000 * PRE_ROLL_MS),
        };
        if let Err(e) = components.set_config(ComponentRole::Clock, &Config::ClockState(config)) {
            tracing::error!(error = %e, "failed to stop clock");
        }
    }

    /// Sets the playback scale. Recorded only when the hardware accepts it.
    pub fn set_scale(&mut self, components: &ComponentRegistry, scale: i32) {
        if scale == self.scale {
            return;
        }
        match components.set_config(ComponentRole::Clock, &Config::TimeScale(scale)) {
            Ok(()) => {
                tracing::debug!(scale, "clock scale set");
                self.scale = scale;
            }
            Err(e) => tracing::error!(error = %e, scale, "failed to set clock scale"),
        }
    }

    /// Current media time as a presentation timestamp, or [`INVALID_PTS`].
    pub fn media_time(&self, components: &ComponentRegistry) -> i64 {
        match components.get_config(ComponentRole::Clock, ConfigIndex::CurrentMediaTime, ALL_PORTS) {
            Ok(Config::CurrentMediaTime { timestamp, .. }) => ticks_to_pts(timestamp),
            Ok(other) => {
                tracing::error!(?other, "unexpected media time config");
                INVALID_PTS
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to get current media time");
                INVALID_PTS
            }
        }
    }

    pub fn is_running(&self, components: &ComponentRegistry) -> bool {
        match components.get_config(ComponentRole::Clock, ConfigIndex::ClockState, ALL_PORTS) {
            Ok(Config::ClockState(config)) => config.state == ClockState::Running,
            Ok(_) => false,
            Err(e) => {
                tracing::error!(error = %e, "failed to get clock state");
                false
            }
        }
    }

    /// Re-arms the reference time of the port(s) the active reference uses.
    pub fn reset_reference(&self, components: &ComponentRegistry) {
        if matches!(self.reference, ClockReference::Audio | ClockReference::None) {
            let config = Config::CurrentAudioReference {
                port: CLOCK_AUDIO_PORT,
            };
            if let Err(e) = components.set_config(ComponentRole::Clock, &config) {
                tracing::error!(error = %e, "failed to set current audio reference time");
            }
        }

        if matches!(self.reference, ClockReference::Video | ClockReference::None) {
            let config = Config::CurrentVideoReference {
                port: CLOCK_VIDEO_PORT,
            };
            if let Err(e) = components.set_config(ComponentRole::Clock, &config) {
                tracing::error!(error = %e, "failed to set current video reference time");
            }
        }
    }

    pub fn set_latency_targets(&self, components: &ComponentRegistry) {
        let clock = Config::LatencyTarget(LatencyTarget::CLOCK);
        if let Err(e) = components.set_config(ComponentRole::Clock, &clock) {
            tracing::error!(error = %e, "failed to set clock latency target");
        }

        let render = Config::LatencyTarget(LatencyTarget::VIDEO_RENDER);
        if let Err(e) = components.set_config(ComponentRole::Render, &render) {
            tracing::error!(error = %e, "failed to set video render latency target");
        }
    }

    /// Audio render latency, 0 when unavailable.
    pub fn audio_latency(&self, components: &ComponentRegistry) -> u32 {
        match components.get_config(
            ComponentRole::AudioRender,
            ConfigIndex::AudioRenderingLatency,
            AUDIO_RENDER_INPUT_PORT,
        ) {
            Ok(Config::AudioRenderingLatency { latency, .. }) => latency,
            Ok(_) => 0,
            Err(e) => {
                tracing::error!(error = %e, "failed to get audio render latency");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::test_registry;
    use crate::hardware::mock::{HardwareCall, MockHardware};
    use std::sync::Arc;

    fn setup() -> (Arc<MockHardware>, ComponentRegistry) {
        let mock = Arc::new(MockHardware::new());
        let mut reg = test_registry(&mock);
        reg.create(ComponentRole::Clock, false).unwrap();
        reg.create(ComponentRole::Render, false).unwrap();
        reg.create(ComponentRole::AudioRender, true).unwrap();
        (mock, reg)
    }

    fn clock_sets(mock: &MockHardware) -> Vec<Config> {
        mock.set_configs(ComponentRole::Clock)
    }

    #[test]
    fn test_ticks_split_join() {
        let ticks = Ticks::from_i64(0x1234_5678_9abc_def0);
        assert_eq!(ticks.high, 0x1234_5678);
        assert_eq!(ticks.low, 0x9abc_def0);
        assert_eq!(ticks.to_i64(), 0x1234_5678_9abc_def0);

        assert_eq!(Ticks::from_i64(-1).to_i64(), -1);
        assert_eq!(Ticks::from_i64(-1_000_000).to_i64(), -1_000_000);
    }

    #[test]
    fn test_pts_ticks_conversion() {
        assert_eq!(pts_to_ticks(90_000).to_i64(), 1_000_000);
        assert_eq!(ticks_to_pts(Ticks::from_i64(1_000_000)), 90_000);
        assert_eq!(pts_to_ticks(1).to_i64(), 11);
        // 17 * 9 / 100 = 1.53 rounds up.
        assert_eq!(ticks_to_pts(Ticks::from_i64(17)), 2);
    }

    #[test]
    fn test_pts_round_trip() {
        let max_33_bit = (1i64 << 33) - 1;
        let samples = [0, 1, 2, 8, 9, 10, 99, 3003, 90_000, 123_456_789, max_33_bit];
        for pts in samples {
            assert_eq!(ticks_to_pts(pts_to_ticks(pts)), pts, "pts {pts}");
        }
        for pts in (0..100_000).step_by(7) {
            assert_eq!(ticks_to_pts(pts_to_ticks(pts)), pts);
        }
        for pts in [-1, -9, -90_000] {
            assert_eq!(ticks_to_pts(pts_to_ticks(pts)), pts);
        }
    }

    #[test]
    fn test_select_reference_is_idempotent() {
        let (mock, reg) = setup();
        let mut clock = ClockController::new();

        clock.select_reference(&reg, ClockReference::Video);
        clock.select_reference(&reg, ClockReference::Video);
        assert_eq!(
            clock_sets(&mock),
            vec![Config::ActiveRefClock(ClockReference::Video)]
        );
        assert_eq!(clock.reference(), ClockReference::Video);

        // Re-selecting the initial reference must not issue a call either.
        let mut fresh = ClockController::new();
        fresh.select_reference(&reg, ClockReference::None);
        assert_eq!(clock_sets(&mock).len(), 1);
    }

    #[test]
    fn test_select_reference_recorded_on_failure() {
        let (mock, reg) = setup();
        mock.fail_set_config(ConfigIndex::ActiveRefClock);
        let mut clock = ClockController::new();

        clock.select_reference(&reg, ClockReference::Audio);
        assert_eq!(clock.reference(), ClockReference::Audio);
    }

    #[test]
    fn test_set_scale_is_idempotent() {
        let (mock, reg) = setup();
        let mut clock = ClockController::new();
        assert!(clock.is_frozen());

        clock.set_scale(&reg, NORMAL_SCALE);
        clock.set_scale(&reg, NORMAL_SCALE);
        assert_eq!(clock_sets(&mock), vec![Config::TimeScale(NORMAL_SCALE)]);
        assert!(!clock.is_frozen());
    }

    #[test]
    fn test_set_scale_not_recorded_on_failure() {
        let (mock, reg) = setup();
        mock.fail_set_config(ConfigIndex::TimeScale);
        let mut clock = ClockController::new();

        clock.set_scale(&reg, NORMAL_SCALE);
        assert_eq!(clock.scale(), 0);
    }

    #[test]
    fn test_start_builds_wait_mask() {
        let (mock, reg) = setup();
        let clock = ClockController::new();

        clock.start(&reg, false, false);
        clock.start(&reg, true, false);
        clock.start(&reg, true, true);

        let states: Vec<_> = clock_sets(&mock)
            .into_iter()
            .filter_map(|c| match c {
                Config::ClockState(s) => Some((s.state, s.wait_mask)),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                (ClockState::Running, 0),
                (ClockState::WaitingForStartTime, WAIT_FOR_VIDEO),
                (
                    ClockState::WaitingForStartTime,
                    WAIT_FOR_VIDEO | WAIT_FOR_AUDIO
                ),
            ]
        );
    }

    #[test]
    fn test_media_time_reads_clock() {
        let (mock, reg) = setup();
        let clock = ClockController::new();

        mock.set_media_time(pts_to_ticks(45_000));
        assert_eq!(clock.media_time(&reg), 45_000);

        mock.fail_get_config(ConfigIndex::CurrentMediaTime);
        assert_eq!(clock.media_time(&reg), INVALID_PTS);
    }

    #[test]
    fn test_is_running_follows_clock_state() {
        let (_mock, reg) = setup();
        let clock = ClockController::new();

        assert!(!clock.is_running(&reg));
        clock.start(&reg, false, false);
        assert!(clock.is_running(&reg));
        clock.stop(&reg);
        assert!(!clock.is_running(&reg));
    }

    #[test]
    fn test_reset_reference_ports() {
        let (mock, reg) = setup();
        let mut clock = ClockController::new();

        clock.reset_reference(&reg);
        assert_eq!(
            clock_sets(&mock),
            vec![
                Config::CurrentAudioReference {
                    port: CLOCK_AUDIO_PORT
                },
                Config::CurrentVideoReference {
                    port: CLOCK_VIDEO_PORT
                },
            ]
        );

        clock.select_reference(&reg, ClockReference::Video);
        mock.clear_calls();
        clock.reset_reference(&reg);
        assert_eq!(
            clock_sets(&mock),
            vec![Config::CurrentVideoReference {
                port: CLOCK_VIDEO_PORT
            }]
        );
    }

    #[test]
    fn test_latency_targets() {
        let (mock, reg) = setup();
        ClockController::new().set_latency_targets(&reg);

        assert_eq!(
            clock_sets(&mock),
            vec![Config::LatencyTarget(LatencyTarget::CLOCK)]
        );
        assert_eq!(
            mock.set_configs(ComponentRole::Render),
            vec![Config::LatencyTarget(LatencyTarget::VIDEO_RENDER)]
        );
        assert_eq!(mock.count(|c| matches!(c, HardwareCall::SetConfig { .. })), 2);
    }

    #[test]
    fn test_audio_latency() {
        let (mock, reg) = setup();
        let clock = ClockController::new();

        mock.set_audio_latency(1234);
        assert_eq!(clock.audio_latency(&reg), 1234);

        mock.fail_get_config(ConfigIndex::AudioRenderingLatency);
        assert_eq!(clock.audio_latency(&reg), 0);
    }
}
