//! Pipeline configuration.

use std::time::Duration;

use crate::error::PipelineError;

/// Tuning values for a pipeline.
///
/// Use [`PipelineConfig::default()`] for the values the hardware is known to
/// work with, or customize as needed.
///
/// # Example
///
/// ```
/// use omx_pipeline::PipelineConfig;
/// use std::time::Duration;
///
/// let config = PipelineConfig {
///     state_change_timeout: Duration::from_millis(250),
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Number of audio render input buffers requested at audio setup.
    ///
    /// Also the capacity the audio usage fraction is measured against.
    /// Default: 128
    pub audio_buffer_count: u32,

    /// Size of each audio render input buffer in bytes.
    ///
    /// Default: 16 KiB
    pub audio_buffer_size: u32,

    /// Capacity the video usage fraction is measured against.
    ///
    /// Default: 64
    pub video_buffer_count: u32,

    /// Interval between dispatcher ticks.
    ///
    /// Usage histories shift once per tick, so the history window is
    /// sixteen ticks long.
    /// Default: 100ms
    pub tick_interval: Duration,

    /// How long to wait for each acknowledged state change rung.
    ///
    /// Default: 1s
    pub state_change_timeout: Duration,

    /// How long tunnel setup may negotiate. Zero leaves the choice to the
    /// hardware.
    ///
    /// Default: 0
    pub tunnel_setup_timeout: Duration,

    /// How long to wait for a port flush acknowledgement.
    ///
    /// Default: 1s
    pub flush_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            audio_buffer_count: 128,
            audio_buffer_size: 16 * 1024,
            video_buffer_count: 64,
            tick_interval: Duration::from_millis(100),
            state_change_timeout: Duration::from_secs(1),
            tunnel_setup_timeout: Duration::ZERO,
            flush_timeout: Duration::from_secs(1),
        }
    }
}

impl PipelineConfig {
    /// Checks that every value is usable.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |reason: &str| {
            Err(PipelineError::InvalidConfig {
                reason: reason.to_owned(),
            })
        };

        if self.audio_buffer_count == 0 {
            return invalid("audio_buffer_count must be non-zero");
        }
        if self.audio_buffer_size == 0 {
            return invalid("audio_buffer_size must be non-zero");
        }
        if self.video_buffer_count == 0 {
            return invalid("video_buffer_count must be non-zero");
        }
        if self.tick_interval.is_zero() {
            return invalid("tick_interval must be non-zero");
        }
        if self.state_change_timeout.is_zero() {
            return invalid("state_change_timeout must be non-zero");
        }
        if self.flush_timeout.is_zero() {
            return invalid("flush_timeout must be non-zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_config_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.audio_buffer_count, 128);
        assert_eq!(config.audio_buffer_size, 16384);
        assert_eq!(config.video_buffer_count, 64);
        assert_eq!(config.tick_interval, Duration::from_millis(100));
        assert_eq!(config.state_change_timeout, Duration::from_secs(1));
        assert_eq!(config.tunnel_setup_timeout, Duration::ZERO);
        assert_eq!(config.flush_timeout, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = PipelineConfig {
            audio_buffer_count: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("audio_buffer_count"));
    }

    #[test]
    fn test_zero_tick_rejected() {
        let config = PipelineConfig {
            tick_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig { .. })
        ));
    }
}
