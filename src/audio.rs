//! Audio render configuration: codecs, parameter blocks and speaker layout.

use std::fmt;

use crate::component::{ComponentRegistry, ComponentRole};
use crate::hardware::{Config, Parameter, ParameterIndex, PortDefinition};
use crate::ports::AUDIO_RENDER_INPUT_PORT;

/// Maximum number of mapped channels.
pub const MAX_CHANNELS: usize = 8;

/// Codec of the stream handed to the audio render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioCodec {
    /// Raw PCM.
    Pcm,
    /// MPEG audio.
    Mpg,
    /// Dolby Digital.
    Ac3,
    /// Dolby Digital Plus.
    Eac3,
    /// AAC in MP4/ADTS framing.
    Aac,
    /// AAC in LATM framing; left to hardware auto-detection.
    Latm,
    /// DTS.
    Dts,
}

impl AudioCodec {
    /// Encoding the render port is switched to.
    pub fn encoding(self) -> AudioEncoding {
        match self {
            Self::Pcm => AudioEncoding::Pcm,
            Self::Mpg => AudioEncoding::Mp3,
            Self::Ac3 | Self::Eac3 => AudioEncoding::Ddp,
            Self::Aac => AudioEncoding::Aac,
            Self::Dts => AudioEncoding::Dts,
            Self::Latm => AudioEncoding::AutoDetect,
        }
    }
}

impl fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pcm => "PCM",
            Self::Mpg => "MPEG-Audio",
            Self::Ac3 => "AC-3",
            Self::Eac3 => "E-AC-3",
            Self::Aac => "AAC",
            Self::Latm => "AAC-LATM",
            Self::Dts => "DTS",
        })
    }
}

/// Encoding of the audio render input port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AudioEncoding {
    /// Let the hardware detect the encoding.
    #[default]
    AutoDetect,
    /// PCM.
    Pcm,
    /// MP3.
    Mp3,
    /// AC3 and EAC3.
    Ddp,
    /// AAC.
    Aac,
    /// DTS.
    Dts,
}

/// Audio output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioPort {
    /// Analogue jack.
    Local,
    /// HDMI.
    Hdmi,
}

impl AudioPort {
    /// Destination name understood by the audio render.
    pub fn destination(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Hdmi => "hdmi",
        }
    }
}

/// Speaker position of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Speaker {
    /// Unused channel slot.
    #[default]
    None,
    /// Front left.
    FrontLeft,
    /// Front right.
    FrontRight,
    /// Front center.
    Center,
    /// Low frequency effects.
    LowFrequency,
    /// Rear left.
    RearLeft,
    /// Rear right.
    RearRight,
    /// Surround (side) left.
    SideLeft,
    /// Surround (side) right.
    SideRight,
}

/// Speaker position per channel index.
pub type ChannelMap = [Speaker; MAX_CHANNELS];

const STEREO: &[Speaker] = &[Speaker::FrontLeft, Speaker::FrontRight];

const LAYOUTS: [(u32, &[Speaker]); 4] = [
    (1, &[Speaker::Center]),
    (
        4,
        &[
            Speaker::FrontLeft,
            Speaker::FrontRight,
            Speaker::RearLeft,
            Speaker::RearRight,
        ],
    ),
    (
        6,
        &[
            Speaker::FrontLeft,
            Speaker::FrontRight,
            Speaker::Center,
            Speaker::LowFrequency,
            Speaker::RearLeft,
            Speaker::RearRight,
        ],
    ),
    // 5.1 plus the two side channels.
    (
        8,
        &[
            Speaker::FrontLeft,
            Speaker::FrontRight,
            Speaker::Center,
            Speaker::LowFrequency,
            Speaker::RearLeft,
            Speaker::RearRight,
            Speaker::SideLeft,
            Speaker::SideRight,
        ],
    ),
];

/// Speaker layout for `channels`. Unlisted counts get plain stereo.
pub fn channel_mapping(channels: u32) -> ChannelMap {
    let layout = LAYOUTS
        .iter()
        .find(|(count, _)| *count == channels)
        .map_or(STEREO, |(_, layout)| *layout);

    let mut map = [Speaker::None; MAX_CHANNELS];
    map[..layout.len()].copy_from_slice(layout);
    map
}

/// MP3 channel mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelMode {
    /// Independent stereo.
    #[default]
    Stereo,
    /// Joint stereo.
    JointStereo,
    /// Dual mono.
    Dual,
    /// Mono.
    Mono,
}

/// MP3 stream format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mp3StreamFormat {
    /// MPEG-1 layer 3.
    #[default]
    Mpeg1Layer3,
    /// MPEG-2 layer 3.
    Mpeg2Layer3,
    /// MPEG-2.5 layer 3.
    Mpeg25Layer3,
}

/// AAC stream format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AacStreamFormat {
    /// MPEG-4 ADTS.
    #[default]
    Mp4Adts,
    /// MPEG-2 ADTS.
    Mp2Adts,
    /// MPEG-4 LATM.
    Mp4Latm,
    /// Raw.
    Raw,
}

/// PCM stream description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmParams {
    /// Port index.
    pub port: u32,
    /// Channel count.
    pub channels: u32,
    /// Samples per second.
    pub sample_rate: u32,
    /// Signed samples.
    pub signed: bool,
    /// Little endian samples.
    pub little_endian: bool,
    /// Interleaved channels.
    pub interleaved: bool,
    /// Bits per sample.
    pub bits_per_sample: u32,
    /// Linear PCM mode.
    pub linear: bool,
    /// Speaker layout.
    pub channel_map: ChannelMap,
}

/// MP3 stream description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mp3Params {
    /// Port index.
    pub port: u32,
    /// Channel count.
    pub channels: u32,
    /// Samples per second.
    pub sample_rate: u32,
    /// Channel mode.
    pub channel_mode: ChannelMode,
    /// Stream format.
    pub format: Mp3StreamFormat,
}

/// AC3/EAC3 stream description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DdpParams {
    /// Port index.
    pub port: u32,
    /// Channel count.
    pub channels: u32,
    /// Samples per second.
    pub sample_rate: u32,
    /// Speaker layout.
    pub channel_map: ChannelMap,
}

/// AAC stream description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AacParams {
    /// Port index.
    pub port: u32,
    /// Channel count.
    pub channels: u32,
    /// Samples per second.
    pub sample_rate: u32,
    /// Stream framing.
    pub stream_format: AacStreamFormat,
}

/// DTS stream description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DtsParams {
    /// Port index.
    pub port: u32,
    /// Channel count.
    pub channels: u32,
    /// Samples per second.
    pub sample_rate: u32,
    /// DTS type.
    pub dts_type: u32,
    /// Sample format (3: 16 bit little endian).
    pub format: u32,
    /// Frame size in bytes.
    pub frame_size: u32,
    /// Speaker layout.
    pub channel_map: ChannelMap,
}

/// What the audio render is about to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Codec.
    pub codec: AudioCodec,
    /// Channel count.
    pub channels: u32,
    /// Output device.
    pub port: AudioPort,
    /// Samples per second.
    pub sample_rate: u32,
    /// Codec frame size in bytes (DTS only).
    pub frame_size: u32,
}

impl AudioFormat {
    /// Codec-specific parameter block, if the codec has one.
    pub fn codec_parameter(&self) -> Option<Parameter> {
        let port = AUDIO_RENDER_INPUT_PORT;
        let channels = self.channels;
        let sample_rate = self.sample_rate;

        let param = match self.codec {
            AudioCodec::Mpg => Parameter::AudioMp3(Mp3Params {
                port,
                channels,
                sample_rate,
                channel_mode: ChannelMode::Stereo,
                format: Mp3StreamFormat::Mpeg1Layer3,
            }),
            AudioCodec::Ac3 | AudioCodec::Eac3 => Parameter::AudioDdp(DdpParams {
                port,
                channels,
                sample_rate,
                channel_map: channel_mapping(channels),
            }),
            AudioCodec::Aac => Parameter::AudioAac(AacParams {
                port,
                channels,
                sample_rate,
                stream_format: AacStreamFormat::Mp4Adts,
            }),
            AudioCodec::Dts => Parameter::AudioDts(DtsParams {
                port,
                channels,
                sample_rate,
                dts_type: 1,
                format: 3,
                frame_size: self.frame_size,
                channel_map: channel_mapping(channels),
            }),
            AudioCodec::Pcm => Parameter::AudioPcm(PcmParams {
                port,
                channels,
                sample_rate,
                signed: true,
                little_endian: true,
                interleaved: true,
                bits_per_sample: 16,
                linear: true,
                channel_map: channel_mapping(channels),
            }),
            AudioCodec::Latm => return None,
        };
        Some(param)
    }
}

/// Applies encoding, codec block and destination to the audio render.
/// Every failing call is logged and skipped.
pub(crate) fn configure_format(components: &ComponentRegistry, format: &AudioFormat) {
    let role = ComponentRole::AudioRender;
    let port = AUDIO_RENDER_INPUT_PORT;

    if let Err(e) = components.get_parameter(role, ParameterIndex::AudioPortFormat, port) {
        tracing::error!(error = %e, "failed to get audio port format parameters");
    }
    let encoding = Parameter::AudioPortFormat {
        port,
        encoding: format.codec.encoding(),
    };
    if let Err(e) = components.set_parameter(role, &encoding) {
        tracing::error!(error = %e, "failed to set audio port format parameters");
    }

    match format.codec_parameter() {
        Some(param) => {
            if let Err(e) = components.set_parameter(role, &param) {
                tracing::error!(error = %e, codec = %format.codec, "failed to set audio render codec parameters");
            }
        }
        None => tracing::error!(codec = %format.codec, "output codec not supported"),
    }

    let destination = Config::AudioDestination(format.port.destination().to_owned());
    if let Err(e) = components.set_config(role, &destination) {
        tracing::error!(error = %e, "failed to set audio destination");
    }
}

/// Sizes the audio render input buffers.
pub(crate) fn configure_buffers(components: &ComponentRegistry, count: u32, size: u32) {
    let role = ComponentRole::AudioRender;
    let port = AUDIO_RENDER_INPUT_PORT;

    let mut definition = match components.get_parameter(role, ParameterIndex::PortDefinition, port) {
        Ok(Parameter::PortDefinition(definition)) => definition,
        Ok(_) => PortDefinition::default(),
        Err(e) => {
            tracing::error!(error = %e, "failed to get audio render port parameters");
            PortDefinition::default()
        }
    };
    definition.port = port;
    definition.buffer_size = size;
    definition.buffer_count_actual = count;

    if let Err(e) = components.set_parameter(role, &Parameter::PortDefinition(definition)) {
        tracing::error!(error = %e, "failed to set audio render port parameters");
    }
}

/// Maps `0..=255` onto the linear `0..=100` volume scale.
pub fn linear_volume(volume: u8) -> i32 {
    i32::from(volume) * 100 / 255
}

pub(crate) fn set_volume(components: &ComponentRegistry, volume: u8) {
    let config = Config::AudioVolume {
        port: AUDIO_RENDER_INPUT_PORT,
        linear: true,
        value: linear_volume(volume),
    };
    if let Err(e) = components.set_config(ComponentRole::AudioRender, &config) {
        tracing::error!(error = %e, "failed to set volume");
    }
}

pub(crate) fn set_mute(components: &ComponentRegistry, mute: bool) {
    let config = Config::AudioMute {
        port: AUDIO_RENDER_INPUT_PORT,
        mute,
    };
    if let Err(e) = components.set_config(ComponentRole::AudioRender, &config) {
        tracing::error!(error = %e, "failed to set mute state");
    }
}
