/*!
    Encoder configuration types.
*/

use ffmpeg_types::{ChannelLayout, CodecId, PixelFormat, Rational, SampleFormat};

/**
    Encoder speed preset.

    Slower presets produce better compression (smaller files at same quality)
    but take longer to encode.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EncoderPreset {
    /// Fastest encoding, largest files.
    Ultrafast,
    Superfast,
    Veryfast,
    Faster,
    /// Default for capture sessions that were not benchmarked.
    #[default]
    Fast,
    Medium,
    Slow,
    Slower,
    Veryslow,
    /// Exhaustive search, only worth it on very fast machines.
    Placebo,
}

impl EncoderPreset {
    /**
        Get the x264 preset string.
    */
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ultrafast => "ultrafast",
            Self::Superfast => "superfast",
            Self::Veryfast => "veryfast",
            Self::Faster => "faster",
            Self::Fast => "fast",
            Self::Medium => "medium",
            Self::Slow => "slow",
            Self::Slower => "slower",
            Self::Veryslow => "veryslow",
            Self::Placebo => "placebo",
        }
    }
}

/**
    Rate control mode for video encoding.
*/
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RateControl {
    /**
        Constant Rate Factor - target constant quality.
        Lower values = higher quality. Range 0-51, typical 18-28.
    */
    Crf(u8),
    /**
        Variable bitrate around a target, capped at a maximum, in bits per second.
    */
    Capped { bitrate: u64, max_bitrate: u64 },
}

impl Default for RateControl {
    fn default() -> Self {
        Self::Capped {
            bitrate: 1_000_000,
            max_bitrate: 2_000_000,
        }
    }
}

/**
    Configuration for video encoding.
*/
#[derive(Clone, Debug)]
pub struct VideoEncoderConfig {
    pub codec: CodecId,
    pub width: u32,
    pub height: u32,
    pub frame_rate: Rational,
    /// Packet time base (None = inverse of the frame rate).
    pub time_base: Option<Rational>,
    pub pixel_format: PixelFormat,
    pub rate_control: RateControl,
    pub preset: EncoderPreset,
    /// Codec profile name, e.g. "main" or "high".
    pub profile: Option<String>,
    /// Keyframe interval in frames (None = two seconds).
    pub keyframe_interval: Option<u32>,
    /// Minimum keyframe interval in frames.
    pub min_keyframe_interval: Option<u32>,
    /// Quantizer bounds (qmin, qmax).
    pub quantizer_range: Option<(u32, u32)>,
    /// Frames of rate-control lookahead.
    pub lookahead: Option<u32>,
    /// Emit codec headers as extradata instead of in-band.
    pub global_header: bool,
}

impl VideoEncoderConfig {
    pub fn new(codec: CodecId, width: u32, height: u32, frame_rate: Rational) -> Self {
        Self {
            codec,
            width,
            height,
            frame_rate,
            time_base: None,
            pixel_format: PixelFormat::Yuv420p,
            rate_control: RateControl::default(),
            preset: EncoderPreset::default(),
            profile: None,
            keyframe_interval: None,
            min_keyframe_interval: None,
            quantizer_range: None,
            lookahead: None,
            global_header: false,
        }
    }

    /**
        Create configuration for H.264 encoding.
    */
    pub fn h264(width: u32, height: u32, frame_rate: Rational) -> Self {
        Self::new(CodecId::H264, width, height, frame_rate)
    }

    pub fn with_time_base(mut self, time_base: Rational) -> Self {
        self.time_base = Some(time_base);
        self
    }

    pub fn with_rate_control(mut self, rate_control: RateControl) -> Self {
        self.rate_control = rate_control;
        self
    }

    /**
        Set CRF quality (0-51, lower is better, typical 18-28).
    */
    pub fn with_crf(mut self, crf: u8) -> Self {
        self.rate_control = RateControl::Crf(crf.min(51));
        self
    }

    pub fn with_preset(mut self, preset: EncoderPreset) -> Self {
        self.preset = preset;
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn with_keyframe_interval(mut self, frames: u32) -> Self {
        self.keyframe_interval = Some(frames);
        self
    }

    pub fn with_min_keyframe_interval(mut self, frames: u32) -> Self {
        self.min_keyframe_interval = Some(frames);
        self
    }

    pub fn with_quantizer_range(mut self, qmin: u32, qmax: u32) -> Self {
        self.quantizer_range = Some((qmin.min(qmax), qmax.max(qmin)));
        self
    }

    pub fn with_lookahead(mut self, frames: u32) -> Self {
        self.lookahead = Some(frames);
        self
    }

    pub fn with_global_header(mut self, global_header: bool) -> Self {
        self.global_header = global_header;
        self
    }
}

/**
    Configuration for audio encoding.
*/
#[derive(Clone, Debug)]
pub struct AudioEncoderConfig {
    pub codec: CodecId,
    pub sample_rate: u32,
    pub channels: ChannelLayout,
    /// Sample format the encoder consumes.
    pub sample_format: SampleFormat,
    /// Target bitrate in bits per second (None = codec default).
    pub bitrate: Option<u64>,
    pub global_header: bool,
}

impl AudioEncoderConfig {
    pub fn new(codec: CodecId, sample_rate: u32, channels: ChannelLayout) -> Self {
        Self {
            codec,
            sample_rate,
            channels,
            sample_format: SampleFormat::F32p,
            bitrate: None,
            global_header: false,
        }
    }

    /**
        Create configuration for AAC encoding (planar float input).
    */
    pub fn aac(sample_rate: u32, channels: ChannelLayout) -> Self {
        Self::new(CodecId::Aac, sample_rate, channels)
    }

    pub fn with_bitrate(mut self, bitrate: u64) -> Self {
        self.bitrate = Some(bitrate);
        self
    }

    pub fn with_sample_format(mut self, format: SampleFormat) -> Self {
        self.sample_format = format;
        self
    }

    pub fn with_global_header(mut self, global_header: bool) -> Self {
        self.global_header = global_header;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_ordered_by_effort() {
        assert!(EncoderPreset::Ultrafast < EncoderPreset::Veryfast);
        assert!(EncoderPreset::Medium < EncoderPreset::Slow);
        assert!(EncoderPreset::Veryslow < EncoderPreset::Placebo);
        assert_eq!(EncoderPreset::default().as_str(), "fast");
    }

    #[test]
    fn quantizer_range_is_normalized() {
        let config = VideoEncoderConfig::h264(1280, 720, Rational::new(30, 1))
            .with_quantizer_range(25, 18);
        assert_eq!(config.quantizer_range, Some((18, 25)));
    }

    #[test]
    fn crf_is_clamped() {
        let config = VideoEncoderConfig::h264(640, 480, Rational::new(25, 1)).with_crf(90);
        assert_eq!(config.rate_control, RateControl::Crf(51));
    }
}
