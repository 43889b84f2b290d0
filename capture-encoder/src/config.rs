/*!
    Session and encoder configuration.
*/

use std::path::{Path, PathBuf};

use ffmpeg_types::{ChannelLayout, Rational};

use crate::error::{Error, Result};
use crate::geometry::ClipRect;
use crate::preset::PresetTier;

/**
    Time base of caller-supplied timestamps: 100 ns ticks.
*/
pub const CAPTURE_TIME_BASE: Rational = Rational::new(1, 10_000_000);

/**
    Volume scale that leaves samples untouched.
*/
pub const UNITY_VOLUME: i32 = 256;

/**
    Input audio parameters. Samples always arrive as interleaved S16.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioConfig {
    pub channels: u16,
    pub sample_rate: u32,
    /// Target bit rate (None = the encoder config's audio bit rate).
    pub bitrate: Option<u64>,
}

impl AudioConfig {
    /// Bytes per input sample (S16).
    pub const BYTES_PER_SAMPLE: usize = 2;

    pub fn new(channels: u16, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
            bitrate: None,
        }
    }

    pub fn with_bitrate(mut self, bitrate: u64) -> Self {
        self.bitrate = Some(bitrate);
        self
    }

    pub fn channel_layout(&self) -> ChannelLayout {
        ChannelLayout::from_count(self.channels)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=2).contains(&self.channels) {
            return Err(Error::UnsupportedFormat(format!(
                "{} audio channels (mono or stereo only)",
                self.channels
            )));
        }
        if self.sample_rate == 0 || self.sample_rate > i32::MAX as u32 {
            return Err(Error::UnsupportedFormat(format!(
                "audio sample rate {}",
                self.sample_rate
            )));
        }
        Ok(())
    }
}

/**
    Output video parameters, fixed for the session.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetVideoSpec {
    pub width: u32,
    pub height: u32,
    pub frame_rate: Rational,
    /// Letterbox cropped frames to the target aspect ratio.
    pub keep_aspect: bool,
}

impl TargetVideoSpec {
    pub fn new(width: u32, height: u32, frame_rate: Rational) -> Self {
        Self {
            width,
            height,
            frame_rate,
            keep_aspect: false,
        }
    }

    pub fn with_keep_aspect(mut self, keep_aspect: bool) -> Self {
        self.keep_aspect = keep_aspect;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidGeometry(format!(
                "target {}x{} is empty",
                self.width, self.height
            )));
        }
        if self.frame_rate.num <= 0 || self.frame_rate.den <= 0 {
            return Err(Error::UnsupportedFormat(format!(
                "frame rate {}/{}",
                self.frame_rate.num, self.frame_rate.den
            )));
        }
        Ok(())
    }
}

/**
    Everything needed to open one capture session.
*/
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub output: PathBuf,
    pub audio: AudioConfig,
    pub video: TargetVideoSpec,
    pub clip: ClipRect,
    /// Title written into the container metadata.
    pub title: Option<String>,
}

impl SessionConfig {
    pub fn new(output: impl AsRef<Path>, audio: AudioConfig, video: TargetVideoSpec) -> Self {
        Self {
            output: output.as_ref().to_path_buf(),
            audio,
            video,
            clip: ClipRect::default(),
            title: None,
        }
    }

    pub fn with_clip(mut self, clip: ClipRect) -> Self {
        self.clip = clip;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.audio.validate()?;
        self.video.validate()?;
        if self.clip.is_active() && (self.clip.width() <= 0 || self.clip.height() <= 0) {
            return Err(Error::InvalidGeometry(format!(
                "clip rect {:?} has no area",
                self.clip
            )));
        }
        Ok(())
    }
}

/**
    Codec tuning shared by every session of a registry.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncoderConfig {
    pub preset: PresetTier,
    /// Video bit rate in bits per second.
    pub video_bitrate: u64,
    pub video_max_bitrate: u64,
    pub profile: String,
    /// Keyframe interval in seconds.
    pub keyframe_interval_secs: u32,
    pub quantizer_range: (u32, u32),
    /// Frames of rate-control lookahead.
    pub lookahead: u32,
    pub audio_bitrate: u64,
    /// Initial volume, 256 = unity.
    pub volume: i32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            preset: PresetTier::default(),
            video_bitrate: 1_000_000,
            video_max_bitrate: 2_000_000,
            profile: "main".to_string(),
            keyframe_interval_secs: 15,
            quantizer_range: (18, 25),
            lookahead: 100,
            audio_bitrate: 64_000,
            volume: UNITY_VOLUME,
        }
    }
}

impl EncoderConfig {
    pub fn with_preset(mut self, preset: PresetTier) -> Self {
        self.preset = preset;
        self
    }

    pub fn with_video_bitrate(mut self, bitrate: u64, max_bitrate: u64) -> Self {
        self.video_bitrate = bitrate;
        self.video_max_bitrate = max_bitrate.max(bitrate);
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    pub fn with_keyframe_interval_secs(mut self, secs: u32) -> Self {
        self.keyframe_interval_secs = secs.max(1);
        self
    }

    pub fn with_quantizer_range(mut self, qmin: u32, qmax: u32) -> Self {
        self.quantizer_range = (qmin.min(qmax), qmax.max(qmin));
        self
    }

    pub fn with_audio_bitrate(mut self, bitrate: u64) -> Self {
        self.audio_bitrate = bitrate;
        self
    }

    pub fn with_volume(mut self, volume: i32) -> Self {
        self.volume = volume;
        self
    }
}
