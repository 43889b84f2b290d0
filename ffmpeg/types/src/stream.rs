/*!
    Stream descriptions handed from the encoders to the muxer.
*/

use crate::{ChannelLayout, CodecId, PixelFormat, Rational, SampleFormat};

/**
    Parameters of an encoded video stream.
*/
#[derive(Clone, Debug)]
pub struct VideoStreamInfo {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub frame_rate: Rational,
    /// Time base of the encoder's packets.
    pub time_base: Rational,
    pub codec_id: CodecId,
    /// Codec extradata (SPS/PPS for H.264 with global headers).
    pub extradata: Option<Vec<u8>>,
    pub bitrate: Option<u64>,
    pub profile: Option<i32>,
}

impl VideoStreamInfo {
    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

/**
    Parameters of an encoded audio stream.
*/
#[derive(Clone, Debug)]
pub struct AudioStreamInfo {
    pub sample_rate: u32,
    pub channels: ChannelLayout,
    pub sample_format: SampleFormat,
    /// Samples per channel in every encoded frame (0 if variable).
    pub frame_size: u32,
    pub time_base: Rational,
    pub codec_id: CodecId,
    /// Codec extradata (AudioSpecificConfig for AAC).
    pub extradata: Option<Vec<u8>>,
    pub bitrate: Option<u64>,
    pub profile: Option<i32>,
}

impl AudioStreamInfo {
    pub fn channel_count(&self) -> u16 {
        self.channels.channels()
    }
}
