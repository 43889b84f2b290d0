use bytes::{Buf, BytesMut};
use ffmpeg_types::{AudioFrame, ChannelLayout, Pts, Rational, SampleFormat};
use tracing::debug;

use super::{apply_volume, convert_s16};
use crate::config::{AudioConfig, CAPTURE_TIME_BASE, UNITY_VOLUME};
use crate::error::{Error, Result};

/**
    Accumulates interleaved S16 PCM and cuts it into codec-sized frames.

    Every emitted frame holds exactly `frame_samples` samples per channel,
    with volume applied and converted to the codec's sample format.

    Timestamps come from one of two clocks:

    - an explicit capture timestamp (100 ns ticks) passed with the push,
      advanced by one frame duration for each further frame the same push
      produces;
    - otherwise a running sample counter, rescaled from `1/sample_rate` into
      the codec time base.
*/
pub struct AudioFramePacer {
    buffer: BytesMut,
    channels: ChannelLayout,
    sample_rate: u32,
    frame_samples: usize,
    output_format: SampleFormat,
    codec_time_base: Rational,
    volume: i32,
    sample_counter: i64,
}

impl AudioFramePacer {
    pub fn new(
        config: &AudioConfig,
        frame_samples: usize,
        output_format: SampleFormat,
        codec_time_base: Rational,
    ) -> Self {
        Self {
            buffer: BytesMut::new(),
            channels: config.channel_layout(),
            sample_rate: config.sample_rate,
            frame_samples,
            output_format,
            codec_time_base,
            volume: UNITY_VOLUME,
            sample_counter: 0,
        }
    }

    /**
        Input bytes consumed by one codec frame.
    */
    pub fn frame_bytes(&self) -> usize {
        self.frame_samples * self.channels.channels() as usize * AudioConfig::BYTES_PER_SAMPLE
    }

    /**
        Bytes waiting for a full frame.
    */
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn volume(&self) -> i32 {
        self.volume
    }

    /**
        Set the volume for frames extracted from now on (256 = unity).
    */
    pub fn set_volume(&mut self, volume: i32) {
        self.volume = volume;
    }

    /**
        Samples per channel emitted so far in derived-timestamp mode.
    */
    pub fn sample_counter(&self) -> i64 {
        self.sample_counter
    }

    /**
        Append a chunk and return every complete frame now available.

        `timestamp` is the capture time of the chunk in 100 ns ticks, or
        `None` to derive timestamps from the sample counter.
    */
    pub fn push(&mut self, data: &[u8], timestamp: Option<i64>) -> Result<Vec<AudioFrame>> {
        let frame_bytes = self.frame_bytes();
        if frame_bytes == 0 {
            return Err(Error::NotReady);
        }

        self.buffer.extend_from_slice(data);

        let mut frames = Vec::with_capacity(self.buffer.len() / frame_bytes);
        let mut explicit = timestamp;

        while self.buffer.len() >= frame_bytes {
            let mut chunk = self.buffer.split_to(frame_bytes);
            apply_volume(&mut chunk, self.volume);

            let data = convert_s16(&chunk, self.channels.channels() as usize, self.output_format)?;

            let (pts, time_base) = match explicit {
                Some(ts) => {
                    explicit = Some(ts + self.frame_duration_ticks());
                    (ts, CAPTURE_TIME_BASE)
                }
                None => {
                    let pts = Rational::new(1, self.sample_rate as i32)
                        .rescale(self.sample_counter, self.codec_time_base);
                    self.sample_counter += self.frame_samples as i64;
                    (pts, self.codec_time_base)
                }
            };

            frames.push(AudioFrame::new(
                data,
                self.frame_samples,
                self.sample_rate,
                self.channels,
                self.output_format,
                Some(Pts(pts)),
                time_base,
            ));
        }

        Ok(frames)
    }

    /**
        Emit whatever full frames remain and drop the sub-frame tail.
    */
    pub fn flush(&mut self) -> Result<Vec<AudioFrame>> {
        let frame_bytes = self.frame_bytes();
        let mut frames = Vec::new();

        while frame_bytes > 0 && self.buffer.len() > frame_bytes {
            frames.extend(self.push(&[], None)?);
        }

        if !self.buffer.is_empty() {
            debug!(bytes = self.buffer.len(), "discarding partial audio frame");
            self.buffer.advance(self.buffer.len());
        }

        Ok(frames)
    }

    fn frame_duration_ticks(&self) -> i64 {
        self.frame_samples as i64 * CAPTURE_TIME_BASE.den as i64 / self.sample_rate as i64
    }
}

impl std::fmt::Debug for AudioFramePacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioFramePacer")
            .field("frame_samples", &self.frame_samples)
            .field("format", &self.output_format)
            .field("buffered", &self.buffer.len())
            .field("volume", &self.volume)
            .finish()
    }
}
