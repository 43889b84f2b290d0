/*!
    Backend built on the workspace's ffmpeg crates.
*/

use ffmpeg_encode::{
    AudioEncoder, AudioEncoderConfig, EncoderPreset, RateControl, VideoEncoder, VideoEncoderConfig,
};
use ffmpeg_sink::{Sink, SinkConfig};
use ffmpeg_transform::{ScalingAlgorithm, VideoTransform, VideoTransformConfig};
use ffmpeg_types::{AudioFrame, Packet, Rational, SampleFormat, VideoFrame};
use tracing::{debug, warn};

use super::{AudioCodec, BackendFactory, CodecBackend, PacketWriter, VideoCodec};
use crate::config::{EncoderConfig, SessionConfig};
use crate::error::{Error, Result};
use crate::preset::PresetTier;

/// Time base of H.264 packets.
const VIDEO_TIME_BASE: Rational = Rational::new(1, 10_000);

const SERVICE_PROVIDER: &str = "capture-encoder";

/**
    Opens libx264 and AAC encoders and a container sink for each session.
*/
#[derive(Clone, Copy, Debug, Default)]
pub struct FfmpegBackendFactory;

impl BackendFactory for FfmpegBackendFactory {
    fn create(&self, session: &SessionConfig, encoder: &EncoderConfig) -> Result<CodecBackend> {
        let mut sink_config = SinkConfig::default()
            .with_metadata(
                "service_name",
                format!("capture-encoder-{}", env!("CARGO_PKG_VERSION")),
            )
            .with_metadata("service_provider", SERVICE_PROVIDER);
        if let Some(title) = &session.title {
            sink_config = sink_config.with_metadata("title", title.clone());
        }

        let mut sink = Sink::open(&session.output, sink_config).map_err(construction_error)?;
        let global_header = sink.needs_global_header();

        let video = &session.video;
        let fps = video.frame_rate.to_f64().round().max(1.0) as u32;
        let video_config = VideoEncoderConfig::h264(video.width, video.height, video.frame_rate)
            .with_time_base(VIDEO_TIME_BASE)
            .with_preset(encoder_preset(encoder.preset))
            .with_profile(encoder.profile.clone())
            .with_rate_control(RateControl::Capped {
                bitrate: encoder.video_bitrate,
                max_bitrate: encoder.video_max_bitrate,
            })
            .with_keyframe_interval(fps * encoder.keyframe_interval_secs)
            .with_min_keyframe_interval((fps / 2).max(1))
            .with_quantizer_range(encoder.quantizer_range.0, encoder.quantizer_range.1)
            .with_lookahead(encoder.lookahead)
            .with_global_header(global_header);

        let video_encoder = VideoEncoder::new(video_config).map_err(construction_error)?;
        let transform = VideoTransform::new(
            VideoTransformConfig::yuv420p(video.width, video.height)
                .with_algorithm(ScalingAlgorithm::Bicubic),
        )
        .map_err(construction_error)?;

        let audio = &session.audio;
        let audio_config = AudioEncoderConfig::aac(audio.sample_rate, audio.channel_layout())
            .with_bitrate(audio.bitrate.unwrap_or(encoder.audio_bitrate))
            .with_global_header(global_header);
        let audio_encoder = AudioEncoder::new(audio_config).map_err(construction_error)?;

        sink.add_video(&video_encoder.stream_info())
            .map_err(construction_error)?;
        sink.add_audio(&audio_encoder.stream_info())
            .map_err(construction_error)?;
        sink.write_header().map_err(construction_error)?;

        debug!(
            output = %session.output.display(),
            format = ?sink.format(),
            global_header,
            audio_frame_size = audio_encoder.frame_size(),
            "ffmpeg backend opened"
        );

        Ok(CodecBackend {
            video: Box::new(FfmpegVideo {
                transform,
                encoder: video_encoder,
            }),
            audio: Box::new(FfmpegAudio {
                encoder: audio_encoder,
            }),
            writer: Box::new(FfmpegWriter { sink: Some(sink) }),
        })
    }
}

fn encoder_preset(tier: PresetTier) -> EncoderPreset {
    match tier {
        PresetTier::Ultrafast => EncoderPreset::Ultrafast,
        PresetTier::Superfast => EncoderPreset::Superfast,
        PresetTier::Veryfast => EncoderPreset::Veryfast,
        PresetTier::Faster => EncoderPreset::Faster,
        PresetTier::Fast => EncoderPreset::Fast,
        PresetTier::Medium => EncoderPreset::Medium,
        PresetTier::Slow => EncoderPreset::Slow,
        PresetTier::Slower => EncoderPreset::Slower,
        PresetTier::Veryslow => EncoderPreset::Veryslow,
        PresetTier::Placebo => EncoderPreset::Placebo,
    }
}

fn construction_error(err: ffmpeg_types::Error) -> Error {
    match err {
        ffmpeg_types::Error::UnsupportedFormat(msg) => Error::UnsupportedFormat(msg),
        other => Error::AllocationFailure(other.to_string()),
    }
}

// ── Codecs ───────────────────────────────────────────────────────────────

struct FfmpegVideo {
    transform: VideoTransform,
    encoder: VideoEncoder,
}

// SAFETY: the scaler and codec contexts are owned exclusively by this value
// and only touched through `&mut self`, which the session serializes.
unsafe impl Send for FfmpegVideo {}

impl VideoCodec for FfmpegVideo {
    fn encode(&mut self, frame: &VideoFrame) -> Result<Vec<Packet>> {
        let converted = self.transform.transform(frame)?;
        Ok(self.encoder.encode(converted)?)
    }

    fn flush(&mut self) -> Result<Vec<Packet>> {
        Ok(self.encoder.flush()?)
    }
}

struct FfmpegAudio {
    encoder: AudioEncoder,
}

// SAFETY: the codec context is owned exclusively by this value and only
// touched through `&mut self`.
unsafe impl Send for FfmpegAudio {}

impl AudioCodec for FfmpegAudio {
    fn frame_size(&self) -> usize {
        self.encoder.frame_size()
    }

    fn sample_format(&self) -> SampleFormat {
        self.encoder.sample_format()
    }

    fn time_base(&self) -> Rational {
        self.encoder.time_base()
    }

    fn encode(&mut self, frame: &AudioFrame) -> Result<Vec<Packet>> {
        Ok(self.encoder.encode(frame)?)
    }

    fn flush(&mut self) -> Result<Vec<Packet>> {
        Ok(self.encoder.flush()?)
    }
}

// ── Writer ───────────────────────────────────────────────────────────────

struct FfmpegWriter {
    sink: Option<Sink>,
}

// SAFETY: the format context is owned exclusively by this value and only
// touched through `&mut self`.
unsafe impl Send for FfmpegWriter {}

impl PacketWriter for FfmpegWriter {
    fn write(&mut self, packet: &Packet) -> Result<()> {
        let Some(sink) = self.sink.as_mut() else {
            return Err(Error::BackendWriteFailure("output already closed".to_string()));
        };
        sink.write(packet)
            .map_err(|e| Error::BackendWriteFailure(e.to_string()))
    }

    fn finish(&mut self) -> Result<()> {
        match self.sink.take() {
            Some(sink) => sink
                .finish()
                .map_err(|e| Error::BackendWriteFailure(e.to_string())),
            None => {
                warn!("output finished twice");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tier_maps_to_the_same_x264_name() {
        for tier in PresetTier::ALL {
            assert_eq!(encoder_preset(tier).as_str(), tier.as_str());
        }
    }

    #[test]
    fn unsupported_formats_stay_unsupported() {
        let err = construction_error(ffmpeg_types::Error::unsupported_format("codec h265"));
        assert!(matches!(err, Error::UnsupportedFormat(msg) if msg == "codec h265"));

        let err = construction_error(ffmpeg_types::Error::codec("no libx264"));
        assert!(matches!(err, Error::AllocationFailure(_)));
    }
}
