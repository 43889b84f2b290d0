/*!
    Audio encoder implementation.
*/

use ffmpeg_next::{
    ChannelLayout as FFmpegChannelLayout,
    codec::{self, Id as CodecIdFFmpeg, encoder::audio::Encoder as AudioEncoderFFmpeg},
    util::frame::audio::Audio as AudioFrameFFmpeg,
};

use ffmpeg_types::{
    AudioFrame, AudioStreamInfo, ChannelLayout, CodecId, Error, MediaDuration, Packet, Pts,
    Rational, Result, SampleFormat, StreamType,
};

use crate::config::AudioEncoderConfig;

/// Samples per frame when the codec accepts any size.
const VARIABLE_FRAME_SIZE: usize = 1024;

/**
    Audio encoder.

    Encodes raw audio frames into compressed packets. AAC requires every
    frame to carry exactly [`frame_size`](Self::frame_size) samples per
    channel; the capture pipeline's pacer guarantees that.
*/
pub struct AudioEncoder {
    encoder: AudioEncoderFFmpeg,
    codec: CodecId,
    channels: ChannelLayout,
    sample_format: SampleFormat,
    time_base: Rational,
    bitrate: Option<u64>,
    sample_count: i64,
}

impl AudioEncoder {
    /**
        Create a new audio encoder with the given configuration.
    */
    pub fn new(config: AudioEncoderConfig) -> Result<Self> {
        ffmpeg_next::init().map_err(|e| Error::codec(e.to_string()))?;

        if config.sample_rate == 0 {
            return Err(Error::invalid_data("audio sample rate is zero"));
        }

        let codec_id = codec_id_to_ffmpeg(config.codec)?;
        let codec = ffmpeg_next::encoder::find(codec_id).ok_or_else(|| {
            Error::unsupported_format(format!("codec {:?} not found", config.codec))
        })?;

        let encoder_ctx = codec::context::Context::new_with_codec(codec);
        let mut encoder = encoder_ctx
            .encoder()
            .audio()
            .map_err(|e| Error::codec(e.to_string()))?;

        encoder.set_format(sample_format_to_ffmpeg(config.sample_format));
        encoder.set_rate(config.sample_rate as i32);
        encoder.set_channel_layout(channel_layout_to_ffmpeg(config.channels));

        // 1/sample_rate is standard for audio
        let time_base = Rational::new(1, config.sample_rate as i32);
        encoder.set_time_base(ffmpeg_next::Rational::new(time_base.num, time_base.den));

        if let Some(bitrate) = config.bitrate {
            encoder.set_bit_rate(bitrate as usize);
        }

        if config.global_header {
            encoder.set_flags(codec::flag::Flags::GLOBAL_HEADER);
        }

        let encoder = encoder
            .open()
            .map_err(|e| Error::codec(format!("failed to open encoder: {}", e)))?;

        Ok(Self {
            encoder,
            codec: config.codec,
            channels: config.channels,
            sample_format: config.sample_format,
            time_base,
            bitrate: config.bitrate,
            sample_count: 0,
        })
    }

    /**
        Get the time base for encoded packets.
    */
    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn sample_format(&self) -> SampleFormat {
        self.sample_format
    }

    /**
        Samples per channel the encoder expects in every frame.

        Codecs that accept variable frame sizes report 1024.
    */
    pub fn frame_size(&self) -> usize {
        match self.encoder.frame_size() as usize {
            0 => VARIABLE_FRAME_SIZE,
            size => size,
        }
    }

    /**
        Get stream info for the muxer.
    */
    pub fn stream_info(&self) -> AudioStreamInfo {
        AudioStreamInfo {
            sample_rate: self.encoder.rate(),
            channels: self.channels,
            sample_format: self.sample_format,
            frame_size: self.frame_size() as u32,
            time_base: self.time_base,
            codec_id: self.codec,
            extradata: crate::extradata(&self.encoder),
            bitrate: self.bitrate,
            profile: None,
        }
    }

    /**
        Encode an audio frame, returning encoded packets.

        The frame's timestamp is rescaled into the encoder's time base.
        Frames without one continue from the running sample count.
    */
    pub fn encode(&mut self, frame: &AudioFrame) -> Result<Vec<Packet>> {
        if frame.format != self.sample_format {
            return Err(Error::unsupported_format(format!(
                "frame format {:?} doesn't match encoder {:?}",
                frame.format, self.sample_format
            )));
        }
        if frame.data.len() < frame.plane_size() * frame.plane_count() {
            return Err(Error::invalid_data(format!(
                "audio frame holds {} bytes, needs {}",
                frame.data.len(),
                frame.plane_size() * frame.plane_count()
            )));
        }

        let mut ffmpeg_frame = AudioFrameFFmpeg::new(
            sample_format_to_ffmpeg(frame.format),
            frame.samples,
            channel_layout_to_ffmpeg(frame.channels),
        );
        ffmpeg_frame.set_rate(frame.sample_rate);

        copy_data_to_ffmpeg_frame(&mut ffmpeg_frame, frame)?;

        let pts = match frame.pts {
            Some(Pts(ts)) => frame.time_base.rescale(ts, self.time_base),
            None => self.sample_count,
        };
        ffmpeg_frame.set_pts(Some(pts));
        self.sample_count = pts + frame.samples as i64;

        self.encoder
            .send_frame(&ffmpeg_frame)
            .map_err(|e| Error::codec(e.to_string()))?;

        self.receive_packets()
    }

    /**
        Flush the encoder to get any remaining buffered packets.

        Call this at end of stream.
    */
    pub fn flush(&mut self) -> Result<Vec<Packet>> {
        self.encoder
            .send_eof()
            .map_err(|e| Error::codec(e.to_string()))?;

        self.receive_packets()
    }

    fn receive_packets(&mut self) -> Result<Vec<Packet>> {
        let time_base = self.time_base;
        crate::drain_packets(&mut self.encoder, |pkt| Packet {
            data: pkt.data().map(|d| d.to_vec()).unwrap_or_default(),
            pts: pkt.pts().map(Pts),
            dts: pkt.dts().map(Pts),
            duration: MediaDuration(pkt.duration()),
            time_base,
            is_keyframe: pkt.is_key(),
            stream_type: StreamType::Audio,
        })
    }
}

fn codec_id_to_ffmpeg(codec: CodecId) -> Result<CodecIdFFmpeg> {
    match codec {
        CodecId::Aac => Ok(CodecIdFFmpeg::AAC),
        CodecId::Mp3 => Ok(CodecIdFFmpeg::MP3),
        _ => Err(Error::unsupported_format(format!(
            "audio codec {:?} not supported for encoding",
            codec
        ))),
    }
}

fn sample_format_to_ffmpeg(format: SampleFormat) -> ffmpeg_next::format::Sample {
    use ffmpeg_next::format::Sample;
    use ffmpeg_next::format::sample::Type;

    match format {
        SampleFormat::U8 => Sample::U8(Type::Packed),
        SampleFormat::S16 => Sample::I16(Type::Packed),
        SampleFormat::S16p => Sample::I16(Type::Planar),
        SampleFormat::F32 => Sample::F32(Type::Packed),
        SampleFormat::F32p => Sample::F32(Type::Planar),
        _ => Sample::F32(Type::Planar),
    }
}

fn channel_layout_to_ffmpeg(layout: ChannelLayout) -> FFmpegChannelLayout {
    match layout {
        ChannelLayout::Mono => FFmpegChannelLayout::MONO,
        _ => FFmpegChannelLayout::STEREO,
    }
}

/**
    Copy an audio frame into an FFmpeg frame, one plane per channel when planar.
*/
fn copy_data_to_ffmpeg_frame(dst: &mut AudioFrameFFmpeg, src: &AudioFrame) -> Result<()> {
    let plane_size = src.plane_size();
    if plane_size == 0 {
        return Ok(());
    }

    for (plane, chunk) in src
        .data
        .chunks_exact(plane_size)
        .take(src.plane_count())
        .enumerate()
    {
        let dst_data = dst.data_mut(plane);
        if dst_data.len() < plane_size {
            return Err(Error::invalid_data(format!(
                "destination plane {} too small: {} < {}",
                plane,
                dst_data.len(),
                plane_size
            )));
        }
        dst_data[..plane_size].copy_from_slice(chunk);
    }

    Ok(())
}

impl std::fmt::Debug for AudioEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioEncoder")
            .field("sample_rate", &self.encoder.rate())
            .field("format", &self.sample_format)
            .field("time_base", &self.time_base)
            .finish_non_exhaustive()
    }
}
