/*!
    Video encoder implementation.
*/

use ffmpeg_next::{
    Dictionary, Rational as FFmpegRational,
    codec::{self, Id as CodecIdFFmpeg, encoder::video::Encoder as VideoEncoderFFmpeg},
    util::frame::video::Video as VideoFrameFFmpeg,
};

use ffmpeg_types::{
    CodecId, Error, MediaDuration, Packet, PixelFormat, Pts, Rational, Result, StreamType,
    VideoFrame, VideoStreamInfo,
};

use crate::config::{RateControl, VideoEncoderConfig};

/**
    Video encoder.

    Encodes planar YUV frames into compressed packets. The source picture is
    allocated once and refilled for every frame.
*/
pub struct VideoEncoder {
    encoder: VideoEncoderFFmpeg,
    picture: VideoFrameFFmpeg,
    codec: CodecId,
    frame_rate: Rational,
    time_base: Rational,
    bitrate: Option<u64>,
    frame_count: i64,
}

impl VideoEncoder {
    /**
        Create a new video encoder with the given configuration.
    */
    pub fn new(config: VideoEncoderConfig) -> Result<Self> {
        ffmpeg_next::init().map_err(|e| Error::codec(e.to_string()))?;

        if config.width == 0 || config.height == 0 {
            return Err(Error::invalid_data(format!(
                "encoder dimensions {}x{} are empty",
                config.width, config.height
            )));
        }
        if config.frame_rate.num <= 0 || config.frame_rate.den <= 0 {
            return Err(Error::invalid_data(format!(
                "frame rate {}/{} is not positive",
                config.frame_rate.num, config.frame_rate.den
            )));
        }

        let codec_id = codec_id_to_ffmpeg(config.codec)?;
        let codec = ffmpeg_next::encoder::find(codec_id).ok_or_else(|| {
            Error::unsupported_format(format!("codec {:?} not found", config.codec))
        })?;

        let encoder_ctx = codec::context::Context::new_with_codec(codec);
        let mut encoder = encoder_ctx
            .encoder()
            .video()
            .map_err(|e| Error::codec(e.to_string()))?;

        encoder.set_width(config.width);
        encoder.set_height(config.height);

        let pixel_format = pixel_format_to_ffmpeg(config.pixel_format)?;
        encoder.set_format(pixel_format);

        let frame_rate = FFmpegRational::new(config.frame_rate.num, config.frame_rate.den);
        encoder.set_frame_rate(Some(frame_rate));

        let time_base = config.time_base.unwrap_or(config.frame_rate.invert());
        encoder.set_time_base(FFmpegRational::new(time_base.num, time_base.den));

        let fps = config.frame_rate.to_f64();
        let gop = config
            .keyframe_interval
            .unwrap_or((fps * 2.0).round() as u32)
            .max(1);
        encoder.set_gop(gop);

        if let Some((qmin, qmax)) = config.quantizer_range {
            encoder.set_qmin(qmin as i32);
            encoder.set_qmax(qmax as i32);
        }

        if config.global_header {
            encoder.set_flags(codec::flag::Flags::GLOBAL_HEADER);
        }

        let mut opts = Dictionary::new();
        opts.set("preset", config.preset.as_str());
        opts.set("threads", "auto");

        if let Some(profile) = &config.profile {
            opts.set("profile", profile);
        }
        if let Some(min) = config.min_keyframe_interval {
            opts.set("keyint_min", &min.to_string());
        }
        if let Some(frames) = config.lookahead {
            opts.set("rc-lookahead", &frames.to_string());
        }

        let bitrate = match config.rate_control {
            RateControl::Crf(crf) => {
                opts.set("crf", &crf.to_string());
                None
            }
            RateControl::Capped {
                bitrate,
                max_bitrate,
            } => {
                encoder.set_bit_rate(bitrate as usize);
                encoder.set_max_bit_rate(max_bitrate.max(bitrate) as usize);
                Some(bitrate)
            }
        };

        let encoder = encoder
            .open_with(opts)
            .map_err(|e| Error::codec(format!("failed to open encoder: {}", e)))?;

        let picture = VideoFrameFFmpeg::new(pixel_format, config.width, config.height);

        Ok(Self {
            encoder,
            picture,
            codec: config.codec,
            frame_rate: config.frame_rate,
            time_base,
            bitrate,
            frame_count: 0,
        })
    }

    /**
        Get the time base for encoded packets.
    */
    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    /**
        Get stream info for the muxer.

        With global headers enabled the extradata holds the parameter sets.
    */
    pub fn stream_info(&self) -> VideoStreamInfo {
        VideoStreamInfo {
            width: self.encoder.width(),
            height: self.encoder.height(),
            pixel_format: PixelFormat::Yuv420p,
            frame_rate: self.frame_rate,
            time_base: self.time_base,
            codec_id: self.codec,
            extradata: crate::extradata(&self.encoder),
            bitrate: self.bitrate,
            profile: None,
        }
    }

    /**
        Encode a video frame, returning encoded packets.

        The frame's timestamp is rescaled from its own time base into the
        encoder's. Frames without a timestamp are numbered sequentially.
        May return zero, one, or multiple packets depending on encoder buffering.
    */
    pub fn encode(&mut self, frame: &VideoFrame) -> Result<Vec<Packet>> {
        if frame.width != self.encoder.width() || frame.height != self.encoder.height() {
            return Err(Error::invalid_data(format!(
                "frame dimensions {}x{} don't match encoder {}x{}",
                frame.width,
                frame.height,
                self.encoder.width(),
                self.encoder.height()
            )));
        }
        if frame.format != PixelFormat::Yuv420p {
            return Err(Error::unsupported_format(format!(
                "pixel format {:?} not supported for encoding input",
                frame.format
            )));
        }
        if frame.data.len() < frame.picture_size() {
            return Err(Error::invalid_data(format!(
                "frame holds {} bytes, needs {}",
                frame.data.len(),
                frame.picture_size()
            )));
        }

        copy_yuv420p_to_ffmpeg_frame(&mut self.picture, frame);

        let pts = match frame.pts {
            Some(Pts(ts)) => frame.time_base.rescale(ts, self.time_base),
            None => self
                .frame_rate
                .invert()
                .rescale(self.frame_count, self.time_base),
        };
        self.picture.set_pts(Some(pts));
        self.frame_count += 1;

        self.encoder
            .send_frame(&self.picture)
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

    pub fn frames_sent(&self) -> i64 {
        self.frame_count
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
            stream_type: StreamType::Video,
        })
    }
}

fn codec_id_to_ffmpeg(codec: CodecId) -> Result<CodecIdFFmpeg> {
    match codec {
        CodecId::H264 => Ok(CodecIdFFmpeg::H264),
        CodecId::H265 => Ok(CodecIdFFmpeg::HEVC),
        _ => Err(Error::unsupported_format(format!(
            "video codec {:?} not supported for encoding",
            codec
        ))),
    }
}

fn pixel_format_to_ffmpeg(format: PixelFormat) -> Result<ffmpeg_next::format::Pixel> {
    use ffmpeg_next::format::Pixel;

    match format {
        PixelFormat::Yuv420p => Ok(Pixel::YUV420P),
        PixelFormat::Nv12 => Ok(Pixel::NV12),
        _ => Err(Error::unsupported_format(format!(
            "pixel format {:?} not supported for encoding",
            format
        ))),
    }
}

/**
    Copy a tightly packed YUV 4:2:0 picture into an FFmpeg frame.
*/
fn copy_yuv420p_to_ffmpeg_frame(dst: &mut VideoFrameFFmpeg, src: &VideoFrame) {
    let width = src.width as usize;
    let height = src.height as usize;
    let uv_width = width.div_ceil(2);
    let uv_height = height.div_ceil(2);

    let planes = [
        (0, 0, width, height),
        (1, width * height, uv_width, uv_height),
        (2, width * height + uv_width * uv_height, uv_width, uv_height),
    ];

    for (plane, offset, plane_width, plane_height) in planes {
        let stride = dst.stride(plane);
        let data = dst.data_mut(plane);
        let rows = src.data[offset..offset + plane_width * plane_height].chunks_exact(plane_width);
        for (y, row) in rows.enumerate() {
            let start = y * stride;
            data[start..start + plane_width].copy_from_slice(row);
        }
    }
}

impl std::fmt::Debug for VideoEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoEncoder")
            .field("width", &self.encoder.width())
            .field("height", &self.encoder.height())
            .field("time_base", &self.time_base)
            .field("frames", &self.frame_count)
            .finish_non_exhaustive()
    }
}
