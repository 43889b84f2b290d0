/*!
    Media sink implementation.
*/

use std::path::{Path, PathBuf};

use ffmpeg_next::{
    Dictionary, Rational as FFmpegRational, codec::Parameters, ffi,
    format::context::Output as OutputContext,
};

use ffmpeg_types::{
    AudioStreamInfo, CodecId, Error, Packet, PixelFormat, Rational, Result, SampleFormat,
    StreamType, VideoStreamInfo,
};

use crate::config::{ContainerFormat, SinkConfig};

/**
    Media sink for writing to container files.

    Takes encoded packets and writes them into a container, routing each
    packet to its stream by type and rescaling its timestamps into the
    stream's time base.
*/
pub struct Sink {
    output: OutputContext,
    path: PathBuf,
    format: ContainerFormat,
    fast_start: bool,
    video: Option<StreamSlot>,
    audio: Option<StreamSlot>,
    header_written: bool,
}

#[derive(Clone, Copy, Debug)]
struct StreamSlot {
    index: usize,
    time_base: Rational,
}

impl Sink {
    /**
        Create the output file and pick its container.

        Streams are added with [`add_video`](Self::add_video) and
        [`add_audio`](Self::add_audio) before [`write_header`](Self::write_header).
    */
    pub fn open<P: AsRef<Path>>(path: P, config: SinkConfig) -> Result<Self> {
        ffmpeg_next::init().map_err(|e| Error::codec(e.to_string()))?;

        let path = path.as_ref();
        let requested = config.resolve_format(path);

        let (mut output, format) = match ffmpeg_next::format::output_as(path, requested.muxer_name())
        {
            Ok(output) => (output, requested),
            Err(_) if requested != ContainerFormat::MpegTs => {
                let output = ffmpeg_next::format::output_as(path, ContainerFormat::MpegTs.muxer_name())
                    .map_err(|e| {
                        Error::unsupported_format(format!(
                            "no usable container for {}: {}",
                            path.display(),
                            e
                        ))
                    })?;
                (output, ContainerFormat::MpegTs)
            }
            Err(e) => {
                return Err(Error::unsupported_format(format!(
                    "no usable container for {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        if !config.metadata.is_empty() {
            let mut metadata = Dictionary::new();
            for (key, value) in &config.metadata {
                metadata.set(key, value);
            }
            output.set_metadata(metadata);
        }

        Ok(Self {
            output,
            path: path.to_path_buf(),
            format,
            fast_start: config.fast_start,
            video: None,
            audio: None,
            header_written: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /**
        The container actually in use, after any fallback.
    */
    pub fn format(&self) -> ContainerFormat {
        self.format
    }

    /**
        Whether the container wants codec headers out of band.

        Encoders should be opened with global headers when this is true.
    */
    pub fn needs_global_header(&self) -> bool {
        self.output
            .format()
            .flags()
            .contains(ffmpeg_next::format::flag::Flags::GLOBAL_HEADER)
    }

    /**
        Add the video stream.
    */
    pub fn add_video(&mut self, info: &VideoStreamInfo) -> Result<()> {
        self.ensure_no_header()?;
        if self.video.is_some() {
            return Err(Error::invalid_data("video stream already added"));
        }

        let codec_id = codec_id_to_ffmpeg(info.codec_id)?;
        let codec = ffmpeg_next::encoder::find(codec_id).ok_or_else(|| {
            Error::unsupported_format(format!("video codec {:?} not found", info.codec_id))
        })?;

        let mut stream = self
            .output
            .add_stream(codec)
            .map_err(|e| Error::codec(format!("failed to add video stream: {}", e)))?;

        set_video_parameters(&stream.parameters(), info)?;
        stream.set_time_base(FFmpegRational::new(info.time_base.num, info.time_base.den));
        stream.set_avg_frame_rate(FFmpegRational::new(
            info.frame_rate.num,
            info.frame_rate.den,
        ));

        self.video = Some(StreamSlot {
            index: stream.index(),
            time_base: info.time_base,
        });
        Ok(())
    }

    /**
        Add the audio stream.
    */
    pub fn add_audio(&mut self, info: &AudioStreamInfo) -> Result<()> {
        self.ensure_no_header()?;
        if self.audio.is_some() {
            return Err(Error::invalid_data("audio stream already added"));
        }

        let codec_id = codec_id_to_ffmpeg(info.codec_id)?;
        let codec = ffmpeg_next::encoder::find(codec_id).ok_or_else(|| {
            Error::unsupported_format(format!("audio codec {:?} not found", info.codec_id))
        })?;

        let mut stream = self
            .output
            .add_stream(codec)
            .map_err(|e| Error::codec(format!("failed to add audio stream: {}", e)))?;

        set_audio_parameters(&stream.parameters(), info)?;
        stream.set_time_base(FFmpegRational::new(info.time_base.num, info.time_base.den));

        self.audio = Some(StreamSlot {
            index: stream.index(),
            time_base: info.time_base,
        });
        Ok(())
    }

    /**
        Write the container header.

        Muxers may replace the stream time bases here (MPEG-TS uses 1/90000),
        so the final ones are read back afterwards.
    */
    pub fn write_header(&mut self) -> Result<()> {
        self.ensure_no_header()?;

        let mut opts = Dictionary::new();
        if self.format == ContainerFormat::Mp4 && self.fast_start {
            opts.set("movflags", "+faststart");
        }

        self.output
            .write_header_with(opts)
            .map_err(|e| Error::codec(format!("failed to write header: {}", e)))?;

        for slot in [&mut self.video, &mut self.audio].into_iter().flatten() {
            if let Some(stream) = self.output.stream(slot.index) {
                let tb = stream.time_base();
                slot.time_base = Rational::new(tb.numerator(), tb.denominator());
            }
        }

        self.header_written = true;
        Ok(())
    }

    /**
        Write a packet to the sink.

        Packets are routed to the correct stream based on their type.
    */
    pub fn write(&mut self, packet: &Packet) -> Result<()> {
        if !self.header_written {
            return Err(Error::invalid_data("header not written"));
        }

        let slot = match packet.stream_type {
            StreamType::Video => self.video,
            StreamType::Audio => self.audio,
        }
        .ok_or_else(|| {
            Error::invalid_data(format!("no {:?} stream configured", packet.stream_type))
        })?;

        let mut ffmpeg_pkt = if packet.data.is_empty() {
            ffmpeg_next::Packet::empty()
        } else {
            ffmpeg_next::Packet::copy(&packet.data)
        };

        ffmpeg_pkt.set_stream(slot.index);
        ffmpeg_pkt.set_pts(packet.pts.map(|p| packet.time_base.rescale(p.0, slot.time_base)));
        ffmpeg_pkt.set_dts(packet.dts.map(|p| packet.time_base.rescale(p.0, slot.time_base)));
        ffmpeg_pkt.set_duration(packet.time_base.rescale(packet.duration.0, slot.time_base));

        if packet.is_keyframe {
            ffmpeg_pkt.set_flags(ffmpeg_next::packet::Flags::KEY);
        }

        ffmpeg_pkt
            .write_interleaved(&mut self.output)
            .map_err(|e| Error::codec(format!("failed to write packet: {}", e)))?;

        Ok(())
    }

    /**
        Finish writing and close the sink.

        This writes the trailer (duration, seeking index) and finalizes the
        container. The file may be unplayable if this is not called.
    */
    pub fn finish(mut self) -> Result<()> {
        if !self.header_written {
            return Err(Error::invalid_data("header not written"));
        }

        self.output
            .write_trailer()
            .map_err(|e| Error::codec(format!("failed to write trailer: {}", e)))?;

        Ok(())
    }

    fn ensure_no_header(&self) -> Result<()> {
        if self.header_written {
            return Err(Error::invalid_data("header already written"));
        }
        Ok(())
    }
}

fn codec_id_to_ffmpeg(codec: CodecId) -> Result<ffmpeg_next::codec::Id> {
    use ffmpeg_next::codec::Id;

    match codec {
        CodecId::H264 => Ok(Id::H264),
        CodecId::H265 => Ok(Id::HEVC),
        CodecId::Aac => Ok(Id::AAC),
        CodecId::Mp3 => Ok(Id::MP3),
        _ => Err(Error::unsupported_format(format!(
            "codec {:?} not supported for muxing",
            codec
        ))),
    }
}

/**
    Copy extradata into codec parameters, padded the way FFmpeg requires.
*/
unsafe fn set_extradata(ptr: *mut ffi::AVCodecParameters, extradata: Option<&[u8]>) {
    let Some(extradata) = extradata.filter(|e| !e.is_empty()) else {
        return;
    };

    unsafe {
        let alloc_size = extradata.len() + ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize;
        let buf = ffi::av_mallocz(alloc_size) as *mut u8;
        if !buf.is_null() {
            std::ptr::copy_nonoverlapping(extradata.as_ptr(), buf, extradata.len());
            (*ptr).extradata = buf;
            (*ptr).extradata_size = extradata.len() as i32;
        }
    }
}

fn set_video_parameters(params: &Parameters, info: &VideoStreamInfo) -> Result<()> {
    let codec_id = match info.codec_id {
        CodecId::H264 => ffi::AVCodecID::AV_CODEC_ID_H264,
        CodecId::H265 => ffi::AVCodecID::AV_CODEC_ID_HEVC,
        _ => {
            return Err(Error::unsupported_format(format!(
                "video codec {:?} not supported",
                info.codec_id
            )));
        }
    };

    // SAFETY: the parameters belong to a stream of the output context we
    // hold mutably, and nothing else touches them before the header is written.
    unsafe {
        let ptr = params.as_ptr() as *mut ffi::AVCodecParameters;

        (*ptr).codec_type = ffi::AVMediaType::AVMEDIA_TYPE_VIDEO;
        (*ptr).codec_id = codec_id;
        (*ptr).width = info.width as i32;
        (*ptr).height = info.height as i32;
        (*ptr).format = match info.pixel_format {
            PixelFormat::Nv12 => ffi::AVPixelFormat::AV_PIX_FMT_NV12 as i32,
            _ => ffi::AVPixelFormat::AV_PIX_FMT_YUV420P as i32,
        };

        set_extradata(ptr, info.extradata.as_deref());

        if let Some(bitrate) = info.bitrate {
            (*ptr).bit_rate = bitrate as i64;
        }
        if let Some(profile) = info.profile {
            (*ptr).profile = profile;
        }
    }

    Ok(())
}

fn set_audio_parameters(params: &Parameters, info: &AudioStreamInfo) -> Result<()> {
    let codec_id = match info.codec_id {
        CodecId::Aac => ffi::AVCodecID::AV_CODEC_ID_AAC,
        CodecId::Mp3 => ffi::AVCodecID::AV_CODEC_ID_MP3,
        _ => {
            return Err(Error::unsupported_format(format!(
                "audio codec {:?} not supported",
                info.codec_id
            )));
        }
    };

    // SAFETY: see set_video_parameters.
    unsafe {
        let ptr = params.as_ptr() as *mut ffi::AVCodecParameters;

        (*ptr).codec_type = ffi::AVMediaType::AVMEDIA_TYPE_AUDIO;
        (*ptr).codec_id = codec_id;
        (*ptr).sample_rate = info.sample_rate as i32;
        (*ptr).frame_size = info.frame_size as i32;
        ffi::av_channel_layout_default(&mut (*ptr).ch_layout, info.channel_count() as i32);

        (*ptr).format = match info.sample_format {
            SampleFormat::U8 => ffi::AVSampleFormat::AV_SAMPLE_FMT_U8 as i32,
            SampleFormat::S16 => ffi::AVSampleFormat::AV_SAMPLE_FMT_S16 as i32,
            SampleFormat::S16p => ffi::AVSampleFormat::AV_SAMPLE_FMT_S16P as i32,
            SampleFormat::F32 => ffi::AVSampleFormat::AV_SAMPLE_FMT_FLT as i32,
            _ => ffi::AVSampleFormat::AV_SAMPLE_FMT_FLTP as i32,
        };

        set_extradata(ptr, info.extradata.as_deref());

        if let Some(bitrate) = info.bitrate {
            (*ptr).bit_rate = bitrate as i64;
        }
        if let Some(profile) = info.profile {
            (*ptr).profile = profile;
        }
    }

    Ok(())
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sink")
            .field("path", &self.path)
            .field("format", &self.format)
            .field("video", &self.video)
            .field("audio", &self.audio)
            .field("header_written", &self.header_written)
            .finish_non_exhaustive()
    }
}
