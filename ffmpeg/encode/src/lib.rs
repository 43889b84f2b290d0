/*!
    Media encoding for the capture encoder.

    This crate turns raw frames into compressed packets: planar YUV video into
    H.264 through libx264, and planar float audio into AAC through FFmpeg's
    native encoder.

    # Video Encoding

    ```ignore
    use ffmpeg_encode::{EncoderPreset, VideoEncoder, VideoEncoderConfig};
    use ffmpeg_types::Rational;

    let config = VideoEncoderConfig::h264(1280, 720, Rational::new(30, 1))
        .with_time_base(Rational::new(1, 10_000))
        .with_preset(EncoderPreset::Fast)
        .with_profile("main");

    let mut encoder = VideoEncoder::new(config)?;

    for frame in video_frames {
        for packet in encoder.encode(&frame)? {
            // Write to muxer
        }
    }

    let final_packets = encoder.flush()?;
    ```

    # Audio Encoding

    ```ignore
    use ffmpeg_encode::{AudioEncoder, AudioEncoderConfig};
    use ffmpeg_types::ChannelLayout;

    let config = AudioEncoderConfig::aac(44100, ChannelLayout::Stereo).with_bitrate(64_000);
    let mut encoder = AudioEncoder::new(config)?;

    // Every frame must hold exactly `encoder.frame_size()` samples per channel.
    for frame in audio_frames {
        for packet in encoder.encode(&frame)? {
            // Write to muxer
        }
    }
    ```

    # Timestamps

    Frames carry their own time base. The encoders rescale incoming
    timestamps into the codec time base, so callers may stamp frames in
    whatever clock the capture source uses.

    # Global Headers

    Containers such as MP4 need codec headers as extradata. Set
    `with_global_header(true)` when the muxer asks for it; the sink crate
    exposes that query.
*/

pub use ffmpeg_types::{
    AudioFrame, AudioStreamInfo, ChannelLayout, CodecId, Error, Packet, PixelFormat, Rational,
    Result, SampleFormat, VideoFrame, VideoStreamInfo,
};

mod audio;
mod config;
mod video;

pub use audio::AudioEncoder;
pub use config::{AudioEncoderConfig, EncoderPreset, RateControl, VideoEncoderConfig};
pub use video::VideoEncoder;

/**
    Drain every packet the encoder has ready.

    Shared by both encoders: stops on EAGAIN (needs more input) and on EOF
    (fully drained after a flush).
*/
pub(crate) fn drain_packets(
    encoder: &mut ffmpeg_next::codec::encoder::Encoder,
    mut convert: impl FnMut(&ffmpeg_next::Packet) -> Packet,
) -> Result<Vec<Packet>> {
    let mut packets = Vec::new();
    let mut encoded = ffmpeg_next::Packet::empty();

    loop {
        match encoder.receive_packet(&mut encoded) {
            Ok(()) => packets.push(convert(&encoded)),
            Err(ffmpeg_next::Error::Other { errno })
                if errno == ffmpeg_next::ffi::AVERROR(ffmpeg_next::ffi::EAGAIN) =>
            {
                break;
            }
            Err(ffmpeg_next::Error::Eof) => break,
            Err(e) => return Err(Error::codec(e.to_string())),
        }
    }

    Ok(packets)
}

/**
    Copy the codec context's extradata, if any.
*/
pub(crate) fn extradata(context: &ffmpeg_next::codec::Context) -> Option<Vec<u8>> {
    // SAFETY: extradata points at extradata_size bytes owned by the context,
    // which outlives this borrow.
    unsafe {
        let ptr = context.as_ptr();
        if (*ptr).extradata.is_null() || (*ptr).extradata_size <= 0 {
            return None;
        }
        Some(std::slice::from_raw_parts((*ptr).extradata, (*ptr).extradata_size as usize).to_vec())
    }
}
