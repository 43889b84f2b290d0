/*!
    The seam between frame preparation and the codec library.

    A backend is three pieces: a video codec that takes prepared BGR0 frames
    of any size (conversion and scaling are its job), an audio codec that
    takes fixed-size frames in its own sample format, and a packet writer.
    The session locks each piece separately.
*/

use ffmpeg_types::{AudioFrame, Packet, Rational, SampleFormat, VideoFrame};

use crate::config::{EncoderConfig, SessionConfig};
use crate::error::Result;

#[cfg(feature = "ffmpeg")]
mod ffmpeg;
#[cfg(test)]
pub(crate) mod testing;

#[cfg(feature = "ffmpeg")]
pub use ffmpeg::FfmpegBackendFactory;

pub trait VideoCodec: Send {
    /**
        Encode one prepared frame. Its timestamp is in the frame's time base.
    */
    fn encode(&mut self, frame: &VideoFrame) -> Result<Vec<Packet>>;

    /**
        Drain buffered packets at end of stream.
    */
    fn flush(&mut self) -> Result<Vec<Packet>>;
}

pub trait AudioCodec: Send {
    /**
        Samples per channel every frame must carry.
    */
    fn frame_size(&self) -> usize;

    fn sample_format(&self) -> SampleFormat;

    fn time_base(&self) -> Rational;

    fn encode(&mut self, frame: &AudioFrame) -> Result<Vec<Packet>>;

    fn flush(&mut self) -> Result<Vec<Packet>>;
}

pub trait PacketWriter: Send {
    fn write(&mut self, packet: &Packet) -> Result<()>;

    /**
        Write the trailer and close the output.
    */
    fn finish(&mut self) -> Result<()>;
}

/**
    A fully opened backend for one session.
*/
pub struct CodecBackend {
    pub video: Box<dyn VideoCodec>,
    pub audio: Box<dyn AudioCodec>,
    pub writer: Box<dyn PacketWriter>,
}

/**
    Opens backends. Construction either succeeds completely or leaves
    nothing behind.
*/
pub trait BackendFactory: Send + Sync {
    fn create(&self, session: &SessionConfig, encoder: &EncoderConfig) -> Result<CodecBackend>;
}
