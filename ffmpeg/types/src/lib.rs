/*!
    Shared types for the capture encoder's ffmpeg crates.

    This crate defines the vocabulary that crosses crate boundaries: raw
    frames going into the encoders, packets coming out of them, and the
    stream descriptions handed to the muxer. It has no dependency on FFmpeg,
    so the frame-preparation layer can be built and tested without linking
    any native libraries.
*/

mod codec;
mod error;
mod format;
mod frame;
mod packet;
mod stream;
mod time;

pub use codec::{CodecId, StreamType};
pub use error::{Error, Result};
pub use format::{ChannelLayout, PixelFormat, SampleFormat};
pub use frame::{AudioFrame, VideoFrame};
pub use packet::Packet;
pub use stream::{AudioStreamInfo, VideoStreamInfo};
pub use time::{MediaDuration, Pts, Rational};
