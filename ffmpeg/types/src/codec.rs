/*!
    Codec and stream identifiers.
*/

/**
    Codecs the encoders and muxer know how to handle.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecId {
    H264,
    H265,
    Aac,
    Mp3,
}

impl CodecId {
    pub const fn stream_type(self) -> StreamType {
        match self {
            Self::H264 | Self::H265 => StreamType::Video,
            Self::Aac | Self::Mp3 => StreamType::Audio,
        }
    }
}

/**
    The kind of elementary stream a packet belongs to.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamType {
    Video,
    Audio,
}
