/*!
    Encoded packet type.
*/

use crate::{MediaDuration, Pts, Rational, StreamType};

/**
    A compressed packet produced by an encoder, ready for the muxer.

    Timestamps are expressed in `time_base`; the sink rescales them into the
    container stream's time base.
*/
#[derive(Clone, Debug)]
pub struct Packet {
    pub data: Vec<u8>,
    pub pts: Option<Pts>,
    pub dts: Option<Pts>,
    pub duration: MediaDuration,
    pub time_base: Rational,
    pub is_keyframe: bool,
    pub stream_type: StreamType,
}

impl Packet {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
