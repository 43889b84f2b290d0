/*!
    Raw (uncompressed) frame types.
*/

use crate::{ChannelLayout, PixelFormat, Pts, Rational, SampleFormat};

/**
    A raw video frame.

    Rows are tightly packed: row `y` of a packed format starts at
    `y * width * bytes_per_pixel`. Planar formats store their planes one
    after another. `data` may be longer than the picture; trailing bytes
    are ignored.
*/
#[derive(Clone, Debug)]
pub struct VideoFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub pts: Option<Pts>,
    pub time_base: Rational,
}

impl VideoFrame {
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
        pts: Option<Pts>,
        time_base: Rational,
    ) -> Self {
        Self {
            data,
            width,
            height,
            format,
            pts,
            time_base,
        }
    }

    /**
        An empty frame whose buffer will be filled in place.
    */
    pub fn empty(format: PixelFormat, time_base: Rational) -> Self {
        Self::new(Vec::new(), 0, 0, format, None, time_base)
    }

    /**
        Number of bytes the picture itself occupies in `data`.
    */
    pub fn picture_size(&self) -> usize {
        self.format.picture_size(self.width, self.height)
    }
}

/**
    A raw audio frame.

    Packed formats interleave channels. Planar formats store
    `samples * bytes_per_sample` bytes per channel, channel after channel.
*/
#[derive(Clone, Debug)]
pub struct AudioFrame {
    pub data: Vec<u8>,
    /// Samples per channel.
    pub samples: usize,
    pub sample_rate: u32,
    pub channels: ChannelLayout,
    pub format: SampleFormat,
    pub pts: Option<Pts>,
    pub time_base: Rational,
}

impl AudioFrame {
    pub fn new(
        data: Vec<u8>,
        samples: usize,
        sample_rate: u32,
        channels: ChannelLayout,
        format: SampleFormat,
        pts: Option<Pts>,
        time_base: Rational,
    ) -> Self {
        Self {
            data,
            samples,
            sample_rate,
            channels,
            format,
            pts,
            time_base,
        }
    }

    /**
        Bytes of a single plane (planar) or of the whole buffer (packed).
    */
    pub fn plane_size(&self) -> usize {
        let per_channel = self.samples * self.format.bytes_per_sample();
        if self.format.is_planar() {
            per_channel
        } else {
            per_channel * self.channels.channels() as usize
        }
    }

    pub fn plane_count(&self) -> usize {
        if self.format.is_planar() {
            self.channels.channels() as usize
        } else {
            1
        }
    }
}
