/*!
    Pixel and sample format types.
*/

/**
    Video pixel formats understood by the capture pipeline.

    Capture sources hand over packed 32-bit frames; encoders consume planar
    YUV. Anything else is converted before it reaches the encoder.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PixelFormat {
    /// Planar YUV 4:2:0, 12bpp (H.264 input)
    Yuv420p,
    /// Semi-planar YUV 4:2:0, 12bpp (hardware encoder input)
    Nv12,
    /// Packed BGRA, 32bpp
    Bgra,
    /// Packed BGR with an unused fourth byte, 32bpp (screen capture output)
    Bgr0,
    /// Packed RGBA, 32bpp
    Rgba,
}

impl PixelFormat {
    /**
        Returns the number of bits per pixel for this format.

        For planar formats, this is the average bits per pixel.
    */
    pub const fn bits_per_pixel(self) -> u32 {
        match self {
            Self::Yuv420p | Self::Nv12 => 12,
            Self::Bgra | Self::Bgr0 | Self::Rgba => 32,
        }
    }

    /**
        Returns the number of bytes per pixel for packed formats.
    */
    pub const fn packed_bytes_per_pixel(self) -> Option<usize> {
        match self {
            Self::Bgra | Self::Bgr0 | Self::Rgba => Some(4),
            Self::Yuv420p | Self::Nv12 => None,
        }
    }

    pub const fn is_planar(self) -> bool {
        !matches!(self, Self::Bgra | Self::Bgr0 | Self::Rgba)
    }

    /**
        Size in bytes of a tightly packed picture of the given dimensions.
    */
    pub const fn picture_size(self, width: u32, height: u32) -> usize {
        let w = width as usize;
        let h = height as usize;
        match self {
            Self::Yuv420p | Self::Nv12 => w * h + 2 * (w.div_ceil(2) * h.div_ceil(2)),
            Self::Bgra | Self::Bgr0 | Self::Rgba => w * h * 4,
        }
    }
}

/**
    Audio sample formats.

    Packed formats interleave channels; planar formats store one channel
    after another in the frame buffer.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SampleFormat {
    /// Unsigned 8-bit integer, interleaved
    U8,
    /// Signed 16-bit integer, interleaved
    S16,
    /// Signed 16-bit integer, planar
    S16p,
    /// 32-bit float in [-1.0, 1.0], interleaved
    F32,
    /// 32-bit float in [-1.0, 1.0], planar (native AAC encoder input)
    F32p,
}

impl SampleFormat {
    /**
        Returns the number of bytes per sample.
    */
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::S16 | Self::S16p => 2,
            Self::F32 | Self::F32p => 4,
        }
    }

    pub const fn is_planar(self) -> bool {
        matches!(self, Self::S16p | Self::F32p)
    }

    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F32p)
    }
}

/**
    Audio channel layout.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ChannelLayout {
    Mono,
    Stereo,
}

impl ChannelLayout {
    /**
        Returns the number of channels.
    */
    pub const fn channels(self) -> u16 {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
        }
    }

    /**
        Create a channel layout from a channel count.

        Capture devices deliver mono or stereo; anything other than a single
        channel is treated as stereo.
    */
    pub const fn from_count(count: u16) -> Self {
        match count {
            1 => Self::Mono,
            _ => Self::Stereo,
        }
    }
}
