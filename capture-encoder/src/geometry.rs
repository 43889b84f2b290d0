/*!
    Crop, letterbox and flip of captured video frames.

    Frames arrive as packed BGR0 with an arbitrary line size. The transformer
    copies the clipped region into a reused scratch frame, optionally padded
    so that the result has the target's aspect ratio. Padding bytes stay
    zero, which the pixel converter turns into black bars.
*/

use ffmpeg_types::{PixelFormat, Pts, VideoFrame};
use tracing::debug;

use crate::config::{CAPTURE_TIME_BASE, TargetVideoSpec};
use crate::error::{Error, Result};

const BYTES_PER_PIXEL: usize = 4;

/// Extra pixels per dimension kept in the scratch buffer.
const SCRATCH_SLACK: usize = 8;

/**
    Pixel bounds of the region to capture from the source frame.

    An all-zero rect is inactive and means "the whole frame".
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ClipRect {
    pub top: i32,
    pub bottom: i32,
    pub left: i32,
    pub right: i32,
}

impl ClipRect {
    pub const fn new(top: i32, bottom: i32, left: i32, right: i32) -> Self {
        Self {
            top,
            bottom,
            left,
            right,
        }
    }

    /**
        The rect covering a whole `width` x `height` frame.
    */
    pub const fn full(width: u32, height: u32) -> Self {
        Self::new(0, height as i32, 0, width as i32)
    }

    pub const fn width(&self) -> i32 {
        self.right - self.left
    }

    pub const fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub const fn is_active(&self) -> bool {
        !(self.top == self.bottom && self.left == self.right)
    }

    fn check_bounds(&self, width: u32, height: u32) -> Result<()> {
        let inside = self.left >= 0
            && self.top >= 0
            && self.right as i64 <= width as i64
            && self.bottom as i64 <= height as i64;
        if !inside || self.width() <= 0 || self.height() <= 0 {
            return Err(Error::InvalidGeometry(format!(
                "clip rect {:?} does not fit a {}x{} frame",
                self, width, height
            )));
        }
        Ok(())
    }
}

/**
    A raw captured frame, borrowed for one call.
*/
#[derive(Clone, Copy, Debug)]
pub struct FrameDescriptor<'a> {
    /// Packed BGR0 pixels, `line_size` bytes per row.
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub line_size: usize,
    /// Capture time in 100 ns ticks, negative when unknown.
    pub timestamp: i64,
    /// Rows are stored bottom-up.
    pub flipped: bool,
}

impl<'a> FrameDescriptor<'a> {
    pub fn new(data: &'a [u8], width: u32, height: u32, line_size: usize) -> Self {
        Self {
            data,
            width,
            height,
            line_size,
            timestamp: -1,
            flipped: false,
        }
    }

    /**
        A frame whose rows are tightly packed.
    */
    pub fn packed(data: &'a [u8], width: u32, height: u32) -> Self {
        Self::new(data, width, height, width as usize * BYTES_PER_PIXEL)
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_flip(mut self, flipped: bool) -> Self {
        self.flipped = flipped;
        self
    }

    /**
        Capture timestamp, if the caller supplied one.
    */
    pub fn capture_timestamp(&self) -> Option<i64> {
        (self.timestamp >= 0).then_some(self.timestamp)
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidFrame(format!(
                "frame {}x{} is empty",
                self.width, self.height
            )));
        }
        let row_bytes = self.width as usize * BYTES_PER_PIXEL;
        if self.line_size < row_bytes {
            return Err(Error::InvalidFrame(format!(
                "line size {} is shorter than a {} pixel row",
                self.line_size, self.width
            )));
        }
        let needed = self.line_size * self.height as usize;
        if self.data.len() < needed {
            return Err(Error::InvalidFrame(format!(
                "buffer holds {} bytes, {} rows of {} need {}",
                self.data.len(),
                self.height,
                self.line_size,
                needed
            )));
        }
        Ok(())
    }

    fn row(&self, index: usize) -> &'a [u8] {
        let start = index * self.line_size;
        &self.data[start..start + self.line_size]
    }
}

/**
    Where a clipped region lands inside the destination frame.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement {
    /// Size of the region copied from the source.
    pub copy_width: u32,
    pub copy_height: u32,
    /// Top-left corner of the copied region in the destination.
    pub offset_x: u32,
    pub offset_y: u32,
    /// Size of the destination frame, padding included.
    pub real_width: u32,
    pub real_height: u32,
}

impl Placement {
    /**
        Copy the whole frame unpadded.
    */
    pub const fn native(width: u32, height: u32) -> Self {
        Self {
            copy_width: width,
            copy_height: height,
            offset_x: 0,
            offset_y: 0,
            real_width: width,
            real_height: height,
        }
    }

    /**
        Place a clipped region, letterboxing it to the target's aspect ratio
        when `keep_aspect` is set.

        A region at least as wide as the target (relative to its height) gets
        bars above and below; a narrower one gets bars left and right. The
        odd padding pixel goes to the bottom or right edge.
    */
    pub fn for_clip(clip: &ClipRect, target: &TargetVideoSpec) -> Result<Self> {
        let rw = clip.width() as i64;
        let rh = clip.height() as i64;
        let tw = target.width as i64;
        let th = target.height as i64;

        if rw <= 0 || rh <= 0 {
            return Err(Error::InvalidGeometry(format!(
                "clip rect {:?} has no area",
                clip
            )));
        }
        if tw <= 0 || th <= 0 {
            return Err(Error::InvalidGeometry(format!(
                "target {}x{} is empty",
                target.width, target.height
            )));
        }

        let (mut real_w, mut real_h, mut offset_x, mut offset_y) = (rw, rh, 0, 0);

        if target.keep_aspect {
            if rw * th >= rh * tw {
                real_h = rw * th / tw;
                let added = real_h - rh;
                if added < 0 {
                    return Err(negative_padding("height", added));
                }
                offset_y = added / 2;
            } else {
                real_w = rh * tw / th;
                let added = real_w - rw;
                if added < 0 {
                    return Err(negative_padding("width", added));
                }
                offset_x = added / 2;
            }
        }

        let to_u32 = |v: i64| {
            u32::try_from(v)
                .map_err(|_| Error::InvalidGeometry(format!("dimension {} out of range", v)))
        };

        Ok(Self {
            copy_width: to_u32(rw)?,
            copy_height: to_u32(rh)?,
            offset_x: to_u32(offset_x)?,
            offset_y: to_u32(offset_y)?,
            real_width: to_u32(real_w)?,
            real_height: to_u32(real_h)?,
        })
    }

    pub const fn added_width(&self) -> u32 {
        self.real_width - self.copy_width
    }

    pub const fn added_height(&self) -> u32 {
        self.real_height - self.copy_height
    }

    fn scratch_len(&self) -> usize {
        (self.real_width as usize + SCRATCH_SLACK)
            * (self.real_height as usize + SCRATCH_SLACK)
            * BYTES_PER_PIXEL
    }
}

fn negative_padding(axis: &str, added: i64) -> Error {
    Error::InvalidGeometry(format!("letterbox would add {} pixels of {}", added, axis))
}

/**
    Crops and letterboxes frames into a reused scratch frame.

    The scratch buffer only grows. It is cleared when the placement changes,
    so padding bytes are zero without rewriting them for every frame.
*/
pub struct GeometryTransformer {
    clip: ClipRect,
    target: TargetVideoSpec,
    placement: Option<Placement>,
    frame: VideoFrame,
}

impl GeometryTransformer {
    pub fn new(clip: ClipRect, target: TargetVideoSpec) -> Self {
        Self {
            clip,
            target,
            placement: None,
            frame: VideoFrame::empty(PixelFormat::Bgr0, CAPTURE_TIME_BASE),
        }
    }

    pub fn clip(&self) -> &ClipRect {
        &self.clip
    }

    /**
        Placement used for the most recent frame.
    */
    pub fn placement(&self) -> Option<&Placement> {
        self.placement.as_ref()
    }

    /**
        Scratch capacity in bytes.
    */
    pub fn scratch_capacity(&self) -> usize {
        self.frame.data.len()
    }

    /**
        Copy `source` into the scratch frame and return it, stamped with `pts`
        in the capture time base.
    */
    pub fn prepare(
        &mut self,
        source: &FrameDescriptor<'_>,
        pts: Option<Pts>,
    ) -> Result<&VideoFrame> {
        source.validate()?;

        if self.clip.is_active()
            && !source.flipped
            && self.clip == ClipRect::full(source.width, source.height)
        {
            debug!(clip = ?self.clip, "clip covers the whole frame, cropping disabled");
            self.clip = ClipRect::default();
        }

        let placement = if self.clip.is_active() {
            self.clip.check_bounds(source.width, source.height)?;
            Placement::for_clip(&self.clip, &self.target)?
        } else {
            Placement::native(source.width, source.height)
        };

        self.reserve(&placement);
        self.copy_rows(source, &placement);

        self.frame.width = placement.real_width;
        self.frame.height = placement.real_height;
        self.frame.pts = pts;
        self.frame.time_base = CAPTURE_TIME_BASE;

        Ok(&self.frame)
    }

    fn reserve(&mut self, placement: &Placement) {
        if self.placement.as_ref() == Some(placement) {
            return;
        }

        let needed = placement.scratch_len().max(self.frame.data.len());
        self.frame.data.fill(0);
        self.frame.data.resize(needed, 0);

        debug!(
            width = placement.real_width,
            height = placement.real_height,
            offset_x = placement.offset_x,
            offset_y = placement.offset_y,
            "frame placement changed"
        );
        self.placement = Some(*placement);
    }

    fn copy_rows(&mut self, source: &FrameDescriptor<'_>, placement: &Placement) {
        let (top, left) = if self.clip.is_active() {
            (self.clip.top as usize, self.clip.left as usize)
        } else {
            (0, 0)
        };

        let row_bytes = placement.copy_width as usize * BYTES_PER_PIXEL;
        let dst_stride = placement.real_width as usize * BYTES_PER_PIXEL;
        let src_start = left * BYTES_PER_PIXEL;
        let dst_start = placement.offset_x as usize * BYTES_PER_PIXEL;
        let last_row = source.height as usize - 1;

        for i in 0..placement.copy_height as usize {
            let src_row = if source.flipped {
                last_row - (top + i)
            } else {
                top + i
            };
            let src = &source.row(src_row)[src_start..src_start + row_bytes];

            let dst_offset = (placement.offset_y as usize + i) * dst_stride + dst_start;
            self.frame.data[dst_offset..dst_offset + row_bytes].copy_from_slice(src);
        }
    }
}

impl std::fmt::Debug for GeometryTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeometryTransformer")
            .field("clip", &self.clip)
            .field("target", &self.target)
            .field("placement", &self.placement)
            .field("scratch", &self.frame.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use ffmpeg_types::Rational;

    use super::*;

    fn target(width: u32, height: u32, keep_aspect: bool) -> TargetVideoSpec {
        TargetVideoSpec::new(width, height, Rational::new(30, 1)).with_keep_aspect(keep_aspect)
    }

    /// Frame whose pixel (x, y) is [x as u8, y as u8, 0xAA, 0].
    fn gradient(width: u32, height: u32, line_size: usize) -> Vec<u8> {
        let mut data = vec![0xEE; line_size * height as usize];
        for y in 0..height as usize {
            for x in 0..width as usize {
                let p = y * line_size + x * 4;
                data[p..p + 4].copy_from_slice(&[x as u8, y as u8, 0xAA, 0]);
            }
        }
        data
    }

    fn pixel(frame: &VideoFrame, x: u32, y: u32) -> [u8; 4] {
        let p = (y as usize * frame.width as usize + x as usize) * 4;
        [
            frame.data[p],
            frame.data[p + 1],
            frame.data[p + 2],
            frame.data[p + 3],
        ]
    }

    #[test]
    fn wide_clip_pads_top_and_bottom() {
        let clip = ClipRect::new(0, 100, 0, 400);
        let placement = Placement::for_clip(&clip, &target(1280, 720, true)).unwrap();
        assert_eq!(placement.offset_x, 0);
        assert_eq!(placement.real_width, 400);
        assert_eq!(placement.real_height, 225);
        assert_eq!(placement.added_height(), 125);
        assert_eq!(placement.offset_y, 62);
    }

    #[test]
    fn narrow_clip_pads_left_and_right() {
        let clip = ClipRect::new(0, 1080, 0, 1440);
        let placement = Placement::for_clip(&clip, &target(1280, 720, true)).unwrap();
        assert_eq!(placement.offset_y, 0);
        assert_eq!(placement.real_width, 1920);
        assert_eq!(placement.real_height, 1080);
        assert_eq!(placement.added_width(), 480);
        assert_eq!(placement.offset_x, 240);
    }

    #[test]
    fn matching_aspect_adds_nothing() {
        let clip = ClipRect::new(10, 370, 20, 660);
        let placement = Placement::for_clip(&clip, &target(1280, 720, true)).unwrap();
        assert_eq!(placement.added_width(), 0);
        assert_eq!(placement.added_height(), 0);
        assert_eq!((placement.offset_x, placement.offset_y), (0, 0));
    }

    #[test]
    fn padding_is_never_negative() {
        let targets = [(1280, 720), (720, 1280), (640, 480), (1, 1000), (1000, 1)];
        let clips = [(1, 1), (3, 7), (1440, 1080), (1919, 1), (1, 1079), (333, 333)];
        for (tw, th) in targets {
            for (cw, ch) in clips {
                let clip = ClipRect::new(0, ch, 0, cw);
                let p = Placement::for_clip(&clip, &target(tw, th, true)).unwrap();
                assert!(p.real_width >= p.copy_width);
                assert!(p.real_height >= p.copy_height);
                if (cw as i64) * (th as i64) >= (ch as i64) * (tw as i64) {
                    assert_eq!(p.offset_x, 0);
                } else {
                    assert_eq!(p.offset_y, 0);
                }
            }
        }
    }

    #[test]
    fn without_keep_aspect_the_clip_is_used_as_is() {
        let clip = ClipRect::new(0, 1080, 0, 1440);
        let placement = Placement::for_clip(&clip, &target(1280, 720, false)).unwrap();
        assert_eq!(placement, Placement::native(1440, 1080));
    }

    #[test]
    fn full_frame_clip_is_normalized() {
        let data = gradient(1280, 720, 1280 * 4);
        let mut geometry =
            GeometryTransformer::new(ClipRect::new(0, 720, 0, 1280), target(1280, 720, true));

        let frame = geometry
            .prepare(&FrameDescriptor::packed(&data, 1280, 720), None)
            .unwrap();
        assert_eq!((frame.width, frame.height), (1280, 720));
        assert!(!geometry.clip().is_active());
    }

    #[test]
    fn flipped_full_frame_clip_is_kept() {
        let data = gradient(64, 32, 64 * 4);
        let mut geometry = GeometryTransformer::new(ClipRect::full(64, 32), target(64, 32, false));
        geometry
            .prepare(&FrameDescriptor::packed(&data, 64, 32).with_flip(true), None)
            .unwrap();
        assert!(geometry.clip().is_active());
    }

    #[test]
    fn bypass_still_flips() {
        let data = gradient(8, 4, 8 * 4);
        let mut geometry = GeometryTransformer::new(ClipRect::default(), target(8, 4, false));
        let frame = geometry
            .prepare(&FrameDescriptor::packed(&data, 8, 4).with_flip(true), None)
            .unwrap();

        assert_eq!((frame.width, frame.height), (8, 4));
        for x in 0..8 {
            assert_eq!(pixel(frame, x, 0), [x as u8, 3, 0xAA, 0]);
            assert_eq!(pixel(frame, x, 3), [x as u8, 0, 0xAA, 0]);
        }
        assert!(!geometry.clip().is_active());
    }

    #[test]
    fn bypass_drops_line_padding() {
        let data = gradient(8, 4, 48);
        let mut geometry = GeometryTransformer::new(ClipRect::default(), target(8, 4, false));
        let frame = geometry
            .prepare(&FrameDescriptor::new(&data, 8, 4, 48), Some(Pts(5)))
            .unwrap();

        assert_eq!((frame.width, frame.height), (8, 4));
        assert_eq!(frame.pts, Some(Pts(5)));
        assert_eq!(frame.time_base, CAPTURE_TIME_BASE);
        assert_eq!(pixel(frame, 7, 0), [7, 0, 0xAA, 0]);
        assert_eq!(pixel(frame, 0, 3), [0, 3, 0xAA, 0]);
    }

    #[test]
    fn crop_copies_the_clipped_region() {
        // 20x10 clip into 32x18: slightly wider than 16:9, one padding row.
        let data = gradient(64, 48, 64 * 4);
        let clip = ClipRect::new(4, 14, 10, 30);
        let mut geometry = GeometryTransformer::new(clip, target(32, 18, true));
        let frame = geometry
            .prepare(&FrameDescriptor::packed(&data, 64, 48), None)
            .unwrap()
            .clone();

        let placement = *geometry.placement().unwrap();
        assert_eq!(placement.real_width, 20);
        assert_eq!(placement.real_height, 11);
        assert_eq!(placement.offset_y, 0);

        assert_eq!((frame.width, frame.height), (20, 11));
        assert_eq!(pixel(&frame, 0, 0), [10, 4, 0xAA, 0]);
        assert_eq!(pixel(&frame, 19, 9), [29, 13, 0xAA, 0]);
        assert_eq!(pixel(&frame, 5, 10), [0, 0, 0, 0]);
    }

    #[test]
    fn letterbox_bars_stay_zero() {
        let data = gradient(40, 40, 40 * 4);
        let clip = ClipRect::new(0, 20, 0, 20);
        let mut geometry = GeometryTransformer::new(clip, target(40, 20, true));
        let frame = geometry
            .prepare(&FrameDescriptor::packed(&data, 40, 40), None)
            .unwrap();

        assert_eq!((frame.width, frame.height), (40, 20));
        assert_eq!(pixel(frame, 9, 5), [0, 0, 0, 0]);
        assert_eq!(pixel(frame, 10, 5), [0, 5, 0xAA, 0]);
        assert_eq!(pixel(frame, 29, 19), [19, 19, 0xAA, 0]);
        assert_eq!(pixel(frame, 30, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn flipped_frames_read_rows_bottom_up() {
        let data = gradient(4, 6, 16);
        let clip = ClipRect::new(1, 3, 0, 4);
        let mut geometry = GeometryTransformer::new(clip, target(4, 2, false));
        let frame = geometry
            .prepare(&FrameDescriptor::packed(&data, 4, 6).with_flip(true), None)
            .unwrap();

        // row i of the clip comes from source row 6 - 1 - (1 + i)
        assert_eq!(pixel(frame, 0, 0), [0, 4, 0xAA, 0]);
        assert_eq!(pixel(frame, 0, 1), [0, 3, 0xAA, 0]);
    }

    #[test]
    fn scratch_never_shrinks() {
        let big = gradient(64, 64, 256);
        let small = gradient(8, 8, 32);
        let mut geometry = GeometryTransformer::new(ClipRect::default(), target(64, 64, false));

        geometry
            .prepare(&FrameDescriptor::packed(&big, 64, 64), None)
            .unwrap();
        let capacity = geometry.scratch_capacity();
        assert!(capacity >= (64 + 8) * (64 + 8) * 4);

        let frame = geometry
            .prepare(&FrameDescriptor::packed(&small, 8, 8), None)
            .unwrap();
        assert_eq!((frame.width, frame.height), (8, 8));
        assert_eq!(pixel(frame, 7, 7), [7, 7, 0xAA, 0]);
        assert_eq!(geometry.scratch_capacity(), capacity);
    }

    #[test]
    fn out_of_bounds_clip_is_rejected() {
        let data = gradient(16, 16, 64);
        let mut geometry =
            GeometryTransformer::new(ClipRect::new(0, 8, 8, 24), target(16, 16, true));
        let err = geometry
            .prepare(&FrameDescriptor::packed(&data, 16, 16), None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidGeometry(_)));
    }

    #[test]
    fn short_buffers_are_rejected() {
        let data = vec![0u8; 100];
        let mut geometry = GeometryTransformer::new(ClipRect::default(), target(16, 16, false));
        let err = geometry
            .prepare(&FrameDescriptor::packed(&data, 16, 16), None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFrame(_)));

        let err = FrameDescriptor::new(&data, 16, 1, 32).validate().unwrap_err();
        assert!(matches!(err, Error::InvalidFrame(_)));
    }

    #[test]
    fn negative_timestamps_are_unspecified() {
        let data = [0u8; 4];
        let frame = FrameDescriptor::packed(&data, 1, 1);
        assert_eq!(frame.capture_timestamp(), None);
        assert_eq!(frame.with_timestamp(0).capture_timestamp(), Some(0));
        assert_eq!(frame.with_timestamp(-42).capture_timestamp(), None);
    }
}
