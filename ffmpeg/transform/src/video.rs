/*!
    Video frame conversion.
*/

use ffmpeg_next::{
    software::scaling::{context::Context as ScalerContext, flag::Flags as ScalerFlags},
    util::frame::video::Video as VideoFrameFFmpeg,
};

use ffmpeg_types::{Error, PixelFormat, Rational, Result, VideoFrame};

/**
    Scaling algorithm for video resizing.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScalingAlgorithm {
    /// Bilinear interpolation - fast, acceptable quality.
    Bilinear,
    /// Bicubic interpolation - what the capture encoder has always used.
    #[default]
    Bicubic,
    /// Lanczos resampling - slowest, highest quality.
    Lanczos,
}

impl ScalingAlgorithm {
    fn to_ffmpeg_flags(self) -> ScalerFlags {
        match self {
            Self::Bilinear => ScalerFlags::BILINEAR,
            Self::Bicubic => ScalerFlags::BICUBIC,
            Self::Lanczos => ScalerFlags::LANCZOS,
        }
    }
}

/**
    Configuration for video conversion.
*/
#[derive(Clone, Debug)]
pub struct VideoTransformConfig {
    /// Target width in pixels.
    pub width: u32,
    /// Target height in pixels.
    pub height: u32,
    /// Target pixel format.
    pub format: PixelFormat,
    pub algorithm: ScalingAlgorithm,
}

impl VideoTransformConfig {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            algorithm: ScalingAlgorithm::default(),
        }
    }

    /**
        Configuration for H.264 encoder input.
    */
    pub fn yuv420p(width: u32, height: u32) -> Self {
        Self::new(width, height, PixelFormat::Yuv420p)
    }

    pub fn with_algorithm(mut self, algorithm: ScalingAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }
}

/**
    Converts packed capture frames to the encoder's pixel format and size.

    The destination picture is allocated once from the target resolution
    and reused for every frame. The scaler context is created lazily and
    rebuilt whenever the source dimensions or format change, which happens
    when a letterboxed frame size differs from the previous one.
*/
pub struct VideoTransform {
    config: VideoTransformConfig,
    scaler_state: Option<ScalerState>,
    dst_frame: VideoFrameFFmpeg,
    output: VideoFrame,
}

struct ScalerState {
    context: ScalerContext,
    src_frame: VideoFrameFFmpeg,
    src_width: u32,
    src_height: u32,
    src_format: PixelFormat,
}

impl VideoTransform {
    pub fn new(config: VideoTransformConfig) -> Result<Self> {
        if config.format != PixelFormat::Yuv420p {
            return Err(Error::unsupported_format(format!(
                "pixel format {:?} not supported for conversion output",
                config.format
            )));
        }

        let dst_pixel = pixel_format_to_ffmpeg(config.format)?;
        let dst_frame = VideoFrameFFmpeg::new(dst_pixel, config.width, config.height);

        let mut output = VideoFrame::empty(config.format, Rational::new(1, 1));
        output.width = config.width;
        output.height = config.height;
        output.data = vec![0; config.format.picture_size(config.width, config.height)];

        Ok(Self {
            config,
            scaler_state: None,
            dst_frame,
            output,
        })
    }

    pub fn config(&self) -> &VideoTransformConfig {
        &self.config
    }

    /**
        Convert a frame, returning a view of the reused output frame.

        The output carries the input's timestamp and time base.
    */
    pub fn transform(&mut self, frame: &VideoFrame) -> Result<&VideoFrame> {
        if frame.width == 0 || frame.height == 0 {
            return Err(Error::invalid_data("input frame has zero dimensions"));
        }

        if frame.data.len() < frame.picture_size() {
            return Err(Error::invalid_data(format!(
                "input frame holds {} bytes, {}x{} {:?} needs {}",
                frame.data.len(),
                frame.width,
                frame.height,
                frame.format,
                frame.picture_size()
            )));
        }

        let needs_init = match &self.scaler_state {
            None => true,
            Some(state) => {
                state.src_width != frame.width
                    || state.src_height != frame.height
                    || state.src_format != frame.format
            }
        };

        if needs_init {
            self.init_scaler(frame.width, frame.height, frame.format)?;
        }

        let Some(state) = self.scaler_state.as_mut() else {
            return Err(Error::codec("scaler not initialized"));
        };

        copy_packed_to_ffmpeg_frame(&mut state.src_frame, frame)?;

        state
            .context
            .run(&state.src_frame, &mut self.dst_frame)
            .map_err(|e| Error::codec(format!("scaling failed: {}", e)))?;

        copy_planar_from_ffmpeg_frame(&self.dst_frame, &mut self.output.data)?;
        self.output.pts = frame.pts;
        self.output.time_base = frame.time_base;

        Ok(&self.output)
    }

    fn init_scaler(
        &mut self,
        src_width: u32,
        src_height: u32,
        src_format: PixelFormat,
    ) -> Result<()> {
        let src_pixel = pixel_format_to_ffmpeg(src_format)?;
        let dst_pixel = pixel_format_to_ffmpeg(self.config.format)?;

        let context = ScalerContext::get(
            src_pixel,
            src_width,
            src_height,
            dst_pixel,
            self.config.width,
            self.config.height,
            self.config.algorithm.to_ffmpeg_flags(),
        )
        .map_err(|e| Error::codec(format!("failed to create scaler: {}", e)))?;

        self.scaler_state = Some(ScalerState {
            context,
            src_frame: VideoFrameFFmpeg::new(src_pixel, src_width, src_height),
            src_width,
            src_height,
            src_format,
        });

        Ok(())
    }
}

fn pixel_format_to_ffmpeg(format: PixelFormat) -> Result<ffmpeg_next::format::Pixel> {
    use ffmpeg_next::format::Pixel;

    match format {
        PixelFormat::Yuv420p => Ok(Pixel::YUV420P),
        PixelFormat::Nv12 => Ok(Pixel::NV12),
        PixelFormat::Bgra => Ok(Pixel::BGRA),
        PixelFormat::Bgr0 => Ok(Pixel::BGRZ),
        PixelFormat::Rgba => Ok(Pixel::RGBA),
        _ => Err(Error::unsupported_format(format!(
            "pixel format {:?} not supported",
            format
        ))),
    }
}

/**
    Copy a tightly packed 32-bit frame into an FFmpeg frame, honouring its stride.
*/
fn copy_packed_to_ffmpeg_frame(dst: &mut VideoFrameFFmpeg, src: &VideoFrame) -> Result<()> {
    let Some(bytes_per_pixel) = src.format.packed_bytes_per_pixel() else {
        return Err(Error::unsupported_format(format!(
            "pixel format {:?} not supported for conversion input",
            src.format
        )));
    };

    let row_bytes = src.width as usize * bytes_per_pixel;
    let dst_stride = dst.stride(0);
    let dst_data = dst.data_mut(0);

    for (y, row) in src
        .data
        .chunks_exact(row_bytes)
        .take(src.height as usize)
        .enumerate()
    {
        let dst_row_start = y * dst_stride;
        dst_data[dst_row_start..dst_row_start + row_bytes].copy_from_slice(row);
    }
    Ok(())
}

/**
    Copy a YUV 4:2:0 FFmpeg frame into a tightly packed buffer.
*/
fn copy_planar_from_ffmpeg_frame(frame: &VideoFrameFFmpeg, output: &mut Vec<u8>) -> Result<()> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let uv_width = width.div_ceil(2);
    let uv_height = height.div_ceil(2);

    output.clear();

    let y_stride = frame.stride(0);
    let y_data = frame.data(0);
    for y in 0..height {
        let row_start = y * y_stride;
        output.extend_from_slice(&y_data[row_start..row_start + width]);
    }

    for plane in 1..3 {
        let stride = frame.stride(plane);
        let data = frame.data(plane);
        for y in 0..uv_height {
            let row_start = y * stride;
            output.extend_from_slice(&data[row_start..row_start + uv_width]);
        }
    }

    Ok(())
}

impl std::fmt::Debug for VideoTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoTransform")
            .field("config", &self.config)
            .field("initialized", &self.scaler_state.is_some())
            .finish()
    }
}
