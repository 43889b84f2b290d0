/*!
    Frame conversion for the capture encoder's ffmpeg crates.

    Capture sources produce packed 32-bit pictures at whatever size the
    letterbox step settled on. This crate scales and converts them to the
    planar YUV layout and fixed resolution the H.264 encoder was opened with.

    ```ignore
    use ffmpeg_transform::{VideoTransform, VideoTransformConfig};

    let mut transform = VideoTransform::new(VideoTransformConfig::yuv420p(1280, 720))?;
    let converted = transform.transform(&bgr0_frame)?;
    encoder.encode(converted)?;
    ```
*/

mod video;

pub use video::{ScalingAlgorithm, VideoTransform, VideoTransformConfig};
