/*!
    Frame preparation and pacing for live capture encoding.

    A capture source hands over raw BGR0 video frames and interleaved S16
    PCM chunks of arbitrary size. This crate turns them into something a
    codec backend can consume:

    - [`geometry`] crops, letterboxes and flips video frames into a reused
      scratch frame;
    - [`audio`] accumulates PCM into fixed-size codec frames, applies volume,
      converts the sample format and assigns timestamps;
    - [`preset`] benchmarks the host CPU once and picks an encoder effort tier.

    [`EncoderSession`] ties these together for one output file, and
    [`SessionRegistry`] owns sessions behind opaque [`SessionId`] handles.

    The codec backend is a trait seam ([`backend`]). The FFmpeg implementation
    lives behind the `ffmpeg` cargo feature:

    ```ignore
    use capture_encoder::{
        AudioConfig, SessionConfig, SessionRegistry, TargetVideoSpec,
        backend::FfmpegBackendFactory,
    };
    use ffmpeg_types::Rational;

    let registry = SessionRegistry::new(FfmpegBackendFactory);
    registry.benchmark_and_configure();

    let config = SessionConfig::new(
        "capture.mp4",
        AudioConfig::new(2, 44100),
        TargetVideoSpec::new(1280, 720, Rational::new(30, 1)).with_keep_aspect(true),
    );
    let id = registry.create(config)?;

    registry.feed_video_frame(id, &frame)?;
    registry.feed_audio(id, &pcm, -1)?;

    registry.flush_frames(id)?;
    registry.destroy(id)?;
    ```
*/

pub mod audio;
pub mod backend;
pub mod config;
pub mod error;
pub mod geometry;
pub mod preset;

mod registry;
mod session;

pub use config::{AudioConfig, CAPTURE_TIME_BASE, EncoderConfig, SessionConfig, TargetVideoSpec};
pub use error::{Error, Result};
pub use geometry::{ClipRect, FrameDescriptor, GeometryTransformer, Placement};
pub use preset::PresetTier;
pub use registry::{SessionId, SessionRegistry};
pub use session::{EncoderSession, SessionStats};
