/*!
    One capture session: geometry, pacing and encoding for one output file.
*/

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use ffmpeg_types::{Packet, Pts};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::audio::{AudioFramePacer, supports_format};
use crate::backend::{AudioCodec, BackendFactory, PacketWriter, VideoCodec};
use crate::config::{CAPTURE_TIME_BASE, EncoderConfig, SessionConfig};
use crate::error::{Error, Result};
use crate::geometry::{FrameDescriptor, GeometryTransformer};

/**
    Counters for a running session.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub video_frames: u64,
    pub audio_frames: u64,
    pub packets_written: u64,
    pub dropped: u64,
}

struct VideoPath {
    geometry: GeometryTransformer,
    codec: Box<dyn VideoCodec>,
    frame_index: i64,
}

struct AudioPath {
    pacer: AudioFramePacer,
    codec: Box<dyn AudioCodec>,
}

/**
    Encodes one capture into one output file.

    Video and audio are submitted from any thread. Each path is serialized
    by its own lock, so one video thread and one audio thread never wait on
    each other except around packet writes. Lock order is path, then writer.
*/
pub struct EncoderSession {
    config: SessionConfig,
    video: Mutex<VideoPath>,
    audio: Mutex<AudioPath>,
    writer: Mutex<Box<dyn PacketWriter>>,
    finished: AtomicBool,
    video_frames: AtomicU64,
    audio_frames: AtomicU64,
    packets_written: AtomicU64,
    dropped: AtomicU64,
}

impl EncoderSession {
    /**
        Open the backend and set up both paths.
    */
    pub fn new(
        config: SessionConfig,
        encoder: &EncoderConfig,
        factory: &dyn BackendFactory,
    ) -> Result<Self> {
        config.validate()?;

        let backend = factory.create(&config, encoder)?;

        let sample_format = backend.audio.sample_format();
        if !supports_format(sample_format) {
            return Err(Error::UnsupportedFormat(format!(
                "audio codec expects {:?} samples",
                sample_format
            )));
        }

        let mut pacer = AudioFramePacer::new(
            &config.audio,
            backend.audio.frame_size(),
            sample_format,
            backend.audio.time_base(),
        );
        pacer.set_volume(encoder.volume);

        info!(
            output = %config.output.display(),
            width = config.video.width,
            height = config.video.height,
            fps = config.video.frame_rate.to_f64(),
            sample_rate = config.audio.sample_rate,
            channels = config.audio.channels,
            preset = %encoder.preset,
            "capture session opened"
        );

        Ok(Self {
            video: Mutex::new(VideoPath {
                geometry: GeometryTransformer::new(config.clip, config.video.clone()),
                codec: backend.video,
                frame_index: 0,
            }),
            audio: Mutex::new(AudioPath {
                pacer,
                codec: backend.audio,
            }),
            writer: Mutex::new(backend.writer),
            config,
            finished: AtomicBool::new(false),
            video_frames: AtomicU64::new(0),
            audio_frames: AtomicU64::new(0),
            packets_written: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            video_frames: self.video_frames.load(Ordering::Relaxed),
            audio_frames: self.audio_frames.load(Ordering::Relaxed),
            packets_written: self.packets_written.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    /**
        Crop, letterbox and encode one video frame.

        Frames without a capture timestamp are stamped from their index at
        the target frame rate.
    */
    pub fn feed_video_frame(&self, frame: &FrameDescriptor<'_>) -> Result<()> {
        let mut video = self.video.lock();
        self.ensure_running()?;

        let VideoPath {
            geometry,
            codec,
            frame_index,
        } = &mut *video;

        let pts = match frame.capture_timestamp() {
            Some(ts) => ts,
            None => {
                let frame_duration = self.config.video.frame_rate.invert();
                frame_duration.rescale(*frame_index, CAPTURE_TIME_BASE)
            }
        };

        let packets = geometry
            .prepare(frame, Some(Pts(pts)))
            .and_then(|prepared| codec.encode(prepared))
            .inspect_err(|e| self.drop_frame("video", e))?;

        *frame_index += 1;
        self.video_frames.fetch_add(1, Ordering::Relaxed);

        self.write_packets(&packets)
    }

    /**
        Buffer PCM and encode every complete frame.

        `timestamp` is in 100 ns ticks; negative means unknown, in which case
        timestamps follow the sample count.
    */
    pub fn feed_audio(&self, data: &[u8], timestamp: i64) -> Result<()> {
        let mut audio = self.audio.lock();
        self.ensure_running()?;

        let AudioPath { pacer, codec } = &mut *audio;

        let frames = pacer
            .push(data, (timestamp >= 0).then_some(timestamp))
            .inspect_err(|e| self.drop_frame("audio", e))?;

        let mut result = Ok(());
        for frame in &frames {
            let encoded = codec
                .encode(frame)
                .inspect_err(|e| self.drop_frame("audio", e))
                .and_then(|packets| {
                    self.audio_frames.fetch_add(1, Ordering::Relaxed);
                    self.write_packets(&packets)
                });
            keep_first(&mut result, encoded);
        }
        result
    }

    /**
        Change the audio volume (256 = unity) for frames not yet extracted.
    */
    pub fn set_volume(&self, volume: i32) {
        self.audio.lock().pacer.set_volume(volume);
    }

    /**
        Drain both codecs and write the trailer.

        Audio is drained before video. Failures along the way are logged and
        counted, and the trailer is still written; the first one is returned.
        Only the first call does anything; later calls return
        [`Error::Finished`].
    */
    pub fn flush_frames(&self) -> Result<()> {
        if self.finished.swap(true, Ordering::AcqRel) {
            return Err(Error::Finished);
        }

        debug!(output = %self.config.output.display(), "flushing capture session");

        let mut result = Ok(());

        {
            let mut audio = self.audio.lock();
            let AudioPath { pacer, codec } = &mut *audio;

            let frames = match pacer.flush() {
                Ok(frames) => frames,
                Err(e) => {
                    self.drop_frame("audio", &e);
                    keep_first(&mut result, Err(e));
                    Vec::new()
                }
            };
            for frame in &frames {
                let encoded = codec
                    .encode(frame)
                    .inspect_err(|e| self.drop_frame("audio", e))
                    .and_then(|packets| {
                        self.audio_frames.fetch_add(1, Ordering::Relaxed);
                        self.write_packets(&packets)
                    });
                keep_first(&mut result, encoded);
            }

            let drained = codec
                .flush()
                .inspect_err(|e| warn!(error = %e, "audio codec drain failed"))
                .and_then(|packets| self.write_packets(&packets));
            keep_first(&mut result, drained);
        }

        {
            let mut video = self.video.lock();
            let drained = video
                .codec
                .flush()
                .inspect_err(|e| warn!(error = %e, "video codec drain failed"))
                .and_then(|packets| self.write_packets(&packets));
            keep_first(&mut result, drained);
        }

        let closed = self
            .writer
            .lock()
            .finish()
            .inspect_err(|e| warn!(error = %e, "failed to write trailer"));
        keep_first(&mut result, closed);

        let stats = self.stats();
        info!(
            output = %self.config.output.display(),
            video_frames = stats.video_frames,
            audio_frames = stats.audio_frames,
            packets = stats.packets_written,
            dropped = stats.dropped,
            ok = result.is_ok(),
            "capture session finished"
        );
        result
    }

    /**
        Called with a path lock held, so nothing reaches a drained codec.
    */
    fn ensure_running(&self) -> Result<()> {
        if self.is_finished() {
            return Err(Error::Finished);
        }
        Ok(())
    }

    /**
        Write packets in order. A failed write is counted and reported, and
        the remaining packets are still written.
    */
    fn write_packets(&self, packets: &[Packet]) -> Result<()> {
        if packets.is_empty() {
            return Ok(());
        }

        let mut writer = self.writer.lock();
        let mut result = Ok(());
        for packet in packets {
            match writer.write(packet) {
                Ok(()) => {
                    self.packets_written.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!(stream = ?packet.stream_type, error = %e, "packet write failed");
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
            }
        }
        result
    }

    fn drop_frame(&self, kind: &str, error: &Error) {
        warn!(kind, error = %error, "dropping frame");
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }
}

/**
    Record `next` in `result` unless an earlier error is already there.
*/
fn keep_first(result: &mut Result<()>, next: Result<()>) {
    if result.is_ok() {
        *result = next;
    }
}

impl std::fmt::Debug for EncoderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncoderSession")
            .field("output", &self.config.output)
            .field("finished", &self.is_finished())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ffmpeg_types::{Rational, SampleFormat, StreamType};

    use super::*;
    use crate::backend::testing::{Event, RecordingFactory};
    use crate::config::{AudioConfig, TargetVideoSpec};
    use crate::geometry::ClipRect;

    fn config() -> SessionConfig {
        SessionConfig::new(
            "capture.ts",
            AudioConfig::new(2, 48000),
            TargetVideoSpec::new(32, 18, Rational::new(25, 1)).with_keep_aspect(true),
        )
    }

    fn session(factory: &RecordingFactory) -> EncoderSession {
        EncoderSession::new(config(), &EncoderConfig::default(), factory).unwrap()
    }

    #[test]
    fn video_frames_are_stamped_from_their_index() {
        let factory = RecordingFactory::new(1024);
        let session = session(&factory);
        let pixels = vec![0u8; 16 * 9 * 4];

        for _ in 0..3 {
            session
                .feed_video_frame(&FrameDescriptor::packed(&pixels, 16, 9))
                .unwrap();
        }

        let written = factory.recorder.written();
        assert_eq!(
            written,
            [
                (StreamType::Video, Some(0)),
                (StreamType::Video, Some(400_000)),
                (StreamType::Video, Some(800_000)),
            ]
        );
        assert_eq!(session.stats().video_frames, 3);
    }

    #[test]
    fn explicit_video_timestamps_pass_through() {
        let factory = RecordingFactory::new(1024);
        let session = session(&factory);
        let pixels = vec![0u8; 16 * 9 * 4];

        session
            .feed_video_frame(&FrameDescriptor::packed(&pixels, 16, 9).with_timestamp(123_456))
            .unwrap();

        assert_eq!(
            factory.recorder.events()[0],
            Event::Video {
                width: 16,
                height: 9,
                pts: Some(123_456)
            }
        );
    }

    #[test]
    fn clipped_frames_reach_the_codec_letterboxed() {
        let factory = RecordingFactory::new(1024);
        let session = EncoderSession::new(
            config().with_clip(ClipRect::new(0, 10, 0, 10)),
            &EncoderConfig::default(),
            &factory,
        )
        .unwrap();
        let pixels = vec![0u8; 20 * 20 * 4];

        session
            .feed_video_frame(&FrameDescriptor::packed(&pixels, 20, 20))
            .unwrap();

        // 10x10 into 16:9: 10 * 32 / 18 = 17 wide
        assert!(matches!(
            factory.recorder.events()[0],
            Event::Video {
                width: 17,
                height: 10,
                ..
            }
        ));
    }

    #[test]
    fn audio_is_paced_into_codec_frames() {
        let factory = RecordingFactory::new(1024);
        let session = session(&factory);

        session.feed_audio(&[0; 100], -1).unwrap();
        session.feed_audio(&[0; 3000], -1).unwrap();
        assert!(factory.recorder.events().is_empty());

        session.feed_audio(&[0; 1000], -1).unwrap();
        assert_eq!(
            factory.recorder.events()[0],
            Event::Audio {
                samples: 1024,
                pts: Some(0),
                time_base: Rational::new(1, 48000),
            }
        );
        assert_eq!(session.stats().audio_frames, 1);
    }

    #[test]
    fn invalid_frames_are_dropped_and_the_session_continues() {
        let factory = RecordingFactory::new(1024);
        let session = session(&factory);
        let short = vec![0u8; 10];
        let pixels = vec![0u8; 16 * 9 * 4];

        let err = session
            .feed_video_frame(&FrameDescriptor::packed(&short, 16, 9))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFrame(_)));

        factory.recorder.set_fail_video(true);
        let err = session
            .feed_video_frame(&FrameDescriptor::packed(&pixels, 16, 9))
            .unwrap_err();
        assert!(matches!(err, Error::Codec(_)));
        factory.recorder.set_fail_video(false);

        session
            .feed_video_frame(&FrameDescriptor::packed(&pixels, 16, 9))
            .unwrap();

        let stats = session.stats();
        assert_eq!(stats.dropped, 2);
        assert_eq!(stats.video_frames, 1);
        // the dropped frames did not consume an index
        assert_eq!(factory.recorder.written(), [(StreamType::Video, Some(0))]);
    }

    #[test]
    fn write_failures_do_not_stop_the_session() {
        let factory = RecordingFactory::new(1024);
        let session = session(&factory);
        let pixels = vec![0u8; 16 * 9 * 4];
        let frame = FrameDescriptor::packed(&pixels, 16, 9);

        factory.recorder.set_fail_writes(true);
        let err = session.feed_video_frame(&frame).unwrap_err();
        assert!(matches!(err, Error::BackendWriteFailure(_)));

        factory.recorder.set_fail_writes(false);
        session.feed_video_frame(&frame).unwrap();

        let stats = session.stats();
        assert_eq!(stats.video_frames, 2);
        assert_eq!(stats.packets_written, 1);
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn flush_drains_audio_then_video_then_finishes_once() {
        let factory = RecordingFactory::new(1024);
        let session = session(&factory);
        session.feed_audio(&[0; 5000], -1).unwrap();

        session.flush_frames().unwrap();

        let events = factory.recorder.events();
        let position = |wanted: &Event| events.iter().position(|e| e == wanted).unwrap();
        assert!(position(&Event::AudioFlush) < position(&Event::VideoFlush));
        assert_eq!(events.last(), Some(&Event::Finished));
        assert_eq!(
            events.iter().filter(|e| **e == Event::Finished).count(),
            1
        );

        assert!(matches!(session.flush_frames(), Err(Error::Finished)));
        assert!(matches!(session.feed_audio(&[0; 4], -1), Err(Error::Finished)));
        assert!(session.is_finished());
    }

    #[test]
    fn flush_writes_the_trailer_even_when_writes_fail() {
        let factory = RecordingFactory::new(1024);
        let session = session(&factory);
        session.feed_audio(&[0; 5000], -1).unwrap();

        factory.recorder.set_fail_writes(true);
        let err = session.flush_frames().unwrap_err();
        assert!(matches!(err, Error::BackendWriteFailure(_)));

        let events = factory.recorder.events();
        assert!(events.contains(&Event::AudioFlush));
        assert!(events.contains(&Event::VideoFlush));
        assert_eq!(events.last(), Some(&Event::Finished));
        // one drained packet per codec could not be written
        assert_eq!(session.stats().dropped, 2);

        assert!(matches!(session.flush_frames(), Err(Error::Finished)));
    }

    #[test]
    fn submissions_queued_behind_a_flush_are_rejected() {
        let factory = RecordingFactory::new(1024);
        let session = session(&factory);
        let pixels = vec![0u8; 16 * 9 * 4];

        let guard = session.video.lock();
        std::thread::scope(|scope| {
            let feeder =
                scope.spawn(|| session.feed_video_frame(&FrameDescriptor::packed(&pixels, 16, 9)));
            let flusher = scope.spawn(|| session.flush_frames());

            while !session.is_finished() {
                std::thread::yield_now();
            }
            drop(guard);

            assert!(matches!(feeder.join().unwrap(), Err(Error::Finished)));
            flusher.join().unwrap().unwrap();
        });

        let events = factory.recorder.events();
        assert!(!events.iter().any(|e| matches!(e, Event::Video { .. })));
        assert_eq!(events.last(), Some(&Event::Finished));
        assert_eq!(session.stats().video_frames, 0);
    }

    #[test]
    fn unconvertible_codec_sample_format_is_rejected() {
        let factory = RecordingFactory::new(1024).with_sample_format(SampleFormat::U8);
        let err = EncoderSession::new(config(), &EncoderConfig::default(), &factory).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn volume_changes_reach_the_pacer() {
        let factory = RecordingFactory::new(1);
        let session = EncoderSession::new(
            config(),
            &EncoderConfig::default().with_volume(512),
            &factory,
        )
        .unwrap();
        assert_eq!(session.audio.lock().pacer.volume(), 512);

        session.set_volume(128);
        assert_eq!(session.audio.lock().pacer.volume(), 128);
    }

    #[test]
    fn zero_frame_size_reports_not_ready() {
        let factory = RecordingFactory::new(0);
        let session = session(&factory);
        assert!(matches!(
            session.feed_audio(&[0; 64], -1),
            Err(Error::NotReady)
        ));
        assert_eq!(session.stats().dropped, 1);
    }

    #[test]
    fn audio_and_video_from_two_threads() {
        let factory = RecordingFactory::new(256);
        let session = Arc::new(session(&factory));

        let video = {
            let session = Arc::clone(&session);
            std::thread::spawn(move || {
                let pixels = vec![0u8; 16 * 9 * 4];
                for _ in 0..50 {
                    session
                        .feed_video_frame(&FrameDescriptor::packed(&pixels, 16, 9))
                        .unwrap();
                }
            })
        };
        let audio = {
            let session = Arc::clone(&session);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    session.feed_audio(&[0; 1024], -1).unwrap();
                }
            })
        };
        video.join().unwrap();
        audio.join().unwrap();

        let written = factory.recorder.written();
        let video_pts: Vec<_> = written
            .iter()
            .filter(|(s, _)| *s == StreamType::Video)
            .map(|(_, pts)| pts.unwrap())
            .collect();
        let audio_pts: Vec<_> = written
            .iter()
            .filter(|(s, _)| *s == StreamType::Audio)
            .map(|(_, pts)| pts.unwrap())
            .collect();

        assert_eq!(video_pts.len(), 50);
        assert_eq!(audio_pts.len(), 50);
        assert!(video_pts.windows(2).all(|w| w[0] < w[1]));
        assert!(audio_pts.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn failed_backend_creates_no_session() {
        let factory = RecordingFactory::failing();
        let err = EncoderSession::new(config(), &EncoderConfig::default(), &factory).unwrap_err();
        assert!(matches!(err, Error::AllocationFailure(_)));
    }
}
