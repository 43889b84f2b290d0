//! In-memory backend that records every call.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ffmpeg_types::{
    AudioFrame, MediaDuration, Packet, Rational, SampleFormat, StreamType, VideoFrame,
};
use parking_lot::Mutex;

use super::{AudioCodec, BackendFactory, CodecBackend, PacketWriter, VideoCodec};
use crate::config::{EncoderConfig, SessionConfig};
use crate::error::{Error, Result};

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Video { width: u32, height: u32, pts: Option<i64> },
    Audio { samples: usize, pts: Option<i64>, time_base: Rational },
    VideoFlush,
    AudioFlush,
    Written { stream: StreamType, pts: Option<i64> },
    Finished,
}

#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
    fail_writes: Arc<AtomicBool>,
    fail_video: Arc<AtomicBool>,
}

impl Recorder {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn written(&self) -> Vec<(StreamType, Option<i64>)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Written { stream, pts } => Some((stream, pts)),
                _ => None,
            })
            .collect()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_video(&self, fail: bool) {
        self.fail_video.store(fail, Ordering::SeqCst);
    }

    fn push(&self, event: Event) {
        self.events.lock().push(event);
    }
}

fn packet(stream: StreamType, pts: Option<i64>, time_base: Rational) -> Packet {
    Packet {
        data: vec![0; 8],
        pts: pts.map(ffmpeg_types::Pts),
        dts: pts.map(ffmpeg_types::Pts),
        duration: MediaDuration(0),
        time_base,
        is_keyframe: true,
        stream_type: stream,
    }
}

struct RecordingVideo(Recorder);

impl VideoCodec for RecordingVideo {
    fn encode(&mut self, frame: &VideoFrame) -> Result<Vec<Packet>> {
        if self.0.fail_video.load(Ordering::SeqCst) {
            return Err(ffmpeg_types::Error::codec("video encoder rejected frame").into());
        }
        let pts = frame.pts.map(|p| p.0);
        self.0.push(Event::Video {
            width: frame.width,
            height: frame.height,
            pts,
        });
        Ok(vec![packet(StreamType::Video, pts, frame.time_base)])
    }

    fn flush(&mut self) -> Result<Vec<Packet>> {
        self.0.push(Event::VideoFlush);
        Ok(vec![packet(StreamType::Video, None, Rational::new(1, 1))])
    }
}

struct RecordingAudio {
    recorder: Recorder,
    frame_size: usize,
    sample_format: SampleFormat,
    time_base: Rational,
}

impl AudioCodec for RecordingAudio {
    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn sample_format(&self) -> SampleFormat {
        self.sample_format
    }

    fn time_base(&self) -> Rational {
        self.time_base
    }

    fn encode(&mut self, frame: &AudioFrame) -> Result<Vec<Packet>> {
        let pts = frame.pts.map(|p| p.0);
        self.recorder.push(Event::Audio {
            samples: frame.samples,
            pts,
            time_base: frame.time_base,
        });
        Ok(vec![packet(StreamType::Audio, pts, frame.time_base)])
    }

    fn flush(&mut self) -> Result<Vec<Packet>> {
        self.recorder.push(Event::AudioFlush);
        Ok(vec![packet(StreamType::Audio, None, self.time_base)])
    }
}

struct RecordingWriter(Recorder);

impl PacketWriter for RecordingWriter {
    fn write(&mut self, packet: &Packet) -> Result<()> {
        if self.0.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::BackendWriteFailure("disk full".to_string()));
        }
        self.0.push(Event::Written {
            stream: packet.stream_type,
            pts: packet.pts.map(|p| p.0),
        });
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.0.push(Event::Finished);
        Ok(())
    }
}

pub struct RecordingFactory {
    pub recorder: Recorder,
    pub frame_size: usize,
    pub sample_format: SampleFormat,
    pub fail: bool,
}

impl RecordingFactory {
    pub fn new(frame_size: usize) -> Self {
        Self {
            recorder: Recorder::default(),
            frame_size,
            sample_format: SampleFormat::S16,
            fail: false,
        }
    }

    pub fn with_sample_format(mut self, format: SampleFormat) -> Self {
        self.sample_format = format;
        self
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(1024)
        }
    }
}

impl BackendFactory for RecordingFactory {
    fn create(&self, session: &SessionConfig, _encoder: &EncoderConfig) -> Result<CodecBackend> {
        if self.fail {
            return Err(Error::AllocationFailure("no encoder available".to_string()));
        }
        Ok(CodecBackend {
            video: Box::new(RecordingVideo(self.recorder.clone())),
            audio: Box::new(RecordingAudio {
                recorder: self.recorder.clone(),
                frame_size: self.frame_size,
                sample_format: self.sample_format,
                time_base: Rational::new(1, session.audio.sample_rate as i32),
            }),
            writer: Box::new(RecordingWriter(self.recorder.clone())),
        })
    }
}
