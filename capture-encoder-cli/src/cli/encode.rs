use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{info, warn};

use capture_encoder::backend::FfmpegBackendFactory;
use capture_encoder::{
    AudioConfig, ClipRect, FrameDescriptor, SessionConfig, SessionRegistry, TargetVideoSpec,
};
use capture_encoder::Result as SessionResult;
use ffmpeg_types::Rational;

/// Bytes of PCM fed per step when there is no video to pace against.
const AUDIO_ONLY_CHUNK: usize = 4096;

#[derive(Parser, Debug)]
pub struct EncodeCommand {
    /// Output file; the container follows the extension (MPEG-TS if unknown)
    #[arg(short, long)]
    pub output: PathBuf,

    /// Raw BGR0 video, frames stored back to back
    #[arg(long)]
    pub video: Option<PathBuf>,

    /// Width of the raw video frames
    #[arg(long, default_value = "1280")]
    pub width: u32,

    /// Height of the raw video frames
    #[arg(long, default_value = "720")]
    pub height: u32,

    /// Frame rate of the raw video and the output
    #[arg(long, default_value = "30")]
    pub fps: u32,

    /// Output size as WIDTHxHEIGHT (default: the clip or input size)
    #[arg(long, value_parser = parse_size)]
    pub target: Option<(u32, u32)>,

    /// Letterbox to the target aspect ratio
    #[arg(long)]
    pub keep_aspect: bool,

    /// Capture region as TOP,BOTTOM,LEFT,RIGHT
    #[arg(long, value_parser = parse_clip)]
    pub clip: Option<ClipRect>,

    /// Raw frames are stored bottom row first
    #[arg(long)]
    pub flip: bool,

    /// Interleaved signed 16-bit little-endian PCM
    #[arg(long)]
    pub audio: Option<PathBuf>,

    /// Sample rate of the PCM input
    #[arg(long, default_value = "44100")]
    pub sample_rate: u32,

    /// Channel count of the PCM input (1 or 2)
    #[arg(long, default_value = "2")]
    pub channels: u16,

    /// Audio volume, 256 = unchanged
    #[arg(long, default_value = "256")]
    pub volume: i32,

    /// Benchmark the CPU to pick the encoder preset
    #[arg(long)]
    pub benchmark: bool,

    /// Title written into the container metadata
    #[arg(long)]
    pub title: Option<String>,
}

impl EncodeCommand {
    pub fn run(self) -> Result<()> {
        if self.video.is_none() && self.audio.is_none() {
            bail!("nothing to encode: pass --video and/or --audio");
        }
        if self.fps == 0 {
            bail!("--fps must be positive");
        }

        let (target_width, target_height) = self.target.unwrap_or_else(|| match self.clip {
            Some(clip) if clip.is_active() => (clip.width() as u32, clip.height() as u32),
            _ => (self.width, self.height),
        });

        let video_spec = TargetVideoSpec::new(
            target_width,
            target_height,
            Rational::new(self.fps as i32, 1),
        )
        .with_keep_aspect(self.keep_aspect);

        let mut config = SessionConfig::new(
            &self.output,
            AudioConfig::new(self.channels, self.sample_rate),
            video_spec,
        )
        .with_clip(self.clip.unwrap_or_default());
        if let Some(title) = &self.title {
            config = config.with_title(title.clone());
        }

        let registry = SessionRegistry::new(FfmpegBackendFactory);
        if self.benchmark {
            registry.benchmark_and_configure();
        }

        let id = registry.create(config).context("failed to open capture session")?;
        registry.set_volume(id, self.volume)?;

        let mut video = self.video.as_deref().map(open).transpose()?;
        let mut audio = self.audio.as_deref().map(open).transpose()?;

        let frame_bytes = self.width as usize * self.height as usize * 4;
        let audio_step = if video.is_some() {
            (self.sample_rate / self.fps) as usize * self.channels as usize * 2
        } else {
            AUDIO_ONLY_CHUNK
        };

        let mut frame = vec![0u8; frame_bytes];
        let mut pcm = vec![0u8; audio_step];
        let mut rejected = 0u64;

        loop {
            let mut progressed = false;

            if let Some(reader) = video.as_mut() {
                if read_full(reader, &mut frame)? == frame_bytes {
                    let descriptor = FrameDescriptor::packed(&frame, self.width, self.height)
                        .with_flip(self.flip);
                    if !submitted("video", registry.feed_video_frame(id, &descriptor)) {
                        rejected += 1;
                    }
                    progressed = true;
                } else {
                    video = None;
                }
            }

            if let Some(reader) = audio.as_mut() {
                let read = read_full(reader, &mut pcm)?;
                if read > 0 {
                    if !submitted("audio", registry.feed_audio(id, &pcm[..read], -1)) {
                        rejected += 1;
                    }
                    progressed = true;
                }
                if read < pcm.len() {
                    audio = None;
                }
            }

            if !progressed {
                break;
            }
        }

        registry.flush_frames(id)?;
        let stats = registry.stats(id)?;
        registry.destroy(id)?;

        info!(
            output = %self.output.display(),
            video_frames = stats.video_frames,
            audio_frames = stats.audio_frames,
            packets = stats.packets_written,
            dropped = stats.dropped,
            rejected,
            "encode finished"
        );

        Ok(())
    }
}

/**
    Log a rejected submission and carry on; the session has already dropped
    the frame. Returns whether it was accepted.
*/
fn submitted(kind: &str, result: SessionResult<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!(kind, error = %e, "frame dropped");
            false
        }
    }
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    Ok(BufReader::new(file))
}

/**
    Fill `buf` as far as the reader allows, returning the bytes read.
*/
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {:?}", s))?;
    let width = w.trim().parse().map_err(|_| format!("bad width {:?}", w))?;
    let height = h.trim().parse().map_err(|_| format!("bad height {:?}", h))?;
    if width == 0 || height == 0 {
        return Err(format!("size {:?} is empty", s));
    }
    Ok((width, height))
}

fn parse_clip(s: &str) -> Result<ClipRect, String> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<i32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("bad clip {:?}: {}", s, e))?;
    match parts.as_slice() {
        [top, bottom, left, right] => Ok(ClipRect::new(*top, *bottom, *left, *right)),
        _ => Err(format!("expected TOP,BOTTOM,LEFT,RIGHT, got {:?}", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_parse() {
        assert_eq!(parse_size("1280x720"), Ok((1280, 720)));
        assert_eq!(parse_size("640X360"), Ok((640, 360)));
        assert!(parse_size("1280").is_err());
        assert!(parse_size("0x720").is_err());
    }

    #[test]
    fn clips_parse() {
        assert_eq!(parse_clip("10,110,20,220"), Ok(ClipRect::new(10, 110, 20, 220)));
        assert!(parse_clip("10,110,20").is_err());
        assert!(parse_clip("a,b,c,d").is_err());
    }

    #[test]
    fn rejected_frames_do_not_abort() {
        assert!(submitted("video", Ok(())));
        assert!(!submitted(
            "video",
            Err(capture_encoder::Error::InvalidFrame("short buffer".to_string()))
        ));
        assert!(!submitted(
            "audio",
            Err(capture_encoder::Error::BackendWriteFailure("disk full".to_string()))
        ));
    }

    #[test]
    fn short_reads_are_reported() {
        let mut data: &[u8] = &[1, 2, 3];
        let mut buf = [0u8; 8];
        assert_eq!(read_full(&mut data, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
    }

    #[test]
    fn arguments_parse() {
        let args = crate::cli::Args::try_parse_from([
            "capture-encoder",
            "encode",
            "-o",
            "out.mp4",
            "--video",
            "frames.raw",
            "--target",
            "640x360",
            "--clip",
            "0,100,0,200",
            "--keep-aspect",
        ])
        .unwrap();
        let crate::cli::Command::Encode(cmd) = args.command else {
            panic!("expected encode");
        };
        assert_eq!(cmd.target, Some((640, 360)));
        assert_eq!(cmd.clip, Some(ClipRect::new(0, 100, 0, 200)));
        assert!(cmd.keep_aspect);
        assert_eq!(cmd.fps, 30);
    }
}
