/*!
    Sink configuration types.
*/

use std::path::Path;

/**
    Output container format.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ContainerFormat {
    /// MPEG transport stream, the fallback for unknown extensions.
    #[default]
    MpegTs,
    Mp4,
    Matroska,
    Flv,
}

impl ContainerFormat {
    /**
        Pick a container from a file extension.

        Returns `None` when the path has no extension or the extension is not
        one this sink knows.
    */
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "ts" | "m2ts" | "mts" => Some(Self::MpegTs),
            "mp4" | "m4v" | "mov" => Some(Self::Mp4),
            "mkv" => Some(Self::Matroska),
            "flv" => Some(Self::Flv),
            _ => None,
        }
    }

    /**
        FFmpeg muxer short name.
    */
    pub fn muxer_name(&self) -> &'static str {
        match self {
            Self::MpegTs => "mpegts",
            Self::Mp4 => "mp4",
            Self::Matroska => "matroska",
            Self::Flv => "flv",
        }
    }
}

/**
    Configuration for a media sink.
*/
#[derive(Clone, Debug, Default)]
pub struct SinkConfig {
    /// Container to write (None = from the file extension).
    pub format: Option<ContainerFormat>,
    /// Container-level metadata tags.
    pub metadata: Vec<(String, String)>,
    /// Move the MP4 index to the front of the file on finish.
    pub fast_start: bool,
}

impl SinkConfig {
    pub fn with_format(mut self, format: ContainerFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    pub fn with_fast_start(mut self, fast_start: bool) -> Self {
        self.fast_start = fast_start;
        self
    }

    /**
        Container to use for `path`: the configured one, else the extension's,
        else MPEG-TS.
    */
    pub fn resolve_format(&self, path: &Path) -> ContainerFormat {
        self.format
            .or_else(|| ContainerFormat::from_path(path))
            .unwrap_or_default()
    }
}
