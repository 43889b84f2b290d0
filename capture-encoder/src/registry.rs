/*!
    Owning handles for capture sessions.
*/

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::backend::BackendFactory;
use crate::config::{EncoderConfig, SessionConfig};
use crate::error::{Error, Result};
use crate::geometry::FrameDescriptor;
use crate::preset::{self, CpuCapabilities};
use crate::session::{EncoderSession, SessionStats};

/**
    Opaque handle to a session owned by a [`SessionRegistry`].
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/**
    Creates, looks up and destroys capture sessions.

    Sessions are handed out as `Arc`s: destroying a session only drops the
    registry's reference, so a call already running on another thread
    finishes normally and the session is released after it returns.

    The encoder preset is decided at most once per registry, by
    [`benchmark_and_configure`](Self::benchmark_and_configure). Sessions
    created before that use the default configuration.
*/
pub struct SessionRegistry {
    factory: Arc<dyn BackendFactory>,
    cpu: Box<dyn CpuCapabilities>,
    encoder_config: OnceLock<EncoderConfig>,
    sessions: RwLock<HashMap<SessionId, Arc<EncoderSession>>>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new(factory: impl BackendFactory + 'static) -> Self {
        Self::with_factory(Arc::new(factory))
    }

    pub fn with_factory(factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            factory,
            cpu: preset::cpu::detect(),
            encoder_config: OnceLock::new(),
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /**
        Use a specific CPU provider for the benchmark.
    */
    pub fn with_cpu_capabilities(mut self, cpu: impl CpuCapabilities + 'static) -> Self {
        self.cpu = Box::new(cpu);
        self
    }

    // ── Configuration ────────────────────────────────────────────────────

    /**
        Benchmark the CPU and fix the encoder configuration.

        Only the first call probes; later calls return the same result.
    */
    pub fn benchmark_and_configure(&self) -> EncoderConfig {
        self.encoder_config
            .get_or_init(|| {
                let selection = preset::select_preset(self.cpu.as_ref());
                EncoderConfig::default().with_preset(selection.tier)
            })
            .clone()
    }

    /**
        Configuration new sessions will use.
    */
    pub fn encoder_config(&self) -> EncoderConfig {
        self.encoder_config.get().cloned().unwrap_or_default()
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /**
        Open a session. Nothing is registered if the backend fails.
    */
    pub fn create(&self, config: SessionConfig) -> Result<SessionId> {
        let encoder_config = self.encoder_config();
        let session = EncoderSession::new(config, &encoder_config, self.factory.as_ref())?;

        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.sessions.write().insert(id, Arc::new(session));

        info!(session = %id, "session registered");
        Ok(id)
    }

    pub fn session(&self, id: SessionId) -> Result<Arc<EncoderSession>> {
        self.sessions
            .read()
            .get(&id)
            .cloned()
            .ok_or(Error::UnknownSession(id))
    }

    /**
        Release the registry's handle. Flush first for a playable file.
    */
    pub fn destroy(&self, id: SessionId) -> Result<()> {
        let session = self
            .sessions
            .write()
            .remove(&id)
            .ok_or(Error::UnknownSession(id))?;

        debug!(session = %id, finished = session.is_finished(), "session destroyed");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    // ── Submission ───────────────────────────────────────────────────────

    pub fn feed_video_frame(&self, id: SessionId, frame: &FrameDescriptor<'_>) -> Result<()> {
        self.session(id)?.feed_video_frame(frame)
    }

    /**
        Submit PCM. A negative timestamp means unknown.
    */
    pub fn feed_audio(&self, id: SessionId, data: &[u8], timestamp: i64) -> Result<()> {
        self.session(id)?.feed_audio(data, timestamp)
    }

    pub fn flush_frames(&self, id: SessionId) -> Result<()> {
        self.session(id)?.flush_frames()
    }

    pub fn set_volume(&self, id: SessionId, volume: i32) -> Result<()> {
        self.session(id)?.set_volume(volume);
        Ok(())
    }

    pub fn stats(&self, id: SessionId) -> Result<SessionStats> {
        Ok(self.session(id)?.stats())
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .field("encoder_config", &self.encoder_config.get())
            .finish_non_exhaustive()
    }
}
