//! Packetizer control surface

use bytes::Bytes;
use futures::Stream;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinError;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

use crate::driver::{Driver, DriverHandle, PacketizerState, SessionReport};
use crate::sink::FrameSink;
use crate::source::ByteSource;
use crate::types::{ParameterSets, hex_preview};
use crate::{PacketizerConfig, PacketizerError, Result};

/// Owns the worker session and the shared parameter sets
///
/// Sessions run on the tokio runtime: [`start`](Self::start) must be called
/// from within one. Dropping the packetizer cancels a running session.
pub struct Packetizer {
    config: Arc<PacketizerConfig>,

    /// SPS/PPS shared with the worker, last writer wins
    params: watch::Sender<Option<Arc<ParameterSets>>>,

    /// Session state, shared with the worker
    state: Arc<watch::Sender<PacketizerState>>,

    worker: Option<DriverHandle>,
}

impl Packetizer {
    /// Create an idle packetizer
    pub fn new(config: PacketizerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    /// Create an idle packetizer with default tunables
    pub fn with_defaults() -> Self {
        Self::from_validated(PacketizerConfig::default())
    }

    fn from_validated(config: PacketizerConfig) -> Self {
        let (params, _) = watch::channel(None);
        let (state, _) = watch::channel(PacketizerState::Idle);

        Self { config: Arc::new(config), params, state: Arc::new(state), worker: None }
    }

    /// Configuration handed to every session
    pub fn config(&self) -> &PacketizerConfig {
        &self.config
    }

    /// Provide the SPS and PPS used for the configuration record
    ///
    /// May be called before or during a session. The worker reads the latest
    /// pair when it reaches its first keyframe.
    pub fn set_parameter_sets(&self, sps: impl Into<Bytes>, pps: impl Into<Bytes>) {
        let sets = ParameterSets::new(sps, pps);
        debug!(sps = %hex_preview(&sets.sps, 64), pps = %hex_preview(&sets.pps, 64), "Stream parameters set");
        if !sets.is_complete() {
            warn!("Stream parameters are incomplete; the first keyframe will fail");
        }
        self.params.send_replace(Some(Arc::new(sets)));
    }

    /// Latest parameter sets, if any were provided
    pub fn parameter_sets(&self) -> Option<Arc<ParameterSets>> {
        self.params.borrow().clone()
    }

    /// Start a session reading `source` and delivering to `sink`
    ///
    /// Returns `false` without touching `source` or `sink` if a session is
    /// already running.
    pub fn start<S, K>(&mut self, source: S, sink: K) -> bool
    where
        S: ByteSource,
        K: FrameSink,
    {
        if self.is_running() {
            debug!("Packetizer already running, ignoring start");
            return false;
        }

        if self.worker.take().is_some() {
            debug!("Discarding result of a finished session that was never collected");
        }

        info!("Starting H264 packetizer");
        self.state.send_replace(PacketizerState::Idle);
        self.worker = Some(Driver::spawn(
            source,
            sink,
            Arc::clone(&self.config),
            self.params.subscribe(),
            Arc::clone(&self.state),
        ));
        true
    }

    /// A session is running and has not exited yet
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|worker| !worker.task.is_finished())
    }

    /// Request cancellation and wait up to the configured grace period
    ///
    /// Returns `Ok(None)` if no session was started. When the worker does
    /// not exit in time it is detached and `Timeout` is returned; it still
    /// observes the cancellation and emits nothing further.
    pub async fn stop(&mut self) -> Result<Option<SessionReport>> {
        let Some(mut worker) = self.worker.take() else {
            return Ok(None);
        };

        info!("Stopping H264 packetizer");
        worker.cancel.cancel();

        let grace = self.config.stop_grace();
        match tokio::time::timeout(grace, &mut worker.task).await {
            Ok(joined) => Self::collect(joined).map(Some),
            Err(_) => {
                warn!(?grace, "Packetizer worker did not exit in time, detaching");
                Err(PacketizerError::Timeout { duration: grace })
            }
        }
    }

    /// Wait for the running session to end on its own
    pub async fn wait(&mut self) -> Result<Option<SessionReport>> {
        let Some(worker) = self.worker.take() else {
            return Ok(None);
        };
        Self::collect(worker.task.await).map(Some)
    }

    /// Current session state
    pub fn state(&self) -> PacketizerState {
        *self.state.borrow()
    }

    /// Stream of state changes, starting with the current state
    pub fn state_updates(&self) -> impl Stream<Item = PacketizerState> + 'static {
        WatchStream::new(self.state.subscribe())
    }

    fn collect(joined: std::result::Result<Result<SessionReport>, JoinError>) -> Result<SessionReport> {
        joined.map_err(|e| PacketizerError::Worker { reason: e.to_string() })?
    }
}

impl Drop for Packetizer {
    fn drop(&mut self) {
        if let Some(worker) = &self.worker {
            debug!("Dropping packetizer, cancelling session");
            worker.cancel.cancel();
        }
    }
}
