//! Driver spawns and runs the packetizer session task

use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::bitstream::{NalReader, SourceCursor};
use crate::framer::FrameTagger;
use crate::sink::FrameSink;
use crate::source::ByteSource;
use crate::types::{NalUnit, ParameterSets, VideoFrame};
use crate::{PacketizerConfig, PacketizerError, Result};

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketizerState {
    /// No session has run yet
    Idle,
    /// Discarding the container header
    SkippingHeader,
    /// Extracting and emitting NAL units
    Streaming,
    /// Scanning for framing after an implausible length
    Resyncing,
    /// The session task has exited
    Stopped,
}

/// Why a session ended without a fatal error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `stop` was requested
    Cancelled,
    /// The source ran out of bytes
    EndOfStream,
    /// The frame sink went away
    SinkClosed,
}

/// Summary returned when a session ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// Frames accepted by the sink, configuration frames included
    pub frames_emitted: u64,
    /// Keyframes accepted by the sink
    pub keyframes: u64,
    /// Configuration frames accepted by the sink (at most one)
    pub configuration_frames: u64,
    /// Successful resynchronizations
    pub resyncs: u64,
    /// Source errors tolerated by the loop
    pub source_errors: u64,
    /// Frames the sink rejected
    pub sink_errors: u64,
    /// Zero-length units skipped
    pub empty_units: u64,
    /// Bytes consumed from the source
    pub bytes_read: u64,
    /// How the session ended
    pub stop_reason: StopReason,
}

/// Handle to a spawned session
pub struct DriverHandle {
    /// Session task; resolves to the report or the fatal error
    pub task: JoinHandle<Result<SessionReport>>,
    /// Cancellation token for graceful shutdown
    pub cancel: CancellationToken,
}

/// Driver spawns the session task that owns the source and the sink
pub struct Driver;

impl Driver {
    /// Spawn a session task
    ///
    /// Parameter sets are read from `params` when the first keyframe arrives.
    /// State transitions are published on `state`.
    pub fn spawn<S, K>(
        source: S,
        sink: K,
        config: Arc<PacketizerConfig>,
        params: watch::Receiver<Option<Arc<ParameterSets>>>,
        state: Arc<watch::Sender<PacketizerState>>,
    ) -> DriverHandle
    where
        S: ByteSource,
        K: FrameSink,
    {
        let cancel = CancellationToken::new();
        let session = Session::new(source, sink, config, params, state, cancel.clone());

        let task = tokio::spawn(async move { session.run().await });

        DriverHandle { task, cancel }
    }
}

/// Outcome of handing one frame to the sink
enum Delivery {
    Delivered,
    Failed,
    Stop(StopReason),
}

/// Per-session state, owned by the task and dropped when it exits
struct Session<S, K> {
    reader: NalReader<S>,
    sink: K,
    config: Arc<PacketizerConfig>,
    params: watch::Receiver<Option<Arc<ParameterSets>>>,
    state: Arc<watch::Sender<PacketizerState>>,
    cancel: CancellationToken,
    tagger: FrameTagger,
    configuration_sent: bool,
    frames_emitted: u64,
    keyframes: u64,
    configuration_frames: u64,
    source_errors: u64,
    sink_errors: u64,
    empty_units: u64,
}

impl<S, K> Session<S, K>
where
    S: ByteSource,
    K: FrameSink,
{
    fn new(
        source: S,
        sink: K,
        config: Arc<PacketizerConfig>,
        params: watch::Receiver<Option<Arc<ParameterSets>>>,
        state: Arc<watch::Sender<PacketizerState>>,
        cancel: CancellationToken,
    ) -> Self {
        let reader = NalReader::new(SourceCursor::new(source, cancel.clone()), config.max_nalu_length);
        Self {
            reader,
            sink,
            config,
            params,
            state,
            cancel,
            tagger: FrameTagger::new(),
            configuration_sent: false,
            frames_emitted: 0,
            keyframes: 0,
            configuration_frames: 0,
            source_errors: 0,
            sink_errors: 0,
            empty_units: 0,
        }
    }

    async fn run(mut self) -> Result<SessionReport> {
        info!("H264 packetizer started");

        let result = self.stream().await;
        self.set_state(PacketizerState::Stopped);

        match result {
            Ok(stop_reason) => {
                let report = self.report(stop_reason);
                info!(
                    frames = report.frames_emitted,
                    resyncs = report.resyncs,
                    reason = ?stop_reason,
                    "H264 packetizer stopped"
                );
                Ok(report)
            }
            Err(e) => {
                error!("H264 packetizer failed after {} frames: {}", self.frames_emitted, e);
                Err(e)
            }
        }
    }

    async fn stream(&mut self) -> Result<StopReason> {
        self.set_state(PacketizerState::SkippingHeader);
        match self.reader.skip_header(self.config.marker()).await {
            Ok(_) => {}
            Err(PacketizerError::Cancelled) => return Ok(StopReason::Cancelled),
            Err(e) => {
                error!("Couldn't skip container header: {}", e);
                return Err(e);
            }
        }
        self.set_state(PacketizerState::Streaming);

        let mut error_count = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(StopReason::Cancelled);
            }

            match self.next_unit().await {
                Ok(unit) => {
                    error_count = 0;
                    if let Some(reason) = self.process(unit).await? {
                        return Ok(reason);
                    }
                }
                Err(PacketizerError::Cancelled) => return Ok(StopReason::Cancelled),
                Err(PacketizerError::EndOfStream { expected, received }) => {
                    info!(expected, received, "Source exhausted");
                    return Ok(StopReason::EndOfStream);
                }
                Err(e) if e.is_recoverable() => {
                    error_count += 1;
                    self.source_errors += 1;
                    error!(
                        "Source error ({}/{}): {}",
                        error_count, self.config.max_consecutive_errors, e
                    );

                    if error_count >= self.config.max_consecutive_errors {
                        return Err(PacketizerError::TooManyErrors {
                            count: error_count,
                            last: Box::new(e),
                        });
                    }

                    let backoff = self.config.backoff(error_count);
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Ok(StopReason::Cancelled),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Extract the next unit, publishing the resync substate while recovering
    async fn next_unit(&mut self) -> Result<NalUnit> {
        let prefix = self.reader.read_prefix().await?;
        match self.reader.read_unit(prefix).await {
            Err(PacketizerError::InvalidNaluLength { length, max }) => {
                warn!(length, max, "Packetizer out of sync, trying to recover");
                self.set_state(PacketizerState::Resyncing);
                let unit = self.reader.resync(prefix).await;
                self.set_state(PacketizerState::Streaming);
                unit
            }
            result => result,
        }
    }

    async fn process(&mut self, unit: NalUnit) -> Result<Option<StopReason>> {
        if unit.is_empty() {
            debug!("Skipping zero-length NAL unit");
            self.empty_units += 1;
            return Ok(None);
        }

        let nal_type = unit.nal_type();
        debug!(nal_type = nal_type.as_u8(), length = unit.length(), "NAL unit");

        if unit.is_keyframe() {
            if self.configuration_sent {
                trace!("Configuration already sent");
            } else {
                info!("Sending configuration");
                let record = self.configuration_record()?;
                let checkpoint = self.tagger.clone();
                let frame = self.tagger.configuration(record);
                match self.emit(frame, checkpoint).await {
                    Delivery::Delivered => self.configuration_sent = true,
                    // the keyframe is useless without its configuration; retry at the next one
                    Delivery::Failed => return Ok(None),
                    Delivery::Stop(reason) => return Ok(Some(reason)),
                }
            }
        }

        let checkpoint = self.tagger.clone();
        let frame = self.tagger.nal(unit);
        match self.emit(frame, checkpoint).await {
            Delivery::Delivered | Delivery::Failed => Ok(None),
            Delivery::Stop(reason) => Ok(Some(reason)),
        }
    }

    fn configuration_record(&self) -> Result<Bytes> {
        let params = self.params.borrow().clone();
        let Some(params) = params else {
            error!("Keyframe reached before SPS/PPS were set");
            return Err(PacketizerError::missing_parameter_set("SPS and PPS were never set"));
        };

        params.configuration_record().inspect_err(|e| error!("Invalid SPS or PPS: {}", e))
    }

    /// Hand `frame` to the sink. `checkpoint` is the tagger as it was before
    /// `frame` was tagged; it is restored when the sink rejects the frame, so
    /// timestamps and `previous_frame_size` only follow delivered frames.
    async fn emit(&mut self, frame: VideoFrame, checkpoint: FrameTagger) -> Delivery {
        if frame.body.len() > self.config.mtu {
            trace!(
                size = frame.body.len(),
                mtu = self.config.mtu,
                "Frame exceeds MTU, passing through unsplit"
            );
        }

        let is_configuration = frame.is_configuration;
        let is_keyframe = frame.is_keyframe;

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Delivery::Stop(StopReason::Cancelled),
            result = self.sink.send(frame) => result,
        };

        match result {
            Ok(()) => {
                self.frames_emitted += 1;
                if is_configuration {
                    self.configuration_frames += 1;
                }
                if is_keyframe {
                    self.keyframes += 1;
                }
                Delivery::Delivered
            }
            Err(PacketizerError::Cancelled) => {
                info!("Frame sink closed, shutting down");
                Delivery::Stop(StopReason::SinkClosed)
            }
            Err(e) => {
                self.sink_errors += 1;
                self.tagger = checkpoint;
                warn!("Frame sink error: {}", e);
                Delivery::Failed
            }
        }
    }

    fn set_state(&self, state: PacketizerState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(?previous, ?state, "Packetizer state changed");
        }
    }

    fn report(&self, stop_reason: StopReason) -> SessionReport {
        SessionReport {
            frames_emitted: self.frames_emitted,
            keyframes: self.keyframes,
            configuration_frames: self.configuration_frames,
            resyncs: self.reader.resyncs(),
            source_errors: self.source_errors,
            sink_errors: self.sink_errors,
            empty_units: self.empty_units,
            bytes_read: self.reader.position(),
            stop_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        ChunkedSource, FlakySource, PendingSource, RecordingSink, StreamBuilder, container_header,
        test_parameter_sets,
    };
    use std::io::Cursor;
    use std::time::Duration;

    struct Harness {
        handle: DriverHandle,
        state: Arc<watch::Sender<PacketizerState>>,
        _params: watch::Sender<Option<Arc<ParameterSets>>>,
    }

    fn spawn_with<S: ByteSource>(
        source: S,
        sink: RecordingSink,
        params: Option<ParameterSets>,
        config: PacketizerConfig,
    ) -> Harness {
        let (params_tx, params_rx) = watch::channel(params.map(Arc::new));
        let state = Arc::new(watch::channel(PacketizerState::Idle).0);
        let handle = Driver::spawn(source, sink, Arc::new(config), params_rx, Arc::clone(&state));
        Harness { handle, state, _params: params_tx }
    }

    fn spawn(data: Vec<u8>, sink: RecordingSink, params: Option<ParameterSets>) -> Harness {
        spawn_with(Cursor::new(data), sink, params, PacketizerConfig::default())
    }

    #[tokio::test]
    async fn single_configuration_before_first_keyframe() {
        let _ = tracing_subscriber::fmt::try_init();

        let data = StreamBuilder::with_header().nal(5, 20).nal(1, 8).nal(5, 20).nal(1, 8).nal(5, 20).build();
        let sink = RecordingSink::new();
        let harness = spawn(data, sink.clone(), Some(test_parameter_sets()));

        let report = harness.handle.task.await.unwrap().unwrap();
        assert_eq!(report.stop_reason, StopReason::EndOfStream);
        assert_eq!(report.frames_emitted, 6);
        assert_eq!(report.configuration_frames, 1);
        assert_eq!(report.keyframes, 3);

        let kinds: Vec<(bool, bool)> =
            sink.frames().iter().map(|f| (f.is_configuration, f.is_keyframe)).collect();
        assert_eq!(
            kinds,
            vec![(true, false), (false, true), (false, false), (false, true), (false, false), (false, true)]
        );
        assert_eq!(*harness.state.borrow(), PacketizerState::Stopped);
    }

    #[tokio::test]
    async fn previous_frame_size_chains_in_emission_order() {
        let data = StreamBuilder::with_header().nal(1, 11).nal(5, 30).nal(1, 7).build();
        let sink = RecordingSink::new();
        let harness = spawn(data, sink.clone(), Some(test_parameter_sets()));
        harness.handle.task.await.unwrap().unwrap();

        let frames = sink.frames();
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0].previous_frame_size, 0);
        for pair in frames.windows(2) {
            assert_eq!(pair[1].previous_frame_size as usize, pair[0].body.len());
        }
        // inter frame before any keyframe goes out without configuration
        assert!(!frames[0].is_configuration && !frames[0].is_keyframe);
        assert!(frames[1].is_configuration);
    }

    #[tokio::test]
    async fn keyframe_without_parameter_sets_is_fatal() {
        let data = StreamBuilder::with_header().nal(1, 4).nal(5, 10).build();
        let sink = RecordingSink::new();
        let harness = spawn(data, sink.clone(), None);

        let err = harness.handle.task.await.unwrap().unwrap_err();
        assert!(matches!(err, PacketizerError::MissingParameterSet { .. }));
        assert_eq!(sink.frames().len(), 1, "only the inter frame precedes the failure");
    }

    #[tokio::test]
    async fn empty_parameter_sets_are_fatal_at_keyframe() {
        let data = StreamBuilder::with_header().nal(5, 10).build();
        let sink = RecordingSink::new();
        let harness = spawn(data, sink.clone(), Some(ParameterSets::new(Vec::new(), vec![0x68, 0xCE])));

        let err = harness.handle.task.await.unwrap().unwrap_err();
        assert!(matches!(err, PacketizerError::MissingParameterSet { .. }));
        assert!(sink.frames().is_empty());
    }

    #[tokio::test]
    async fn missing_marker_never_streams() {
        let sink = RecordingSink::new();
        let harness = spawn(b"ftypisom".to_vec(), sink.clone(), Some(test_parameter_sets()));

        let err = harness.handle.task.await.unwrap().unwrap_err();
        assert!(matches!(err, PacketizerError::StreamFormat { .. }));
        assert!(sink.frames().is_empty());
    }

    #[tokio::test]
    async fn corrupted_length_is_recovered_in_loop() {
        let data = StreamBuilder::with_header()
            .nal(5, 12)
            .raw(&[0x7F, 0xFF, 0xFF, 0xFF, 0xE0, 0xE0])
            .nal(1, 9)
            .build();
        let sink = RecordingSink::new();
        let harness = spawn(data, sink.clone(), Some(test_parameter_sets()));

        let report = harness.handle.task.await.unwrap().unwrap();
        assert_eq!(report.resyncs, 1);
        assert_eq!(report.frames_emitted, 3);
        assert_eq!(sink.frames()[2].body.len(), 4 + 9);
    }

    #[tokio::test]
    async fn zero_length_units_are_skipped() {
        let data = StreamBuilder::with_header().nal(1, 0).nal(1, 5).build();
        let sink = RecordingSink::new();
        let harness = spawn(data, sink.clone(), Some(test_parameter_sets()));

        let report = harness.handle.task.await.unwrap().unwrap();
        assert_eq!(report.empty_units, 1);
        assert_eq!(sink.frames().len(), 1);
    }

    #[tokio::test]
    async fn cancel_during_pending_read_emits_nothing_more() {
        let sink = RecordingSink::new();
        let data = StreamBuilder::with_header().nal(1, 5).build();
        let source = ChunkedSource::new(data, 64).pending_at_end();
        let harness = spawn_with(source, sink.clone(), None, PacketizerConfig::default());

        tokio::time::sleep(Duration::from_millis(20)).await;
        harness.handle.cancel.cancel();

        let report = tokio::time::timeout(Duration::from_secs(1), harness.handle.task)
            .await
            .expect("worker should exit promptly")
            .unwrap()
            .unwrap();
        assert_eq!(report.stop_reason, StopReason::Cancelled);
        assert_eq!(sink.frames().len(), 1);
    }

    #[tokio::test]
    async fn cancel_while_skipping_header() {
        let harness = spawn_with(PendingSource, RecordingSink::new(), None, PacketizerConfig::default());
        harness.handle.cancel.cancel();
        let report = harness.handle.task.await.unwrap().unwrap();
        assert_eq!(report.stop_reason, StopReason::Cancelled);
        assert_eq!(report.frames_emitted, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_source_errors_are_tolerated() {
        // both failures land inside the first unit's body, losing framing
        let payload = container_header().len();
        let data = StreamBuilder::with_header().nal(1, 5).nal(1, 5).build();
        let source = FlakySource::new(data, vec![payload + 6, payload + 7]);
        let sink = RecordingSink::new();
        let harness = spawn_with(source, sink.clone(), None, PacketizerConfig::default());

        let report = harness.handle.task.await.unwrap().unwrap();
        assert_eq!(report.source_errors, 2);
        assert_eq!(report.resyncs, 1);
        assert_eq!(report.stop_reason, StopReason::EndOfStream);
        assert_eq!(sink.frames().len(), 1);
        assert_eq!(sink.frames()[0].body.len(), 4 + 5);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_source_errors_exhaust_the_budget() {
        let data = StreamBuilder::with_header().build();
        let failures = vec![data.len(); 20];
        let source = FlakySource::new(data, failures);
        let config = PacketizerConfig { max_consecutive_errors: 3, ..Default::default() };
        let harness = spawn_with(source, RecordingSink::new(), None, config);

        let err = harness.handle.task.await.unwrap().unwrap_err();
        assert!(matches!(err, PacketizerError::TooManyErrors { count: 3, .. }));
    }

    #[tokio::test]
    async fn closed_sink_ends_session() {
        let data = StreamBuilder::with_header().nal(1, 5).nal(1, 5).build();
        let (tx, rx) = tokio::sync::mpsc::channel::<VideoFrame>(1);
        drop(rx);
        let (_params, params_rx) = watch::channel(None);
        let state = Arc::new(watch::channel(PacketizerState::Idle).0);
        let handle =
            Driver::spawn(Cursor::new(data), tx, Arc::new(PacketizerConfig::default()), params_rx, state);

        let report = handle.task.await.unwrap().unwrap();
        assert_eq!(report.stop_reason, StopReason::SinkClosed);
        assert_eq!(report.frames_emitted, 0);
    }

    #[tokio::test]
    async fn failed_configuration_is_retried_at_next_keyframe() {
        let data = StreamBuilder::with_header().nal(5, 6).nal(1, 6).nal(5, 6).build();
        let sink = RecordingSink::failing_first(1);
        let harness = spawn(data, sink.clone(), Some(test_parameter_sets()));

        let report = harness.handle.task.await.unwrap().unwrap();
        assert_eq!(report.sink_errors, 1);
        assert_eq!(report.configuration_frames, 1);

        let kinds: Vec<(bool, bool)> =
            sink.frames().iter().map(|f| (f.is_configuration, f.is_keyframe)).collect();
        assert_eq!(kinds, vec![(false, false), (true, false), (false, true)]);

        // the rejected configuration leaves no trace in the delivered chain
        let frames = sink.frames();
        assert_eq!(frames[0].previous_frame_size, 0);
        assert_eq!(frames[0].timestamp_ms, 0);
        for pair in frames.windows(2) {
            assert_eq!(pair[1].previous_frame_size as usize, pair[0].body.len());
        }
    }

    #[tokio::test]
    async fn rejected_frame_does_not_advance_the_chain() {
        let data = StreamBuilder::with_header().nal(1, 30).nal(1, 7).nal(1, 12).build();
        let sink = RecordingSink::failing_first(1);
        let harness = spawn(data, sink.clone(), None);

        let report = harness.handle.task.await.unwrap().unwrap();
        assert_eq!(report.sink_errors, 1);
        assert_eq!(report.frames_emitted, 2);

        let sizes: Vec<(u32, usize)> =
            sink.frames().iter().map(|f| (f.previous_frame_size, f.body.len())).collect();
        assert_eq!(sizes, vec![(0, 4 + 7), (4 + 7, 4 + 12)]);
    }
}
