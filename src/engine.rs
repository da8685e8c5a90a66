use std::time::Duration;

use tokio::sync::{mpsc, watch};

use lingua_live_types::audio::pcm_mime_type;
use lingua_live_types::events::MediaChunk;
use lingua_live_types::session::LiveConfig;
use lingua_live_types::{ConversationState, Speaker, TranscriptEntry};
use lingua_live_utils as utils;

use crate::capture::{FrameAssembler, MicSource, FRAME_SAMPLES};
use crate::error::EngineError;
use crate::scheduler::PlaybackScheduler;
use crate::transcript::TranscriptLog;
use crate::transport::{LiveSession, LiveTransport, SessionEvent};

/// A hang while closing must not block local cleanup.
const SESSION_CLOSE_TIMEOUT: Duration = Duration::from_secs(3);
const FRAME_CHANNEL_CAPACITY: usize = 64;

/// Everything the engine reacts to, serialized onto one channel so hardware
/// callbacks, transport events and user commands are handled one at a time
/// in arrival order.
#[derive(Debug)]
pub enum EngineEvent {
    Start,
    Stop,
    /// Inbound session event, tagged with the attempt it belongs to.
    Session(u64, SessionEvent),
    /// Raw captured samples, tagged with the attempt they belong to.
    Frame(u64, Vec<f32>),
    /// A scheduled buffer finished playing.
    BufferEnded(u64),
}

/// Read-only view for consumers: current state, transcript and error.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct EngineSnapshot {
    pub state: ConversationState,
    pub transcript: Vec<TranscriptEntry>,
    pub error: Option<String>,
}

pub type Snapshots = watch::Receiver<EngineSnapshot>;

/// Owns the conversation state machine and every resource of one attempt:
/// the session handle, the microphone, and the playback timeline. Teardown
/// is all-or-nothing and runs on every exit path.
pub struct ConversationEngine {
    transport: Box<dyn LiveTransport>,
    mic: Box<dyn MicSource>,
    scheduler: PlaybackScheduler,
    transcript: TranscriptLog,
    config: LiveConfig,
    state: ConversationState,
    error: Option<String>,
    session: Option<Box<dyn LiveSession>>,
    assembler: FrameAssembler,
    input_rate: u32,
    /// Monotonic conversation-attempt counter; events tagged with an older
    /// attempt are stale and ignored.
    attempt: u64,
    /// Weak so the engine itself never keeps its own event channel open;
    /// forwarder tasks hold strong clones only while their source lives.
    events_tx: mpsc::WeakSender<EngineEvent>,
    snapshot_tx: watch::Sender<EngineSnapshot>,
}

impl ConversationEngine {
    pub fn new(
        transport: Box<dyn LiveTransport>,
        mic: Box<dyn MicSource>,
        scheduler: PlaybackScheduler,
        config: LiveConfig,
        events_tx: mpsc::Sender<EngineEvent>,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(EngineSnapshot::default());
        Self {
            transport,
            mic,
            scheduler,
            transcript: TranscriptLog::new(),
            config,
            state: ConversationState::Idle,
            error: None,
            session: None,
            assembler: FrameAssembler::new(FRAME_SAMPLES),
            input_rate: 0,
            attempt: 0,
            events_tx: events_tx.downgrade(),
            snapshot_tx,
        }
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn current_error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        self.transcript.entries()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            state: self.state,
            transcript: self.transcript.entries().to_vec(),
            error: self.error.clone(),
        }
    }

    /// Watch-channel view of the engine for UI consumers.
    pub fn snapshots(&self) -> Snapshots {
        self.snapshot_tx.subscribe()
    }

    /// Begin a conversation attempt. A no-op unless currently idle, so the
    /// microphone and output device stay exclusive to one attempt.
    ///
    /// Order matters: the microphone is acquired first (permission failure
    /// must not leave an opened session behind), then the session; capture
    /// recorded before the service acknowledged setup is discarded.
    pub async fn start(&mut self) -> Result<(), EngineError> {
        if self.state != ConversationState::Idle {
            tracing::debug!("start ignored, conversation already active");
            return Ok(());
        }
        self.error = None;
        self.transcript.clear();
        self.assembler.clear();
        self.attempt += 1;
        let attempt = self.attempt;

        let (frames_tx, mut frames_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        match self.mic.start(frames_tx) {
            Ok(rate) => self.input_rate = rate,
            Err(e) => {
                self.mic.stop();
                self.error = Some(e.to_string());
                tracing::error!("microphone unavailable: {}", e);
                return Err(e);
            }
        }

        match self.transport.open(self.config.clone()).await {
            Ok((session, session_events)) => {
                self.session = Some(session);
                self.spawn_session_forwarder(attempt, session_events);
            }
            Err(e) => {
                self.teardown().await;
                self.error = Some(e.to_string());
                tracing::error!("failed to open live session: {}", e);
                return Err(e);
            }
        }

        // Frames captured while the session was still opening are dropped,
        // not queued.
        while frames_rx.try_recv().is_ok() {}
        self.spawn_frame_forwarder(attempt, frames_rx);

        self.state = ConversationState::Listening;
        tracing::info!("conversation started");
        Ok(())
    }

    /// The single cancellation entry point. Safe in any state, any number
    /// of times; transcript history survives for display and saving.
    pub async fn stop(&mut self) {
        self.teardown().await;
        self.state = ConversationState::Idle;
    }

    async fn teardown(&mut self) {
        if let Some(mut session) = self.session.take() {
            match tokio::time::timeout(SESSION_CLOSE_TIMEOUT, session.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("error closing live session: {}", e),
                Err(_) => tracing::warn!("timed out closing live session"),
            }
        }
        self.mic.stop();
        self.assembler.clear();
        self.scheduler.reset();
    }

    async fn fail(&mut self, message: String) {
        tracing::error!("{}", message);
        self.error = Some(message);
        self.teardown().await;
        self.state = ConversationState::Idle;
    }

    async fn on_session_event(&mut self, attempt: u64, event: SessionEvent) {
        if attempt != self.attempt || self.session.is_none() {
            tracing::debug!("stale session event, ignoring: {:?}", event);
            return;
        }
        match event {
            SessionEvent::OutputTranscription(text) => {
                self.transcript.append(Speaker::Agent, &text);
            }
            SessionEvent::InputTranscription(text) => {
                self.transcript.append(Speaker::User, &text);
            }
            SessionEvent::TurnComplete => self.transcript.turn_complete(),
            SessionEvent::Audio(payload) => match self.scheduler.enqueue(&payload) {
                Ok(_) => self.state = ConversationState::Speaking,
                Err(e) => {
                    // One bad payload never stalls the conversation.
                    tracing::error!("dropping malformed audio payload: {}", e);
                    self.error = Some("Could not play the agent's audio.".to_string());
                    self.state = ConversationState::Listening;
                }
            },
            SessionEvent::Error(message) => {
                self.fail(format!("connection error: {}", message)).await;
            }
            SessionEvent::Closed => {
                self.fail("conversation ended unexpectedly".to_string()).await;
            }
        }
    }

    async fn on_frame(&mut self, attempt: u64, samples: Vec<f32>) {
        if attempt != self.attempt || self.session.is_none() {
            return;
        }
        for frame in self.assembler.push(&samples) {
            let chunk = MediaChunk {
                data: utils::audio::encode(&frame),
                mime_type: pcm_mime_type(self.input_rate),
            };
            if let Some(session) = self.session.as_mut() {
                if let Err(e) = session.send_audio(chunk).await {
                    tracing::warn!("failed to send audio chunk: {}", e);
                }
            }
        }
    }

    fn on_buffer_ended(&mut self, id: u64) {
        if self.scheduler.on_buffer_ended(id) && self.state == ConversationState::Speaking {
            self.state = ConversationState::Listening;
        }
    }

    pub async fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Start => {
                if let Err(e) = self.start().await {
                    tracing::error!("failed to start conversation: {}", e);
                }
            }
            EngineEvent::Stop => self.stop().await,
            EngineEvent::Session(attempt, event) => self.on_session_event(attempt, event).await,
            EngineEvent::Frame(attempt, samples) => self.on_frame(attempt, samples).await,
            EngineEvent::BufferEnded(id) => self.on_buffer_ended(id),
        }
        self.publish();
    }

    /// Drive the engine until the event channel closes, then release all
    /// hardware. Dropping every sender is how an embedding surface going
    /// away tears down a live conversation.
    pub async fn run(mut self, mut events: mpsc::Receiver<EngineEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        self.stop().await;
        self.publish();
    }

    fn publish(&self) {
        let _ = self.snapshot_tx.send(self.snapshot());
    }

    fn spawn_session_forwarder(&self, attempt: u64, mut rx: mpsc::Receiver<SessionEvent>) {
        let Some(tx) = self.events_tx.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if tx.send(EngineEvent::Session(attempt, event)).await.is_err() {
                    break;
                }
            }
        });
    }

    fn spawn_frame_forwarder(&self, attempt: u64, mut rx: mpsc::Receiver<Vec<f32>>) {
        let Some(tx) = self.events_tx.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            while let Some(samples) = rx.recv().await {
                if tx.send(EngineEvent::Frame(attempt, samples)).await.is_err() {
                    break;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::scheduler::{PlaybackSink, ScheduledBuffer};
    use lingua_live_utils::audio;

    #[derive(Clone, Default)]
    struct NullSink {
        stopped: Arc<AtomicBool>,
    }

    impl PlaybackSink for NullSink {
        fn now(&self) -> f64 {
            0.0
        }
        fn play(&mut self, _buffer: &ScheduledBuffer) {}
        fn stop_all(&mut self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Clone, Default)]
    struct SessionProbe {
        sent: Arc<Mutex<Vec<MediaChunk>>>,
        closed: Arc<AtomicBool>,
    }

    struct MockSession {
        probe: SessionProbe,
    }

    #[async_trait::async_trait]
    impl LiveSession for MockSession {
        async fn send_audio(&mut self, chunk: MediaChunk) -> Result<(), EngineError> {
            self.probe.sent.lock().unwrap().push(chunk);
            Ok(())
        }

        async fn close(&mut self) -> Result<(), EngineError> {
            self.probe.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct MockTransport {
        probe: SessionProbe,
        opens: Arc<AtomicUsize>,
        fail_open: bool,
        open_delay: Option<Duration>,
    }

    #[async_trait::async_trait]
    impl LiveTransport for MockTransport {
        async fn open(
            &mut self,
            _config: LiveConfig,
        ) -> Result<(Box<dyn LiveSession>, mpsc::Receiver<SessionEvent>), EngineError> {
            if let Some(delay) = self.open_delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_open {
                return Err(EngineError::Config("invalid api key".to_string()));
            }
            self.opens.fetch_add(1, Ordering::SeqCst);
            let (_tx, rx) = mpsc::channel(16);
            Ok((
                Box::new(MockSession {
                    probe: self.probe.clone(),
                }),
                rx,
            ))
        }
    }

    #[derive(Clone, Default)]
    struct MockMic {
        live: Arc<AtomicBool>,
        deny: bool,
    }

    impl MicSource for MockMic {
        fn start(&mut self, _frames: mpsc::Sender<Vec<f32>>) -> Result<u32, EngineError> {
            if self.deny {
                return Err(EngineError::PermissionDenied(
                    "user declined microphone access".to_string(),
                ));
            }
            self.live.store(true, Ordering::SeqCst);
            Ok(16_000)
        }

        fn stop(&mut self) {
            self.live.store(false, Ordering::SeqCst);
        }
    }

    struct Harness {
        engine: ConversationEngine,
        transport: MockTransport,
        mic: MockMic,
        sink: NullSink,
        events_tx: mpsc::Sender<EngineEvent>,
        events_rx: mpsc::Receiver<EngineEvent>,
    }

    fn harness_with(transport: MockTransport, mic: MockMic) -> Harness {
        let (events_tx, events_rx) = mpsc::channel(256);
        let sink = NullSink::default();
        let scheduler = PlaybackScheduler::new(Box::new(sink.clone()), 24_000.0, 1);
        let config = LiveConfig::builder()
            .with_system_instruction("You are a patient English tutor.")
            .with_input_transcription_enable()
            .with_output_transcription_enable()
            .build();
        let engine = ConversationEngine::new(
            Box::new(transport.clone()),
            Box::new(mic.clone()),
            scheduler,
            config,
            events_tx.clone(),
        );
        Harness {
            engine,
            transport,
            mic,
            sink,
            events_tx,
            events_rx,
        }
    }

    fn harness() -> Harness {
        harness_with(MockTransport::default(), MockMic::default())
    }

    fn half_second_payload() -> String {
        audio::encode(&vec![0.0f32; 12_000])
    }

    #[tokio::test]
    async fn start_transitions_to_listening() {
        let mut h = harness();
        h.engine.start().await.unwrap();
        assert_eq!(h.engine.state(), ConversationState::Listening);
        assert!(h.mic.live.load(Ordering::SeqCst));
        assert_eq!(h.transport.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn start_while_active_is_a_noop() {
        let mut h = harness();
        h.engine.start().await.unwrap();
        h.engine.start().await.unwrap();
        assert_eq!(h.transport.opens.load(Ordering::SeqCst), 1);
        assert_eq!(h.engine.state(), ConversationState::Listening);
    }

    #[tokio::test]
    async fn permission_denied_never_opens_a_session() {
        let mut h = harness_with(MockTransport::default(), MockMic {
            deny: true,
            ..MockMic::default()
        });

        let err = h.engine.start().await.unwrap_err();
        assert!(matches!(err, EngineError::PermissionDenied(_)));
        assert_eq!(h.engine.state(), ConversationState::Idle);
        assert_eq!(h.transport.opens.load(Ordering::SeqCst), 0);
        assert!(!h.mic.live.load(Ordering::SeqCst));
        assert!(h.engine.current_error().unwrap().contains("microphone"));
    }

    #[tokio::test]
    async fn failed_open_releases_the_microphone() {
        let mut h = harness_with(
            MockTransport {
                fail_open: true,
                ..MockTransport::default()
            },
            MockMic::default(),
        );

        let err = h.engine.start().await.unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
        assert_eq!(h.engine.state(), ConversationState::Idle);
        assert!(!h.mic.live.load(Ordering::SeqCst));
        assert!(h.engine.current_error().is_some());
    }

    #[tokio::test]
    async fn agent_deltas_and_turn_complete_settle_one_entry() {
        let mut h = harness();
        h.engine.start().await.unwrap();
        let attempt = h.engine.attempt;

        for delta in ["Hel", "lo", " there"] {
            h.engine
                .on_session_event(attempt, SessionEvent::OutputTranscription(delta.to_string()))
                .await;
        }
        h.engine
            .on_session_event(attempt, SessionEvent::TurnComplete)
            .await;

        let entries = h.engine.transcript();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].speaker, Speaker::Agent);
        assert_eq!(entries[0].text, "Hello there");
        assert!(!entries[0].partial);
    }

    #[tokio::test]
    async fn first_audio_payload_flips_to_speaking_until_drained() {
        let mut h = harness();
        h.engine.start().await.unwrap();
        let attempt = h.engine.attempt;

        h.engine
            .on_session_event(attempt, SessionEvent::Audio(half_second_payload()))
            .await;
        assert_eq!(h.engine.state(), ConversationState::Speaking);

        h.engine.on_buffer_ended(0);
        assert_eq!(h.engine.state(), ConversationState::Listening);
    }

    #[tokio::test]
    async fn malformed_payload_keeps_the_conversation_live() {
        let mut h = harness();
        h.engine.start().await.unwrap();
        let attempt = h.engine.attempt;

        h.engine
            .on_session_event(attempt, SessionEvent::Audio("@@bad@@".to_string()))
            .await;

        assert_eq!(h.engine.state(), ConversationState::Listening);
        assert!(h.engine.current_error().is_some());
        assert!(!h.transport.probe.closed.load(Ordering::SeqCst));
        assert_eq!(h.engine.scheduler.watermark(), 0.0);
    }

    #[tokio::test]
    async fn stop_mid_speaking_releases_everything() {
        let mut h = harness();
        h.engine.start().await.unwrap();
        let attempt = h.engine.attempt;

        h.engine
            .on_session_event(attempt, SessionEvent::InputTranscription("Hola".to_string()))
            .await;
        h.engine
            .on_session_event(attempt, SessionEvent::Audio(half_second_payload()))
            .await;
        assert_eq!(h.engine.state(), ConversationState::Speaking);

        h.engine.stop().await;

        assert_eq!(h.engine.state(), ConversationState::Idle);
        assert!(h.sink.stopped.load(Ordering::SeqCst));
        assert_eq!(h.engine.scheduler.watermark(), 0.0);
        assert!(h.transport.probe.closed.load(Ordering::SeqCst));
        assert!(!h.mic.live.load(Ordering::SeqCst));
        // History survives teardown for display and saving.
        assert_eq!(h.engine.transcript().len(), 1);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let mut h = harness();
        h.engine.start().await.unwrap();
        h.engine.stop().await;
        h.engine.stop().await;
        assert_eq!(h.engine.state(), ConversationState::Idle);
    }

    #[tokio::test]
    async fn unexpected_close_surfaces_an_error_and_idles() {
        let mut h = harness();
        h.engine.start().await.unwrap();
        let attempt = h.engine.attempt;

        h.engine.on_session_event(attempt, SessionEvent::Closed).await;

        assert_eq!(h.engine.state(), ConversationState::Idle);
        assert!(h.engine.current_error().is_some());
        assert!(!h.mic.live.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn stale_events_from_a_previous_attempt_are_ignored() {
        let mut h = harness();
        h.engine.start().await.unwrap();
        let old_attempt = h.engine.attempt;
        h.engine.stop().await;
        h.engine.start().await.unwrap();

        h.engine
            .on_session_event(old_attempt, SessionEvent::Audio(half_second_payload()))
            .await;

        assert_eq!(h.engine.state(), ConversationState::Listening);
        assert_eq!(h.engine.scheduler.watermark(), 0.0);
    }

    #[tokio::test]
    async fn captured_frames_are_encoded_and_sent() {
        let mut h = harness();
        h.engine.start().await.unwrap();
        let attempt = h.engine.attempt;

        h.engine.on_frame(attempt, vec![0.1; FRAME_SAMPLES]).await;

        let sent = h.transport.probe.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].mime_type, "audio/pcm;rate=16000");
        assert!(!sent[0].data.is_empty());
    }

    #[tokio::test]
    async fn frames_without_a_session_are_dropped() {
        let mut h = harness();
        h.engine.on_frame(0, vec![0.1; FRAME_SAMPLES]).await;
        assert!(h.transport.probe.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn error_is_cleared_by_the_next_start() {
        let mut h = harness();
        h.engine.start().await.unwrap();
        let attempt = h.engine.attempt;
        h.engine
            .on_session_event(attempt, SessionEvent::Error("boom".to_string()))
            .await;
        assert!(h.engine.current_error().is_some());
        assert_eq!(h.engine.state(), ConversationState::Idle);

        h.engine.start().await.unwrap();
        assert!(h.engine.current_error().is_none());
        assert_eq!(h.engine.state(), ConversationState::Listening);
    }

    #[tokio::test]
    async fn stop_during_opening_still_resolves_to_idle() {
        let h = harness_with(
            MockTransport {
                open_delay: Some(Duration::from_millis(50)),
                ..MockTransport::default()
            },
            MockMic::default(),
        );
        let Harness {
            engine,
            transport,
            mic,
            events_tx,
            events_rx,
            ..
        } = h;
        let mut snapshots = engine.snapshots();
        let driver = tokio::spawn(engine.run(events_rx));

        events_tx.send(EngineEvent::Start).await.unwrap();
        events_tx.send(EngineEvent::Stop).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let snapshot = snapshots.borrow_and_update().clone();
        assert_eq!(snapshot.state, ConversationState::Idle);
        // The opening resolved and the resulting session was closed, not
        // left orphaned.
        assert_eq!(transport.opens.load(Ordering::SeqCst), 1);
        assert!(transport.probe.closed.load(Ordering::SeqCst));
        assert!(!mic.live.load(Ordering::SeqCst));

        drop(events_tx);
        driver.await.unwrap();
    }
}
