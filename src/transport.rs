use std::time::Duration;

use tokio::sync::mpsc;

use lingua_live_types::audio::Base64EncodedAudioBytes;
use lingua_live_types::events::MediaChunk;
use lingua_live_types::session::LiveConfig;
use lingua_live_types::ServerEvent;

use crate::client;
use crate::error::EngineError;

const SETUP_ACK_TIMEOUT: Duration = Duration::from_secs(10);
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Inbound session events as the lifecycle manager consumes them, one at a
/// time in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Transcript fragment of the user's own speech.
    InputTranscription(String),
    /// Transcript fragment of the agent's speech.
    OutputTranscription(String),
    /// One inline audio payload from the agent's turn.
    Audio(Base64EncodedAudioBytes),
    /// The current turn finished; partial transcript lines settle.
    TurnComplete,
    /// The transport reported an error. Fatal to the attempt.
    Error(String),
    /// The connection ended.
    Closed,
}

/// An open duplex session. Exclusively owned by the lifecycle manager.
#[async_trait::async_trait]
pub trait LiveSession: Send {
    async fn send_audio(&mut self, chunk: MediaChunk) -> Result<(), EngineError>;
    async fn close(&mut self) -> Result<(), EngineError>;
}

/// Opens duplex sessions. The returned receiver yields inbound events until
/// the session closes; the handle is not returned before the service has
/// acknowledged the setup, so capture never starts into an unready session.
#[async_trait::async_trait]
pub trait LiveTransport: Send {
    async fn open(
        &mut self,
        config: LiveConfig,
    ) -> Result<(Box<dyn LiveSession>, mpsc::Receiver<SessionEvent>), EngineError>;
}

/// Websocket-backed transport for the live API.
pub struct WsTransport {
    config: client::Config,
    capacity: usize,
}

impl WsTransport {
    pub fn new(config: client::Config) -> Self {
        Self {
            config,
            capacity: 1024,
        }
    }
}

struct WsSession {
    client: client::Client,
}

#[async_trait::async_trait]
impl LiveSession for WsSession {
    async fn send_audio(&mut self, chunk: MediaChunk) -> Result<(), EngineError> {
        self.client.send_audio(chunk).await
    }

    async fn close(&mut self) -> Result<(), EngineError> {
        self.client.close().await;
        Ok(())
    }
}

#[async_trait::async_trait]
impl LiveTransport for WsTransport {
    async fn open(
        &mut self,
        config: LiveConfig,
    ) -> Result<(Box<dyn LiveSession>, mpsc::Receiver<SessionEvent>), EngineError> {
        let mut client =
            client::connect_with_config(self.capacity, self.config.clone()).await?;
        let mut server_rx = client.server_events()?;
        client.setup(config.into_setup()).await?;

        wait_for_setup_ack(&mut server_rx).await?;
        tracing::info!("live session established");

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            translate_events(server_rx, events_tx).await;
        });

        Ok((Box::new(WsSession { client }), events_rx))
    }
}

async fn wait_for_setup_ack(server_rx: &mut client::ServerRx) -> Result<(), EngineError> {
    let ack = tokio::time::timeout(SETUP_ACK_TIMEOUT, async {
        loop {
            match server_rx.recv().await {
                Ok(ServerEvent::SetupComplete(_)) => return Ok(()),
                Ok(other) => {
                    tracing::debug!("event before setup ack, skipping: {:?}", other);
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("event stream lagged by {} messages", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    return Err(EngineError::Config(
                        "connection closed before setup was acknowledged".to_string(),
                    ));
                }
            }
        }
    })
    .await;
    match ack {
        Ok(result) => result,
        Err(_) => Err(EngineError::Config(
            "timed out waiting for setup acknowledgement".to_string(),
        )),
    }
}

/// Flatten wire messages into the engine's event stream. Field order within
/// one `serverContent` message matters: transcription fragments and the turn
/// boundary are applied before any audio payload it carries.
async fn translate_events(
    mut server_rx: client::ServerRx,
    events_tx: mpsc::Sender<SessionEvent>,
) {
    loop {
        match server_rx.recv().await {
            Ok(ServerEvent::ServerContent(content)) => {
                let mut out = Vec::new();
                if let Some(transcription) = content.output_transcription {
                    out.push(SessionEvent::OutputTranscription(transcription.text));
                }
                if let Some(transcription) = content.input_transcription {
                    out.push(SessionEvent::InputTranscription(transcription.text));
                }
                if content.turn_complete == Some(true) {
                    out.push(SessionEvent::TurnComplete);
                }
                if let Some(turn) = content.model_turn {
                    for part in turn.parts {
                        if let Some(blob) = part.inline_data {
                            out.push(SessionEvent::Audio(blob.data));
                        }
                    }
                }
                for event in out {
                    if events_tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
            Ok(ServerEvent::SetupComplete(_)) => {
                tracing::debug!("duplicate setup acknowledgement, ignoring");
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("event stream lagged by {} messages", n);
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                let _ = events_tx.send(SessionEvent::Closed).await;
                return;
            }
        }
    }
}
