use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use lingua_live_types::events::{MediaChunk, RealtimeInputEvent, SetupEvent};
use lingua_live_types::{ClientEvent, ServerEvent};

use crate::error::EngineError;

mod consts;
mod config;
mod utils;

pub use config::Config;

pub type ClientTx = tokio::sync::mpsc::Sender<ClientEvent>;
type ServerTx = tokio::sync::broadcast::Sender<ServerEvent>;
pub type ServerRx = tokio::sync::broadcast::Receiver<ServerEvent>;

/// A live duplex connection: one task serializing outbound events, one task
/// fanning inbound events out to subscribers.
pub struct Client {
    capacity: usize,
    config: Config,
    c_tx: Option<ClientTx>,
    s_tx: Option<ServerTx>,
    send_handle: Option<tokio::task::JoinHandle<()>>,
    recv_handle: Option<tokio::task::JoinHandle<()>>,
}

impl Client {
    fn new(capacity: usize, config: Config) -> Self {
        Self {
            capacity,
            config,
            c_tx: None,
            s_tx: None,
            send_handle: None,
            recv_handle: None,
        }
    }

    async fn connect(&mut self) -> Result<(), EngineError> {
        if self.c_tx.is_some() {
            return Err(EngineError::Config("already connected".to_string()));
        }

        let request = utils::build_request(&self.config)
            .map_err(|e| EngineError::Config(e.to_string()))?;
        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| EngineError::Config(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();

        let (c_tx, mut c_rx) = tokio::sync::mpsc::channel::<ClientEvent>(self.capacity);
        let (s_tx, _) = tokio::sync::broadcast::channel(self.capacity);

        self.c_tx = Some(c_tx);
        self.s_tx = Some(s_tx.clone());

        self.send_handle = Some(tokio::spawn(async move {
            while let Some(event) = c_rx.recv().await {
                match serde_json::to_string(&event) {
                    Ok(text) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            tracing::error!("failed to send message: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("failed to serialize event: {}", e);
                    }
                }
            }
            // Sender side dropped: finish the close handshake best-effort.
            if let Err(e) = write.send(Message::Close(None)).await {
                tracing::debug!("failed to send close frame: {}", e);
            }
        }));

        self.recv_handle = Some(tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let message = match message {
                    Err(e) => {
                        tracing::error!("failed to read message: {}", e);
                        break;
                    }
                    Ok(message) => message,
                };
                match message {
                    Message::Text(text) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            if s_tx.send(event).is_err() {
                                tracing::debug!("no subscribers left, dropping event");
                            }
                        }
                        Err(e) => {
                            tracing::error!("failed to deserialize event: {}, text=> {:?}", e, text);
                        }
                    },
                    // The service may frame JSON messages as binary.
                    Message::Binary(bin) => match serde_json::from_slice::<ServerEvent>(&bin) {
                        Ok(event) => {
                            if s_tx.send(event).is_err() {
                                tracing::debug!("no subscribers left, dropping event");
                            }
                        }
                        Err(e) => {
                            tracing::error!("failed to deserialize binary event: {}", e);
                        }
                    },
                    Message::Close(reason) => {
                        tracing::info!("connection closed: {:?}", reason);
                        break;
                    }
                    _ => {}
                }
            }
        }));
        Ok(())
    }

    pub fn server_events(&self) -> Result<ServerRx, EngineError> {
        match self.s_tx {
            Some(ref tx) => Ok(tx.subscribe()),
            None => Err(EngineError::Transport("not connected yet".to_string())),
        }
    }

    async fn send_client_event(&mut self, event: ClientEvent) -> Result<(), EngineError> {
        match self.c_tx {
            Some(ref tx) => tx
                .send(event)
                .await
                .map_err(|e| EngineError::Transport(e.to_string())),
            None => Err(EngineError::Transport("not connected yet".to_string())),
        }
    }

    /// Send the initial session configuration.
    pub async fn setup(&mut self, setup: SetupEvent) -> Result<(), EngineError> {
        self.send_client_event(ClientEvent::Setup(setup)).await
    }

    /// Push one encoded microphone chunk into the outbound channel.
    pub async fn send_audio(&mut self, chunk: MediaChunk) -> Result<(), EngineError> {
        let event = ClientEvent::RealtimeInput(RealtimeInputEvent {
            media_chunks: vec![chunk],
        });
        self.send_client_event(event).await
    }

    /// Close the connection. Local resources are released even if the remote
    /// side never completes the close handshake.
    pub async fn close(&mut self) {
        self.c_tx = None;
        if let Some(handle) = self.send_handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!("send task ended abnormally: {}", e);
            }
        }
        if let Some(handle) = self.recv_handle.take() {
            handle.abort();
        }
        self.s_tx = None;
    }
}

pub async fn connect_with_config(capacity: usize, config: Config) -> Result<Client, EngineError> {
    let mut client = Client::new(capacity, config);
    client.connect().await?;
    Ok(client)
}

pub async fn connect() -> Result<Client, EngineError> {
    connect_with_config(1024, Config::new()).await
}
