mod capture;
mod client;
mod engine;
mod error;
mod scheduler;
mod sink;
mod transcript;
mod transport;

pub use lingua_live_types as types;
pub use lingua_live_utils as utils;

pub use capture::{CpalMicSource, FrameAssembler, MicSource, FRAME_SAMPLES};
pub use client::{connect, connect_with_config, Client, Config, ServerRx};
pub use engine::{ConversationEngine, EngineEvent, EngineSnapshot, Snapshots};
pub use error::EngineError;
pub use scheduler::{PlaybackScheduler, PlaybackSink, ScheduledBuffer};
pub use sink::{build_output_stream, DeviceSink, SinkOutput};
pub use transcript::TranscriptLog;
pub use transport::{LiveSession, LiveTransport, SessionEvent, WsTransport};
