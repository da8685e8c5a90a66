use std::collections::VecDeque;

use cpal::traits::{DeviceTrait, StreamTrait};
use tokio::sync::mpsc;

use lingua_live_utils as utils;

use crate::error::EngineError;

/// Samples per outbound chunk, matching the framing window of the capture
/// processor in the web client this engine replaces.
pub const FRAME_SAMPLES: usize = 4096;

/// Accumulates raw device callback buffers into fixed-size mono frames.
#[derive(Debug)]
pub struct FrameAssembler {
    buffer: VecDeque<f32>,
    frame_len: usize,
}

impl FrameAssembler {
    pub fn new(frame_len: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(frame_len * 2),
            frame_len,
        }
    }

    /// Feed raw samples; drain every completed frame.
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        self.buffer.extend(samples.iter().copied());
        let mut frames = Vec::new();
        while self.buffer.len() >= self.frame_len {
            frames.push(self.buffer.drain(..self.frame_len).collect());
        }
        frames
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// A live microphone. Captured sample buffers flow through the channel given
/// to `start`; delivery uses bounded try-send, dropping frames when the
/// consumer falls behind rather than queueing unbounded.
pub trait MicSource: Send {
    /// Acquire the device and begin capture. Returns the negotiated input
    /// sample rate. Failure is fatal to the attempt.
    fn start(&mut self, frames: mpsc::Sender<Vec<f32>>) -> Result<u32, EngineError>;

    /// Release the device. Idempotent.
    fn stop(&mut self);
}

/// cpal streams are not Send; access is confined to the engine task, which
/// only ever touches the stream from one place at a time.
struct SendStream(cpal::Stream);

unsafe impl Send for SendStream {}

/// Microphone source backed by a cpal input stream.
pub struct CpalMicSource {
    device_name: Option<String>,
    stream: Option<SendStream>,
    sample_rate: u32,
}

impl CpalMicSource {
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            stream: None,
            sample_rate: 0,
        }
    }
}

impl Default for CpalMicSource {
    fn default() -> Self {
        Self::new(None)
    }
}

impl MicSource for CpalMicSource {
    fn start(&mut self, frames: mpsc::Sender<Vec<f32>>) -> Result<u32, EngineError> {
        if self.stream.is_some() {
            return Ok(self.sample_rate);
        }

        let device = utils::device::get_or_default_input(self.device_name.clone())
            .map_err(|e| EngineError::PermissionDenied(e.to_string()))?;
        let default_config = device
            .default_input_config()
            .map_err(|e| EngineError::PermissionDenied(e.to_string()))?;
        let sample_rate = default_config.sample_rate().0;
        let channels = default_config.channels() as usize;
        let config: cpal::StreamConfig = default_config.into();

        let data_fn = move |data: &[f32], _: &cpal::InputCallbackInfo| {
            let mono: Vec<f32> = if channels == 1 {
                data.to_vec()
            } else {
                data.chunks(channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                    .collect()
            };
            if frames.try_send(mono).is_err() {
                tracing::trace!("capture frame dropped, consumer behind");
            }
        };

        let stream = device
            .build_input_stream(
                &config,
                data_fn,
                move |err| tracing::error!("input stream error: {}", err),
                None,
            )
            .map_err(|e| EngineError::PermissionDenied(e.to_string()))?;
        stream
            .play()
            .map_err(|e| EngineError::PermissionDenied(e.to_string()))?;

        tracing::info!("capturing at {} Hz, {} channel(s)", sample_rate, channels);
        self.stream = Some(SendStream(stream));
        self.sample_rate = sample_rate;
        Ok(sample_rate)
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.0.pause() {
                tracing::warn!("failed to pause input stream: {}", e);
            }
        }
    }
}
