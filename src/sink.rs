use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::DeviceTrait;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd};
use rubato::{FastFixedIn, Resampler};
use tokio::sync::mpsc;

use lingua_live_utils as utils;

use crate::engine::EngineEvent;
use crate::scheduler::{PlaybackSink, ScheduledBuffer};

const RESAMPLE_CHUNK: usize = 1024;

/// Playback sink backed by the default output device.
///
/// Scheduled buffers are resampled from the service's output rate to the
/// device rate and pushed into a shared ring buffer; the cpal output stream
/// drains it. Because the scheduler hands buffers over gapless and in order,
/// queueing them back to back reproduces the timeline. End-of-playback is
/// reported on the engine's event channel when the buffer's slot on the
/// output clock has elapsed.
pub struct DeviceSink {
    producer: HeapProd<f32>,
    resampler: FastFixedIn<f32>,
    flush: Arc<AtomicBool>,
    epoch: tokio::time::Instant,
    events: mpsc::Sender<EngineEvent>,
}

/// Consumer half of the sink, to wire into a cpal output stream.
pub struct SinkOutput {
    consumer: HeapCons<f32>,
    flush: Arc<AtomicBool>,
}

impl DeviceSink {
    /// `source_rate` is the rate of scheduled buffers, `device_rate` the
    /// output device's native rate. `latency_secs` bounds how much audio the
    /// ring buffer holds ahead of the device.
    pub fn new(
        events: mpsc::Sender<EngineEvent>,
        source_rate: f64,
        device_rate: f64,
        latency_secs: usize,
    ) -> anyhow::Result<(Self, SinkOutput)> {
        let ring = utils::audio::shared_buffer(device_rate as usize * latency_secs);
        let (producer, consumer) = ring.split();
        let resampler = utils::audio::create_resampler(source_rate, device_rate, RESAMPLE_CHUNK)?;
        let flush = Arc::new(AtomicBool::new(false));

        let sink = Self {
            producer,
            resampler,
            flush: flush.clone(),
            epoch: tokio::time::Instant::now(),
            events,
        };
        Ok((sink, SinkOutput { consumer, flush }))
    }
}

impl PlaybackSink for DeviceSink {
    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn play(&mut self, buffer: &ScheduledBuffer) {
        let chunk_size = self.resampler.input_frames_next();
        for chunk in utils::audio::split_for_chunks(&buffer.samples, chunk_size) {
            match self.resampler.process(&[chunk.as_slice()], None) {
                Ok(resampled) => {
                    if let Some(samples) = resampled.first() {
                        for &sample in samples {
                            if self.producer.try_push(sample).is_err() {
                                tracing::warn!("output ring buffer full, dropping samples");
                                break;
                            }
                        }
                    }
                }
                Err(e) => tracing::error!("resampling failed: {}", e),
            }
        }

        // Completion fires when the buffer's slot on the output clock ends.
        let deadline = self.epoch + Duration::from_secs_f64(buffer.start_time + buffer.duration);
        let events = self.events.clone();
        let id = buffer.id;
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = events.send(EngineEvent::BufferEnded(id)).await;
        });
    }

    fn stop_all(&mut self) {
        self.flush.store(true, Ordering::SeqCst);
    }
}

/// Build the cpal output stream that drains a [`SinkOutput`], duplicating
/// the mono signal across the device's channels.
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut output: SinkOutput,
) -> anyhow::Result<cpal::Stream> {
    let channels = config.channels as usize;
    let data_fn = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        if output.flush.swap(false, Ordering::SeqCst) {
            while output.consumer.try_pop().is_some() {}
        }
        for frame in data.chunks_mut(channels) {
            let sample = output.consumer.try_pop().unwrap_or(0.0);
            for slot in frame {
                *slot = sample;
            }
        }
    };
    let stream = device.build_output_stream(
        config,
        data_fn,
        move |err| tracing::error!("output stream error: {}", err),
        None,
    )?;
    Ok(stream)
}
