use std::collections::HashSet;

use lingua_live_utils as utils;

use crate::error::EngineError;

/// A decoded inbound payload pinned to its slot on the playback timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledBuffer {
    pub id: u64,
    pub samples: Vec<f32>,
    /// Seconds on the sink's output clock.
    pub start_time: f64,
    pub duration: f64,
}

/// Where scheduled buffers actually play. Implementations report the output
/// clock and deliver end-of-playback completions as messages keyed by
/// buffer id.
pub trait PlaybackSink: Send {
    /// Current output clock time, in seconds.
    fn now(&self) -> f64;
    /// Begin playback of `buffer` at `buffer.start_time`.
    fn play(&mut self, buffer: &ScheduledBuffer);
    /// Force-stop everything started through `play`.
    fn stop_all(&mut self);
}

/// Schedules inbound audio payloads back to back.
///
/// The watermark (`next_start_time`) is the timeline's next free slot: every
/// buffer starts at `max(watermark, clock)` and pushes the watermark to its
/// own end, so buffers never overlap and never leave a gap once playback has
/// started. The watermark only ever moves forward between resets.
pub struct PlaybackScheduler {
    sink: Box<dyn PlaybackSink>,
    sample_rate: f64,
    channels: usize,
    next_start_time: f64,
    active: HashSet<u64>,
    next_id: u64,
}

impl PlaybackScheduler {
    pub fn new(sink: Box<dyn PlaybackSink>, sample_rate: f64, channels: usize) -> Self {
        Self {
            sink,
            sample_rate,
            channels,
            next_start_time: 0.0,
            active: HashSet::new(),
            next_id: 0,
        }
    }

    /// Decode one base64 PCM16 payload and schedule it at the watermark.
    /// Returns the scheduled start time. A malformed payload is dropped
    /// without touching the watermark or the active set.
    pub fn enqueue(&mut self, payload: &str) -> Result<f64, EngineError> {
        let samples = utils::audio::decode(payload, self.channels)?;
        let frames = samples.len() / self.channels;
        let duration = frames as f64 / self.sample_rate;

        let start_time = self.next_start_time.max(self.sink.now());
        let id = self.next_id;
        self.next_id += 1;

        let buffer = ScheduledBuffer {
            id,
            samples,
            start_time,
            duration,
        };
        self.sink.play(&buffer);
        self.active.insert(id);
        self.next_start_time = start_time + duration;
        tracing::trace!(
            "scheduled buffer {} at {:.3}s for {:.3}s",
            id,
            start_time,
            duration
        );
        Ok(start_time)
    }

    /// Playback of one buffer finished. Returns true when this drained the
    /// active set, i.e. the agent has stopped speaking. Completions for
    /// buffers cleared by a reset are ignored.
    pub fn on_buffer_ended(&mut self, id: u64) -> bool {
        self.active.remove(&id) && self.active.is_empty()
    }

    /// Stop every active source and rewind the timeline.
    pub fn reset(&mut self) {
        self.sink.stop_all();
        self.active.clear();
        self.next_start_time = 0.0;
    }

    pub fn watermark(&self) -> f64 {
        self.next_start_time
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use lingua_live_utils::audio;

    #[derive(Default)]
    struct MockSinkState {
        now: f64,
        played: Vec<ScheduledBuffer>,
        stopped: bool,
    }

    #[derive(Clone, Default)]
    struct MockSink {
        state: Arc<Mutex<MockSinkState>>,
    }

    impl MockSink {
        fn set_now(&self, now: f64) {
            self.state.lock().unwrap().now = now;
        }

        fn played(&self) -> Vec<ScheduledBuffer> {
            self.state.lock().unwrap().played.clone()
        }

        fn stopped(&self) -> bool {
            self.state.lock().unwrap().stopped
        }
    }

    impl PlaybackSink for MockSink {
        fn now(&self) -> f64 {
            self.state.lock().unwrap().now
        }

        fn play(&mut self, buffer: &ScheduledBuffer) {
            self.state.lock().unwrap().played.push(buffer.clone());
        }

        fn stop_all(&mut self) {
            self.state.lock().unwrap().stopped = true;
        }
    }

    fn scheduler_with_sink() -> (PlaybackScheduler, MockSink) {
        let sink = MockSink::default();
        let scheduler = PlaybackScheduler::new(Box::new(sink.clone()), 24_000.0, 1);
        (scheduler, sink)
    }

    /// 0.5 seconds of silence at 24 kHz mono.
    fn half_second_payload() -> String {
        audio::encode(&vec![0.0f32; 12_000])
    }

    #[test]
    fn back_to_back_payloads_schedule_gapless() {
        let (mut scheduler, sink) = scheduler_with_sink();

        let first = scheduler.enqueue(&half_second_payload()).unwrap();
        let second = scheduler.enqueue(&half_second_payload()).unwrap();

        assert_eq!(first, 0.0);
        assert_eq!(second, 0.5);
        assert_eq!(scheduler.watermark(), 1.0);

        let played = sink.played();
        assert_eq!(played.len(), 2);
        // No overlap and no gap between consecutive buffers.
        assert_eq!(played[0].start_time + played[0].duration, played[1].start_time);
    }

    #[test]
    fn clock_ahead_of_watermark_wins() {
        let (mut scheduler, sink) = scheduler_with_sink();

        scheduler.enqueue(&half_second_payload()).unwrap();
        sink.set_now(2.0);
        let start = scheduler.enqueue(&half_second_payload()).unwrap();

        assert_eq!(start, 2.0);
        assert_eq!(scheduler.watermark(), 2.5);
    }

    #[test]
    fn watermark_never_decreases() {
        let (mut scheduler, sink) = scheduler_with_sink();
        let mut previous = scheduler.watermark();
        for step in 0..5 {
            // Clock jitters but the watermark must still be monotonic.
            sink.set_now(if step % 2 == 0 { 0.0 } else { step as f64 });
            scheduler.enqueue(&half_second_payload()).unwrap();
            assert!(scheduler.watermark() >= previous);
            previous = scheduler.watermark();
        }
    }

    #[test]
    fn drained_only_when_last_buffer_ends() {
        let (mut scheduler, _sink) = scheduler_with_sink();
        scheduler.enqueue(&half_second_payload()).unwrap();
        scheduler.enqueue(&half_second_payload()).unwrap();

        assert!(!scheduler.on_buffer_ended(0));
        assert!(scheduler.on_buffer_ended(1));
    }

    #[test]
    fn malformed_payload_is_dropped_without_side_effects() {
        let (mut scheduler, sink) = scheduler_with_sink();
        scheduler.enqueue(&half_second_payload()).unwrap();

        let err = scheduler.enqueue("@@not-base64@@");
        assert!(matches!(err, Err(EngineError::Decode(_))));
        assert_eq!(scheduler.watermark(), 0.5);
        assert_eq!(sink.played().len(), 1);
    }

    #[test]
    fn reset_stops_sources_and_rewinds() {
        let (mut scheduler, sink) = scheduler_with_sink();
        scheduler.enqueue(&half_second_payload()).unwrap();
        scheduler.enqueue(&half_second_payload()).unwrap();

        scheduler.reset();

        assert!(sink.stopped());
        assert_eq!(scheduler.watermark(), 0.0);
        assert!(scheduler.is_idle());
        // A completion for a cleared buffer must not signal drained.
        assert!(!scheduler.on_buffer_ended(0));
    }
}
