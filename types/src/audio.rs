/// Audio data encoded as base64.
pub type Base64EncodedAudioBytes = String;

/// Sample rate the live service expects for microphone input.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of the audio payloads the live service streams back.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Both directions carry mono audio.
pub const CHANNELS: usize = 1;

/// Mime type tag for a raw 16-bit PCM chunk at the given rate.
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}
