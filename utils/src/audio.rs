use base64::Engine;
use ringbuf::HeapRb;
use rubato::{FastFixedIn, PolynomialDegree};

/// Errors raised while converting transported audio payloads.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("invalid base64 audio payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("pcm payload of {len} bytes does not divide into {channels}-channel 16-bit frames")]
    TruncatedFrame { len: usize, channels: usize },
}

/// Quantize float samples in [-1, 1] to little-endian 16-bit PCM.
///
/// A sample `f` maps to `round(f * 32768)` clamped to the i16 range.
pub fn floats_to_pcm(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&sample| {
            let quantized =
                (sample * 32768.0).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            quantized.to_le_bytes()
        })
        .collect()
}

/// Inverse of [`floats_to_pcm`]: little-endian 16-bit PCM to floats.
///
/// Fails rather than truncating when the byte count does not divide into
/// whole frames for the given channel count.
pub fn pcm_to_floats(bytes: &[u8], channels: usize) -> Result<Vec<f32>, AudioError> {
    if channels == 0 || bytes.len() % (2 * channels) != 0 {
        return Err(AudioError::TruncatedFrame {
            len: bytes.len(),
            channels,
        });
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect())
}

pub fn encode_bytes(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

pub fn decode_base64(payload: &str) -> Result<Vec<u8>, AudioError> {
    Ok(base64::engine::general_purpose::STANDARD.decode(payload)?)
}

/// Float samples to a base64 PCM16 transport payload.
pub fn encode(samples: &[f32]) -> String {
    encode_bytes(&floats_to_pcm(samples))
}

/// Base64 PCM16 transport payload to float samples.
pub fn decode(payload: &str, channels: usize) -> Result<Vec<f32>, AudioError> {
    pcm_to_floats(&decode_base64(payload)?, channels)
}

pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

/// Split samples into fixed-size chunks, zero-padding the tail.
pub fn split_for_chunks(samples: &[f32], chunk_size: usize) -> Vec<Vec<f32>> {
    samples
        .chunks(chunk_size)
        .map(|chunk| {
            let mut chunk = chunk.to_vec();
            chunk.resize(chunk_size, 0.0);
            chunk
        })
        .collect()
}

pub fn shared_buffer(size: usize) -> HeapRb<f32> {
    HeapRb::new(size)
}
