//! Encoder capability - codec negotiation and incremental chunk delivery
//!
//! The capture sink drives an `Encoder` with rendered frames; the encoder
//! hands back container bytes in fragments. Which container gets used is
//! decided once, up front, by `negotiate`: an ordered preference list is
//! walked and the first entry the host supports wins. The host side of the
//! capability ships two encoders: a WAV container (via hound, finalized as a
//! single fragment) and raw PCM (fixed-size incremental fragments). Neither
//! implements a codec - both are containers around the rendered samples.

use std::fmt;
use std::io::{self, Cursor, Seek, SeekFrom, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

/// Errors from the encoder capability
#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("unsupported media type: {0}")]
    Unsupported(String),
    #[error("container error: {0}")]
    Container(String),
}

/// A container media type, e.g. `audio/wav` or
/// `audio/pcm;format=f32le;rate=48000;channels=2`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaType(String);

impl MediaType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The type/subtype part, with any parameters stripped
    pub fn essence(&self) -> &str {
        self.0.split(';').next().unwrap_or(&self.0).trim()
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MediaType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Incremental encoder for one capture session
pub trait Encoder: Send {
    /// The container type of the artifact this encoder produces
    fn media_type(&self) -> MediaType;

    /// Feed interleaved stereo frames; returns a fragment when one is ready
    fn encode(&mut self, frames: &[f32]) -> Option<Vec<u8>>;

    /// Finalize the container and return any trailing bytes
    fn finish(&mut self) -> Vec<u8>;
}

/// Host-side encoder capability: support queries plus construction
pub trait EncoderFactory: Send + Sync {
    /// Canonical media type for a requested one, if this host can encode it.
    /// Matching is by essence, so `audio/pcm` resolves to the host's fully
    /// parametrized PCM type.
    fn supports(&self, requested: &MediaType) -> Option<MediaType>;

    /// The host's default container, used when negotiation fails
    fn default_media_type(&self) -> Option<MediaType>;

    /// Build an encoder for a previously resolved media type
    fn create(&self, media_type: &MediaType) -> Result<Box<dyn Encoder>, EncoderError>;
}

/// Walk `preferred` in order (best first) and return the first media type the
/// host supports, in its canonical form. `None` means the caller must fall
/// back to the host default.
pub fn negotiate(factory: &dyn EncoderFactory, preferred: &[MediaType]) -> Option<MediaType> {
    preferred.iter().find_map(|p| factory.supports(p))
}

// ---------------------------------------------------------------------------
// WAV encoder
// ---------------------------------------------------------------------------

/// Write + Seek over a shared in-memory buffer, so the finalized WAV bytes
/// can be reclaimed after hound consumes the writer
#[derive(Clone)]
struct SharedCursor(Arc<Mutex<Cursor<Vec<u8>>>>);

impl SharedCursor {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(Cursor::new(Vec::new()))))
    }

    fn take_bytes(&self) -> Vec<u8> {
        std::mem::take(self.0.lock().get_mut())
    }
}

impl Write for SharedCursor {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().flush()
    }
}

impl Seek for SharedCursor {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.0.lock().seek(pos)
    }
}

/// WAV container encoder. The RIFF header carries sizes, so the artifact is
/// only valid once finalized: fragments are withheld until `finish`, which
/// yields the whole container as one fragment.
pub struct WavEncoder {
    media_type: MediaType,
    bytes: SharedCursor,
    writer: Option<hound::WavWriter<SharedCursor>>,
}

impl WavEncoder {
    pub fn new(sample_rate: u32) -> Result<Self, EncoderError> {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let bytes = SharedCursor::new();
        let writer = hound::WavWriter::new(bytes.clone(), spec)
            .map_err(|e| EncoderError::Container(e.to_string()))?;
        Ok(Self {
            media_type: MediaType::new("audio/wav"),
            bytes,
            writer: Some(writer),
        })
    }
}

impl Encoder for WavEncoder {
    fn media_type(&self) -> MediaType {
        self.media_type.clone()
    }

    fn encode(&mut self, frames: &[f32]) -> Option<Vec<u8>> {
        if let Some(writer) = self.writer.as_mut() {
            for &sample in frames {
                if writer.write_sample(sample).is_err() {
                    tracing::warn!("wav encoder dropped a sample block");
                    break;
                }
            }
        }
        None
    }

    fn finish(&mut self) -> Vec<u8> {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                tracing::warn!(error = %e, "wav finalize failed; artifact may be truncated");
            }
        }
        self.bytes.take_bytes()
    }
}

// ---------------------------------------------------------------------------
// PCM encoder
// ---------------------------------------------------------------------------

/// Fragment size for incremental PCM delivery (~170ms of stereo f32 at 48kHz)
const PCM_CHUNK_BYTES: usize = 64 * 1024;

/// Raw PCM encoder: little-endian f32 frames, shipped in fixed-size fragments
pub struct PcmEncoder {
    media_type: MediaType,
    pending: Vec<u8>,
}

impl PcmEncoder {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            media_type: MediaType::new(format!(
                "audio/pcm;format=f32le;rate={};channels=2",
                sample_rate
            )),
            pending: Vec::with_capacity(PCM_CHUNK_BYTES),
        }
    }
}

impl Encoder for PcmEncoder {
    fn media_type(&self) -> MediaType {
        self.media_type.clone()
    }

    fn encode(&mut self, frames: &[f32]) -> Option<Vec<u8>> {
        for &sample in frames {
            self.pending.extend_from_slice(&sample.to_le_bytes());
        }
        if self.pending.len() >= PCM_CHUNK_BYTES {
            let mut chunk = Vec::with_capacity(PCM_CHUNK_BYTES);
            std::mem::swap(&mut chunk, &mut self.pending);
            Some(chunk)
        } else {
            None
        }
    }

    fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending)
    }
}

// ---------------------------------------------------------------------------
// Host factory
// ---------------------------------------------------------------------------

/// The encoders this host offers: WAV (preferred default) and raw PCM
pub struct HostEncoderFactory {
    sample_rate: u32,
}

impl HostEncoderFactory {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    fn pcm_type(&self) -> MediaType {
        MediaType::new(format!(
            "audio/pcm;format=f32le;rate={};channels=2",
            self.sample_rate
        ))
    }
}

impl EncoderFactory for HostEncoderFactory {
    fn supports(&self, requested: &MediaType) -> Option<MediaType> {
        match requested.essence() {
            "audio/wav" => Some(MediaType::new("audio/wav")),
            "audio/pcm" => Some(self.pcm_type()),
            _ => None,
        }
    }

    fn default_media_type(&self) -> Option<MediaType> {
        Some(MediaType::new("audio/wav"))
    }

    fn create(&self, media_type: &MediaType) -> Result<Box<dyn Encoder>, EncoderError> {
        match media_type.essence() {
            "audio/wav" => Ok(Box::new(WavEncoder::new(self.sample_rate)?)),
            "audio/pcm" => Ok(Box::new(PcmEncoder::new(self.sample_rate))),
            other => Err(EncoderError::Unsupported(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_essence() {
        let mt = MediaType::new("audio/pcm;format=f32le;rate=48000;channels=2");
        assert_eq!(mt.essence(), "audio/pcm");
        assert_eq!(MediaType::new("audio/wav").essence(), "audio/wav");
    }

    #[test]
    fn test_negotiate_prefers_first_supported() {
        let factory = HostEncoderFactory::new(48000);
        let preferred = [
            MediaType::new("audio/webm;codecs=opus"),
            MediaType::new("audio/wav"),
            MediaType::new("audio/pcm"),
        ];
        let chosen = negotiate(&factory, &preferred).unwrap();
        assert_eq!(chosen.essence(), "audio/wav");
    }

    #[test]
    fn test_negotiate_none_supported() {
        let factory = HostEncoderFactory::new(48000);
        let preferred = [MediaType::new("audio/webm;codecs=opus")];
        assert!(negotiate(&factory, &preferred).is_none());
        assert_eq!(
            factory.default_media_type().unwrap().essence(),
            "audio/wav"
        );
    }

    #[test]
    fn test_pcm_encoder_chunks_and_finish() {
        let mut enc = PcmEncoder::new(48000);

        // Under one chunk: nothing delivered yet
        let frames = vec![0.25f32; 1024];
        assert!(enc.encode(&frames).is_none());

        // Push past the chunk boundary
        let big = vec![0.5f32; PCM_CHUNK_BYTES / 4];
        let chunk = enc.encode(&big).expect("chunk due");
        assert!(chunk.len() >= PCM_CHUNK_BYTES);

        let tail = enc.finish();
        // Total bytes = 4 bytes per sample across both calls
        assert_eq!(chunk.len() + tail.len(), (1024 + PCM_CHUNK_BYTES / 4) * 4);
    }

    #[test]
    fn test_pcm_roundtrip_bytes() {
        let mut enc = PcmEncoder::new(48000);
        enc.encode(&[1.0, -1.0]);
        let bytes = enc.finish();
        assert_eq!(bytes.len(), 8);
        assert_eq!(f32::from_le_bytes(bytes[0..4].try_into().unwrap()), 1.0);
        assert_eq!(f32::from_le_bytes(bytes[4..8].try_into().unwrap()), -1.0);
    }

    #[test]
    fn test_wav_encoder_single_finalized_fragment() {
        let mut enc = WavEncoder::new(48000).unwrap();
        assert!(enc.encode(&[0.1, 0.1, -0.1, -0.1]).is_none());
        let bytes = enc.finish();

        // RIFF header + fmt + data chunk with 4 samples of 4 bytes
        assert!(bytes.len() > 44);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
    }

    #[test]
    fn test_wav_finish_twice_yields_empty() {
        let mut enc = WavEncoder::new(48000).unwrap();
        enc.encode(&[0.0, 0.0]);
        let first = enc.finish();
        assert!(!first.is_empty());
        assert!(enc.finish().is_empty());
    }
}
