//! Recorder - captures the mix bus into an encoded in-memory artifact
//!
//! Construction negotiates a container against an ordered preference list;
//! if nothing preferred is supported the host default is used and the fact
//! is logged and flagged, since downstream consumers usually assume the
//! preferred container. `start` clears any previous session and arms the
//! capture sink; `stop` disarms it, drains the fragment channel, and yields
//! one concatenated artifact. Stopping while idle yields an empty artifact
//! rather than an error.

use std::sync::Arc;

use crossbeam_channel::Receiver;
use crossbeat_runtime::{negotiate, EncoderFactory, MediaType, NodeId, Runtime};

use crate::error::RecorderError;

/// Containers we ask the host for, best first
const PREFERRED_CONTAINERS: &[&str] = &["audio/wav", "audio/pcm"];

/// Recording state projection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
}

/// One recorded artifact: concatenated fragments tagged with the container
/// type they were encoded into
#[derive(Debug, Clone)]
pub struct Artifact {
    data: Vec<u8>,
    media_type: MediaType,
}

impl Artifact {
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// Captures the signal arriving at a capture sink node
pub struct Recorder {
    runtime: Runtime,
    sink: NodeId,
    factory: Arc<dyn EncoderFactory>,
    media_type: MediaType,
    fell_back: bool,
    chunk_rx: Receiver<Vec<u8>>,
    chunks: Vec<Vec<u8>>,
    state: RecorderState,
}

impl Recorder {
    /// Negotiate a container and bind to `sink`. Fails only when the host
    /// has no encoder capability at all.
    pub fn new(
        runtime: Runtime,
        sink: NodeId,
        factory: Arc<dyn EncoderFactory>,
        chunk_rx: Receiver<Vec<u8>>,
    ) -> Result<Self, RecorderError> {
        let preferred: Vec<MediaType> = PREFERRED_CONTAINERS
            .iter()
            .map(|s| MediaType::new(*s))
            .collect();

        let (media_type, fell_back) = match negotiate(factory.as_ref(), &preferred) {
            Some(media_type) => (media_type, false),
            None => match factory.default_media_type() {
                Some(media_type) => {
                    tracing::warn!(
                        container = %media_type,
                        "no preferred container supported, falling back to host default"
                    );
                    (media_type, true)
                }
                None => return Err(RecorderError::EncoderUnavailable),
            },
        };
        tracing::debug!(container = %media_type, "recorder ready");

        Ok(Self {
            runtime,
            sink,
            factory,
            media_type,
            fell_back,
            chunk_rx,
            chunks: Vec::new(),
            state: RecorderState::Idle,
        })
    }

    /// Begin a capture session. No-op while already recording; otherwise any
    /// previously buffered fragments are discarded first.
    pub fn start(&mut self) -> Result<(), RecorderError> {
        if self.state == RecorderState::Recording {
            return Ok(());
        }

        self.chunks.clear();
        while self.chunk_rx.try_recv().is_ok() {}

        let encoder = self.factory.create(&self.media_type)?;
        self.runtime.arm_capture(self.sink, encoder);
        self.state = RecorderState::Recording;
        tracing::debug!("recording started");
        Ok(())
    }

    /// End the session and return the concatenated artifact. The capture
    /// sink flushes its trailing fragment during disarm, so by the time this
    /// returns the artifact is complete. Stopping while idle returns an
    /// empty artifact tagged with the negotiated container.
    pub fn stop(&mut self) -> Artifact {
        if self.state == RecorderState::Recording {
            self.runtime.disarm_capture(self.sink);
            self.state = RecorderState::Idle;
            tracing::debug!("recording stopped");
        }

        while let Ok(chunk) = self.chunk_rx.try_recv() {
            if !chunk.is_empty() {
                self.chunks.push(chunk);
            }
        }

        let total = self.chunks.iter().map(Vec::len).sum();
        let mut data = Vec::with_capacity(total);
        for chunk in self.chunks.drain(..) {
            data.extend_from_slice(&chunk);
        }

        Artifact {
            data,
            media_type: self.media_type.clone(),
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// The container negotiated at construction
    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    /// True when none of the preferred containers was supported and the
    /// host default was used instead
    pub fn fell_back(&self) -> bool {
        self.fell_back
    }
}
