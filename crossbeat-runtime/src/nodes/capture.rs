//! Capture sink - feeds the mixed signal into an armed encoder
//!
//! A terminal node. While armed it pushes every rendered quantum through the
//! encoder and ships non-empty fragments over a channel to whoever holds the
//! receiving end (the recorder). Disarming flushes the encoder's trailing
//! bytes through the same channel, so by the time `disarm` returns the
//! channel holds the complete fragment sequence.

use crossbeam_channel::Sender;

use crate::encoder::Encoder;

/// Stream-capture sink node
pub struct CaptureNode {
    chunk_tx: Sender<Vec<u8>>,
    encoder: Option<Box<dyn Encoder>>,
}

impl CaptureNode {
    pub fn new(chunk_tx: Sender<Vec<u8>>) -> Self {
        Self {
            chunk_tx,
            encoder: None,
        }
    }

    /// Install an encoder; subsequent rendered quanta are captured
    pub fn arm(&mut self, encoder: Box<dyn Encoder>) {
        self.encoder = Some(encoder);
    }

    /// Remove the encoder, flushing its trailing bytes into the channel
    pub fn disarm(&mut self) {
        if let Some(mut encoder) = self.encoder.take() {
            let tail = encoder.finish();
            if !tail.is_empty() {
                let _ = self.chunk_tx.send(tail);
            }
        }
    }

    pub fn is_armed(&self) -> bool {
        self.encoder.is_some()
    }

    /// Consume one rendered quantum
    pub fn process(&mut self, input: &[f32]) {
        if let Some(encoder) = self.encoder.as_mut() {
            if let Some(chunk) = encoder.encode(input) {
                if !chunk.is_empty() {
                    let _ = self.chunk_tx.send(chunk);
                }
            }
        }
    }
}
