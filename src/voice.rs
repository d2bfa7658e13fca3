//! Voice input.
//!
//! Speech-to-text runs on the user's device (the page's speech recognition).
//! This side only tracks whether a capture session is open and forwards
//! finalized transcripts to whoever holds the receiving end.

use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VoiceError {
    #[error("voice input is not available on this platform")]
    Unavailable,

    #[error("no voice capture session is open")]
    NotListening,

    #[error("transcript consumer has shut down")]
    Closed,
}

pub trait VoiceCapture: Send + Sync {
    /// `false` means the composer hides its microphone control.
    fn is_available(&self) -> bool;

    fn is_listening(&self) -> bool;

    fn start(&self) -> Result<(), VoiceError>;

    fn stop(&self);

    /// Hand over a finalized transcript. A capture session yields one final
    /// result and then ends.
    fn deliver(&self, transcript: &str) -> Result<(), VoiceError>;
}

/// Platform without speech recognition.
#[derive(Debug, Default)]
pub struct NoVoice;

impl VoiceCapture for NoVoice {
    fn is_available(&self) -> bool {
        false
    }

    fn is_listening(&self) -> bool {
        false
    }

    fn start(&self) -> Result<(), VoiceError> {
        Err(VoiceError::Unavailable)
    }

    fn stop(&self) {}

    fn deliver(&self, _transcript: &str) -> Result<(), VoiceError> {
        Err(VoiceError::Unavailable)
    }
}

/// Transcripts pushed in by the page, fanned into a channel.
#[derive(Debug)]
pub struct TranscriptFeed {
    tx: mpsc::UnboundedSender<String>,
    listening: AtomicBool,
}

impl TranscriptFeed {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let feed = Self {
            tx,
            listening: AtomicBool::new(false),
        };
        (feed, rx)
    }
}

impl VoiceCapture for TranscriptFeed {
    fn is_available(&self) -> bool {
        !self.tx.is_closed()
    }

    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    fn start(&self) -> Result<(), VoiceError> {
        if self.tx.is_closed() {
            return Err(VoiceError::Closed);
        }
        self.listening.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.listening.store(false, Ordering::SeqCst);
    }

    fn deliver(&self, transcript: &str) -> Result<(), VoiceError> {
        if !self.listening.swap(false, Ordering::SeqCst) {
            return Err(VoiceError::NotListening);
        }
        let transcript = transcript.trim();
        if transcript.is_empty() {
            return Ok(());
        }
        self.tx
            .send(transcript.to_string())
            .map_err(|_| VoiceError::Closed)
    }
}
