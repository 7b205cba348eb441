//! TranscriptBuffer (C2) — merges partial/final STT output for one turn
//! (spec §4.2).

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct Inner {
    partial_text: String,
    final_segments: Vec<String>,
    locked: bool,
}

#[derive(Default)]
pub struct TranscriptBuffer {
    inner: Mutex<Inner>,
}

impl TranscriptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites the partial text. Fails silently if locked (spec §4.2).
    pub fn set_partial(&self, text: impl Into<String>) {
        let mut inner = self.inner.lock();
        if inner.locked {
            return;
        }
        inner.partial_text = text.into();
    }

    /// Clears the partial and appends a final segment. Fails with
    /// `BufferLocked` if locked.
    pub fn append_final(&self, text: impl Into<String>) -> Result<(), voice_domain::Error> {
        let mut inner = self.inner.lock();
        if inner.locked {
            return Err(voice_domain::Error::BufferLocked);
        }
        inner.partial_text.clear();
        inner.final_segments.push(text.into());
        Ok(())
    }

    pub fn lock(&self) {
        self.inner.lock().locked = true;
    }

    pub fn unlock(&self) {
        self.inner.lock().locked = false;
    }

    pub fn is_locked(&self) -> bool {
        self.inner.lock().locked
    }

    /// The joined final segments, space-separated.
    pub fn complete_text(&self) -> String {
        self.inner.lock().final_segments.join(" ")
    }

    pub fn partial_text(&self) -> String {
        self.inner.lock().partial_text.clone()
    }

    /// Clears everything. Invoked at turn boundary (spec §4.2).
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.partial_text.clear();
        inner.final_segments.clear();
        inner.locked = false;
    }
}
