//! Transcript assembly so partial speech fragments become stable utterances.
//!
//! Recognition streams deliver overlapping partials followed by a final; the
//! assembler keeps exactly one in-progress slot and an append-only sequence of
//! finalized entries. Finalized entries are never edited or removed.

use std::time::SystemTime;

use serde::Serialize;

/// One finalized utterance, user or assistant side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptEntry {
    /// Sequential id (1-based, insertion order).
    pub id: u64,
    /// Finalized text.
    pub text: String,
    /// True for recognized user speech, false for assistant output.
    pub is_user: bool,
    /// Finalization time.
    pub timestamp: SystemTime,
}

/// Converts recognition events into the finalized sequence plus one partial slot.
///
/// The partial slot is last-write-wins: the transport guarantees ordered
/// delivery on a single stream, so overwriting is correct without reordering.
#[derive(Debug, Default)]
pub struct TranscriptAssembler {
    entries: Vec<TranscriptEntry>,
    partial: Option<String>,
    next_id: u64,
}

impl TranscriptAssembler {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            partial: None,
            next_id: 1,
        }
    }

    /// Finalized entries in insertion order.
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// The in-progress utterance text, if any.
    pub fn partial(&self) -> Option<&str> {
        self.partial.as_deref()
    }

    /// Clear and activate the partial slot for a new utterance.
    pub fn speech_started(&mut self) {
        self.partial = Some(String::new());
    }

    /// Replace the partial slot text (last write wins).
    pub fn partial_text(&mut self, text: &str) {
        match self.partial.as_mut() {
            Some(slot) => {
                slot.clear();
                slot.push_str(text);
            }
            None => {
                // Partial without a preceding speech-start: activate the slot
                // so the fragment is not lost.
                tracing::debug!("partial text arrived before speech start");
                self.partial = Some(text.to_string());
            }
        }
    }

    /// Finalize the current utterance with recognizer-provided text.
    ///
    /// The final text supersedes whatever the partial slot held; the slot is
    /// cleared either way. Blank finals are discarded without an entry.
    pub fn final_text(&mut self, text: &str) -> Option<&TranscriptEntry> {
        self.partial = None;
        self.push_entry(text, true)
    }

    /// Signal end of speech: promote a non-empty partial, discard an empty one.
    pub fn speech_ended(&mut self) -> Option<&TranscriptEntry> {
        let pending = self.partial.take()?;
        self.push_entry(&pending, true)
    }

    /// Flush the partial slot outside the normal event flow (capture stopped).
    ///
    /// Same promotion rule as [`Self::speech_ended`]; exists so callers can
    /// name the intent at the call site.
    pub fn flush_partial(&mut self) -> Option<&TranscriptEntry> {
        self.speech_ended()
    }

    /// Append finalized assistant text directly, bypassing the partial slot.
    pub fn push_assistant(&mut self, text: &str) -> Option<&TranscriptEntry> {
        self.push_entry(text, false)
    }

    fn push_entry(&mut self, text: &str, is_user: bool) -> Option<&TranscriptEntry> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let entry = TranscriptEntry {
            id: self.next_id,
            text: text.to_string(),
            is_user,
            timestamp: SystemTime::now(),
        };
        self.next_id += 1;
        self.entries.push(entry);
        self.entries.last()
    }
}
