use lingua_live_types::{Speaker, TranscriptEntry};

/// Merges streamed transcript fragments into an ordered, append-only log.
///
/// Deltas grow the newest entry in place while it is partial and belongs to
/// the same speaker. A speaker change finalizes the previous line; a
/// turn-complete signal finalizes everything. Finalization relies only on
/// those two signals, never on a per-delta flag from the transport.
#[derive(Debug, Default)]
pub struct TranscriptLog {
    entries: Vec<TranscriptEntry>,
    next_id: u64,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one text delta for `speaker`.
    pub fn append(&mut self, speaker: Speaker, delta: &str) {
        if let Some(last) = self.entries.last_mut() {
            if last.partial && last.speaker == speaker {
                last.text.push_str(delta);
                return;
            }
            // A new utterance never silently concatenates onto the previous
            // speaker's line.
            last.partial = false;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(TranscriptEntry {
            id,
            speaker,
            text: delta.to_string(),
            partial: true,
        });
    }

    /// Settle every line still growing. Idempotent.
    pub fn turn_complete(&mut self) {
        for entry in &mut self.entries {
            entry.partial = false;
        }
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Drop the log. Ids stay monotonic across clears.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
