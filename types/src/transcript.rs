use crate::state::Speaker;

/// One line of the conversation log.
///
/// A partial entry is still growing: text deltas for the same speaker are
/// appended in place until a turn-complete signal or a speaker change
/// finalizes it, after which it never changes again.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TranscriptEntry {
    pub id: u64,
    pub speaker: Speaker,
    pub text: String,
    pub partial: bool,
}
