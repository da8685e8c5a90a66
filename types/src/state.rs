/// Lifecycle position of the conversation engine. Exactly one value is
/// active at a time; transitions are owned by the lifecycle manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConversationState {
    #[default]
    Idle,
    Listening,
    Speaking,
    Error,
}

/// Who produced a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Agent,
}
