pub mod audio;
pub mod events;
pub mod persona;
pub mod session;
mod state;
mod transcript;

pub use events::{ClientEvent, ServerEvent};
pub use state::{ConversationState, Speaker};
pub use transcript::TranscriptEntry;
