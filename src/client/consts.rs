pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";

pub const BASE_URL: &str = "wss://generativelanguage.googleapis.com/ws";
pub const BIDI_GENERATE_CONTENT_PATH: &str =
    "google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
