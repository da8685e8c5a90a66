use secrecy::ExposeSecret;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;

use crate::client::config::Config;
use crate::client::consts::BIDI_GENERATE_CONTENT_PATH;

/// The live endpoint authenticates with a `key` query parameter.
pub fn build_request(config: &Config) -> tokio_tungstenite::tungstenite::Result<Request> {
    format!(
        "{}/{}?key={}",
        config.base_url(),
        BIDI_GENERATE_CONTENT_PATH,
        config.api_key().expose_secret()
    )
    .into_client_request()
}
