use std::sync::Arc;

use oauth_relay::config::RelayConfig;
use oauth_relay::messaging::{ChannelSink, Delivery};
use oauth_relay::oauth::query::parse_query;
use oauth_relay::Relay;
use tokio::sync::mpsc::UnboundedReceiver;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Config pointing the token endpoint at `token_server`.
pub fn relay_config(token_server: &MockServer) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.provider.authorization_endpoint = format!("{}/authorize", token_server.uri());
    config.provider.token_endpoint = format!("{}/token", token_server.uri());
    config.provider.client_id = "test-client".into();
    config.provider.client_secret = "test-secret".into();
    config.provider.redirect_uri = "http://127.0.0.1/callback".into();
    config.state_key = Some(oauth_relay::oauth::generate_key());
    config.exchange_timeout_ms = 2_000;
    config
}

pub fn relay_with_channel(config: &RelayConfig) -> (Arc<Relay>, UnboundedReceiver<Delivery>) {
    let (sink, rx) = ChannelSink::channel();
    let relay = Relay::from_config(config, Arc::new(sink)).unwrap();
    (Arc::new(relay), rx)
}

/// Mount a token endpoint that grants `access_token` for any code.
#[allow(dead_code)]
pub async fn mount_token_grant(server: &MockServer, access_token: &str) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": access_token,
            "refresh_token": "1//refresh",
            "expires_in": 3599,
            "token_type": "Bearer",
            "scope": "https://mail.google.com/"
        })))
        .mount(server)
        .await;
}

/// The `state` query parameter of a delivered authorization URL.
pub fn state_param(url: &str) -> String {
    let (_, query) = url.split_once('?').unwrap();
    parse_query(query)
        .into_iter()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v)
        .unwrap()
}
