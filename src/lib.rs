pub mod callback;
pub mod config;
pub mod error;
pub mod messaging;
pub mod oauth;
pub mod pending;
pub mod relay;

pub use callback::CallbackServer;
pub use config::{load_config, ProviderConfig, RelayConfig};
pub use error::{RelayError, Unavailable};
pub use messaging::{BrowserSink, ChannelSink, ConsoleSink, MessageSink};
pub use oauth::{
    AuthorizationCoordinator, CorrelationRecord, Credential, CredentialStore, StateCodec,
    TokenExchanger,
};
pub use pending::{PendingAction, PendingActions};
pub use relay::{Access, Relay, Resumed};
