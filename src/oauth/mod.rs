pub mod coordinator;
pub mod query;
pub mod state;
pub mod store;
pub mod token;

pub use coordinator::{AuthorizationCoordinator, AuthorizationRequest, Completion};
pub use state::{generate_key, CorrelationRecord, StateCodec};
pub use store::{CredentialStore, Lookup};
pub use token::{Credential, HttpTokenExchanger, TokenExchanger};
