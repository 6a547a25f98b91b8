use std::sync::Arc;

use crate::{backend::AudioBackend, credentials::CredentialProvider};

/// Shared by every handler. The backend and the credential provider are
/// both built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn AudioBackend>,
    pub credentials: Arc<CredentialProvider>,
    pub public_base_url: Option<String>,
}
