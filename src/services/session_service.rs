use std::sync::Arc;

use tracing::warn;

use crate::error::{Error, Result};
use crate::models::account::Session;
use crate::services::identity::{BackendError, IdentityBackend};
use crate::utils::credentials::SyntheticCredentials;

#[derive(Clone)]
pub struct SessionService {
    backend: Arc<dyn IdentityBackend>,
}

impl SessionService {
    pub fn new(backend: Arc<dyn IdentityBackend>) -> Self {
        Self { backend }
    }

    /// Exchanges the synthetic credentials for a fresh session. The caller
    /// has already proven its identity, so every failure here is ours.
    pub async fn mint_session(&self, credentials: &SyntheticCredentials) -> Result<Session> {
        let session = self
            .backend
            .sign_in_with_password(&credentials.email, &credentials.password)
            .await
            .map_err(|err| {
                if matches!(err, BackendError::InvalidCredentials) {
                    warn!(email = %credentials.email, "synthetic credentials were rejected");
                }
                Error::Provisioning(format!("session mint failed: {}", err))
            })?;

        if session.access_token.is_empty() {
            return Err(Error::Provisioning(
                "session mint returned an empty access token".to_string(),
            ));
        }
        Ok(session)
    }
}
