use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use tracing::{info, warn};

use crate::dto::verify_dto::{VerifyRequest, VerifyResponse};
use crate::error::{Error, Result};
use crate::services::account_service::AccountService;
use crate::services::session_service::SessionService;
use crate::services::verification_service::VerificationService;
use crate::utils::credentials::CredentialDeriver;
use crate::AppState;

pub async fn verify_telegram(
    State(state): State<AppState>,
    body: std::result::Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<VerifyResponse>> {
    // Configuration is checked before any client input is looked at.
    let verifier = VerificationService::from_config(&state.config)?;
    let backend = state.identity_backend()?;

    let Json(request) = body.map_err(|rejection| Error::BadRequest(rejection.body_text()))?;
    let flow = request.flow();

    let identity = verifier.verify(&request).map_err(|err| {
        warn!(flow, error = %err, "Telegram proof rejected");
        err
    })?;

    let deriver = CredentialDeriver::new(
        state.config.bot_token()?,
        state.config.account_email_domain.as_str(),
    );
    let provisioned = AccountService::new(backend.clone(), deriver)
        .ensure_account(&identity)
        .await?;
    let session = SessionService::new(backend)
        .mint_session(&provisioned.credentials)
        .await?;

    info!(
        flow,
        telegram_id = identity.id,
        username = ?identity.username,
        user_id = %provisioned.account.user_id,
        created = provisioned.created,
        "Telegram login succeeded"
    );

    Ok(Json(VerifyResponse {
        ok: true,
        user: identity.into(),
        session,
    }))
}
