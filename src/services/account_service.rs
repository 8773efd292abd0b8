use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::models::account::{Account, NewAccount};
use crate::models::identity::TelegramIdentity;
use crate::services::identity::{BackendError, IdentityBackend};
use crate::utils::credentials::{CredentialDeriver, SyntheticCredentials};

const CONFLICT_LOOKUP_ATTEMPTS: u32 = 3;
const CONFLICT_LOOKUP_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct ProvisionedAccount {
    pub account: Account,
    pub credentials: SyntheticCredentials,
    pub created: bool,
}

/// Binds each Telegram id to exactly one backend account.
#[derive(Clone)]
pub struct AccountService {
    backend: Arc<dyn IdentityBackend>,
    deriver: CredentialDeriver,
}

impl AccountService {
    pub fn new(backend: Arc<dyn IdentityBackend>, deriver: CredentialDeriver) -> Self {
        Self { backend, deriver }
    }

    /// Looks the account up by telegram id, refreshing its profile, or
    /// creates it. A concurrent first login that wins the insert is picked
    /// up by re-reading.
    pub async fn ensure_account(&self, identity: &TelegramIdentity) -> Result<ProvisionedAccount> {
        let credentials = self.deriver.derive(identity.id);

        if let Some(account) = self.lookup(identity.id).await? {
            self.refresh_profile(&account, identity).await?;
            return Ok(ProvisionedAccount {
                account,
                credentials,
                created: false,
            });
        }

        let new_account = NewAccount::new(identity, &credentials);
        match self.backend.create_account(&new_account).await {
            Ok(account) => {
                info!(
                    telegram_id = identity.id,
                    username = ?identity.username,
                    user_id = %account.user_id,
                    "created account for Telegram user"
                );
                Ok(ProvisionedAccount {
                    account,
                    credentials,
                    created: true,
                })
            }
            Err(BackendError::Conflict) => {
                warn!(
                    telegram_id = identity.id,
                    "account creation raced with another login; re-reading"
                );
                let account = self.wait_for_winner(identity.id).await?;
                self.refresh_profile(&account, identity).await?;
                Ok(ProvisionedAccount {
                    account,
                    credentials,
                    created: false,
                })
            }
            Err(err) => Err(provisioning(err)),
        }
    }

    async fn lookup(&self, telegram_id: i64) -> Result<Option<Account>> {
        self.backend
            .find_account_by_telegram_id(telegram_id)
            .await
            .map_err(provisioning)
    }

    async fn refresh_profile(&self, account: &Account, identity: &TelegramIdentity) -> Result<()> {
        self.backend
            .update_profile(&account.user_id, identity)
            .await
            .map_err(provisioning)
    }

    async fn wait_for_winner(&self, telegram_id: i64) -> Result<Account> {
        for attempt in 1..=CONFLICT_LOOKUP_ATTEMPTS {
            if let Some(account) = self.lookup(telegram_id).await? {
                return Ok(account);
            }
            if attempt < CONFLICT_LOOKUP_ATTEMPTS {
                tokio::time::sleep(CONFLICT_LOOKUP_DELAY).await;
            }
        }
        Err(Error::Provisioning(format!(
            "account for telegram id {} conflicted but never became visible",
            telegram_id
        )))
    }
}

fn provisioning(err: BackendError) -> Error {
    Error::Provisioning(err.to_string())
}
