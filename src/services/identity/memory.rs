use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use super::{BackendError, IdentityBackend};
use crate::models::account::{Account, NewAccount, Session};
use crate::models::identity::TelegramIdentity;
use crate::utils::crypto::{constant_time_eq, sha256_hex};
use crate::utils::session_token::SessionSigner;
use crate::utils::time::now;

#[derive(Debug, Clone)]
struct StoredAccount {
    user_id: String,
    email: String,
    credential_hash: String,
    profile: TelegramIdentity,
}

#[derive(Debug, Default)]
struct MemoryState {
    accounts: HashMap<i64, StoredAccount>,
    by_email: HashMap<String, i64>,
}

/// Process-local store for development and tests. Both the telegram id and
/// the email are unique, checked and inserted under one lock.
pub struct MemoryIdentityBackend {
    state: Mutex<MemoryState>,
    signer: SessionSigner,
}

impl MemoryIdentityBackend {
    pub fn new(signer: SessionSigner) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            signer,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, BackendError> {
        self.state
            .lock()
            .map_err(|_| BackendError::Unavailable("memory store lock poisoned".to_string()))
    }
}

#[cfg(test)]
impl MemoryIdentityBackend {
    fn profile(&self, telegram_id: i64) -> Option<TelegramIdentity> {
        let state = self.lock().ok()?;
        state
            .accounts
            .get(&telegram_id)
            .map(|stored| stored.profile.clone())
    }

    fn account_count(&self) -> usize {
        self.lock().map(|state| state.accounts.len()).unwrap_or(0)
    }
}

#[async_trait]
impl IdentityBackend for MemoryIdentityBackend {
    async fn find_account_by_telegram_id(
        &self,
        telegram_id: i64,
    ) -> Result<Option<Account>, BackendError> {
        let state = self.lock()?;
        Ok(state.accounts.get(&telegram_id).map(|stored| Account {
            user_id: stored.user_id.clone(),
            telegram_id,
        }))
    }

    async fn create_account(&self, new_account: &NewAccount) -> Result<Account, BackendError> {
        let telegram_id = new_account.telegram_id();
        let email = new_account.email.to_ascii_lowercase();

        let mut state = self.lock()?;
        if state.accounts.contains_key(&telegram_id) || state.by_email.contains_key(&email) {
            return Err(BackendError::Conflict);
        }

        let stored = StoredAccount {
            user_id: Uuid::new_v4().to_string(),
            email: email.clone(),
            credential_hash: sha256_hex(&new_account.password),
            profile: new_account.profile.clone(),
        };
        let account = Account {
            user_id: stored.user_id.clone(),
            telegram_id,
        };
        state.by_email.insert(email, telegram_id);
        state.accounts.insert(telegram_id, stored);
        Ok(account)
    }

    async fn update_profile(
        &self,
        user_id: &str,
        profile: &TelegramIdentity,
    ) -> Result<(), BackendError> {
        let mut state = self.lock()?;
        if let Some(stored) = state
            .accounts
            .values_mut()
            .find(|stored| stored.user_id == user_id)
        {
            stored.profile = profile.clone();
        }
        Ok(())
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        let (user_id, email) = {
            let state = self.lock()?;
            let stored = state
                .by_email
                .get(&email.to_ascii_lowercase())
                .and_then(|telegram_id| state.accounts.get(telegram_id))
                .ok_or(BackendError::InvalidCredentials)?;
            if !constant_time_eq(&stored.credential_hash, &sha256_hex(password)) {
                return Err(BackendError::InvalidCredentials);
            }
            (stored.user_id.clone(), stored.email.clone())
        };
        Ok(self.signer.issue(&user_id, &email, now())?)
    }
}
