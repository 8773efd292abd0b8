use std::collections::HashSet;
use std::sync::Arc;

use helpday_backend::{
    models::identity::TelegramIdentity,
    services::{
        account_service::AccountService,
        identity::{IdentityBackend, MemoryIdentityBackend},
        session_service::SessionService,
    },
    utils::{credentials::CredentialDeriver, session_token::SessionSigner},
};

fn backend() -> Arc<dyn IdentityBackend> {
    Arc::new(MemoryIdentityBackend::new(SessionSigner::new(
        "binding-secret",
        3600,
    )))
}

fn deriver() -> CredentialDeriver {
    CredentialDeriver::new("TESTBOT", "telegram.local")
}

fn identity(id: i64) -> TelegramIdentity {
    TelegramIdentity {
        id,
        username: Some(format!("user{}", id)),
        first_name: None,
        last_name: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_logins_share_one_account() {
    let backend = backend();
    let mut handles = Vec::new();
    for _ in 0..10 {
        let service = AccountService::new(backend.clone(), deriver());
        handles.push(tokio::spawn(async move {
            service.ensure_account(&identity(31337)).await
        }));
    }

    let mut user_ids = HashSet::new();
    let mut created = 0;
    for handle in handles {
        let provisioned = handle.await.unwrap().unwrap();
        if provisioned.created {
            created += 1;
        }
        user_ids.insert(provisioned.account.user_id);
    }
    assert_eq!(user_ids.len(), 1);
    assert_eq!(created, 1);
}

#[tokio::test]
async fn user_id_is_stable_across_service_instances() {
    let backend = backend();
    let first = AccountService::new(backend.clone(), deriver())
        .ensure_account(&identity(7))
        .await
        .unwrap();
    let second = AccountService::new(backend.clone(), deriver())
        .ensure_account(&identity(7))
        .await
        .unwrap();
    assert_eq!(first.account.user_id, second.account.user_id);
    assert_eq!(first.credentials, second.credentials);

    let other = AccountService::new(backend, deriver())
        .ensure_account(&identity(8))
        .await
        .unwrap();
    assert_ne!(first.account.user_id, other.account.user_id);
}

#[tokio::test]
async fn derived_credentials_mint_a_session() {
    let backend = backend();
    let provisioned = AccountService::new(backend.clone(), deriver())
        .ensure_account(&identity(99))
        .await
        .unwrap();
    let session = SessionService::new(backend)
        .mint_session(&provisioned.credentials)
        .await
        .unwrap();
    assert_eq!(session.user.id, provisioned.account.user_id);
    assert_eq!(session.token_type, "bearer");
}

#[tokio::test]
async fn credentials_from_another_bot_token_are_rejected() {
    let backend = backend();
    AccountService::new(backend.clone(), deriver())
        .ensure_account(&identity(5))
        .await
        .unwrap();

    let foreign = CredentialDeriver::new("OTHERBOT", "telegram.local").derive(5);
    assert!(SessionService::new(backend).mint_session(&foreign).await.is_err());
}
