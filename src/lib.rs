pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::services::identity::IdentityBackend;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub identity: Option<Arc<dyn IdentityBackend>>,
}

impl AppState {
    pub fn new(config: Config, identity: Option<Arc<dyn IdentityBackend>>) -> Self {
        Self {
            config: Arc::new(config),
            identity,
        }
    }

    pub fn identity_backend(&self) -> Result<Arc<dyn IdentityBackend>> {
        self.identity
            .clone()
            .ok_or_else(|| Error::Config("identity backend not configured".to_string()))
    }
}
