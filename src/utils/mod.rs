pub mod credentials;
pub mod crypto;
pub mod login_token;
pub mod session_token;
pub mod telegram_auth;
pub mod time;
pub mod token;
