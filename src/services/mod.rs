pub mod account_service;
pub mod identity;
pub mod session_service;
pub mod verification_service;
