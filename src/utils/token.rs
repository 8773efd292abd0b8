use rand::{distributions::Alphanumeric, thread_rng, Rng};

pub const REFRESH_TOKEN_LENGTH: usize = 64;

pub fn generate_opaque_token(length: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

pub fn generate_refresh_token() -> String {
    generate_opaque_token(REFRESH_TOKEN_LENGTH)
}
