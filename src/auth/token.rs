use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use rand::RngCore;

use crate::error::{Error, Result};

const ARGON2_MEMORY: u32 = 64 * 1024; // 64KB
const ARGON2_ITERATIONS: u32 = 1;
const ARGON2_PARALLELISM: u32 = 4;
const ARGON2_OUTPUT_LEN: usize = 32;

const TOKEN_PREFIX: &str = "dossier";
const LOOKUP_BYTES: usize = 4;
const SECRET_BYTES: usize = 12;
const LOOKUP_LENGTH: usize = LOOKUP_BYTES * 2;
const SECRET_LENGTH: usize = SECRET_BYTES * 2;

/// A freshly issued session token. `raw` is handed to the client once and
/// never persisted; the store keeps only `lookup` and `hash`.
pub struct SessionToken {
    pub raw: String,
    pub lookup: String,
    pub hash: String,
}

/// Argon2id hashing for the two credentials this server handles:
/// user passwords and session bearer tokens.
pub struct CredentialHasher {
    argon2: Argon2<'static>,
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialHasher {
    #[must_use]
    pub fn new() -> Self {
        let params = Params::new(
            ARGON2_MEMORY,
            ARGON2_ITERATIONS,
            ARGON2_PARALLELISM,
            Some(ARGON2_OUTPUT_LEN),
        )
        .expect("invalid argon2 params");

        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }

    /// Issues a bearer token of the form `dossier_<lookup>_<secret>`.
    /// The lookup half indexes the session row; the whole raw token is
    /// what gets hashed, so a leaked lookup alone grants nothing.
    pub fn issue_session_token(&self) -> Result<SessionToken> {
        let lookup = random_hex(LOOKUP_BYTES);
        let secret = random_hex(SECRET_BYTES);
        let raw = format!("{TOKEN_PREFIX}_{lookup}_{secret}");
        let hash = self.hash(&raw)?;

        Ok(SessionToken { raw, lookup, hash })
    }

    /// Hashes a credential (password or raw token) into a PHC string
    pub fn hash(&self, credential: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(credential.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| Error::Config(format!("failed to hash credential: {e}")))
    }

    /// Verifies a credential against a stored PHC hash. A mismatch is a
    /// plain `false`, not an error.
    pub fn verify(&self, credential: &str, hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| Error::Config(format!("invalid hash format: {e}")))?;

        match self
            .argon2
            .verify_password(credential.as_bytes(), &parsed_hash)
        {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(Error::Config(format!("failed to verify credential: {e}"))),
        }
    }
}

fn random_hex(byte_len: usize) -> String {
    let mut bytes = vec![0u8; byte_len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Extracts the lookup half from a raw bearer token, rejecting anything
/// that does not match the issued shape.
pub fn token_lookup(raw: &str) -> Result<String> {
    let mut parts = raw.split('_');

    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(TOKEN_PREFIX), Some(lookup), Some(secret), None)
            if lookup.len() == LOOKUP_LENGTH && secret.len() == SECRET_LENGTH =>
        {
            Ok(lookup.to_string())
        }
        _ => Err(Error::InvalidTokenFormat),
    }
}
