//! Single-use recovery codes: batch issuance and redemption. Plain codes
//! are shown to the user exactly once; only SHA-256 hashes of the
//! normalized form are stored.

use db::models::{recovery_code, user};
use rand::rngs::OsRng;
use rand::Rng;
use sea_orm::{DatabaseConnection, DbErr};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::token::{SessionSigner, TokenError};

/// Codes issued per batch unless the caller asks otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 10;

#[derive(Debug, Error)]
pub enum RecoveryCodeError {
    #[error("could not generate enough distinct recovery codes")]
    GenerationExhausted,
    #[error("recovery code is not in the expected format")]
    InvalidCodeFormat,
    #[error("user not found")]
    UserNotFound,
    #[error("recovery code is invalid or already used")]
    InvalidOrUsedCode,
    #[error("database error: {0}")]
    Db(#[from] DbErr),
    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Shape of a recovery code: uppercase segments from a restricted alphabet,
/// joined by a separator. The alphabet omits the ambiguous I, O, 0 and 1.
#[derive(Debug, Clone)]
pub struct RecoveryCodeCodec {
    pub segments: usize,
    pub segment_len: usize,
    pub separator: char,
    pub alphabet: &'static str,
}

impl Default for RecoveryCodeCodec {
    fn default() -> Self {
        Self {
            segments: 3,
            segment_len: 5,
            separator: '-',
            alphabet: "ABCDEFGHJKLMNPQRSTUVWXYZ23456789",
        }
    }
}

impl RecoveryCodeCodec {
    fn random_code(&self) -> String {
        let chars: Vec<char> = self.alphabet.chars().collect();
        let mut rng = OsRng;
        (0..self.segments)
            .map(|_| {
                (0..self.segment_len)
                    .map(|_| chars[rng.gen_range(0..chars.len())])
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join(&self.separator.to_string())
    }

    /// Generates `count` distinct display-form codes. Duplicates are retried
    /// within a bounded number of draws so a pathological RNG cannot spin
    /// forever.
    pub fn generate(&self, count: usize) -> Result<Vec<String>, RecoveryCodeError> {
        let mut codes: Vec<String> = Vec::with_capacity(count);
        let max_attempts = count.saturating_mul(5);
        let mut attempts = 0;
        while codes.len() < count {
            if attempts >= max_attempts {
                return Err(RecoveryCodeError::GenerationExhausted);
            }
            attempts += 1;
            let code = self.random_code();
            if !codes.contains(&code) {
                codes.push(code);
            }
        }
        Ok(codes)
    }

    /// Canonical form: uppercased, separators stripped. `None` if the result
    /// has the wrong length or characters outside the alphabet.
    pub fn normalize(&self, input: &str) -> Option<String> {
        let normalized: String = input
            .trim()
            .chars()
            .filter(|c| *c != self.separator)
            .map(|c| c.to_ascii_uppercase())
            .collect();
        let expected_len = self.segments * self.segment_len;
        if normalized.len() != expected_len {
            return None;
        }
        if !normalized.chars().all(|c| self.alphabet.contains(c)) {
            return None;
        }
        Some(normalized)
    }

    /// Deterministic hash of the canonical form; equal for any spelling of
    /// the same code.
    pub fn hash(&self, input: &str) -> Option<String> {
        let normalized = self.normalize(input)?;
        Some(hex::encode(Sha256::digest(normalized.as_bytes())))
    }
}

/// Replaces the user's recovery codes with a fresh batch and returns the
/// plain display forms. Prior codes stop working immediately.
pub async fn issue_batch(
    db: &DatabaseConnection,
    codec: &RecoveryCodeCodec,
    user_id: i64,
    count: usize,
) -> Result<Vec<String>, RecoveryCodeError> {
    let user = user::Model::find_by_id(db, user_id)
        .await?
        .ok_or(RecoveryCodeError::UserNotFound)?;

    let codes = codec.generate(count)?;
    recovery_code::Model::delete_all_for_user(db, user.id).await?;
    for code in &codes {
        let hash = codec
            .hash(code)
            .ok_or(RecoveryCodeError::InvalidCodeFormat)?;
        recovery_code::Model::create(db, user.id, &hash).await?;
    }
    log::info!("issued {} recovery codes for user {}", codes.len(), user.id);
    Ok(codes)
}

/// Redeems one code for a session token. The code is burned before the
/// token is issued; a concurrent redemption of the same code loses the
/// guarded update and is rejected.
pub async fn redeem(
    db: &DatabaseConnection,
    codec: &RecoveryCodeCodec,
    signer: &SessionSigner,
    email: &str,
    code: &str,
) -> Result<String, RecoveryCodeError> {
    let user = user::Model::find_by_email(db, email)
        .await?
        .ok_or(RecoveryCodeError::UserNotFound)?;

    let hash = codec
        .hash(code)
        .ok_or(RecoveryCodeError::InvalidCodeFormat)?;

    let record = recovery_code::Model::find_by_hash(db, &hash)
        .await?
        .filter(|r| r.user_id == user.id && !r.used)
        .ok_or(RecoveryCodeError::InvalidOrUsedCode)?;

    if !recovery_code::Model::mark_used(db, record.id).await? {
        return Err(RecoveryCodeError::InvalidOrUsedCode);
    }

    log::info!("recovery code redeemed for user {}", user.id);
    Ok(signer.issue(&user)?)
}
