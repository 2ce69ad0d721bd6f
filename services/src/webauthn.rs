//! Passkey registration and authentication ceremonies. Server-side
//! ceremony state is persisted in `webauthn_challenges` under an opaque
//! random ref, so any process replica can finish a ceremony another one
//! started. Challenges are burned before verification; a failed ceremony
//! cannot be retried against the same challenge.

use chrono::Utc;
use db::is_unique_violation;
use db::models::webauthn_challenge::{self, Ceremony};
use db::models::webauthn_credential;
use db::models::user;
use sea_orm::{DatabaseConnection, DbErr};
use serde::Serialize;
use thiserror::Error;
use url::Url;
use uuid::Uuid;
use webauthn_rs::prelude::{
    AuthenticationResult, CreationChallengeResponse, Passkey, PasskeyAuthentication,
    PasskeyRegistration, PublicKeyCredential, RegisterPublicKeyCredential,
    RequestChallengeResponse, Webauthn, WebauthnBuilder,
};

use crate::token::{SessionSigner, TokenError};

#[derive(Debug, Error)]
pub enum WebauthnError {
    #[error("relying party configuration invalid: {0}")]
    Configuration(String),
    #[error("user not found")]
    UserNotFound,
    #[error("user has no registered credentials")]
    NoCredentialsRegistered,
    #[error("challenge is invalid or has expired")]
    InvalidOrExpiredChallenge,
    #[error("challenge belongs to a different user")]
    ChallengeUserMismatch,
    #[error("credential is already registered")]
    DuplicateCredential,
    #[error("credential not recognized")]
    CredentialNotRegistered,
    #[error("authenticator counter did not advance; possible cloned credential")]
    PossibleCloneDetected,
    #[error("ceremony verification failed: {0}")]
    VerificationFailed(String),
    #[error("stored ceremony state is corrupt: {0}")]
    CorruptState(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Db(#[from] DbErr),
    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Relying-party handle for building and verifying ceremonies. Stateless;
/// all per-ceremony state lives in the challenge table.
#[derive(Clone)]
pub struct WebauthnCeremonies {
    webauthn: Webauthn,
}

impl WebauthnCeremonies {
    pub fn new(rp_id: &str, rp_name: &str, origin: &Url) -> Result<Self, WebauthnError> {
        let webauthn = WebauthnBuilder::new(rp_id, origin)
            .map_err(|e| WebauthnError::Configuration(e.to_string()))?
            .rp_name(rp_name)
            .build()
            .map_err(|e| WebauthnError::Configuration(e.to_string()))?;
        Ok(Self { webauthn })
    }

    pub fn from_config() -> Result<Self, WebauthnError> {
        let config = common::Config::get();
        let origin = Url::parse(&config.webauthn_rp_origin)
            .map_err(|e| WebauthnError::Configuration(e.to_string()))?;
        Self::new(&config.webauthn_rp_id, &config.webauthn_rp_name, &origin)
    }
}

/// Handed to the client to drive `navigator.credentials.create()`.
#[derive(Debug, Serialize)]
pub struct RegistrationStart {
    pub challenge_ref: String,
    pub creation_options: CreationChallengeResponse,
}

/// Handed to the client to drive `navigator.credentials.get()`.
#[derive(Debug, Serialize)]
pub struct AuthenticationStart {
    pub challenge_ref: String,
    pub request_options: RequestChallengeResponse,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CredentialSummary {
    pub credential_id: String,
    pub sign_count: i64,
    pub created_at: chrono::DateTime<Utc>,
    pub last_used_at: Option<chrono::DateTime<Utc>>,
}

impl From<webauthn_credential::Model> for CredentialSummary {
    fn from(model: webauthn_credential::Model) -> Self {
        Self {
            credential_id: model.credential_id,
            sign_count: model.sign_count,
            created_at: model.created_at,
            last_used_at: model.last_used_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResult {
    pub user_id: i64,
    pub credential_id: String,
    pub session_token: String,
}

/// Stable ceremony identity for a user. Derived from the row id so the
/// authenticator sees the same handle across ceremonies.
fn ceremony_user_id(user: &user::Model) -> Uuid {
    Uuid::from_u64_pair(0, user.id as u64)
}

fn new_challenge_ref() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Reported counters that fail to advance past the stored value indicate a
/// cloned authenticator. Authenticators that never implement a counter
/// report zero forever; a zero-to-zero transition is tolerated.
fn counter_indicates_clone(stored: i64, reported: i64) -> bool {
    (reported != 0 || stored != 0) && reported <= stored
}

/// Initial sign count as recorded inside the serialized credential.
fn passkey_sign_count(passkey_json: &str) -> i64 {
    serde_json::from_str::<serde_json::Value>(passkey_json)
        .ok()
        .as_ref()
        .and_then(|v| v.get("cred"))
        .and_then(|c| c.get("counter"))
        .and_then(|c| c.as_u64())
        .unwrap_or(0) as i64
}

async fn stored_passkeys(
    db: &DatabaseConnection,
    user_id: i64,
) -> Result<Vec<(webauthn_credential::Model, Passkey)>, WebauthnError> {
    let rows = webauthn_credential::Model::find_all_for_user(db, user_id).await?;
    let mut passkeys = Vec::with_capacity(rows.len());
    for row in rows {
        let passkey: Passkey = serde_json::from_str(&row.passkey_json)?;
        passkeys.push((row, passkey));
    }
    Ok(passkeys)
}

/// Atomically claims a live challenge for one user and ceremony kind. The
/// row is deleted on success, so a second claim of the same ref fails even
/// under concurrency.
async fn claim_challenge(
    db: &DatabaseConnection,
    challenge_ref: &str,
    user_id: i64,
    ceremony: Ceremony,
) -> Result<webauthn_challenge::Model, WebauthnError> {
    let challenge = webauthn_challenge::Model::find_live(db, challenge_ref)
        .await?
        .ok_or(WebauthnError::InvalidOrExpiredChallenge)?;

    if challenge.ceremony != ceremony {
        return Err(WebauthnError::InvalidOrExpiredChallenge);
    }
    if challenge.user_id != user_id {
        // Cross-user reuse is only called out for authentication; a
        // registration scope mismatch stays indistinguishable from a
        // missing challenge.
        return Err(match ceremony {
            Ceremony::Authentication => WebauthnError::ChallengeUserMismatch,
            Ceremony::Registration => WebauthnError::InvalidOrExpiredChallenge,
        });
    }
    if !webauthn_challenge::Model::consume(db, challenge_ref).await? {
        return Err(WebauthnError::InvalidOrExpiredChallenge);
    }
    Ok(challenge)
}

/// Starts a registration ceremony for an existing user. Credentials the
/// user already holds are excluded so the authenticator refuses to
/// re-register them.
pub async fn begin_registration(
    db: &DatabaseConnection,
    ceremonies: &WebauthnCeremonies,
    user_id: i64,
) -> Result<RegistrationStart, WebauthnError> {
    let user = user::Model::find_by_id(db, user_id)
        .await?
        .ok_or(WebauthnError::UserNotFound)?;

    let exclude: Vec<_> = stored_passkeys(db, user.id)
        .await?
        .into_iter()
        .map(|(_, p)| p.cred_id().clone())
        .collect();
    let exclude = if exclude.is_empty() { None } else { Some(exclude) };

    let (creation_options, reg_state) = ceremonies
        .webauthn
        .start_passkey_registration(
            ceremony_user_id(&user),
            &user.username,
            &user.full_name,
            exclude,
        )
        .map_err(|e| WebauthnError::VerificationFailed(e.to_string()))?;

    let challenge_ref = new_challenge_ref();
    let state_json = serde_json::to_string(&reg_state)?;
    webauthn_challenge::Model::create(db, &challenge_ref, user.id, Ceremony::Registration, &state_json)
        .await?;

    log::info!("passkey registration started for user {}", user.id);
    Ok(RegistrationStart {
        challenge_ref,
        creation_options,
    })
}

/// Completes registration and stores the new credential. The challenge is
/// burned before the attestation is verified.
pub async fn finish_registration(
    db: &DatabaseConnection,
    ceremonies: &WebauthnCeremonies,
    user_id: i64,
    challenge_ref: &str,
    response: &RegisterPublicKeyCredential,
) -> Result<CredentialSummary, WebauthnError> {
    let challenge = claim_challenge(db, challenge_ref, user_id, Ceremony::Registration).await?;
    let reg_state: PasskeyRegistration = serde_json::from_str(&challenge.state_json)?;

    let passkey = ceremonies
        .webauthn
        .finish_passkey_registration(response, &reg_state)
        .map_err(|e| WebauthnError::VerificationFailed(e.to_string()))?;

    let credential_id = hex::encode(&passkey.cred_id()[..]);
    let passkey_json = serde_json::to_string(&passkey)?;
    let sign_count = passkey_sign_count(&passkey_json);

    let created = webauthn_credential::Model::create(
        db,
        user_id,
        &credential_id,
        &passkey_json,
        sign_count,
    )
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            WebauthnError::DuplicateCredential
        } else {
            WebauthnError::Db(e)
        }
    })?;

    log::info!("passkey registered for user {user_id}");
    Ok(created.into())
}

/// Starts an authentication ceremony over all of the user's credentials.
pub async fn begin_authentication(
    db: &DatabaseConnection,
    ceremonies: &WebauthnCeremonies,
    user_id: i64,
) -> Result<AuthenticationStart, WebauthnError> {
    let user = user::Model::find_by_id(db, user_id)
        .await?
        .ok_or(WebauthnError::UserNotFound)?;

    let passkeys: Vec<Passkey> = stored_passkeys(db, user.id)
        .await?
        .into_iter()
        .map(|(_, p)| p)
        .collect();
    if passkeys.is_empty() {
        return Err(WebauthnError::NoCredentialsRegistered);
    }

    let (request_options, auth_state) = ceremonies
        .webauthn
        .start_passkey_authentication(&passkeys)
        .map_err(|e| WebauthnError::VerificationFailed(e.to_string()))?;

    let challenge_ref = new_challenge_ref();
    let state_json = serde_json::to_string(&auth_state)?;
    webauthn_challenge::Model::create(
        db,
        &challenge_ref,
        user.id,
        Ceremony::Authentication,
        &state_json,
    )
    .await?;

    Ok(AuthenticationStart {
        challenge_ref,
        request_options,
    })
}

/// Completes authentication: verifies the assertion, enforces counter
/// advancement, records the use and issues a session token.
pub async fn finish_authentication(
    db: &DatabaseConnection,
    ceremonies: &WebauthnCeremonies,
    signer: &SessionSigner,
    user_id: i64,
    challenge_ref: &str,
    response: &PublicKeyCredential,
) -> Result<AuthResult, WebauthnError> {
    let challenge = claim_challenge(db, challenge_ref, user_id, Ceremony::Authentication).await?;
    let auth_state: PasskeyAuthentication = serde_json::from_str(&challenge.state_json)?;

    let result: AuthenticationResult = ceremonies
        .webauthn
        .finish_passkey_authentication(response, &auth_state)
        .map_err(|e| WebauthnError::VerificationFailed(e.to_string()))?;

    let credential_id = hex::encode(&result.cred_id()[..]);
    let stored = webauthn_credential::Model::find_by_credential_id(db, &credential_id)
        .await?
        .filter(|c| c.user_id == user_id)
        .ok_or(WebauthnError::CredentialNotRegistered)?;

    let reported = result.counter() as i64;
    if counter_indicates_clone(stored.sign_count, reported) {
        log::warn!(
            "credential {} for user {} reported counter {} (stored {}); rejecting",
            credential_id,
            user_id,
            reported,
            stored.sign_count
        );
        return Err(WebauthnError::PossibleCloneDetected);
    }

    // Fold the result back into the serialized credential so the library
    // sees the advanced counter on the next ceremony.
    let mut passkey: Passkey = serde_json::from_str(&stored.passkey_json)?;
    passkey.update_credential(&result);
    let refreshed_json = serde_json::to_string(&passkey)?;
    stored.record_use(db, &refreshed_json, reported, Utc::now()).await?;

    let user = user::Model::find_by_id(db, user_id)
        .await?
        .ok_or(WebauthnError::UserNotFound)?;
    let session_token = signer.issue(&user)?;

    log::info!("passkey authentication succeeded for user {user_id}");
    Ok(AuthResult {
        user_id,
        credential_id,
        session_token,
    })
}

/// The user's registered credentials, without key material.
pub async fn list_credentials(
    db: &DatabaseConnection,
    user_id: i64,
) -> Result<Vec<CredentialSummary>, WebauthnError> {
    user::Model::find_by_id(db, user_id)
        .await?
        .ok_or(WebauthnError::UserNotFound)?;
    let rows = webauthn_credential::Model::find_all_for_user(db, user_id).await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// Drops expired challenge rows. Safe to run at any time.
pub async fn cleanup_expired_challenges(db: &DatabaseConnection) -> Result<u64, WebauthnError> {
    Ok(webauthn_challenge::Model::cleanup_expired(db).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use db::models::user::Role;
    use db::test_utils::setup_test_db;
    use sea_orm::ActiveModelTrait;
    use sea_orm::ActiveValue::Set;

    fn ceremonies() -> WebauthnCeremonies {
        let origin = Url::parse("https://school.example.edu").unwrap();
        WebauthnCeremonies::new("school.example.edu", "Example School", &origin).unwrap()
    }

    async fn seed_user(db: &DatabaseConnection) -> user::Model {
        user::Model::create(db, "t1", "t1@example.edu", "Teacher One", Role::Teacher, None)
            .await
            .unwrap()
    }

    #[test]
    fn counter_rules() {
        // Regression means a clone.
        assert!(counter_indicates_clone(10, 5));
        // Replay of the same value too.
        assert!(counter_indicates_clone(10, 10));
        // Normal advancement.
        assert!(!counter_indicates_clone(10, 11));
        // Authenticators without a counter stay at zero.
        assert!(!counter_indicates_clone(0, 0));
        // A counter that starts moving must keep moving.
        assert!(!counter_indicates_clone(0, 1));
        assert!(counter_indicates_clone(1, 0));
    }

    #[test]
    fn sign_count_extraction_tolerates_shape_changes() {
        assert_eq!(passkey_sign_count(r#"{"cred": {"counter": 7}}"#), 7);
        assert_eq!(passkey_sign_count(r#"{"cred": {}}"#), 0);
        assert_eq!(passkey_sign_count("not json"), 0);
    }

    #[tokio::test]
    async fn begin_registration_persists_a_live_challenge() {
        let db = setup_test_db().await;
        let user = seed_user(&db).await;

        let start = begin_registration(&db, &ceremonies(), user.id).await.unwrap();
        assert!(!start.challenge_ref.is_empty());

        let row = webauthn_challenge::Model::find_live(&db, &start.challenge_ref)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.user_id, user.id);
        assert_eq!(row.ceremony, Ceremony::Registration);
        assert!(row.expires_at > Utc::now());
    }

    #[tokio::test]
    async fn registration_requires_an_existing_user() {
        let db = setup_test_db().await;
        let result = begin_registration(&db, &ceremonies(), 9999).await;
        assert!(matches!(result, Err(WebauthnError::UserNotFound)));
    }

    #[tokio::test]
    async fn authentication_needs_at_least_one_credential() {
        let db = setup_test_db().await;
        let user = seed_user(&db).await;
        let result = begin_authentication(&db, &ceremonies(), user.id).await;
        assert!(matches!(result, Err(WebauthnError::NoCredentialsRegistered)));
    }

    #[tokio::test]
    async fn challenges_are_single_use() {
        let db = setup_test_db().await;
        let user = seed_user(&db).await;
        webauthn_challenge::Model::create(&db, "ref-1", user.id, Ceremony::Registration, "{}")
            .await
            .unwrap();

        let claimed = claim_challenge(&db, "ref-1", user.id, Ceremony::Registration)
            .await
            .unwrap();
        assert_eq!(claimed.challenge_ref, "ref-1");

        let again = claim_challenge(&db, "ref-1", user.id, Ceremony::Registration).await;
        assert!(matches!(again, Err(WebauthnError::InvalidOrExpiredChallenge)));
    }

    #[tokio::test]
    async fn claims_reject_wrong_user_and_wrong_ceremony() {
        let db = setup_test_db().await;
        let user = seed_user(&db).await;
        let other = user::Model::create(&db, "t2", "t2@example.edu", "T Two", Role::Teacher, None)
            .await
            .unwrap();
        webauthn_challenge::Model::create(&db, "ref-2", user.id, Ceremony::Registration, "{}")
            .await
            .unwrap();
        webauthn_challenge::Model::create(&db, "ref-3", user.id, Ceremony::Authentication, "{}")
            .await
            .unwrap();

        // Registration scope mismatches stay indistinguishable from a
        // missing challenge.
        let wrong_user = claim_challenge(&db, "ref-2", other.id, Ceremony::Registration).await;
        assert!(matches!(wrong_user, Err(WebauthnError::InvalidOrExpiredChallenge)));

        let wrong_kind = claim_challenge(&db, "ref-2", user.id, Ceremony::Authentication).await;
        assert!(matches!(wrong_kind, Err(WebauthnError::InvalidOrExpiredChallenge)));

        // Cross-user authentication reuse is named explicitly.
        let cross_user = claim_challenge(&db, "ref-3", other.id, Ceremony::Authentication).await;
        assert!(matches!(cross_user, Err(WebauthnError::ChallengeUserMismatch)));

        // No failed claim burned a challenge.
        for challenge_ref in ["ref-2", "ref-3"] {
            assert!(
                webauthn_challenge::Model::find_live(&db, challenge_ref)
                    .await
                    .unwrap()
                    .is_some()
            );
        }
    }

    #[tokio::test]
    async fn expired_challenges_cannot_be_claimed() {
        let db = setup_test_db().await;
        let user = seed_user(&db).await;
        let past = Utc::now() - Duration::minutes(1);
        webauthn_challenge::ActiveModel {
            challenge_ref: Set("old-ref".to_string()),
            user_id: Set(user.id),
            ceremony: Set(Ceremony::Authentication),
            state_json: Set("{}".to_string()),
            created_at: Set(past - Duration::minutes(5)),
            expires_at: Set(past),
        }
        .insert(&db)
        .await
        .unwrap();

        let result = claim_challenge(&db, "old-ref", user.id, Ceremony::Authentication).await;
        assert!(matches!(result, Err(WebauthnError::InvalidOrExpiredChallenge)));

        assert_eq!(cleanup_expired_challenges(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn credential_listing_hides_key_material() {
        let db = setup_test_db().await;
        let user = seed_user(&db).await;
        webauthn_credential::Model::create(&db, user.id, "abcd1234", "{\"cred\":{}}", 0)
            .await
            .unwrap();

        let summaries = list_credentials(&db, user.id).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].credential_id, "abcd1234");
        assert_eq!(summaries[0].sign_count, 0);
    }
}
