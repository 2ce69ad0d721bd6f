//! QR device pairing: an unauthenticated device starts a session and
//! renders the token as a QR code; an authenticated device scans and
//! approves it; the first device polls until it is handed a session token.
//! Approved sessions are deleted the moment the token is released.

use std::io::Cursor;

use chrono::{Duration, Utc};
use db::models::qr_login_session::{self, QrStatus};
use db::models::user;
use image::{GrayImage, Luma};
use qrcode::{Color, QrCode};
use sea_orm::{DatabaseConnection, DbErr};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::token::{SessionSigner, TokenError};

/// How long a pairing session stays usable after creation.
pub const QR_SESSION_TTL_MINUTES: i64 = 5;

const QR_MODULE_PIXELS: u32 = 8;
const QR_QUIET_MODULES: u32 = 4;

#[derive(Debug, Error)]
pub enum QrLoginError {
    #[error("pairing session not found")]
    SessionNotFound,
    #[error("pairing session has expired")]
    SessionExpired,
    #[error("pairing session is not pending")]
    NotPending,
    #[error("approving user not found")]
    UserNotFound,
    #[error("failed to render QR code: {0}")]
    QrRender(String),
    #[error("database error: {0}")]
    Db(#[from] DbErr),
    #[error(transparent)]
    Token(#[from] TokenError),
}

#[derive(Debug, Clone, Serialize)]
pub struct StartedQrLogin {
    pub token: String,
    /// PNG image of the token, ready to display on the unauthenticated
    /// device.
    #[serde(skip)]
    pub png: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollOutcome {
    pub status: QrStatus,
    /// Present exactly once, on the first poll that observes approval.
    pub session_token: Option<String>,
}

fn render_png(token: &str) -> Result<Vec<u8>, QrLoginError> {
    let code = QrCode::new(token.as_bytes()).map_err(|e| QrLoginError::QrRender(e.to_string()))?;
    let modules = code.width() as u32;
    let side = (modules + 2 * QR_QUIET_MODULES) * QR_MODULE_PIXELS;
    let colors = code.to_colors();

    let mut img = GrayImage::from_pixel(side, side, Luma([255u8]));
    for (i, color) in colors.iter().enumerate() {
        if *color == Color::Dark {
            let mx = (i as u32 % modules + QR_QUIET_MODULES) * QR_MODULE_PIXELS;
            let my = (i as u32 / modules + QR_QUIET_MODULES) * QR_MODULE_PIXELS;
            for dy in 0..QR_MODULE_PIXELS {
                for dx in 0..QR_MODULE_PIXELS {
                    img.put_pixel(mx + dx, my + dy, Luma([0u8]));
                }
            }
        }
    }

    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| QrLoginError::QrRender(e.to_string()))?;
    Ok(png)
}

/// Creates a pending session and returns its token plus the rendered QR
/// image. No authentication is required to call this.
pub async fn start(db: &DatabaseConnection) -> Result<StartedQrLogin, QrLoginError> {
    let token = Uuid::new_v4().simple().to_string();
    let png = render_png(&token)?;
    qr_login_session::Model::create_pending(db, &token).await?;
    log::info!("qr pairing session started");
    Ok(StartedQrLogin { token, png })
}

fn is_stale(session: &qr_login_session::Model) -> bool {
    Utc::now() - session.created_at > Duration::minutes(QR_SESSION_TTL_MINUTES)
}

/// Approves a pending session on behalf of an authenticated user. A session
/// that already left the pending state is reported as such before its age
/// is considered.
pub async fn approve(
    db: &DatabaseConnection,
    token: &str,
    user_id: i64,
) -> Result<(), QrLoginError> {
    let session = qr_login_session::Model::find_by_token(db, token)
        .await?
        .ok_or(QrLoginError::SessionNotFound)?;

    match session.status {
        QrStatus::Approved => return Err(QrLoginError::NotPending),
        QrStatus::Expired => return Err(QrLoginError::SessionExpired),
        QrStatus::Pending => {}
    }

    if is_stale(&session) {
        session.expire(db).await?;
        return Err(QrLoginError::SessionExpired);
    }

    let user = user::Model::find_by_id(db, user_id)
        .await?
        .ok_or(QrLoginError::UserNotFound)?;

    session.approve(db, user.id).await?;
    log::info!("qr pairing session approved by user {}", user.id);
    Ok(())
}

/// Polled by the unauthenticated device. The first poll that sees an
/// approved session deletes it and receives the session token; any later
/// poll of the same token reports the session as gone.
pub async fn poll(
    db: &DatabaseConnection,
    signer: &SessionSigner,
    token: &str,
) -> Result<PollOutcome, QrLoginError> {
    let session = qr_login_session::Model::find_by_token(db, token)
        .await?
        .ok_or(QrLoginError::SessionNotFound)?;

    match session.status {
        QrStatus::Pending => {
            if is_stale(&session) {
                session.expire(db).await?;
                return Ok(PollOutcome {
                    status: QrStatus::Expired,
                    session_token: None,
                });
            }
            Ok(PollOutcome {
                status: QrStatus::Pending,
                session_token: None,
            })
        }
        QrStatus::Expired => Ok(PollOutcome {
            status: QrStatus::Expired,
            session_token: None,
        }),
        QrStatus::Approved => {
            let user_id = session.user_id.ok_or(QrLoginError::SessionNotFound)?;
            // Single-use handoff: only the poll that deletes the row may
            // issue a token.
            if !qr_login_session::Model::take(db, token).await? {
                return Err(QrLoginError::SessionNotFound);
            }
            let user = user::Model::find_by_id(db, user_id)
                .await?
                .ok_or(QrLoginError::UserNotFound)?;
            let session_token = signer.issue(&user)?;
            log::info!("qr pairing completed for user {}", user.id);
            Ok(PollOutcome {
                status: QrStatus::Approved,
                session_token: Some(session_token),
            })
        }
    }
}

/// Deletes expired sessions and pending sessions past the TTL.
pub async fn cleanup_expired(db: &DatabaseConnection) -> Result<u64, QrLoginError> {
    let cutoff = Utc::now() - Duration::minutes(QR_SESSION_TTL_MINUTES);
    let removed = qr_login_session::Model::cleanup_stale(db, cutoff).await?;
    if removed > 0 {
        log::info!("removed {removed} stale qr pairing session(s)");
    }
    Ok(removed)
}
