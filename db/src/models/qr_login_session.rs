use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A short-lived device-pairing handshake, keyed by its random token.
/// Created unauthenticated, approved by an authenticated device, and deleted
/// the moment an approved poll hands out a session token.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "qr_login_sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub token: String,
    pub status: QrStatus,
    pub user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Display, EnumString, Deserialize, Serialize,
)]
#[serde(rename_all = "lowercase")]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "qr_login_status")]
#[strum(serialize_all = "lowercase")]
pub enum QrStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "expired")]
    Expired,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub async fn create_pending(db: &DatabaseConnection, token: &str) -> Result<Self, DbErr> {
        ActiveModel {
            token: Set(token.to_owned()),
            status: Set(QrStatus::Pending),
            user_id: Set(None),
            created_at: Set(Utc::now()),
        }
        .insert(db)
        .await
    }

    pub async fn find_by_token(
        db: &DatabaseConnection,
        token: &str,
    ) -> Result<Option<Self>, DbErr> {
        Entity::find_by_id(token).one(db).await
    }

    pub async fn approve(self, db: &DatabaseConnection, user_id: i64) -> Result<Self, DbErr> {
        let mut active: ActiveModel = self.into();
        active.status = Set(QrStatus::Approved);
        active.user_id = Set(Some(user_id));
        active.update(db).await
    }

    pub async fn expire(self, db: &DatabaseConnection) -> Result<Self, DbErr> {
        let mut active: ActiveModel = self.into();
        active.status = Set(QrStatus::Expired);
        active.update(db).await
    }

    /// Deletes the session, returning whether this caller actually removed it.
    /// Concurrent approved polls race on this; only the winner may issue a
    /// session token.
    pub async fn take(db: &DatabaseConnection, token: &str) -> Result<bool, DbErr> {
        let res = Entity::delete_by_id(token).exec(db).await?;
        Ok(res.rows_affected == 1)
    }

    /// Removes expired rows and pending rows past the cutoff.
    pub async fn cleanup_stale(
        db: &DatabaseConnection,
        pending_cutoff: DateTime<Utc>,
    ) -> Result<u64, DbErr> {
        let res = Entity::delete_many()
            .filter(
                Column::Status.eq(QrStatus::Expired).or(Column::Status
                    .eq(QrStatus::Pending)
                    .and(Column::CreatedAt.lt(pending_cutoff))),
            )
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }
}
