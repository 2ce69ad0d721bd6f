use chrono::{DateTime, Duration, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;
use serde::Serialize;
use strum::{Display, EnumString};

/// How long an unused challenge stays redeemable.
pub const CHALLENGE_TTL_MINUTES: i64 = 5;

/// An outstanding single-use ceremony challenge, keyed by an opaque random
/// ref handed to the client. `state_json` carries the serialized server-side
/// ceremony state (the actual challenge bytes live inside it). Rows are
/// deleted on consumption and ignored once expired.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "webauthn_challenges")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub challenge_ref: String,
    pub user_id: i64,
    pub ceremony: Ceremony,
    pub state_json: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Display, EnumString, Serialize,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "webauthn_ceremony")]
#[strum(serialize_all = "lowercase")]
pub enum Ceremony {
    #[sea_orm(string_value = "registration")]
    Registration,
    #[sea_orm(string_value = "authentication")]
    Authentication,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub async fn create(
        db: &DatabaseConnection,
        challenge_ref: &str,
        user_id: i64,
        ceremony: Ceremony,
        state_json: &str,
    ) -> Result<Self, DbErr> {
        let now = Utc::now();
        ActiveModel {
            challenge_ref: Set(challenge_ref.to_owned()),
            user_id: Set(user_id),
            ceremony: Set(ceremony),
            state_json: Set(state_json.to_owned()),
            created_at: Set(now),
            expires_at: Set(now + Duration::minutes(CHALLENGE_TTL_MINUTES)),
        }
        .insert(db)
        .await
    }

    /// Looks up a challenge that has not lazily expired.
    pub async fn find_live(
        db: &DatabaseConnection,
        challenge_ref: &str,
    ) -> Result<Option<Self>, DbErr> {
        Entity::find_by_id(challenge_ref)
            .filter(Column::ExpiresAt.gt(Utc::now()))
            .one(db)
            .await
    }

    /// Deletes the challenge row, returning whether this caller won it.
    /// Two concurrent consumers cannot both observe `true`.
    pub async fn consume(db: &DatabaseConnection, challenge_ref: &str) -> Result<bool, DbErr> {
        let res = Entity::delete_by_id(challenge_ref).exec(db).await?;
        Ok(res.rows_affected == 1)
    }

    /// Operational sweep of stale rows; correctness never depends on it.
    pub async fn cleanup_expired(db: &DatabaseConnection) -> Result<u64, DbErr> {
        let res = Entity::delete_many()
            .filter(Column::ExpiresAt.lte(Utc::now()))
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }
}
