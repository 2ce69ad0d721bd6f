use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::entity::prelude::*;
use serde::Serialize;

/// A registered passkey. `passkey_json` is the serialized library-side
/// credential (public key included); `credential_id` is its hex-encoded
/// identifier and is globally unique. `sign_count` is the only field that
/// changes after registration.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "webauthn_credentials")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: i64,
    pub credential_id: String,
    pub passkey_json: String,
    pub sign_count: i64,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub async fn create(
        db: &DatabaseConnection,
        user_id: i64,
        credential_id: &str,
        passkey_json: &str,
        sign_count: i64,
    ) -> Result<Self, DbErr> {
        ActiveModel {
            id: NotSet,
            user_id: Set(user_id),
            credential_id: Set(credential_id.to_owned()),
            passkey_json: Set(passkey_json.to_owned()),
            sign_count: Set(sign_count),
            created_at: Set(Utc::now()),
            last_used_at: Set(None),
        }
        .insert(db)
        .await
    }

    pub async fn find_by_credential_id(
        db: &DatabaseConnection,
        credential_id: &str,
    ) -> Result<Option<Self>, DbErr> {
        Entity::find()
            .filter(Column::CredentialId.eq(credential_id))
            .one(db)
            .await
    }

    pub async fn find_all_for_user(
        db: &DatabaseConnection,
        user_id: i64,
    ) -> Result<Vec<Self>, DbErr> {
        Entity::find()
            .filter(Column::UserId.eq(user_id))
            .all(db)
            .await
    }

    /// Persists the outcome of a successful authentication: the refreshed
    /// serialized credential, its new counter and the use timestamp.
    pub async fn record_use(
        self,
        db: &DatabaseConnection,
        passkey_json: &str,
        new_sign_count: i64,
        now: DateTime<Utc>,
    ) -> Result<Self, DbErr> {
        let mut active: ActiveModel = self.into();
        active.passkey_json = Set(passkey_json.to_owned());
        active.sign_count = Set(new_sign_count);
        active.last_used_at = Set(Some(now));
        active.update(db).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::{self, Role};
    use crate::test_utils::setup_test_db;

    #[tokio::test]
    async fn record_use_persists_counter_json_and_timestamp() {
        let db = setup_test_db().await;
        let user = user::Model::create(&db, "t1", "t1@example.edu", "T One", Role::Teacher, None)
            .await
            .unwrap();
        let cred = Model::create(&db, user.id, "abcd1234", r#"{"cred":{"counter":10}}"#, 10)
            .await
            .unwrap();
        assert!(cred.last_used_at.is_none());

        cred.record_use(&db, r#"{"cred":{"counter":11}}"#, 11, Utc::now())
            .await
            .unwrap();

        let reloaded = Model::find_by_credential_id(&db, "abcd1234")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.sign_count, 11);
        assert_eq!(reloaded.passkey_json, r#"{"cred":{"counter":11}}"#);
        assert!(reloaded.last_used_at.is_some());
    }
}
