use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::entity::prelude::*;
use sea_orm::QueryOrder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// One check-in/check-out interval for a teacher's physical presence.
/// A partial unique index keeps at most one `checked-in` row per teacher.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "teacher_attendance")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub teacher_id: i64,
    pub check_in_time: DateTime<Utc>,
    pub check_out_time: Option<DateTime<Utc>>,
    pub status: PresenceStatus,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Display, EnumString, Deserialize, Serialize,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "presence_status")]
pub enum PresenceStatus {
    #[sea_orm(string_value = "checked-in")]
    #[serde(rename = "checked-in")]
    #[strum(serialize = "checked-in")]
    CheckedIn,
    #[sea_orm(string_value = "checked-out")]
    #[serde(rename = "checked-out")]
    #[strum(serialize = "checked-out")]
    CheckedOut,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::TeacherId",
        to = "super::user::Column::Id"
    )]
    Teacher,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Teacher.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// The teacher's open record, if any. At most one exists by constraint;
    /// ordering is belt-and-braces for pre-constraint data.
    pub async fn find_open_for(
        db: &DatabaseConnection,
        teacher_id: i64,
    ) -> Result<Option<Self>, DbErr> {
        Entity::find()
            .filter(Column::TeacherId.eq(teacher_id))
            .filter(Column::Status.eq(PresenceStatus::CheckedIn))
            .order_by_desc(Column::CheckInTime)
            .one(db)
            .await
    }

    pub async fn open_record(
        db: &DatabaseConnection,
        teacher_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Self, DbErr> {
        ActiveModel {
            id: NotSet,
            teacher_id: Set(teacher_id),
            check_in_time: Set(now),
            check_out_time: Set(None),
            status: Set(PresenceStatus::CheckedIn),
        }
        .insert(db)
        .await
    }

    pub async fn close(
        self,
        db: &DatabaseConnection,
        now: DateTime<Utc>,
    ) -> Result<Self, DbErr> {
        let mut active: ActiveModel = self.into();
        active.check_out_time = Set(Some(now));
        active.status = Set(PresenceStatus::CheckedOut);
        active.update(db).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::{self, Role};
    use crate::test_utils::setup_test_db;

    #[tokio::test]
    async fn at_most_one_open_record_per_teacher() {
        let db = setup_test_db().await;
        let teacher = user::Model::create(&db, "t1", "t1@example.edu", "T One", Role::Teacher, None)
            .await
            .unwrap();

        let first = Model::open_record(&db, teacher.id, Utc::now()).await.unwrap();

        let second = Model::open_record(&db, teacher.id, Utc::now()).await;
        assert!(crate::is_unique_violation(&second.unwrap_err()));

        // Closing the record frees the slot for a new one.
        first.close(&db, Utc::now()).await.unwrap();
        Model::open_record(&db, teacher.id, Utc::now()).await.unwrap();

        let open = Model::find_open_for(&db, teacher.id).await.unwrap().unwrap();
        assert_eq!(open.status, PresenceStatus::CheckedIn);
    }
}
