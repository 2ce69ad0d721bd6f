use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::entity::prelude::*;

use crate::models::user::{self, Role};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, serde::Serialize)]
#[sea_orm(table_name = "school_classes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub class_code: String,
    pub name: String,
    pub homeroom_teacher_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::user::Entity")]
    Students,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Students.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub async fn create(
        db: &DatabaseConnection,
        class_code: &str,
        name: &str,
        homeroom_teacher_id: Option<i64>,
    ) -> Result<Self, DbErr> {
        ActiveModel {
            id: NotSet,
            class_code: Set(class_code.to_owned()),
            name: Set(name.to_owned()),
            homeroom_teacher_id: Set(homeroom_teacher_id),
            created_at: Set(Utc::now()),
        }
        .insert(db)
        .await
    }

    pub async fn find_by_id(db: &DatabaseConnection, id: i64) -> Result<Option<Self>, DbErr> {
        Entity::find_by_id(id).one(db).await
    }

    pub async fn find_by_code(db: &DatabaseConnection, code: &str) -> Result<Option<Self>, DbErr> {
        Entity::find()
            .filter(Column::ClassCode.eq(code))
            .one(db)
            .await
    }

    /// Users currently enrolled in this class with the student role.
    pub async fn enrolled_students(
        db: &DatabaseConnection,
        class_id: i64,
    ) -> Result<Vec<user::Model>, DbErr> {
        user::Entity::find()
            .filter(user::Column::SchoolClassId.eq(class_id))
            .filter(user::Column::Role.eq(Role::Student))
            .all(db)
            .await
    }

    pub async fn enrolled_student_count(
        db: &DatabaseConnection,
        class_id: i64,
    ) -> Result<u64, DbErr> {
        user::Entity::find()
            .filter(user::Column::SchoolClassId.eq(class_id))
            .filter(user::Column::Role.eq(Role::Student))
            .count(db)
            .await
    }
}
