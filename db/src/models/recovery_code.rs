use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::Expr;
use serde::Serialize;

/// Hash of one single-use recovery code. Plain codes are never stored;
/// lookup is by deterministic hash.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "recovery_codes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: i64,
    pub code_hash: String,
    pub used: bool,
    pub created_at: DateTime<Utc>,
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
        code_hash: &str,
    ) -> Result<Self, DbErr> {
        ActiveModel {
            id: NotSet,
            user_id: Set(user_id),
            code_hash: Set(code_hash.to_owned()),
            used: Set(false),
            created_at: Set(Utc::now()),
        }
        .insert(db)
        .await
    }

    pub async fn find_by_hash(
        db: &DatabaseConnection,
        code_hash: &str,
    ) -> Result<Option<Self>, DbErr> {
        Entity::find()
            .filter(Column::CodeHash.eq(code_hash))
            .one(db)
            .await
    }

    /// Issuing a fresh batch invalidates every prior code for the user.
    pub async fn delete_all_for_user(db: &DatabaseConnection, user_id: i64) -> Result<u64, DbErr> {
        let res = Entity::delete_many()
            .filter(Column::UserId.eq(user_id))
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }

    /// Guarded mark-used: flips `used` only if it is still false, returning
    /// whether this caller won the flip. The loser of a concurrent redemption
    /// race observes `false`.
    pub async fn mark_used(db: &DatabaseConnection, id: i64) -> Result<bool, DbErr> {
        let res = Entity::update_many()
            .col_expr(Column::Used, Expr::value(true))
            .filter(Column::Id.eq(id))
            .filter(Column::Used.eq(false))
            .exec(db)
            .await?;
        Ok(res.rows_affected == 1)
    }
}
