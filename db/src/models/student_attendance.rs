use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::entity::prelude::*;
use sea_orm::{DatabaseTransaction, QueryOrder};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// One student's presence mark for one (student, date, session) triple.
/// The storage layer enforces the uniqueness of that triple; rows are never
/// updated in place and never deleted automatically.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "student_attendance")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub student_id: i64,
    pub school_class_id: i64,
    pub marked_by_teacher_id: Option<i64>,
    pub attendance_date: NaiveDate,
    pub session: Session,
    pub status: Status,
    pub created_at: DateTime<Utc>,
}

/// Half-day teaching period (not a login session).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Display, EnumString, Deserialize, Serialize,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "attendance_session")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Session {
    #[sea_orm(string_value = "MORNING")]
    #[serde(rename = "MORNING")]
    Morning,
    #[sea_orm(string_value = "AFTERNOON")]
    #[serde(rename = "AFTERNOON")]
    Afternoon,
}

impl Session {
    /// Position within the school day; the stored strings sort the wrong
    /// way round lexically.
    pub fn order_in_day(self) -> u8 {
        match self {
            Session::Morning => 0,
            Session::Afternoon => 1,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Display, EnumString, Deserialize, Serialize,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "attendance_status")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Status {
    #[sea_orm(string_value = "PRESENT")]
    #[serde(rename = "PRESENT")]
    Present,
    #[sea_orm(string_value = "ABSENT")]
    #[serde(rename = "ABSENT")]
    Absent,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::StudentId",
        to = "super::user::Column::Id"
    )]
    Student,
    #[sea_orm(
        belongs_to = "super::school_class::Entity",
        from = "Column::SchoolClassId",
        to = "super::school_class::Column::Id"
    )]
    SchoolClass,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::MarkedByTeacherId",
        to = "super::user::Column::Id"
    )]
    MarkedByTeacher,
}

impl Related<super::school_class::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SchoolClass.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub async fn find_for_student_on(
        db: &DatabaseConnection,
        student_id: i64,
        date: NaiveDate,
        session: Session,
    ) -> Result<Option<Self>, DbErr> {
        Entity::find()
            .filter(Column::StudentId.eq(student_id))
            .filter(Column::AttendanceDate.eq(date))
            .filter(Column::Session.eq(session))
            .one(db)
            .await
    }

    pub async fn find_for_class_on(
        db: &DatabaseConnection,
        school_class_id: i64,
        date: NaiveDate,
        session: Session,
    ) -> Result<Vec<Self>, DbErr> {
        Entity::find()
            .filter(Column::SchoolClassId.eq(school_class_id))
            .filter(Column::AttendanceDate.eq(date))
            .filter(Column::Session.eq(session))
            .order_by_asc(Column::StudentId)
            .all(db)
            .await
    }

    /// Attendance history for one student over an inclusive date range,
    /// newest first. Within a date, the afternoon session precedes the
    /// morning one.
    pub async fn find_for_student_between(
        db: &DatabaseConnection,
        student_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Self>, DbErr> {
        let mut rows = Entity::find()
            .filter(Column::StudentId.eq(student_id))
            .filter(Column::AttendanceDate.gte(from))
            .filter(Column::AttendanceDate.lte(to))
            .order_by_desc(Column::AttendanceDate)
            .all(db)
            .await?;
        rows.sort_by(|a, b| {
            b.attendance_date
                .cmp(&a.attendance_date)
                .then(b.session.order_in_day().cmp(&a.session.order_in_day()))
        });
        Ok(rows)
    }

    /// Inserts one mark inside a batch transaction. The unique index on
    /// (student_id, attendance_date, session) is the last line of defense
    /// against concurrent double submission.
    pub async fn insert_in_txn(
        txn: &DatabaseTransaction,
        student_id: i64,
        school_class_id: i64,
        marked_by_teacher_id: i64,
        date: NaiveDate,
        session: Session,
        status: Status,
    ) -> Result<Self, DbErr> {
        ActiveModel {
            id: NotSet,
            student_id: Set(student_id),
            school_class_id: Set(school_class_id),
            marked_by_teacher_id: Set(Some(marked_by_teacher_id)),
            attendance_date: Set(date),
            session: Set(session),
            status: Set(status),
            created_at: Set(Utc::now()),
        }
        .insert(txn)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::{self, Role};
    use crate::models::school_class;
    use crate::test_utils::setup_test_db;
    use sea_orm::TransactionTrait;

    #[tokio::test]
    async fn storage_rejects_duplicate_marks_for_a_session() {
        let db = setup_test_db().await;
        let class = school_class::Model::create(&db, "7A", "Grade 7A", None)
            .await
            .unwrap();
        let teacher = user::Model::create(&db, "t1", "t1@example.edu", "T One", Role::Teacher, None)
            .await
            .unwrap();
        let student = user::Model::create(
            &db,
            "s1",
            "s1@example.edu",
            "S One",
            Role::Student,
            Some(class.id),
        )
        .await
        .unwrap();
        let date = chrono::NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();

        let txn = db.begin().await.unwrap();
        Model::insert_in_txn(
            &txn,
            student.id,
            class.id,
            teacher.id,
            date,
            Session::Morning,
            Status::Present,
        )
        .await
        .unwrap();
        txn.commit().await.unwrap();

        let txn = db.begin().await.unwrap();
        let dup = Model::insert_in_txn(
            &txn,
            student.id,
            class.id,
            teacher.id,
            date,
            Session::Morning,
            Status::Absent,
        )
        .await;
        assert!(crate::is_unique_violation(&dup.unwrap_err()));
        txn.rollback().await.unwrap();

        // The afternoon session is a different key.
        let txn = db.begin().await.unwrap();
        Model::insert_in_txn(
            &txn,
            student.id,
            class.id,
            teacher.id,
            date,
            Session::Afternoon,
            Status::Present,
        )
        .await
        .unwrap();
        txn.commit().await.unwrap();
    }

    #[tokio::test]
    async fn history_orders_afternoon_before_morning_within_a_date() {
        let db = setup_test_db().await;
        let class = school_class::Model::create(&db, "7B", "Grade 7B", None)
            .await
            .unwrap();
        let teacher = user::Model::create(&db, "t2", "t2@example.edu", "T Two", Role::Teacher, None)
            .await
            .unwrap();
        let student = user::Model::create(
            &db,
            "s2",
            "s2@example.edu",
            "S Two",
            Role::Student,
            Some(class.id),
        )
        .await
        .unwrap();
        let monday = chrono::NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        let tuesday = chrono::NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();

        for (date, session) in [
            (monday, Session::Morning),
            (tuesday, Session::Morning),
            (tuesday, Session::Afternoon),
        ] {
            let txn = db.begin().await.unwrap();
            Model::insert_in_txn(
                &txn,
                student.id,
                class.id,
                teacher.id,
                date,
                session,
                Status::Present,
            )
            .await
            .unwrap();
            txn.commit().await.unwrap();
        }

        let rows = Model::find_for_student_between(&db, student.id, monday, tuesday)
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].attendance_date, tuesday);
        assert_eq!(rows[0].session, Session::Afternoon);
        assert_eq!(rows[1].attendance_date, tuesday);
        assert_eq!(rows[1].session, Session::Morning);
        assert_eq!(rows[2].attendance_date, monday);
    }
}
