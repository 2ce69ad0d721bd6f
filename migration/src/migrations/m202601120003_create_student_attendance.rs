use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m202601120003_create_student_attendance"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("student_attendance"))
                    .if_not_exists()
                    .col(ColumnDef::new(Alias::new("id")).big_integer().not_null().auto_increment().primary_key())
                    .col(ColumnDef::new(Alias::new("student_id")).big_integer().not_null())
                    .col(ColumnDef::new(Alias::new("school_class_id")).big_integer().not_null())
                    .col(ColumnDef::new(Alias::new("marked_by_teacher_id")).big_integer())
                    .col(ColumnDef::new(Alias::new("attendance_date")).date().not_null())
                    .col(ColumnDef::new(Alias::new("session")).string().not_null())
                    .col(ColumnDef::new(Alias::new("status")).string().not_null())
                    .col(ColumnDef::new(Alias::new("created_at")).timestamp().not_null().default(Expr::cust("CURRENT_TIMESTAMP")))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_student_attendance_student")
                            .from(Alias::new("student_attendance"), Alias::new("student_id"))
                            .to(Alias::new("users"), Alias::new("id"))
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_student_attendance_class")
                            .from(Alias::new("student_attendance"), Alias::new("school_class_id"))
                            .to(Alias::new("school_classes"), Alias::new("id"))
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_student_attendance_teacher")
                            .from(Alias::new("student_attendance"), Alias::new("marked_by_teacher_id"))
                            .to(Alias::new("users"), Alias::new("id"))
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // At most one mark per (student, date, session).
        manager
            .create_index(
                Index::create()
                    .name("uq_student_attendance_date_session")
                    .table(Alias::new("student_attendance"))
                    .col(Alias::new("student_id"))
                    .col(Alias::new("attendance_date"))
                    .col(Alias::new("session"))
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Alias::new("student_attendance")).to_owned())
            .await
    }
}
