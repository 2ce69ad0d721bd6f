use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m202601120004_create_teacher_attendance"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("teacher_attendance"))
                    .if_not_exists()
                    .col(ColumnDef::new(Alias::new("id")).big_integer().not_null().auto_increment().primary_key())
                    .col(ColumnDef::new(Alias::new("teacher_id")).big_integer().not_null())
                    .col(ColumnDef::new(Alias::new("check_in_time")).timestamp().not_null())
                    .col(ColumnDef::new(Alias::new("check_out_time")).timestamp())
                    .col(ColumnDef::new(Alias::new("status")).string().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_teacher_attendance_teacher")
                            .from(Alias::new("teacher_attendance"), Alias::new("teacher_id"))
                            .to(Alias::new("users"), Alias::new("id"))
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Partial unique index: at most one open record per teacher. The index
        // builder cannot express the WHERE clause, so raw SQL it is.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS uq_teacher_attendance_open \
                 ON teacher_attendance (teacher_id) WHERE status = 'checked-in'",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Alias::new("teacher_attendance")).to_owned())
            .await
    }
}
