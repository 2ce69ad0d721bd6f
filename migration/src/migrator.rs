use sea_orm_migration::prelude::*;

use crate::migrations;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(migrations::m202601120001_create_school_classes::Migration),
            Box::new(migrations::m202601120002_create_users::Migration),
            Box::new(migrations::m202601120003_create_student_attendance::Migration),
            Box::new(migrations::m202601120004_create_teacher_attendance::Migration),
            Box::new(migrations::m202601120005_create_webauthn_credentials::Migration),
            Box::new(migrations::m202601120006_create_webauthn_challenges::Migration),
            Box::new(migrations::m202601120007_create_recovery_codes::Migration),
            Box::new(migrations::m202601120008_create_qr_login_sessions::Migration),
        ]
    }
}
