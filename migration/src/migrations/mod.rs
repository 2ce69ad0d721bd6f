pub mod m202601120001_create_school_classes;
pub mod m202601120002_create_users;
pub mod m202601120003_create_student_attendance;
pub mod m202601120004_create_teacher_attendance;
pub mod m202601120005_create_webauthn_credentials;
pub mod m202601120006_create_webauthn_challenges;
pub mod m202601120007_create_recovery_codes;
pub mod m202601120008_create_qr_login_sessions;
