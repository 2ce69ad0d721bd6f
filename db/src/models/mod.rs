pub mod qr_login_session;
pub mod recovery_code;
pub mod school_class;
pub mod student_attendance;
pub mod teacher_attendance;
pub mod user;
pub mod webauthn_challenge;
pub mod webauthn_credential;

pub use qr_login_session::Entity as QrLoginSession;
pub use recovery_code::Entity as RecoveryCode;
pub use school_class::Entity as SchoolClass;
pub use student_attendance::Entity as StudentAttendance;
pub use teacher_attendance::Entity as TeacherAttendance;
pub use user::Entity as User;
pub use webauthn_challenge::Entity as WebauthnChallenge;
pub use webauthn_credential::Entity as WebauthnCredential;
