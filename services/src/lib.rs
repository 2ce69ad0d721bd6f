pub mod attendance;
pub mod geofence;
pub mod presence;
pub mod qr_login;
pub mod recovery_code;
pub mod token;
pub mod webauthn;
