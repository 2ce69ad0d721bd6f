use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::{env, fs};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub project_name: String,
    pub log_level: String,
    pub log_file: String,
    pub database_path: String,
    pub jwt_secret: String,
    pub jwt_duration_minutes: i64,
    pub geofence_config_path: String,
    pub webauthn_rp_id: String,
    pub webauthn_rp_name: String,
    pub webauthn_rp_origin: String,
}

static CONFIG: OnceCell<Config> = OnceCell::new();

impl Config {
    pub fn init(env_path: &str) -> &'static Self {
        dotenvy::from_filename(env_path).ok();

        CONFIG.get_or_init(|| {
            let project_name = env::var("PROJECT_NAME").unwrap_or_else(|_| "rollcall".into());
            let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "debug".into());
            let log_file = env::var("LOG_FILE").unwrap_or_else(|_| "logs/rollcall.log".into());
            let database_path = env::var("DATABASE_PATH").expect("DATABASE_PATH must be set");

            if let Some(parent) = std::path::Path::new(&log_file).parent() {
                fs::create_dir_all(parent).expect("Failed to create log directory");
            }

            let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");
            let jwt_duration_minutes = env::var("JWT_DURATION_MINUTES")
                .ok()
                .and_then(|m| m.parse().ok())
                .unwrap_or(60);

            let geofence_config_path = env::var("GEOFENCE_CONFIG_PATH")
                .unwrap_or_else(|_| "config/geofences.json".into());

            let webauthn_rp_id =
                env::var("WEBAUTHN_RP_ID").unwrap_or_else(|_| "localhost".into());
            let webauthn_rp_name =
                env::var("WEBAUTHN_RP_NAME").unwrap_or_else(|_| "Rollcall".into());
            let webauthn_rp_origin =
                env::var("WEBAUTHN_RP_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".into());

            Config {
                project_name,
                log_level,
                log_file,
                database_path,
                jwt_secret,
                jwt_duration_minutes,
                geofence_config_path,
                webauthn_rp_id,
                webauthn_rp_name,
                webauthn_rp_origin,
            }
        })
    }

    pub fn get() -> &'static Self {
        CONFIG.get().expect("Config not initialized")
    }
}
