pub mod schema;

pub use schema::{
    default_config_path, Config, LocalWatchConfig, NotifierBackend, NotifierConfig, RemoteConfig,
    SmtpConfig, StorageConfig, SupervisorConfig, ACCESS_TOKEN_ENV, SMTP_PASSWORD_ENV,
};
