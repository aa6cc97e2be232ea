use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("telemetry setup failed: {message}")]
    Telemetry { message: String },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("locale error: {message}")]
    Locale { message: String },
}

impl InfraError {
    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry {
            message: message.into(),
        }
    }

    pub fn locale(message: impl Into<String>) -> Self {
        Self::Locale {
            message: message.into(),
        }
    }
}
