use anyhow::Context;
use once_cell::sync::OnceCell;
use serde::Deserialize;

/// Deployment mode. Controls how much detail the error normalizer leaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

static ENVIRONMENT: OnceCell<Environment> = OnceCell::new();

/// Deployment mode frozen at startup. Defaults to development when
/// `AppConfig::from_env` has not run (unit tests).
pub fn environment() -> Environment {
    ENVIRONMENT
        .get()
        .copied()
        .unwrap_or(Environment::Development)
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub expires_in_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database_url: String,
    pub jwt: JwtConfig,
    pub email: EmailConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = match std::env::var("APP_ENV").as_deref() {
            Ok("production") => Environment::Production,
            _ => Environment::Development,
        };
        let _ = ENVIRONMENT.set(environment);

        // The connection string may carry a <PASSWORD> placeholder so the
        // real password can live in a separate variable.
        let mut database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        if let Ok(password) = std::env::var("DATABASE_PASSWORD") {
            database_url = database_url.replace("<PASSWORD>", &password);
        }

        let secret = std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?;
        anyhow::ensure!(!secret.is_empty(), "JWT_SECRET must not be empty");
        let jwt = JwtConfig {
            secret,
            expires_in_minutes: std::env::var("JWT_EXPIRES_IN_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(90 * 24 * 60),
        };

        let email = EmailConfig {
            host: std::env::var("EMAIL_HOST").unwrap_or_else(|_| "localhost".into()),
            port: std::env::var("EMAIL_PORT")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(2525),
            username: std::env::var("EMAIL_USERNAME").unwrap_or_default(),
            password: std::env::var("EMAIL_PASSWORD").unwrap_or_default(),
            from: std::env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "Tourbase <noreply@tourbase.local>".into()),
        };

        Ok(Self {
            environment,
            database_url,
            jwt,
            email,
        })
    }
}
