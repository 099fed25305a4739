use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unsupported DATABASE_URL scheme in {0:?}; expected sqlite:// or a file path")]
    UnsupportedDatabase(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentProfile {
    Development,
    Production,
    Testing,
}

impl DeploymentProfile {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("production") | Some("prod") => DeploymentProfile::Production,
            Some("testing") | Some("test") => DeploymentProfile::Testing,
            _ => DeploymentProfile::Development,
        }
    }
}

/// Hosting platform, detected from the markers each one injects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Railway,
    Render,
    Vercel,
    Other,
}

impl Platform {
    fn detect(env: &HashMap<String, String>) -> Self {
        if env.contains_key("VERCEL") {
            Platform::Vercel
        } else if env.contains_key("RENDER") {
            Platform::Render
        } else if env.contains_key("RAILWAY_ENVIRONMENT") {
            Platform::Railway
        } else {
            Platform::Other
        }
    }

    fn default_port(self) -> u16 {
        match self {
            Platform::Render => 10000,
            _ => 5000,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Railway => "railway",
            Platform::Render => "render",
            Platform::Vercel => "vercel",
            Platform::Other => "other",
        };
        f.write_str(name)
    }
}

#[derive(Clone)]
pub struct AdminUser {
    pub id: i64,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for AdminUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminUser")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub profile: DeploymentProfile,
    pub platform: Platform,
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub admin_users: Vec<AdminUser>,
    pub db_connect_retries: u32,
    pub db_retry_delay: Duration,
}

impl AppConfig {
    /// Reads the process environment; `.env` must already be loaded.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars().collect())
    }

    /// Resolves configuration from an explicit variable map.
    pub fn from_vars(env: HashMap<String, String>) -> Result<Self, ConfigError> {
        let var = |key: &str| env.get(key).map(String::as_str).filter(|v| !v.is_empty());

        let profile = DeploymentProfile::parse(var("APP_ENV").or_else(|| var("FLASK_ENV")));
        let platform = Platform::detect(&env);

        let port = match var("PORT") {
            None => platform.default_port(),
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!("Invalid PORT value {:?}, using {}", raw, platform.default_port());
                platform.default_port()
            }),
        };

        let database_path = match profile {
            DeploymentProfile::Testing => ":memory:".to_string(),
            _ => database_path(var("DATABASE_URL").unwrap_or("filetrack.db"))?,
        };

        let admin_users = vec![
            AdminUser {
                id: 1,
                username: var("ADMIN_USER_1").unwrap_or("sdfmagra").to_string(),
                password: var("ADMIN_PASS_1").unwrap_or("Admin@123").to_string(),
            },
            AdminUser {
                id: 2,
                username: var("ADMIN_USER_2").unwrap_or("adfmagra").to_string(),
                password: var("ADMIN_PASS_2").unwrap_or("Admin@1234").to_string(),
            },
        ];

        Ok(Self {
            profile,
            platform,
            host: var("HOST").unwrap_or("0.0.0.0").to_string(),
            port,
            database_path,
            admin_users,
            db_connect_retries: var("DB_CONNECT_RETRIES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            db_retry_delay: Duration::from_secs(
                var("DB_RETRY_DELAY_SECS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(2),
            ),
        })
    }

    pub fn secure_cookies(&self) -> bool {
        self.profile == DeploymentProfile::Production
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `sqlite:///rel.db` is relative and `sqlite:////abs/f.db` absolute, as in
/// SQLAlchemy URLs. A bare `sqlite://` is an in-memory database.
fn database_path(url: &str) -> Result<String, ConfigError> {
    let url = url.trim();
    let path = url
        .strip_prefix("sqlite:///")
        .or_else(|| url.strip_prefix("sqlite://"))
        .or_else(|| url.strip_prefix("sqlite:"));
    if let Some(path) = path {
        return Ok(if path.is_empty() { ":memory:" } else { path }.to_string());
    }
    if url.contains("://") {
        return Err(ConfigError::UnsupportedDatabase(
            url.split("://").next().unwrap_or_default().to_string(),
        ));
    }
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults() {
        let config = AppConfig::from_vars(HashMap::new()).unwrap();
        assert_eq!(config.profile, DeploymentProfile::Development);
        assert_eq!(config.platform, Platform::Other);
        assert_eq!(config.port, 5000);
        assert_eq!(config.database_path, "filetrack.db");
        assert_eq!(config.admin_users[0].username, "sdfmagra");
        assert_eq!(config.admin_users[1].id, 2);
        assert!(!config.secure_cookies());
    }

    #[test]
    fn render_gets_its_own_default_port() {
        let config = AppConfig::from_vars(vars(&[("RENDER", "1"), ("PORT", "abc")])).unwrap();
        assert_eq!(config.platform, Platform::Render);
        assert_eq!(config.port, 10000);
    }

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn invalid_port_is_logged() {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let config = tracing::subscriber::with_default(subscriber, || {
            AppConfig::from_vars(vars(&[("PORT", "not-a-port")]))
        })
        .unwrap();

        assert_eq!(config.port, 5000);
        let output = String::from_utf8(log.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("WARN"), "{output}");
        assert!(output.contains("Invalid PORT value \"not-a-port\""), "{output}");
    }

    #[test]
    fn vercel_wins_over_other_markers() {
        let config =
            AppConfig::from_vars(vars(&[("VERCEL", "1"), ("RAILWAY_ENVIRONMENT", "prod")]))
                .unwrap();
        assert_eq!(config.platform, Platform::Vercel);
        assert_eq!(config.platform.to_string(), "vercel");
    }

    #[test]
    fn legacy_flask_env_selects_profile() {
        let config = AppConfig::from_vars(vars(&[("FLASK_ENV", "production")])).unwrap();
        assert_eq!(config.profile, DeploymentProfile::Production);
        assert!(config.secure_cookies());

        let config = AppConfig::from_vars(vars(&[
            ("FLASK_ENV", "production"),
            ("APP_ENV", "testing"),
            ("DATABASE_URL", "sqlite:///var/data/files.db"),
        ]))
        .unwrap();
        assert_eq!(config.profile, DeploymentProfile::Testing);
        assert_eq!(config.database_path, ":memory:");
    }

    #[test]
    fn database_url_forms() {
        assert_eq!(database_path("sqlite:///data/f.db").unwrap(), "data/f.db");
        assert_eq!(database_path("sqlite:////var/data/f.db").unwrap(), "/var/data/f.db");
        assert_eq!(database_path("sqlite://").unwrap(), ":memory:");
        assert_eq!(database_path("sqlite:f.db").unwrap(), "f.db");
        assert_eq!(database_path("data/f.db").unwrap(), "data/f.db");
        assert_eq!(
            database_path("postgres://u:p@host:5432/db"),
            Err(ConfigError::UnsupportedDatabase("postgres".into()))
        );
    }

    #[test]
    fn admin_credentials_come_from_env() {
        let config = AppConfig::from_vars(vars(&[
            ("ADMIN_USER_1", "clerk"),
            ("ADMIN_PASS_1", "s3cret"),
        ]))
        .unwrap();
        assert_eq!(config.admin_users[0].username, "clerk");
        assert_eq!(config.admin_users[0].password, "s3cret");
        assert!(!format!("{:?}", config.admin_users[0]).contains("s3cret"));
    }
}
