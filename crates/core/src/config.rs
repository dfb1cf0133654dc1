use anyhow::Context;
use axum::http::HeaderValue;
use coral_shared::SessionCoordinates;
use std::env;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CorsOrigins {
    Any,
    List(Vec<HeaderValue>),
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub coral: SessionCoordinates,
    pub polling_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub database_url: String,
    pub port: u16,
    pub bind_address: String,
    pub cors_origins: CorsOrigins,
    pub event_channel_capacity: usize,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_ranged<T>(name: &str, default: &str, min: T, max: T) -> anyhow::Result<T>
where
    T: std::str::FromStr + PartialOrd + std::fmt::Display + Copy,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = var_or(name, default);
    let value = raw
        .trim()
        .parse::<T>()
        .with_context(|| format!("Failed to parse {name} ('{raw}')"))?;
    if value < min || value > max {
        anyhow::bail!("{name} must be between {min} and {max} (got {value})");
    }
    Ok(value)
}

fn required(name: &str, default: &str) -> anyhow::Result<String> {
    let value = var_or(name, default).trim().to_string();
    if value.is_empty() {
        anyhow::bail!("{name} must not be empty");
    }
    Ok(value)
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let server = required("CORAL_SERVER_URL", "http://coral.pushcollective.club:5555")?;
        if !server.starts_with("http://") && !server.starts_with("https://") {
            anyhow::bail!("CORAL_SERVER_URL must start with http:// or https:// (got '{server}')");
        }

        let devmode = var_or("CORAL_DEVMODE", "true")
            .parse::<bool>()
            .context("Failed to parse CORAL_DEVMODE")?;

        let coral = SessionCoordinates::new(
            server,
            required("APPLICATION_ID", "exampleApplication")?,
            required("PRIVACY_KEY", "privkey")?,
            required("SESSION_ID", "b842deb1-95e9-419a-8f57-10bd35ce80d4")?,
        )
        .with_devmode(devmode);

        let polling_interval_secs = parse_ranged("POLLING_INTERVAL", "5", 1u64, 3600)?;
        let request_timeout_secs = parse_ranged("CORAL_REQUEST_TIMEOUT_SECS", "10", 1u64, 300)?;
        let port = parse_ranged("PORT", "8080", 1u16, u16::MAX)?;
        let event_channel_capacity = parse_ranged("EVENT_CHANNEL_CAPACITY", "256", 1usize, 65536)?;

        let database_url = var_or("DATABASE_URL", "sqlite:coral_monitor.db");

        let bind_address = var_or("BIND_ADDRESS", "0.0.0.0");
        bind_address.parse::<std::net::IpAddr>().with_context(|| {
            format!("Invalid BIND_ADDRESS '{bind_address}': must be a valid IP address")
        })?;

        let cors_origins = parse_cors_origins(&var_or("CORS_ORIGINS", "*"));

        Ok(Self {
            coral,
            polling_interval_secs,
            request_timeout_secs,
            database_url,
            port,
            bind_address,
            cors_origins,
            event_channel_capacity,
        })
    }

    #[must_use]
    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_secs)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// `*` allows any origin. Otherwise a comma list; entries that are not
/// http(s) origins are skipped with a warning.
pub fn parse_cors_origins(raw: &str) -> CorsOrigins {
    if raw.trim() == "*" {
        return CorsOrigins::Any;
    }
    let origins = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|origin| {
            if !origin.starts_with("http://") && !origin.starts_with("https://") {
                tracing::warn!("Skipping CORS origin with invalid scheme '{}'", origin);
                return None;
            }
            match origin.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!("Skipping invalid CORS origin '{}': {}", origin, e);
                    None
                }
            }
        })
        .collect();
    CorsOrigins::List(origins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct EnvGuard(&'static str);

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            std::env::remove_var(self.0);
        }
    }

    #[test]
    fn test_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        for name in [
            "CORAL_SERVER_URL",
            "APPLICATION_ID",
            "PRIVACY_KEY",
            "SESSION_ID",
            "CORAL_DEVMODE",
            "POLLING_INTERVAL",
            "PORT",
            "CORS_ORIGINS",
        ] {
            std::env::remove_var(name);
        }
        let config = AppConfig::load().unwrap();
        assert_eq!(config.polling_interval_secs, 5);
        assert_eq!(config.port, 8080);
        assert!(config.coral.devmode);
        assert_eq!(
            config.coral.rest_url("agents"),
            "http://coral.pushcollective.club:5555/devmode/exampleApplication/privkey/b842deb1-95e9-419a-8f57-10bd35ce80d4/agents"
        );
        assert_eq!(config.cors_origins, CorsOrigins::Any);
        assert_eq!(config.polling_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_polling_interval_out_of_range() {
        let _lock = ENV_LOCK.lock().unwrap();
        std::env::set_var("POLLING_INTERVAL", "0");
        let _guard = EnvGuard("POLLING_INTERVAL");
        assert!(AppConfig::load().is_err());
    }

    #[test]
    fn test_server_url_requires_scheme() {
        let _lock = ENV_LOCK.lock().unwrap();
        std::env::set_var("CORAL_SERVER_URL", "coral.example:5555");
        let _guard = EnvGuard("CORAL_SERVER_URL");
        assert!(AppConfig::load().is_err());
    }

    #[test]
    fn test_invalid_bind_address() {
        let _lock = ENV_LOCK.lock().unwrap();
        std::env::set_var("BIND_ADDRESS", "not-an-ip");
        let _guard = EnvGuard("BIND_ADDRESS");
        assert!(AppConfig::load().is_err());
    }

    #[test]
    fn test_cors_origin_list_skips_invalid() {
        match parse_cors_origins("http://localhost:5173, file:///etc, https://coral.example") {
            CorsOrigins::List(list) => {
                assert_eq!(list.len(), 2);
                assert_eq!(list[0], "http://localhost:5173");
            }
            CorsOrigins::Any => panic!("expected list"),
        }
    }
}
