use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};
use chrono::Duration;

/// Secrets that ship in sample files and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["", "change-me", "dev-secret-change-me", "secret", "changeme"];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = lookup("AGORA_JWT_SECRET").context("AGORA_JWT_SECRET must be set")?;
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.trim()) {
            bail!("AGORA_JWT_SECRET is a placeholder; set a real secret");
        }

        let port = lookup("AGORA_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("AGORA_PORT must be a port number")?;
        let access_minutes: i64 = lookup("AGORA_ACCESS_TOKEN_MINUTES")
            .unwrap_or_else(|| "60".into())
            .parse()
            .context("AGORA_ACCESS_TOKEN_MINUTES must be an integer")?;
        let refresh_days: i64 = lookup("AGORA_REFRESH_TOKEN_DAYS")
            .unwrap_or_else(|| "30".into())
            .parse()
            .context("AGORA_REFRESH_TOKEN_DAYS must be an integer")?;
        let access_ttl = token_lifetime(access_minutes, Duration::try_minutes, "AGORA_ACCESS_TOKEN_MINUTES")?;
        let refresh_ttl = token_lifetime(refresh_days, Duration::try_days, "AGORA_REFRESH_TOKEN_DAYS")?;

        Ok(Self {
            host: lookup("AGORA_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: PathBuf::from(lookup("AGORA_DB_PATH").unwrap_or_else(|| "agora.db".into())),
            jwt_secret,
            access_ttl,
            refresh_ttl,
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

/// Token lifetimes must be positive and small enough that `now + ttl` stays
/// a valid timestamp.
fn token_lifetime(
    value: i64,
    unit: fn(i64) -> Option<Duration>,
    var: &str,
) -> anyhow::Result<Duration> {
    const MAX_TTL_DAYS: i64 = 3650;

    let ttl = match unit(value) {
        Some(ttl) if value > 0 => ttl,
        _ => bail!("{var} must be a positive number"),
    };
    if ttl > Duration::days(MAX_TTL_DAYS) {
        bail!("{var} must not exceed {MAX_TTL_DAYS} days");
    }
    Ok(ttl)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = config(&[("AGORA_JWT_SECRET", "a-long-random-value")]).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_path, PathBuf::from("agora.db"));
        assert_eq!(config.access_ttl, Duration::minutes(60));
        assert_eq!(config.refresh_ttl, Duration::days(30));
        assert_eq!(config.addr().unwrap().to_string(), "0.0.0.0:3000");
    }

    #[test]
    fn secret_is_required_and_not_a_placeholder() {
        assert!(config(&[]).is_err());
        assert!(config(&[("AGORA_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn bad_numbers_are_reported() {
        let err = config(&[("AGORA_JWT_SECRET", "s3cr3t-value"), ("AGORA_PORT", "http")]).unwrap_err();
        assert!(err.to_string().contains("AGORA_PORT"));
    }

    #[test]
    fn token_lifetimes_are_bounded() {
        let secret = ("AGORA_JWT_SECRET", "s3cr3t-value");
        let huge = i64::MAX.to_string();
        assert!(config(&[secret, ("AGORA_ACCESS_TOKEN_MINUTES", "0")]).is_err());
        assert!(config(&[secret, ("AGORA_REFRESH_TOKEN_DAYS", "-1")]).is_err());
        assert!(config(&[secret, ("AGORA_ACCESS_TOKEN_MINUTES", huge.as_str())]).is_err());
        assert!(config(&[secret, ("AGORA_REFRESH_TOKEN_DAYS", "9223372036854775")]).is_err());

        let config = config(&[secret, ("AGORA_REFRESH_TOKEN_DAYS", "365")]).unwrap();
        assert_eq!(config.refresh_ttl, Duration::days(365));
    }
}
