use anyhow::Context;
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub gateway: GatewayConfig,
    pub credential_cache_ttl: Duration,
    pub max_conflict_retries: u32,
    pub vault: Option<VaultConfig>,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub breaker_failure_threshold: u32,
    pub breaker_reset: Duration,
}

impl GatewayConfig {
    /// Defaults suitable for tests and local runs against `url`.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 16,
            max_retries: 3,
            backoff_base: Duration::from_millis(200),
            backoff_max: Duration::from_secs(5),
            breaker_failure_threshold: 5,
            breaker_reset: Duration::from_secs(30),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.backoff_base.is_zero() || self.backoff_base > self.backoff_max {
            anyhow::bail!(
                "GATEWAY_BACKOFF_BASE_MS must be positive and not exceed GATEWAY_BACKOFF_MAX_MS"
            );
        }
        // The breaker's reset backoff has whole-second resolution.
        if self.breaker_reset < Duration::from_secs(1) {
            anyhow::bail!("GATEWAY_BREAKER_RESET_SECS must be at least 1");
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct VaultConfig {
    pub addr: String,
    pub role_id: String,
    pub secret_id: String,
    pub auth_mount: String,
    pub kv_mount: String,
}

impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("addr", &self.addr)
            .field("role_id", &self.role_id)
            .field("secret_id", &"****")
            .field("auth_mount", &self.auth_mount)
            .field("kv_mount", &self.kv_mount)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        let gateway_url = env::var("GATEWAY_URL").context("GATEWAY_URL is required")?;
        url::Url::parse(&gateway_url).context("GATEWAY_URL is not a valid URL")?;

        let gateway = GatewayConfig {
            url: gateway_url,
            connect_timeout: Duration::from_millis(parse_or("GATEWAY_CONNECT_TIMEOUT_MS", 5_000)?),
            request_timeout: Duration::from_millis(parse_or("GATEWAY_REQUEST_TIMEOUT_MS", 30_000)?),
            pool_idle_timeout: Duration::from_secs(parse_or("GATEWAY_POOL_IDLE_TIMEOUT_SECS", 90)?),
            pool_max_idle_per_host: parse_or("GATEWAY_POOL_MAX_IDLE_PER_HOST", 16)?,
            max_retries: parse_or("GATEWAY_MAX_RETRIES", 3)?,
            backoff_base: Duration::from_millis(parse_or("GATEWAY_BACKOFF_BASE_MS", 200)?),
            backoff_max: Duration::from_millis(parse_or("GATEWAY_BACKOFF_MAX_MS", 5_000)?),
            breaker_failure_threshold: parse_or("GATEWAY_BREAKER_THRESHOLD", 5)?,
            breaker_reset: Duration::from_secs(parse_or("GATEWAY_BREAKER_RESET_SECS", 30)?),
        };

        gateway.validate()?;

        let vault = match env::var("VAULT_ROLE_ID") {
            Ok(role_id) => Some(VaultConfig {
                addr: env::var("VAULT_ADDR")
                    .unwrap_or_else(|_| "http://127.0.0.1:8200".to_string()),
                role_id,
                secret_id: env::var("VAULT_SECRET_ID")
                    .context("VAULT_SECRET_ID is required when VAULT_ROLE_ID is set")?,
                auth_mount: env::var("VAULT_AUTH_MOUNT").unwrap_or_else(|_| "approle".to_string()),
                kv_mount: env::var("VAULT_KV_MOUNT").unwrap_or_else(|_| "secret".to_string()),
            }),
            Err(_) => None,
        };

        Ok(Config {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL is required")?,
            gateway,
            credential_cache_ttl: Duration::from_secs(parse_or("CREDENTIAL_CACHE_TTL_SECS", 300)?),
            max_conflict_retries: parse_or("MAX_CONFLICT_RETRIES", 3)?,
            vault,
        })
    }
}

fn parse_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", key, raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_or_falls_back_to_default() {
        let value: u32 = parse_or("PAYGATE_TEST_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_parse_or_rejects_garbage() {
        env::set_var("PAYGATE_TEST_BAD_NUMBER", "seven");
        let result: anyhow::Result<u32> = parse_or("PAYGATE_TEST_BAD_NUMBER", 7);
        assert!(result.is_err());
        env::remove_var("PAYGATE_TEST_BAD_NUMBER");
    }

    #[test]
    fn test_gateway_config_validation() {
        let config = GatewayConfig::with_url("http://127.0.0.1:1/");
        assert!(config.validate().is_ok());

        let zero_reset = GatewayConfig {
            breaker_reset: Duration::ZERO,
            ..config.clone()
        };
        assert!(zero_reset.validate().is_err());

        let inverted = GatewayConfig {
            backoff_base: Duration::from_secs(10),
            ..config
        };
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_vault_config_debug_masks_secret_id() {
        let vault = VaultConfig {
            addr: "http://127.0.0.1:8200".to_string(),
            role_id: "role".to_string(),
            secret_id: "hunter2".to_string(),
            auth_mount: "approle".to_string(),
            kv_mount: "secret".to_string(),
        };
        assert!(!format!("{:?}", vault).contains("hunter2"));
    }
}
