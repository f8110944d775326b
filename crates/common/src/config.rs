use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string. When unset, in-memory stores are used.
    pub database_url: Option<String>,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// JWT secret for API authentication
    pub jwt_secret: String,

    /// JWT token expiry in hours
    pub jwt_expiry_hours: u64,

    /// VAPID public key (URL-safe base64), handed to devices
    pub vapid_public_key: Option<String>,

    /// VAPID private key (URL-safe base64), used to sign push requests
    pub vapid_private_key: Option<String>,

    /// VAPID subject claim, e.g. `mailto:ops@example.com`
    pub vapid_subject: Option<String>,

    /// Maximum number of in-flight deliveries per campaign (default: 32)
    pub push_max_concurrency: usize,

    /// Per-attempt delivery timeout in seconds, 0 disables it (default: 30)
    pub push_delivery_timeout_secs: u64,

    /// TTL handed to the push service in seconds (default: 86400)
    pub push_ttl_seconds: u32,

    /// Port the API server listens on (default: 3000)
    pub api_port: u16,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: non_empty_var("DATABASE_URL"),
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            jwt_secret: std::env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?,
            jwt_expiry_hours: std::env::var("JWT_EXPIRY_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("JWT_EXPIRY_HOURS must be a valid u64"))?,
            vapid_public_key: non_empty_var("VAPID_PUBLIC_KEY"),
            vapid_private_key: non_empty_var("VAPID_PRIVATE_KEY"),
            vapid_subject: non_empty_var("VAPID_SUBJECT"),
            push_max_concurrency: std::env::var("PUSH_MAX_CONCURRENCY")
                .unwrap_or_else(|_| "32".to_string())
                .parse::<usize>()
                .map_err(|_| anyhow::anyhow!("PUSH_MAX_CONCURRENCY must be a valid usize"))?
                .max(1),
            push_delivery_timeout_secs: std::env::var("PUSH_DELIVERY_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PUSH_DELIVERY_TIMEOUT_SECS must be a valid u64"))?,
            push_ttl_seconds: std::env::var("PUSH_TTL_SECONDS")
                .unwrap_or_else(|_| "86400".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PUSH_TTL_SECONDS must be a valid u32"))?,
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("API_PORT must be a valid u16"))?,
        })
    }

    /// Per-attempt delivery timeout, `None` when disabled.
    pub fn delivery_timeout(&self) -> Option<std::time::Duration> {
        match self.push_delivery_timeout_secs {
            0 => None,
            secs => Some(std::time::Duration::from_secs(secs)),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_timeout(secs: u64) -> AppConfig {
        AppConfig {
            database_url: None,
            db_max_connections: 5,
            jwt_secret: "secret".to_string(),
            jwt_expiry_hours: 24,
            vapid_public_key: None,
            vapid_private_key: None,
            vapid_subject: None,
            push_max_concurrency: 32,
            push_delivery_timeout_secs: secs,
            push_ttl_seconds: 86400,
            api_port: 3000,
        }
    }

    #[test]
    fn test_zero_timeout_disables_it() {
        assert_eq!(config_with_timeout(0).delivery_timeout(), None);
    }

    #[test]
    fn test_timeout_in_seconds() {
        assert_eq!(
            config_with_timeout(15).delivery_timeout(),
            Some(std::time::Duration::from_secs(15))
        );
    }
}
