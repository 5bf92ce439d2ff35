use crate::auth::jwt::JwtConfig;

/// Default interval between background expiry sweeps.
pub const DEFAULT_EXPIRY_SWEEP_INTERVAL_SECS: u64 = 60;

/// Server configuration loaded from environment variables.
///
/// All fields except the JWT secret have defaults suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for background tasks, in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Seconds between sweeps that expire overdue pending requests (default: `60`).
    pub expiry_sweep_interval_secs: u64,
    /// JWT token configuration.
    pub jwt: JwtConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                 |
    /// |------------------------------|-------------------------|
    /// | `HOST`                       | `0.0.0.0`               |
    /// | `PORT`                       | `3000`                  |
    /// | `CORS_ORIGINS`               | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`       | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS`      | `30`                    |
    /// | `EXPIRY_SWEEP_INTERVAL_SECS` | `60`                    |
    ///
    /// # Panics
    ///
    /// Panics on unparsable numbers and when `JWT_SECRET` is missing, so a
    /// misconfigured server never starts.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let expiry_sweep_interval_secs: u64 = std::env::var("EXPIRY_SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| DEFAULT_EXPIRY_SWEEP_INTERVAL_SECS.to_string())
            .parse()
            .expect("EXPIRY_SWEEP_INTERVAL_SECS must be a valid u64");
        assert!(
            expiry_sweep_interval_secs > 0,
            "EXPIRY_SWEEP_INTERVAL_SECS must be positive"
        );

        let jwt = JwtConfig::from_env();

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            expiry_sweep_interval_secs,
            jwt,
        }
    }
}
