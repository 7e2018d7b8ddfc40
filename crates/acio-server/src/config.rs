//! Configuration management

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "localhost";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 3001;

/// Default hard deadline for the shutdown routine in milliseconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 10_000;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:./data/ib_acio.db";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Signing secret used when `JWT_SECRET` is not set. Too short for production.
pub const FALLBACK_JWT_SECRET: &str = "fallback_secret_key";

/// Minimum JWT secret length accepted in production.
pub const MIN_PRODUCTION_JWT_SECRET_LEN: usize = 32;

/// Default access token lifetime.
pub const DEFAULT_JWT_EXPIRES_IN: &str = "24h";

/// Default refresh token lifetime.
pub const DEFAULT_JWT_REFRESH_EXPIRES_IN: &str = "7d";

/// Default bcrypt cost factor.
pub const DEFAULT_BCRYPT_ROUNDS: u32 = 10;

/// Default rate limit window (15 minutes).
pub const DEFAULT_RATE_LIMIT_WINDOW_MS: u64 = 15 * 60 * 1000;

/// Default request ceiling per client and window.
pub const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u32 = 100;

/// Default request body limit (10 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Default CORS allowed origin for local development.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:3000";

/// Default Claude API base URL.
pub const DEFAULT_CLAUDE_API_URL: &str = "https://api.anthropic.com/v1";

/// Default News API base URL.
pub const DEFAULT_NEWS_API_URL: &str = "https://newsapi.org/v2";

/// Default cache entry lifetime in seconds.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Default cache capacity.
pub const DEFAULT_CACHE_MAX_SIZE: usize = 100;

/// Default API documentation path.
pub const DEFAULT_API_DOCS_PATH: &str = "/api-docs";

/// Runtime mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Relaxed mode: loopback CORS origins, detailed errors
    #[default]
    Development,
    /// Hardened mode: global rate limiting, generic error messages
    Production,
    Test,
}

impl Environment {
    /// Whether the hardened security behaviours are active
    pub fn is_hardened(self) -> bool {
        self == Environment::Production
    }

    /// Whether the relaxed development conveniences are active
    pub fn is_relaxed(self) -> bool {
        self == Environment::Development
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Test => "test",
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            "test" => Ok(Environment::Test),
            _ => Err(anyhow::anyhow!("Invalid environment: {}", s)),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub security: SecurityConfig,
    pub cors: CorsConfig,
    pub apis: ApisConfig,
    pub cache: CacheConfig,
    pub development: DevelopmentConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub shutdown_timeout_ms: u64,
}

impl ServerConfig {
    /// `host:port` as handed to the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

/// Token signing configuration. Not consumed by any mounted route yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// `None` when `JWT_SECRET` is unset; see [`JwtConfig::secret`]
    pub secret: Option<String>,
    pub expires_in: String,
    pub refresh_expires_in: String,
}

impl JwtConfig {
    /// The configured secret, or the fallback when none was provided
    pub fn secret(&self) -> &str {
        self.secret.as_deref().unwrap_or(FALLBACK_JWT_SECRET)
    }
}

/// Security thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub bcrypt_rounds: u32,
    pub rate_limit_window_ms: u64,
    pub rate_limit_max_requests: u32,
    pub max_body_bytes: usize,
}

impl SecurityConfig {
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

/// Credentials for one third-party API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalApiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_ms: u64,
}

impl ExternalApiConfig {
    /// Presence of a credential; the API itself is never probed
    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|key| !key.is_empty())
    }
}

/// Third-party APIs, reported by the detailed health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApisConfig {
    pub claude: ExternalApiConfig,
    pub news: ExternalApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevelopmentConfig {
    pub debug: bool,
    pub enable_swagger: bool,
    pub api_docs_path: String,
}

impl Config {
    /// Load configuration from the process environment and validate it.
    ///
    /// `.env` loading is the caller's job (see `main.rs`) so that logging
    /// variables from the file are visible before this runs.
    pub fn load() -> anyhow::Result<Self> {
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from an arbitrary key lookup.
    ///
    /// Unparseable numeric values fall back to their defaults; an unknown
    /// `APP_ENV` is an error. The result is not validated.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.is_empty());
        let flag = |key: &str| var(key).is_some_and(|s| s.trim() == "true");

        let environment = match var("APP_ENV") {
            Some(value) => value.parse()?,
            None => Environment::default(),
        };

        Ok(Config {
            server: ServerConfig {
                host: var("HOST").unwrap_or_else(|| DEFAULT_SERVER_HOST.to_string()),
                port: parsed(var("PORT")).unwrap_or(DEFAULT_SERVER_PORT),
                environment,
                shutdown_timeout_ms: parsed(var("SHUTDOWN_TIMEOUT_MS"))
                    .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_MS),
            },
            database: DatabaseConfig {
                url: var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
                max_connections: parsed(var("DATABASE_MAX_CONNECTIONS"))
                    .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS),
                connect_timeout_secs: parsed(var("DATABASE_CONNECT_TIMEOUT"))
                    .unwrap_or(DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS),
            },
            jwt: JwtConfig {
                secret: var("JWT_SECRET"),
                expires_in: var("JWT_EXPIRES_IN")
                    .unwrap_or_else(|| DEFAULT_JWT_EXPIRES_IN.to_string()),
                refresh_expires_in: var("JWT_REFRESH_EXPIRES_IN")
                    .unwrap_or_else(|| DEFAULT_JWT_REFRESH_EXPIRES_IN.to_string()),
            },
            security: SecurityConfig {
                bcrypt_rounds: parsed(var("BCRYPT_ROUNDS")).unwrap_or(DEFAULT_BCRYPT_ROUNDS),
                rate_limit_window_ms: parsed(var("RATE_LIMIT_WINDOW_MS"))
                    .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_MS),
                rate_limit_max_requests: parsed(var("RATE_LIMIT_MAX_REQUESTS"))
                    .unwrap_or(DEFAULT_RATE_LIMIT_MAX_REQUESTS),
                max_body_bytes: parsed(var("MAX_BODY_BYTES")).unwrap_or(DEFAULT_MAX_BODY_BYTES),
            },
            cors: CorsConfig {
                allowed_origins: var("CORS_ORIGIN")
                    .unwrap_or_else(|| DEFAULT_CORS_ALLOWED_ORIGIN.to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                allow_credentials: flag("CORS_CREDENTIALS"),
            },
            apis: ApisConfig {
                claude: ExternalApiConfig {
                    api_key: var("CLAUDE_API_KEY"),
                    base_url: var("CLAUDE_API_URL")
                        .unwrap_or_else(|| DEFAULT_CLAUDE_API_URL.to_string()),
                    timeout_ms: 30_000,
                },
                news: ExternalApiConfig {
                    api_key: var("NEWS_API_KEY"),
                    base_url: var("NEWS_API_URL")
                        .unwrap_or_else(|| DEFAULT_NEWS_API_URL.to_string()),
                    timeout_ms: 10_000,
                },
            },
            cache: CacheConfig {
                ttl_secs: parsed(var("CACHE_TTL")).unwrap_or(DEFAULT_CACHE_TTL_SECS),
                max_size: parsed(var("CACHE_MAX_SIZE")).unwrap_or(DEFAULT_CACHE_MAX_SIZE),
            },
            development: DevelopmentConfig {
                debug: var("DEBUG").is_some_and(|s| !matches!(s.trim(), "false" | "0")),
                enable_swagger: flag("ENABLE_SWAGGER"),
                api_docs_path: var("API_DOCS_PATH")
                    .unwrap_or_else(|| DEFAULT_API_DOCS_PATH.to_string()),
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        // Validate JWT secret
        if self.jwt.secret.is_none() {
            tracing::warn!("Missing environment variables: JWT_SECRET");
            tracing::warn!("Using fallback values. Set these in production!");
        }

        if self.server.environment.is_hardened()
            && self.jwt.secret().len() < MIN_PRODUCTION_JWT_SECRET_LEN
        {
            anyhow::bail!(
                "JWT_SECRET must be at least {} characters long in production",
                MIN_PRODUCTION_JWT_SECRET_LEN
            );
        }

        // Validate port
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        // Validate database URL
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        // Validate connection pool settings
        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        // Validate rate limiting
        if self.security.rate_limit_window_ms == 0 {
            anyhow::bail!("Rate limit window must be greater than 0");
        }

        if self.security.rate_limit_max_requests == 0 {
            anyhow::bail!("Rate limit ceiling must be greater than 0");
        }

        if !(4..=31).contains(&self.security.bcrypt_rounds) {
            anyhow::bail!(
                "BCRYPT_ROUNDS must be between 4 and 31, got {}",
                self.security.bcrypt_rounds
            );
        }

        // Validate CORS origins
        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - only origin-less requests will be allowed");
        }

        Ok(())
    }
}

/// Parse a trimmed value, `None` when missing or malformed
fn parsed<T: std::str::FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|s| s.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                environment: Environment::Development,
                shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            },
            jwt: JwtConfig {
                secret: None,
                expires_in: DEFAULT_JWT_EXPIRES_IN.to_string(),
                refresh_expires_in: DEFAULT_JWT_REFRESH_EXPIRES_IN.to_string(),
            },
            security: SecurityConfig {
                bcrypt_rounds: DEFAULT_BCRYPT_ROUNDS,
                rate_limit_window_ms: DEFAULT_RATE_LIMIT_WINDOW_MS,
                rate_limit_max_requests: DEFAULT_RATE_LIMIT_MAX_REQUESTS,
                max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            },
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
                allow_credentials: false,
            },
            apis: ApisConfig {
                claude: ExternalApiConfig {
                    api_key: None,
                    base_url: DEFAULT_CLAUDE_API_URL.to_string(),
                    timeout_ms: 30_000,
                },
                news: ExternalApiConfig {
                    api_key: None,
                    base_url: DEFAULT_NEWS_API_URL.to_string(),
                    timeout_ms: 10_000,
                },
            },
            cache: CacheConfig {
                ttl_secs: DEFAULT_CACHE_TTL_SECS,
                max_size: DEFAULT_CACHE_MAX_SIZE,
            },
            development: DevelopmentConfig {
                debug: false,
                enable_swagger: false,
                api_docs_path: DEFAULT_API_DOCS_PATH.to_string(),
            },
        }
    }
}
