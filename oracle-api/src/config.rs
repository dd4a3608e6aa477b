/// Configuration management for the API server
///
/// Configuration is read from the environment once at start-up and the
/// resulting [`Config`] is handed to [`AppState`](crate::app::AppState).
/// Nothing reads the environment after that.
///
/// # Environment Variables
///
/// - `APP_ENV`: `development` (default), `test`, `production` or `provision`
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `PORT`: Port to bind to (default: 6769)
/// - `DATABASE_URL` / `POSTGRES_URI`: PostgreSQL connection string
/// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
/// - `REDIS_URL`: Redis connection string
/// - `SESSION_SECRET`: Cookie signing secret, at least 32 characters (required)
/// - `ENCRYPTION_KEY`: 64 hex characters, the 32-byte content key (required)
/// - `MODEL_PROVIDER`: `gemini` (default) or `scripted`
/// - `GEMINI_API_KEY`: Required when the provider is `gemini`
/// - `GEMINI_MODEL`: Model name (default: gemini-1.5-flash)
/// - `MODEL_TIMEOUT_SECS`: Model call timeout (default: 120, clamped to 5..=600)
/// - `CORS_ORIGINS`: Comma separated origins (default: `*`)
/// - `LOG_FORMAT`: `text` (default) or `json`
///
/// `DATABASE_URL` and `REDIS_URL` are mandatory in production. Elsewhere,
/// leaving them unset selects the in-memory backends.
///
/// # Example
///
/// ```no_run
/// use oracle_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use oracle_generator::model::GeminiConfig;
use oracle_generator::timeout::model_timeout_from_secs;
use oracle_shared::crypto::ContentCipher;
use oracle_shared::db::pool::DatabaseConfig;
use std::collections::HashMap;
use std::env;
use std::time::Duration;

/// Minimum length of `SESSION_SECRET`
pub const MIN_SESSION_SECRET_LEN: usize = 32;

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Test,
    Production,
    Provision,
}

impl AppEnv {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Some(AppEnv::Development),
            "test" => Some(AppEnv::Test),
            "production" | "prod" => Some(AppEnv::Production),
            "provision" => Some(AppEnv::Provision),
            _ => None,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, AppEnv::Production)
    }
}

/// Which content model backs generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelProvider {
    Gemini(GeminiConfig),
    /// Canned output, no network
    Scripted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,

    /// None selects the in-memory stores
    pub database: Option<DatabaseConfig>,

    /// None selects in-memory sessions and rate limiting
    pub redis_url: Option<String>,

    pub session: SessionConfig,

    /// At-rest cipher for artifact content
    pub cipher: ContentCipher,

    pub model: ModelConfig,

    pub log_format: LogFormat,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub env: AppEnv,

    /// Allowed CORS origins; `*` means permissive
    pub cors_origins: Vec<String>,
}

impl ApiConfig {
    pub fn production(&self) -> bool {
        self.env.is_production()
    }
}

#[derive(Clone)]
pub struct SessionConfig {
    /// HMAC key for session cookies
    pub secret: String,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub provider: ModelProvider,
    pub timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// A `.env` file in the working directory is loaded first if present.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value cannot
    /// be parsed.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an explicit variable table
    pub fn from_vars(vars: &HashMap<String, String>) -> anyhow::Result<Self> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Blank values count as unset
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let app_env = match var("APP_ENV") {
            Some(raw) => AppEnv::parse(&raw)
                .ok_or_else(|| anyhow::anyhow!("APP_ENV has unknown value '{}'", raw))?,
            None => AppEnv::Development,
        };

        let host = var("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = var("PORT")
            .unwrap_or_else(|| "6769".to_string())
            .parse::<u16>()
            .map_err(|e| anyhow::anyhow!("PORT is not a valid port: {}", e))?;

        let cors_origins = var("CORS_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let database = match var("DATABASE_URL").or_else(|| var("POSTGRES_URI")) {
            Some(url) => {
                let max_connections = var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|| "10".to_string())
                    .parse::<u32>()
                    .map_err(|e| anyhow::anyhow!("DATABASE_MAX_CONNECTIONS is invalid: {}", e))?;
                Some(DatabaseConfig {
                    url,
                    max_connections,
                    ..DatabaseConfig::default()
                })
            }
            None if app_env.is_production() => {
                anyhow::bail!("DATABASE_URL environment variable is required in production")
            }
            None => None,
        };

        let redis_url = var("REDIS_URL");
        if redis_url.is_none() && app_env.is_production() {
            anyhow::bail!("REDIS_URL environment variable is required in production");
        }

        let session_secret = var("SESSION_SECRET")
            .ok_or_else(|| anyhow::anyhow!("SESSION_SECRET environment variable is required"))?;
        if session_secret.len() < MIN_SESSION_SECRET_LEN {
            anyhow::bail!(
                "SESSION_SECRET must be at least {} characters long",
                MIN_SESSION_SECRET_LEN
            );
        }

        let encryption_key = var("ENCRYPTION_KEY")
            .ok_or_else(|| anyhow::anyhow!("ENCRYPTION_KEY environment variable is required"))?;
        let cipher = ContentCipher::from_hex(encryption_key.trim())
            .map_err(|e| anyhow::anyhow!("ENCRYPTION_KEY is invalid: {}", e))?;

        let provider = match var("MODEL_PROVIDER")
            .unwrap_or_else(|| "gemini".to_string())
            .to_lowercase()
            .as_str()
        {
            "gemini" => {
                let api_key = var("GEMINI_API_KEY").ok_or_else(|| {
                    anyhow::anyhow!("GEMINI_API_KEY is required when MODEL_PROVIDER is gemini")
                })?;
                let mut gemini = GeminiConfig::new(api_key);
                if let Some(model) = var("GEMINI_MODEL") {
                    gemini = gemini.with_model(model);
                }
                ModelProvider::Gemini(gemini)
            }
            "scripted" => ModelProvider::Scripted,
            other => anyhow::bail!("MODEL_PROVIDER has unknown value '{}'", other),
        };

        let timeout_secs = var("MODEL_TIMEOUT_SECS")
            .map(|raw| raw.parse::<u64>())
            .transpose()
            .map_err(|e| anyhow::anyhow!("MODEL_TIMEOUT_SECS is invalid: {}", e))?;

        let log_format = match var("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            api: ApiConfig {
                host,
                port,
                env: app_env,
                cors_origins,
            },
            database,
            redis_url,
            session: SessionConfig {
                secret: session_secret,
            },
            cipher,
            model: ModelConfig {
                provider,
                timeout: model_timeout_from_secs(timeout_secs),
            },
            log_format,
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";
    const SECRET: &str = "an-adequately-long-session-secret-value";

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        let mut map: HashMap<String, String> = [
            ("SESSION_SECRET", SECRET),
            ("ENCRYPTION_KEY", KEY),
            ("MODEL_PROVIDER", "scripted"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in pairs {
            map.insert(k.to_string(), v.to_string());
        }
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(&vars(&[])).unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:6769");
        assert_eq!(config.api.env, AppEnv::Development);
        assert_eq!(config.api.cors_origins, vec!["*".to_string()]);
        assert!(config.database.is_none());
        assert!(config.redis_url.is_none());
        assert_eq!(config.model.provider, ModelProvider::Scripted);
        assert_eq!(config.model.timeout, Duration::from_secs(120));
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn test_postgres_uri_fallback() {
        let config =
            Config::from_vars(&vars(&[("POSTGRES_URI", "postgresql://localhost/oracle")])).unwrap();
        let database = config.database.unwrap();
        assert_eq!(database.url, "postgresql://localhost/oracle");
        assert_eq!(database.max_connections, 10);
    }

    #[test]
    fn test_production_requires_backends() {
        let err = Config::from_vars(&vars(&[("APP_ENV", "production")])).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));

        let err = Config::from_vars(&vars(&[
            ("APP_ENV", "production"),
            ("DATABASE_URL", "postgresql://localhost/oracle"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("REDIS_URL"));
    }

    #[test]
    fn test_short_session_secret_rejected() {
        let err = Config::from_vars(&vars(&[("SESSION_SECRET", "short")])).unwrap_err();
        assert!(err.to_string().contains("SESSION_SECRET"));
    }

    #[test]
    fn test_bad_encryption_key_rejected() {
        let err = Config::from_vars(&vars(&[("ENCRYPTION_KEY", "abcd")])).unwrap_err();
        assert!(err.to_string().contains("ENCRYPTION_KEY"));
    }

    #[test]
    fn test_gemini_requires_api_key() {
        let err = Config::from_vars(&vars(&[("MODEL_PROVIDER", "gemini")])).unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));

        let config = Config::from_vars(&vars(&[
            ("MODEL_PROVIDER", "gemini"),
            ("GEMINI_API_KEY", "k"),
        ]))
        .unwrap();
        assert!(matches!(config.model.provider, ModelProvider::Gemini(_)));
    }

    #[test]
    fn test_model_timeout_clamped() {
        let config = Config::from_vars(&vars(&[("MODEL_TIMEOUT_SECS", "1")])).unwrap();
        assert_eq!(config.model.timeout, Duration::from_secs(5));

        let config = Config::from_vars(&vars(&[("MODEL_TIMEOUT_SECS", "9000")])).unwrap();
        assert_eq!(config.model.timeout, Duration::from_secs(600));
    }

    #[test]
    fn test_cors_origins_split() {
        let config = Config::from_vars(&vars(&[(
            "CORS_ORIGINS",
            "https://a.example, https://b.example",
        )]))
        .unwrap();
        assert_eq!(
            config.api.cors_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }
}
