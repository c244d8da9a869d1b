use std::env;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Where the workspace is mirrored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Memory,
    File { dir: PathBuf },
    Mongo { uri: String, database: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub frontend_origin: String,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub bcrypt_cost: u32,
    pub store: StoreConfig,
    pub ai_endpoint: String,
    pub ai_api_key: Option<String>,
    pub ai_model: String,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let store = match var_or("STORE_BACKEND", "file").to_lowercase().as_str() {
            "memory" => StoreConfig::Memory,
            "file" => StoreConfig::File {
                dir: PathBuf::from(var_or("DATA_DIR", "./data")),
            },
            "mongo" | "mongodb" => StoreConfig::Mongo {
                uri: env::var("MONGO_URI").map_err(|_| ConfigError::Missing("MONGO_URI"))?,
                database: var_or("DATABASE_NAME", "delimhub"),
            },
            other => {
                return Err(ConfigError::Invalid {
                    name: "STORE_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        let bcrypt_cost = parsed_or("BCRYPT_COST", bcrypt::DEFAULT_COST)?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::Invalid {
                name: "BCRYPT_COST",
                value: bcrypt_cost.to_string(),
            });
        }

        Ok(Self {
            bind_addr: var_or("BIND_ADDR", "0.0.0.0:8080"),
            frontend_origin: var_or("FRONTEND_ORIGIN", "http://localhost:3000"),
            jwt_secret: env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?,
            token_ttl_hours: parsed_or("TOKEN_TTL_HOURS", 24)?,
            bcrypt_cost,
            store,
            ai_endpoint: var_or("AI_ENDPOINT", "https://generativelanguage.googleapis.com"),
            ai_api_key: env::var("AI_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            ai_model: var_or("AI_MODEL", "gemini-3-flash-preview"),
        })
    }

    /// Settings for unit and handler tests: in-memory store, cheapest bcrypt cost.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            frontend_origin: "http://localhost:3000".to_string(),
            jwt_secret: "test-secret".to_string(),
            token_ttl_hours: 1,
            bcrypt_cost: 4,
            store: StoreConfig::Memory,
            ai_endpoint: "http://127.0.0.1:9".to_string(),
            ai_api_key: None,
            ai_model: "test-model".to_string(),
        }
    }
}
