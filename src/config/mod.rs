use once_cell::sync::Lazy;
use std::env;
use std::path::PathBuf;
use uuid::Uuid;

use crate::auth::KeyMode;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Major API version, served under `/api/v{N}`
    pub api_version: u32,
    pub maintenance: bool,
    pub resources_file: PathBuf,
}

impl ServerConfig {
    pub fn base_path(&self) -> String {
        format!("/api/v{}", self.api_version)
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Postgres URL; without one the server keeps records in memory
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub enable_request_logging: bool,
    pub max_request_size_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub disable_auth: bool,
    /// Serve the development token endpoint
    pub show_token: bool,
    /// Paths (relative to the API base path) that skip credential verification
    pub public_paths: Vec<String>,
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
    pub jwt_expiry_hours: u64,
    pub key_mode: KeyMode,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Some(v) = env::var("KRATOS_PORT").ok().or_else(|| env::var("PORT").ok()) {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Ok(v) = env::var("KRATOS_VERSION") {
            self.server.api_version = major_version(&v).unwrap_or(self.server.api_version);
        }
        if let Ok(v) = env::var("KRATOS_MAINTENANCE") {
            self.server.maintenance = v.parse().unwrap_or(self.server.maintenance);
        }
        if let Ok(v) = env::var("KRATOS_RESOURCES") {
            self.server.resources_file = PathBuf::from(v);
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v).filter(|url| !url.trim().is_empty());
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // API overrides
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }

        // Security overrides
        if let Ok(v) = env::var("KRATOS_DISABLE_AUTH") {
            self.security.disable_auth = v.parse().unwrap_or(self.security.disable_auth);
        }
        if let Ok(v) = env::var("KRATOS_SHOW_TOKEN") {
            self.security.show_token = v.parse().unwrap_or(self.security.show_token);
        }
        if let Ok(v) = env::var("KRATOS_PUBLIC_PATHS") {
            self.security.public_paths.extend(split_list(&v));
        }
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = split_list(&v);
        }
        if let Ok(v) = env::var("JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }

        if let Ok(path) = env::var("JWT_PUBLIC_KEY_PATH") {
            self.security.key_mode = KeyMode::Asymmetric {
                public_key_path: PathBuf::from(path),
                private_key_path: env::var("JWT_PRIVATE_KEY_PATH").ok().map(PathBuf::from),
            };
        } else if let Ok(secret) = env::var("JWT_SECRET") {
            if !secret.is_empty() {
                self.security.key_mode = KeyMode::Symmetric { secret };
            }
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                port: 3000,
                api_version: 1,
                maintenance: false,
                resources_file: PathBuf::from("resources.yaml"),
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                connection_timeout: 30,
            },
            api: ApiConfig {
                enable_request_logging: true,
                max_request_size_bytes: 2 * 1024 * 1024, // 2MB
            },
            security: SecurityConfig {
                disable_auth: false,
                show_token: true,
                public_paths: default_public_paths(),
                enable_cors: true,
                cors_origins: vec![],
                jwt_expiry_hours: 24 * 7, // 1 week
                key_mode: KeyMode::Symmetric { secret: random_secret() },
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig {
                port: 3000,
                api_version: 1,
                maintenance: false,
                resources_file: PathBuf::from("resources.yaml"),
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
                connection_timeout: 10,
            },
            api: ApiConfig {
                enable_request_logging: true,
                max_request_size_bytes: 2 * 1024 * 1024,
            },
            security: SecurityConfig {
                disable_auth: false,
                show_token: false,
                public_paths: default_public_paths(),
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
                jwt_expiry_hours: 24,
                key_mode: KeyMode::Symmetric { secret: random_secret() },
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                port: 8080,
                api_version: 1,
                maintenance: false,
                resources_file: PathBuf::from("resources.yaml"),
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 50,
                connection_timeout: 5,
            },
            api: ApiConfig {
                enable_request_logging: false,
                max_request_size_bytes: 2 * 1024 * 1024,
            },
            security: SecurityConfig {
                disable_auth: false,
                show_token: false,
                public_paths: default_public_paths(),
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
                jwt_expiry_hours: 4,
                key_mode: KeyMode::Symmetric { secret: random_secret() },
            },
        }
    }
}

/// The token endpoint must be reachable without a token
fn default_public_paths() -> Vec<String> {
    vec!["/get-token".to_string()]
}

/// 32 random bytes, hex encoded
fn random_secret() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// "2.4.1" -> 2
fn major_version(version: &str) -> Option<u32> {
    version.trim().trim_start_matches('v').split('.').next()?.parse().ok()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert!(config.security.show_token);
        assert_eq!(config.server.base_path(), "/api/v1");
        assert_eq!(config.security.public_paths, vec!["/get-token".to_string()]);
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert!(!config.security.show_token);
        assert!(!config.security.disable_auth);
        assert!(config.database.url.is_none());
    }

    #[test]
    fn generated_secrets_are_64_hex_chars() {
        let secret = random_secret();
        assert_eq!(secret.len(), 64);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(secret, random_secret());
    }

    #[test]
    fn api_version_uses_the_major_component() {
        assert_eq!(major_version("2.4.1"), Some(2));
        assert_eq!(major_version("v3"), Some(3));
        assert_eq!(major_version("beta"), None);
    }

    #[test]
    fn lists_are_trimmed() {
        assert_eq!(split_list(" /a, /b ,,"), vec!["/a".to_string(), "/b".to_string()]);
    }
}
