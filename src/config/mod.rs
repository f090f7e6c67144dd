use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub web: WebConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub keys_folder: String,
    pub active_kid: String,
    pub issuer: String,
    pub clock_skew_secs: u64,
    pub delegate_authentication: bool,
    pub token_ttl_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directives, e.g. `sales_api=debug,tower_http=info`.
    pub filter: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
}

impl WebConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl AuthConfig {
    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.clock_skew_secs)
    }

}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the profile named by `APP_ENV` and apply overrides, reading
    /// variables through `var`.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let environment = match var("APP_ENV").as_deref() {
            Some("production") | Some("prod") => Environment::Production,
            Some("staging") | Some("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_overrides(var)
    }

    fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        // Web overrides
        if let Some(v) = var("WEB_HOST") {
            self.web.host = v;
        }
        if let Some(v) = var("WEB_PORT") {
            self.web.port = v.parse().unwrap_or(self.web.port);
        }
        if let Some(v) = var("WEB_REQUEST_TIMEOUT_SECS") {
            self.web.request_timeout_secs = v.parse().unwrap_or(self.web.request_timeout_secs);
        }
        if let Some(v) = var("WEB_SHUTDOWN_TIMEOUT_SECS") {
            self.web.shutdown_timeout_secs = v.parse().unwrap_or(self.web.shutdown_timeout_secs);
        }

        // Auth overrides
        if let Some(v) = var("AUTH_KEYS_FOLDER") {
            self.auth.keys_folder = v;
        }
        if let Some(v) = var("AUTH_ACTIVE_KID") {
            self.auth.active_kid = v;
        }
        if let Some(v) = var("AUTH_ISSUER") {
            self.auth.issuer = v;
        }
        if let Some(v) = var("AUTH_CLOCK_SKEW_SECS") {
            self.auth.clock_skew_secs = v.parse().unwrap_or(self.auth.clock_skew_secs);
        }
        if let Some(v) = var("AUTH_DELEGATE_AUTHENTICATION") {
            self.auth.delegate_authentication =
                v.parse().unwrap_or(self.auth.delegate_authentication);
        }
        if let Some(v) = var("AUTH_TOKEN_TTL_HOURS") {
            self.auth.token_ttl_hours = v.parse().unwrap_or(self.auth.token_ttl_hours);
        }

        // Logging overrides
        if let Some(v) = var("LOG_FILTER") {
            self.logging.filter = v;
        }

        // Security overrides
        if let Some(v) = var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Some(v) = var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            web: WebConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                request_timeout_secs: 30,
                shutdown_timeout_secs: 5,
            },
            auth: AuthConfig {
                keys_folder: "zarf/keys/".to_string(),
                active_kid: "54bb2165-71e1-41a6-af3e-7da4a0e1e2c1".to_string(),
                issuer: "service project".to_string(),
                clock_skew_secs: 5,
                delegate_authentication: true,
                token_ttl_hours: 24 * 365, // 1 year, for local tooling
            },
            logging: LoggingConfig {
                filter: "sales_api=debug,tower_http=debug,info".to_string(),
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec![
                    "http://localhost:3000".to_string(),
                    "http://localhost:5173".to_string(),
                ],
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            web: WebConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                request_timeout_secs: 10,
                shutdown_timeout_secs: 20,
            },
            auth: AuthConfig {
                keys_folder: "/etc/sales/keys/".to_string(),
                active_kid: "54bb2165-71e1-41a6-af3e-7da4a0e1e2c1".to_string(),
                issuer: "service project".to_string(),
                clock_skew_secs: 5,
                delegate_authentication: true,
                token_ttl_hours: 24,
            },
            logging: LoggingConfig {
                filter: "sales_api=info,tower_http=info,warn".to_string(),
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            web: WebConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                request_timeout_secs: 5,
                shutdown_timeout_secs: 20,
            },
            auth: AuthConfig {
                keys_folder: "/etc/sales/keys/".to_string(),
                active_kid: "54bb2165-71e1-41a6-af3e-7da4a0e1e2c1".to_string(),
                issuer: "service project".to_string(),
                clock_skew_secs: 5,
                delegate_authentication: true,
                token_ttl_hours: 4,
            },
            logging: LoggingConfig {
                filter: "sales_api=info,warn".to_string(),
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
