use std::env;

use serde::Deserialize;

use crate::services::schedule::{DuePolicy, LOOKAHEAD_DAYS};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cron: CronConfig,
    pub admin: AdminConfig,
    pub email: EmailConfig,
    pub automation: AutomationConfig,
    pub branding: BrandingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CronConfig {
    /// Shared secret the external scheduler sends as `Authorization: Bearer <secret>`.
    pub secret: String,
    /// Allowed requests per second (per IP) for the trigger endpoint
    pub per_second: u32,
    /// Burst size for the trigger endpoint
    pub burst: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// Bearer token for the admin email endpoints. Unset disables them.
    pub api_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub api_key: String,
    pub api_base_url: String,
    pub from_address: String,
    /// Upper bound for a single dispatch call.
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutomationConfig {
    /// Days before the event at which a reminder goes out, e.g. `[7, 1]`.
    pub reminder_offsets: Vec<i64>,
    pub due_policy: DuePolicy,
    /// Run the automation from an in-process worker in addition to the HTTP trigger.
    pub schedule_enabled: bool,
    pub schedule_interval_hours: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrandingConfig {
    pub community_name: String,
    pub site_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/app.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            cron: CronConfig {
                secret: env::var("CRON_SECRET")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .ok_or_else(|| ConfigError::MissingEnv("CRON_SECRET".to_string()))?,
                per_second: env::var("RATE_LIMIT_CRON_PER_SECOND")
                    .unwrap_or_else(|_| "1".to_string())
                    .parse()
                    .unwrap_or(1),
                burst: env::var("RATE_LIMIT_CRON_BURST")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            admin: AdminConfig {
                api_token: env::var("ADMIN_API_TOKEN")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
            },
            email: EmailConfig {
                api_key: env::var("RESEND_API_KEY")
                    .map_err(|_| ConfigError::MissingEnv("RESEND_API_KEY".to_string()))?,
                api_base_url: env::var("EMAIL_API_BASE_URL")
                    .unwrap_or_else(|_| "https://api.resend.com".to_string()),
                from_address: env::var("EMAIL_FROM")
                    .unwrap_or_else(|_| "Community Events <events@example.com>".to_string()),
                timeout_seconds: env::var("EMAIL_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "15".to_string())
                    .parse()
                    .unwrap_or(15u64),
            },
            automation: AutomationConfig {
                reminder_offsets: parse_reminder_offsets(
                    &env::var("REMINDER_OFFSETS").unwrap_or_else(|_| "7,1".to_string()),
                )?,
                due_policy: match env::var("AUTOMATION_DUE_POLICY") {
                    Ok(v) => v
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("AUTOMATION_DUE_POLICY".to_string()))?,
                    Err(_) => DuePolicy::Exact,
                },
                schedule_enabled: parse_flag(env::var("AUTOMATION_SCHEDULE_ENABLED").ok(), false),
                schedule_interval_hours: env::var("AUTOMATION_SCHEDULE_INTERVAL_HOURS")
                    .unwrap_or_else(|_| "24".to_string())
                    .parse()
                    .ok()
                    .filter(|h: &u64| *h > 0)
                    .unwrap_or(24u64),
            },
            branding: BrandingConfig {
                community_name: env::var("COMMUNITY_NAME")
                    .unwrap_or_else(|_| "Our Community".to_string()),
                site_url: env::var("SITE_URL").ok().filter(|s| !s.trim().is_empty()),
            },
        })
    }
}

fn parse_flag(value: Option<String>, default: bool) -> bool {
    match value {
        Some(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            _ => default,
        },
        None => default,
    }
}

/// Parse a comma separated list such as `"7,1"`.
///
/// Offsets must lie inside the reminder lookahead window; duplicates are
/// dropped and the result is ordered from the furthest offset to the nearest.
pub fn parse_reminder_offsets(raw: &str) -> Result<Vec<i64>, ConfigError> {
    let mut offsets = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let offset: i64 = part
            .parse()
            .map_err(|_| ConfigError::InvalidValue("REMINDER_OFFSETS".to_string()))?;
        if !(1..=LOOKAHEAD_DAYS).contains(&offset) {
            return Err(ConfigError::InvalidValue(format!(
                "REMINDER_OFFSETS ({} is outside 1..={})",
                offset, LOOKAHEAD_DAYS
            )));
        }
        if !offsets.contains(&offset) {
            offsets.push(offset);
        }
    }

    if offsets.is_empty() {
        return Err(ConfigError::InvalidValue("REMINDER_OFFSETS".to_string()));
    }

    offsets.sort_unstable_by(|a, b| b.cmp(a));
    Ok(offsets)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "sqlite://data/app.db".to_string(),
                max_connections: 5,
            },
            cron: CronConfig {
                secret: String::new(),
                per_second: 1,
                burst: 5,
            },
            admin: AdminConfig { api_token: None },
            email: EmailConfig {
                api_key: String::new(),
                api_base_url: "https://api.resend.com".to_string(),
                from_address: "Community Events <events@example.com>".to_string(),
                timeout_seconds: 15,
            },
            automation: AutomationConfig {
                reminder_offsets: vec![7, 1],
                due_policy: DuePolicy::Exact,
                schedule_enabled: false,
                schedule_interval_hours: 24,
            },
            branding: BrandingConfig {
                community_name: "Our Community".to_string(),
                site_url: None,
            },
        }
    }
}
