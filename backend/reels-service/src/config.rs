/// Configuration management for Reels Service
///
/// Everything is read from environment variables; the binary loads a `.env`
/// file first when one is present.
use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// Hosted identity + document store project
    pub firebase: FirebaseConfig,
    /// Hosted media upload service
    pub cloudinary: CloudinaryConfig,
    /// Outbound HTTP settings
    pub http: HttpConfig,
    /// Feed composition settings
    pub feed: FeedConfig,
    /// Status notice settings
    pub status: StatusConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (development, staging, production)
    pub env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirebaseConfig {
    pub api_key: String,
    pub project_id: String,
    /// Firestore database id, usually `(default)`
    pub database: String,
    pub firestore_base_url: String,
    pub identity_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    /// Unsigned upload profile name
    pub upload_preset: String,
    pub api_base_url: String,
    /// Host serving derived assets (thumbnails)
    pub delivery_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub request_timeout_ms: u64,
    pub upload_timeout_ms: u64,
}

/// How an ID set larger than the store's membership limit is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdSetStrategy {
    /// Fetch the whole collection and filter in memory
    FullScan,
    /// Issue membership queries in batches and k-way merge the results
    Batched,
}

impl std::str::FromStr for IdSetStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full_scan" | "full-scan" | "scan" => Ok(IdSetStrategy::FullScan),
            "batched" | "batch" => Ok(IdSetStrategy::Batched),
            other => Err(format!("unknown id set strategy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Maximum ids the store accepts in one membership filter
    pub membership_limit: usize,
    pub id_set_strategy: IdSetStrategy,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            membership_limit: crate::store::MEMBERSHIP_FILTER_LIMIT,
            id_set_strategy: IdSetStrategy::FullScan,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    pub notice_ttl_secs: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self { notice_ttl_secs: 5 }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let production = app_env.eq_ignore_ascii_case("production");

        Ok(Config {
            app: AppConfig {
                env: app_env.clone(),
            },
            firebase: {
                let api_key = match std::env::var("FIREBASE_API_KEY") {
                    Ok(value) if !value.trim().is_empty() => value,
                    _ if production => {
                        return Err("FIREBASE_API_KEY must be set in production".to_string())
                    }
                    _ => String::new(),
                };

                FirebaseConfig {
                    api_key,
                    project_id: std::env::var("FIREBASE_PROJECT_ID")
                        .unwrap_or_else(|_| "reels-dev".to_string()),
                    database: std::env::var("FIRESTORE_DATABASE")
                        .unwrap_or_else(|_| "(default)".to_string()),
                    firestore_base_url: std::env::var("FIRESTORE_BASE_URL")
                        .unwrap_or_else(|_| "https://firestore.googleapis.com/v1".to_string()),
                    identity_base_url: std::env::var("IDENTITY_BASE_URL")
                        .unwrap_or_else(|_| "https://identitytoolkit.googleapis.com/v1".to_string()),
                }
            },
            cloudinary: {
                let cloud_name = match std::env::var("CLOUDINARY_CLOUD_NAME") {
                    Ok(value) if !value.trim().is_empty() => value,
                    _ if production => {
                        return Err("CLOUDINARY_CLOUD_NAME must be set in production".to_string())
                    }
                    _ => "demo".to_string(),
                };

                CloudinaryConfig {
                    cloud_name,
                    upload_preset: std::env::var("CLOUDINARY_UPLOAD_PRESET")
                        .unwrap_or_else(|_| "anon_video".to_string()),
                    api_base_url: std::env::var("CLOUDINARY_BASE_URL")
                        .unwrap_or_else(|_| "https://api.cloudinary.com/v1_1".to_string()),
                    delivery_base_url: std::env::var("CLOUDINARY_DELIVERY_URL")
                        .unwrap_or_else(|_| "https://res.cloudinary.com".to_string()),
                }
            },
            http: HttpConfig {
                request_timeout_ms: parse_env_or_default("HTTP_REQUEST_TIMEOUT_MS", 30_000)?,
                upload_timeout_ms: parse_env_or_default("UPLOAD_TIMEOUT_MS", 300_000)?,
            },
            feed: FeedConfig {
                membership_limit: {
                    let limit = parse_env_or_default(
                        "FEED_MEMBERSHIP_LIMIT",
                        crate::store::MEMBERSHIP_FILTER_LIMIT,
                    )?;
                    if limit == 0 {
                        return Err("FEED_MEMBERSHIP_LIMIT must be greater than zero".to_string());
                    }
                    limit
                },
                id_set_strategy: match std::env::var("FEED_ID_SET_STRATEGY") {
                    Ok(raw) => raw.parse()?,
                    Err(_) => IdSetStrategy::FullScan,
                },
            },
            status: StatusConfig {
                notice_ttl_secs: parse_env_or_default("STATUS_NOTICE_TTL_SECS", 5)?,
            },
        })
    }

    pub fn is_production(&self) -> bool {
        self.app.env.eq_ignore_ascii_case("production")
    }
}

fn parse_env_or_default<T>(key: &str, default: T) -> Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val
            .trim()
            .parse()
            .map_err(|e| format!("Failed to parse {}='{}': {}", key, val, e)),
        Err(_) => Ok(default),
    }
}
