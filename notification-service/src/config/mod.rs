/// Environment-driven configuration (A2). Covers every item enumerated in
/// the external-interfaces configuration surface; anything not required
/// falls back to the component default documented alongside it.
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub broker: BrokerConfig,
    pub gateways: GatewayConfig,
    pub workers: WorkerConfig,
    pub fanout: FanoutConfig,
    pub cache_ttls: CacheTtlConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    /// TTL for deduplication keys in seconds (default: 120)
    pub dedup_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub bootstrap_servers: String,
    pub events_topic: String,
    pub processed_topic: String,
    pub consumer_group: String,
    pub prefetch: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub fcm_credentials_path: Option<String>,
    pub apns_certificate_path: Option<String>,
    pub apns_key_id: Option<String>,
    pub apns_team_id: Option<String>,
    pub apns_bundle_id: String,
    pub apns_production: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub pool_size: usize,
    pub batch_size: i64,
    pub lock_ttl_secs: i64,
    pub poll_interval_secs: u64,
    /// OQ-3: resolved to 5 for both the worker pool and the scheduler.
    pub max_retries: i32,
    pub archive_after_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    pub high_reach_threshold: i64,
    pub topic_push_threshold: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheTtlConfig {
    pub follower_count_fresh_secs: u64,
    pub follower_count_stale_secs: u64,
    pub unread_count_secs: u64,
    pub group_read_days: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub error_threshold: f64,
    pub window_secs: u64,
    pub minimum_requests: u32,
    pub open_timeout_secs: u64,
    pub half_open_success_threshold: u32,
    pub half_open_max_requests: u32,
    pub error_duration_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_primary_key: String,
    pub jwt_previous_key: Option<String>,
    pub internal_service_token: String,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let cfg = Config {
            app: AppConfig {
                env: env_or("APP_ENV", "development"),
                port: env_parse("HTTP_PORT", 8000),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .map_err(|_| "DATABASE_URL must be set")?,
                max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 20),
                min_connections: env_parse("DATABASE_MIN_CONNECTIONS", 2),
                idle_timeout_secs: env_parse("DATABASE_IDLE_TIMEOUT_SECS", 600),
            },
            redis: RedisConfig {
                url: env_or("REDIS_URL", "redis://localhost:6379"),
                // Matches the idempotency record's 7-day durable TTL so a
                // broker redelivery days later still dedups cleanly.
                dedup_ttl_secs: env_parse("REDIS_DEDUP_TTL_SECS", 7 * 24 * 3600),
            },
            broker: BrokerConfig {
                bootstrap_servers: env_or("KAFKA_BROKER", "localhost:9092"),
                events_topic: env_or("NOTIFICATION_EVENTS_TOPIC", "notification.events"),
                processed_topic: env_or(
                    "NOTIFICATION_PROCESSED_TOPIC",
                    "notification.event.processed",
                ),
                consumer_group: env_or("NOTIFICATION_CONSUMER_GROUP", "notification-service"),
                prefetch: env_parse("NOTIFICATION_CONSUMER_PREFETCH", 50),
            },
            gateways: GatewayConfig {
                fcm_credentials_path: std::env::var("FCM_CREDENTIALS").ok(),
                apns_certificate_path: std::env::var("APNS_CERTIFICATE_PATH").ok(),
                apns_key_id: std::env::var("APNS_KEY_ID").ok(),
                apns_team_id: std::env::var("APNS_TEAM_ID").ok(),
                apns_bundle_id: env_or("APNS_BUNDLE_ID", "com.example.app"),
                apns_production: env_parse("APNS_PRODUCTION", false),
            },
            workers: WorkerConfig {
                pool_size: env_parse("DELIVERY_WORKER_COUNT", 4),
                batch_size: env_parse("DELIVERY_BATCH_SIZE", 50),
                lock_ttl_secs: env_parse("DELIVERY_LOCK_TTL_SECS", 300),
                poll_interval_secs: env_parse("DELIVERY_POLL_INTERVAL_SECS", 5),
                max_retries: env_parse("MAX_DELIVERY_RETRIES", 5),
                archive_after_days: env_parse("ARCHIVE_AFTER_DAYS", 30),
            },
            fanout: FanoutConfig {
                high_reach_threshold: env_parse("FANOUT_HIGH_REACH_THRESHOLD", 10_000),
                topic_push_threshold: env_parse("FANOUT_TOPIC_PUSH_THRESHOLD", 50_000),
            },
            cache_ttls: CacheTtlConfig {
                follower_count_fresh_secs: env_parse("CACHE_FOLLOWER_COUNT_FRESH_SECS", 300),
                follower_count_stale_secs: env_parse("CACHE_FOLLOWER_COUNT_STALE_SECS", 600),
                unread_count_secs: env_parse("CACHE_UNREAD_COUNT_SECS", 30),
                group_read_days: env_parse("CACHE_GROUP_READ_DAYS", 30),
            },
            circuit_breaker: CircuitBreakerConfig {
                error_threshold: env_parse("CIRCUIT_BREAKER_ERROR_THRESHOLD", 0.05),
                window_secs: env_parse("CIRCUIT_BREAKER_WINDOW_SECS", 3600),
                minimum_requests: env_parse("CIRCUIT_BREAKER_MINIMUM_REQUESTS", 10),
                open_timeout_secs: env_parse("CIRCUIT_BREAKER_OPEN_TIMEOUT_SECS", 600),
                half_open_success_threshold: env_parse(
                    "CIRCUIT_BREAKER_HALF_OPEN_SUCCESS_THRESHOLD",
                    10,
                ),
                half_open_max_requests: env_parse("CIRCUIT_BREAKER_HALF_OPEN_MAX_REQUESTS", 10),
                error_duration_secs: env_parse("CIRCUIT_BREAKER_ERROR_DURATION_SECS", 120),
            },
            auth: AuthConfig {
                jwt_primary_key: env_or("JWT_PRIMARY_KEY", "dev-insecure-primary-key"),
                jwt_previous_key: std::env::var("JWT_PREVIOUS_KEY").ok(),
                internal_service_token: env_or(
                    "INTERNAL_SERVICE_TOKEN",
                    "dev-insecure-internal-token",
                ),
            },
        };

        if cfg.database.url.is_empty() {
            return Err("DATABASE_URL must not be empty".into());
        }

        Ok(cfg)
    }
}

impl CircuitBreakerConfig {
    pub fn window_duration(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.open_timeout_secs)
    }

    pub fn error_duration(&self) -> Duration {
        Duration::from_secs(self.error_duration_secs)
    }
}
