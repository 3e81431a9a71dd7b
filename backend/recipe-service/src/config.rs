/// Configuration management for Recipe Service
///
/// Everything comes from environment variables (optionally seeded from a
/// `.env` file by `main`). Every value has a development default; invalid
/// values are reported instead of silently replaced.
use actix_middleware::{ClassPolicy, RateLimitConfig};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::services::scoring::{ScoringParams, ScoringWeights};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub ranking: RankingConfig,
    pub popularity: PopularityConfig,
    pub idempotency: IdempotencyConfig,
    pub rate_limit: RateLimitSettings,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (development, staging, production)
    pub env: String,
    pub host: String,
    pub port: u16,
    pub workers: usize,
    /// Emit JSON logs instead of the human-readable format
    pub json_logs: bool,
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.env.eq_ignore_ascii_case("production")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
}

/// Redis holds shared rate-limit buckets when configured
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: Option<String>,
    pub timeout_ms: u64,
}

/// Ranking weights and signal horizons
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    pub weight_text: f64,
    pub weight_boost: f64,
    pub weight_recency: f64,
    pub weight_popularity: f64,
    pub weight_repeat_penalty: f64,
    pub recency_half_life_days: f64,
    pub repeat_half_life_days: f64,
    pub repeat_lookback_days: i64,
    /// Most matches one search may rank; broader searches are rejected
    pub candidate_limit: usize,
}

impl RankingConfig {
    pub fn scoring_params(&self) -> ScoringParams {
        ScoringParams {
            weights: ScoringWeights {
                text: self.weight_text,
                boost: self.weight_boost,
                recency: self.weight_recency,
                popularity: self.weight_popularity,
                repeat_penalty: self.weight_repeat_penalty,
            },
            recency_half_life_days: self.recency_half_life_days,
            repeat_half_life_days: self.repeat_half_life_days,
            repeat_lookback_days: self.repeat_lookback_days,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopularityConfig {
    pub refresh_interval_secs: u64,
    pub window_days: i64,
}

impl PopularityConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdempotencyStoreKind {
    Postgres,
    Memory,
}

impl FromStr for IdempotencyStoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" => Ok(IdempotencyStoreKind::Postgres),
            "memory" => Ok(IdempotencyStoreKind::Memory),
            other => Err(format!("expected 'postgres' or 'memory', got '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyConfig {
    pub replay_window_secs: u64,
    pub in_flight_wait_ms: u64,
    pub poll_interval_ms: u64,
    pub store: IdempotencyStoreKind,
    pub cleanup_interval_secs: u64,
}

impl IdempotencyConfig {
    pub fn gate_config(&self) -> idempotency_gate::GateConfig {
        idempotency_gate::GateConfig {
            replay_window: Duration::from_secs(self.replay_window_secs),
            in_flight_wait: Duration::from_millis(self.in_flight_wait_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub read_capacity: u32,
    pub read_per_minute: u32,
    pub heavy_write_capacity: u32,
    pub heavy_write_per_minute: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let production = app_env.eq_ignore_ascii_case("production");

        let database_url = match std::env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) if production => {
                return Err("DATABASE_URL must be set in production".to_string())
            }
            Err(_) => "postgresql://localhost/nova_recipes".to_string(),
        };

        let config = Config {
            app: AppConfig {
                env: app_env,
                host: std::env::var("RECIPE_SERVICE_HOST")
                    .unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_env_or_default("RECIPE_SERVICE_PORT", 8085)?,
                workers: parse_env_or_default("HTTP_WORKERS", 4)?,
                json_logs: std::env::var("LOG_FORMAT")
                    .map(|v| v.eq_ignore_ascii_case("json"))
                    .unwrap_or(false),
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: parse_env_or_default("DATABASE_MAX_CONNECTIONS", 20)?,
                acquire_timeout_ms: parse_env_or_default("DATABASE_ACQUIRE_TIMEOUT_MS", 3_000)?,
            },
            redis: RedisConfig {
                url: std::env::var("REDIS_URL").ok().filter(|u| !u.trim().is_empty()),
                timeout_ms: parse_env_or_default("REDIS_TIMEOUT_MS", 100)?,
            },
            ranking: RankingConfig {
                weight_text: parse_env_or_default("RANKING_WEIGHT_TEXT", 0.35)?,
                weight_boost: parse_env_or_default("RANKING_WEIGHT_BOOST", 0.20)?,
                weight_recency: parse_env_or_default("RANKING_WEIGHT_RECENCY", 0.20)?,
                weight_popularity: parse_env_or_default("RANKING_WEIGHT_POPULARITY", 0.15)?,
                weight_repeat_penalty: parse_env_or_default(
                    "RANKING_WEIGHT_REPEAT_PENALTY",
                    0.10,
                )?,
                recency_half_life_days: parse_env_or_default(
                    "RANKING_RECENCY_HALF_LIFE_DAYS",
                    14.0,
                )?,
                repeat_half_life_days: parse_env_or_default("RANKING_REPEAT_HALF_LIFE_DAYS", 7.0)?,
                repeat_lookback_days: parse_env_or_default("RANKING_REPEAT_LOOKBACK_DAYS", 30)?,
                candidate_limit: parse_env_or_default("SEARCH_CANDIDATE_LIMIT", 10_000)?,
            },
            popularity: PopularityConfig {
                refresh_interval_secs: parse_env_or_default(
                    "POPULARITY_REFRESH_INTERVAL_SECS",
                    300,
                )?,
                window_days: parse_env_or_default("POPULARITY_WINDOW_DAYS", 30)?,
            },
            idempotency: IdempotencyConfig {
                replay_window_secs: parse_env_or_default(
                    "IDEMPOTENCY_REPLAY_WINDOW_SECS",
                    24 * 3600,
                )?,
                in_flight_wait_ms: parse_env_or_default("IDEMPOTENCY_INFLIGHT_WAIT_MS", 5_000)?,
                poll_interval_ms: parse_env_or_default("IDEMPOTENCY_POLL_INTERVAL_MS", 50)?,
                store: parse_env_or_default("IDEMPOTENCY_STORE", IdempotencyStoreKind::Postgres)?,
                cleanup_interval_secs: parse_env_or_default(
                    "IDEMPOTENCY_CLEANUP_INTERVAL_SECS",
                    3_600,
                )?,
            },
            rate_limit: RateLimitSettings {
                read_capacity: parse_env_or_default("RATE_LIMIT_READ_CAPACITY", 60)?,
                read_per_minute: parse_env_or_default("RATE_LIMIT_READ_PER_MINUTE", 60)?,
                heavy_write_capacity: parse_env_or_default("RATE_LIMIT_HEAVY_WRITE_CAPACITY", 6)?,
                heavy_write_per_minute: parse_env_or_default(
                    "RATE_LIMIT_HEAVY_WRITE_PER_MINUTE",
                    6,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks that parsing alone cannot express.
    pub fn validate(&self) -> Result<(), String> {
        self.ranking.scoring_params().weights.validate()?;

        for (name, days) in [
            ("RANKING_RECENCY_HALF_LIFE_DAYS", self.ranking.recency_half_life_days),
            ("RANKING_REPEAT_HALF_LIFE_DAYS", self.ranking.repeat_half_life_days),
        ] {
            if !days.is_finite() || days <= 0.0 {
                return Err(format!("{} must be a positive number, got {}", name, days));
            }
        }
        if self.ranking.repeat_lookback_days <= 0 || self.popularity.window_days <= 0 {
            return Err("look-back windows must be at least one day".to_string());
        }
        if self.ranking.candidate_limit == 0 {
            return Err("SEARCH_CANDIDATE_LIMIT must be > 0".to_string());
        }
        if self.popularity.refresh_interval_secs == 0 {
            return Err("POPULARITY_REFRESH_INTERVAL_SECS must be > 0".to_string());
        }
        if self.idempotency.replay_window_secs == 0 || self.idempotency.poll_interval_ms == 0 {
            return Err("idempotency window and poll interval must be > 0".to_string());
        }
        let limits = &self.rate_limit;
        if [
            limits.read_capacity,
            limits.read_per_minute,
            limits.heavy_write_capacity,
            limits.heavy_write_per_minute,
        ]
        .contains(&0)
        {
            return Err("rate limit capacities and refill rates must be > 0".to_string());
        }
        Ok(())
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            read: ClassPolicy {
                capacity: self.rate_limit.read_capacity,
                refill_per_minute: self.rate_limit.read_per_minute,
            },
            heavy_write: ClassPolicy {
                capacity: self.rate_limit.heavy_write_capacity,
                refill_per_minute: self.rate_limit.heavy_write_per_minute,
            },
            store_timeout_ms: self.redis.timeout_ms,
        }
    }
}

fn parse_env_or_default<T>(key: &str, default: T) -> Result<T, String>
where
    T: FromStr,
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

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Config {
        Config {
            app: AppConfig {
                env: "test".into(),
                host: "127.0.0.1".into(),
                port: 8085,
                workers: 1,
                json_logs: false,
            },
            database: DatabaseConfig {
                url: "postgresql://localhost/test".into(),
                max_connections: 5,
                acquire_timeout_ms: 1_000,
            },
            redis: RedisConfig {
                url: None,
                timeout_ms: 100,
            },
            ranking: RankingConfig {
                weight_text: 0.35,
                weight_boost: 0.2,
                weight_recency: 0.2,
                weight_popularity: 0.15,
                weight_repeat_penalty: 0.1,
                recency_half_life_days: 14.0,
                repeat_half_life_days: 7.0,
                repeat_lookback_days: 30,
                candidate_limit: 10_000,
            },
            popularity: PopularityConfig {
                refresh_interval_secs: 300,
                window_days: 30,
            },
            idempotency: IdempotencyConfig {
                replay_window_secs: 86_400,
                in_flight_wait_ms: 5_000,
                poll_interval_ms: 50,
                store: IdempotencyStoreKind::Memory,
                cleanup_interval_secs: 3_600,
            },
            rate_limit: RateLimitSettings {
                read_capacity: 60,
                read_per_minute: 60,
                heavy_write_capacity: 6,
                heavy_write_per_minute: 6,
            },
        }
    }

    #[test]
    fn test_defaults_validate() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn test_negative_weight_rejected() {
        let mut config = base();
        config.ranking.weight_popularity = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_bucket_rejected() {
        let mut config = base();
        config.rate_limit.heavy_write_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rate_limit_config_mapping() {
        let limits = base().rate_limit_config();
        assert_eq!(limits.heavy_write.capacity, 6);
        assert_eq!(limits.read.refill_per_minute, 60);
        assert_eq!(limits.store_timeout_ms, 100);
    }

    #[test]
    fn test_store_kind_parse() {
        assert_eq!(
            " Memory ".parse::<IdempotencyStoreKind>().unwrap(),
            IdempotencyStoreKind::Memory
        );
        assert!("sqlite".parse::<IdempotencyStoreKind>().is_err());
    }
}
