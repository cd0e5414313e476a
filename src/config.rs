//! Environment-driven configuration
//!
//! Every value has a default; an unparseable value logs a warning and falls
//! back to that default instead of aborting start-up.

use chrono::NaiveTime;
use chrono_tz::Tz;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::jobs::time_window::parse_cron;
use crate::scrapers::SourceKind;
use crate::scrapers::anomaly::AnomalyFilter;

const ENV_RETRY_BASE_MS: &str = "SCRAPER_RETRY_BASE_MS";
const ENV_WINDOW_START: &str = "SCHEDULE_WINDOW_START";
const ENV_WINDOW_END: &str = "SCHEDULE_WINDOW_END";
const ENV_TIMEZONE: &str = "TZ";
const ENV_SCRAPE_CRON: &str = "SCRAPE_CRON";
const ENV_SNAPSHOT_AT: &str = "SNAPSHOT_AT";
const ENV_SCRAPER_ENABLED: &str = "SCRAPER_ENABLED";
const ENV_SNAPSHOT_ENABLED: &str = "SNAPSHOT_ENABLED";
const ENV_DATABASE_URL: &str = "DATABASE_URL";
const ENV_CONFLICT_POLICY: &str = "TICK_CONFLICT_POLICY";
const ENV_PORT: &str = "PORT";

const DEFAULT_RETRY_BASE_MS: u64 = 1000;
const DEFAULT_RETRY_COUNT: u32 = 3;
const DEFAULT_SCRAPE_CRON: &str = "*/10 * * * *";
const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Asia::Ho_Chi_Minh;

/// A configuration value that could not be interpreted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub key: String,
    pub value: String,
    pub reason: String,
}

impl ConfigError {
    fn new(key: &str, value: &str, reason: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid value '{}' for {}: {}", self.value, self.key, self.reason)
    }
}

impl std::error::Error for ConfigError {}

/// What a tick insert does when (product, source, effective_at) already exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Keep the first stored quote
    #[default]
    DoNothing,
    /// Overwrite prices, hash and collected_at with the newer quote
    Update,
}

impl ConflictPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::DoNothing => "do_nothing",
            ConflictPolicy::Update => "update",
        }
    }
}

impl FromStr for ConflictPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "do_nothing" | "nothing" | "ignore" => Ok(ConflictPolicy::DoNothing),
            "update" | "overwrite" => Ok(ConflictPolicy::Update),
            _ => Err(ConfigError::new(ENV_CONFLICT_POLICY, s, "expected do_nothing or update")),
        }
    }
}

/// Parse an `HH:mm` or `HH:mm:ss` time of day
pub fn parse_time(key: &str, text: &str) -> Result<NaiveTime, ConfigError> {
    let trimmed = text.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(|e| ConfigError::new(key, text, e.to_string()))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Reads keys through an injectable lookup so tests never touch the process env
struct Settings<F: Fn(&str) -> Option<String>> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Settings<F> {
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn parsed<T: FromStr>(&self, key: &str, default: T) -> T {
        match self.raw(key) {
            Some(value) => value.trim().parse().unwrap_or_else(|_| {
                warn!(key, value = %value, "Unparseable setting, using default");
                default
            }),
            None => default,
        }
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        match self.raw(key) {
            Some(value) => parse_bool(&value).unwrap_or_else(|| {
                warn!(key, value = %value, "Unparseable flag, using default");
                default
            }),
            None => default,
        }
    }

    fn time(&self, key: &str, default: NaiveTime) -> NaiveTime {
        match self.raw(key) {
            Some(value) => parse_time(key, &value).unwrap_or_else(|e| {
                warn!(error = %e, "Using default time of day");
                default
            }),
            None => default,
        }
    }

    fn timezone(&self, key: &str, default: Tz) -> Tz {
        match self.raw(key) {
            Some(value) => value.trim().parse::<Tz>().unwrap_or_else(|_| {
                warn!(key, value = %value, "Unknown timezone, using default");
                default
            }),
            None => default,
        }
    }
}

fn env_lookup(key: &str) -> Option<String> {
    env::var(key).ok()
}

/// Per-source fetch and anomaly settings
#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    pub price_url: String,
    pub timeout: Duration,
    /// Total attempts including the first request
    pub retry_count: u32,
    pub retry_base_delay: Duration,
    pub filter: AnomalyFilter,
    pub enabled: bool,
}

impl SourceConfig {
    pub fn defaults(kind: SourceKind) -> Self {
        let (url, timeout_secs, min, max, spread) = match kind {
            SourceKind::Doji => ("https://doji.vn/gia-vang", 10, dec!(5000000), dec!(220000000), dec!(0.10)),
            SourceKind::Btmc => (
                "http://api.btmc.vn/api/BTMCAPI/getpricebtmc",
                10,
                dec!(9000000),
                dec!(80000000),
                dec!(0.05),
            ),
            SourceKind::Sjc => (
                "https://sjc.com.vn/GoldPrice/Services/PriceService.ashx",
                15,
                dec!(9000000),
                dec!(220000000),
                dec!(0.15),
            ),
            SourceKind::PhucThanh => ("https://vangbacphucthanh.vn/", 15, dec!(9000000), dec!(220000000), dec!(0.20)),
        };

        Self {
            price_url: url.to_string(),
            timeout: Duration::from_secs(timeout_secs),
            retry_count: DEFAULT_RETRY_COUNT,
            retry_base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_MS),
            filter: AnomalyFilter::new(min, max, spread),
            enabled: true,
        }
    }

    pub fn from_env(kind: SourceKind) -> Self {
        Self::from_lookup(kind, env_lookup)
    }

    pub fn from_lookup(kind: SourceKind, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let settings = Settings { lookup };
        let defaults = Self::defaults(kind);
        let key = |suffix: &str| format!("{}_{}", kind.env_prefix(), suffix);

        let timeout_secs: u64 = settings.parsed(&key("TIMEOUT_SECS"), defaults.timeout.as_secs());
        let retry_base_ms: u64 = settings.parsed(ENV_RETRY_BASE_MS, DEFAULT_RETRY_BASE_MS);
        let min_price: Decimal = settings.parsed(&key("MIN_PRICE"), defaults.filter.min_price);
        let max_price: Decimal = settings.parsed(&key("MAX_PRICE"), defaults.filter.max_price);
        let max_spread: Decimal = settings.parsed(&key("MAX_SPREAD_RATIO"), defaults.filter.max_spread_ratio);

        Self {
            price_url: settings.raw(&key("PRICE_URL")).unwrap_or(defaults.price_url),
            timeout: Duration::from_secs(timeout_secs.max(1)),
            retry_count: settings.parsed::<u32>(&key("RETRY_COUNT"), defaults.retry_count).max(1),
            retry_base_delay: Duration::from_millis(retry_base_ms),
            filter: AnomalyFilter::new(min_price, max_price, max_spread),
            enabled: settings.flag(&key("ENABLED"), defaults.enabled),
        }
    }
}

/// Settings for both background loops
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleConfig {
    pub window_start: NaiveTime,
    pub window_end: NaiveTime,
    pub timezone: Tz,
    /// Cron expression for scrape wakes, read in `timezone`
    pub scrape_cron: String,
    pub snapshot_at: NaiveTime,
    pub scraper_enabled: bool,
    pub snapshot_enabled: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            window_start: NaiveTime::from_hms_opt(7, 30, 0).unwrap_or(NaiveTime::MIN),
            window_end: NaiveTime::from_hms_opt(21, 0, 0).unwrap_or(NaiveTime::MIN),
            timezone: DEFAULT_TIMEZONE,
            scrape_cron: DEFAULT_SCRAPE_CRON.to_string(),
            snapshot_at: NaiveTime::from_hms_opt(21, 5, 0).unwrap_or(NaiveTime::MIN),
            scraper_enabled: false,
            snapshot_enabled: false,
        }
    }
}

impl ScheduleConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let settings = Settings { lookup };
        let defaults = Self::default();

        let scrape_cron = match settings.raw(ENV_SCRAPE_CRON) {
            Some(value) => match parse_cron(&value) {
                Ok(_) => value.trim().to_string(),
                Err(e) => {
                    warn!(key = ENV_SCRAPE_CRON, value = %value, error = %e, "Invalid cron expression, using default");
                    defaults.scrape_cron
                }
            },
            None => defaults.scrape_cron,
        };

        Self {
            window_start: settings.time(ENV_WINDOW_START, defaults.window_start),
            window_end: settings.time(ENV_WINDOW_END, defaults.window_end),
            timezone: settings.timezone(ENV_TIMEZONE, defaults.timezone),
            scrape_cron,
            snapshot_at: settings.time(ENV_SNAPSHOT_AT, defaults.snapshot_at),
            scraper_enabled: settings.flag(ENV_SCRAPER_ENABLED, defaults.scraper_enabled),
            snapshot_enabled: settings.flag(ENV_SNAPSHOT_ENABLED, defaults.snapshot_enabled),
        }
    }
}

/// Everything `main` needs to wire the process
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub sources: Vec<(SourceKind, SourceConfig)>,
    pub schedule: ScheduleConfig,
    pub database_url: Option<String>,
    pub conflict_policy: ConflictPolicy,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String> + Copy) -> Self {
        let settings = Settings { lookup };

        let conflict_policy = match settings.raw(ENV_CONFLICT_POLICY) {
            Some(value) => value.parse().unwrap_or_else(|e: ConfigError| {
                warn!(error = %e, "Using default conflict policy");
                ConflictPolicy::default()
            }),
            None => ConflictPolicy::default(),
        };

        Self {
            sources: SourceKind::ALL
                .iter()
                .map(|kind| (*kind, SourceConfig::from_lookup(*kind, lookup)))
                .collect(),
            schedule: ScheduleConfig::from_lookup(lookup),
            database_url: settings.raw(ENV_DATABASE_URL),
            conflict_policy,
            port: settings.parsed(ENV_PORT, DEFAULT_PORT),
        }
    }
}
