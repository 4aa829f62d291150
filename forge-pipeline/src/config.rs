//! Pipeline configuration resolution
//!
//! Every option resolves independently, highest priority first:
//! ledger `settings` table → environment (`FORGE_<KEY>`) → TOML → default.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use forge_common::config::TomlConfig;
use forge_common::{Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::db::settings::get_raw_setting;
use crate::models::score::NORMALIZED_SCALE;
use crate::models::{Category, Score};

pub const DEFAULT_SCAN_INTERVAL_MINUTES: u64 = 30;
pub const DEFAULT_DAILY_BUILD_LIMIT: u32 = 3;
pub const DEFAULT_SCORE_THRESHOLD: f64 = 8.0;
pub const DEFAULT_WORKER_COUNT: usize = 1;
pub const DEFAULT_FEED_BASE_URL: &str = "https://moltbook.com/api/v1";
pub const DEFAULT_FEED_PAGE_LIMIT: u32 = 50;
pub const DEFAULT_MAX_PAGES_PER_SCAN: u32 = 1;
pub const DEFAULT_LISTEN_PORT: u16 = 5740;

/// Scale `score_threshold` is expressed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdScale {
    /// 0–15 display scale
    Normalized15,
    /// 0–100 raw total
    Percent,
}

impl ThresholdScale {
    fn max(&self) -> f64 {
        match self {
            ThresholdScale::Normalized15 => NORMALIZED_SCALE,
            ThresholdScale::Percent => 100.0,
        }
    }
}

impl fmt::Display for ThresholdScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ThresholdScale::Normalized15 => "normalized15",
            ThresholdScale::Percent => "percent",
        })
    }
}

impl FromStr for ThresholdScale {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "normalized15" | "normalized" => Ok(ThresholdScale::Normalized15),
            "percent" | "raw" => Ok(ThresholdScale::Percent),
            other => Err(format!("unknown threshold scale: {}", other)),
        }
    }
}

/// Admission threshold, converted once to raw-scale tenths
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreThreshold {
    pub value: f64,
    pub scale: ThresholdScale,
    raw_tenths: i64,
}

impl ScoreThreshold {
    pub fn new(value: f64, scale: ThresholdScale) -> Result<Self> {
        if !value.is_finite() || value < 0.0 || value > scale.max() {
            return Err(Error::Config(format!(
                "score_threshold {} is outside 0..={} for scale {}",
                value,
                scale.max(),
                scale
            )));
        }

        let raw_tenths = match scale {
            ThresholdScale::Normalized15 => (value * 1000.0 / NORMALIZED_SCALE).round() as i64,
            ThresholdScale::Percent => (value * 10.0).round() as i64,
        };

        Ok(Self {
            value,
            scale,
            raw_tenths,
        })
    }

    /// Threshold on the raw 0–100 scale, in integer tenths
    pub fn raw_tenths(&self) -> i64 {
        self.raw_tenths
    }

    pub fn raw(&self) -> f64 {
        self.raw_tenths as f64 / 10.0
    }

    /// Inclusive lower bound: a total equal to the threshold passes
    pub fn admits(&self, score: &Score) -> bool {
        score.total_tenths() >= self.raw_tenths
    }
}

impl Default for ScoreThreshold {
    fn default() -> Self {
        Self {
            value: DEFAULT_SCORE_THRESHOLD,
            scale: ThresholdScale::Normalized15,
            raw_tenths: 533,
        }
    }
}

/// Category → bonus points, each clamped to 0–10
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryBonusTable(BTreeMap<Category, f64>);

impl CategoryBonusTable {
    /// Build from `{category name: points}`; unlisted categories get 0
    pub fn from_map(map: &BTreeMap<String, f64>) -> Result<Self> {
        let mut table = BTreeMap::new();
        for (name, points) in map {
            let category: Category = name.parse().map_err(Error::Config)?;
            if !points.is_finite() {
                return Err(Error::Config(format!(
                    "category bonus for {} is not a number",
                    name
                )));
            }
            table.insert(category, points.clamp(0.0, 10.0));
        }
        Ok(Self(table))
    }

    pub fn bonus(&self, category: Category) -> f64 {
        self.0.get(&category).copied().unwrap_or(0.0)
    }
}

impl Default for CategoryBonusTable {
    fn default() -> Self {
        Self(BTreeMap::from([
            (Category::AiApplication, 10.0),
            (Category::Platform, 9.0),
            (Category::Automation, 8.0),
            (Category::Tool, 7.0),
            (Category::Other, 0.0),
        ]))
    }
}

impl FromStr for CategoryBonusTable {
    type Err = String;

    /// JSON object form used by the settings table and environment
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let map: BTreeMap<String, f64> =
            serde_json::from_str(s).map_err(|e| format!("invalid bonus table JSON: {}", e))?;
        Self::from_map(&map).map_err(|e| e.to_string())
    }
}

/// Feed connection options
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedConfig {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub page_limit: u32,
    pub max_pages_per_scan: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_FEED_BASE_URL.to_string(),
            api_key: None,
            page_limit: DEFAULT_FEED_PAGE_LIMIT,
            max_pages_per_scan: DEFAULT_MAX_PAGES_PER_SCAN,
        }
    }
}

/// Fully resolved pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineConfig {
    pub scan_interval_minutes: u64,
    pub daily_build_limit: u32,
    pub threshold: ScoreThreshold,
    pub category_bonus: CategoryBonusTable,
    #[serde(serialize_with = "serialize_offset")]
    pub quota_offset: FixedOffset,
    pub worker_count: usize,
    pub feed: FeedConfig,
    pub listen_port: u16,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scan_interval_minutes: DEFAULT_SCAN_INTERVAL_MINUTES,
            daily_build_limit: DEFAULT_DAILY_BUILD_LIMIT,
            threshold: ScoreThreshold::default(),
            category_bonus: CategoryBonusTable::default(),
            quota_offset: utc(),
            worker_count: DEFAULT_WORKER_COUNT,
            feed: FeedConfig::default(),
            listen_port: DEFAULT_LISTEN_PORT,
        }
    }
}

impl PipelineConfig {
    /// Resolve every option from the ledger, environment and TOML
    pub async fn resolve(db: &SqlitePool, toml: &TomlConfig) -> Result<Self> {
        let threshold_value =
            resolve_value(db, "score_threshold", toml.score_threshold, DEFAULT_SCORE_THRESHOLD)
                .await?;
        let threshold_scale = resolve_value(
            db,
            "score_threshold_scale",
            parse_toml(&toml.score_threshold_scale)?,
            ThresholdScale::Normalized15,
        )
        .await?;
        let toml_bonus = toml
            .category_bonus_table
            .as_ref()
            .map(CategoryBonusTable::from_map)
            .transpose()?;
        let quota_offset: UtcOffset = resolve_value(
            db,
            "quota_utc_offset",
            parse_toml(&toml.quota_utc_offset)?,
            UtcOffset(utc()),
        )
        .await?;

        let config = Self {
            scan_interval_minutes: resolve_value(
                db,
                "scan_interval_minutes",
                toml.scan_interval_minutes,
                DEFAULT_SCAN_INTERVAL_MINUTES,
            )
            .await?,
            daily_build_limit: resolve_value(
                db,
                "daily_build_limit",
                toml.daily_build_limit,
                DEFAULT_DAILY_BUILD_LIMIT,
            )
            .await?,
            threshold: ScoreThreshold::new(threshold_value, threshold_scale)?,
            category_bonus: resolve_value(
                db,
                "category_bonus_table",
                toml_bonus,
                CategoryBonusTable::default(),
            )
            .await?,
            quota_offset: quota_offset.0,
            worker_count: resolve_value(db, "worker_count", toml.worker_count, DEFAULT_WORKER_COUNT)
                .await?,
            feed: FeedConfig {
                base_url: resolve_value(
                    db,
                    "feed_base_url",
                    toml.feed_base_url.clone(),
                    DEFAULT_FEED_BASE_URL.to_string(),
                )
                .await?,
                api_key: resolve_optional(db, "feed_api_key", toml.feed_api_key.clone()).await?,
                page_limit: resolve_value(
                    db,
                    "feed_page_limit",
                    toml.feed_page_limit,
                    DEFAULT_FEED_PAGE_LIMIT,
                )
                .await?,
                max_pages_per_scan: resolve_value(
                    db,
                    "max_pages_per_scan",
                    toml.max_pages_per_scan,
                    DEFAULT_MAX_PAGES_PER_SCAN,
                )
                .await?,
            },
            listen_port: resolve_value(db, "listen_port", toml.listen_port, DEFAULT_LISTEN_PORT)
                .await?,
        };

        config.validate()?;

        info!(
            scan_interval_minutes = config.scan_interval_minutes,
            daily_build_limit = config.daily_build_limit,
            threshold = config.threshold.value,
            threshold_scale = %config.threshold.scale,
            threshold_raw = config.threshold.raw(),
            quota_offset = %config.quota_offset,
            worker_count = config.worker_count,
            "Pipeline configuration resolved"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scan_interval_minutes == 0 {
            return Err(Error::Config("scan_interval_minutes must be at least 1".into()));
        }
        if self.worker_count == 0 {
            return Err(Error::Config("worker_count must be at least 1".into()));
        }
        if self.feed.page_limit == 0 || self.feed.max_pages_per_scan == 0 {
            return Err(Error::Config(
                "feed_page_limit and max_pages_per_scan must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_minutes * 60)
    }

    /// Quota day (`YYYY-MM-DD`) containing `now` in the configured offset
    pub fn quota_day(&self, now: DateTime<Utc>) -> String {
        quota_day(now, self.quota_offset)
    }
}

/// Calendar day of `now` at a fixed offset, as `YYYY-MM-DD`
pub fn quota_day(now: DateTime<Utc>, offset: FixedOffset) -> String {
    now.with_timezone(&offset).format("%Y-%m-%d").to_string()
}

/// Parse a fixed UTC offset: `Z`, `UTC`, `+08:00`, `-0530`, `+8`
pub fn parse_utc_offset(value: &str) -> std::result::Result<FixedOffset, String> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("z") || value.eq_ignore_ascii_case("utc") {
        return Ok(utc());
    }

    let invalid = || format!("invalid UTC offset: {:?}", value);
    let (sign, rest) = match value.chars().next() {
        Some('+') => (1, &value[1..]),
        Some('-') => (-1, &value[1..]),
        _ => return Err(invalid()),
    };

    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() == 4 && rest.is_ascii() => rest.split_at(2),
        None => (rest, "0"),
    };
    let hours: u32 = hours.parse().map_err(|_| invalid())?;
    let minutes: u32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 14 || minutes > 59 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60) as i32).ok_or_else(invalid)
}

fn utc() -> FixedOffset {
    Utc.fix()
}

#[derive(Debug, Clone, Copy)]
struct UtcOffset(FixedOffset);

impl FromStr for UtcOffset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        parse_utc_offset(s).map(UtcOffset)
    }
}

fn serialize_offset<S: serde::Serializer>(
    offset: &FixedOffset,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(offset)
}

fn parse_toml<T>(value: &Option<String>) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .as_deref()
        .map(|v| {
            v.parse::<T>()
                .map_err(|e| Error::Config(format!("Invalid TOML value {:?}: {}", v, e)))
        })
        .transpose()
}

fn env_key(key: &str) -> String {
    format!("FORGE_{}", key.to_uppercase())
}

/// Resolve one option through the four tiers
async fn resolve_value<T>(db: &SqlitePool, key: &str, toml: Option<T>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    Ok(resolve_optional(db, key, toml).await?.unwrap_or(default))
}

async fn resolve_optional<T>(db: &SqlitePool, key: &str, toml: Option<T>) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let parse = |source: &str, raw: &str| {
        raw.trim()
            .parse::<T>()
            .map_err(|e| Error::Config(format!("Invalid {} value for {}={:?}: {}", source, key, raw, e)))
    };

    // Tier 1: ledger settings
    if let Some(raw) = get_raw_setting(db, key).await? {
        if !raw.trim().is_empty() {
            debug!(key, "Option loaded from database");
            return parse("database", &raw).map(Some);
        }
    }

    // Tier 2: environment
    if let Ok(raw) = std::env::var(env_key(key)) {
        if !raw.trim().is_empty() {
            debug!(key, "Option loaded from environment");
            return parse("environment", &raw).map(Some);
        }
    }

    // Tier 3: TOML
    if toml.is_some() {
        debug!(key, "Option loaded from TOML config");
    }
    Ok(toml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::settings::set_setting;
    use chrono::TimeZone;
    use forge_common::db::init_memory_database;
    use serial_test::serial;

    #[test]
    fn test_default_threshold_converts_to_raw() {
        let threshold = ScoreThreshold::new(8.0, ThresholdScale::Normalized15).unwrap();
        assert_eq!(threshold.raw_tenths(), 533);
        assert_eq!(threshold, ScoreThreshold::default());

        let percent = ScoreThreshold::new(60.0, ThresholdScale::Percent).unwrap();
        assert_eq!(percent.raw_tenths(), 600);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let threshold = ScoreThreshold::new(53.3, ThresholdScale::Percent).unwrap();
        let at = Score::from_parts(35.0, 18.3, 0.0, 0.0, 0.0);
        let below = Score::from_parts(35.0, 17.3, 0.0, 0.0, 0.0);
        assert!(threshold.admits(&at));
        assert!(!threshold.admits(&below));
    }

    #[test]
    fn test_threshold_out_of_scale() {
        assert!(ScoreThreshold::new(16.0, ThresholdScale::Normalized15).is_err());
        assert!(ScoreThreshold::new(-1.0, ThresholdScale::Percent).is_err());
        assert!(ScoreThreshold::new(100.0, ThresholdScale::Percent).is_ok());
    }

    #[test]
    fn test_parse_utc_offset() {
        assert_eq!(parse_utc_offset("Z").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_utc_offset("+08:00").unwrap().local_minus_utc(), 8 * 3600);
        assert_eq!(parse_utc_offset("-0530").unwrap().local_minus_utc(), -(5 * 3600 + 1800));
        assert_eq!(parse_utc_offset("+9").unwrap().local_minus_utc(), 9 * 3600);
        assert!(parse_utc_offset("08:00").is_err());
        assert!(parse_utc_offset("+25:00").is_err());
    }

    #[test]
    fn test_quota_day_uses_offset() {
        let mut config = PipelineConfig::default();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 20, 0, 0).unwrap();
        assert_eq!(config.quota_day(now), "2026-03-01");

        config.quota_offset = parse_utc_offset("+08:00").unwrap();
        assert_eq!(config.quota_day(now), "2026-03-02");
    }

    #[test]
    fn test_bonus_table_parsing() {
        let table: CategoryBonusTable = r#"{"tool": 12, "ai-application": 4}"#.parse().unwrap();
        assert_eq!(table.bonus(Category::Tool), 10.0);
        assert_eq!(table.bonus(Category::AiApplication), 4.0);
        assert_eq!(table.bonus(Category::Platform), 0.0);

        assert!(r#"{"games": 3}"#.parse::<CategoryBonusTable>().is_err());
        assert_eq!(CategoryBonusTable::default().bonus(Category::Platform), 9.0);
    }

    #[tokio::test]
    #[serial]
    async fn test_resolution_priority() {
        let db = init_memory_database().await.unwrap();
        let toml = TomlConfig {
            daily_build_limit: Some(5),
            scan_interval_minutes: Some(10),
            worker_count: Some(2),
            ..Default::default()
        };

        std::env::set_var("FORGE_SCAN_INTERVAL_MINUTES", "15");
        std::env::set_var("FORGE_WORKER_COUNT", "3");
        set_setting(&db, "worker_count", 4).await.unwrap();

        let config = PipelineConfig::resolve(&db, &toml).await.unwrap();

        std::env::remove_var("FORGE_SCAN_INTERVAL_MINUTES");
        std::env::remove_var("FORGE_WORKER_COUNT");

        assert_eq!(config.daily_build_limit, 5);
        assert_eq!(config.scan_interval_minutes, 15);
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.threshold.raw_tenths(), 533);
        assert_eq!(config.feed.base_url, DEFAULT_FEED_BASE_URL);
        assert_eq!(config.feed.api_key, None);
    }

    #[tokio::test]
    #[serial]
    async fn test_invalid_values_rejected() {
        let db = init_memory_database().await.unwrap();

        let toml = TomlConfig {
            scan_interval_minutes: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            PipelineConfig::resolve(&db, &toml).await,
            Err(Error::Config(_))
        ));

        set_setting(&db, "quota_utc_offset", "tomorrow").await.unwrap();
        assert!(matches!(
            PipelineConfig::resolve(&db, &TomlConfig::default()).await,
            Err(Error::Config(_))
        ));
    }
}
