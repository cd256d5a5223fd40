//! Configuration types
//!
//! Built-in defaults cover every field. A TOML file may override any subset,
//! and a few operational knobs can be overridden again from the environment.
//! Durations in files and env vars are whole milliseconds or seconds as named.

use crate::error::{ConfigError, CrmResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ============================================================================
// DRAG
// ============================================================================

/// Thresholds a gesture must cross before it becomes a drag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationConstraints {
    /// Pointer (mouse/pen) travel from the press point, in pixels.
    pub pointer_distance: f64,
    /// Touch hold time before a drag may start.
    pub touch_delay: Duration,
    /// Touch travel allowed during the hold, in pixels.
    pub touch_tolerance: f64,
}

impl Default for ActivationConstraints {
    fn default() -> Self {
        Self {
            pointer_distance: 5.0,
            touch_delay: Duration::from_millis(100),
            touch_tolerance: 8.0,
        }
    }
}

/// Drag coordinator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DragConfig {
    /// How long the move slot stays held after persistence settles, so drop
    /// animations finish before another move is accepted.
    pub settle_delay: Duration,
    pub activation: ActivationConstraints,
}

impl Default for DragConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(300),
            activation: ActivationConstraints::default(),
        }
    }
}

// ============================================================================
// CACHE
// ============================================================================

/// Age after which a cached read triggers a refetch, per entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleTimes {
    pub pipelines: Duration,
    pub columns: Duration,
    pub leads: Duration,
    pub lead_detail: Duration,
    pub contacts: Duration,
    pub tags: Duration,
    pub comments: Duration,
    pub analytics: Duration,
}

impl Default for StaleTimes {
    fn default() -> Self {
        Self {
            pipelines: Duration::from_secs(10 * 60),
            columns: Duration::from_secs(10 * 60),
            leads: Duration::from_secs(2 * 60),
            lead_detail: Duration::from_secs(5 * 60),
            contacts: Duration::from_secs(60),
            tags: Duration::from_secs(15 * 60),
            comments: Duration::from_secs(30),
            analytics: Duration::from_secs(5 * 60),
        }
    }
}

impl StaleTimes {
    fn named(&self) -> [(&'static str, Duration); 8] {
        [
            ("pipelines", self.pipelines),
            ("columns", self.columns),
            ("leads", self.leads),
            ("lead_detail", self.lead_detail),
            ("contacts", self.contacts),
            ("tags", self.tags),
            ("comments", self.comments),
            ("analytics", self.analytics),
        ]
    }
}

/// Cache coordinator timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheTimingConfig {
    pub stale_times: StaleTimes,
    /// Entries whose data is older than this are evicted by cleanup.
    pub max_entry_age: Duration,
    /// Period of the background cleanup sweep.
    pub cleanup_interval: Duration,
}

impl Default for CacheTimingConfig {
    fn default() -> Self {
        Self {
            stale_times: StaleTimes::default(),
            max_entry_age: Duration::from_secs(30 * 60),
            cleanup_interval: Duration::from_secs(5 * 60),
        }
    }
}

// ============================================================================
// MASTER CONFIG
// ============================================================================

/// Master configuration struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CrmConfig {
    pub drag: DragConfig,
    pub cache: CacheTimingConfig,
}

impl CrmConfig {
    /// Defaults, then the TOML file, then environment overrides.
    pub fn load(path: Option<&Path>) -> CrmResult<Self> {
        let config = match path {
            Some(path) => Self::from_path(path)?,
            None => Self::default(),
        };
        let config = config.with_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> CrmResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            reason: format!("{}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse a TOML document and layer it over the defaults.
    pub fn from_toml_str(contents: &str) -> CrmResult<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        Ok(file.apply(Self::default()))
    }

    /// Apply environment-style overrides read through `lookup`.
    ///
    /// Recognised variables:
    /// - `CRM_DRAG_SETTLE_DELAY_MS`
    /// - `CRM_CACHE_MAX_AGE_SECS`
    /// - `CRM_CACHE_CLEANUP_INTERVAL_SECS`
    pub fn with_overrides<F>(mut self, lookup: F) -> CrmResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ms) = parse_override(&lookup, "CRM_DRAG_SETTLE_DELAY_MS")? {
            self.drag.settle_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_override(&lookup, "CRM_CACHE_MAX_AGE_SECS")? {
            self.cache.max_entry_age = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_override(&lookup, "CRM_CACHE_CLEANUP_INTERVAL_SECS")? {
            self.cache.cleanup_interval = Duration::from_secs(secs);
        }
        Ok(self)
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - settle delay and every cache duration are positive
    /// - pointer distance and touch tolerance are positive and finite
    pub fn validate(&self) -> CrmResult<()> {
        positive_duration("drag.settle_delay", self.drag.settle_delay)?;
        positive_duration("drag.activation.touch_delay", self.drag.activation.touch_delay)?;
        positive_distance(
            "drag.activation.pointer_distance",
            self.drag.activation.pointer_distance,
        )?;
        positive_distance(
            "drag.activation.touch_tolerance",
            self.drag.activation.touch_tolerance,
        )?;

        for (name, value) in self.cache.stale_times.named() {
            positive_duration(&format!("cache.stale_times.{}", name), value)?;
        }
        positive_duration("cache.max_entry_age", self.cache.max_entry_age)?;
        positive_duration("cache.cleanup_interval", self.cache.cleanup_interval)?;

        Ok(())
    }
}

fn parse_override<F>(lookup: &F, name: &str) -> CrmResult<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<u64>().map(Some).map_err(|_| {
            ConfigError::InvalidValue {
                field: name.to_string(),
                value: raw.clone(),
                reason: "must be a non-negative integer".to_string(),
            }
            .into()
        }),
    }
}

fn positive_duration(field: &str, value: Duration) -> CrmResult<()> {
    if value.is_zero() {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: format!("{:?}", value),
            reason: "must be positive".to_string(),
        }
        .into());
    }
    Ok(())
}

fn positive_distance(field: &str, value: f64) -> CrmResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: "must be a positive number".to_string(),
        }
        .into());
    }
    Ok(())
}

// ============================================================================
// FILE FORMAT
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    drag: DragSection,
    #[serde(default)]
    cache: CacheSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DragSection {
    settle_delay_ms: Option<u64>,
    pointer_distance: Option<f64>,
    touch_delay_ms: Option<u64>,
    touch_tolerance: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CacheSection {
    max_entry_age_secs: Option<u64>,
    cleanup_interval_secs: Option<u64>,
    #[serde(default)]
    stale_times_ms: StaleTimesSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StaleTimesSection {
    pipelines: Option<u64>,
    columns: Option<u64>,
    leads: Option<u64>,
    lead_detail: Option<u64>,
    contacts: Option<u64>,
    tags: Option<u64>,
    comments: Option<u64>,
    analytics: Option<u64>,
}

impl ConfigFile {
    fn apply(self, mut config: CrmConfig) -> CrmConfig {
        let drag = self.drag;
        if let Some(ms) = drag.settle_delay_ms {
            config.drag.settle_delay = Duration::from_millis(ms);
        }
        if let Some(d) = drag.pointer_distance {
            config.drag.activation.pointer_distance = d;
        }
        if let Some(ms) = drag.touch_delay_ms {
            config.drag.activation.touch_delay = Duration::from_millis(ms);
        }
        if let Some(t) = drag.touch_tolerance {
            config.drag.activation.touch_tolerance = t;
        }

        let cache = self.cache;
        if let Some(secs) = cache.max_entry_age_secs {
            config.cache.max_entry_age = Duration::from_secs(secs);
        }
        if let Some(secs) = cache.cleanup_interval_secs {
            config.cache.cleanup_interval = Duration::from_secs(secs);
        }

        let st = cache.stale_times_ms;
        let target = &mut config.cache.stale_times;
        for (value, slot) in [
            (st.pipelines, &mut target.pipelines),
            (st.columns, &mut target.columns),
            (st.leads, &mut target.leads),
            (st.lead_detail, &mut target.lead_detail),
            (st.contacts, &mut target.contacts),
            (st.tags, &mut target.tags),
            (st.comments, &mut target.comments),
            (st.analytics, &mut target.analytics),
        ] {
            if let Some(ms) = value {
                *slot = Duration::from_millis(ms);
            }
        }

        config
    }
}

// =============================================================================
// TESTS
// =============================================================================
