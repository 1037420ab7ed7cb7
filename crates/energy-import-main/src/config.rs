// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use energy_import_core::{EnergyUnit, SeriesKind};
use energy_import_store::StatsTable;

#[derive(Debug, Clone, Deserialize)]
pub struct ImporterConfig {
    #[serde(default)]
    pub database: DatabaseSettings,
    pub home_assistant: HomeAssistantSettings,
    pub sensors: Vec<SensorSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HomeAssistantSettings {
    pub url: String,
    pub api_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SensorSettings {
    /// Statistics name of the sensor in Home Assistant.
    pub sensor_name: String,
    /// Which destination tables this sensor feeds.
    pub kind: SensorKind,
    pub series_type: SeriesKind,
    pub unit_of_measurement: EnergyUnit,
    #[serde(default = "default_conversion_factor")]
    pub conversion_factor: f64,
    /// Signed shift in seconds applied to every sample timestamp, for
    /// moving interval-boundary samples (e.g. midnight) into the preceding
    /// interval.
    pub time_offset: Option<i64>,
    /// Price per kWh; enables the paired `<sensor_name>_cost` series.
    pub cost: Option<f64>,
    pub source: SourceSettings,
}

/// Sampling cadence of a sensor, deciding its destination tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    /// One reading per day or coarser: long-term table only.
    Long,
    /// Sub-daily readings: short-term and long-term tables.
    Short,
}

impl SensorKind {
    pub fn tables(self) -> &'static [StatsTable] {
        match self {
            Self::Long => &[StatsTable::Long],
            Self::Short => &[StatsTable::Short, StatsTable::Long],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceSettings {
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Key of the reading array in the response body.
    pub location: String,
    /// Field holding the sample timestamp.
    pub date_field: String,
    /// Field holding the sample value.
    pub state_field: String,
    #[serde(default = "default_start")]
    pub start: String,
    #[serde(default = "default_end")]
    pub end: String,
}

fn default_db_path() -> String {
    "./config/home-assistant_v2.db".to_owned()
}

fn default_conversion_factor() -> f64 {
    1.0
}

fn default_start() -> String {
    "yesterday".to_owned()
}

fn default_end() -> String {
    "today".to_owned()
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl ImporterConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| "Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.home_assistant.url.is_empty() {
            bail!("home_assistant.url must be set");
        }
        if self.home_assistant.api_token.trim().is_empty() {
            bail!("home_assistant.api_token must be set");
        }
        if self.sensors.is_empty() {
            bail!("at least one [[sensors]] section is required");
        }
        for sensor in &self.sensors {
            let name = &sensor.sensor_name;
            if name.is_empty() {
                bail!("sensor_name must not be empty");
            }
            if sensor.source.url.is_empty() {
                bail!("source.url must be set for sensor '{name}'");
            }
            if sensor.conversion_factor <= 0.0 {
                bail!("conversion_factor must be positive for sensor '{name}'");
            }
            if let Some(cost) = sensor.cost
                && cost <= 0.0
            {
                bail!("cost must be positive for sensor '{name}'");
            }
            // Surface malformed date strings at load, before any I/O.
            let probe = NaiveDate::from_ymd_opt(2024, 1, 2).expect("valid probe date");
            resolve_date(&sensor.source.start, probe)
                .with_context(|| format!("bad source.start for sensor '{name}'"))?;
            resolve_date(&sensor.source.end, probe)
                .with_context(|| format!("bad source.end for sensor '{name}'"))?;
        }
        Ok(())
    }
}

/// Resolve a raw config date: the `yesterday`/`today` shorthands relative
/// to `today`, or a literal `YYYY-MM-DD`.
pub fn resolve_date(raw: &str, today: NaiveDate) -> Result<NaiveDate> {
    match raw {
        "yesterday" => Ok(today - chrono::Duration::days(1)),
        "today" => Ok(today),
        literal => NaiveDate::parse_from_str(literal, "%Y-%m-%d")
            .with_context(|| format!("Date '{literal}' does not follow the YYYY-MM-DD pattern")),
    }
}
