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
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use energy_import_core::StatRow;

/// Rows per upsert chunk.
const UPSERT_CHUNK_SIZE: usize = 200;

/// Destination statistics tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsTable {
    /// Long-term table, one row per hour or coarser.
    Long,
    /// Short-term table, sub-hourly cadence.
    Short,
}

impl StatsTable {
    pub fn table_name(self) -> &'static str {
        match self {
            Self::Long => "statistics",
            Self::Short => "statistics_short_term",
        }
    }
}

/// Storage ids of one sensor's series.
#[derive(Debug, Clone, Copy)]
pub struct SeriesIds {
    pub metadata_id: i64,
    /// Paired `<name>_cost` series, absent when cost tracking is not
    /// configured for the sensor.
    pub cost_metadata_id: Option<i64>,
}

/// One destination's merged rows, ready to persist.
#[derive(Debug, Clone)]
pub struct WritePlan {
    pub table: StatsTable,
    pub rows: Vec<StatRow>,
}

/// Statistics store over the Home Assistant recorder database.
#[derive(Debug)]
pub struct StatisticsStore {
    conn: Mutex<Connection>,
}

impl StatisticsStore {
    pub fn open(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }

        let conn =
            Connection::open(path).with_context(|| format!("Failed to open database: {path}"))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Round-trip a trivial query to prove the database is reachable before
    /// any sensor work starts.
    pub fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        let answer: String = conn
            .query_row("SELECT 'ping'", [], |row| row.get(0))
            .context("Database connection check failed")?;
        if answer != "ping" {
            bail!("Database connection returned bad response");
        }
        Ok(())
    }

    /// Create the statistics tables when missing. A live Home Assistant
    /// database already has them; a fresh one (or a test fixture) gets the
    /// same shape, including the unique index the upsert conflicts on.
    pub fn ensure_schema(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS statistics_meta (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                statistic_id        TEXT NOT NULL,
                source              TEXT,
                unit_of_measurement TEXT
            );
            CREATE UNIQUE INDEX IF NOT EXISTS ix_statistics_meta_statistic_id
                ON statistics_meta(statistic_id);

            CREATE TABLE IF NOT EXISTS statistics (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                created_ts  REAL,
                metadata_id INTEGER NOT NULL,
                start_ts    REAL NOT NULL,
                state       REAL,
                sum         REAL,
                FOREIGN KEY (metadata_id) REFERENCES statistics_meta(id)
            );
            CREATE UNIQUE INDEX IF NOT EXISTS ix_statistics_statistic_id_start_ts
                ON statistics(metadata_id, start_ts);

            CREATE TABLE IF NOT EXISTS statistics_short_term (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                created_ts  REAL,
                metadata_id INTEGER NOT NULL,
                start_ts    REAL NOT NULL,
                state       REAL,
                sum         REAL,
                FOREIGN KEY (metadata_id) REFERENCES statistics_meta(id)
            );
            CREATE UNIQUE INDEX IF NOT EXISTS ix_statistics_short_term_statistic_id_start_ts
                ON statistics_short_term(metadata_id, start_ts);",
        )
        .context("Failed to initialize statistics schema")?;

        Ok(())
    }

    /// Map a sensor name to its series ids. The paired cost series is
    /// picked up by the `<name>_cost` naming convention when registered.
    pub fn resolve_series(&self, sensor_name: &str) -> Result<SeriesIds> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        let cost_name = format!("{sensor_name}_cost");

        let mut stmt = conn.prepare(
            "SELECT id, statistic_id FROM statistics_meta
             WHERE statistic_id = ?1 OR statistic_id = ?2",
        )?;
        let rows: Vec<(i64, String)> = stmt
            .query_map(params![sensor_name, cost_name], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let metadata_id = rows
            .iter()
            .find(|(_, sid)| sid.as_str() == sensor_name)
            .map(|(id, _)| *id)
            .with_context(|| {
                format!("Sensor '{sensor_name}' is not registered in statistics_meta")
            })?;
        let cost_metadata_id = rows
            .iter()
            .find(|(_, sid)| sid.as_str() == cost_name)
            .map(|(id, _)| *id);

        Ok(SeriesIds {
            metadata_id,
            cost_metadata_id,
        })
    }

    /// Register a series in `statistics_meta`, returning its id. A live
    /// recorder database registers sensors itself; this exists for fresh
    /// databases and test fixtures.
    pub fn register_series(&self, statistic_id: &str, unit: &str) -> Result<i64> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        conn.execute(
            "INSERT INTO statistics_meta (statistic_id, source, unit_of_measurement)
             VALUES (?1, 'historic_import', ?2)",
            params![statistic_id, unit],
        )
        .with_context(|| format!("Failed to register series '{statistic_id}'"))?;
        Ok(conn.last_insert_rowid())
    }

    /// All stored rows for one series, ordered by start time. The
    /// synthetic `id` column is deliberately not selected; identity is
    /// re-derived from `(metadata_id, start_ts)` on write-back.
    pub fn fetch_rows(&self, table: StatsTable, metadata_id: i64) -> Result<Vec<StatRow>> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        let sql = format!(
            "SELECT metadata_id, start_ts, state, sum, created_ts
             FROM {} WHERE metadata_id = ?1 ORDER BY start_ts ASC",
            table.table_name()
        );
        let mut stmt = conn.prepare(&sql)?;

        let rows: Vec<StatRow> = stmt
            .query_map(params![metadata_id], |row| {
                Ok(StatRow {
                    metadata_id: row.get(0)?,
                    start_ts: row.get(1)?,
                    state: row.get(2)?,
                    sum: row.get(3)?,
                    created_ts: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to read rows from {}", table.table_name()))?;

        Ok(rows)
    }

    /// Persist every destination of one sensor pass in a single
    /// transaction: either all merged sequences land, or none do.
    ///
    /// Rows whose `(metadata_id, start_ts)` key already exists get their
    /// non-key columns overwritten (the per-import `sum` recomputation has
    /// to reach existing rows); fresh keys are inserted.
    pub fn write_all(&self, plans: &[WritePlan]) -> Result<()> {
        let mut conn = self.conn.lock().expect("database mutex poisoned");
        let tx = conn
            .transaction()
            .context("Failed to open statistics transaction")?;

        for plan in plans {
            let sql = format!(
                "INSERT INTO {} (metadata_id, start_ts, state, sum, created_ts)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(metadata_id, start_ts) DO UPDATE SET
                    state = excluded.state,
                    sum = excluded.sum,
                    created_ts = excluded.created_ts",
                plan.table.table_name()
            );
            let mut stmt = tx
                .prepare(&sql)
                .with_context(|| format!("Failed to prepare upsert for {}", plan.table.table_name()))?;

            for chunk in plan.rows.chunks(UPSERT_CHUNK_SIZE) {
                for row in chunk {
                    stmt.execute(params![
                        row.metadata_id,
                        row.start_ts,
                        row.state,
                        row.sum,
                        row.created_ts,
                    ])
                    .with_context(|| {
                        format!("Failed to upsert row into {}", plan.table.table_name())
                    })?;
                }
                debug!(
                    "Upserted chunk of {} rows into {}",
                    chunk.len(),
                    plan.table.table_name()
                );
            }
            info!(
                "Upserted {} rows into {}",
                plan.rows.len(),
                plan.table.table_name()
            );
        }

        tx.commit().context("Failed to commit statistics write")?;
        Ok(())
    }
}
