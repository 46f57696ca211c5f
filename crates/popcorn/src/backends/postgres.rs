//! 🐘 PostgreSQL episode store.
//!
//! One row per `(serie_id, season, episode)`, BIGSERIAL identity, UNIQUE across the triple.
//! Every batch is a transaction: all of the series' episodes land, or none do.

use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, info};

use crate::backends::{EpisodeStore, EpisodeWriteMode};
use crate::common::Episode;

/// 🧮 3 binds per row, Postgres caps binds at 65535. 1000 rows keeps us far from it.
const ROWS_PER_STATEMENT: usize = 1000;

#[derive(Debug, Deserialize, Clone)]
pub struct PostgresConfig {
    pub url: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default)]
    pub write_mode: EpisodeWriteMode,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_table() -> String {
    "tvserie_episodes".to_string()
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug)]
pub(crate) struct PostgresEpisodeStore {
    pool: PgPool,
    table: String,
    write_mode: EpisodeWriteMode,
}

impl PostgresEpisodeStore {
    pub(crate) async fn connect(config: PostgresConfig) -> Result<Self> {
        let table = validated_table_name(&config.table)?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .context("💀 could not reach PostgreSQL. the elephant is elsewhere.")?;
        info!(
            "🐘 episode store ready: table '{}', write mode {:?}",
            table, config.write_mode
        );
        Ok(Self {
            pool,
            table,
            write_mode: config.write_mode,
        })
    }
}

static TABLE_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("table name pattern is a valid regex")
});

/// 🔒 Table names get spliced into SQL, so only plain identifiers are allowed in.
fn validated_table_name(raw: &str) -> Result<String> {
    if !TABLE_NAME_PATTERN.is_match(raw) {
        bail!(
            "💀 '{raw}' is not a table name we will put into SQL. letters, digits, underscores, 63 max."
        );
    }
    Ok(raw.to_string())
}

#[async_trait]
impl EpisodeStore for PostgresEpisodeStore {
    async fn ensure_table(&self) -> Result<()> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_schema = current_schema() AND table_name = $1)",
        )
        .bind(&self.table)
        .fetch_one(&self.pool)
        .await
        .context("💀 could not ask information_schema about our table")?;

        if exists {
            debug!("✅ table '{}' already there", self.table);
            return Ok(());
        }

        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id BIGSERIAL PRIMARY KEY,
                serie_id TEXT NOT NULL,
                season INTEGER NOT NULL,
                episode INTEGER NOT NULL,
                CONSTRAINT {table}_serie_season_episode_key UNIQUE (serie_id, season, episode)
            )
            "#,
            table = self.table
        );
        sqlx::query(&ddl)
            .execute(&self.pool)
            .await
            .with_context(|| format!("💀 could not create table '{}'", self.table))?;
        info!("🏗️ created table '{}'", self.table);
        Ok(())
    }

    async fn insert_episodes(&self, series_id: &str, episodes: &[Episode]) -> Result<u64> {
        if episodes.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .context("💀 could not open a transaction for the episode batch")?;

        if self.write_mode == EpisodeWriteMode::Replace {
            let deleted = sqlx::query(&format!("DELETE FROM {} WHERE serie_id = $1", self.table))
                .bind(series_id)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("💀 could not clear old episodes of {series_id}"))?;
            debug!(
                "🧹 replace mode: dropped {} old rows for {}",
                deleted.rows_affected(),
                series_id
            );
        }

        let mut written = 0u64;
        for chunk in episodes.chunks(ROWS_PER_STATEMENT) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO {} (serie_id, season, episode) ",
                self.table
            ));
            builder.push_values(chunk, |mut row, episode| {
                row.push_bind(series_id)
                    .push_bind(episode.season)
                    .push_bind(episode.episode);
            });

            let result = match builder.build().execute(&mut *tx).await {
                Ok(result) => result,
                Err(err) => {
                    let duplicate = err
                        .as_database_error()
                        .is_some_and(|db_err| db_err.is_unique_violation());
                    if duplicate {
                        return Err(err).with_context(|| {
                            format!(
                                "💀 episodes of {series_id} are already in '{}'. insert mode does not overwrite. switch write_mode to replace or clean up by hand.",
                                self.table
                            )
                        });
                    }
                    return Err(err)
                        .with_context(|| format!("💀 batch insert for {series_id} failed"));
                }
            };
            written += result.rows_affected();
        }

        // 🔒 dropping `tx` on any error above rolls the whole batch back
        tx.commit()
            .await
            .with_context(|| format!("💀 commit of {series_id}'s episodes failed"))?;
        Ok(written)
    }
}
