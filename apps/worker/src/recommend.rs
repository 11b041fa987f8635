//! Local recommendation data access
//!
//! Recommendations are scored offline into four tables, two per collection
//! family. The taste family ranks by accumulated points; the watch family
//! ranks pending/active rows by recency. This module only reads them - the
//! scoring pipelines that fill the tables live outside the worker.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::catalog::MediaKind;
use crate::error::WorkerResult;

/// The two curated-collection families
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CollectionFamily {
    Taste,
    Watch,
}

impl CollectionFamily {
    /// The naming-convention root shared by all per-owner variants
    pub fn base_name(&self) -> &'static str {
        match self {
            Self::Taste => "Inspired by your Immaculate Taste",
            Self::Watch => "Based on your recently watched",
        }
    }

    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Taste => "taste",
            Self::Watch => "watch",
        }
    }
}

/// One of the four local recommendation tables
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SourceTable {
    MovieTaste,
    TvTaste,
    MovieWatch,
    TvWatch,
}

impl SourceTable {
    /// All source tables, in scan order
    pub const ALL: [SourceTable; 4] = [
        Self::MovieTaste,
        Self::TvTaste,
        Self::MovieWatch,
        Self::TvWatch,
    ];

    /// The media kind this table feeds
    pub fn media_kind(&self) -> MediaKind {
        match self {
            Self::MovieTaste | Self::MovieWatch => MediaKind::Movie,
            Self::TvTaste | Self::TvWatch => MediaKind::Tv,
        }
    }

    /// The collection family this table feeds
    pub fn family(&self) -> CollectionFamily {
        match self {
            Self::MovieTaste | Self::TvTaste => CollectionFamily::Taste,
            Self::MovieWatch | Self::TvWatch => CollectionFamily::Watch,
        }
    }

    /// The underlying table name
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::MovieTaste => "movie_taste_recs",
            Self::TvTaste => "tv_taste_recs",
            Self::MovieWatch => "movie_watch_recs",
            Self::TvWatch => "tv_watch_recs",
        }
    }
}

/// Row counts for one `(owner, section)` group in one source table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupCount {
    pub source: SourceTable,
    pub owner_id: i64,
    pub section_id: i64,
    /// All rows in the group
    pub total_rows: i64,
    /// Rows that should actually render in the rebuilt collection
    pub active_rows: i64,
}

/// Read access to the local recommendation tables
#[async_trait]
pub trait RecommendationSource: Send + Sync {
    /// Scan all source tables, grouping rows by `(owner_id, section_id)`
    async fn group_counts(&self) -> WorkerResult<Vec<GroupCount>>;

    /// Ranked item ids for one group, capped at the configured maximum
    async fn ranked_items(
        &self,
        owner_id: i64,
        section_id: i64,
        source: SourceTable,
    ) -> WorkerResult<Vec<i64>>;

    /// Locally cached owner display names
    ///
    /// These lag the remote identity data, which is exactly what makes them
    /// useful: collection names minted before a rename are still
    /// recognizable through them.
    async fn known_user_titles(&self) -> WorkerResult<std::collections::BTreeMap<i64, String>>;
}

/// Postgres-backed recommendation source
#[derive(Clone)]
pub struct PgRecommendationSource {
    pool: PgPool,
    max_items: usize,
}

#[derive(sqlx::FromRow)]
struct CountRow {
    owner_id: i64,
    section_id: i64,
    total_rows: i64,
    active_rows: i64,
}

impl PgRecommendationSource {
    /// Create a source over the given pool with a per-collection item cap
    pub fn new(pool: PgPool, max_items: usize) -> Self {
        Self { pool, max_items }
    }

    fn counts_sql(source: SourceTable) -> String {
        let active_filter = match source.family() {
            CollectionFamily::Taste => "active",
            CollectionFamily::Watch => "status IN ('pending', 'active')",
        };
        format!(
            r#"
            SELECT owner_id, section_id,
                   COUNT(*) AS total_rows,
                   COUNT(*) FILTER (WHERE {active_filter}) AS active_rows
            FROM {table}
            GROUP BY owner_id, section_id
            "#,
            active_filter = active_filter,
            table = source.table_name(),
        )
    }

    fn ranked_sql(source: SourceTable) -> String {
        match source.family() {
            // Points ranking, stable by title then key to avoid jitter
            CollectionFamily::Taste => format!(
                r#"
                SELECT rating_key FROM {table}
                WHERE owner_id = $1 AND section_id = $2 AND active
                ORDER BY points DESC, LOWER(title) ASC, rating_key ASC
                LIMIT $3
                "#,
                table = source.table_name(),
            ),
            // Most recent watches first
            CollectionFamily::Watch => format!(
                r#"
                SELECT rating_key FROM {table}
                WHERE owner_id = $1 AND section_id = $2
                  AND status IN ('pending', 'active')
                ORDER BY watched_at DESC, rating_key ASC
                LIMIT $3
                "#,
                table = source.table_name(),
            ),
        }
    }
}

#[async_trait]
impl RecommendationSource for PgRecommendationSource {
    async fn group_counts(&self) -> WorkerResult<Vec<GroupCount>> {
        let mut counts = Vec::new();

        for source in SourceTable::ALL {
            let rows: Vec<CountRow> = sqlx::query_as(&Self::counts_sql(source))
                .fetch_all(&self.pool)
                .await?;

            counts.extend(rows.into_iter().map(|r| GroupCount {
                source,
                owner_id: r.owner_id,
                section_id: r.section_id,
                total_rows: r.total_rows,
                active_rows: r.active_rows,
            }));
        }

        Ok(counts)
    }

    async fn ranked_items(
        &self,
        owner_id: i64,
        section_id: i64,
        source: SourceTable,
    ) -> WorkerResult<Vec<i64>> {
        let keys: Vec<i64> = sqlx::query_scalar(&Self::ranked_sql(source))
            .bind(owner_id)
            .bind(section_id)
            .bind(self.max_items as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(keys)
    }

    async fn known_user_titles(&self) -> WorkerResult<std::collections::BTreeMap<i64, String>> {
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT user_id, title FROM user_titles")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().collect())
    }
}
