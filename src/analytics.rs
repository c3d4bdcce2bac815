//! Analytics pipeline.
//!
//! Turns the unbounded, irregularly-timed stream of scored mentions into a
//! smoothed, bucketed time series, and collapses per-mention annotation
//! arrays into ranked, deduplicated roll-ups. The reductions are pure
//! functions over rows the queries feed them in order, so they are testable
//! without a database.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::error::Result;
use crate::ident::IntoId;
use crate::models::{CategoryMention, EntityMention, MentionText, TrendPoint};

/// Default trend bucket width.
pub const DEFAULT_GRANULARITY_MINUTES: i64 = 60;

pub struct Analytics {
    pool: SqlitePool,
}

impl Analytics {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Bucketed score trend for a keyword.
    ///
    /// Selects the keyword's scored mentions from `date_cutoff` onwards
    /// (epoch when `None`), ascending by timestamp, and reduces them with
    /// [`bucket_scores`]. A keyword with no scored mentions yields an empty
    /// list, not an error.
    pub async fn get_plotting_data(
        &self,
        keyword_id: impl IntoId,
        date_cutoff: Option<DateTime<Utc>>,
        granularity_minutes: i64,
    ) -> Result<Vec<TrendPoint>> {
        let keyword_id = keyword_id.into_id()?;
        let cutoff = date_cutoff.map(|d| d.timestamp()).unwrap_or(0);

        let rows = sqlx::query(
            "SELECT timestamp, score FROM mentions \
             WHERE keyword_ref = ? AND score IS NOT NULL AND timestamp >= ? \
             ORDER BY timestamp",
        )
        .bind(keyword_id.to_string())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let points: Vec<(i64, f64)> = rows
            .iter()
            .map(|row| (row.get("timestamp"), row.get("score")))
            .collect();

        Ok(bucket_scores(&points, granularity_minutes))
    }

    /// Mean score across all of a keyword's scored mentions. Unscored
    /// mentions are excluded by the averaging operator, never counted as
    /// zero; `None` when no scored mention exists.
    pub async fn get_average_score(&self, keyword_id: impl IntoId) -> Result<Option<f64>> {
        let keyword_id = keyword_id.into_id()?;

        let average: Option<f64> =
            sqlx::query_scalar("SELECT AVG(score) FROM mentions WHERE keyword_ref = ?")
                .bind(keyword_id.to_string())
                .fetch_one(&self.pool)
                .await?;

        Ok(average)
    }

    /// Ranked entity roll-up across all of a keyword's mentions.
    ///
    /// Flattens every mention's entity array into one multiset, groups by
    /// value, sums the counts, averages the per-element scores, sorts by
    /// summed count descending and truncates to `limit` (`None` = unbounded).
    pub async fn get_entities(
        &self,
        keyword_id: impl IntoId,
        limit: Option<usize>,
    ) -> Result<Vec<EntityMention>> {
        let keyword_id = keyword_id.into_id()?;

        let payloads: Vec<String> =
            sqlx::query_scalar("SELECT entities_json FROM mentions WHERE keyword_ref = ?")
                .bind(keyword_id.to_string())
                .fetch_all(&self.pool)
                .await?;

        let mut flattened = Vec::new();
        for payload in &payloads {
            let entities: Vec<EntityMention> = serde_json::from_str(payload)?;
            flattened.extend(entities.into_iter().map(|e| (e.value, e.count, e.score)));
        }

        let mut rolled = roll_up(flattened);
        if let Some(limit) = limit {
            rolled.truncate(limit);
        }

        Ok(rolled
            .into_iter()
            .map(|(value, count, score)| EntityMention { value, count, score })
            .collect())
    }

    /// Ranked category roll-up; symmetric to
    /// [`Analytics::get_entities`], with `confidence` in place of `score`.
    pub async fn get_categories(
        &self,
        keyword_id: impl IntoId,
        limit: Option<usize>,
    ) -> Result<Vec<CategoryMention>> {
        let keyword_id = keyword_id.into_id()?;

        let payloads: Vec<String> =
            sqlx::query_scalar("SELECT categories_json FROM mentions WHERE keyword_ref = ?")
                .bind(keyword_id.to_string())
                .fetch_all(&self.pool)
                .await?;

        let mut flattened = Vec::new();
        for payload in &payloads {
            let categories: Vec<CategoryMention> = serde_json::from_str(payload)?;
            flattened.extend(
                categories
                    .into_iter()
                    .map(|c| (c.value, c.count, c.confidence)),
            );
        }

        let mut rolled = roll_up(flattened);
        if let Some(limit) = limit {
            rolled.truncate(limit);
        }

        Ok(rolled
            .into_iter()
            .map(|(value, count, confidence)| CategoryMention {
                value,
                count,
                confidence,
            })
            .collect())
    }

    /// All mentions of a keyword as `{text, score, timestamp}` rows, newest
    /// first. Export data; no aggregation.
    pub async fn get_texts(&self, keyword_id: impl IntoId) -> Result<Vec<MentionText>> {
        let keyword_id = keyword_id.into_id()?;

        let rows = sqlx::query(
            "SELECT text, score, timestamp FROM mentions \
             WHERE keyword_ref = ? ORDER BY timestamp DESC",
        )
        .bind(keyword_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| MentionText {
                text: row.get("text"),
                score: row.get("score"),
                timestamp: row.get("timestamp"),
            })
            .collect())
    }
}

/// Greedy single-pass bucketing of `(timestamp, score)` points, which must
/// arrive sorted ascending by timestamp.
///
/// A bucket opens at the first point's timestamp with a window end of
/// `timestamp + granularity`. Points accumulate into the open bucket while
/// they fall on or before the window end; the first point past it finalizes
/// the bucket (its accumulated sum becomes the mean) and opens a new one.
/// Buckets are contiguous, non-overlapping and variable-count; this is a
/// streaming reduction, not an average of averages.
pub fn bucket_scores(points: &[(i64, f64)], granularity_minutes: i64) -> Vec<TrendPoint> {
    let window = granularity_minutes * 60;
    let mut buckets = Vec::new();

    let mut open: Option<(i64, f64, u64)> = None; // (start, sum, count)

    for &(timestamp, score) in points {
        match open {
            Some((start, sum, count)) if timestamp <= start + window => {
                open = Some((start, sum + score, count + 1));
            }
            Some((start, sum, count)) => {
                buckets.push(TrendPoint {
                    timestamp: start,
                    score: sum / count as f64,
                    count,
                });
                open = Some((timestamp, score, 1));
            }
            None => {
                open = Some((timestamp, score, 1));
            }
        }
    }

    // Flush the last open bucket
    if let Some((start, sum, count)) = open {
        buckets.push(TrendPoint {
            timestamp: start,
            score: sum / count as f64,
            count,
        });
    }

    buckets
}

/// Group `(value, count, score)` rows by value: counts are summed, scores
/// averaged per element (unweighted). Sorted by summed count descending,
/// value ascending as the tie-break for determinism.
fn roll_up(rows: Vec<(String, i64, f64)>) -> Vec<(String, i64, f64)> {
    struct Group {
        count: i64,
        total: f64,
        elements: u32,
    }

    let mut groups: HashMap<String, Group> = HashMap::new();
    for (value, count, score) in rows {
        let group = groups.entry(value).or_insert(Group {
            count: 0,
            total: 0.0,
            elements: 0,
        });
        group.count += count;
        group.total += score;
        group.elements += 1;
    }

    let mut rolled: Vec<(String, i64, f64)> = groups
        .into_iter()
        .map(|(value, g)| (value, g.count, g.total / g.elements as f64))
        .collect();

    rolled.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    rolled
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minutes(m: i64) -> i64 {
        m * 60
    }

    #[test]
    fn test_bucket_empty() {
        assert!(bucket_scores(&[], 60).is_empty());
    }

    #[test]
    fn test_bucket_single_point() {
        let buckets = bucket_scores(&[(minutes(5), 0.4)], 60);
        assert_eq!(
            buckets,
            vec![TrendPoint {
                timestamp: minutes(5),
                score: 0.4,
                count: 1
            }]
        );
    }

    #[test]
    fn test_bucket_boundary_inclusive() {
        // A point exactly on the window end joins the open bucket
        let buckets = bucket_scores(&[(0, 1.0), (minutes(60), 3.0)], 60);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].count, 2);
        assert!((buckets[0].score - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_bucket_minute_offsets() {
        // Offsets [0, 32, 62, 92] at granularity 60: 62 > 0+60 opens a new
        // bucket, 92 <= 62+60 joins it, giving two buckets of two.
        let points = vec![
            (minutes(0), 0.2),
            (minutes(32), 0.4),
            (minutes(62), 0.6),
            (minutes(92), 0.8),
        ];
        let buckets = bucket_scores(&points, 60);

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].timestamp, minutes(0));
        assert_eq!(buckets[0].count, 2);
        assert!((buckets[0].score - 0.3).abs() < 1e-9);
        assert_eq!(buckets[1].timestamp, minutes(62));
        assert_eq!(buckets[1].count, 2);
        assert!((buckets[1].score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_bucket_mean_not_average_of_averages() {
        // Three points in one bucket, one in the next: means stay per-bucket
        let points = vec![
            (minutes(0), 0.0),
            (minutes(10), 0.3),
            (minutes(20), 0.9),
            (minutes(100), 0.5),
        ];
        let buckets = bucket_scores(&points, 60);

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].count, 3);
        assert!((buckets[0].score - 0.4).abs() < 1e-9);
        assert_eq!(buckets[1].count, 1);
        assert!((buckets[1].score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_roll_up_merges_values() {
        let rows = vec![
            ("X".to_string(), 2, 0.5),
            ("X".to_string(), 3, 0.9),
        ];
        let rolled = roll_up(rows);

        assert_eq!(rolled.len(), 1);
        assert_eq!(rolled[0].0, "X");
        assert_eq!(rolled[0].1, 5);
        assert!((rolled[0].2 - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_roll_up_sorts_by_summed_count() {
        let rows = vec![
            ("low".to_string(), 1, 0.1),
            ("high".to_string(), 4, 0.2),
            ("high".to_string(), 4, 0.4),
            ("mid".to_string(), 5, 0.3),
        ];
        let rolled = roll_up(rows);

        let order: Vec<&str> = rolled.iter().map(|(v, _, _)| v.as_str()).collect();
        assert_eq!(order, vec!["high", "mid", "low"]);
        assert_eq!(rolled[0].1, 8);
    }

    #[test]
    fn test_roll_up_empty() {
        assert!(roll_up(Vec::new()).is_empty());
    }
}
