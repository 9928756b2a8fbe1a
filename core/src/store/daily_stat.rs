//! Store methods for per-video daily statistics.

use super::{date_from_row, date_to_sql, day_bounds, PipelineStore};
use crate::{
    aggregation_stage::DailyStat,
    error::PipelineResult,
    reporting::StatMetric,
    types::{Seconds, VideoId},
};
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

/// One video's counted playback for a day, straight from the event table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyStatSource {
    pub video_id:              VideoId,
    pub session_count:         i64,
    pub total_watched_seconds: Seconds,
}

/// A video's stat totals over a date window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoStatTotals {
    pub video_id:              VideoId,
    /// `None` when the video has since left the catalog.
    pub title:                 Option<String>,
    pub view_count:            i64,
    pub total_watched_seconds: Seconds,
}

fn stat_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DailyStat> {
    Ok(DailyStat {
        video_id:              row.get(0)?,
        stat_date:             date_from_row(row, 1)?,
        view_count:            row.get(2)?,
        total_watched_seconds: row.get(3)?,
    })
}

impl PipelineStore {
    /// Group counted sessions created on `date` by video, keyset-paginated
    /// by video id.
    pub fn playback_totals_for_date(
        &self,
        date:  NaiveDate,
        after: Option<VideoId>,
        limit: usize,
    ) -> PipelineResult<Vec<DailyStatSource>> {
        let (day_start, day_end) = day_bounds(date);
        let mut stmt = self.conn.prepare(
            "SELECT video_id,
                    COUNT(DISTINCT session_id),
                    COALESCE(SUM(accumulated_seconds), 0)
             FROM playback_event
             WHERE created_at >= ?1 AND created_at < ?2
               AND counts_toward_views = 1
               AND video_id > ?3
             GROUP BY video_id
             ORDER BY video_id ASC
             LIMIT ?4",
        )?;
        let rows = stmt.query_map(
            params![day_start, day_end, after.unwrap_or(i64::MIN), limit as i64],
            |row| {
                Ok(DailyStatSource {
                    video_id:              row.get(0)?,
                    session_count:         row.get(1)?,
                    total_watched_seconds: row.get(2)?,
                })
            },
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Insert or replace the (video, date) row. Recomputing a day from the
    /// same events yields the same row.
    pub fn upsert_daily_stat(&self, stat: &DailyStat) -> PipelineResult<()> {
        self.conn.execute(
            "INSERT INTO daily_video_stat (video_id, stat_date, view_count, total_watched_seconds)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (video_id, stat_date) DO UPDATE SET
                view_count = excluded.view_count,
                total_watched_seconds = excluded.total_watched_seconds",
            params![
                stat.video_id,
                date_to_sql(stat.stat_date),
                stat.view_count,
                stat.total_watched_seconds,
            ],
        )?;
        Ok(())
    }

    pub fn daily_stat(&self, video_id: VideoId, date: NaiveDate) -> PipelineResult<Option<DailyStat>> {
        let stat = self.conn.query_row(
            "SELECT video_id, stat_date, view_count, total_watched_seconds
             FROM daily_video_stat WHERE video_id = ?1 AND stat_date = ?2",
            params![video_id, date_to_sql(date)],
            stat_from_row,
        ).optional()?;
        Ok(stat)
    }

    /// Stats rows for `date`, keyset-paginated by video id.
    pub fn daily_stats_for_date(
        &self,
        date:  NaiveDate,
        after: Option<VideoId>,
        limit: usize,
    ) -> PipelineResult<Vec<DailyStat>> {
        let mut stmt = self.conn.prepare(
            "SELECT video_id, stat_date, view_count, total_watched_seconds
             FROM daily_video_stat
             WHERE stat_date = ?1 AND video_id > ?2
             ORDER BY video_id ASC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(
            params![date_to_sql(date), after.unwrap_or(i64::MIN), limit as i64],
            stat_from_row,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Sum of `view_count` for the video on dates strictly before `date`.
    pub fn view_total_before(&self, video_id: VideoId, date: NaiveDate) -> PipelineResult<i64> {
        let total: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(view_count), 0) FROM daily_video_stat
             WHERE video_id = ?1 AND stat_date < ?2",
            params![video_id, date_to_sql(date)],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    /// Sum of `view_count` for the video on dates up to and including `date`.
    pub fn view_total_through(&self, video_id: VideoId, date: NaiveDate) -> PipelineResult<i64> {
        let total: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(view_count), 0) FROM daily_video_stat
             WHERE video_id = ?1 AND stat_date <= ?2",
            params![video_id, date_to_sql(date)],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    /// Per-video stat totals over an inclusive date window, joined with the
    /// video title. Ordered by the chosen metric, descending.
    pub fn stat_totals_between(
        &self,
        start:  NaiveDate,
        end:    NaiveDate,
        metric: StatMetric,
        limit:  usize,
    ) -> PipelineResult<Vec<VideoStatTotals>> {
        let order = match metric {
            StatMetric::Views       => "views DESC, watched DESC",
            StatMetric::WatchedTime => "watched DESC, views DESC",
        };
        let sql = format!(
            "SELECT s.video_id, v.title,
                    SUM(s.view_count) AS views,
                    SUM(s.total_watched_seconds) AS watched
             FROM daily_video_stat s
             LEFT JOIN video v ON v.video_id = s.video_id
             WHERE s.stat_date >= ?1 AND s.stat_date <= ?2
             GROUP BY s.video_id
             ORDER BY {order}, s.video_id ASC
             LIMIT ?3"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![date_to_sql(start), date_to_sql(end), limit as i64],
            |row| {
                Ok(VideoStatTotals {
                    video_id:              row.get(0)?,
                    title:                 row.get(1)?,
                    view_count:            row.get(2)?,
                    total_watched_seconds: row.get(3)?,
                })
            },
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}
