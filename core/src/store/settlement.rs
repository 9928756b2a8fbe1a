//! Store methods for daily settlement rows.

use super::{date_from_row, date_to_sql, ts_to_sql, PipelineStore};
use crate::{
    error::PipelineResult,
    settlement_stage::SettlementRecord,
    types::{Amount, UserId, VideoId},
};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

const SETTLEMENT_COLUMNS: &str =
    "video_id, uploader_id, settlement_date, previous_total_views, today_views,
     previous_total_ad_views, today_ad_views, video_amount, ad_amount";

/// Summed settlement amounts for one video over a date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSettlementTotals {
    pub video_id:     VideoId,
    pub video_amount: Amount,
    pub ad_amount:    Amount,
    pub total_amount: Amount,
}

fn settlement_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SettlementRecord> {
    Ok(SettlementRecord {
        video_id:                row.get(0)?,
        uploader_id:             row.get(1)?,
        settlement_date:         date_from_row(row, 2)?,
        previous_total_views:    row.get(3)?,
        today_views:             row.get(4)?,
        previous_total_ad_views: row.get(5)?,
        today_ad_views:          row.get(6)?,
        video_amount:            row.get(7)?,
        ad_amount:               row.get(8)?,
    })
}

impl PipelineStore {
    pub fn settlement_exists(&self, video_id: VideoId, date: NaiveDate) -> PipelineResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM daily_settlement WHERE video_id = ?1 AND settlement_date = ?2
             )",
            params![video_id, date_to_sql(date)],
            |row| row.get(0),
        )?;
        Ok(exists != 0)
    }

    /// Insert a settlement row. An existing (video, date) row is left
    /// untouched; returns the number of rows actually inserted.
    pub fn insert_settlement(
        &self,
        record:     &SettlementRecord,
        created_at: NaiveDateTime,
    ) -> PipelineResult<usize> {
        let n = self.conn.execute(
            "INSERT INTO daily_settlement (
                video_id, uploader_id, settlement_date, previous_total_views, today_views,
                previous_total_ad_views, today_ad_views, video_amount, ad_amount, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT (video_id, settlement_date) DO NOTHING",
            params![
                record.video_id,
                record.uploader_id,
                date_to_sql(record.settlement_date),
                record.previous_total_views,
                record.today_views,
                record.previous_total_ad_views,
                record.today_ad_views,
                record.video_amount,
                record.ad_amount,
                ts_to_sql(created_at),
            ],
        )?;
        Ok(n)
    }

    pub fn settlement(
        &self,
        video_id: VideoId,
        date:     NaiveDate,
    ) -> PipelineResult<Option<SettlementRecord>> {
        let sql = format!(
            "SELECT {SETTLEMENT_COLUMNS} FROM daily_settlement
             WHERE video_id = ?1 AND settlement_date = ?2"
        );
        let record = self.conn
            .query_row(&sql, params![video_id, date_to_sql(date)], settlement_from_row)
            .optional()?;
        Ok(record)
    }

    /// The video's most recent settlement dated strictly before `date`.
    pub fn latest_settlement_before(
        &self,
        video_id: VideoId,
        date:     NaiveDate,
    ) -> PipelineResult<Option<SettlementRecord>> {
        let sql = format!(
            "SELECT {SETTLEMENT_COLUMNS} FROM daily_settlement
             WHERE video_id = ?1 AND settlement_date < ?2
             ORDER BY settlement_date DESC LIMIT 1"
        );
        let record = self.conn
            .query_row(&sql, params![video_id, date_to_sql(date)], settlement_from_row)
            .optional()?;
        Ok(record)
    }

    pub fn settlements_for_video(&self, video_id: VideoId) -> PipelineResult<Vec<SettlementRecord>> {
        let sql = format!(
            "SELECT {SETTLEMENT_COLUMNS} FROM daily_settlement
             WHERE video_id = ?1 ORDER BY settlement_date ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![video_id], settlement_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Stored `total_amount` of one row (the generated column), for checks.
    pub fn stored_total_amount(&self, video_id: VideoId, date: NaiveDate) -> PipelineResult<Option<Amount>> {
        let total = self.conn.query_row(
            "SELECT total_amount FROM daily_settlement
             WHERE video_id = ?1 AND settlement_date = ?2",
            params![video_id, date_to_sql(date)],
            |row| row.get(0),
        ).optional()?;
        Ok(total)
    }

    /// Per-video sums of settled amounts over an inclusive date window,
    /// optionally restricted to one uploader or one video.
    pub fn settlement_totals_between(
        &self,
        start:       NaiveDate,
        end:         NaiveDate,
        uploader_id: Option<UserId>,
        video_id:    Option<VideoId>,
    ) -> PipelineResult<Vec<VideoSettlementTotals>> {
        let mut stmt = self.conn.prepare(
            "SELECT video_id, SUM(video_amount), SUM(ad_amount), SUM(total_amount)
             FROM daily_settlement
             WHERE settlement_date >= ?1 AND settlement_date <= ?2
               AND (?3 IS NULL OR uploader_id = ?3)
               AND (?4 IS NULL OR video_id = ?4)
             GROUP BY video_id
             ORDER BY video_id ASC",
        )?;
        let rows = stmt.query_map(
            params![date_to_sql(start), date_to_sql(end), uploader_id, video_id],
            |row| {
                Ok(VideoSettlementTotals {
                    video_id:     row.get(0)?,
                    video_amount: row.get(1)?,
                    ad_amount:    row.get(2)?,
                    total_amount: row.get(3)?,
                })
            },
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}
