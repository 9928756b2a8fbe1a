//! Store methods for ad placements, playback sessions and ad exposures.

use super::{day_bounds, flag, ts_from_row, ts_to_sql, PipelineStore};
use crate::{
    error::PipelineResult,
    session_tracker::{AdExposureEvent, AdPlacement, PlaybackEvent},
    types::{AdId, Seconds, UserId, VideoId},
};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, OptionalExtension};

const PLAYBACK_COLUMNS: &str =
    "id, session_id, video_id, user_id, ip_address, last_position,
     accumulated_seconds, counts_toward_views, created_at, updated_at";

fn playback_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PlaybackEvent> {
    Ok(PlaybackEvent {
        id:                  Some(row.get(0)?),
        session_id:          row.get(1)?,
        video_id:            row.get(2)?,
        user_id:             row.get(3)?,
        ip_address:          row.get(4)?,
        last_position:       row.get(5)?,
        accumulated_seconds: row.get(6)?,
        counts_toward_views: row.get::<_, i64>(7)? != 0,
        created_at:          ts_from_row(row, 8)?,
        updated_at:          ts_from_row(row, 9)?,
    })
}

impl PipelineStore {
    // ── Ad placements ─────────────────────────────────────────────

    pub fn placement_count(&self, video_id: VideoId) -> PipelineResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM ad_placement WHERE video_id = ?1",
            params![video_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn insert_placement(
        &self,
        video_id: VideoId,
        ad_id:    AdId,
        position: Seconds,
    ) -> PipelineResult<()> {
        self.conn.execute(
            "INSERT INTO ad_placement (video_id, ad_id, position_seconds) VALUES (?1, ?2, ?3)",
            params![video_id, ad_id, position],
        )?;
        Ok(())
    }

    /// All placements of a video, in timeline order.
    pub fn placements_for_video(&self, video_id: VideoId) -> PipelineResult<Vec<AdPlacement>> {
        self.placements_where(video_id, i64::MIN, i64::MAX)
    }

    /// Placements with `after < position <= through`, in timeline order.
    pub fn placements_crossed(
        &self,
        video_id: VideoId,
        after:    Seconds,
        through:  Seconds,
    ) -> PipelineResult<Vec<AdPlacement>> {
        self.placements_where(video_id, after, through)
    }

    fn placements_where(
        &self,
        video_id: VideoId,
        after:    Seconds,
        through:  Seconds,
    ) -> PipelineResult<Vec<AdPlacement>> {
        let mut stmt = self.conn.prepare(
            "SELECT placement_id, video_id, ad_id, position_seconds
             FROM ad_placement
             WHERE video_id = ?1 AND position_seconds > ?2 AND position_seconds <= ?3
             ORDER BY position_seconds ASC, placement_id ASC",
        )?;
        let rows = stmt.query_map(params![video_id, after, through], |row| {
            Ok(AdPlacement {
                placement_id:     row.get(0)?,
                video_id:         row.get(1)?,
                ad_id:            row.get(2)?,
                position_seconds: row.get(3)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Playback sessions ─────────────────────────────────────────

    pub fn insert_playback_event(&self, event: &PlaybackEvent) -> PipelineResult<i64> {
        self.conn.execute(
            "INSERT INTO playback_event (
                session_id, video_id, user_id, ip_address, last_position,
                accumulated_seconds, counts_toward_views, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                event.session_id,
                event.video_id,
                event.user_id,
                event.ip_address,
                event.last_position,
                event.accumulated_seconds,
                flag(event.counts_toward_views),
                ts_to_sql(event.created_at),
                ts_to_sql(event.updated_at),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// The most recently created session of a (video, user) pair.
    pub fn latest_session(
        &self,
        video_id: VideoId,
        user_id:  UserId,
    ) -> PipelineResult<Option<PlaybackEvent>> {
        let sql = format!(
            "SELECT {PLAYBACK_COLUMNS} FROM playback_event
             WHERE video_id = ?1 AND user_id = ?2
             ORDER BY created_at DESC, id DESC LIMIT 1"
        );
        let event = self.conn
            .query_row(&sql, params![video_id, user_id], playback_from_row)
            .optional()?;
        Ok(event)
    }

    pub fn session(&self, session_id: &str) -> PipelineResult<Option<PlaybackEvent>> {
        let sql = format!("SELECT {PLAYBACK_COLUMNS} FROM playback_event WHERE session_id = ?1");
        let event = self.conn
            .query_row(&sql, params![session_id], playback_from_row)
            .optional()?;
        Ok(event)
    }

    /// True if any session for this video was opened from `ip` after `since`.
    pub fn ip_has_recent_event(
        &self,
        video_id: VideoId,
        ip:       &str,
        since:    NaiveDateTime,
    ) -> PipelineResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM playback_event
                WHERE video_id = ?1 AND ip_address = ?2 AND created_at > ?3
             )",
            params![video_id, ip, ts_to_sql(since)],
            |row| row.get(0),
        )?;
        Ok(exists != 0)
    }

    pub fn update_session_progress(
        &self,
        session_id:          &str,
        last_position:       Seconds,
        accumulated_seconds: Seconds,
        updated_at:          NaiveDateTime,
    ) -> PipelineResult<()> {
        self.conn.execute(
            "UPDATE playback_event
             SET last_position = ?1, accumulated_seconds = ?2, updated_at = ?3
             WHERE session_id = ?4",
            params![last_position, accumulated_seconds, ts_to_sql(updated_at), session_id],
        )?;
        Ok(())
    }

    pub fn sessions_for_video(&self, video_id: VideoId) -> PipelineResult<Vec<PlaybackEvent>> {
        let sql = format!(
            "SELECT {PLAYBACK_COLUMNS} FROM playback_event
             WHERE video_id = ?1 ORDER BY created_at ASC, id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![video_id], playback_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Ad exposures ──────────────────────────────────────────────

    pub fn insert_ad_exposure(&self, event: &AdExposureEvent) -> PipelineResult<()> {
        self.conn.execute(
            "INSERT INTO ad_exposure_event (
                placement_id, video_id, ad_id, position_seconds, session_id,
                user_id, ip_address, counts_toward_ad_views, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                event.placement_id,
                event.video_id,
                event.ad_id,
                event.position_seconds,
                event.session_id,
                event.user_id,
                event.ip_address,
                flag(event.counts_toward_ad_views),
                ts_to_sql(event.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn ad_exposures_for_session(&self, session_id: &str) -> PipelineResult<Vec<AdExposureEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT placement_id, video_id, ad_id, position_seconds, session_id,
                    user_id, ip_address, counts_toward_ad_views, created_at
             FROM ad_exposure_event WHERE session_id = ?1
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![session_id], |row| {
            Ok(AdExposureEvent {
                placement_id:           row.get(0)?,
                video_id:               row.get(1)?,
                ad_id:                  row.get(2)?,
                position_seconds:       row.get(3)?,
                session_id:             row.get(4)?,
                user_id:                row.get(5)?,
                ip_address:             row.get(6)?,
                counts_toward_ad_views: row.get::<_, i64>(7)? != 0,
                created_at:             ts_from_row(row, 8)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Counted ad views for a video: (strictly before `date`, on `date`).
    pub fn ad_view_counts(&self, video_id: VideoId, date: NaiveDate) -> PipelineResult<(i64, i64)> {
        let (day_start, day_end) = day_bounds(date);
        let counts = self.conn.query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN created_at < ?2 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN created_at >= ?2 THEN 1 ELSE 0 END), 0)
             FROM ad_exposure_event
             WHERE video_id = ?1 AND counts_toward_ad_views = 1 AND created_at < ?3",
            params![video_id, day_start, day_end],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(counts)
    }

    /// Counted ad views for a video on or before `date`.
    pub fn ad_view_total_through(&self, video_id: VideoId, date: NaiveDate) -> PipelineResult<i64> {
        let (_, day_end) = day_bounds(date);
        let total: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM ad_exposure_event
             WHERE video_id = ?1 AND counts_toward_ad_views = 1 AND created_at < ?2",
            params![video_id, day_end],
            |row| row.get(0),
        )?;
        Ok(total)
    }
}
