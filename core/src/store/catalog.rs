//! Catalog lookups: users, videos, ads.
//!
//! These rows belong to the CRUD layer. The pipeline resolves ids through
//! these lookups at the point of use; the insert helpers exist for seeding.

use super::PipelineStore;
use crate::{
    error::PipelineResult,
    types::{AdId, Seconds, UserId, VideoId},
};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: UserId,
    pub name:    String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub video_id:       VideoId,
    pub uploader_id:    UserId,
    pub title:          String,
    pub length_seconds: Seconds,
}

impl VideoRecord {
    pub fn is_uploaded_by(&self, user_id: UserId) -> bool {
        self.uploader_id == user_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdRecord {
    pub ad_id: AdId,
    pub title: String,
}

impl PipelineStore {
    // ── Users ─────────────────────────────────────────────────────

    pub fn insert_user(&self, user: &UserRecord) -> PipelineResult<()> {
        self.conn.execute(
            "INSERT INTO app_user (user_id, name) VALUES (?1, ?2)",
            params![user.user_id, user.name],
        )?;
        Ok(())
    }

    pub fn user(&self, user_id: UserId) -> PipelineResult<Option<UserRecord>> {
        let user = self.conn.query_row(
            "SELECT user_id, name FROM app_user WHERE user_id = ?1",
            params![user_id],
            |row| Ok(UserRecord { user_id: row.get(0)?, name: row.get(1)? }),
        ).optional()?;
        Ok(user)
    }

    // ── Videos ────────────────────────────────────────────────────

    pub fn insert_video(&self, video: &VideoRecord) -> PipelineResult<()> {
        self.conn.execute(
            "INSERT INTO video (video_id, uploader_id, title, length_seconds)
             VALUES (?1, ?2, ?3, ?4)",
            params![video.video_id, video.uploader_id, video.title, video.length_seconds],
        )?;
        Ok(())
    }

    pub fn video(&self, video_id: VideoId) -> PipelineResult<Option<VideoRecord>> {
        let video = self.conn.query_row(
            "SELECT video_id, uploader_id, title, length_seconds
             FROM video WHERE video_id = ?1",
            params![video_id],
            |row| Ok(VideoRecord {
                video_id:       row.get(0)?,
                uploader_id:    row.get(1)?,
                title:          row.get(2)?,
                length_seconds: row.get(3)?,
            }),
        ).optional()?;
        Ok(video)
    }

    /// Remove a video. The CRUD layer owns deletion; exposed for tooling
    /// and tests that exercise missing-video handling.
    pub fn delete_video(&self, video_id: VideoId) -> PipelineResult<usize> {
        let n = self.conn.execute("DELETE FROM video WHERE video_id = ?1", params![video_id])?;
        Ok(n)
    }

    /// Remove a user. See `delete_video`.
    pub fn delete_user(&self, user_id: UserId) -> PipelineResult<usize> {
        let n = self.conn.execute("DELETE FROM app_user WHERE user_id = ?1", params![user_id])?;
        Ok(n)
    }

    // ── Ads ───────────────────────────────────────────────────────

    pub fn insert_ad(&self, ad: &AdRecord) -> PipelineResult<()> {
        self.conn.execute(
            "INSERT INTO ad (ad_id, title) VALUES (?1, ?2)",
            params![ad.ad_id, ad.title],
        )?;
        Ok(())
    }

    /// The lowest-id ad; used to fill bootstrapped placements.
    pub fn first_ad(&self) -> PipelineResult<Option<AdRecord>> {
        let ad = self.conn.query_row(
            "SELECT ad_id, title FROM ad ORDER BY ad_id ASC LIMIT 1",
            [],
            |row| Ok(AdRecord { ad_id: row.get(0)?, title: row.get(1)? }),
        ).optional()?;
        Ok(ad)
    }
}
