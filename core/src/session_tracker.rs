//! Session tracker: per (user, video) playback state.
//!
//! Every `play` opens a new session; `update_position` and `stop` mutate
//! the most recently created session of the pair. Older sessions of the
//! pair are closed and never touched again.
//!
//! Each operation runs inside one IMMEDIATE store transaction, so the
//! "most recent session" lookup and the mutation that follows it are a
//! single unit. Two concurrent stops on the same pair cannot both read
//! the same previous position.
//!
//! Abuse (self-view, or a repeat from the same ip inside the abuse
//! window) is an outcome, not an error: playback proceeds, but the
//! session never counts toward views and never records ad exposures.

use crate::{
    clock::Clock,
    config::TrackerConfig,
    error::{PipelineError, PipelineResult},
    store::{PipelineStore, VideoRecord},
    types::{AdId, PlacementId, Seconds, SessionId, UserId, VideoId},
};
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A fixed ad break-point on a video's timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdPlacement {
    pub placement_id:     PlacementId,
    pub video_id:         VideoId,
    pub ad_id:            AdId,
    pub position_seconds: Seconds,
}

/// One playback session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackEvent {
    /// Store row id; `None` until persisted.
    pub id:                  Option<i64>,
    pub session_id:          SessionId,
    pub video_id:            VideoId,
    pub user_id:             UserId,
    pub ip_address:          String,
    pub last_position:       Seconds,
    /// Forward-only.
    pub accumulated_seconds: Seconds,
    /// Fixed at creation.
    pub counts_toward_views: bool,
    pub created_at:          NaiveDateTime,
    pub updated_at:          NaiveDateTime,
}

impl PlaybackEvent {
    pub fn start(
        video_id:            VideoId,
        user_id:             UserId,
        ip_address:          &str,
        start_position:      Seconds,
        counts_toward_views: bool,
        created_at:          NaiveDateTime,
    ) -> Self {
        Self {
            id: None,
            session_id: uuid::Uuid::new_v4().to_string(),
            video_id,
            user_id,
            ip_address: ip_address.to_string(),
            last_position: start_position,
            accumulated_seconds: 0,
            counts_toward_views,
            created_at,
            updated_at: created_at,
        }
    }
}

/// One crossing of an ad placement during a forward stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdExposureEvent {
    pub placement_id:           PlacementId,
    pub video_id:               VideoId,
    pub ad_id:                  AdId,
    pub position_seconds:       Seconds,
    pub session_id:             SessionId,
    pub user_id:                UserId,
    pub ip_address:             String,
    pub counts_toward_ad_views: bool,
    pub created_at:             NaiveDateTime,
}

impl AdExposureEvent {
    pub fn new(placement: &AdPlacement, session: &PlaybackEvent, created_at: NaiveDateTime) -> Self {
        Self {
            placement_id:           placement.placement_id,
            video_id:               placement.video_id,
            ad_id:                  placement.ad_id,
            position_seconds:       placement.position_seconds,
            session_id:             session.session_id.clone(),
            user_id:                session.user_id,
            ip_address:             session.ip_address.clone(),
            counts_toward_ad_views: session.counts_toward_views,
            created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbuseReason {
    /// The viewer uploaded the video.
    SelfView,
    /// The same ip opened a session on this video inside the abuse window.
    RapidRepeat,
}

impl AbuseReason {
    pub fn play_notice(&self) -> &'static str {
        match self {
            AbuseReason::SelfView    => "Playback of your own video is not counted as a view.",
            AbuseReason::RapidRepeat => "Repeated access detected; this view is not counted.",
        }
    }
}

pub const STOP_ABUSE_NOTICE: &str = "Abuse detected; ad views in this session are not counted.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayOutcome {
    pub video_id:       VideoId,
    pub session_id:     SessionId,
    pub title:          String,
    pub video_length:   Seconds,
    pub start_position: Seconds,
    pub abuse:          Option<AbuseReason>,
}

impl PlayOutcome {
    pub fn abuse_notice(&self) -> Option<&'static str> {
        self.abuse.map(|r| r.play_notice())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopOutcome {
    pub video_id:       VideoId,
    pub final_position: Seconds,
    pub ads_exposed:    usize,
    /// Seconds added to the session's watch time by this call.
    pub watched_delta:  Seconds,
    pub abuse:          bool,
}

impl StopOutcome {
    pub fn abuse_notice(&self) -> Option<&'static str> {
        self.abuse.then_some(STOP_ABUSE_NOTICE)
    }
}

/// Clamp a client-reported position into the video's timeline.
pub fn clamp_position(position: Seconds, video_length: Seconds) -> Seconds {
    position.clamp(0, video_length.max(0))
}

/// Bootstrapped placement offsets: every multiple of `interval` strictly
/// inside the video.
pub fn placement_offsets(video_length: Seconds, interval: Seconds) -> Vec<Seconds> {
    if interval <= 0 {
        return Vec::new();
    }
    (1..)
        .map(|k| k * interval)
        .take_while(|&p| p < video_length)
        .collect()
}

pub struct SessionTracker<'a> {
    store:  &'a PipelineStore,
    config: TrackerConfig,
    clock:  Box<dyn Clock>,
}

impl<'a> SessionTracker<'a> {
    pub fn new(store: &'a PipelineStore, config: TrackerConfig, clock: Box<dyn Clock>) -> Self {
        Self { store, config, clock }
    }

    /// Open a new session on `video_id` for `user_id`.
    pub fn play(&self, video_id: VideoId, user_id: UserId, ip: &str) -> PipelineResult<PlayOutcome> {
        let now = self.clock.now();
        self.store.transaction(|store| {
            let video = load_video(store, video_id)?;

            self.bootstrap_placements(store, &video)?;

            let abuse = self.detect_abuse(store, &video, user_id, ip, now)?;
            if let Some(reason) = abuse {
                log::warn!("video={video_id} user={user_id} ip={ip} abuse detected: {reason:?}");
            }

            let start_position = match store.latest_session(video_id, user_id)? {
                Some(prev) if prev.last_position < video.length_seconds => prev.last_position,
                _ => 0,
            };

            let session = PlaybackEvent::start(
                video_id, user_id, ip, start_position, abuse.is_none(), now,
            );
            store.insert_playback_event(&session)?;

            log::info!(
                "video={video_id} user={user_id} session={} started at {start_position}s",
                session.session_id
            );

            Ok(PlayOutcome {
                video_id,
                session_id: session.session_id,
                title: video.title,
                video_length: video.length_seconds,
                start_position,
                abuse,
            })
        })
    }

    /// Move the playhead (heartbeat, seek, rewind). Watch time and ad
    /// exposures are untouched.
    pub fn update_position(
        &self,
        video_id: VideoId,
        user_id:  UserId,
        position: Seconds,
    ) -> PipelineResult<Seconds> {
        let now = self.clock.now();
        self.store.transaction(|store| {
            let video = load_video(store, video_id)?;
            let session = load_active_session(store, video_id, user_id)?;
            let position = clamp_position(position, video.length_seconds);

            store.update_session_progress(
                &session.session_id, position, session.accumulated_seconds, now,
            )?;
            log::debug!(
                "video={video_id} user={user_id} position {}s -> {position}s",
                session.last_position
            );
            Ok(position)
        })
    }

    /// Stop at `position`. Forward motion adds to watch time and records one
    /// exposure per placement crossed; backward motion adds nothing.
    pub fn stop(
        &self,
        video_id: VideoId,
        user_id:  UserId,
        position: Seconds,
    ) -> PipelineResult<StopOutcome> {
        let now = self.clock.now();
        self.store.transaction(|store| {
            let video = load_video(store, video_id)?;
            let session = load_active_session(store, video_id, user_id)?;

            let previous = session.last_position;
            let position = clamp_position(position, video.length_seconds);
            let watched_delta = (position - previous).max(0);
            let accumulated = session.accumulated_seconds + watched_delta;

            store.update_session_progress(&session.session_id, position, accumulated, now)?;

            let abuse = !session.counts_toward_views;
            let mut ads_exposed = 0;
            if !abuse {
                // Every forward pass re-records; no dedup per (session, placement).
                for placement in store.placements_crossed(video_id, previous, position)? {
                    store.insert_ad_exposure(&AdExposureEvent::new(&placement, &session, now))?;
                    ads_exposed += 1;
                }
            }

            log::info!(
                "video={video_id} user={user_id} session={} stop {previous}s -> {position}s \
                 (+{watched_delta}s, {ads_exposed} ads)",
                session.session_id
            );

            Ok(StopOutcome {
                video_id,
                final_position: position,
                ads_exposed,
                watched_delta,
                abuse,
            })
        })
    }

    /// Lay down placements on first play. Skipped when the video already
    /// has any, or when no ad exists yet.
    fn bootstrap_placements(&self, store: &PipelineStore, video: &VideoRecord) -> PipelineResult<()> {
        if store.placement_count(video.video_id)? > 0 {
            return Ok(());
        }
        let Some(ad) = store.first_ad()? else {
            log::debug!("video={} no ads registered; placements not bootstrapped", video.video_id);
            return Ok(());
        };

        let offsets = placement_offsets(video.length_seconds, self.config.ad_interval_seconds);
        for &offset in &offsets {
            store.insert_placement(video.video_id, ad.ad_id, offset)?;
        }
        log::info!(
            "video={} bootstrapped {} placements with ad {}",
            video.video_id, offsets.len(), ad.ad_id
        );
        Ok(())
    }

    fn detect_abuse(
        &self,
        store:   &PipelineStore,
        video:   &VideoRecord,
        user_id: UserId,
        ip:      &str,
        now:     NaiveDateTime,
    ) -> PipelineResult<Option<AbuseReason>> {
        if video.is_uploaded_by(user_id) {
            return Ok(Some(AbuseReason::SelfView));
        }
        let since = now - Duration::seconds(self.config.abuse_window_seconds);
        if store.ip_has_recent_event(video.video_id, ip, since)? {
            return Ok(Some(AbuseReason::RapidRepeat));
        }
        Ok(None)
    }
}

fn load_video(store: &PipelineStore, video_id: VideoId) -> PipelineResult<VideoRecord> {
    store.video(video_id)?.ok_or(PipelineError::VideoNotFound { video_id })
}

fn load_active_session(
    store:    &PipelineStore,
    video_id: VideoId,
    user_id:  UserId,
) -> PipelineResult<PlaybackEvent> {
    store
        .latest_session(video_id, user_id)?
        .ok_or(PipelineError::NoActiveSession { video_id, user_id })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_strictly_inside_the_video() {
        assert_eq!(placement_offsets(900, 300), vec![300, 600]);
        assert_eq!(placement_offsets(901, 300), vec![300, 600, 900]);
        assert_eq!(placement_offsets(300, 300), Vec::<Seconds>::new());
        assert_eq!(placement_offsets(0, 300), Vec::<Seconds>::new());
        assert_eq!(placement_offsets(1000, 0), Vec::<Seconds>::new());
    }

    #[test]
    fn positions_clamp_into_timeline() {
        assert_eq!(clamp_position(-5, 100), 0);
        assert_eq!(clamp_position(50, 100), 50);
        assert_eq!(clamp_position(500, 100), 100);
    }
}
