//! Daily settlement stage: daily stats + lifetime totals → one payout row
//! per (video, date).
//!
//! For every video with a stats row on the target date:
//!   previous_total_views    = Σ view_count on earlier dates
//!   today_views             = that date's view_count
//!   previous/today ad views = counted exposures split at the same boundary
//!   video_amount / ad_amount from the two tier schedules
//!
//! Rerun policy: no-op. A (video, date) that already has a row is skipped
//! as `AlreadySettled`; the insert itself also ignores conflicts.
//!
//! Before pricing a row the stage checks the latest earlier settlement of
//! the video against current stats. If stats through that date no longer
//! add up to what was settled, history has been altered and the row is
//! skipped as a cumulative-total mismatch.

use crate::{
    aggregation_stage::DailyStat,
    error::{PipelineError, PipelineResult},
    job::{JobKind, RowOutcome, SkipReason},
    stage::BatchStage,
    store::PipelineStore,
    tier::TierSchedule,
    types::{Amount, UserId, VideoId},
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub video_id:                VideoId,
    pub uploader_id:             UserId,
    pub settlement_date:         NaiveDate,
    pub previous_total_views:    i64,
    pub today_views:             i64,
    pub previous_total_ad_views: i64,
    pub today_ad_views:          i64,
    pub video_amount:            Amount,
    pub ad_amount:               Amount,
}

impl SettlementRecord {
    pub fn total_views(&self) -> i64 {
        self.previous_total_views + self.today_views
    }

    pub fn total_ad_views(&self) -> i64 {
        self.previous_total_ad_views + self.today_ad_views
    }

    /// Always derived; never stored independently of its parts.
    pub fn total_amount(&self) -> Amount {
        self.video_amount + self.ad_amount
    }
}

pub struct SettlementStage {
    view_schedule: TierSchedule,
    ad_schedule:   TierSchedule,
}

impl SettlementStage {
    pub fn new(view_schedule: TierSchedule, ad_schedule: TierSchedule) -> Self {
        Self { view_schedule, ad_schedule }
    }

    /// Compare the latest earlier settlement of the video with what the
    /// stats and exposure tables say today.
    fn check_cumulative_totals(
        &self,
        store:    &PipelineStore,
        video_id: VideoId,
        date:     NaiveDate,
    ) -> PipelineResult<()> {
        let Some(prior) = store.latest_settlement_before(video_id, date)? else {
            return Ok(());
        };

        let views_through = store.view_total_through(video_id, prior.settlement_date)?;
        if views_through != prior.total_views() {
            return Err(PipelineError::CumulativeTotalMismatch {
                video_id,
                date,
                counter: "views",
                from_stats: views_through,
                from_settlements: prior.total_views(),
            });
        }

        let ad_views_through = store.ad_view_total_through(video_id, prior.settlement_date)?;
        if ad_views_through != prior.total_ad_views() {
            return Err(PipelineError::CumulativeTotalMismatch {
                video_id,
                date,
                counter: "ad_views",
                from_stats: ad_views_through,
                from_settlements: prior.total_ad_views(),
            });
        }
        Ok(())
    }
}

impl Default for SettlementStage {
    fn default() -> Self {
        Self::new(TierSchedule::views(), TierSchedule::ads())
    }
}

impl BatchStage for SettlementStage {
    type Item = DailyStat;
    type Output = SettlementRecord;

    fn kind(&self) -> JobKind {
        JobKind::DailySettlement
    }

    fn item_key(&self, item: &DailyStat) -> VideoId {
        item.video_id
    }

    fn read_chunk(
        &self,
        store: &PipelineStore,
        date:  NaiveDate,
        after: Option<VideoId>,
        limit: usize,
    ) -> PipelineResult<Vec<DailyStat>> {
        store.daily_stats_for_date(date, after, limit)
    }

    fn process(
        &self,
        store: &PipelineStore,
        date:  NaiveDate,
        stat:  &DailyStat,
    ) -> PipelineResult<RowOutcome<SettlementRecord>> {
        let video_id = stat.video_id;
        if store.settlement_exists(video_id, date)? {
            return Ok(RowOutcome::Skip(SkipReason::AlreadySettled));
        }

        let video = store.video(video_id)?.ok_or(PipelineError::VideoNotFound { video_id })?;
        let uploader = store
            .user(video.uploader_id)?
            .ok_or(PipelineError::UserNotFound { user_id: video.uploader_id })?;

        self.check_cumulative_totals(store, video_id, date)?;

        let previous_total_views = store.view_total_before(video_id, date)?;
        let today_views = stat.view_count;
        let (previous_total_ad_views, today_ad_views) = store.ad_view_counts(video_id, date)?;

        let video_amount = self.view_schedule.calculate(previous_total_views, today_views);
        let ad_amount = self.ad_schedule.calculate(previous_total_ad_views, today_ad_views);

        let record = SettlementRecord {
            video_id,
            uploader_id: uploader.user_id,
            settlement_date: date,
            previous_total_views,
            today_views,
            previous_total_ad_views,
            today_ad_views,
            video_amount,
            ad_amount,
        };

        log::info!(
            "date={date} video={video_id} views {previous_total_views}+{today_views} \
             ad_views {previous_total_ad_views}+{today_ad_views} \
             video_amount={video_amount} ad_amount={ad_amount} total={}",
            record.total_amount()
        );

        Ok(RowOutcome::Write(record))
    }

    fn write(
        &self,
        store:      &PipelineStore,
        outputs:    &[SettlementRecord],
        written_at: NaiveDateTime,
    ) -> PipelineResult<usize> {
        let mut written = 0;
        for record in outputs {
            written += store.insert_settlement(record, written_at)?;
        }
        Ok(written)
    }
}
