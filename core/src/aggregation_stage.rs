//! Daily aggregation stage: playback events → one stats row per (video, date).
//!
//! Reads counted sessions created on the target date, grouped by video:
//! `view_count` is the number of distinct sessions, `total_watched_seconds`
//! the sum of their accumulated seconds. Abuse-flagged sessions never
//! reach the reader.
//!
//! Rows are upserted by (video, date), so a crashed run can be repeated.
//! A date whose aggregation already completed is refused one level up,
//! in the pipeline.

use crate::{
    error::{PipelineError, PipelineResult},
    job::{JobKind, RowOutcome},
    stage::BatchStage,
    store::{DailyStatSource, PipelineStore},
    types::{Seconds, VideoId},
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStat {
    pub video_id:              VideoId,
    pub stat_date:             NaiveDate,
    pub view_count:            i64,
    pub total_watched_seconds: Seconds,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AggregationStage;

impl BatchStage for AggregationStage {
    type Item = DailyStatSource;
    type Output = DailyStat;

    fn kind(&self) -> JobKind {
        JobKind::DailyAggregation
    }

    fn item_key(&self, item: &DailyStatSource) -> VideoId {
        item.video_id
    }

    fn read_chunk(
        &self,
        store: &PipelineStore,
        date:  NaiveDate,
        after: Option<VideoId>,
        limit: usize,
    ) -> PipelineResult<Vec<DailyStatSource>> {
        store.playback_totals_for_date(date, after, limit)
    }

    fn process(
        &self,
        store: &PipelineStore,
        date:  NaiveDate,
        item:  &DailyStatSource,
    ) -> PipelineResult<RowOutcome<DailyStat>> {
        let video_id = item.video_id;
        if store.video(video_id)?.is_none() {
            return Err(PipelineError::VideoNotFound { video_id });
        }

        log::debug!(
            "date={date} video={video_id} views={} watched={}s",
            item.session_count, item.total_watched_seconds
        );

        Ok(RowOutcome::Write(DailyStat {
            video_id,
            stat_date: date,
            view_count: item.session_count,
            total_watched_seconds: item.total_watched_seconds,
        }))
    }

    fn write(
        &self,
        store:       &PipelineStore,
        outputs:     &[DailyStat],
        _written_at: NaiveDateTime,
    ) -> PipelineResult<usize> {
        for stat in outputs {
            store.upsert_daily_stat(stat)?;
        }
        Ok(outputs.len())
    }
}
