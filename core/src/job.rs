//! Batch job bookkeeping: per-row outcomes and the run summary.
//!
//! Every batch run produces a `JobSummary`. It is persisted as JSON on
//! the run's `job_run` row, so a skipped row is never silently lost.

use crate::{
    error::PipelineError,
    types::{RunId, VideoId},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    DailyAggregation,
    DailySettlement,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::DailyAggregation => "daily_aggregation",
            JobKind::DailySettlement  => "daily_settlement",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running   => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed    => "failed",
        }
    }
}

/// Why a row was left out of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    VideoNotFound,
    UploaderNotFound,
    AlreadySettled,
    CumulativeTotalMismatch {
        counter:          String,
        from_stats:       i64,
        from_settlements: i64,
    },
}

impl SkipReason {
    /// Row-level errors become skips; anything else is fatal to the run.
    pub fn from_error(err: &PipelineError) -> Option<Self> {
        match err {
            PipelineError::VideoNotFound { .. } => Some(SkipReason::VideoNotFound),
            PipelineError::UserNotFound { .. }  => Some(SkipReason::UploaderNotFound),
            PipelineError::CumulativeTotalMismatch {
                counter, from_stats, from_settlements, ..
            } => Some(SkipReason::CumulativeTotalMismatch {
                counter:          counter.to_string(),
                from_stats:       *from_stats,
                from_settlements: *from_settlements,
            }),
            _ => None,
        }
    }
}

/// What the processor decided for one input row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome<T> {
    Write(T),
    Skip(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRow {
    pub video_id: VideoId,
    #[serde(flatten)]
    pub reason:   SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub run_id:       RunId,
    pub job:          JobKind,
    pub target_date:  NaiveDate,
    pub rows_read:    usize,
    pub rows_written: usize,
    pub skipped:      Vec<SkippedRow>,
}

impl JobSummary {
    pub fn new(job: JobKind, target_date: NaiveDate) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            job,
            target_date,
            rows_read: 0,
            rows_written: 0,
            skipped: Vec::new(),
        }
    }

    pub fn skip(&mut self, video_id: VideoId, reason: SkipReason) {
        self.skipped.push(SkippedRow { video_id, reason });
    }

    pub fn rows_skipped(&self) -> usize {
        self.skipped.len()
    }

    /// True when every row read was written.
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_reasons_round_trip_through_summary_json() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let mut summary = JobSummary::new(JobKind::DailySettlement, date);
        summary.skip(7, SkipReason::AlreadySettled);
        summary.skip(9, SkipReason::CumulativeTotalMismatch {
            counter: "views".into(),
            from_stats: 10,
            from_settlements: 12,
        });

        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"reason\":\"already_settled\""));
        let back: JobSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, summary);
        assert_eq!(back.rows_skipped(), 2);
        assert!(!back.is_clean());
    }

    #[test]
    fn store_errors_are_not_skippable() {
        let err = PipelineError::Database(rusqlite::Error::QueryReturnedNoRows);
        assert!(SkipReason::from_error(&err).is_none());
        let err = PipelineError::VideoNotFound { video_id: 3 };
        assert_eq!(SkipReason::from_error(&err), Some(SkipReason::VideoNotFound));
    }
}
