use crate::{
    job::JobKind,
    types::{UserId, VideoId},
};
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Video {video_id} not found")]
    VideoNotFound { video_id: VideoId },

    #[error("User {user_id} not found")]
    UserNotFound { user_id: UserId },

    #[error("No active session for user {user_id} on video {video_id}")]
    NoActiveSession { video_id: VideoId, user_id: UserId },

    #[error("Daily aggregation for {date} has already completed")]
    DuplicateAggregation { date: NaiveDate },

    #[error("Daily aggregation for {date} has not completed; settlement refused")]
    AggregationIncomplete { date: NaiveDate },

    #[error(
        "Settlement for {date} refused: {} for earlier date {pending} has not completed",
        .job.as_str()
    )]
    EarlierDateOutstanding {
        date:    NaiveDate,
        pending: NaiveDate,
        job:     JobKind,
    },

    #[error(
        "Cumulative {counter} mismatch for video {video_id} before {date}: \
         stats give {from_stats}, settlements give {from_settlements}"
    )]
    CumulativeTotalMismatch {
        video_id:         VideoId,
        date:             NaiveDate,
        counter:          &'static str,
        from_stats:       i64,
        from_settlements: i64,
    },

    #[error("Invalid tier schedule: {reason}")]
    InvalidTierSchedule { reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
