//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use streampay_core::{
    job::{JobKind, JobStatus, JobSummary},
    store::{AdRecord, PipelineStore, UserRecord, VideoRecord},
};

pub const CREATOR: i64 = 1;
pub const VIEWER_A: i64 = 2;
pub const VIEWER_B: i64 = 3;
pub const VIDEO: i64 = 10;
pub const VIDEO_LENGTH: i64 = 1_000;
pub const AD: i64 = 100;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

pub fn at(date: NaiveDate, h: u32, m: u32, s: u32) -> NaiveDateTime {
    date.and_hms_opt(h, m, s).unwrap()
}

/// Migrated in-memory store with three users, one 1000s video uploaded by
/// `CREATOR`, and one ad.
pub fn seeded_store() -> PipelineStore {
    init_logging();
    let store = PipelineStore::in_memory().unwrap();
    seed(&store);
    store
}

/// Migrate `store` and insert the shared catalog fixtures.
pub fn seed(store: &PipelineStore) {
    store.migrate().unwrap();
    for (user_id, name) in [(CREATOR, "creator"), (VIEWER_A, "alice"), (VIEWER_B, "bob")] {
        store.insert_user(&UserRecord { user_id, name: name.into() }).unwrap();
    }
    add_video(store, VIDEO, CREATOR, VIDEO_LENGTH);
    store.insert_ad(&AdRecord { ad_id: AD, title: "house ad".into() }).unwrap();
}

pub fn add_video(store: &PipelineStore, video_id: i64, uploader_id: i64, length_seconds: i64) {
    store
        .insert_video(&VideoRecord {
            video_id,
            uploader_id,
            title: format!("video {video_id}"),
            length_seconds,
        })
        .unwrap();
}

/// Record a completed aggregation run for `date` without running it, for
/// tests that seed `daily_video_stat` directly.
pub fn mark_aggregated(store: &PipelineStore, date: NaiveDate) {
    let summary = JobSummary::new(JobKind::DailyAggregation, date);
    let when = at(date, 23, 59, 59);
    store.insert_job_run(&summary, when).unwrap();
    store.finish_job_run(&summary, JobStatus::Completed, when).unwrap();
}
