//! Daily aggregation tests: playback events folded into daily_video_stat.

mod common;

use chrono::Duration;
use common::*;
use streampay_core::{
    clock::ManualClock,
    config::PipelineConfig,
    engine::DailyPipeline,
    error::PipelineError,
    job::{JobKind, SkipReason, SkippedRow},
    session_tracker::SessionTracker,
    store::PipelineStore,
};

fn pipeline<'a>(store: &'a PipelineStore, clock: &ManualClock) -> DailyPipeline<'a> {
    DailyPipeline::new(store, PipelineConfig::default_test(), Box::new(clock.clone()))
}

fn tracker<'a>(store: &'a PipelineStore, clock: &ManualClock) -> SessionTracker<'a> {
    SessionTracker::new(store, PipelineConfig::default_test().tracker, Box::new(clock.clone()))
}

/// Three counted sessions and one self-view on 2024-05-01, one counted
/// session the next morning.
fn play_first_day(store: &PipelineStore, clock: &ManualClock) {
    let tracker = tracker(store, clock);
    clock.set(at(d(2024, 5, 1), 9, 0, 0));
    tracker.play(VIDEO, VIEWER_A, "10.0.0.2").unwrap();
    tracker.stop(VIDEO, VIEWER_A, 650).unwrap();

    clock.advance(Duration::minutes(1));
    tracker.play(VIDEO, VIEWER_B, "10.0.0.3").unwrap();
    tracker.stop(VIDEO, VIEWER_B, 350).unwrap();

    clock.advance(Duration::minutes(1));
    tracker.play(VIDEO, CREATOR, "10.0.0.1").unwrap();
    tracker.stop(VIDEO, CREATOR, 1_000).unwrap();

    // Resumes at 650.
    clock.advance(Duration::minutes(1));
    tracker.play(VIDEO, VIEWER_A, "10.0.0.2").unwrap();
    tracker.stop(VIDEO, VIEWER_A, 1_000).unwrap();

    clock.set(at(d(2024, 5, 2), 9, 0, 0));
    tracker.play(VIDEO, VIEWER_B, "10.0.0.3").unwrap();
    tracker.stop(VIDEO, VIEWER_B, 200).unwrap();
}

#[test]
fn counts_distinct_counted_sessions_of_the_day() {
    let store = seeded_store();
    let clock = ManualClock::new(at(d(2024, 5, 1), 0, 0, 0));
    play_first_day(&store, &clock);

    clock.set(at(d(2024, 5, 2), 1, 0, 0));
    let summary = pipeline(&store, &clock).run_daily_aggregation(d(2024, 5, 1)).unwrap();
    assert_eq!(summary.job, JobKind::DailyAggregation);
    assert_eq!(summary.rows_read, 1);
    assert_eq!(summary.rows_written, 1);
    assert!(summary.is_clean());

    let stat = store.daily_stat(VIDEO, d(2024, 5, 1)).unwrap().unwrap();
    assert_eq!(stat.view_count, 3, "Self-view must not count");
    assert_eq!(stat.total_watched_seconds, 650 + 350 + 350);

    // The next day's session is not folded into the first day.
    assert!(store.daily_stat(VIDEO, d(2024, 5, 2)).unwrap().is_none());
}

#[test]
fn abuse_only_video_gets_no_stats_row() {
    let store = seeded_store();
    let clock = ManualClock::new(at(d(2024, 5, 1), 9, 0, 0));
    let tracker = tracker(&store, &clock);
    tracker.play(VIDEO, CREATOR, "10.0.0.1").unwrap();
    tracker.stop(VIDEO, CREATOR, 1_000).unwrap();

    clock.set(at(d(2024, 5, 2), 1, 0, 0));
    let summary = pipeline(&store, &clock).run_daily_aggregation(d(2024, 5, 1)).unwrap();
    assert_eq!(summary.rows_read, 0);
    assert!(store.daily_stat(VIDEO, d(2024, 5, 1)).unwrap().is_none());
}

#[test]
fn completed_date_is_refused_and_stats_stay_put() {
    let store = seeded_store();
    let clock = ManualClock::new(at(d(2024, 5, 1), 0, 0, 0));
    play_first_day(&store, &clock);

    clock.set(at(d(2024, 5, 2), 1, 0, 0));
    let pipeline = pipeline(&store, &clock);
    let first = pipeline.run_daily_aggregation(d(2024, 5, 1)).unwrap();
    let before = store.daily_stat(VIDEO, d(2024, 5, 1)).unwrap();

    let again = pipeline.run_daily_aggregation(d(2024, 5, 1));
    assert!(matches!(again, Err(PipelineError::DuplicateAggregation { .. })));
    assert_eq!(store.daily_stat(VIDEO, d(2024, 5, 1)).unwrap(), before);
    assert_eq!(store.job_run_count(JobKind::DailyAggregation, d(2024, 5, 1)).unwrap(), 1);

    // The refused rerun leaves the original summary in place.
    let persisted = store
        .completed_job_summary(JobKind::DailyAggregation, d(2024, 5, 1))
        .unwrap()
        .unwrap();
    assert_eq!(persisted, first);
    assert_eq!(store.job_status(&first.run_id).unwrap().as_deref(), Some("completed"));
}

#[test]
fn upsert_recomputes_the_same_row() {
    let store = seeded_store();
    let clock = ManualClock::new(at(d(2024, 5, 1), 0, 0, 0));
    play_first_day(&store, &clock);

    // A crashed run may have left a partial row behind.
    let date = d(2024, 5, 1);
    let mut partial = streampay_core::aggregation_stage::DailyStat {
        video_id: VIDEO,
        stat_date: date,
        view_count: 1,
        total_watched_seconds: 10,
    };
    store.upsert_daily_stat(&partial).unwrap();

    clock.set(at(d(2024, 5, 2), 1, 0, 0));
    pipeline(&store, &clock).run_daily_aggregation(date).unwrap();

    partial.view_count = 3;
    partial.total_watched_seconds = 1_350;
    assert_eq!(store.daily_stat(VIDEO, date).unwrap(), Some(partial));
}

#[test]
fn missing_video_is_skipped_across_chunks() {
    let store = seeded_store();
    let clock = ManualClock::new(at(d(2024, 5, 1), 9, 0, 0));
    let tracker = tracker(&store, &clock);
    for video_id in 11..=15 {
        add_video(&store, video_id, CREATOR, 600);
        tracker.play(video_id, VIEWER_A, "10.0.0.2").unwrap();
        tracker.stop(video_id, VIEWER_A, 100).unwrap();
    }
    store.delete_video(13).unwrap();

    clock.set(at(d(2024, 5, 2), 1, 0, 0));
    let summary = pipeline(&store, &clock).run_daily_aggregation(d(2024, 5, 1)).unwrap();

    assert_eq!(summary.rows_read, 5);
    assert_eq!(summary.rows_written, 4);
    assert_eq!(
        summary.skipped,
        vec![SkippedRow { video_id: 13, reason: SkipReason::VideoNotFound }]
    );
    for video_id in [11, 12, 14, 15] {
        let stat = store.daily_stat(video_id, d(2024, 5, 1)).unwrap().unwrap();
        assert_eq!(stat.view_count, 1);
        assert_eq!(stat.total_watched_seconds, 100);
    }
    assert!(store.daily_stat(13, d(2024, 5, 1)).unwrap().is_none());
}

#[test]
fn empty_day_still_completes() {
    let store = seeded_store();
    let clock = ManualClock::new(at(d(2024, 5, 2), 1, 0, 0));
    let summary = pipeline(&store, &clock).run_daily_aggregation(d(2024, 5, 1)).unwrap();
    assert_eq!(summary.rows_read, 0);
    assert_eq!(summary.rows_written, 0);
    assert!(store.job_completed(JobKind::DailyAggregation, d(2024, 5, 1)).unwrap());
}
