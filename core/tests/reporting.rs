//! Reporting tests: sums over settled rows and the stats leaderboard.

mod common;

use chrono::NaiveDate;
use common::*;
use streampay_core::{
    aggregation_stage::DailyStat,
    reporting::{ReportWindow, SettlementReporter, StatMetric, DEFAULT_TOP_N},
    settlement_stage::SettlementRecord,
    store::PipelineStore,
};

fn settle(store: &PipelineStore, video_id: i64, uploader_id: i64, date: NaiveDate, video_amount: i64, ad_amount: i64) {
    let record = SettlementRecord {
        video_id,
        uploader_id,
        settlement_date: date,
        previous_total_views: 0,
        today_views: video_amount,
        previous_total_ad_views: 0,
        today_ad_views: ad_amount / 10,
        video_amount,
        ad_amount,
    };
    store.insert_settlement(&record, at(date, 2, 0, 0)).unwrap();
}

/// Video 10 (creator 1) and video 11 (viewer A as creator) settled across
/// late April and early May 2024.
fn settled_store() -> PipelineStore {
    let store = seeded_store();
    add_video(&store, 11, VIEWER_A, 600);
    settle(&store, VIDEO, CREATOR, d(2024, 4, 28), 7, 0);    // Sunday, previous week
    settle(&store, VIDEO, CREATOR, d(2024, 4, 29), 100, 20); // Monday
    settle(&store, VIDEO, CREATOR, d(2024, 5, 1), 50, 10);
    settle(&store, 11, VIEWER_A, d(2024, 5, 1), 30, 0);
    settle(&store, 11, VIEWER_A, d(2024, 5, 6), 4, 40);      // next Monday
    store
}

#[test]
fn day_report_breaks_down_per_video() {
    let store = settled_store();
    let report = SettlementReporter::new(&store)
        .settlement(ReportWindow::Day { date: d(2024, 5, 1) })
        .unwrap();

    assert_eq!((report.start, report.end), (d(2024, 5, 1), d(2024, 5, 1)));
    assert_eq!(report.total_video_amount, 80);
    assert_eq!(report.total_ad_amount, 10);
    assert_eq!(report.total_amount, 90);
    let ids: Vec<i64> = report.per_video.iter().map(|v| v.video_id).collect();
    assert_eq!(ids, vec![VIDEO, 11]);
    assert_eq!(report.per_video[0].total_amount, 60);
}

#[test]
fn week_report_spans_monday_to_sunday() {
    let store = settled_store();
    let report = SettlementReporter::new(&store)
        .settlement(ReportWindow::Week { date: d(2024, 5, 2) })
        .unwrap();

    assert_eq!((report.start, report.end), (d(2024, 4, 29), d(2024, 5, 5)));
    // 100+20 + 50+10 + 30
    assert_eq!(report.total_amount, 210);
    assert_eq!(report.per_video.len(), 2);
}

#[test]
fn month_report_covers_the_calendar_month() {
    let store = settled_store();
    let report = SettlementReporter::new(&store)
        .settlement(ReportWindow::Month { date: d(2024, 5, 20) })
        .unwrap();

    assert_eq!((report.start, report.end), (d(2024, 5, 1), d(2024, 5, 31)));
    assert_eq!(report.total_video_amount, 84);
    assert_eq!(report.total_ad_amount, 50);
    assert_eq!(report.total_amount, 134);
}

#[test]
fn empty_window_yields_zero_totals() {
    let store = settled_store();
    let report = SettlementReporter::new(&store)
        .settlement(ReportWindow::Month { date: d(2023, 1, 1) })
        .unwrap();
    assert!(report.is_empty());
    assert_eq!(report.total_amount, 0);
}

#[test]
fn video_and_creator_reports_filter_rows() {
    let store = settled_store();
    let reporter = SettlementReporter::new(&store);

    let video = reporter.video_settlement(VIDEO, d(2024, 4, 29), d(2024, 5, 31)).unwrap();
    assert_eq!(video.video_id, VIDEO);
    assert_eq!(video.video_amount, 150);
    assert_eq!(video.ad_amount, 30);
    assert_eq!(video.total_amount, 180);

    let nothing = reporter.video_settlement(999, d(2024, 1, 1), d(2024, 12, 31)).unwrap();
    assert_eq!(nothing.video_id, 999);
    assert_eq!(nothing.total_amount, 0);

    let creator = reporter
        .creator_settlement(VIEWER_A, ReportWindow::Range { start: d(2024, 4, 1), end: d(2024, 5, 31) })
        .unwrap();
    assert_eq!(creator.per_video.len(), 1);
    assert_eq!(creator.per_video[0].video_id, 11);
    assert_eq!(creator.total_amount, 74);
}

#[test]
fn top_videos_rank_by_the_chosen_metric() {
    let store = seeded_store();
    for video_id in 11..=16 {
        add_video(&store, video_id, CREATOR, 600);
    }
    // (video, views, watched seconds)
    let rows = [
        (VIDEO, 5, 100),
        (11, 50, 500),
        (12, 40, 9_000),
        (13, 30, 300),
        (14, 20, 200),
        (15, 10, 100),
        (16, 1, 5_000),
    ];
    for (video_id, views, watched) in rows {
        store
            .upsert_daily_stat(&DailyStat {
                video_id,
                stat_date: d(2024, 5, 1),
                view_count: views,
                total_watched_seconds: watched,
            })
            .unwrap();
    }
    // Another day in the same week adds to video 13.
    store
        .upsert_daily_stat(&DailyStat {
            video_id: 13,
            stat_date: d(2024, 5, 2),
            view_count: 25,
            total_watched_seconds: 0,
        })
        .unwrap();
    store.delete_video(16).unwrap();

    let reporter = SettlementReporter::new(&store);
    let week = ReportWindow::Week { date: d(2024, 5, 1) };

    let by_views = reporter.top_videos(week, StatMetric::Views, DEFAULT_TOP_N).unwrap();
    let ids: Vec<i64> = by_views.iter().map(|v| v.video_id).collect();
    assert_eq!(ids, vec![13, 11, 12, 14, 15]);
    assert_eq!(by_views[0].view_count, 55);
    assert_eq!(by_views[0].title.as_deref(), Some("video 13"));

    let by_time = reporter.top_videos(week, StatMetric::WatchedTime, 3).unwrap();
    let ids: Vec<i64> = by_time.iter().map(|v| v.video_id).collect();
    assert_eq!(ids, vec![12, 16, 11]);
    assert_eq!(by_time[1].title, None, "Deleted videos keep their stats but lose the title");

    let day = reporter
        .top_videos(ReportWindow::Day { date: d(2024, 5, 2) }, StatMetric::Views, DEFAULT_TOP_N)
        .unwrap();
    assert_eq!(day.len(), 1);
}
