//! Reporting: read-only projections over settled and aggregated rows.
//!
//! RULE: Reports only sum what is stored. Tier amounts are never
//! recomputed here; a window with no rows yields zero totals.

use crate::{
    error::PipelineResult,
    store::{PipelineStore, VideoSettlementTotals, VideoStatTotals},
    types::{Amount, UserId, VideoId},
};
use chrono::{Datelike, Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TOP_N: usize = 5;

/// Ranking key for the leaderboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatMetric {
    Views,
    WatchedTime,
}

/// An inclusive date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "window", rename_all = "snake_case")]
pub enum ReportWindow {
    Day { date: NaiveDate },
    /// The ISO week (Monday through Sunday) containing `date`.
    Week { date: NaiveDate },
    /// The calendar month containing `date`.
    Month { date: NaiveDate },
    Range { start: NaiveDate, end: NaiveDate },
}

impl ReportWindow {
    /// First and last date of the window, both inclusive.
    pub fn bounds(&self) -> (NaiveDate, NaiveDate) {
        match *self {
            ReportWindow::Day { date } => (date, date),
            ReportWindow::Week { date } => {
                let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
                (monday, monday + Duration::days(6))
            }
            ReportWindow::Month { date } => {
                let first = date.with_day(1).unwrap_or(date);
                let last = first
                    .checked_add_months(Months::new(1))
                    .and_then(|next| next.pred_opt())
                    .unwrap_or(date);
                (first, last)
            }
            ReportWindow::Range { start, end } => (start, end),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReport {
    pub start:              NaiveDate,
    pub end:                NaiveDate,
    pub total_video_amount: Amount,
    pub total_ad_amount:    Amount,
    pub total_amount:       Amount,
    pub per_video:          Vec<VideoSettlementTotals>,
}

impl SettlementReport {
    fn from_rows(start: NaiveDate, end: NaiveDate, per_video: Vec<VideoSettlementTotals>) -> Self {
        let total_video_amount = per_video.iter().map(|v| v.video_amount).sum();
        let total_ad_amount = per_video.iter().map(|v| v.ad_amount).sum();
        let total_amount = per_video.iter().map(|v| v.total_amount).sum();
        Self { start, end, total_video_amount, total_ad_amount, total_amount, per_video }
    }

    pub fn is_empty(&self) -> bool {
        self.per_video.is_empty()
    }
}

pub struct SettlementReporter<'a> {
    store: &'a PipelineStore,
}

impl<'a> SettlementReporter<'a> {
    pub fn new(store: &'a PipelineStore) -> Self {
        Self { store }
    }

    /// All settled amounts in the window, broken down per video.
    pub fn settlement(&self, window: ReportWindow) -> PipelineResult<SettlementReport> {
        let (start, end) = window.bounds();
        let rows = self.store.settlement_totals_between(start, end, None, None)?;
        log::debug!("report {start}..={end}: {} videos", rows.len());
        Ok(SettlementReport::from_rows(start, end, rows))
    }

    /// One video's settled amounts over an inclusive date range.
    pub fn video_settlement(
        &self,
        video_id: VideoId,
        start:    NaiveDate,
        end:      NaiveDate,
    ) -> PipelineResult<VideoSettlementTotals> {
        let rows = self.store.settlement_totals_between(start, end, None, Some(video_id))?;
        Ok(rows.into_iter().next().unwrap_or(VideoSettlementTotals {
            video_id,
            video_amount: 0,
            ad_amount:    0,
            total_amount: 0,
        }))
    }

    /// Settled amounts of every video uploaded by `uploader_id`.
    pub fn creator_settlement(
        &self,
        uploader_id: UserId,
        window:      ReportWindow,
    ) -> PipelineResult<SettlementReport> {
        let (start, end) = window.bounds();
        let rows = self.store.settlement_totals_between(start, end, Some(uploader_id), None)?;
        Ok(SettlementReport::from_rows(start, end, rows))
    }

    /// Leaderboard from daily stats, highest first. Ties break on the other
    /// metric, then on video id.
    pub fn top_videos(
        &self,
        window: ReportWindow,
        metric: StatMetric,
        limit:  usize,
    ) -> PipelineResult<Vec<VideoStatTotals>> {
        let (start, end) = window.bounds();
        self.store.stat_totals_between(start, end, metric, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn week_runs_monday_to_sunday() {
        // 2024-05-01 is a Wednesday.
        assert_eq!(ReportWindow::Week { date: d(2024, 5, 1) }.bounds(), (d(2024, 4, 29), d(2024, 5, 5)));
        assert_eq!(ReportWindow::Week { date: d(2024, 4, 29) }.bounds(), (d(2024, 4, 29), d(2024, 5, 5)));
        assert_eq!(ReportWindow::Week { date: d(2024, 5, 5) }.bounds(), (d(2024, 4, 29), d(2024, 5, 5)));
    }

    #[test]
    fn month_covers_the_calendar_month() {
        assert_eq!(ReportWindow::Month { date: d(2024, 2, 14) }.bounds(), (d(2024, 2, 1), d(2024, 2, 29)));
        assert_eq!(ReportWindow::Month { date: d(2023, 12, 31) }.bounds(), (d(2023, 12, 1), d(2023, 12, 31)));
    }

    #[test]
    fn day_and_range_are_passed_through() {
        assert_eq!(ReportWindow::Day { date: d(2024, 5, 1) }.bounds(), (d(2024, 5, 1), d(2024, 5, 1)));
        let range = ReportWindow::Range { start: d(2024, 1, 3), end: d(2024, 1, 9) };
        assert_eq!(range.bounds(), (d(2024, 1, 3), d(2024, 1, 9)));
    }

    #[test]
    fn empty_report_has_zero_totals() {
        let report = SettlementReport::from_rows(d(2024, 5, 1), d(2024, 5, 1), Vec::new());
        assert!(report.is_empty());
        assert_eq!(report.total_amount, 0);
        assert_eq!(report.total_video_amount, 0);
        assert_eq!(report.total_ad_amount, 0);
    }
}
