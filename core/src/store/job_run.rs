//! Store methods for batch run bookkeeping.

use super::{date_from_row, date_to_sql, day_bounds, ts_to_sql, PipelineStore};
use crate::{
    error::PipelineResult,
    job::{JobKind, JobStatus, JobSummary},
};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, OptionalExtension};

impl PipelineStore {
    pub fn insert_job_run(&self, summary: &JobSummary, started_at: NaiveDateTime) -> PipelineResult<()> {
        self.conn.execute(
            "INSERT INTO job_run (run_id, job, target_date, status, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                summary.run_id,
                summary.job.as_str(),
                date_to_sql(summary.target_date),
                JobStatus::Running.as_str(),
                ts_to_sql(started_at),
            ],
        )?;
        Ok(())
    }

    pub fn finish_job_run(
        &self,
        summary:     &JobSummary,
        status:      JobStatus,
        finished_at: NaiveDateTime,
    ) -> PipelineResult<()> {
        let summary_json = serde_json::to_string(summary)?;
        self.conn.execute(
            "UPDATE job_run
             SET status = ?1, rows_read = ?2, rows_written = ?3, rows_skipped = ?4,
                 summary_json = ?5, finished_at = ?6
             WHERE run_id = ?7",
            params![
                status.as_str(),
                summary.rows_read as i64,
                summary.rows_written as i64,
                summary.rows_skipped() as i64,
                summary_json,
                ts_to_sql(finished_at),
                summary.run_id,
            ],
        )?;
        Ok(())
    }

    /// True once a run of `job` for `date` has completed.
    pub fn job_completed(&self, job: JobKind, date: NaiveDate) -> PipelineResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM job_run WHERE job = ?1 AND target_date = ?2 AND status = ?3
             )",
            params![job.as_str(), date_to_sql(date), JobStatus::Completed.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists != 0)
    }

    /// Status of a specific run.
    pub fn job_status(&self, run_id: &str) -> PipelineResult<Option<String>> {
        let status = self.conn.query_row(
            "SELECT status FROM job_run WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        ).optional()?;
        Ok(status)
    }

    /// The persisted summary of the most recent completed run of `job` for `date`.
    pub fn completed_job_summary(
        &self,
        job:  JobKind,
        date: NaiveDate,
    ) -> PipelineResult<Option<JobSummary>> {
        let json: Option<Option<String>> = self.conn.query_row(
            "SELECT summary_json FROM job_run
             WHERE job = ?1 AND target_date = ?2 AND status = ?3
             ORDER BY finished_at DESC LIMIT 1",
            params![job.as_str(), date_to_sql(date), JobStatus::Completed.as_str()],
            |row| row.get(0),
        ).optional()?;
        match json.flatten() {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// The earliest date before `date` whose daily work is unfinished: counted
    /// playback with no completed aggregation, or stats with no completed
    /// settlement.
    pub fn earliest_outstanding_before(
        &self,
        date: NaiveDate,
    ) -> PipelineResult<Option<(NaiveDate, JobKind)>> {
        let (day_start, _) = day_bounds(date);
        let unaggregated: Option<NaiveDate> = self.conn.query_row(
            "SELECT day FROM (
                SELECT DISTINCT substr(created_at, 1, 10) AS day
                FROM playback_event
                WHERE counts_toward_views = 1 AND created_at < ?1
             )
             WHERE NOT EXISTS (
                SELECT 1 FROM job_run
                WHERE job = ?2 AND target_date = day AND status = ?3
             )
             ORDER BY day ASC LIMIT 1",
            params![
                day_start,
                JobKind::DailyAggregation.as_str(),
                JobStatus::Completed.as_str(),
            ],
            |row| date_from_row(row, 0),
        ).optional()?;

        let unsettled: Option<NaiveDate> = self.conn.query_row(
            "SELECT DISTINCT stat_date FROM daily_video_stat
             WHERE stat_date < ?1
               AND NOT EXISTS (
                SELECT 1 FROM job_run
                WHERE job = ?2 AND target_date = stat_date AND status = ?3
             )
             ORDER BY stat_date ASC LIMIT 1",
            params![
                date_to_sql(date),
                JobKind::DailySettlement.as_str(),
                JobStatus::Completed.as_str(),
            ],
            |row| date_from_row(row, 0),
        ).optional()?;

        let outstanding = match (unaggregated, unsettled) {
            (Some(a), Some(s)) if s < a => Some((s, JobKind::DailySettlement)),
            (Some(a), _) => Some((a, JobKind::DailyAggregation)),
            (None, Some(s)) => Some((s, JobKind::DailySettlement)),
            (None, None) => None,
        };
        Ok(outstanding)
    }

    /// Number of run attempts of `job` for `date`, any status.
    pub fn job_run_count(&self, job: JobKind, date: NaiveDate) -> PipelineResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM job_run WHERE job = ?1 AND target_date = ?2",
            params![job.as_str(), date_to_sql(date)],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
