//! The batch engine: drives the daily stages against the store.
//!
//! EXECUTION ORDER (fixed, never reordered):
//!   1. Daily aggregation  (playback_event → daily_video_stat)
//!   2. Daily settlement   (daily_video_stat + ad_exposure_event → daily_settlement)
//!
//! RULES:
//!   - Settlement for a date never starts before aggregation for that date
//!     has completed, nor while an earlier date with playback or stats is
//!     unaggregated or unsettled. Catch-up runs go oldest first.
//!   - Every run is recorded on a `job_run` row with its summary.
//!   - A row-level failure skips that row; a store failure fails the run.

use crate::{
    aggregation_stage::AggregationStage,
    clock::Clock,
    config::PipelineConfig,
    error::{PipelineError, PipelineResult},
    job::{JobKind, JobStatus, JobSummary, RowOutcome, SkipReason},
    settlement_stage::SettlementStage,
    stage::BatchStage,
    store::PipelineStore,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Runs one stage over one date in keyset-paginated chunks.
pub struct JobRunner<'a> {
    store:      &'a PipelineStore,
    clock:      &'a dyn Clock,
    chunk_size: usize,
}

impl<'a> JobRunner<'a> {
    pub fn new(store: &'a PipelineStore, clock: &'a dyn Clock, chunk_size: usize) -> Self {
        Self { store, clock, chunk_size: chunk_size.max(1) }
    }

    pub fn run<S: BatchStage>(&self, stage: &S, date: NaiveDate) -> PipelineResult<JobSummary> {
        let mut summary = JobSummary::new(stage.kind(), date);
        self.store.insert_job_run(&summary, self.clock.now())?;
        log::info!(
            "job={} date={date} run={} started",
            summary.job.as_str(), summary.run_id
        );

        match self.run_chunks(stage, date, &mut summary) {
            Ok(()) => {
                self.store.finish_job_run(&summary, JobStatus::Completed, self.clock.now())?;
                log::info!(
                    "job={} date={date} run={} completed read={} written={} skipped={}",
                    summary.job.as_str(),
                    summary.run_id,
                    summary.rows_read,
                    summary.rows_written,
                    summary.rows_skipped()
                );
                Ok(summary)
            }
            Err(e) => {
                log::error!(
                    "job={} date={date} run={} failed: {e}",
                    summary.job.as_str(), summary.run_id
                );
                // The run's own error wins over a failure to record it.
                if let Err(mark) = self.store.finish_job_run(&summary, JobStatus::Failed, self.clock.now()) {
                    log::error!("run={} could not be marked failed: {mark}", summary.run_id);
                }
                Err(e)
            }
        }
    }

    fn run_chunks<S: BatchStage>(
        &self,
        stage:   &S,
        date:    NaiveDate,
        summary: &mut JobSummary,
    ) -> PipelineResult<()> {
        let mut after = None;
        loop {
            let done = self.store.transaction(|store| {
                let items = stage.read_chunk(store, date, after, self.chunk_size)?;
                let Some(last) = items.last() else {
                    return Ok(true);
                };
                after = Some(stage.item_key(last));

                let mut outputs = Vec::with_capacity(items.len());
                for item in &items {
                    let key = stage.item_key(item);
                    match stage.process(store, date, item) {
                        Ok(RowOutcome::Write(out)) => outputs.push(out),
                        Ok(RowOutcome::Skip(reason)) => {
                            log::info!(
                                "job={} date={date} video={key} skipped: {reason:?}",
                                summary.job.as_str()
                            );
                            summary.skip(key, reason);
                        }
                        Err(e) => match SkipReason::from_error(&e) {
                            Some(reason) => {
                                log::warn!(
                                    "job={} date={date} video={key} skipped: {e}",
                                    summary.job.as_str()
                                );
                                summary.skip(key, reason);
                            }
                            None => return Err(e),
                        },
                    }
                }

                summary.rows_read += items.len();
                summary.rows_written += stage.write(store, &outputs, self.clock.now())?;
                Ok(items.len() < self.chunk_size)
            })?;
            if done {
                return Ok(());
            }
        }
    }
}

/// Both stages of one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRun {
    /// `None` when aggregation for the date had already completed.
    pub aggregation: Option<JobSummary>,
    pub settlement:  JobSummary,
}

pub struct DailyPipeline<'a> {
    store:  &'a PipelineStore,
    config: PipelineConfig,
    clock:  Box<dyn Clock>,
}

impl<'a> DailyPipeline<'a> {
    pub fn new(store: &'a PipelineStore, config: PipelineConfig, clock: Box<dyn Clock>) -> Self {
        Self { store, config, clock }
    }

    fn runner(&self) -> JobRunner<'_> {
        JobRunner::new(self.store, self.clock.as_ref(), self.config.chunk_size)
    }

    /// Aggregate playback for `date`. Refused once a run for the date has
    /// completed; a failed or interrupted run may be repeated.
    pub fn run_daily_aggregation(&self, date: NaiveDate) -> PipelineResult<JobSummary> {
        if self.store.job_completed(JobKind::DailyAggregation, date)? {
            return Err(PipelineError::DuplicateAggregation { date });
        }
        self.runner().run(&AggregationStage, date)
    }

    /// Settle `date`. Requires a completed aggregation for the same date,
    /// and no earlier date still waiting on aggregation or settlement.
    /// Rows settled by an earlier run are skipped, never rewritten.
    pub fn run_daily_settlement(&self, date: NaiveDate) -> PipelineResult<JobSummary> {
        if !self.store.job_completed(JobKind::DailyAggregation, date)? {
            return Err(PipelineError::AggregationIncomplete { date });
        }
        if let Some((pending, job)) = self.store.earliest_outstanding_before(date)? {
            log::warn!("date={date} settlement refused: {} pending for {pending}", job.as_str());
            return Err(PipelineError::EarlierDateOutstanding { date, pending, job });
        }
        let stage = SettlementStage::new(
            self.config.view_schedule.clone(),
            self.config.ad_schedule.clone(),
        );
        self.runner().run(&stage, date)
    }

    /// Aggregation then settlement. An already aggregated date goes
    /// straight to settlement.
    pub fn run_for_date(&self, date: NaiveDate) -> PipelineResult<PipelineRun> {
        let aggregation = match self.run_daily_aggregation(date) {
            Ok(summary) => Some(summary),
            Err(PipelineError::DuplicateAggregation { .. }) => {
                log::info!("date={date} already aggregated; settling only");
                None
            }
            Err(e) => return Err(e),
        };
        let settlement = self.run_daily_settlement(date)?;
        Ok(PipelineRun { aggregation, settlement })
    }

    /// The scheduled nightly entry point.
    pub fn run_yesterday(&self) -> PipelineResult<PipelineRun> {
        self.run_for_date(self.clock.yesterday())
    }
}
