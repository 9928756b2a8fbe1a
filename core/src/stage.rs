//! Batch stage trait.
//!
//! RULE: Every daily batch stage implements BatchStage.
//! The job runner drives reader → processor → writer in chunks of
//! `chunk_size` rows, keyset-paginated by video id. Each chunk is one
//! store transaction.

use crate::{
    error::PipelineResult,
    job::{JobKind, RowOutcome},
    store::PipelineStore,
    types::VideoId,
};
use chrono::{NaiveDate, NaiveDateTime};

/// The contract every batch stage must fulfill.
pub trait BatchStage {
    /// One input row, as produced by the reader.
    type Item;
    /// One row to persist, as produced by the processor.
    type Output;

    fn kind(&self) -> JobKind;

    /// Pagination key of an input row. Readers return rows in ascending key order.
    fn item_key(&self, item: &Self::Item) -> VideoId;

    /// Read up to `limit` input rows for `date` with key strictly above `after`.
    fn read_chunk(
        &self,
        store: &PipelineStore,
        date:  NaiveDate,
        after: Option<VideoId>,
        limit: usize,
    ) -> PipelineResult<Vec<Self::Item>>;

    /// Turn one input row into an output row or a skip.
    /// Row-level errors are downgraded to skips by the runner.
    fn process(
        &self,
        store: &PipelineStore,
        date:  NaiveDate,
        item:  &Self::Item,
    ) -> PipelineResult<RowOutcome<Self::Output>>;

    /// Persist a chunk of outputs. Returns the number of rows written.
    fn write(
        &self,
        store:      &PipelineStore,
        outputs:    &[Self::Output],
        written_at: NaiveDateTime,
    ) -> PipelineResult<usize>;
}
