//! StreamPay core: turns per-second playback activity into daily
//! statistics and tiered creator payouts.
//!
//! PIPELINE ORDER (fixed):
//!   1. Session tracker   (request-scoped, writes playback + ad exposure events)
//!   2. Daily aggregation (batch, once per day, writes daily_video_stat)
//!   3. Daily settlement  (batch, after aggregation, writes daily_settlement)
//!   4. Reporting         (read-only projections over settled rows)

pub mod aggregation_stage;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod job;
pub mod reporting;
pub mod session_tracker;
pub mod settlement_stage;
pub mod stage;
pub mod store;
pub mod tier;
pub mod types;
