//! streampay-runner: on-demand batch trigger and report printer.
//!
//! Usage:
//!   streampay-runner aggregate  --db streampay.db [--date 2024-05-01]
//!   streampay-runner settle     --db streampay.db [--date 2024-05-01]
//!   streampay-runner run-daily  --db streampay.db [--config pipeline.json]
//!   streampay-runner report day|week|month [--date 2024-05-01] [--uploader 7]
//!   streampay-runner top views|watch-time  [--date 2024-05-01] [--window week] [--limit 5]
//!
//! `--date` defaults to yesterday in local time. Results are printed as JSON.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::env;
use streampay_core::{
    clock::{Clock, SystemClock},
    config::PipelineConfig,
    engine::DailyPipeline,
    reporting::{ReportWindow, SettlementReporter, StatMetric, DEFAULT_TOP_N},
    store::PipelineStore,
};

/// Flags that take a value; everything else is a positional word.
const VALUE_FLAGS: [&str; 6] = ["--db", "--config", "--date", "--uploader", "--window", "--limit"];

#[derive(Serialize)]
struct Output<'a, T: Serialize> {
    command: &'a str,
    db:      &'a str,
    result:  T,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = flag_value(&args, "--db").unwrap_or("streampay.db");
    let config = match flag_value(&args, "--config") {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    let date = match flag_value(&args, "--date") {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .with_context(|| format!("--date expects YYYY-MM-DD, got {raw}"))?,
        None => SystemClock.yesterday(),
    };

    let words = positional(&args);
    let Some(&command) = words.first() else {
        bail!("{}", usage());
    };

    let store = PipelineStore::open(db).with_context(|| format!("Cannot open {db}"))?;
    store.migrate()?;
    log::info!("db={db} command={command} date={date}");

    match command {
        "aggregate" => {
            let pipeline = DailyPipeline::new(&store, config, Box::new(SystemClock));
            print(command, db, pipeline.run_daily_aggregation(date)?)
        }
        "settle" => {
            let pipeline = DailyPipeline::new(&store, config, Box::new(SystemClock));
            print(command, db, pipeline.run_daily_settlement(date)?)
        }
        "run-daily" => {
            let pipeline = DailyPipeline::new(&store, config, Box::new(SystemClock));
            print(command, db, pipeline.run_for_date(date)?)
        }
        "report" => {
            let window = window_for(words.get(1).copied(), date)?;
            let reporter = SettlementReporter::new(&store);
            let report = match parse_arg::<i64>(&args, "--uploader")? {
                Some(uploader_id) => reporter.creator_settlement(uploader_id, window)?,
                None => reporter.settlement(window)?,
            };
            print(command, db, report)
        }
        "top" => {
            let metric = match words.get(1).copied() {
                Some("views") => StatMetric::Views,
                Some("watch-time") => StatMetric::WatchedTime,
                other => bail!("top expects views|watch-time, got {other:?}"),
            };
            let window = window_for(Some(flag_value(&args, "--window").unwrap_or("day")), date)?;
            let limit = parse_arg::<usize>(&args, "--limit")?.unwrap_or(DEFAULT_TOP_N);
            let top = SettlementReporter::new(&store).top_videos(window, metric, limit)?;
            print(command, db, top)
        }
        other => bail!("Unknown command: {other}\n{}", usage()),
    }
}

fn window_for(name: Option<&str>, date: NaiveDate) -> Result<ReportWindow> {
    Ok(match name {
        Some("day") => ReportWindow::Day { date },
        Some("week") => ReportWindow::Week { date },
        Some("month") => ReportWindow::Month { date },
        other => bail!("Expected day|week|month, got {other:?}"),
    })
}

fn print<T: Serialize>(command: &str, db: &str, result: T) -> Result<()> {
    let output = Output { command, db, result };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn usage() -> &'static str {
    "usage: streampay-runner <aggregate|settle|run-daily|report day|week|month|top views|watch-time> \
     [--db PATH] [--config PATH] [--date YYYY-MM-DD] [--uploader ID] [--window day|week|month] [--limit N]"
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T>(args: &[String], flag: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    flag_value(args, flag)
        .map(|raw| raw.parse().with_context(|| format!("Invalid value for {flag}: {raw}")))
        .transpose()
}

/// Words that are neither flags nor flag values, program name excluded.
fn positional(args: &[String]) -> Vec<&str> {
    let mut words = Vec::new();
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if VALUE_FLAGS.contains(&arg.as_str()) {
            iter.next();
        } else if !arg.starts_with("--") {
            words.push(arg.as_str());
        }
    }
    words
}
