// MemStat - Allocation-free Memory Diagnostics
// Copyright (C) 2026 MemStat Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use memstat_config::Scenario;
use memstat_sim::{decode, Board, Channel, ReportKind};
use tracing::info;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ChannelArg {
    /// ITM stimulus port over SWO
    Itm,
    /// PL011 UART
    Serial,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ReportArg {
    /// Heap and interrupt stack
    Heap,
    /// One line per live thread
    Threads,
    All,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    /// Bytes exactly as the observer receives them
    Raw,
    /// Decoded records, one JSON array
    Json,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Run the memory diagnostics against a simulated target", long_about = None)]
struct Args {
    /// Path to the scenario (YAML)
    #[arg(short, long)]
    scenario: PathBuf,

    /// Output channel the report is written through
    #[arg(short, long, value_enum, default_value = "itm")]
    channel: ChannelArg,

    /// Which report to produce
    #[arg(short, long, value_enum, default_value = "all")]
    report: ReportArg,

    /// How to print the captured stream
    #[arg(short, long, value_enum, default_value = "raw")]
    format: FormatArg,

    /// Log register traffic and lifecycle events
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    info!("Loading scenario: {:?}", args.scenario);
    let scenario = Scenario::from_file(&args.scenario)?;
    let mut board = Board::from_scenario(&scenario)?;

    let channel = match args.channel {
        ChannelArg::Itm => Channel::Itm,
        ChannelArg::Serial => Channel::Serial,
    };
    let report = match args.report {
        ReportArg::Heap => ReportKind::Heap,
        ReportArg::Threads => ReportKind::Threads,
        ReportArg::All => ReportKind::All,
    };

    let capture = board.run(channel, report)?;
    board
        .check_faults()
        .context("Simulated target faulted while reporting")?;
    info!(
        "Captured {} bytes, {} thread(s) on {:?}",
        capture.bytes.len(),
        capture.threads_printed,
        channel
    );

    let mut stdout = std::io::stdout().lock();
    match args.format {
        FormatArg::Raw => stdout.write_all(&capture.bytes)?,
        FormatArg::Json => {
            let text = std::str::from_utf8(&capture.bytes).context("Report is not UTF-8")?;
            let records = decode::decode(text)?;
            serde_json::to_writer_pretty(&mut stdout, &records)?;
            writeln!(stdout)?;
        }
    }
    stdout.flush()?;
    Ok(())
}
