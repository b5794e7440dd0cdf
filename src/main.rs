// src/main.rs
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Datelike, Local, TimeZone};
use clap::{Parser, Subcommand};
use log::{info, warn};

use vent_journal::aggregate::DayCell;
use vent_journal::{
    AnalysisOutcome, Clock, Config, CpalCapture, DayKey, DayLedger, DayLedgerStore, DeleteOutcome,
    EntryRecord, FileStore, HttpEnricher, IntensityTier, Journal, MonthCursor, PlaybackSlot,
    RecordingSessionManager, RodioPlayer, Shade, SystemClock, TierPolicy,
};

type VentJournal = Journal<FileStore, HttpEnricher>;

#[derive(Parser)]
#[command(name = "vent")]
#[command(about = "A daily journal of typed and spoken entries")]
struct Cli {
    /// Path to a TOML config file (defaults to ./vent.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save a typed entry for today
    Write {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Record a voice entry; Enter saves it, Ctrl-C discards it
    Record,
    /// List today's entries
    Today,
    /// List the entries of one day
    Day {
        /// Day as YYYY-MM-DD
        day: DayKey,
    },
    /// Delete an entry by day and timestamp
    Delete {
        #[arg(short, long)]
        day: DayKey,
        #[arg(short, long)]
        timestamp: i64,
    },
    /// Show a month as a heatmap of entry counts
    Heatmap {
        #[arg(short, long)]
        year: Option<i32>,
        /// Month number, 1-12
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..=12))]
        month: Option<u32>,
        /// Override the configured shading policy (fixed or relative)
        #[arg(short, long)]
        policy: Option<TierPolicy>,
    },
    /// Ask the enrichment service to analyze a day (today by default)
    Analyze {
        #[arg(short, long)]
        day: Option<DayKey>,
    },
    /// Play the recording of a voice entry
    Play {
        #[arg(short, long)]
        day: DayKey,
        #[arg(short, long)]
        timestamp: i64,
    },
    /// Show the effective configuration
    Config {
        /// Write it to this file
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

async fn open_journal(config: &Config, policy: TierPolicy) -> Result<VentJournal> {
    let store = FileStore::open(&config.storage.data_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to open ledger directory {}",
                config.storage.data_dir.display()
            )
        })?;
    let ledger = DayLedgerStore::new(store, Arc::new(SystemClock))
        .with_key_prefix(config.storage.key_prefix.clone());
    let enricher = HttpEnricher::new(config.enrichment.base_url.clone(), config.enrichment.timeout())
        .context("Failed to build HTTP client")?;
    Ok(Journal::new(ledger, enricher, policy).with_audio_dir(config.storage.audio_dir.clone()))
}

fn format_time(timestamp: i64) -> String {
    Local
        .timestamp_millis_opt(timestamp)
        .single()
        .map(|time| time.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn print_entry(entry: &EntryRecord) {
    let kind = entry.kind().as_str();
    let body = entry.body().unwrap_or("");
    println!("[{}] {} {kind:<5} {body}", entry.timestamp(), format_time(entry.timestamp()));
    if let Some(audio) = entry.audio_ref() {
        println!("{:>30} {audio}", "");
    }
}

fn print_ledger(ledger: &DayLedger) {
    if ledger.status.fell_back() {
        warn!("Ledger for {} was damaged: {:?}", ledger.day, ledger.status);
    }
    println!("{} ({} entries)", ledger.day, ledger.len());
    for entry in &ledger.entries {
        print_entry(entry);
    }
}

fn find_entry(ledger: &DayLedger, timestamp: i64) -> Result<&EntryRecord> {
    ledger
        .entries
        .iter()
        .find(|entry| entry.timestamp() == timestamp)
        .with_context(|| format!("No entry at {timestamp} on {}", ledger.day))
}

fn shade_glyph(cell: &DayCell) -> char {
    match cell.shade {
        Shade::Tier(IntensityTier::Empty) => '.',
        Shade::Tier(IntensityTier::Low) => '+',
        Shade::Tier(IntensityTier::High) => '#',
        Shade::Scale(level) if level <= 0.0 => '.',
        Shade::Scale(level) => char::from_digit((level * 9.0).ceil() as u32, 10).unwrap_or('9'),
    }
}

fn print_heatmap(cells: &[DayCell]) {
    let Some(first) = cells.first() else {
        return;
    };
    println!("  Mo  Tu  We  Th  Fr  Sa  Su");
    let lead = first.day.date().weekday().num_days_from_monday() as usize;
    let mut line = "    ".repeat(lead);
    for (index, cell) in cells.iter().enumerate() {
        line.push_str(&format!(" {:>2}{}", cell.day.day(), shade_glyph(cell)));
        if (lead + index + 1) % 7 == 0 {
            println!("{line}");
            line.clear();
        }
    }
    if !line.is_empty() {
        println!("{line}");
    }
}

/// Whether a stdin read asks to keep the recording. End of input or a read
/// error does not.
fn confirms_save(read: std::io::Result<usize>) -> bool {
    matches!(read, Ok(n) if n > 0)
}

async fn record(journal: &VentJournal, config: &Config) -> Result<()> {
    tokio::fs::create_dir_all(&config.storage.audio_dir)
        .await
        .context("Failed to create audio directory")?;
    let mut session = RecordingSessionManager::new(CpalCapture::new(&config.storage.audio_dir));
    session.start().context("Failed to start recording")?;
    println!("Recording... press Enter to save, Ctrl-C to discard.");

    // A plain thread so a pending read never holds up runtime shutdown.
    let (enter_tx, enter_rx) = tokio::sync::oneshot::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = enter_tx.send(confirms_save(std::io::stdin().read_line(&mut line)));
    });

    tokio::select! {
        confirmed = enter_rx => {
            if !confirmed.unwrap_or(false) {
                session.abort();
                warn!("Input closed before Enter; recording discarded.");
                return Ok(());
            }
            match journal.finish_recording(&mut session).await? {
                Some(entry) => print_entry(&entry),
                None => warn!("Nothing was recorded."),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            session.abort();
            info!("Recording discarded.");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    env_logger::Builder::new()
        .filter_level(config.log_filter()?)
        .init();

    match cli.command {
        Commands::Write { text } => {
            let journal = open_journal(&config, config.heatmap.tier_policy).await?;
            let entry = journal.save_text(&text.join(" ")).await?;
            print_entry(&entry);
        }
        Commands::Record => {
            let journal = open_journal(&config, config.heatmap.tier_policy).await?;
            record(&journal, &config).await?;
        }
        Commands::Today => {
            let journal = open_journal(&config, config.heatmap.tier_policy).await?;
            print_ledger(&journal.today().await);
        }
        Commands::Day { day } => {
            let journal = open_journal(&config, config.heatmap.tier_policy).await?;
            print_ledger(&journal.day(day).await);
        }
        Commands::Delete { day, timestamp } => {
            let journal = open_journal(&config, config.heatmap.tier_policy).await?;
            let ledger = journal.day(day).await;
            let entry = find_entry(&ledger, timestamp)?;
            let mut playback = PlaybackSlot::new(RodioPlayer::new());
            match journal.delete_entry(day, entry, &mut playback).await? {
                DeleteOutcome::Removed { remaining, .. } => {
                    info!("Deleted entry {timestamp}; {remaining} left on {day}")
                }
                DeleteOutcome::NotFound => warn!("Entry {timestamp} was already gone"),
            }
        }
        Commands::Heatmap { year, month, policy } => {
            let policy = policy.unwrap_or(config.heatmap.tier_policy);
            let journal = open_journal(&config, policy).await?;
            let today = SystemClock.today();
            let cursor = MonthCursor::new(
                year.unwrap_or(today.year()),
                month.map_or(today.month0(), |month| month - 1),
            )?;
            let view = journal.month_view(cursor).await?;
            println!("{cursor}: {} entries", view.total_entries());
            print_heatmap(&view.cells());
            if let Some(selected) = view.selected() {
                println!();
                println!("{selected}");
                for entry in view.selected_entries() {
                    print_entry(entry);
                }
            }
        }
        Commands::Analyze { day } => {
            let journal = open_journal(&config, config.heatmap.tier_policy).await?;
            let day = day.unwrap_or_else(|| journal.ledger().clock().today());
            match journal.analyze_day(day).await {
                AnalysisOutcome::Report(report) => {
                    println!("Nature: {}", report.nature);
                    println!("{}", report.analysis);
                }
                outcome => {
                    bail!("{}", outcome.error_message().unwrap_or("Analysis failed"));
                }
            }
        }
        Commands::Play { day, timestamp } => {
            let journal = open_journal(&config, config.heatmap.tier_policy).await?;
            let ledger = journal.day(day).await;
            let entry = find_entry(&ledger, timestamp)?;
            let audio = entry
                .audio_ref()
                .with_context(|| format!("Entry {timestamp} has no recording"))?;
            let mut playback = PlaybackSlot::new(RodioPlayer::new());
            playback.play(audio)?;
            info!("Playing {audio}");
            tokio::task::block_in_place(|| playback.session().wait_until_finished());
            playback.stop();
        }
        Commands::Config { save } => {
            print!("{}", config.to_toml_string()?);
            if let Some(path) = save {
                config.save_to_file(&path)?;
                info!("Config written to {}", path.display());
            }
        }
    }

    Ok(())
}
