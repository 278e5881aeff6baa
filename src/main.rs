use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use std::path::PathBuf;
use tabled::{builder::Builder, settings::Style, Table, Tabled};
use tracing::{error, info, warn, Level};

use zpower::analysis::{AnalysisRequest, FtpSource, PowerProfileAnalyzer, RiderAnalysis};
use zpower::config::EngineConfig;
use zpower::logging::{init_logging, LogFormat, LogLevel};
use zpower::zones::{calculate_training_zones, TrainingZone};
use zpower::{EventType, PowerSource, RiderPayload, WindowFilter, ZPowerError};

/// zpower - Power Profile Analysis CLI
///
/// Analyses a rider payload exported from ZwiftPower: power-duration curve,
/// Critical Power, event power reconciliation and medal rankings.
#[derive(Parser)]
#[command(name = "zpower")]
#[command(version)]
#[command(about = "Power profile analysis for ZwiftPower rider data", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log format (pretty, json, compact)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse a rider payload
    Analyze {
        /// Rider payload JSON file
        #[arg(short, long)]
        payload: PathBuf,

        /// Only include one event type (race, group_ride, workout)
        #[arg(short, long)]
        event_type: Option<EventType>,

        /// Ranking window in days, or "all"
        #[arg(short, long, default_value = "all")]
        window: WindowFilter,

        /// Reference date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        as_of: Option<NaiveDate>,

        /// Output format
        #[arg(short = 'f', long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Show Coggan training zones for an FTP
    Zones {
        /// Functional Threshold Power in watts
        #[arg(long)]
        ftp: f64,
    },

    /// Manage the configuration file
    Config {
        /// Write a default configuration file
        #[arg(long)]
        init: bool,

        /// Print the active configuration
        #[arg(long)]
        show: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Tabled)]
struct ZoneRow {
    #[tabled(rename = "Zone")]
    zone: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "% FTP")]
    percent: String,
    #[tabled(rename = "Watts")]
    watts: String,
}

impl From<&TrainingZone> for ZoneRow {
    fn from(zone: &TrainingZone) -> Self {
        let (percent, watts) = match zone.max_percent {
            Some(max) => (
                format!("{}-{}%", zone.min_percent, max),
                format!("{}-{}", zone.min_watts, zone.max_watts),
            ),
            None => (
                format!(">{}%", zone.min_percent - 1),
                format!("{}+", zone.min_watts),
            ),
        };
        ZoneRow {
            zone: format!("Z{}", zone.zone),
            name: zone.name.clone(),
            percent,
            watts,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load_from_file(path)?,
        None => EngineConfig::load_or_default(),
    };

    let mut log_config = config.logging.clone();
    if cli.verbose > 0 {
        log_config.level = LogLevel::from_verbosity(cli.verbose);
    }
    if let Some(format) = cli.log_format {
        log_config.format = format;
    }
    init_logging(&log_config)?;

    match cli.command {
        Commands::Analyze {
            payload,
            event_type,
            window,
            as_of,
            format,
        } => {
            let rider = match RiderPayload::from_file(&payload) {
                Ok(rider) => rider,
                Err(e) => {
                    let err = ZPowerError::from(e);
                    report_error(&err);
                    eprintln!("{}", err.user_message().red());
                    return Err(err.into());
                }
            };

            let mut request =
                AnalysisRequest::new(as_of.unwrap_or_else(|| Local::now().date_naive()))
                    .with_window(window);
            if let Some(event_type) = event_type {
                request = request.with_event_type(event_type);
            }

            let analysis = PowerProfileAnalyzer::from_config(config).analyze(&rider, &request);

            match format {
                OutputFormat::Json => {
                    let json = serde_json::to_string_pretty(analysis.as_ref())
                        .context("Failed to serialize analysis")?;
                    println!("{}", json);
                }
                OutputFormat::Table => print_analysis(&analysis),
            }
        }

        Commands::Zones { ftp } => {
            let zones =
                calculate_training_zones(ftp).ok_or_else(|| anyhow!("FTP must be positive"))?;
            println!("{}", format!("Training zones for FTP {:.0} W", ftp).cyan().bold());
            print_zones(&zones);
        }

        Commands::Config { init, show } => {
            let path = cli
                .config
                .clone()
                .unwrap_or_else(EngineConfig::default_config_path);

            if init {
                if path.exists() {
                    bail!("Config file already exists: {}", path.display());
                }
                EngineConfig::default().save_to_file(&path)?;
                println!("{} {}", "✓ Wrote default configuration to".green(), path.display());
            }

            if show || !init {
                let toml = toml::to_string_pretty(&config)
                    .context("Failed to serialize configuration")?;
                println!("{}", format!("# {}", path.display()).dimmed());
                println!("{}", toml);
            }
        }
    }

    Ok(())
}

/// Log a failure at the level its severity calls for
fn report_error(err: &ZPowerError) {
    let retryable = err.is_retryable();
    let level = err.severity().to_tracing_level();
    if level == Level::ERROR {
        error!(error = %err, retryable, "Command failed");
    } else if level == Level::WARN {
        warn!(error = %err, retryable, "Command failed");
    } else {
        info!(error = %err, retryable, "Command failed");
    }
}

fn print_analysis(analysis: &RiderAnalysis) {
    let title = analysis.name.as_deref().unwrap_or(&analysis.rider_id);
    println!("{}", format!("Power profile: {}", title).cyan().bold());
    println!(
        "  As of {} | window: {} | events: {}",
        analysis.as_of,
        analysis.window,
        analysis
            .event_type
            .map(|t| t.to_string())
            .unwrap_or_else(|| "all".to_string())
    );
    if analysis.inactive {
        println!("  {}", "Rider has no recent events".yellow());
    }
    println!();

    if let Some(ftp) = analysis.ftp {
        let source = match analysis.ftp_source {
            Some(FtpSource::Estimated) => " (estimated)",
            _ => "",
        };
        println!("  FTP: {:.0} W{}", ftp, source);
    }
    if let Some(cp) = &analysis.critical_power {
        println!(
            "  Critical Power: {} W | W': {} J | R²: {}",
            cp.critical_power, cp.w_prime, cp.r_squared
        );
    }
    if let Some(peak) = &analysis.peak_power {
        println!("  Peak power: {:.0} W @ {}", peak.power, duration_label(peak.duration));
    }
    if let Some(ratios) = &analysis.power_ratios {
        println!(
            "  Ratios: sprint {} | anaerobic {} | VO2max {}{}",
            ratios.sprint_ratio.value,
            ratios.anaerobic_ratio.value,
            ratios.vo2max_ratio.value,
            ratios
                .endurance_ratio
                .as_ref()
                .map(|r| format!(" | endurance {}", r.value))
                .unwrap_or_default()
        );
    }
    if !analysis.profile_strengths.is_empty() {
        println!("  Strengths: {}", analysis.profile_strengths.join(", ").green());
    }

    if !analysis.events.is_empty() {
        println!();
        println!("{}", "Events".bold());
        print_events(analysis);
    }

    if !analysis.focus_areas.is_empty() {
        println!();
        println!("{}", "Training focus".bold());
        for area in &analysis.focus_areas {
            println!(
                "  {} {} (+{}%)",
                "▶".blue(),
                area.title.bold(),
                area.improvement_potential
            );
            println!("    {}", area.rationale.dimmed());
            println!("    {}", area.protocol);
        }
    }

    if !analysis.insights.is_empty() {
        println!();
        println!("{}", "Insights".bold());
        for insight in &analysis.insights {
            println!("  {} {}: {}", insight.icon, insight.title.bold(), insight.description);
            println!("    {}", insight.recommendation.dimmed());
        }
    }

    if let Some(zones) = &analysis.training_zones {
        println!();
        println!("{}", "Training zones".bold());
        print_zones(zones);
    }
}

fn print_events(analysis: &RiderAnalysis) {
    let durations: Vec<u32> = analysis.durations.iter().map(|d| d.duration).collect();

    let mut builder = Builder::default();
    let mut header = vec!["Date".to_string(), "Type".to_string(), "Event".to_string()];
    header.extend(durations.iter().map(|d| duration_label(*d)));
    builder.push_record(header);

    for augmented in &analysis.events {
        let event = &augmented.event;
        let mut row = vec![
            event.event_date.to_string(),
            event.event_type.to_string(),
            event.title.clone().unwrap_or_else(|| event.id.clone()),
        ];
        for duration in &durations {
            let cell = match augmented.powers.get(duration) {
                Some(p) => match p.power {
                    Some(watts) => {
                        let medal = match p.rank {
                            Some(1) => " 🥇",
                            Some(2) => " 🥈",
                            Some(3) => " 🥉",
                            _ => "",
                        };
                        let marker = if p.source == PowerSource::Estimated { "~" } else { "" };
                        format!("{}{:.0}{}", marker, watts, medal)
                    }
                    None => "-".to_string(),
                },
                None => "-".to_string(),
            };
            row.push(cell);
        }
        builder.push_record(row);
    }

    let mut table = builder.build();
    table.with(Style::rounded());
    println!("{}", table);
    println!("{}", "  ~ estimated from average power, not ranked".dimmed());
}

fn print_zones(zones: &[TrainingZone]) {
    let rows: Vec<ZoneRow> = zones.iter().map(ZoneRow::from).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{}", table);
}

fn duration_label(secs: u32) -> String {
    if secs >= 60 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}
