//! Chronoquery CLI
//!
//! Command-line interface for running queries without the API server:
//! - Run a query and print the frame
//! - Show how a query would be split, without contacting the backend
//! - Check the backend
//! - Generate a config file

use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use chronoquery::client::BackendClient;
use chronoquery::config::{generate_default_config, Config};
use chronoquery::frame::{Frame, TimeRange};
use chronoquery::logging::init_logging;
use chronoquery::query::{HealthStatus, QueryExecutor, QueryFormat, QueryPlan, QuerySpec};

#[derive(Parser)]
#[command(name = "chronoquery")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Split long time-series queries into chunks and merge the results")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// Time range selection shared by query and plan
#[derive(clap::Args)]
pub struct RangeArgs {
    /// Relative range ending now (e.g. 6h, 7d, 2w)
    #[arg(short, long, default_value = "1h", conflicts_with_all = ["from", "to"])]
    last: String,
    /// Range start (RFC 3339)
    #[arg(long, requires = "to")]
    from: Option<String>,
    /// Range end (RFC 3339)
    #[arg(long, requires = "from")]
    to: Option<String>,
}

/// Query options shared by query and plan
#[derive(clap::Args)]
pub struct QueryArgs {
    /// SQL, may use $__timeFilter, $__timeFrom, $__timeTo, $__interval, $__timeGroup
    sql: String,
    #[command(flatten)]
    range: RangeArgs,
    /// Result format
    #[arg(short, long, value_enum, default_value_t = FormatArg::TimeSeries)]
    format: FormatArg,
    /// Database override for this query
    #[arg(short, long)]
    database: Option<String>,
    /// Split setting override (auto, off, 1h, 6h, 12h, 1d, 3d, 7d)
    #[arg(short, long)]
    split: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum FormatArg {
    TimeSeries,
    Table,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputArg {
    Table,
    Json,
    Csv,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a query and print the result
    Query {
        #[command(flatten)]
        query: QueryArgs,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputArg::Table)]
        output: OutputArg,
    },

    /// Show the split decision and the SQL each chunk would run
    Plan {
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Check the backend is reachable
    Health,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    init_logging(&config.logging).map_err(|e| anyhow!("Failed to initialise logging: {}", e))?;

    let settings = config.backend.to_settings();

    match cli.command {
        Commands::Query { query, output } => {
            settings.validate()?;
            let (spec, range) = query.into_spec()?;

            let executor = QueryExecutor::new(Arc::new(BackendClient::new()?));
            let frames = with_ctrl_c(|cancel| async move {
                executor.execute(&settings, &spec, range, &cancel).await
            })
            .await?;

            match frames.first() {
                None => println!("No data for the selected time range"),
                Some(frame) => match output {
                    OutputArg::Table => print_table(frame),
                    OutputArg::Json => println!("{}", serde_json::to_string_pretty(&frames)?),
                    OutputArg::Csv => print_csv(frame)?,
                },
            }
        }

        Commands::Plan { query } => {
            let (spec, range) = query.into_spec()?;
            print_plan(&QueryPlan::build(&settings, &spec, range));
        }

        Commands::Health => {
            let executor = QueryExecutor::new(Arc::new(BackendClient::new()?));
            let check = with_ctrl_c(|cancel| async move {
                Ok::<_, anyhow::Error>(executor.check_health(&settings, &cancel).await)
            })
            .await?;

            println!("{}", check.message);
            if check.status == HealthStatus::Error {
                std::process::exit(1);
            }
        }

        Commands::Config { output } => {
            let config = generate_default_config();

            match output {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)
                        .with_context(|| format!("Failed to write {:?}", path))?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}

impl QueryArgs {
    fn into_spec(self) -> anyhow::Result<(QuerySpec, TimeRange)> {
        let range = self.range.resolve(Utc::now())?;

        let format = match self.format {
            FormatArg::TimeSeries => QueryFormat::TimeSeries,
            FormatArg::Table => QueryFormat::Table,
        };
        let mut spec = QuerySpec::new("A", self.sql).format(format);
        if let Some(database) = self.database {
            spec = spec.database(database);
        }
        if let Some(split) = self.split {
            spec = spec.split_duration(split);
        }
        Ok((spec, range))
    }
}

impl RangeArgs {
    fn resolve(&self, now: DateTime<Utc>) -> anyhow::Result<TimeRange> {
        match (&self.from, &self.to) {
            (Some(from), Some(to)) => {
                let from = parse_instant(from)?;
                let to = parse_instant(to)?;
                TimeRange::try_new(from, to).ok_or_else(|| anyhow!("--from must not be after --to"))
            }
            _ => {
                let span = parse_duration(&self.last)?;
                let from = now
                    .checked_sub_signed(span)
                    .ok_or_else(|| anyhow!("Duration out of range: {}", self.last))?;
                TimeRange::try_new(from, now)
                    .ok_or_else(|| anyhow!("Duration out of range: {}", self.last))
            }
        }
    }
}

/// Run `f` with a token that Ctrl+C cancels
async fn with_ctrl_c<F, Fut, T, E>(f: F) -> anyhow::Result<T>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: Into<anyhow::Error>,
{
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let result = f(cancel).await;
    watcher.abort();
    result.map_err(Into::into)
}

fn parse_instant(s: &str) -> anyhow::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp: {}. Use RFC 3339, e.g. 2026-02-18T00:00:00Z", s))
}

fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim().to_lowercase();

    let Some(unit) = s.chars().last() else {
        bail!("Empty duration");
    };
    let amount: i64 = s[..s.len() - unit.len_utf8()]
        .parse()
        .with_context(|| format!("Invalid duration format: {}. Use: 30m, 6h, 7d, 2w", s))?;

    let span = match unit {
        'm' => Duration::try_minutes(amount),
        'h' => Duration::try_hours(amount),
        'd' => Duration::try_days(amount),
        'w' => Duration::try_weeks(amount),
        _ => bail!("Invalid duration format: {}. Use: 30m, 6h, 7d, 2w", s),
    };
    match span {
        Some(span) if span > Duration::zero() => Ok(span),
        _ => bail!("Duration out of range: {}", s),
    }
}

fn print_plan(plan: &QueryPlan) {
    println!("Range:  {}", plan.range);
    println!("Format: {:?}", plan.format);
    println!("Database: {}", plan.settings.database);

    match plan.chunk_size {
        None => println!("Split:  off"),
        Some(size) if plan.blockers.is_empty() => {
            println!("Split:  {} chunks of {}", plan.chunks.len(), format_span(size))
        }
        Some(size) => {
            println!("Split:  disabled ({} requested)", format_span(size));
            for blocker in &plan.blockers {
                println!("  - {}", blocker);
            }
        }
    }

    for (i, (range, sql)) in plan.statements().iter().enumerate() {
        println!();
        println!("[{}] {}", i + 1, range);
        println!("{}", sql);
    }
}

fn format_span(span: Duration) -> String {
    let hours = span.num_hours();
    if hours >= 24 && hours % 24 == 0 {
        format!("{}d", hours / 24)
    } else if hours > 0 {
        format!("{}h", hours)
    } else {
        format!("{}m", span.num_minutes())
    }
}

fn print_table(frame: &Frame) {
    let headers: Vec<String> = frame.columns.iter().map(|c| c.display_name()).collect();
    let rows: Vec<Vec<String>> = (0..frame.rows())
        .map(|row| {
            (0..frame.columns.len())
                .map(|col| frame.value(col, row).to_string())
                .collect()
        })
        .collect();

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            rows.iter()
                .map(|r| r[i].len())
                .chain(std::iter::once(h.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<w$}", c, w = *w))
            .collect::<Vec<_>>()
            .join(" | ")
    };

    println!("{}", line(&headers));
    println!("{}", "-".repeat(widths.iter().sum::<usize>() + 3 * widths.len().saturating_sub(1)));
    for row in &rows {
        println!("{}", line(row));
    }
    println!();
    println!("{} rows ({:?})", frame.rows(), frame.meta.format);
}

fn print_csv(frame: &Frame) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(std::io::stdout());

    writer.write_record(frame.columns.iter().map(|c| c.display_name()))?;
    for row in 0..frame.rows() {
        writer.write_record((0..frame.columns.len()).map(|col| frame.value(col, row).to_string()))?;
    }
    writer.flush()?;
    Ok(())
}
