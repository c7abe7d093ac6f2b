use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use student_risk_radar::filter::ResultFilter;
use student_risk_radar::ingest::{self, ColumnMapping};
use student_risk_radar::{report, AnalysisReport, Execution, RiskTier, StudentRecord};
use student_risk_radar::{ThresholdConfig, ThresholdPolicy};

#[derive(Parser)]
#[command(name = "student-risk-radar")]
#[command(about = "At-risk student scoring from grades, attendance and engagement", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum ReportFormat {
    #[default]
    Markdown,
    Json,
}

#[derive(Args)]
struct Input {
    /// Student records CSV
    #[arg(long)]
    csv: PathBuf,
    /// Threshold configuration (TOML); defaults apply when omitted
    #[arg(long, env = "RISK_RADAR_CONFIG")]
    config: Option<PathBuf>,
    /// Only use rows from this semester
    #[arg(long)]
    semester: Option<String>,
    /// Score students on all cores
    #[arg(long)]
    parallel: bool,
}

#[derive(Args)]
struct Filters {
    /// Keep only these tiers (repeatable)
    #[arg(long = "tier")]
    tiers: Vec<RiskTier>,
    /// Keep only these departments (repeatable)
    #[arg(long = "department")]
    departments: Vec<String>,
    /// Match student id or name
    #[arg(long)]
    search: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank students by risk
    Score {
        #[command(flatten)]
        input: Input,
        #[command(flatten)]
        filters: Filters,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Write a risk report
    Report {
        #[command(flatten)]
        input: Input,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        #[arg(long, value_enum, default_value_t = ReportFormat::Markdown)]
        format: ReportFormat,
        /// Label for the report header
        #[arg(long)]
        scope: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Write the default threshold configuration
    InitConfig {
        #[arg(long, default_value = "thresholds.toml")]
        out: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_policy(path: Option<&Path>) -> anyhow::Result<ThresholdPolicy> {
    let Some(path) = path else {
        return Ok(ThresholdPolicy::default());
    };
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let policy = ThresholdPolicy::from_toml_str(&contents)
        .with_context(|| format!("invalid thresholds in {}", path.display()))?;
    info!(path = %path.display(), "Loaded threshold configuration");
    Ok(policy)
}

struct Analysis {
    /// Every ingested row, across all periods.
    history: Vec<StudentRecord>,
    /// Latest row per student; what gets scored.
    records: Vec<StudentRecord>,
    report: AnalysisReport,
}

fn run_analysis(input: &Input) -> anyhow::Result<Analysis> {
    let policy = load_policy(input.config.as_deref())?;
    let history =
        ingest::read_history(&input.csv, &ColumnMapping::default(), input.semester.as_deref())?;
    let records = ingest::latest_per_student(&history);
    let execution = if input.parallel {
        Execution::Parallel
    } else {
        Execution::Sequential
    };
    let report = student_risk_radar::analyze(&records, &policy, execution);
    Ok(Analysis {
        history,
        records,
        report,
    })
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Score {
            input,
            filters,
            limit,
            format,
        } => {
            let Analysis {
                records, report: analysis, ..
            } = run_analysis(&input)?;
            let filter = ResultFilter {
                tiers: filters.tiers,
                departments: filters.departments,
                semesters: Vec::new(),
                search: filters.search,
            };
            let selected = filter.apply(&analysis.results, &records);

            if selected.is_empty() {
                println!("No students match these filters.");
                return Ok(());
            }

            let shown: Vec<_> = selected.into_iter().take(limit).collect();
            match format {
                OutputFormat::Text => {
                    println!("Students by risk priority:");
                    for line in report::format_results(&shown, &records) {
                        println!("{line}");
                    }
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&shown)?);
                }
            }
        }
        Commands::Report {
            input,
            out,
            format,
            scope,
            limit,
        } => {
            let Analysis {
                history,
                records,
                report: analysis,
            } = run_analysis(&input)?;
            let contents = match format {
                ReportFormat::Markdown => {
                    report::build_markdown(scope.as_deref(), &analysis, &records, &history, limit)
                }
                ReportFormat::Json => report::to_json(&analysis, &records, &history)?,
            };
            std::fs::write(&out, contents)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::InitConfig { out } => {
            let contents = ThresholdConfig::default().to_toml()?;
            std::fs::write(&out, contents)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Default thresholds written to {}.", out.display());
        }
    }

    Ok(())
}
