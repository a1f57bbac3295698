//! patent_harvest CLI
//!
//! Usage:
//!   patent_harvest update-all
//!   patent_harvest sync --sector biotech --start 2025-01-01 --max-pages 3
//!   patent_harvest rollup
//!   patent_harvest suggest --sector tech
//!   patent_harvest cpc-titles
//!   patent_harvest query --sector tech --company <id> --sort cited
//!   patent_harvest insights --sector biotech --company <id> --days 730 --level subclass
//!
//! `PATENTSVIEW_API_KEY` is read from the environment (or `.env`) by every
//! subcommand that talks to the API.

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;

use patent_harvest::config::{ApiCredentials, HarvestConfig, SectorConfig};
use patent_harvest::patentsview::HttpSearchClient;
use patent_harvest::pipeline::{self, RunSummary, SectorFailure};
use patent_harvest::rollup::{
    query_insights, query_patents, query_years, CpcLevel, InsightsQuery, PatentQuery, PatentSort,
};
use patent_harvest::store::PartitionStore;
use patent_harvest::sync::{SyncOverrides, SyncReport};
use patent_harvest::cpc_titles;

#[derive(Parser)]
#[command(name = "patent_harvest")]
#[command(version)]
#[command(about = "Incremental patent harvesting and company rollups for sector watchlists")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// YAML config file (defaults apply when omitted)
    #[arg(long, short = 'c', global = true, env = "PATENT_HARVEST_CONFIG")]
    config: Option<PathBuf>,

    /// Override paths.data_root
    #[arg(long, global = true)]
    data_root: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync every sector, write suggestions, rebuild artifacts
    UpdateAll,

    /// Sync one or all sectors
    Sync {
        /// Sector id (all sectors when omitted)
        #[arg(long)]
        sector: Option<String>,

        /// Fetch grants after this date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        start: Option<NaiveDate>,

        /// Fetch grants up to this date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        end: Option<NaiveDate>,

        /// Stop after this many pages
        #[arg(long)]
        max_pages: Option<usize>,
    },

    /// Rebuild rollup artifacts from the store
    Rollup {
        #[arg(long)]
        sector: Option<String>,
    },

    /// Write normalization suggestion reports
    Suggest {
        #[arg(long)]
        sector: Option<String>,
    },

    /// Refresh the CPC title tables
    CpcTitles,

    /// Page through a company's patents in the index
    Query {
        #[arg(long)]
        sector: String,

        #[arg(long)]
        company: String,

        #[arg(long)]
        year: Option<i32>,

        /// Title substring
        #[arg(long)]
        q: Option<String>,

        #[arg(long, value_enum, default_value = "recent")]
        sort: SortArg,

        #[arg(long, default_value_t = 0)]
        page: usize,

        #[arg(long, default_value_t = 100)]
        page_size: usize,
    },

    /// Topic mix, trend, competitors and inventors for one company
    Insights {
        #[arg(long)]
        sector: String,

        #[arg(long)]
        company: String,

        /// Trailing window in days (30-3650)
        #[arg(long, default_value_t = 365)]
        days: u32,

        #[arg(long, value_enum, default_value = "group")]
        level: LevelArg,

        /// End of the window (YYYY-MM-DD, default today)
        #[arg(long, value_parser = parse_date)]
        as_of: Option<NaiveDate>,

        /// Print JSON instead of tables
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LevelArg {
    Group,
    MainGroup,
    Subclass,
    Class,
}

impl From<LevelArg> for CpcLevel {
    fn from(arg: LevelArg) -> Self {
        match arg {
            LevelArg::Group => CpcLevel::Group,
            LevelArg::MainGroup => CpcLevel::MainGroup,
            LevelArg::Subclass => CpcLevel::Subclass,
            LevelArg::Class => CpcLevel::Class,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SortArg {
    Recent,
    Cited,
}

impl From<SortArg> for PatentSort {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Recent => PatentSort::Recent,
            SortArg::Cited => PatentSort::Cited,
        }
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("Invalid date '{}': {}", s, e))
}

// =============================================================================
// MAIN
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

/// `Ok(false)` when some sector failed but the run itself completed
async fn run(cli: Cli) -> Result<bool> {
    let mut config = HarvestConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    if let Some(root) = cli.data_root {
        config.paths.data_root = root;
    }
    let today = Utc::now().date_naive();

    match cli.command {
        Commands::UpdateAll => {
            let client = http_client(&config)?;
            let summary = pipeline::run_all(&client, &config, today).await?;
            print_summary(&summary);
            Ok(summary.is_success())
        }
        Commands::Sync {
            sector,
            start,
            end,
            max_pages,
        } => {
            let sectors = select_sectors(&config, sector.as_deref())?;
            let client = http_client(&config)?;
            let map = pipeline::load_mapping(&config)?;
            let overrides = SyncOverrides {
                start,
                end,
                max_pages,
            };
            let (reports, failures) =
                pipeline::sync_sectors(&client, &map, &config, &sectors, today, &overrides).await;
            reports.iter().for_each(print_sync);
            failures.iter().for_each(print_failure);
            Ok(failures.is_empty())
        }
        Commands::Rollup { sector } => {
            for sector in select_sectors(&config, sector.as_deref())? {
                let report = pipeline::build_artifacts(&config, &sector.id)?;
                println!(
                    "{} {}: {} companies, {} patent files, {} index rows",
                    "OK".green().bold(),
                    report.sector_id.cyan(),
                    report.companies,
                    report.patent_files,
                    report.index_rows
                );
                if !report.corporate_filter_applied {
                    println!("   {} no corporate assignee types found; ranked all assignees", "warning".yellow());
                }
            }
            Ok(true)
        }
        Commands::Suggest { sector } => {
            for sector in select_sectors(&config, sector.as_deref())? {
                match pipeline::write_suggestions(&config, &sector.id)? {
                    Some(groups) => println!(
                        "{} {}: {} candidate groups -> {}",
                        "OK".green().bold(),
                        sector.id.cyan(),
                        groups,
                        config.suggestions_path(&sector.id).display()
                    ),
                    None => println!("{} {}: store is empty", "--".dimmed(), sector.id.cyan()),
                }
            }
            Ok(true)
        }
        Commands::CpcTitles => {
            let client = http_client(&config)?;
            let stores: Vec<PartitionStore> = config
                .sectors
                .iter()
                .map(|s| PartitionStore::new(config.store_dir(&s.id)))
                .collect();
            let out_dir = config.cpc_titles_dir();
            let summary = cpc_titles::refresh(&client, &stores, &out_dir)
                .await
                .context("Failed to refresh CPC titles")?;
            println!(
                "{} {} groups, {} subclasses, {} classes -> {}",
                "OK".green().bold(),
                summary.groups,
                summary.subclasses,
                summary.classes,
                out_dir.display()
            );
            Ok(true)
        }
        Commands::Query {
            sector,
            company,
            year,
            q,
            sort,
            page,
            page_size,
        } => {
            let index = config.index_path(&sector);
            let years = query_years(&index, &company)?;
            let query = PatentQuery {
                year,
                title_like: q,
                sort: sort.into(),
                page,
                page_size,
                ..PatentQuery::new(company.as_str())
            };
            let result = query_patents(&index, &query)?;

            println!(
                "{} {} (years: {:?}) - {} total, page {} of size {}",
                "Company".cyan().bold(),
                company,
                years,
                result.total,
                result.page,
                result.page_size
            );
            for row in &result.rows {
                println!(
                    "  {}  {}  {:>5}  {}  {}",
                    row.patent_date,
                    row.patent_id,
                    row.cited_by,
                    row.patent_title,
                    row.cpc_subclass_ids.dimmed()
                );
            }
            Ok(true)
        }
        Commands::Insights {
            sector,
            company,
            days,
            level,
            as_of,
            json,
        } => {
            let index = config.index_path(&sector);
            let query = InsightsQuery {
                days,
                level: level.into(),
                ..InsightsQuery::new(company.as_str(), as_of.unwrap_or(today))
            };
            let insights = query_insights(&index, &query)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&insights)?);
                return Ok(true);
            }

            println!(
                "{} {} - last {} days to {}",
                "Insights".cyan().bold(),
                insights.company_id,
                insights.days,
                insights.as_of
            );
            println!("{}", "Top CPC".bold());
            for c in &insights.top_cpc {
                println!("  {:>5}  {}  {}", c.n, c.code, c.title.dimmed());
            }
            println!("{}", "Trend".bold());
            for t in &insights.cpc_trend {
                let pct = t.pct.map(|p| format!("{:+.2}%", p)).unwrap_or_else(|| "new".to_string());
                println!("  {:>+5}  {} ({} -> {}, {})", t.delta, t.code, t.prev_n, t.cur_n, pct);
            }
            println!("{}", "Competitors".bold());
            for c in &insights.competitors {
                println!("  {:>5}  {} ({})", c.score, c.display_name, c.company_id.dimmed());
            }
            println!("{}", "Co-assignees".bold());
            for c in &insights.co_assignees {
                println!("  {:>5}  {} ({})", c.n, c.display_name, c.company_id.dimmed());
            }
            println!("{}", "Inventors".bold());
            for i in &insights.top_inventors {
                println!("  {:>5}  {}", i.n, i.name);
            }
            Ok(true)
        }
    }
}

fn http_client(config: &HarvestConfig) -> Result<HttpSearchClient> {
    let credentials = ApiCredentials::from_env()?;
    HttpSearchClient::new(&config.api, credentials).context("Failed to build HTTP client")
}

fn select_sectors(config: &HarvestConfig, id: Option<&str>) -> Result<Vec<SectorConfig>> {
    match id {
        None => Ok(config.sectors.clone()),
        Some(id) => config
            .sector(id)
            .cloned()
            .map(|s| vec![s])
            .ok_or_else(|| anyhow!("Unknown sector '{}'", id)),
    }
}

fn print_sync(report: &SyncReport) {
    println!(
        "{} {}: window ({} .. {}], {} pages, +{} pairs, +{} inventors, {} skipped, {} stored",
        "OK".green().bold(),
        report.sector_id.cyan(),
        report.window.start,
        report.window.end,
        report.pages_fetched,
        report.new_pairs,
        report.new_inventors,
        report.skipped_records,
        report.total_pairs
    );
    if report.truncated {
        println!(
            "   {} page cap reached; checkpoint at {}",
            "warning".yellow(),
            report.checkpoint_end
        );
    }
}

fn print_failure(failure: &SectorFailure) {
    println!(
        "{} {}: {}",
        "FAILED".red().bold(),
        failure.sector_id.cyan(),
        failure.error
    );
}

fn print_summary(summary: &RunSummary) {
    summary.syncs.iter().for_each(print_sync);
    summary.failures.iter().for_each(print_failure);
    for (sector_id, groups) in &summary.suggestions {
        println!("   {} suggestions: {} groups", sector_id.cyan(), groups);
    }
    for artifact in &summary.artifacts {
        println!(
            "   {} artifacts: {} companies, {} index rows",
            artifact.sector_id.cyan(),
            artifact.companies,
            artifact.index_rows
        );
    }
}
