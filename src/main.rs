use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use colored::Colorize;
use llm_telemetry::config::get_config;
use llm_telemetry::display::DisplayManager;
use llm_telemetry::logging;
use llm_telemetry::models::CostFilters;
use llm_telemetry::pricing::PricingCache;
use llm_telemetry::report::build_cost_report;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "llm-telemetry")]
#[command(about = "Telemetry analytics for LLM CLI tools")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show token spend over time
    Costs {
        /// Telemetry directory (defaults to config)
        #[arg(long)]
        path: Option<PathBuf>,
        /// Number of days to include
        #[arg(long, default_value_t = 30)]
        days: i64,
        /// Filter by project name
        #[arg(long)]
        project: Option<String>,
        /// Filter by agent name
        #[arg(long)]
        agent: Option<String>,
        /// Filter by model name
        #[arg(long)]
        model: Option<String>,
        /// Filter by success or failure
        #[arg(long, value_parser = ["success", "failure"])]
        status: Option<String>,
        /// Output JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging();
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Costs {
            path,
            days,
            project,
            agent,
            model,
            status,
            json,
        }) => {
            let filters = CostFilters {
                project,
                agent,
                model,
                status,
            };
            run_costs(path, days, filters, json).await
        }
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    }
}

async fn run_costs(
    path: Option<PathBuf>,
    days: i64,
    filters: CostFilters,
    json: bool,
) -> Result<()> {
    let config = get_config();
    let base_dir = path.unwrap_or_else(|| config.resolve_telemetry_dir());

    if !base_dir.exists() {
        eprintln!(
            "{} {}",
            "Telemetry directory not found:".red(),
            base_dir.display()
        );
        process::exit(1);
    }

    let mut pricing = PricingCache::new(config);
    pricing.load(false).await;

    let report = build_cost_report(&base_dir, days.max(1), &pricing, &filters, None);

    DisplayManager::new().display_report(&report, json);
    Ok(())
}
