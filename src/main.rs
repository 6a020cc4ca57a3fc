use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use portfolio_dash::charts::{self, ChartStatus};
use portfolio_dash::config::DashboardConfig;
use portfolio_dash::refresh::{RefreshOutcome, RefreshService, RefreshSettings};

#[derive(Parser)]
#[command(
    name = "portfolio-dash",
    about = "Crypto portfolio analytics dashboard",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (defaults to $PORTFOLIO_DASH_CONFIG, then ./portfolio-dash.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the dashboard server (refresh endpoint, chart API, reports)
    Serve {
        /// Bind address, overrides [server].bind
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run the data refresh script once and re-render the charts on success
    Refresh {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Render every chart to SVG and write charts_data.json
    Charts {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = portfolio_dash::logging::bootstrap(|| {
        DashboardConfig::resolve(cli.config.as_deref())
    })?;
    portfolio_dash::logging::init(&config.logging);

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tracing::info!(bind = %config.server.bind, "Starting portfolio dashboard");
            portfolio_dash::serve(config).await?;
        }
        Commands::Refresh { json } => {
            let service = RefreshService::new(RefreshSettings::from(&config.refresh))
                .with_charts(Arc::new(config.charts.clone()));
            let report = service.trigger().await.map_err(|e| anyhow::anyhow!("{e}"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("\nData refresh {}", report.run_id);
                println!("{:<10} : {}", "Outcome", report.outcome.label());
                println!("{:<10} : {:.1}s", "Elapsed", report.elapsed_secs());
                match &report.outcome {
                    RefreshOutcome::Succeeded { stdout } => {
                        println!("\n{}", stdout.trim_end());
                    }
                    RefreshOutcome::Failed { code, stdout, stderr } => {
                        println!("{:<10} : {:?}", "Exit code", code);
                        println!("\n--- stdout ---\n{}", stdout.trim_end());
                        println!("--- stderr ---\n{}", stderr.trim_end());
                    }
                    RefreshOutcome::TimedOut { after_secs, .. } => {
                        println!("Script killed after {after_secs}s");
                    }
                }
                println!();
            }
            if !report.outcome.is_success() {
                bail!("data refresh {}", report.outcome.label());
            }
        }
        Commands::Charts { json } => {
            let config = config.charts;
            let report = tokio::task::spawn_blocking(move || charts::generate_all(&config)).await??;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("\nCharts -> {}", report.output_dir.display());
                println!("{:<22} | {:<8} | Details", "Chart", "Status");
                println!("{:-<22}-|-{:-<8}-|-{:-<40}", "", "", "");
                for chart in &report.charts {
                    let details = match &chart.status {
                        ChartStatus::Rendered { path } => path.display().to_string(),
                        ChartStatus::NoData => "no data available".to_string(),
                        ChartStatus::Failed { error } => error.clone(),
                    };
                    println!(
                        "{:<22} | {:<8} | {}",
                        chart.name,
                        chart.status.label().to_uppercase(),
                        details
                    );
                }
                if let Some(path) = &report.data_file {
                    println!("\nChart data: {}", path.display());
                }
                println!();
            }
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}
