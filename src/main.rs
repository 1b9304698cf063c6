use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use stockcache::{
    CacheStore, ChartClient, Config, DataAccessor, MetricCatalog, MetricsTableBuilder, RqlClient,
};

#[derive(Parser)]
#[command(name = "stockcache", about = "Cached access to price history and fundamentals")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print cached-or-fetched daily price history for a ticker
    History {
        ticker: String,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    /// Print one financial metric keyed by fiscal year
    Metric {
        ticker: String,
        metric: String,
        #[arg(long)]
        start_year: i32,
        #[arg(long)]
        end_year: i32,
    },
    /// Print a multi-metric report with growth-rate annotations
    Report {
        ticker: String,
        #[arg(long, value_delimiter = ',')]
        metrics: Vec<String>,
        #[arg(long)]
        start_year: i32,
        #[arg(long)]
        end_year: i32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stockcache=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let store = CacheStore::connect(&config.database_url).await?;
    let accessor = DataAccessor::new(
        store,
        ChartClient::new(&config)?,
        RqlClient::new(&config)?,
        MetricCatalog::default_catalog(),
    );

    match cli.command {
        Command::History { ticker, start, end } => {
            let bars = accessor.get_or_fetch_historical(&ticker, start, end).await?;
            println!(
                "{:<12} {:>10} {:>10} {:>10} {:>10} {:>12}",
                "Date", "Open", "High", "Low", "Close", "Volume"
            );
            println!("{}", "-".repeat(70));
            for bar in &bars {
                println!(
                    "{:<12} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>12}",
                    bar.date.format("%Y-%m-%d"),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume
                );
            }
            println!("{} rows", bars.len());
        }
        Command::Metric { ticker, metric, start_year, end_year } => {
            match accessor
                .get_or_fetch_financial(&ticker, &metric, start_year, end_year)
                .await?
            {
                Some(series) => {
                    println!("{:<12} {:>16}", "Fiscal Year", &series.metric);
                    println!("{}", "-".repeat(30));
                    for (year, value) in &series.values {
                        println!("{year:<12} {value:>16.2}");
                    }
                }
                None => println!("No data available for '{metric}' on {ticker}"),
            }
        }
        Command::Report { ticker, metrics, start_year, end_year } => {
            let builder = MetricsTableBuilder::new(&accessor);
            match builder.build(&ticker, &metrics, start_year, end_year).await? {
                Some(report) => print!("{}", report.render()),
                None => println!("No data available for any requested metric on {ticker}"),
            }
        }
    }

    Ok(())
}
