use anyhow::Result;
use chrono::NaiveDate;
use clap::Parser;
use cropcast::application::predictor::Predictor;
use cropcast::config::ForecastConfig;
use cropcast::domain::record::Task;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(author, version, about = "One-shot crop price/demand forecast", long_about = None)]
struct Args {
    /// Commodity to forecast, e.g. Rice
    commodity: String,

    /// Task: price or demand
    #[arg(long, default_value = "price")]
    task: String,

    /// Target date (YYYY-MM-DD); defaults to today
    #[arg(long)]
    date: Option<String>,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let task: Task = args.task.parse()?;
    let date = args
        .date
        .map(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d"))
        .transpose()?;

    let config = ForecastConfig::from_env()?;
    let predictor = Predictor::new(&config)?;

    let result = match (task, date) {
        (Task::Price, None) => predictor.predict_price(&args.commodity),
        (Task::Price, Some(date)) => predictor
            .price_for_date(&args.commodity, date)
            .inspect_err(|e| warn!("{} price forecast unavailable: {}", args.commodity, e))
            .ok()
            .map(|p| p.value),
        (Task::Demand, date) => predictor.predict_demand(&args.commodity, date),
    };

    match result {
        Some(value) => println!("{} {} forecast: {:.2}", args.commodity, task, value),
        None => println!("{} {} forecast: N/A", args.commodity, task),
    }
    Ok(())
}
