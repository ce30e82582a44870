use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use bisectrix::{Config, Database};

/// Regression bisection over browser build histories.
#[derive(Parser, Debug)]
#[command(name = "bisectrix", version, about)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Result database, overriding the configured path
    #[arg(long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let mut config = Config::load(cli.config.as_deref());
    if let Some(database) = cli.database {
        config = config.with_database_path(database);
    }

    let db = Database::open(config.database_path.clone())?;
    let (results, availability, claims) = db.with_connection(|conn| {
        let results: i64 = conn.query_row("SELECT COUNT(*) FROM results", [], |row| row.get(0))?;
        let availability: i64 = conn.query_row(
            "SELECT COUNT(*) FROM binary_availability",
            [],
            |row| row.get(0),
        )?;
        let claims: i64 =
            conn.query_row("SELECT COUNT(*) FROM eval_claims", [], |row| row.get(0))?;
        Ok((results, availability, claims))
    })?;

    println!("database: {}", db.path.display());
    println!("  results:             {results}");
    println!("  availability checks: {availability}");
    println!("  active claims:       {claims}");
    Ok(())
}
