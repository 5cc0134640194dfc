mod cli;
mod dates;
mod enrich;
mod fips;
mod geoprocess;
mod layer;
mod pipeline;
mod weather;

use anyhow::{Error, Result};
use clap::Parser;
use cli::{command, Cli, Commands};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "county_weather=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Enrich(args) => match command::enrich(args).await {
            Ok(filename) => println!("File saved to `{}`", filename),
            Err(e) => {
                eprintln!("Error: {:#}", e);
                std::process::exit(1);
            }
        },
        Commands::Fips(args) => match command::fips(args) {
            Ok(codes) => {
                for code in codes {
                    println!("{}", code);
                }
            }
            Err(e) => {
                eprintln!("Error: {:#}", e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
