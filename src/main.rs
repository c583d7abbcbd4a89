//! CLI interface for rust-fares

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_fares::config::Settings;
use rust_fares::logging::init_logging;
use rust_fares::server::cors_layer;
use rust_fares::{
    app, assemble_booking, render_confirmation, AppState, FareProvider, FlightOffer,
    PassengerDetails, PlainTextRenderer, PricingClient, SearchQuery,
};
use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "rust-fares")]
#[command(about = "Flight fare search proxy and booking confirmations")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP proxy
    Serve {
        /// Listen port (overrides configuration)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Look up city suggestions
    Cities {
        /// Part of a city name or code
        term: String,
    },
    /// Search for fares
    Search {
        /// Origin city code
        #[arg(short, long)]
        from: String,
        /// Destination city code
        #[arg(short, long)]
        to: String,
        /// Departure date (YYYY-MM-DD)
        #[arg(short, long)]
        date: String,
        /// Return date for round trips (YYYY-MM-DD)
        #[arg(short, long)]
        return_date: Option<String>,
        /// Number of adults
        #[arg(long, default_value = "1")]
        adults: i64,
        /// Output file for JSON results
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Render a booking confirmation from JSON files
    Book {
        /// Selected offer as JSON
        #[arg(long)]
        flight: String,
        /// Passenger details as JSON
        #[arg(long)]
        passenger: String,
        /// Output file for the confirmation
        #[arg(short, long, default_value = "booking-confirmation.txt")]
        output: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load().context("Failed to load configuration")?;
    init_logging(&settings.logging)?;
    settings.log_notices();

    match cli.command {
        Commands::Serve { port } => serve(settings, port).await,
        Commands::Cities { term } => {
            let client = PricingClient::new(settings.provider.to_provider_config())?;
            let cities = client.lookup_cities(&term).await?;
            println!("{}", serde_json::to_string_pretty(&cities)?);
            Ok(())
        }
        Commands::Search {
            from,
            to,
            date,
            return_date,
            adults,
            output,
        } => {
            let request = SearchQuery {
                origin: Some(from),
                destination: Some(to),
                depart_date: Some(date),
                return_date,
                adults: Some(adults),
            }
            .validate()?;

            let client = PricingClient::new(settings.provider.to_provider_config())?;
            let results = client.search_fares(&request).await?;
            let json = serde_json::to_string_pretty(&results)?;

            match output {
                Some(output_file) => {
                    fs::write(&output_file, &json)?;
                    println!("Results saved to {}", output_file);
                }
                None => println!("{}", json),
            }

            let offers = results.offers(&request.origin);
            println!("\nFound {} offers", offers.len());
            if let Some(cheapest) = offers.first() {
                println!(
                    "First offer: {} -> {} for {}",
                    cheapest.field(&["origin"]).unwrap_or_default(),
                    cheapest.field(&["destination"]).unwrap_or_default(),
                    cheapest.field(&["price", "value"]).unwrap_or_default()
                );
            }
            Ok(())
        }
        Commands::Book {
            flight,
            passenger,
            output,
        } => {
            let flight: FlightOffer = serde_json::from_str(
                &fs::read_to_string(&flight).with_context(|| format!("Failed to read {}", flight))?,
            )?;
            let passenger: PassengerDetails = serde_json::from_str(
                &fs::read_to_string(&passenger)
                    .with_context(|| format!("Failed to read {}", passenger))?,
            )?;

            let record = assemble_booking(Some(flight), Some(passenger))?;
            let document = render_confirmation(&record, &PlainTextRenderer)?;
            fs::write(&output, document)?;
            println!("Confirmation written to {}", output);
            Ok(())
        }
    }
}

async fn serve(settings: Settings, port: Option<u16>) -> Result<()> {
    let client = PricingClient::new(settings.provider.to_provider_config())?;
    let state = AppState::new(Arc::new(client));
    let cors = cors_layer(settings.server.allowed_origin.as_deref())
        .context("Invalid allowed origin")?;
    let router = app(state, cors);

    let port = port.unwrap_or(settings.server.port);
    let addr: SocketAddr = format!("{}:{}", settings.server.host, port)
        .parse()
        .context("Invalid listen address")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "Server running");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
