//! Ride Dispatch daemon
//!
//! CLI for running the dispatch server and for acting as a rider client against it.

use anyhow::Context;
use clap::{Parser, Subcommand};
use ride_dispatch::channel::{MessageChannel, SimulatedChannel, TwilioChannel};
use ride_dispatch::client::DispatchClient;
use ride_dispatch::config::Config;
use ride_dispatch::dispatch::DispatchService;
use ride_dispatch::poller::{poll_until_resolved, PollOutcome, PollPolicy};
use ride_dispatch::ride::NewRide;
use ride_dispatch::server;
use ride_dispatch::store::{MemoryStore, RideStore, SqliteStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_SERVER: &str = "http://localhost:3001";

/// Ride Dispatch - SMS driver dispatch
#[derive(Parser)]
#[command(name = "ride-dispatch")]
#[command(about = "Text ride requests to a driver and track their replies")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dispatch server
    Serve {
        /// Port to listen on (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Driver phone number (overrides DRIVER_PHONE_NUMBER)
        #[arg(long)]
        driver_phone: Option<String>,

        /// SQLite database file (overrides RIDE_DISPATCH_DB)
        #[arg(long, conflicts_with = "persist")]
        db: Option<PathBuf>,

        /// Persist rides in the default data directory
        #[arg(long)]
        persist: bool,
    },

    /// Request a ride and wait for the driver's answer
    Request {
        #[arg(long)]
        rider_id: String,

        #[arg(long)]
        rider_name: String,

        #[arg(long)]
        pickup: String,

        #[arg(long)]
        dropoff: String,

        /// Estimated fare
        #[arg(long)]
        fare: f64,

        /// Use this ride ID instead of a server-generated one
        #[arg(long)]
        ride_id: Option<String>,

        /// Server base URL
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,

        /// Seconds between status polls
        #[arg(long)]
        interval: Option<u64>,

        /// Seconds to wait before giving up
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Show the status of a ride
    Status {
        ride_id: String,

        /// Server base URL
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve {
            port,
            driver_phone,
            db,
            persist,
        } => cmd_serve(port, driver_phone, db, persist).await,
        Commands::Request {
            rider_id,
            rider_name,
            pickup,
            dropoff,
            fare,
            ride_id,
            server,
            interval,
            timeout,
        } => {
            let ride = NewRide {
                rider_id,
                rider_name,
                pickup_location: pickup,
                dropoff_location: dropoff,
                estimated_fare: fare,
            };
            // Client side only; server environment variables do not apply
            let mut policy = PollPolicy::default();
            if let Some(secs) = interval {
                policy.interval = Duration::from_secs(secs);
            }
            if let Some(secs) = timeout {
                policy.timeout = Duration::from_secs(secs);
            }
            cmd_request(&server, ride, ride_id, policy).await
        }
        Commands::Status { ride_id, server } => cmd_status(&server, &ride_id).await,
    }
}

// ============================================================================
// CLI Commands
// ============================================================================

async fn cmd_serve(
    port: Option<u16>,
    driver_phone: Option<String>,
    db: Option<PathBuf>,
    persist: bool,
) -> anyhow::Result<()> {
    let mut config = Config::from_env()?;
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(phone) = driver_phone {
        config.driver_phone = phone;
    }
    if db.is_some() {
        config.db_path = db;
    } else if persist {
        config.db_path = Some(Config::default_db_path()?);
    }

    let store: Arc<dyn RideStore> = match &config.db_path {
        Some(path) => {
            info!(path = %path.display(), "Using SQLite ride store");
            Arc::new(
                SqliteStore::open(path)
                    .with_context(|| format!("opening ride database {}", path.display()))?,
            )
        }
        None => {
            info!("Using in-memory ride store");
            Arc::new(MemoryStore::new())
        }
    };

    let channel: Arc<dyn MessageChannel> = match config.twilio.clone() {
        Some(twilio) => Arc::new(TwilioChannel::new(twilio)?),
        None => {
            warn!("Twilio not configured, outbound SMS will be simulated");
            Arc::new(SimulatedChannel)
        }
    };

    let dispatch = Arc::new(DispatchService::new(
        store,
        channel,
        &config.driver_phone,
        config.retention,
    ));
    info!(
        driver = %dispatch.driver_phone(),
        channel = dispatch.channel_name(),
        retention_minutes = config.retention.num_minutes(),
        "Dispatch service ready"
    );

    let sweeper = dispatch.start_sweeper(config.sweep_interval);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("binding port {}", config.port))?;

    let result = server::serve(listener, Arc::clone(&dispatch), shutdown_signal()).await;

    sweeper.stop().await;
    info!("Dispatch service stopped");
    result.map_err(Into::into)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

async fn cmd_request(
    server: &str,
    ride: NewRide,
    ride_id: Option<String>,
    policy: PollPolicy,
) -> anyhow::Result<()> {
    let client = DispatchClient::new(server)?;
    let sent = client.send_notification(ride, ride_id).await?;
    let ride_id = sent
        .ride_id
        .context("server did not return a ride ID")?;

    println!("{} (ride {})", sent.message, ride_id);
    if sent.simulated {
        println!("Note: SMS delivery was simulated");
    }
    println!("Waiting for driver (polling every {:?}, up to {:?})...", policy.interval, policy.timeout);

    let outcome = poll_until_resolved(&client, &ride_id, policy).await?;
    match outcome {
        PollOutcome::Resolved(status) => println!("Driver response: {}", status),
        PollOutcome::TimedOut => println!(
            "No response from driver, treating ride as {}",
            outcome.effective_status()
        ),
    }

    Ok(())
}

async fn cmd_status(server: &str, ride_id: &str) -> anyhow::Result<()> {
    let client = DispatchClient::new(server)?;
    let ride = client.ride_status(ride_id).await?;

    println!("Ride {}: {}", ride.id, ride.status);
    println!("  Rider:   {} ({})", ride.rider_name, ride.rider_id);
    println!("  Pickup:  {}", ride.pickup_location);
    println!("  Dropoff: {}", ride.dropoff_location);
    println!("  Fare:    {}", ride.fare_display());
    println!("  Created: {}", ride.created_at.to_rfc3339());

    Ok(())
}
