//! Salonbook repair CLI
//!
//! Operational entry point for a salonbook Postgres store: re-derive the
//! appointment index from tickets, or fill an empty store with sample data.

mod seed;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use salonbook::{AppointmentRebuilder, PgDocumentStore, SalonConfig};
use std::process;

use crate::seed::SeedCounts;

#[derive(Parser)]
#[command(name = "salonbook-repair")]
#[command(about = "Seed and repair tool for salonbook stores")]
#[command(version = "0.1.0")]
struct Cli {
    /// Database connection URL
    #[arg(long)]
    database_url: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the appointment index from tickets and their service items
    Rebuild {
        /// Tickets to scan (default: rebuild.max_tickets from config)
        #[arg(long)]
        max_tickets: Option<usize>,
    },

    /// Create sample tickets, then rebuild the appointment index
    Seed {
        /// Number of tickets to create
        #[arg(long, default_value = "3")]
        tickets: usize,

        /// Coroutines creating tickets concurrently, each with its own connection
        #[arg(long, default_value = "1")]
        workers: usize,
    },
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = SalonConfig::load().context("loading configuration")?;
    let database_url = cli
        .database_url
        .or_else(|| config.database.url.clone())
        .or_else(|| std::env::var("SALONBOOK_DATABASE_URL").ok())
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .ok_or_else(|| {
            anyhow!(
                "Database URL not provided. Use --database-url, set database.url in config, \
                 or set SALONBOOK_DATABASE_URL or DATABASE_URL."
            )
        })?;

    match cli.command {
        Commands::Rebuild { max_tickets } => {
            let store = PgDocumentStore::connect(&database_url).context("connecting to database")?;
            let max_tickets = max_tickets.unwrap_or(config.rebuild.max_tickets);
            let report = AppointmentRebuilder::from_config(&store, &config.rebuild).rebuild(max_tickets)?;
            println!("{report}");
        }
        Commands::Seed { tickets, workers } => {
            let counts = handle_seed(&database_url, &config, tickets, workers)?;
            println!(
                "Seed complete. Tickets created: {}, appointments upserted: {}, services completed: {}",
                counts.tickets, counts.appointments, counts.completions
            );

            let store = PgDocumentStore::connect(&database_url).context("connecting to database")?;
            let report = AppointmentRebuilder::from_config(&store, &config.rebuild)
                .rebuild(config.rebuild.max_tickets)?;
            println!("{report}");
        }
    }
    Ok(())
}

fn handle_seed(database_url: &str, config: &SalonConfig, tickets: usize, workers: usize) -> Result<SeedCounts> {
    if workers == 0 {
        bail!("--workers must be at least 1");
    }
    let workers = workers.min(tickets.max(1));

    let mut handles = Vec::with_capacity(workers);
    for worker in 0..workers {
        // spread the remainder over the first workers
        let share = tickets / workers + usize::from(worker < tickets % workers);
        let url = database_url.to_string();
        let config = config.clone();
        handles.push(may::go!(move || -> Result<SeedCounts> {
            let store = PgDocumentStore::connect(&url)
                .with_context(|| format!("worker {worker}: connecting to database"))?;
            let counts = seed::seed_tickets(&store, &config, share)
                .with_context(|| format!("worker {worker}: seeding"))?;
            log::debug!("worker {worker} created {} ticket(s)", counts.tickets);
            Ok(counts)
        }));
    }

    let mut total = SeedCounts::default();
    for (worker, handle) in handles.into_iter().enumerate() {
        match handle.join() {
            Ok(result) => total += result?,
            Err(_) => bail!("worker {worker} panicked"),
        }
    }
    Ok(total)
}
