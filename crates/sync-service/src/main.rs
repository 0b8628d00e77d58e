//! Main entry point for the order sync service.
//!
//! Moves orders from the source ledger to the fulfillment provider and pulls
//! tracking back. Passes run on an hourly schedule, through the HTTP API, or
//! once from the command line.

use clap::Parser;
use scheduler::Pass;
use std::path::PathBuf;
use std::sync::Arc;
use sync_config::Config;
use sync_core::{SyncBuilder, SyncEngine, SyncFactories};

mod apis;
mod scheduler;
mod server;

// Import implementations from individual crates
use sync_fulfillment::implementations::giga::create_fulfillment as create_giga_fulfillment;
use sync_fulfillment::implementations::mock::create_fulfillment as create_mock_fulfillment;
use sync_ledger::implementations::h3::create_ledger as create_h3_ledger;
use sync_ledger::implementations::memory::create_ledger as create_memory_ledger;

/// Command-line arguments for the sync service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	/// Run a single pass, print its report and exit
	#[arg(long, value_enum)]
	once: Option<Pass>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	let default_directive = args.log_level.to_string();
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	let config = Config::from_file(&args.config.to_string_lossy()).await?;
	tracing::info!("Loaded configuration [{}]", config.sync.id);

	let engine = Arc::new(build_engine(config.clone())?);

	if let Some(pass) = args.once {
		tracing::info!(pass = ?pass, "Running single pass");
		let report = pass.run(&engine).await?;
		println!("{}", serde_json::to_string_pretty(&report)?);
		return Ok(());
	}

	let api_config = config.api.clone().filter(|api| api.enabled);
	let schedule = config.schedule.clone().filter(|s| s.enabled);

	if api_config.is_none() && schedule.is_none() {
		tracing::warn!("Neither the API nor the scheduler is enabled, nothing to run");
		return Ok(());
	}

	let api_task = async {
		match api_config {
			Some(api_config) => server::start_server(api_config, Arc::clone(&engine)).await,
			None => std::future::pending().await,
		}
	};
	let scheduler_task = async {
		match schedule {
			Some(schedule) => scheduler::run_scheduler(schedule, Arc::clone(&engine)).await,
			None => std::future::pending().await,
		}
	};

	tracing::info!("Started sync service");
	tokio::select! {
		result = api_task => {
			tracing::info!("API server finished");
			result?;
		}
		_ = scheduler_task => {
			tracing::info!("Scheduler finished");
		}
		_ = tokio::signal::ctrl_c() => {
			tracing::info!("Received shutdown signal");
		}
	}

	tracing::info!("Stopped sync service");
	Ok(())
}

/// Macro to create a factory HashMap with the appropriate type aliases
macro_rules! create_factory_map {
    ($interface:path, $error:path, $( $name:literal => $factory:expr ),* $(,)?) => {{
        let mut factories = std::collections::HashMap::new();
        $(
            factories.insert(
                $name.to_string(),
                $factory as fn(&toml::Value) -> Result<Box<dyn $interface>, $error>
            );
        )*
        factories
    }};
}

/// Builds the sync engine with every available ledger and fulfillment
/// implementation registered.
pub(crate) fn build_engine(config: Config) -> Result<SyncEngine, Box<dyn std::error::Error>> {
	let builder = SyncBuilder::new(config);

	let ledger_factories = create_factory_map!(
		sync_ledger::LedgerInterface,
		sync_ledger::LedgerError,
		"h3" => create_h3_ledger,
		"memory" => create_memory_ledger,
	);

	let fulfillment_factories = create_factory_map!(
		sync_fulfillment::FulfillmentInterface,
		sync_fulfillment::FulfillmentError,
		"giga" => create_giga_fulfillment,
		"mock" => create_mock_fulfillment,
	);

	let factories = SyncFactories {
		ledger_factories,
		fulfillment_factories,
	};

	Ok(builder.build(factories)?)
}
