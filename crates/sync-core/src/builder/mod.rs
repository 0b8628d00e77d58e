//! Builder for constructing sync engines.
//!
//! Composes a [`SyncEngine`] from factory functions keyed by implementation
//! name. Every configured implementation that has a factory is constructed
//! (and so validated); only the primary one of each kind is used.

use crate::engine::SyncEngine;
use std::collections::HashMap;
use std::sync::Arc;
use sync_config::Config;
use sync_fulfillment::{FulfillmentError, FulfillmentInterface, FulfillmentService};
use sync_ledger::{FieldMapping, LedgerError, LedgerInterface, LedgerService, Normalizer};
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for every pluggable component.
pub struct SyncFactories<LF, FF> {
	pub ledger_factories: HashMap<String, LF>,
	pub fulfillment_factories: HashMap<String, FF>,
}

/// Constructs every configured implementation that has a factory.
fn build_all<T: ?Sized, E: std::fmt::Display, F>(
	component: &str,
	primary: &str,
	configs: &HashMap<String, toml::Value>,
	factories: &HashMap<String, F>,
) -> Result<HashMap<String, Box<T>>, BuilderError>
where
	F: Fn(&toml::Value) -> Result<Box<T>, E>,
{
	let mut built = HashMap::new();
	for (name, config) in configs {
		let Some(factory) = factories.get(name) else {
			tracing::warn!(component, implementation = %name, "No factory registered, ignoring");
			continue;
		};
		match factory(config) {
			Ok(implementation) => {
				let is_primary = primary == name;
				tracing::info!(component, implementation = %name, enabled = %is_primary, "Loaded");
				built.insert(name.clone(), implementation);
			},
			Err(e) => {
				tracing::error!(
					component,
					implementation = %name,
					error = %e,
					"Failed to create implementation"
				);
				return Err(BuilderError::Config(format!(
					"Failed to create {} implementation '{}': {}",
					component, name, e
				)));
			},
		}
	}
	Ok(built)
}

/// Builder for constructing a SyncEngine with pluggable implementations.
pub struct SyncBuilder {
	config: Config,
}

impl SyncBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	pub fn build<LF, FF>(self, factories: SyncFactories<LF, FF>) -> Result<SyncEngine, BuilderError>
	where
		LF: Fn(&toml::Value) -> Result<Box<dyn LedgerInterface>, LedgerError>,
		FF: Fn(&toml::Value) -> Result<Box<dyn FulfillmentInterface>, FulfillmentError>,
	{
		let ledger_config = &self.config.ledger;
		let mut ledgers = build_all::<dyn LedgerInterface, _, _>(
			"ledger",
			&ledger_config.primary,
			&ledger_config.implementations,
			&factories.ledger_factories,
		)?;
		let ledger_backend = ledgers.remove(&ledger_config.primary).ok_or_else(|| {
			BuilderError::MissingComponent(format!(
				"Primary ledger '{}' has no registered implementation",
				ledger_config.primary
			))
		})?;

		let mapping = FieldMapping::with_overrides(&ledger_config.fields)
			.map_err(|e| BuilderError::Config(e.to_string()))?;
		let ledger = Arc::new(LedgerService::new(
			ledger_backend,
			Normalizer::new(mapping, ledger_config.defaults.clone()),
			ledger_config.page_size,
		));

		let fulfillment_config = &self.config.fulfillment;
		let mut providers = build_all::<dyn FulfillmentInterface, _, _>(
			"fulfillment",
			&fulfillment_config.primary,
			&fulfillment_config.implementations,
			&factories.fulfillment_factories,
		)?;
		let provider = providers.remove(&fulfillment_config.primary).ok_or_else(|| {
			BuilderError::MissingComponent(format!(
				"Primary fulfillment '{}' has no registered implementation",
				fulfillment_config.primary
			))
		})?;
		let fulfillment = Arc::new(FulfillmentService::from_config(provider, fulfillment_config));

		Ok(SyncEngine::new(self.config, ledger, fulfillment))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::str::FromStr;
	use sync_fulfillment::FulfillmentFactory;
	use sync_ledger::LedgerFactory;

	fn factories() -> SyncFactories<LedgerFactory, FulfillmentFactory> {
		SyncFactories {
			ledger_factories: sync_ledger::get_all_implementations()
				.into_iter()
				.map(|(name, f)| (name.to_string(), f))
				.collect(),
			fulfillment_factories: sync_fulfillment::get_all_implementations()
				.into_iter()
				.map(|(name, f)| (name.to_string(), f))
				.collect(),
		}
	}

	const CONFIG: &str = r#"
[sync]
id = "builder-test"

[ledger]
primary = "memory"
[ledger.implementations.memory]
[[ledger.implementations.memory.records]]
ObjectId = "r1"
F00000AL3 = "Pending"
F00000ALE = "A"

[fulfillment]
primary = "mock"
[fulfillment.implementations.mock]
"#;

	#[tokio::test]
	async fn test_build_from_config() {
		let config = Config::from_str(CONFIG).unwrap();
		let engine = SyncBuilder::new(config).build(factories()).unwrap();

		let summary = engine.status_summary().await.unwrap();
		assert_eq!(summary.pending, 1);
		assert_eq!(summary.total, 1);
	}

	#[test]
	fn test_invalid_implementation_config_fails() {
		let config = Config::from_str(&CONFIG.replace(
			"[fulfillment.implementations.mock]",
			"[fulfillment.implementations.mock]\nexisting_orders = \"A\"",
		))
		.unwrap();
		let result = SyncBuilder::new(config).build(factories());
		assert!(matches!(result, Err(BuilderError::Config(_))));
	}

	#[test]
	fn test_unknown_field_override_fails() {
		let config = Config::from_str(&CONFIG.replace(
			"[fulfillment]",
			"[ledger.fields]\nshoe_size = \"F1\"\n\n[fulfillment]",
		))
		.unwrap();
		let result = SyncBuilder::new(config).build(factories());
		assert!(matches!(result, Err(BuilderError::Config(_))));
	}

	#[test]
	fn test_primary_without_factory_is_missing() {
		let config = Config::from_str(CONFIG).unwrap();
		let mut factories = factories();
		factories.fulfillment_factories.clear();
		let result = SyncBuilder::new(config).build(factories);
		assert!(matches!(result, Err(BuilderError::MissingComponent(_))));
	}
}
