//! Registry trait for pluggable implementations.
//!
//! Ledger and fulfillment backends register under the name used for them in
//! the `implementations` tables of the configuration file.

/// Ties a backend to its configuration name and factory.
///
/// `NAME` matches the TOML key, e.g. `"h3"` for
/// `[ledger.implementations.h3]` or `"mock"` for
/// `[fulfillment.implementations.mock]`.
pub trait ImplementationRegistry {
	/// Configuration key of this implementation.
	const NAME: &'static str;

	/// Factory signature of the service this implementation plugs into.
	type Factory;

	/// Returns the factory that builds this implementation from its TOML table.
	fn factory() -> Self::Factory;
}
