//! A transparent read-through cache for an expensive price lookup service.
//!
//! The [`TransparentCache`] wraps a [`PriceService`] and remembers the prices it was asked for,
//! so that repeated lookups of the same item within the configured `max_age` do not have to wait
//! on the underlying service again. A price is never returned once it is older than `max_age`.
//!
//! ## Entry lifecycle
//!
//! Every successful fetch is stored in the [`EntryStore`] together with the instant it was
//! obtained at. Reads check that instant against `max_age` on every access, which is what enforces
//! the freshness contract. In addition, each write spawns a background task that removes exactly
//! that entry once it went stale. That task only bounds memory usage; it never removes a newer
//! entry that was written for the same item in the meantime.
//!
//! ## Batches
//!
//! [`TransparentCache::get_prices`] runs the single item path for every requested item in its own
//! task and waits for all of them. Failing items are logged and dropped from the result, which is
//! in completion order. [`TransparentCache::get_prices_detailed`] and
//! [`TransparentCache::try_get_prices`] are positional alternatives that do report failures.

#[macro_use]
pub mod metrics;

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod service;
pub mod store;

pub use cache::{PriceLookup, TransparentCache};
pub use config::CacheConfig;
pub use error::{PriceError, ServiceError};
pub use service::{PriceService, StaticPriceService};
pub use store::{Entry, EntryStore};
