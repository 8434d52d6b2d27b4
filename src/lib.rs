//! Ad unit pattern matching for header-bidding page inventory.
//!
//! # Overview
//!
//! Publishers describe their ad units once, as *ad unit patterns*: JSON templates with a
//! `slotPattern` and/or `divPattern` regex and the usual ad unit fields (`mediaTypes`, `bids`, ...).
//! At request time the page describes what it wants filled as [`TransactionObject`]s: an ad server
//! slot path, a div id, a live [`AdServerSlot`], or "every slot on the page".
//!
//! A [`Client`] matches each transaction object to at most one pattern and builds a concrete
//! [`AdUnit`] from it, restricted to the sizes the transaction allows. Within a batch every pattern
//! is used at most once, and when several patterns qualify the first configured one wins.
//!
//! [`PatternStore`] holds validated, precompiled patterns. It is thread-safe and append-only;
//! matching works on a snapshot, so one batch always sees a consistent list of patterns.
//!
//! The building blocks ([`find_matching_patterns`], [`get_to_aup_pair`], [`create_ad_unit`]) are
//! public for hosts that want to drive matching themselves.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum.
//!
//! Batch operations never fail as a whole. An invalid pattern is dropped when added, an invalid
//! transaction object is reported back with its error, and an ad unit that can't be built is left
//! out while its transaction object is still returned. All of these are logged.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate with structured key-values,
//! under the `ppi` target. Ambiguous and missing matches are logged at `warn` level, configuration
//! and synthesis failures at `error` level. Consider integrating a `log`-compatible logger
//! implementation for better visibility into matching decisions.

#![warn(rustdoc::missing_crate_level_docs)]

mod ad_server;
mod ad_unit;
mod amazon;
mod client;
mod config;
mod custom_mapping;
mod display;
mod error;
mod first_party_data;
mod hash;
mod matcher;
mod pattern;
mod pattern_store;
mod resolver;
mod sizes;
mod transaction;

pub use ad_server::{AdServer, AdServerSlot, SlotSize};
pub use ad_unit::{create_ad_unit, AdUnit};
pub use amazon::{create_amazon_slots, AmazonSlot};
pub use client::{Batch, Client, MatchObject, MatchStatus, RequestBidsResult, TransactionResult};
pub use config::{ClientConfig, PatternsConfig, TryParse};
pub use custom_mapping::CustomMapping;
pub use error::{Error, PatternError, Result};
pub use first_party_data::apply_first_party_data;
pub use hash::fnv1a_32;
pub use matcher::find_matching_patterns;
pub use pattern::{AdUnitPattern, PatternRegex};
pub use pattern_store::PatternStore;
pub use resolver::{get_to_aup_pair, MatchResult};
pub use sizes::{filter_sizes_by_intersection, is_size_valid, sort_sizes, Size};
pub use transaction::{
    group_transaction_objects, validate_transaction_objects, DestinationType, HbDestination,
    HbSource, InvalidTransactionObject, Inventory, TransactionGroup, TransactionObject,
    ValidationResult,
};
