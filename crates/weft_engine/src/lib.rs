//! The Weft ECS world runtime.
//!
//! This crate provides:
//! - [`World`] - The runtime owning entities, systems, and observers
//! - [`QueryBuilder`] / [`QuerySpec`] - Cached, indexed set-algebra queries
//! - [`System`] - Scheduled per-tick behavior with dependency ordering
//! - [`Observer`] - Deferred reactive handlers over component changes
//! - [`Host`] - The small host-side integration seam

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod host;
pub mod observer;
pub mod query;
pub mod schedule;
pub mod system;
pub mod world;

pub use host::{Host, NullHost};
pub use observer::{ComponentEvent, Observer};
pub use query::{plan, CacheStats, QueryBuilder, QueryCache, QuerySpec};
pub use schedule::{Scheduler, SystemEntry};
pub use system::{SubSystem, SubSystemFn, System, SystemConfig, SystemDeps};
pub use world::{World, WorldConfig, WorldEvent};
