//! Update detection for overlay packages
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Overlay   │────▶│   Checker   │────▶│   Pending   │
//! │  (recipes)  │     │ (stages)    │     │   (queue)   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                       │         │
//!                       ▼         ▼
//!              ┌─────────────┐ ┌─────────────┐
//!              │    Cache    │ │   Gentoo    │
//!              │    (TTL)    │ │(version cmp)│
//!              └─────────────┘ └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`checker`]: cache, primary, fallback and generation stages; batch runs
//! - [`cache`]: TTL cache of upstream versions
//! - [`pending`]: queue of detected updates with a status state machine
//! - `store`: atomic JSON persistence shared by both stores
//! - [`gentoo`]: Gentoo version ordering
//! - [`overlay`]: package list and recipe versions
//! - [`generator`]: text-generation provider interface
//! - [`sources`]: candidate upstream URLs
//! - [`types`]: package configuration and check results
//! - [`error`]: error types for stores, overlay access and checks

pub mod cache;
pub mod checker;
pub mod error;
pub mod generator;
pub mod gentoo;
pub mod overlay;
pub mod pending;
pub mod sources;
pub(crate) mod store;
pub mod types;

pub use cache::{Cache, CacheEntry};
pub use checker::Checker;
pub use pending::{PendingQueue, PendingStatus, PendingUpdate};
pub use types::{CheckResult, PackageUpdateSpec, Stage};
