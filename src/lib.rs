// ============================================================================
// Digimagang content sync library
// ============================================================================

//! Client-side data layer of the Digimagang landing page.
//!
//! Five domain stores (programs, testimonials, eligibility requirements,
//! commission content, contact info) each keep an in-memory snapshot of one
//! remote table, fall back to hardcoded defaults when the remote store is
//! missing, failing or empty, and reconcile the table's change feed for as
//! long as they live.
//!
//! # Examples
//!
//! ```no_run
//! use digimagang::{Site, SiteConfig};
//!
//! # tokio_test::block_on(async {
//! let site = Site::from_config(&SiteConfig::from_env()).unwrap();
//! site.load_all().await;
//!
//! for program in site.programs.get_filtered(digimagang::domains::programs::active) {
//!     println!("{} ({})", program.name, program.duration);
//! }
//! site.dispose();
//! # });
//! ```

pub mod auth;
pub mod config;
pub mod core;
pub mod domains;
pub mod gateway;
pub mod mapping;
pub mod mirror;
pub mod site;
pub mod store;

pub use auth::{AdminGate, AdminSession, AuthError, AuthProvider, RestAuth, Session};
pub use config::{RemoteConfig, SiteConfig};
pub use core::{Result, SyncError};
pub use gateway::{ChangeEvent, ChangeKind, MemoryTable, OrderSpec, RowQuery, TableGateway};
pub use mirror::{FileMirror, MemoryMirror, MirrorCache};
pub use site::{DashboardSummary, Site};
pub use store::{DomainStore, SingletonStore, Snapshot, SnapshotSource, StoreStatus};
