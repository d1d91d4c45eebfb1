//! # Admin Resilience
//!
//! A tolerant normalization layer between an admin UI and a REST backend
//! whose response shapes, asset paths, and permission schemas drift between
//! endpoints and versions.
//!
//! The pure logic (shape extraction, asset candidates, permission checks)
//! lives in [`admin_resilience_core`]. This crate adds the runtime pieces:
//! configuration, the tokio-based request coalescer, and the reqwest-backed
//! client and asset probe.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌─────────┐   ┌───────────┐
//! │  View    │──▶│ Coalescer  │──▶│  HTTP   │──▶│ Extractor │──▶ records
//! └──────────┘   └────────────┘   └─────────┘   └───────────┘
//!      │
//!      ├──▶ Resolver   (asset reference → candidate URLs → first that loads)
//!      └──▶ Permissions (role record → allow / deny)
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`coalesce`] | In-flight and burst-window request de-duplication |
//! | [`client`] | Coalescing HTTP client with tolerant extraction |
//! | [`probe`] | HTTP-backed asset probe |
//! | [`inspect`] | Offline extraction from saved responses |
//! | [`assets_cmd`] | Candidate listing and resolution commands |
//! | [`access`] | Permission evaluation command |
//! | [`fetch`] | Live collection fetch command |

pub mod access;
pub mod assets_cmd;
pub mod client;
pub mod coalesce;
pub mod config;
pub mod fetch;
pub mod inspect;
pub mod probe;

pub use admin_resilience_core::{assets, extract, models, permissions};
