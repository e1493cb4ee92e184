//! Downloads of administrative boundaries and building footprints.
//!
//! This module provides:
//! - Boundary downloads per country and level from geoBoundaries (`admin`)
//! - Building footprint downloads from the EUBUCCO listing (`buildings`)
//! - A shared streaming HTTP session (`http`)
//! - Byte-level progress reporting (`progress`)
//!
//! # Architecture
//!
//! ```text
//! download_admin ──┐                  ┌── HttpFetcher (one per stage)
//!                  ├── try_join_all ──┤
//! download_buildings┘                 └── ProgressReporter (per transfer)
//! ```
//!
//! Every country/level pair is fetched concurrently on one session. The first
//! failure fails the whole stage. Results are keyed by country code.

mod admin;
mod buildings;
mod error;
mod http;
mod metadata;
mod progress;

pub use admin::{admin_file_name, download_admin, download_admin_level};
pub use buildings::{
    buildings_file_name, download_buildings, download_buildings_one, fetch_building_links,
};
pub use error::{DownloadError, DownloadResult};
pub use http::{HttpFetcher, BUFFER_SIZE};
pub use metadata::{building_links, country_code_from_name, AdminMetadata, CountryDataset};
pub use progress::{ByteCounter, NoProgress, ProgressReporter, TransferProgress};
