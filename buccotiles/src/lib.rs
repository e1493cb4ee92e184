//! buccotiles - building footprint tiles and geospatial format benchmarks
//!
//! This library drives the batch jobs that turn the EUBUCCO building
//! footprints and geoBoundaries administrative boundaries into a single
//! PMTiles archive, and the harness that compares GeoPackage, GeoParquet
//! and FlatGeobuf read performance.
//!
//! The heavy lifting lives in external tools (`duckdb`, `ogr2ogr`,
//! `tippecanoe`, `tile-join`) and an S3-compatible object store. This crate
//! assembles their inputs, runs them, and keeps track of what each country
//! has produced so far.
//!
//! # Pipeline
//!
//! ```text
//! download (admin, buildings) ─► convert ─► tiles ─► join per country ─► join all ─► upload
//!        async, tokio              rayon     rayon          rayon          single     object_store
//! ```

pub mod area;
pub mod bench;
pub mod command;
pub mod config;
pub mod convert;
pub mod country;
pub mod download;
pub mod logging;
pub mod pipeline;
pub mod pool;
pub mod stage;
pub mod tiles;
pub mod upload;
pub mod zoom;
