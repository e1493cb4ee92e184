//! Vector tile generation and merging.
//!
//! Every layer of every country becomes its own PMTiles archive
//! (`pmtiles/indiv/`), the layers of a country are joined into one archive
//! (`pmtiles/country/`), and finally every country is joined into a single
//! archive. Missing layers are skipped rather than treated as errors, since
//! small countries legitimately lack some administrative levels.

mod generate;
mod join;

pub use generate::{
    generate_one, generate_tiles, plan_jobs, tiles_path, tippecanoe_command, TileJob, TileLayer,
};
pub use join::{
    country_tiles_path, join_all_countries, join_one, join_per_country, tile_join_command,
};
