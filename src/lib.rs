#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
mod cli;
mod database;
mod download;
mod error;
mod geo;
mod indexer;
mod kdtree;
mod normalize;
mod paths;
mod query;
mod result;
mod search;
mod similarity;
mod table;

pub use cli::{Cli, Command};
pub use database::Database;
pub use download::{BAN_URL, DEPARTEMENTS, decompress, download};
pub use error::{GeocodeError, GeocodeResult};
pub use geo::{
    FRANCE_EAST, FRANCE_NORTH, FRANCE_SOUTH, FRANCE_WEST, degree_to_int, int_to_degree, spherical,
};
pub use indexer::create_database;
pub use kdtree::{create_kdtree, nearest, pre_order};
pub use normalize::{
    MinedAddress, mine, remove_separators, uniform, uniform_adresse, uniform_commune,
    uniform_words,
};
pub use paths::{Paths, TableKind};
pub use result::{
    CommuneInfo, DepartementInfo, Geocoded, LocalisationInfo, PostalInfo, Quality, VoieInfo,
};
pub use search::{lower_bound, lower_bound_indexed, most_similar};
pub use similarity::Similarity;
pub use table::{
    Commune, Departement, KdNode, Localisation, Postal, Record, Table, TableWriter, Voie, fixed,
    text,
};
