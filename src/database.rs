//! The `database` module assembles the nine memory-mapped tables into one `Database` value.
//!
//! The database is built once by the indexing pipeline and treated as immutable afterwards.
//! A `Database` is an explicit value owned by the caller: queries borrow it read-only, so any
//! number of them may run in parallel threads without locking.
use crate::error::GeocodeResult;
use crate::paths::{Paths, TableKind};
use crate::table::{Commune, Departement, KdNode, Localisation, Postal, Table, Voie};
use tracing::info;

/// The `Database` struct holds the read-only view over every table of one database
/// directory. All queries go through [`Database::position`](crate::Database::position) and
/// [`Database::reverse`](crate::Database::reverse); the tables are public for inspection and
/// tests.
#[derive(Debug)]
pub struct Database {
    /// Department table, sorted by code.
    pub departement: Table<Departement>,
    /// Postal-code table, grouped by department.
    pub postal: Table<Postal>,
    /// Commune table, grouped by postal code.
    pub commune: Table<Commune>,
    /// Voie table, grouped by commune.
    pub voie: Table<Voie>,
    /// Localisation table, grouped by voie and sorted by numero within each group.
    pub localisation: Table<Localisation>,
    /// Code-sorted row order over the postal table.
    pub postal_index: Table<i32>,
    /// Name-sorted row order over the commune table.
    pub commune_index: Table<i32>,
    /// Name-sorted row order over the voie table.
    pub voie_index: Table<i32>,
    /// Packed k-d tree over the localisation table.
    pub kdtree: Table<KdNode>,
}

impl Database {
    /// The `open` method memory-maps the nine tables under the database directory of
    /// `paths`. Both the `index` and `reverse` build steps must have run there.
    pub fn open(paths: &Paths) -> GeocodeResult<Self> {
        let database = Database {
            departement: Table::open(paths.table(TableKind::Departement))?,
            postal: Table::open(paths.table(TableKind::Postal))?,
            commune: Table::open(paths.table(TableKind::Commune))?,
            voie: Table::open(paths.table(TableKind::Voie))?,
            localisation: Table::open(paths.table(TableKind::Localisation))?,
            postal_index: Table::open(paths.table(TableKind::PostalIndex))?,
            commune_index: Table::open(paths.table(TableKind::CommuneIndex))?,
            voie_index: Table::open(paths.table(TableKind::VoieIndex))?,
            kdtree: Table::open(paths.table(TableKind::Kdtree))?,
        };
        info!(
            "Database opened: {} communes, {} voies, {} localisations.",
            database.commune.len(),
            database.voie.len(),
            database.localisation.len(),
        );
        Ok(database)
    }
}
