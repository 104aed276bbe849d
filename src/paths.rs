//! The `paths` module lays out the data directory: raw per-department csv files under `raw/`,
//! and one binary file per table under `database/`.
use std::path::{Path, PathBuf};

/// The `TableKind` enum names the nine tables of the database. The display form is the file
/// stem of the corresponding table file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum TableKind {
    /// Department table.
    #[display("departement")]
    Departement,
    /// Postal-code table.
    #[display("postal")]
    Postal,
    /// Commune table.
    #[display("commune")]
    Commune,
    /// Voie table.
    #[display("voie")]
    Voie,
    /// Localisation table.
    #[display("localisation")]
    Localisation,
    /// Code-sorted index over the postal table.
    #[display("postal_index")]
    PostalIndex,
    /// Name-sorted index over the commune table.
    #[display("commune_index")]
    CommuneIndex,
    /// Name-sorted index over the voie table.
    #[display("voie_index")]
    VoieIndex,
    /// Packed k-d tree over the localisation table.
    #[display("kdtree")]
    Kdtree,
}

/// The `Paths` struct resolves every file of a data directory from its base path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    base: PathBuf,
}

impl Paths {
    /// The `new` method anchors the layout at `base`.
    pub fn new<P: AsRef<Path>>(base: P) -> Self {
        Paths {
            base: base.as_ref().to_path_buf(),
        }
    }

    /// The `raw` method returns the directory holding the per-department csv files.
    pub fn raw(&self) -> PathBuf {
        self.base.join("raw")
    }

    /// The `database` method returns the directory holding the binary tables.
    pub fn database(&self) -> PathBuf {
        self.base.join("database")
    }

    /// The `table` method returns the path of one table file.
    pub fn table(&self, kind: TableKind) -> PathBuf {
        self.database().join(format!("{kind}.dat"))
    }
}
