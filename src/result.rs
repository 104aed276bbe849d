//! The `result` module defines the shape every query returns: the resolved pieces of the
//! address hierarchy, the coordinates when the match is precise enough, and the quality code.
//! Result assembly walks the `ref_id` back-pointers from the deepest matched row up to the
//! department.
use crate::database::Database;
use crate::geo::int_to_degree;
use crate::table::text;
use derive_new::new;
use serde::{Deserialize, Serialize};
use strum::{EnumIter, FromRepr};

/// The `Quality` enum grades a query result by the deepest level of the hierarchy the engine
/// resolved. The numeric codes are part of the public surface; coordinates are present only
/// for codes 1 through 4.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_more::Display,
    FromRepr,
    EnumIter,
)]
#[repr(u8)]
pub enum Quality {
    /// The exact street number was found.
    #[display("localisation")]
    Localisation = 1,
    /// The street was found, but not the requested number.
    #[display("voie")]
    Voie = 2,
    /// The street was found and the query carried no number.
    #[display("voie sans numero")]
    VoieSansNumero = 3,
    /// Only the city was found.
    #[display("commune")]
    Commune = 4,
    /// Only the postal code was found.
    #[display("postal")]
    Postal = 5,
    /// Nothing was found.
    #[display("echec")]
    Echec = 6,
}

impl Quality {
    /// The `code` method returns the numeric quality code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// The `has_coordinates` method reports whether results of this quality carry a
    /// position.
    pub fn has_coordinates(self) -> bool {
        self.code() <= 4
    }
}

impl Serialize for Quality {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for Quality {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        Quality::from_repr(code)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid quality code {code}")))
    }
}

/// Resolved department fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct DepartementInfo {
    /// Department code.
    pub code: String,
}

/// Resolved postal-code fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct PostalInfo {
    /// Postal code.
    pub code: i32,
}

/// Resolved commune fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct CommuneInfo {
    /// Display name of the city.
    pub nom: String,
    /// INSEE municipality code.
    pub code_insee: String,
}

/// Resolved voie fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct VoieInfo {
    /// Display name of the street.
    pub nom: String,
}

/// Resolved localisation fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct LocalisationInfo {
    /// The street number.
    pub numero: i16,
}

/// The `Geocoded` struct is the answer to a query. Every field that was not resolved is
/// `None`, and serializes as `null` for the HTTP host to forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geocoded {
    /// Resolved department, if any.
    pub departement: Option<DepartementInfo>,
    /// Resolved postal code, if any.
    pub postal: Option<PostalInfo>,
    /// Resolved commune, if any.
    pub commune: Option<CommuneInfo>,
    /// Resolved voie, if any.
    pub voie: Option<VoieInfo>,
    /// Resolved localisation, if any.
    pub localisation: Option<LocalisationInfo>,
    /// Longitude in decimal degrees, present when `quality` is 4 or better.
    pub longitude: Option<f64>,
    /// Latitude in decimal degrees, present when `quality` is 4 or better.
    pub latitude: Option<f64>,
    /// How deep the match went.
    pub quality: Quality,
}

impl Geocoded {
    fn empty(quality: Quality) -> Self {
        Geocoded {
            departement: None,
            postal: None,
            commune: None,
            voie: None,
            localisation: None,
            longitude: None,
            latitude: None,
            quality,
        }
    }
}

/// The deepest row a query managed to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Status {
    Localisation(i32),
    Voie(i32),
    Commune(i32),
    Postal(i32),
}

/// The `get_output` function builds the result for a match: it takes the coordinates of the
/// deepest matched row and follows the `ref_id` back-pointers to fill the levels above it.
pub(crate) fn get_output(
    database: &Database,
    status: Option<Status>,
    quality: Quality,
) -> Geocoded {
    let mut output = Geocoded::empty(quality);
    let Some(status) = status else {
        return output;
    };

    let mut coordinates = None;
    let mut voie_id = None;
    let mut commune_id = None;
    let mut postal_id = None;

    match status {
        Status::Localisation(row) => {
            let element = database.localisation.get(row);
            coordinates = Some((element.longitude, element.latitude));
            output.localisation = Some(LocalisationInfo::new(element.numero));
            voie_id = Some(element.ref_id);
        }
        Status::Voie(row) => {
            let element = database.voie.get(row);
            coordinates = Some((element.longitude, element.latitude));
            voie_id = Some(row);
        }
        Status::Commune(row) => {
            let element = database.commune.get(row);
            coordinates = Some((element.longitude, element.latitude));
            commune_id = Some(row);
        }
        Status::Postal(row) => {
            postal_id = Some(row);
        }
    }

    if let Some(row) = voie_id {
        let element = database.voie.get(row);
        output.voie = Some(VoieInfo::new(text(&element.nom).to_owned()));
        commune_id = Some(element.ref_id);
    }
    if let Some(row) = commune_id {
        let element = database.commune.get(row);
        output.commune = Some(CommuneInfo::new(
            text(&element.nom).to_owned(),
            text(&element.code_insee).to_owned(),
        ));
        postal_id = Some(element.ref_id);
    }
    if let Some(row) = postal_id {
        let element = database.postal.get(row);
        output.postal = Some(PostalInfo::new(element.code));
        let departement = database.departement.get(element.ref_id);
        output.departement = Some(DepartementInfo::new(text(&departement.code).to_owned()));
    }

    if quality.has_coordinates()
        && let Some((longitude, latitude)) = coordinates
    {
        output.longitude = Some(int_to_degree(longitude));
        output.latitude = Some(int_to_degree(latitude));
    }
    output
}
