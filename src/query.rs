//! The `query` module implements the two public lookups over an open [`Database`]: the
//! forward `position` search, postal code down to street number with fuzzy fallbacks at each
//! level, and the `reverse` nearest-address search over the packed k-d tree.
//!
//! The query path is infallible: every outcome, including unusable input, is expressed
//! through the quality code of the result.
use crate::database::Database;
use crate::kdtree;
use crate::normalize::{self, MinedAddress};
use crate::result::{Geocoded, Quality, Status, get_output};
use crate::search::{lower_bound, lower_bound_indexed, most_similar};
use crate::similarity::Similarity;
use crate::table::text;

/// Largest distance between the searched postal code and an accepted near miss.
const POSTAL_TOLERANCE: i32 = 5;

/// The `preprocess` function reduces the raw query inputs to the comparable forms stored in
/// the database: an integer postal code, a normalized city name, and the mined pieces of the
/// free-form address line.
fn preprocess(
    code_postal: Option<&str>,
    commune: Option<&str>,
    adresse: Option<&str>,
) -> (Option<i32>, Option<String>, MinedAddress) {
    let code_postal = code_postal.and_then(|code| code.trim().parse::<i32>().ok());
    let commune = commune.map(normalize::uniform_commune);
    let mined = adresse.map(normalize::mine).unwrap_or_default();
    (code_postal, commune, mined)
}

/// The `heuristics` function runs the similarity scan over a narrow candidate window, and
/// over the wide one only when the narrow scan did not clear its threshold.
fn heuristics(
    narrow: (i32, i32, f64),
    wide: Option<(i32, i32, f64)>,
    mut score: impl FnMut(i32) -> f64,
) -> Option<i32> {
    let (start, end, threshold) = narrow;
    if let Some((value, _, row)) = most_similar(start..end, &mut score)
        && value >= threshold
    {
        return Some(row);
    }
    let (start, end, threshold) = wide?;
    let (value, _, row) = most_similar(start..end, &mut score)?;
    (value >= threshold).then_some(row)
}

impl Database {
    /// The `position` method finds the position of the given address over the surface of the
    /// Earth.
    ///
    /// Every argument is optional; whatever is present narrows the search. The result's
    /// quality code reports how deep the match went, 1 (exact street number) through 6
    /// (nothing found). The engine tolerates spelling errors in the city and street names
    /// through similarity scoring, and small errors in the postal code.
    ///
    /// Note: the public HTTP front-end short-circuits the Monegasque `98000` before reaching
    /// the engine; this method answers it like any other code.
    #[tracing::instrument(skip(self))]
    pub fn position(
        &self,
        code_postal: Option<&str>,
        commune: Option<&str>,
        adresse: Option<&str>,
    ) -> Geocoded {
        let (code_postal, commune, mined) = preprocess(code_postal, commune, adresse);
        let commune = commune.as_deref();
        let voie = mined.voie.as_deref();
        let voie_type = mined.voie_type.as_deref();

        let postal_id = self.select_code_postal(code_postal);
        let commune_id = self
            .select_commune(postal_id, commune)
            .or_else(|| self.complete_commune_selection(commune));
        let voie_id = self
            .select_voie(commune_id, voie, voie_type)
            .or_else(|| self.complete_voie_selection(code_postal, commune, voie));
        let localisation_id = self.select_localisation(voie_id, mined.numero);

        let (status, quality) = if let Some(row) = localisation_id {
            (Some(Status::Localisation(row)), Quality::Localisation)
        } else if let Some(row) = voie_id {
            let quality = match mined.numero {
                Some(_) => Quality::Voie,
                None => Quality::VoieSansNumero,
            };
            (Some(Status::Voie(row)), quality)
        } else if let Some(row) = commune_id {
            (Some(Status::Commune(row)), Quality::Commune)
        } else if let Some(row) = postal_id {
            (Some(Status::Postal(row)), Quality::Postal)
        } else {
            (None, Quality::Echec)
        };
        get_output(self, status, quality)
    }

    /// The `reverse` method finds the nearest known address to a `(longitude, latitude)`
    /// position, both in decimal degrees.
    #[tracing::instrument(skip(self))]
    pub fn reverse(&self, position: (f64, f64)) -> Geocoded {
        match kdtree::nearest(&self.kdtree, position) {
            Some((node, _)) => {
                let row = self.kdtree.get(node).ref_id;
                get_output(self, Some(Status::Localisation(row)), Quality::Localisation)
            }
            None => get_output(self, None, Quality::Echec),
        }
    }

    /// Resolves the postal code row through the code-sorted index. An exact miss still
    /// accepts the nearest neighbouring code within [`POSTAL_TOLERANCE`].
    fn select_code_postal(&self, code_postal: Option<i32>) -> Option<i32> {
        let element = code_postal?;
        let len = self.postal_index.len() as i32;
        if len == 0 {
            return None;
        }
        let (i, row) = lower_bound_indexed(&self.postal_index, |row| {
            self.postal.get(row).code < element
        });
        if i < len && self.postal.get(row).code == element {
            return Some(row);
        }

        let mut best: Option<(i32, i32)> = None;
        for position in (i - 1).max(0)..(i + 1).min(len) {
            let candidate = self.postal_index.get(position);
            let difference = (self.postal.get(candidate).code - element).abs();
            if best.is_none_or(|(smallest, _)| difference < smallest) {
                best = Some((difference, candidate));
            }
        }
        let (difference, row) = best?;
        (difference <= POSTAL_TOLERANCE).then_some(row)
    }

    /// Resolves the commune row within the postal code's range, falling back to the
    /// similarity scan when the exact name is absent.
    fn select_commune(&self, postal_id: Option<i32>, commune: Option<&str>) -> Option<i32> {
        let postal_id = postal_id?;
        let commune = commune?;
        let element = self.postal.get(postal_id);
        let (start, end) = (element.start, element.end);

        let i = lower_bound(start, end, |row| {
            text(&self.commune.get(row).normalise) < commune
        });
        if i < end && text(&self.commune.get(i).normalise) == commune {
            return Some(i);
        }

        let similarity = Similarity::new(commune);
        let narrow = ((i - 2).max(start), (i + 2).min(end), 0.7);
        let wide = Some((start, end, 0.5));
        heuristics(narrow, wide, |row| {
            similarity.score(text(&self.commune.get(row).normalise))
        })
    }

    /// Resolves the commune over the entire commune table, the option left once
    /// [`Database::select_commune`] has failed.
    fn complete_commune_selection(&self, commune: Option<&str>) -> Option<i32> {
        let commune = commune?;
        let len = self.commune_index.len() as i32;
        if len == 0 {
            return None;
        }
        let (i, row) = lower_bound_indexed(&self.commune_index, |row| {
            text(&self.commune.get(row).normalise) < commune
        });
        if text(&self.commune.get(row).normalise) == commune {
            return Some(row);
        }

        let similarity = Similarity::new(commune);
        let candidates =
            ((i - 2).max(0)..(i + 2).min(len)).map(|position| self.commune_index.get(position));
        let (score, _, row) = most_similar(candidates, |row| {
            similarity.score(text(&self.commune.get(row).normalise))
        })?;
        (score >= 0.7).then_some(row)
    }

    /// Resolves the voie row within the commune's range. On an exact miss, the narrow
    /// similarity window covers the streets sharing the query's street type around the
    /// insertion point, and the wide one the whole commune.
    fn select_voie(
        &self,
        commune_id: Option<i32>,
        voie: Option<&str>,
        voie_type: Option<&str>,
    ) -> Option<i32> {
        let commune_id = commune_id?;
        let voie = voie?;
        let element = self.commune.get(commune_id);
        let (start, end) = (element.start, element.end);

        let i = lower_bound(start, end, |row| {
            text(&self.voie.get(row).normalise) < voie
        });
        if i < end && text(&self.voie.get(i).normalise) == voie {
            return Some(i);
        }

        let (mut low, mut high) = (i - 1, i);
        if let Some(voie_type) = voie_type {
            while low >= start && text(&self.voie.get(low).normalise).starts_with(voie_type) {
                low -= 1;
            }
            low += 1;
            while high < end && text(&self.voie.get(high).normalise).starts_with(voie_type) {
                high += 1;
            }
        }
        let narrow = if high - low > 1 {
            (low, high, 0.6)
        } else {
            ((i - 3).max(start), (i + 3).min(end), 0.6)
        };

        let similarity = Similarity::new(voie);
        heuristics(narrow, Some((start, end, 0.4)), |row| {
            similarity.score(text(&self.voie.get(row).normalise))
        })
    }

    /// Resolves the voie over the entire voie table, the option left once
    /// [`Database::select_voie`] has failed. Candidates sharing the searched name are ranked
    /// by the similarity of their parent commune, then by postal-code proximity.
    fn complete_voie_selection(
        &self,
        code_postal: Option<i32>,
        commune: Option<&str>,
        voie: Option<&str>,
    ) -> Option<i32> {
        let voie = voie?;
        let len = self.voie_index.len() as i32;
        if len == 0 {
            return None;
        }
        let (i, row) = lower_bound_indexed(&self.voie_index, |row| {
            text(&self.voie.get(row).normalise) < voie
        });
        let exact = text(&self.voie.get(row).normalise) == voie;

        // With nothing else to compare on, only an exact name matters.
        if code_postal.is_none() && commune.is_none() {
            return exact.then_some(row);
        }

        let voie_rows: Vec<i32> = if exact {
            let mut j = i;
            while j < len && text(&self.voie.get(self.voie_index.get(j)).normalise) == voie {
                j += 1;
            }
            (i..j).map(|position| self.voie_index.get(position)).collect()
        } else {
            ((i - 2).max(0)..(i + 2).min(len))
                .map(|position| self.voie_index.get(position))
                .collect()
        };
        let commune_rows: Vec<i32> = voie_rows
            .iter()
            .map(|&row| self.voie.get(row).ref_id)
            .collect();

        if let Some(commune) = commune {
            let similarity = Similarity::new(commune);
            if let Some((score, rank, _)) = most_similar(commune_rows.iter().copied(), |row| {
                similarity.score(text(&self.commune.get(row).normalise))
            }) && score >= 0.7
            {
                return Some(voie_rows[rank]);
            }
        }

        if let Some(code_postal) = code_postal {
            for (rank, &commune_row) in commune_rows.iter().enumerate() {
                let postal_row = self.commune.get(commune_row).ref_id;
                if self.postal.get(postal_row).code / 1000 == code_postal / 1000 {
                    return Some(voie_rows[rank]);
                }
            }
        }
        None
    }

    /// Resolves the localisation row within the voie's range: an exact match on the street
    /// number, or nothing.
    fn select_localisation(&self, voie_id: Option<i32>, numero: Option<i32>) -> Option<i32> {
        let voie_id = voie_id?;
        let numero = numero?;
        let element = self.voie.get(voie_id);

        let i = lower_bound(element.start, element.end, |row| {
            (self.localisation.get(row).numero as i32) < numero
        });
        (i < element.end && self.localisation.get(i).numero as i32 == numero).then_some(i)
    }
}
