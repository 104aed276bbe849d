//! The `indexer` module turns the raw per-department BAN csv files into the binary database:
//! five content tables emitted in hierarchy order, plus the three sort-index tables.
//!
//! Rows of one department are first accumulated into a nested ordered map, postal code down
//! to localisation, so that emission walks every level in ascending key order and parent
//! `(start, end)` ranges close exactly around their children. The localisation table, by far
//! the largest, streams to disk as it is produced; only the parent tables stay in memory for
//! the index sort at the end.
use crate::error::{GeocodeError, GeocodeResult};
use crate::geo::degree_to_int;
use crate::normalize;
use crate::paths::{Paths, TableKind};
use crate::table::{Commune, Departement, Localisation, Postal, Record, TableWriter, Voie, fixed};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, trace};

// Columns of the raw BAN export (0-based, 19 semicolon-separated fields per line).
const NUMERO: usize = 5;
const REPETITION: usize = 6;
const NOM_VOIE: usize = 7;
const CODE_POSTAL: usize = 8;
const NOM_COMMUNE: usize = 9;
const CODE_INSEE: usize = 10;
const NOM_COMPLEMENTAIRE: usize = 11;
const LONGITUDE: usize = 14;
const LATITUDE: usize = 15;
const FIELD_COUNT: usize = 19;

/// Display length cap on street names; longer rows are rejected as unusable.
const VOIE_NOM_LIMIT: usize = 47;

type CommuneKey = (String, String, String);
type VoieKey = (String, String);
type LocalisationKey = (i16, String, i32, i32);

type VoieDict = BTreeMap<VoieKey, BTreeSet<LocalisationKey>>;
type CommuneDict = BTreeMap<CommuneKey, VoieDict>;
type PostalDict = BTreeMap<i32, CommuneDict>;

/// One accepted row of the raw feed, reduced to the keys of the four hierarchy levels.
struct RawAddress {
    code_postal: i32,
    commune: CommuneKey,
    voie: VoieKey,
    localisation: LocalisationKey,
}

/// Content rows held in memory until every department has been processed. These are the
/// tables the sort-index construction needs whole.
#[derive(Debug, Default)]
struct ContentTables {
    departements: Vec<Departement>,
    postals: Vec<Postal>,
    communes: Vec<Commune>,
    voies: Vec<Voie>,
}

/// The `named_field` function extracts the display and comparable forms of a text column.
/// Returns `None` when normalization leaves nothing, or when the display form exceeds
/// `size_limit`.
fn named_field(
    text: &str,
    method: fn(&str) -> String,
    size_limit: Option<usize>,
) -> Option<(String, String)> {
    let text = text.replace('"', "");
    let normalise = method(&text);
    if normalise.is_empty() {
        return None;
    }
    let nom = normalize::remove_separators(&normalize::uniform(&text));
    if size_limit.is_some_and(|limit| nom.len() > limit) {
        return None;
    }
    Some((nom, normalise))
}

/// The `get_attributes` function validates one csv record and derives the hierarchy keys.
/// Any malformed field rejects the whole row.
fn get_attributes(record: &csv::StringRecord) -> Option<RawAddress> {
    if record.len() != FIELD_COUNT {
        return None;
    }

    let code_postal = record[CODE_POSTAL].trim().parse::<i32>().ok()?;
    let numero = record[NUMERO].trim().parse::<i32>().ok()?;
    let longitude = record[LONGITUDE].trim().parse::<f64>().ok()?;
    let latitude = record[LATITUDE].trim().parse::<f64>().ok()?;

    // The complementary name takes precedence over the official one: it distinguishes the
    // attached communes sharing a postal code.
    let (commune_nom, commune_normalise) =
        named_field(&record[NOM_COMPLEMENTAIRE], normalize::uniform_commune, None)
            .or_else(|| named_field(&record[NOM_COMMUNE], normalize::uniform_commune, None))?;
    let (voie_nom, voie_normalise) = named_field(
        &record[NOM_VOIE],
        normalize::uniform_adresse,
        Some(VOIE_NOM_LIMIT),
    )?;

    let code_insee = record[CODE_INSEE].to_string();
    let repetition = record[REPETITION].replace('"', "");

    Some(RawAddress {
        code_postal,
        commune: (commune_normalise, commune_nom, code_insee),
        voie: (voie_normalise, voie_nom),
        localisation: (
            numero as i16,
            repetition,
            degree_to_int(longitude),
            degree_to_int(latitude),
        ),
    })
}

/// The `department_files` function lists the raw csv files with their department codes, in
/// ascending code order. The code is the suffix of the file stem: `ban-91.csv` maps to `91`.
fn department_files(raw: &Path) -> GeocodeResult<Vec<(String, PathBuf)>> {
    if !raw.is_dir() {
        return Err(GeocodeError::MissingRawData(raw.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(raw)? {
        let path = entry?.path();
        if path.extension().and_then(|extension| extension.to_str()) != Some("csv") {
            continue;
        }
        let stem = path.file_stem().and_then(|stem| stem.to_str()).unwrap_or("");
        let code = stem
            .rsplit(['-', '_'])
            .next()
            .unwrap_or(stem)
            .to_string();
        files.push((code, path));
    }
    files.sort();
    Ok(files)
}

/// The `process_department` function parses one raw file into the nested ordered map, then
/// emits its rows. Malformed rows are counted and skipped; they never abort the file.
fn process_department(
    code: &str,
    path: &Path,
    tables: &mut ContentTables,
    localisations: &mut TableWriter<Localisation>,
) -> GeocodeResult<()> {
    // The raw feed is split on literal semicolons; stray double quotes are stripped
    // per-field, so csv-level quoting stays off.
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .quoting(false)
        .flexible(true)
        .has_headers(true)
        .from_path(path)?;

    let mut postal_dict = PostalDict::new();
    let mut dropped = 0;
    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                trace!("Dropping: {}", e.to_string());
                dropped += 1;
                continue;
            }
        };
        match get_attributes(&record) {
            Some(raw) => {
                postal_dict
                    .entry(raw.code_postal)
                    .or_default()
                    .entry(raw.commune)
                    .or_default()
                    .entry(raw.voie)
                    .or_default()
                    .insert(raw.localisation);
            }
            None => dropped += 1,
        }
    }
    info!("Departement {}: {} records dropped.", code, dropped);

    emit_department(code, postal_dict, tables, localisations)
}

/// The `emit_department` function walks the nested map in ascending key order and appends
/// rows level by level, closing each parent's `(start, end)` range around its children.
fn emit_department(
    code: &str,
    postal_dict: PostalDict,
    tables: &mut ContentTables,
    localisations: &mut TableWriter<Localisation>,
) -> GeocodeResult<()> {
    let departement_id = tables.departements.len() as i32;
    let postal_start = tables.postals.len() as i32;

    for (code_postal, commune_dict) in postal_dict {
        let postal_id = tables.postals.len() as i32;
        let commune_start = tables.communes.len() as i32;

        for ((commune_normalise, commune_nom, code_insee), voie_dict) in commune_dict {
            let commune_id = tables.communes.len() as i32;
            let voie_start = tables.voies.len() as i32;
            let mut centroids = Vec::with_capacity(voie_dict.len());

            for ((voie_normalise, voie_nom), points) in voie_dict {
                let voie_id = tables.voies.len() as i32;
                let start = localisations.count() as i32;
                let (mut lon_sum, mut lat_sum) = (0i64, 0i64);
                let count = points.len() as i64;
                for (numero, repetition, longitude, latitude) in points {
                    localisations.push(&Localisation::new(
                        numero,
                        fixed(&repetition),
                        longitude,
                        latitude,
                        voie_id,
                    ))?;
                    lon_sum += longitude as i64;
                    lat_sum += latitude as i64;
                }
                let centroid = ((lon_sum / count) as i32, (lat_sum / count) as i32);
                let end = localisations.count() as i32;
                tables.voies.push(Voie::new(
                    fixed(&voie_normalise),
                    fixed(&voie_nom),
                    centroid.0,
                    centroid.1,
                    start,
                    end,
                    commune_id,
                ));
                centroids.push(centroid);
            }

            let count = centroids.len() as i64;
            let lon = (centroids.iter().map(|c| c.0 as i64).sum::<i64>() / count) as i32;
            let lat = (centroids.iter().map(|c| c.1 as i64).sum::<i64>() / count) as i32;
            tables.communes.push(Commune::new(
                fixed(&commune_normalise),
                fixed(&commune_nom),
                fixed(&code_insee),
                lon,
                lat,
                voie_start,
                tables.voies.len() as i32,
                postal_id,
            ));
        }

        tables.postals.push(Postal::new(
            code_postal,
            commune_start,
            tables.communes.len() as i32,
            departement_id,
        ));
    }

    tables.departements.push(Departement::new(
        fixed(code),
        postal_start,
        tables.postals.len() as i32,
    ));
    Ok(())
}

fn write_rows<T: Record, P: AsRef<Path>>(path: P, rows: &[T]) -> GeocodeResult<usize> {
    let mut writer = TableWriter::create(path)?;
    for row in rows {
        writer.push(row)?;
    }
    writer.finish()
}

/// The `argsort` function returns the row order sorting `rows` on `key`. The sort is stable,
/// so equal keys keep their emission order.
fn argsort<T, K: Ord>(rows: &[T], key: impl Fn(&T) -> K) -> Vec<i32> {
    let mut order: Vec<i32> = (0..rows.len() as i32).collect();
    order.sort_by_key(|&row| key(&rows[row as usize]));
    order
}

/// The `create_database` method runs the whole pipeline: every raw department file, in
/// ascending code order, into the five content tables and the three sort-index tables under
/// `database/`.
pub fn create_database(paths: &Paths) -> GeocodeResult<()> {
    let files = department_files(&paths.raw())?;
    fs::create_dir_all(paths.database())?;

    let style = ProgressStyle::with_template(
        "[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}",
    )
    .unwrap();
    let bar = ProgressBar::new(files.len() as u64)
        .with_style(style)
        .with_message("Processing files.");

    let mut tables = ContentTables::default();
    let mut localisations = TableWriter::create(paths.table(TableKind::Localisation))?;
    for (code, path) in &files {
        process_department(code, path, &mut tables, &mut localisations)?;
        bar.inc(1);
    }
    bar.finish();
    let localisation_count = localisations.finish()?;

    write_rows(paths.table(TableKind::Departement), &tables.departements)?;
    write_rows(paths.table(TableKind::Postal), &tables.postals)?;
    write_rows(paths.table(TableKind::Commune), &tables.communes)?;
    write_rows(paths.table(TableKind::Voie), &tables.voies)?;

    write_rows(
        paths.table(TableKind::PostalIndex),
        &argsort(&tables.postals, |postal| postal.code),
    )?;
    write_rows(
        paths.table(TableKind::CommuneIndex),
        &argsort(&tables.communes, |commune| commune.normalise),
    )?;
    write_rows(
        paths.table(TableKind::VoieIndex),
        &argsort(&tables.voies, |voie| voie.normalise),
    )?;

    info!(
        "Database written: {} departements, {} postal codes, {} communes, {} voies, {} localisations.",
        tables.departements.len(),
        tables.postals.len(),
        tables.communes.len(),
        tables.voies.len(),
        localisation_count,
    );
    Ok(())
}
