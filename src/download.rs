//! The `download` module fetches and unpacks the raw data: one gzip-compressed csv per
//! department from the national address base export. Both steps are idempotent; archives
//! already on disk are not fetched again.
use crate::error::{GeocodeError, GeocodeResult};
use crate::paths::Paths;
use flate2::read::GzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{self, BufReader};
use tracing::info;

/// Base address of the per-department BAN export.
pub const BAN_URL: &str = "https://adresse.data.gouv.fr/data/ban/export-api-gestion/latest/ban/";

/// Codes of the department files published by the export: metropolitan France and the
/// overseas departments.
pub const DEPARTEMENTS: &[&str] = &[
    "01", "02", "03", "04", "05", "06", "07", "08", "09", "10", "11", "12", "13", "14", "15",
    "16", "17", "18", "19", "21", "22", "23", "24", "25", "26", "27", "28", "29", "2A", "2B",
    "30", "31", "32", "33", "34", "35", "36", "37", "38", "39", "40", "41", "42", "43", "44",
    "45", "46", "47", "48", "49", "50", "51", "52", "53", "54", "55", "56", "57", "58", "59",
    "60", "61", "62", "63", "64", "65", "66", "67", "68", "69", "70", "71", "72", "73", "74",
    "75", "76", "77", "78", "79", "80", "81", "82", "83", "84", "85", "86", "87", "88", "89",
    "90", "91", "92", "93", "94", "95", "971", "972", "973", "974", "975", "976",
];

fn archive_name(departement: &str) -> String {
    format!("ban-{departement}.csv.gz")
}

fn csv_name(departement: &str) -> String {
    format!("ban-{departement}.csv")
}

fn progress_bar(len: u64, message: &'static str) -> ProgressBar {
    let style = ProgressStyle::with_template(
        "[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}",
    )
    .unwrap();
    ProgressBar::new(len).with_style(style).with_message(message)
}

/// The `download` method fetches every department archive into the raw directory, skipping
/// the ones already present.
#[cfg(feature = "download")]
pub fn download(paths: &Paths) -> GeocodeResult<()> {
    let raw = paths.raw();
    std::fs::create_dir_all(&raw)?;

    let client = reqwest::blocking::Client::new();
    let bar = progress_bar(DEPARTEMENTS.len() as u64, "Downloading files.");
    let mut fetched = 0;
    for departement in DEPARTEMENTS {
        let name = archive_name(departement);
        let target = raw.join(&name);
        if !target.is_file() {
            let mut response = client
                .get(format!("{BAN_URL}{name}"))
                .send()
                .map_err(|e| GeocodeError::Download(name.clone(), e.to_string()))?;
            if !response.status().is_success() {
                return Err(GeocodeError::Download(
                    name,
                    format!("bad response status {}", response.status()),
                ));
            }
            let mut file = File::create(&target)?;
            io::copy(&mut response, &mut file)
                .map_err(|e| GeocodeError::Download(name.clone(), e.to_string()))?;
            fetched += 1;
        }
        bar.inc(1);
    }
    bar.finish();
    info!("{} archives fetched, {} already present.", fetched, DEPARTEMENTS.len() - fetched);
    Ok(())
}

/// Stub kept when the crate is built without network support.
#[cfg(not(feature = "download"))]
pub fn download(_paths: &Paths) -> GeocodeResult<()> {
    Err(GeocodeError::Download(
        "ban".to_string(),
        "this build has no download support; enable the `download` feature".to_string(),
    ))
}

/// The `decompress` method unpacks every department archive next to itself in the raw
/// directory. A missing archive aborts the step.
pub fn decompress(paths: &Paths) -> GeocodeResult<()> {
    let raw = paths.raw();
    let bar = progress_bar(DEPARTEMENTS.len() as u64, "Extracting files.");
    for departement in DEPARTEMENTS {
        let archive = raw.join(archive_name(departement));
        if !archive.is_file() {
            return Err(GeocodeError::MissingArchive(archive));
        }
        let mut decoder = GzDecoder::new(BufReader::new(File::open(&archive)?));
        let mut output = File::create(raw.join(csv_name(departement)))?;
        io::copy(&mut decoder, &mut output)?;
        bar.inc(1);
    }
    bar.finish();
    info!("{} archives extracted.", DEPARTEMENTS.len());
    Ok(())
}
