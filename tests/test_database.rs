use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::Rng;
use repere::{
    Commune, Database, FRANCE_EAST, FRANCE_NORTH, FRANCE_SOUTH, FRANCE_WEST, GeocodeError,
    GeocodeResult, KdNode, Localisation, Paths, Postal, Quality, Record, Table, TableKind,
    TableWriter, create_database, create_kdtree, degree_to_int, fixed, int_to_degree, nearest,
    spherical, text,
};
use std::fs;
use tempfile::TempDir;
use tracing::info;

/// Builds one line of the raw BAN export: 19 semicolon-separated fields, of which the engine
/// reads numero, repetition, nom_voie, code_postal, nom_commune, code_insee,
/// nom_complementaire, longitude and latitude.
fn ban_line(
    numero: u32,
    repetition: &str,
    nom_voie: &str,
    code_postal: &str,
    nom_commune: &str,
    code_insee: &str,
    longitude: f64,
    latitude: f64,
) -> String {
    let mut fields = vec![String::new(); 19];
    fields[0] = "id".to_string();
    fields[5] = numero.to_string();
    fields[6] = repetition.to_string();
    fields[7] = nom_voie.to_string();
    fields[8] = code_postal.to_string();
    fields[9] = nom_commune.to_string();
    fields[10] = code_insee.to_string();
    fields[14] = longitude.to_string();
    fields[15] = latitude.to_string();
    fields.join(";")
}

fn header() -> String {
    vec!["column"; 19].join(";")
}

/// Two synthetic departments covering every query path: exact hits, fuzzy fallbacks, postal
/// near misses and a point close to (2.21, 48.0) for the reverse scenario.
fn fixture() -> GeocodeResult<(TempDir, Database)> {
    let dir = tempfile::tempdir()?;
    let paths = Paths::new(dir.path());
    fs::create_dir_all(paths.raw())?;

    let mut paris = vec![header()];
    for numero in 1..=5 {
        paris.push(ban_line(
            numero,
            "",
            "Rue de Rivoli",
            "75001",
            "Paris",
            "75101",
            2.340 + 0.001 * numero as f64,
            48.8565,
        ));
    }
    for numero in [2, 4] {
        paris.push(ban_line(
            numero,
            "",
            "Avenue de l'Opéra",
            "75001",
            "Paris",
            "75101",
            2.330 + 0.001 * numero as f64,
            48.87,
        ));
    }
    fs::write(paths.raw().join("ban-75.csv"), paris.join("\n"))?;

    let mut essonne = vec![header()];
    for (numero, longitude, latitude) in
        [(10, 2.209, 48.709), (12, 2.21, 48.71), (14, 2.211, 48.711)]
    {
        essonne.push(ban_line(
            numero,
            "",
            "Boulevard des Maréchaux",
            "91120",
            "Palaiseau",
            "91477",
            longitude,
            latitude,
        ));
    }
    for numero in 1..=3 {
        essonne.push(ban_line(
            numero,
            "",
            "Rue de Paris",
            "91120",
            "Palaiseau",
            "91477",
            2.244 + 0.001 * numero as f64,
            48.714 + 0.001 * numero as f64,
        ));
    }
    for numero in [5, 7] {
        essonne.push(ban_line(
            numero,
            "",
            "Rue de Chartres",
            "91400",
            "Orsay",
            "91471",
            2.186 + 0.0005 * numero as f64,
            48.699,
        ));
    }
    essonne.push(ban_line(
        3,
        "BIS",
        "Rue du Pont",
        "91150",
        "Étampes",
        "91207",
        2.2101,
        48.0002,
    ));
    fs::write(paths.raw().join("ban-91.csv"), essonne.join("\n"))?;

    create_database(&paths)?;
    create_kdtree(&paths)?;
    let database = Database::open(&paths)?;
    Ok((dir, database))
}

#[test]
fn build_counts() -> GeocodeResult<()> {
    if let Ok(()) = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .try_init()
    {};
    info!("Subscriber initialized.");

    let (_dir, database) = fixture()?;
    assert_eq!(database.departement.len(), 2);
    assert_eq!(database.postal.len(), 4);
    assert_eq!(database.commune.len(), 4);
    assert_eq!(database.voie.len(), 6);
    assert_eq!(database.localisation.len(), 16);
    assert_eq!(database.kdtree.len(), 16);
    assert_eq!(database.postal_index.len(), 4);
    assert_eq!(database.commune_index.len(), 4);
    assert_eq!(database.voie_index.len(), 6);

    let codes: Vec<String> = database
        .departement
        .iter()
        .map(|departement| text(&departement.code).to_string())
        .collect();
    assert_eq!(codes, ["75", "91"]);
    Ok(())
}

#[test]
fn hierarchy_invariants() -> GeocodeResult<()> {
    let (_dir, database) = fixture()?;

    for (row, departement) in database.departement.iter().enumerate() {
        assert!(departement.start <= departement.end);
        for child in departement.start..departement.end {
            assert_eq!(database.postal.get(child).ref_id, row as i32);
        }
    }
    for (row, postal) in database.postal.iter().enumerate() {
        assert!(postal.start <= postal.end);
        for child in postal.start..postal.end {
            assert_eq!(database.commune.get(child).ref_id, row as i32);
        }
    }
    for (row, commune) in database.commune.iter().enumerate() {
        assert!(commune.start <= commune.end);
        for child in commune.start..commune.end {
            assert_eq!(database.voie.get(child).ref_id, row as i32);
        }
    }
    for (row, voie) in database.voie.iter().enumerate() {
        assert!(voie.start <= voie.end);
        let mut previous = i32::MIN;
        let (mut lon_sum, mut lat_sum) = (0i64, 0i64);
        for child in voie.start..voie.end {
            let localisation = database.localisation.get(child);
            assert_eq!(localisation.ref_id, row as i32);
            let numero = localisation.numero as i32;
            assert!(previous <= numero, "numeros sorted within a voie");
            previous = numero;
            lon_sum += localisation.longitude as i64;
            lat_sum += localisation.latitude as i64;
        }
        let count = (voie.end - voie.start) as i64;
        assert_eq!(voie.longitude, (lon_sum / count) as i32, "voie centroid");
        assert_eq!(voie.latitude, (lat_sum / count) as i32, "voie centroid");
    }
    Ok(())
}

#[test]
fn sort_indexes_are_orderings() -> GeocodeResult<()> {
    let (_dir, database) = fixture()?;

    let mut rows: Vec<i32> = database.postal_index.iter().collect();
    let mut previous = i32::MIN;
    for &row in &rows {
        let code = database.postal.get(row).code;
        assert!(previous <= code);
        previous = code;
    }
    rows.sort_unstable();
    assert_eq!(rows, (0..database.postal.len() as i32).collect::<Vec<_>>());

    let mut rows: Vec<i32> = database.commune_index.iter().collect();
    let mut previous = [0u8; 32];
    for &row in &rows {
        let normalise = database.commune.get(row).normalise;
        assert!(previous <= normalise);
        previous = normalise;
    }
    rows.sort_unstable();
    assert_eq!(rows, (0..database.commune.len() as i32).collect::<Vec<_>>());

    let mut rows: Vec<i32> = database.voie_index.iter().collect();
    let mut previous = [0u8; 47];
    for &row in &rows {
        let normalise = database.voie.get(row).normalise;
        assert!(previous <= normalise);
        previous = normalise;
    }
    rows.sort_unstable();
    assert_eq!(rows, (0..database.voie.len() as i32).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn kdtree_covers_every_localisation() -> GeocodeResult<()> {
    let (_dir, database) = fixture()?;
    assert_eq!(database.kdtree.len(), database.localisation.len());

    let mut refs: Vec<i32> = database.kdtree.iter().map(|node| node.ref_id).collect();
    refs.sort_unstable();
    assert_eq!(refs, (0..database.localisation.len() as i32).collect::<Vec<_>>());

    let root = database.kdtree.get(0);
    assert_eq!(
        (root.limit_left, root.limit_right, root.limit_bottom, root.limit_top),
        (FRANCE_WEST, FRANCE_EAST, FRANCE_SOUTH, FRANCE_NORTH),
    );

    for node in database.kdtree.iter() {
        let localisation = database.localisation.get(node.ref_id);
        assert_eq!(node.longitude, localisation.longitude);
        assert_eq!(node.latitude, localisation.latitude);
        assert!(node.limit_left <= node.longitude && node.longitude <= node.limit_right);
        assert!(node.limit_bottom <= node.latitude && node.latitude <= node.limit_top);
        assert!(node.dimension == 0 || node.dimension == 1);
    }
    Ok(())
}

#[test]
fn nearest_agrees_with_brute_force() -> GeocodeResult<()> {
    let (_dir, database) = fixture()?;
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..1000 {
        let query = (
            rng.random_range(int_to_degree(FRANCE_WEST)..int_to_degree(FRANCE_EAST)),
            rng.random_range(int_to_degree(FRANCE_SOUTH)..int_to_degree(FRANCE_NORTH)),
        );
        let (_, distance) = nearest(&database.kdtree, query).expect("non-empty tree");
        let brute = database
            .localisation
            .iter()
            .map(|localisation| {
                spherical(
                    query,
                    (
                        int_to_degree(localisation.longitude),
                        int_to_degree(localisation.latitude),
                    ),
                )
            })
            .fold(f64::INFINITY, f64::min);
        assert!((distance - brute).abs() < 1e-9, "{query:?}");
    }
    Ok(())
}

#[test]
fn nearest_agrees_on_a_larger_cloud() -> GeocodeResult<()> {
    let dir = tempfile::tempdir()?;
    let paths = Paths::new(dir.path());
    fs::create_dir_all(paths.database())?;

    let mut rng = StdRng::seed_from_u64(7);
    let mut writer: TableWriter<Localisation> =
        TableWriter::create(paths.table(TableKind::Localisation))?;
    for row in 0..300 {
        writer.push(&Localisation::new(
            (row % 50) as i16,
            fixed(""),
            degree_to_int(rng.random_range(-5.0..9.0)),
            degree_to_int(rng.random_range(41.0..51.0)),
            0,
        ))?;
    }
    writer.finish()?;
    create_kdtree(&paths)?;

    let localisation: Table<Localisation> = Table::open(paths.table(TableKind::Localisation))?;
    let kdtree: Table<KdNode> = Table::open(paths.table(TableKind::Kdtree))?;
    assert_eq!(kdtree.len(), 300);

    for _ in 0..1000 {
        let query = (
            rng.random_range(-6.0..10.0),
            rng.random_range(40.0..52.0),
        );
        let (node, distance) = nearest(&kdtree, query).expect("non-empty tree");
        let brute = localisation
            .iter()
            .map(|point| {
                spherical(
                    query,
                    (int_to_degree(point.longitude), int_to_degree(point.latitude)),
                )
            })
            .fold(f64::INFINITY, f64::min);
        assert!((distance - brute).abs() < 1e-9, "{query:?} node {node}");
    }
    Ok(())
}

#[test]
fn position_exact_address() -> GeocodeResult<()> {
    let (_dir, database) = fixture()?;
    let result = database.position(Some("91120"), Some("Palaiseau"), Some("12, Bd des Maréchaux"));
    assert_eq!(result.quality, Quality::Localisation);
    assert_eq!(result.localisation.as_ref().map(|l| l.numero), Some(12));
    assert_eq!(result.commune.as_ref().map(|c| c.nom.as_str()), Some("PALAISEAU"));
    assert_eq!(result.commune.as_ref().map(|c| c.code_insee.as_str()), Some("91477"));
    assert_eq!(result.departement.as_ref().map(|d| d.code.as_str()), Some("91"));
    assert!((result.longitude.expect("coordinates") - 2.21).abs() < 1e-6);
    assert!((result.latitude.expect("coordinates") - 48.71).abs() < 1e-6);
    Ok(())
}

#[test]
fn position_without_numero() -> GeocodeResult<()> {
    let (_dir, database) = fixture()?;
    let result = database.position(Some("91120"), Some("Palaiseau"), Some("Boulevard des Maréchaux"));
    assert_eq!(result.quality, Quality::VoieSansNumero);
    assert_eq!(
        result.voie.as_ref().map(|v| v.nom.as_str()),
        Some("BOULEVARD DES MARECHAUX"),
    );
    assert!(result.localisation.is_none());
    assert!(result.longitude.is_some());
    Ok(())
}

#[test]
fn position_unknown_numero() -> GeocodeResult<()> {
    let (_dir, database) = fixture()?;
    let result = database.position(Some("91120"), Some("Palaiseau"), Some("99999, Bd des Maréchaux"));
    assert_eq!(result.quality, Quality::Voie);
    assert!(result.localisation.is_none());
    Ok(())
}

#[test]
fn position_misspelled_commune() -> GeocodeResult<()> {
    let (_dir, database) = fixture()?;
    let result = database.position(Some("91120"), Some("PalaizoU"), Some("12 Bd Marechaux"));
    assert_eq!(result.quality, Quality::Localisation);
    assert_eq!(result.localisation.as_ref().map(|l| l.numero), Some(12));
    assert_eq!(result.commune.as_ref().map(|c| c.nom.as_str()), Some("PALAISEAU"));
    Ok(())
}

#[test]
fn position_commune_through_wide_similarity() -> GeocodeResult<()> {
    let (_dir, database) = fixture()?;
    let result = database.position(Some("91400"), Some("Orsai"), Some("Rue de Chartres"));
    assert_eq!(result.quality, Quality::VoieSansNumero);
    assert_eq!(result.commune.as_ref().map(|c| c.nom.as_str()), Some("ORSAY"));
    Ok(())
}

#[test]
fn position_misspelled_voie() -> GeocodeResult<()> {
    let (_dir, database) = fixture()?;
    let result = database.position(Some("91120"), Some("Palaiseau"), Some("12 Boulevard des Marchaux"));
    assert_eq!(result.quality, Quality::Localisation);
    assert_eq!(result.localisation.as_ref().map(|l| l.numero), Some(12));
    Ok(())
}

#[test]
fn position_postal_only() -> GeocodeResult<()> {
    let (_dir, database) = fixture()?;
    let result = database.position(Some("91120"), None, None);
    assert_eq!(result.quality, Quality::Postal);
    assert_eq!(result.postal.as_ref().map(|p| p.code), Some(91120));
    assert_eq!(result.departement.as_ref().map(|d| d.code.as_str()), Some("91"));
    assert!(result.longitude.is_none() && result.latitude.is_none());
    Ok(())
}

#[test]
fn position_postal_near_miss() -> GeocodeResult<()> {
    let (_dir, database) = fixture()?;
    let result = database.position(Some("91123"), Some("Palaiseau"), None);
    assert_eq!(result.quality, Quality::Commune);
    assert_eq!(result.postal.as_ref().map(|p| p.code), Some(91120));

    let rejected = database.position(Some("91100"), None, None);
    assert_eq!(rejected.quality, Quality::Echec);
    Ok(())
}

#[test]
fn position_nothing_found() -> GeocodeResult<()> {
    let (_dir, database) = fixture()?;
    let result = database.position(Some("00000"), None, None);
    assert_eq!(result.quality, Quality::Echec);
    assert!(result.departement.is_none());
    assert!(result.postal.is_none());
    assert!(result.commune.is_none());
    assert!(result.voie.is_none());
    assert!(result.localisation.is_none());
    assert!(result.longitude.is_none());

    let empty = database.position(None, None, None);
    assert_eq!(empty.quality, Quality::Echec);
    Ok(())
}

#[test]
fn quality_never_improves_with_less_input() -> GeocodeResult<()> {
    let (_dir, database) = fixture()?;
    let full = database.position(Some("91120"), Some("Palaiseau"), Some("12, Bd des Maréchaux"));
    let partial = database.position(Some("91120"), Some("Palaiseau"), None);
    assert_eq!(full.quality, Quality::Localisation);
    assert_eq!(partial.quality, Quality::Commune);
    assert!(partial.quality.code() >= full.quality.code().min(3));
    Ok(())
}

#[test]
fn reverse_returns_nearest_address() -> GeocodeResult<()> {
    let (_dir, database) = fixture()?;
    let result = database.reverse((2.21, 48.0));
    assert_eq!(result.quality, Quality::Localisation);
    assert!((result.longitude.expect("coordinates") - 2.21).abs() < 0.01);
    assert!((result.latitude.expect("coordinates") - 48.0).abs() < 0.01);
    assert_eq!(result.commune.as_ref().map(|c| c.nom.as_str()), Some("ETAMPES"));
    assert_eq!(result.localisation.as_ref().map(|l| l.numero), Some(3));
    Ok(())
}

#[test]
fn queries_share_the_database_across_threads() -> GeocodeResult<()> {
    let (_dir, database) = fixture()?;
    let database = &database;
    std::thread::scope(|scope| {
        let forward = scope.spawn(move || {
            database
                .position(Some("91120"), Some("Palaiseau"), Some("12, Bd des Maréchaux"))
                .quality
        });
        let backward = scope.spawn(move || database.reverse((2.21, 48.0)).quality);
        assert_eq!(forward.join().expect("forward thread"), Quality::Localisation);
        assert_eq!(backward.join().expect("backward thread"), Quality::Localisation);
    });
    Ok(())
}

#[test]
fn malformed_rows_are_skipped() -> GeocodeResult<()> {
    let dir = tempfile::tempdir()?;
    let paths = Paths::new(dir.path());
    fs::create_dir_all(paths.raw())?;

    let lines = vec![
        header(),
        ban_line(1, "", "Rue Neuve", "38000", "Grenoble", "38185", 5.72, 45.18),
        // Wrong field count.
        vec!["x"; 18].join(";"),
        // Unparsable numero.
        ban_line(2, "", "Rue Neuve", "38000", "Grenoble", "38185", 5.72, 45.18)
            .replace(";2;", ";deux;"),
        // Street name over the display width.
        ban_line(3, "", &"A".repeat(60), "38000", "Grenoble", "38185", 5.72, 45.18),
        // No commune name at all.
        ban_line(4, "", "Rue Neuve", "38000", "", "38185", 5.72, 45.18),
        // Unparsable longitude.
        ban_line(5, "", "Rue Neuve", "38000", "Grenoble", "38185", 5.72, 45.18)
            .replace("5.72", "east"),
    ];
    fs::write(paths.raw().join("ban-38.csv"), lines.join("\n"))?;
    create_database(&paths)?;
    create_kdtree(&paths)?;

    let database = Database::open(&paths)?;
    assert_eq!(database.localisation.len(), 1);
    assert_eq!(database.voie.len(), 1);
    assert_eq!(database.commune.len(), 1);
    assert_eq!(
        text(&database.commune.get(0).nom),
        "GRENOBLE",
    );
    Ok(())
}

#[test]
fn missing_raw_directory_is_reported() -> GeocodeResult<()> {
    let dir = tempfile::tempdir()?;
    let paths = Paths::new(dir.path());
    let result = create_database(&paths);
    assert!(matches!(result, Err(GeocodeError::MissingRawData(_))));
    Ok(())
}

#[test]
fn record_layouts_are_stable() {
    let postal = Postal::new(91120, 2, 5, 1);
    let mut buf = Vec::new();
    postal.encode(&mut buf);
    assert_eq!(buf.len(), Postal::SIZE);
    assert_eq!(&buf[0..4], &91120i32.to_le_bytes());
    assert_eq!(Postal::decode(&buf), postal);

    let localisation = Localisation::new(12, fixed("BIS"), 22100000, 487100000, 3);
    let mut buf = Vec::new();
    localisation.encode(&mut buf);
    assert_eq!(buf.len(), Localisation::SIZE);
    assert_eq!(&buf[0..2], &12i16.to_le_bytes());
    assert_eq!(&buf[2..5], b"BIS");
    assert_eq!(Localisation::decode(&buf), localisation);

    assert_eq!(Commune::SIZE, 89);
    assert_eq!(KdNode::SIZE, 37);
    assert_eq!(<i32 as Record>::SIZE, 4);
}

#[test]
fn results_serialize_for_the_http_host() -> GeocodeResult<()> {
    use strum::IntoEnumIterator;

    let (_dir, database) = fixture()?;
    let found = serde_json::to_value(
        database.position(Some("91120"), Some("Palaiseau"), Some("12, Bd des Maréchaux")),
    )
    .expect("serializable result");
    assert_eq!(found["quality"], 1);
    assert_eq!(found["commune"]["nom"], "PALAISEAU");
    assert_eq!(found["localisation"]["numero"], 12);

    let missed = serde_json::to_value(database.position(Some("00000"), None, None))
        .expect("serializable result");
    assert_eq!(missed["quality"], 6);
    assert!(missed["commune"].is_null());
    assert!(missed["longitude"].is_null());

    for quality in Quality::iter() {
        assert_eq!(Quality::from_repr(quality.code()), Some(quality));
    }
    Ok(())
}
