//! The `normalize` module turns raw address text into the comparable form stored in the
//! database: ASCII-folded, upper-case, abbreviations expanded, stop words and separators
//! removed. The same functions run on both sides, once at indexing time and once per query,
//! so normalization must be deterministic and idempotent.
use deunicode::deunicode;
use nom::IResult;
use nom::Parser;
use nom::bytes::complete::take_till;
use nom::character::complete::digit1;
use nom::sequence::preceded;
use regex::Regex;
use std::sync::LazyLock;

/// Common one-word street types in France.
pub const VOIE_TYPE_1: &[&str] = &[
    "ALLEE",
    "AVENUE",
    "BOULEVARD",
    "CITE",
    "CHEMIN",
    "CENTRE",
    "CLOS",
    "COURS",
    "DOMAINE",
    "GALERIE",
    "HAMEAU",
    "HLM",
    "IMPASSE",
    "LIEUDIT",
    "LOTISSEMENT",
    "MAIL",
    "QUAI",
    "QUARTIER",
    "PASSAGE",
    "PLACE",
    "RONDPOINT",
    "ROUTE",
    "RUE",
    "RUELLE",
    "SQUARE",
    "TRAVERSE",
    "VOIE",
    "VILLAGE",
    "ZONE",
];

/// Common two-word street types in France.
pub const VOIE_TYPE_2: &[(&str, &str)] = &[
    ("CHEF", "LIEU"),
    ("LIEU", "DIT"),
    ("GRANDE", "RUE"),
    ("GRAND", "RUE"),
    ("GRANDE", "PLACE"),
    ("ROND", "POINT"),
];

/// Words that carry no information to distinguish one address from another.
const STOP_WORDS: &[&str] = &[
    "DE", "DES", "DU", "D", "LE", "LES", "LA", "L", "A", "AU", "AUX", "ET", "EN", "SUR", "SOUS",
    "CEDEX",
];

static PARENTHESES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[(].*[)]").unwrap());

/// The `expand` function maps a token to its long form when it is a common abbreviation in
/// French search queries, and returns it unchanged otherwise.
fn expand(word: &str) -> &str {
    match word {
        "ALL" => "ALLEE",
        "AV" => "AVENUE",
        "BD" => "BOULEVARD",
        "CH" => "CHEMIN",
        "CHE" => "CHEMIN",
        "CRS" => "COURS",
        "CTRE" => "CENTRE",
        "DOM" => "DOMAINE",
        "HAM" => "HAMEAU",
        "IMP" => "IMPASSE",
        "LD" => "LIEUDIT",
        "LOT" => "LOTISSEMENT",
        "LT" => "LIEUTENANT",
        "PAS" => "PASSAGE",
        "PDT" => "PRESIDENT",
        "PL" => "PLACE",
        "QU" => "QUAI",
        "QUA" => "QUARTIER",
        "RLE" => "RUELLE",
        "RES" => "RESIDENCE",
        "RPT" => "RONDPOINT",
        "RTE" => "ROUTE",
        "SQ" => "SQUARE",
        "ST" => "SAINT",
        "STE" => "SAINTE",
        "TRA" => "TRAVERSE",
        "VLGE" => "VILLAGE",
        other => other,
    }
}

/// The `uniform` method returns the upper-case text converted to ascii.
pub fn uniform(text: &str) -> String {
    deunicode(text.trim()).to_uppercase()
}

/// The `remove_separators` method drops separator symbols that do not make sense in an
/// address: any parenthesized substring is removed, and if a slash or vertical slash remains,
/// only the text at its left is kept.
pub fn remove_separators(text: &str) -> String {
    let text = PARENTHESES.replace_all(text, "");
    if let Some(head) = text.split('/').next()
        && head.len() < text.len()
    {
        return head.to_string();
    }
    if let Some(head) = text.split('|').next()
        && head.len() < text.len()
    {
        return head.to_string();
    }
    text.into_owned()
}

/// The `uniform_words` method returns the normalized list of words from `text`: separators
/// removed, ascii folded, abbreviations expanded and stop words dropped.
pub fn uniform_words(text: &str) -> Vec<String> {
    let text = uniform(&remove_separators(text));
    let text = text
        .replace([',', '\'', '-'], " ")
        .replace('"', "");

    text.split_whitespace()
        .map(expand)
        .filter(|word| !STOP_WORDS.contains(word))
        .map(String::from)
        .collect()
}

/// The `uniform_adresse` method produces the comparable form of a street name: the surviving
/// normalized words concatenated without separators.
pub fn uniform_adresse(text: &str) -> String {
    uniform_words(text).concat()
}

/// The `uniform_commune` method produces the comparable form of a city name. City names keep
/// no digits: a `CEDEX 09` suffix must not distinguish two spellings of the same commune.
pub fn uniform_commune(text: &str) -> String {
    uniform_adresse(text)
        .chars()
        .filter(|c| !c.is_ascii_digit())
        .collect::<String>()
        .trim()
        .to_string()
}

/// The `MinedAddress` struct carries the useful pieces of a free-form address line: the street
/// number, the comparable street name, and the street type that introduces it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MinedAddress {
    /// The street number, when one was present left of the street type.
    pub numero: Option<i32>,
    /// The concatenated normalized street name.
    pub voie: Option<String>,
    /// The first token of the street name, usually its type.
    pub voie_type: Option<String>,
}

/// The `digit_run` function recognizes the leftmost run of ascii digits in a token.
fn digit_run(input: &str) -> IResult<&str, &str> {
    preceded(take_till(|c: char| c.is_ascii_digit()), digit1).parse(input)
}

fn parse_numero(word: &str) -> Option<i32> {
    let (_, run) = digit_run(word).ok()?;
    // A run too long for i64 still counts as a number, one that cannot match any record.
    Some(run.parse::<i64>().map_or(i32::MAX, |n| n.clamp(0, i32::MAX as i64) as i32))
}

/// The `find_voie_type` function returns the index of the rightmost word opening a street
/// type, using [`VOIE_TYPE_1`] and [`VOIE_TYPE_2`]. The scan stops one short of the final
/// word: a street name cannot consist of its type alone.
fn find_voie_type(words: &[String]) -> Option<usize> {
    (0..words.len().saturating_sub(1)).rev().find(|&i| {
        VOIE_TYPE_1.contains(&words[i].as_str())
            || VOIE_TYPE_2.contains(&(words[i].as_str(), words[i + 1].as_str()))
    })
}

/// The `mine` method retrieves the useful information from a free-form address: the street
/// number, the comparable street name and the street type.
///
/// The number is searched right-to-left among the words strictly before the street type; when
/// no street type was recognized, the name starts right after the number, or at the first word
/// failing that.
pub fn mine(text: &str) -> MinedAddress {
    let words = uniform_words(text);
    if words.is_empty() || text.is_empty() {
        return MinedAddress::default();
    }

    let voie_type_index = find_voie_type(&words);
    let numero_limit = voie_type_index.unwrap_or(words.len() - 1);

    let mut numero = None;
    let mut numero_index = None;
    for i in (0..numero_limit).rev() {
        if let Some(value) = parse_numero(&words[i]) {
            numero = Some(value);
            numero_index = Some(i);
            break;
        }
    }

    let voie_type_index = match (voie_type_index, numero_index) {
        (Some(t), _) => t,
        (None, Some(n)) => n + 1,
        (None, None) => 0,
    };

    MinedAddress {
        numero,
        voie: Some(words[voie_type_index..].concat()),
        voie_type: Some(words[voie_type_index].clone()),
    }
}
