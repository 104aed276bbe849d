//! The `geo` module defines the fixed-point coordinate representation used by every table of
//! the database, and the great-circle distance driving the reverse search.
//!
//! Coordinates are stored on disk as signed 32-bit integers scaled by 10^7, which keeps the
//! records tightly packed and avoids floating-point drift between indexing runs.

/// Scale factor between decimal degrees and the stored integer representation.
pub const SCALE: f64 = 1e7;

/// Western bound of the region covered by the database, in scaled degrees. The box is wide
/// enough to include the overseas departments.
pub const FRANCE_WEST: i32 = -620_000_000;
/// Eastern bound of the covered region, in scaled degrees.
pub const FRANCE_EAST: i32 = 550_000_000;
/// Southern bound of the covered region, in scaled degrees.
pub const FRANCE_SOUTH: i32 = -220_000_000;
/// Northern bound of the covered region, in scaled degrees.
pub const FRANCE_NORTH: i32 = 520_000_000;

/// The `degree_to_int` function converts decimal degrees to the scaled integer representation,
/// flooring to the nearest lower integer.
pub fn degree_to_int(degree: f64) -> i32 {
    (degree * SCALE).floor() as i32
}

/// The `int_to_degree` function converts the scaled integer representation back to decimal
/// degrees.
pub fn int_to_degree(integer: i32) -> f64 {
    integer as f64 / SCALE
}

pub(crate) fn radian(degree: f64) -> f64 {
    degree / 180. * std::f64::consts::PI
}

pub(crate) fn degree(radian: f64) -> f64 {
    radian / std::f64::consts::PI * 180.
}

/// The `spherical` function returns the great-circle distance between two `(longitude,
/// latitude)` pairs, expressed in degrees of arc.
///
/// The formula is the atan2 form of the spherical law of cosines, numerically stable for
/// antipodal and for very close points. The reverse search only relies on the result being
/// monotone in the true distance, so degrees of arc are a convenient unit: region bounds of
/// the k-d tree live in the same space.
pub fn spherical(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lng1) = (radian(a.1), radian(a.0));
    let (lat2, lng2) = (radian(b.1), radian(b.0));

    let (sin_lat1, cos_lat1) = lat1.sin_cos();
    let (sin_lat2, cos_lat2) = lat2.sin_cos();

    let delta_lng = lng2 - lng1;
    let (sin_delta_lng, cos_delta_lng) = delta_lng.sin_cos();

    let numerator = ((cos_lat2 * sin_delta_lng).powi(2)
        + (cos_lat1 * sin_lat2 - sin_lat1 * cos_lat2 * cos_delta_lng).powi(2))
    .sqrt();
    let denominator = sin_lat1 * sin_lat2 + cos_lat1 * cos_lat2 * cos_delta_lng;

    degree(numerator.atan2(denominator))
}
