//! Geohash encoding and query-region coverage.
//!
//! A geohash is a base-32 string naming a rectangular cell of the globe;
//! every extra character splits the cell 32 ways, so a longer shared prefix
//! means closer together. The engine uses geohashes two ways:
//!
//! 1. **Indexing**: every entity's location is encoded at a fixed precision
//!    and stored under that hash, turning "points near here" into a handful
//!    of ordered prefix scans.
//! 2. **Coverage**: a circular query region is translated into the set of
//!    same-precision hash prefixes whose cells intersect the circle's
//!    bounding square. Coverage may include cells the circle only grazes
//!    (false positives, filtered by exact distance downstream) but never
//!    misses a cell containing a true member.
//!
//! The coverage policy picks the finest precision whose cell dimensions are
//! at least the query diameter, then samples the bounding square at
//! cell-size steps (the 3x3 neighbor grid around the center cell in the
//! common case, more columns when high latitude stretches the box across
//! additional cells). Sample latitudes are clamped at the poles and sample
//! longitudes wrap across the antimeridian.

use itertools::Itertools;
use smallvec::SmallVec;

use crate::errors::{ErrorKind, GeoNearError, GeoNearResult};
use crate::geometry::{
    meters_to_latitude_degrees, meters_to_longitude_degrees, wrap_longitude, GeoBounds, GeoPoint,
    Region, METERS_PER_DEGREE,
};

/// The base-32 alphabet used by the geohash encoding.
const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Shortest supported geohash.
pub const MIN_PRECISION: usize = 1;

/// Longest supported geohash; 12 characters resolve to centimeter-scale
/// cells, well below GPS accuracy.
pub const MAX_PRECISION: usize = 12;

fn base32_index(c: char) -> Option<usize> {
    BASE32.iter().position(|&b| b as char == c)
}

/// Validates a geohash precision, rejecting values outside
/// [`MIN_PRECISION`]..=[`MAX_PRECISION`].
pub fn validate_precision(precision: usize) -> GeoNearResult<()> {
    if !(MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
        log::error!("Rejecting geohash precision {}", precision);
        return Err(GeoNearError::new(
            &format!(
                "Geohash precision must be between {} and {}, got: {}",
                MIN_PRECISION, MAX_PRECISION, precision
            ),
            ErrorKind::InvalidPrecision,
        ));
    }
    Ok(())
}

/// Encodes a point into its geohash at the given precision.
///
/// Encoding is deterministic: the same point and precision always produce
/// the same hash, and any point has exactly one hash at each precision.
pub fn encode(point: &GeoPoint, precision: usize) -> GeoNearResult<String> {
    validate_precision(precision)?;

    let mut lat_range = (-90.0f64, 90.0f64);
    let mut lon_range = (-180.0f64, 180.0f64);
    let mut hash = String::with_capacity(precision);
    let mut even_bit = true;
    let mut ch = 0usize;
    let mut bit = 0u8;

    while hash.len() < precision {
        if even_bit {
            let mid = (lon_range.0 + lon_range.1) / 2.0;
            if point.longitude() >= mid {
                ch = (ch << 1) | 1;
                lon_range.0 = mid;
            } else {
                ch <<= 1;
                lon_range.1 = mid;
            }
        } else {
            let mid = (lat_range.0 + lat_range.1) / 2.0;
            if point.latitude() >= mid {
                ch = (ch << 1) | 1;
                lat_range.0 = mid;
            } else {
                ch <<= 1;
                lat_range.1 = mid;
            }
        }
        even_bit = !even_bit;
        bit += 1;
        if bit == 5 {
            hash.push(BASE32[ch] as char);
            bit = 0;
            ch = 0;
        }
    }

    Ok(hash)
}

/// Decodes a geohash into the bounding box of its cell.
///
/// The inverse of [`encode`] up to cell resolution: the returned box always
/// contains every point that encodes to the hash. Callers that need exact
/// membership must re-test distance against the true location.
pub fn decode(hash: &str) -> GeoNearResult<GeoBounds> {
    if hash.is_empty() || hash.len() > MAX_PRECISION {
        return Err(GeoNearError::new(
            &format!("Geohash must be 1 to {} characters, got: {:?}", MAX_PRECISION, hash),
            ErrorKind::InvalidHash,
        ));
    }

    let mut lat_range = (-90.0f64, 90.0f64);
    let mut lon_range = (-180.0f64, 180.0f64);
    let mut even_bit = true;

    for c in hash.chars() {
        let idx = base32_index(c).ok_or_else(|| {
            GeoNearError::new(
                &format!("Invalid geohash character {:?} in {:?}", c, hash),
                ErrorKind::InvalidHash,
            )
        })?;
        for shift in (0..5).rev() {
            let bit = (idx >> shift) & 1;
            if even_bit {
                let mid = (lon_range.0 + lon_range.1) / 2.0;
                if bit == 1 {
                    lon_range.0 = mid;
                } else {
                    lon_range.1 = mid;
                }
            } else {
                let mid = (lat_range.0 + lat_range.1) / 2.0;
                if bit == 1 {
                    lat_range.0 = mid;
                } else {
                    lat_range.1 = mid;
                }
            }
            even_bit = !even_bit;
        }
    }

    Ok(GeoBounds::new(
        lat_range.0,
        lon_range.0,
        lat_range.1,
        lon_range.1,
    ))
}

/// Returns the (width, height) of a geohash cell in degrees at the given
/// precision. A precision of `p` characters carries `5p` bits, alternating
/// longitude-first, so longitude gets `ceil(5p/2)` bits and latitude
/// `floor(5p/2)`.
pub fn cell_dimensions_degrees(precision: usize) -> (f64, f64) {
    let lon_bits = (5 * precision).div_ceil(2) as i32;
    let lat_bits = (5 * precision / 2) as i32;
    (360.0 / 2f64.powi(lon_bits), 180.0 / 2f64.powi(lat_bits))
}

/// Returns the (width, height) of a geohash cell in meters at the given
/// precision and latitude. Width shrinks with the cosine of the latitude.
pub fn cell_dimensions_meters(precision: usize, latitude: f64) -> (f64, f64) {
    let (width_deg, height_deg) = cell_dimensions_degrees(precision);
    (
        width_deg * METERS_PER_DEGREE * latitude.to_radians().cos().abs(),
        height_deg * METERS_PER_DEGREE,
    )
}

/// Picks the coverage precision for a region: the finest precision, capped
/// at `max_precision`, whose cell dimensions are at least the query
/// diameter. Cell width is measured at the highest latitude the circle
/// reaches, where cells are narrowest in meters.
pub fn precision_for_region(region: &Region, max_precision: usize) -> usize {
    let radius = region.radius_meters();
    let dlat = meters_to_latitude_degrees(radius);
    let worst_lat = (region.center().latitude().abs() + dlat).min(90.0);
    let diameter = 2.0 * radius;

    for precision in (MIN_PRECISION..=max_precision).rev() {
        let (width_m, height_m) = cell_dimensions_meters(precision, worst_lat);
        if width_m.min(height_m) >= diameter {
            return precision;
        }
    }
    MIN_PRECISION
}

/// Computes the set of same-precision geohash prefixes whose cells cover a
/// query region.
///
/// The circle's bounding square (center ± radius per axis) is sampled at
/// cell-size steps including both edges, so every cell the square touches
/// contributes a prefix. With the precision chosen by
/// [`precision_for_region`] this is the 3x3 grid around the center cell in
/// the common case. The result is sorted and deduplicated.
///
/// Covered cells may extend past the circle (callers filter by exact
/// distance); no cell containing a point within the radius is ever missing.
pub fn covering_prefixes(region: &Region, max_precision: usize) -> GeoNearResult<Vec<String>> {
    validate_precision(max_precision)?;

    let center = region.center();
    let radius = region.radius_meters();
    let precision = precision_for_region(region, max_precision);

    let dlat = meters_to_latitude_degrees(radius);
    let worst_lat = (center.latitude().abs() + dlat).min(90.0);
    let dlon = meters_to_longitude_degrees(radius, worst_lat).min(180.0);

    let south = (center.latitude() - dlat).max(-90.0);
    let north = (center.latitude() + dlat).min(90.0);
    let west = center.longitude() - dlon;
    let east = center.longitude() + dlon;

    let (width_deg, height_deg) = cell_dimensions_degrees(precision);

    let mut samples: SmallVec<[String; 9]> = SmallVec::new();
    let mut lat = south;
    loop {
        let mut lon = west;
        loop {
            let sample = GeoPoint::new(lat, wrap_longitude(lon))?;
            samples.push(encode(&sample, precision)?);
            if lon >= east {
                break;
            }
            lon = (lon + width_deg).min(east);
        }
        if lat >= north {
            break;
        }
        lat = (lat + height_deg).min(north);
    }

    Ok(samples.into_iter().sorted().dedup().collect())
}
