//! EPSG lookups and GeoTIFF GeoKey encoding of a coordinate reference system.
//!
//! Merging never reprojects: the output is labelled with the CRS of the first
//! source. These helpers translate between an EPSG code and the GeoKey
//! directory stored in GeoTIFF files.

// GeoKey IDs
pub(crate) const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
pub(crate) const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
pub(crate) const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
pub(crate) const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;

// GeoKey values
pub(crate) const MODEL_TYPE_PROJECTED: u16 = 1;
pub(crate) const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
pub(crate) const RASTER_PIXEL_IS_AREA: u16 = 1;
pub(crate) const RASTER_PIXEL_IS_POINT: u16 = 2;

// Codes 1..=1023 are reserved and 32767 means "user-defined"
const USER_DEFINED: u16 = 32767;

/// Get PROJ4 string for an EPSG code using the crs-definitions database
#[inline]
#[must_use]
pub fn get_proj_string(epsg: i32) -> Option<&'static str> {
    u16::try_from(epsg)
        .ok()
        .and_then(crs_definitions::from_code)
        .map(|def| def.proj4)
}

/// Check if an EPSG code represents a geographic (lon/lat) CRS
#[inline]
#[must_use]
pub fn is_geographic_crs(epsg: i32) -> bool {
    // Geographic CRS codes are typically in the 4000-4999 range
    // but we check the proj string to be sure
    if let Some(proj_str) = get_proj_string(epsg) {
        proj_str.contains("+proj=longlat")
    } else {
        epsg == 4326 || (4000..5000).contains(&epsg)
    }
}

/// Build a GeoKeyDirectory for a raster labelled with `epsg`.
///
/// Without a CRS only the model-independent raster type key is written.
#[must_use]
pub(crate) fn build_geokey_directory(epsg: Option<i32>) -> Vec<u16> {
    // [KeyDirectoryVersion, KeyRevision, MinorRevision, NumberOfKeys,
    //  KeyID1, TIFFTagLocation1, Count1, Value_Offset1, ...]
    let code = epsg.and_then(|c| u16::try_from(c).ok());

    let mut keys = vec![1, 1, 0, 0];
    if let Some(code) = code {
        let geographic = is_geographic_crs(i32::from(code));
        let model = if geographic {
            MODEL_TYPE_GEOGRAPHIC
        } else {
            MODEL_TYPE_PROJECTED
        };
        keys.extend_from_slice(&[GT_MODEL_TYPE_GEO_KEY, 0, 1, model]);
        keys.extend_from_slice(&[GT_RASTER_TYPE_GEO_KEY, 0, 1, RASTER_PIXEL_IS_AREA]);
        let crs_key = if geographic {
            GEOGRAPHIC_TYPE_GEO_KEY
        } else {
            PROJECTED_CS_TYPE_GEO_KEY
        };
        keys.extend_from_slice(&[crs_key, 0, 1, code]);
        keys[3] = 3;
    } else {
        keys.extend_from_slice(&[GT_RASTER_TYPE_GEO_KEY, 0, 1, RASTER_PIXEL_IS_AREA]);
        keys[3] = 1;
    }
    keys
}

/// Extract the EPSG code from a GeoKeyDirectory, preferring the projected
/// CRS key over the geographic one.
#[must_use]
pub(crate) fn epsg_from_geokeys(directory: &[u16]) -> Option<i32> {
    let count = usize::from(*directory.get(3)?);
    let mut geographic = None;
    let mut projected = None;

    for entry in directory.get(4..)?.chunks_exact(4).take(count) {
        let (key, location, value) = (entry[0], entry[1], entry[3]);
        // Only inline SHORT values carry an EPSG code
        if location != 0 || value == USER_DEFINED || value == 0 {
            continue;
        }
        match key {
            PROJECTED_CS_TYPE_GEO_KEY => projected = Some(i32::from(value)),
            GEOGRAPHIC_TYPE_GEO_KEY => geographic = Some(i32::from(value)),
            _ => {}
        }
    }
    projected.or(geographic)
}

/// True when the directory declares `GTRasterTypeGeoKey = PixelIsPoint`,
/// i.e. tiepoints name pixel centres rather than corners.
#[must_use]
pub(crate) fn pixel_is_point(directory: &[u16]) -> bool {
    let Some(count) = directory.get(3).map(|c| usize::from(*c)) else {
        return false;
    };
    directory.get(4..).is_some_and(|entries| {
        entries
            .chunks_exact(4)
            .take(count)
            .any(|e| e[0] == GT_RASTER_TYPE_GEO_KEY && e[1] == 0 && e[3] == RASTER_PIXEL_IS_POINT)
    })
}
