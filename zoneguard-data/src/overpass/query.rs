//! Overpass QL query construction.

use zoneguard_core::BoundingBox;

/// Server-side query timeout in seconds.
pub const DEFAULT_SERVER_TIMEOUT_SECS: u64 = 180;

/// Tag filters covering every family the classifier understands.
pub const SELECTORS: &[&str] = &[
    r#"["military"]"#,
    r#"["landuse"="military"]"#,
    r#"["aeroway"]"#,
    r#"["amenity"="prison"]"#,
    r#"["boundary"="border_zone"]"#,
    r#"["access"="no"]["landuse"]"#,
    r#"["boundary"~"^(protected_area|national_park)$"]"#,
    r#"["leisure"="nature_reserve"]"#,
];

/// Overpass QL selecting restricted-area ways and relations inside `bbox`.
///
/// Member ways and nodes are pulled in with skeleton output so relations can
/// be stitched.
///
/// # Examples
///
/// ```
/// use zoneguard_core::BoundingBox;
/// use zoneguard_data::overpass::build_query;
///
/// let bbox = BoundingBox::new(37.0, 55.0, 37.5, 55.5).expect("valid bbox");
/// let query = build_query(&bbox, 60);
/// assert!(query.starts_with("[out:json][timeout:60];("));
/// assert!(query.contains(r#"way["aeroway"](55,37,55.5,37.5);"#));
/// assert!(query.ends_with("out body;>;out skel qt;"));
/// ```
#[must_use]
pub fn build_query(bbox: &BoundingBox, timeout_secs: u64) -> String {
    let area = format!(
        "({},{},{},{})",
        bbox.min_lat(),
        bbox.min_lon(),
        bbox.max_lat(),
        bbox.max_lon()
    );
    let clauses: String = SELECTORS
        .iter()
        .flat_map(|selector| {
            [
                format!("way{selector}{area};"),
                format!("relation{selector}{area};"),
            ]
        })
        .collect();
    format!("[out:json][timeout:{timeout_secs}];({clauses});out body;>;out skel qt;")
}
