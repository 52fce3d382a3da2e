//! Tag-driven zone classification.
//!
//! Classification walks an ordered rule table and stops at the first rule
//! whose predicate matches the feature's tags. The final rule always
//! matches, so every feature receives a severity.

use std::collections::BTreeMap;

use crate::zone::Severity;

/// OpenStreetMap-style key/value tags.
pub type Tags = BTreeMap<String, String>;

/// A test over a feature's tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    /// `key` is present with exactly `value`.
    Equals(&'static str, &'static str),
    /// `key` is present with any value.
    Present(&'static str),
    /// `key` is present with one of the listed values.
    OneOf(&'static str, &'static [&'static str]),
    /// At least one nested predicate matches.
    Any(&'static [Predicate]),
    /// Every nested predicate matches.
    All(&'static [Predicate]),
    /// Matches unconditionally.
    Always,
}

impl Predicate {
    /// Evaluate the predicate against `tags`.
    #[must_use]
    pub fn matches(&self, tags: &Tags) -> bool {
        match self {
            Self::Equals(key, value) => tags.get(*key).is_some_and(|v| v == value),
            Self::Present(key) => tags.contains_key(*key),
            Self::OneOf(key, values) => tags
                .get(*key)
                .is_some_and(|v| values.iter().any(|candidate| v == candidate)),
            Self::Any(inner) => inner.iter().any(|p| p.matches(tags)),
            Self::All(inner) => inner.iter().all(|p| p.matches(tags)),
            Self::Always => true,
        }
    }
}

/// Where a rule takes the zone type from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneTypeSource {
    /// A fixed type name.
    Fixed(&'static str),
    /// The value of the named tag.
    TagValue(&'static str),
}

/// One row of the classification table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    /// Condition that selects this rule.
    pub predicate: Predicate,
    /// Severity assigned on match.
    pub severity: Severity,
    /// Source of the zone type assigned on match.
    pub zone_type: ZoneTypeSource,
}

/// Ordered classification rules; the first match wins.
pub const RULES: &[Rule] = &[
    Rule {
        predicate: Predicate::Equals("military", "danger_area"),
        severity: Severity::Critical,
        zone_type: ZoneTypeSource::Fixed("military_danger"),
    },
    Rule {
        predicate: Predicate::Equals("military", "nuclear_testing_site"),
        severity: Severity::Critical,
        zone_type: ZoneTypeSource::Fixed("nuclear"),
    },
    Rule {
        predicate: Predicate::Any(&[
            Predicate::Equals("landuse", "military"),
            Predicate::Present("military"),
        ]),
        severity: Severity::Critical,
        zone_type: ZoneTypeSource::Fixed("military"),
    },
    Rule {
        predicate: Predicate::Present("aeroway"),
        severity: Severity::Restricted,
        zone_type: ZoneTypeSource::Fixed("aerodrome"),
    },
    Rule {
        predicate: Predicate::Equals("amenity", "prison"),
        severity: Severity::Restricted,
        zone_type: ZoneTypeSource::Fixed("prison"),
    },
    Rule {
        predicate: Predicate::Equals("boundary", "border_zone"),
        severity: Severity::Restricted,
        zone_type: ZoneTypeSource::Fixed("border_zone"),
    },
    Rule {
        predicate: Predicate::All(&[Predicate::Equals("access", "no"), Predicate::Present("landuse")]),
        severity: Severity::Restricted,
        zone_type: ZoneTypeSource::Fixed("closed_area"),
    },
    Rule {
        predicate: Predicate::OneOf("boundary", &["protected_area", "national_park"]),
        severity: Severity::Warning,
        zone_type: ZoneTypeSource::TagValue("boundary"),
    },
    Rule {
        predicate: Predicate::Equals("leisure", "nature_reserve"),
        severity: Severity::Warning,
        zone_type: ZoneTypeSource::Fixed("nature_reserve"),
    },
    Rule {
        predicate: Predicate::Always,
        severity: Severity::Restricted,
        zone_type: ZoneTypeSource::Fixed("restricted"),
    },
];

/// Outcome of classifying one feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Assigned severity.
    pub severity: Severity,
    /// Assigned zone type.
    pub zone_type: String,
}

/// Classify `tags` with the built-in [`RULES`].
///
/// # Examples
///
/// ```
/// use zoneguard_core::classify::{Tags, classify};
/// use zoneguard_core::Severity;
///
/// let mut tags = Tags::new();
/// tags.insert("aeroway".into(), "aerodrome".into());
/// let class = classify(&tags);
/// assert_eq!(class.severity, Severity::Restricted);
/// assert_eq!(class.zone_type, "aerodrome");
/// ```
#[must_use]
pub fn classify(tags: &Tags) -> Classification {
    classify_with(RULES, tags)
}

/// Classify `tags` against an arbitrary rule table.
///
/// A table without a matching rule falls back to `restricted`.
#[must_use]
pub fn classify_with(rules: &[Rule], tags: &Tags) -> Classification {
    rules
        .iter()
        .find(|rule| rule.predicate.matches(tags))
        .map_or_else(
            || Classification {
                severity: Severity::Restricted,
                zone_type: "restricted".to_owned(),
            },
            |rule| Classification {
                severity: rule.severity,
                zone_type: match rule.zone_type {
                    ZoneTypeSource::Fixed(name) => name.to_owned(),
                    ZoneTypeSource::TagValue(key) => tags
                        .get(key)
                        .cloned()
                        .unwrap_or_else(|| "restricted".to_owned()),
                },
            },
        )
}

/// Tags consulted in order when naming a zone.
const NAME_KEYS: [&str; 3] = ["name", "name:ru", "name:en"];

/// Pick a display name for a feature.
///
/// Falls back to `"{zone_type} {kind}/{id}"` when no name tag is set.
#[must_use]
pub fn zone_name(tags: &Tags, zone_type: &str, kind: &str, id: i64) -> String {
    NAME_KEYS
        .iter()
        .find_map(|key| tags.get(*key).filter(|v| !v.trim().is_empty()))
        .cloned()
        .unwrap_or_else(|| format!("{zone_type} {kind}/{id}"))
}
