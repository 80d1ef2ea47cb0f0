//! Region name resolution
//!
//! The explicit `RegionName` field of an organization is authoritative. When
//! it is missing, the reconciler may ask a [`RegionLocator`] to guess the
//! region from the free-text postal address. The bundled [`AddressHeuristic`]
//! is low-confidence and frequently returns `None`; a missing region is a
//! normal outcome, never an error.

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static POSTAL_CODE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[0-9]{6}$").expect("postal code pattern is valid")
});

/// Regional substrings recognised anywhere in an address (lower case).
const KNOWN_REGIONS: &[&str] = &[
    "г. москва",
    "московская область",
    "г. санкт-петербург",
    "ленинградская область",
];

/// Address → region name. Implementations may be swapped for a lookup table
/// or a geocoder without touching reconciliation.
pub trait RegionLocator: Send + Sync {
    fn region_from_address(&self, address: &str) -> Option<String>;
}

/// Substring match against a short list of regions, else the first
/// comma-separated address part (skipping a leading 6-digit postal code).
#[derive(Debug, Clone, Copy, Default)]
pub struct AddressHeuristic;

impl RegionLocator for AddressHeuristic {
    fn region_from_address(&self, address: &str) -> Option<String> {
        let lowered = address.to_lowercase();
        if let Some(known) = KNOWN_REGIONS.iter().find(|known| lowered.contains(*known)) {
            return Some(capitalize(known));
        }

        let Some((head, tail)) = address.split_once(',') else {
            debug!(address = %address, "No region pattern or separator in address");
            return None;
        };

        let head = head.trim();
        let candidate = if POSTAL_CODE.is_match(head) {
            tail.split(',').next().unwrap_or_default().trim()
        } else {
            head
        };

        normalize_region_name(candidate)
    }
}

/// Never guesses. For sources where an address-derived region is worse than none.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRegionFallback;

impl RegionLocator for NoRegionFallback {
    fn region_from_address(&self, _address: &str) -> Option<String> {
        None
    }
}

/// Trim and capitalize a region name; `None` when nothing is left.
pub fn normalize_region_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(capitalize(trimmed))
    }
}

/// First character upper case, the rest lower case.
fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
