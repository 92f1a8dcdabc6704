//! Ordering of descriptor version tokens.

use std::cmp::Ordering;

fn components(token: &str) -> Vec<&str> {
    token
        .trim()
        .trim_start_matches('v')
        .split(['.', '-', '+'])
        .filter(|p| !p.is_empty())
        .collect()
}

fn compare_component(x: Option<&str>, y: Option<&str>) -> Ordering {
    match (x, y) {
        (Some(x), Some(y)) => match (x.parse::<u64>(), y.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => x.cmp(y),
        },
        // A missing component reads as 0 against a number (1.0 == 1.0.0),
        // but a tag where the other side has ended marks a prerelease
        (None, Some(y)) => match y.parse::<u64>() {
            Ok(y) => 0.cmp(&y),
            Err(_) => Ordering::Greater,
        },
        (Some(_), None) => compare_component(y, x).reverse(),
        (None, None) => Ordering::Equal,
    }
}

/// Compare two version tokens component by component. Numeric components
/// compare numerically, anything else lexically. Extra numeric components
/// make a token newer (`1.0` < `1.0.1`); an extra tag makes it older
/// (`1.2.0-beta.1` < `1.2.0`).
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let (a, b) = (components(a), components(b));
    (0..a.len().max(b.len()))
        .map(|i| compare_component(a.get(i).copied(), b.get(i).copied()))
        .find(|ord| *ord != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

pub fn is_older(existing: &str, expected: &str) -> bool {
    compare_versions(existing, expected) == Ordering::Less
}
