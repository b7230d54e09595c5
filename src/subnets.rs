//! Subnet set merging
//!
//! Pure string-set logic used to build `AllowedIPs` values. Output order
//! is the lexicographic order of the token set, so regenerated files are
//! byte-identical run to run regardless of input order.

use std::collections::BTreeSet;

/// Split a separator-delimited list into trimmed, non-empty tokens
fn tokens<'a>(list: &'a str, separator: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    list.split(separator)
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Merge several separator-delimited subnet lists into one deduplicated,
/// deterministically ordered list.
///
/// Tokens appearing in `exclude` (itself split and deduplicated the same
/// way) are dropped, even when also present in the inputs. An empty
/// result is the empty string.
pub fn merge(separator: &str, exclude: &str, lists: &[&str]) -> String {
    let excluded: BTreeSet<&str> = tokens(exclude, separator).collect();

    let merged: BTreeSet<&str> = lists
        .iter()
        .flat_map(|list| tokens(list, separator))
        .filter(|t| !excluded.contains(t))
        .collect();

    merged.into_iter().collect::<Vec<_>>().join(separator)
}
