//! Column label normalization.
//!
//! Output CSVs get snake_case headers so downstream loaders can use them as
//! identifiers without quoting.

use std::collections::HashSet;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Identifier used when a label has no letters or digits at all.
pub const PLACEHOLDER: &str = "column";

/// Normalizes a single raw column label into a snake_case identifier.
///
/// Decomposes the label (NFKD) and drops combining marks, so `é` becomes `e`.
/// Then lowercases, turns every run of characters that are not ASCII letters
/// or digits into a single `_`, and trims underscores from both ends. An empty
/// result becomes [`PLACEHOLDER`].
///
/// Normalizing an already-normalized identifier returns it unchanged.
///
/// # Examples
///
/// ```
/// use sheaf_core::headers::normalize;
///
/// assert_eq!(normalize("Provider ID!!"), "provider_id");
/// assert_eq!(normalize("  __Total $__ "), "total");
/// assert_eq!(normalize("Città Région"), "citta_region");
/// assert_eq!(normalize("%%%"), "column");
/// ```
pub fn normalize(raw_label: &str) -> String {
    let mut out = String::with_capacity(raw_label.len());
    let mut pending_sep = false;

    let chars = raw_label
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase);

    for c in chars {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c);
        } else {
            // '_' and every other separator collapse into one pending '_'
            pending_sep = true;
        }
    }

    if out.is_empty() {
        PLACEHOLDER.to_string()
    } else {
        out
    }
}

/// Normalizes a header row, keeping the result aligned with the input.
///
/// Duplicate identifiers get `_2`, `_3`, ... appended in first-seen order,
/// skipping any suffix already taken by another column, so the output is
/// always a set of distinct identifiers.
///
/// # Examples
///
/// ```
/// use sheaf_core::headers::normalize_all;
///
/// let out = normalize_all(["Provider ID!!", "Total $", "Total#"]);
/// assert_eq!(out, vec!["provider_id", "total", "total_2"]);
/// ```
pub fn normalize_all<I, S>(raw_labels: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut taken: HashSet<String> = HashSet::new();
    let mut out = Vec::new();

    for label in raw_labels {
        let base = normalize(label.as_ref());
        let mut candidate = base.clone();
        let mut n = 2u32;
        while taken.contains(&candidate) {
            candidate = format!("{base}_{n}");
            n += 1;
        }
        taken.insert(candidate.clone());
        out.push(candidate);
    }

    out
}
