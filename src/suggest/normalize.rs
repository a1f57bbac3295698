//! Organization name normalization for duplicate detection
//!
//! - Unicode NFKC fold
//! - Lowercase
//! - Punctuation replaced with space
//! - Whitespace collapsed
//! - Legal suffix tokens removed

use unicode_normalization::UnicodeNormalization;

/// Legal-form tokens dropped before comparing names
const LEGAL_SUFFIXES: &[&str] = &[
    "inc",
    "incorporated",
    "corp",
    "corporation",
    "co",
    "company",
    "llc",
    "ltd",
    "limited",
    "plc",
    "sa",
    "ag",
    "gmbh",
    "kg",
    "kgaa",
    "lp",
    "llp",
    "nv",
    "bv",
    "sarl",
    "sas",
    "se",
    "pte",
    "pty",
];

/// Normalize an organization name for grouping.
///
/// ```
/// use patent_harvest::suggest::normalize::normalize_org_name;
///
/// assert_eq!(normalize_org_name("Acme, Inc."), "acme");
/// assert_eq!(normalize_org_name("ACME Incorporated"), "acme");
/// assert_eq!(normalize_org_name("Siemens Healthcare GmbH"), "siemens healthcare");
/// ```
pub fn normalize_org_name(name: &str) -> String {
    let folded: String = name.nfkc().collect();

    let stripped: String = folded
        .chars()
        .flat_map(|c| {
            let c = if c.is_alphanumeric() || c == '_' { c } else { ' ' };
            c.to_lowercase()
        })
        .collect();

    stripped
        .split_whitespace()
        .filter(|t| !is_legal_suffix(t))
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_legal_suffix(token: &str) -> bool {
    LEGAL_SUFFIXES.contains(&token)
}
