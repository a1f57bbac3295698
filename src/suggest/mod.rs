//! Normalization suggestions
//!
//! Read-only analytics over a sector store: raw organization names that
//! normalize to the same string under different assignee ids are reported as
//! candidate duplicates for a human to map. Nothing here feeds back into
//! canonicalization.

pub mod normalize;
pub mod report;

pub use normalize::normalize_org_name;
pub use report::{find_candidates, render_markdown, write_report, SuggestionGroup};
