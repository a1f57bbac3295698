//! Company rollups and the artifacts derived from them
//!
//! The rollup is recomputed from the whole pair store on every build; there
//! is no incremental path. Exports (JSON, CSV, per-company patent lists and
//! the SQLite index) all derive from one [`RollupOutput`], so they always
//! agree with each other. Company insights are read back from the index.

pub mod builder;
pub mod export;
pub mod index;
pub mod insights;

pub use builder::{build, rank, CompanyRollup, RollupOptions, RollupOutput};
pub use export::{export_all, company_file_stem, ExportError, ExportSummary};
pub use index::{
    build_index, query_patents, query_years, IndexError, IndexedPatent, PatentPage, PatentQuery,
    PatentSort,
};
pub use insights::{query_insights, CompanyInsights, CpcLevel, InsightsQuery};
