//! Analysis modules.
//!
//! Correlation statistics over enriched articles, the concertina merge of
//! their rankings, and year-over-year facet comparisons.

pub mod concertina;
pub mod correlate;
pub mod year;

pub use correlate::{correlate_merged_annotations, CorrelateOptions, GroupCorrelations, GroupSelector};
pub use year::{classify, ClassifyParams, YearComparator};
