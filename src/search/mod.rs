//! Search stages: query construction, pagination and enrichment.

pub mod annotations;
pub mod enrich;
pub mod paginator;
pub mod query;

pub use annotations::AnnotationLookup;
pub use enrich::Enricher;
pub use paginator::{Budget, Paginator};
pub use query::{FacetSpec, SearchParams, SearchQuery};
