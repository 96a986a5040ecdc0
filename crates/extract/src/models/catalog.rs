use super::SeriesPosition;
use time::{Date, OffsetDateTime};

/// Product data from the catalog service. Every field is optional: the
/// catalog is an enrichment source, never a requirement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogMetadata {
    pub asin: Option<String>,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub authors: Vec<String>,
    pub narrators: Vec<String>,
    pub series: Vec<SeriesPosition>,
    pub release_date: Option<Date>,
    pub publication_datetime: Option<OffsetDateTime>,
    pub language: Option<String>,
    /// `unabridged`, `abridged`, ...
    pub format_type: Option<String>,
    /// Publisher summary; HTML.
    pub description: Option<String>,
    pub sku: Option<String>,
    pub sku_lite: Option<String>,
}
