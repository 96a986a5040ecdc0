//! Wire shapes of the catalog service. Everything is optional; the client
//! decides what is required.

use crate::models::Quality;
use earmark_extract::models::{CatalogMetadata, SeriesPosition};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

#[derive(Debug, Serialize)]
pub(crate) struct LicenseRequest {
    pub drm_type: &'static str,
    pub consumption_type: &'static str,
    pub quality: Quality,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LicenseEnvelope {
    pub content_license: Option<ContentLicense>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentLicense {
    pub asin: Option<String>,
    pub status_code: Option<String>,
    pub message: Option<String>,
    pub content_metadata: Option<ContentMetadata>,
    pub license_response: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentMetadata {
    pub content_url: Option<ContentUrl>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentUrl {
    pub offline_url: Option<String>,
}

/// Error bodies carry a human-readable `message`.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ItemEnvelope {
    pub item: Option<LibraryItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ItemsEnvelope {
    pub items: Option<Vec<LibraryItem>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Contributor {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Series {
    pub title: Option<String>,
    pub sequence: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct LibraryItem {
    pub asin: Option<String>,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub authors: Option<Vec<Contributor>>,
    pub narrators: Option<Vec<Contributor>>,
    pub series: Option<Vec<Series>>,
    pub release_date: Option<String>,
    pub publication_datetime: Option<String>,
    pub language: Option<String>,
    pub format_type: Option<String>,
    pub publisher_summary: Option<String>,
    pub merchandising_summary: Option<String>,
    pub sku: Option<String>,
    pub sku_lite: Option<String>,
}
impl LibraryItem {
    pub fn has_sku(&self, sku: &str) -> bool {
        self.sku.as_deref() == Some(sku) || self.sku_lite.as_deref() == Some(sku)
    }
}

fn names(contributors: Option<Vec<Contributor>>) -> Vec<String> {
    contributors.unwrap_or_default().into_iter().filter_map(|c| c.name).filter(|n| !n.trim().is_empty()).collect()
}

impl From<LibraryItem> for CatalogMetadata {
    fn from(item: LibraryItem) -> Self {
        let release_date =
            item.release_date.as_deref().and_then(|d| Date::parse(d, format_description!("[year]-[month]-[day]")).ok());
        let publication_datetime =
            item.publication_datetime.as_deref().and_then(|d| OffsetDateTime::parse(d, &Rfc3339).ok());
        CatalogMetadata {
            asin: item.asin,
            title: item.title,
            subtitle: item.subtitle,
            authors: names(item.authors),
            narrators: names(item.narrators),
            series: item
                .series
                .unwrap_or_default()
                .into_iter()
                .filter_map(|s| {
                    Some(SeriesPosition {
                        name: s.title?,
                        position: s.sequence.filter(|p| !p.is_empty()),
                    })
                })
                .collect(),
            release_date,
            publication_datetime,
            language: item.language,
            format_type: item.format_type,
            description: item.publisher_summary.or(item.merchandising_summary),
            sku: item.sku,
            sku_lite: item.sku_lite,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::{date, datetime};

    #[test]
    fn test_library_item_conversion() {
        let item: ItemEnvelope = serde_json::from_value(json!({
            "item": {
                "asin": "B0X",
                "title": "My Book",
                "authors": [{ "asin": "A1", "name": "Jane Doe" }, { "name": "" }],
                "narrators": [{ "name": "Reader" }],
                "series": [{ "asin": "S1", "title": "Saga", "sequence": "2" }, { "sequence": "3" }],
                "release_date": "2020-06-01",
                "publication_datetime": "2020-06-01T07:00:00Z",
                "format_type": "unabridged",
                "merchandising_summary": "<p>Short.</p>",
                "publisher_summary": "<p>Long.</p>",
                "sku_lite": "BK123",
                "runtime_length_min": 300
            }
        }))
        .unwrap();
        let metadata = CatalogMetadata::from(item.item.unwrap());
        assert_eq!(metadata.authors, vec!["Jane Doe"]);
        assert_eq!(metadata.narrators, vec!["Reader"]);
        assert_eq!(metadata.series.len(), 1);
        assert_eq!(metadata.series[0].position.as_deref(), Some("2"));
        assert_eq!(metadata.release_date, Some(date!(2020 - 06 - 01)));
        assert_eq!(metadata.publication_datetime, Some(datetime!(2020-06-01 07:00 UTC)));
        assert_eq!(metadata.description.as_deref(), Some("<p>Long.</p>"));
        assert_eq!(metadata.sku_lite.as_deref(), Some("BK123"));
    }

    #[test]
    fn test_null_lists_and_bad_dates() {
        let item: LibraryItem = serde_json::from_value(json!({
            "authors": null,
            "series": null,
            "release_date": "sometime"
        }))
        .unwrap();
        let metadata = CatalogMetadata::from(item);
        assert!(metadata.authors.is_empty());
        assert!(metadata.series.is_empty());
        assert_eq!(metadata.release_date, None);
    }

    #[test]
    fn test_license_request_body() {
        let body = LicenseRequest {
            drm_type: "Adrm",
            consumption_type: "Download",
            quality: Quality::High,
        };
        assert_eq!(
            serde_json::to_value(body).unwrap(),
            json!({ "drm_type": "Adrm", "consumption_type": "Download", "quality": "High" })
        );
    }
}
