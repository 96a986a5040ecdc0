use crate::models::{CatalogMetadata, ExtractedMetadata, MergedMetadata};
use time::format_description::well_known::Rfc3339;

/// Removes `<p>` tags, turning each closing tag into a line break.
pub fn strip_html_paragraphs(html: &str) -> String {
    html.replace("<p>", "").replace("</p>", "\n").trim().to_string()
}

fn abridged(extracted: &ExtractedMetadata, catalog: &CatalogMetadata) -> Option<bool> {
    match catalog.format_type.as_deref() {
        Some(format) if format.eq_ignore_ascii_case("unabridged") => Some(false),
        _ if extracted.unabridged_marker => Some(false),
        _ => None,
    }
}

pub(crate) fn merge(extracted: ExtractedMetadata, catalog: CatalogMetadata) -> MergedMetadata {
    let abridged = abridged(&extracted, &catalog);
    let length = extracted.length();
    MergedMetadata {
        title: catalog.title.or(extracted.title),
        subtitle: catalog.subtitle,
        author: if extracted.authors.is_empty() { catalog.authors } else { extracted.authors },
        narrator: catalog.narrators,
        series: catalog.series,
        year: catalog.release_date.map(|date| date.year().to_string()).or(extracted.date),
        description: catalog
            .description
            .as_deref()
            .map(strip_html_paragraphs)
            .filter(|description| !description.is_empty()),
        abridged,
        language: catalog.language,
        published: catalog.publication_datetime.and_then(|published| published.format(&Rfc3339).ok()),
        sku: catalog.sku_lite.or(catalog.sku),
        asin: catalog.asin,
        bitrate_kbs: extracted.bitrate_kbs,
        codec: extracted.codec,
        chapters: extracted.chapters,
        length,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chapter, Chapters, SeriesPosition};
    use rstest::rstest;
    use time::macros::{date, datetime};

    fn extracted() -> ExtractedMetadata {
        ExtractedMetadata {
            title: Some("Container Title".to_string()),
            authors: vec!["Jane Doe".to_string()],
            date: Some("2019".to_string()),
            bitrate_kbs: Some(64),
            codec: Some("aac".to_string()),
            chapters: Chapters::new(vec![Chapter::from((0, 0.0, 60.0))]).unwrap(),
            unabridged_marker: false,
        }
    }

    #[test]
    fn test_empty_catalog_keeps_extracted() {
        let merged = merge(extracted(), CatalogMetadata::default());
        assert_eq!(merged.title.as_deref(), Some("Container Title"));
        assert_eq!(merged.author, vec!["Jane Doe"]);
        assert_eq!(merged.year.as_deref(), Some("2019"));
        assert_eq!(merged.abridged, None);
        assert_eq!(merged.sku, None);
        assert_eq!(merged.length, Some(60.0));
    }

    #[test]
    fn test_catalog_overrides() {
        let catalog = CatalogMetadata {
            asin: Some("B0EXAMPLE".to_string()),
            title: Some("Catalog Title".to_string()),
            subtitle: Some("A Novel".to_string()),
            authors: vec!["Someone Else".to_string()],
            narrators: vec!["Reader".to_string()],
            series: vec![SeriesPosition {
                name: "Saga".to_string(),
                position: Some("2".to_string()),
            }],
            release_date: Some(date!(2021 - 03 - 04)),
            publication_datetime: Some(datetime!(2021-03-04 08:00 UTC)),
            language: Some("english".to_string()),
            sku: Some("BK_FULL".to_string()),
            sku_lite: Some("BK123".to_string()),
            ..Default::default()
        };
        let merged = merge(extracted(), catalog);
        assert_eq!(merged.title.as_deref(), Some("Catalog Title"));
        assert_eq!(merged.subtitle.as_deref(), Some("A Novel"));
        // Extracted authors win when present.
        assert_eq!(merged.author, vec!["Jane Doe"]);
        assert_eq!(merged.narrator, vec!["Reader"]);
        assert_eq!(merged.series.len(), 1);
        assert_eq!(merged.year.as_deref(), Some("2021"));
        assert_eq!(merged.published.as_deref(), Some("2021-03-04T08:00:00Z"));
        assert_eq!(merged.language.as_deref(), Some("english"));
        assert_eq!(merged.sku.as_deref(), Some("BK123"));
        assert_eq!(merged.asin.as_deref(), Some("B0EXAMPLE"));
        assert_eq!(merged.bitrate_kbs, Some(64));
    }

    #[rstest]
    #[case::catalog_date_wins(Some(date!(2021 - 03 - 04)), Some("2019"), Some("2021"))]
    #[case::catalog_date_alone(Some(date!(1965 - 08 - 01)), None, Some("1965"))]
    #[case::extracted_year(None, Some("2019"), Some("2019"))]
    #[case::extracted_date_verbatim(None, Some("2019-05-07"), Some("2019-05-07"))]
    #[case::neither(None, None, None)]
    fn test_year(
        #[case] release_date: Option<time::Date>,
        #[case] extracted_date: Option<&str>,
        #[case] expected: Option<&str>,
    ) {
        let extracted = ExtractedMetadata {
            date: extracted_date.map(str::to_string),
            ..extracted()
        };
        let catalog = CatalogMetadata {
            release_date,
            ..Default::default()
        };
        assert_eq!(merge(extracted, catalog).year.as_deref(), expected);
    }

    #[rstest]
    #[case::catalog_title(Some("Catalog Title"), Some("Container Title"), Some("Catalog Title"))]
    #[case::extracted_title(None, Some("Container Title"), Some("Container Title"))]
    #[case::catalog_only(Some("Catalog Title"), None, Some("Catalog Title"))]
    #[case::no_title(None, None, None)]
    fn test_title(
        #[case] catalog_title: Option<&str>,
        #[case] extracted_title: Option<&str>,
        #[case] expected: Option<&str>,
    ) {
        let extracted = ExtractedMetadata {
            title: extracted_title.map(str::to_string),
            ..extracted()
        };
        let catalog = CatalogMetadata {
            title: catalog_title.map(str::to_string),
            ..Default::default()
        };
        assert_eq!(merge(extracted, catalog).title.as_deref(), expected);
    }

    #[test]
    fn test_length_comes_from_chapters_only() {
        let extracted = ExtractedMetadata {
            chapters: Chapters::default(),
            ..extracted()
        };
        let catalog = CatalogMetadata {
            title: Some("Catalog Title".to_string()),
            ..Default::default()
        };
        assert_eq!(merge(extracted, catalog).length, None);
    }

    #[test]
    fn test_sku_falls_back_to_full_sku() {
        let catalog = CatalogMetadata {
            sku: Some("BK_FULL".to_string()),
            ..Default::default()
        };
        assert_eq!(merge(extracted(), catalog).sku.as_deref(), Some("BK_FULL"));
    }

    #[test]
    fn test_catalog_authors_fill_gap() {
        let extracted = ExtractedMetadata {
            authors: vec![],
            ..extracted()
        };
        let catalog = CatalogMetadata {
            authors: vec!["Catalog Author".to_string()],
            ..Default::default()
        };
        assert_eq!(merge(extracted, catalog).author, vec!["Catalog Author"]);
    }

    #[rstest]
    #[case(Some("Unabridged"), false, Some(false))]
    #[case(Some("unabridged"), false, Some(false))]
    #[case(Some("abridged"), true, Some(false))]
    #[case(Some("abridged"), false, None)]
    #[case(None, true, Some(false))]
    #[case(None, false, None)]
    fn test_abridged(#[case] format_type: Option<&str>, #[case] marker: bool, #[case] expected: Option<bool>) {
        let extracted = ExtractedMetadata {
            unabridged_marker: marker,
            ..extracted()
        };
        let catalog = CatalogMetadata {
            format_type: format_type.map(str::to_string),
            ..Default::default()
        };
        assert_eq!(merge(extracted, catalog).abridged, expected);
    }

    #[rstest]
    #[case("<p>One paragraph.</p>", "One paragraph.")]
    #[case("<p>First.</p><p>Second.</p>", "First.\nSecond.")]
    #[case("  plain text  ", "plain text")]
    #[case("<p>Keeps <b>other</b> tags</p>", "Keeps <b>other</b> tags")]
    fn test_strip_html_paragraphs(#[case] html: &str, #[case] expected: &str) {
        assert_eq!(strip_html_paragraphs(html), expected);
    }

    #[test]
    fn test_empty_description_is_absent() {
        let catalog = CatalogMetadata {
            description: Some("<p></p>".to_string()),
            ..Default::default()
        };
        assert_eq!(merge(extracted(), catalog).description, None);
    }
}
