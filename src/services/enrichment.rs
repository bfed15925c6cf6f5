//! Best-effort enrichment of draft items.

use crate::models::ContentItem;

/// What an enricher found for a source link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enrichment {
    /// Article body or summary.
    pub body: Option<String>,
    /// Representative image.
    pub image_url: Option<String>,
}

/// Fetches body text and an image for a source link.
///
/// Failure of any kind means "no enrichment"; implementations return
/// `None` rather than an error.
pub trait Enricher: Send + Sync {
    /// Looks up `link`.
    fn enrich(&self, link: &str) -> Option<Enrichment>;
}

/// An enricher that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEnricher;

impl Enricher for NoopEnricher {
    fn enrich(&self, _link: &str) -> Option<Enrichment> {
        None
    }
}

/// Drops image references that are unlikely to be real content images.
#[derive(Debug, Clone)]
pub struct ImageFilter {
    bad_markers: Vec<String>,
}

impl Default for ImageFilter {
    fn default() -> Self {
        Self::new(crate::config::StoreConfig::default().bad_image_markers)
    }
}

impl ImageFilter {
    /// Creates a filter rejecting URLs that contain any marker
    /// (case-insensitive).
    #[must_use]
    pub fn new(bad_markers: Vec<String>) -> Self {
        Self {
            bad_markers: bad_markers
                .into_iter()
                .map(|m| m.to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    /// Returns true if `url` is an `https://` URL free of bad markers.
    #[must_use]
    pub fn accepts(&self, url: &str) -> bool {
        let url = url.trim();
        if !url.starts_with("https://") {
            return false;
        }
        let lower = url.to_lowercase();
        !self.bad_markers.iter().any(|m| lower.contains(m.as_str()))
    }

    /// Keeps `url` only if it is acceptable.
    #[must_use]
    pub fn clean(&self, url: Option<String>) -> Option<String> {
        url.filter(|u| self.accepts(u))
    }
}

/// Fills a missing body or image from `enricher`, then filters the image.
///
/// An item left without an image is still valid.
#[must_use]
pub fn enrich_item(item: ContentItem, enricher: &dyn Enricher, filter: &ImageFilter) -> ContentItem {
    let needs_body = item.body.trim().is_empty();
    let image = filter.clean(item.image_url.clone());
    let found = if needs_body || image.is_none() {
        enricher.enrich(&item.link)
    } else {
        None
    };

    let mut item = item;
    let (body, found_image) = found.map_or((None, None), |e| (e.body, e.image_url));
    if needs_body && let Some(body) = body.filter(|b| !b.trim().is_empty()) {
        item.body = body;
    }
    let image = image.or_else(|| filter.clean(found_image));
    item.with_image(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Score;
    use chrono::{TimeZone, Utc};
    use test_case::test_case;

    struct Fixed(Enrichment);

    impl Enricher for Fixed {
        fn enrich(&self, _link: &str) -> Option<Enrichment> {
            Some(self.0.clone())
        }
    }

    fn draft(body: &str, image: Option<&str>) -> ContentItem {
        ContentItem::new(
            "K-Pop",
            "https://news/1",
            "t",
            body,
            Score::new(5.0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
        )
        .unwrap()
        .with_image(image.map(ToString::to_string))
    }

    #[test_case("https://img.example/photo.jpg", true ; "plain https")]
    #[test_case("http://img.example/photo.jpg", false ; "not https")]
    #[test_case("https://site/static/LOGO.png", false ; "logo marker")]
    #[test_case("https://site/thumb/123.jpg", false ; "thumb marker")]
    #[test_case("data:image/png;base64,xx", false ; "data uri")]
    fn test_image_filter(url: &str, accepted: bool) {
        assert_eq!(ImageFilter::default().accepts(url), accepted);
    }

    #[test]
    fn test_enrich_fills_missing_fields() {
        let enricher = Fixed(Enrichment {
            body: Some("full story".to_string()),
            image_url: Some("https://img/2.jpg".to_string()),
        });
        let item = enrich_item(
            draft("", Some("https://site/icon.png")),
            &enricher,
            &ImageFilter::default(),
        );
        assert_eq!(item.body, "full story");
        assert_eq!(item.image_url.as_deref(), Some("https://img/2.jpg"));
    }

    #[test]
    fn test_enrich_keeps_existing() {
        let enricher = Fixed(Enrichment {
            body: Some("other".to_string()),
            image_url: Some("https://img/2.jpg".to_string()),
        });
        let item = enrich_item(
            draft("summary", Some("https://img/1.jpg")),
            &enricher,
            &ImageFilter::default(),
        );
        assert_eq!(item.body, "summary");
        assert_eq!(item.image_url.as_deref(), Some("https://img/1.jpg"));
    }

    #[test]
    fn test_noop_leaves_item_without_image() {
        let item = enrich_item(
            draft("summary", Some("https://site/banner.gif")),
            &NoopEnricher,
            &ImageFilter::default(),
        );
        assert!(item.image_url.is_none());
    }
}
