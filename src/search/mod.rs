//! Template search: registry, ZNCC kernel and the single/batch matcher
//!
//! A search resolves its template by handle, clamps the optional region of
//! interest to the source, scans every placement that fits and reports the
//! best one if it reaches the threshold. Every input problem (stale handle,
//! off-image region, template larger than the area, undecodable source) ends
//! in the not-found result rather than an error.

pub mod registry;
pub mod source;
pub mod template;
pub mod zncc;

use std::sync::Arc;
use std::time::Instant;

use image::RgbImage;
use serde::{Deserialize, Serialize};

pub use registry::{FIRST_HANDLE, TemplateStore};
pub use source::SourceImage;
pub use template::Template;
pub use zncc::{IntegralImage, Placement, PreparedSource};

use crate::model::{PixelRect, Region, SearchResult, TemplateHandle};

/// One entry of a batch search
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub template:  TemplateHandle,
    /// Region to search; `None` searches the whole image
    #[serde(default)]
    pub roi:       Option<Region>,
    pub threshold: f64,
}

impl SearchRequest {
    pub fn new(template: TemplateHandle, threshold: f64) -> Self {
        Self {
            template,
            roi: None,
            threshold,
        }
    }

    pub fn with_roi(mut self, roi: Region) -> Self {
        self.roi = Some(roi);
        self
    }

    /// Builds a request from boundary arguments (`w <= 0 || h <= 0` is the
    /// whole image)
    pub fn from_boundary(template: i32, x: i32, y: i32, w: i32, h: i32, threshold: f64) -> Self {
        Self {
            template: TemplateHandle::new(template),
            roi: Region::from_boundary(x, y, w, h),
            threshold,
        }
    }
}

/// Batch result echoing the request's template handle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchResultItem {
    pub template: TemplateHandle,
    pub x:        i32,
    pub y:        i32,
    pub score:    f64,
}

impl BatchResultItem {
    pub fn new(template: TemplateHandle, result: SearchResult) -> Self {
        Self {
            template,
            x: result.x,
            y: result.y,
            score: result.score,
        }
    }

    pub fn not_found(template: TemplateHandle) -> Self {
        Self::new(template, SearchResult::NOT_FOUND)
    }

    pub fn result(&self) -> SearchResult {
        SearchResult {
            x:     self.x,
            y:     self.y,
            score: self.score,
        }
    }
}

/// Searches `template` inside `source`, optionally restricted to `roi`
///
/// Coordinates in the result are relative to the whole source image.
pub fn search_template(
    source: &PreparedSource,
    template: &Template,
    roi: Option<Region>,
    threshold: f64,
) -> SearchResult {
    let area = match roi {
        None => PixelRect::full(source.width(), source.height()),
        Some(region) => match region.clamp_to(source.width(), source.height()) {
            Some(area) => area,
            None => return SearchResult::NOT_FOUND,
        },
    };

    match zncc::best_match(source, template, area) {
        Some(best) if best.score >= threshold => {
            SearchResult::found(best.x as i32, best.y as i32, best.score)
        }
        _ => SearchResult::NOT_FOUND,
    }
}

/// Runs searches against the templates of one [`TemplateStore`]
#[derive(Debug, Clone)]
pub struct Matcher {
    templates: Arc<TemplateStore>,
}

impl Matcher {
    pub fn new(templates: Arc<TemplateStore>) -> Self {
        Self { templates }
    }

    pub fn templates(&self) -> &Arc<TemplateStore> {
        &self.templates
    }

    /// Single search against an already prepared source
    pub fn search(&self, source: &PreparedSource, request: &SearchRequest) -> SearchResult {
        let Some(template) = self.templates.get(request.template) else {
            tracing::debug!(template = %request.template, "Template not registered");
            return SearchResult::NOT_FOUND;
        };

        let started = Instant::now();
        let result = search_template(source, &template, request.roi, request.threshold);
        tracing::debug!(
            template = %request.template,
            x = result.x,
            y = result.y,
            score = result.score,
            duration_us = started.elapsed().as_micros() as u64,
            "Search finished"
        );
        result
    }

    /// Single search against a decoded image
    pub fn search_image(&self, image: RgbImage, request: &SearchRequest) -> SearchResult {
        if image.width() == 0 || image.height() == 0 {
            return SearchResult::NOT_FOUND;
        }
        self.search(&PreparedSource::new(image), request)
    }

    /// Runs every request against one prepared source
    ///
    /// Results keep the order and length of `requests`.
    pub fn search_batch(
        &self,
        source: &PreparedSource,
        requests: &[SearchRequest],
    ) -> Vec<BatchResultItem> {
        requests
            .iter()
            .map(|request| BatchResultItem::new(request.template, self.search(source, request)))
            .collect()
    }

    /// Decodes `source` once and runs the batch against it
    ///
    /// A source that cannot be decoded yields not-found for every request.
    pub fn search_batch_source(
        &self,
        source: SourceImage<'_>,
        requests: &[SearchRequest],
    ) -> Vec<BatchResultItem> {
        if requests.is_empty() {
            return Vec::new();
        }

        match source.decode() {
            Ok(image) => {
                let started = Instant::now();
                let prepared = PreparedSource::new(image);
                let results = self.search_batch(&prepared, requests);
                tracing::debug!(
                    requests = requests.len(),
                    found = results.iter().filter(|r| r.result().is_found()).count(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Batch search finished"
                );
                results
            }
            Err(e) => {
                tracing::warn!(error = %e, "Batch source could not be decoded");
                requests
                    .iter()
                    .map(|request| BatchResultItem::not_found(request.template))
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    fn red_square_scene() -> (RgbImage, RgbImage) {
        let template = RgbImage::from_pixel(10, 10, Rgb([255, 0, 0]));
        let mut scene = RgbImage::new(100, 100);
        image::imageops::replace(&mut scene, &template, 42, 17);
        (scene, template)
    }

    fn matcher_with(template: RgbImage) -> (Matcher, TemplateHandle) {
        let store = Arc::new(TemplateStore::new());
        let handle = store.insert(Template::new(template).unwrap()).unwrap();
        (Matcher::new(store), handle)
    }

    #[test]
    fn test_finds_red_square() {
        let (scene, template) = red_square_scene();
        let (matcher, handle) = matcher_with(template);

        let result = matcher.search_image(scene, &SearchRequest::new(handle, 0.99));
        assert_eq!((result.x, result.y), (42, 17));
        assert!((result.score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_roi_result_is_in_source_coordinates() {
        let (scene, template) = red_square_scene();
        let (matcher, handle) = matcher_with(template);
        let source = PreparedSource::new(scene);

        let request = SearchRequest::new(handle, 0.9).with_roi(Region::new(30, 10, 40, 40));
        let result = matcher.search(&source, &request);
        assert_eq!((result.x, result.y), (42, 17));
    }

    #[test]
    fn test_roi_excluding_match_is_not_found() {
        let (scene, template) = red_square_scene();
        let (matcher, handle) = matcher_with(template);
        let source = PreparedSource::new(scene);

        let request = SearchRequest::new(handle, 0.9).with_roi(Region::new(60, 60, 40, 40));
        assert_eq!(matcher.search(&source, &request), SearchResult::NOT_FOUND);
    }

    #[test]
    fn test_threshold_above_one_never_matches() {
        let (scene, template) = red_square_scene();
        let (matcher, handle) = matcher_with(template);

        let result = matcher.search_image(scene, &SearchRequest::new(handle, 1.01));
        assert_eq!(result, SearchResult::NOT_FOUND);
    }

    #[test]
    fn test_negative_threshold_reports_best_placement() {
        let (matcher, handle) = matcher_with(RgbImage::from_pixel(4, 4, Rgb([255, 0, 0])));
        // Flat source: every placement scores 0
        let result = matcher.search_image(RgbImage::new(10, 10), &SearchRequest::new(handle, -0.5));
        assert_eq!((result.x, result.y, result.score), (0, 0, 0.0));
    }

    #[test]
    fn test_unknown_handle_is_not_found() {
        let (scene, _) = red_square_scene();
        let (matcher, _) = matcher_with(RgbImage::from_pixel(2, 2, Rgb([1, 2, 3])));

        let result = matcher.search_image(scene, &SearchRequest::new(TemplateHandle::new(77), 0.0));
        assert_eq!(result, SearchResult::NOT_FOUND);
    }

    #[test]
    fn test_request_from_boundary() {
        let whole = SearchRequest::from_boundary(3, 5, 5, -1, 10, 0.8);
        assert_eq!(whole.roi, None);
        assert_eq!(whole.template.get(), 3);

        let roi = SearchRequest::from_boundary(3, 5, 6, 7, 8, 0.8);
        assert_eq!(roi.roi, Some(Region::new(5, 6, 7, 8)));
    }

    #[test]
    fn test_batch_with_undecodable_source() {
        let (matcher, handle) = matcher_with(RgbImage::from_pixel(2, 2, Rgb([1, 2, 3])));
        let requests = [SearchRequest::new(handle, 0.5), SearchRequest::new(handle, 0.1)];

        let results = matcher.search_batch_source(SourceImage::Encoded(b"garbage"), &requests);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.result().is_found()));
        assert!(results.iter().all(|r| r.template == handle));
    }

    #[test]
    fn test_empty_batch() {
        let (matcher, _) = matcher_with(RgbImage::from_pixel(2, 2, Rgb([1, 2, 3])));
        assert!(matcher.search_batch_source(SourceImage::Encoded(b"x"), &[]).is_empty());
    }
}
