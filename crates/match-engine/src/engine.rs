use std::borrow::Cow;
use std::sync::Arc;

use gamepilot_core_types::Rect;
use image::{imageops, GenericImageView};
use template_store::Template;
use tracing::{debug, warn};

use crate::capture::FrameSource;
use crate::correlate;
use crate::errors::MatchError;
use crate::models::{ColorMatch, ColorRange, Frame, MatchEngineConfig, MatchResult};

/// Stateless matcher; cloning only copies its configuration.
#[derive(Clone, Debug, Default)]
pub struct MatchEngine {
    config: MatchEngineConfig,
}

impl MatchEngine {
    pub fn new(config: MatchEngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatchEngineConfig {
        &self.config
    }

    /// Looks for `template` anywhere in the frame.
    pub fn find_template(&self, frame: &Frame, template: &Template, threshold: f64) -> MatchResult {
        self.find_template_in(frame, template, threshold, None)
    }

    /// Looks for `template` inside `region` (clamped to the frame). A region
    /// outside the frame or smaller than the template is a miss with zero
    /// confidence, never an error.
    pub fn find_template_in(
        &self,
        frame: &Frame,
        template: &Template,
        threshold: f64,
        region: Option<Rect>,
    ) -> MatchResult {
        let label = template.key.to_string();
        let area = match region {
            Some(region) => match region.clamp_to(frame.width(), frame.height()) {
                Some(area) => area,
                None => return MatchResult::not_found(label),
            },
            None => frame.bounds(),
        };
        if template.width() == 0
            || template.height() == 0
            || template.width() > area.width
            || template.height() > area.height
        {
            debug!(template = %label, "template larger than search area");
            return MatchResult::not_found(label);
        }

        let haystack = if area == frame.bounds() {
            Cow::Borrowed(frame.luma())
        } else {
            Cow::Owned(
                imageops::crop_imm(
                    frame.luma(),
                    area.x as u32,
                    area.y as u32,
                    area.width,
                    area.height,
                )
                .to_image(),
            )
        };

        let Some(hit) = correlate::search(&haystack, &template.image, &self.config) else {
            return MatchResult::not_found(label);
        };

        let bounds = Rect::new(
            area.x + hit.x as i32,
            area.y + hit.y as i32,
            template.width(),
            template.height(),
        );
        let found = hit.confidence >= threshold;
        MatchResult {
            template: label,
            found,
            confidence: hit.confidence,
            position: found.then(|| bounds.center()),
            bounds: Some(bounds),
        }
    }

    /// Batch lookup against one frame.
    pub fn find_multiple(
        &self,
        frame: &Frame,
        templates: &[Arc<Template>],
        threshold: f64,
    ) -> Vec<MatchResult> {
        templates
            .iter()
            .map(|template| self.find_template(frame, template, threshold))
            .collect()
    }

    /// Counts pixels inside `range` within `region` (or the whole frame).
    pub fn detect_color(&self, frame: &Frame, range: &ColorRange, region: Option<Rect>) -> ColorMatch {
        let area = match region {
            Some(region) => match region.clamp_to(frame.width(), frame.height()) {
                Some(area) => area,
                None => return ColorMatch::default(),
            },
            None => frame.bounds(),
        };

        let view = imageops::crop_imm(
            frame.rgba(),
            area.x as u32,
            area.y as u32,
            area.width,
            area.height,
        );
        let matching_pixels = view
            .pixels()
            .filter(|(_, _, px)| range.contains([px.0[0], px.0[1], px.0[2]]))
            .count() as u64;
        let total_pixels = area.width as u64 * area.height as u64;

        let mut result = ColorMatch {
            found: false,
            matching_pixels,
            total_pixels,
        };
        result.found = matching_pixels > 0 && result.ratio() >= range.min_ratio;
        result
    }

    /// [`MatchEngine::find_multiple`] on the blocking pool.
    pub async fn match_all(
        &self,
        frame: Frame,
        templates: Vec<Arc<Template>>,
        threshold: f64,
    ) -> Result<Vec<MatchResult>, MatchError> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.find_multiple(&frame, &templates, threshold))
            .await
            .map_err(|e| MatchError::Worker(format!("Task join error: {}", e)))
    }

    /// Captures once and looks for `template`. An unavailable capture is a
    /// miss; only a failing capture capability is an error.
    pub async fn locate(
        &self,
        source: &dyn FrameSource,
        template: Arc<Template>,
        threshold: f64,
        region: Option<Rect>,
    ) -> Result<MatchResult, MatchError> {
        let frame = match source.capture_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                warn!(template = %template.key, "capture unavailable");
                return Ok(MatchResult::not_found(template.key.to_string()));
            }
            Err(err) => return Err(MatchError::Capture(err)),
        };

        let engine = self.clone();
        tokio::task::spawn_blocking(move || {
            engine.find_template_in(&frame, &template, threshold, region)
        })
        .await
        .map_err(|e| MatchError::Worker(format!("Task join error: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::FrameSequence;
    use async_trait::async_trait;
    use gamepilot_core_types::{PilotError, Point};
    use image::{DynamicImage, GrayImage, Luma, Rgba, RgbaImage};
    use template_store::TemplateKey;

    fn scene_frame() -> RgbaImage {
        let mut img = RgbaImage::from_fn(120, 80, |x, y| {
            let v = ((x * 7 + y * 3) % 50) as u8 + 20;
            Rgba([v, v, v, 255])
        });
        // Bright red button at (70, 30), 16x12.
        for y in 30..42 {
            for x in 70..86 {
                let edge = x == 70 || y == 30;
                img.put_pixel(x, y, if edge { Rgba([255, 255, 255, 255]) } else { Rgba([220, 30, 30, 255]) });
            }
        }
        img
    }

    fn template_from(img: &RgbaImage, x: u32, y: u32, w: u32, h: u32) -> Template {
        let crop = imageops::crop_imm(img, x, y, w, h).to_image();
        Template::from_image(
            TemplateKey::new("buttons", "start"),
            DynamicImage::ImageRgba8(crop).to_luma8(),
            None,
        )
    }

    #[test]
    fn finds_cropped_template_with_center_position() {
        let img = scene_frame();
        let template = template_from(&img, 70, 30, 16, 12);
        let frame = Frame::from_rgba(img);
        let engine = MatchEngine::default();

        let result = engine.find_template(&frame, &template, 0.95);
        assert!(result.found);
        assert!(result.confidence >= 0.95 && result.confidence <= 1.0);
        assert_eq!(result.bounds, Some(Rect::new(70, 30, 16, 12)));
        assert_eq!(result.position, Some(Point::new(78, 36)));
        assert_eq!(result.template, "buttons/start");
    }

    #[test]
    fn absent_template_is_below_threshold() {
        let frame = Frame::from_rgba(scene_frame());
        let checker = GrayImage::from_fn(10, 10, |x, y| {
            Luma([if (x + y) % 2 == 0 { 0 } else { 255 }])
        });
        let template = Template::from_image(TemplateKey::new("icons", "checker"), checker, None);
        let result = MatchEngine::default().find_template(&frame, &template, 0.9);
        assert!(!result.found);
        assert!(result.position.is_none());
        assert!(result.confidence < 0.9);
    }

    #[test]
    fn region_restricts_the_search() {
        let img = scene_frame();
        let template = template_from(&img, 70, 30, 16, 12);
        let frame = Frame::from_rgba(img);
        let engine = MatchEngine::default();

        let inside = engine.find_template_in(&frame, &template, 0.95, Some(Rect::new(60, 20, 40, 40)));
        assert!(inside.found);
        assert_eq!(inside.position, Some(Point::new(78, 36)));

        let elsewhere = engine.find_template_in(&frame, &template, 0.95, Some(Rect::new(0, 0, 50, 50)));
        assert!(!elsewhere.found);

        let too_small = engine.find_template_in(&frame, &template, 0.5, Some(Rect::new(70, 30, 8, 8)));
        assert_eq!(too_small, MatchResult::not_found("buttons/start"));

        let off_frame = engine.find_template_in(&frame, &template, 0.5, Some(Rect::new(500, 500, 40, 40)));
        assert_eq!(off_frame.confidence, 0.0);
    }

    #[test]
    fn template_larger_than_frame_is_a_miss() {
        let frame = Frame::from_rgba(RgbaImage::new(8, 8));
        let template = Template::from_image(TemplateKey::new("scenes", "big"), GrayImage::new(9, 4), None);
        let result = MatchEngine::default().find_template(&frame, &template, 0.1);
        assert!(!result.found);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn detect_color_counts_pixels_in_range() {
        let frame = Frame::from_rgba(scene_frame());
        let engine = MatchEngine::default();
        let red = ColorRange::new([200, 0, 0], [255, 60, 60]);

        let whole = engine.detect_color(&frame, &red, None);
        assert!(whole.found);
        assert_eq!(whole.matching_pixels, 15 * 11);
        assert_eq!(whole.total_pixels, 120 * 80);

        let region = engine.detect_color(&frame, &red, Some(Rect::new(0, 0, 40, 40)));
        assert!(!region.found);
        assert_eq!(region.total_pixels, 1600);

        let strict = engine.detect_color(&frame, &red.with_min_ratio(0.5), None);
        assert!(!strict.found);
        assert_eq!(strict.matching_pixels, whole.matching_pixels);
    }

    #[test]
    fn find_multiple_keeps_input_order() {
        let img = scene_frame();
        let hit = Arc::new(template_from(&img, 70, 30, 16, 12));
        let miss = Arc::new(Template::from_image(
            TemplateKey::new("icons", "huge"),
            GrayImage::new(200, 10),
            None,
        ));
        let frame = Frame::from_rgba(img);
        let results = MatchEngine::default().find_multiple(&frame, &[hit, miss], 0.95);
        assert_eq!(results.len(), 2);
        assert!(results[0].found);
        assert_eq!(results[1].template, "icons/huge");
        assert!(!results[1].found);
    }

    struct BrokenCapture;

    #[async_trait]
    impl FrameSource for BrokenCapture {
        async fn capture_frame(&self) -> Result<Option<Frame>, PilotError> {
            Err(PilotError::new("capture api unavailable"))
        }
    }

    #[tokio::test]
    async fn locate_distinguishes_unavailable_from_failure() {
        let img = scene_frame();
        let template = Arc::new(template_from(&img, 70, 30, 16, 12));
        let engine = MatchEngine::default();

        let source = FrameSequence::new(vec![Frame::from_rgba(img)]);
        let found = engine.locate(&source, template.clone(), 0.95, None).await.unwrap();
        assert!(found.found);

        let empty = FrameSequence::new(Vec::new());
        let missing = engine.locate(&empty, template.clone(), 0.95, None).await.unwrap();
        assert!(!missing.found);
        assert_eq!(missing.confidence, 0.0);

        let err = engine.locate(&BrokenCapture, template, 0.95, None).await.unwrap_err();
        assert!(matches!(err, MatchError::Capture(_)));
    }

    #[test]
    fn match_all_runs_on_blocking_pool() {
        let img = scene_frame();
        let template = Arc::new(template_from(&img, 70, 30, 16, 12));
        let frame = Frame::from_rgba(img);
        let results =
            tokio_test::block_on(MatchEngine::default().match_all(frame, vec![template], 0.9))
                .unwrap();
        assert!(results[0].found);
    }
}
