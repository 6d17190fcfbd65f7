use image::imageops::{self, FilterType};
use image::GrayImage;
use imageproc::template_matching::{match_template, MatchTemplateMethod};

use crate::models::MatchEngineConfig;

/// Best placement of a needle, top-left corner in haystack coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Hit {
    pub x: u32,
    pub y: u32,
    pub confidence: f64,
}

/// Maps a sum of squared differences over `pixels` samples onto `[0, 1]`:
/// one minus the root-mean-square error relative to full scale.
pub(crate) fn sse_to_confidence(sse: f64, pixels: u64) -> f64 {
    if pixels == 0 {
        return 0.0;
    }
    let rms = (sse.max(0.0) / pixels as f64).sqrt();
    (1.0 - rms / 255.0).clamp(0.0, 1.0)
}

/// Exhaustive search. `None` when the needle is empty or does not fit.
pub(crate) fn best_match(haystack: &GrayImage, needle: &GrayImage) -> Option<Hit> {
    let (nw, nh) = needle.dimensions();
    if nw == 0 || nh == 0 || nw > haystack.width() || nh > haystack.height() {
        return None;
    }

    let scores = match_template(haystack, needle, MatchTemplateMethod::SumOfSquaredErrors);
    let mut best: Option<(u32, u32, f32)> = None;
    for (x, y, pixel) in scores.enumerate_pixels() {
        let sse = pixel.0[0];
        if best.map_or(true, |(_, _, current)| sse < current) {
            best = Some((x, y, sse));
        }
    }

    best.map(|(x, y, sse)| Hit {
        x,
        y,
        confidence: sse_to_confidence(sse as f64, nw as u64 * nh as u64),
    })
}

/// Coarse-to-fine search used for frames larger than `max_search_dim`.
pub(crate) fn search(haystack: &GrayImage, needle: &GrayImage, config: &MatchEngineConfig) -> Option<Hit> {
    let longest = haystack.width().max(haystack.height());
    if config.max_search_dim == 0 || longest <= config.max_search_dim {
        return best_match(haystack, needle);
    }

    let scale = longest as f64 / config.max_search_dim as f64;
    let shrink = |v: u32| ((v as f64 / scale).round() as u32).max(1);
    let (small_nw, small_nh) = (shrink(needle.width()), shrink(needle.height()));
    if small_nw < config.min_coarse_template || small_nh < config.min_coarse_template {
        return best_match(haystack, needle);
    }

    let small_haystack = imageops::resize(
        haystack,
        shrink(haystack.width()),
        shrink(haystack.height()),
        FilterType::Triangle,
    );
    let small_needle = imageops::resize(needle, small_nw, small_nh, FilterType::Triangle);
    let coarse = best_match(&small_haystack, &small_needle)?;

    let margin = config.refine_margin as i64 + scale.ceil() as i64;
    let window = |origin: u32, needle_len: u32, haystack_len: u32| {
        let guess = (origin as f64 * scale).round() as i64;
        let max_start = (haystack_len - needle_len) as i64;
        let start = (guess - margin).clamp(0, max_start);
        let len = (needle_len as i64 + 2 * margin).min(haystack_len as i64 - start);
        (start as u32, len as u32)
    };
    let (wx, ww) = window(coarse.x, needle.width(), haystack.width());
    let (wy, wh) = window(coarse.y, needle.height(), haystack.height());

    let patch = imageops::crop_imm(haystack, wx, wy, ww, wh).to_image();
    let fine = best_match(&patch, needle)?;
    Some(Hit {
        x: fine.x + wx,
        y: fine.y + wy,
        confidence: fine.confidence,
    })
}
