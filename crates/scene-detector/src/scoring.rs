use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use gamepilot_core_types::SceneId;
use match_engine::{Frame, MatchEngine};
use template_store::{Template, TemplateIndex};

use crate::models::DetectionResult;

const TIE_EPSILON: f64 = 1e-9;

/// Highest-confidence scene. Ties go to `previous` when it is among the
/// tied scenes, otherwise to the lexicographically smallest scene id.
pub fn pick_best(candidates: &BTreeMap<SceneId, f64>, previous: &SceneId) -> Option<(SceneId, f64)> {
    let mut best: Option<(&SceneId, f64)> = None;
    for (scene, &confidence) in candidates {
        let replace = match best {
            None => true,
            Some((_, score)) if confidence > score + TIE_EPSILON => true,
            Some((_, score)) => (confidence - score).abs() <= TIE_EPSILON && scene == previous,
        };
        if replace {
            best = Some((scene, confidence));
        }
    }
    best.map(|(scene, confidence)| (scene.clone(), confidence))
}

/// Scores one frame. Runs on the blocking pool.
pub fn score_frame(
    engine: &MatchEngine,
    frame: &Frame,
    index: &TemplateIndex,
    scene_templates: &[Arc<Template>],
    threshold: f64,
    corroboration_bonus: f64,
    previous: &SceneId,
) -> DetectionResult {
    let results = engine.find_multiple(frame, scene_templates, threshold);

    let mut best_by_scene: BTreeMap<SceneId, f64> = BTreeMap::new();
    let mut matched: BTreeMap<SceneId, Vec<String>> = BTreeMap::new();
    for (template, result) in scene_templates.iter().zip(results) {
        let Some(scene) = template.scene_id() else {
            continue;
        };
        if !result.found {
            continue;
        }
        let entry = best_by_scene.entry(scene.clone()).or_insert(0.0);
        *entry = entry.max(result.confidence);
        matched.entry(scene.clone()).or_default().push(result.template);
    }

    let Some((scene, mut confidence)) = pick_best(&best_by_scene, previous) else {
        return DetectionResult::unknown();
    };
    let mut matched_templates = matched.remove(&scene).unwrap_or_default();

    let related = index.related_templates(&scene);
    for result in engine.find_multiple(frame, &related, threshold) {
        if result.found {
            confidence = (confidence + corroboration_bonus).min(1.0);
            matched_templates.push(result.template);
        }
    }

    DetectionResult {
        scene,
        confidence: confidence.clamp(0.0, 1.0),
        matched_templates,
        timestamp: Utc::now(),
        detection_time_ms: 0,
    }
}
