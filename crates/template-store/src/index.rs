use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use gamepilot_core_types::SceneId;

use crate::models::{Template, TemplateKey};

/// Immutable snapshot of every loaded template.
#[derive(Debug, Default)]
pub struct TemplateIndex {
    root: Option<PathBuf>,
    scene_kind: String,
    by_key: HashMap<TemplateKey, Arc<Template>>,
    by_kind: BTreeMap<String, Vec<Arc<Template>>>,
    by_scene: BTreeMap<SceneId, Vec<Arc<Template>>>,
    built_at: Option<DateTime<Utc>>,
}

impl TemplateIndex {
    pub fn empty(scene_kind: impl Into<String>) -> Self {
        Self {
            scene_kind: scene_kind.into(),
            ..Self::default()
        }
    }

    pub fn build(
        root: Option<PathBuf>,
        scene_kind: impl Into<String>,
        templates: Vec<Template>,
    ) -> Self {
        let mut index = Self::empty(scene_kind);
        index.root = root;
        index.built_at = Some(Utc::now());

        for template in templates {
            let template = Arc::new(template);
            index
                .by_kind
                .entry(template.key.kind.clone())
                .or_default()
                .push(template.clone());
            if let Some(scene) = template.scene_id() {
                index
                    .by_scene
                    .entry(scene.clone())
                    .or_default()
                    .push(template.clone());
            }
            index.by_key.insert(template.key.clone(), template);
        }

        for list in index.by_kind.values_mut().chain(index.by_scene.values_mut()) {
            list.sort_by(|a, b| a.key.cmp(&b.key));
        }
        index
    }

    pub fn root(&self) -> Option<&PathBuf> {
        self.root.as_ref()
    }

    pub fn built_at(&self) -> Option<DateTime<Utc>> {
        self.built_at
    }

    pub fn get(&self, kind: &str, name: &str) -> Option<Arc<Template>> {
        self.by_key.get(&TemplateKey::new(kind, name)).cloned()
    }

    pub fn has(&self, kind: &str, name: &str) -> bool {
        self.by_key.contains_key(&TemplateKey::new(kind, name))
    }

    pub fn by_type(&self, kind: &str) -> &[Arc<Template>] {
        self.by_kind.get(kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn by_scene_hint(&self, scene: &SceneId) -> &[Arc<Template>] {
        self.by_scene.get(scene).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Templates of the scene type that carry a scene. These identify scenes.
    pub fn scene_templates(&self) -> Vec<Arc<Template>> {
        self.by_type(&self.scene_kind)
            .iter()
            .filter(|template| template.scene.is_some())
            .cloned()
            .collect()
    }

    /// Templates of other types hinted at `scene`; they corroborate a scene
    /// but never identify one on their own.
    pub fn related_templates(&self, scene: &SceneId) -> Vec<Arc<Template>> {
        self.by_scene_hint(scene)
            .iter()
            .filter(|template| template.key.kind != self.scene_kind)
            .cloned()
            .collect()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.by_kind.keys().map(String::as_str)
    }

    pub fn scenes(&self) -> impl Iterator<Item = &SceneId> {
        self.by_scene.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Template>> {
        self.by_kind.values().flat_map(|list| list.iter())
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HintSource, SceneHint};
    use image::GrayImage;

    fn template(kind: &str, name: &str, scene: Option<(&str, HintSource)>) -> Template {
        Template::from_image(
            TemplateKey::new(kind, name),
            GrayImage::new(4, 4),
            scene.map(|(scene, source)| SceneHint {
                scene: SceneId::from(scene),
                source,
            }),
        )
    }

    #[test]
    fn groups_by_kind_and_scene() {
        let index = TemplateIndex::build(
            None,
            "scenes",
            vec![
                template("scenes", "battle", Some(("battle", HintSource::Explicit))),
                template("buttons", "battle_start", Some(("battle", HintSource::Inferred))),
                template("buttons", "confirm", None),
            ],
        );

        assert_eq!(index.len(), 3);
        assert!(index.has("buttons", "confirm"));
        assert!(!index.has("scenes", "confirm"));
        assert_eq!(index.by_type("buttons").len(), 2);
        assert_eq!(index.by_scene_hint(&SceneId::from("battle")).len(), 2);
        assert_eq!(index.scene_templates().len(), 1);

        let related = index.related_templates(&SceneId::from("battle"));
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].name(), "battle_start");
        assert_eq!(index.kinds().collect::<Vec<_>>(), vec!["buttons", "scenes"]);
    }
}
