use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use gamepilot_core_types::SceneId;
use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Lookup key: template type (the first directory under the root) and name.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TemplateKey {
    pub kind: String,
    pub name: String,
}

impl TemplateKey {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HintSource {
    /// Given by the directory layout.
    Explicit,
    /// Guessed from a keyword in a directory or file name.
    Inferred,
}

/// Scene a template is believed to belong to. Best effort, not authoritative.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SceneHint {
    pub scene: SceneId,
    pub source: HintSource,
}

/// A decoded reference image. Immutable once loaded.
#[derive(Clone)]
pub struct Template {
    pub key: TemplateKey,
    pub scene: Option<SceneHint>,
    pub path: PathBuf,
    pub image: Arc<GrayImage>,
    /// Hex SHA-256 of the file contents.
    pub hash: String,
    pub last_modified: Option<DateTime<Utc>>,
}

impl Template {
    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn kind(&self) -> &str {
        &self.key.kind
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn scene_id(&self) -> Option<&SceneId> {
        self.scene.as_ref().map(|hint| &hint.scene)
    }

    /// Builds a template from an in-memory image; used by callers that
    /// synthesize needles rather than reading them from disk.
    pub fn from_image(key: TemplateKey, image: GrayImage, scene: Option<SceneHint>) -> Self {
        Self {
            key,
            scene,
            path: PathBuf::new(),
            image: Arc::new(image),
            hash: String::new(),
            last_modified: None,
        }
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("key", &self.key)
            .field("scene", &self.scene)
            .field("path", &self.path)
            .field("size", &(self.width(), self.height()))
            .field("hash", &self.hash)
            .finish()
    }
}

/// Keyword that maps a file or directory name onto a scene.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SceneKeyword {
    pub keyword: String,
    pub scene: String,
}

impl SceneKeyword {
    pub fn new(keyword: impl Into<String>, scene: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            scene: scene.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Template type whose entries identify scenes.
    pub scene_kind: String,
    /// Lowercase file extensions treated as images.
    pub extensions: Vec<String>,
    /// Checked in order; the first keyword contained in a name wins.
    pub scene_keywords: Vec<SceneKeyword>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            scene_kind: "scenes".to_string(),
            extensions: ["png", "jpg", "jpeg", "bmp"]
                .into_iter()
                .map(String::from)
                .collect(),
            scene_keywords: vec![
                SceneKeyword::new("main_menu", "main_menu"),
                SceneKeyword::new("menu", "main_menu"),
                SceneKeyword::new("home", "main_menu"),
                SceneKeyword::new("battle", "battle"),
                SceneKeyword::new("combat", "battle"),
                SceneKeyword::new("fight", "battle"),
                SceneKeyword::new("commission", "commission"),
                SceneKeyword::new("reward", "reward"),
                SceneKeyword::new("loading", "loading"),
                SceneKeyword::new("login", "login"),
            ],
        }
    }
}

impl StoreOptions {
    pub fn is_image(&self, extension: &str) -> bool {
        let ext = extension.to_ascii_lowercase();
        self.extensions.iter().any(|known| *known == ext)
    }

    /// Scene guessed from a name, if any keyword matches.
    pub fn infer_scene(&self, name: &str) -> Option<SceneId> {
        let lowered = name.to_ascii_lowercase();
        self.scene_keywords
            .iter()
            .find(|entry| lowered.contains(&entry.keyword.to_ascii_lowercase()))
            .map(|entry| SceneId::new(entry.scene.clone()))
    }
}
