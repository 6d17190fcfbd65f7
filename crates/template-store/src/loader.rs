use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use gamepilot_core_types::SceneId;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::errors::TemplateError;
use crate::models::{HintSource, SceneHint, StoreOptions, Template, TemplateKey};

/// Walks `root` and decodes every image file below a type directory.
///
/// A missing root yields no templates. Files sitting directly in the root
/// have no type and are ignored, as are non-image files. Image files that
/// fail to decode are logged and skipped.
pub fn scan(root: &Path, options: &StoreOptions) -> Result<Vec<Template>, TemplateError> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    if !root.is_dir() {
        return Err(TemplateError::NotADirectory(root.to_path_buf()));
    }

    let mut templates = Vec::new();
    for entry in read_sorted(root)? {
        if !entry.is_dir() {
            debug!(path = %entry.display(), "skipping file outside a template type directory");
            continue;
        }
        let Some(kind) = entry.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        let mut files = Vec::new();
        collect_files(&entry, &mut Vec::new(), &mut files)?;

        for (dirs, path) in files {
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if !options.is_image(ext) {
                continue;
            }
            match load_template(&kind, &dirs, &path, options) {
                Ok(template) => templates.push(template),
                Err(err) => warn!(path = %path.display(), "skipping template: {err}"),
            }
        }
    }
    Ok(templates)
}

fn read_sorted(dir: &Path) -> Result<Vec<PathBuf>, TemplateError> {
    let mut entries = fs::read_dir(dir)
        .map_err(|err| TemplateError::io(dir, err))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect::<Vec<_>>();
    entries.sort();
    Ok(entries)
}

/// Collects files under `dir`, remembering the directory names between the
/// type directory and each file.
fn collect_files(
    dir: &Path,
    prefix: &mut Vec<String>,
    out: &mut Vec<(Vec<String>, PathBuf)>,
) -> Result<(), TemplateError> {
    for path in read_sorted(dir)? {
        if path.is_dir() {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            prefix.push(name.to_string());
            collect_files(&path, prefix, out)?;
            prefix.pop();
        } else {
            out.push((prefix.clone(), path));
        }
    }
    Ok(())
}

fn load_template(
    kind: &str,
    dirs: &[String],
    path: &Path,
    options: &StoreOptions,
) -> Result<Template, TemplateError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    let bytes = fs::read(path).map_err(|err| TemplateError::io(path, err))?;
    let image = image::load_from_memory(&bytes)
        .map_err(|source| TemplateError::Decode {
            path: path.to_path_buf(),
            source,
        })?
        .to_luma8();

    let hash = format!("{:x}", Sha256::digest(&bytes));
    let last_modified = fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .map(DateTime::<Utc>::from);

    let name = if dirs.is_empty() {
        stem.clone()
    } else {
        format!("{}/{}", dirs.join("/"), stem)
    };

    Ok(Template {
        key: TemplateKey::new(kind, name),
        scene: scene_hint(kind, dirs, &stem, options),
        path: path.to_path_buf(),
        image: Arc::new(image),
        hash,
        last_modified,
    })
}

fn scene_hint(kind: &str, dirs: &[String], stem: &str, options: &StoreOptions) -> Option<SceneHint> {
    if let Some(dir) = dirs.first() {
        return Some(SceneHint {
            scene: SceneId::new(dir.clone()),
            source: HintSource::Explicit,
        });
    }
    if kind == options.scene_kind {
        return Some(SceneHint {
            scene: SceneId::new(stem),
            source: HintSource::Explicit,
        });
    }
    options.infer_scene(stem).map(|scene| SceneHint {
        scene,
        source: HintSource::Inferred,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_scene_from_directory_wins_over_keywords() {
        let options = StoreOptions::default();
        let hint = scene_hint("buttons", &["reward".to_string()], "battle_ok", &options).unwrap();
        assert_eq!(hint.scene, SceneId::from("reward"));
        assert_eq!(hint.source, HintSource::Explicit);

        let hint = scene_hint("scenes", &[], "main_menu", &options).unwrap();
        assert_eq!(hint.scene, SceneId::from("main_menu"));

        let hint = scene_hint("buttons", &[], "battle_ok", &options).unwrap();
        assert_eq!(hint.source, HintSource::Inferred);
        assert!(scene_hint("buttons", &[], "ok", &options).is_none());
    }

    #[test]
    fn missing_root_scans_to_nothing() {
        let options = StoreOptions::default();
        let templates = scan(Path::new("/definitely/not/here/templates"), &options).unwrap();
        assert!(templates.is_empty());
    }
}
