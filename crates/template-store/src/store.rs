use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use gamepilot_core_types::SceneId;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use tracing::{error, info, warn};

use crate::errors::TemplateError;
use crate::index::TemplateIndex;
use crate::loader;
use crate::models::{StoreOptions, Template};

/// Owner of the template index.
///
/// Readers grab the current [`TemplateIndex`] through [`TemplateStore::snapshot`]
/// (or the lookup helpers) and keep a consistent view even while a reload
/// swaps in a new one.
pub struct TemplateStore {
    options: StoreOptions,
    root: RwLock<Option<PathBuf>>,
    index: ArcSwap<TemplateIndex>,
    ready: AtomicBool,
}

impl TemplateStore {
    pub fn new(options: StoreOptions) -> Self {
        let empty = TemplateIndex::empty(options.scene_kind.clone());
        Self {
            options,
            root: RwLock::new(None),
            index: ArcSwap::from_pointee(empty),
            ready: AtomicBool::new(false),
        }
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Scans `root` and replaces the index. Returns the number of templates.
    pub fn load(&self, root: impl AsRef<Path>) -> Result<usize, TemplateError> {
        let root = root.as_ref().to_path_buf();
        *self.root.write() = Some(root.clone());
        self.rebuild(root)
    }

    /// Re-scans the last loaded root and swaps the index in one step.
    pub fn reload(&self) -> Result<usize, TemplateError> {
        let root = self.root.read().clone().ok_or(TemplateError::NoRoot)?;
        self.rebuild(root)
    }

    fn rebuild(&self, root: PathBuf) -> Result<usize, TemplateError> {
        if !root.exists() {
            warn!(root = %root.display(), "template root missing, starting with an empty store");
        }
        let templates = loader::scan(&root, &self.options)?;
        let index = TemplateIndex::build(Some(root.clone()), self.options.scene_kind.clone(), templates);
        let count = index.len();
        self.index.store(Arc::new(index));
        self.ready.store(true, Ordering::Release);
        info!(root = %root.display(), templates = count, "template index loaded");
        Ok(count)
    }

    /// Drops every cached template. The root is kept for a later `reload()`.
    pub fn clear(&self) {
        self.index
            .store(Arc::new(TemplateIndex::empty(self.options.scene_kind.clone())));
    }

    pub fn snapshot(&self) -> Arc<TemplateIndex> {
        self.index.load_full()
    }

    pub fn get(&self, kind: &str, name: &str) -> Option<Arc<Template>> {
        self.index.load().get(kind, name)
    }

    pub fn has(&self, kind: &str, name: &str) -> bool {
        self.index.load().has(kind, name)
    }

    pub fn by_type(&self, kind: &str) -> Vec<Arc<Template>> {
        self.index.load().by_type(kind).to_vec()
    }

    pub fn by_scene_hint(&self, scene: &SceneId) -> Vec<Arc<Template>> {
        self.index.load().by_scene_hint(scene).to_vec()
    }

    pub fn len(&self) -> usize {
        self.index.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.load().is_empty()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn root(&self) -> Option<PathBuf> {
        self.root.read().clone()
    }

    /// Reloads whenever an image under the root is created, modified or
    /// removed. Watching stops when the returned guard is dropped.
    pub fn watch(self: &Arc<Self>) -> Result<TemplateWatcher, TemplateError> {
        let root = self.root().ok_or(TemplateError::NoRoot)?;
        let store = Arc::clone(self);
        let mut watcher: RecommendedWatcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                let event = match res {
                    Ok(event) => event,
                    Err(err) => {
                        warn!("template watcher error: {err}");
                        return;
                    }
                };
                if !matches!(
                    event.kind,
                    EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                ) {
                    return;
                }
                if !event.paths.iter().any(|path| store.is_relevant(path)) {
                    return;
                }
                match store.reload() {
                    Ok(count) => info!(templates = count, "templates reloaded after change"),
                    Err(err) => error!("failed to reload templates: {err}"),
                }
            })?;

        watcher.watch(&root, RecursiveMode::Recursive)?;
        info!(root = %root.display(), "watching template directory");
        Ok(TemplateWatcher { _watcher: watcher })
    }

    fn is_relevant(&self, path: &Path) -> bool {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) => self.options.is_image(ext),
            // Directories come and go with their contents.
            None => true,
        }
    }
}

impl Default for TemplateStore {
    fn default() -> Self {
        Self::new(StoreOptions::default())
    }
}

/// Keeps the file watcher alive.
pub struct TemplateWatcher {
    _watcher: RecommendedWatcher,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HintSource;
    use image::{GrayImage, Luma};
    use std::fs;

    fn write_png(path: &Path, seed: u8) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let img = GrayImage::from_fn(8, 6, |x, y| Luma([seed.wrapping_add((x * 7 + y * 13) as u8)]));
        img.save(path).unwrap();
    }

    #[test]
    fn load_indexes_layout_and_skips_non_images() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_png(&root.join("scenes/main_menu.png"), 1);
        write_png(&root.join("scenes/battle/banner.png"), 2);
        write_png(&root.join("buttons/battle_start.png"), 3);
        write_png(&root.join("buttons/confirm.png"), 4);
        fs::write(root.join("buttons/readme.txt"), "not an image").unwrap();
        fs::write(root.join("buttons/broken.png"), "not a png either").unwrap();
        write_png(&root.join("stray.png"), 5);

        let store = TemplateStore::default();
        assert!(!store.is_ready());
        assert_eq!(store.load(root).unwrap(), 4);
        assert!(store.is_ready());

        let menu = store.get("scenes", "main_menu").unwrap();
        assert_eq!(menu.scene_id(), Some(&SceneId::from("main_menu")));
        assert_eq!(menu.width(), 8);
        assert_eq!(menu.hash.len(), 64);
        assert!(menu.last_modified.is_some());

        let banner = store.get("scenes", "battle/banner").unwrap();
        assert_eq!(banner.scene_id(), Some(&SceneId::from("battle")));

        let start = store.get("buttons", "battle_start").unwrap();
        assert_eq!(start.scene.as_ref().unwrap().source, HintSource::Inferred);
        assert!(store.get("buttons", "confirm").unwrap().scene.is_none());

        assert!(!store.has("buttons", "readme"));
        assert!(!store.has("buttons", "broken"));
        assert_eq!(store.by_type("buttons").len(), 2);
        assert_eq!(store.by_scene_hint(&SceneId::from("battle")).len(), 2);
    }

    #[test]
    fn missing_root_is_empty_but_ready() {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::default();
        assert_eq!(store.load(dir.path().join("absent")).unwrap(), 0);
        assert!(store.is_ready());
        assert!(store.is_empty());
    }

    #[test]
    fn reload_swaps_without_touching_old_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("scenes/battle.png"), 1);

        let store = TemplateStore::default();
        store.load(dir.path()).unwrap();
        let before = store.snapshot();

        write_png(&dir.path().join("scenes/reward.png"), 9);
        assert_eq!(store.reload().unwrap(), 2);

        assert_eq!(before.len(), 1);
        assert!(!before.has("scenes", "reward"));
        assert!(store.has("scenes", "reward"));
    }

    #[test]
    fn clear_drops_cache_and_reload_needs_root() {
        let store = TemplateStore::default();
        assert!(matches!(store.reload(), Err(TemplateError::NoRoot)));

        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("icons/coin.png"), 3);
        store.load(dir.path()).unwrap();
        assert_eq!(store.len(), 1);

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.reload().unwrap(), 1);
    }

    #[test]
    fn root_that_is_a_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("templates");
        fs::write(&file, "x").unwrap();
        let store = TemplateStore::default();
        assert!(matches!(
            store.load(&file),
            Err(TemplateError::NotADirectory(_))
        ));
    }

    fn eventually(mut check: impl FnMut() -> bool) -> bool {
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while std::time::Instant::now() < deadline {
            if check() {
                return true;
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        check()
    }

    #[test]
    fn watcher_reloads_until_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_png(&root.join("scenes/main_menu.png"), 1);
        write_png(&root.join("buttons/confirm.png"), 4);

        let store = Arc::new(TemplateStore::default());
        assert_eq!(store.load(root).unwrap(), 2);
        let watcher = store.watch().unwrap();

        write_png(&root.join("buttons/claim.png"), 2);
        assert!(eventually(|| store.has("buttons", "claim")));
        assert_eq!(store.len(), 3);

        fs::remove_file(root.join("buttons/claim.png")).unwrap();
        assert!(eventually(|| !store.has("buttons", "claim")));

        // Let trailing events from the writes above drain.
        std::thread::sleep(std::time::Duration::from_millis(200));
        drop(watcher);
        write_png(&root.join("buttons/late.png"), 3);
        std::thread::sleep(std::time::Duration::from_millis(500));
        assert!(!store.has("buttons", "late"));
        assert_eq!(store.reload().unwrap(), 3);
        assert!(store.has("buttons", "late"));
    }
}
