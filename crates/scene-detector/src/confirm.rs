use gamepilot_core_types::SceneId;

/// A confirmed change from one scene to another.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SceneTransition {
    pub previous: SceneId,
    pub current: SceneId,
}

/// Debounces raw per-poll scenes into a confirmed scene.
///
/// A candidate must top `required` consecutive polls before it replaces the
/// confirmed scene; any disagreeing poll restarts the count. `UNKNOWN` is a
/// candidate like any other, so a single blank frame does not drop the
/// current scene.
#[derive(Clone, Debug)]
pub struct SceneConfirmer {
    required: u32,
    confirmed: SceneId,
    candidate: Option<SceneId>,
    streak: u32,
}

impl SceneConfirmer {
    pub fn new(required: u32) -> Self {
        Self {
            required: required.max(1),
            confirmed: SceneId::unknown(),
            candidate: None,
            streak: 0,
        }
    }

    pub fn confirmed(&self) -> &SceneId {
        &self.confirmed
    }

    pub fn required(&self) -> u32 {
        self.required
    }

    pub fn set_required(&mut self, required: u32) {
        self.required = required.max(1);
    }

    /// Feeds one raw result; returns the transition when it completes one.
    pub fn observe(&mut self, raw: &SceneId) -> Option<SceneTransition> {
        if *raw == self.confirmed {
            self.candidate = None;
            self.streak = 0;
            return None;
        }

        match &self.candidate {
            Some(candidate) if candidate == raw => self.streak += 1,
            _ => {
                self.candidate = Some(raw.clone());
                self.streak = 1;
            }
        }

        if self.streak < self.required {
            return None;
        }
        self.candidate = None;
        self.streak = 0;
        let previous = std::mem::replace(&mut self.confirmed, raw.clone());
        Some(SceneTransition {
            previous,
            current: raw.clone(),
        })
    }

    /// Confirms `scene` immediately, discarding any pending candidate.
    pub fn force(&mut self, scene: SceneId) -> Option<SceneTransition> {
        self.candidate = None;
        self.streak = 0;
        if scene == self.confirmed {
            return None;
        }
        let previous = std::mem::replace(&mut self.confirmed, scene.clone());
        Some(SceneTransition {
            previous,
            current: scene,
        })
    }
}
