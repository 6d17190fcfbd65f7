use std::time::Duration;

use chrono::{DateTime, Utc};
use gamepilot_core_types::{ActionId, Point, Rect};
use gamepilot_scheduler::Priority;
use serde::{Deserialize, Serialize};

use crate::easing::Easing;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

/// What an action does. Coordinates are absolute screen positions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    Click {
        at: Point,
        #[serde(default)]
        button: MouseButton,
    },
    Move {
        to: Point,
        /// Glide along eased waypoints instead of warping.
        #[serde(default)]
        smooth: bool,
    },
    Key {
        code: String,
    },
    Drag {
        from: Point,
        to: Point,
        #[serde(default)]
        button: MouseButton,
    },
    Scroll {
        at: Point,
        delta: i32,
    },
    Type {
        text: String,
    },
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Click { .. } => "click",
            ActionKind::Move { .. } => "move",
            ActionKind::Key { .. } => "key",
            ActionKind::Drag { .. } => "drag",
            ActionKind::Scroll { .. } => "scroll",
            ActionKind::Type { .. } => "type",
        }
    }

    /// Every absolute coordinate the action touches.
    pub fn points(&self) -> Vec<Point> {
        match self {
            ActionKind::Click { at, .. } | ActionKind::Scroll { at, .. } => vec![*at],
            ActionKind::Move { to, .. } => vec![*to],
            ActionKind::Drag { from, to, .. } => vec![*from, *to],
            ActionKind::Key { .. } | ActionKind::Type { .. } => Vec::new(),
        }
    }

    pub fn click(at: Point) -> Self {
        ActionKind::Click {
            at,
            button: MouseButton::Left,
        }
    }

    pub fn key(code: impl Into<String>) -> Self {
        ActionKind::Key { code: code.into() }
    }
}

/// Caller-side description of an action to enqueue.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionRequest {
    pub kind: ActionKind,
    pub priority: Priority,
    /// Overrides the dispatcher default.
    pub max_retries: Option<u32>,
    /// Overrides the dispatcher default.
    pub retry_delay: Option<Duration>,
}

impl ActionRequest {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            priority: Priority::Medium,
            max_retries: None,
            retry_delay: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }
}

impl From<ActionKind> for ActionRequest {
    fn from(kind: ActionKind) -> Self {
        Self::new(kind)
    }
}

/// An action owned by the dispatcher queue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueuedAction {
    pub id: ActionId,
    pub kind: ActionKind,
    pub priority: Priority,
    pub timestamp: DateTime<Utc>,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub attempts: u32,
}

/// A recorded action and when it ran relative to the recording start.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedAction {
    pub action: QueuedAction,
    pub offset: Duration,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionReport {
    pub action_id: ActionId,
    pub kind: String,
    pub ok: bool,
    pub attempts: u32,
    pub latency_ms: u64,
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DispatchEvent {
    Queued { id: ActionId, priority: Priority },
    Executed(ActionReport),
    Rejected { id: ActionId, reason: String },
    Failed(ActionReport),
    EmergencyStop,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothMoveOptions {
    pub duration: Duration,
    pub steps: u32,
    pub easing: Easing,
}

impl Default for SmoothMoveOptions {
    fn default() -> Self {
        Self {
            duration: Duration::from_millis(300),
            steps: 15,
            easing: Easing::EaseInOut,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SmoothMoveReport {
    pub waypoints: Vec<Point>,
    pub elapsed: Duration,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DispatcherConfig {
    /// `None` leaves coordinates unrestricted.
    pub safe_area: Option<Rect>,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Pause between consecutive queued actions.
    pub action_delay: Duration,
    pub smooth: SmoothMoveOptions,
    /// Pace the queue with the measured recommended delay instead of
    /// `action_delay`.
    pub adaptive_pacing: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            safe_area: None,
            max_retries: 2,
            retry_delay: Duration::from_millis(100),
            action_delay: Duration::from_millis(50),
            smooth: SmoothMoveOptions::default(),
            adaptive_pacing: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_kinds_read_from_tagged_json() {
        let click: ActionKind = serde_json::from_str(r#"{"type":"click","at":{"x":4,"y":9}}"#).unwrap();
        assert_eq!(click, ActionKind::click(Point::new(4, 9)));

        let drag: ActionKind = serde_json::from_str(
            r#"{"type":"drag","from":{"x":0,"y":0},"to":{"x":10,"y":0},"button":"right"}"#,
        )
        .unwrap();
        assert_eq!(drag.points(), vec![Point::new(0, 0), Point::new(10, 0)]);
        assert_eq!(drag.name(), "drag");
    }

    #[test]
    fn request_overrides_dispatcher_defaults() {
        let request = ActionRequest::new(ActionKind::key("Enter"))
            .with_priority(Priority::High)
            .with_retries(0)
            .with_retry_delay(Duration::from_millis(5));
        assert_eq!(request.priority, Priority::High);
        assert_eq!(request.max_retries, Some(0));
        assert_eq!(request.retry_delay, Some(Duration::from_millis(5)));
    }
}
