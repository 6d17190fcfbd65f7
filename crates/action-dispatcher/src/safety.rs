use gamepilot_core_types::{Point, Rect};

use crate::errors::DispatchError;
use crate::models::ActionKind;

/// Rejects (never clamps) points outside `area`. No area means no limit.
pub fn check_point(area: Option<Rect>, point: Point) -> Result<(), DispatchError> {
    match area {
        Some(area) if !area.contains(point) => Err(DispatchError::SafetyRejection { point, area }),
        _ => Ok(()),
    }
}

pub fn check_action(area: Option<Rect>, kind: &ActionKind) -> Result<(), DispatchError> {
    kind.points()
        .into_iter()
        .try_for_each(|point| check_point(area, point))
}
