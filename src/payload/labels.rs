//! Label visibility decisions.
//!
//! Thing labels and floating text are decided by position alone. Pawn labels also depend on
//! what the pawn is: the overlay is patched to treat every pawn as humanlike, so labels of
//! unnamed animals are decided here instead of by the game's animal name setting.

use strum::{Display, EnumString};

use crate::{camera::CameraSettings, payload::ZoomRange};

/// Labels within this distance of the mouse, in map cells, stay visible when zoomed out.
pub const MOUSE_LABEL_RADIUS: f32 = 1.5;

/// Truncation width the game passes when it draws a full pawn label on the map.
pub const FULL_LABEL_WIDTH: f32 = 9999.0;

/// How pawn labels are styled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
pub enum LabelStyle {
    /// Unnamed animals get labels like everyone else
    #[default]
    IncludeAnimals,
    /// Unnamed animals never get a label
    HideAnimals,
}

/// What the label decisions need to know about a pawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PawnInfo {
    /// Host object id of the pawn
    pub id: u64,
    /// Position on the map
    pub position: [f32; 3],
    /// Spawned on a map
    pub spawned: bool,
    /// Standing in fog of war
    pub fogged: bool,
    /// Humanlike race
    pub humanlike: bool,
    /// Has a name
    pub named: bool,
    /// The game's own overlay would draw this pawn's label
    pub vanilla_label: bool,
}

impl PawnInfo {
    fn unnamed_animal(&self) -> bool {
        self.spawned && !self.fogged && !self.humanlike && !self.named
    }
}

/// Squared distance between two map positions on the ground plane (`x`/`z`).
#[must_use]
pub fn mouse_distance_squared(loc: [f32; 3], mouse: [f32; 3]) -> f32 {
    let dx = loc[0] - mouse[0];
    let dz = loc[2] - mouse[2];
    dx * dx + dz * dz
}

/// Returns `true` if the label should be drawn.
///
/// Labels always show at the closest zoom. Further out they show only near the mouse, and
/// only if [`CameraSettings::mouse_over_shows_labels`] is set.
#[must_use]
pub fn label_visible(settings: &CameraSettings, zoom: ZoomRange, loc: [f32; 3], mouse: [f32; 3]) -> bool {
    if settings.skip_custom_rendering || !settings.hide_names_when_zoomed_out {
        return true;
    }
    if zoom == ZoomRange::Closest {
        return true;
    }
    settings.mouse_over_shows_labels
        && mouse_distance_squared(loc, mouse) <= MOUSE_LABEL_RADIUS * MOUSE_LABEL_RADIUS
}

/// Decides whether the pawn overlay draws `pawn`'s label.
///
/// Only unnamed animals are decided here; everyone else is left to the game.
#[must_use]
pub fn overlay_label_visible(
    settings: &CameraSettings,
    zoom: ZoomRange,
    pawn: &PawnInfo,
    mouse: [f32; 3],
) -> bool {
    if !pawn.unnamed_animal() {
        return true;
    }
    if settings.custom_name_style == LabelStyle::HideAnimals {
        return false;
    }
    label_visible(settings, zoom, pawn.position, mouse)
}

/// Decides whether a full pawn label is drawn.
///
/// Truncated labels (any width but [`FULL_LABEL_WIDTH`]) belong to other UI and always show.
/// A full label the game itself would not have drawn stays hidden.
#[must_use]
pub fn pawn_label_visible(
    settings: &CameraSettings,
    zoom: ZoomRange,
    pawn: &PawnInfo,
    truncate_to_width: f32,
    mouse: [f32; 3],
) -> bool {
    if truncate_to_width != FULL_LABEL_WIDTH {
        return true;
    }
    if !pawn.vanilla_label {
        return false;
    }
    label_visible(settings, zoom, pawn.position, mouse)
}
