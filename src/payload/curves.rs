//! Zoom curves and the values derived from them.
//!
//! The host camera keeps a "root size" in its own range. Everything the camera mod does starts
//! by mapping that root size through [`lerp_root_size`] into the mod's output range, then
//! deriving scroll speeds, the zoom band and the label font from the result.

use strum::{Display, FromRepr};

use crate::camera::{CameraSettings, DollyRates};

/// Root sizes at which the host switches zoom band, before remapping.
const VANILLA_ZOOM_THRESHOLDS: [f32; 4] = [12.0, 13.8, 42.0, 57.0];

/// Linear interpolation of `x` from `[in_from, in_to]` onto `[out_from, out_to]`.
///
/// Values outside the input range extrapolate. A degenerate input range maps every `x` to the
/// midpoint of the output range instead of dividing by zero.
///
/// ```rust
/// use ilweave::payload::lerp_double_safe;
///
/// assert_eq!(lerp_double_safe(0.0, 10.0, 0.0, 100.0, 5.0), 50.0);
/// assert_eq!(lerp_double_safe(5.0, 5.0, 0.0, 10.0, 123.0), 5.0);
/// ```
#[must_use]
pub fn lerp_double_safe(in_from: f32, in_to: f32, out_from: f32, out_to: f32, x: f32) -> f32 {
    if in_from == in_to {
        return (out_from + out_to) / 2.0;
    }
    let t = (x - in_from) / (in_to - in_from);
    out_from + t * (out_to - out_from)
}

/// Maps a host root size into the mod's output range.
///
/// The input is clamped to the configured input range, shaped by
/// [`CameraSettings::zoom_curve_exponent`] and scaled onto the output range.
#[must_use]
pub fn lerp_root_size(settings: &CameraSettings, root_size: f32) -> f32 {
    let span = settings.max_root_input - settings.min_root_input;
    let t = if span > 0.0 {
        ((root_size - settings.min_root_input) / span).clamp(0.0, 1.0)
    } else {
        0.5
    };
    let shaped = t.powf(settings.zoom_curve_exponent.max(f32::EPSILON));
    settings.min_root_output + shaped * (settings.max_root_output - settings.min_root_output)
}

fn across_output(settings: &CameraSettings, zoomed_in: f32, zoomed_out: f32, orth_size: f32) -> f32 {
    lerp_double_safe(
        settings.min_root_output,
        settings.max_root_output,
        zoomed_in,
        zoomed_out,
        orth_size,
    )
}

/// Keyboard scroll rate at orthographic size `orth_size`.
#[must_use]
pub fn dolly_rate_keys(settings: &CameraSettings, orth_size: f32) -> f32 {
    let zoomed_in = orth_size * settings.zoomed_in_dolly_percent * 4.0;
    let zoomed_out = orth_size * settings.zoomed_out_dolly_percent * 4.0;
    across_output(settings, zoomed_in, zoomed_out, orth_size)
}

/// Screen edge scroll rate at orthographic size `orth_size`.
#[must_use]
pub fn dolly_rate_mouse(settings: &CameraSettings, orth_size: f32) -> f32 {
    let zoomed_in = orth_size * settings.zoomed_in_dolly_percent * 5.0;
    let zoomed_out = orth_size * settings.zoomed_out_dolly_percent * 5.0;
    across_output(settings, zoomed_in, zoomed_out, orth_size)
}

/// Per-frame decay factor of the scroll speed; closer to 1 glides longer.
#[must_use]
pub fn dolly_speed_decay(settings: &CameraSettings, orth_size: f32) -> f32 {
    1.0 - across_output(settings, 0.15, 0.3, orth_size)
}

/// All scroll parameters at orthographic size `orth_size`.
#[must_use]
pub fn dolly_rates(settings: &CameraSettings, orth_size: f32) -> DollyRates {
    DollyRates {
        keys: dolly_rate_keys(settings, orth_size),
        screen_edge: dolly_rate_mouse(settings, orth_size),
        speed_decay: dolly_speed_decay(settings, orth_size),
    }
}

/// Multiplier for the host's screen edge scroll vector.
#[must_use]
pub fn screen_edge_dolly_factor(settings: &CameraSettings, orth_size: f32) -> f32 {
    across_output(
        settings,
        settings.zoomed_in_screen_edge_dolly_factor,
        settings.zoomed_out_screen_edge_dolly_factor,
        orth_size,
    )
}

/// Camera height after pulling it toward the ground by [`CameraSettings::sound_nearness`].
///
/// The host derives sound attenuation from the camera height, so lowering it keeps far zoom
/// levels audible while the orthographic size keeps the visible area unchanged.
#[must_use]
pub fn clip_height(settings: &CameraSettings, height: f32) -> f32 {
    let span = settings.max_root_output - settings.min_root_output;
    if span <= 0.0 {
        return height;
    }
    let f = (height - settings.min_root_output) / span * (1.0 - settings.sound_nearness);
    settings.min_root_output + f * span
}

/// The host's zoom bands, closest first.
///
/// Discriminants match the host's enum so the value can cross the hook boundary as an
/// integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, FromRepr)]
#[repr(i32)]
pub enum ZoomRange {
    /// Labels and details visible
    Closest = 0,
    /// Close
    Close = 1,
    /// Middle
    Middle = 2,
    /// Far
    Far = 3,
    /// Furthest
    Furthest = 4,
}

impl ZoomRange {
    /// Classifies a host root size.
    ///
    /// The host's band thresholds are remapped from `[12, 57]` onto `[30, 60]` and compared
    /// against the root size after [`lerp_root_size`].
    #[must_use]
    pub fn classify(settings: &CameraSettings, root_size: f32) -> Self {
        let lerped = lerp_root_size(settings, root_size);
        let band = VANILLA_ZOOM_THRESHOLDS
            .iter()
            .map(|&size| lerp_double_safe(12.0, 57.0, 30.0, 60.0, size))
            .take_while(|&threshold| lerped >= threshold)
            .count();

        match band {
            0 => ZoomRange::Closest,
            1 => ZoomRange::Close,
            2 => ZoomRange::Middle,
            3 => ZoomRange::Far,
            _ => ZoomRange::Furthest,
        }
    }
}

/// The host's label fonts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromRepr)]
#[repr(i32)]
pub enum GameFont {
    /// Smallest
    Tiny = 0,
    /// Small
    Small = 1,
    /// Medium
    Medium = 2,
}

impl GameFont {
    /// Label font for a host root size: larger while zoomed in.
    #[must_use]
    pub fn adapted(root_size: f32) -> Self {
        if root_size < 11.0 {
            GameFont::Medium
        } else if root_size < 15.0 {
            GameFont::Small
        } else {
            GameFont::Tiny
        }
    }
}
