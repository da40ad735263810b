//! Process-wide state shared between hooks.
//!
//! Each object here is created once when the camera patches are built, shared with the hooks
//! that need it through an `Arc`, and reset only at the points its documentation names.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Mutex,
    },
    time::{Duration, Instant},
};

use dashmap::DashMap;

use crate::{Error, Result};

/// The orthographic size the camera was last applied with.
///
/// Unset until the camera is first positioned. Consumers that scale by the zoom level treat
/// the unset state as "no adjustment".
#[derive(Debug)]
pub struct ZoomState {
    bits: AtomicU32,
}

const UNSET: f32 = -1.0;

impl ZoomState {
    /// Creates the state unset.
    #[must_use]
    pub fn new() -> Self {
        ZoomState {
            bits: AtomicU32::new(UNSET.to_bits()),
        }
    }

    /// Returns the last applied orthographic size.
    #[must_use]
    pub fn get(&self) -> Option<f32> {
        let value = f32::from_bits(self.bits.load(Ordering::Acquire));
        (value != UNSET).then_some(value)
    }

    /// Records the orthographic size the camera was applied with.
    pub fn set(&self, orth_size: f32) {
        self.bits.store(orth_size.to_bits(), Ordering::Release);
    }
}

impl Default for ZoomState {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns the held pause key into a single press per frame.
///
/// The host polls the key-down event several times per frame and once per frame for every
/// frame the key stays down. The latch reports a press only for the frame in which the key
/// went down; [`PauseKeyLatch::end_of_frame`] is the reset point.
#[derive(Debug, Default)]
pub struct PauseKeyLatch {
    was_down: AtomicBool,
    down_inside_frame: AtomicBool,
}

impl PauseKeyLatch {
    /// Creates the latch released.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers a key-down query given whether the key is physically down.
    pub fn key_down_event(&self, is_down: bool) -> bool {
        if is_down && !self.was_down.swap(true, Ordering::AcqRel) {
            self.down_inside_frame.store(true, Ordering::Release);
        }
        self.down_inside_frame.load(Ordering::Acquire)
    }

    /// Resets the per-frame press. A key-up event with the key released re-arms the latch.
    pub fn end_of_frame(&self, key_up_event: bool, is_down: bool) {
        if key_up_event && !is_down {
            self.was_down.store(false, Ordering::Release);
        }
        self.down_inside_frame.store(false, Ordering::Release);
    }
}

/// Camera position and zoom remembered by a snapback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    /// Root position on the map
    pub root_pos: [f32; 3],
    /// Root size
    pub root_size: f32,
}

/// What the caller of [`SnapbackTimer::update`] must do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SnapbackAction {
    /// Nothing
    None,
    /// A snapback of the current pose was just taken
    Created,
    /// Move the camera back to this pose
    Restore(CameraPose),
}

#[derive(Debug, Default)]
struct SnapbackInner {
    snapback: Option<CameraPose>,
    hold_started: Option<Instant>,
    fired: bool,
}

/// Holding pause while paused remembers the camera; unpausing returns to it.
///
/// Reset points: [`SnapbackTimer::reset`] when a menu opens, and restoring consumes the
/// snapback.
#[derive(Debug, Default)]
pub struct SnapbackTimer {
    inner: Mutex<SnapbackInner>,
}

impl SnapbackTimer {
    /// How long pause has to be held before a snapback is taken. The hold must exceed it.
    pub const HOLD: Duration = Duration::from_secs(1);

    /// Creates the timer without snapback.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-frame update.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::LockError`] if a hook panicked while holding the state.
    pub fn update(
        &self,
        now: Instant,
        pause_held: bool,
        paused: bool,
        current: CameraPose,
    ) -> Result<SnapbackAction> {
        let mut inner = self.inner.lock().map_err(|_| Error::LockError)?;

        let mut action = SnapbackAction::None;
        if !paused {
            if let Some(pose) = inner.snapback.take() {
                action = SnapbackAction::Restore(pose);
            }
        }

        if pause_held && paused {
            match inner.hold_started {
                None => inner.hold_started = Some(now),
                Some(started) => {
                    if !inner.fired && now.saturating_duration_since(started) > Self::HOLD {
                        inner.snapback = Some(current);
                        inner.fired = true;
                        action = SnapbackAction::Created;
                    }
                }
            }
        } else {
            inner.hold_started = None;
            inner.fired = false;
        }

        Ok(action)
    }

    /// Called after the pause state toggled; returns the pose to restore when unpausing.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::LockError`] if the state is poisoned.
    pub fn toggle_paused(&self, paused: bool) -> Result<Option<CameraPose>> {
        let mut inner = self.inner.lock().map_err(|_| Error::LockError)?;
        Ok(if paused { None } else { inner.snapback.take() })
    }

    /// Drops the snapback.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::LockError`] if the state is poisoned.
    pub fn reset(&self) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| Error::LockError)?;
        inner.snapback = None;
        Ok(())
    }

    /// Returns `true` while a snapback is waiting.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::LockError`] if the state is poisoned.
    pub fn has_snapback(&self) -> Result<bool> {
        let inner = self.inner.lock().map_err(|_| Error::LockError)?;
        Ok(inner.snapback.is_some())
    }
}

/// Per-pawn cache of label colours.
///
/// Looking up a pawn's colour is expensive in the host, so the first lookup is kept for the
/// lifetime of the game. The cache is warmed while pawns render, before their labels draw.
#[derive(Debug, Default)]
pub struct LabelColorCache {
    colors: DashMap<u64, [f32; 4]>,
}

impl LabelColorCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached colour of `pawn`, running `lookup` on a miss.
    ///
    /// A failed lookup is not cached.
    pub fn get_or_lookup<F>(&self, pawn: u64, lookup: F) -> Option<[f32; 4]>
    where
        F: FnOnce() -> Option<[f32; 4]>,
    {
        if let Some(color) = self.colors.get(&pawn) {
            return Some(*color);
        }
        let color = lookup()?;
        Some(*self.colors.entry(pawn).or_insert(color))
    }

    /// Number of cached pawns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POSE: CameraPose = CameraPose {
        root_pos: [10.0, 0.0, 20.0],
        root_size: 24.0,
    };

    #[test]
    fn test_zoom_state() {
        let state = ZoomState::new();
        assert_eq!(state.get(), None);
        state.set(42.5);
        assert_eq!(state.get(), Some(42.5));
    }

    #[test]
    fn test_pause_latch_single_press() {
        let latch = PauseKeyLatch::new();

        // frame 1: key goes down, polled twice
        assert!(latch.key_down_event(true));
        assert!(latch.key_down_event(true));
        latch.end_of_frame(false, true);

        // frame 2: still held
        assert!(!latch.key_down_event(true));
        latch.end_of_frame(true, false);

        // frame 3: pressed again
        assert!(latch.key_down_event(true));
    }

    #[test]
    fn test_pause_latch_stays_armed_without_key_up() {
        let latch = PauseKeyLatch::new();
        assert!(latch.key_down_event(true));
        latch.end_of_frame(false, false);
        assert!(!latch.key_down_event(true));
        assert!(!latch.key_down_event(false));
    }

    #[test]
    fn test_snapback_created_after_hold() {
        let timer = SnapbackTimer::new();
        let start = Instant::now();

        assert_eq!(timer.update(start, true, true, POSE).unwrap(), SnapbackAction::None);
        let at_threshold = start + SnapbackTimer::HOLD;
        assert_eq!(timer.update(at_threshold, true, true, POSE).unwrap(), SnapbackAction::None);

        let later = start + Duration::from_millis(1_100);
        assert_eq!(timer.update(later, true, true, POSE).unwrap(), SnapbackAction::Created);
        assert!(timer.has_snapback().unwrap());

        // fires once per hold
        let much_later = start + Duration::from_secs(5);
        assert_eq!(timer.update(much_later, true, true, POSE).unwrap(), SnapbackAction::None);
    }

    #[test]
    fn test_snapback_restored_on_unpause() {
        let timer = SnapbackTimer::new();
        let start = Instant::now();
        timer.update(start, true, true, POSE).unwrap();
        timer
            .update(start + Duration::from_secs(2), true, true, POSE)
            .unwrap();

        let moved = CameraPose {
            root_pos: [0.0; 3],
            root_size: 50.0,
        };
        let action = timer
            .update(start + Duration::from_secs(3), false, false, moved)
            .unwrap();
        assert_eq!(action, SnapbackAction::Restore(POSE));
        assert!(!timer.has_snapback().unwrap());
    }

    #[test]
    fn test_snapback_toggle_and_reset() {
        let timer = SnapbackTimer::new();
        let start = Instant::now();
        timer.update(start, true, true, POSE).unwrap();
        timer
            .update(start + Duration::from_secs(2), true, true, POSE)
            .unwrap();

        assert_eq!(timer.toggle_paused(true).unwrap(), None);
        assert_eq!(timer.toggle_paused(false).unwrap(), Some(POSE));
        assert_eq!(timer.toggle_paused(false).unwrap(), None);

        // releasing pause ends the hold, a new hold takes a new snapback
        timer.update(start + Duration::from_secs(3), false, true, POSE).unwrap();
        timer.update(start + Duration::from_secs(4), true, true, POSE).unwrap();
        let action = timer
            .update(start + Duration::from_secs(6), true, true, POSE)
            .unwrap();
        assert_eq!(action, SnapbackAction::Created);

        timer.reset().unwrap();
        assert!(!timer.has_snapback().unwrap());
    }

    #[test]
    fn test_label_color_cache() {
        let cache = LabelColorCache::new();
        let mut lookups = 0;

        assert_eq!(cache.get_or_lookup(1, || None), None);
        assert!(cache.is_empty());

        for _ in 0..3 {
            let color = cache.get_or_lookup(1, || {
                lookups += 1;
                Some([1.0, 0.5, 0.0, 1.0])
            });
            assert_eq!(color, Some([1.0, 0.5, 0.0, 1.0]));
        }
        assert_eq!(lookups, 1);
        assert_eq!(cache.len(), 1);
    }
}
