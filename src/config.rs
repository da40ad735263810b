//! Configuration for patch installation.
//!
//! This module provides [`PatchConfig`], which controls how [`crate::patching::Patcher`]
//! reacts to anomalies while installing, and the [`MissingPatternPolicy`] it uses when a pass
//! does not find its shape.

use strum::{Display, EnumString};

/// What to do when a rewrite pass never finds its pattern in a target body.
///
/// A missing pattern usually means the host application changed the shape of the method in a
/// newer version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum MissingPatternPolicy {
    /// Record a deduplicated diagnostic and continue with the body the pass left unchanged.
    ///
    /// The remaining passes and hooks of the target still install.
    #[default]
    Log,
    /// Abort installation with [`crate::Error::PatternNotFound`] before any body is written.
    Fail,
}

/// Configuration for the patcher.
#[derive(Debug, Clone)]
pub struct PatchConfig {
    /// Reaction to a pass that did not match (default: [`MissingPatternPolicy::Log`]).
    pub missing_pattern: MissingPatternPolicy,

    /// Verify labels and stack balance of every rewritten body before it is written
    /// (default: true).
    pub verify_bodies: bool,

    /// Owner id used by [`crate::patching::Patcher::registration`]
    /// (default: `"net.pardeike.rimworld.mod.camera+"`).
    pub owner: String,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            missing_pattern: MissingPatternPolicy::Log,
            verify_bodies: true,
            owner: "net.pardeike.rimworld.mod.camera+".to_string(),
        }
    }
}

impl PatchConfig {
    /// Returns the default configuration with the hard-fail policy for missing patterns.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            missing_pattern: MissingPatternPolicy::Fail,
            ..Self::default()
        }
    }
}
