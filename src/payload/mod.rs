//! Domain payload: the logic that rewritten bodies and hooks call into.
//!
//! Nothing in this module rewrites code. Rewrite passes splice `call` instructions to methods
//! of a payload owner type into host bodies; when the host executes such a call it looks the
//! method up in a [`PayloadTable`] and runs the bound native function.
//!
//! # Key Components
//!
//! - [`curves`] - root size curve, scroll rates, zoom bands, label font
//! - [`labels`] - label visibility for things, floating text and pawns
//! - [`state`] - process-wide state objects shared by hooks
//! - [`PayloadTable`] - native bindings of payload methods

pub mod curves;
pub mod labels;
pub mod state;

pub use curves::{
    clip_height, dolly_rate_keys, dolly_rate_mouse, dolly_rates, dolly_speed_decay, lerp_double_safe,
    lerp_root_size, screen_edge_dolly_factor, GameFont, ZoomRange,
};
pub use labels::{
    label_visible, mouse_distance_squared, overlay_label_visible, pawn_label_visible, LabelStyle,
    PawnInfo,
};
pub use state::{
    CameraPose, LabelColorCache, PauseKeyLatch, SnapbackAction, SnapbackTimer, ZoomState,
};

use std::{fmt, sync::Arc};

use dashmap::DashMap;

use crate::{
    assembly::{InstructionSequence, MethodRef},
    patching::Value,
    Error, Result,
};

/// Signature of a bound payload function. Arguments arrive in call order, receiver first.
pub type PayloadFn = dyn Fn(&mut [Value]) -> Result<Value> + Send + Sync;

/// Native bindings for the methods of one payload owner type.
///
/// # Examples
///
/// ```rust
/// use ilweave::assembly::MethodRef;
/// use ilweave::patching::Value;
/// use ilweave::payload::PayloadTable;
///
/// let table = PayloadTable::new("CameraPlus.Tools");
/// let double = MethodRef::new("CameraPlus.Tools", "Double").param("float").returns("float");
/// table.bind(double.clone(), |args| {
///     Ok(Value::F32(args[0].as_f32().unwrap_or_default() * 2.0))
/// });
///
/// assert_eq!(table.call(&double, &mut [Value::F32(1.5)])?, Value::F32(3.0));
/// # Ok::<(), ilweave::Error>(())
/// ```
pub struct PayloadTable {
    owner: String,
    bindings: DashMap<MethodRef, Arc<PayloadFn>>,
}

impl PayloadTable {
    /// Creates an empty table for `owner`.
    #[must_use]
    pub fn new(owner: impl Into<String>) -> Self {
        PayloadTable {
            owner: owner.into(),
            bindings: DashMap::new(),
        }
    }

    /// Returns the owner type name.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Binds `method` to `function`, replacing an earlier binding.
    pub fn bind<F>(&self, method: MethodRef, function: F)
    where
        F: Fn(&mut [Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.bindings.insert(method, Arc::new(function));
    }

    /// Returns `true` if `method` is bound.
    #[must_use]
    pub fn is_bound(&self, method: &MethodRef) -> bool {
        self.bindings.contains_key(method)
    }

    /// Number of bound methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns `true` if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Runs the function bound to `method`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnboundPayload`] if `method` is not bound, or whatever the
    /// bound function returns.
    pub fn call(&self, method: &MethodRef, args: &mut [Value]) -> Result<Value> {
        let function = self
            .bindings
            .get(method)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::UnboundPayload(method.to_string()))?;
        function(args)
    }

    /// Checks that every call in `body` to a method of the owner type is bound.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnboundPayload`] naming the first unbound method.
    pub fn check_bound(&self, body: &InstructionSequence) -> Result<()> {
        for instruction in body {
            if let Some(method) = instruction.method() {
                if method.owner() == self.owner && !self.is_bound(method) {
                    return Err(Error::UnboundPayload(method.to_string()));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for PayloadTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadTable")
            .field("owner", &self.owner)
            .field("bound", &self.bindings.len())
            .finish()
    }
}
