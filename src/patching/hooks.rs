//! Call interception: prefix and postfix hooks around a patched method.
//!
//! A prefix runs before the (possibly rewritten) body. It may inspect and change the
//! arguments in the [`CallContext`], and by returning [`PrefixAction::Suppress`] it skips the
//! body and every lower priority prefix, supplying the result itself. A postfix runs after
//! the body, or after the suppressing prefix, and may adjust the result or trigger side
//! effects.
//!
//! Hooks carry an explicit numeric priority; higher runs first. The constants in
//! [`priority`] give names to the usual levels.

use std::{fmt, sync::Arc};

use crate::patching::TargetKey;

/// Named hook priorities. Higher values run first.
pub mod priority {
    /// Runs after everything else
    pub const LAST: i32 = 0;
    /// Below low
    pub const VERY_LOW: i32 = 100;
    /// Below normal
    pub const LOW: i32 = 200;
    /// The default
    pub const NORMAL: i32 = 400;
    /// Above normal
    pub const HIGH: i32 = 600;
    /// Above high
    pub const VERY_HIGH: i32 = 700;
    /// Runs before everything else at the standard levels
    pub const FIRST: i32 = 800;
}

/// A value crossing the hook boundary: argument, receiver or result.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No value (`void` result)
    #[default]
    Unit,
    /// Null reference
    Null,
    /// Boolean
    Bool(bool),
    /// 32-bit integer, also used for enum values
    I32(i32),
    /// 32-bit float
    F32(f32),
    /// String
    Str(String),
    /// Two-component vector
    Vec2([f32; 2]),
    /// Three-component vector
    Vec3([f32; 3]),
    /// RGBA colour
    Color([f32; 4]),
    /// Reference to a host object
    Object(u64),
}

impl Value {
    /// Returns the boolean, if this is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the integer, if this is one.
    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the float, if this is one.
    #[must_use]
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::F32(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the two-component vector, if this is one.
    #[must_use]
    pub fn as_vec2(&self) -> Option<[f32; 2]> {
        match self {
            Value::Vec2(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the three-component vector, if this is one.
    #[must_use]
    pub fn as_vec3(&self) -> Option<[f32; 3]> {
        match self {
            Value::Vec3(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the colour, if this is one.
    #[must_use]
    pub fn as_color(&self) -> Option<[f32; 4]> {
        match self {
            Value::Color(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the object reference, if this is one.
    #[must_use]
    pub fn as_object(&self) -> Option<u64> {
        match self {
            Value::Object(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// State of one call to a patched method, shared by its hooks.
#[derive(Debug, Clone)]
pub struct CallContext {
    target: TargetKey,
    /// The receiver, `None` for static methods
    pub instance: Option<Value>,
    /// Arguments in declaration order
    pub args: Vec<Value>,
    /// The result; set by the body or by a suppressing prefix
    pub result: Value,
    original_ran: bool,
}

impl CallContext {
    /// Creates the context for a call to `target`.
    #[must_use]
    pub fn new(target: TargetKey) -> Self {
        CallContext {
            target,
            instance: None,
            args: Vec::new(),
            result: Value::Unit,
            original_ran: false,
        }
    }

    /// Sets the receiver.
    #[must_use]
    pub fn with_instance(mut self, instance: Value) -> Self {
        self.instance = Some(instance);
        self
    }

    /// Sets the arguments.
    #[must_use]
    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// Returns the method being called.
    #[must_use]
    pub fn target(&self) -> &TargetKey {
        &self.target
    }

    /// Returns argument `index`.
    #[must_use]
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Returns `true` once the original body has run for this call.
    ///
    /// Postfixes use this to tell a suppressed call from a normal one.
    #[must_use]
    pub fn original_ran(&self) -> bool {
        self.original_ran
    }

    pub(crate) fn mark_original_ran(&mut self) {
        self.original_ran = true;
    }
}

/// Decision of a prefix hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixAction {
    /// Run the remaining prefixes and the body
    Continue,
    /// Skip the remaining prefixes and the body; postfixes still run
    Suppress,
}

impl From<bool> for PrefixAction {
    /// `true` continues, `false` suppresses.
    fn from(run_original: bool) -> Self {
        if run_original {
            PrefixAction::Continue
        } else {
            PrefixAction::Suppress
        }
    }
}

/// Signature of a prefix hook.
pub type PrefixFn = dyn Fn(&mut CallContext) -> PrefixAction + Send + Sync;

/// Signature of a postfix hook.
pub type PostfixFn = dyn Fn(&mut CallContext) + Send + Sync;

/// A prefix hook with its priority.
#[derive(Clone)]
pub struct Prefix {
    priority: i32,
    hook: Arc<PrefixFn>,
}

impl Prefix {
    /// Wraps `hook` with `priority`.
    pub fn new<F>(priority: i32, hook: F) -> Self
    where
        F: Fn(&mut CallContext) -> PrefixAction + Send + Sync + 'static,
    {
        Prefix {
            priority,
            hook: Arc::new(hook),
        }
    }

    /// Returns the priority.
    #[must_use]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Runs the hook.
    pub fn run(&self, ctx: &mut CallContext) -> PrefixAction {
        (self.hook)(ctx)
    }
}

impl fmt::Debug for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prefix")
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// A postfix hook with its priority.
#[derive(Clone)]
pub struct Postfix {
    priority: i32,
    hook: Arc<PostfixFn>,
}

impl Postfix {
    /// Wraps `hook` with `priority`.
    pub fn new<F>(priority: i32, hook: F) -> Self
    where
        F: Fn(&mut CallContext) + Send + Sync + 'static,
    {
        Postfix {
            priority,
            hook: Arc::new(hook),
        }
    }

    /// Returns the priority.
    #[must_use]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Runs the hook.
    pub fn run(&self, ctx: &mut CallContext) {
        (self.hook)(ctx);
    }
}

impl fmt::Debug for Postfix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Postfix")
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}
