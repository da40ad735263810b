//! Boundary between the patcher and the host runtime.
//!
//! The patcher never touches the host directly. It consumes three narrow interfaces:
//!
//! - [`TargetResolver`] - finds the compiled method a [`TargetKey`] names
//! - [`BodyAccessor`] - reads a method's current body and installs a replacement
//! - [`CapabilityProbe`] - answers whether a type member exists in the loaded host
//!
//! All three are used at install time only. [`MemoryHost`] implements them over an in-memory
//! method table and is what the tests and benchmarks run against.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use dashmap::{DashMap, DashSet};

use crate::{assembly::InstructionSequence, patching::TargetKey, Result};

/// Opaque handle to a compiled method in the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodHandle(u64);

impl MethodHandle {
    /// Wraps a host-specific method identifier.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        MethodHandle(raw)
    }

    /// Returns the host-specific identifier.
    #[must_use]
    pub const fn raw(&self) -> u64 {
        self.0
    }
}

/// Locates compiled methods.
pub trait TargetResolver {
    /// Returns a handle to the method `key` names, or `None` if the host has no such method.
    fn resolve(&self, key: &TargetKey) -> Option<MethodHandle>;
}

/// Reads and replaces method bodies.
pub trait BodyAccessor {
    /// Returns the current body of `method`.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is stale or the body cannot be decoded.
    fn read_body(&self, method: MethodHandle) -> Result<InstructionSequence>;

    /// Installs `body` as the effective implementation of `method`.
    ///
    /// # Errors
    ///
    /// Returns an error if the host rejects the body.
    fn write_body(&self, method: MethodHandle, body: InstructionSequence) -> Result<()>;
}

/// Answers whether optional members exist in the loaded host.
pub trait CapabilityProbe {
    /// Returns `true` if `owner` is loaded and has a member named `member`.
    fn exists(&self, owner: &str, member: &str) -> bool;
}

/// Everything the patcher needs from a host.
pub trait Host: TargetResolver + BodyAccessor + CapabilityProbe {}

impl<T: TargetResolver + BodyAccessor + CapabilityProbe> Host for T {}

/// In-memory host: a method table keyed by [`TargetKey`].
///
/// Defining a method also makes its owner and routine name visible to
/// [`CapabilityProbe::exists`]. Every call to [`BodyAccessor::write_body`] is counted.
#[derive(Debug, Default)]
pub struct MemoryHost {
    methods: DashMap<TargetKey, MethodHandle>,
    bodies: DashMap<MethodHandle, InstructionSequence>,
    members: DashSet<(String, String)>,
    next_handle: AtomicU64,
    writes: AtomicUsize,
}

impl MemoryHost {
    /// Creates an empty host.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a method with the given body and returns its handle.
    ///
    /// Redefining a key replaces its body and keeps the handle.
    pub fn define(&self, key: TargetKey, body: InstructionSequence) -> MethodHandle {
        let handle = *self
            .methods
            .entry(key.clone())
            .or_insert_with(|| MethodHandle(self.next_handle.fetch_add(1, Ordering::Relaxed)));
        self.members
            .insert((key.owner().to_string(), key.routine_name()));
        self.bodies.insert(handle, body);
        handle
    }

    /// Returns the current body of the method `key` names.
    #[must_use]
    pub fn body(&self, key: &TargetKey) -> Option<InstructionSequence> {
        let handle = *self.methods.get(key)?;
        self.bodies.get(&handle).map(|body| body.clone())
    }

    /// Number of bodies written so far.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

impl TargetResolver for MemoryHost {
    fn resolve(&self, key: &TargetKey) -> Option<MethodHandle> {
        self.methods.get(key).map(|handle| *handle)
    }
}

impl BodyAccessor for MemoryHost {
    fn read_body(&self, method: MethodHandle) -> Result<InstructionSequence> {
        self.bodies
            .get(&method)
            .map(|body| body.clone())
            .ok_or_else(|| malformed_error!("Unknown method handle {}", method.raw()))
    }

    fn write_body(&self, method: MethodHandle, body: InstructionSequence) -> Result<()> {
        match self.bodies.get_mut(&method) {
            Some(mut slot) => {
                *slot = body;
                self.writes.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            None => Err(malformed_error!("Unknown method handle {}", method.raw())),
        }
    }
}

impl CapabilityProbe for MemoryHost {
    fn exists(&self, owner: &str, member: &str) -> bool {
        self.members
            .contains(&(owner.to_string(), member.to_string()))
    }
}
