//! Lazily bound handles for members that may be absent.
//!
//! Integrations with optional third-party components must not look members up by name on
//! every call. A [`LazyBinding`] runs its lookup until it succeeds, caches the handle it found
//! and serves every later access from the cache. An "absent" answer is not cached, so a
//! failed installation can be retried against a host that has since loaded the member.

use std::{fmt, sync::OnceLock};

use crate::patching::{
    host::{CapabilityProbe, MethodHandle, TargetResolver},
    TargetKey,
};

/// A value looked up on first successful use.
///
/// ```rust
/// use ilweave::patching::LazyBinding;
///
/// let binding: LazyBinding<u32> = LazyBinding::new("answer");
/// assert_eq!(binding.get_or_bind(|| None), None);
/// assert!(!binding.is_bound());
/// assert_eq!(binding.get_or_bind(|| Some(42)), Some(&42));
/// assert_eq!(binding.get_or_bind(|| None), Some(&42));
/// ```
pub struct LazyBinding<T> {
    description: String,
    cell: OnceLock<T>,
}

impl<T> LazyBinding<T> {
    /// Creates an unbound binding; `description` names the member for diagnostics.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        LazyBinding {
            description: description.into(),
            cell: OnceLock::new(),
        }
    }

    /// Returns the bound value, running `bind` if nothing is bound yet.
    ///
    /// A `None` from `bind` leaves the binding unbound.
    pub fn get_or_bind<F>(&self, bind: F) -> Option<&T>
    where
        F: FnOnce() -> Option<T>,
    {
        if let Some(value) = self.cell.get() {
            return Some(value);
        }
        let value = bind()?;
        Some(self.cell.get_or_init(|| value))
    }

    /// Returns the bound value without binding.
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    /// Returns `true` once a lookup has succeeded.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Returns the description given at construction.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl LazyBinding<MethodHandle> {
    /// Creates a binding for the method `key` names.
    #[must_use]
    pub fn for_target(key: &TargetKey) -> Self {
        Self::new(key.to_string())
    }

    /// Binds to the method `key` names.
    ///
    /// When `optional` is set the probe is asked first and an absent member returns `None`
    /// without consulting the resolver.
    pub fn bind_target<H>(&self, host: &H, key: &TargetKey, optional: bool) -> Option<MethodHandle>
    where
        H: TargetResolver + CapabilityProbe + ?Sized,
    {
        self.get_or_bind(|| {
            if optional && !host.exists(key.owner(), &key.routine_name()) {
                return None;
            }
            host.resolve(key)
        })
        .copied()
    }
}

impl<T: fmt::Debug> fmt::Debug for LazyBinding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyBinding")
            .field("description", &self.description)
            .field("value", &self.cell.get())
            .finish()
    }
}
