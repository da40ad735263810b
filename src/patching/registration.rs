//! Static patch declarations.
//!
//! A [`PatchRegistration`] bundles everything one owner wants to do to one target method:
//! rewrite passes (run in declared order), an optional prefix, an optional postfix, a
//! predicate deciding whether the patch applies at all, and whether the target may be
//! missing from the host.

use std::{fmt, sync::Arc};

use bitflags::bitflags;

use crate::{
    patching::{
        binding::LazyBinding,
        hooks::{CallContext, Postfix, Prefix, PrefixAction},
        host::MethodHandle,
        lifecycle::Lifecycle,
        TargetKey,
    },
    rewrite::RewritePass,
};

bitflags! {
    /// Kinds of patch a registration applies.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PatchKinds: u8 {
        /// Has a prefix hook
        const PREFIX = 0x01;
        /// Has a postfix hook
        const POSTFIX = 0x02;
        /// Rewrites the body
        const TRANSPILER = 0x04;
    }
}

/// Signature of an enabled predicate.
pub type EnabledFn = dyn Fn() -> bool + Send + Sync;

/// One owner's patch of one target.
///
/// # Lifecycle
///
/// Built once at startup. The enabled predicate is evaluated exactly once, when the
/// registration is installed; a disabled registration installs nothing and costs nothing at
/// call time. After installation the registration is never mutated. Its hooks are removed
/// only through its [`Lifecycle`], either by [`crate::patching::Patcher::unpatch`] or by a
/// hook that captured [`PatchRegistration::lifecycle`] and retires itself.
///
/// # Examples
///
/// ```rust
/// use ilweave::patching::{priority, PatchKinds, PatchRegistration, PrefixAction, TargetKey};
///
/// let registration = PatchRegistration::new("camera+", TargetKey::method("TimeControls", "DoTimeControlsGUI"))
///     .prefix(priority::NORMAL, |_ctx| PrefixAction::Continue);
///
/// assert_eq!(registration.kinds(), PatchKinds::PREFIX);
/// ```
pub struct PatchRegistration {
    owner: String,
    target: TargetKey,
    passes: Vec<Box<dyn RewritePass>>,
    prefix: Option<Prefix>,
    postfix: Option<Postfix>,
    enabled: Box<EnabledFn>,
    optional: bool,
    lifecycle: Arc<Lifecycle>,
    binding: LazyBinding<MethodHandle>,
}

impl PatchRegistration {
    /// Starts a registration of `owner` for `target`.
    #[must_use]
    pub fn new(owner: impl Into<String>, target: TargetKey) -> Self {
        let binding = LazyBinding::for_target(&target);
        PatchRegistration {
            owner: owner.into(),
            target,
            passes: Vec::new(),
            prefix: None,
            postfix: None,
            enabled: Box::new(|| true),
            optional: false,
            lifecycle: Arc::new(Lifecycle::new()),
            binding,
        }
    }

    /// Appends a rewrite pass. Passes run in the order they are added.
    #[must_use]
    pub fn pass<P>(mut self, pass: P) -> Self
    where
        P: RewritePass + 'static,
    {
        self.passes.push(Box::new(pass));
        self
    }

    /// Sets the prefix hook.
    #[must_use]
    pub fn prefix<F>(mut self, priority: i32, hook: F) -> Self
    where
        F: Fn(&mut CallContext) -> PrefixAction + Send + Sync + 'static,
    {
        self.prefix = Some(Prefix::new(priority, hook));
        self
    }

    /// Sets the postfix hook.
    #[must_use]
    pub fn postfix<F>(mut self, priority: i32, hook: F) -> Self
    where
        F: Fn(&mut CallContext) + Send + Sync + 'static,
    {
        self.postfix = Some(Postfix::new(priority, hook));
        self
    }

    /// Sets the predicate deciding at install time whether this registration applies.
    #[must_use]
    pub fn enabled<F>(mut self, predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.enabled = Box::new(predicate);
        self
    }

    /// Declares the target optional: if the capability probe reports it absent, the
    /// registration is skipped instead of failing installation.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Returns the owner id.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Returns the target.
    #[must_use]
    pub fn target(&self) -> &TargetKey {
        &self.target
    }

    /// Returns the rewrite passes in order.
    #[must_use]
    pub fn passes(&self) -> &[Box<dyn RewritePass>] {
        &self.passes
    }

    /// Returns the prefix hook.
    #[must_use]
    pub fn prefix_hook(&self) -> Option<&Prefix> {
        self.prefix.as_ref()
    }

    /// Returns the postfix hook.
    #[must_use]
    pub fn postfix_hook(&self) -> Option<&Postfix> {
        self.postfix.as_ref()
    }

    /// Returns `true` if the target may be absent.
    #[must_use]
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Evaluates the enabled predicate.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        (self.enabled)()
    }

    /// Returns a handle to this registration's lifecycle.
    ///
    /// Hooks that retire their own registration capture this handle.
    #[must_use]
    pub fn lifecycle(&self) -> Arc<Lifecycle> {
        Arc::clone(&self.lifecycle)
    }

    /// Returns the cached binding of the target.
    #[must_use]
    pub fn binding(&self) -> &LazyBinding<MethodHandle> {
        &self.binding
    }

    /// Returns which kinds of patch this registration applies.
    #[must_use]
    pub fn kinds(&self) -> PatchKinds {
        let mut kinds = PatchKinds::empty();
        if self.prefix.is_some() {
            kinds |= PatchKinds::PREFIX;
        }
        if self.postfix.is_some() {
            kinds |= PatchKinds::POSTFIX;
        }
        if !self.passes.is_empty() {
            kinds |= PatchKinds::TRANSPILER;
        }
        kinds
    }
}

impl fmt::Debug for PatchRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchRegistration")
            .field("owner", &self.owner)
            .field("target", &self.target)
            .field(
                "passes",
                &self.passes.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("prefix", &self.prefix)
            .field("postfix", &self.postfix)
            .field("optional", &self.optional)
            .field("lifecycle", &self.lifecycle.state())
            .finish_non_exhaustive()
    }
}
