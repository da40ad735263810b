//! Patch registration, installation and call dispatch.
//!
//! This module connects the rewrite passes of [`crate::rewrite`] to a running host. Each
//! [`PatchRegistration`] names one target method and declares what to do to it: rewrite its
//! body, run a prefix before it, run a postfix after it, or any combination. A [`Patcher`]
//! collects registrations, installs them against a [`Host`] in one step and afterwards
//! dispatches calls through the linked hooks.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐  register   ┌──────────┐  install   ┌──────────────────────────┐
//! │PatchRegistration│ ──────────▶ │ Patcher  │ ─────────▶ │ Host                     │
//! │ target         │             │          │            │  TargetResolver          │
//! │ passes         │             │          │            │  BodyAccessor            │
//! │ prefix/postfix │             │          │            │  CapabilityProbe         │
//! │ enabled, opt.  │             └────┬─────┘            └──────────────────────────┘
//! └────────────────┘                  │ invoke
//!                                     ▼
//!                   prefixes (by priority) → body → postfixes (by priority)
//! ```
//!
//! # Key Components
//!
//! - [`TargetKey`] - names a method, getter or setter on a host type
//! - [`PatchRegistration`] - one owner's static patch declaration for one target
//! - [`Patcher`] - registry, installer and dispatcher
//! - [`Lifecycle`] - the `Active → Retired` switch of a registration
//! - [`LazyBinding`] - resolve-once handle for members that may be absent
//! - [`MemoryHost`] - in-memory [`Host`] implementation

mod binding;
mod dispatcher;
mod hooks;
mod host;
mod lifecycle;
mod registration;
mod target;

pub use binding::LazyBinding;
pub use dispatcher::{InstallReport, MissingPattern, Patcher};
pub use hooks::{
    priority, CallContext, Postfix, PostfixFn, Prefix, PrefixAction, PrefixFn, Value,
};
pub use host::{BodyAccessor, CapabilityProbe, Host, MemoryHost, MethodHandle, TargetResolver};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use registration::{EnabledFn, PatchKinds, PatchRegistration};
pub use target::{MemberKind, TargetKey};
