//! Registration, installation and call dispatch.
//!
//! [`Patcher`] owns every [`PatchRegistration`] and drives them through three stages:
//!
//! ```text
//! register()   static declarations, one per (owner, target)
//!     │
//! install()    1. evaluate enabled predicates, probe and resolve every target
//!     │        2. read bodies, run passes in order, verify, check payload bindings
//!     │        3. write bodies, link hooks
//!     │
//! invoke()     prefixes by descending priority → body → postfixes
//! ```
//!
//! Nothing is written to the host until every enabled registration has been resolved and
//! every rewritten body has been built and verified. If the host then rejects one of the
//! writes, the bodies already written are restored, so an installation error leaves the host
//! untouched and a later retry starts from the original bodies.
//!
//! # Hook Storage
//!
//! Hooks of one target live in two [`SkipMap`]s ordered by `(Reverse(priority), sequence)`,
//! where the sequence is the registration order. Iteration therefore yields the highest
//! priority first and is stable among equal priorities. Entries of retired registrations are
//! removed while iterating, which makes it safe for a hook to retire its own registration in
//! the middle of a call.

use std::{cmp::Reverse, collections::HashSet, sync::Arc};

use crossbeam_skiplist::SkipMap;
use dashmap::DashMap;

use crate::{
    assembly::InstructionSequence,
    config::{MissingPatternPolicy, PatchConfig},
    diagnostics::{EventKind, EventLog},
    patching::{
        hooks::{CallContext, Postfix, Prefix, PrefixAction},
        host::{Host, MethodHandle},
        lifecycle::Lifecycle,
        registration::{PatchKinds, PatchRegistration},
        TargetKey,
    },
    payload::PayloadTable,
    rewrite::RewritePass,
    Error, Result,
};

type HookKey = (Reverse<i32>, usize);

struct HookEntry<H> {
    owner: String,
    lifecycle: Arc<Lifecycle>,
    hook: H,
}

#[derive(Default)]
struct TargetHooks {
    prefixes: SkipMap<HookKey, HookEntry<Prefix>>,
    postfixes: SkipMap<HookKey, HookEntry<Postfix>>,
}

/// A pass that did not find its pattern during installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingPattern {
    /// The target being rewritten
    pub target: TargetKey,
    /// Name of the pass
    pub pass: &'static str,
    /// Description of the pattern
    pub pattern: String,
}

/// What [`Patcher::install`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// Targets whose bodies or hooks were installed, in registration order
    pub installed: Vec<TargetKey>,
    /// Targets of registrations whose enabled predicate returned false
    pub skipped_disabled: Vec<TargetKey>,
    /// Targets of optional registrations that the host does not have
    pub skipped_absent: Vec<TargetKey>,
    /// Passes that did not match under [`MissingPatternPolicy::Log`]
    pub patterns_missing: Vec<MissingPattern>,
}

impl InstallReport {
    /// Returns `true` if nothing was installed or skipped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.installed.is_empty()
            && self.skipped_disabled.is_empty()
            && self.skipped_absent.is_empty()
            && self.patterns_missing.is_empty()
    }
}

/// The pass registry and call dispatcher.
///
/// # Examples
///
/// ```rust
/// use ilweave::assembly::{Instruction, InstructionSequence};
/// use ilweave::patching::{
///     priority, CallContext, MemoryHost, Patcher, PrefixAction, TargetKey, Value,
/// };
/// use ilweave::PatchConfig;
///
/// let host = MemoryHost::new();
/// let target = TargetKey::getter("KeyBindingDef", "KeyDownEvent");
/// host.define(
///     target.clone(),
///     InstructionSequence::from_instructions(vec![Instruction::ldc_i4(0), Instruction::ret()], true),
/// );
///
/// let mut patcher = Patcher::new(PatchConfig::default());
/// let registration = patcher.registration(target.clone()).prefix(priority::NORMAL, |ctx| {
///     ctx.result = Value::Bool(true);
///     PrefixAction::Suppress
/// });
/// patcher.register(registration)?;
/// patcher.install(&host)?;
///
/// let mut ctx = CallContext::new(target.clone());
/// patcher.invoke(&target, &mut ctx, |ctx| ctx.result = Value::Bool(false));
/// assert_eq!(ctx.result, Value::Bool(true));
/// assert!(!ctx.original_ran());
/// # Ok::<(), ilweave::Error>(())
/// ```
pub struct Patcher {
    config: PatchConfig,
    events: Arc<EventLog>,
    payloads: Option<Arc<PayloadTable>>,
    registrations: Vec<PatchRegistration>,
    keys: HashSet<(String, TargetKey)>,
    hooks: DashMap<TargetKey, Arc<TargetHooks>>,
    installed: bool,
}

impl Patcher {
    /// Creates a patcher with its own event log.
    #[must_use]
    pub fn new(config: PatchConfig) -> Self {
        Self::with_events(config, Arc::new(EventLog::new()))
    }

    /// Creates a patcher recording into a shared event log.
    #[must_use]
    pub fn with_events(config: PatchConfig, events: Arc<EventLog>) -> Self {
        Patcher {
            config,
            events,
            payloads: None,
            registrations: Vec::new(),
            keys: HashSet::new(),
            hooks: DashMap::new(),
            installed: false,
        }
    }

    /// Requires every call into `payloads`' owning type in a rewritten body to be bound.
    #[must_use]
    pub fn with_payloads(mut self, payloads: Arc<PayloadTable>) -> Self {
        self.payloads = Some(payloads);
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &PatchConfig {
        &self.config
    }

    /// Returns the event log.
    #[must_use]
    pub fn events(&self) -> &Arc<EventLog> {
        &self.events
    }

    /// Starts a registration for `target` owned by the configured owner id.
    #[must_use]
    pub fn registration(&self, target: TargetKey) -> PatchRegistration {
        PatchRegistration::new(self.config.owner.clone(), target)
    }

    /// Adds a registration.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::RegistryFrozen`] - installation already happened
    /// - [`crate::Error::DuplicateRegistration`] - the owner already registered this target
    pub fn register(&mut self, registration: PatchRegistration) -> Result<()> {
        if self.installed {
            return Err(Error::RegistryFrozen);
        }

        let key = (
            registration.owner().to_string(),
            registration.target().clone(),
        );
        if !self.keys.insert(key) {
            return Err(Error::DuplicateRegistration {
                owner: registration.owner().to_string(),
                target: registration.target().clone(),
            });
        }

        self.registrations.push(registration);
        Ok(())
    }

    /// Returns the registrations in registration order.
    #[must_use]
    pub fn registrations(&self) -> &[PatchRegistration] {
        &self.registrations
    }

    /// Returns `true` once [`Patcher::install`] has succeeded.
    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.installed
    }

    /// Installs every enabled registration into `host`.
    ///
    /// Passes of several registrations on the same target run in registration order, each
    /// pass consuming the previous pass's output. Calling `install` again after a successful
    /// installation does nothing and returns an empty report.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::TargetUnresolved`] - a required target is missing from the host
    /// - [`crate::Error::PatternNotFound`] - a pass did not match under
    ///   [`MissingPatternPolicy::Fail`]
    /// - [`crate::Error::UnboundPayload`] - a rewritten body calls an unbound payload
    /// - any verification or host error
    ///
    /// On error no hook is linked and every body is back to what it was before the call. A
    /// host that rejects a write has the bodies written before it restored.
    pub fn install<H>(&mut self, host: &H) -> Result<InstallReport>
    where
        H: Host + ?Sized,
    {
        if self.installed {
            return Ok(InstallReport::default());
        }

        let mut report = InstallReport::default();
        let mut groups: Vec<(MethodHandle, Vec<usize>)> = Vec::new();

        for (index, registration) in self.registrations.iter().enumerate() {
            let target = registration.target();
            if !registration.is_enabled() {
                self.events
                    .record(EventKind::TargetSkipped)
                    .target(target)
                    .message(format!("disabled for {}", registration.owner()));
                report.skipped_disabled.push(target.clone());
                continue;
            }

            match registration
                .binding()
                .bind_target(host, target, registration.is_optional())
            {
                Some(handle) => match groups.iter_mut().find(|(h, _)| *h == handle) {
                    Some((_, members)) => members.push(index),
                    None => groups.push((handle, vec![index])),
                },
                None if registration.is_optional() => {
                    self.events
                        .record(EventKind::TargetSkipped)
                        .target(target)
                        .message("optional target not present");
                    report.skipped_absent.push(target.clone());
                }
                None => return Err(Error::TargetUnresolved(target.clone())),
            }
        }

        let mut writes = Vec::new();
        for (handle, members) in &groups {
            let has_passes = members
                .iter()
                .any(|&index| !self.registrations[index].passes().is_empty());
            if !has_passes {
                continue;
            }

            let target = self.registrations[members[0]].target();
            let original = host.read_body(*handle)?;
            let mut body = original.clone();
            for &index in members {
                let registration = &self.registrations[index];
                for pass in registration.passes() {
                    body = self.run_pass(target, registration.owner(), pass.as_ref(), body, &mut report)?;
                }
            }

            if let Some(payloads) = &self.payloads {
                payloads.check_bound(&body)?;
            }
            if self.config.verify_bodies {
                body.verify()?;
            }
            writes.push((target, *handle, original, body));
        }

        let mut written = Vec::with_capacity(writes.len());
        for (target, handle, original, body) in writes {
            if let Err(error) = host.write_body(handle, body) {
                self.roll_back(host, written);
                return Err(error);
            }
            written.push((target, handle, original));
        }

        for (_, members) in &groups {
            for &index in members {
                self.link_hooks(index);
            }
            let registration = &self.registrations[members[0]];
            let kinds = members
                .iter()
                .fold(PatchKinds::empty(), |acc, &i| acc | self.registrations[i].kinds());
            self.events
                .record(EventKind::TargetInstalled)
                .target(registration.target())
                .message(format!("{kinds:?} from {} registration(s)", members.len()));
            report.installed.push(registration.target().clone());
        }

        self.installed = true;
        Ok(report)
    }

    fn roll_back<H>(&self, host: &H, written: Vec<(&TargetKey, MethodHandle, InstructionSequence)>)
    where
        H: Host + ?Sized,
    {
        for (target, handle, original) in written.into_iter().rev() {
            match host.write_body(handle, original) {
                Ok(()) => self
                    .events
                    .record(EventKind::Warning)
                    .target(target)
                    .message("original body restored after a failed installation"),
                Err(error) => self
                    .events
                    .record(EventKind::Error)
                    .target(target)
                    .message(format!("Cannot restore original body: {error}")),
            };
        }
    }

    fn run_pass(
        &self,
        target: &TargetKey,
        owner: &str,
        pass: &dyn RewritePass,
        body: InstructionSequence,
        report: &mut InstallReport,
    ) -> Result<InstructionSequence> {
        let outcome = pass.apply(&body)?;
        if outcome.found {
            self.events
                .record(EventKind::PassApplied)
                .target(target)
                .pass(pass.name())
                .message(format!("{} match(es)", outcome.matches));
            return Ok(outcome.sequence);
        }

        match self.config.missing_pattern {
            MissingPatternPolicy::Fail => Err(Error::PatternNotFound {
                target: target.clone(),
                pass: pass.name(),
                pattern: pass.pattern(),
            }),
            MissingPatternPolicy::Log => {
                if let Some(event) = self.events.record_once(
                    format!("missing/{owner}/{target}/{}", pass.name()),
                    EventKind::PatternNotFound,
                ) {
                    event
                        .target(target)
                        .pass(pass.name())
                        .message(format!("Cannot find '{}' in {target}", pass.pattern()));
                }
                report.patterns_missing.push(MissingPattern {
                    target: target.clone(),
                    pass: pass.name(),
                    pattern: pass.pattern(),
                });
                Ok(outcome.sequence)
            }
        }
    }

    fn link_hooks(&self, index: usize) {
        let registration = &self.registrations[index];
        if registration.prefix_hook().is_none() && registration.postfix_hook().is_none() {
            return;
        }

        let hooks = Arc::clone(
            self.hooks
                .entry(registration.target().clone())
                .or_default()
                .value(),
        );

        if let Some(prefix) = registration.prefix_hook() {
            hooks.prefixes.insert(
                (Reverse(prefix.priority()), index),
                HookEntry {
                    owner: registration.owner().to_string(),
                    lifecycle: registration.lifecycle(),
                    hook: prefix.clone(),
                },
            );
        }
        if let Some(postfix) = registration.postfix_hook() {
            hooks.postfixes.insert(
                (Reverse(postfix.priority()), index),
                HookEntry {
                    owner: registration.owner().to_string(),
                    lifecycle: registration.lifecycle(),
                    hook: postfix.clone(),
                },
            );
        }
    }

    /// Calls a patched method.
    ///
    /// Prefixes run by descending priority. The first prefix returning
    /// [`PrefixAction::Suppress`] stops the remaining prefixes and `original`. Postfixes then
    /// run by descending priority whether or not the body ran. A target without hooks just
    /// runs `original`.
    pub fn invoke<F>(&self, target: &TargetKey, ctx: &mut CallContext, original: F)
    where
        F: FnOnce(&mut CallContext),
    {
        let hooks = self.hooks.get(target).map(|entry| Arc::clone(entry.value()));
        let Some(hooks) = hooks else {
            original(ctx);
            ctx.mark_original_ran();
            return;
        };

        let mut run_original = true;
        for entry in hooks.prefixes.iter() {
            let prefix = entry.value();
            if !prefix.lifecycle.is_active() {
                entry.remove();
                self.note_retired(target, &prefix.owner);
                continue;
            }
            if prefix.hook.run(ctx) == PrefixAction::Suppress {
                run_original = false;
                break;
            }
        }

        if run_original {
            original(ctx);
            ctx.mark_original_ran();
        }

        for entry in hooks.postfixes.iter() {
            let postfix = entry.value();
            if !postfix.lifecycle.is_active() {
                entry.remove();
                self.note_retired(target, &postfix.owner);
                continue;
            }
            postfix.hook.run(ctx);
        }
    }

    /// Retires `owner`'s registration for `target` and unlinks its hooks.
    ///
    /// Returns `true` if the registration was active. Unpatching an unknown or already
    /// retired registration does nothing and returns `false`.
    pub fn unpatch(&self, target: &TargetKey, owner: &str) -> bool {
        let Some(registration) = self
            .registrations
            .iter()
            .find(|r| r.target() == target && r.owner() == owner)
        else {
            return false;
        };

        let retired = registration.lifecycle().retire();
        if let Some(hooks) = self.hooks.get(target).map(|entry| Arc::clone(entry.value())) {
            self.sweep(target, &hooks);
        }
        retired
    }

    fn sweep(&self, target: &TargetKey, hooks: &TargetHooks) {
        for entry in hooks.prefixes.iter() {
            if !entry.value().lifecycle.is_active() {
                entry.remove();
                self.note_retired(target, &entry.value().owner);
            }
        }
        for entry in hooks.postfixes.iter() {
            if !entry.value().lifecycle.is_active() {
                entry.remove();
                self.note_retired(target, &entry.value().owner);
            }
        }
    }

    fn note_retired(&self, target: &TargetKey, owner: &str) {
        if let Some(event) = self
            .events
            .record_once(format!("retired/{owner}/{target}"), EventKind::HookRetired)
        {
            event
                .target(target)
                .message(format!("hooks of {owner} unlinked"));
        }
    }

    /// Owners with live hooks on `target`, highest priority first.
    #[must_use]
    pub fn owners(&self, target: &TargetKey) -> Vec<String> {
        let Some(hooks) = self.hooks.get(target).map(|entry| Arc::clone(entry.value())) else {
            return Vec::new();
        };

        let mut owners: Vec<String> = Vec::new();
        let live_prefixes = hooks
            .prefixes
            .iter()
            .filter(|e| e.value().lifecycle.is_active())
            .map(|e| e.value().owner.clone());
        let live_postfixes = hooks
            .postfixes
            .iter()
            .filter(|e| e.value().lifecycle.is_active())
            .map(|e| e.value().owner.clone());
        for owner in live_prefixes.chain(live_postfixes) {
            if !owners.contains(&owner) {
                owners.push(owner);
            }
        }
        owners
    }

    /// Number of linked prefix and postfix hooks on `target`.
    ///
    /// Hooks of a registration that retired itself stay counted until the next
    /// [`Patcher::invoke`] of the target unlinks them.
    #[must_use]
    pub fn hook_count(&self, target: &TargetKey) -> usize {
        self.hooks
            .get(target)
            .map_or(0, |hooks| hooks.prefixes.len() + hooks.postfixes.len())
    }
}
