//! Integration tests for registration, installation and call dispatch.
//!
//! Every test drives the public API against a [`MemoryHost`], the way a mod would at startup
//! and afterwards from the host's call path.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use ilweave::{
    patching::{MethodHandle, PatchRegistration},
    payload::PayloadTable,
    prelude::*,
};

fn update() -> TargetKey {
    TargetKey::method("CameraDriver", "Update")
}

fn root_size() -> FieldRef {
    FieldRef::instance("CameraDriver", "rootSize")
}

fn setter() -> MethodRef {
    MethodRef::new("CameraPlus.Tools", "SetRootSize")
        .param("CameraDriver")
        .param("float")
}

/// `this.rootSize = 24f; return;`
fn update_body() -> InstructionSequence {
    InstructionSequence::from_instructions(
        vec![
            Instruction::ldarg(0),
            Instruction::ldc_r4(24.0),
            Instruction::store_field(root_size()),
            Instruction::ret(),
        ],
        false,
    )
}

fn zoom_to_mouse() -> Result<PointSubstitution> {
    Ok(PointSubstitution::new(
        Pattern::StoresField(root_size()),
        vec![Instruction::call(setter())],
    )?
    .named("zoom-to-mouse"))
}

/// A [`MemoryHost`] that rejects one chosen body write.
struct FlakyHost {
    inner: MemoryHost,
    attempts: AtomicUsize,
    fail_at: usize,
}

impl FlakyHost {
    fn failing_write(fail_at: usize) -> Self {
        FlakyHost {
            inner: MemoryHost::new(),
            attempts: AtomicUsize::new(0),
            fail_at,
        }
    }
}

impl TargetResolver for FlakyHost {
    fn resolve(&self, key: &TargetKey) -> Option<MethodHandle> {
        self.inner.resolve(key)
    }
}

impl BodyAccessor for FlakyHost {
    fn read_body(&self, method: MethodHandle) -> Result<InstructionSequence> {
        self.inner.read_body(method)
    }

    fn write_body(&self, method: MethodHandle, body: InstructionSequence) -> Result<()> {
        if self.attempts.fetch_add(1, Ordering::Relaxed) + 1 == self.fail_at {
            return Err(Error::LockError);
        }
        self.inner.write_body(method, body)
    }
}

impl CapabilityProbe for FlakyHost {
    fn exists(&self, owner: &str, member: &str) -> bool {
        self.inner.exists(owner, member)
    }
}

fn host_with_update() -> MemoryHost {
    let host = MemoryHost::new();
    host.define(update(), update_body());
    host
}

/// A registration whose enabled predicate is false installs no pass and no hook.
#[test]
fn test_disabled_registration_is_inert() -> Result<()> {
    let host = host_with_update();
    let prefix_runs = Arc::new(AtomicUsize::new(0));

    let mut patcher = Patcher::new(PatchConfig::default());
    let counter = Arc::clone(&prefix_runs);
    let registration = patcher
        .registration(update())
        .pass(zoom_to_mouse()?)
        .prefix(priority::NORMAL, move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
            PrefixAction::Continue
        })
        .enabled(|| false);
    patcher.register(registration)?;

    let report = patcher.install(&host)?;
    assert_eq!(report.skipped_disabled, vec![update()]);
    assert_eq!(host.writes(), 0);
    assert_eq!(host.body(&update()), Some(update_body()));

    let mut ctx = CallContext::new(update());
    patcher.invoke(&update(), &mut ctx, |_| {});
    assert!(ctx.original_ran());
    assert_eq!(prefix_runs.load(Ordering::Relaxed), 0);
    assert_eq!(patcher.events().count_kind(EventKind::TargetSkipped), 1);
    Ok(())
}

/// The same owner cannot register one target twice; another owner can.
#[test]
fn test_duplicate_registration_guard() -> Result<()> {
    let mut patcher = Patcher::new(PatchConfig::default());
    patcher.register(patcher.registration(update()))?;

    match patcher.register(patcher.registration(update())) {
        Err(Error::DuplicateRegistration { owner, target }) => {
            assert_eq!(owner, patcher.config().owner);
            assert_eq!(target, update());
        }
        other => panic!("expected DuplicateRegistration, got {other:?}"),
    }

    patcher.register(PatchRegistration::new("another.mod", update()))?;
    Ok(())
}

/// Installing twice does not apply passes twice.
#[test]
fn test_install_is_idempotent() -> Result<()> {
    let host = host_with_update();
    let mut patcher = Patcher::new(PatchConfig::default());
    patcher.register(patcher.registration(update()).pass(zoom_to_mouse()?))?;

    let first = patcher.install(&host)?;
    let installed = host.body(&update());
    let second = patcher.install(&host)?;

    assert_eq!(first.installed, vec![update()]);
    assert!(second.is_empty());
    assert_eq!(host.writes(), 1);
    assert_eq!(host.body(&update()), installed);
    assert!(patcher.is_installed());
    assert!(matches!(
        patcher.register(PatchRegistration::new("late", update())),
        Err(Error::RegistryFrozen)
    ));
    Ok(())
}

/// The rewritten body calls the setter instead of storing the field.
#[test]
fn test_substitution_installed() -> Result<()> {
    let host = host_with_update();
    let mut patcher = Patcher::new(PatchConfig::default());
    patcher.register(patcher.registration(update()).pass(zoom_to_mouse()?))?;
    patcher.install(&host)?;

    let body = host.body(&update()).expect("defined");
    assert_eq!(body.count(|i| i.method() == Some(&setter())), 1);
    assert_eq!(body.count(|i| i.opcode == OpCode::Stfld), 0);
    assert_eq!(body.verify()?, 2);
    assert_eq!(patcher.events().count_kind(EventKind::PassApplied), 1);
    Ok(())
}

/// A suppressing high priority prefix stops the lower prefix and the body; both postfixes
/// still run in priority order.
#[test]
fn test_suppressing_prefix_short_circuits() -> Result<()> {
    let host = host_with_update();
    let trace = Arc::new(Mutex::new(Vec::<String>::new()));

    let mut patcher = Patcher::new(PatchConfig::default());
    for (owner, prio, suppress) in [("low", 10, false), ("high", 100, true)] {
        let pre = Arc::clone(&trace);
        let post = Arc::clone(&trace);
        let registration = PatchRegistration::new(owner, update())
            .prefix(prio, move |ctx| {
                pre.lock().unwrap().push(format!("prefix {owner}"));
                if suppress {
                    ctx.result = Value::I32(7);
                    PrefixAction::Suppress
                } else {
                    PrefixAction::Continue
                }
            })
            .postfix(prio, move |_| post.lock().unwrap().push(format!("postfix {owner}")));
        patcher.register(registration)?;
    }
    patcher.install(&host)?;

    let body_trace = Arc::clone(&trace);
    let mut ctx = CallContext::new(update());
    patcher.invoke(&update(), &mut ctx, move |_| {
        body_trace.lock().unwrap().push("body".into());
    });

    assert_eq!(
        *trace.lock().unwrap(),
        vec!["prefix high", "postfix high", "postfix low"]
    );
    assert!(!ctx.original_ran());
    assert_eq!(ctx.result, Value::I32(7));
    Ok(())
}

/// An optional target that the host does not have is skipped without error while the
/// remaining registrations install.
#[test]
fn test_optional_absent_target_skipped() -> Result<()> {
    let host = host_with_update();
    let ship = TargetKey::method("SaveOurShip2.MeshRecalculateHelper", "RecalculateMesh");
    let center = FieldRef::new_static("SaveOurShip2.SectionThreadManager", "Center");

    let mut patcher = Patcher::new(PatchConfig::strict());
    patcher.register(
        patcher
            .registration(ship.clone())
            .pass(WindowMultiply::new(center, 4.0))
            .optional(),
    )?;
    patcher.register(patcher.registration(update()).pass(zoom_to_mouse()?))?;

    let report = patcher.install(&host)?;
    assert_eq!(report.skipped_absent, vec![ship.clone()]);
    assert_eq!(report.installed, vec![update()]);
    assert!(!patcher.registrations()[0].binding().is_bound());
    assert_eq!(patcher.hook_count(&ship), 0);
    Ok(())
}

/// A required target that cannot be resolved aborts installation before anything is written.
#[test]
fn test_unresolved_required_target() -> Result<()> {
    let host = host_with_update();
    let missing = TargetKey::method("CameraDriver", "Removed");

    let mut patcher = Patcher::new(PatchConfig::default());
    patcher.register(patcher.registration(update()).pass(zoom_to_mouse()?))?;
    patcher.register(
        patcher
            .registration(missing.clone())
            .postfix(priority::NORMAL, |_| {}),
    )?;

    match patcher.install(&host) {
        Err(Error::TargetUnresolved(target)) => assert_eq!(target, missing),
        other => panic!("expected TargetUnresolved, got {other:?}"),
    }
    assert_eq!(host.writes(), 0);
    assert!(!patcher.is_installed());
    Ok(())
}

/// Under the default policy a missing pattern is logged once and the rest still installs.
#[test]
fn test_missing_pattern_logged() -> Result<()> {
    let host = MemoryHost::new();
    host.define(
        update(),
        InstructionSequence::from_instructions(vec![Instruction::ret()], false),
    );

    let mut patcher = Patcher::new(PatchConfig::default());
    let registration = patcher
        .registration(update())
        .pass(zoom_to_mouse()?)
        .postfix(priority::NORMAL, |ctx| ctx.result = Value::Bool(true));
    patcher.register(registration)?;

    let report = patcher.install(&host)?;
    assert_eq!(report.patterns_missing.len(), 1);
    assert_eq!(report.patterns_missing[0].pass, "zoom-to-mouse");
    assert_eq!(report.installed, vec![update()]);
    assert_eq!(patcher.events().count_kind(EventKind::PatternNotFound), 1);

    let mut ctx = CallContext::new(update());
    patcher.invoke(&update(), &mut ctx, |_| {});
    assert_eq!(ctx.result, Value::Bool(true));
    Ok(())
}

/// Under the hard-fail policy a missing pattern aborts installation.
#[test]
fn test_missing_pattern_fails_when_strict() -> Result<()> {
    let host = MemoryHost::new();
    host.define(
        update(),
        InstructionSequence::from_instructions(vec![Instruction::ret()], false),
    );

    let mut patcher = Patcher::new(PatchConfig::strict());
    patcher.register(patcher.registration(update()).pass(zoom_to_mouse()?))?;

    match patcher.install(&host) {
        Err(Error::PatternNotFound { target, pass, .. }) => {
            assert_eq!(target, update());
            assert_eq!(pass, "zoom-to-mouse");
        }
        other => panic!("expected PatternNotFound, got {other:?}"),
    }
    assert_eq!(host.writes(), 0);
    Ok(())
}

/// Passes of different registrations on one target run in registration order, each on the
/// previous pass's output.
#[test]
fn test_passes_chain_across_registrations() -> Result<()> {
    let host = host_with_update();
    let scale = CallSiteAdjust::new(
        MethodRef::new("CameraPlus.Tools", "Clamp")
            .param("float")
            .returns("float"),
        vec![Instruction::ldc_r4(2.0), Instruction::mul()],
    )?;
    let clamp_first = PointSubstitution::new(
        Pattern::StoresField(root_size()),
        vec![
            Instruction::call(
                MethodRef::new("CameraPlus.Tools", "Clamp")
                    .param("float")
                    .returns("float"),
            ),
            Instruction::store_field(root_size()),
        ],
    )?;

    let mut patcher = Patcher::new(PatchConfig::strict());
    patcher.register(PatchRegistration::new("first", update()).pass(clamp_first))?;
    patcher.register(PatchRegistration::new("second", update()).pass(scale))?;
    patcher.install(&host)?;

    let body = host.body(&update()).expect("defined");
    let ops: Vec<OpCode> = body.iter().map(|i| i.opcode).collect();
    assert_eq!(
        ops,
        vec![
            OpCode::Ldarg0,
            OpCode::LdcR4,
            OpCode::Call,
            OpCode::LdcR4,
            OpCode::Mul,
            OpCode::Stfld,
            OpCode::Ret
        ]
    );
    assert_eq!(host.writes(), 1);
    Ok(())
}

/// A body calling an unbound payload is rejected before it reaches the host.
#[test]
fn test_unbound_payload_rejected() -> Result<()> {
    let host = host_with_update();
    let payloads = Arc::new(PayloadTable::new("CameraPlus.Tools"));

    let mut patcher = Patcher::new(PatchConfig::default()).with_payloads(Arc::clone(&payloads));
    patcher.register(patcher.registration(update()).pass(zoom_to_mouse()?))?;
    assert!(matches!(
        patcher.install(&host),
        Err(Error::UnboundPayload(_))
    ));
    assert_eq!(host.writes(), 0);

    payloads.bind(setter(), |_| Ok(Value::Unit));
    let mut patcher = Patcher::new(PatchConfig::default()).with_payloads(payloads);
    patcher.register(patcher.registration(update()).pass(zoom_to_mouse()?))?;
    patcher.install(&host)?;
    assert_eq!(host.writes(), 1);
    Ok(())
}

/// A host body that does not verify is never written back.
#[test]
fn test_unverifiable_body_rejected() -> Result<()> {
    let host = MemoryHost::new();
    // leaves a value on the stack at `ret` of a void method
    host.define(
        update(),
        InstructionSequence::from_instructions(
            vec![
                Instruction::ldarg(0),
                Instruction::ldc_r4(24.0),
                Instruction::store_field(root_size()),
                Instruction::ldc_i4(1),
                Instruction::ret(),
            ],
            false,
        ),
    );

    let mut patcher = Patcher::new(PatchConfig::default());
    patcher.register(patcher.registration(update()).pass(zoom_to_mouse()?))?;
    assert!(matches!(
        patcher.install(&host),
        Err(Error::Malformed { .. })
    ));
    assert_eq!(host.writes(), 0);
    Ok(())
}

/// A hook that retires its own registration finishes the current call and never runs again.
#[test]
fn test_self_retiring_postfix() -> Result<()> {
    let host = host_with_update();
    let runs = Arc::new(AtomicUsize::new(0));

    let mut patcher = Patcher::new(PatchConfig::default());
    let registration = patcher.registration(update());
    let lifecycle = registration.lifecycle();
    let counter = Arc::clone(&runs);
    let registration = registration.postfix(priority::NORMAL, move |_| {
        counter.fetch_add(1, Ordering::Relaxed);
        lifecycle.retire();
    });
    patcher.register(registration)?;
    patcher.install(&host)?;

    for _ in 0..3 {
        let mut ctx = CallContext::new(update());
        patcher.invoke(&update(), &mut ctx, |_| {});
        assert!(ctx.original_ran());
    }

    assert_eq!(runs.load(Ordering::Relaxed), 1);
    assert_eq!(patcher.hook_count(&update()), 0);
    assert!(patcher.owners(&update()).is_empty());
    assert_eq!(patcher.events().count_kind(EventKind::HookRetired), 1);

    let owner = patcher.config().owner.clone();
    assert!(!patcher.unpatch(&update(), &owner));
    Ok(())
}

/// A host rejecting a write midway gets the bodies written before it restored, and a retry
/// applies every pass exactly once.
#[test]
fn test_failed_write_restores_bodies() -> Result<()> {
    let host = FlakyHost::failing_write(2);
    let first = TargetKey::method("CameraDriver", "ApplyPositionToGameObject");
    let second = TargetKey::method("Map", "MapUpdate");
    let void = InstructionSequence::from_instructions(vec![Instruction::ret()], false);
    host.inner.define(first.clone(), void.clone());
    host.inner.define(second.clone(), void.clone());

    let mut patcher = Patcher::new(PatchConfig::default());
    for target in [&first, &second] {
        let pass = AppendBeforeReturn::new(vec![Instruction::nop()])?;
        patcher.register(patcher.registration(target.clone()).pass(pass))?;
    }

    assert!(matches!(patcher.install(&host), Err(Error::LockError)));
    assert_eq!(host.inner.body(&first), Some(void.clone()));
    assert_eq!(host.inner.body(&second), Some(void));
    assert!(!patcher.is_installed());
    assert_eq!(patcher.events().count_kind(EventKind::Warning), 1);

    let report = patcher.install(&host)?;
    assert_eq!(report.installed, vec![first.clone(), second.clone()]);
    for target in [&first, &second] {
        let body = host.inner.body(target).expect("defined");
        assert_eq!(body.count(|i| i.opcode == OpCode::Nop), 1);
    }
    Ok(())
}

/// An optional target missing during a failed installation is picked up by a retry against
/// a host that has it.
#[test]
fn test_absent_optional_target_rebinds_on_retry() -> Result<()> {
    let ship = TargetKey::method("SaveOurShip2.MeshRecalculateHelper", "RecalculateMesh");
    let missing = TargetKey::method("CameraDriver", "Removed");
    let void = InstructionSequence::from_instructions(vec![Instruction::ret()], false);

    let mut patcher = Patcher::new(PatchConfig::default());
    patcher.register(
        patcher
            .registration(ship.clone())
            .postfix(priority::NORMAL, |_| {})
            .optional(),
    )?;
    patcher.register(
        patcher
            .registration(missing.clone())
            .postfix(priority::NORMAL, |_| {}),
    )?;

    let bare = MemoryHost::new();
    assert!(matches!(
        patcher.install(&bare),
        Err(Error::TargetUnresolved(_))
    ));

    let loaded = MemoryHost::new();
    loaded.define(ship.clone(), void.clone());
    loaded.define(missing.clone(), void);
    let report = patcher.install(&loaded)?;
    assert!(report.skipped_absent.is_empty());
    assert_eq!(report.installed, vec![ship.clone(), missing]);
    assert_eq!(patcher.hook_count(&ship), 1);
    Ok(())
}
