//! Single-pass instruction-stream rewriting.
//!
//! A rewrite pass walks an [`InstructionSequence`] once from entry to end, emits zero or more
//! instructions per input instruction and reports how often its pattern matched. Each pass is
//! a small explicit automaton with at most a few states of lookahead or lookback state; none
//! of them build a control-flow graph.
//!
//! # Pass Shapes
//!
//! | Pass | Matches | Emits |
//! |------|---------|-------|
//! | [`PointSubstitution`] | one instruction matching a [`crate::assembly::Pattern`] | a replacement block |
//! | [`AppendBeforeReturn`] | every `ret` | a fixed block, then the `ret` |
//! | [`CallSiteAdjust`] | a call to a given method | the call, then a stack adjustment |
//! | [`FieldLoadHoist`] | `ldarg.0; ldfld F` | `ldloc` of a local cached at entry |
//! | [`WindowMultiply`] | `ldflda F`, `sub`, any | a multiply block before the next instruction |
//!
//! # Failure Semantics
//!
//! A pass whose pattern never matched returns its input unchanged with
//! [`RewriteOutcome::found`] set to `false`. What happens next is decided by the caller (see
//! [`crate::MissingPatternPolicy`]); the pass itself never fails because a shape is missing.
//!
//! Passes validate their own definition when they are constructed. A replacement block whose
//! net stack effect differs from what it replaces is rejected with
//! [`crate::Error::StackImbalance`], so an unbalanced pass never reaches installation.
//!
//! # Labels
//!
//! Jump targets are never lost: whenever a pass replaces an instruction that carries labels,
//! the labels move to the first instruction emitted in its place. A pass that would remove a
//! labelled instruction without emitting anything fails with [`crate::Error::DanglingLabel`].

mod append;
mod callsite;
mod hoist;
mod substitute;
pub mod window;

pub use append::AppendBeforeReturn;
pub use callsite::CallSiteAdjust;
pub use hoist::FieldLoadHoist;
pub use substitute::{Occurrences, PointSubstitution};
pub use window::WindowMultiply;

use crate::{
    assembly::{Instruction, InstructionSequence},
    Result,
};

/// A single-pass transformer over one method body.
///
/// All passes must be thread-safe (Send + Sync) so that registrations holding them can be
/// shared with the dispatcher.
pub trait RewritePass: Send + Sync {
    /// Name for logging and diagnostics.
    fn name(&self) -> &'static str;

    /// Human readable description of the shape this pass looks for.
    fn pattern(&self) -> String;

    /// Runs the pass over `body`.
    ///
    /// # Errors
    ///
    /// Returns an error if the output cannot be built, e.g. because a local slot could not
    /// be declared. A missing pattern is not an error.
    fn apply(&self, body: &InstructionSequence) -> Result<RewriteOutcome>;
}

/// Result of running one pass.
#[derive(Debug, Clone)]
pub struct RewriteOutcome {
    /// Whether the pattern matched at least once
    pub found: bool,
    /// Number of matches
    pub matches: usize,
    /// The transformed body, or the input body if nothing matched
    pub sequence: InstructionSequence,
}

impl RewriteOutcome {
    /// Outcome of a pass that did not match; carries `body` through unchanged.
    #[must_use]
    pub fn unchanged(body: &InstructionSequence) -> Self {
        RewriteOutcome {
            found: false,
            matches: 0,
            sequence: body.clone(),
        }
    }

    /// Outcome of a pass that produced `sequence` after `matches` matches.
    ///
    /// With zero matches `sequence` is still returned, and `found` is `false`.
    #[must_use]
    pub fn rewritten(matches: usize, sequence: InstructionSequence) -> Self {
        RewriteOutcome {
            found: matches > 0,
            matches,
            sequence,
        }
    }
}

/// Per-pass summary produced by [`apply_passes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSummary {
    /// Name of the pass
    pub pass: &'static str,
    /// Description of the pattern
    pub pattern: String,
    /// Number of matches
    pub matches: usize,
}

/// Runs `passes` in order, feeding the output of each into the next.
///
/// # Errors
///
/// Returns the first error raised by a pass.
pub fn apply_passes<'a, I>(
    passes: I,
    body: InstructionSequence,
) -> Result<(InstructionSequence, Vec<PassSummary>)>
where
    I: IntoIterator<Item = &'a dyn RewritePass>,
{
    let mut current = body;
    let mut summaries = Vec::new();

    for pass in passes {
        let outcome = pass.apply(&current)?;
        summaries.push(PassSummary {
            pass: pass.name(),
            pattern: pass.pattern(),
            matches: outcome.matches,
        });
        current = outcome.sequence;
    }

    Ok((current, summaries))
}

/// Net stack effect of executing `block` in order.
#[must_use]
pub fn net_stack_effect(block: &[Instruction]) -> i32 {
    block
        .iter()
        .map(|i| i32::from(i.stack_behavior().net_effect))
        .sum()
}

/// Checks a pass's inserted block: every instruction must be valid and the net stack effect
/// must equal `expected`.
pub(crate) fn check_block(pass: &'static str, block: &[Instruction], expected: i32) -> Result<()> {
    for instruction in block {
        instruction.validate()?;
        if instruction.is_branch() || instruction.opcode.ends_flow() {
            return Err(malformed_error!(
                "Pass '{}' inserts control transfer {}",
                pass,
                instruction
            ));
        }
    }

    let actual = net_stack_effect(block);
    if actual != expected {
        return Err(crate::Error::StackImbalance {
            pass,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Clones `block` for emission, attaching `labels` to its first instruction.
///
/// An empty block cannot carry labels; emitting one in place of a jump target fails with
/// [`crate::Error::DanglingLabel`].
pub(crate) fn emit_block(
    out: &mut InstructionSequence,
    pass: &'static str,
    block: &[Instruction],
    labels: &[crate::assembly::Label],
) -> Result<()> {
    if block.is_empty() {
        if let Some(&label) = labels.first() {
            return Err(crate::Error::DanglingLabel { pass, label });
        }
        return Ok(());
    }

    for (index, instruction) in block.iter().enumerate() {
        let mut emitted = instruction.clone();
        emitted.offset = None;
        if index == 0 {
            emitted.labels.extend_from_slice(labels);
        }
        out.push(emitted);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{FieldRef, MethodRef, Pattern},
        Error,
    };

    #[test]
    fn test_net_stack_effect() {
        let block = [
            Instruction::ldarg(0),
            Instruction::ldarg(0),
            Instruction::call(
                MethodRef::new("CameraDriver", "get_MyCamera")
                    .returns("Camera")
                    .instance(),
            ),
            Instruction::call(
                MethodRef::new("Patches", "ApplyZoom")
                    .param("CameraDriver")
                    .param("Camera"),
            ),
        ];
        assert_eq!(net_stack_effect(&block), 0);
        assert_eq!(net_stack_effect(&[Instruction::ldc_r4(4.0)]), 1);
    }

    #[test]
    fn test_check_block_rejects_control_transfer() {
        let err = check_block("test", &[Instruction::ret()], 0).unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));

        let err = check_block("test", &[Instruction::pop()], 0).unwrap_err();
        assert!(matches!(
            err,
            Error::StackImbalance {
                expected: 0,
                actual: -1,
                ..
            }
        ));
    }

    #[test]
    fn test_apply_passes_chains_outputs() {
        let field = FieldRef::instance("CameraDriver", "rootSize");
        let setter = MethodRef::new("Patches", "SetRootSize")
            .param("CameraDriver")
            .param("float");

        let substitute = PointSubstitution::new(
            Pattern::StoresField(field.clone()),
            vec![Instruction::call(setter.clone())],
        )
        .unwrap();
        let append = AppendBeforeReturn::new(vec![Instruction::nop()]).unwrap();

        let body = InstructionSequence::from_instructions(
            vec![
                Instruction::ldarg(0),
                Instruction::ldc_r4(1.0),
                Instruction::store_field(field),
                Instruction::ret(),
            ],
            false,
        );

        let passes: [&dyn RewritePass; 2] = [&substitute, &append];
        let (out, summaries) = apply_passes(passes, body).unwrap();

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].matches, 1);
        assert_eq!(summaries[1].matches, 1);
        assert_eq!(out.len(), 5);
        assert_eq!(out.instructions()[3], Instruction::nop());
        out.verify().unwrap();
    }
}
