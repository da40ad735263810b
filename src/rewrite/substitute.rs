//! Point substitution: replace single matching instructions with a block.

use crate::{
    assembly::{Instruction, InstructionSequence, Pattern},
    rewrite::{check_block, emit_block, RewriteOutcome, RewritePass},
    Result,
};

/// Which matches a [`PointSubstitution`] replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Occurrences {
    /// Every matching instruction
    #[default]
    All,
    /// Only the first matching instruction; later ones are left alone
    First,
}

/// Replaces every instruction matching a pattern with a replacement block.
///
/// The whole body is scanned even if a match was already found, so that the reported count
/// reflects every occurrence. Labels of a replaced instruction move to the first replacement
/// instruction. An empty replacement removes the matched instruction, which is only possible
/// for instructions without labels.
///
/// # Examples
///
/// Route every store to `rootSize` through a guarded setter:
///
/// ```rust
/// use ilweave::assembly::{FieldRef, Instruction, InstructionSequence, MethodRef, Pattern};
/// use ilweave::rewrite::{PointSubstitution, RewritePass};
///
/// let root_size = FieldRef::instance("CameraDriver", "rootSize");
/// let setter = MethodRef::new("Patches", "SetRootSize")
///     .param("CameraDriver")
///     .param("float");
///
/// let pass = PointSubstitution::new(
///     Pattern::StoresField(root_size.clone()),
///     vec![Instruction::call(setter)],
/// )?;
///
/// let body = InstructionSequence::from_instructions(
///     vec![
///         Instruction::ldarg(0),
///         Instruction::ldc_r4(24.0),
///         Instruction::store_field(root_size),
///         Instruction::ret(),
///     ],
///     false,
/// );
///
/// let outcome = pass.apply(&body)?;
/// assert!(outcome.found);
/// assert_eq!(outcome.matches, 1);
/// # Ok::<(), ilweave::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct PointSubstitution {
    name: &'static str,
    pattern: Pattern,
    replacement: Vec<Instruction>,
    occurrences: Occurrences,
}

impl PointSubstitution {
    /// Creates a substitution of every match of `pattern` with `replacement`.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::Malformed`] - the replacement contains a control transfer, or the
    ///   pattern has no fixed stack effect
    /// - [`crate::Error::InvalidInstruction`] - a replacement instruction is invalid
    /// - [`crate::Error::StackImbalance`] - the replacement's net stack effect differs from
    ///   the matched instruction's
    pub fn new(pattern: Pattern, replacement: Vec<Instruction>) -> Result<Self> {
        let name = "point-substitution";
        let Some(behavior) = pattern.stack_behavior() else {
            return Err(malformed_error!(
                "Pass '{}' pattern '{}' has no fixed stack effect",
                name,
                pattern
            ));
        };
        check_block(name, &replacement, i32::from(behavior.net_effect))?;

        Ok(PointSubstitution {
            name,
            pattern,
            replacement,
            occurrences: Occurrences::All,
        })
    }

    /// Sets the name reported in diagnostics.
    #[must_use]
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Restricts the substitution to the first match.
    #[must_use]
    pub fn first_only(mut self) -> Self {
        self.occurrences = Occurrences::First;
        self
    }

    /// Returns which matches are replaced.
    #[must_use]
    pub fn occurrences(&self) -> Occurrences {
        self.occurrences
    }
}

impl RewritePass for PointSubstitution {
    fn name(&self) -> &'static str {
        self.name
    }

    fn pattern(&self) -> String {
        self.pattern.to_string()
    }

    fn apply(&self, body: &InstructionSequence) -> Result<RewriteOutcome> {
        let mut out = body.empty_like();
        let mut matches = 0;

        for instruction in body {
            let eligible = self.occurrences == Occurrences::All || matches == 0;
            if eligible && self.pattern.matches(instruction) {
                matches += 1;
                emit_block(&mut out, self.name, &self.replacement, &instruction.labels)?;
            } else {
                out.push(instruction.clone());
            }
        }

        if matches == 0 {
            return Ok(RewriteOutcome::unchanged(body));
        }
        Ok(RewriteOutcome::rewritten(matches, out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{Constant, FieldRef, MethodRef, OpCode},
        Error,
    };

    fn root_size() -> FieldRef {
        FieldRef::instance("CameraDriver", "rootSize")
    }

    fn setter() -> MethodRef {
        MethodRef::new("Patches", "SetRootSize")
            .param("CameraDriver")
            .param("float")
    }

    fn store_pass() -> PointSubstitution {
        PointSubstitution::new(
            Pattern::StoresField(root_size()),
            vec![Instruction::call(setter())],
        )
        .unwrap()
    }

    #[test]
    fn test_single_occurrence_replaced() {
        let body = InstructionSequence::from_instructions(
            vec![
                Instruction::ldarg(0),
                Instruction::ldc_r4(24.0),
                Instruction::store_field(root_size()),
                Instruction::ret(),
            ],
            false,
        );

        let outcome = store_pass().apply(&body).unwrap();
        assert!(outcome.found);
        assert_eq!(outcome.matches, 1);
        assert_eq!(outcome.sequence.count(|i| i.opcode == OpCode::Call), 1);
        assert_eq!(outcome.sequence.count(|i| i.opcode == OpCode::Stfld), 0);
        outcome.sequence.verify().unwrap();
    }

    #[test]
    fn test_zero_occurrences_is_unchanged() {
        let body = InstructionSequence::from_instructions(
            vec![
                Instruction::ldarg(0),
                Instruction::load_field(root_size()),
                Instruction::pop(),
                Instruction::ret(),
            ],
            false,
        );

        let outcome = store_pass().apply(&body).unwrap();
        assert!(!outcome.found);
        assert_eq!(outcome.sequence, body);
    }

    #[test]
    fn test_labels_move_to_replacement() {
        let mut body = InstructionSequence::new(false);
        let target = body.define_label();
        body.push(Instruction::ldarg(0));
        body.push(Instruction::ldc_r4(1.0));
        body.push(Instruction::store_field(root_size()).with_label(target));
        body.push(Instruction::ret());

        let outcome = store_pass().apply(&body).unwrap();
        assert_eq!(outcome.sequence.instructions()[2].labels, vec![target]);
    }

    #[test]
    fn test_first_only() {
        let font_getter = MethodRef::new("Patches", "GetAdaptedGameFont")
            .param("float")
            .returns("GameFont");
        let pass = PointSubstitution::new(
            Pattern::LoadsConstant(Constant::Int(0)),
            vec![Instruction::ldc_r4(12.0), Instruction::call(font_getter)],
        )
        .unwrap()
        .first_only();

        let body = InstructionSequence::from_instructions(
            vec![
                Instruction::ldc_i4(0),
                Instruction::pop(),
                Instruction::ldc_i4(0),
                Instruction::pop(),
                Instruction::ret(),
            ],
            false,
        );

        let outcome = pass.apply(&body).unwrap();
        assert_eq!(outcome.matches, 1);
        assert_eq!(outcome.sequence.count(|i| i.opcode == OpCode::LdcI4), 1);
        assert_eq!(outcome.sequence.instructions()[0].opcode, OpCode::LdcR4);
        outcome.sequence.verify().unwrap();
    }

    #[test]
    fn test_unbalanced_replacement_rejected() {
        let err = PointSubstitution::new(
            Pattern::StoresField(root_size()),
            vec![Instruction::pop()],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::StackImbalance {
                expected: -2,
                actual: -1,
                ..
            }
        ));

        assert!(PointSubstitution::new(Pattern::StoresField(root_size()), vec![]).is_err());
        assert!(
            PointSubstitution::new(Pattern::OpCode(OpCode::Ret), vec![Instruction::nop()])
                .is_err()
        );
    }

    #[test]
    fn test_empty_replacement_removes() {
        let pass = PointSubstitution::new(Pattern::OpCode(OpCode::Nop), vec![]).unwrap();
        let body = InstructionSequence::from_instructions(
            vec![Instruction::nop(), Instruction::ldc_i4(1), Instruction::nop(), Instruction::ret()],
            true,
        );

        let outcome = pass.apply(&body).unwrap();
        assert_eq!(outcome.matches, 2);
        assert_eq!(outcome.sequence.len(), 2);
        outcome.sequence.verify().unwrap();
    }

    #[test]
    fn test_removing_jump_target_fails_closed() {
        let pass = PointSubstitution::new(Pattern::OpCode(OpCode::Nop), vec![])
            .unwrap()
            .named("strip-nops");
        let mut body = InstructionSequence::new(false);
        let target = body.define_label();
        body.push(Instruction::branch(OpCode::Br, target).unwrap());
        body.push(Instruction::nop().with_label(target));
        body.push(Instruction::ret());

        match pass.apply(&body) {
            Err(Error::DanglingLabel { pass, label }) => {
                assert_eq!(pass, "strip-nops");
                assert_eq!(label, target);
            }
            other => panic!("expected DanglingLabel, got {other:?}"),
        }
    }

    #[test]
    fn test_named() {
        let pass = store_pass().named("root-size-setter");
        assert_eq!(pass.name(), "root-size-setter");
        assert_eq!(pass.pattern(), "store CameraDriver::rootSize");
    }
}
