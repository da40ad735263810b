//! Append-before-return: run a fixed block at every exit of a method.

use crate::{
    assembly::{Instruction, InstructionSequence},
    rewrite::{check_block, emit_block, RewriteOutcome, RewritePass},
    Result,
};

/// Inserts a fixed block immediately before every `ret`.
///
/// Methods with several return points get one copy of the block per return. The block must
/// leave the stack as it found it, so the return value of a value-returning method passes
/// through untouched. Branches that targeted a `ret` now target the first instruction of the
/// block inserted in front of it.
#[derive(Debug, Clone)]
pub struct AppendBeforeReturn {
    name: &'static str,
    block: Vec<Instruction>,
}

impl AppendBeforeReturn {
    /// Creates the pass.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::Malformed`] - the block is empty or contains a control transfer
    /// - [`crate::Error::StackImbalance`] - the block's net stack effect is not zero
    pub fn new(block: Vec<Instruction>) -> Result<Self> {
        let name = "append-before-return";
        if block.is_empty() {
            return Err(malformed_error!("Pass '{}' has an empty block", name));
        }
        check_block(name, &block, 0)?;
        Ok(AppendBeforeReturn { name, block })
    }

    /// Sets the name reported in diagnostics.
    #[must_use]
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

impl RewritePass for AppendBeforeReturn {
    fn name(&self) -> &'static str {
        self.name
    }

    fn pattern(&self) -> String {
        "ret".to_string()
    }

    fn apply(&self, body: &InstructionSequence) -> Result<RewriteOutcome> {
        let mut out = body.empty_like();
        let mut matches = 0;

        for instruction in body {
            if instruction.is_return() {
                matches += 1;
                let mut ret = instruction.clone();
                let labels = ret.take_labels();
                emit_block(&mut out, self.name, &self.block, &labels)?;
                out.push(ret);
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
        assembly::{MethodRef, OpCode},
        Error,
    };

    fn apply_zoom_block() -> Vec<Instruction> {
        vec![
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
        ]
    }

    #[test]
    fn test_every_return_gets_a_block() {
        let mut body = InstructionSequence::new(false);
        let early = body.define_label();
        body.push(Instruction::ldarg(1));
        body.push(Instruction::branch(OpCode::Brtrue, early).unwrap());
        body.push(Instruction::ret());
        body.push(Instruction::nop().with_label(early));
        body.push(Instruction::ret());

        let pass = AppendBeforeReturn::new(apply_zoom_block()).unwrap();
        let outcome = pass.apply(&body).unwrap();

        assert_eq!(outcome.matches, 2);
        let out = outcome.sequence.instructions();
        for (index, instruction) in out.iter().enumerate() {
            if instruction.is_return() {
                assert!(index >= 4);
                assert_eq!(&out[index - 4..index], apply_zoom_block().as_slice());
            }
        }
        outcome.sequence.verify().unwrap();
    }

    #[test]
    fn test_labels_on_return_move_to_block() {
        let mut body = InstructionSequence::new(true);
        let exit = body.define_label();
        body.push(Instruction::ldc_i4(1));
        body.push(Instruction::branch(OpCode::Br, exit).unwrap());
        body.push(Instruction::ldc_i4(2));
        body.push(Instruction::ret().with_label(exit));

        let pass = AppendBeforeReturn::new(vec![Instruction::nop()]).unwrap();
        let outcome = pass.apply(&body).unwrap();
        let out = outcome.sequence.instructions();

        assert_eq!(out[3].opcode, OpCode::Nop);
        assert_eq!(out[3].labels, vec![exit]);
        assert!(out[4].labels.is_empty());
        outcome.sequence.verify().unwrap();
    }

    #[test]
    fn test_rejects_unbalanced_block() {
        let err = AppendBeforeReturn::new(vec![Instruction::ldarg(0)]).unwrap_err();
        assert!(matches!(err, Error::StackImbalance { actual: 1, .. }));
    }

    #[test]
    fn test_no_return_not_found() {
        let body = InstructionSequence::from_instructions(vec![Instruction::nop()], false);
        let pass = AppendBeforeReturn::new(vec![Instruction::nop()]).unwrap();
        assert!(!pass.apply(&body).unwrap().found);
    }
}
