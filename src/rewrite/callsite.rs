//! Call-site adjustment: post-process the value a call leaves on the stack.

use crate::{
    assembly::{matcher, Instruction, InstructionSequence, MethodRef},
    rewrite::{check_block, emit_block, RewriteOutcome, RewritePass},
    Result,
};

/// Emits an extra block immediately after every call to a given method.
///
/// The call itself is kept unchanged. The block operates on the call's result and must have a
/// net stack effect of zero, e.g. `pop; ldc.i4.1` to force a boolean getter to `true`, or
/// `ldc.r4 k; mul` to scale a float result.
#[derive(Debug, Clone)]
pub struct CallSiteAdjust {
    name: &'static str,
    method: MethodRef,
    block: Vec<Instruction>,
}

impl CallSiteAdjust {
    /// Creates the pass.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::Malformed`] - the block is empty, contains a control transfer, or
    ///   the method returns nothing for the block to adjust
    /// - [`crate::Error::StackImbalance`] - the block's net stack effect is not zero
    pub fn new(method: MethodRef, block: Vec<Instruction>) -> Result<Self> {
        let name = "call-site-adjust";
        if block.is_empty() {
            return Err(malformed_error!("Pass '{}' has an empty block", name));
        }
        if method.return_type().is_none() {
            return Err(malformed_error!(
                "Pass '{}' targets {}, which leaves no value to adjust",
                name,
                method
            ));
        }
        check_block(name, &block, 0)?;

        Ok(CallSiteAdjust {
            name,
            method,
            block,
        })
    }

    /// Sets the name reported in diagnostics.
    #[must_use]
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

impl RewritePass for CallSiteAdjust {
    fn name(&self) -> &'static str {
        self.name
    }

    fn pattern(&self) -> String {
        format!("call {}", self.method)
    }

    fn apply(&self, body: &InstructionSequence) -> Result<RewriteOutcome> {
        let mut out = body.empty_like();
        let mut matches = 0;

        for instruction in body {
            out.push(instruction.clone());
            if matcher::calls(instruction, &self.method) {
                matches += 1;
                emit_block(&mut out, self.name, &self.block, &[])?;
            }
        }

        if matches == 0 {
            return Ok(RewriteOutcome::unchanged(body));
        }
        Ok(RewriteOutcome::rewritten(matches, out))
    }
}
