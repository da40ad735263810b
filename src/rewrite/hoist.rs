//! Field-load hoist: cache a transformed field value in a local at entry.

use crate::{
    assembly::{matcher, FieldRef, Instruction, InstructionSequence, MethodRef},
    rewrite::{check_block, RewriteOutcome, RewritePass},
    Result,
};

/// Replaces every `ldarg.0; ldfld F` pair with a load of a local computed once at entry.
///
/// The emitted body starts with the preamble
///
/// ```text
/// ldarg.0
/// ldfld     F
/// call      transform(F)
/// stloc     V_n
/// ```
///
/// where `V_n` is a newly declared local. Each exact receiver/field pair in the original body
/// becomes `ldloc V_n`, keeping the labels of the receiver load.
///
/// Matching uses one instruction of lookback. A receiver load is held back until the next
/// instruction is seen; if that is not a load of `F` the held instruction is emitted as is.
/// An isolated `ldfld F` not preceded by a receiver load is left alone, and so is a pair whose
/// field load is itself a jump target.
#[derive(Debug, Clone)]
pub struct FieldLoadHoist {
    name: &'static str,
    field: FieldRef,
    transform: MethodRef,
    local_type: String,
}

impl FieldLoadHoist {
    /// Creates the pass.
    ///
    /// `transform` receives the field value and returns the value to cache; the cached local
    /// is declared with the transform's return type.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::Malformed`] - `field` is static, or `transform` does not take exactly
    ///   one argument and return a value
    /// - [`crate::Error::StackImbalance`] - the preamble would not be balanced
    pub fn new(field: FieldRef, transform: MethodRef) -> Result<Self> {
        let name = "field-load-hoist";
        if field.is_static() {
            return Err(malformed_error!(
                "Pass '{}' needs an instance field, {} is static",
                name,
                field
            ));
        }
        let Some(local_type) = transform.return_type().map(str::to_string) else {
            return Err(malformed_error!(
                "Pass '{}' transform {} returns nothing",
                name,
                transform
            ));
        };
        if transform.pops() != 1 {
            return Err(malformed_error!(
                "Pass '{}' transform {} must take exactly one argument",
                name,
                transform
            ));
        }

        let pass = FieldLoadHoist {
            name,
            field,
            transform,
            local_type,
        };
        let mut scratch = InstructionSequence::new(false);
        let slot = scratch.declare_local(pass.local_type.clone())?;
        check_block(name, &pass.preamble(slot), 0)?;
        Ok(pass)
    }

    /// Sets the name reported in diagnostics.
    #[must_use]
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    fn preamble(&self, slot: crate::assembly::LocalSlot) -> [Instruction; 4] {
        [
            Instruction::ldarg(0),
            Instruction::load_field(self.field.clone()),
            Instruction::call(self.transform.clone()),
            Instruction::stloc(slot),
        ]
    }
}

impl RewritePass for FieldLoadHoist {
    fn name(&self) -> &'static str {
        self.name
    }

    fn pattern(&self) -> String {
        format!("ldarg.0; ldfld {}", self.field)
    }

    fn apply(&self, body: &InstructionSequence) -> Result<RewriteOutcome> {
        let mut out = body.empty_like();
        let slot = out.declare_local(self.local_type.clone())?;
        for instruction in self.preamble(slot) {
            out.push(instruction);
        }

        let mut matches = 0;
        let mut pending: Option<&Instruction> = None;

        for instruction in body {
            if let Some(receiver) = pending.take() {
                if matcher::loads_receiver_field(receiver, instruction, &self.field) {
                    let mut cached = Instruction::ldloc(slot);
                    cached.labels = receiver.labels.clone();
                    out.push(cached);
                    matches += 1;
                    continue;
                }
                out.push(receiver.clone());
            }

            if matcher::loads_receiver(instruction) {
                pending = Some(instruction);
            } else {
                out.push(instruction.clone());
            }
        }

        if let Some(receiver) = pending {
            out.push(receiver.clone());
        }

        if matches == 0 {
            return Ok(RewriteOutcome::unchanged(body));
        }
        Ok(RewriteOutcome::rewritten(matches, out))
    }
}
