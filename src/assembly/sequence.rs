//! Ordered method bodies and their verification.
//!
//! [`InstructionSequence`] holds one method body from entry to its return points together
//! with the body-level facts rewrite passes need: declared local slots, the next free label
//! id and whether the method returns a value.
//!
//! # Allocation
//!
//! Passes that cache a value declare a new slot with [`InstructionSequence::declare_local`]
//! and passes that need a fresh jump target call [`InstructionSequence::define_label`]. Both
//! hand out ids that are unused in the sequence, so an inserted slot never aliases an
//! existing one.
//!
//! # Verification
//!
//! [`InstructionSequence::verify`] walks the body once in order, tracking the evaluation
//! stack depth. Every label records the depth expected on arrival, whether that is first seen
//! from a branch or from fall-through; all paths reaching a label must agree. Code following
//! an unconditional transfer is unreachable until the next label, and its depth is taken from
//! the label. A `ret` must leave exactly the return value on the stack.
//!
//! ```rust
//! use ilweave::assembly::{FieldRef, Instruction, InstructionSequence};
//!
//! let root_size = FieldRef::instance("CameraDriver", "rootSize");
//! let body = InstructionSequence::from_instructions(
//!     vec![
//!         Instruction::ldarg(0),
//!         Instruction::load_field(root_size),
//!         Instruction::ret(),
//!     ],
//!     true,
//! );
//!
//! assert_eq!(body.verify()?, 1);
//! # Ok::<(), ilweave::Error>(())
//! ```

use std::{
    collections::{hash_map::Entry, HashMap},
    fmt,
    slice,
};

use crate::{
    assembly::{
        instruction::Instruction,
        opcode::OpCode,
        references::{Label, LocalSlot},
    },
    Error, Result,
};

/// One method body as an ordered sequence of instructions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InstructionSequence {
    instructions: Vec<Instruction>,
    locals: Vec<String>,
    next_label: u32,
    returns_value: bool,
}

impl InstructionSequence {
    /// Creates an empty body.
    ///
    /// # Arguments
    ///
    /// * `returns_value` - Whether the method leaves a value on the stack at `ret`
    #[must_use]
    pub fn new(returns_value: bool) -> Self {
        InstructionSequence {
            instructions: Vec::new(),
            locals: Vec::new(),
            next_label: 0,
            returns_value,
        }
    }

    /// Creates a body from existing instructions.
    ///
    /// Label allocation continues after the highest label id used by `instructions`, either
    /// as an attached label or as a branch target.
    #[must_use]
    pub fn from_instructions(instructions: Vec<Instruction>, returns_value: bool) -> Self {
        let next_label = instructions
            .iter()
            .flat_map(|i| i.labels.iter().copied().chain(i.branch_target()))
            .map(|label| label.id() + 1)
            .max()
            .unwrap_or(0);

        InstructionSequence {
            instructions,
            locals: Vec::new(),
            next_label,
            returns_value,
        }
    }

    /// Sets the local slots the original body declares, by type name.
    #[must_use]
    pub fn with_locals<I, S>(mut self, type_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.locals = type_names.into_iter().map(Into::into).collect();
        self
    }

    /// Creates an empty body that shares this body's locals, label allocation and return
    /// type.
    ///
    /// Rewrite passes build their output into such a sequence so that slots and labels
    /// allocated by earlier passes stay reserved.
    #[must_use]
    pub fn empty_like(&self) -> Self {
        InstructionSequence {
            instructions: Vec::with_capacity(self.instructions.len() + 4),
            locals: self.locals.clone(),
            next_label: self.next_label,
            returns_value: self.returns_value,
        }
    }

    /// Returns the instructions in order.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Returns an iterator over the instructions in order.
    pub fn iter(&self) -> slice::Iter<'_, Instruction> {
        self.instructions.iter()
    }

    /// Returns the number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns `true` if the body has no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Appends an instruction.
    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// Returns the declared local slot types, indexed by slot.
    #[must_use]
    pub fn locals(&self) -> &[String] {
        &self.locals
    }

    /// Returns `true` if the method returns a value.
    #[must_use]
    pub fn returns_value(&self) -> bool {
        self.returns_value
    }

    /// Declares a new local slot of the given type.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the body already declares the maximum number of
    /// locals.
    pub fn declare_local(&mut self, type_name: impl Into<String>) -> Result<LocalSlot> {
        let index = u16::try_from(self.locals.len())
            .map_err(|_| malformed_error!("Too many locals: {}", self.locals.len()))?;
        self.locals.push(type_name.into());
        Ok(LocalSlot(index))
    }

    /// Allocates a label that is not used anywhere in this body yet.
    pub fn define_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Consumes the body and returns its instructions.
    #[must_use]
    pub fn into_instructions(self) -> Vec<Instruction> {
        self.instructions
    }

    /// Counts the instructions satisfying `predicate`.
    pub fn count<F>(&self, predicate: F) -> usize
    where
        F: Fn(&Instruction) -> bool,
    {
        self.instructions.iter().filter(|i| predicate(i)).count()
    }

    /// Verifies operands, labels and stack balance of the body.
    ///
    /// # Returns
    ///
    /// The maximum evaluation stack depth reached.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::InvalidInstruction`] - an operand does not fit its operation
    /// - [`crate::Error::DuplicateLabel`] - a label designates two instructions
    /// - [`crate::Error::UndefinedLabel`] - a branch targets a label nothing carries
    /// - [`crate::Error::Malformed`] - unknown local slot, stack underflow, mismatched depth
    ///   at a label, wrong depth at `ret`, or control falling off the end of the body
    pub fn verify(&self) -> Result<u16> {
        let mut defined: HashMap<Label, usize> = HashMap::new();
        for (index, instruction) in self.instructions.iter().enumerate() {
            instruction.validate()?;

            for label in &instruction.labels {
                if defined.insert(*label, index).is_some() {
                    return Err(Error::DuplicateLabel(*label));
                }
            }

            if let Some(slot) = instruction.local() {
                if usize::from(slot.index()) >= self.locals.len() {
                    return Err(malformed_error!(
                        "Instruction {} uses undeclared local {}",
                        index,
                        slot
                    ));
                }
            }
        }

        for instruction in &self.instructions {
            if let Some(target) = instruction.branch_target() {
                if !defined.contains_key(&target) {
                    return Err(Error::UndefinedLabel(target));
                }
            }
        }

        self.verify_stack()
    }

    fn verify_stack(&self) -> Result<u16> {
        let mut expected: HashMap<Label, i32> = HashMap::new();
        let mut depth: i32 = 0;
        let mut max_depth: i32 = 0;
        let mut unreachable = false;

        for (index, instruction) in self.instructions.iter().enumerate() {
            if !instruction.labels.is_empty() {
                let mut known: Option<i32> = None;
                for label in &instruction.labels {
                    if let Some(&label_depth) = expected.get(label) {
                        match known {
                            Some(k) if k != label_depth => {
                                return Err(malformed_error!(
                                    "Stack depth mismatch at instruction {}: branches arrive with {} and {}",
                                    index,
                                    k,
                                    label_depth
                                ));
                            }
                            _ => known = Some(label_depth),
                        }
                    }
                }

                if unreachable {
                    depth = known.unwrap_or(0);
                } else if let Some(k) = known {
                    if k != depth {
                        return Err(malformed_error!(
                            "Stack depth mismatch at instruction {}: expected {} (from branch), got {} (fall-through)",
                            index,
                            k,
                            depth
                        ));
                    }
                }

                for label in &instruction.labels {
                    expected.entry(*label).or_insert(depth);
                }
                unreachable = false;
            }

            if instruction.opcode == OpCode::Ret {
                let needed = i32::from(self.returns_value);
                if !unreachable && depth != needed {
                    return Err(malformed_error!(
                        "ret at instruction {} with {} stack items, expected {}",
                        index,
                        depth,
                        needed
                    ));
                }
                depth = 0;
                unreachable = true;
                continue;
            }

            let behavior = instruction.stack_behavior();
            depth -= i32::from(behavior.pops);
            if depth < 0 {
                if !unreachable {
                    return Err(malformed_error!(
                        "Stack underflow at instruction {} ({})",
                        index,
                        instruction
                    ));
                }
                depth = 0;
            }
            depth += i32::from(behavior.pushes);
            max_depth = max_depth.max(depth);

            if let Some(target) = instruction.branch_target() {
                if !unreachable {
                    match expected.entry(target) {
                        Entry::Occupied(entry) => {
                            if *entry.get() != depth {
                                return Err(malformed_error!(
                                    "Stack depth mismatch at branch {}: target {} expects {}, branch has {}",
                                    index,
                                    target,
                                    entry.get(),
                                    depth
                                ));
                            }
                        }
                        Entry::Vacant(entry) => {
                            entry.insert(depth);
                        }
                    }
                }
            }

            if instruction.opcode.ends_flow() {
                unreachable = true;
            }
        }

        if !unreachable && !self.instructions.is_empty() {
            return Err(malformed_error!("Control falls through the end of the body"));
        }

        u16::try_from(max_depth).map_err(|_| malformed_error!("Stack depth exceeds u16 range"))
    }
}

impl<'a> IntoIterator for &'a InstructionSequence {
    type Item = &'a Instruction;
    type IntoIter = slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.instructions.iter()
    }
}

impl Extend<Instruction> for InstructionSequence {
    fn extend<T: IntoIterator<Item = Instruction>>(&mut self, iter: T) {
        self.instructions.extend(iter);
    }
}

impl fmt::Display for InstructionSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, local) in self.locals.iter().enumerate() {
            writeln!(f, ".local V_{index} {local}")?;
        }
        for instruction in &self.instructions {
            writeln!(f, "    {instruction}")?;
        }
        Ok(())
    }
}
