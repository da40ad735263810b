//! Instruction representation and constructors.
//!
//! An [`Instruction`] pairs an [`OpCode`] with a typed [`Operand`], the offset it had in the
//! original method body (if it came from there) and the [`Label`]s that designate it as a
//! jump target.
//!
//! # Construction
//!
//! [`Instruction::new`] is the checked constructor: it fails with
//! [`crate::Error::InvalidInstruction`] when the operand does not fit the operation. The typed
//! constructors ([`Instruction::ldarg`], [`Instruction::load_field`], [`Instruction::call`],
//! ...) pick the operation from their arguments and cannot fail, which is what rewrite passes
//! use for the instructions they splice in.
//!
//! ```rust
//! use ilweave::assembly::{FieldRef, Instruction, OpCode};
//!
//! let root_size = FieldRef::instance("CameraDriver", "rootSize");
//!
//! let load = Instruction::load_field(root_size.clone());
//! assert_eq!(load.opcode, OpCode::Ldfld);
//!
//! let store = Instruction::store_field(FieldRef::new_static("Settings", "scale"));
//! assert_eq!(store.opcode, OpCode::Stsfld);
//! ```
//!
//! # Labels
//!
//! Labels travel with the instruction they are attached to. A pass that replaces or removes
//! an instruction must move its labels to the instruction that takes its place, see
//! [`Instruction::take_labels`].

use std::fmt;

use crate::{
    assembly::{
        opcode::{FlowType, OpCode, OperandKind, StackBehavior},
        references::{FieldRef, Label, LocalSlot, MethodRef},
    },
    Error, Result,
};

/// Typed operand of an instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand present
    None,
    /// 32-bit integer constant
    Int32(i32),
    /// 64-bit integer constant
    Int64(i64),
    /// 32-bit floating point constant
    Float32(f32),
    /// 64-bit floating point constant
    Float64(f64),
    /// String literal
    String(String),
    /// Field reference
    Field(FieldRef),
    /// Method reference
    Method(MethodRef),
    /// Local variable slot
    Local(LocalSlot),
    /// Method argument index
    Argument(u16),
    /// Branch target
    Label(Label),
}

impl Operand {
    /// Returns the kind of this operand.
    #[must_use]
    pub fn kind(&self) -> OperandKind {
        match self {
            Operand::None => OperandKind::None,
            Operand::Int32(_) => OperandKind::Int32,
            Operand::Int64(_) => OperandKind::Int64,
            Operand::Float32(_) => OperandKind::Float32,
            Operand::Float64(_) => OperandKind::Float64,
            Operand::String(_) => OperandKind::String,
            Operand::Field(_) => OperandKind::Field,
            Operand::Method(_) => OperandKind::Method,
            Operand::Local(_) => OperandKind::Local,
            Operand::Argument(_) => OperandKind::Argument,
            Operand::Label(_) => OperandKind::Label,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Int32(v) => write!(f, "{v}"),
            Operand::Int64(v) => write!(f, "{v}"),
            Operand::Float32(v) => write!(f, "{v:?}"),
            Operand::Float64(v) => write!(f, "{v:?}"),
            Operand::String(s) => write!(f, "{s:?}"),
            Operand::Field(field) => write!(f, "{field}"),
            Operand::Method(method) => write!(f, "{method}"),
            Operand::Local(slot) => write!(f, "{slot}"),
            Operand::Argument(arg) => write!(f, "A_{arg}"),
            Operand::Label(label) => write!(f, "{label}"),
        }
    }
}

/// A single instruction of a method body.
///
/// `offset` is the byte offset in the original body and is `None` for instructions inserted
/// by a rewrite pass. `labels` lists the jump targets that designate this instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The operation
    pub opcode: OpCode,
    /// The operand, whose kind must match `opcode.operand_kind()`
    pub operand: Operand,
    /// Offset in the original method body
    pub offset: Option<u32>,
    /// Labels designating this instruction as a jump target
    pub labels: Vec<Label>,
}

impl Instruction {
    /// Creates an instruction, checking that the operand fits the operation.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInstruction`] if the operand's kind differs from what
    /// `opcode` expects.
    pub fn new(opcode: OpCode, operand: Operand) -> Result<Self> {
        let instruction = Instruction {
            opcode,
            operand,
            offset: None,
            labels: Vec::new(),
        };
        instruction.validate()?;
        Ok(instruction)
    }

    /// Creates an instruction for an operation without operand.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInstruction`] if `opcode` requires an operand.
    pub fn op(opcode: OpCode) -> Result<Self> {
        Self::new(opcode, Operand::None)
    }

    /// Creates a branch to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInstruction`] if `opcode` is not a branch.
    pub fn branch(opcode: OpCode, target: Label) -> Result<Self> {
        Self::new(opcode, Operand::Label(target))
    }

    /// Checks that the operand fits the operation.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInstruction`] on a mismatch.
    pub fn validate(&self) -> Result<()> {
        let expected = self.opcode.operand_kind();
        let actual = self.operand.kind();
        if expected != actual {
            return Err(Error::InvalidInstruction {
                opcode: self.opcode,
                reason: format!("expected operand {expected}, got {actual}"),
            });
        }

        match (&self.opcode, &self.operand) {
            (OpCode::Ldfld | OpCode::Ldflda | OpCode::Stfld, Operand::Field(field))
                if field.is_static() =>
            {
                Err(Error::InvalidInstruction {
                    opcode: self.opcode,
                    reason: format!("{field} is static"),
                })
            }
            (OpCode::Ldsfld | OpCode::Ldsflda | OpCode::Stsfld, Operand::Field(field))
                if !field.is_static() =>
            {
                Err(Error::InvalidInstruction {
                    opcode: self.opcode,
                    reason: format!("{field} is an instance field"),
                })
            }
            (OpCode::Callvirt, Operand::Method(method)) if !method.has_this() => {
                Err(Error::InvalidInstruction {
                    opcode: self.opcode,
                    reason: format!("{method} has no receiver"),
                })
            }
            _ => Ok(()),
        }
    }

    fn unchecked(opcode: OpCode, operand: Operand) -> Self {
        Instruction {
            opcode,
            operand,
            offset: None,
            labels: Vec::new(),
        }
    }

    /// `nop`
    #[must_use]
    pub fn nop() -> Self {
        Self::unchecked(OpCode::Nop, Operand::None)
    }

    /// Loads argument `index`, using the shorthand form where one exists.
    #[must_use]
    pub fn ldarg(index: u16) -> Self {
        match OpCode::ldarg_shorthand(index) {
            Some(opcode) => Self::unchecked(opcode, Operand::None),
            None => Self::unchecked(OpCode::Ldarg, Operand::Argument(index)),
        }
    }

    /// Loads a local slot.
    #[must_use]
    pub fn ldloc(slot: LocalSlot) -> Self {
        Self::unchecked(OpCode::Ldloc, Operand::Local(slot))
    }

    /// Stores into a local slot.
    #[must_use]
    pub fn stloc(slot: LocalSlot) -> Self {
        Self::unchecked(OpCode::Stloc, Operand::Local(slot))
    }

    /// Loads the address of a local slot.
    #[must_use]
    pub fn ldloca(slot: LocalSlot) -> Self {
        Self::unchecked(OpCode::Ldloca, Operand::Local(slot))
    }

    /// `ldnull`
    #[must_use]
    pub fn ldnull() -> Self {
        Self::unchecked(OpCode::Ldnull, Operand::None)
    }

    /// Loads a 32-bit integer constant.
    #[must_use]
    pub fn ldc_i4(value: i32) -> Self {
        Self::unchecked(OpCode::LdcI4, Operand::Int32(value))
    }

    /// Loads a 64-bit integer constant.
    #[must_use]
    pub fn ldc_i8(value: i64) -> Self {
        Self::unchecked(OpCode::LdcI8, Operand::Int64(value))
    }

    /// Loads a 32-bit floating point constant.
    #[must_use]
    pub fn ldc_r4(value: f32) -> Self {
        Self::unchecked(OpCode::LdcR4, Operand::Float32(value))
    }

    /// Loads a 64-bit floating point constant.
    #[must_use]
    pub fn ldc_r8(value: f64) -> Self {
        Self::unchecked(OpCode::LdcR8, Operand::Float64(value))
    }

    /// Loads a string literal.
    #[must_use]
    pub fn ldstr(value: impl Into<String>) -> Self {
        Self::unchecked(OpCode::Ldstr, Operand::String(value.into()))
    }

    /// `dup`
    #[must_use]
    pub fn dup() -> Self {
        Self::unchecked(OpCode::Dup, Operand::None)
    }

    /// `pop`
    #[must_use]
    pub fn pop() -> Self {
        Self::unchecked(OpCode::Pop, Operand::None)
    }

    /// Calls `method` non-virtually.
    #[must_use]
    pub fn call(method: MethodRef) -> Self {
        Self::unchecked(OpCode::Call, Operand::Method(method))
    }

    /// `ret`
    #[must_use]
    pub fn ret() -> Self {
        Self::unchecked(OpCode::Ret, Operand::None)
    }

    /// `add`
    #[must_use]
    pub fn add() -> Self {
        Self::unchecked(OpCode::Add, Operand::None)
    }

    /// `sub`
    #[must_use]
    pub fn sub() -> Self {
        Self::unchecked(OpCode::Sub, Operand::None)
    }

    /// `mul`
    #[must_use]
    pub fn mul() -> Self {
        Self::unchecked(OpCode::Mul, Operand::None)
    }

    /// `div`
    #[must_use]
    pub fn div() -> Self {
        Self::unchecked(OpCode::Div, Operand::None)
    }

    /// Loads `field`, as `ldfld` or `ldsfld` depending on its storage class.
    #[must_use]
    pub fn load_field(field: FieldRef) -> Self {
        let opcode = if field.is_static() {
            OpCode::Ldsfld
        } else {
            OpCode::Ldfld
        };
        Self::unchecked(opcode, Operand::Field(field))
    }

    /// Loads the address of `field`, as `ldflda` or `ldsflda`.
    #[must_use]
    pub fn load_field_address(field: FieldRef) -> Self {
        let opcode = if field.is_static() {
            OpCode::Ldsflda
        } else {
            OpCode::Ldflda
        };
        Self::unchecked(opcode, Operand::Field(field))
    }

    /// Stores into `field`, as `stfld` or `stsfld`.
    #[must_use]
    pub fn store_field(field: FieldRef) -> Self {
        let opcode = if field.is_static() {
            OpCode::Stsfld
        } else {
            OpCode::Stfld
        };
        Self::unchecked(opcode, Operand::Field(field))
    }

    /// Sets the original body offset.
    #[must_use]
    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Attaches a label designating this instruction.
    #[must_use]
    pub fn with_label(mut self, label: Label) -> Self {
        self.labels.push(label);
        self
    }

    /// Removes and returns the labels of this instruction.
    pub fn take_labels(&mut self) -> Vec<Label> {
        std::mem::take(&mut self.labels)
    }

    /// Returns how this instruction affects control flow.
    #[must_use]
    pub fn flow_type(&self) -> FlowType {
        self.opcode.flow_type()
    }

    /// Stack effect of this instruction.
    ///
    /// Calls derive their effect from the referenced method. `ret` is reported as popping
    /// nothing: what it consumes depends on the enclosing body's return type and is checked by
    /// [`crate::assembly::InstructionSequence::verify`].
    #[must_use]
    pub fn stack_behavior(&self) -> StackBehavior {
        if let Some(fixed) = self.opcode.stack_behavior() {
            return fixed;
        }

        match &self.operand {
            Operand::Method(method) => StackBehavior::new(
                u8::try_from(method.pops()).unwrap_or(u8::MAX),
                u8::try_from(method.pushes()).unwrap_or(u8::MAX),
            ),
            _ => StackBehavior::new(0, 0),
        }
    }

    /// Returns `true` if this instruction can jump to a label.
    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(
            self.flow_type(),
            FlowType::ConditionalBranch | FlowType::UnconditionalBranch
        )
    }

    /// Returns `true` if this is a `ret`.
    #[must_use]
    pub fn is_return(&self) -> bool {
        self.opcode == OpCode::Ret
    }

    /// Returns the branch target, if this is a branch.
    #[must_use]
    pub fn branch_target(&self) -> Option<Label> {
        match &self.operand {
            Operand::Label(label) => Some(*label),
            _ => None,
        }
    }

    /// Returns the field operand, if any.
    #[must_use]
    pub fn field(&self) -> Option<&FieldRef> {
        match &self.operand {
            Operand::Field(field) => Some(field),
            _ => None,
        }
    }

    /// Returns the method operand, if any.
    #[must_use]
    pub fn method(&self) -> Option<&MethodRef> {
        match &self.operand {
            Operand::Method(method) => Some(method),
            _ => None,
        }
    }

    /// Returns the local slot operand, if any.
    #[must_use]
    pub fn local(&self) -> Option<LocalSlot> {
        match &self.operand {
            Operand::Local(slot) => Some(*slot),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for label in &self.labels {
            write!(f, "{label}: ")?;
        }

        if let Some(offset) = self.offset {
            write!(f, "IL_{offset:04X}: ")?;
        }

        write!(f, "{}", self.opcode)?;
        if self.operand != Operand::None {
            write!(f, " {}", self.operand)?;
        }
        Ok(())
    }
}
