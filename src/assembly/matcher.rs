//! Stateless instruction predicates.
//!
//! Every function here inspects one instruction (or, for [`loads_receiver_field`], a fixed
//! window of two) and answers whether it has a particular shape. There is no combinator
//! language: rewrite passes combine predicates with their own control flow, which keeps each
//! pass a small explicit automaton.
//!
//! [`Pattern`] packages the same predicates as a value so that a pass can be configured with
//! its match key and can describe it in diagnostics.
//!
//! ```rust
//! use ilweave::assembly::{matcher, Constant, FieldRef, Instruction};
//!
//! let root_size = FieldRef::instance("CameraDriver", "rootSize");
//! let store = Instruction::store_field(root_size.clone());
//!
//! assert!(matcher::stores_field(&store, &root_size));
//! assert!(!matcher::loads_field(&store, &root_size));
//! assert!(matcher::loads_constant(&Instruction::ldc_i4(0), Constant::Int(0)));
//! ```

use std::fmt;

use crate::assembly::{
    instruction::{Instruction, Operand},
    opcode::{OpCode, StackBehavior},
    references::{FieldRef, MethodRef},
};

/// A numeric constant as loaded by `ldc.*`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constant {
    /// Integer constant, from `ldc.i4` or `ldc.i8`
    Int(i64),
    /// Floating point constant, from `ldc.r4` or `ldc.r8`
    Float(f64),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "{v}"),
            Constant::Float(v) => write!(f, "{v:?}"),
        }
    }
}

/// Returns `true` if `instruction` stores into `field`.
#[must_use]
pub fn stores_field(instruction: &Instruction, field: &FieldRef) -> bool {
    matches!(instruction.opcode, OpCode::Stfld | OpCode::Stsfld)
        && instruction.field() == Some(field)
}

/// Returns `true` if `instruction` loads the value of `field`.
#[must_use]
pub fn loads_field(instruction: &Instruction, field: &FieldRef) -> bool {
    matches!(instruction.opcode, OpCode::Ldfld | OpCode::Ldsfld)
        && instruction.field() == Some(field)
}

/// Returns `true` if `instruction` loads the address of `field`.
#[must_use]
pub fn loads_field_address(instruction: &Instruction, field: &FieldRef) -> bool {
    matches!(instruction.opcode, OpCode::Ldflda | OpCode::Ldsflda)
        && instruction.field() == Some(field)
}

/// Returns `true` if `instruction` calls `method`, virtually or not.
#[must_use]
pub fn calls(instruction: &Instruction, method: &MethodRef) -> bool {
    matches!(instruction.opcode, OpCode::Call | OpCode::Callvirt)
        && instruction.method() == Some(method)
}

/// Returns the constant loaded by `instruction`, if it is a constant load.
#[must_use]
pub fn constant_value(instruction: &Instruction) -> Option<Constant> {
    match (&instruction.opcode, &instruction.operand) {
        (OpCode::LdcI4, Operand::Int32(v)) => Some(Constant::Int(i64::from(*v))),
        (OpCode::LdcI8, Operand::Int64(v)) => Some(Constant::Int(*v)),
        (OpCode::LdcR4, Operand::Float32(v)) => Some(Constant::Float(f64::from(*v))),
        (OpCode::LdcR8, Operand::Float64(v)) => Some(Constant::Float(*v)),
        _ => None,
    }
}

/// Returns `true` if `instruction` loads `constant`.
///
/// Integer constants match regardless of width; floating point constants compare by value.
#[must_use]
pub fn loads_constant(instruction: &Instruction, constant: Constant) -> bool {
    constant_value(instruction) == Some(constant)
}

/// Returns `true` if `instruction` loads the receiver (`ldarg.0`).
#[must_use]
pub fn loads_receiver(instruction: &Instruction) -> bool {
    instruction.opcode == OpCode::Ldarg0
        || (instruction.opcode == OpCode::Ldarg && instruction.operand == Operand::Argument(0))
}

/// Returns `true` if `instruction` is a `ret`.
#[must_use]
pub fn is_return(instruction: &Instruction) -> bool {
    instruction.is_return()
}

/// Returns `true` if `first, second` is exactly "load receiver, load field `field`".
///
/// The pair does not match if `second` is a jump target: a branch landing between the two
/// instructions would observe a different stack.
#[must_use]
pub fn loads_receiver_field(first: &Instruction, second: &Instruction, field: &FieldRef) -> bool {
    loads_receiver(first)
        && second.opcode == OpCode::Ldfld
        && second.field() == Some(field)
        && second.labels.is_empty()
}

/// A single-instruction match key.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    /// Stores into the field
    StoresField(FieldRef),
    /// Loads the value of the field
    LoadsField(FieldRef),
    /// Loads the address of the field
    LoadsFieldAddress(FieldRef),
    /// Calls the method
    Calls(MethodRef),
    /// Loads the constant
    LoadsConstant(Constant),
    /// Any instruction of this operation kind
    OpCode(OpCode),
}

impl Pattern {
    /// Tests `instruction` against this pattern.
    #[must_use]
    pub fn matches(&self, instruction: &Instruction) -> bool {
        match self {
            Pattern::StoresField(field) => stores_field(instruction, field),
            Pattern::LoadsField(field) => loads_field(instruction, field),
            Pattern::LoadsFieldAddress(field) => loads_field_address(instruction, field),
            Pattern::Calls(method) => calls(instruction, method),
            Pattern::LoadsConstant(constant) => loads_constant(instruction, *constant),
            Pattern::OpCode(opcode) => instruction.opcode == *opcode,
        }
    }

    /// Stack effect of any instruction this pattern matches.
    ///
    /// Returns `None` when the effect depends on operands the pattern does not fix, i.e. a
    /// bare `call`, `callvirt` or `ret`.
    #[must_use]
    pub fn stack_behavior(&self) -> Option<StackBehavior> {
        match self {
            Pattern::StoresField(field) => {
                Some(Instruction::store_field(field.clone()).stack_behavior())
            }
            Pattern::LoadsField(field) => {
                Some(Instruction::load_field(field.clone()).stack_behavior())
            }
            Pattern::LoadsFieldAddress(field) => {
                Some(Instruction::load_field_address(field.clone()).stack_behavior())
            }
            Pattern::Calls(method) => Some(Instruction::call(method.clone()).stack_behavior()),
            Pattern::LoadsConstant(_) => Some(StackBehavior::new(0, 1)),
            Pattern::OpCode(opcode) => opcode.stack_behavior(),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::StoresField(field) => write!(f, "store {field}"),
            Pattern::LoadsField(field) => write!(f, "load {field}"),
            Pattern::LoadsFieldAddress(field) => write!(f, "load address of {field}"),
            Pattern::Calls(method) => write!(f, "call {method}"),
            Pattern::LoadsConstant(constant) => write!(f, "load constant {constant}"),
            Pattern::OpCode(opcode) => write!(f, "{opcode}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::Label;

    fn root_size() -> FieldRef {
        FieldRef::instance("CameraDriver", "rootSize")
    }

    #[test]
    fn test_field_predicates() {
        let field = root_size();
        let other = FieldRef::instance("CameraDriver", "desiredSize");

        assert!(stores_field(&Instruction::store_field(field.clone()), &field));
        assert!(!stores_field(&Instruction::store_field(other.clone()), &field));
        assert!(loads_field(&Instruction::load_field(field.clone()), &field));
        assert!(!loads_field(&Instruction::load_field_address(field.clone()), &field));
        assert!(loads_field_address(&Instruction::load_field_address(field.clone()), &field));

        let statik = FieldRef::new_static("Mesh", "size");
        assert!(loads_field_address(&Instruction::load_field_address(statik.clone()), &statik));
        assert!(!loads_field_address(&Instruction::load_field_address(statik), &field));
    }

    #[test]
    fn test_calls_compares_signature() {
        let getter = MethodRef::new("Pawn", "get_Humanlike").returns("bool").instance();
        let other = MethodRef::new("Pawn", "get_Humanlike").returns("int").instance();

        assert!(calls(&Instruction::call(getter.clone()), &getter));
        assert!(!calls(&Instruction::call(other), &getter));
        let virt = Instruction::new(OpCode::Callvirt, Operand::Method(getter.clone())).unwrap();
        assert!(calls(&virt, &getter));
    }

    #[test]
    fn test_constants() {
        assert_eq!(constant_value(&Instruction::ldc_i4(3)), Some(Constant::Int(3)));
        assert!(loads_constant(&Instruction::ldc_i8(0), Constant::Int(0)));
        assert!(loads_constant(&Instruction::ldc_r4(4.0), Constant::Float(4.0)));
        assert!(!loads_constant(&Instruction::ldc_r4(4.0), Constant::Int(4)));
        assert_eq!(constant_value(&Instruction::ldnull()), None);
    }

    #[test]
    fn test_receiver_field_pair() {
        let field = root_size();
        let load = Instruction::load_field(field.clone());

        assert!(loads_receiver_field(&Instruction::ldarg(0), &load, &field));
        assert!(!loads_receiver_field(&Instruction::ldarg(1), &load, &field));
        assert!(!loads_receiver_field(
            &Instruction::ldarg(0),
            &load.clone().with_label(Label(0)),
            &field
        ));
        let long_form = Instruction::new(OpCode::Ldarg, Operand::Argument(0)).unwrap();
        assert!(loads_receiver(&long_form));
    }

    #[test]
    fn test_pattern_matches_and_describes() {
        let pattern = Pattern::StoresField(root_size());
        assert!(pattern.matches(&Instruction::store_field(root_size())));
        assert!(!pattern.matches(&Instruction::load_field(root_size())));
        assert_eq!(pattern.to_string(), "store CameraDriver::rootSize");
        assert_eq!(pattern.stack_behavior().map(|s| s.net_effect), Some(-2));

        assert!(Pattern::OpCode(OpCode::Ret).stack_behavior().is_none());
        assert!(Pattern::LoadsConstant(Constant::Int(0)).matches(&Instruction::ldc_i4(0)));
    }
}
