//! Operation kinds, operand kinds and per-operation metadata.
//!
//! This module defines the closed alphabet of operations that rewrite passes read and emit.
//! It covers the subset of CIL needed to express the cataloged transformations: argument and
//! local access, constants, field access, calls, arithmetic, comparisons and branches.
//!
//! Every [`OpCode`] knows which [`OperandKind`] it requires, how it affects control flow
//! ([`FlowType`]) and, unless the effect depends on its operand, its fixed
//! [`StackBehavior`]. The mnemonics follow ECMA-335 spelling and are available through
//! [`std::fmt::Display`] and [`OpCode::mnemonic`].
//!
//! # Examples
//!
//! ```rust
//! use ilweave::assembly::{FlowType, OpCode, OperandKind};
//!
//! assert_eq!(OpCode::Stfld.to_string(), "stfld");
//! assert_eq!(OpCode::Stfld.operand_kind(), OperandKind::Field);
//! assert_eq!(OpCode::Ret.flow_type(), FlowType::Return);
//! assert_eq!(OpCode::Mul.stack_behavior().map(|s| s.net_effect), Some(-1));
//! ```

use strum::{Display, EnumIter, IntoStaticStr};

/// Kind of operand an operation takes.
///
/// Used by [`crate::assembly::Instruction::new`] to reject instructions whose operand does not
/// fit their operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum OperandKind {
    /// No operand present
    None,
    /// Signed 32-bit integer constant
    Int32,
    /// Signed 64-bit integer constant
    Int64,
    /// 32-bit floating point constant
    Float32,
    /// 64-bit floating point constant
    Float64,
    /// String literal
    String,
    /// Field reference
    Field,
    /// Method reference
    Method,
    /// Local variable slot
    Local,
    /// Method argument index
    Argument,
    /// Branch target label
    Label,
}

/// How an instruction affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Normal execution continues to next instruction
    Sequential,
    /// Conditional branch to another location
    ConditionalBranch,
    /// Always branches to another location (unconditional jump)
    UnconditionalBranch,
    /// Call to another method
    Call,
    /// Returns from current method
    Return,
    /// Exception throwing
    Throw,
}

/// Stack effect of an instruction.
///
/// Describes how an instruction modifies the evaluation stack. Calls and returns have no
/// fixed behaviour; see [`crate::assembly::Instruction::stack_behavior`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackBehavior {
    /// Number of items popped from stack
    pub pops: u8,
    /// Number of items pushed to stack
    pub pushes: u8,
    /// Net effect on stack depth (pushes - pops)
    pub net_effect: i8,
}

impl StackBehavior {
    /// Creates a stack behaviour from pop and push counts.
    #[must_use]
    pub const fn new(pops: u8, pushes: u8) -> Self {
        #[allow(clippy::cast_possible_wrap)]
        let net_effect = pushes as i8 - pops as i8;
        StackBehavior {
            pops,
            pushes,
            net_effect,
        }
    }
}

/// An operation kind.
///
/// Shorthand forms exist only where the rewriting layer needs to distinguish them; the
/// receiver load `ldarg.0` in particular is matched by the field-load hoist pass.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
pub enum OpCode {
    #[strum(serialize = "nop")]
    Nop,
    #[strum(serialize = "ldarg.0")]
    Ldarg0,
    #[strum(serialize = "ldarg.1")]
    Ldarg1,
    #[strum(serialize = "ldarg.2")]
    Ldarg2,
    #[strum(serialize = "ldarg.3")]
    Ldarg3,
    #[strum(serialize = "ldarg")]
    Ldarg,
    #[strum(serialize = "ldloc")]
    Ldloc,
    #[strum(serialize = "stloc")]
    Stloc,
    #[strum(serialize = "ldloca")]
    Ldloca,
    #[strum(serialize = "ldnull")]
    Ldnull,
    #[strum(serialize = "ldc.i4")]
    LdcI4,
    #[strum(serialize = "ldc.i8")]
    LdcI8,
    #[strum(serialize = "ldc.r4")]
    LdcR4,
    #[strum(serialize = "ldc.r8")]
    LdcR8,
    #[strum(serialize = "ldstr")]
    Ldstr,
    #[strum(serialize = "dup")]
    Dup,
    #[strum(serialize = "pop")]
    Pop,
    #[strum(serialize = "call")]
    Call,
    #[strum(serialize = "callvirt")]
    Callvirt,
    #[strum(serialize = "ret")]
    Ret,
    #[strum(serialize = "br")]
    Br,
    #[strum(serialize = "brfalse")]
    Brfalse,
    #[strum(serialize = "brtrue")]
    Brtrue,
    #[strum(serialize = "beq")]
    Beq,
    #[strum(serialize = "bne.un")]
    BneUn,
    #[strum(serialize = "blt")]
    Blt,
    #[strum(serialize = "bgt")]
    Bgt,
    #[strum(serialize = "ble")]
    Ble,
    #[strum(serialize = "bge")]
    Bge,
    #[strum(serialize = "add")]
    Add,
    #[strum(serialize = "sub")]
    Sub,
    #[strum(serialize = "mul")]
    Mul,
    #[strum(serialize = "div")]
    Div,
    #[strum(serialize = "neg")]
    Neg,
    #[strum(serialize = "ceq")]
    Ceq,
    #[strum(serialize = "cgt")]
    Cgt,
    #[strum(serialize = "clt")]
    Clt,
    #[strum(serialize = "ldfld")]
    Ldfld,
    #[strum(serialize = "ldflda")]
    Ldflda,
    #[strum(serialize = "stfld")]
    Stfld,
    #[strum(serialize = "ldsfld")]
    Ldsfld,
    #[strum(serialize = "ldsflda")]
    Ldsflda,
    #[strum(serialize = "stsfld")]
    Stsfld,
    #[strum(serialize = "throw")]
    Throw,
}

impl OpCode {
    /// Returns the ECMA-335 mnemonic of this operation.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        self.into()
    }

    /// Returns the kind of operand this operation requires.
    #[must_use]
    pub const fn operand_kind(&self) -> OperandKind {
        match self {
            OpCode::Ldarg => OperandKind::Argument,
            OpCode::Ldloc | OpCode::Stloc | OpCode::Ldloca => OperandKind::Local,
            OpCode::LdcI4 => OperandKind::Int32,
            OpCode::LdcI8 => OperandKind::Int64,
            OpCode::LdcR4 => OperandKind::Float32,
            OpCode::LdcR8 => OperandKind::Float64,
            OpCode::Ldstr => OperandKind::String,
            OpCode::Call | OpCode::Callvirt => OperandKind::Method,
            OpCode::Br
            | OpCode::Brfalse
            | OpCode::Brtrue
            | OpCode::Beq
            | OpCode::BneUn
            | OpCode::Blt
            | OpCode::Bgt
            | OpCode::Ble
            | OpCode::Bge => OperandKind::Label,
            OpCode::Ldfld
            | OpCode::Ldflda
            | OpCode::Stfld
            | OpCode::Ldsfld
            | OpCode::Ldsflda
            | OpCode::Stsfld => OperandKind::Field,
            _ => OperandKind::None,
        }
    }

    /// Returns how this operation affects control flow.
    #[must_use]
    pub const fn flow_type(&self) -> FlowType {
        match self {
            OpCode::Br => FlowType::UnconditionalBranch,
            OpCode::Brfalse
            | OpCode::Brtrue
            | OpCode::Beq
            | OpCode::BneUn
            | OpCode::Blt
            | OpCode::Bgt
            | OpCode::Ble
            | OpCode::Bge => FlowType::ConditionalBranch,
            OpCode::Call | OpCode::Callvirt => FlowType::Call,
            OpCode::Ret => FlowType::Return,
            OpCode::Throw => FlowType::Throw,
            _ => FlowType::Sequential,
        }
    }

    /// Returns the fixed stack behaviour of this operation.
    ///
    /// Returns `None` for `call`, `callvirt` and `ret`, whose effect depends on the called
    /// method's signature or on the enclosing method's return type.
    #[must_use]
    pub const fn stack_behavior(&self) -> Option<StackBehavior> {
        let (pops, pushes) = match self {
            OpCode::Call | OpCode::Callvirt | OpCode::Ret => return None,
            OpCode::Nop | OpCode::Br => (0, 0),
            OpCode::Ldarg0
            | OpCode::Ldarg1
            | OpCode::Ldarg2
            | OpCode::Ldarg3
            | OpCode::Ldarg
            | OpCode::Ldloc
            | OpCode::Ldloca
            | OpCode::Ldnull
            | OpCode::LdcI4
            | OpCode::LdcI8
            | OpCode::LdcR4
            | OpCode::LdcR8
            | OpCode::Ldstr
            | OpCode::Ldsfld
            | OpCode::Ldsflda => (0, 1),
            OpCode::Stloc | OpCode::Pop | OpCode::Stsfld | OpCode::Throw => (1, 0),
            OpCode::Brfalse | OpCode::Brtrue => (1, 0),
            OpCode::Beq
            | OpCode::BneUn
            | OpCode::Blt
            | OpCode::Bgt
            | OpCode::Ble
            | OpCode::Bge => (2, 0),
            OpCode::Dup => (1, 2),
            OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Ceq
            | OpCode::Cgt
            | OpCode::Clt => (2, 1),
            OpCode::Neg | OpCode::Ldfld | OpCode::Ldflda => (1, 1),
            OpCode::Stfld => (2, 0),
        };
        Some(StackBehavior::new(pops, pushes))
    }

    /// Returns `true` for operations after which execution never falls through.
    #[must_use]
    pub const fn ends_flow(&self) -> bool {
        matches!(
            self.flow_type(),
            FlowType::UnconditionalBranch | FlowType::Return | FlowType::Throw
        )
    }

    /// Returns the shorthand argument load for `index`, if one exists.
    #[must_use]
    pub const fn ldarg_shorthand(index: u16) -> Option<OpCode> {
        match index {
            0 => Some(OpCode::Ldarg0),
            1 => Some(OpCode::Ldarg1),
            2 => Some(OpCode::Ldarg2),
            3 => Some(OpCode::Ldarg3),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_mnemonics() {
        assert_eq!(OpCode::Ldarg0.mnemonic(), "ldarg.0");
        assert_eq!(OpCode::LdcR4.to_string(), "ldc.r4");
        assert_eq!(OpCode::BneUn.to_string(), "bne.un");
        assert_eq!(OpCode::Ldsflda.to_string(), "ldsflda");
    }

    #[test]
    fn test_only_calls_and_ret_lack_fixed_stack_behavior() {
        for opcode in OpCode::iter() {
            let dynamic = matches!(opcode, OpCode::Call | OpCode::Callvirt | OpCode::Ret);
            assert_eq!(opcode.stack_behavior().is_none(), dynamic, "{opcode}");
        }
    }

    #[test]
    fn test_branches_take_labels() {
        for opcode in OpCode::iter() {
            let is_branch = matches!(
                opcode.flow_type(),
                FlowType::ConditionalBranch | FlowType::UnconditionalBranch
            );
            assert_eq!(
                opcode.operand_kind() == OperandKind::Label,
                is_branch,
                "{opcode}"
            );
        }
    }

    #[test]
    fn test_stack_behavior_net_effect() {
        let store = OpCode::Stfld.stack_behavior().unwrap();
        assert_eq!((store.pops, store.pushes, store.net_effect), (2, 0, -2));

        let dup = OpCode::Dup.stack_behavior().unwrap();
        assert_eq!(dup.net_effect, 1);

        let static_load = OpCode::Ldsflda.stack_behavior().unwrap();
        assert_eq!(static_load.net_effect, 1);
    }

    #[test]
    fn test_ends_flow() {
        assert!(OpCode::Ret.ends_flow());
        assert!(OpCode::Br.ends_flow());
        assert!(OpCode::Throw.ends_flow());
        assert!(!OpCode::Brtrue.ends_flow());
        assert!(!OpCode::Call.ends_flow());
    }

    #[test]
    fn test_ldarg_shorthand() {
        assert_eq!(OpCode::ldarg_shorthand(0), Some(OpCode::Ldarg0));
        assert_eq!(OpCode::ldarg_shorthand(3), Some(OpCode::Ldarg3));
        assert_eq!(OpCode::ldarg_shorthand(4), None);
    }
}
