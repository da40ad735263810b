//! Instruction model and pattern matching for method-body rewriting.
//!
//! This module holds everything a rewrite pass reads and writes:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                      Instruction Model                        │
//! ├───────────────────────────────────────────────────────────────┤
//! │  OpCode / OperandKind / FlowType / StackBehavior              │
//! │    closed operation alphabet with per-operation metadata      │
//! │                                                               │
//! │  FieldRef / MethodRef / LocalSlot / Label                     │
//! │    match keys and operand handles                             │
//! │                                                               │
//! │  Instruction / Operand                                        │
//! │    checked and typed constructors                             │
//! │                                                               │
//! │  InstructionSequence                                          │
//! │    one method body, local/label allocation, verification      │
//! │                                                               │
//! │  matcher / Pattern / Constant                                 │
//! │    stateless predicates used by the passes                    │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Values of these types are plain data. Nothing here touches the host; passes in
//! [`crate::rewrite`] consume and produce [`InstructionSequence`]s and
//! [`crate::patching`] moves them in and out of the host.

mod instruction;
pub mod matcher;
mod opcode;
mod references;
mod sequence;

pub use instruction::{Instruction, Operand};
pub use matcher::{Constant, Pattern};
pub use opcode::{FlowType, OpCode, OperandKind, StackBehavior};
pub use references::{FieldRef, Label, LocalSlot, MethodRef};
pub use sequence::InstructionSequence;
