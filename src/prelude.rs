//! # ilweave Prelude
//!
//! The types needed to declare, install and invoke patches, for glob import.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all ilweave operations
pub use crate::Error;

/// The result type used throughout ilweave
pub use crate::Result;

/// Patcher configuration
pub use crate::{MissingPatternPolicy, PatchConfig};

// ================================================================================================
// Instruction Model
// ================================================================================================

/// Instructions and their operands
pub use crate::assembly::{Instruction, OpCode, Operand};

/// Sequences and references
pub use crate::assembly::{FieldRef, InstructionSequence, Label, LocalSlot, MethodRef};

/// Match keys
pub use crate::assembly::{Constant, Pattern};

// ================================================================================================
// Rewriting
// ================================================================================================

/// The pass trait and its outcome
pub use crate::rewrite::{RewriteOutcome, RewritePass};

/// Pass shapes
pub use crate::rewrite::{
    AppendBeforeReturn, CallSiteAdjust, FieldLoadHoist, PointSubstitution, WindowMultiply,
};

// ================================================================================================
// Patching
// ================================================================================================

/// Registration and dispatch
pub use crate::patching::{priority, InstallReport, PatchRegistration, Patcher, TargetKey};

/// Hooks
pub use crate::patching::{CallContext, PrefixAction, Value};

/// Host boundary
pub use crate::patching::{BodyAccessor, CapabilityProbe, Host, MemoryHost, TargetResolver};

/// Diagnostics
pub use crate::diagnostics::{EventKind, EventLog};
