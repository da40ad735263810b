use thiserror::Error;

use crate::{
    assembly::{Label, OpCode},
    patching::TargetKey,
};

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Errors fall into two groups. Construction and verification errors
/// ([`Error::InvalidInstruction`], [`Error::Malformed`], [`Error::StackImbalance`],
/// [`Error::DanglingLabel`]) indicate a programming error in a rewrite pass and are fatal at
/// startup. Installation errors ([`Error::TargetUnresolved`], [`Error::PatternNotFound`] under
/// the hard-fail policy) are reported by [`crate::patching::Patcher::install`] and never reach
/// the host's call path.
///
/// Attempting to retire an already retired registration is not an error; see
/// [`crate::patching::Lifecycle::retire`].
///
/// # Examples
///
/// ```rust
/// use ilweave::{assembly::{Instruction, OpCode, Operand}, Error};
///
/// match Instruction::new(OpCode::Ldfld, Operand::Int32(4)) {
///     Err(Error::InvalidInstruction { opcode, .. }) => assert_eq!(opcode, OpCode::Ldfld),
///     _ => unreachable!(),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// An instruction was constructed with an operand its operation cannot take.
    ///
    /// Such an instruction must never be emitted; this is always a bug in the pass
    /// that tried to build it.
    #[error("Invalid instruction {opcode}: {reason}")]
    InvalidInstruction {
        /// The operation that rejected the operand
        opcode: OpCode,
        /// Why the operand was rejected
        reason: String,
    },

    /// An instruction sequence failed verification.
    ///
    /// Covers stack underflow, mismatched stack depths at a jump target, a `ret`
    /// that does not leave exactly the return value, and references to undeclared
    /// local slots. The source location of the check is included for debugging.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A branch references a label that no instruction in the sequence carries.
    #[error("Branch to undefined label {0}")]
    UndefinedLabel(Label),

    /// A label is attached to more than one instruction.
    #[error("Label {0} is attached to more than one instruction")]
    DuplicateLabel(Label),

    /// A rewrite pass would have dropped an instruction that is a jump target.
    ///
    /// Passes that cannot move a label to a surviving instruction fail closed with
    /// this error instead of producing a body with a dangling branch.
    #[error("Pass '{pass}' would drop jump target {label}")]
    DanglingLabel {
        /// Name of the offending pass
        pass: &'static str,
        /// The label that would have been lost
        label: Label,
    },

    /// A pass was defined with a replacement whose net stack effect differs from
    /// the instructions it replaces.
    #[error("Pass '{pass}' is unbalanced: replaced block has net stack effect {expected}, replacement has {actual}")]
    StackImbalance {
        /// Name of the offending pass
        pass: &'static str,
        /// Net stack effect of the matched instructions
        expected: i32,
        /// Net stack effect of the replacement
        actual: i32,
    },

    /// A pass never found its pattern and the configuration asks for a hard failure.
    ///
    /// Under the default [`crate::MissingPatternPolicy::Log`] this condition is only
    /// recorded in the [`crate::diagnostics::EventLog`].
    #[error("Pattern '{pattern}' of pass '{pass}' not found in {target}")]
    PatternNotFound {
        /// The method that was being rewritten
        target: TargetKey,
        /// Name of the pass
        pass: &'static str,
        /// Description of the expected pattern
        pattern: String,
    },

    /// A registration's target method does not exist in the host and was not
    /// declared optional.
    #[error("Target {0} could not be resolved")]
    TargetUnresolved(TargetKey),

    /// The same owner registered the same target twice.
    #[error("Owner '{owner}' already registered a patch for {target}")]
    DuplicateRegistration {
        /// Owner id of the registration
        owner: String,
        /// The doubly registered target
        target: TargetKey,
    },

    /// Registrations were added after installation.
    #[error("Patches are already installed, no further registrations accepted")]
    RegistryFrozen,

    /// An inserted call names a payload function that has no native binding.
    #[error("No payload bound for {0}")]
    UnboundPayload(String),

    /// Failed to lock shared payload state.
    ///
    /// A hook panicked while holding the lock and the state may be inconsistent.
    #[error("Failed to lock target")]
    LockError,
}
