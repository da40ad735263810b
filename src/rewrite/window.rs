//! Multi-instruction window matching.
//!
//! [`WindowMultiply`] finds the window
//!
//! ```text
//! ld(s)flda F      ; FieldAddr
//! sub              ; Sub
//! X                ; any single instruction
//! Y                ; insert "ldc.r4 k; mul" before this one
//! ```
//!
//! and scales the value produced by `X` before `Y` consumes it. The matcher is the explicit
//! automaton below, exposed through [`step`] so that the transition table can be tested on its
//! own.
//!
//! | State | FieldAddr | Sub | Other |
//! |-------|-----------|-----|-------|
//! | `Idle` | `SawFieldAddr` | `Idle` | `Idle` |
//! | `SawFieldAddr` | `SawFieldAddr` | `SawSub` | `Idle` |
//! | `SawSub` | `SawSkip` | `SawSkip` | `SawSkip` |
//! | `SawSkip` | insert, `SawFieldAddr` | insert, `Idle` | insert, `Idle` |
//!
//! An interrupted match returns to `Idle` and the interrupting instruction is classified
//! again from `Idle`, so a field address that breaks one window can start the next. Any number
//! of non-overlapping windows in one body are all rewritten. A window cut off by the end of
//! the body inserts nothing.

use crate::{
    assembly::{matcher, FieldRef, Instruction, InstructionSequence, OpCode},
    rewrite::{emit_block, RewriteOutcome, RewritePass},
    Result,
};

/// Automaton state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// No partial match
    Idle,
    /// Seen the field address load
    SawFieldAddr,
    /// Seen the subtraction following it
    SawSub,
    /// Skipped the single instruction after the subtraction
    SawSkip,
}

/// Input alphabet: how an instruction is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    /// Loads the address of the watched field
    FieldAddr,
    /// `sub`
    Sub,
    /// Anything else
    Other,
}

/// What to do with the current instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Emit the instruction unchanged
    Emit,
    /// Emit the multiply block, then the instruction
    InsertBefore,
}

/// Transition function of the window automaton.
#[must_use]
pub fn step(state: State, symbol: Symbol) -> (State, Action) {
    match (state, symbol) {
        (State::Idle, Symbol::FieldAddr) => (State::SawFieldAddr, Action::Emit),
        (State::Idle, _) => (State::Idle, Action::Emit),
        (State::SawFieldAddr, Symbol::Sub) => (State::SawSub, Action::Emit),
        (State::SawFieldAddr, other) => (step(State::Idle, other).0, Action::Emit),
        (State::SawSub, _) => (State::SawSkip, Action::Emit),
        (State::SawSkip, other) => (step(State::Idle, other).0, Action::InsertBefore),
    }
}

/// Inserts `ldc.r4 factor; mul` into every `ld(s)flda F; sub; X; Y` window, before `Y`.
#[derive(Debug, Clone)]
pub struct WindowMultiply {
    name: &'static str,
    field: FieldRef,
    factor: f32,
}

impl WindowMultiply {
    /// Creates the pass.
    #[must_use]
    pub fn new(field: FieldRef, factor: f32) -> Self {
        WindowMultiply {
            name: "window-multiply",
            field,
            factor,
        }
    }

    /// Sets the name reported in diagnostics.
    #[must_use]
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Classifies `instruction` into the automaton's alphabet.
    #[must_use]
    pub fn classify(&self, instruction: &Instruction) -> Symbol {
        if matcher::loads_field_address(instruction, &self.field) {
            Symbol::FieldAddr
        } else if instruction.opcode == OpCode::Sub {
            Symbol::Sub
        } else {
            Symbol::Other
        }
    }
}

impl RewritePass for WindowMultiply {
    fn name(&self) -> &'static str {
        self.name
    }

    fn pattern(&self) -> String {
        format!("ldflda {}; sub; _", self.field)
    }

    fn apply(&self, body: &InstructionSequence) -> Result<RewriteOutcome> {
        let block = [Instruction::ldc_r4(self.factor), Instruction::mul()];
        let mut out = body.empty_like();
        let mut state = State::Idle;
        let mut matches = 0;

        for instruction in body {
            let (next, action) = step(state, self.classify(instruction));
            if action == Action::InsertBefore {
                emit_block(&mut out, self.name, &block, &[])?;
                matches += 1;
            }
            out.push(instruction.clone());
            state = next;
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

    const STATES: [State; 4] = [State::Idle, State::SawFieldAddr, State::SawSub, State::SawSkip];
    const SYMBOLS: [Symbol; 3] = [Symbol::FieldAddr, Symbol::Sub, Symbol::Other];

    fn center() -> FieldRef {
        FieldRef::new_static("SectionThreadManager", "Center")
    }

    fn pass() -> WindowMultiply {
        WindowMultiply::new(center(), 4.0)
    }

    fn field_addr() -> Instruction {
        Instruction::load_field_address(center())
    }

    #[test]
    fn test_transition_table() {
        let expected = [
            // Idle
            (State::SawFieldAddr, Action::Emit),
            (State::Idle, Action::Emit),
            (State::Idle, Action::Emit),
            // SawFieldAddr
            (State::SawFieldAddr, Action::Emit),
            (State::SawSub, Action::Emit),
            (State::Idle, Action::Emit),
            // SawSub
            (State::SawSkip, Action::Emit),
            (State::SawSkip, Action::Emit),
            (State::SawSkip, Action::Emit),
            // SawSkip
            (State::SawFieldAddr, Action::InsertBefore),
            (State::Idle, Action::InsertBefore),
            (State::Idle, Action::InsertBefore),
        ];

        let mut index = 0;
        for state in STATES {
            for symbol in SYMBOLS {
                assert_eq!(step(state, symbol), expected[index], "{state:?} x {symbol:?}");
                index += 1;
            }
        }
    }

    #[test]
    fn test_full_window() {
        let x = Instruction::ldc_r4(2.0);
        let y = Instruction::pop();
        let body = InstructionSequence::from_instructions(
            vec![field_addr(), Instruction::sub(), x.clone(), y.clone()],
            false,
        );

        let outcome = pass().apply(&body).unwrap();
        assert_eq!(outcome.matches, 1);
        assert_eq!(
            outcome.sequence.instructions(),
            &[
                field_addr(),
                Instruction::sub(),
                x,
                Instruction::ldc_r4(4.0),
                Instruction::mul(),
                y
            ]
        );
    }

    #[test]
    fn test_interrupted_window_unchanged() {
        let body = InstructionSequence::from_instructions(
            vec![field_addr(), Instruction::nop(), Instruction::sub(), Instruction::nop(), Instruction::nop()],
            false,
        );
        let outcome = pass().apply(&body).unwrap();
        assert!(!outcome.found);
        assert_eq!(outcome.sequence, body);
    }

    #[test]
    fn test_interrupting_field_addr_starts_new_window() {
        let body = InstructionSequence::from_instructions(
            vec![
                field_addr(),
                field_addr(),
                Instruction::sub(),
                Instruction::nop(),
                Instruction::ret(),
            ],
            false,
        );
        let outcome = pass().apply(&body).unwrap();
        assert_eq!(outcome.matches, 1);
        assert_eq!(outcome.sequence.instructions()[4], Instruction::ldc_r4(4.0));
    }

    #[test]
    fn test_two_windows() {
        let window = [field_addr(), Instruction::sub(), Instruction::nop()];
        let mut instructions = Vec::new();
        instructions.extend(window.clone());
        instructions.push(Instruction::nop());
        instructions.extend(window);
        instructions.push(Instruction::ret());

        let body = InstructionSequence::from_instructions(instructions, false);
        let outcome = pass().apply(&body).unwrap();
        assert_eq!(outcome.matches, 2);
        assert_eq!(outcome.sequence.len(), body.len() + 4);
        assert_eq!(outcome.sequence.count(|i| i.opcode == OpCode::Mul), 2);
    }

    #[test]
    fn test_window_cut_off_at_end() {
        let body = InstructionSequence::from_instructions(
            vec![field_addr(), Instruction::sub(), Instruction::nop()],
            false,
        );
        assert!(!pass().apply(&body).unwrap().found);
    }
}
