// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # ilweave
//!
//! Load-time rewriting and call interception for stack-based bytecode methods.
//!
//! `ilweave` patches the compiled methods of a running host application: it reads a method
//! body as an instruction sequence, runs small single-pass rewrites over it, verifies that the
//! result still balances its evaluation stack, installs it, and dispatches calls through
//! prioritized prefix and postfix hooks. The [`camera`] module uses all of this to implement a
//! complete camera mod for a colony simulation game.
//!
//! ## Features
//!
//! - **Typed instructions** - operands are checked against their operation when constructed
//! - **Stack verification** - every rewritten body is verified before it reaches the host
//! - **Five pass shapes** - point substitution, append-before-return, call-site adjustment,
//!   field-load hoisting and a windowed state machine
//! - **Fail-safe installation** - missing patterns are logged once (or fail hard, if
//!   configured) and nothing is written until every target resolved
//! - **Optional targets** - integrations with absent third-party code become no-ops
//! - **One-shot hooks** - a hook can retire its own registration from inside a call
//!
//! ## Quick Start
//!
//! ```rust
//! use ilweave::prelude::*;
//!
//! let host = MemoryHost::new();
//! let target = TargetKey::method("CameraDriver", "Update");
//! let root_size = FieldRef::instance("CameraDriver", "rootSize");
//! host.define(
//!     target.clone(),
//!     InstructionSequence::from_instructions(
//!         vec![
//!             Instruction::ldarg(0),
//!             Instruction::ldc_r4(24.0),
//!             Instruction::store_field(root_size.clone()),
//!             Instruction::ret(),
//!         ],
//!         false,
//!     ),
//! );
//!
//! let setter = MethodRef::new("Tools", "SetRootSize").param("CameraDriver").param("float");
//! let pass = PointSubstitution::new(
//!     Pattern::StoresField(root_size),
//!     vec![Instruction::call(setter)],
//! )?;
//!
//! let mut patcher = Patcher::new(PatchConfig::default());
//! patcher.register(patcher.registration(target.clone()).pass(pass))?;
//! let report = patcher.install(&host)?;
//!
//! assert_eq!(report.installed, vec![target]);
//! assert!(report.patterns_missing.is_empty());
//! # Ok::<(), ilweave::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`assembly`] - instructions, references, sequences, verification and matchers
//! - [`rewrite`] - the [`rewrite::RewritePass`] trait and the pass shapes
//! - [`patching`] - registrations, the host boundary and the [`patching::Patcher`]
//! - [`payload`] - logic that rewritten bodies and hooks call into
//! - [`camera`] - the camera mod built on all of the above
//! - [`diagnostics`] - the event log every anomaly is recorded in
//! - [`Error`] and [`Result`] - error handling
//!
//! ## Logging
//!
//! Every event recorded in a [`diagnostics::EventLog`] is also emitted through the `log`
//! facade under the `ilweave` target. Install any `log` implementation to see them.

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types.
pub mod prelude;

/// Instruction model: operations, operands, references, sequences and pattern matching.
pub mod assembly;

/// Rewrite passes over instruction sequences.
pub mod rewrite;

/// Patch registration, installation and call dispatch.
pub mod patching;

/// Domain payload functions.
pub mod payload;

/// The camera mod.
pub mod camera;

/// Typed event log for installation and runtime diagnostics.
pub mod diagnostics;

/// Patcher configuration.
pub mod config;

/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `ilweave` Error type
///
/// The single error type of the crate. Construction and verification errors point at a bug in
/// a pass definition; installation errors describe a host that does not match the patches.
pub use error::Error;

pub use config::{MissingPatternPolicy, PatchConfig};
