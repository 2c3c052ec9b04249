//! IR for the object-size analysis.
//!
//! This crate provides the read-only view of a translation unit that the
//! `objsz` analysis consumes:
//!
//! - **Type layouts** ([`TypeTable`], [`TypeKind`]) — byte sizes, field
//!   offsets and array extents.
//! - **SSA IR** ([`Function`], [`Instr`], [`AccessPath`]) — one defining
//!   instruction per value; merges may form cycles through loops.
//! - **Module entities** ([`Module`], [`Object`], [`StringLit`],
//!   [`Callee`]) — declared objects, literals and the allocator /
//!   returns-argument contracts of callees.
//! - **Construction and verification** ([`ModuleBuilder`],
//!   [`FunctionBuilder`], [`verify_function`]).
//!
//! # Crate Dependencies
//!
//! No dependency on any front end or on the analysis itself. Lowering
//! from a real compiler IR into this form is the embedder's job.

pub mod builder;
pub mod ir;
pub mod types;
pub mod verify;

pub use builder::{FunctionBuilder, ModuleBuilder};
pub use ir::{
    AccessPath, AllocContract, Builtin, Callee, CalleeId, Function, Index, Instr, Module,
    Object, ObjectId, Operand, Part, Root, Step, StringId, StringLit, ValueData, ValueId,
    ValueType,
};
pub use types::{Field, TypeId, TypeKind, TypeTable};
pub use verify::{verify_function, verify_types, VerifyError};
