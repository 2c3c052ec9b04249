//! Structural verification of a [`Function`] against its [`Module`].
//!
//! The object-size analysis never depends on verification: malformed
//! input simply degrades to an unknown size. Front ends run the verifier
//! after building IR to catch construction bugs early.

use thiserror::Error;

use crate::ir::{AccessPath, CalleeId, Function, Instr, Module, Operand, ValueId};
use crate::types::{TypeId, TypeTable};

/// A structural problem in a function body.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("value v{user} uses v{used}, which is not defined in this function")]
    UndefinedValue { user: u32, used: u32 },

    #[error("value v{value} adds an offset to v{base}, which is not a pointer")]
    NonPointerBase { value: u32, base: u32 },

    #[error("merge v{value} has no incoming values")]
    EmptyMerge { value: u32 },

    #[error("value v{value} calls callee #{callee}, which is not declared")]
    UnknownCallee { value: u32, callee: u32 },

    #[error("access path in v{value} does not resolve at position {position}")]
    BadAccessPath { value: u32, position: usize },

    #[error("type #{ty} refers to type #{component}, which is not declared before it")]
    ForwardTypeReference { ty: u32, component: u32 },
}

/// Check that every type only refers to types interned before it.
///
/// Tables built through the [`TypeTable`] constructors always pass; a
/// table that fails may contain cycles, which have no size.
pub fn verify_types(types: &TypeTable) -> Result<(), VerifyError> {
    let ids = (0..types.len()).filter_map(|i| u32::try_from(i).ok().map(TypeId::new));
    for ty in ids {
        for component in types.components(ty) {
            if component.index() >= ty.index() {
                return Err(VerifyError::ForwardTypeReference {
                    ty: ty.raw(),
                    component: component.raw(),
                });
            }
        }
    }
    Ok(())
}

/// Verify the module's types and every value of `func`. Returns the first
/// problem found.
pub fn verify_function(module: &Module, func: &Function) -> Result<(), VerifyError> {
    verify_types(&module.types)?;
    for (id, data) in func.iter() {
        for used in data.def.used_values() {
            if func.value(used).is_none() {
                return Err(VerifyError::UndefinedValue {
                    user: id.raw(),
                    used: used.raw(),
                });
            }
        }

        match &data.def {
            Instr::AddressOf(path) => verify_path(module, id, path)?,
            Instr::PointerAdd { base, .. } => {
                if !func.is_pointer(*base) {
                    return Err(VerifyError::NonPointerBase {
                        value: id.raw(),
                        base: base.raw(),
                    });
                }
            }
            Instr::Merge { incoming } if incoming.is_empty() => {
                return Err(VerifyError::EmptyMerge { value: id.raw() });
            }
            Instr::Call { callee, args } => {
                verify_callee(module, id, *callee)?;
                for arg in args {
                    if let Operand::Address(path) = arg {
                        verify_path(module, id, path)?;
                    }
                }
            }
            Instr::Copy { .. }
            | Instr::Merge { .. }
            | Instr::Parameter { .. }
            | Instr::Opaque => {}
        }
    }
    Ok(())
}

fn verify_callee(module: &Module, id: ValueId, callee: CalleeId) -> Result<(), VerifyError> {
    match module.callee(callee) {
        Some(_) => Ok(()),
        None => Err(VerifyError::UnknownCallee {
            value: id.raw(),
            callee: callee.raw(),
        }),
    }
}

fn verify_path(module: &Module, id: ValueId, path: &AccessPath) -> Result<(), VerifyError> {
    module
        .path_types(path)
        .map(|_| ())
        .map_err(|position| VerifyError::BadAccessPath {
            value: id.raw(),
            position,
        })
}
