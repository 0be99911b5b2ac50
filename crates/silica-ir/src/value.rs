//! Constant values for global initialisers.

use crate::module::SymbolId;
use crate::types::IrTypeId;

/// A link-time constant.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstValue {
    /// Uninitialised storage; filled by a synthesised constructor at load
    /// time.
    Undef(IrTypeId),
    /// The null pointer of the given pointer type.
    Null(IrTypeId),
    Unit,
    Bool(bool),
    Int { ty: IrTypeId, value: u64 },
    /// Raw bytes, including any terminator the front end chose to add.
    Bytes(Vec<u8>),
    Struct(Vec<ConstValue>),
    Array(Vec<ConstValue>),
    Union {
        ty: IrTypeId,
        index: u32,
        value: Box<ConstValue>,
    },
    /// The address of another symbol.
    Symbol(SymbolId),
    /// A constant element path into another constant's storage.
    ElementPtr {
        base: Box<ConstValue>,
        indices: Vec<u64>,
    },
}

impl ConstValue {
    /// Whether the value contains an `Undef` anywhere.
    pub fn has_undef(&self) -> bool {
        match self {
            ConstValue::Undef(_) => true,
            ConstValue::Struct(members) | ConstValue::Array(members) => {
                members.iter().any(ConstValue::has_undef)
            }
            ConstValue::Union { value, .. } => value.has_undef(),
            ConstValue::ElementPtr { base, .. } => base.has_undef(),
            _ => false,
        }
    }
}
