//! Emitted modules and the sink contract.

use crate::body::FunctionBody;
use crate::types::{IrTypeId, TypeTable};
use crate::value::ConstValue;
use indexmap::IndexMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IrLinkage {
    Local,
    Private,
    OneDefinition,
    Export,
    Import,
}

/// The definition attached to a symbol.
#[derive(Debug)]
pub enum SymbolDef {
    /// Declared only; defined elsewhere.
    Declared,
    /// A constant-initialised global variable.
    Value(ConstValue),
    /// A function body.
    Body(FunctionBody),
}

#[derive(Debug)]
pub struct IrSymbol {
    pub name: String,
    pub ty: IrTypeId,
    pub linkage: IrLinkage,
    pub def: SymbolDef,
    /// Global variable attributes.
    pub constant: bool,
    pub merge: bool,
}

/// One emitted object module.
pub struct IrModule {
    pub name: String,
    pub types: TypeTable,
    symbols: Vec<IrSymbol>,
    by_name: IndexMap<String, SymbolId>,
    /// Initialiser functions with their priorities, priority order.
    pub constructors: Vec<(SymbolId, u32)>,
    /// Finaliser functions with their priorities, priority order.
    pub destructors: Vec<(SymbolId, u32)>,
}

impl IrModule {
    pub fn new(name: impl Into<String>) -> Self {
        IrModule {
            name: name.into(),
            types: TypeTable::new(),
            symbols: Vec::new(),
            by_name: IndexMap::new(),
            constructors: Vec::new(),
            destructors: Vec::new(),
        }
    }

    pub fn get_member(&self, name: &str) -> Option<SymbolId> {
        self.by_name.get(name).copied()
    }

    /// Create a new symbol of the given name and type. The name must be
    /// unused.
    pub fn new_member(&mut self, name: impl Into<String>, ty: IrTypeId, linkage: IrLinkage) -> SymbolId {
        let name = name.into();
        debug_assert!(
            !self.by_name.contains_key(&name),
            "duplicate symbol name {name:?}"
        );
        let id = SymbolId(self.symbols.len() as u32);
        self.by_name.insert(name.clone(), id);
        self.symbols.push(IrSymbol {
            name,
            ty,
            linkage,
            def: SymbolDef::Declared,
            constant: false,
            merge: false,
        });
        id
    }

    #[inline]
    pub fn symbol(&self, id: SymbolId) -> &IrSymbol {
        &self.symbols[id.0 as usize]
    }

    #[inline]
    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut IrSymbol {
        &mut self.symbols[id.0 as usize]
    }

    pub fn symbols(&self) -> impl Iterator<Item = (SymbolId, &IrSymbol)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (SymbolId(i as u32), s))
    }

    pub fn set_value(&mut self, id: SymbolId, value: ConstValue) {
        self.symbol_mut(id).def = SymbolDef::Value(value);
    }

    pub fn set_body(&mut self, id: SymbolId, body: FunctionBody) {
        self.symbol_mut(id).def = SymbolDef::Body(body);
    }
}

/// Receives finished modules.
///
/// The contract per symbol is a stable mangled name, a type, a linkage and
/// either a constant initialiser or a body instruction graph; constructor
/// and destructor lists are ordered by priority.
pub trait ModuleSink {
    fn emit(&mut self, module: &IrModule);
}
