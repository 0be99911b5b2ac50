//! Interned IR types.
//!
//! Types are hash-consed per `TypeTable`. Recursive definitions (lowered
//! generics) are registered first and resolved once their body is known,
//! so self-referential aggregates terminate.

use rustc_hash::FxHashMap;

/// Id of an interned type in a `TypeTable`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IrTypeId(pub u32);

/// Id of a recursive type definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecursiveId(pub u32);

/// Machine scalar kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IrScalar {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    IPtr,
    UPtr,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum IrType {
    /// The zero-sized unit type.
    Unit,
    Scalar(IrScalar),
    Pointer(IrTypeId),
    Array(IrTypeId, u64),
    Struct(Vec<IrTypeId>),
    Union(Vec<IrTypeId>),
    Function {
        parameters: Vec<IrTypeId>,
        result: Option<IrTypeId>,
        /// The callee writes a by-value result through a trailing
        /// destination pointer instead of returning it.
        sret: bool,
    },
    /// A reference to a recursive definition applied to arguments.
    Apply {
        recursive: RecursiveId,
        arguments: Vec<IrTypeId>,
    },
    /// A parameter of the enclosing recursive definition's body.
    RecursiveParameter { recursive: RecursiveId, index: u32 },
}

struct RecursiveDef {
    parameters: Vec<IrTypeId>,
    body: Option<IrTypeId>,
}

/// Hash-consing table for IR types.
pub struct TypeTable {
    types: Vec<IrType>,
    interned: FxHashMap<IrType, IrTypeId>,
    recursives: Vec<RecursiveDef>,
}

impl TypeTable {
    pub fn new() -> Self {
        TypeTable {
            types: Vec::new(),
            interned: FxHashMap::default(),
            recursives: Vec::new(),
        }
    }

    pub fn intern(&mut self, ty: IrType) -> IrTypeId {
        if let Some(&id) = self.interned.get(&ty) {
            return id;
        }
        let id = IrTypeId(self.types.len() as u32);
        self.interned.insert(ty.clone(), id);
        self.types.push(ty);
        id
    }

    #[inline]
    pub fn get(&self, id: IrTypeId) -> &IrType {
        &self.types[id.0 as usize]
    }

    pub fn unit(&mut self) -> IrTypeId {
        self.intern(IrType::Unit)
    }

    pub fn scalar(&mut self, scalar: IrScalar) -> IrTypeId {
        self.intern(IrType::Scalar(scalar))
    }

    pub fn pointer(&mut self, target: IrTypeId) -> IrTypeId {
        self.intern(IrType::Pointer(target))
    }

    /// The pointee of a pointer type.
    pub fn pointee(&self, id: IrTypeId) -> Option<IrTypeId> {
        match self.get(id) {
            IrType::Pointer(target) => Some(*target),
            _ => None,
        }
    }

    /// The member type of an aggregate at a constant index, unwrapping
    /// resolved recursive applications.
    pub fn element(&self, id: IrTypeId, index: u64) -> Option<IrTypeId> {
        match self.get(id) {
            IrType::Struct(members) | IrType::Union(members) => {
                members.get(index as usize).copied()
            }
            IrType::Array(element, _) => Some(*element),
            IrType::Apply { recursive, .. } => {
                let body = self.recursives[recursive.0 as usize].body?;
                self.element(body, index)
            }
            _ => None,
        }
    }

    /// Register a recursive definition; its body is supplied later via
    /// `resolve_recursive`.
    pub fn new_recursive(&mut self, parameters: Vec<IrTypeId>) -> RecursiveId {
        let id = RecursiveId(self.recursives.len() as u32);
        self.recursives.push(RecursiveDef {
            parameters,
            body: None,
        });
        id
    }

    /// Supply the body of a recursive definition. May be done only once.
    pub fn resolve_recursive(&mut self, id: RecursiveId, body: IrTypeId) {
        let def = &mut self.recursives[id.0 as usize];
        debug_assert!(def.body.is_none(), "recursive type resolved twice");
        def.body = Some(body);
    }

    pub fn recursive_parameters(&self, id: RecursiveId) -> &[IrTypeId] {
        &self.recursives[id.0 as usize].parameters
    }

    pub fn recursive_body(&self, id: RecursiveId) -> Option<IrTypeId> {
        self.recursives[id.0 as usize].body
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        TypeTable::new()
    }
}
