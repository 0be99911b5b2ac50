//! Basic-block function bodies.
//!
//! Every instruction is a value; blocks hold the instruction order and a
//! terminator. Phi nodes collect their edges incrementally as predecessors
//! are lowered. `BodyBuilder` mirrors the instruction-builder style of the
//! downstream code generator: it tracks an insertion point and computes
//! result types as instructions are appended.

use crate::types::{IrType, IrTypeId, TypeTable};
use crate::value::ConstValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

#[derive(Clone, Debug, PartialEq)]
pub enum Instr {
    /// Allocate a stack slot; yields a pointer.
    Alloca { ty: IrTypeId },
    /// Release a stack slot allocated by `Alloca`.
    FreeA { slot: ValueId },
    Load { ptr: ValueId },
    Store { value: ValueId, ptr: ValueId },
    Call {
        callee: ValueId,
        arguments: Vec<ValueId>,
    },
    /// Pointer to member `index` of the pointed-to aggregate.
    ElementPtr { base: ValueId, index: ValueId },
    /// Pointer to the enclosing aggregate of a derived pointer; the offset
    /// is recovered from the pointer's upward-reference chain.
    OuterPtr { base: ValueId },
}

#[derive(Clone, Debug, PartialEq)]
pub enum ValueKind {
    /// The n-th function argument.
    Argument(u32),
    Const(ConstValue),
    Instr { block: BlockId, instr: Instr },
    Phi {
        block: BlockId,
        edges: Vec<(BlockId, ValueId)>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ValueData {
    pub kind: ValueKind,
    pub ty: IrTypeId,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Terminator {
    Return(Option<ValueId>),
    Branch(BlockId),
    CondBranch {
        condition: ValueId,
        then_block: BlockId,
        else_block: BlockId,
    },
    Unreachable,
}

#[derive(Clone, Debug, Default)]
pub struct BlockData {
    pub instrs: Vec<ValueId>,
    pub terminator: Option<Terminator>,
    /// Dominating block, recorded for merge blocks.
    pub dominator: Option<BlockId>,
}

/// One lowered function body.
#[derive(Debug, Default)]
pub struct FunctionBody {
    values: Vec<ValueData>,
    blocks: Vec<BlockData>,
}

impl FunctionBody {
    pub fn new() -> Self {
        FunctionBody::default()
    }

    pub fn value(&self, id: ValueId) -> &ValueData {
        &self.values[id.0 as usize]
    }

    pub fn block(&self, id: BlockId) -> &BlockData {
        &self.blocks[id.0 as usize]
    }

    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &BlockData)> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(i, b)| (BlockId(i as u32), b))
    }

    pub fn values(&self) -> impl Iterator<Item = (ValueId, &ValueData)> {
        self.values
            .iter()
            .enumerate()
            .map(|(i, v)| (ValueId(i as u32), v))
    }

    fn push_value(&mut self, data: ValueData) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(data);
        id
    }

    /// All instruction values of a given shape, in block order. Test and
    /// verification helper.
    pub fn count_instrs(&self, pred: impl Fn(&Instr) -> bool) -> usize {
        self.values
            .iter()
            .filter(|v| matches!(&v.kind, ValueKind::Instr { instr, .. } if pred(instr)))
            .count()
    }
}

/// Appends instructions to a `FunctionBody` at a movable insertion point.
pub struct BodyBuilder<'a> {
    pub types: &'a mut TypeTable,
    body: &'a mut FunctionBody,
    block: Option<BlockId>,
}

impl<'a> BodyBuilder<'a> {
    pub fn new(types: &'a mut TypeTable, body: &'a mut FunctionBody) -> Self {
        BodyBuilder {
            types,
            body,
            block: None,
        }
    }

    pub fn body(&self) -> &FunctionBody {
        self.body
    }

    /// The current insertion block.
    pub fn block(&self) -> BlockId {
        self.block.expect("no insertion point set")
    }

    pub fn set_insert_point(&mut self, block: BlockId) {
        self.block = Some(block);
    }

    pub fn new_block(&mut self, dominator: Option<BlockId>) -> BlockId {
        let id = BlockId(self.body.blocks.len() as u32);
        self.body.blocks.push(BlockData {
            instrs: Vec::new(),
            terminator: None,
            dominator,
        });
        id
    }

    pub fn value_type(&self, value: ValueId) -> IrTypeId {
        self.body.value(value).ty
    }

    pub fn argument(&mut self, index: u32, ty: IrTypeId) -> ValueId {
        self.body.push_value(ValueData {
            kind: ValueKind::Argument(index),
            ty,
        })
    }

    pub fn constant(&mut self, value: ConstValue, ty: IrTypeId) -> ValueId {
        self.body.push_value(ValueData {
            kind: ValueKind::Const(value),
            ty,
        })
    }

    pub fn undef(&mut self, ty: IrTypeId) -> ValueId {
        self.constant(ConstValue::Undef(ty), ty)
    }

    fn instr(&mut self, instr: Instr, ty: IrTypeId) -> ValueId {
        let block = self.block();
        let id = self.body.push_value(ValueData {
            kind: ValueKind::Instr { block, instr },
            ty,
        });
        self.body.blocks[block.0 as usize].instrs.push(id);
        id
    }

    pub fn alloca(&mut self, ty: IrTypeId) -> ValueId {
        let ptr_ty = self.types.pointer(ty);
        self.instr(Instr::Alloca { ty }, ptr_ty)
    }

    pub fn freea(&mut self, slot: ValueId) {
        let unit = self.types.unit();
        self.instr(Instr::FreeA { slot }, unit);
    }

    pub fn load(&mut self, ptr: ValueId) -> ValueId {
        let ty = self
            .types
            .pointee(self.value_type(ptr))
            .expect("load from a non-pointer");
        self.instr(Instr::Load { ptr }, ty)
    }

    pub fn store(&mut self, value: ValueId, ptr: ValueId) {
        let unit = self.types.unit();
        self.instr(Instr::Store { value, ptr }, unit);
    }

    pub fn call(&mut self, callee: ValueId, arguments: Vec<ValueId>) -> ValueId {
        let callee_ty = self.value_type(callee);
        let fn_ty = self
            .types
            .pointee(callee_ty)
            .unwrap_or(callee_ty);
        let result = match self.types.get(fn_ty) {
            IrType::Function { result, .. } => *result,
            _ => None,
        };
        let ty = result.unwrap_or_else(|| self.types.unit());
        self.instr(Instr::Call { callee, arguments }, ty)
    }

    /// Pointer to member `index` of the aggregate behind `base`.
    pub fn element_ptr(&mut self, base: ValueId, index: ValueId, constant_index: u64) -> ValueId {
        let aggregate = self
            .types
            .pointee(self.value_type(base))
            .expect("element_ptr through a non-pointer");
        let member = self
            .types
            .element(aggregate, constant_index)
            .expect("element_ptr index out of range");
        let ty = self.types.pointer(member);
        self.instr(Instr::ElementPtr { base, index }, ty)
    }

    pub fn outer_ptr(&mut self, base: ValueId, result_ty: IrTypeId) -> ValueId {
        self.instr(Instr::OuterPtr { base }, result_ty)
    }

    pub fn phi(&mut self, ty: IrTypeId) -> ValueId {
        let block = self.block();
        let id = self.body.push_value(ValueData {
            kind: ValueKind::Phi {
                block,
                edges: Vec::new(),
            },
            ty,
        });
        self.body.blocks[block.0 as usize].instrs.push(id);
        id
    }

    pub fn add_phi_edge(&mut self, phi: ValueId, from: BlockId, value: ValueId) {
        match &mut self.body.values[phi.0 as usize].kind {
            ValueKind::Phi { edges, .. } => edges.push((from, value)),
            _ => panic!("phi edge added to a non-phi value"),
        }
    }

    fn terminate(&mut self, terminator: Terminator) {
        let block = self.block();
        let slot = &mut self.body.blocks[block.0 as usize].terminator;
        debug_assert!(slot.is_none(), "block terminated twice");
        *slot = Some(terminator);
    }

    pub fn branch(&mut self, target: BlockId) {
        self.terminate(Terminator::Branch(target));
    }

    pub fn cond_branch(&mut self, condition: ValueId, then_block: BlockId, else_block: BlockId) {
        self.terminate(Terminator::CondBranch {
            condition,
            then_block,
            else_block,
        });
    }

    pub fn return_(&mut self, value: ValueId) {
        self.terminate(Terminator::Return(Some(value)));
    }

    pub fn return_void(&mut self) {
        self.terminate(Terminator::Return(None));
    }

    pub fn unreachable(&mut self) {
        self.terminate(Terminator::Unreachable);
    }

    /// Whether the current block already ends in a terminator.
    pub fn is_terminated(&self) -> bool {
        match self.block {
            Some(block) => self.body.block(block).terminator.is_some(),
            None => true,
        }
    }
}
