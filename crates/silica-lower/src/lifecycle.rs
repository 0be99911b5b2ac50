//! The lifecycle protocol.
//!
//! Types of storage class `complex` resolve a `Movable` (and for copies a
//! `Copyable`) implementation; construction, destruction, moves and
//! copies become calls through the resolved function table. Primitive
//! types degrade to loads and stores; aggregates recurse member-wise,
//! forward for construction and reverse for destruction.

use crate::function::{CleanupKind, FunctionLowering};
use crate::storage::{Lowered, Storage};
use silica_common::{CompileResult, ErrorKind, SourceLocation};
use silica_ir::ValueId;
use silica_term::{
    TermId, TermKind, TypeMode, INTERFACE_COPYABLE_COPY, INTERFACE_COPYABLE_COPY_INIT,
    INTERFACE_MOVABLE_FINI, INTERFACE_MOVABLE_INIT, INTERFACE_MOVABLE_MOVE,
    INTERFACE_MOVABLE_MOVE_INIT,
};

/// How an aggregate type decomposes for the lifecycle walk.
enum Layout {
    /// Trivial lifecycle: loads and stores suffice.
    Primitive,
    /// Member types in declaration order.
    Members(Vec<TermId>),
    /// A complex generic instance with a resolved interface witness.
    Interface,
}

impl FunctionLowering<'_, '_> {
    fn layout(&mut self, ty: TermId, location: SourceLocation) -> CompileResult<Layout> {
        if self.gb.ctx.info(ty).type_mode != TypeMode::Complex {
            return Ok(Layout::Primitive);
        }
        match self.gb.ctx.kind(ty).clone() {
            TermKind::StructType { members } => Ok(Layout::Members(members.into_vec())),
            TermKind::ArrayType { element, length } => {
                let len = self.gb.ctx.size_from(length, location)?;
                Ok(Layout::Members(vec![element; len as usize]))
            }
            TermKind::DerivedType { value_type, .. } => self.layout(value_type, location),
            TermKind::Exists { result, .. } => self.layout(result, location),
            TermKind::UnionType { .. } => Err(self.gb.ctx.error(
                ErrorKind::LifecycleForbidden,
                location,
                "a union with non-trivial members has no inferable lifecycle",
            )),
            TermKind::TypeInstance { .. } => Ok(Layout::Interface),
            _ => Ok(Layout::Primitive),
        }
    }

    /// Pointer to member `index` of the aggregate at `base`.
    fn member_ptr(&mut self, base: ValueId, index: u64) -> CompileResult<ValueId> {
        let index_value = self.size_register(index)?;
        Ok(self.with_builder(|b| b.element_ptr(base, index_value, index)))
    }

    /// Resolve the lifecycle witness for `ty`, mapping a missing
    /// implementation to `LifecycleForbidden`.
    fn lifecycle_witness(
        &mut self,
        interface: TermId,
        ty: TermId,
        location: SourceLocation,
    ) -> CompileResult<ValueId> {
        match self.run_interface_value(interface, &[ty], None, location) {
            Ok(witness) => self.to_register(&witness, location),
            Err(error) if error.kind() == ErrorKind::OverloadNotFound => {
                Err(self.gb.ctx.error(
                    ErrorKind::LifecycleForbidden,
                    location,
                    "type does not provide the required lifecycle interface",
                ))
            }
            Err(error) => Err(error),
        }
    }

    /// Call entry `index` of a lifecycle function table.
    fn lifecycle_call(
        &mut self,
        witness: ValueId,
        index: u32,
        arguments: Vec<ValueId>,
    ) -> CompileResult<()> {
        let entry = self.member_ptr(witness, index as u64)?;
        let function = self.with_builder(|b| b.load(entry));
        self.with_builder(|b| b.call(function, arguments));
        Ok(())
    }

    fn movable_witness(&mut self, ty: TermId, location: SourceLocation) -> CompileResult<ValueId> {
        let interface = self.gb.ctx.builtins().movable_interface;
        self.lifecycle_witness(interface, ty, location)
    }

    fn copyable_witness(&mut self, ty: TermId, location: SourceLocation) -> CompileResult<ValueId> {
        let interface = self.gb.ctx.builtins().copyable_interface;
        self.lifecycle_witness(interface, ty, location)
    }

    // =========================================================================
    // Construction
    // =========================================================================

    /// Default-construct an object at `dest`.
    pub(crate) fn object_construct_default(
        &mut self,
        dest: ValueId,
        ty: TermId,
        location: SourceLocation,
    ) -> CompileResult<()> {
        match self.layout(ty, location)? {
            Layout::Primitive => {
                match self.gb.zero_const(self.module, ty, location) {
                    Ok(zero) => {
                        let value = self.materialize_const(zero, location)?;
                        self.with_builder(|b| b.store(value, dest));
                    }
                    Err(crate::storage::Defer::Error(error)) => return Err(error),
                    Err(crate::storage::Defer::NotGlobal) => {
                        // No meaningful zero; leave the storage undefined.
                    }
                }
                Ok(())
            }
            Layout::Members(members) => {
                // A later member's constructor throwing must finalise the
                // members already built; guard each one until the whole
                // aggregate is up.
                let guard_depth = self.cleanups.len();
                for (index, member) in members.iter().enumerate() {
                    let ptr = self.member_ptr(dest, index as u64)?;
                    self.object_construct_default(ptr, *member, location)?;
                    self.push_cleanup(CleanupKind::Finalize { ptr, ty: *member }, true);
                }
                self.discard_cleanups(guard_depth);
                Ok(())
            }
            Layout::Interface => {
                let witness = self.movable_witness(ty, location)?;
                self.lifecycle_call(witness, INTERFACE_MOVABLE_INIT, vec![dest])
            }
        }
    }

    /// Construct the value described by a constructor term into `dest`.
    pub(crate) fn object_construct_term(
        &mut self,
        dest: ValueId,
        value: TermId,
        location: SourceLocation,
    ) -> CompileResult<()> {
        match self.gb.ctx.kind(value).clone() {
            TermKind::DefaultValue { ty } => self.object_construct_default(dest, ty, location),
            TermKind::StructValue { members, .. } => {
                let guard_depth = self.cleanups.len();
                for (index, member) in members.iter().enumerate() {
                    let ptr = self.member_ptr(dest, index as u64)?;
                    self.object_construct_term(ptr, *member, location)?;
                    let member_ty = self.gb.ctx.type_of(*member);
                    self.push_cleanup(
                        CleanupKind::Finalize {
                            ptr,
                            ty: member_ty,
                        },
                        true,
                    );
                }
                self.discard_cleanups(guard_depth);
                Ok(())
            }
            TermKind::ArrayValue { elements, .. } => {
                let guard_depth = self.cleanups.len();
                for (index, element) in elements.iter().enumerate() {
                    let ptr = self.member_ptr(dest, index as u64)?;
                    self.object_construct_term(ptr, *element, location)?;
                    let element_ty = self.gb.ctx.type_of(*element);
                    self.push_cleanup(
                        CleanupKind::Finalize {
                            ptr,
                            ty: element_ty,
                        },
                        true,
                    );
                }
                self.discard_cleanups(guard_depth);
                Ok(())
            }
            TermKind::UnionValue { index, value, .. } => {
                let ptr = self.member_ptr(dest, index as u64)?;
                self.object_construct_term(ptr, value, location)
            }
            TermKind::InstanceValue { member, .. } => {
                // An instance shares its body's representation.
                self.object_construct_term(dest, member, location)
            }
            TermKind::MovableValue { value } => {
                let source = self.run(value, None)?;
                if source.is_bottom() {
                    return Ok(());
                }
                let ty = self.gb.ctx.type_of(value);
                self.move_construct(ty, dest, source.id(), location)
            }
            _ => {
                let result = self.run(value, Some(dest))?;
                if result.is_bottom() {
                    return Ok(());
                }
                let ty = self.gb.ctx.type_of(value);
                match result.storage {
                    Storage::Stack => {
                        if result.id() != dest {
                            self.move_construct(ty, dest, result.id(), location)?;
                        }
                        Ok(())
                    }
                    Storage::Functional => {
                        let v = result.id();
                        self.with_builder(|b| b.store(v, dest));
                        Ok(())
                    }
                    Storage::LvalueRef => self.copy_construct(ty, dest, result.id(), location),
                    Storage::RvalueRef => self.move_construct(ty, dest, result.id(), location),
                    Storage::Bottom => unreachable!("checked above"),
                }
            }
        }
    }

    // =========================================================================
    // Destruction
    // =========================================================================

    /// Run destructors for the object at `ptr`. Does not release storage.
    pub(crate) fn object_fini(
        &mut self,
        ptr: ValueId,
        ty: TermId,
        location: SourceLocation,
    ) -> CompileResult<()> {
        match self.layout(ty, location)? {
            Layout::Primitive => Ok(()),
            Layout::Members(members) => {
                // Reverse of construction order.
                for (index, member) in members.iter().enumerate().rev() {
                    let member_ptr = self.member_ptr(ptr, index as u64)?;
                    self.object_fini(member_ptr, *member, location)?;
                }
                Ok(())
            }
            Layout::Interface => {
                let witness = self.movable_witness(ty, location)?;
                self.lifecycle_call(witness, INTERFACE_MOVABLE_FINI, vec![ptr])
            }
        }
    }

    /// Destroy the object in a stack slot and release the slot.
    pub(crate) fn destroy_slot(
        &mut self,
        slot: ValueId,
        ty: TermId,
    ) -> CompileResult<()> {
        let location = self.gb.ctx.location(ty);
        self.object_fini(slot, ty, location)?;
        self.with_builder(|b| b.freea(slot));
        Ok(())
    }

    /// Destroy a temporary result immediately; references and register
    /// values are not owned and need nothing.
    pub(crate) fn destroy_now(&mut self, value: &Lowered) -> CompileResult<()> {
        if value.storage == Storage::Stack {
            self.destroy_slot(value.id(), value.ty)?;
        }
        Ok(())
    }

    // =========================================================================
    // Copies and moves
    // =========================================================================

    pub(crate) fn copy_construct(
        &mut self,
        ty: TermId,
        dest: ValueId,
        src: ValueId,
        location: SourceLocation,
    ) -> CompileResult<()> {
        match self.layout(ty, location)? {
            Layout::Primitive => {
                let value = self.with_builder(|b| b.load(src));
                self.with_builder(|b| b.store(value, dest));
                Ok(())
            }
            Layout::Members(members) => {
                for (index, member) in members.iter().enumerate() {
                    let d = self.member_ptr(dest, index as u64)?;
                    let s = self.member_ptr(src, index as u64)?;
                    self.copy_construct(*member, d, s, location)?;
                }
                Ok(())
            }
            Layout::Interface => {
                let witness = self.copyable_witness(ty, location)?;
                self.lifecycle_call(witness, INTERFACE_COPYABLE_COPY_INIT, vec![dest, src])
            }
        }
    }

    pub(crate) fn move_construct(
        &mut self,
        ty: TermId,
        dest: ValueId,
        src: ValueId,
        location: SourceLocation,
    ) -> CompileResult<()> {
        match self.layout(ty, location)? {
            Layout::Primitive => {
                let value = self.with_builder(|b| b.load(src));
                self.with_builder(|b| b.store(value, dest));
                Ok(())
            }
            Layout::Members(members) => {
                for (index, member) in members.iter().enumerate() {
                    let d = self.member_ptr(dest, index as u64)?;
                    let s = self.member_ptr(src, index as u64)?;
                    self.move_construct(*member, d, s, location)?;
                }
                Ok(())
            }
            Layout::Interface => {
                let witness = self.movable_witness(ty, location)?;
                self.lifecycle_call(witness, INTERFACE_MOVABLE_MOVE_INIT, vec![dest, src])
            }
        }
    }

    /// Move out of `src` and finalise what is left behind.
    pub(crate) fn move_construct_destroy(
        &mut self,
        ty: TermId,
        dest: ValueId,
        src: ValueId,
        location: SourceLocation,
    ) -> CompileResult<()> {
        self.move_construct(ty, dest, src, location)?;
        self.object_fini(src, ty, location)
    }

    /// Assign over an already-initialised object.
    pub(crate) fn object_assign(
        &mut self,
        ty: TermId,
        dest: ValueId,
        src: ValueId,
        is_move: bool,
        location: SourceLocation,
    ) -> CompileResult<()> {
        match self.layout(ty, location)? {
            Layout::Primitive => {
                let value = self.with_builder(|b| b.load(src));
                self.with_builder(|b| b.store(value, dest));
                Ok(())
            }
            Layout::Members(members) => {
                for (index, member) in members.iter().enumerate() {
                    let d = self.member_ptr(dest, index as u64)?;
                    let s = self.member_ptr(src, index as u64)?;
                    self.object_assign(*member, d, s, is_move, location)?;
                }
                Ok(())
            }
            Layout::Interface => {
                if is_move {
                    let witness = self.movable_witness(ty, location)?;
                    self.lifecycle_call(witness, INTERFACE_MOVABLE_MOVE, vec![dest, src])
                } else {
                    let witness = self.copyable_witness(ty, location)?;
                    self.lifecycle_call(witness, INTERFACE_COPYABLE_COPY, vec![dest, src])
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/lifecycle.rs"]
mod tests;
