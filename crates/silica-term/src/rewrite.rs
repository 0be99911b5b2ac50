//! Structural walking of pure terms.
//!
//! `map_children` is the one place that knows the child slots and binder
//! structure of every term kind; rewriting, matching, shifting and the
//! binding algebra are all built on it. The binder delta of a child is the
//! number of binder levels crossed when descending into it: function types
//! and existentials bind their parameter types and result.
//!
//! Identity nodes (statements, blocks, globals, dispatch trees) are leaves
//! here: a pure term refers to them only through their ids and they match
//! only themselves.

use crate::context::CompileContext;
use crate::term::{TermId, TermKind};
use rustc_hash::FxHashMap;
use silica_common::CompileResult;

/// Rebuild a kind by mapping every child term through `f`.
///
/// `f` receives each child id and the binder delta of its slot. Kinds
/// without rewritable children are returned unchanged.
pub fn map_children<F>(kind: &TermKind, f: &mut F) -> CompileResult<TermKind>
where
    F: FnMut(TermId, u32) -> CompileResult<TermId>,
{
    let kind = match kind {
        TermKind::PointerType { target, upref } => TermKind::PointerType {
            target: f(*target, 0)?,
            upref: f(*upref, 0)?,
        },
        TermKind::ArrayType { element, length } => TermKind::ArrayType {
            element: f(*element, 0)?,
            length: f(*length, 0)?,
        },
        TermKind::StructType { members } => TermKind::StructType {
            members: members.iter().map(|&m| f(m, 0)).collect::<CompileResult<_>>()?,
        },
        TermKind::UnionType { members } => TermKind::UnionType {
            members: members.iter().map(|&m| f(m, 0)).collect::<CompileResult<_>>()?,
        },
        TermKind::StringType { length } => TermKind::StringType {
            length: f(*length, 0)?,
        },
        TermKind::FunctionType {
            result_mode,
            result,
            parameters,
            n_phantom,
        } => TermKind::FunctionType {
            result_mode: *result_mode,
            result: f(*result, 1)?,
            parameters: parameters
                .iter()
                .map(|p| {
                    Ok(crate::term::FunctionParameter {
                        mode: p.mode,
                        ty: f(p.ty, 1)?,
                    })
                })
                .collect::<CompileResult<_>>()?,
            n_phantom: *n_phantom,
        },
        TermKind::DerivedType { value_type, upref } => TermKind::DerivedType {
            value_type: f(*value_type, 0)?,
            upref: f(*upref, 0)?,
        },
        TermKind::ConstantType { value } => TermKind::ConstantType {
            value: f(*value, 0)?,
        },
        TermKind::Exists {
            result,
            parameter_types,
        } => TermKind::Exists {
            result: f(*result, 1)?,
            parameter_types: parameter_types
                .iter()
                .map(|&t| f(t, 1))
                .collect::<CompileResult<_>>()?,
        },
        TermKind::Parameter { ty, depth, index } => TermKind::Parameter {
            ty: f(*ty, 0)?,
            depth: *depth,
            index: *index,
        },
        TermKind::TypeInstance {
            generic,
            parameters,
        } => TermKind::TypeInstance {
            generic: f(*generic, 0)?,
            parameters: parameters
                .iter()
                .map(|&p| f(p, 0))
                .collect::<CompileResult<_>>()?,
        },
        TermKind::DefaultValue { ty } => TermKind::DefaultValue { ty: f(*ty, 0)? },
        TermKind::StructValue { ty, members } => TermKind::StructValue {
            ty: f(*ty, 0)?,
            members: members.iter().map(|&m| f(m, 0)).collect::<CompileResult<_>>()?,
        },
        TermKind::ArrayValue { ty, elements } => TermKind::ArrayValue {
            ty: f(*ty, 0)?,
            elements: elements
                .iter()
                .map(|&e| f(e, 0))
                .collect::<CompileResult<_>>()?,
        },
        TermKind::UnionValue { ty, index, value } => TermKind::UnionValue {
            ty: f(*ty, 0)?,
            index: *index,
            value: f(*value, 0)?,
        },
        TermKind::InstanceValue { instance, member } => TermKind::InstanceValue {
            instance: f(*instance, 0)?,
            member: f(*member, 0)?,
        },
        TermKind::Upref {
            outer_type,
            index,
            next,
        } => TermKind::Upref {
            outer_type: f(*outer_type, 0)?,
            index: f(*index, 0)?,
            next: f(*next, 0)?,
        },
        TermKind::MovableValue { value } => TermKind::MovableValue {
            value: f(*value, 0)?,
        },
        TermKind::InterfaceValue {
            interface,
            parameters,
            implementation,
        } => TermKind::InterfaceValue {
            interface: *interface,
            parameters: parameters
                .iter()
                .map(|&p| f(p, 0))
                .collect::<CompileResult<_>>()?,
            implementation: *implementation,
        },
        TermKind::ElementValue { aggregate, index } => TermKind::ElementValue {
            aggregate: f(*aggregate, 0)?,
            index: f(*index, 0)?,
        },
        TermKind::ElementPtr { pointer, index } => TermKind::ElementPtr {
            pointer: f(*pointer, 0)?,
            index: f(*index, 0)?,
        },
        TermKind::PointerTo { value } => TermKind::PointerTo {
            value: f(*value, 0)?,
        },
        TermKind::PointerTarget { pointer } => TermKind::PointerTarget {
            pointer: f(*pointer, 0)?,
        },
        TermKind::OuterPtr { pointer } => TermKind::OuterPtr {
            pointer: f(*pointer, 0)?,
        },
        // Leaves: no rewritable children. StatementRef targets and generic
        // references are identities, not structure.
        _ => kind.clone(),
    };
    Ok(kind)
}

/// Collect the child slots of a kind as (id, binder delta) pairs.
pub fn children(kind: &TermKind) -> Vec<(TermId, u32)> {
    let mut out = Vec::new();
    let _ = map_children(kind, &mut |child, delta| {
        out.push((child, delta));
        Ok(child)
    });
    out
}

/// Whether two kinds agree on discriminant and every non-child field.
pub fn shape_eq(a: &TermKind, b: &TermKind) -> bool {
    // Normalising all child slots to a sentinel reduces shape equality to
    // derived equality, so a new field extends this automatically.
    const SENTINEL: TermId = TermId(u32::MAX);
    let na = map_children(a, &mut |_, _| Ok(SENTINEL));
    let nb = map_children(b, &mut |_, _| Ok(SENTINEL));
    match (na, nb) {
        (Ok(na), Ok(nb)) => na == nb,
        _ => false,
    }
}

/// Shared driver for binding-algebra rewrites.
///
/// An implementor intercepts the nodes it cares about in `visit`; the
/// driver walks everything else generically, rebuilding (and re-interning)
/// a node only when a child changed. Results are cached per (term, depth).
pub trait TermRewriter {
    /// Handle one node, or return `None` to descend into its children.
    fn visit(
        &mut self,
        ctx: &mut CompileContext,
        term: TermId,
        depth: u32,
    ) -> CompileResult<Option<TermId>>;

    fn cache(&mut self) -> &mut FxHashMap<(TermId, u32), TermId>;

    fn rewrite(
        &mut self,
        ctx: &mut CompileContext,
        term: TermId,
        depth: u32,
    ) -> CompileResult<TermId> {
        if let Some(&cached) = self.cache().get(&(term, depth)) {
            return Ok(cached);
        }
        let result = match self.visit(ctx, term, depth)? {
            Some(replacement) => replacement,
            None => {
                let kind = ctx.kind(term).clone();
                if !kind.is_interned() {
                    // Identity nodes are leaves: they match only themselves.
                    term
                } else {
                    let location = ctx.location(term);
                    let mut changed = false;
                    let new_kind = map_children(&kind, &mut |child, delta| {
                        let new_child = self.rewrite(ctx, child, depth + delta)?;
                        changed |= new_child != child;
                        Ok(new_child)
                    })?;
                    if changed {
                        ctx.create(new_kind, location)?
                    } else {
                        term
                    }
                }
            }
        };
        self.cache().insert((term, depth), result);
        Ok(result)
    }
}
