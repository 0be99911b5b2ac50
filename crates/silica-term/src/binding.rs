//! The scope algebra on terms.
//!
//! Four operations manage the movement of terms between scopes:
//!
//! - `parameterize` closes free `Anonymous` occurrences into de-Bruijn
//!   parameters, ready for use under a binder.
//! - `specialize` is its left inverse: parameters at the outermost binder
//!   level are replaced by values and the binder is eliminated.
//! - `anonymize` closes references to block-local statements into an
//!   existential, so a block's type can escape the block.
//! - `match_terms` performs first-order matching with wildcards, the
//!   engine of overload resolution.
//!
//! Depth counts binders from the walk root: a parameter with `depth == d`
//! at a position under `d` binders refers to the binder at the root.

use crate::context::CompileContext;
use crate::rewrite::{children, map_children, shape_eq, TermRewriter};
use crate::term::{TermId, TermKind};
use rustc_hash::FxHashMap;
use silica_common::{CompileResult, ErrorKind, SourceLocation};

// =============================================================================
// Parameterize
// =============================================================================

struct Parameterizer<'a> {
    anonymouses: &'a [TermId],
    location: SourceLocation,
    cache: FxHashMap<(TermId, u32), TermId>,
}

impl TermRewriter for Parameterizer<'_> {
    fn cache(&mut self) -> &mut FxHashMap<(TermId, u32), TermId> {
        &mut self.cache
    }

    fn visit(
        &mut self,
        ctx: &mut CompileContext,
        term: TermId,
        depth: u32,
    ) -> CompileResult<Option<TermId>> {
        if !matches!(ctx.kind(term), TermKind::Anonymous) {
            return Ok(None);
        }
        let Some(index) = self.anonymouses.iter().position(|&a| a == term) else {
            return Ok(None);
        };
        // The placeholder's type may mention other anonymouses in the list.
        let ty = ctx.type_of(term);
        let ty = self.rewrite(ctx, ty, depth)?;
        Ok(Some(ctx.parameter(ty, depth, index as u32, self.location)?))
    }
}

/// Replace free occurrences of each anonymous in `anonymouses` by
/// `Parameter(depth, index)`, where depth counts the binders crossed from
/// the root of `term`.
pub fn parameterize(
    ctx: &mut CompileContext,
    term: TermId,
    anonymouses: &[TermId],
    location: SourceLocation,
) -> CompileResult<TermId> {
    if anonymouses.is_empty() {
        return Ok(term);
    }
    Parameterizer {
        anonymouses,
        location,
        cache: FxHashMap::default(),
    }
    .rewrite(ctx, term, 0)
}

// =============================================================================
// Shift
// =============================================================================

struct Shifter {
    by: u32,
    location: SourceLocation,
    cache: FxHashMap<(TermId, u32), TermId>,
}

impl TermRewriter for Shifter {
    fn cache(&mut self) -> &mut FxHashMap<(TermId, u32), TermId> {
        &mut self.cache
    }

    fn visit(
        &mut self,
        ctx: &mut CompileContext,
        term: TermId,
        depth: u32,
    ) -> CompileResult<Option<TermId>> {
        let TermKind::Parameter {
            ty,
            depth: d,
            index,
        } = *ctx.kind(term)
        else {
            return Ok(None);
        };
        if d < depth {
            // Bound within the shifted term; the generic walk still
            // rewrites its type.
            return Ok(None);
        }
        let ty = self.rewrite(ctx, ty, depth)?;
        Ok(Some(ctx.parameter(ty, d + self.by, index, self.location)?))
    }
}

/// Increment the depth of every free parameter of `term` by `by`.
/// Used when substituting a value under binders.
pub fn shift(
    ctx: &mut CompileContext,
    term: TermId,
    by: u32,
    location: SourceLocation,
) -> CompileResult<TermId> {
    if by == 0 {
        return Ok(term);
    }
    Shifter {
        by,
        location,
        cache: FxHashMap::default(),
    }
    .rewrite(ctx, term, 0)
}

struct DownShifter {
    by: u32,
    location: SourceLocation,
    cache: FxHashMap<(TermId, u32), TermId>,
}

impl TermRewriter for DownShifter {
    fn cache(&mut self) -> &mut FxHashMap<(TermId, u32), TermId> {
        &mut self.cache
    }

    fn visit(
        &mut self,
        ctx: &mut CompileContext,
        term: TermId,
        depth: u32,
    ) -> CompileResult<Option<TermId>> {
        let TermKind::Parameter {
            ty,
            depth: d,
            index,
        } = *ctx.kind(term)
        else {
            return Ok(None);
        };
        if d < depth {
            return Ok(None);
        }
        debug_assert!(d >= depth + self.by, "checked by escapes_below");
        let ty = self.rewrite(ctx, ty, depth)?;
        Ok(Some(ctx.parameter(ty, d - self.by, index, self.location)?))
    }
}

/// Whether any free parameter of `term` refers to one of the innermost
/// `floor` binder levels outside the term.
fn escapes_below(ctx: &CompileContext, term: TermId, floor: u32, depth: u32) -> bool {
    match ctx.kind(term) {
        TermKind::Parameter { ty, depth: d, .. } => {
            (*d >= depth && *d < depth + floor) || escapes_below(ctx, *ty, floor, depth)
        }
        kind => children(kind)
            .into_iter()
            .any(|(child, delta)| escapes_below(ctx, child, floor, depth + delta)),
    }
}

/// Decrement free parameter depths by `by`; `None` if the term refers to
/// any of the `by` binders being stripped.
fn try_shift_down(
    ctx: &mut CompileContext,
    term: TermId,
    by: u32,
    location: SourceLocation,
) -> CompileResult<Option<TermId>> {
    if by == 0 {
        return Ok(Some(term));
    }
    if escapes_below(ctx, term, by, 0) {
        return Ok(None);
    }
    DownShifter {
        by,
        location,
        cache: FxHashMap::default(),
    }
    .rewrite(ctx, term, 0)
    .map(Some)
}

// =============================================================================
// Specialize
// =============================================================================

struct Specializer<'a> {
    values: &'a [TermId],
    location: SourceLocation,
    cache: FxHashMap<(TermId, u32), TermId>,
}

impl TermRewriter for Specializer<'_> {
    fn cache(&mut self) -> &mut FxHashMap<(TermId, u32), TermId> {
        &mut self.cache
    }

    fn visit(
        &mut self,
        ctx: &mut CompileContext,
        term: TermId,
        depth: u32,
    ) -> CompileResult<Option<TermId>> {
        let TermKind::Parameter {
            ty,
            depth: d,
            index,
        } = *ctx.kind(term)
        else {
            return Ok(None);
        };
        if d == depth {
            let Some(&value) = self.values.get(index as usize) else {
                return Err(ctx.error(
                    ErrorKind::IndexOutOfRange,
                    self.location,
                    format!(
                        "parameter index {index} escapes a binder of {} values",
                        self.values.len()
                    ),
                ));
            };
            Ok(Some(shift(ctx, value, depth, self.location)?))
        } else if d > depth {
            // The eliminated binder sat between this parameter and its own
            // binder, so the parameter moves one level in.
            let ty = self.rewrite(ctx, ty, depth)?;
            Ok(Some(ctx.parameter(ty, d - 1, index, self.location)?))
        } else {
            Ok(None)
        }
    }
}

/// Replace `Parameter(depth, k)` at the outermost binder level with
/// `values[k]`, decrementing the depth of parameters bound further out.
///
/// Fails with `IndexOutOfRange` if an index at the eliminated level is not
/// covered by `values`.
pub fn specialize(
    ctx: &mut CompileContext,
    term: TermId,
    values: &[TermId],
    location: SourceLocation,
) -> CompileResult<TermId> {
    Specializer {
        values,
        location,
        cache: FxHashMap::default(),
    }
    .rewrite(ctx, term, 0)
}

// =============================================================================
// Anonymize
// =============================================================================

struct Anonymizer<'a> {
    statements: &'a [TermId],
    indices: FxHashMap<TermId, u32>,
    parameter_types: Vec<TermId>,
    location: SourceLocation,
}

impl Anonymizer<'_> {
    fn index_of(&mut self, ctx: &mut CompileContext, statement: TermId) -> CompileResult<u32> {
        if let Some(&index) = self.indices.get(&statement) {
            return Ok(index);
        }
        let index = self.parameter_types.len() as u32;
        self.indices.insert(statement, index);
        // Reserve the slot first; the statement's type may refer to earlier
        // statements but never forward to this one.
        self.parameter_types.push(statement);
        let ty = ctx.type_of(statement);
        let ty = self.run(ctx, ty, 0)?;
        self.parameter_types[index as usize] = ty;
        Ok(index)
    }

    fn run(
        &mut self,
        ctx: &mut CompileContext,
        term: TermId,
        depth: u32,
    ) -> CompileResult<TermId> {
        if let TermKind::StatementRef { statement } = *ctx.kind(term) {
            if self.statements.contains(&statement) {
                let index = self.index_of(ctx, statement)?;
                let ty = self.parameter_types[index as usize];
                let ty = shift(ctx, ty, depth, self.location)?;
                return ctx.parameter(ty, depth, index, self.location);
            }
        }
        let kind = ctx.kind(term).clone();
        if !kind.is_interned() {
            return Ok(term);
        }
        let location = ctx.location(term);
        let mut changed = false;
        let new_kind = map_children(&kind, &mut |child, delta| {
            let new_child = self.run(ctx, child, depth + delta)?;
            changed |= new_child != child;
            Ok(new_child)
        })?;
        if changed {
            ctx.create(new_kind, location)
        } else {
            Ok(term)
        }
    }
}

/// Close references to the given statements into an enclosing existential.
///
/// The result is a pure term: each referenced statement becomes a fresh
/// existential parameter whose type is anonymized recursively. A term with
/// no such references is returned unchanged, so `anonymize(t, []) == t`.
pub fn anonymize(
    ctx: &mut CompileContext,
    term: TermId,
    statements: &[TermId],
    location: SourceLocation,
) -> CompileResult<TermId> {
    if statements.is_empty() {
        return Ok(term);
    }
    let mut state = Anonymizer {
        statements,
        indices: FxHashMap::default(),
        parameter_types: Vec::new(),
        location,
    };
    let result = state.run(ctx, term, 0)?;
    if state.parameter_types.is_empty() {
        return Ok(term);
    }
    ctx.exists(result, state.parameter_types, location)
}

// =============================================================================
// First-order matching
// =============================================================================

/// Match `value` against `pattern`, treating `Parameter(depth, k)` at the
/// current binder depth as wildcard `k`.
///
/// A successful match records bindings into `wildcards`. Distinct
/// anonymous and statement references match only themselves. Bindings may
/// be partially filled on failure.
pub fn match_terms(
    ctx: &mut CompileContext,
    pattern: TermId,
    value: TermId,
    wildcards: &mut [Option<TermId>],
    location: SourceLocation,
) -> CompileResult<bool> {
    match_at(ctx, pattern, value, 0, wildcards, location)
}

fn match_at(
    ctx: &mut CompileContext,
    pattern: TermId,
    value: TermId,
    depth: u32,
    wildcards: &mut [Option<TermId>],
    location: SourceLocation,
) -> CompileResult<bool> {
    // Hash-consing makes equal pure terms id-equal, and identity nodes
    // match only themselves.
    if pattern == value {
        return Ok(true);
    }

    if let TermKind::Parameter {
        depth: d, index, ..
    } = *ctx.kind(pattern)
    {
        if d != depth {
            return Ok(false);
        }
        let slot = index as usize;
        if slot >= wildcards.len() {
            return Ok(false);
        }
        // The binding lives at the wildcard binder level; a value that
        // refers to binders crossed since the match root cannot escape.
        let Some(adjusted) = try_shift_down(ctx, value, depth, location)? else {
            return Ok(false);
        };
        return Ok(match wildcards[slot] {
            Some(existing) => existing == adjusted,
            None => {
                wildcards[slot] = Some(adjusted);
                true
            }
        });
    }

    let pattern_kind = ctx.kind(pattern).clone();
    let value_kind = ctx.kind(value).clone();

    // Pointers compare by pointee: an upward-reference chain annotates the
    // pointee's position, it is not part of pointer identity.
    if let (TermKind::PointerType { target: pt, .. }, TermKind::PointerType { target: vt, .. }) =
        (&pattern_kind, &value_kind)
    {
        return match_at(ctx, *pt, *vt, depth, wildcards, location);
    }

    if !shape_eq(&pattern_kind, &value_kind) {
        return Ok(false);
    }
    let pattern_children = children(&pattern_kind);
    let value_children = children(&value_kind);
    debug_assert_eq!(pattern_children.len(), value_children.len());
    for ((pc, delta), (vc, _)) in pattern_children.into_iter().zip(value_children) {
        if !match_at(ctx, pc, vc, depth + delta, wildcards, location)? {
            return Ok(false);
        }
    }
    Ok(true)
}

// =============================================================================
// Context conveniences
// =============================================================================

impl CompileContext {
    pub fn parameterize(
        &mut self,
        term: TermId,
        anonymouses: &[TermId],
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        parameterize(self, term, anonymouses, location)
    }

    pub fn specialize(
        &mut self,
        term: TermId,
        values: &[TermId],
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        specialize(self, term, values, location)
    }

    pub fn anonymize(
        &mut self,
        term: TermId,
        statements: &[TermId],
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        anonymize(self, term, statements, location)
    }

    /// Whether a term still reaches an `Anonymous` placeholder, in which
    /// case it must not escape its defining scope.
    pub fn has_free_anonymous(&self, term: TermId) -> bool {
        fn walk(ctx: &CompileContext, term: TermId) -> bool {
            match ctx.kind(term) {
                TermKind::Anonymous => true,
                kind => children(kind).into_iter().any(|(c, _)| walk(ctx, c)),
            }
        }
        walk(self, term)
    }
}

#[cfg(test)]
#[path = "tests/binding.rs"]
mod tests;
