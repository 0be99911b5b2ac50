//! Generic (recursive) type construction.
//!
//! A generic is created in two phases: the parameter pattern immediately,
//! the body later through a one-shot memoised callback. During body
//! evaluation the generic already exists, so recursive self-reference via
//! `TypeInstance` terminates; re-entrant *evaluation* of the body raises
//! `CircularGeneric` (see `CompileContext::generic_body`).

use crate::binding::{parameterize, specialize};
use crate::context::{CompileContext, GenericPrimitive};
use crate::term::{GenericId, TermId, TermKind, TermMode};
use silica_common::{CompileResult, ErrorKind, SourceLocation};

/// Create a generic whose body callback works with anonymous stand-ins.
///
/// The callback receives one fresh anonymous term per pattern entry, with
/// the pattern's dependencies already substituted; the body it returns is
/// parameterized against those anonymouses before being stored.
pub fn generic_with_body<F>(
    ctx: &mut CompileContext,
    pattern: Vec<TermId>,
    primitive_mode: GenericPrimitive,
    location: SourceLocation,
    body: F,
) -> CompileResult<TermId>
where
    F: FnOnce(&mut CompileContext, GenericId, &[TermId]) -> CompileResult<TermId> + 'static,
{
    ctx.create_generic(pattern, primitive_mode, location, move |ctx, gid| {
        let pattern = ctx.generic(gid).pattern.clone();
        let mut anonymouses: Vec<TermId> = Vec::with_capacity(pattern.len());
        for ty in pattern {
            // Pattern entry i may reference entries j < i.
            let ty = specialize(ctx, ty, &anonymouses, location)?;
            let anon = ctx.anonymous(ty, TermMode::Value, location)?;
            anonymouses.push(anon);
        }
        let body = body(ctx, gid, &anonymouses)?;
        parameterize(ctx, body, &anonymouses, location)
    })
}

/// The instantiated body of a generic instance: the generic's body with
/// the instance parameters substituted in.
pub fn instance_unwrap(
    ctx: &mut CompileContext,
    instance: TermId,
    location: SourceLocation,
) -> CompileResult<TermId> {
    let TermKind::TypeInstance {
        generic,
        parameters,
    } = ctx.kind(instance).clone()
    else {
        return Err(ctx.error(
            ErrorKind::TypeMismatch,
            location,
            "expected a generic type instance",
        ));
    };
    let TermKind::GenericType { generic: gid } = *ctx.kind(generic) else {
        return Err(ctx.error(
            ErrorKind::InternalInvariant,
            location,
            "type instance of a non-generic term",
        ));
    };
    let body = ctx.generic_body(gid)?;
    specialize(ctx, body, &parameters, location)
}

#[cfg(test)]
#[path = "tests/generics.rs"]
mod tests;
