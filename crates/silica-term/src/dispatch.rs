//! Overload resolution.
//!
//! Interfaces and metadata types are both resolved by global pattern
//! matching: each overload site carries a parameter pattern, each value a
//! concrete instantiation pattern with wildcards, and lookup selects the
//! unique most-specific value whose pattern matches the parameters.
//!
//! Candidates come from the values attached to the site, from values
//! supplied by the caller's scope, and from the overloads attached to any
//! generic reachable through the parameters or their types.

use crate::binding::{match_terms, specialize};
use crate::context::CompileContext;
use crate::term::{OverloadPattern, StatementMode, TermId, TermKind};
use silica_common::{CompileResult, ErrorKind, SourceLocation};
use smallvec::SmallVec;

/// A successful overload lookup: the selected value and the wildcard
/// bindings inferred while matching it.
#[derive(Clone, Debug)]
pub struct OverloadLookup {
    pub value: TermId,
    pub wildcards: Vec<TermId>,
}

/// Match a value's pattern against concrete parameters.
///
/// Returns the inferred wildcards on success. Fails when lengths differ,
/// any position mismatches, or a wildcard remains unbound.
pub fn overload_pattern_match(
    ctx: &mut CompileContext,
    pattern: &OverloadPattern,
    parameters: &[TermId],
    location: SourceLocation,
) -> CompileResult<Option<Vec<TermId>>> {
    if pattern.pattern.len() != parameters.len() {
        return Ok(None);
    }
    let mut wildcards: Vec<Option<TermId>> = vec![None; pattern.n_wildcards as usize];
    for (&p, &v) in pattern.pattern.iter().zip(parameters) {
        if !match_terms(ctx, p, v, &mut wildcards, location)? {
            return Ok(None);
        }
    }
    let mut out = Vec::with_capacity(wildcards.len());
    for w in wildcards {
        match w {
            Some(value) => out.push(value),
            None => return Ok(None),
        }
    }
    Ok(Some(out))
}

/// The site an overload value belongs to, and its pattern.
fn overload_value_parts(ctx: &CompileContext, value: TermId) -> Option<(TermId, OverloadPattern)> {
    match ctx.kind(value) {
        TermKind::Implementation {
            interface,
            overload_pattern,
            ..
        } => Some((*interface, overload_pattern.clone())),
        TermKind::Metadata {
            metadata_type,
            overload_pattern,
            ..
        } => Some((*metadata_type, overload_pattern.clone())),
        _ => None,
    }
}

fn site_values(ctx: &CompileContext, site: TermId) -> Vec<TermId> {
    match ctx.kind(site) {
        TermKind::Interface { values, .. } | TermKind::MetadataType { values, .. } => {
            values.clone()
        }
        _ => Vec::new(),
    }
}

/// Strip wrappers that cannot carry overloads themselves: pointers,
/// existentials, and functional statements whose pure value is known.
fn unwrap_for_search(ctx: &CompileContext, term: TermId) -> TermId {
    let mut current = term;
    loop {
        current = match *ctx.kind(current) {
            TermKind::PointerType { target, .. } => target,
            TermKind::Exists { result, .. } => result,
            TermKind::GlobalStatement { value, mode, .. }
                if mode == StatementMode::Functional && ctx.info(value).is_pure() =>
            {
                value
            }
            TermKind::StatementRef { statement } => match *ctx.kind(statement) {
                TermKind::Statement { value, mode }
                    if mode == StatementMode::Functional && ctx.info(value).is_pure() =>
                {
                    value
                }
                _ => return current,
            },
            _ => return current,
        };
    }
}

/// Search a parameter term for overloads attached to generics it reaches.
fn search_term(
    ctx: &mut CompileContext,
    site: TermId,
    parameters: &[TermId],
    term: TermId,
    location: SourceLocation,
    results: &mut Vec<OverloadLookup>,
) -> CompileResult<()> {
    let unwrapped = unwrap_for_search(ctx, term);
    let TermKind::TypeInstance {
        generic,
        parameters: instance_parameters,
    } = ctx.kind(unwrapped).clone()
    else {
        return Ok(());
    };
    let TermKind::GenericType { generic: gid } = *ctx.kind(generic) else {
        return Ok(());
    };
    for value in ctx.generic(gid).overloads.clone() {
        let Some((value_site, pattern)) = overload_value_parts(ctx, value) else {
            continue;
        };
        if value_site != site {
            continue;
        }
        if let Some(wildcards) = overload_pattern_match(ctx, &pattern, parameters, location)? {
            results.push(OverloadLookup { value, wildcards });
        }
    }
    for p in instance_parameters {
        search_term(ctx, site, parameters, p, location, results)?;
    }
    Ok(())
}

/// Perform a generic overloaded-value search.
///
/// This is the shared implementation behind interface and metadata lookup.
/// `extra` supplies additional in-scope values (introduced implementations,
/// evaluation-context extensions); candidate order does not affect the
/// outcome.
pub fn overload_lookup(
    ctx: &mut CompileContext,
    site: TermId,
    parameters: &[TermId],
    location: SourceLocation,
    extra: &[TermId],
) -> CompileResult<OverloadLookup> {
    let mut results: Vec<OverloadLookup> = Vec::new();

    let mut consider = |ctx: &mut CompileContext, value: TermId, results: &mut Vec<OverloadLookup>| -> CompileResult<()> {
        let Some((value_site, pattern)) = overload_value_parts(ctx, value) else {
            return Ok(());
        };
        if value_site != site {
            return Ok(());
        }
        if let Some(wildcards) = overload_pattern_match(ctx, &pattern, parameters, location)? {
            results.push(OverloadLookup { value, wildcards });
        }
        Ok(())
    };

    for value in site_values(ctx, site) {
        consider(ctx, value, &mut results)?;
    }
    for &value in extra {
        consider(ctx, value, &mut results)?;
    }
    for &parameter in parameters {
        search_term(ctx, site, parameters, parameter, location, &mut results)?;
        if let Some(ty) = ctx.info(parameter).ty {
            search_term(ctx, site, parameters, ty, location, &mut results)?;
        }
    }

    // The same value can be reachable through several routes; a duplicate
    // must not make the lookup ambiguous with itself.
    let mut seen: SmallVec<[TermId; 8]> = SmallVec::new();
    results.retain(|r| {
        if seen.contains(&r.value) {
            false
        } else {
            seen.push(r.value);
            true
        }
    });

    if results.is_empty() {
        let shapes: Vec<String> = parameters
            .iter()
            .map(|&p| ctx.paths.display(ctx.location(p).logical))
            .collect();
        let site_name = ctx.paths.display(ctx.location(site).logical);
        return Err(ctx.error(
            ErrorKind::OverloadNotFound,
            location,
            format!("could not find overload for {site_name}({})", shapes.join(", ")),
        ));
    }

    tracing::trace!(
        candidates = results.len(),
        "selecting most specific overload"
    );

    // `a` is at most as specific as `b` when a's pattern matches b's.
    let mut dominates = |ctx: &mut CompileContext, a: &OverloadLookup, b: &OverloadLookup| -> CompileResult<bool> {
        let Some((_, a_pattern)) = overload_value_parts(ctx, a.value) else {
            return Ok(false);
        };
        let Some((_, b_pattern)) = overload_value_parts(ctx, b.value) else {
            return Ok(false);
        };
        Ok(overload_pattern_match(ctx, &a_pattern, &b_pattern.pattern, location)?.is_some())
    };

    // Single-elimination pass to find a candidate minimum.
    let mut best = 0usize;
    let mut ii = 1usize;
    while ii < results.len() {
        if dominates(ctx, &results[best], &results[ii])? {
            // best matches anything ii matches, so ii is more specific.
            best = ii;
            ii += 1;
        } else if dominates(ctx, &results[ii], &results[best])? {
            ii += 1;
        } else {
            // Incomparable; neither can be the minimum.
            best = ii + 1;
            ii += 2;
        }
    }

    let ambiguous = |ctx: &mut CompileContext, results: &[OverloadLookup]| {
        let mut err = silica_common::CompileError::new(
            ErrorKind::OverloadAmbiguous,
            location,
            "ambiguous overload",
        );
        for r in results {
            err = err.with_related(ctx.location(r.value), "ambiguous overload candidate");
        }
        ctx.reporter.emit(err)
    };

    if best >= results.len() {
        return Err(ambiguous(ctx, &results));
    }

    // Verify the chosen candidate really is strictly more specific than
    // every other; two candidates with interchangeable patterns are
    // ambiguous regardless of the order they were found in.
    for ii in 0..results.len() {
        if ii == best {
            continue;
        }
        let a = results[ii].clone();
        let b = results[best].clone();
        if !dominates(ctx, &a, &b)? || dominates(ctx, &b, &a)? {
            return Err(ambiguous(ctx, &results));
        }
    }

    Ok(results.swap_remove(best))
}

/// Look up a metadata value and specialise it over the matched wildcards.
pub fn metadata_lookup(
    ctx: &mut CompileContext,
    metadata_type: TermId,
    parameters: &[TermId],
    location: SourceLocation,
    extra: &[TermId],
) -> CompileResult<TermId> {
    let lookup = overload_lookup(ctx, metadata_type, parameters, location, extra)?;
    let TermKind::Metadata { value, .. } = *ctx.kind(lookup.value) else {
        return Err(ctx.error(
            ErrorKind::InternalInvariant,
            location,
            "metadata lookup selected a non-metadata value",
        ));
    };
    specialize(ctx, value, &lookup.wildcards, location)
}

/// Metadata lookup driven by an evaluation context, which may supply
/// additional in-scope values.
pub fn metadata_lookup_in(
    ctx: &mut CompileContext,
    metadata_type: TermId,
    evaluate_context: &dyn crate::callbacks::EvaluateContext,
    parameters: &[TermId],
    location: SourceLocation,
) -> CompileResult<TermId> {
    let mut extra = Vec::new();
    evaluate_context.overload_list(metadata_type, &mut extra);
    metadata_lookup(ctx, metadata_type, parameters, location, &extra)
}

/// Match parameters against one specific overload value, for callers that
/// already know which value applies.
pub fn overload_match(
    ctx: &mut CompileContext,
    value: TermId,
    parameters: &[TermId],
    location: SourceLocation,
) -> CompileResult<Vec<TermId>> {
    let Some((_, pattern)) = overload_value_parts(ctx, value) else {
        return Err(ctx.error(
            ErrorKind::InternalInvariant,
            location,
            "not an overload value",
        ));
    };
    match overload_pattern_match(ctx, &pattern, parameters, location)? {
        Some(wildcards) => Ok(wildcards),
        None => Err(ctx.error(
            ErrorKind::InternalInvariant,
            location,
            "failed to match overload pattern",
        )),
    }
}

#[cfg(test)]
#[path = "tests/dispatch.rs"]
mod tests;
