//! Instance validation against a resolved leaf set.
//!
//! A reference consumer of the variant tree: resolve the alternatives at a
//! pointer path, then check the instance value there against them. Inclusive
//! leaves need at least one match; leaves carrying exclusion-group numbers
//! are mutually-exclusive alternatives, of which exactly one must match.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{SchemaError, ValidateError};
use crate::object::{SchemaHandle, SchemaObject};
use crate::pointer::{steps_to_pointer, PointerStep};
use crate::tree::{resolve_variants, ResolveContext, ResolveOptions, ResolvedVariants, VariantKind};

/// Validate the instance value at `steps` against the schema constraints
/// resolved there.
///
/// # Errors
///
/// Returns `ValidateError::Resolve` if resolution fails,
/// `ValidateError::MissingValue` if the instance has no value at the path,
/// or `ValidateError::Invalid` with per-path details otherwise.
pub fn validate_at_path(
    root: &SchemaObject,
    steps: &[PointerStep],
    instance: &Value,
    ctx: &ResolveContext<'_>,
) -> Result<(), ValidateError> {
    let pointer = steps_to_pointer(steps);
    let Some(value) = value_at(instance, steps) else {
        return Err(ValidateError::MissingValue { pointer });
    };

    let options = ResolveOptions::new().with_instance(instance.clone());
    let resolved = resolve_variants(root, steps, &options, ctx)?;
    check_value(&resolved, value, &pointer)
}

/// Check a concrete value against an already-resolved leaf set.
pub fn check_value(
    resolved: &ResolvedVariants,
    value: &Value,
    pointer: &str,
) -> Result<(), ValidateError> {
    if resolved.variants.is_empty() {
        return Err(ValidateError::Invalid {
            errors: vec![SchemaError {
                path: pointer.to_string(),
                message: "value is not allowed at this position".to_string(),
            }],
        });
    }

    let mut errors = Vec::new();
    let mut inclusive_present = false;
    let mut inclusive_matched = false;
    // exclusion group -> whether any leaf of that alternative matched
    let mut alternatives: BTreeMap<usize, bool> = BTreeMap::new();

    for variant in &resolved.variants {
        let matched = match &variant.kind {
            VariantKind::Unconstrained => true,
            VariantKind::Schema(schema) => schema_matches(schema, value),
        };
        match variant.exclusion_group {
            None => {
                inclusive_present = true;
                inclusive_matched |= matched;
            }
            Some(group) => {
                let entry = alternatives.entry(group).or_insert(false);
                *entry |= matched;
            }
        }
    }

    if inclusive_present && !inclusive_matched {
        errors.push(SchemaError {
            path: pointer.to_string(),
            message: "value matches none of the applicable schemas".to_string(),
        });
    }
    if !alternatives.is_empty() {
        let matched = alternatives.values().filter(|m| **m).count();
        if matched != 1 {
            errors.push(SchemaError {
                path: pointer.to_string(),
                message: format!(
                    "expected exactly one of {} alternatives to match, {} matched",
                    alternatives.len(),
                    matched
                ),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidateError::Invalid { errors })
    }
}

fn value_at<'a>(instance: &'a Value, steps: &[PointerStep]) -> Option<&'a Value> {
    let mut value = instance;
    for step in steps {
        value = match step {
            PointerStep::Property(name) => value.get(name.as_str())?,
            PointerStep::Index(index) => value.get(*index)?,
        };
    }
    Some(value)
}

fn schema_matches(schema: &SchemaHandle, value: &Value) -> bool {
    let materialized = schema.materialize();
    match jsonschema::validator_for(&materialized) {
        Ok(validator) => validator.is_valid(value),
        Err(error) => {
            // An unevaluable leaf cannot disprove the value
            log::debug!("cannot build validator for leaf schema: {}", error);
            true
        }
    }
}
