//! Pointer step resolution.
//!
//! Resolves one property or array-index step against a schema view, in the
//! priority order the keywords define. A step answers definitively no,
//! definitively yes with no constraint, or narrows to a child schema.

use crate::cancel::CancellationToken;
use crate::error::ResolveError;
use crate::object::SchemaHandle;
use crate::pointer::PointerStep;
use crate::types::{SchemaOrBool, SchemaType};

/// Outcome of resolving a single pointer step.
#[derive(Debug, Clone)]
pub enum StepResult {
    /// The step is definitely not allowed here.
    No,
    /// The step is allowed and unconstrained.
    Any,
    /// The step narrows to this schema.
    Schema(SchemaHandle),
}

/// Resolve a property-name step.
///
/// Priority: explicit `properties` entry, first matching `patternProperties`
/// regex, `additionalProperties` sub-schema, explicit
/// `additionalProperties: false`, `unevaluatedProperties`, unconstrained.
pub fn resolve_property_step(
    name: &str,
    parent: &SchemaHandle,
    cancel: &CancellationToken,
) -> Result<StepResult, ResolveError> {
    cancel.check()?;

    if let Some(child) = parent.property(name) {
        return Ok(StepResult::Schema(child));
    }
    if let Some(schema) = match_pattern_properties(name, parent, cancel)? {
        return Ok(StepResult::Schema(schema));
    }
    match parent.additional_properties() {
        Some(SchemaOrBool::Schema(schema)) => return Ok(StepResult::Schema(schema)),
        Some(SchemaOrBool::Bool(false)) => return Ok(StepResult::No),
        _ => {}
    }
    match parent.unevaluated_properties() {
        Some(SchemaOrBool::Schema(schema)) => return Ok(StepResult::Schema(schema)),
        Some(SchemaOrBool::Bool(false)) => return Ok(StepResult::No),
        _ => {}
    }
    Ok(StepResult::Any)
}

/// Resolve an array-index step.
///
/// Priority: single `items` schema, positional entry at `index`, a property
/// named by the stringified index (tuple-keyed dialects), `patternProperties`
/// against the stringified index, `additionalItems`, explicit `false` forms,
/// `unevaluatedItems`, unconstrained.
pub fn resolve_array_step(
    index: usize,
    parent: &SchemaHandle,
    cancel: &CancellationToken,
) -> Result<StepResult, ResolveError> {
    cancel.check()?;

    if let Some(SchemaOrBool::Schema(schema)) = parent.items_schema() {
        return Ok(StepResult::Schema(schema));
    }
    if let Some(list) = parent.items_list() {
        if let Some(schema) = list.into_iter().nth(index) {
            return Ok(StepResult::Schema(schema));
        }
    }
    let key = index.to_string();
    if let Some(child) = parent.property(&key) {
        return Ok(StepResult::Schema(child));
    }
    if let Some(schema) = match_pattern_properties(&key, parent, cancel)? {
        return Ok(StepResult::Schema(schema));
    }
    match parent.additional_items() {
        Some(SchemaOrBool::Schema(schema)) => return Ok(StepResult::Schema(schema)),
        Some(SchemaOrBool::Bool(false)) => return Ok(StepResult::No),
        _ => {}
    }
    // 2020-12 `items: false` closes positions beyond the prefix
    if matches!(parent.items_schema(), Some(SchemaOrBool::Bool(false))) {
        return Ok(StepResult::No);
    }
    match parent.unevaluated_items() {
        Some(SchemaOrBool::Schema(schema)) => return Ok(StepResult::Schema(schema)),
        Some(SchemaOrBool::Bool(false)) => return Ok(StepResult::No),
        _ => {}
    }
    Ok(StepResult::Any)
}

/// First `patternProperties` entry whose regex matches `name`.
///
/// `is_match` searches unanchored, which is the widened "contains" reading
/// of non-anchored patterns; anchored patterns still anchor. A pattern that
/// failed to compile never matches.
fn match_pattern_properties(
    name: &str,
    parent: &SchemaHandle,
    cancel: &CancellationToken,
) -> Result<Option<SchemaHandle>, ResolveError> {
    for (pattern, schema) in parent.pattern_property_entries() {
        cancel.check()?;
        if let Ok(regex) = &pattern.regex {
            if regex.is_match(name) {
                return Ok(Some(schema));
            }
        }
    }
    Ok(None)
}

/// Declared types, or a single inferred one when exactly one constraint
/// family is present and the others are entirely absent.
pub(crate) fn declared_or_inferred_types(schema: &SchemaHandle) -> Vec<SchemaType> {
    if let Some(declared) = schema.type_variants() {
        return declared;
    }
    let families = [
        (has_object_constraints(schema), SchemaType::Object),
        (has_numeric_constraints(schema), SchemaType::Number),
        (has_string_constraints(schema), SchemaType::String),
        (has_array_constraints(schema), SchemaType::Array),
    ];
    let mut present = families.iter().filter(|(found, _)| *found);
    match (present.next(), present.next()) {
        (Some((_, inferred)), None) => vec![*inferred],
        _ => Vec::new(),
    }
}

/// Whether the next step's target kind is compatible with the schema's
/// declared or inferred type.
pub(crate) fn step_type_compatible(step: &PointerStep, schema: &SchemaHandle) -> bool {
    let types = declared_or_inferred_types(schema);
    if types.is_empty() {
        return true;
    }
    let needed = match step {
        PointerStep::Property(_) => SchemaType::Object,
        PointerStep::Index(_) => SchemaType::Array,
    };
    types.contains(&needed)
}

fn has_object_constraints(schema: &SchemaHandle) -> bool {
    schema.properties().is_some()
        || schema.required().is_some()
        || schema.additional_properties().is_some()
        || !schema.pattern_property_entries().is_empty()
        || schema.property_names_schema().is_some()
        || schema.min_properties().is_some()
        || schema.max_properties().is_some()
        || schema.dependent_required().is_some()
        || schema.dependent_schemas().is_some()
}

fn has_numeric_constraints(schema: &SchemaHandle) -> bool {
    schema.minimum().is_some()
        || schema.maximum().is_some()
        || schema.exclusive_minimum().is_some()
        || schema.exclusive_maximum().is_some()
        || schema.is_exclusive_minimum()
        || schema.is_exclusive_maximum()
        || schema.multiple_of().is_some()
}

fn has_string_constraints(schema: &SchemaHandle) -> bool {
    schema.pattern().is_some() || schema.min_length().is_some() || schema.max_length().is_some()
}

fn has_array_constraints(schema: &SchemaHandle) -> bool {
    schema.items_schema().is_some()
        || schema.items_list().is_some()
        || schema.additional_items().is_some()
        || schema.contains_schema().is_some()
        || schema.min_items().is_some()
        || schema.max_items().is_some()
        || schema.unique_items()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{SchemaDocument, SchemaHandle};
    use serde_json::{json, Value};

    fn root_handle(value: Value) -> SchemaHandle {
        SchemaHandle::object(SchemaDocument::new("file:///test.json", 1, value).root())
    }

    fn cancel() -> CancellationToken {
        CancellationToken::new()
    }

    #[test]
    fn explicit_property_wins() {
        let parent = root_handle(json!({
            "properties": { "a": { "type": "string" } },
            "patternProperties": { "a": { "type": "number" } }
        }));
        let result = resolve_property_step("a", &parent, &cancel()).unwrap();
        match result {
            StepResult::Schema(schema) => {
                assert_eq!(schema.pointer().to_string(), "/properties/a")
            }
            other => panic!("expected schema, got {:?}", other),
        }
    }

    #[test]
    fn pattern_property_match() {
        let parent = root_handle(json!({
            "patternProperties": { "^x_": { "type": "boolean" } }
        }));
        let result = resolve_property_step("x_flag", &parent, &cancel()).unwrap();
        assert!(matches!(result, StepResult::Schema(_)));

        let result = resolve_property_step("y", &parent, &cancel()).unwrap();
        assert!(matches!(result, StepResult::Any));
    }

    #[test]
    fn non_anchored_pattern_matches_anywhere() {
        let parent = root_handle(json!({
            "patternProperties": { "flag": { "type": "boolean" } }
        }));
        let result = resolve_property_step("feature_flag_x", &parent, &cancel()).unwrap();
        assert!(matches!(result, StepResult::Schema(_)));
    }

    #[test]
    fn bad_pattern_never_matches() {
        let parent = root_handle(json!({
            "patternProperties": { "[oops": { "type": "boolean" } }
        }));
        let result = resolve_property_step("anything", &parent, &cancel()).unwrap();
        assert!(matches!(result, StepResult::Any));
    }

    #[test]
    fn additional_properties_schema_and_false() {
        let open = root_handle(json!({
            "additionalProperties": { "type": "string" }
        }));
        assert!(matches!(
            resolve_property_step("x", &open, &cancel()).unwrap(),
            StepResult::Schema(_)
        ));

        let closed = root_handle(json!({
            "properties": { "a": {} },
            "additionalProperties": false
        }));
        assert!(matches!(
            resolve_property_step("b", &closed, &cancel()).unwrap(),
            StepResult::No
        ));
    }

    #[test]
    fn unevaluated_properties_fallback() {
        let parent = root_handle(json!({
            "unevaluatedProperties": { "type": "number" }
        }));
        assert!(matches!(
            resolve_property_step("x", &parent, &cancel()).unwrap(),
            StepResult::Schema(_)
        ));
    }

    #[test]
    fn array_single_items_applies_to_every_index() {
        let parent = root_handle(json!({ "items": { "type": "number" } }));
        for index in [0, 5, 100] {
            assert!(matches!(
                resolve_array_step(index, &parent, &cancel()).unwrap(),
                StepResult::Schema(_)
            ));
        }
    }

    #[test]
    fn array_positional_items_in_and_out_of_range() {
        let parent = root_handle(json!({
            "items": [{ "type": "string" }, { "type": "number" }]
        }));
        match resolve_array_step(1, &parent, &cancel()).unwrap() {
            StepResult::Schema(schema) => assert_eq!(schema.pointer().to_string(), "/items/1"),
            other => panic!("expected schema, got {:?}", other),
        }
        assert!(matches!(
            resolve_array_step(2, &parent, &cancel()).unwrap(),
            StepResult::Any
        ));
    }

    #[test]
    fn array_additional_items_false_closes_tail() {
        let parent = root_handle(json!({
            "items": [{ "type": "string" }],
            "additionalItems": false
        }));
        assert!(matches!(
            resolve_array_step(0, &parent, &cancel()).unwrap(),
            StepResult::Schema(_)
        ));
        assert!(matches!(
            resolve_array_step(1, &parent, &cancel()).unwrap(),
            StepResult::No
        ));
    }

    #[test]
    fn array_index_via_stringified_property() {
        // Tuple-keyed dialect: positions spelled as property names
        let parent = root_handle(json!({
            "properties": { "0": { "type": "string" } }
        }));
        assert!(matches!(
            resolve_array_step(0, &parent, &cancel()).unwrap(),
            StepResult::Schema(_)
        ));
    }

    #[test]
    fn prefix_items_with_closed_rest() {
        let parent = root_handle(json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "prefixItems": [{ "type": "string" }],
            "items": false
        }));
        assert!(matches!(
            resolve_array_step(0, &parent, &cancel()).unwrap(),
            StepResult::Schema(_)
        ));
        assert!(matches!(
            resolve_array_step(1, &parent, &cancel()).unwrap(),
            StepResult::No
        ));
    }

    #[test]
    fn type_inference_single_family() {
        let object_like = root_handle(json!({ "required": ["a"] }));
        assert_eq!(
            declared_or_inferred_types(&object_like),
            vec![SchemaType::Object]
        );

        let numeric_like = root_handle(json!({ "minimum": 1 }));
        assert_eq!(
            declared_or_inferred_types(&numeric_like),
            vec![SchemaType::Number]
        );

        let mixed = root_handle(json!({ "minimum": 1, "minLength": 2 }));
        assert!(declared_or_inferred_types(&mixed).is_empty());

        let unconstrained = root_handle(json!({}));
        assert!(declared_or_inferred_types(&unconstrained).is_empty());
    }

    #[test]
    fn step_compatibility() {
        let string_schema = root_handle(json!({ "type": "string" }));
        assert!(!step_type_compatible(
            &PointerStep::property("a"),
            &string_schema
        ));
        assert!(!step_type_compatible(&PointerStep::index(0), &string_schema));

        let object_schema = root_handle(json!({ "type": "object" }));
        assert!(step_type_compatible(
            &PointerStep::property("a"),
            &object_schema
        ));

        let undeclared = root_handle(json!({}));
        assert!(step_type_compatible(&PointerStep::property("a"), &undeclared));
        assert!(step_type_compatible(&PointerStep::index(0), &undeclared));
    }

    #[test]
    fn idempotent_step_resolution() {
        let parent = root_handle(json!({
            "properties": { "a": { "type": "string" } }
        }));
        let first = resolve_property_step("a", &parent, &cancel()).unwrap();
        let second = resolve_property_step("a", &parent, &cancel()).unwrap();
        match (first, second) {
            (StepResult::Schema(a), StepResult::Schema(b)) => assert_eq!(a, b),
            other => panic!("expected equal schemas, got {:?}", other),
        }
    }
}
