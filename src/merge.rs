//! Lazy merged schema views.
//!
//! [`merge`] composes two schema views into one without copying either:
//! every accessor on the merged view recomputes from the two inputs per
//! call, using one combination rule per keyword family.
//!
//! Rules, by family:
//! - relaxing booleans OR (`is_exclusive_*`, recursive anchors, `uniqueItems`)
//! - restricting booleans AND (an explicit `false` on either side of
//!   `additionalProperties`/`additionalItems` wins)
//! - scalars take the base when present, the other side otherwise; the base
//!   is the more specific, closer context
//! - combinator and positional-item lists concatenate, base first
//! - maps and `required` union, with same-key collisions merged recursively

use std::collections::HashMap;

use crate::object::{CompiledPattern, SchemaHandle, SchemaObject, SchemaView};
use crate::types::{IfThenElse, SchemaOrBool, SchemaType};
use serde_json::Value;

/// Compose `base` over `other`, identified by `point_to`.
///
/// Returns `base` unchanged when the two views are equal or when `base`
/// already incorporates `other` through earlier layering, so repeated
/// inheritance application down a chain never stacks redundant views.
pub fn merge(base: SchemaHandle, other: SchemaHandle, point_to: SchemaObject) -> SchemaHandle {
    if base == other {
        return base;
    }
    if already_layered(&base, &other) {
        return base;
    }
    SchemaHandle::merged(MergedSchema {
        base,
        other,
        point_to,
    })
}

/// Whether `view` already wraps `context`, directly or through nested merges.
fn already_layered(view: &SchemaHandle, context: &SchemaHandle) -> bool {
    match view.view() {
        SchemaView::Merged(m) => {
            m.base() == context
                || m.other() == context
                || already_layered(m.base(), context)
                || already_layered(m.other(), context)
        }
        SchemaView::Object(_) => false,
    }
}

/// True when `child` sits inside a combinator branch of `ancestor`.
fn within_combinator_branch(child: &SchemaObject, ancestor: &SchemaObject) -> bool {
    if child.file_url() != ancestor.file_url() {
        return false;
    }
    let child_pointer = child.pointer();
    let ancestor_pointer = ancestor.pointer();
    if !child_pointer.starts_with(ancestor_pointer) || child_pointer == ancestor_pointer {
        return false;
    }
    matches!(
        child_pointer
            .segments()
            .get(ancestor_pointer.segments().len())
            .map(String::as_str),
        Some("allOf" | "anyOf" | "oneOf" | "if" | "then" | "else")
    )
}

/// A composed view over `base` and `other`. Neither input is ever mutated;
/// the view holds only the two handles and its identity reference.
#[derive(Clone)]
pub struct MergedSchema {
    base: SchemaHandle,
    other: SchemaHandle,
    point_to: SchemaObject,
}

impl MergedSchema {
    pub fn base(&self) -> &SchemaHandle {
        &self.base
    }

    pub fn other(&self) -> &SchemaHandle {
        &self.other
    }

    pub fn point_to(&self) -> &SchemaObject {
        &self.point_to
    }

    /// Whether this view already represents inherited context: it wraps
    /// another merge, or one side lives inside a combinator branch of the
    /// other.
    pub fn is_inherited(&self) -> bool {
        self.base.is_merged()
            || self.other.is_merged()
            || within_combinator_branch(self.base.identity(), self.other.identity())
            || within_combinator_branch(self.other.identity(), self.base.identity())
    }

    // --- combination rules ---

    fn scalar<T>(&self, get: impl Fn(&SchemaHandle) -> Option<T>) -> Option<T> {
        get(&self.base).or_else(|| get(&self.other))
    }

    fn either(&self, get: impl Fn(&SchemaHandle) -> bool) -> bool {
        get(&self.base) || get(&self.other)
    }

    fn concat<T>(&self, get: impl Fn(&SchemaHandle) -> Option<Vec<T>>) -> Option<Vec<T>> {
        match (get(&self.base), get(&self.other)) {
            (Some(mut base), Some(other)) => {
                base.extend(other);
                Some(base)
            }
            (base, other) => base.or(other),
        }
    }

    fn union(
        &self,
        get: impl Fn(&SchemaHandle) -> Option<Vec<(String, SchemaHandle)>>,
    ) -> Option<Vec<(String, SchemaHandle)>> {
        match (get(&self.base), get(&self.other)) {
            (None, None) => None,
            (Some(entries), None) | (None, Some(entries)) => Some(entries),
            (Some(base), Some(other)) => {
                let mut out: Vec<(String, SchemaHandle)> = Vec::with_capacity(base.len());
                let mut index: HashMap<String, usize> = HashMap::new();
                for (name, schema) in base {
                    index.insert(name.clone(), out.len());
                    out.push((name, schema));
                }
                for (name, schema) in other {
                    match index.get(&name) {
                        Some(&slot) => {
                            // Same key on both sides: recursively merged
                            let existing = out[slot].1.clone();
                            let identity = existing.identity().clone();
                            out[slot].1 = merge(existing, schema, identity);
                        }
                        None => out.push((name, schema)),
                    }
                }
                Some(out)
            }
        }
    }

    /// An explicit `false` on either side wins; otherwise the first
    /// sub-schema (base first), then an explicit `true`.
    fn restrictive(
        &self,
        get: impl Fn(&SchemaHandle) -> Option<SchemaOrBool>,
    ) -> Option<SchemaOrBool> {
        let base = get(&self.base);
        let other = get(&self.other);
        if matches!(base, Some(SchemaOrBool::Bool(false)))
            || matches!(other, Some(SchemaOrBool::Bool(false)))
        {
            return Some(SchemaOrBool::Bool(false));
        }
        match (base, other) {
            (Some(SchemaOrBool::Schema(schema)), _) | (_, Some(SchemaOrBool::Schema(schema))) => {
                Some(SchemaOrBool::Schema(schema))
            }
            (Some(SchemaOrBool::Bool(true)), _) | (_, Some(SchemaOrBool::Bool(true))) => {
                Some(SchemaOrBool::Bool(true))
            }
            _ => None,
        }
    }

    // --- accessors, one per keyword ---

    pub(crate) fn type_variants(&self) -> Option<Vec<SchemaType>> {
        self.scalar(SchemaHandle::type_variants)
    }

    pub(crate) fn minimum(&self) -> Option<f64> {
        self.scalar(SchemaHandle::minimum)
    }

    pub(crate) fn maximum(&self) -> Option<f64> {
        self.scalar(SchemaHandle::maximum)
    }

    pub(crate) fn exclusive_minimum(&self) -> Option<f64> {
        self.scalar(SchemaHandle::exclusive_minimum)
    }

    pub(crate) fn exclusive_maximum(&self) -> Option<f64> {
        self.scalar(SchemaHandle::exclusive_maximum)
    }

    pub(crate) fn is_exclusive_minimum(&self) -> bool {
        self.either(SchemaHandle::is_exclusive_minimum)
    }

    pub(crate) fn is_exclusive_maximum(&self) -> bool {
        self.either(SchemaHandle::is_exclusive_maximum)
    }

    pub(crate) fn multiple_of(&self) -> Option<f64> {
        self.scalar(SchemaHandle::multiple_of)
    }

    pub(crate) fn pattern(&self) -> Option<String> {
        self.scalar(SchemaHandle::pattern)
    }

    pub(crate) fn min_length(&self) -> Option<u64> {
        self.scalar(SchemaHandle::min_length)
    }

    pub(crate) fn max_length(&self) -> Option<u64> {
        self.scalar(SchemaHandle::max_length)
    }

    pub(crate) fn format(&self) -> Option<String> {
        self.scalar(SchemaHandle::format)
    }

    pub(crate) fn title(&self) -> Option<String> {
        self.scalar(SchemaHandle::title)
    }

    pub(crate) fn description(&self) -> Option<String> {
        self.scalar(SchemaHandle::description)
    }

    pub(crate) fn default_value(&self) -> Option<Value> {
        self.scalar(SchemaHandle::default_value)
    }

    pub(crate) fn enum_values(&self) -> Option<Vec<Value>> {
        self.scalar(SchemaHandle::enum_values)
    }

    pub(crate) fn const_value(&self) -> Option<Value> {
        self.scalar(SchemaHandle::const_value)
    }

    pub(crate) fn required(&self) -> Option<Vec<String>> {
        match (self.base.required(), self.other.required()) {
            (None, None) => None,
            (Some(names), None) | (None, Some(names)) => Some(names),
            (Some(mut base), Some(other)) => {
                for name in other {
                    if !base.contains(&name) {
                        base.push(name);
                    }
                }
                Some(base)
            }
        }
    }

    pub(crate) fn min_properties(&self) -> Option<u64> {
        self.scalar(SchemaHandle::min_properties)
    }

    pub(crate) fn max_properties(&self) -> Option<u64> {
        self.scalar(SchemaHandle::max_properties)
    }

    pub(crate) fn properties(&self) -> Option<Vec<(String, SchemaHandle)>> {
        self.union(SchemaHandle::properties)
    }

    pub(crate) fn property(&self, name: &str) -> Option<SchemaHandle> {
        match (self.base.property(name), self.other.property(name)) {
            (Some(base), Some(other)) => {
                let identity = base.identity().clone();
                Some(merge(base, other, identity))
            }
            (base, other) => base.or(other),
        }
    }

    pub(crate) fn pattern_property_entries(&self) -> Vec<(CompiledPattern, SchemaHandle)> {
        let mut entries = self.base.pattern_property_entries();
        entries.extend(self.other.pattern_property_entries());
        entries
    }

    pub(crate) fn property_names_schema(&self) -> Option<SchemaHandle> {
        self.scalar(SchemaHandle::property_names_schema)
    }

    pub(crate) fn additional_properties(&self) -> Option<SchemaOrBool> {
        self.restrictive(SchemaHandle::additional_properties)
    }

    pub(crate) fn unevaluated_properties(&self) -> Option<SchemaOrBool> {
        self.restrictive(SchemaHandle::unevaluated_properties)
    }

    pub(crate) fn items_schema(&self) -> Option<SchemaOrBool> {
        self.restrictive(SchemaHandle::items_schema)
    }

    pub(crate) fn items_list(&self) -> Option<Vec<SchemaHandle>> {
        self.concat(SchemaHandle::items_list)
    }

    pub(crate) fn additional_items(&self) -> Option<SchemaOrBool> {
        self.restrictive(SchemaHandle::additional_items)
    }

    pub(crate) fn unevaluated_items(&self) -> Option<SchemaOrBool> {
        self.restrictive(SchemaHandle::unevaluated_items)
    }

    pub(crate) fn contains_schema(&self) -> Option<SchemaHandle> {
        self.scalar(SchemaHandle::contains_schema)
    }

    pub(crate) fn min_items(&self) -> Option<u64> {
        self.scalar(SchemaHandle::min_items)
    }

    pub(crate) fn max_items(&self) -> Option<u64> {
        self.scalar(SchemaHandle::max_items)
    }

    pub(crate) fn unique_items(&self) -> bool {
        self.either(SchemaHandle::unique_items)
    }

    pub(crate) fn all_of(&self) -> Option<Vec<SchemaHandle>> {
        self.concat(SchemaHandle::all_of)
    }

    pub(crate) fn any_of(&self) -> Option<Vec<SchemaHandle>> {
        self.concat(SchemaHandle::any_of)
    }

    pub(crate) fn one_of(&self) -> Option<Vec<SchemaHandle>> {
        self.concat(SchemaHandle::one_of)
    }

    pub(crate) fn not_schema(&self) -> Option<SchemaHandle> {
        self.scalar(SchemaHandle::not_schema)
    }

    pub(crate) fn if_then_else(&self) -> Option<IfThenElse> {
        self.scalar(SchemaHandle::if_then_else)
    }

    pub(crate) fn ref_value(&self) -> Option<String> {
        self.scalar(SchemaHandle::ref_value)
    }

    pub(crate) fn is_dynamic_ref(&self) -> bool {
        if self.base.ref_value().is_some() {
            self.base.is_dynamic_ref()
        } else {
            self.other.is_dynamic_ref()
        }
    }

    pub(crate) fn is_recursive_anchor(&self) -> bool {
        self.either(SchemaHandle::is_recursive_anchor)
    }

    pub(crate) fn definitions(&self) -> Option<Vec<(String, SchemaHandle)>> {
        self.union(SchemaHandle::definitions)
    }

    pub(crate) fn dependent_required(&self) -> Option<Vec<(String, Vec<String>)>> {
        match (
            self.base.dependent_required(),
            self.other.dependent_required(),
        ) {
            (None, None) => None,
            (Some(entries), None) | (None, Some(entries)) => Some(entries),
            (Some(mut base), Some(other)) => {
                for (name, names) in other {
                    match base.iter_mut().find(|(existing, _)| *existing == name) {
                        Some((_, existing_names)) => {
                            for extra in names {
                                if !existing_names.contains(&extra) {
                                    existing_names.push(extra);
                                }
                            }
                        }
                        None => base.push((name, names)),
                    }
                }
                Some(base)
            }
        }
    }

    pub(crate) fn dependent_schemas(&self) -> Option<Vec<(String, SchemaHandle)>> {
        self.union(SchemaHandle::dependent_schemas)
    }
}
