//! Variant tree building.
//!
//! Walks a pointer-step sequence through a schema, expanding combinators
//! into alternative branches as it goes. The walk is a breadth-first
//! work-list over an explicit node arena; every round checks cancellation,
//! and a shared visited set threaded through the whole expansion guarantees
//! termination on cyclic reference graphs.

use std::collections::{HashSet, VecDeque};

use serde_json::Value;

use crate::cancel::CancellationToken;
use crate::error::ResolveError;
use crate::merge::merge;
use crate::object::{SchemaHandle, SchemaObject};
use crate::pointer::PointerStep;
use crate::resolver::{resolve_reference, ReferenceTarget, SchemaFileResolver};
use crate::step::{
    declared_or_inferred_types, resolve_array_step, resolve_property_step, step_type_compatible,
    StepResult,
};
use crate::types::{types_compatible, IfThenElse};

/// How a branch ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveState {
    Normal,
    /// The schema declared two or more of `anyOf`/`oneOf`/`allOf`; the most
    /// permissive operator was applied and the branch flagged for the
    /// consumer to surface.
    Conflict,
    /// A reference target was missing or not yet available.
    BrokenDefinition,
}

/// Options controlling one resolution.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    expand_terminal: bool,
    instance: Option<Value>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        ResolveOptions {
            expand_terminal: true,
            instance: None,
        }
    }
}

impl ResolveOptions {
    pub fn new() -> Self {
        ResolveOptions::default()
    }

    /// Whether combinators on the terminal step's schema are expanded.
    /// Defaults to true.
    pub fn expand_terminal(mut self, expand: bool) -> Self {
        self.expand_terminal = expand;
        self
    }

    /// Provide the instance document. With a concrete value available,
    /// `if`/`then`/`else` selects exactly one branch by testing the `if`
    /// schema against the value at the current position.
    pub fn with_instance(mut self, instance: Value) -> Self {
        self.instance = Some(instance);
        self
    }
}

/// Collaborators threaded through one resolution call.
pub struct ResolveContext<'a> {
    pub files: &'a dyn SchemaFileResolver,
    pub cancel: CancellationToken,
}

impl<'a> ResolveContext<'a> {
    pub fn new(files: &'a dyn SchemaFileResolver) -> Self {
        ResolveContext {
            files,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(files: &'a dyn SchemaFileResolver, cancel: CancellationToken) -> Self {
        ResolveContext { files, cancel }
    }
}

/// One resolved alternative at the target position.
#[derive(Debug, Clone)]
pub struct Variant {
    pub kind: VariantKind,
    /// Alternatives carrying distinct numbers are mutually exclusive; leaves
    /// sharing a number descend from the same `oneOf` alternative.
    pub exclusion_group: Option<usize>,
    /// Set when the branch came out of conflicting combinators.
    pub conflict: bool,
}

#[derive(Debug, Clone)]
pub enum VariantKind {
    Schema(SchemaHandle),
    /// Definite yes with no further constraint.
    Unconstrained,
}

impl Variant {
    pub fn schema(&self) -> Option<&SchemaHandle> {
        match &self.kind {
            VariantKind::Schema(schema) => Some(schema),
            VariantKind::Unconstrained => None,
        }
    }
}

/// The leaf set of one resolution.
#[derive(Debug, Default)]
pub struct ResolvedVariants {
    pub variants: Vec<Variant>,
    /// References that failed to resolve; their branches are excluded.
    pub broken_refs: Vec<String>,
}

impl ResolvedVariants {
    /// True when every branch resolved to a definite no.
    pub fn is_nothing(&self) -> bool {
        self.variants.is_empty() && self.broken_refs.is_empty()
    }
}

/// Resolve the variant set for `steps` under `root`.
pub fn resolve_variants(
    root: &SchemaObject,
    steps: &[PointerStep],
    options: &ResolveOptions,
    ctx: &ResolveContext<'_>,
) -> Result<ResolvedVariants, ResolveError> {
    let mut builder = TreeBuilder {
        arena: Vec::new(),
        queue: VecDeque::new(),
        next_group: 0,
        steps,
        options,
        ctx,
        broken_refs: Vec::new(),
    };
    builder.run(SchemaHandle::object(root.clone()))
}

struct Node {
    schema: SchemaHandle,
    consumed: usize,
    state: ResolveState,
    any: bool,
    nothing: bool,
    group: Option<usize>,
    children: Vec<usize>,
}

struct Expanded {
    schema: SchemaHandle,
    state: ResolveState,
}

struct Expansion {
    source: SchemaHandle,
    inclusive: Vec<Expanded>,
    /// One entry per mutually-exclusive alternative.
    exclusive: Vec<Vec<Expanded>>,
    broken: bool,
}

impl Expansion {
    fn empty(source: SchemaHandle) -> Self {
        Expansion {
            source,
            inclusive: Vec::new(),
            exclusive: Vec::new(),
            broken: false,
        }
    }

    fn single(schema: SchemaHandle) -> Self {
        Expansion {
            source: schema.clone(),
            inclusive: vec![Expanded {
                schema,
                state: ResolveState::Normal,
            }],
            exclusive: Vec::new(),
            broken: false,
        }
    }

    fn broken(source: SchemaHandle) -> Self {
        Expansion {
            source,
            inclusive: Vec::new(),
            exclusive: Vec::new(),
            broken: true,
        }
    }

    fn into_results(self) -> Vec<Expanded> {
        let mut results = self.inclusive;
        for alternative in self.exclusive {
            results.extend(alternative);
        }
        results
    }

    fn mark_conflict(&mut self) {
        for result in &mut self.inclusive {
            result.state = ResolveState::Conflict;
        }
        for alternative in &mut self.exclusive {
            for result in alternative {
                result.state = ResolveState::Conflict;
            }
        }
    }
}

type VisitedRefs = HashSet<(String, String)>;

struct TreeBuilder<'a> {
    arena: Vec<Node>,
    queue: VecDeque<usize>,
    next_group: usize,
    steps: &'a [PointerStep],
    options: &'a ResolveOptions,
    ctx: &'a ResolveContext<'a>,
    broken_refs: Vec<String>,
}

impl TreeBuilder<'_> {
    fn run(&mut self, root: SchemaHandle) -> Result<ResolvedVariants, ResolveError> {
        let root_index = self.arena.len();
        self.arena.push(Node {
            schema: root.clone(),
            consumed: 0,
            state: ResolveState::Normal,
            any: false,
            nothing: false,
            group: None,
            children: Vec::new(),
        });

        let expansion = self.expand(root, 0)?;
        self.attach_expansion(root_index, expansion, 0);

        while let Some(index) = self.queue.pop_front() {
            self.ctx.cancel.check()?;
            self.process(index)?;
        }

        Ok(self.collect())
    }

    fn process(&mut self, index: usize) -> Result<(), ResolveError> {
        let schema = self.arena[index].schema.clone();
        let consumed = self.arena[index].consumed;
        let node = &self.arena[index];
        if node.state != ResolveState::Normal || node.any || node.nothing {
            return Ok(());
        }
        if consumed >= self.steps.len() {
            return Ok(());
        }

        let step = &self.steps[consumed];
        if !step_type_compatible(step, &schema) {
            self.arena[index].nothing = true;
            return Ok(());
        }

        let result = match step {
            PointerStep::Property(name) => {
                resolve_property_step(name, &schema, &self.ctx.cancel)?
            }
            PointerStep::Index(position) => {
                resolve_array_step(*position, &schema, &self.ctx.cancel)?
            }
        };

        let next = consumed + 1;
        match result {
            StepResult::No => {
                self.arena[index].nothing = true;
            }
            StepResult::Any => {
                let group = self.arena[index].group;
                let child = self.push_child(
                    index,
                    Expanded {
                        schema,
                        state: ResolveState::Normal,
                    },
                    next,
                    group,
                );
                self.arena[child].any = true;
            }
            StepResult::Schema(child) => {
                if next < self.steps.len() || self.options.expand_terminal {
                    let expansion = self.expand(child, next)?;
                    self.attach_expansion(index, expansion, next);
                } else {
                    let group = self.arena[index].group;
                    self.push_child(
                        index,
                        Expanded {
                            schema: child,
                            state: ResolveState::Normal,
                        },
                        next,
                        group,
                    );
                }
            }
        }
        Ok(())
    }

    fn attach_expansion(&mut self, parent: usize, expansion: Expansion, consumed: usize) {
        let parent_group = self.arena[parent].group;
        if expansion.broken {
            self.push_child(
                parent,
                Expanded {
                    schema: expansion.source,
                    state: ResolveState::BrokenDefinition,
                },
                consumed,
                parent_group,
            );
            return;
        }

        let mut children = Vec::new();
        for result in expansion.inclusive {
            children.push(self.push_child(parent, result, consumed, parent_group));
        }
        for alternative in expansion.exclusive {
            let group = self.next_group;
            self.next_group += 1;
            for result in alternative {
                children.push(self.push_child(parent, result, consumed, Some(group)));
            }
        }

        if children.is_empty() {
            self.arena[parent].nothing = true;
            return;
        }
        for child in children {
            self.queue.push_back(child);
        }
    }

    fn push_child(
        &mut self,
        parent: usize,
        result: Expanded,
        consumed: usize,
        group: Option<usize>,
    ) -> usize {
        let any = result.state == ResolveState::Normal && result.schema.is_always_true();
        let index = self.arena.len();
        self.arena.push(Node {
            schema: result.schema,
            consumed,
            state: result.state,
            any,
            nothing: false,
            group,
            children: Vec::new(),
        });
        self.arena[parent].children.push(index);
        index
    }

    fn collect(&self) -> ResolvedVariants {
        let mut variants = Vec::new();
        for node in &self.arena {
            if !node.children.is_empty() || node.nothing {
                continue;
            }
            if node.state == ResolveState::BrokenDefinition {
                continue;
            }
            if node.any {
                variants.push(Variant {
                    kind: VariantKind::Unconstrained,
                    exclusion_group: node.group,
                    conflict: false,
                });
                continue;
            }
            variants.push(Variant {
                kind: VariantKind::Schema(node.schema.clone()),
                exclusion_group: node.group,
                conflict: node.state == ResolveState::Conflict,
            });
        }
        ResolvedVariants {
            variants,
            broken_refs: self.broken_refs.clone(),
        }
    }

    // --- combinator expansion ---

    fn expand(&mut self, schema: SchemaHandle, consumed: usize) -> Result<Expansion, ResolveError> {
        let mut visited = VisitedRefs::new();
        self.expand_inner(schema, consumed, &mut visited)
    }

    fn expand_inner(
        &mut self,
        schema: SchemaHandle,
        consumed: usize,
        visited: &mut VisitedRefs,
    ) -> Result<Expansion, ResolveError> {
        self.ctx.cancel.check()?;

        let running = match self.follow_references(schema, visited)? {
            Ok(running) => running,
            Err(broken) => return Ok(broken),
        };

        let any_of = running.any_of();
        let one_of = running.one_of();
        let all_of = running.all_of();
        let present = [any_of.is_some(), one_of.is_some(), all_of.is_some()]
            .iter()
            .filter(|found| **found)
            .count();
        let conflicted = present >= 2;
        if conflicted {
            log::warn!(
                "conflicting combinators at {}#{}",
                running.file_url(),
                running.pointer()
            );
        }

        // Most permissive present operator wins on conflict.
        let mut expansion = if let Some(members) = any_of {
            self.expand_any_of(running, members, consumed, visited)?
        } else if let Some(members) = one_of {
            self.expand_one_of(running, members, consumed, visited)?
        } else if let Some(members) = all_of {
            self.expand_all_of(running, members, consumed, visited)?
        } else if let Some(triple) = running.if_then_else() {
            self.expand_if_then_else(running, triple, consumed, visited)?
        } else {
            Expansion::single(running)
        };

        if conflicted {
            expansion.mark_conflict();
        }
        Ok(expansion)
    }

    /// Follow the `$ref` chain, merging each hop onto the running schema.
    ///
    /// A second visit to an already-seen target halts further following and
    /// keeps what has accumulated. A missing or still-pending target breaks
    /// the branch.
    fn follow_references(
        &mut self,
        schema: SchemaHandle,
        visited: &mut VisitedRefs,
    ) -> Result<Result<SchemaHandle, Expansion>, ResolveError> {
        let mut running = schema;
        loop {
            let Some(reference) = running.ref_value() else {
                return Ok(Ok(running));
            };
            self.ctx.cancel.check()?;

            let referrer = running.identity().clone();
            let dynamic = running.is_dynamic_ref();
            match resolve_reference(
                &reference,
                &referrer,
                dynamic,
                self.ctx.files,
                &self.ctx.cancel,
            )? {
                ReferenceTarget::Resolved(target) => {
                    let key = (target.file_url().to_string(), target.pointer().to_string());
                    if !visited.insert(key) {
                        log::debug!(
                            "reference cycle at {}#{}, halting expansion",
                            target.file_url(),
                            target.pointer()
                        );
                        return Ok(Ok(running));
                    }
                    let identity = target.clone();
                    running = merge(SchemaHandle::object(target), running, identity);
                }
                ReferenceTarget::NotFound => {
                    log::debug!(
                        "broken reference {:?} at {}#{}",
                        reference,
                        referrer.file_url(),
                        referrer.pointer()
                    );
                    self.broken_refs.push(reference);
                    return Ok(Err(Expansion::broken(running)));
                }
                ReferenceTarget::Pending => {
                    log::debug!("reference {:?} not yet available", reference);
                    self.broken_refs.push(reference);
                    return Ok(Err(Expansion::broken(running)));
                }
            }
        }
    }

    /// `anyOf`: every member's results union into one inclusive group.
    fn expand_any_of(
        &mut self,
        parent: SchemaHandle,
        members: Vec<SchemaHandle>,
        consumed: usize,
        visited: &mut VisitedRefs,
    ) -> Result<Expansion, ResolveError> {
        let mut expansion = Expansion::empty(parent);
        for member in members {
            self.ctx.cancel.check()?;
            if member.is_always_false() {
                continue;
            }
            let sub = self.expand_inner(member, consumed, visited)?;
            if sub.broken {
                continue;
            }
            expansion.inclusive.extend(sub.into_results());
        }
        Ok(expansion)
    }

    /// `oneOf`: each member becomes one exclusive alternative, AND-merged
    /// against the parent; results whose types exclude the parent's are
    /// discarded.
    fn expand_one_of(
        &mut self,
        parent: SchemaHandle,
        members: Vec<SchemaHandle>,
        consumed: usize,
        visited: &mut VisitedRefs,
    ) -> Result<Expansion, ResolveError> {
        let mut expansion = Expansion::empty(parent.clone());
        for member in members {
            self.ctx.cancel.check()?;
            if member.is_always_false() {
                continue;
            }
            let sub = self.expand_inner(member, consumed, visited)?;
            if sub.broken {
                continue;
            }
            let mut alternative = Vec::new();
            for result in sub.into_results() {
                if !self.types_allow_merge(&result.schema, &parent) {
                    continue;
                }
                let identity = result.schema.identity().clone();
                alternative.push(Expanded {
                    schema: merge(result.schema, parent.clone(), identity),
                    state: result.state,
                });
            }
            if !alternative.is_empty() {
                expansion.exclusive.push(alternative);
            }
        }
        Ok(expansion)
    }

    /// `allOf`: all members AND-merge into a single combined result.
    fn expand_all_of(
        &mut self,
        parent: SchemaHandle,
        members: Vec<SchemaHandle>,
        consumed: usize,
        visited: &mut VisitedRefs,
    ) -> Result<Expansion, ResolveError> {
        let mut combined = vec![Expanded {
            schema: parent.clone(),
            state: ResolveState::Normal,
        }];
        for member in members {
            self.ctx.cancel.check()?;
            if member.is_always_true() {
                continue;
            }
            let sub = self.expand_inner(member, consumed, visited)?;
            if sub.broken {
                continue;
            }
            let results = sub.into_results();
            if results.is_empty() {
                continue;
            }
            let mut next = Vec::new();
            for accumulated in &combined {
                for result in &results {
                    if !self.types_allow_merge(&result.schema, &accumulated.schema) {
                        continue;
                    }
                    let identity = result.schema.identity().clone();
                    let state = if result.state != ResolveState::Normal {
                        result.state
                    } else {
                        accumulated.state
                    };
                    next.push(Expanded {
                        schema: merge(
                            result.schema.clone(),
                            accumulated.schema.clone(),
                            identity,
                        ),
                        state,
                    });
                }
            }
            if !next.is_empty() {
                combined = next;
            }
        }
        let mut expansion = Expansion::empty(parent);
        expansion.inclusive = combined;
        Ok(expansion)
    }

    /// `if`/`then`/`else`: with no concrete value both branches fan out;
    /// with one, the `if` schema is tested against it and exactly one branch
    /// is selected. When neither branch yields a candidate the schema's own
    /// sibling constraints are preserved.
    fn expand_if_then_else(
        &mut self,
        parent: SchemaHandle,
        triple: IfThenElse,
        consumed: usize,
        visited: &mut VisitedRefs,
    ) -> Result<Expansion, ResolveError> {
        let value = self.instance_value_at(consumed);
        let branches: Vec<SchemaHandle> = match (&value, &triple.if_schema) {
            (Some(value), Some(if_schema)) => match if_condition_holds(if_schema, value) {
                Some(true) => triple.then_schema.into_iter().collect(),
                Some(false) => triple.else_schema.into_iter().collect(),
                None => both_branches(&triple),
            },
            _ => both_branches(&triple),
        };

        let mut expansion = Expansion::empty(parent.clone());
        for branch in branches {
            self.ctx.cancel.check()?;
            if branch.is_always_false() {
                continue;
            }
            let sub = self.expand_inner(branch, consumed, visited)?;
            if sub.broken {
                continue;
            }
            for result in sub.into_results() {
                if !self.types_allow_merge(&result.schema, &parent) {
                    continue;
                }
                let identity = result.schema.identity().clone();
                expansion.inclusive.push(Expanded {
                    schema: merge(result.schema, parent.clone(), identity),
                    state: result.state,
                });
            }
        }
        if expansion.inclusive.is_empty() && expansion.exclusive.is_empty() {
            expansion.inclusive.push(Expanded {
                schema: parent,
                state: ResolveState::Normal,
            });
        }
        Ok(expansion)
    }

    fn types_allow_merge(&self, a: &SchemaHandle, b: &SchemaHandle) -> bool {
        types_compatible(&declared_or_inferred_types(a), &declared_or_inferred_types(b))
    }

    /// Instance value at the position the first `consumed` steps describe.
    fn instance_value_at(&self, consumed: usize) -> Option<Value> {
        let mut value = self.options.instance.as_ref()?;
        for step in &self.steps[..consumed] {
            value = match step {
                PointerStep::Property(name) => value.get(name.as_str())?,
                PointerStep::Index(position) => value.get(*position)?,
            };
        }
        Some(value.clone())
    }
}

fn both_branches(triple: &IfThenElse) -> Vec<SchemaHandle> {
    triple
        .then_schema
        .clone()
        .into_iter()
        .chain(triple.else_schema.clone())
        .collect()
}

/// Test the `if` schema against a concrete value. `None` when the condition
/// cannot be evaluated (the branch fan-out then applies).
fn if_condition_holds(if_schema: &SchemaHandle, value: &Value) -> Option<bool> {
    let materialized = if_schema.materialize();
    match jsonschema::validator_for(&materialized) {
        Ok(validator) => Some(validator.is_valid(value)),
        Err(error) => {
            log::debug!("cannot evaluate if condition: {}", error);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::SchemaDocument;
    use crate::resolver::NoExternalSchemas;
    use serde_json::json;

    fn resolve(
        schema: Value,
        steps: &[PointerStep],
        options: &ResolveOptions,
    ) -> ResolvedVariants {
        let doc = SchemaDocument::new("file:///test.json", 1, schema);
        let ctx = ResolveContext::new(&NoExternalSchemas);
        resolve_variants(&doc.root(), steps, options, &ctx).unwrap()
    }

    #[test]
    fn plain_schema_resolves_to_itself() {
        let result = resolve(json!({ "type": "object" }), &[], &ResolveOptions::new());
        assert_eq!(result.variants.len(), 1);
        assert!(result.variants[0].schema().is_some());
        assert!(result.variants[0].exclusion_group.is_none());
    }

    #[test]
    fn one_of_yields_distinct_exclusion_groups() {
        let result = resolve(
            json!({ "oneOf": [{ "type": "string" }, { "type": "number" }] }),
            &[],
            &ResolveOptions::new(),
        );
        assert_eq!(result.variants.len(), 2);
        let groups: Vec<_> = result
            .variants
            .iter()
            .map(|v| v.exclusion_group.unwrap())
            .collect();
        assert_ne!(groups[0], groups[1]);
    }

    #[test]
    fn any_of_yields_one_inclusive_group() {
        let result = resolve(
            json!({ "anyOf": [{ "required": ["a"] }, { "required": ["b"] }] }),
            &[],
            &ResolveOptions::new(),
        );
        assert_eq!(result.variants.len(), 2);
        assert!(result.variants.iter().all(|v| v.exclusion_group.is_none()));
    }

    #[test]
    fn all_of_merges_into_single_schema() {
        let result = resolve(
            json!({ "allOf": [{ "minimum": 1 }, { "maximum": 10 }] }),
            &[],
            &ResolveOptions::new(),
        );
        assert_eq!(result.variants.len(), 1);
        let schema = result.variants[0].schema().unwrap();
        assert_eq!(schema.minimum(), Some(1.0));
        assert_eq!(schema.maximum(), Some(10.0));
    }

    #[test]
    fn property_step_narrows() {
        let result = resolve(
            json!({
                "properties": { "a": { "type": "string" } },
                "additionalProperties": false
            }),
            &[PointerStep::property("a")],
            &ResolveOptions::new(),
        );
        assert_eq!(result.variants.len(), 1);
        assert_eq!(
            result.variants[0].schema().unwrap().type_variants(),
            Some(vec![crate::types::SchemaType::String])
        );
    }

    #[test]
    fn closed_object_rejects_unknown_property() {
        let result = resolve(
            json!({
                "properties": { "a": { "type": "string" } },
                "additionalProperties": false
            }),
            &[PointerStep::property("b")],
            &ResolveOptions::new(),
        );
        assert!(result.variants.is_empty());
        assert!(result.is_nothing());
    }

    #[test]
    fn pattern_property_step() {
        let schema = json!({ "patternProperties": { "^x_": { "type": "boolean" } } });
        let result = resolve(
            schema.clone(),
            &[PointerStep::property("x_flag")],
            &ResolveOptions::new(),
        );
        assert_eq!(result.variants.len(), 1);
        assert_eq!(
            result.variants[0].schema().unwrap().type_variants(),
            Some(vec![crate::types::SchemaType::Boolean])
        );

        let result = resolve(
            schema,
            &[PointerStep::property("y")],
            &ResolveOptions::new(),
        );
        assert_eq!(result.variants.len(), 1);
        assert!(matches!(
            result.variants[0].kind,
            VariantKind::Unconstrained
        ));
    }

    #[test]
    fn self_referential_schema_terminates() {
        let result = resolve(
            json!({ "$ref": "#" }),
            &[
                PointerStep::property("a"),
                PointerStep::property("b"),
                PointerStep::index(0),
            ],
            &ResolveOptions::new(),
        );
        // Any fixed-depth path resolves without recursing forever.
        assert!(result.variants.len() <= 1);
    }

    #[test]
    fn ref_chain_merges_target_constraints() {
        let result = resolve(
            json!({
                "$defs": {
                    "base": { "type": "object", "required": ["id"] }
                },
                "properties": {
                    "entry": { "$ref": "#/$defs/base", "description": "entry point" }
                }
            }),
            &[PointerStep::property("entry")],
            &ResolveOptions::new(),
        );
        assert_eq!(result.variants.len(), 1);
        let schema = result.variants[0].schema().unwrap();
        assert_eq!(schema.required(), Some(vec!["id".to_string()]));
        assert_eq!(schema.description(), Some("entry point".to_string()));
    }

    #[test]
    fn broken_ref_marks_branch_and_siblings_continue() {
        let result = resolve(
            json!({
                "anyOf": [
                    { "$ref": "#/$defs/missing" },
                    { "type": "string" }
                ]
            }),
            &[],
            &ResolveOptions::new(),
        );
        assert_eq!(result.variants.len(), 1);
        assert_eq!(result.broken_refs, vec!["#/$defs/missing".to_string()]);
    }

    #[test]
    fn conflicting_combinators_use_most_permissive_and_flag() {
        let result = resolve(
            json!({
                "anyOf": [{ "required": ["a"] }, { "required": ["b"] }],
                "allOf": [{ "required": ["c"] }]
            }),
            &[],
            &ResolveOptions::new(),
        );
        // anyOf outranks allOf: two inclusive variants, both flagged
        assert_eq!(result.variants.len(), 2);
        assert!(result.variants.iter().all(|v| v.conflict));
    }

    #[test]
    fn if_then_else_fans_out_without_instance() {
        let result = resolve(
            json!({
                "if": { "properties": { "a": { "const": "x" } } },
                "then": { "required": ["b"] },
                "else": { "required": ["c"] }
            }),
            &[],
            &ResolveOptions::new(),
        );
        assert_eq!(result.variants.len(), 2);
        let required: Vec<_> = result
            .variants
            .iter()
            .map(|v| v.schema().unwrap().required().unwrap())
            .collect();
        assert!(required.contains(&vec!["b".to_string()]));
        assert!(required.contains(&vec!["c".to_string()]));
    }

    #[test]
    fn if_then_else_selects_branch_with_instance() {
        let schema = json!({
            "properties": { "a": { "type": "string" } },
            "if": { "properties": { "a": { "const": "x" } }, "required": ["a"] },
            "then": { "required": ["b"] },
            "else": { "required": ["c"] }
        });

        let matching = resolve(
            schema.clone(),
            &[],
            &ResolveOptions::new().with_instance(json!({ "a": "x" })),
        );
        assert_eq!(matching.variants.len(), 1);
        let resolved = matching.variants[0].schema().unwrap();
        assert_eq!(resolved.required(), Some(vec!["b".to_string()]));
        // Parent's own constraints come along with the branch
        assert!(resolved.property("a").is_some());

        let non_matching = resolve(
            schema,
            &[],
            &ResolveOptions::new().with_instance(json!({ "a": "y" })),
        );
        assert_eq!(non_matching.variants.len(), 1);
        assert_eq!(
            non_matching.variants[0].schema().unwrap().required(),
            Some(vec!["c".to_string()])
        );
    }

    #[test]
    fn if_without_branches_preserves_sibling_constraints() {
        let result = resolve(
            json!({
                "type": "object",
                "minProperties": 1,
                "if": { "required": ["a"] }
            }),
            &[],
            &ResolveOptions::new(),
        );
        assert_eq!(result.variants.len(), 1);
        assert_eq!(
            result.variants[0].schema().unwrap().min_properties(),
            Some(1)
        );
    }

    #[test]
    fn type_incompatible_step_is_nothing() {
        let result = resolve(
            json!({ "type": "string" }),
            &[PointerStep::property("a")],
            &ResolveOptions::new(),
        );
        assert!(result.is_nothing());
    }

    #[test]
    fn one_of_narrowing_through_property_step() {
        let result = resolve(
            json!({
                "oneOf": [
                    { "type": "object", "properties": { "kind": { "const": "a" } } },
                    { "type": "object", "properties": { "kind": { "const": "b" } } }
                ]
            }),
            &[PointerStep::property("kind")],
            &ResolveOptions::new(),
        );
        assert_eq!(result.variants.len(), 2);
        let groups: Vec<_> = result
            .variants
            .iter()
            .map(|v| v.exclusion_group.unwrap())
            .collect();
        assert_ne!(groups[0], groups[1]);
    }

    #[test]
    fn terminal_expansion_can_be_disabled() {
        let schema = json!({
            "properties": {
                "choice": { "oneOf": [{ "type": "string" }, { "type": "number" }] }
            }
        });
        let expanded = resolve(
            schema.clone(),
            &[PointerStep::property("choice")],
            &ResolveOptions::new(),
        );
        assert_eq!(expanded.variants.len(), 2);

        let unexpanded = resolve(
            schema,
            &[PointerStep::property("choice")],
            &ResolveOptions::new().expand_terminal(false),
        );
        assert_eq!(unexpanded.variants.len(), 1);
        assert!(unexpanded.variants[0].schema().unwrap().one_of().is_some());
    }

    #[test]
    fn idempotent_resolution() {
        let schema = json!({
            "properties": { "a": { "oneOf": [{ "type": "string" }, { "type": "null" }] } }
        });
        let doc = SchemaDocument::new("file:///test.json", 1, schema);
        let ctx = ResolveContext::new(&NoExternalSchemas);
        let steps = [PointerStep::property("a")];
        let options = ResolveOptions::new();
        let first = resolve_variants(&doc.root(), &steps, &options, &ctx).unwrap();
        let second = resolve_variants(&doc.root(), &steps, &options, &ctx).unwrap();
        assert_eq!(first.variants.len(), second.variants.len());
        for (a, b) in first.variants.iter().zip(second.variants.iter()) {
            match (&a.kind, &b.kind) {
                (VariantKind::Schema(x), VariantKind::Schema(y)) => assert_eq!(x, y),
                (VariantKind::Unconstrained, VariantKind::Unconstrained) => {}
                other => panic!("variant kinds diverge: {:?}", other),
            }
        }
    }

    #[test]
    fn cancellation_returns_no_partial_tree() {
        let doc = SchemaDocument::new(
            "file:///test.json",
            1,
            json!({ "properties": { "a": {} } }),
        );
        let token = CancellationToken::new();
        token.cancel();
        let ctx = ResolveContext::with_cancel(&NoExternalSchemas, token);
        let result = resolve_variants(
            &doc.root(),
            &[PointerStep::property("a")],
            &ResolveOptions::new(),
            &ctx,
        );
        assert!(matches!(result, Err(ResolveError::Cancelled)));
    }
}
