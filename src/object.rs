//! Schema documents and schema objects.
//!
//! A [`SchemaDocument`] owns one parsed schema file together with its derived
//! state: the detected draft, the anchor index, per-pointer compute-once
//! caches, and the reference-resolution memo. [`SchemaObject`] is a cheap
//! handle `(document, pointer)`; two objects are equal exactly when file URL
//! and pointer agree. [`SchemaHandle`] adds the merged-view case on top, so
//! the rest of the engine works against one accessor surface.
//!
//! Caches follow compute-once, idempotent semantics: concurrent callers may
//! redundantly compute the same value but always agree on it, so no mutual
//! exclusion is required beyond the map locks themselves.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use once_cell::sync::{Lazy, OnceCell};
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};

use crate::draft::SchemaDraft;
use crate::merge::MergedSchema;
use crate::node::RawNode;
use crate::pointer::JsonPointer;
use crate::types::{IfThenElse, SchemaOrBool, SchemaType};

/// Compile-size ceiling for `pattern`/`patternProperties` regexes. The regex
/// engine is linear-time at match time, so bounding compilation bounds the
/// whole matching cost.
const PATTERN_SIZE_LIMIT: usize = 1 << 20;

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Process-wide cache of parsed schema documents keyed by URL.
///
/// A lookup only hits when the modification stamp matches; registering a
/// document with a newer stamp replaces the stale entry.
#[derive(Default)]
pub struct SchemaRegistry {
    documents: RwLock<HashMap<String, Arc<SchemaDocument>>>,
}

static GLOBAL_REGISTRY: Lazy<SchemaRegistry> = Lazy::new(SchemaRegistry::default);

impl SchemaRegistry {
    pub fn new() -> Self {
        SchemaRegistry::default()
    }

    /// The shared process-wide registry.
    pub fn global() -> &'static SchemaRegistry {
        &GLOBAL_REGISTRY
    }

    pub fn get(&self, url: &str, stamp: u64) -> Option<Arc<SchemaDocument>> {
        let documents = read(&self.documents);
        documents
            .get(url)
            .filter(|doc| doc.stamp() == stamp)
            .map(Arc::clone)
    }

    /// Register a document, evicting any entry for the same URL.
    pub fn insert(&self, document: Arc<SchemaDocument>) {
        let mut documents = write(&self.documents);
        documents.insert(document.url().to_string(), document);
    }

    /// Cached document for `(url, stamp)`, parsing through `load` on a miss
    /// or a stamp change.
    pub fn get_or_insert_with<E>(
        &self,
        url: &str,
        stamp: u64,
        load: impl FnOnce() -> Result<Value, E>,
    ) -> Result<Arc<SchemaDocument>, E> {
        if let Some(document) = self.get(url, stamp) {
            return Ok(document);
        }
        let document = SchemaDocument::new(url, stamp, load()?);
        self.insert(Arc::clone(&document));
        Ok(document)
    }
}

/// Memoized outcome of one `(referencing pointer, ref)` resolution.
///
/// The "not yet available" case is deliberately absent: a pending remote
/// fetch must be re-resolved on the next call.
#[derive(Clone)]
pub(crate) enum RefOutcome {
    Resolved {
        doc: Arc<SchemaDocument>,
        pointer: JsonPointer,
    },
    NotFound,
}

/// One compiled `patternProperties` entry. A pattern that fails to compile
/// keeps its error text and never matches.
#[derive(Clone)]
pub(crate) struct CompiledPattern {
    pub source: String,
    pub regex: Result<Regex, String>,
    pub pointer: JsonPointer,
}

/// Per-pointer derived values, computed at most once each.
#[derive(Default)]
pub(crate) struct NodeCache {
    types: OnceCell<Option<Vec<SchemaType>>>,
    patterns: OnceCell<Arc<Vec<CompiledPattern>>>,
    all_of: OnceCell<Option<Vec<JsonPointer>>>,
    any_of: OnceCell<Option<Vec<JsonPointer>>>,
    one_of: OnceCell<Option<Vec<JsonPointer>>>,
}

/// A parsed schema file plus everything derived from it.
pub struct SchemaDocument {
    url: String,
    stamp: u64,
    draft: SchemaDraft,
    data: Value,
    anchors: OnceCell<HashMap<String, JsonPointer>>,
    caches: RwLock<HashMap<JsonPointer, Arc<NodeCache>>>,
    ref_memo: RwLock<HashMap<(JsonPointer, String), RefOutcome>>,
}

impl fmt::Debug for SchemaDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaDocument")
            .field("url", &self.url)
            .field("stamp", &self.stamp)
            .field("draft", &self.draft)
            .finish()
    }
}

impl SchemaDocument {
    pub fn new(url: impl Into<String>, stamp: u64, data: Value) -> Arc<Self> {
        let draft = SchemaDraft::detect(data.get("$schema").and_then(Value::as_str));
        Arc::new(SchemaDocument {
            url: url.into(),
            stamp,
            draft,
            data,
            anchors: OnceCell::new(),
            caches: RwLock::new(HashMap::new()),
            ref_memo: RwLock::new(HashMap::new()),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn stamp(&self) -> u64 {
        self.stamp
    }

    pub fn draft(&self) -> SchemaDraft {
        self.draft
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    /// The root schema object of this document.
    pub fn root(self: &Arc<Self>) -> SchemaObject {
        SchemaObject {
            doc: Arc::clone(self),
            pointer: JsonPointer::root(),
            resolved_from: None,
        }
    }

    /// Schema object at an absolute pointer, if the node exists.
    pub fn object_at(self: &Arc<Self>, pointer: JsonPointer) -> Option<SchemaObject> {
        self.node_at(&pointer)?;
        Some(SchemaObject {
            doc: Arc::clone(self),
            pointer,
            resolved_from: None,
        })
    }

    pub(crate) fn node_at(&self, pointer: &JsonPointer) -> Option<&Value> {
        let mut current = &self.data;
        for segment in pointer.segments() {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub(crate) fn cache_for(&self, pointer: &JsonPointer) -> Arc<NodeCache> {
        if let Some(cache) = read(&self.caches).get(pointer) {
            return Arc::clone(cache);
        }
        let mut caches = write(&self.caches);
        Arc::clone(caches.entry(pointer.clone()).or_default())
    }

    /// Plain-name fragment index: `$anchor`, `$dynamicAnchor`, and the legacy
    /// `$id`/`id: "#name"` form.
    pub(crate) fn anchor_index(&self) -> &HashMap<String, JsonPointer> {
        self.anchors.get_or_init(|| {
            let mut anchors = HashMap::new();
            collect_anchors(&self.data, self.draft, JsonPointer::root(), &mut anchors);
            anchors
        })
    }

    pub(crate) fn memo_get(&self, key: &(JsonPointer, String)) -> Option<RefOutcome> {
        read(&self.ref_memo).get(key).cloned()
    }

    pub(crate) fn memo_put(&self, key: (JsonPointer, String), outcome: RefOutcome) {
        write(&self.ref_memo).insert(key, outcome);
    }
}

fn collect_anchors(
    value: &Value,
    draft: SchemaDraft,
    pointer: JsonPointer,
    anchors: &mut HashMap<String, JsonPointer>,
) {
    match value {
        Value::Object(map) => {
            for key in ["$anchor", "$dynamicAnchor"] {
                if let Some(name) = map.get(key).and_then(Value::as_str) {
                    anchors.entry(name.to_string()).or_insert(pointer.clone());
                }
            }
            if let Some(id) = map.get(draft.id_keyword()).and_then(Value::as_str) {
                if let Some(name) = id.strip_prefix('#') {
                    if !name.is_empty() && !name.starts_with('/') {
                        anchors.entry(name.to_string()).or_insert(pointer.clone());
                    }
                }
            }
            for (key, child) in map {
                collect_anchors(child, draft, pointer.child(key.clone()), anchors);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                collect_anchors(child, draft, pointer.child(index.to_string()), anchors);
            }
        }
        _ => {}
    }
}

/// A schema location within a document.
///
/// Cloning is cheap; identity is `(fileUrl, pointer)`. `resolved_from` is set
/// once at construction when the object was reached through a `$ref` and is
/// excluded from equality.
#[derive(Clone)]
pub struct SchemaObject {
    pub(crate) doc: Arc<SchemaDocument>,
    pub(crate) pointer: JsonPointer,
    pub(crate) resolved_from: Option<Arc<SchemaObject>>,
}

impl PartialEq for SchemaObject {
    fn eq(&self, other: &Self) -> bool {
        self.file_url() == other.file_url() && self.pointer == other.pointer
    }
}

impl Eq for SchemaObject {}

impl fmt::Debug for SchemaObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SchemaObject({}#{})", self.file_url(), self.pointer)
    }
}

impl SchemaObject {
    pub fn file_url(&self) -> &str {
        self.doc.url()
    }

    pub fn pointer(&self) -> &JsonPointer {
        &self.pointer
    }

    pub fn document(&self) -> &Arc<SchemaDocument> {
        &self.doc
    }

    pub fn draft(&self) -> SchemaDraft {
        self.doc.draft()
    }

    /// The object this one was resolved from, when reached through a `$ref`.
    pub fn resolved_from(&self) -> Option<&SchemaObject> {
        self.resolved_from.as_deref()
    }

    pub(crate) fn with_resolved_from(mut self, referrer: SchemaObject) -> Self {
        self.resolved_from = Some(Arc::new(referrer));
        self
    }

    fn node(&self) -> Option<&Value> {
        self.doc.node_at(&self.pointer)
    }

    fn raw(&self) -> Option<RawNode<'_>> {
        self.node().map(RawNode)
    }

    fn cache(&self) -> Arc<NodeCache> {
        self.doc.cache_for(&self.pointer)
    }

    fn descend(&self, segments: &[&str]) -> SchemaObject {
        let mut pointer = self.pointer.clone();
        for segment in segments {
            pointer = pointer.child(*segment);
        }
        SchemaObject {
            doc: Arc::clone(&self.doc),
            pointer,
            resolved_from: None,
        }
    }

    /// `Some(b)` when this node is a boolean schema.
    pub fn as_bool_schema(&self) -> Option<bool> {
        self.node().and_then(Value::as_bool)
    }

    // --- type family ---

    pub fn type_variants(&self) -> Option<Vec<SchemaType>> {
        let cache = self.cache();
        cache
            .types
            .get_or_init(|| {
                let declared = self.node()?.get("type")?;
                match declared {
                    Value::String(s) => SchemaType::parse(s).map(|t| vec![t]),
                    Value::Array(items) => Some(
                        items
                            .iter()
                            .filter_map(|v| v.as_str().and_then(SchemaType::parse))
                            .collect(),
                    ),
                    _ => None,
                }
            })
            .clone()
    }

    // --- numeric family ---

    pub fn minimum(&self) -> Option<f64> {
        self.raw()?.number("minimum")
    }

    pub fn maximum(&self) -> Option<f64> {
        self.raw()?.number("maximum")
    }

    /// Numeric `exclusiveMinimum` (draft 6+ form).
    pub fn exclusive_minimum(&self) -> Option<f64> {
        if self.draft().exclusive_bounds_are_booleans() {
            return None;
        }
        self.raw()?.number("exclusiveMinimum")
    }

    pub fn exclusive_maximum(&self) -> Option<f64> {
        if self.draft().exclusive_bounds_are_booleans() {
            return None;
        }
        self.raw()?.number("exclusiveMaximum")
    }

    /// Draft-4 boolean `exclusiveMinimum` qualifying `minimum`.
    pub fn is_exclusive_minimum(&self) -> bool {
        self.draft().exclusive_bounds_are_booleans()
            && self
                .raw()
                .and_then(|r| r.boolean("exclusiveMinimum"))
                .unwrap_or(false)
    }

    pub fn is_exclusive_maximum(&self) -> bool {
        self.draft().exclusive_bounds_are_booleans()
            && self
                .raw()
                .and_then(|r| r.boolean("exclusiveMaximum"))
                .unwrap_or(false)
    }

    pub fn multiple_of(&self) -> Option<f64> {
        self.raw()?.number("multipleOf")
    }

    // --- string family ---

    pub fn pattern(&self) -> Option<String> {
        self.raw()?.string("pattern").map(String::from)
    }

    pub fn min_length(&self) -> Option<u64> {
        self.raw()?.unsigned("minLength")
    }

    pub fn max_length(&self) -> Option<u64> {
        self.raw()?.unsigned("maxLength")
    }

    pub fn format(&self) -> Option<String> {
        self.raw()?.string("format").map(String::from)
    }

    // --- object family ---

    pub fn properties(&self) -> Option<Vec<(String, SchemaObject)>> {
        let raw = self.raw()?;
        let entries = raw.entries("properties")?;
        let names: Vec<String> = entries.map(|(name, _)| name.clone()).collect();
        Some(
            names
                .into_iter()
                .map(|name| {
                    let child = self.descend(&["properties", &name]);
                    (name, child)
                })
                .collect(),
        )
    }

    pub fn property(&self, name: &str) -> Option<SchemaObject> {
        let raw = self.raw()?;
        if raw.child("properties")?.has(name) {
            Some(self.descend(&["properties", name]))
        } else {
            None
        }
    }

    pub fn required(&self) -> Option<Vec<String>> {
        self.raw()?.string_elements("required")
    }

    pub fn min_properties(&self) -> Option<u64> {
        self.raw()?.unsigned("minProperties")
    }

    pub fn max_properties(&self) -> Option<u64> {
        self.raw()?.unsigned("maxProperties")
    }

    pub fn property_names_schema(&self) -> Option<SchemaObject> {
        if self.raw()?.has("propertyNames") {
            Some(self.descend(&["propertyNames"]))
        } else {
            None
        }
    }

    pub(crate) fn pattern_properties(&self) -> Option<Arc<Vec<CompiledPattern>>> {
        if !self.raw()?.has("patternProperties") {
            return None;
        }
        let cache = self.cache();
        let compiled = cache.patterns.get_or_init(|| {
            let mut patterns = Vec::new();
            if let Some(entries) = self.raw().and_then(|r| r.entries("patternProperties")) {
                for (source, _) in entries {
                    patterns.push(CompiledPattern {
                        source: source.clone(),
                        regex: RegexBuilder::new(source)
                            .size_limit(PATTERN_SIZE_LIMIT)
                            .build()
                            .map_err(|e| e.to_string()),
                        pointer: self.pointer.child("patternProperties").child(source.clone()),
                    });
                }
            }
            Arc::new(patterns)
        });
        Some(Arc::clone(compiled))
    }

    fn schema_or_bool(&self, key: &str) -> Option<SchemaOrBool> {
        let raw = self.raw()?;
        match raw.child(key)?.value() {
            Value::Bool(b) => Some(SchemaOrBool::Bool(*b)),
            Value::Object(_) => Some(SchemaOrBool::Schema(SchemaHandle::object(
                self.descend(&[key]),
            ))),
            _ => None,
        }
    }

    pub fn additional_properties(&self) -> Option<SchemaOrBool> {
        self.schema_or_bool("additionalProperties")
    }

    pub fn unevaluated_properties(&self) -> Option<SchemaOrBool> {
        if !self.draft().supports_unevaluated() {
            return None;
        }
        self.schema_or_bool("unevaluatedProperties")
    }

    // --- array family ---

    /// The single-schema form of `items`. The array form is positional and
    /// reported by [`items_list`](Self::items_list) instead.
    pub fn items_schema(&self) -> Option<SchemaOrBool> {
        let raw = self.raw()?;
        match raw.child("items")?.value() {
            Value::Bool(b) => Some(SchemaOrBool::Bool(*b)),
            Value::Object(_) => Some(SchemaOrBool::Schema(SchemaHandle::object(
                self.descend(&["items"]),
            ))),
            _ => None,
        }
    }

    /// Positional item schemas: `prefixItems`, or the legacy array form of
    /// `items` which older documents use in any draft.
    pub fn items_list(&self) -> Option<Vec<SchemaObject>> {
        let raw = self.raw()?;
        let preferred = self.draft().positional_items_keyword();
        let keys: &[&str] = if preferred == "items" {
            &["items"]
        } else {
            &[preferred, "items"]
        };
        for key in keys.iter().copied() {
            if let Some(items) = raw.elements(key) {
                return Some(
                    (0..items.len())
                        .map(|i| self.descend(&[key, &i.to_string()]))
                        .collect(),
                );
            }
        }
        None
    }

    pub fn additional_items(&self) -> Option<SchemaOrBool> {
        self.schema_or_bool("additionalItems")
    }

    pub fn unevaluated_items(&self) -> Option<SchemaOrBool> {
        if !self.draft().supports_unevaluated() {
            return None;
        }
        self.schema_or_bool("unevaluatedItems")
    }

    pub fn contains_schema(&self) -> Option<SchemaObject> {
        if self.raw()?.has("contains") {
            Some(self.descend(&["contains"]))
        } else {
            None
        }
    }

    pub fn min_items(&self) -> Option<u64> {
        self.raw()?.unsigned("minItems")
    }

    pub fn max_items(&self) -> Option<u64> {
        self.raw()?.unsigned("maxItems")
    }

    pub fn unique_items(&self) -> bool {
        self.raw()
            .and_then(|r| r.boolean("uniqueItems"))
            .unwrap_or(false)
    }

    // --- combinators ---

    fn combinator_pointers(
        &self,
        key: &str,
        cell: impl Fn(&NodeCache) -> &OnceCell<Option<Vec<JsonPointer>>>,
    ) -> Option<Vec<SchemaObject>> {
        let cache = self.cache();
        let pointers = cell(&cache)
            .get_or_init(|| {
                let items = self.raw()?.elements(key)?;
                Some(
                    (0..items.len())
                        .map(|i| self.pointer.child(key).child(i.to_string()))
                        .collect(),
                )
            })
            .clone()?;
        Some(
            pointers
                .into_iter()
                .map(|pointer| SchemaObject {
                    doc: Arc::clone(&self.doc),
                    pointer,
                    resolved_from: None,
                })
                .collect(),
        )
    }

    pub fn all_of(&self) -> Option<Vec<SchemaObject>> {
        self.combinator_pointers("allOf", |c| &c.all_of)
    }

    pub fn any_of(&self) -> Option<Vec<SchemaObject>> {
        self.combinator_pointers("anyOf", |c| &c.any_of)
    }

    pub fn one_of(&self) -> Option<Vec<SchemaObject>> {
        self.combinator_pointers("oneOf", |c| &c.one_of)
    }

    pub fn not_schema(&self) -> Option<SchemaObject> {
        if self.raw()?.has("not") {
            Some(self.descend(&["not"]))
        } else {
            None
        }
    }

    pub fn if_then_else(&self) -> Option<IfThenElse> {
        if !self.draft().supports_if_then_else() {
            return None;
        }
        let raw = self.raw()?;
        if !raw.has("if") && !raw.has("then") && !raw.has("else") {
            return None;
        }
        let leg = |key: &str| {
            if raw.has(key) {
                Some(SchemaHandle::object(self.descend(&[key])))
            } else {
                None
            }
        };
        Some(IfThenElse {
            if_schema: leg("if"),
            then_schema: leg("then"),
            else_schema: leg("else"),
        })
    }

    // --- references ---

    /// The `$ref` value, or the draft's dynamic reference when `$ref` is
    /// absent.
    pub fn ref_value(&self) -> Option<String> {
        let raw = self.raw()?;
        if let Some(reference) = raw.string("$ref") {
            return Some(reference.to_string());
        }
        let key = self.draft().recursive_ref_keyword()?;
        raw.string(key).map(String::from)
    }

    /// True when [`ref_value`](Self::ref_value) came from the dynamic form.
    pub fn is_dynamic_ref(&self) -> bool {
        let Some(raw) = self.raw() else { return false };
        if raw.has("$ref") {
            return false;
        }
        self.draft()
            .recursive_ref_keyword()
            .is_some_and(|key| raw.has(key))
    }

    /// True when this schema declares itself a recursive anchor.
    pub fn is_recursive_anchor(&self) -> bool {
        let Some(raw) = self.raw() else { return false };
        match self.draft().recursive_anchor_keyword() {
            Some("$recursiveAnchor") => raw.boolean("$recursiveAnchor").unwrap_or(false),
            Some(key) => raw.has(key),
            None => false,
        }
    }

    // --- metadata ---

    pub fn title(&self) -> Option<String> {
        self.raw()?.string("title").map(String::from)
    }

    pub fn description(&self) -> Option<String> {
        self.raw()?.string("description").map(String::from)
    }

    pub fn default_value(&self) -> Option<Value> {
        self.node()?.get("default").cloned()
    }

    pub fn enum_values(&self) -> Option<Vec<Value>> {
        self.raw()?.elements("enum").map(<[Value]>::to_vec)
    }

    pub fn const_value(&self) -> Option<Value> {
        self.node()?.get("const").cloned()
    }

    // --- definitions & dependencies ---

    pub fn definitions(&self) -> Option<Vec<(String, SchemaObject)>> {
        let raw = self.raw()?;
        for key in self.draft().definitions_keywords().iter().copied() {
            if let Some(entries) = raw.entries(key) {
                let names: Vec<String> = entries.map(|(name, _)| name.clone()).collect();
                return Some(
                    names
                        .into_iter()
                        .map(|name| {
                            let child = self.descend(&[key, &name]);
                            (name, child)
                        })
                        .collect(),
                );
            }
        }
        None
    }

    pub fn dependent_required(&self) -> Option<Vec<(String, Vec<String>)>> {
        let raw = self.raw()?;
        let mut out = Vec::new();
        if self.draft().supports_dependent_keywords() {
            if let Some(entries) = raw.entries("dependentRequired") {
                for (name, value) in entries {
                    if let Some(items) = value.as_array() {
                        let names = items
                            .iter()
                            .filter_map(|v| v.as_str().map(String::from))
                            .collect();
                        out.push((name.clone(), names));
                    }
                }
            }
        }
        if let Some(entries) = raw.entries("dependencies") {
            for (name, value) in entries {
                if let Some(items) = value.as_array() {
                    let names = items
                        .iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect();
                    out.push((name.clone(), names));
                }
            }
        }
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }

    pub fn dependent_schemas(&self) -> Option<Vec<(String, SchemaObject)>> {
        let raw = self.raw()?;
        let mut out = Vec::new();
        if self.draft().supports_dependent_keywords() {
            if let Some(entries) = raw.entries("dependentSchemas") {
                for (name, _) in entries {
                    out.push((name.clone(), self.descend(&["dependentSchemas", name])));
                }
            }
        }
        if let Some(entries) = raw.entries("dependencies") {
            for (name, value) in entries {
                if value.is_object() {
                    out.push((name.clone(), self.descend(&["dependencies", name])));
                }
            }
        }
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }
}

/// Capability-polymorphic schema view: a plain object or a merged pair.
///
/// All engine code downstream of the merger works against this type; each
/// accessor dispatches to the object read or the per-keyword merge rule.
#[derive(Clone)]
pub struct SchemaHandle(pub(crate) Arc<SchemaView>);

#[derive(Clone)]
pub(crate) enum SchemaView {
    Object(SchemaObject),
    Merged(MergedSchema),
}

impl PartialEq for SchemaHandle {
    fn eq(&self, other: &Self) -> bool {
        match (self.view(), other.view()) {
            (SchemaView::Object(a), SchemaView::Object(b)) => a == b,
            (SchemaView::Merged(a), SchemaView::Merged(b)) => {
                a.base() == b.base() && a.other() == b.other()
            }
            _ => false,
        }
    }
}

impl Eq for SchemaHandle {}

impl fmt::Debug for SchemaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.view() {
            SchemaView::Object(o) => write!(f, "{:?}", o),
            SchemaView::Merged(m) => write!(f, "Merged({:?}, {:?})", m.base(), m.other()),
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $method:ident $(, $arg:expr)*) => {
        match $self.view() {
            SchemaView::Object(o) => o.$method($($arg),*),
            SchemaView::Merged(m) => m.$method($($arg),*),
        }
    };
}

impl SchemaHandle {
    pub fn object(object: SchemaObject) -> Self {
        SchemaHandle(Arc::new(SchemaView::Object(object)))
    }

    pub(crate) fn merged(merged: MergedSchema) -> Self {
        SchemaHandle(Arc::new(SchemaView::Merged(merged)))
    }

    pub(crate) fn view(&self) -> &SchemaView {
        &self.0
    }

    pub fn as_object(&self) -> Option<&SchemaObject> {
        match self.view() {
            SchemaView::Object(o) => Some(o),
            SchemaView::Merged(_) => None,
        }
    }

    pub fn is_merged(&self) -> bool {
        matches!(self.view(), SchemaView::Merged(_))
    }

    /// The identity object: the object itself, or the merge's point-to.
    pub fn identity(&self) -> &SchemaObject {
        match self.view() {
            SchemaView::Object(o) => o,
            SchemaView::Merged(m) => m.point_to(),
        }
    }

    pub fn file_url(&self) -> &str {
        self.identity().file_url()
    }

    pub fn pointer(&self) -> &JsonPointer {
        self.identity().pointer()
    }

    pub fn is_always_true(&self) -> bool {
        self.as_object()
            .and_then(SchemaObject::as_bool_schema)
            .unwrap_or(false)
    }

    pub fn is_always_false(&self) -> bool {
        self.as_object()
            .and_then(SchemaObject::as_bool_schema)
            .map(|b| !b)
            .unwrap_or(false)
    }

    pub fn type_variants(&self) -> Option<Vec<SchemaType>> {
        dispatch!(self, type_variants)
    }

    pub fn minimum(&self) -> Option<f64> {
        dispatch!(self, minimum)
    }

    pub fn maximum(&self) -> Option<f64> {
        dispatch!(self, maximum)
    }

    pub fn exclusive_minimum(&self) -> Option<f64> {
        dispatch!(self, exclusive_minimum)
    }

    pub fn exclusive_maximum(&self) -> Option<f64> {
        dispatch!(self, exclusive_maximum)
    }

    pub fn is_exclusive_minimum(&self) -> bool {
        dispatch!(self, is_exclusive_minimum)
    }

    pub fn is_exclusive_maximum(&self) -> bool {
        dispatch!(self, is_exclusive_maximum)
    }

    pub fn multiple_of(&self) -> Option<f64> {
        dispatch!(self, multiple_of)
    }

    pub fn pattern(&self) -> Option<String> {
        dispatch!(self, pattern)
    }

    pub fn min_length(&self) -> Option<u64> {
        dispatch!(self, min_length)
    }

    pub fn max_length(&self) -> Option<u64> {
        dispatch!(self, max_length)
    }

    pub fn format(&self) -> Option<String> {
        dispatch!(self, format)
    }

    pub fn title(&self) -> Option<String> {
        dispatch!(self, title)
    }

    pub fn description(&self) -> Option<String> {
        dispatch!(self, description)
    }

    pub fn default_value(&self) -> Option<Value> {
        dispatch!(self, default_value)
    }

    pub fn enum_values(&self) -> Option<Vec<Value>> {
        dispatch!(self, enum_values)
    }

    pub fn const_value(&self) -> Option<Value> {
        dispatch!(self, const_value)
    }

    pub fn required(&self) -> Option<Vec<String>> {
        dispatch!(self, required)
    }

    pub fn min_properties(&self) -> Option<u64> {
        dispatch!(self, min_properties)
    }

    pub fn max_properties(&self) -> Option<u64> {
        dispatch!(self, max_properties)
    }

    pub fn properties(&self) -> Option<Vec<(String, SchemaHandle)>> {
        match self.view() {
            SchemaView::Object(o) => o.properties().map(|props| {
                props
                    .into_iter()
                    .map(|(name, child)| (name, SchemaHandle::object(child)))
                    .collect()
            }),
            SchemaView::Merged(m) => m.properties(),
        }
    }

    pub fn property(&self, name: &str) -> Option<SchemaHandle> {
        match self.view() {
            SchemaView::Object(o) => o.property(name).map(SchemaHandle::object),
            SchemaView::Merged(m) => m.property(name),
        }
    }

    pub(crate) fn pattern_property_entries(&self) -> Vec<(CompiledPattern, SchemaHandle)> {
        match self.view() {
            SchemaView::Object(o) => o
                .pattern_properties()
                .map(|patterns| {
                    patterns
                        .iter()
                        .map(|p| {
                            let schema = SchemaHandle::object(SchemaObject {
                                doc: Arc::clone(&o.doc),
                                pointer: p.pointer.clone(),
                                resolved_from: None,
                            });
                            (p.clone(), schema)
                        })
                        .collect()
                })
                .unwrap_or_default(),
            SchemaView::Merged(m) => m.pattern_property_entries(),
        }
    }

    pub fn property_names_schema(&self) -> Option<SchemaHandle> {
        match self.view() {
            SchemaView::Object(o) => o.property_names_schema().map(SchemaHandle::object),
            SchemaView::Merged(m) => m.property_names_schema(),
        }
    }

    pub fn additional_properties(&self) -> Option<SchemaOrBool> {
        dispatch!(self, additional_properties)
    }

    pub fn unevaluated_properties(&self) -> Option<SchemaOrBool> {
        dispatch!(self, unevaluated_properties)
    }

    /// False only when `additionalProperties` is explicitly `false`.
    pub fn additional_properties_allowed(&self) -> bool {
        !matches!(
            self.additional_properties(),
            Some(SchemaOrBool::Bool(false))
        )
    }

    pub fn items_schema(&self) -> Option<SchemaOrBool> {
        dispatch!(self, items_schema)
    }

    pub fn items_list(&self) -> Option<Vec<SchemaHandle>> {
        match self.view() {
            SchemaView::Object(o) => o
                .items_list()
                .map(|items| items.into_iter().map(SchemaHandle::object).collect()),
            SchemaView::Merged(m) => m.items_list(),
        }
    }

    pub fn additional_items(&self) -> Option<SchemaOrBool> {
        dispatch!(self, additional_items)
    }

    pub fn unevaluated_items(&self) -> Option<SchemaOrBool> {
        dispatch!(self, unevaluated_items)
    }

    pub fn additional_items_allowed(&self) -> bool {
        !matches!(self.additional_items(), Some(SchemaOrBool::Bool(false)))
    }

    pub fn contains_schema(&self) -> Option<SchemaHandle> {
        match self.view() {
            SchemaView::Object(o) => o.contains_schema().map(SchemaHandle::object),
            SchemaView::Merged(m) => m.contains_schema(),
        }
    }

    pub fn min_items(&self) -> Option<u64> {
        dispatch!(self, min_items)
    }

    pub fn max_items(&self) -> Option<u64> {
        dispatch!(self, max_items)
    }

    pub fn unique_items(&self) -> bool {
        dispatch!(self, unique_items)
    }

    pub fn all_of(&self) -> Option<Vec<SchemaHandle>> {
        match self.view() {
            SchemaView::Object(o) => o
                .all_of()
                .map(|items| items.into_iter().map(SchemaHandle::object).collect()),
            SchemaView::Merged(m) => m.all_of(),
        }
    }

    pub fn any_of(&self) -> Option<Vec<SchemaHandle>> {
        match self.view() {
            SchemaView::Object(o) => o
                .any_of()
                .map(|items| items.into_iter().map(SchemaHandle::object).collect()),
            SchemaView::Merged(m) => m.any_of(),
        }
    }

    pub fn one_of(&self) -> Option<Vec<SchemaHandle>> {
        match self.view() {
            SchemaView::Object(o) => o
                .one_of()
                .map(|items| items.into_iter().map(SchemaHandle::object).collect()),
            SchemaView::Merged(m) => m.one_of(),
        }
    }

    pub fn not_schema(&self) -> Option<SchemaHandle> {
        match self.view() {
            SchemaView::Object(o) => o.not_schema().map(SchemaHandle::object),
            SchemaView::Merged(m) => m.not_schema(),
        }
    }

    pub fn if_then_else(&self) -> Option<IfThenElse> {
        dispatch!(self, if_then_else)
    }

    pub fn ref_value(&self) -> Option<String> {
        dispatch!(self, ref_value)
    }

    pub fn is_dynamic_ref(&self) -> bool {
        dispatch!(self, is_dynamic_ref)
    }

    pub fn is_recursive_anchor(&self) -> bool {
        dispatch!(self, is_recursive_anchor)
    }

    pub fn definitions(&self) -> Option<Vec<(String, SchemaHandle)>> {
        match self.view() {
            SchemaView::Object(o) => o.definitions().map(|defs| {
                defs.into_iter()
                    .map(|(name, child)| (name, SchemaHandle::object(child)))
                    .collect()
            }),
            SchemaView::Merged(m) => m.definitions(),
        }
    }

    pub fn dependent_required(&self) -> Option<Vec<(String, Vec<String>)>> {
        dispatch!(self, dependent_required)
    }

    pub fn dependent_schemas(&self) -> Option<Vec<(String, SchemaHandle)>> {
        match self.view() {
            SchemaView::Object(o) => o.dependent_schemas().map(|deps| {
                deps.into_iter()
                    .map(|(name, child)| (name, SchemaHandle::object(child)))
                    .collect()
            }),
            SchemaView::Merged(m) => m.dependent_schemas(),
        }
    }

    /// Render this view back into a plain JSON schema object.
    ///
    /// Plain objects clone their node verbatim (keeping keywords the engine
    /// does not model); merged views are assembled keyword by keyword from
    /// the merge rules. References are emitted as-is, not followed.
    pub fn materialize(&self) -> Value {
        match self.view() {
            SchemaView::Object(o) => o.node().cloned().unwrap_or(Value::Bool(true)),
            SchemaView::Merged(_) => self.assemble(),
        }
    }

    fn assemble(&self) -> Value {
        let mut out = Map::new();
        if let Some(reference) = self.ref_value() {
            let key = if self.is_dynamic_ref() {
                "$dynamicRef"
            } else {
                "$ref"
            };
            out.insert(key.to_string(), Value::String(reference));
        }
        if let Some(types) = self.type_variants() {
            let value = if types.len() == 1 {
                Value::String(types[0].as_str().to_string())
            } else {
                Value::Array(
                    types
                        .iter()
                        .map(|t| Value::String(t.as_str().to_string()))
                        .collect(),
                )
            };
            out.insert("type".to_string(), value);
        }
        if let Some(value) = self.const_value() {
            out.insert("const".to_string(), value);
        }
        if let Some(values) = self.enum_values() {
            out.insert("enum".to_string(), Value::Array(values));
        }
        if let Some(title) = self.title() {
            out.insert("title".to_string(), Value::String(title));
        }
        if let Some(description) = self.description() {
            out.insert("description".to_string(), Value::String(description));
        }
        if let Some(value) = self.default_value() {
            out.insert("default".to_string(), value);
        }
        if let Some(format) = self.format() {
            out.insert("format".to_string(), Value::String(format));
        }

        // Numerics. Draft-4 boolean exclusivity is rewritten into the
        // numeric form so the output stands alone.
        if let Some(min) = self.minimum() {
            if self.is_exclusive_minimum() {
                insert_number(&mut out, "exclusiveMinimum", min);
            } else {
                insert_number(&mut out, "minimum", min);
            }
        }
        if let Some(max) = self.maximum() {
            if self.is_exclusive_maximum() {
                insert_number(&mut out, "exclusiveMaximum", max);
            } else {
                insert_number(&mut out, "maximum", max);
            }
        }
        if let Some(min) = self.exclusive_minimum() {
            insert_number(&mut out, "exclusiveMinimum", min);
        }
        if let Some(max) = self.exclusive_maximum() {
            insert_number(&mut out, "exclusiveMaximum", max);
        }
        if let Some(multiple) = self.multiple_of() {
            insert_number(&mut out, "multipleOf", multiple);
        }

        if let Some(pattern) = self.pattern() {
            out.insert("pattern".to_string(), Value::String(pattern));
        }
        if let Some(min) = self.min_length() {
            out.insert("minLength".to_string(), Value::from(min));
        }
        if let Some(max) = self.max_length() {
            out.insert("maxLength".to_string(), Value::from(max));
        }

        if let Some(required) = self.required() {
            out.insert(
                "required".to_string(),
                Value::Array(required.into_iter().map(Value::String).collect()),
            );
        }
        if let Some(properties) = self.properties() {
            let mut map = Map::new();
            for (name, child) in properties {
                map.insert(name, child.materialize());
            }
            out.insert("properties".to_string(), Value::Object(map));
        }
        let patterns = self.pattern_property_entries();
        if !patterns.is_empty() {
            let mut map = Map::new();
            for (pattern, child) in patterns {
                map.insert(pattern.source, child.materialize());
            }
            out.insert("patternProperties".to_string(), Value::Object(map));
        }
        if let Some(additional) = self.additional_properties() {
            out.insert(
                "additionalProperties".to_string(),
                schema_or_bool_value(additional),
            );
        }
        if let Some(unevaluated) = self.unevaluated_properties() {
            out.insert(
                "unevaluatedProperties".to_string(),
                schema_or_bool_value(unevaluated),
            );
        }
        if let Some(names) = self.property_names_schema() {
            out.insert("propertyNames".to_string(), names.materialize());
        }
        if let Some(min) = self.min_properties() {
            out.insert("minProperties".to_string(), Value::from(min));
        }
        if let Some(max) = self.max_properties() {
            out.insert("maxProperties".to_string(), Value::from(max));
        }
        if let Some(deps) = self.dependent_required() {
            let mut map = Map::new();
            for (name, names) in deps {
                map.insert(
                    name,
                    Value::Array(names.into_iter().map(Value::String).collect()),
                );
            }
            out.insert("dependentRequired".to_string(), Value::Object(map));
        }
        if let Some(deps) = self.dependent_schemas() {
            let mut map = Map::new();
            for (name, child) in deps {
                map.insert(name, child.materialize());
            }
            out.insert("dependentSchemas".to_string(), Value::Object(map));
        }

        if let Some(list) = self.items_list() {
            out.insert(
                "prefixItems".to_string(),
                Value::Array(list.iter().map(SchemaHandle::materialize).collect()),
            );
        }
        if let Some(items) = self.items_schema() {
            out.insert("items".to_string(), schema_or_bool_value(items));
        }
        if let Some(additional) = self.additional_items() {
            out.insert(
                "additionalItems".to_string(),
                schema_or_bool_value(additional),
            );
        }
        if let Some(unevaluated) = self.unevaluated_items() {
            out.insert(
                "unevaluatedItems".to_string(),
                schema_or_bool_value(unevaluated),
            );
        }
        if let Some(contains) = self.contains_schema() {
            out.insert("contains".to_string(), contains.materialize());
        }
        if let Some(min) = self.min_items() {
            out.insert("minItems".to_string(), Value::from(min));
        }
        if let Some(max) = self.max_items() {
            out.insert("maxItems".to_string(), Value::from(max));
        }
        if self.unique_items() {
            out.insert("uniqueItems".to_string(), Value::Bool(true));
        }

        for (key, list) in [
            ("allOf", self.all_of()),
            ("anyOf", self.any_of()),
            ("oneOf", self.one_of()),
        ] {
            if let Some(list) = list {
                out.insert(
                    key.to_string(),
                    Value::Array(list.iter().map(SchemaHandle::materialize).collect()),
                );
            }
        }
        if let Some(not) = self.not_schema() {
            out.insert("not".to_string(), not.materialize());
        }
        if let Some(triple) = self.if_then_else() {
            if let Some(leg) = triple.if_schema {
                out.insert("if".to_string(), leg.materialize());
            }
            if let Some(leg) = triple.then_schema {
                out.insert("then".to_string(), leg.materialize());
            }
            if let Some(leg) = triple.else_schema {
                out.insert("else".to_string(), leg.materialize());
            }
        }

        Value::Object(out)
    }
}

fn insert_number(out: &mut Map<String, Value>, key: &str, value: f64) {
    if let Some(number) = serde_json::Number::from_f64(value) {
        out.insert(key.to_string(), Value::Number(number));
    }
}

fn schema_or_bool_value(value: SchemaOrBool) -> Value {
    match value {
        SchemaOrBool::Bool(b) => Value::Bool(b),
        SchemaOrBool::Schema(schema) => schema.materialize(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Arc<SchemaDocument> {
        SchemaDocument::new("file:///test.json", 1, value)
    }

    #[test]
    fn equality_is_url_and_pointer() {
        let document = doc(json!({ "properties": { "a": { "type": "string" } } }));
        let a1 = document
            .object_at(JsonPointer::parse("/properties/a").unwrap())
            .unwrap();
        let a2 = document
            .object_at(JsonPointer::parse("/properties/a").unwrap())
            .unwrap();
        assert_eq!(a1, a2);
        assert_ne!(a1, document.root());
    }

    #[test]
    fn object_at_missing_node() {
        let document = doc(json!({ "type": "object" }));
        assert!(document
            .object_at(JsonPointer::parse("/properties/x").unwrap())
            .is_none());
    }

    #[test]
    fn type_variants_single_and_array() {
        let document = doc(json!({
            "properties": {
                "a": { "type": "string" },
                "b": { "type": ["string", "null"] }
            }
        }));
        let a = document
            .object_at(JsonPointer::parse("/properties/a").unwrap())
            .unwrap();
        assert_eq!(a.type_variants(), Some(vec![SchemaType::String]));
        let b = document
            .object_at(JsonPointer::parse("/properties/b").unwrap())
            .unwrap();
        assert_eq!(
            b.type_variants(),
            Some(vec![SchemaType::String, SchemaType::Null])
        );
    }

    #[test]
    fn type_variants_cached_identically() {
        let document = doc(json!({ "type": "object" }));
        let root = document.root();
        assert_eq!(root.type_variants(), root.type_variants());
    }

    #[test]
    fn draft4_boolean_exclusive_bounds() {
        let document = doc(json!({
            "$schema": "http://json-schema.org/draft-04/schema#",
            "minimum": 1,
            "exclusiveMinimum": true
        }));
        let root = document.root();
        assert_eq!(root.minimum(), Some(1.0));
        assert!(root.is_exclusive_minimum());
        assert_eq!(root.exclusive_minimum(), None);
    }

    #[test]
    fn modern_numeric_exclusive_bounds() {
        let document = doc(json!({ "exclusiveMaximum": 10 }));
        let root = document.root();
        assert_eq!(root.exclusive_maximum(), Some(10.0));
        assert!(!root.is_exclusive_maximum());
    }

    #[test]
    fn property_lookup() {
        let document = doc(json!({
            "properties": { "name": { "type": "string" } }
        }));
        let root = document.root();
        let name = root.property("name").unwrap();
        assert_eq!(name.pointer().to_string(), "/properties/name");
        assert!(root.property("missing").is_none());
    }

    #[test]
    fn pattern_properties_compile_once_and_keep_errors() {
        let document = doc(json!({
            "patternProperties": {
                "^x_": { "type": "boolean" },
                "[invalid": { "type": "string" }
            }
        }));
        let root = document.root();
        let patterns = root.pattern_properties().unwrap();
        assert_eq!(patterns.len(), 2);
        assert!(patterns[0].regex.is_ok());
        assert!(patterns[1].regex.is_err());
        // Second read returns the same compiled index
        let again = root.pattern_properties().unwrap();
        assert!(Arc::ptr_eq(&patterns, &again));
    }

    #[test]
    fn items_forms() {
        let single = doc(json!({ "items": { "type": "number" } })).root();
        assert!(matches!(
            single.items_schema(),
            Some(SchemaOrBool::Schema(_))
        ));
        assert!(single.items_list().is_none());

        let positional = doc(json!({ "items": [{ "type": "string" }, { "type": "number" }] }));
        let root = positional.root();
        assert!(root.items_schema().is_none());
        assert_eq!(root.items_list().unwrap().len(), 2);

        let prefix = doc(json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "prefixItems": [{ "type": "string" }]
        }));
        assert_eq!(prefix.root().items_list().unwrap().len(), 1);
    }

    #[test]
    fn combinator_lists() {
        let document = doc(json!({
            "allOf": [{ "minimum": 1 }, { "maximum": 10 }]
        }));
        let root = document.root();
        let all_of = root.all_of().unwrap();
        assert_eq!(all_of.len(), 2);
        assert_eq!(all_of[0].pointer().to_string(), "/allOf/0");
        assert!(root.any_of().is_none());
    }

    #[test]
    fn if_then_else_triple() {
        let document = doc(json!({
            "if": { "properties": { "a": { "const": "x" } } },
            "then": { "required": ["b"] }
        }));
        let triple = document.root().if_then_else().unwrap();
        assert!(triple.if_schema.is_some());
        assert!(triple.then_schema.is_some());
        assert!(triple.else_schema.is_none());
    }

    #[test]
    fn if_then_else_unsupported_draft() {
        let document = doc(json!({
            "$schema": "http://json-schema.org/draft-04/schema#",
            "if": { "type": "string" },
            "then": { "minLength": 1 }
        }));
        assert!(document.root().if_then_else().is_none());
    }

    #[test]
    fn ref_and_dynamic_ref() {
        let document = doc(json!({
            "properties": {
                "a": { "$ref": "#/$defs/thing" },
                "b": { "$dynamicRef": "#" }
            }
        }));
        let a = document
            .object_at(JsonPointer::parse("/properties/a").unwrap())
            .unwrap();
        assert_eq!(a.ref_value(), Some("#/$defs/thing".to_string()));
        assert!(!a.is_dynamic_ref());
        let b = document
            .object_at(JsonPointer::parse("/properties/b").unwrap())
            .unwrap();
        assert_eq!(b.ref_value(), Some("#".to_string()));
        assert!(b.is_dynamic_ref());
    }

    #[test]
    fn definitions_both_spellings() {
        let legacy = doc(json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "definitions": { "a": { "type": "string" } }
        }));
        assert_eq!(legacy.root().definitions().unwrap().len(), 1);

        let modern = doc(json!({ "$defs": { "a": {}, "b": {} } }));
        assert_eq!(modern.root().definitions().unwrap().len(), 2);
    }

    #[test]
    fn anchor_index_collects_names() {
        let document = doc(json!({
            "$defs": {
                "a": { "$anchor": "first", "type": "string" },
                "b": { "$dynamicAnchor": "second" }
            }
        }));
        let anchors = document.anchor_index();
        assert_eq!(anchors["first"].to_string(), "/$defs/a");
        assert_eq!(anchors["second"].to_string(), "/$defs/b");
    }

    #[test]
    fn registry_stamp_invalidation() {
        let registry = SchemaRegistry::new();
        let first = SchemaDocument::new("file:///s.json", 1, json!({ "type": "object" }));
        registry.insert(Arc::clone(&first));
        assert!(registry.get("file:///s.json", 1).is_some());
        assert!(registry.get("file:///s.json", 2).is_none());

        let second = SchemaDocument::new("file:///s.json", 2, json!({ "type": "string" }));
        registry.insert(second);
        assert!(registry.get("file:///s.json", 1).is_none());
        assert!(registry.get("file:///s.json", 2).is_some());
    }

    #[test]
    fn materialize_plain_object_clones_node() {
        let value = json!({ "type": "string", "x-vendor": true });
        let document = doc(value.clone());
        let handle = SchemaHandle::object(document.root());
        assert_eq!(handle.materialize(), value);
    }
}
