//! Reference resolution.
//!
//! Resolves `$ref`/`$dynamicRef` values against the referencing schema and a
//! file-resolver collaborator. Malformed pointers and missing targets come
//! back as [`ReferenceTarget::NotFound`], never as a panic; a remote document
//! still being fetched comes back as [`ReferenceTarget::Pending`] and is
//! deliberately not memoized.

use std::sync::Arc;

use serde_json::Value;

use crate::cancel::CancellationToken;
use crate::error::ResolveError;
use crate::object::{RefOutcome, SchemaDocument, SchemaObject};
use crate::pointer::{unescape_segment, JsonPointer};

/// Outcome of mapping a `$ref` schema id to a document.
pub enum FileResolution {
    Found(Arc<SchemaDocument>),
    NotFound,
    /// The document is being fetched out-of-band; resolution must be retried
    /// once the fetch completes.
    Pending,
}

/// Maps a `$ref` schema id plus the referring document to a schema document.
pub trait SchemaFileResolver {
    fn resolve(&self, schema_id: &str, referrer: &SchemaDocument) -> FileResolution;
}

/// Resolver for documents that make no cross-file references.
pub struct NoExternalSchemas;

impl SchemaFileResolver for NoExternalSchemas {
    fn resolve(&self, _schema_id: &str, _referrer: &SchemaDocument) -> FileResolution {
        FileResolution::NotFound
    }
}

/// Outcome of resolving one reference string.
#[derive(Debug)]
pub enum ReferenceTarget {
    Resolved(SchemaObject),
    NotFound,
    Pending,
}

/// Resolve `reference` relative to `referrer`.
///
/// Self references (`"#"`, `""`, `"#/"`) yield the referrer's document root;
/// the dynamic form walks back through resolution links while the current
/// root declares a recursive anchor. Results are memoized per
/// `(referencing pointer, reference)` on the referring document.
pub fn resolve_reference(
    reference: &str,
    referrer: &SchemaObject,
    dynamic: bool,
    files: &dyn SchemaFileResolver,
    cancel: &CancellationToken,
) -> Result<ReferenceTarget, ResolveError> {
    cancel.check()?;

    if matches!(reference, "#" | "" | "#/") {
        if dynamic {
            return Ok(ReferenceTarget::Resolved(dynamic_scope_root(referrer)));
        }
        return Ok(ReferenceTarget::Resolved(referrer.document().root()));
    }

    let memo_key = (referrer.pointer().clone(), reference.to_string());
    if let Some(outcome) = referrer.document().memo_get(&memo_key) {
        return Ok(match outcome {
            RefOutcome::Resolved { doc, pointer } => match doc.object_at(pointer) {
                Some(target) => {
                    ReferenceTarget::Resolved(target.with_resolved_from(referrer.clone()))
                }
                None => ReferenceTarget::NotFound,
            },
            RefOutcome::NotFound => ReferenceTarget::NotFound,
        });
    }

    let (schema_id, fragment) = split_reference(reference);

    let target_doc = if schema_id.is_empty() {
        Arc::clone(referrer.document())
    } else {
        match files.resolve(schema_id, referrer.document()) {
            FileResolution::Found(doc) => doc,
            FileResolution::NotFound => {
                log::debug!(
                    "unresolved schema id {:?} referenced from {}#{}",
                    schema_id,
                    referrer.file_url(),
                    referrer.pointer()
                );
                referrer.document().memo_put(memo_key, RefOutcome::NotFound);
                return Ok(ReferenceTarget::NotFound);
            }
            FileResolution::Pending => return Ok(ReferenceTarget::Pending),
        }
    };

    match resolve_fragment(&target_doc, fragment, cancel)? {
        Some(pointer) => {
            referrer.document().memo_put(
                memo_key,
                RefOutcome::Resolved {
                    doc: Arc::clone(&target_doc),
                    pointer: pointer.clone(),
                },
            );
            match target_doc.object_at(pointer) {
                Some(target) => Ok(ReferenceTarget::Resolved(
                    target.with_resolved_from(referrer.clone()),
                )),
                None => Ok(ReferenceTarget::NotFound),
            }
        }
        None => {
            log::debug!(
                "unresolvable reference {:?} at {}#{}",
                reference,
                referrer.file_url(),
                referrer.pointer()
            );
            referrer.document().memo_put(memo_key, RefOutcome::NotFound);
            Ok(ReferenceTarget::NotFound)
        }
    }
}

/// Split a reference into `(schemaId, fragment)` at the first `#`.
fn split_reference(reference: &str) -> (&str, &str) {
    match reference.find('#') {
        Some(idx) => (&reference[..idx], &reference[idx + 1..]),
        None => {
            if reference.starts_with('/') {
                ("", reference)
            } else {
                (reference, "")
            }
        }
    }
}

/// Walk a fragment within `doc` to an absolute pointer.
///
/// The walk is schema-aware: a definitions keyword or `properties` consumes
/// the following segment as a name lookup, `items` followed by an integer
/// indexes the positional list and otherwise targets the single items
/// schema, and `additionalItems` is terminal. Plain-name fragments go
/// through the anchor index; that also catches malformed pointers, which
/// simply miss.
pub(crate) fn resolve_fragment(
    doc: &Arc<SchemaDocument>,
    fragment: &str,
    cancel: &CancellationToken,
) -> Result<Option<JsonPointer>, ResolveError> {
    if fragment.is_empty() || fragment == "/" {
        return Ok(Some(JsonPointer::root()));
    }
    if !fragment.starts_with('/') {
        return Ok(doc.anchor_index().get(fragment).cloned());
    }

    let segments: Vec<String> = fragment.split('/').skip(1).map(unescape_segment).collect();
    let definitions_keys = doc.draft().definitions_keywords();
    let mut pointer = JsonPointer::root();
    let mut i = 0;
    while i < segments.len() {
        cancel.check()?;
        let Some(node) = doc.node_at(&pointer) else {
            return Ok(None);
        };
        let segment = segments[i].as_str();

        let is_name_consumer =
            definitions_keys.iter().any(|key| *key == segment) || segment == "properties";
        if is_name_consumer && i + 1 < segments.len() && node.get(segment).is_some() {
            pointer = pointer.child(segment).child(segments[i + 1].clone());
            i += 2;
            continue;
        }
        if segment == "items" {
            let positional = i + 1 < segments.len()
                && segments[i + 1].parse::<usize>().is_ok()
                && node.get("items").map(Value::is_array).unwrap_or(false);
            if positional {
                pointer = pointer.child("items").child(segments[i + 1].clone());
                i += 2;
            } else {
                pointer = pointer.child("items");
                i += 1;
            }
            continue;
        }
        if segment == "additionalItems" {
            pointer = pointer.child("additionalItems");
            break;
        }
        pointer = pointer.child(segment);
        i += 1;
    }

    if doc.node_at(&pointer).is_some() {
        Ok(Some(pointer))
    } else {
        Ok(None)
    }
}

/// Walk back through resolution links to the dynamically-scoped root.
fn dynamic_scope_root(referrer: &SchemaObject) -> SchemaObject {
    let mut root = referrer.document().root();
    let mut hop = referrer.clone();
    while root.is_recursive_anchor() {
        match hop.resolved_from() {
            Some(previous) => {
                let previous = previous.clone();
                root = previous.document().root();
                hop = previous;
            }
            None => break,
        }
    }
    root
}
