//! Schema Walker
//!
//! Pointer-path resolution of JSON Schema constraints.
//!
//! Given a parsed schema document and a pointer-step path into an instance
//! document, this library computes the set of schema constraints that apply
//! at that path: it follows `$ref`/`$dynamicRef` across files, expands
//! `oneOf`/`anyOf`/`allOf`/`if-then-else` into alternative branches, merges
//! schemas for inheritance, and decides property/array step applicability.
//! Completion and validation layers consume the resolved leaf set.
//!
//! # Example
//!
//! ```
//! use schema_walker::{
//!     resolve_variants, NoExternalSchemas, PointerStep, ResolveContext, ResolveOptions,
//!     SchemaDocument,
//! };
//! use serde_json::json;
//!
//! let document = SchemaDocument::new("file:///pet.json", 1, json!({
//!     "properties": {
//!         "name": { "type": "string" },
//!         "age": { "type": "integer" }
//!     },
//!     "additionalProperties": false
//! }));
//!
//! let ctx = ResolveContext::new(&NoExternalSchemas);
//! let steps = [PointerStep::property("name")];
//! let resolved =
//!     resolve_variants(&document.root(), &steps, &ResolveOptions::new(), &ctx).unwrap();
//!
//! assert_eq!(resolved.variants.len(), 1);
//! let schema = resolved.variants[0].schema().unwrap();
//! assert_eq!(schema.pointer().to_string(), "/properties/name");
//!
//! // An unknown property is rejected by additionalProperties: false
//! let steps = [PointerStep::property("owner")];
//! let resolved =
//!     resolve_variants(&document.root(), &steps, &ResolveOptions::new(), &ctx).unwrap();
//! assert!(resolved.is_nothing());
//! ```
//!
//! # Alternatives
//!
//! Combinators expand into alternatives rather than collapsing: a `oneOf`
//! yields one variant per arm, each tagged with an exclusion-group number so
//! consumers know the arms are mutually exclusive, while `anyOf` arms stay
//! in one inclusive group. `allOf` arms merge into a single variant through
//! lazy merged views that never copy the underlying documents.

mod cancel;
mod draft;
mod error;
mod linter;
mod loader;
mod merge;
mod node;
mod object;
mod pointer;
mod resolver;
mod step;
mod tree;
mod types;
mod validator;

pub use cancel::CancellationToken;
pub use draft::SchemaDraft;
pub use error::{ResolveError, SchemaError, ValidateError};
pub use linter::{lint, lint_file, Diagnostic, FileResult, FileStatus, LintResult, Severity};
pub use loader::{
    is_url, load_document, load_document_auto, load_document_str, DirectoryResolver,
    StaticResolver,
};
pub use merge::{merge, MergedSchema};
pub use node::json_type_name;
pub use object::{SchemaDocument, SchemaHandle, SchemaObject, SchemaRegistry};
pub use pointer::{parse_pointer_steps, steps_to_pointer, JsonPointer, PointerStep};
pub use resolver::{
    resolve_reference, FileResolution, NoExternalSchemas, ReferenceTarget, SchemaFileResolver,
};
pub use step::{resolve_array_step, resolve_property_step, StepResult};
pub use tree::{
    resolve_variants, ResolveContext, ResolveOptions, ResolveState, ResolvedVariants, Variant,
    VariantKind,
};
pub use types::{types_compatible, IfThenElse, SchemaOrBool, SchemaType};
pub use validator::{check_value, validate_at_path};

#[cfg(feature = "remote")]
pub use loader::load_document_url;
