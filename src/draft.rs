//! Draft-version interpretation.
//!
//! [`SchemaDraft`] maps each logical constraint the engine asks about to the
//! concrete keyword spelling of the document's declared draft. Accessors that
//! ask for a keyword the draft does not support get `None` back and report
//! the constraint as absent.

/// JSON Schema draft declared by a document's `$schema`, latest when absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SchemaDraft {
    Draft4,
    Draft6,
    Draft7,
    Draft2019_09,
    #[default]
    Draft2020_12,
}

impl SchemaDraft {
    /// Detect the draft from a `$schema` URI. Unknown or missing URIs map to
    /// the latest draft.
    pub fn detect(schema_uri: Option<&str>) -> Self {
        let Some(uri) = schema_uri else {
            return SchemaDraft::default();
        };
        let uri = uri.trim_end_matches('#');
        if uri.contains("draft-04") {
            SchemaDraft::Draft4
        } else if uri.contains("draft-06") {
            SchemaDraft::Draft6
        } else if uri.contains("draft-07") {
            SchemaDraft::Draft7
        } else if uri.contains("2019-09") {
            SchemaDraft::Draft2019_09
        } else if uri.contains("2020-12") {
            SchemaDraft::Draft2020_12
        } else {
            SchemaDraft::default()
        }
    }

    /// Keywords holding reusable definitions, preferred spelling first.
    ///
    /// Both spellings are accepted on reads in every draft; schemas in the
    /// wild mix them freely.
    pub fn definitions_keywords(&self) -> &'static [&'static str] {
        match self {
            SchemaDraft::Draft4 | SchemaDraft::Draft6 | SchemaDraft::Draft7 => {
                &["definitions", "$defs"]
            }
            _ => &["$defs", "definitions"],
        }
    }

    pub fn id_keyword(&self) -> &'static str {
        match self {
            SchemaDraft::Draft4 => "id",
            _ => "$id",
        }
    }

    /// Draft 4 spelled `exclusiveMinimum`/`exclusiveMaximum` as booleans
    /// qualifying `minimum`/`maximum`; later drafts made them numeric.
    pub fn exclusive_bounds_are_booleans(&self) -> bool {
        matches!(self, SchemaDraft::Draft4)
    }

    /// Keyword declaring a dynamically-scoped anchor, if the draft has one.
    pub fn recursive_anchor_keyword(&self) -> Option<&'static str> {
        match self {
            SchemaDraft::Draft2019_09 => Some("$recursiveAnchor"),
            SchemaDraft::Draft2020_12 => Some("$dynamicAnchor"),
            _ => None,
        }
    }

    /// Keyword for a dynamically-scoped reference, if the draft has one.
    pub fn recursive_ref_keyword(&self) -> Option<&'static str> {
        match self {
            SchemaDraft::Draft2019_09 => Some("$recursiveRef"),
            SchemaDraft::Draft2020_12 => Some("$dynamicRef"),
            _ => None,
        }
    }

    /// Keyword for positional array items.
    ///
    /// 2020-12 split the array form of `items` into `prefixItems`; older
    /// drafts overload `items` with an array value.
    pub fn positional_items_keyword(&self) -> &'static str {
        match self {
            SchemaDraft::Draft2020_12 => "prefixItems",
            _ => "items",
        }
    }

    pub fn supports_unevaluated(&self) -> bool {
        matches!(self, SchemaDraft::Draft2019_09 | SchemaDraft::Draft2020_12)
    }

    /// 2019-09 split `dependencies` into `dependentRequired` and
    /// `dependentSchemas`.
    pub fn supports_dependent_keywords(&self) -> bool {
        matches!(self, SchemaDraft::Draft2019_09 | SchemaDraft::Draft2020_12)
    }

    /// `if`/`then`/`else` arrived in draft 7.
    pub fn supports_if_then_else(&self) -> bool {
        !matches!(self, SchemaDraft::Draft4 | SchemaDraft::Draft6)
    }
}
