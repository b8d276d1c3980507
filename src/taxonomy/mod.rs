//! Taxonomy snapshot: classes and subclass edges supplied by the caller.
//!
//! The snapshot is the caller-owned, read-only view of the shared taxonomy for
//! the duration of one request. Nothing here mutates or persists it.
//!
//! - **Graph view** ([`graph::TaxonomyGraph`]): petgraph DAG over class ids with
//!   root lookup and leaf expansion
//! - **Expansion** ([`expand::SubtreeExpander`]): request-scoped root → leaf-view cache
//!
//! All types serialize with the camelCase field names used on the wire.

pub mod expand;
pub mod graph;

use serde::{Deserialize, Serialize};

/// A taxonomy node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OClass {
    /// Unique identifier, e.g. `A_Climbing`.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_ko: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_en: Option<String>,
    /// Coarse partition such as `Entity` or `Activity`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Explicit root flag. When no class carries it, roots are structural.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_root: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_version: Option<String>,
}

impl OClass {
    /// Create a class with only an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Set the facet.
    pub fn with_facet(mut self, facet: impl Into<String>) -> Self {
        self.facet = Some(facet.into());
        self
    }

    /// Flag the class as an explicit root.
    pub fn root(mut self) -> Self {
        self.is_root = Some(true);
        self
    }

    /// Set the English label.
    pub fn with_label_en(mut self, label: impl Into<String>) -> Self {
        self.label_en = Some(label.into());
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Whether the facet matches `facet`, ignoring ASCII case.
    pub fn has_facet(&self, facet: &str) -> bool {
        self.facet
            .as_deref()
            .is_some_and(|f| f.eq_ignore_ascii_case(facet))
    }

    /// Bounded projection sent to the oracle.
    pub fn view(&self) -> ClassView {
        ClassView {
            id: self.id.clone(),
            label_ko: self.label_ko.clone(),
            label_en: self.label_en.clone(),
            facet: self.facet.clone(),
            description: self.description.clone(),
        }
    }
}

/// A `parent → child` subclass relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubclassEdge {
    pub parent_id: String,
    pub child_id: String,
}

impl SubclassEdge {
    pub fn new(parent_id: impl Into<String>, child_id: impl Into<String>) -> Self {
        Self {
            parent_id: parent_id.into(),
            child_id: child_id.into(),
        }
    }
}

/// Classes and edges, versioned by an opaque seed tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxonomySnapshot {
    #[serde(default)]
    pub o_classes: Vec<OClass>,
    #[serde(default)]
    pub subclass_edges: Vec<SubclassEdge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_version: Option<String>,
}

impl TaxonomySnapshot {
    pub fn new(o_classes: Vec<OClass>, subclass_edges: Vec<SubclassEdge>) -> Self {
        Self {
            o_classes,
            subclass_edges,
            seed_version: None,
        }
    }
}

/// Id, labels, facet and description of a class: what the oracle gets to see
/// of a root or a leaf, never the full tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassView {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_ko: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_en: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
