//! Sheet payloads: worksheets, viewsheets, scripts, styles and the like.
//!
//! A sheet's body is opaque to the repository. What the repository does own
//! are the two edge sets kept inside every sheet: the entries it needs
//! (outer dependencies) and the entries that need it (outer dependents).
//! Together with [`SheetReference`]s they feed the reverse dependency index.

use crate::{AssetEntry, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A resource referenced from a sheet's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetReference {
    pub target: AssetEntry,
    /// Containment (viewsheet-in-viewsheet) rather than a plain link.
    #[serde(default)]
    pub embed: bool,
}

impl SheetReference {
    pub fn link(target: AssetEntry) -> Self {
        Self {
            target,
            embed: false,
        }
    }

    pub fn embed(target: AssetEntry) -> Self {
        Self {
            target,
            embed: true,
        }
    }
}

/// A join between two tables without a join condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossJoin {
    pub left: String,
    pub right: String,
}

/// A named payload stored at an entry's identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    pub description: Option<String>,
    /// Opaque body; never interpreted by the repository.
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(default)]
    outer_dependencies: BTreeSet<AssetEntry>,
    #[serde(default)]
    outer_dependents: BTreeSet<AssetEntry>,
    #[serde(default)]
    pub references: Vec<SheetReference>,
    #[serde(default)]
    pub cross_joins: Vec<CrossJoin>,
    /// Snapshot entry caching this sheet's data.
    pub embedded_snapshot: Option<AssetEntry>,
    pub created_by: Option<String>,
    pub created_at: Option<Timestamp>,
    pub modified_by: Option<String>,
    pub modified_at: Option<Timestamp>,
    /// Runtime hints (materialized view info and the like); never persisted.
    #[serde(skip)]
    pub runtime_info: Option<BTreeMap<String, String>>,
}

impl Sheet {
    pub fn new(content: serde_json::Value) -> Self {
        Self {
            content,
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_reference(mut self, reference: SheetReference) -> Self {
        self.references.push(reference);
        self
    }

    pub fn with_dependency(mut self, entry: AssetEntry) -> Self {
        self.add_dependency(entry);
        self
    }

    // === Outer dependencies ===

    pub fn add_dependency(&mut self, entry: AssetEntry) -> bool {
        self.outer_dependencies.insert(entry)
    }

    pub fn remove_dependency(&mut self, entry: &AssetEntry) -> bool {
        self.outer_dependencies.remove(entry)
    }

    pub fn contains_dependency(&self, entry: &AssetEntry) -> bool {
        self.outer_dependencies.contains(entry)
    }

    pub fn dependencies(&self) -> impl Iterator<Item = &AssetEntry> {
        self.outer_dependencies.iter()
    }

    pub fn replace_dependency(&mut self, old: &AssetEntry, new: AssetEntry) -> bool {
        if self.outer_dependencies.remove(old) {
            self.outer_dependencies.insert(new);
            true
        } else {
            false
        }
    }

    // === Outer dependents ===

    pub fn add_dependent(&mut self, entry: AssetEntry) -> bool {
        self.outer_dependents.insert(entry)
    }

    pub fn remove_dependent(&mut self, entry: &AssetEntry) -> bool {
        self.outer_dependents.remove(entry)
    }

    pub fn contains_dependent(&self, entry: &AssetEntry) -> bool {
        self.outer_dependents.contains(entry)
    }

    pub fn dependents(&self) -> impl Iterator<Item = &AssetEntry> {
        self.outer_dependents.iter()
    }

    pub fn replace_dependent(&mut self, old: &AssetEntry, new: AssetEntry) -> bool {
        if self.outer_dependents.remove(old) {
            self.outer_dependents.insert(new);
            true
        } else {
            false
        }
    }

    /// Replace the whole dependent set.
    pub fn set_dependents(&mut self, dependents: impl IntoIterator<Item = AssetEntry>) {
        self.outer_dependents = dependents.into_iter().collect();
    }

    // ===

    pub fn has_cross_joins(&self) -> bool {
        !self.cross_joins.is_empty()
    }

    /// Entries this sheet registers in the reverse index, with embed flag.
    ///
    /// Explicit references come first; outer dependencies not already named
    /// by a reference are added as plain links.
    pub fn index_edges(&self) -> Vec<(AssetEntry, bool)> {
        let mut edges: Vec<(AssetEntry, bool)> = Vec::new();
        for reference in &self.references {
            if !edges
                .iter()
                .any(|(t, e)| t == &reference.target && *e == reference.embed)
            {
                edges.push((reference.target.clone(), reference.embed));
            }
        }
        for dependency in &self.outer_dependencies {
            if !edges.iter().any(|(t, _)| t == dependency) {
                edges.push((dependency.clone(), false));
            }
        }
        edges
    }

    /// The "no data" view cached in the context tier: everything but the
    /// body.
    pub fn context_view(&self) -> Sheet {
        Sheet {
            content: serde_json::Value::Null,
            runtime_info: None,
            ..self.clone()
        }
    }
}
