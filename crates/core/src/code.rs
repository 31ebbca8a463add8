//! Code Forest
//!
//! Codes are the reusable labels attached to text segments. They form a
//! forest: every non-root code has exactly one parent, the parent must exist
//! before a child is attached, and no operation may introduce a cycle.
//! Deletion is rejected while children exist unless a cascade is explicitly
//! requested.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

/// Preset palette for distinguishing codes in downstream displays, cycled
/// deterministically as codes are created.
pub const CODE_COLORS: &[&str] = &[
    "#FF5733", "#33FF57", "#3357FF", "#FF33A8", "#33FFF5", "#F5FF33", "#FF8C33", "#8C33FF",
    "#FF3333", "#33FF8C",
];

/// Opaque identifier of a code node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodeId(String);

impl CodeId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for CodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A code node: label, definition, optional parent, display color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Code {
    pub id: CodeId,
    pub label: String,
    #[serde(default)]
    pub definition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<CodeId>,
    #[serde(default)]
    pub color: String,
}

impl Code {
    pub fn new(label: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            id: CodeId::generate(),
            label: label.into(),
            definition: definition.into(),
            parent_id: None,
            color: String::new(),
        }
    }

    pub fn with_parent(mut self, parent_id: CodeId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }
}

/// Canonical form of a label for duplicate detection: case-insensitive,
/// whitespace-normalized. Near-duplicates beyond this are left to the human
/// reviewer.
pub fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// The session's code forest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeForest {
    codes: BTreeMap<CodeId, Code>,
}

impl CodeForest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new code. The parent, when given, must already exist.
    pub fn insert(&mut self, code: Code) -> CoreResult<()> {
        if self.codes.contains_key(&code.id) {
            return Err(CoreError::validation(format!(
                "code {} already exists",
                code.id
            )));
        }
        if let Some(parent) = &code.parent_id {
            if !self.codes.contains_key(parent) {
                return Err(CoreError::validation(format!(
                    "parent code {} does not exist",
                    parent
                )));
            }
        }
        self.codes.insert(code.id.clone(), code);
        Ok(())
    }

    pub fn get(&self, id: &CodeId) -> Option<&Code> {
        self.codes.get(id)
    }

    pub fn contains(&self, id: &CodeId) -> bool {
        self.codes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Code> {
        self.codes.values()
    }

    pub fn roots(&self) -> Vec<&Code> {
        self.codes
            .values()
            .filter(|c| c.parent_id.is_none())
            .collect()
    }

    pub fn children(&self, id: &CodeId) -> Vec<&Code> {
        self.codes
            .values()
            .filter(|c| c.parent_id.as_ref() == Some(id))
            .collect()
    }

    /// All ids in the subtree rooted at `id`, excluding `id` itself.
    pub fn descendants(&self, id: &CodeId) -> Vec<CodeId> {
        let mut result = Vec::new();
        let mut stack: Vec<CodeId> = self.children(id).into_iter().map(|c| c.id.clone()).collect();
        while let Some(current) = stack.pop() {
            stack.extend(self.children(&current).into_iter().map(|c| c.id.clone()));
            result.push(current);
        }
        result
    }

    /// Whether `candidate` sits somewhere below `ancestor`.
    pub fn is_descendant(&self, candidate: &CodeId, ancestor: &CodeId) -> bool {
        let mut current = self.codes.get(candidate).and_then(|c| c.parent_id.clone());
        while let Some(parent) = current {
            if &parent == ancestor {
                return true;
            }
            current = self.codes.get(&parent).and_then(|c| c.parent_id.clone());
        }
        false
    }

    /// Move a code under a new parent (or to the root when `None`).
    ///
    /// Fails with a cycle error when the new parent is the code itself or one
    /// of its descendants.
    pub fn reparent(&mut self, id: &CodeId, new_parent: Option<&CodeId>) -> CoreResult<()> {
        if !self.codes.contains_key(id) {
            return Err(CoreError::not_found(format!("code {}", id)));
        }
        if let Some(parent) = new_parent {
            if !self.codes.contains_key(parent) {
                return Err(CoreError::validation(format!(
                    "parent code {} does not exist",
                    parent
                )));
            }
            if parent == id {
                return Err(CoreError::cycle(format!(
                    "cannot make code {} its own parent",
                    id
                )));
            }
            if self.is_descendant(parent, id) {
                return Err(CoreError::cycle(format!(
                    "cannot reparent code {} under its descendant {}",
                    id, parent
                )));
            }
        }
        if let Some(code) = self.codes.get_mut(id) {
            code.parent_id = new_parent.cloned();
        }
        Ok(())
    }

    pub fn rename(&mut self, id: &CodeId, label: impl Into<String>) -> CoreResult<()> {
        match self.codes.get_mut(id) {
            Some(code) => {
                code.label = label.into();
                Ok(())
            }
            None => Err(CoreError::not_found(format!("code {}", id))),
        }
    }

    pub fn set_definition(&mut self, id: &CodeId, definition: impl Into<String>) -> CoreResult<()> {
        match self.codes.get_mut(id) {
            Some(code) => {
                code.definition = definition.into();
                Ok(())
            }
            None => Err(CoreError::not_found(format!("code {}", id))),
        }
    }

    /// Remove a code, returning every removed id (the whole subtree when
    /// cascading). Removal with children present and no cascade is rejected.
    pub fn remove(&mut self, id: &CodeId, cascade: bool) -> CoreResult<Vec<CodeId>> {
        if !self.codes.contains_key(id) {
            return Err(CoreError::not_found(format!("code {}", id)));
        }
        let children = self.children(id);
        if !children.is_empty() && !cascade {
            return Err(CoreError::validation(format!(
                "code {} has {} child codes; reparent them or request a cascade",
                id,
                children.len()
            )));
        }

        let mut removed = if cascade { self.descendants(id) } else { Vec::new() };
        removed.push(id.clone());
        for rid in &removed {
            self.codes.remove(rid);
        }
        Ok(removed)
    }

    /// Find any code whose normalized label matches.
    pub fn find_by_normalized_label(&self, label: &str) -> Option<&Code> {
        let needle = normalize_label(label);
        self.codes
            .values()
            .find(|c| normalize_label(&c.label) == needle)
    }

    /// Find a direct child of `parent` (or a root when `None`) by normalized
    /// label.
    pub fn find_child_by_normalized_label(
        &self,
        parent: Option<&CodeId>,
        label: &str,
    ) -> Option<&Code> {
        let needle = normalize_label(label);
        self.codes
            .values()
            .find(|c| c.parent_id.as_ref() == parent && normalize_label(&c.label) == needle)
    }

    /// Next palette color for a newly created code.
    pub fn next_color(&self) -> String {
        CODE_COLORS[self.codes.len() % CODE_COLORS.len()].to_string()
    }
}
