//! Theme Forest
//!
//! Themes group related codes one level up from the code forest. They form
//! their own forest, independent of the code forest's shape; every member
//! code id must exist in the code forest at the time the theme is created or
//! a member is added.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::code::{normalize_label, CodeForest, CodeId};
use crate::error::{CoreError, CoreResult};

/// Opaque identifier of a theme node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThemeId(String);

impl ThemeId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThemeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ThemeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ThemeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A theme node and the codes it subsumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub id: ThemeId,
    pub label: String,
    #[serde(default)]
    pub definition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ThemeId>,
    #[serde(default)]
    pub code_ids: BTreeSet<CodeId>,
}

impl Theme {
    pub fn new(label: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            id: ThemeId::generate(),
            label: label.into(),
            definition: definition.into(),
            parent_id: None,
            code_ids: BTreeSet::new(),
        }
    }

    pub fn with_parent(mut self, parent_id: ThemeId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_codes(mut self, code_ids: impl IntoIterator<Item = CodeId>) -> Self {
        self.code_ids = code_ids.into_iter().collect();
        self
    }
}

/// The session's theme forest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThemeForest {
    themes: BTreeMap<ThemeId, Theme>,
}

impl ThemeForest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new theme. The parent, when given, must already exist, and
    /// every member code id must exist in the code forest.
    pub fn insert(&mut self, theme: Theme, codes: &CodeForest) -> CoreResult<()> {
        if self.themes.contains_key(&theme.id) {
            return Err(CoreError::validation(format!(
                "theme {} already exists",
                theme.id
            )));
        }
        if let Some(parent) = &theme.parent_id {
            if !self.themes.contains_key(parent) {
                return Err(CoreError::validation(format!(
                    "parent theme {} does not exist",
                    parent
                )));
            }
        }
        for code_id in &theme.code_ids {
            if !codes.contains(code_id) {
                return Err(CoreError::validation(format!(
                    "theme {} references unknown code {}",
                    theme.label, code_id
                )));
            }
        }
        self.themes.insert(theme.id.clone(), theme);
        Ok(())
    }

    pub fn get(&self, id: &ThemeId) -> Option<&Theme> {
        self.themes.get(id)
    }

    pub fn contains(&self, id: &ThemeId) -> bool {
        self.themes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.themes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.themes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Theme> {
        self.themes.values()
    }

    pub fn roots(&self) -> Vec<&Theme> {
        self.themes
            .values()
            .filter(|t| t.parent_id.is_none())
            .collect()
    }

    pub fn children(&self, id: &ThemeId) -> Vec<&Theme> {
        self.themes
            .values()
            .filter(|t| t.parent_id.as_ref() == Some(id))
            .collect()
    }

    pub fn is_descendant(&self, candidate: &ThemeId, ancestor: &ThemeId) -> bool {
        let mut current = self.themes.get(candidate).and_then(|t| t.parent_id.clone());
        while let Some(parent) = current {
            if &parent == ancestor {
                return true;
            }
            current = self.themes.get(&parent).and_then(|t| t.parent_id.clone());
        }
        false
    }

    pub fn reparent(&mut self, id: &ThemeId, new_parent: Option<&ThemeId>) -> CoreResult<()> {
        if !self.themes.contains_key(id) {
            return Err(CoreError::not_found(format!("theme {}", id)));
        }
        if let Some(parent) = new_parent {
            if !self.themes.contains_key(parent) {
                return Err(CoreError::validation(format!(
                    "parent theme {} does not exist",
                    parent
                )));
            }
            if parent == id {
                return Err(CoreError::cycle(format!(
                    "cannot make theme {} its own parent",
                    id
                )));
            }
            if self.is_descendant(parent, id) {
                return Err(CoreError::cycle(format!(
                    "cannot reparent theme {} under its descendant {}",
                    id, parent
                )));
            }
        }
        if let Some(theme) = self.themes.get_mut(id) {
            theme.parent_id = new_parent.cloned();
        }
        Ok(())
    }

    /// Remove a theme (and its subtree when cascading). Removal with children
    /// present and no cascade is rejected.
    pub fn remove(&mut self, id: &ThemeId, cascade: bool) -> CoreResult<Vec<ThemeId>> {
        if !self.themes.contains_key(id) {
            return Err(CoreError::not_found(format!("theme {}", id)));
        }
        let children = self.children(id);
        if !children.is_empty() && !cascade {
            return Err(CoreError::validation(format!(
                "theme {} has {} child themes; reparent them or request a cascade",
                id,
                children.len()
            )));
        }

        let mut removed = Vec::new();
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            if cascade {
                stack.extend(self.children(&current).into_iter().map(|t| t.id.clone()));
            }
            self.themes.remove(&current);
            removed.push(current);
        }
        Ok(removed)
    }

    pub fn add_code(&mut self, id: &ThemeId, code_id: CodeId, codes: &CodeForest) -> CoreResult<()> {
        if !codes.contains(&code_id) {
            return Err(CoreError::validation(format!(
                "code {} does not exist in the code forest",
                code_id
            )));
        }
        match self.themes.get_mut(id) {
            Some(theme) => {
                theme.code_ids.insert(code_id);
                Ok(())
            }
            None => Err(CoreError::not_found(format!("theme {}", id))),
        }
    }

    pub fn remove_code(&mut self, id: &ThemeId, code_id: &CodeId) -> CoreResult<bool> {
        match self.themes.get_mut(id) {
            Some(theme) => Ok(theme.code_ids.remove(code_id)),
            None => Err(CoreError::not_found(format!("theme {}", id))),
        }
    }

    /// Replace every membership of `old` with `new` (code merge).
    pub fn replace_code(&mut self, old: &CodeId, new: &CodeId) {
        for theme in self.themes.values_mut() {
            if theme.code_ids.remove(old) {
                theme.code_ids.insert(new.clone());
            }
        }
    }

    /// Drop every membership of a deleted code.
    pub fn purge_code(&mut self, code_id: &CodeId) {
        for theme in self.themes.values_mut() {
            theme.code_ids.remove(code_id);
        }
    }

    pub fn find_by_normalized_label(&self, label: &str) -> Option<&Theme> {
        let needle = normalize_label(label);
        self.themes
            .values()
            .find(|t| normalize_label(&t.label) == needle)
    }
}
