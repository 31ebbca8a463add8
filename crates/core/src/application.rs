//! Code Applications
//!
//! The many-to-many relation between text segments and codes. Keyed by
//! (segment, code): re-applying a code to the same segment overwrites the
//! confidence and rationale instead of duplicating the pair.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::code::CodeId;
use crate::segment::SegmentKey;

/// Who attached the code to the segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationSource {
    Ai,
    Human,
}

impl fmt::Display for ApplicationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplicationSource::Ai => write!(f, "ai"),
            ApplicationSource::Human => write!(f, "human"),
        }
    }
}

/// One code applied to one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeApplication {
    pub segment: SegmentKey,
    pub code_id: CodeId,
    pub confidence: f64,
    #[serde(default)]
    pub rationale: String,
    pub source: ApplicationSource,
}

impl CodeApplication {
    pub fn new(segment: SegmentKey, code_id: CodeId, source: ApplicationSource) -> Self {
        Self {
            segment,
            code_id,
            confidence: 1.0,
            rationale: String::new(),
            source,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }
}

/// The session's set of code applications, indexed segment-first.
///
/// Serializes as a flat list so the export boundary sees stable field names
/// instead of nested map keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(into = "Vec<CodeApplication>", from = "Vec<CodeApplication>")]
pub struct ApplicationSet {
    entries: BTreeMap<SegmentKey, BTreeMap<CodeId, CodeApplication>>,
}

impl ApplicationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the application for this (segment, code) pair.
    /// Returns true when an existing application was overwritten.
    pub fn upsert(&mut self, application: CodeApplication) -> bool {
        self.entries
            .entry(application.segment.clone())
            .or_default()
            .insert(application.code_id.clone(), application)
            .is_some()
    }

    pub fn get(&self, segment: &SegmentKey, code_id: &CodeId) -> Option<&CodeApplication> {
        self.entries.get(segment).and_then(|m| m.get(code_id))
    }

    pub fn remove(&mut self, segment: &SegmentKey, code_id: &CodeId) -> Option<CodeApplication> {
        let bucket = self.entries.get_mut(segment)?;
        let removed = bucket.remove(code_id);
        if bucket.is_empty() {
            self.entries.remove(segment);
        }
        removed
    }

    pub fn for_segment(&self, segment: &SegmentKey) -> Vec<&CodeApplication> {
        self.entries
            .get(segment)
            .map(|m| m.values().collect())
            .unwrap_or_default()
    }

    /// The set of code ids applied to one segment.
    pub fn codes_for_segment(&self, segment: &SegmentKey) -> BTreeSet<CodeId> {
        self.entries
            .get(segment)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn for_code<'a>(&'a self, code_id: &'a CodeId) -> impl Iterator<Item = &'a CodeApplication> {
        self.entries
            .values()
            .filter_map(move |m| m.get(code_id))
    }

    pub fn usage_count(&self, code_id: &CodeId) -> usize {
        self.for_code(code_id).count()
    }

    /// Drop every application of a code. Returns how many were removed.
    pub fn remove_code(&mut self, code_id: &CodeId) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, bucket| {
            if bucket.remove(code_id).is_some() {
                removed += 1;
            }
            !bucket.is_empty()
        });
        removed
    }

    /// Move every application of `from` onto `to`, used when merging codes.
    ///
    /// A segment that already carries `to` keeps its existing application;
    /// the absorbed one is dropped. Returns how many applications moved.
    pub fn retarget(&mut self, from: &CodeId, to: &CodeId) -> usize {
        let mut moved = 0;
        for bucket in self.entries.values_mut() {
            if let Some(mut application) = bucket.remove(from) {
                if !bucket.contains_key(to) {
                    application.code_id = to.clone();
                    bucket.insert(to.clone(), application);
                    moved += 1;
                }
            }
        }
        moved
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CodeApplication> {
        self.entries.values().flat_map(|m| m.values())
    }

    /// Applications restricted to one case.
    pub fn for_case<'a>(&'a self, case_id: &'a str) -> impl Iterator<Item = &'a CodeApplication> {
        self.entries
            .iter()
            .filter(move |(key, _)| key.case_id == case_id)
            .flat_map(|(_, m)| m.values())
    }
}

impl From<Vec<CodeApplication>> for ApplicationSet {
    fn from(applications: Vec<CodeApplication>) -> Self {
        let mut set = ApplicationSet::new();
        for application in applications {
            set.upsert(application);
        }
        set
    }
}

impl From<ApplicationSet> for Vec<CodeApplication> {
    fn from(set: ApplicationSet) -> Self {
        set.entries
            .into_values()
            .flat_map(|m| m.into_values())
            .collect()
    }
}
