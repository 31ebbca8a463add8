//! Text Segments
//!
//! The immutable unit of source text handed to the analysis engines. Segments
//! are produced by an external data-preparation collaborator and imported
//! through `SegmentStore::insert_all`, which enforces key uniqueness up front.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Stable identifier of a text segment within a session: the case it belongs
/// to plus its position marker within that case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentKey {
    pub case_id: String,
    pub segment_id: String,
}

impl SegmentKey {
    pub fn new(case_id: impl Into<String>, segment_id: impl Into<String>) -> Self {
        Self {
            case_id: case_id.into(),
            segment_id: segment_id.into(),
        }
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.case_id, self.segment_id)
    }
}

/// Optional descriptive metadata attached at import time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// An immutable unit of source text. Never mutated after import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSegment {
    pub key: SegmentKey,
    pub text: String,
    #[serde(default)]
    pub metadata: SegmentMetadata,
}

impl TextSegment {
    pub fn new(
        case_id: impl Into<String>,
        segment_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            key: SegmentKey::new(case_id, segment_id),
            text: text.into(),
            metadata: SegmentMetadata::default(),
        }
    }

    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.metadata.speaker = Some(speaker.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.metadata.timestamp = Some(timestamp);
        self
    }
}

/// Analysis state of one segment.
///
/// The engine moves a segment to `Proposed` when AI suggestions land; only an
/// external caller (the human reviewer) confirms or demotes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    #[default]
    Unanalyzed,
    Proposed,
    Confirmed,
}

impl fmt::Display for SegmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentStatus::Unanalyzed => write!(f, "unanalyzed"),
            SegmentStatus::Proposed => write!(f, "proposed"),
            SegmentStatus::Confirmed => write!(f, "confirmed"),
        }
    }
}

/// Session-scoped store of imported segments, keyed for deterministic
/// iteration order.
#[derive(Debug, Clone, Default)]
pub struct SegmentStore {
    segments: BTreeMap<SegmentKey, TextSegment>,
}

impl SegmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and insert a batch of segments.
    ///
    /// Uniqueness of (case_id, segment_id) is checked against both the
    /// existing store and the incoming batch before anything is inserted, so
    /// a failed import leaves the store untouched.
    pub fn insert_all(&mut self, segments: Vec<TextSegment>) -> CoreResult<usize> {
        let mut incoming: BTreeSet<&SegmentKey> = BTreeSet::new();
        for segment in &segments {
            if self.segments.contains_key(&segment.key) || !incoming.insert(&segment.key) {
                return Err(CoreError::validation(format!(
                    "duplicate segment key {}",
                    segment.key
                )));
            }
        }

        let count = segments.len();
        for segment in segments {
            self.segments.insert(segment.key.clone(), segment);
        }
        Ok(count)
    }

    pub fn get(&self, key: &SegmentKey) -> Option<&TextSegment> {
        self.segments.get(key)
    }

    pub fn contains(&self, key: &SegmentKey) -> bool {
        self.segments.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &SegmentKey> {
        self.segments.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TextSegment> {
        self.segments.values()
    }

    /// Distinct case ids present in the store.
    pub fn case_ids(&self) -> BTreeSet<String> {
        self.segments.keys().map(|k| k.case_id.clone()).collect()
    }

    /// All segments belonging to one case.
    pub fn segments_for_case<'a>(
        &'a self,
        case_id: &'a str,
    ) -> impl Iterator<Item = &'a TextSegment> {
        self.segments
            .values()
            .filter(move |s| s.key.case_id == case_id)
    }
}
