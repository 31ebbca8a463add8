//! Session State
//!
//! The one mutable store of a working session: imported segments, the code
//! and theme forests, code applications, per-segment analysis status, and
//! computed reliability reports. The application crate owns an instance
//! behind a session-wide lock; nothing here is static or shared across
//! sessions.

use std::collections::BTreeMap;

use crate::application::ApplicationSet;
use crate::code::CodeForest;
use crate::error::CoreResult;
use crate::reliability::ReliabilityReport;
use crate::segment::{SegmentKey, SegmentStatus, SegmentStore, TextSegment};
use crate::theme::ThemeForest;

/// All mutable state of one analysis session.
#[derive(Debug, Default)]
pub struct SessionState {
    pub segments: SegmentStore,
    pub codes: CodeForest,
    pub themes: ThemeForest,
    pub applications: ApplicationSet,
    pub status: BTreeMap<SegmentKey, SegmentStatus>,
    pub reliability: BTreeMap<String, ReliabilityReport>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Import a batch of segments from the data-preparation collaborator.
    ///
    /// Key uniqueness is validated before anything is stored; each imported
    /// segment starts out unanalyzed.
    pub fn load_segments(&mut self, segments: Vec<TextSegment>) -> CoreResult<usize> {
        let keys: Vec<SegmentKey> = segments.iter().map(|s| s.key.clone()).collect();
        let count = self.segments.insert_all(segments)?;
        for key in keys {
            self.status.insert(key, SegmentStatus::Unanalyzed);
        }
        Ok(count)
    }

    /// Current analysis status of a segment (unanalyzed when never touched).
    pub fn segment_status(&self, key: &SegmentKey) -> SegmentStatus {
        self.status.get(key).copied().unwrap_or_default()
    }

    pub fn set_segment_status(&mut self, key: &SegmentKey, status: SegmentStatus) {
        self.status.insert(key.clone(), status);
    }
}
