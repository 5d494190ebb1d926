use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing upload pipeline activity.
#[derive(Default)]
pub struct IngestMetrics {
    uploads_accepted: AtomicU64,
    uploads_rejected: AtomicU64,
    duplicates_returned: AtomicU64,
    notes_created: AtomicU64,
    analyses_completed: AtomicU64,
    analyses_degraded: AtomicU64,
    vision_escalations: AtomicU64,
}

impl IngestMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an upload that passed validation.
    pub fn record_upload(&self) {
        self.uploads_accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an upload that ended in a client or server error.
    pub fn record_rejection(&self) {
        self.uploads_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an upload that collapsed onto an existing note.
    pub fn record_duplicate(&self) {
        self.duplicates_returned.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a newly persisted note and whether its analysis completed.
    pub fn record_note(&self, analyzed: bool) {
        self.notes_created.fetch_add(1, Ordering::Relaxed);
        if analyzed {
            self.analyses_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.analyses_degraded.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record an extraction whose vision-fallback transcript was chosen.
    pub fn record_vision_escalation(&self) {
        self.vision_escalations.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uploads_accepted: self.uploads_accepted.load(Ordering::Relaxed),
            uploads_rejected: self.uploads_rejected.load(Ordering::Relaxed),
            duplicates_returned: self.duplicates_returned.load(Ordering::Relaxed),
            notes_created: self.notes_created.load(Ordering::Relaxed),
            analyses_completed: self.analyses_completed.load(Ordering::Relaxed),
            analyses_degraded: self.analyses_degraded.load(Ordering::Relaxed),
            vision_escalations: self.vision_escalations.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Uploads that passed validation.
    pub uploads_accepted: u64,
    /// Uploads that failed validation, extraction, or persistence.
    pub uploads_rejected: u64,
    /// Uploads answered with an existing note.
    pub duplicates_returned: u64,
    /// Notes persisted since startup.
    pub notes_created: u64,
    /// Notes persisted with an analysis attached.
    pub analyses_completed: u64,
    /// Notes persisted without an analysis.
    pub analyses_degraded: u64,
    /// Extractions that kept the vision-fallback transcript.
    pub vision_escalations: u64,
}
