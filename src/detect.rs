//! Derived-event detection.
//!
//! Pure predicates used by the store to turn raw deltas into higher-level
//! events. They have no side effects and can be exercised on their own.

use crate::model::MigrationStatus;

/// Progress thresholds whose crossing counts as a milestone
pub const MILESTONES: [u32; 4] = [25, 50, 75, 100];

/// Status transitions worth a louder notification
pub const SIGNIFICANT_TRANSITIONS: [(MigrationStatus, MigrationStatus); 4] = [
    (MigrationStatus::Pending, MigrationStatus::InProgress),
    (MigrationStatus::InProgress, MigrationStatus::Completed),
    (MigrationStatus::InProgress, MigrationStatus::Testing),
    (MigrationStatus::Testing, MigrationStatus::Completed),
];

/// True iff some threshold `t` satisfies `old < t <= new`.
///
/// A jump spanning several thresholds is still a single yes.
pub fn is_progress_milestone(old: u32, new: u32) -> bool {
    MILESTONES.iter().any(|&t| old < t && t <= new)
}

/// True iff `(old, new)` is on the fixed allow-list.
pub fn is_significant_status_change(old: MigrationStatus, new: MigrationStatus) -> bool {
    SIGNIFICANT_TRANSITIONS.contains(&(old, new))
}
