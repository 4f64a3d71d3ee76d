//! Live migration status tracking.
//!
//! Receives status, progress, issue and milestone updates over a WebSocket
//! (with HTTP polling while the socket is down), merges them into an
//! in-memory view of every migrating component, derives status transitions
//! and progress milestones, and notifies subscribers.
//!
//! ```ignore
//! let tracker = MigrationTracker::connect(TrackerOptions::default())?;
//! tracker.subscribe(EventCategory::IssueDetected, callback(|event| {
//!     if let Some(notice) = notice_for(event) {
//!         println!("{}: {}", notice.title, notice.message);
//!     }
//! }));
//! ```

pub mod config;
pub mod detect;
pub mod events;
pub mod message;
pub mod model;
pub mod notify;
pub mod store;
pub mod task;
pub mod tracker;
pub mod transport;

pub use events::{Callback, EventCategory, TrackerEvent, callback};
pub use message::{DecodeError, InboundMessage};
pub use model::{ComponentStatus, IssueAlert, MigrationStatus, PartialStatus, ProgressData};
pub use notify::{Notice, NoticeLevel, notice_for};
pub use store::StateStore;
pub use tracker::MigrationTracker;
pub use transport::{ConnectionState, FetchError, TrackerOptions, Visibility};
