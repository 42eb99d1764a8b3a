//! Progress-callback trait for per-item migration events.
//!
//! Inject an [`Arc<dyn MigrationProgressCallback>`] via
//! [`crate::config::MigrationConfigBuilder::progress_callback`] to receive
//! events as a command works through its issues, milestones or uploads.
//!
//! # Example
//!
//! ```rust
//! use redmine2gitlab::{MigrationConfig, MigrationProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     created: AtomicUsize,
//! }
//!
//! impl MigrationProgressCallback for CountingCallback {
//!     fn on_item_complete(&self, resource: &str, redmine_id: u64, _gitlab_id: u64) {
//!         self.created.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{resource} {redmine_id} migrated");
//!     }
//! }
//!
//! let config = MigrationConfig::builder()
//!     .redmine("https://rm.local", "projects/tool", "")
//!     .gitlab("https://gl.local", "team/tool", "")
//!     .progress_callback(Arc::new(CountingCallback { created: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the migration commands as they process each entity.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `resource` is the plural resource name
/// (`"issues"`, `"milestones"`, `"attachments"`, `"wiki pages"`…).
pub trait MigrationProgressCallback: Send + Sync {
    /// Called once per command, before the first round.
    fn on_start(&self, resource: &str, total: usize) {
        let _ = (resource, total);
    }

    /// Called when a new retry round starts over `pending` items.
    fn on_round_start(&self, resource: &str, round: u32, pending: usize) {
        let _ = (resource, round, pending);
    }

    /// Called when an entity was created on the destination.
    fn on_item_complete(&self, resource: &str, redmine_id: u64, gitlab_id: u64) {
        let _ = (resource, redmine_id, gitlab_id);
    }

    /// Called on every failed attempt; the entity may still succeed later.
    fn on_item_error(&self, resource: &str, redmine_id: u64, error: &str) {
        let _ = (resource, redmine_id, error);
    }

    /// Called once when the command is done.
    fn on_complete(&self, resource: &str, total: usize, created: usize) {
        let _ = (resource, total, created);
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl MigrationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::MigrationConfig`].
pub type ProgressCallback = Arc<dyn MigrationProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        total: AtomicUsize,
        rounds: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        created: AtomicUsize,
    }

    impl MigrationProgressCallback for TrackingCallback {
        fn on_start(&self, _resource: &str, total: usize) {
            self.total.store(total, Ordering::SeqCst);
        }

        fn on_round_start(&self, _resource: &str, _round: u32, _pending: usize) {
            self.rounds.fetch_add(1, Ordering::SeqCst);
        }

        fn on_item_complete(&self, _resource: &str, _redmine_id: u64, _gitlab_id: u64) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_item_error(&self, _resource: &str, _redmine_id: u64, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_complete(&self, _resource: &str, _total: usize, created: usize) {
            self.created.store(created, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_start("issues", 5);
        cb.on_round_start("issues", 1, 5);
        cb.on_item_complete("issues", 1, 1);
        cb.on_item_error("issues", 2, "HTTP 500");
        cb.on_complete("issues", 5, 4);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_start("milestones", 3);
        tracker.on_round_start("milestones", 1, 3);
        tracker.on_item_complete("milestones", 10, 1);
        tracker.on_item_complete("milestones", 11, 2);
        tracker.on_item_error("milestones", 12, "timeout");
        tracker.on_round_start("milestones", 2, 1);
        tracker.on_item_complete("milestones", 12, 3);
        tracker.on_complete("milestones", 3, 3);

        assert_eq!(tracker.total.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.rounds.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.created.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_start("attachments", 10);
        cb.on_item_complete("attachments", 1, 0);
    }
}
