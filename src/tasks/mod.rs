//! Background Tasks Module
//!
//! Contains background tasks that run periodically while the process is up.
//!
//! # Tasks
//! - Reaper: sweeps expired cache entries and finished rate-limit windows

mod reaper;

use std::sync::Arc;

pub use reaper::{spawn_reaper, ReaperHandle};

// == Sweep Trait ==
/// Something holding time-bounded state that can be swept in one pass.
pub trait Sweep: Send + Sync + 'static {
    /// Name used in log lines.
    fn name(&self) -> &str;

    /// Removes every expired item, returning how many were removed.
    fn purge_expired(&self) -> usize;
}

impl<S: Sweep> Sweep for Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn purge_expired(&self) -> usize {
        (**self).purge_expired()
    }
}
