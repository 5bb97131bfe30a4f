//! Critical Path Method engine.
//!
//! Runs the forward and backward passes over an [`ActivityNetwork`] snapshot,
//! producing early/late dates, total and free float, and the critical path.
//! Every run recomputes the whole schedule; nothing is updated incrementally.
//!
//! [`ActivityNetwork`]: crate::network::ActivityNetwork

mod calculation;
mod path;
mod types;

pub use calculation::{CpmEngine, CpmError};
pub use path::trace_critical_path;
pub use types::{CpmPhase, CpmResult, PassTimings, ScheduleResult};
pub(crate) use types::offset_to_date;
