//! `voxrank-tracker` — presence tracking and the host-confirmation machine.
//!
//! Both trackers are plain instances owning an `Arc<Store>`; all their
//! durable state lives in the store so a process restart loses nothing.

mod host;
mod presence;

pub use host::HostTracker;
pub use presence::PresenceTracker;
