//! `voxrank-scheduler` — minute and hourly tick engines plus their
//! drift-corrected run loops.

mod engine;
mod loops;
mod member_sync;

pub use engine::{MinuteOutcome, TickEngine};
pub use loops::{run_hourly_loop, run_minute_loop, secs_until_next_hour, secs_until_next_minute};
pub use member_sync::MemberSyncOutcome;
