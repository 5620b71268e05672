pub mod error;
pub mod ids;
pub mod level;
pub mod period;
pub mod records;
pub mod traits;

pub use error::VoxError;
pub use ids::{ChannelId, ParticipantId, WorkspaceId};
pub use level::{level_from_xp, level_progress, xp_required};
pub use period::PeriodClock;
pub use records::{
    HostSessionRecord, HostXpRecord, MemberState, ParticipantFlags, PeriodState, RankRow,
    VoicePresenceRecord, VoiceXpRecord, Window,
};
pub use traits::{
    BoardPublisher, ChannelOccupancy, ConfirmationEvent, Directory, MemberEnumeration,
    MemberProfile, Occupant, PresenceSource, RoleGranter,
};
