//! Directory synchronization.

use std::collections::HashSet;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use voxrank_core::{ParticipantId, WorkspaceId};

use crate::engine::TickEngine;

#[derive(Debug, Default)]
pub struct MemberSyncOutcome {
    /// Members present in this enumeration.
    pub known: usize,
    /// Previously departed members seen again.
    pub returned: usize,
    /// Cached members newly marked departed.
    pub left_marked: usize,
    pub complete: bool,
}

impl TickEngine {
    /// Pull a full member enumeration and reconcile the cache against it.
    ///
    /// Departure marking is skipped entirely when the enumeration reports
    /// itself incomplete; acting on a partial listing would depart every
    /// member it happened to miss.
    pub async fn sync_member_state(
        &self,
        workspace: WorkspaceId,
        now: DateTime<Utc>,
    ) -> Result<MemberSyncOutcome> {
        let enumeration = self.directory().enumerate_members(workspace).await?;
        let store = self.store();

        store.upsert_members(workspace, &enumeration.members, now)?;
        let present: HashSet<ParticipantId> = enumeration
            .members
            .iter()
            .map(|m| m.participant_id)
            .collect();

        let returned = store.mark_members_returned(workspace, &present)?;
        let left_marked = if enumeration.complete {
            store.mark_members_left(workspace, &present, now)?
        } else {
            warn!(%workspace, known = present.len(), "partial enumeration, departure marking skipped");
            0
        };

        let outcome = MemberSyncOutcome {
            known: present.len(),
            returned,
            left_marked,
            complete: enumeration.complete,
        };
        info!(
            %workspace,
            known = outcome.known,
            returned = outcome.returned,
            left_marked = outcome.left_marked,
            complete = outcome.complete,
            "member sync"
        );
        Ok(outcome)
    }
}
