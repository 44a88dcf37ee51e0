//! Selection pipeline: load show/click counts for a (slot, social group),
//! score them with UCB1, record the show for the winner and return it.

use rotator_bandit::select_arm;
use rotator_core::types::{BannerId, SlotId, SocialGroupId};
use rotator_core::{RotationStore, RotatorError, RotatorResult};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Picks the next banner for a slot. Holds no state between calls; every
/// request reads fresh counts from the store.
pub struct SelectionEngine {
    store: Arc<dyn RotationStore>,
}

impl SelectionEngine {
    pub fn new(store: Arc<dyn RotationStore>) -> Self {
        Self { store }
    }

    /// Choose a banner for `slot_id` as seen by `social_group_id` and record
    /// that it was shown.
    ///
    /// The show is written after scoring, so the counts used for the decision
    /// never include the show the decision causes. Two concurrent calls may
    /// read the same counts and pick the same banner.
    pub async fn choose_banner(
        &self,
        slot_id: SlotId,
        social_group_id: SocialGroupId,
    ) -> RotatorResult<BannerId> {
        const OP: &str = "choose_banner";

        metrics::counter!("rotator.selections").increment(1);

        let stats = self
            .store
            .aggregated_stats(slot_id, social_group_id)
            .await
            .map_err(|e| RotatorError::from_store(OP, e))?;

        if stats.is_empty() {
            metrics::counter!("rotator.no_candidates").increment(1);
            debug!(
                slot_id = slot_id,
                social_group_id = social_group_id,
                "No scoreable banners"
            );
            return Err(RotatorError::NoCandidates {
                slot_id,
                social_group_id,
            });
        }

        let (attempts, successes): (Vec<u64>, Vec<u64>) = stats
            .iter()
            .map(|s| (s.show_count, s.click_count))
            .unzip();

        let index = select_arm(&attempts, &successes).map_err(|e| {
            error!(
                slot_id = slot_id,
                social_group_id = social_group_id,
                error = %e,
                "Scoring rejected store statistics"
            );
            RotatorError::Internal {
                op: OP,
                source: e.into(),
            }
        })?;
        let banner_id = stats[index].banner_id;

        if let Err(e) = self
            .store
            .insert_exposure(banner_id, slot_id, social_group_id)
            .await
        {
            warn!(
                banner_id = banner_id,
                slot_id = slot_id,
                social_group_id = social_group_id,
                error = %e,
                "Failed to record banner show"
            );
            metrics::counter!("rotator.recording_errors").increment(1);
            return Err(RotatorError::RecordingFailed {
                banner_id,
                source: e,
            });
        }

        debug!(
            banner_id = banner_id,
            slot_id = slot_id,
            social_group_id = social_group_id,
            candidates = stats.len(),
            "Banner chosen"
        );
        Ok(banner_id)
    }
}
