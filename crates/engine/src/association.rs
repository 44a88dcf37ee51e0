//! Administrative operations on the rotation set, plus click recording.
//!
//! Existence is checked up front so callers get a precise not-found kind;
//! the store re-checks under its own lock, so a concurrent change between the
//! check and the write still surfaces as the matching error.

use rotator_core::types::{BannerId, SlotId, SocialGroupId};
use rotator_core::{RotationStore, RotatorError, RotatorResult};
use std::sync::Arc;
use tracing::{info, warn};

pub struct AssociationManager {
    store: Arc<dyn RotationStore>,
}

impl AssociationManager {
    pub fn new(store: Arc<dyn RotationStore>) -> Self {
        Self { store }
    }

    /// Put a banner into rotation for a slot. Every social group known at this
    /// point gets one baseline show so the banner can be scored immediately.
    pub async fn add_banner_to_slot(&self, banner_id: BannerId, slot_id: SlotId) -> RotatorResult<()> {
        const OP: &str = "add_banner_to_slot";

        self.require_slot(OP, slot_id).await?;
        if self
            .store
            .banner(banner_id)
            .await
            .map_err(|e| RotatorError::from_store(OP, e))?
            .is_none()
        {
            return Err(RotatorError::BannerNotFound(banner_id));
        }
        if self.is_associated(OP, banner_id, slot_id).await? {
            return Err(RotatorError::AlreadyAssociated { banner_id, slot_id });
        }

        self.store
            .create_association(banner_id, slot_id)
            .await
            .map_err(|e| {
                warn!(banner_id = banner_id, slot_id = slot_id, error = %e, "Can't add banner to slot");
                RotatorError::from_store(OP, e)
            })?;

        metrics::counter!("rotator.associations.created").increment(1);
        info!(banner_id = banner_id, slot_id = slot_id, "Banner added to rotation");
        Ok(())
    }

    /// Take a banner out of rotation. Its show/click history stays in place.
    pub async fn remove_banner_from_slot(
        &self,
        banner_id: BannerId,
        slot_id: SlotId,
    ) -> RotatorResult<()> {
        const OP: &str = "remove_banner_from_slot";

        self.require_slot(OP, slot_id).await?;
        if !self.is_associated(OP, banner_id, slot_id).await? {
            return Err(RotatorError::AssociationNotFound { banner_id, slot_id });
        }

        self.store
            .delete_association(banner_id, slot_id)
            .await
            .map_err(|e| {
                warn!(banner_id = banner_id, slot_id = slot_id, error = %e, "Can't remove banner from slot");
                RotatorError::from_store(OP, e)
            })?;

        metrics::counter!("rotator.associations.removed").increment(1);
        info!(banner_id = banner_id, slot_id = slot_id, "Banner removed from rotation");
        Ok(())
    }

    /// Record a click on a banner currently in rotation for the slot.
    /// Checks run in order: slot, rotation membership, social group.
    pub async fn record_click(
        &self,
        banner_id: BannerId,
        slot_id: SlotId,
        social_group_id: SocialGroupId,
    ) -> RotatorResult<()> {
        const OP: &str = "record_click";

        self.require_slot(OP, slot_id).await?;
        if !self.is_associated(OP, banner_id, slot_id).await? {
            return Err(RotatorError::AssociationNotFound { banner_id, slot_id });
        }
        if self
            .store
            .social_group(social_group_id)
            .await
            .map_err(|e| RotatorError::from_store(OP, e))?
            .is_none()
        {
            return Err(RotatorError::SocialGroupNotFound(social_group_id));
        }

        self.store
            .insert_click(banner_id, slot_id, social_group_id)
            .await
            .map_err(|e| {
                warn!(
                    banner_id = banner_id,
                    slot_id = slot_id,
                    social_group_id = social_group_id,
                    error = %e,
                    "Can't record click"
                );
                RotatorError::from_store(OP, e)
            })?;

        metrics::counter!("rotator.clicks").increment(1);
        Ok(())
    }

    async fn require_slot(&self, op: &'static str, slot_id: SlotId) -> RotatorResult<()> {
        match self.store.slot(slot_id).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(RotatorError::SlotNotFound(slot_id)),
            Err(e) => Err(RotatorError::from_store(op, e)),
        }
    }

    async fn is_associated(
        &self,
        op: &'static str,
        banner_id: BannerId,
        slot_id: SlotId,
    ) -> RotatorResult<bool> {
        self.store
            .association_exists(banner_id, slot_id)
            .await
            .map_err(|e| RotatorError::from_store(op, e))
    }
}
