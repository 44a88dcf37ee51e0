//! Persistence seam for the rotator.
//!
//! The selection engine, association manager and statistics exporter all
//! accept an `Arc<dyn RotationStore>`; they never see tables or SQL.

use crate::error::StoreError;
use crate::types::{
    Banner, BannerId, BannerSummary, Slot, SlotId, SocialGroup, SocialGroupId, StatEvent,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait RotationStore: Send + Sync {
    async fn slot(&self, id: SlotId) -> StoreResult<Option<Slot>>;

    async fn banner(&self, id: BannerId) -> StoreResult<Option<Banner>>;

    async fn social_group(&self, id: SocialGroupId) -> StoreResult<Option<SocialGroup>>;

    async fn association_exists(&self, banner_id: BannerId, slot_id: SlotId) -> StoreResult<bool>;

    /// Put a banner into rotation for a slot and seed one show per known
    /// social group. Either everything is written or nothing is.
    async fn create_association(&self, banner_id: BannerId, slot_id: SlotId) -> StoreResult<()>;

    /// Take a banner out of rotation. Show and click history is kept.
    async fn delete_association(&self, banner_id: BannerId, slot_id: SlotId) -> StoreResult<()>;

    /// Show/click counts for every banner currently in rotation for `slot_id`
    /// that has at least one show for `social_group_id`, ordered by banner id.
    async fn aggregated_stats(
        &self,
        slot_id: SlotId,
        social_group_id: SocialGroupId,
    ) -> StoreResult<Vec<BannerSummary>>;

    async fn insert_exposure(
        &self,
        banner_id: BannerId,
        slot_id: SlotId,
        social_group_id: SocialGroupId,
    ) -> StoreResult<()>;

    /// Record a click. Fails with `NotFound(Association)` unless the banner is
    /// in rotation for the slot at the moment of the write.
    async fn insert_click(
        &self,
        banner_id: BannerId,
        slot_id: SlotId,
        social_group_id: SocialGroupId,
    ) -> StoreResult<()>;

    /// All shows and clicks with `from <= timestamp < to`.
    async fn events_in_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<StatEvent>>;
}
