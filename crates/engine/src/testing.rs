//! Store fixtures shared by the engine unit tests.

#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rotator_core::store::StoreResult;
use rotator_core::types::{
    Banner, BannerId, BannerSummary, Slot, SlotId, SocialGroup, SocialGroupId, StatEvent,
};
use rotator_core::{RotationStore, StoreError};
use rotator_storage::MemoryStore;
use std::sync::Arc;

/// Slots 1-2, banners 1-3, social groups 1-2.
pub fn fixture_store() -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    for id in 1..=2 {
        store.insert_slot(Slot {
            id,
            description: format!("slot {id}"),
        });
        store.insert_social_group(SocialGroup {
            id,
            description: format!("group {id}"),
        });
    }
    for id in 1..=3 {
        store.insert_banner(Banner {
            id,
            description: format!("banner {id}"),
        });
    }
    Arc::new(store)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fail {
    AggregatedStats,
    InsertExposure,
    InsertClick,
    CreateAssociation,
    /// Return a stats row with zero shows.
    ZeroShowStats,
    /// `association_exists` answers from the current state, then the pair is
    /// removed before the caller gets to write.
    RemovalAfterCheck,
}

/// Delegates to a `MemoryStore` except for one operation, which misbehaves.
pub struct FailingStore {
    inner: Arc<MemoryStore>,
    fail: Fail,
}

impl FailingStore {
    pub fn new(inner: Arc<MemoryStore>, fail: Fail) -> Self {
        Self { inner, fail }
    }

    fn backend(&self) -> StoreError {
        StoreError::Backend(format!("injected {:?} failure", self.fail))
    }
}

#[async_trait]
impl RotationStore for FailingStore {
    async fn slot(&self, id: SlotId) -> StoreResult<Option<Slot>> {
        self.inner.slot(id).await
    }

    async fn banner(&self, id: BannerId) -> StoreResult<Option<Banner>> {
        self.inner.banner(id).await
    }

    async fn social_group(&self, id: SocialGroupId) -> StoreResult<Option<SocialGroup>> {
        self.inner.social_group(id).await
    }

    async fn association_exists(&self, banner_id: BannerId, slot_id: SlotId) -> StoreResult<bool> {
        let exists = self.inner.association_exists(banner_id, slot_id).await?;
        if exists && self.fail == Fail::RemovalAfterCheck {
            self.inner.delete_association(banner_id, slot_id).await?;
        }
        Ok(exists)
    }

    async fn create_association(&self, banner_id: BannerId, slot_id: SlotId) -> StoreResult<()> {
        if self.fail == Fail::CreateAssociation {
            return Err(self.backend());
        }
        self.inner.create_association(banner_id, slot_id).await
    }

    async fn delete_association(&self, banner_id: BannerId, slot_id: SlotId) -> StoreResult<()> {
        self.inner.delete_association(banner_id, slot_id).await
    }

    async fn aggregated_stats(
        &self,
        slot_id: SlotId,
        social_group_id: SocialGroupId,
    ) -> StoreResult<Vec<BannerSummary>> {
        match self.fail {
            Fail::AggregatedStats => Err(self.backend()),
            Fail::ZeroShowStats => Ok(vec![BannerSummary {
                banner_id: 1,
                slot_id,
                social_group_id,
                show_count: 0,
                click_count: 0,
            }]),
            _ => self.inner.aggregated_stats(slot_id, social_group_id).await,
        }
    }

    async fn insert_exposure(
        &self,
        banner_id: BannerId,
        slot_id: SlotId,
        social_group_id: SocialGroupId,
    ) -> StoreResult<()> {
        if self.fail == Fail::InsertExposure {
            return Err(self.backend());
        }
        self.inner
            .insert_exposure(banner_id, slot_id, social_group_id)
            .await
    }

    async fn insert_click(
        &self,
        banner_id: BannerId,
        slot_id: SlotId,
        social_group_id: SocialGroupId,
    ) -> StoreResult<()> {
        if self.fail == Fail::InsertClick {
            return Err(self.backend());
        }
        self.inner.insert_click(banner_id, slot_id, social_group_id).await
    }

    async fn events_in_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<StatEvent>> {
        self.inner.events_in_window(from, to).await
    }
}
