//! In-memory rotation store backed by DashMap and a single ledger lock.
//!
//! Reference tables (slots, banners, social groups) live in DashMaps. The
//! association set and the event log share one `RwLock` so that putting a
//! banner into rotation and seeding its baseline shows is a single atomic step,
//! and so a click can't land after its banner left rotation.
//!
//! Events are indexed twice: by timestamp for the exporter's window reads and
//! by `(slot, social group)` for selection. Counts are still taken per request.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use rotator_core::config::CatalogConfig;
use rotator_core::store::StoreResult;
use rotator_core::types::{
    Banner, BannerId, BannerSummary, Slot, SlotId, SocialGroup, SocialGroupId, StatEvent,
    StatKind,
};
use rotator_core::{Clock, Entity, RotationStore, StoreError, SystemClock};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Default)]
struct Ledger {
    /// Keyed `(slot, banner)` so a range scan yields one slot's banners in id order.
    associations: BTreeSet<(SlotId, BannerId)>,
    /// Every event by timestamp; equal timestamps keep insertion order.
    log: BTreeMap<DateTime<Utc>, Vec<StatEvent>>,
    /// Banner and kind of each event, per `(slot, social group)`.
    outcomes: HashMap<(SlotId, SocialGroupId), Vec<(BannerId, StatKind)>>,
    shows: usize,
    clicks: usize,
}

impl Ledger {
    fn append(&mut self, event: StatEvent) {
        match event.kind {
            StatKind::Show => self.shows += 1,
            StatKind::Click => self.clicks += 1,
        }
        self.outcomes
            .entry((event.slot_id, event.social_group_id))
            .or_default()
            .push((event.banner_id, event.kind));
        self.log.entry(event.timestamp).or_default().push(event);
    }
}

pub struct MemoryStore {
    slots: DashMap<SlotId, Slot>,
    banners: DashMap<BannerId, Banner>,
    social_groups: DashMap<SocialGroupId, SocialGroup>,
    ledger: RwLock<Ledger>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: DashMap::new(),
            banners: DashMap::new(),
            social_groups: DashMap::new(),
            ledger: RwLock::new(Ledger::default()),
            clock,
        }
    }

    /// Build a store preloaded with the configured reference data.
    pub fn from_catalog(catalog: &CatalogConfig, clock: Arc<dyn Clock>) -> Self {
        let store = Self::with_clock(clock);
        for slot in &catalog.slots {
            store.insert_slot(slot.clone());
        }
        for banner in &catalog.banners {
            store.insert_banner(banner.clone());
        }
        for group in &catalog.social_groups {
            store.insert_social_group(group.clone());
        }
        info!(
            slots = store.slots.len(),
            banners = store.banners.len(),
            social_groups = store.social_groups.len(),
            "Rotation store initialized (in-memory)"
        );
        store
    }

    pub fn insert_slot(&self, slot: Slot) {
        self.slots.insert(slot.id, slot);
    }

    pub fn insert_banner(&self, banner: Banner) {
        self.banners.insert(banner.id, banner);
    }

    /// Groups added after a banner entered rotation get no seeded show for it.
    pub fn insert_social_group(&self, group: SocialGroup) {
        self.social_groups.insert(group.id, group);
    }

    pub fn show_count(&self) -> usize {
        self.ledger.read().shows
    }

    pub fn click_count(&self) -> usize {
        self.ledger.read().clicks
    }

    fn require_slot(&self, id: SlotId) -> StoreResult<()> {
        if self.slots.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::NotFound(Entity::Slot(id)))
        }
    }

    fn require_banner(&self, id: BannerId) -> StoreResult<()> {
        if self.banners.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::NotFound(Entity::Banner(id)))
        }
    }

    fn require_social_group(&self, id: SocialGroupId) -> StoreResult<()> {
        if self.social_groups.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::NotFound(Entity::SocialGroup(id)))
        }
    }

    fn append_event(
        &self,
        kind: StatKind,
        banner_id: BannerId,
        slot_id: SlotId,
        social_group_id: SocialGroupId,
    ) -> StoreResult<()> {
        self.require_banner(banner_id)?;
        self.require_slot(slot_id)?;
        self.require_social_group(social_group_id)?;

        let mut ledger = self.ledger.write();
        if kind == StatKind::Click && !ledger.associations.contains(&(slot_id, banner_id)) {
            return Err(StoreError::NotFound(Entity::Association { banner_id, slot_id }));
        }
        let event = StatEvent {
            kind,
            banner_id,
            slot_id,
            social_group_id,
            timestamp: self.clock.now(),
        };
        ledger.append(event);
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RotationStore for MemoryStore {
    async fn slot(&self, id: SlotId) -> StoreResult<Option<Slot>> {
        Ok(self.slots.get(&id).map(|r| r.value().clone()))
    }

    async fn banner(&self, id: BannerId) -> StoreResult<Option<Banner>> {
        Ok(self.banners.get(&id).map(|r| r.value().clone()))
    }

    async fn social_group(&self, id: SocialGroupId) -> StoreResult<Option<SocialGroup>> {
        Ok(self.social_groups.get(&id).map(|r| r.value().clone()))
    }

    async fn association_exists(&self, banner_id: BannerId, slot_id: SlotId) -> StoreResult<bool> {
        Ok(self.ledger.read().associations.contains(&(slot_id, banner_id)))
    }

    async fn create_association(&self, banner_id: BannerId, slot_id: SlotId) -> StoreResult<()> {
        self.require_banner(banner_id)?;
        self.require_slot(slot_id)?;

        let mut ledger = self.ledger.write();
        if ledger.associations.contains(&(slot_id, banner_id)) {
            return Err(StoreError::Duplicate { banner_id, slot_id });
        }

        let mut group_ids: Vec<SocialGroupId> =
            self.social_groups.iter().map(|r| *r.key()).collect();
        group_ids.sort_unstable();

        let now = self.clock.now();
        ledger.associations.insert((slot_id, banner_id));
        for social_group_id in &group_ids {
            ledger.append(StatEvent {
                kind: StatKind::Show,
                banner_id,
                slot_id,
                social_group_id: *social_group_id,
                timestamp: now,
            });
        }

        debug!(
            banner_id = banner_id,
            slot_id = slot_id,
            seeded = group_ids.len(),
            "Banner added to slot"
        );
        Ok(())
    }

    async fn delete_association(&self, banner_id: BannerId, slot_id: SlotId) -> StoreResult<()> {
        let mut ledger = self.ledger.write();
        if ledger.associations.remove(&(slot_id, banner_id)) {
            Ok(())
        } else {
            Err(StoreError::NotFound(Entity::Association { banner_id, slot_id }))
        }
    }

    async fn aggregated_stats(
        &self,
        slot_id: SlotId,
        social_group_id: SocialGroupId,
    ) -> StoreResult<Vec<BannerSummary>> {
        self.require_slot(slot_id)?;
        self.require_social_group(social_group_id)?;

        let ledger = self.ledger.read();
        let mut counts: BTreeMap<BannerId, (u64, u64)> = ledger
            .associations
            .range((slot_id, BannerId::MIN)..=(slot_id, BannerId::MAX))
            .map(|&(_, banner_id)| (banner_id, (0, 0)))
            .collect();

        let history = ledger
            .outcomes
            .get(&(slot_id, social_group_id))
            .map(Vec::as_slice)
            .unwrap_or_default();
        for (banner_id, kind) in history {
            if let Some(entry) = counts.get_mut(banner_id) {
                match kind {
                    StatKind::Show => entry.0 += 1,
                    StatKind::Click => entry.1 += 1,
                }
            }
        }

        Ok(counts
            .into_iter()
            .filter(|(_, (shows, _))| *shows > 0)
            .map(|(banner_id, (show_count, click_count))| BannerSummary {
                banner_id,
                slot_id,
                social_group_id,
                show_count,
                click_count,
            })
            .collect())
    }

    async fn insert_exposure(
        &self,
        banner_id: BannerId,
        slot_id: SlotId,
        social_group_id: SocialGroupId,
    ) -> StoreResult<()> {
        self.append_event(StatKind::Show, banner_id, slot_id, social_group_id)
    }

    async fn insert_click(
        &self,
        banner_id: BannerId,
        slot_id: SlotId,
        social_group_id: SocialGroupId,
    ) -> StoreResult<()> {
        self.append_event(StatKind::Click, banner_id, slot_id, social_group_id)
    }

    async fn events_in_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<StatEvent>> {
        if from >= to {
            return Ok(Vec::new());
        }
        let ledger = self.ledger.read();
        Ok(ledger
            .log
            .range(from..to)
            .flat_map(|(_, events)| events.iter().cloned())
            .collect())
    }
}
