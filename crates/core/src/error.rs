use crate::types::{BannerId, SlotId, SocialGroupId};
use thiserror::Error;

pub type RotatorResult<T> = Result<T, RotatorError>;

/// Failure kinds surfaced by the selection and association paths.
#[derive(Error, Debug)]
pub enum RotatorError {
    #[error("invalid scoring input: {0}")]
    InvalidInput(String),

    #[error("slot {0} not found")]
    SlotNotFound(SlotId),

    #[error("banner {0} not found")]
    BannerNotFound(BannerId),

    #[error("social group {0} not found")]
    SocialGroupNotFound(SocialGroupId),

    #[error("banner {banner_id} is not in rotation for slot {slot_id}")]
    AssociationNotFound { banner_id: BannerId, slot_id: SlotId },

    #[error("banner {banner_id} is already in rotation for slot {slot_id}")]
    AlreadyAssociated { banner_id: BannerId, slot_id: SlotId },

    #[error("no banner statistics for slot {slot_id} and social group {social_group_id}")]
    NoCandidates {
        slot_id: SlotId,
        social_group_id: SocialGroupId,
    },

    #[error("banner {banner_id} was chosen but its show could not be recorded: {source}")]
    RecordingFailed {
        banner_id: BannerId,
        #[source]
        source: StoreError,
    },

    #[error("{op} failed: {source}")]
    Internal {
        op: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl RotatorError {
    /// Translate a persistence failure, keeping the not-found family and
    /// duplicate pairs distinguishable and tagging everything else with `op`.
    pub fn from_store(op: &'static str, err: StoreError) -> Self {
        match err {
            StoreError::NotFound(Entity::Slot(id)) => RotatorError::SlotNotFound(id),
            StoreError::NotFound(Entity::Banner(id)) => RotatorError::BannerNotFound(id),
            StoreError::NotFound(Entity::SocialGroup(id)) => RotatorError::SocialGroupNotFound(id),
            StoreError::NotFound(Entity::Association { banner_id, slot_id }) => {
                RotatorError::AssociationNotFound { banner_id, slot_id }
            }
            StoreError::Duplicate { banner_id, slot_id } => {
                RotatorError::AlreadyAssociated { banner_id, slot_id }
            }
            err @ StoreError::Backend(_) => RotatorError::Internal {
                op,
                source: err.into(),
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RotatorError::SlotNotFound(_)
                | RotatorError::BannerNotFound(_)
                | RotatorError::SocialGroupNotFound(_)
                | RotatorError::AssociationNotFound { .. }
        )
    }

    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            RotatorError::InvalidInput(_) => "invalid_input",
            RotatorError::SlotNotFound(_) => "slot_not_found",
            RotatorError::BannerNotFound(_) => "banner_not_found",
            RotatorError::SocialGroupNotFound(_) => "social_group_not_found",
            RotatorError::AssociationNotFound { .. } => "association_not_found",
            RotatorError::AlreadyAssociated { .. } => "already_associated",
            RotatorError::NoCandidates { .. } => "no_candidates",
            RotatorError::RecordingFailed { .. } => "recording_failed",
            RotatorError::Internal { .. } => "internal",
        }
    }
}

/// Record kinds the persistence layer can fail to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Slot(SlotId),
    Banner(BannerId),
    SocialGroup(SocialGroupId),
    Association { banner_id: BannerId, slot_id: SlotId },
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entity::Slot(id) => write!(f, "slot {id}"),
            Entity::Banner(id) => write!(f, "banner {id}"),
            Entity::SocialGroup(id) => write!(f, "social group {id}"),
            Entity::Association { banner_id, slot_id } => {
                write!(f, "banner {banner_id} in slot {slot_id}")
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(Entity),

    #[error("banner {banner_id} in slot {slot_id} already exists")]
    Duplicate { banner_id: BannerId, slot_id: SlotId },

    #[error("storage backend error: {0}")]
    Backend(String),
}
