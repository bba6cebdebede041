use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;

/// A stored paste, exactly as it sits in the `paste` table.
#[derive(Debug, Clone, FromRow)]
pub struct Paste {
    pub id: String,
    pub content: String,
    pub ttl_seconds: Option<i64>,
    pub max_views: Option<i64>,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
}

impl Paste {
    /// The instant at which the paste stops being visible, if it has a TTL.
    /// A TTL reaching past the representable range never expires.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.ttl_seconds
            .and_then(Duration::try_seconds)
            .and_then(|ttl| self.created_at.checked_add_signed(ttl))
    }

    /// Whether the paste is time-expired at `now`. The expiry instant itself
    /// already counts as expired.
    pub fn is_expired_at(&self, now: &DateTime<Utc>) -> bool {
        self.expires_at()
            .map(|expires_at| *now >= expires_at)
            .unwrap_or(false)
    }

    /// Views left after the current one, floored at zero. `None` when the
    /// paste has no view limit.
    pub fn remaining_views(&self) -> Option<i64> {
        self.max_views
            .map(|max_views| (max_views - self.view_count).max(0))
    }
}

/// Why a paste could not be shown. Only ever used for logging and tests;
/// callers outside the store see a single "not found".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundReason {
    NoSuchId,
    Expired,
    ViewLimitExceeded,
}

impl NotFoundReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotFoundReason::NoSuchId => "no_such_id",
            NotFoundReason::Expired => "expired",
            NotFoundReason::ViewLimitExceeded => "view_limit_exceeded",
        }
    }

    /// Classify a row that the conditional increment did not touch.
    pub fn classify(paste: Option<&Paste>, now: &DateTime<Utc>) -> Self {
        match paste {
            None => NotFoundReason::NoSuchId,
            Some(paste) if paste.is_expired_at(now) => NotFoundReason::Expired,
            Some(_) => NotFoundReason::ViewLimitExceeded,
        }
    }
}

impl std::fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a successful read hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasteView {
    pub content: String,
    pub remaining_views: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<Paste> for PasteView {
    fn from(paste: Paste) -> Self {
        PasteView {
            remaining_views: paste.remaining_views(),
            expires_at: paste.expires_at(),
            content: paste.content,
        }
    }
}

/// Result of a consuming read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Consumed {
    Found(PasteView),
    NotFound(NotFoundReason),
}
