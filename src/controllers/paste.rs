use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::AppError;
use crate::ids::{generate_id, is_valid_id};
use crate::models::{Consumed, NotFoundReason};

/// How many fresh ids to try before giving up on an insert.
const MAX_ID_ATTEMPTS: usize = 5;

/// Longest accepted time-to-live, one hundred years.
pub const MAX_TTL_SECONDS: i64 = 100 * 365 * 24 * 60 * 60;

/// A paste as submitted, before validation.
#[derive(Debug, Clone)]
pub struct NewPaste {
    pub content: String,
    pub ttl_seconds: Option<i64>,
    pub max_views: Option<i64>,
}

impl NewPaste {
    pub fn validate(&self) -> crate::AppResult<()> {
        if self.content.trim().is_empty() {
            return Err(AppError::validation("content", "must be a non-empty string"));
        }
        if matches!(self.ttl_seconds, Some(ttl) if ttl < 1) {
            return Err(AppError::validation("ttl_seconds", "must be an integer >= 1"));
        }
        if matches!(self.ttl_seconds, Some(ttl) if ttl > MAX_TTL_SECONDS) {
            return Err(AppError::validation(
                "ttl_seconds",
                "must be at most 3153600000 (100 years)",
            ));
        }
        if matches!(self.max_views, Some(max) if max < 1) {
            return Err(AppError::validation("max_views", "must be an integer >= 1"));
        }
        Ok(())
    }
}

/// Identity of a freshly stored paste.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Created {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

/// Validate and store a new paste. The creation instant is assigned by the
/// database on insert.
pub async fn create(db: &Database, paste: NewPaste) -> crate::AppResult<Created> {
    create_with_ids(db, paste, generate_id).await
}

async fn create_with_ids(
    db: &Database,
    paste: NewPaste,
    mut next_id: impl FnMut() -> String,
) -> crate::AppResult<Created> {
    paste.validate()?;

    for _ in 0..MAX_ID_ATTEMPTS {
        let id = next_id();
        let Some(stored) = db
            .insert_paste(&id, &paste.content, paste.ttl_seconds, paste.max_views)
            .await?
        else {
            warn!("paste id collision on '{id}', retrying");
            continue;
        };

        info!(
            "new paste: id='{id}', size={size}, ttl_seconds={ttl:?}, max_views={max:?}",
            size = paste.content.len(),
            ttl = paste.ttl_seconds,
            max = paste.max_views,
        );

        return Ok(Created {
            id: stored.id,
            created_at: stored.created_at,
        });
    }

    Err(AppError::IdSpaceExhausted {
        attempts: MAX_ID_ATTEMPTS,
    })
}

/// Read a paste, recording one view, as seen at `now`.
pub async fn consume(db: &Database, id: &str, now: &DateTime<Utc>) -> crate::AppResult<Consumed> {
    // ids we could never have handed out cannot exist
    if !is_valid_id(id) {
        debug!("paste '{id}' not found: {}", NotFoundReason::NoSuchId);
        return Ok(Consumed::NotFound(NotFoundReason::NoSuchId));
    }

    let consumed = db.consume_paste(id, now).await?;
    match &consumed {
        Consumed::Found(view) => debug!(
            "paste '{id}' viewed, remaining_views={remaining:?}",
            remaining = view.remaining_views
        ),
        Consumed::NotFound(reason) => debug!("paste '{id}' not found: {reason}"),
    }
    Ok(consumed)
}
