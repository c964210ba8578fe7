use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{VoteCounts, VoteDelta, VoteResponse, VoteTarget, VoteType},
    services::score_service,
    store::{PgStore, VoteStore},
};

/// Result of one ledger mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CastVote {
    /// The caller's vote after the mutation; `None` when it was toggled off.
    pub applied: Option<VoteType>,
    pub delta: VoteDelta,
    pub counts: VoteCounts,
}

/// Toggle-vote on a post or comment.
///
/// No vote yet creates one, repeating the same vote removes it and the
/// opposite vote flips it in place. The counter delta is projected onto the
/// target inside the same unit of work.
pub async fn cast_vote<S: VoteStore>(
    store: &mut S,
    user_id: Uuid,
    target: VoteTarget,
    vote_type: VoteType,
) -> Result<CastVote> {
    // Locks the target row so concurrent votes on it are serialized.
    store
        .lock_counts(target)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} not found", target.kind.label())))?;

    let existing = match store.find_vote(user_id, target).await? {
        Some(vote) => vote,
        None => match store.insert_vote(user_id, target, vote_type).await? {
            Some(_) => {
                let delta = VoteDelta::add(vote_type);
                let counts = score_service::apply_delta(store, target, delta).await?;
                tracing::info!(
                    user_id = %user_id,
                    target_id = %target.id,
                    ?vote_type,
                    "Vote created"
                );
                return Ok(CastVote {
                    applied: Some(vote_type),
                    delta,
                    counts,
                });
            }
            None => {
                // A concurrent request created the row first; continue as an update.
                tracing::warn!(
                    user_id = %user_id,
                    target_id = %target.id,
                    "Concurrent vote detected, re-reading ledger"
                );
                store.find_vote(user_id, target).await?.ok_or_else(|| {
                    AppError::Conflict("Vote was modified concurrently".to_string())
                })?
            }
        },
    };

    let (applied, delta) = if existing.vote_type == vote_type {
        store.delete_vote(existing.id).await?;
        (None, VoteDelta::remove(vote_type))
    } else {
        store.set_vote_type(existing.id, vote_type).await?;
        (
            Some(vote_type),
            VoteDelta::switch(existing.vote_type, vote_type),
        )
    };

    let counts = score_service::apply_delta(store, target, delta).await?;

    tracing::info!(
        user_id = %user_id,
        target_id = %target.id,
        from = ?existing.vote_type,
        to = ?applied,
        "Vote updated"
    );

    Ok(CastVote {
        applied,
        delta,
        counts,
    })
}

pub async fn vote(
    db: &PgPool,
    user_id: Uuid,
    target: VoteTarget,
    vote_type: VoteType,
) -> Result<VoteResponse> {
    let mut store = PgStore::begin(db).await?;
    let outcome = cast_vote(&mut store, user_id, target, vote_type).await?;
    store.commit().await?;

    Ok(VoteResponse {
        votes: outcome.counts,
        user_vote: outcome.applied,
    })
}

pub async fn get_user_vote(
    db: &PgPool,
    user_id: Uuid,
    target: VoteTarget,
) -> Result<Option<VoteType>> {
    let vote_type: Option<(VoteType,)> = sqlx::query_as(
        "SELECT vote_type FROM votes WHERE user_id = $1 AND target_type = $2 AND target_id = $3",
    )
    .bind(user_id)
    .bind(target.kind)
    .bind(target.id)
    .fetch_optional(db)
    .await?;

    Ok(vote_type.map(|(v,)| v))
}
