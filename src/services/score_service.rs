use crate::{
    error::{AppError, Result},
    models::{VoteCounts, VoteDelta, VoteTarget},
    store::VoteStore,
};

impl VoteCounts {
    /// Counters after `delta`, each clamped at zero, with score recomputed.
    pub fn apply(self, delta: VoteDelta) -> Self {
        let upvotes = (self.upvotes + delta.upvotes).max(0);
        let downvotes = (self.downvotes + delta.downvotes).max(0);
        Self {
            upvotes,
            downvotes,
            score: upvotes - downvotes,
        }
    }
}

/// Apply a ledger delta to the target's stored counters within the caller's
/// unit of work and return the persisted result.
///
/// This is the only writer of `upvotes`, `downvotes` and `score`.
pub async fn apply_delta<S: VoteStore>(
    store: &mut S,
    target: VoteTarget,
    delta: VoteDelta,
) -> Result<VoteCounts> {
    let current = store
        .lock_counts(target)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} not found", target.kind.label())))?;

    let updated = current.apply(delta);
    if updated.upvotes != current.upvotes + delta.upvotes
        || updated.downvotes != current.downvotes + delta.downvotes
    {
        tracing::warn!(
            target_type = ?target.kind,
            target_id = %target.id,
            ?current,
            ?delta,
            "Vote counters clamped at zero"
        );
    }

    store.store_counts(target, updated).await?;

    Ok(updated)
}
