//! Storage seams used by the vote ledger and the comment tree.
//!
//! Each implementation represents one unit of work: every call made through a
//! single store value is part of the same transaction, and row locks taken by
//! the `lock_*` methods are held until that unit of work ends.

use std::future::Future;

use uuid::Uuid;

use crate::{
    error::Result,
    models::{Comment, CommentSort, CommentWithAuthor, NewComment, Vote, VoteCounts, VoteTarget, VoteType},
};

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgStore;

pub trait VoteStore: Send {
    /// Read the target's counters and lock its row. `None` when the target
    /// does not exist or is not votable.
    fn lock_counts(
        &mut self,
        target: VoteTarget,
    ) -> impl Future<Output = Result<Option<VoteCounts>>> + Send;

    fn find_vote(
        &mut self,
        user_id: Uuid,
        target: VoteTarget,
    ) -> impl Future<Output = Result<Option<Vote>>> + Send;

    /// Insert a ledger row. Returns `None` instead of failing when a row for
    /// the same (user, target) already exists.
    fn insert_vote(
        &mut self,
        user_id: Uuid,
        target: VoteTarget,
        vote_type: VoteType,
    ) -> impl Future<Output = Result<Option<Vote>>> + Send;

    fn set_vote_type(
        &mut self,
        vote_id: Uuid,
        vote_type: VoteType,
    ) -> impl Future<Output = Result<()>> + Send;

    fn delete_vote(&mut self, vote_id: Uuid) -> impl Future<Output = Result<()>> + Send;

    fn store_counts(
        &mut self,
        target: VoteTarget,
        counts: VoteCounts,
    ) -> impl Future<Output = Result<()>> + Send;
}

pub trait CommentStore: Send {
    /// Lock the post row; `false` when the post does not exist.
    fn lock_post(&mut self, post_id: Uuid) -> impl Future<Output = Result<bool>> + Send;

    fn post_exists(&mut self, post_id: Uuid) -> impl Future<Output = Result<bool>> + Send;

    fn lock_comment(
        &mut self,
        comment_id: Uuid,
    ) -> impl Future<Output = Result<Option<Comment>>> + Send;

    /// Insert a comment stamped with the current time.
    fn insert_comment(
        &mut self,
        comment: NewComment,
    ) -> impl Future<Output = Result<Comment>> + Send;

    /// Add `delta` to the post's comment count, never going below zero.
    fn adjust_comment_count(
        &mut self,
        post_id: Uuid,
        delta: i32,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Add `delta` to the comment's reply count, never going below zero.
    fn adjust_reply_count(
        &mut self,
        comment_id: Uuid,
        delta: i32,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Soft-delete: flag the row and replace its content with the placeholder.
    fn mark_deleted(&mut self, comment_id: Uuid) -> impl Future<Output = Result<()>> + Send;

    /// Replace the content and record the edit time.
    fn set_content(
        &mut self,
        comment_id: Uuid,
        content: String,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Fetch a comment by id, soft-deleted ones included.
    fn comment_with_author(
        &mut self,
        comment_id: Uuid,
    ) -> impl Future<Output = Result<Option<CommentWithAuthor>>> + Send;

    /// Non-deleted top-level comments of a post in `sort` order.
    fn top_level(
        &mut self,
        post_id: Uuid,
        sort: CommentSort,
        limit: u32,
        offset: u32,
    ) -> impl Future<Output = Result<Vec<CommentWithAuthor>>> + Send;

    fn count_top_level(&mut self, post_id: Uuid) -> impl Future<Output = Result<i64>> + Send;

    /// Non-deleted direct replies, oldest first.
    fn replies(
        &mut self,
        parent_comment_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> impl Future<Output = Result<Vec<CommentWithAuthor>>> + Send;

    fn count_replies(
        &mut self,
        parent_comment_id: Uuid,
    ) -> impl Future<Output = Result<i64>> + Send;
}
