//! In-memory store used to drive the ledger and comment tree in unit tests.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{
    error::Result,
    models::{
        Comment, CommentSort, CommentWithAuthor, DELETED_PLACEHOLDER, NewComment, TargetType, Vote,
        VoteCounts, VoteTarget, VoteType,
    },
    store::{CommentStore, VoteStore},
};

#[derive(Debug, Clone)]
pub struct MemoryPost {
    pub counts: VoteCounts,
    pub comment_count: i32,
}

#[derive(Default)]
pub struct MemoryStore {
    pub posts: HashMap<Uuid, MemoryPost>,
    pub comments: HashMap<Uuid, Comment>,
    pub votes: Vec<Vote>,
    pub usernames: HashMap<Uuid, String>,
    /// When set, the next `insert_vote` behaves as if a concurrent request had
    /// committed this vote type first.
    pub concurrent_vote: Option<VoteType>,
    /// When set together with `concurrent_vote`, the concurrent row is gone
    /// again by the time it is re-read.
    pub concurrent_vote_vanishes: bool,
    clock: Option<DateTime<Utc>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strictly increasing timestamps so ordering is deterministic.
    pub fn tick(&mut self) -> DateTime<Utc> {
        let next = match self.clock {
            Some(now) => now + Duration::seconds(1),
            None => Utc::now(),
        };
        self.clock = Some(next);
        next
    }

    pub fn add_user(&mut self, username: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.usernames.insert(id, username.to_string());
        id
    }

    pub fn add_post(&mut self) -> Uuid {
        let id = Uuid::new_v4();
        self.posts.insert(
            id,
            MemoryPost {
                counts: VoteCounts::default(),
                comment_count: 0,
            },
        );
        id
    }

    pub fn post(&self, post_id: Uuid) -> &MemoryPost {
        &self.posts[&post_id]
    }

    pub fn comment(&self, comment_id: Uuid) -> &Comment {
        &self.comments[&comment_id]
    }

    pub fn counts(&self, target: VoteTarget) -> VoteCounts {
        match target.kind {
            TargetType::Post => self.posts[&target.id].counts,
            TargetType::Comment => self.comments[&target.id].counts(),
        }
    }

    pub fn ledger_rows(&self, user_id: Uuid, target: VoteTarget) -> Vec<&Vote> {
        self.votes
            .iter()
            .filter(|v| v.user_id == user_id && v.target_type == target.kind && v.target_id == target.id)
            .collect()
    }

    fn new_vote(&mut self, user_id: Uuid, target: VoteTarget, vote_type: VoteType) -> Vote {
        let now = self.tick();
        Vote {
            id: Uuid::new_v4(),
            user_id,
            target_type: target.kind,
            target_id: target.id,
            vote_type,
            created_at: now,
            updated_at: now,
        }
    }

    fn with_author(&self, comment: &Comment) -> CommentWithAuthor {
        CommentWithAuthor {
            comment: comment.clone(),
            author_username: self
                .usernames
                .get(&comment.author_id)
                .cloned()
                .unwrap_or_default(),
        }
    }

    fn page(&self, mut rows: Vec<&Comment>, sort: CommentSort, limit: u32, offset: u32) -> Vec<CommentWithAuthor> {
        match sort {
            CommentSort::Newest => rows.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            CommentSort::Oldest => rows.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
            CommentSort::Popular => rows.sort_by(|a, b| {
                b.score
                    .cmp(&a.score)
                    .then_with(|| b.created_at.cmp(&a.created_at))
            }),
        }
        rows.into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|c| self.with_author(c))
            .collect()
    }
}

impl VoteStore for MemoryStore {
    async fn lock_counts(&mut self, target: VoteTarget) -> Result<Option<VoteCounts>> {
        Ok(match target.kind {
            TargetType::Post => self.posts.get(&target.id).map(|p| p.counts),
            TargetType::Comment => self
                .comments
                .get(&target.id)
                .filter(|c| !c.is_deleted)
                .map(Comment::counts),
        })
    }

    async fn find_vote(&mut self, user_id: Uuid, target: VoteTarget) -> Result<Option<Vote>> {
        Ok(self.ledger_rows(user_id, target).first().map(|v| (*v).clone()))
    }

    async fn insert_vote(
        &mut self,
        user_id: Uuid,
        target: VoteTarget,
        vote_type: VoteType,
    ) -> Result<Option<Vote>> {
        if let Some(winner) = self.concurrent_vote.take() {
            if !self.concurrent_vote_vanishes {
                let vote = self.new_vote(user_id, target, winner);
                self.votes.push(vote);
            }
            return Ok(None);
        }
        if !self.ledger_rows(user_id, target).is_empty() {
            return Ok(None);
        }
        let vote = self.new_vote(user_id, target, vote_type);
        self.votes.push(vote.clone());
        Ok(Some(vote))
    }

    async fn set_vote_type(&mut self, vote_id: Uuid, vote_type: VoteType) -> Result<()> {
        let now = self.tick();
        if let Some(vote) = self.votes.iter_mut().find(|v| v.id == vote_id) {
            vote.vote_type = vote_type;
            vote.updated_at = now;
        }
        Ok(())
    }

    async fn delete_vote(&mut self, vote_id: Uuid) -> Result<()> {
        self.votes.retain(|v| v.id != vote_id);
        Ok(())
    }

    async fn store_counts(&mut self, target: VoteTarget, counts: VoteCounts) -> Result<()> {
        match target.kind {
            TargetType::Post => {
                if let Some(post) = self.posts.get_mut(&target.id) {
                    post.counts = counts;
                }
            }
            TargetType::Comment => {
                if let Some(comment) = self.comments.get_mut(&target.id) {
                    comment.upvotes = counts.upvotes;
                    comment.downvotes = counts.downvotes;
                    comment.score = counts.score;
                }
            }
        }
        Ok(())
    }
}

impl CommentStore for MemoryStore {
    async fn lock_post(&mut self, post_id: Uuid) -> Result<bool> {
        Ok(self.posts.contains_key(&post_id))
    }

    async fn post_exists(&mut self, post_id: Uuid) -> Result<bool> {
        Ok(self.posts.contains_key(&post_id))
    }

    async fn lock_comment(&mut self, comment_id: Uuid) -> Result<Option<Comment>> {
        Ok(self.comments.get(&comment_id).cloned())
    }

    async fn insert_comment(&mut self, comment: NewComment) -> Result<Comment> {
        let created_at = self.tick();
        let row = Comment {
            id: comment.id,
            content: comment.content,
            post_id: comment.post_id,
            author_id: comment.author_id,
            parent_comment_id: comment.parent_comment_id,
            depth: comment.depth,
            reply_count: 0,
            is_deleted: false,
            is_edited: false,
            edited_at: None,
            upvotes: 0,
            downvotes: 0,
            score: 0,
            created_at,
            updated_at: created_at,
        };
        self.comments.insert(row.id, row.clone());
        Ok(row)
    }

    async fn adjust_comment_count(&mut self, post_id: Uuid, delta: i32) -> Result<()> {
        if let Some(post) = self.posts.get_mut(&post_id) {
            post.comment_count = (post.comment_count + delta).max(0);
        }
        Ok(())
    }

    async fn adjust_reply_count(&mut self, comment_id: Uuid, delta: i32) -> Result<()> {
        if let Some(comment) = self.comments.get_mut(&comment_id) {
            comment.reply_count = (comment.reply_count + delta).max(0);
        }
        Ok(())
    }

    async fn mark_deleted(&mut self, comment_id: Uuid) -> Result<()> {
        let at = self.tick();
        if let Some(comment) = self.comments.get_mut(&comment_id) {
            comment.is_deleted = true;
            comment.content = DELETED_PLACEHOLDER.to_string();
            comment.updated_at = at;
        }
        Ok(())
    }

    async fn set_content(&mut self, comment_id: Uuid, content: String) -> Result<()> {
        let at = self.tick();
        if let Some(comment) = self.comments.get_mut(&comment_id) {
            comment.content = content;
            comment.is_edited = true;
            comment.edited_at = Some(at);
            comment.updated_at = at;
        }
        Ok(())
    }

    async fn comment_with_author(&mut self, comment_id: Uuid) -> Result<Option<CommentWithAuthor>> {
        Ok(self.comments.get(&comment_id).map(|c| self.with_author(c)))
    }

    async fn top_level(
        &mut self,
        post_id: Uuid,
        sort: CommentSort,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<CommentWithAuthor>> {
        let rows = self
            .comments
            .values()
            .filter(|c| c.post_id == post_id && c.parent_comment_id.is_none() && !c.is_deleted)
            .collect();
        Ok(self.page(rows, sort, limit, offset))
    }

    async fn count_top_level(&mut self, post_id: Uuid) -> Result<i64> {
        Ok(self
            .comments
            .values()
            .filter(|c| c.post_id == post_id && c.parent_comment_id.is_none() && !c.is_deleted)
            .count() as i64)
    }

    async fn replies(
        &mut self,
        parent_comment_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<CommentWithAuthor>> {
        let rows = self
            .comments
            .values()
            .filter(|c| c.parent_comment_id == Some(parent_comment_id) && !c.is_deleted)
            .collect();
        Ok(self.page(rows, CommentSort::Oldest, limit, offset))
    }

    async fn count_replies(&mut self, parent_comment_id: Uuid) -> Result<i64> {
        Ok(self
            .comments
            .values()
            .filter(|c| c.parent_comment_id == Some(parent_comment_id) && !c.is_deleted)
            .count() as i64)
    }
}
