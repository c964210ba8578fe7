use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "vote_target", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Post,
    Comment,
}

impl TargetType {
    pub fn table(self) -> &'static str {
        match self {
            TargetType::Post => "posts",
            TargetType::Comment => "comments",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TargetType::Post => "Post",
            TargetType::Comment => "Comment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "vote_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    Upvote,
    Downvote,
}

/// A post or comment that can receive votes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoteTarget {
    pub kind: TargetType,
    pub id: Uuid,
}

impl VoteTarget {
    pub fn post(id: Uuid) -> Self {
        Self {
            kind: TargetType::Post,
            id,
        }
    }

    pub fn comment(id: Uuid) -> Self {
        Self {
            kind: TargetType::Comment,
            id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Vote {
    pub id: Uuid,
    pub user_id: Uuid,
    pub target_type: TargetType,
    pub target_id: Uuid,
    pub vote_type: VoteType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Denormalized counters stored on every votable row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct VoteCounts {
    pub upvotes: i32,
    pub downvotes: i32,
    pub score: i32,
}

/// Signed change to a target's counters produced by one ledger mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VoteDelta {
    pub upvotes: i32,
    pub downvotes: i32,
}

impl VoteDelta {
    pub fn add(vote_type: VoteType) -> Self {
        Self::default().with(vote_type, 1)
    }

    pub fn remove(vote_type: VoteType) -> Self {
        Self::default().with(vote_type, -1)
    }

    pub fn switch(from: VoteType, to: VoteType) -> Self {
        Self::remove(from).with(to, 1)
    }

    fn with(mut self, vote_type: VoteType, amount: i32) -> Self {
        match vote_type {
            VoteType::Upvote => self.upvotes += amount,
            VoteType::Downvote => self.downvotes += amount,
        }
        self
    }
}

// Vote request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub vote_type: VoteType,
}

// Vote response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteResponse {
    pub votes: VoteCounts,
    pub user_vote: Option<VoteType>,
}
