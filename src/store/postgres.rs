use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::{
    error::Result,
    models::{
        Comment, CommentSort, CommentWithAuthor, DELETED_PLACEHOLDER, NewComment, TargetType, Vote,
        VoteCounts, VoteTarget, VoteType,
    },
    store::{CommentStore, VoteStore},
};

const COMMENT_WITH_AUTHOR: &str = r#"
    SELECT c.*, u.username AS author_username
    FROM comments c
    JOIN users u ON c.author_id = u.id
"#;

/// A Postgres transaction acting as one unit of work.
pub struct PgStore {
    tx: Transaction<'static, Postgres>,
}

impl PgStore {
    pub async fn begin(db: &PgPool) -> Result<Self> {
        Ok(Self { tx: db.begin().await? })
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

fn order_clause(sort: CommentSort) -> &'static str {
    match sort {
        CommentSort::Newest => "c.created_at DESC, c.id DESC",
        CommentSort::Oldest => "c.created_at ASC, c.id ASC",
        CommentSort::Popular => "c.score DESC, c.created_at DESC",
    }
}

impl VoteStore for PgStore {
    async fn lock_counts(&mut self, target: VoteTarget) -> Result<Option<VoteCounts>> {
        let query = match target.kind {
            TargetType::Post => {
                "SELECT upvotes, downvotes, score FROM posts WHERE id = $1 FOR UPDATE"
            }
            TargetType::Comment => {
                "SELECT upvotes, downvotes, score FROM comments WHERE id = $1 AND NOT is_deleted FOR UPDATE"
            }
        };

        let counts = sqlx::query_as::<_, VoteCounts>(query)
            .bind(target.id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(counts)
    }

    async fn find_vote(&mut self, user_id: Uuid, target: VoteTarget) -> Result<Option<Vote>> {
        let vote = sqlx::query_as::<_, Vote>(
            r#"
            SELECT * FROM votes
            WHERE user_id = $1 AND target_type = $2 AND target_id = $3
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .bind(target.kind)
        .bind(target.id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(vote)
    }

    async fn insert_vote(
        &mut self,
        user_id: Uuid,
        target: VoteTarget,
        vote_type: VoteType,
    ) -> Result<Option<Vote>> {
        // DO NOTHING keeps the transaction usable when another request won the race.
        let vote = sqlx::query_as::<_, Vote>(
            r#"
            INSERT INTO votes (id, user_id, target_type, target_id, vote_type, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
            ON CONFLICT (user_id, target_type, target_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(target.kind)
        .bind(target.id)
        .bind(vote_type)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(vote)
    }

    async fn set_vote_type(&mut self, vote_id: Uuid, vote_type: VoteType) -> Result<()> {
        sqlx::query("UPDATE votes SET vote_type = $1, updated_at = NOW() WHERE id = $2")
            .bind(vote_type)
            .bind(vote_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn delete_vote(&mut self, vote_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM votes WHERE id = $1")
            .bind(vote_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn store_counts(&mut self, target: VoteTarget, counts: VoteCounts) -> Result<()> {
        let query = format!(
            "UPDATE {} SET upvotes = $1, downvotes = $2, score = $3 WHERE id = $4",
            target.kind.table()
        );

        sqlx::query(&query)
            .bind(counts.upvotes)
            .bind(counts.downvotes)
            .bind(counts.score)
            .bind(target.id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }
}

impl CommentStore for PgStore {
    async fn lock_post(&mut self, post_id: Uuid) -> Result<bool> {
        let row: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM posts WHERE id = $1 FOR UPDATE")
            .bind(post_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row.is_some())
    }

    async fn post_exists(&mut self, post_id: Uuid) -> Result<bool> {
        let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM posts WHERE id = $1)")
            .bind(post_id)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(exists)
    }

    async fn lock_comment(&mut self, comment_id: Uuid) -> Result<Option<Comment>> {
        let comment = sqlx::query_as::<_, Comment>("SELECT * FROM comments WHERE id = $1 FOR UPDATE")
            .bind(comment_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(comment)
    }

    async fn insert_comment(&mut self, comment: NewComment) -> Result<Comment> {
        let comment = sqlx::query_as::<_, Comment>(
            r#"
            INSERT INTO comments (
                id, content, post_id, author_id, parent_comment_id,
                depth, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(comment.id)
        .bind(&comment.content)
        .bind(comment.post_id)
        .bind(comment.author_id)
        .bind(comment.parent_comment_id)
        .bind(comment.depth)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(comment)
    }

    async fn adjust_comment_count(&mut self, post_id: Uuid, delta: i32) -> Result<()> {
        sqlx::query("UPDATE posts SET comment_count = GREATEST(comment_count + $1, 0) WHERE id = $2")
            .bind(delta)
            .bind(post_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn adjust_reply_count(&mut self, comment_id: Uuid, delta: i32) -> Result<()> {
        sqlx::query("UPDATE comments SET reply_count = GREATEST(reply_count + $1, 0) WHERE id = $2")
            .bind(delta)
            .bind(comment_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn mark_deleted(&mut self, comment_id: Uuid) -> Result<()> {
        // Soft delete - the row stays as an anchor for its replies
        sqlx::query(
            r#"
            UPDATE comments
            SET is_deleted = true, content = $1, updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(DELETED_PLACEHOLDER)
        .bind(comment_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn set_content(&mut self, comment_id: Uuid, content: String) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE comments
            SET content = $1, is_edited = true, edited_at = NOW(), updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(content)
        .bind(comment_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn comment_with_author(&mut self, comment_id: Uuid) -> Result<Option<CommentWithAuthor>> {
        let query = format!("{COMMENT_WITH_AUTHOR} WHERE c.id = $1");

        let comment = sqlx::query_as::<_, CommentWithAuthor>(&query)
            .bind(comment_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(comment)
    }

    async fn top_level(
        &mut self,
        post_id: Uuid,
        sort: CommentSort,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<CommentWithAuthor>> {
        let query = format!(
            r#"
            {COMMENT_WITH_AUTHOR}
            WHERE c.post_id = $1 AND c.parent_comment_id IS NULL AND NOT c.is_deleted
            ORDER BY {}
            LIMIT $2 OFFSET $3
            "#,
            order_clause(sort)
        );

        let comments = sqlx::query_as::<_, CommentWithAuthor>(&query)
            .bind(post_id)
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&mut *self.tx)
            .await?;

        Ok(comments)
    }

    async fn count_top_level(&mut self, post_id: Uuid) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM comments
            WHERE post_id = $1 AND parent_comment_id IS NULL AND NOT is_deleted
            "#,
        )
        .bind(post_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(count)
    }

    async fn replies(
        &mut self,
        parent_comment_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<CommentWithAuthor>> {
        let query = format!(
            r#"
            {COMMENT_WITH_AUTHOR}
            WHERE c.parent_comment_id = $1 AND NOT c.is_deleted
            ORDER BY {}
            LIMIT $2 OFFSET $3
            "#,
            order_clause(CommentSort::Oldest)
        );

        let replies = sqlx::query_as::<_, CommentWithAuthor>(&query)
            .bind(parent_comment_id)
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&mut *self.tx)
            .await?;

        Ok(replies)
    }

    async fn count_replies(&mut self, parent_comment_id: Uuid) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM comments WHERE parent_comment_id = $1 AND NOT is_deleted",
        )
        .bind(parent_comment_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(count)
    }
}
