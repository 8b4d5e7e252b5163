//! Vote registration across the Photo and User aggregates.
//!
//! A vote touches two places: the photo's counter and the (user, photo)
//! pairing in the votes table. Both happen in one IMMEDIATE transaction,
//! and the pairing's primary key turns a concurrent duplicate into a
//! constraint failure instead of a double count.

use rusqlite::{params, OptionalExtension, TransactionBehavior};

use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::state::DbPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    fn column(&self) -> &'static str {
        match self {
            VoteDirection::Up => "up_votes",
            VoteDirection::Down => "down_votes",
        }
    }
}

pub struct VoteCoordinator {
    pool: DbPool,
}

impl VoteCoordinator {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Register a vote. Each precondition is a distinct rejection:
    /// no viewer is Unauthorized, a missing photo is NotFound, voting on
    /// your own photo is Forbidden, and a repeat vote is Conflict.
    /// Counters only ever go up; there is no unvote.
    pub async fn register_vote(
        &self,
        photo_id: i64,
        viewer: Option<&User>,
        direction: VoteDirection,
    ) -> AppResult<()> {
        let user = viewer.ok_or(AppError::Unauthorized)?;

        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let owner_id: Option<i64> = tx
            .query_row(
                "SELECT owner_id FROM photos WHERE id = ?1",
                params![photo_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(owner_id) = owner_id else {
            return Err(AppError::NotFound);
        };
        if owner_id == user.id {
            return Err(AppError::Forbidden);
        }

        // The pairing insert is the membership check. Losing the race to a
        // concurrent request fails the primary key and surfaces as Conflict,
        // leaving the counter untouched when the transaction rolls back.
        tx.execute(
            "INSERT INTO votes (user_id, photo_id, created_at) VALUES (?1, ?2, ?3)",
            params![user.id, photo_id, chrono::Utc::now()],
        )
        .map_err(|e| AppError::from_constraint(e, "Already voted on this photo"))?;

        tx.execute(
            &format!(
                "UPDATE photos SET {col} = {col} + 1 WHERE id = ?1",
                col = direction.column()
            ),
            params![photo_id],
        )?;

        tx.commit()?;
        Ok(())
    }
}
