//! Redis-backed priority queue for judging jobs
//!
//! Layout: waiting jobs live in a sorted set whose score is the negated
//! priority; members carry a monotonic sequence prefix so equal scores pop
//! FIFO. Active jobs sit in a hash with claim metadata, delayed retries in
//! a second sorted set scored by ready-at, dead letters in a list. Job
//! payloads are keyed by submission id, which doubles as the idempotency
//! key.

use chrono::{DateTime, Utc};
use rand::Rng;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{queue_keys, RETRY_BACKOFF_BASE_MS, STALLED_JOB_SECS};
use crate::error::AppResult;

/// Durable job payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueJob {
    pub submission_id: Uuid,
    pub contest_id: Uuid,
    pub priority: i64,
    #[serde(default)]
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

/// Claim metadata stored in the active hash
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claim {
    worker: String,
    claimed_at: i64,
    attempt: u32,
}

/// Where a submission currently sits in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePosition {
    /// 1-based position in the waiting set
    Queued { position: u64 },
    Processing,
    Unknown,
}

/// Priority queue service. All queue-state mutation goes through here.
#[derive(Clone)]
pub struct JudgeQueue {
    redis: ConnectionManager,
}

impl JudgeQueue {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    /// Enqueue a job. Idempotent on submission id: re-enqueueing a known
    /// submission is a no-op.
    pub async fn enqueue(&self, job: &QueueJob) -> AppResult<()> {
        let mut conn = self.redis.clone();
        let field = job.submission_id.to_string();
        let payload = serde_json::to_string(job)?;

        let fresh: bool = conn.hset_nx(queue_keys::JOBS, &field, &payload).await?;
        if !fresh {
            tracing::debug!(submission_id = %job.submission_id, "job already enqueued");
            return Ok(());
        }

        let seq: u64 = conn.incr(queue_keys::SEQ, 1).await?;
        let member = encode_member(seq, &job.submission_id);

        let _: () = conn.hset(queue_keys::MEMBERS, &field, &member).await?;
        let _: () = conn
            .zadd(queue_keys::WAITING, &member, score_for(job.priority))
            .await?;

        Ok(())
    }

    /// Claim the highest-priority waiting job for `worker`. Returns None
    /// when the queue is empty or paused.
    pub async fn dequeue(&self, worker: &str) -> AppResult<Option<QueueJob>> {
        let mut conn = self.redis.clone();

        let paused: Option<String> = conn.get(queue_keys::PAUSED).await?;
        if paused.is_some() {
            return Ok(None);
        }

        let popped: Vec<(String, f64)> = conn.zpopmin(queue_keys::WAITING, 1).await?;
        let Some((member, _score)) = popped.into_iter().next() else {
            return Ok(None);
        };

        let Some(submission_id) = decode_member(&member) else {
            tracing::warn!(member = %member, "malformed queue member dropped");
            return Ok(None);
        };
        let field = submission_id.to_string();

        let _: () = conn.hdel(queue_keys::MEMBERS, &field).await?;

        let payload: Option<String> = conn.hget(queue_keys::JOBS, &field).await?;
        let Some(payload) = payload else {
            // Cancelled between pop and load
            return Ok(None);
        };
        let job: QueueJob = serde_json::from_str(&payload)?;

        let claim = Claim {
            worker: worker.to_string(),
            claimed_at: Utc::now().timestamp(),
            attempt: job.attempt,
        };
        let _: () = conn
            .hset(queue_keys::ACTIVE, &field, serde_json::to_string(&claim)?)
            .await?;

        Ok(Some(job))
    }

    /// Successful completion: drop all queue state for the submission
    pub async fn complete(&self, submission_id: &Uuid) -> AppResult<()> {
        let mut conn = self.redis.clone();
        let field = submission_id.to_string();

        let _: () = conn.hdel(queue_keys::ACTIVE, &field).await?;
        let _: () = conn.hdel(queue_keys::JOBS, &field).await?;

        Ok(())
    }

    /// Schedule a retry with exponential backoff. Returns the delay used.
    pub async fn retry_later(&self, job: &QueueJob) -> AppResult<u64> {
        let mut conn = self.redis.clone();
        let field = job.submission_id.to_string();

        let mut retried = job.clone();
        retried.attempt += 1;

        let delay_ms = backoff_ms(retried.attempt) + rand::rng().random_range(0..500);
        let ready_at = Utc::now().timestamp_millis() + delay_ms as i64;

        let _: () = conn
            .hset(queue_keys::JOBS, &field, serde_json::to_string(&retried)?)
            .await?;
        let _: () = conn.hdel(queue_keys::ACTIVE, &field).await?;

        let seq: u64 = conn.incr(queue_keys::SEQ, 1).await?;
        let member = encode_member(seq, &job.submission_id);
        let _: () = conn.hset(queue_keys::MEMBERS, &field, &member).await?;
        let _: () = conn
            .zadd(queue_keys::DELAYED, &member, ready_at as f64)
            .await?;

        Ok(delay_ms)
    }

    /// Move a failed job to the dead-letter list
    pub async fn dead_letter(&self, job: &QueueJob, error: &str) -> AppResult<()> {
        let mut conn = self.redis.clone();
        let field = job.submission_id.to_string();

        let entry = serde_json::json!({
            "job": job,
            "error": error,
            "failed_at": Utc::now(),
        });

        let _: () = conn.hdel(queue_keys::ACTIVE, &field).await?;
        let _: () = conn.hdel(queue_keys::JOBS, &field).await?;
        let _: () = conn.hdel(queue_keys::MEMBERS, &field).await?;
        let _: () = conn.lpush(queue_keys::DEAD, entry.to_string()).await?;

        Ok(())
    }

    /// Promote delayed retries whose backoff has elapsed. Returns how many
    /// moved.
    pub async fn promote_due(&self) -> AppResult<u64> {
        let mut conn = self.redis.clone();
        let now_ms = Utc::now().timestamp_millis() as f64;

        let due: Vec<String> = conn
            .zrangebyscore_limit(queue_keys::DELAYED, f64::MIN, now_ms, 0, 100)
            .await?;

        let mut moved = 0;
        for member in due {
            let removed: u64 = conn.zrem(queue_keys::DELAYED, &member).await?;
            if removed == 0 {
                continue;
            }

            let Some(submission_id) = decode_member(&member) else {
                continue;
            };
            let payload: Option<String> = conn
                .hget(queue_keys::JOBS, submission_id.to_string())
                .await?;
            let Some(payload) = payload else { continue };
            let job: QueueJob = serde_json::from_str(&payload)?;

            let _: () = conn
                .zadd(queue_keys::WAITING, &member, score_for(job.priority))
                .await?;
            moved += 1;
        }

        Ok(moved)
    }

    /// Return jobs stuck in the active set to the waiting set. Exactly-once
    /// delivery is not promised; the judging layer keys results on the
    /// submission id.
    pub async fn recover_stalled(&self) -> AppResult<u64> {
        let mut conn = self.redis.clone();
        let active: std::collections::HashMap<String, String> =
            conn.hgetall(queue_keys::ACTIVE).await?;

        let now = Utc::now().timestamp();
        let mut recovered = 0;

        for (field, claim_json) in active {
            let Ok(claim) = serde_json::from_str::<Claim>(&claim_json) else {
                continue;
            };
            if now - claim.claimed_at <= STALLED_JOB_SECS {
                continue;
            }

            let payload: Option<String> = conn.hget(queue_keys::JOBS, &field).await?;
            let Some(payload) = payload else {
                let _: () = conn.hdel(queue_keys::ACTIVE, &field).await?;
                continue;
            };
            let job: QueueJob = serde_json::from_str(&payload)?;

            tracing::warn!(
                submission_id = %job.submission_id,
                worker = %claim.worker,
                "stalled job returned to waiting"
            );

            let seq: u64 = conn.incr(queue_keys::SEQ, 1).await?;
            let member = encode_member(seq, &job.submission_id);
            let _: () = conn.hset(queue_keys::MEMBERS, &field, &member).await?;
            let _: () = conn
                .zadd(queue_keys::WAITING, &member, score_for(job.priority))
                .await?;
            let _: () = conn.hdel(queue_keys::ACTIVE, &field).await?;

            recovered += 1;
        }

        Ok(recovered)
    }

    /// Cancel a queued submission. In-flight jobs are not cancelled.
    pub async fn cancel(&self, submission_id: &Uuid) -> AppResult<bool> {
        let mut conn = self.redis.clone();
        let field = submission_id.to_string();

        let member: Option<String> = conn.hget(queue_keys::MEMBERS, &field).await?;
        let Some(member) = member else {
            return Ok(false);
        };

        let removed: u64 = conn.zrem(queue_keys::WAITING, &member).await?;
        let removed_delayed: u64 = conn.zrem(queue_keys::DELAYED, &member).await?;
        if removed + removed_delayed == 0 {
            return Ok(false);
        }

        let _: () = conn.hdel(queue_keys::MEMBERS, &field).await?;
        let _: () = conn.hdel(queue_keys::JOBS, &field).await?;

        Ok(true)
    }

    /// 1-based waiting position, or Processing for claimed jobs
    pub async fn position(&self, submission_id: &Uuid) -> AppResult<QueuePosition> {
        let mut conn = self.redis.clone();
        let field = submission_id.to_string();

        let claimed: bool = conn.hexists(queue_keys::ACTIVE, &field).await?;
        if claimed {
            return Ok(QueuePosition::Processing);
        }

        let member: Option<String> = conn.hget(queue_keys::MEMBERS, &field).await?;
        if let Some(member) = member {
            let rank: Option<u64> = conn.zrank(queue_keys::WAITING, &member).await?;
            if let Some(rank) = rank {
                return Ok(QueuePosition::Queued { position: rank + 1 });
            }
        }

        Ok(QueuePosition::Unknown)
    }

    pub async fn waiting(&self) -> AppResult<u64> {
        let mut conn = self.redis.clone();
        Ok(conn.zcard(queue_keys::WAITING).await?)
    }

    pub async fn active(&self) -> AppResult<u64> {
        let mut conn = self.redis.clone();
        Ok(conn.hlen(queue_keys::ACTIVE).await?)
    }

    pub async fn delayed(&self) -> AppResult<u64> {
        let mut conn = self.redis.clone();
        Ok(conn.zcard(queue_keys::DELAYED).await?)
    }

    pub async fn failed(&self) -> AppResult<u64> {
        let mut conn = self.redis.clone();
        Ok(conn.llen(queue_keys::DEAD).await?)
    }

    /// Stop handing out jobs; waiting jobs keep accumulating
    pub async fn pause(&self) -> AppResult<()> {
        let mut conn = self.redis.clone();
        let _: () = conn.set(queue_keys::PAUSED, "1").await?;
        Ok(())
    }

    pub async fn resume(&self) -> AppResult<()> {
        let mut conn = self.redis.clone();
        let _: () = conn.del(queue_keys::PAUSED).await?;
        Ok(())
    }

    /// Administrative cleanup: drop the dead-letter list. Returns how many
    /// entries were discarded.
    pub async fn clean(&self) -> AppResult<u64> {
        let mut conn = self.redis.clone();
        let count: u64 = conn.llen(queue_keys::DEAD).await?;
        let _: () = conn.del(queue_keys::DEAD).await?;
        Ok(count)
    }
}

/// Negated priority: ZPOPMIN pops the highest priority first
fn score_for(priority: i64) -> f64 {
    -(priority as f64)
}

/// Member format: zero-padded sequence, then the submission id. Equal
/// scores compare lexicographically, so the sequence prefix yields FIFO
/// within a priority value.
fn encode_member(seq: u64, submission_id: &Uuid) -> String {
    format!("{:020}:{}", seq, submission_id)
}

fn decode_member(member: &str) -> Option<Uuid> {
    member.split_once(':').and_then(|(_, id)| id.parse().ok())
}

/// Exponential backoff without jitter: base * 2^(attempt - 1)
fn backoff_ms(attempt: u32) -> u64 {
    RETRY_BACKOFF_BASE_MS.saturating_mul(1u64 << attempt.saturating_sub(1).min(10))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_round_trip() {
        let id = Uuid::new_v4();
        let member = encode_member(42, &id);
        assert!(member.starts_with("00000000000000000042:"));
        assert_eq!(decode_member(&member), Some(id));
        assert_eq!(decode_member("garbage"), None);
    }

    #[test]
    fn test_fifo_within_priority() {
        let a = encode_member(1, &Uuid::new_v4());
        let b = encode_member(2, &Uuid::new_v4());
        // Same score: the earlier sequence sorts (and therefore pops) first
        assert!(a < b);
    }

    #[test]
    fn test_score_orders_priorities() {
        // ZPOPMIN takes the lowest score, so higher priority must score
        // lower
        assert!(score_for(1050) < score_for(150));
        assert!(score_for(150) < score_for(0));
    }

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff_ms(1), RETRY_BACKOFF_BASE_MS);
        assert_eq!(backoff_ms(2), RETRY_BACKOFF_BASE_MS * 2);
        assert_eq!(backoff_ms(3), RETRY_BACKOFF_BASE_MS * 4);
    }
}
