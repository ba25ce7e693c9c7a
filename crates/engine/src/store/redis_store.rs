//! Redis record store.
//!
//! Each record is a hash at `labpush:record:{report_id}`. Claims and failure
//! marks run as Lua scripts, so each is atomic on the Redis server. Every
//! write refreshes the key TTL to the retention window; expiry replaces the
//! retention sweep.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use redis::AsyncCommands;
use redis::Script;
use redis::aio::ConnectionManager;

use labpush_common::error::AppError;
use labpush_common::types::{ProcessingRecord, ProcessingStatus};

use super::{ClaimOutcome, FailureMark, RecordStore};

const KEY_PREFIX: &str = "labpush:record:";

/// KEYS[1] record key; ARGV[1] now (ms); ARGV[2] liveness (ms); ARGV[3] ttl (s).
/// Returns `{"claimed", attempts}` or `{status, attempts}`.
const CLAIM_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local liveness = tonumber(ARGV[2])
local ttl = tonumber(ARGV[3])
local status = redis.call('HGET', key, 'status')
if not status then
  redis.call('HSET', key, 'status', 'pending', 'attempts', 1,
    'last_attempt_at', now, 'created_at', now, 'updated_at', now)
  redis.call('EXPIRE', key, ttl)
  return {'claimed', 1}
end
local attempts = tonumber(redis.call('HGET', key, 'attempts'))
local last = tonumber(redis.call('HGET', key, 'last_attempt_at'))
if status == 'failed' or (status == 'pending' and now - last >= liveness) then
  attempts = redis.call('HINCRBY', key, 'attempts', 1)
  redis.call('HSET', key, 'status', 'pending', 'last_attempt_at', now, 'updated_at', now)
  redis.call('EXPIRE', key, ttl)
  return {'claimed', attempts}
end
return {status, attempts}
"#;

/// KEYS[1] record key; ARGV[1] now (ms); ARGV[2] max attempts; ARGV[3] "1" if
/// permanent; ARGV[4] reason; ARGV[5] ttl (s). Returns the new status or nil.
const FAIL_SCRIPT: &str = r#"
local key = KEYS[1]
if redis.call('HGET', key, 'status') ~= 'pending' then
  return false
end
local attempts = tonumber(redis.call('HGET', key, 'attempts'))
local status = 'failed'
if ARGV[3] == '1' or attempts >= tonumber(ARGV[2]) then
  status = 'permanently_failed'
end
redis.call('HSET', key, 'status', status, 'last_error', ARGV[4], 'updated_at', ARGV[1])
redis.call('EXPIRE', key, tonumber(ARGV[5]))
return status
"#;

pub struct RedisRecordStore {
    redis: ConnectionManager,
    retention: Duration,
    claim_script: Script,
    fail_script: Script,
}

impl RedisRecordStore {
    pub fn new(redis: ConnectionManager, retention: Duration) -> Self {
        Self {
            redis,
            retention,
            claim_script: Script::new(CLAIM_SCRIPT),
            fail_script: Script::new(FAIL_SCRIPT),
        }
    }

    fn key(report_id: &str) -> String {
        format!("{}{}", KEY_PREFIX, report_id)
    }

    fn ttl_secs(&self) -> u64 {
        self.retention.as_secs().max(1)
    }
}

fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>, AppError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| AppError::Internal(format!("invalid timestamp {} in record", ms)))
}

/// Rebuild a record from its Redis hash fields.
fn record_from_hash(
    report_id: &str,
    fields: &HashMap<String, String>,
) -> Result<ProcessingRecord, AppError> {
    let field = |name: &str| {
        fields
            .get(name)
            .ok_or_else(|| AppError::Internal(format!("record {} missing field {}", report_id, name)))
    };
    let millis = |name: &str| -> Result<DateTime<Utc>, AppError> {
        let raw = field(name)?;
        let ms = raw
            .parse::<i64>()
            .map_err(|_| AppError::Internal(format!("record {} has bad {}", report_id, name)))?;
        millis_to_datetime(ms)
    };

    let status = field("status")?
        .parse::<ProcessingStatus>()
        .map_err(AppError::Internal)?;
    let attempts = field("attempts")?
        .parse::<i32>()
        .map_err(|_| AppError::Internal(format!("record {} has bad attempts", report_id)))?;

    Ok(ProcessingRecord {
        report_id: report_id.to_string(),
        status,
        attempts,
        last_attempt_at: millis("last_attempt_at")?,
        last_error: fields.get("last_error").cloned(),
        created_at: millis("created_at")?,
        updated_at: millis("updated_at")?,
    })
}

/// Interpret the claim script's `{tag, attempts}` reply.
fn claim_outcome(tag: &str, attempts: i64) -> Result<ClaimOutcome, AppError> {
    if tag == "claimed" {
        let attempt = i32::try_from(attempts)
            .map_err(|_| AppError::Internal(format!("attempt counter overflow: {}", attempts)))?;
        return Ok(ClaimOutcome::FirstAttempt { attempt });
    }

    let status = tag.parse::<ProcessingStatus>().map_err(AppError::Internal)?;
    if status.is_terminal() {
        Ok(ClaimOutcome::AlreadyHandled { status })
    } else {
        Ok(ClaimOutcome::InFlight)
    }
}

#[async_trait]
impl RecordStore for RedisRecordStore {
    async fn try_claim(
        &self,
        report_id: &str,
        liveness: Duration,
    ) -> Result<ClaimOutcome, AppError> {
        let mut redis = self.redis.clone();
        let liveness_ms = i64::try_from(liveness.as_millis()).unwrap_or(i64::MAX);

        let (tag, attempts): (String, i64) = self
            .claim_script
            .key(Self::key(report_id))
            .arg(Utc::now().timestamp_millis())
            .arg(liveness_ms)
            .arg(self.ttl_secs())
            .invoke_async(&mut redis)
            .await?;

        claim_outcome(&tag, attempts)
    }

    async fn mark_succeeded(&self, report_id: &str) -> Result<(), AppError> {
        let mut redis = self.redis.clone();
        let key = Self::key(report_id);
        let now = Utc::now().timestamp_millis();

        let _: () = redis::pipe()
            .atomic()
            .hset_nx(&key, "attempts", 1)
            .ignore()
            .hset_nx(&key, "created_at", now)
            .ignore()
            .hset_nx(&key, "last_attempt_at", now)
            .ignore()
            .hset(&key, "status", ProcessingStatus::Succeeded.as_str())
            .ignore()
            .hset(&key, "updated_at", now)
            .ignore()
            .hdel(&key, "last_error")
            .ignore()
            .expire(&key, self.ttl_secs() as i64)
            .ignore()
            .query_async(&mut redis)
            .await?;

        Ok(())
    }

    async fn mark_failed(
        &self,
        report_id: &str,
        failure: &FailureMark<'_>,
    ) -> Result<Option<ProcessingRecord>, AppError> {
        let mut redis = self.redis.clone();

        let status: Option<String> = self
            .fail_script
            .key(Self::key(report_id))
            .arg(Utc::now().timestamp_millis())
            .arg(failure.max_attempts)
            .arg(if failure.permanent { "1" } else { "0" })
            .arg(failure.reason)
            .arg(self.ttl_secs())
            .invoke_async(&mut redis)
            .await?;

        match status {
            Some(_) => self.get(report_id).await,
            None => Ok(None),
        }
    }

    async fn get(&self, report_id: &str) -> Result<Option<ProcessingRecord>, AppError> {
        let mut redis = self.redis.clone();
        let fields: HashMap<String, String> = redis.hgetall(Self::key(report_id)).await?;

        if fields.is_empty() {
            return Ok(None);
        }
        record_from_hash(report_id, &fields).map(Some)
    }

    async fn purge_before(&self, _cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        // Keys expire on their own.
        Ok(0)
    }
}
