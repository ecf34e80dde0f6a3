//! Redis Streams backend

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use redis::{Cmd, Connection, FromRedisValue};
use tracing::debug;

use crate::config::ServerAddress;
use crate::error::{QueueError, QueueResult};
use crate::lease::LeaseStore;
use crate::types::{ConsumerPending, EntryId, Fields, PendingRecord, PendingSummary, ReadCursor};
use crate::utils::millis;

use super::{GroupReadItem, LogStore, Removal};

/// Connect timeout for the initial handshake
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Compare-and-delete so only the holder can release its lease
const RELEASE_SCRIPT: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end
"#;

/// `XREADGROUP` reply: `[[stream, [[id, fields | nil], ...]]]` or nil
type ReadGroupReply = Option<Vec<(String, Vec<(String, Option<Vec<String>>)>)>>;

/// `XPENDING stream group` summary reply
type PendingSummaryReply = (u64, Option<String>, Option<String>, Option<Vec<(String, u64)>>);

/// Log store backed by a single Redis connection
#[derive(Clone)]
pub struct RedisLogStore {
    conn: Arc<Mutex<Connection>>,
    server: String,
}

impl RedisLogStore {
    /// Connect (and authenticate, when the address carries a token)
    pub fn connect(address: &ServerAddress) -> QueueResult<Self> {
        let client = redis::Client::open(address.redis_url())?;
        let conn = client.get_connection_with_timeout(CONNECT_TIMEOUT)?;
        debug!(server = %address, "connected to redis");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            server: address.to_string(),
        })
    }

    /// Lease store sharing this connection
    pub fn leases(&self) -> RedisLeases {
        RedisLeases {
            conn: Arc::clone(&self.conn),
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    fn query<T: FromRedisValue>(&self, cmd: &Cmd) -> QueueResult<T> {
        let mut conn = self.conn.lock();
        Ok(cmd.query(&mut *conn)?)
    }
}

fn parse_id(raw: &str) -> QueueResult<EntryId> {
    raw.parse()
}

fn id_args(ids: &[EntryId]) -> Vec<String> {
    ids.iter().map(ToString::to_string).collect()
}

/// Flat `[field, value, field, value, ...]` into a map
fn parse_fields(flat: Vec<String>) -> QueueResult<Fields> {
    if flat.len() % 2 != 0 {
        return Err(QueueError::Protocol(format!(
            "odd number of field/value items: {}",
            flat.len()
        )));
    }

    let mut fields = Fields::new();
    let mut iter = flat.into_iter();
    while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
        fields.insert(key, value);
    }
    Ok(fields)
}

impl LogStore for RedisLogStore {
    fn append(&self, stream: &str, fields: &Fields, max_len: Option<u64>) -> QueueResult<EntryId> {
        let mut cmd = redis::cmd("XADD");
        cmd.arg(stream);
        if let Some(max_len) = max_len {
            cmd.arg("MAXLEN").arg(max_len);
        }
        cmd.arg("*");
        for (key, value) in fields {
            cmd.arg(key).arg(value);
        }

        let id: String = self.query(&cmd)?;
        parse_id(&id)
    }

    fn create_group(
        &self,
        stream: &str,
        group: &str,
        start: EntryId,
        create_stream: bool,
    ) -> QueueResult<()> {
        let mut cmd = redis::cmd("XGROUP");
        cmd.arg("CREATE").arg(stream).arg(group).arg(start.to_string());
        if create_stream {
            cmd.arg("MKSTREAM");
        }

        match self.query::<()>(&cmd) {
            Ok(()) => Ok(()),
            Err(QueueError::Redis(e)) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        cursor: ReadCursor,
        count: usize,
        block: Option<Duration>,
    ) -> QueueResult<Vec<GroupReadItem>> {
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count.max(1));
        if let (ReadCursor::New, Some(block)) = (cursor, block) {
            cmd.arg("BLOCK").arg(millis(block));
        }
        cmd.arg("STREAMS").arg(stream).arg(cursor.to_string());

        let reply: ReadGroupReply = self.query(&cmd)?;
        let mut items = Vec::new();
        for (_stream, entries) in reply.unwrap_or_default() {
            for (id, flat) in entries {
                let fields = flat.map(parse_fields).transpose()?;
                items.push((parse_id(&id)?, fields));
            }
        }
        Ok(items)
    }

    fn ack(&self, stream: &str, group: &str, ids: &[EntryId]) -> QueueResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut cmd = redis::cmd("XACK");
        cmd.arg(stream).arg(group).arg(id_args(ids));
        self.query(&cmd)
    }

    fn delete(&self, stream: &str, ids: &[EntryId]) -> QueueResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut cmd = redis::cmd("XDEL");
        cmd.arg(stream).arg(id_args(ids));
        self.query(&cmd)
    }

    fn ack_and_delete(&self, stream: &str, group: &str, ids: &[EntryId]) -> QueueResult<Removal> {
        if ids.is_empty() {
            return Ok(Removal::default());
        }
        let ids = id_args(ids);

        let mut conn = self.conn.lock();
        let (acknowledged, deleted): (u64, u64) = redis::pipe()
            .atomic()
            .cmd("XACK")
            .arg(stream)
            .arg(group)
            .arg(&ids)
            .cmd("XDEL")
            .arg(stream)
            .arg(&ids)
            .query(&mut *conn)?;

        Ok(Removal {
            acknowledged,
            deleted,
        })
    }

    fn pending_summary(&self, stream: &str, group: &str) -> QueueResult<PendingSummary> {
        let mut cmd = redis::cmd("XPENDING");
        cmd.arg(stream).arg(group);

        let (count, min_id, max_id, consumers): PendingSummaryReply = self.query(&cmd)?;
        Ok(PendingSummary {
            count,
            min_id: min_id.as_deref().map(parse_id).transpose()?,
            max_id: max_id.as_deref().map(parse_id).transpose()?,
            consumers: consumers
                .unwrap_or_default()
                .into_iter()
                .map(|(consumer, count)| ConsumerPending { consumer, count })
                .collect(),
        })
    }

    fn pending_range(
        &self,
        stream: &str,
        group: &str,
        count: usize,
        start: EntryId,
        end: EntryId,
        consumer: Option<&str>,
    ) -> QueueResult<Vec<PendingRecord>> {
        let mut cmd = redis::cmd("XPENDING");
        cmd.arg(stream)
            .arg(group)
            .arg(start.to_string())
            .arg(end.to_string())
            .arg(count);
        if let Some(consumer) = consumer {
            cmd.arg(consumer);
        }

        let rows: Vec<(String, String, u64, u64)> = self.query(&cmd)?;
        rows.into_iter()
            .map(|(id, consumer, idle_ms, delivery_count)| {
                Ok(PendingRecord {
                    entry_id: parse_id(&id)?,
                    consumer,
                    idle_ms,
                    delivery_count,
                })
            })
            .collect()
    }

    fn range(
        &self,
        stream: &str,
        start: EntryId,
        end: EntryId,
        count: Option<usize>,
    ) -> QueueResult<Vec<(EntryId, Fields)>> {
        let mut cmd = redis::cmd("XRANGE");
        cmd.arg(stream).arg(start.to_string()).arg(end.to_string());
        if let Some(count) = count {
            cmd.arg("COUNT").arg(count);
        }

        let rows: Vec<(String, Vec<String>)> = self.query(&cmd)?;
        rows.into_iter()
            .map(|(id, flat)| Ok((parse_id(&id)?, parse_fields(flat)?)))
            .collect()
    }

    fn claim(
        &self,
        stream: &str,
        group: &str,
        new_consumer: &str,
        min_idle: Duration,
        ids: &[EntryId],
        just_id: bool,
    ) -> QueueResult<Vec<EntryId>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(stream)
            .arg(group)
            .arg(new_consumer)
            .arg(millis(min_idle))
            .arg(id_args(ids));

        if just_id {
            cmd.arg("JUSTID");
            let claimed: Vec<String> = self.query(&cmd)?;
            return claimed.iter().map(|id| parse_id(id)).collect();
        }

        let claimed: Vec<(String, Option<Vec<String>>)> = self.query(&cmd)?;
        claimed.iter().map(|(id, _)| parse_id(id)).collect()
    }

    fn delete_stream(&self, stream: &str) -> QueueResult<()> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(stream);
        self.query::<u64>(&cmd)?;
        Ok(())
    }
}

/// Leases stored as expiring Redis keys
#[derive(Clone)]
pub struct RedisLeases {
    conn: Arc<Mutex<Connection>>,
}

impl LeaseStore for RedisLeases {
    fn try_acquire(&self, key: &str, holder: &str, ttl: Duration) -> QueueResult<bool> {
        let mut conn = self.conn.lock();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(holder)
            .arg("NX")
            .arg("PX")
            .arg(millis(ttl).max(1))
            .query(&mut *conn)?;
        Ok(reply.is_some())
    }

    fn release(&self, key: &str, holder: &str) -> QueueResult<bool> {
        let mut conn = self.conn.lock();
        let removed: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(holder)
            .invoke(&mut *conn)?;
        Ok(removed > 0)
    }
}
