use std::{fmt, time::Duration};

use async_trait::async_trait;
use redis::{Script, aio::MultiplexedConnection};

use super::TrackerStore;
use crate::TrackerError;

/// Sets `KEYS[1]` to `ARGV[1]` with a TTL of `ARGV[2]` seconds when the key
/// is absent or holds one of `ARGV[3..]`.
const CLAIM_SCRIPT: &str = r"
local current = redis.call('GET', KEYS[1])
if current then
    local claimable = false
    for i = 3, #ARGV do
        if current == ARGV[i] then
            claimable = true
        end
    end
    if not claimable then
        return 0
    end
end
redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[2])
return 1
";

pub struct RedisStore {
    connection: MultiplexedConnection,
    claim: Script,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect and verify the server answers `PING`.
    ///
    /// `addr` may be a full `redis://` URL or a bare `host:port`.
    pub async fn connect(addr: &str) -> Result<Self, TrackerError> {
        let url = if addr.contains("://") {
            addr.to_string()
        } else {
            format!("redis://{addr}")
        };

        let client = redis::Client::open(url)?;
        let mut connection = client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut connection).await?;

        Ok(Self {
            connection,
            claim: Script::new(CLAIM_SCRIPT),
        })
    }
}

#[async_trait]
impl TrackerStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<i64>, TrackerError> {
        let mut connection = self.connection.clone();
        let value: Option<i64> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut connection)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: i64, ttl: Duration) -> Result<(), TrackerError> {
        let mut connection = self.connection.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut connection)
            .await?;
        Ok(())
    }

    async fn set_if(
        &self,
        key: &str,
        claimable: &[i64],
        value: i64,
        ttl: Duration,
    ) -> Result<bool, TrackerError> {
        let mut connection = self.connection.clone();
        let mut invocation = self.claim.key(key);
        invocation.arg(value).arg(ttl.as_secs());
        for code in claimable {
            invocation.arg(*code);
        }

        let written: i64 = invocation.invoke_async(&mut connection).await?;
        Ok(written == 1)
    }
}
