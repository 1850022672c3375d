use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub cached_at: DateTime<Utc>,
}

/// A 24h-default-TTL cache for 2xx HTTP responses shared across every
/// agent call against the same endpoint, backed by an embedded SQLite
/// file so cache hits survive process restarts between conversation
/// turns.
pub struct CachedHttpClient {
    conn: Arc<Mutex<Connection>>,
    default_ttl: Duration,
}

impl CachedHttpClient {
    pub fn open(path: &Path, default_ttl: Duration) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS http_cache_entries (
                cache_key TEXT PRIMARY KEY,
                status INTEGER NOT NULL,
                body BLOB NOT NULL,
                cached_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            default_ttl,
        })
    }

    pub fn in_memory(default_ttl: Duration) -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS http_cache_entries (
                cache_key TEXT PRIMARY KEY,
                status INTEGER NOT NULL,
                body BLOB NOT NULL,
                cached_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            default_ttl,
        })
    }

    /// Cache key = hash of method + url + sorted query pairs + sorted
    /// relevant headers + body, so two requests that are semantically
    /// identical but built with differently-ordered params collide.
    pub fn cache_key(
        method: &str,
        url: &str,
        query: &[(&str, &str)],
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> String {
        let mut query_sorted = query.to_vec();
        query_sorted.sort_unstable();
        let mut headers_sorted = headers.to_vec();
        headers_sorted.sort_unstable();

        let mut hasher = Sha256::new();
        hasher.update(method.as_bytes());
        hasher.update(url.as_bytes());
        for (k, v) in &query_sorted {
            hasher.update(k.as_bytes());
            hasher.update(v.as_bytes());
        }
        for (k, v) in &headers_sorted {
            hasher.update(k.as_bytes());
            hasher.update(v.as_bytes());
        }
        hasher.update(body);
        format!("{:x}", hasher.finalize())
    }

    pub async fn get(&self, cache_key: &str) -> anyhow::Result<Option<CachedResponse>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT status, body, cached_at, expires_at FROM http_cache_entries WHERE cache_key = ?1",
        )?;
        let row = stmt
            .query_row(params![cache_key], |row| {
                let status: i64 = row.get(0)?;
                let body: Vec<u8> = row.get(1)?;
                let cached_at: String = row.get(2)?;
                let expires_at: String = row.get(3)?;
                Ok((status, body, cached_at, expires_at))
            })
            .ok();

        let Some((status, body, cached_at, expires_at)) = row else {
            return Ok(None);
        };

        let expires_at: DateTime<Utc> = expires_at.parse()?;
        if expires_at < Utc::now() {
            drop(stmt);
            conn.execute(
                "DELETE FROM http_cache_entries WHERE cache_key = ?1",
                params![cache_key],
            )?;
            return Ok(None);
        }

        Ok(Some(CachedResponse {
            status: status as u16,
            body,
            cached_at: cached_at.parse()?,
        }))
    }

    /// Only 2xx responses are cached; callers should not invoke this for
    /// error responses.
    pub async fn put(&self, cache_key: &str, status: u16, body: &[u8]) -> anyhow::Result<()> {
        self.put_with_ttl(cache_key, status, body, self.default_ttl)
            .await
    }

    pub async fn put_with_ttl(
        &self,
        cache_key: &str,
        status: u16,
        body: &[u8],
        ttl: Duration,
    ) -> anyhow::Result<()> {
        if !(200..300).contains(&status) {
            return Ok(());
        }
        let now = Utc::now();
        let expires = now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::hours(24));
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO http_cache_entries (cache_key, status, body, cached_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(cache_key) DO UPDATE SET
                status = excluded.status,
                body = excluded.body,
                cached_at = excluded.cached_at,
                expires_at = excluded.expires_at",
            params![cache_key, status as i64, body, now.to_rfc3339(), expires.to_rfc3339()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cache_key_is_order_independent_over_query_and_headers() {
        let a = CachedHttpClient::cache_key(
            "GET",
            "https://eutils.ncbi.nlm.nih.gov/esearch",
            &[("term", "falls"), ("db", "pubmed")],
            &[],
            b"",
        );
        let b = CachedHttpClient::cache_key(
            "GET",
            "https://eutils.ncbi.nlm.nih.gov/esearch",
            &[("db", "pubmed"), ("term", "falls")],
            &[],
            b"",
        );
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn only_2xx_responses_are_stored() {
        let client = CachedHttpClient::in_memory(Duration::from_secs(3600)).unwrap();
        client.put("k1", 500, b"err").await.unwrap();
        assert!(client.get("k1").await.unwrap().is_none());

        client.put("k2", 200, b"ok").await.unwrap();
        let hit = client.get("k2").await.unwrap().unwrap();
        assert_eq!(hit.status, 200);
        assert_eq!(hit.body, b"ok");
    }

    #[tokio::test]
    async fn expired_entries_are_evicted_on_read() {
        let client = CachedHttpClient::in_memory(Duration::from_secs(0)).unwrap();
        client
            .put_with_ttl("k", 200, b"ok", Duration::from_millis(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(client.get("k").await.unwrap().is_none());
    }
}
