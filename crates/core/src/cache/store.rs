//! [`CacheStorage`] implementation on SQLite.

use async_trait::async_trait;
use tokio_rusqlite::rusqlite::{self, OptionalExtension, Transaction};
use tokio_rusqlite::params;

use super::connection::CacheDb;
use super::hash::compute_cache_key;
use super::{CacheStorage, StoredEntry, VaryValues, validate_name};
use crate::{Error, RequestDescriptor, ResponseSnapshot};

/// An entry serialized into column values, ready to move onto the database thread.
struct EntryRow {
    key_hash: String,
    method: String,
    url: String,
    vary_json: String,
    status_code: i64,
    headers_json: String,
    body: Vec<u8>,
}

impl EntryRow {
    fn prepare(request: &RequestDescriptor, response: &ResponseSnapshot) -> Result<Self, Error> {
        let url = request.cache_url();
        let method = request.method.to_ascii_uppercase();
        Ok(Self {
            key_hash: compute_cache_key(&method, &url),
            method,
            url,
            vary_json: serde_json::to_string(&VaryValues::capture(request, response))?,
            status_code: i64::from(response.status),
            headers_json: serde_json::to_string(&response.headers)?,
            body: response.body.to_vec(),
        })
    }
}

fn ensure_store(tx: &Transaction<'_>, name: &str, now: &str) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT OR IGNORE INTO stores (name, created_at) VALUES (?1, ?2)",
        params![name, now],
    )?;
    Ok(())
}

fn upsert_entry(tx: &Transaction<'_>, name: &str, row: &EntryRow, now: &str) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT INTO entries (
            store_name, key_hash, method, url, vary_json, status_code, headers_json, body, stored_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(store_name, key_hash) DO UPDATE SET
            method = excluded.method,
            url = excluded.url,
            vary_json = excluded.vary_json,
            status_code = excluded.status_code,
            headers_json = excluded.headers_json,
            body = excluded.body,
            stored_at = excluded.stored_at",
        params![
            name,
            &row.key_hash,
            &row.method,
            &row.url,
            &row.vary_json,
            row.status_code,
            &row.headers_json,
            &row.body,
            now,
        ],
    )?;
    Ok(())
}

fn decode_response(status: i64, headers_json: &str, body: Vec<u8>) -> Result<ResponseSnapshot, Error> {
    let status = u16::try_from(status).map_err(|_| Error::CorruptEntry(format!("status {status}")))?;
    let headers: Vec<(String, String)> = serde_json::from_str(headers_json)?;
    Ok(ResponseSnapshot::new(status, headers, body))
}

#[async_trait]
impl CacheStorage for CacheDb {
    async fn open(&self, name: &str) -> Result<(), Error> {
        validate_name(name)?;
        let name = name.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO stores (name, created_at) VALUES (?1, ?2)",
                    params![name, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn get(&self, name: &str, request: &RequestDescriptor) -> Result<Option<ResponseSnapshot>, Error> {
        let name = name.to_string();
        let url = request.cache_url();
        let key_hash = compute_cache_key(&request.method, &url);

        let row = self
            .conn
            .call(move |conn| -> Result<Option<(String, i64, String, Vec<u8>)>, Error> {
                let row = conn
                    .query_row(
                        "SELECT vary_json, status_code, headers_json, body FROM entries
                         WHERE store_name = ?1 AND key_hash = ?2",
                        params![name, key_hash],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                    )
                    .optional()?;
                Ok(row)
            })
            .await
            .map_err(Error::from)?;

        let Some((vary_json, status, headers_json, body)) = row else {
            return Ok(None);
        };

        let vary: VaryValues = serde_json::from_str(&vary_json)?;
        if !vary.matches(request) {
            tracing::debug!(url = %url, "stored entry does not match on Vary headers");
            return Ok(None);
        }

        decode_response(status, &headers_json, body).map(Some)
    }

    async fn put(&self, name: &str, request: &RequestDescriptor, response: &ResponseSnapshot) -> Result<(), Error> {
        validate_name(name)?;
        let name = name.to_string();
        let row = EntryRow::prepare(request, response)?;
        let now = chrono::Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_store(&tx, &name, &now)?;
                upsert_entry(&tx, &name, &row, &now)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn put_all(&self, name: &str, entries: &[(RequestDescriptor, ResponseSnapshot)]) -> Result<(), Error> {
        validate_name(name)?;
        let name = name.to_string();
        let rows = entries
            .iter()
            .map(|(request, response)| EntryRow::prepare(request, response))
            .collect::<Result<Vec<_>, _>>()?;
        let now = chrono::Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_store(&tx, &name, &now)?;
                for row in &rows {
                    upsert_entry(&tx, &name, row, &now)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM stores WHERE name = ?1", params![name])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn list_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM stores ORDER BY name")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    async fn entries(&self, name: &str) -> Result<Vec<StoredEntry>, Error> {
        let name = name.to_string();
        let rows = self
            .conn
            .call(move |conn| -> Result<Vec<(String, String, i64, String, Vec<u8>, String)>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT method, url, status_code, headers_json, body, stored_at FROM entries
                     WHERE store_name = ?1 ORDER BY url",
                )?;
                let rows = stmt
                    .query_map(params![name], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(Error::from)?;

        rows.into_iter()
            .map(|(method, url, status, headers_json, body, stored_at)| {
                Ok(StoredEntry { method, url, response: decode_response(status, &headers_json, body)?, stored_at })
            })
            .collect()
    }

    async fn count(&self, name: &str) -> Result<usize, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<usize, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE store_name = ?1", params![name], |row| {
                        row.get(0)
                    })?;
                Ok(count as usize)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json_response(body: &'static str) -> ResponseSnapshot {
        ResponseSnapshot::new(200, vec![("content-type".into(), "application/json".into())], body)
    }

    fn get(url: &str) -> RequestDescriptor {
        RequestDescriptor::parse_get(url).unwrap()
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let req = get("http://localhost/query?text=kisan");

        db.put("gramsevak-offline-v1", &req, &json_response(r#"{"x":1}"#))
            .await
            .unwrap();

        let hit = db.get("gramsevak-offline-v1", &req).await.unwrap().unwrap();
        assert_eq!(hit.status, 200);
        assert_eq!(&hit.body[..], br#"{"x":1}"#);
        assert_eq!(hit.content_type(), Some("application/json"));
    }

    #[tokio::test]
    async fn test_get_missing_store_is_miss() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let result = db.get("nonexistent", &get("http://localhost/a")).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let req = get("http://localhost/query");

        db.put("dyn", &req, &json_response("first")).await.unwrap();
        db.put("dyn", &req, &json_response("second")).await.unwrap();

        assert_eq!(db.count("dyn").await.unwrap(), 1);
        let hit = db.get("dyn", &req).await.unwrap().unwrap();
        assert_eq!(&hit.body[..], b"second");
    }

    #[tokio::test]
    async fn test_stores_are_isolated() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let req = get("http://localhost/a.html");

        db.put("static-v1", &req, &json_response("a")).await.unwrap();
        assert!(db.get("dynamic-v1", &req).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_all_and_entries() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let batch = vec![
            (get("http://localhost/b.css"), json_response("b")),
            (get("http://localhost/a.html"), json_response("a")),
        ];

        db.put_all("static-v1", &batch).await.unwrap();
        db.put_all("static-v1", &batch).await.unwrap();

        let entries = db.entries("static-v1").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].url, "http://localhost/a.html");
        assert_eq!(entries[1].url, "http://localhost/b.css");
        assert_eq!(entries[0].method, "GET");
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put("static-v0", &get("http://localhost/a"), &json_response("a"))
            .await
            .unwrap();

        assert!(db.delete("static-v0").await.unwrap());
        assert!(!db.delete("static-v0").await.unwrap());
        assert!(db.list_names().await.unwrap().is_empty());
        assert_eq!(db.count("static-v0").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_open_and_list_names() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open("gramsevak-v1").await.unwrap();
        db.open("gramsevak-v1").await.unwrap();
        db.open("gramsevak-offline-v1").await.unwrap();

        let names = db.list_names().await.unwrap();
        assert_eq!(names, vec!["gramsevak-offline-v1".to_string(), "gramsevak-v1".to_string()]);
    }

    #[tokio::test]
    async fn test_open_rejects_empty_name() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(matches!(db.open("").await, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_vary_mismatch_is_miss() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let req = get("http://localhost/style.css").header("accept-language", "hi");
        let resp = ResponseSnapshot::new(200, vec![("vary".into(), "Accept-Language".into())], "body");

        db.put("static-v1", &req, &resp).await.unwrap();

        assert!(db.get("static-v1", &req).await.unwrap().is_some());
        let en = get("http://localhost/style.css").header("accept-language", "en");
        assert!(db.get("static-v1", &en).await.unwrap().is_none());
    }
}
