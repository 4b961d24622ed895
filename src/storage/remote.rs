use super::backend::TableBackend;
use super::partitioner::PartitionManager;
use super::protocol::*;
use super::types::*;
use crate::error::{DirectoryError, DirectoryResult, ErrorResponse};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// [`TableBackend`] that talks to one or more table servers over HTTP.
///
/// Each row key is owned by exactly one endpoint, so every operation on that
/// key is serialized by a single server. Schema operations go to all of them.
///
/// Ownership is a key's partition modulo its position in `endpoints`. The
/// ordered list must be identical in every directory process and stay fixed
/// for the life of the cluster; adding, removing or reordering servers moves
/// keys away from their rows.
/// One call is one HTTP request under the per-call timeout; retries are the
/// caller's job (see `crate::retry`).
pub struct RemoteBackend {
    endpoints: Vec<String>,
    partitioner: PartitionManager,
    http_client: reqwest::Client,
    call_timeout: Duration,
}

impl RemoteBackend {
    pub fn new(endpoints: &[String], call_timeout: Duration) -> DirectoryResult<Self> {
        let endpoints: Vec<String> = endpoints.iter().map(|e| normalize_endpoint(e)).collect();
        if endpoints.is_empty() {
            return Err(DirectoryError::validation(
                "store endpoints",
                "at least one table server endpoint is required",
            ));
        }
        // One server listed twice would own two shares of the keyspace.
        for (i, endpoint) in endpoints.iter().enumerate() {
            if endpoints[..i].contains(endpoint) {
                return Err(DirectoryError::validation(
                    "store endpoints",
                    format!("{} is listed more than once", endpoint),
                ));
            }
        }

        Ok(Self {
            endpoints,
            partitioner: PartitionManager::new(),
            http_client: reqwest::Client::new(),
            call_timeout,
        })
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    fn endpoint_for(&self, key: &str) -> &str {
        &self.endpoints[self.partitioner.owner_index(key, self.endpoints.len())]
    }

    async fn post<Req, Resp>(&self, endpoint: &str, path: &str, payload: &Req) -> DirectoryResult<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", endpoint, path);
        let response = self
            .http_client
            .post(&url)
            .json(payload)
            .timeout(self.call_timeout)
            .send()
            .await
            .map_err(|e| DirectoryError::unavailable(format!("POST {} failed: {}", url, e)))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<Resp>()
                .await
                .map_err(|e| DirectoryError::unavailable(format!("Bad response from {}: {}", url, e)));
        }

        match response.json::<ErrorResponse>().await {
            Ok(body) => Err(DirectoryError::from_wire(body)),
            Err(_) if status.is_server_error() => Err(DirectoryError::unavailable(format!(
                "{} returned {}",
                url, status
            ))),
            Err(_) => Err(DirectoryError::internal(format!("{} returned {}", url, status))),
        }
    }

    async fn broadcast_schema<Req>(&self, path: &str, payload: &Req) -> DirectoryResult<SchemaChange>
    where
        Req: Serialize,
    {
        let mut change = SchemaChange::AlreadyExists;
        for endpoint in &self.endpoints {
            let response: SchemaResponse = self.post(endpoint, path, payload).await?;
            if response.change == SchemaChange::Created {
                change = SchemaChange::Created;
            }
        }
        Ok(change)
    }
}

#[async_trait]
impl TableBackend for RemoteBackend {
    async fn create_keyspace(&self, spec: &KeyspaceSpec) -> DirectoryResult<SchemaChange> {
        let payload = CreateKeyspaceRequest { spec: spec.clone() };
        self.broadcast_schema(ENDPOINT_KEYSPACE, &payload).await
    }

    async fn create_table(&self, keyspace: &str, spec: &TableSpec) -> DirectoryResult<SchemaChange> {
        let payload = CreateTableRequest {
            keyspace: keyspace.to_string(),
            spec: spec.clone(),
        };
        self.broadcast_schema(ENDPOINT_TABLE, &payload).await
    }

    async fn get(&self, table: &TableRef, key: &str) -> DirectoryResult<Option<Row>> {
        let payload = GetRowRequest {
            table: table.clone(),
            key: key.to_string(),
        };
        let response: GetRowResponse = self
            .post(self.endpoint_for(key), ENDPOINT_ROW_GET, &payload)
            .await?;
        Ok(response.row)
    }

    async fn scan(&self, table: &TableRef) -> DirectoryResult<Vec<(String, Row)>> {
        let payload = ScanRequest {
            table: table.clone(),
        };
        let mut entries = Vec::new();
        for endpoint in &self.endpoints {
            let response: ScanResponse = self.post(endpoint, ENDPOINT_ROW_SCAN, &payload).await?;
            entries.extend(response.entries.into_iter().map(|e| (e.key, e.row)));
        }
        Ok(entries)
    }

    async fn insert_if_absent(
        &self,
        table: &TableRef,
        op_id: &OpId,
        key: &str,
        value_json: String,
    ) -> DirectoryResult<WriteOutcome> {
        let payload = WriteRowRequest {
            table: table.clone(),
            op_id: op_id.clone(),
            key: key.to_string(),
            value_json,
        };
        let response: WriteRowResponse = self
            .post(self.endpoint_for(key), ENDPOINT_ROW_INSERT, &payload)
            .await?;
        Ok(response.outcome)
    }

    async fn compare_and_set(
        &self,
        table: &TableRef,
        op_id: &OpId,
        key: &str,
        expected_version: u64,
        value_json: String,
    ) -> DirectoryResult<WriteOutcome> {
        let payload = CasRowRequest {
            table: table.clone(),
            op_id: op_id.clone(),
            key: key.to_string(),
            expected_version,
            value_json,
        };
        let response: WriteRowResponse = self
            .post(self.endpoint_for(key), ENDPOINT_ROW_CAS, &payload)
            .await?;
        Ok(response.outcome)
    }

    async fn upsert(
        &self,
        table: &TableRef,
        op_id: &OpId,
        key: &str,
        value_json: String,
    ) -> DirectoryResult<WriteOutcome> {
        let payload = WriteRowRequest {
            table: table.clone(),
            op_id: op_id.clone(),
            key: key.to_string(),
            value_json,
        };
        let response: WriteRowResponse = self
            .post(self.endpoint_for(key), ENDPOINT_ROW_UPSERT, &payload)
            .await?;
        Ok(response.outcome)
    }
}

/// Accepts `host:port` or a full URL and strips any trailing slash.
pub fn normalize_endpoint(raw: &str) -> String {
    let cleaned = raw.trim().trim_end_matches('/');
    if cleaned.starts_with("http://") || cleaned.starts_with("https://") {
        cleaned.to_string()
    } else {
        format!("http://{}", cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize_endpoint("10.0.0.1:7000"), "http://10.0.0.1:7000");
        assert_eq!(normalize_endpoint("http://store-a:7000/"), "http://store-a:7000");
        assert_eq!(normalize_endpoint(" https://store-b "), "https://store-b");
    }

    #[test]
    fn test_requires_an_endpoint() {
        let result = RemoteBackend::new(&[], Duration::from_millis(100));
        assert!(matches!(result, Err(DirectoryError::Validation { .. })));
    }

    #[test]
    fn test_rejects_duplicate_endpoints() {
        let endpoints = vec!["a:1".to_string(), "b:1".to_string(), "http://a:1/".to_string()];

        let result = RemoteBackend::new(&endpoints, Duration::from_millis(100));

        assert!(matches!(result, Err(DirectoryError::Validation { .. })));
    }

    #[test]
    fn test_backends_with_same_endpoints_agree_on_owners() {
        let endpoints = vec!["a:1".to_string(), "b:1".to_string(), "c:1".to_string()];
        let first = RemoteBackend::new(&endpoints, Duration::from_millis(100)).unwrap();
        let second = RemoteBackend::new(&endpoints, Duration::from_secs(5)).unwrap();

        for i in 0..200 {
            let key = format!("{}:0", i);
            assert_eq!(first.endpoint_for(&key), second.endpoint_for(&key));
        }
        // "42:0" hashes to partition 114, and 114 % 3 == 0.
        assert_eq!(first.endpoint_for("42:0"), "http://a:1");
    }

    #[test]
    fn test_same_key_always_routes_to_same_endpoint() {
        let endpoints = vec![
            "a:1".to_string(),
            "b:1".to_string(),
            "c:1".to_string(),
        ];
        let backend = RemoteBackend::new(&endpoints, Duration::from_millis(100)).unwrap();

        let first = backend.endpoint_for("42:0").to_string();
        for _ in 0..10 {
            assert_eq!(backend.endpoint_for("42:0"), first);
        }
    }
}
