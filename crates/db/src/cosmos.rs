//! Azure Cosmos DB SQL API client for partition-scoped document queries.
//!
//! Requests are signed with the account master key (HMAC-SHA256 over verb,
//! resource type, resource link and date) and always carry the partition key
//! header, so the store itself refuses to read outside the partition.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::HeaderMap;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::debug;

use crate::store::{DocumentPage, DocumentStore, PageRequest, StoreError};

const API_VERSION: &str = "2018-12-31";
const HEADER_REQUEST_CHARGE: &str = "x-ms-request-charge";
const HEADER_CONTINUATION: &str = "x-ms-continuation";
const HEADER_SUB_STATUS: &str = "x-ms-substatus";

#[derive(Clone, Debug)]
pub struct CosmosSettings {
    pub endpoint: String,
    pub key: SecretString,
    pub database: String,
    pub timeout_secs: u64,
}

pub struct CosmosDocumentStore {
    client: reqwest::Client,
    endpoint: String,
    database: String,
    signing_key: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(rename = "Documents", default)]
    documents: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl CosmosDocumentStore {
    pub fn new(settings: CosmosSettings) -> Result<Self, StoreError> {
        let signing_key = BASE64
            .decode(settings.key.expose_secret().trim())
            .map_err(|error| StoreError::Credentials(format!("master key is not base64: {error}")))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .build()
            .map_err(|error| StoreError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            database: settings.database,
            signing_key,
        })
    }

    fn authorization(
        &self,
        verb: &str,
        resource_type: &str,
        resource_link: &str,
        date: &str,
    ) -> Result<String, StoreError> {
        let signature = sign(&self.signing_key, verb, resource_type, resource_link, date)?;
        let token = format!("type=master&ver=1.0&sig={signature}");
        Ok(urlencoding::encode(&token).into_owned())
    }
}

#[async_trait]
impl DocumentStore for CosmosDocumentStore {
    fn database(&self) -> &str {
        &self.database
    }

    async fn query_page(&self, request: PageRequest<'_>) -> Result<DocumentPage, StoreError> {
        let resource_link = format!("dbs/{}/colls/{}", self.database, request.container);
        let url = format!("{}/{resource_link}/docs", self.endpoint);
        let date = http_date(Utc::now());
        let authorization = self.authorization("post", "docs", &resource_link, &date)?;
        let partition_key = json!([request.partition_key_value]).to_string();
        let body = json!({ "query": request.query, "parameters": [] }).to_string();

        let mut builder = self
            .client
            .post(&url)
            .header("authorization", authorization)
            .header("x-ms-date", &date)
            .header("x-ms-version", API_VERSION)
            .header("content-type", "application/query+json")
            .header("x-ms-documentdb-isquery", "True")
            .header("x-ms-documentdb-partitionkey", partition_key)
            .header("x-ms-max-item-count", request.max_item_count.max(1).to_string())
            .body(body);
        if let Some(continuation) = request.continuation {
            builder = builder.header(HEADER_CONTINUATION, continuation);
        }

        let response = builder.send().await.map_err(|error| {
            if error.is_timeout() {
                StoreError::Timeout(error.to_string())
            } else {
                StoreError::Transport(error.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let request_charge = header_f64(&headers, HEADER_REQUEST_CHARGE);
        let text = response.text().await.map_err(|error| StoreError::Transport(error.to_string()))?;

        debug!(
            event_name = "store.cosmos.page",
            container = request.container,
            status,
            request_charge,
            "cosmos query page received"
        );

        if !(200..300).contains(&status) {
            return Err(rejection(status, &headers, &text, request_charge));
        }

        let parsed: QueryResponse = serde_json::from_str(&text)
            .map_err(|error| StoreError::Decode(format!("failed to parse query response: {error}")))?;

        Ok(DocumentPage {
            documents: parsed.documents,
            request_charge,
            continuation: header_str(&headers, HEADER_CONTINUATION),
        })
    }
}

fn rejection(status: u16, headers: &HeaderMap, text: &str, request_charge: f64) -> StoreError {
    let body: ErrorBody = serde_json::from_str(text).unwrap_or_default();
    let message = match (body.code, body.message) {
        (Some(code), Some(message)) => format!("{code}: {message}"),
        (None, Some(message)) => message,
        (Some(code), None) => code,
        (None, None) if text.trim().is_empty() => "no response body".to_string(),
        (None, None) => text.trim().to_string(),
    };

    StoreError::Rejected {
        status,
        sub_status: header_str(headers, HEADER_SUB_STATUS).and_then(|value| value.parse().ok()),
        message,
        request_charge,
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .filter(|value| !value.is_empty())
}

fn header_f64(headers: &HeaderMap, name: &str) -> f64 {
    header_str(headers, name).and_then(|value| value.parse().ok()).unwrap_or(0.0)
}

/// RFC 1123 date in the form the signature and `x-ms-date` header expect.
fn http_date(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn sign(
    key: &[u8],
    verb: &str,
    resource_type: &str,
    resource_link: &str,
    date: &str,
) -> Result<String, StoreError> {
    let payload = format!(
        "{}\n{}\n{}\n{}\n\n",
        verb.to_lowercase(),
        resource_type.to_lowercase(),
        resource_link,
        date.to_lowercase()
    );

    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|error| StoreError::Credentials(error.to_string()))?;
    mac.update(payload.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use reqwest::header::{HeaderMap, HeaderValue};
    use secrecy::SecretString;

    use super::{http_date, rejection, sign, CosmosDocumentStore, CosmosSettings};
    use crate::store::StoreError;

    #[test]
    fn http_date_uses_rfc1123_gmt() {
        let date = Utc.with_ymd_and_hms(2026, 10, 19, 8, 5, 9).single().expect("valid date");

        assert_eq!(http_date(date), "Mon, 19 Oct 2026 08:05:09 GMT");
    }

    #[test]
    fn signature_is_deterministic_and_lowercases_verb_and_date() {
        let key = b"master-key-bytes";
        let upper = sign(key, "POST", "DOCS", "dbs/db/colls/c", "Mon, 19 Oct 2026 08:05:09 GMT")
            .expect("signature");
        let lower = sign(key, "post", "docs", "dbs/db/colls/c", "mon, 19 oct 2026 08:05:09 gmt")
            .expect("signature");

        assert_eq!(upper, lower);
        assert_eq!(upper.len(), 44, "base64 of a 32-byte digest");
    }

    #[test]
    fn resource_link_is_case_sensitive() {
        let key = b"master-key-bytes";
        let date = "mon, 19 oct 2026 08:05:09 gmt";

        let one = sign(key, "post", "docs", "dbs/db/colls/Profiles", date).expect("signature");
        let other = sign(key, "post", "docs", "dbs/db/colls/profiles", date).expect("signature");

        assert_ne!(one, other);
    }

    #[test]
    fn authorization_token_is_percent_encoded() {
        let store = CosmosDocumentStore::new(CosmosSettings {
            endpoint: "https://twins.documents.azure.com:443/".to_string(),
            key: SecretString::from("c2VjcmV0LWtleQ==".to_string()),
            database: "TwinHumanDB".to_string(),
            timeout_secs: 5,
        })
        .expect("valid master key");

        let token = store
            .authorization("post", "docs", "dbs/TwinHumanDB/colls/c", "Mon, 19 Oct 2026 08:05:09 GMT")
            .expect("authorization token");

        assert!(token.starts_with("type%3Dmaster%26ver%3D1.0%26sig%3D"), "{token}");
        assert!(!token.contains(&['+', '/', '=', '&'][..]), "{token}");
    }

    #[test]
    fn invalid_master_key_is_a_credentials_error() {
        let result = CosmosDocumentStore::new(CosmosSettings {
            endpoint: "https://twins.documents.azure.com:443/".to_string(),
            key: SecretString::from("not base64!".to_string()),
            database: "TwinHumanDB".to_string(),
            timeout_secs: 5,
        });

        assert!(matches!(result, Err(StoreError::Credentials(_))));
    }

    #[test]
    fn rejection_reads_error_body_and_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ms-substatus", HeaderValue::from_static("1004"));

        let error = rejection(
            400,
            &headers,
            r#"{"code":"BadRequest","message":"Syntax error near 'FORM'"}"#,
            2.79,
        );

        assert_eq!(
            error,
            StoreError::Rejected {
                status: 400,
                sub_status: Some(1004),
                message: "BadRequest: Syntax error near 'FORM'".to_string(),
                request_charge: 2.79,
            }
        );
    }

    #[test]
    fn rejection_falls_back_to_raw_body() {
        let error = rejection(503, &HeaderMap::new(), "service unavailable", 0.0);

        assert!(error.to_string().contains("service unavailable"));
        assert_eq!(error.sub_status(), None);
    }
}
