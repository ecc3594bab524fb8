//! Firestore document store.
//!
//! Talks to the Firestore REST API (`v1`) over reqwest:
//! - `documents:runQuery` with a field filter for the email lookup
//! - `POST documents/{collection}` to create documents with generated ids
//! - paged `GET documents/{collection}` to read every note
//!
//! Authentication, first match wins:
//! - `access_token` in the credential file
//! - `GOOGLE_OAUTH_ACCESS_TOKEN`
//! - a service account key (`client_email` + `private_key`), exchanged for
//!   short-lived tokens by [`ServiceAccountTokenSource`]
//!
//! When an emulator host is configured, requests go to the emulator over
//! plain HTTP with the emulator's `owner` token.

use super::oauth::{ServiceAccountTokenSource, DEFAULT_TOKEN_URI};
use super::{DocumentStore, NewUser, Note, User, NOTES, USERS};
use crate::config::StoreConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::Path;
use std::time::Duration;

const PRODUCTION_HOST: &str = "https://firestore.googleapis.com";

/// Page size for collection listing.
const LIST_PAGE_SIZE: u32 = 300;

/// Fields read from the service credential file. Other keys are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceCredentials {
    pub project_id: String,
    pub access_token: Option<String>,
    pub client_email: Option<String>,
    pub private_key: Option<String>,
    pub token_uri: Option<String>,
}

impl ServiceCredentials {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read credential file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse credential file {}", path.display()))
    }
}

/// How requests are authorized.
enum Auth {
    Anonymous,
    Bearer(String),
    ServiceAccount(ServiceAccountTokenSource),
}

/// Firestore REST client for the `users` and `notes` collections.
pub struct FirestoreStore {
    http: reqwest::Client,
    /// `.../v1/projects/{project}/databases/{database}/documents`
    documents_url: String,
    project_id: String,
    auth: Auth,
}

impl FirestoreStore {
    /// Create a client against an explicit host (`https://...` or `http://...`).
    pub fn new(
        host: &str,
        project_id: &str,
        database_id: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let documents_url = format!(
            "{}/v1/projects/{}/databases/{}/documents",
            host.trim_end_matches('/'),
            project_id,
            database_id
        );
        Ok(Self {
            http,
            documents_url,
            project_id: project_id.to_string(),
            auth: token.map_or(Auth::Anonymous, Auth::Bearer),
        })
    }

    /// Authorize with tokens exchanged for a service account key.
    pub fn with_service_account(
        mut self,
        client_email: &str,
        private_key_pem: &str,
        token_uri: &str,
    ) -> Result<Self> {
        self.auth = Auth::ServiceAccount(ServiceAccountTokenSource::new(
            self.http.clone(),
            client_email,
            private_key_pem,
            token_uri,
        )?);
        Ok(self)
    }

    /// Build from store config: credential file, emulator host and timeout.
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs.max(1));

        if let Some(ref emulator) = config.emulator_host {
            // The emulator does not need a real credential file.
            let project_id = ServiceCredentials::from_file(&config.credentials_path)
                .map(|c| c.project_id)
                .unwrap_or_else(|_| "demo-lingobook".into());
            return Self::new(
                &format!("http://{emulator}"),
                &project_id,
                &config.database_id,
                Some("owner".into()),
                timeout,
            );
        }

        let credentials = ServiceCredentials::from_file(&config.credentials_path)?;
        let token = credentials
            .access_token
            .clone()
            .or_else(|| std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN").ok())
            .filter(|t| !t.trim().is_empty());

        let store = Self::new(
            PRODUCTION_HOST,
            &credentials.project_id,
            &config.database_id,
            token,
            timeout,
        )?;
        if !matches!(store.auth, Auth::Anonymous) {
            return Ok(store);
        }

        match (credentials.client_email, credentials.private_key) {
            (Some(email), Some(key)) => {
                let token_uri = credentials.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
                let store = store.with_service_account(&email, &key, token_uri)?;
                tracing::info!(client_email = %email, "Authorizing Firestore with service account");
                Ok(store)
            }
            _ => {
                tracing::warn!("No Firestore credentials configured, requests will be unauthenticated");
                Ok(store)
            }
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}", self.documents_url, collection)
    }

    fn run_query_url(&self) -> String {
        format!("{}:runQuery", self.documents_url)
    }

    async fn authorize(&self, request: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        Ok(match self.auth {
            Auth::Anonymous => request,
            Auth::Bearer(ref token) => request.bearer_auth(token),
            Auth::ServiceAccount(ref source) => request.bearer_auth(
                source
                    .access_token()
                    .await
                    .context("Failed to obtain Firestore access token")?,
            ),
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder, what: &str) -> Result<Value> {
        let resp = self
            .authorize(request)
            .await?
            .send()
            .await
            .with_context(|| format!("Firestore {what} request failed"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Firestore {what} failed ({status}): {body}");
        }

        resp.json()
            .await
            .with_context(|| format!("Firestore {what} returned invalid JSON"))
    }

    async fn create_document(&self, collection: &str, fields: Value) -> Result<String> {
        let request = self
            .http
            .post(self.collection_url(collection))
            .json(&json!({ "fields": fields }));
        let doc = self.send(request, "create").await?;
        document_id(&doc).ok_or_else(|| anyhow::anyhow!("Firestore create returned no document name"))
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    fn name(&self) -> &str {
        "firestore"
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let query = json!({
            "structuredQuery": {
                "from": [{ "collectionId": USERS }],
                "where": {
                    "fieldFilter": {
                        "field": { "fieldPath": "email" },
                        "op": "EQUAL",
                        "value": { "stringValue": email },
                    }
                },
                "limit": 1,
            }
        });

        let request = self.http.post(self.run_query_url()).json(&query);
        let results = self.send(request, "query").await?;

        // runQuery streams one element per result; elements without a
        // `document` only carry read metadata.
        let doc = results
            .as_array()
            .into_iter()
            .flatten()
            .find_map(|entry| entry.get("document"));

        Ok(doc.and_then(|doc| {
            Some(User {
                id: document_id(doc)?,
                name: string_field(doc, "name"),
                phone: string_field(doc, "phone"),
                email: string_field(doc, "email"),
                password_hash: string_field(doc, "password"),
            })
        }))
    }

    async fn create_user(&self, user: &NewUser) -> Result<String> {
        self.create_document(
            USERS,
            encode_fields(&[
                ("name", &user.name),
                ("phone", &user.phone),
                ("email", &user.email),
                ("password", &user.password_hash),
            ]),
        )
        .await
    }

    async fn list_notes(&self) -> Result<Vec<Note>> {
        let mut notes = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(self.collection_url(NOTES))
                .query(&[("pageSize", LIST_PAGE_SIZE.to_string())]);
            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let page = self.send(request, "list").await?;
            if let Some(docs) = page.get("documents").and_then(Value::as_array) {
                notes.extend(docs.iter().filter_map(|doc| {
                    Some(Note {
                        id: document_id(doc)?,
                        title: string_field(doc, "title"),
                        content: string_field(doc, "content"),
                    })
                }));
            }

            page_token = page
                .get("nextPageToken")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .map(ToOwned::to_owned);
            if page_token.is_none() {
                break;
            }
        }

        Ok(notes)
    }

    async fn add_note(&self, title: &str, content: &str) -> Result<String> {
        self.create_document(NOTES, encode_fields(&[("title", title), ("content", content)]))
            .await
    }
}

/// Encode string fields as Firestore typed values.
fn encode_fields(fields: &[(&str, &str)]) -> Value {
    let map: Map<String, Value> = fields
        .iter()
        .map(|(key, value)| ((*key).to_string(), json!({ "stringValue": value })))
        .collect();
    Value::Object(map)
}

/// String value of a document field, or empty when absent or not a string.
fn string_field(doc: &Value, field: &str) -> String {
    doc.get("fields")
        .and_then(|f| f.get(field))
        .and_then(|v| v.get("stringValue"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Last path segment of a document's resource name.
fn document_id(doc: &Value) -> Option<String> {
    doc.get("name")
        .and_then(Value::as_str)
        .and_then(|name| name.rsplit('/').next())
        .filter(|id| !id.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOCS: &str = "/v1/projects/test-project/databases/(default)/documents";

    fn store(server: &MockServer) -> FirestoreStore {
        FirestoreStore::new(
            &server.uri(),
            "test-project",
            "(default)",
            Some("test-token".into()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn urls_are_built_from_project_and_database() {
        let store = FirestoreStore::new(
            "https://firestore.googleapis.com/",
            "p1",
            "(default)",
            None,
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            store.collection_url("notes"),
            "https://firestore.googleapis.com/v1/projects/p1/databases/(default)/documents/notes"
        );
        assert!(store.run_query_url().ends_with("/documents:runQuery"));
    }

    #[test]
    fn field_helpers_decode_documents() {
        let doc = json!({
            "name": "projects/p/databases/(default)/documents/notes/abc123",
            "fields": { "title": { "stringValue": "Hi" }, "count": { "integerValue": "3" } }
        });
        assert_eq!(document_id(&doc).as_deref(), Some("abc123"));
        assert_eq!(string_field(&doc, "title"), "Hi");
        assert_eq!(string_field(&doc, "count"), "");
        assert_eq!(string_field(&doc, "missing"), "");
    }

    #[test]
    fn credentials_file_parses_project_id() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("key.json");
        std::fs::write(
            &path,
            r#"{"type":"service_account","project_id":"demo","client_email":"x@y"}"#,
        )
        .unwrap();
        let creds = ServiceCredentials::from_file(&path).unwrap();
        assert_eq!(creds.project_id, "demo");
        assert!(creds.access_token.is_none());
        assert_eq!(creds.client_email.as_deref(), Some("x@y"));
        assert!(creds.private_key.is_none());
    }

    #[tokio::test]
    async fn service_account_token_is_exchanged_and_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "exchanged-token",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{DOCS}/notes")))
            .and(header("authorization", "Bearer exchanged-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(2)
            .mount(&server)
            .await;

        let store = FirestoreStore::new(
            &server.uri(),
            "test-project",
            "(default)",
            None,
            Duration::from_secs(5),
        )
        .unwrap()
        .with_service_account(
            "robot@test-project.iam.gserviceaccount.com",
            crate::store::oauth::tests::TEST_KEY_PEM,
            &format!("{}/token", server.uri()),
        )
        .unwrap();

        assert!(store.list_notes().await.unwrap().is_empty());
        assert!(store.list_notes().await.unwrap().is_empty());
    }

    #[test]
    fn key_file_without_token_uses_service_account() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("key.json");
        let key = json!({
            "type": "service_account",
            "project_id": "demo",
            "client_email": "robot@demo.iam.gserviceaccount.com",
            "private_key": crate::store::oauth::tests::TEST_KEY_PEM,
        });
        std::fs::write(&path, key.to_string()).unwrap();

        let config = StoreConfig {
            credentials_path: path,
            ..StoreConfig::default()
        };
        let store = FirestoreStore::from_config(&config).unwrap();
        assert_eq!(store.project_id(), "demo");
        assert!(matches!(store.auth, Auth::ServiceAccount(ref s)
            if s.client_email() == "robot@demo.iam.gserviceaccount.com"));
    }

    #[tokio::test]
    async fn find_user_sends_email_filter_and_decodes_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{DOCS}:runQuery")))
            .and(header("authorization", "Bearer test-token"))
            .and(body_partial_json(json!({
                "structuredQuery": { "where": { "fieldFilter": {
                    "value": { "stringValue": "ada@example.com" }
                }}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "document": {
                    "name": "projects/test-project/databases/(default)/documents/users/u1",
                    "fields": {
                        "name": { "stringValue": "Ada" },
                        "phone": { "stringValue": "555" },
                        "email": { "stringValue": "ada@example.com" },
                        "password": { "stringValue": "$argon2id$hash" }
                    }
                },
                "readTime": "2024-01-01T00:00:00Z"
            }])))
            .mount(&server)
            .await;

        let user = store(&server)
            .find_user_by_email("ada@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.name, "Ada");
        assert_eq!(user.password_hash, "$argon2id$hash");
    }

    #[tokio::test]
    async fn find_user_without_match_returns_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{DOCS}:runQuery")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{ "readTime": "2024-01-01T00:00:00Z" }])),
            )
            .mount(&server)
            .await;

        assert!(store(&server)
            .find_user_by_email("ghost@example.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn create_user_returns_generated_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{DOCS}/users")))
            .and(body_partial_json(json!({
                "fields": { "email": { "stringValue": "ada@example.com" } }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/test-project/databases/(default)/documents/users/newid",
                "fields": {}
            })))
            .mount(&server)
            .await;

        let id = store(&server)
            .create_user(&NewUser {
                name: "Ada".into(),
                phone: "555".into(),
                email: "ada@example.com".into(),
                password_hash: "$argon2id$hash".into(),
            })
            .await
            .unwrap();
        assert_eq!(id, "newid");
    }

    #[tokio::test]
    async fn list_notes_follows_page_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{DOCS}/notes")))
            .and(query_param("pageToken", "next"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documents": [{
                    "name": "projects/test-project/databases/(default)/documents/notes/n2",
                    "fields": { "title": { "stringValue": "two" }, "content": { "stringValue": "b" } }
                }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{DOCS}/notes")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documents": [{
                    "name": "projects/test-project/databases/(default)/documents/notes/n1",
                    "fields": { "title": { "stringValue": "one" }, "content": { "stringValue": "a" } }
                }],
                "nextPageToken": "next"
            })))
            .mount(&server)
            .await;

        let notes = store(&server).list_notes().await.unwrap();
        let ids: Vec<_> = notes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, ["n1", "n2"]);
        assert_eq!(notes[1].title, "two");
    }

    #[tokio::test]
    async fn empty_collection_lists_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{DOCS}/notes")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        assert!(store(&server).list_notes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn server_error_surfaces_as_err() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{DOCS}/notes")))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let err = store(&server).add_note("t", "c").await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }
}
