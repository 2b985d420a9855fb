//! Appwrite REST client
//!
//! Provides the schema, document and function operations the backend needs,
//! mapping every non-success answer onto [`CaresError`] through
//! [`CaresError::from_status`].

use async_trait::async_trait;
use cares_core::prelude::*;
use cares_core::{render_permissions, AppwriteConfig, RemoteMetrics};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, trace};
use url::Url;

/// Appwrite client configuration
#[derive(Debug, Clone)]
pub struct AppwriteClientConfig {
    /// REST endpoint including the `/v1` suffix
    pub endpoint: String,
    pub project_id: String,
    pub api_key: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for AppwriteClientConfig {
    fn default() -> Self {
        Self::from(&AppwriteConfig::default())
    }
}

impl From<&AppwriteConfig> for AppwriteClientConfig {
    fn from(config: &AppwriteConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            project_id: config.project_id.clone(),
            api_key: config.api_key.clone(),
            connect_timeout: config.connect_timeout,
            request_timeout: config.request_timeout,
        }
    }
}

/// Appwrite client
pub struct AppwriteClient {
    client: Client,
    endpoint: String,
    config: AppwriteClientConfig,
    metrics: RemoteMetrics,
}

impl AppwriteClient {
    /// Create new Appwrite client
    pub fn new(config: AppwriteClientConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| CaresError::config(format!("Invalid endpoint '{}': {}", config.endpoint, e)))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(CaresError::config(format!(
                "Endpoint must be http(s): {}",
                config.endpoint
            )));
        }

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| CaresError::transport_with_source("Failed to create client", e))?;

        Ok(Self {
            client,
            endpoint: endpoint.as_str().trim_end_matches('/').to_string(),
            config,
            metrics: RemoteMetrics::new(),
        })
    }

    /// Build request with project and key headers
    fn build_request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.endpoint, path);
        let mut req = self
            .client
            .request(method, &url)
            .header("X-Appwrite-Project", &self.config.project_id);

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("X-Appwrite-Key", api_key);
        }

        req.header("Content-Type", "application/json")
    }

    /// Send a request and decode the success body
    ///
    /// `resource` names the target in NotFound/AlreadyExists errors.
    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        resource: &str,
        req: RequestBuilder,
    ) -> Result<T> {
        let start = Instant::now();
        let resp = req.send().await.map_err(|e| {
            CaresError::transport_with_source(format!("{operation} request failed"), e)
        })?;

        let status = resp.status();
        self.metrics.record_call(operation, status.as_u16(), start.elapsed());
        trace!(operation, resource, status = status.as_u16(), "Remote call answered");

        if status.is_success() {
            return resp.json().await.map_err(|e| CaresError::Serialization {
                message: format!("Failed to parse {operation} response"),
                source: Some(Box::new(e)),
            });
        }

        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v["message"].as_str().map(str::to_string))
            .unwrap_or_else(|| format!("{operation} failed: {status}"));

        Err(CaresError::from_status(status.as_u16(), message, resource))
    }

    fn collection_path(database_id: &str, collection_id: &str) -> String {
        format!("/databases/{}/collections/{}", database_id, collection_id)
    }

    /// Request body for an attribute, with the kind-specific parameters
    pub fn attribute_body(attribute: &AttributeSpec) -> Value {
        match &attribute.kind {
            AttributeKind::String {
                size,
                default,
                array,
            } => json!({
                "key": attribute.key,
                "size": size,
                "required": attribute.required,
                "default": default,
                "array": array,
            }),
            AttributeKind::Boolean { default } => json!({
                "key": attribute.key,
                "required": attribute.required,
                "default": default,
            }),
            AttributeKind::Datetime { default } => json!({
                "key": attribute.key,
                "required": attribute.required,
                "default": default,
            }),
            AttributeKind::Integer { default, min, max } => json!({
                "key": attribute.key,
                "required": attribute.required,
                "default": default,
                "min": min,
                "max": max,
            }),
        }
    }
}

#[async_trait]
impl SchemaStore for AppwriteClient {
    async fn get_collection(&self, database_id: &str, collection_id: &str) -> Result<Collection> {
        let req = self.build_request(Method::GET, &Self::collection_path(database_id, collection_id));
        self.execute("get_collection", &format!("collection {collection_id}"), req)
            .await
    }

    async fn create_collection(
        &self,
        database_id: &str,
        collection_id: &str,
        name: &str,
        permissions: &[PermissionRule],
    ) -> Result<Collection> {
        let body = json!({
            "collectionId": collection_id,
            "name": name,
            "permissions": render_permissions(permissions),
            "documentSecurity": true,
            "enabled": true,
        });
        let req = self
            .build_request(Method::POST, &format!("/databases/{}/collections", database_id))
            .json(&body);

        let collection: Collection = self
            .execute("create_collection", &format!("collection {collection_id}"), req)
            .await?;
        debug!(collection = %collection.id, "Collection created");
        Ok(collection)
    }

    async fn update_collection(
        &self,
        database_id: &str,
        update: &CollectionUpdate,
    ) -> Result<Collection> {
        let body = json!({
            "name": update.name,
            "permissions": render_permissions(&update.permissions),
            "documentSecurity": update.document_security,
            "enabled": update.enabled,
        });
        let req = self
            .build_request(
                Method::PUT,
                &Self::collection_path(database_id, &update.collection_id),
            )
            .json(&body);

        self.execute(
            "update_collection",
            &format!("collection {}", update.collection_id),
            req,
        )
        .await
    }

    async fn create_attribute(
        &self,
        database_id: &str,
        collection_id: &str,
        attribute: &AttributeSpec,
    ) -> Result<()> {
        let path = format!(
            "{}/attributes/{}",
            Self::collection_path(database_id, collection_id),
            attribute.kind.name()
        );
        let req = self
            .build_request(Method::POST, &path)
            .json(&Self::attribute_body(attribute));

        self.execute::<Value>(
            "create_attribute",
            &format!("attribute {collection_id}.{}", attribute.key),
            req,
        )
        .await?;
        Ok(())
    }

    async fn create_index(
        &self,
        database_id: &str,
        collection_id: &str,
        index: &IndexSpec,
    ) -> Result<()> {
        let body = json!({
            "key": index.key,
            "type": index.index_type.as_str(),
            "attributes": index.attributes(),
            "orders": index.orders(),
        });
        let path = format!("{}/indexes", Self::collection_path(database_id, collection_id));
        let req = self.build_request(Method::POST, &path).json(&body);

        self.execute::<Value>(
            "create_index",
            &format!("index {collection_id}.{}", index.key),
            req,
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for AppwriteClient {
    async fn create_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
        data: &Value,
    ) -> Result<Value> {
        let body = json!({
            "documentId": document_id,
            "data": data,
        });
        let path = format!("{}/documents", Self::collection_path(database_id, collection_id));
        let req = self.build_request(Method::POST, &path).json(&body);

        self.execute(
            "create_document",
            &format!("document {collection_id}/{document_id}"),
            req,
        )
        .await
    }
}

#[async_trait]
impl FunctionRunner for AppwriteClient {
    async fn create_execution(&self, function_id: &str, body: &Value) -> Result<Value> {
        let payload = json!({
            "body": body.to_string(),
            "async": false,
        });
        let req = self
            .build_request(Method::POST, &format!("/functions/{}/executions", function_id))
            .json(&payload);

        self.execute("create_execution", &format!("function {function_id}"), req)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    fn client(endpoint: String) -> AppwriteClient {
        AppwriteClient::new(AppwriteClientConfig {
            endpoint,
            project_id: "proj".into(),
            api_key: Some("key".into()),
            ..Default::default()
        })
        .unwrap()
    }

    fn error_body(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
        (
            status,
            Json(json!({"message": message, "code": status.as_u16(), "type": "test"})),
        )
    }

    #[tokio::test]
    async fn test_get_collection_found_and_missing() {
        let router = Router::new()
            .route(
                "/v1/databases/db/collections/messages",
                get(|| async {
                    Json(json!({
                        "$id": "messages",
                        "name": "Messages",
                        "$permissions": ["read(\"any\")"],
                        "documentSecurity": true,
                        "enabled": true
                    }))
                }),
            )
            .route(
                "/v1/databases/db/collections/profiles",
                get(|| async { error_body(StatusCode::NOT_FOUND, "Collection not found") }),
            );
        let client = client(serve(router).await);

        let found = client.get_collection("db", "messages").await.unwrap();
        assert_eq!(found.name, "Messages");
        assert_eq!(found.permissions, vec!["read(\"any\")"]);

        let missing = client.get_collection("db", "profiles").await.unwrap_err();
        assert_eq!(missing.class(), ErrorClass::NotFound);
    }

    #[tokio::test]
    async fn test_create_attribute_status_classification() {
        let router = Router::new()
            .route(
                "/v1/databases/db/collections/c/attributes/string",
                post(|| async { error_body(StatusCode::CONFLICT, "Attribute already exists") }),
            )
            .route(
                "/v1/databases/db/collections/c/attributes/boolean",
                post(|| async { error_body(StatusCode::UNAUTHORIZED, "Invalid API key") }),
            )
            .route(
                "/v1/databases/db/collections/c/attributes/integer",
                post(|| async { error_body(StatusCode::BAD_REQUEST, "Invalid min") }),
            );
        let client = client(serve(router).await);

        let exists = client
            .create_attribute("db", "c", &AttributeSpec::string("name", 255))
            .await
            .unwrap_err();
        assert_eq!(exists.class(), ErrorClass::AlreadyExists);

        let auth = client
            .create_attribute("db", "c", &AttributeSpec::boolean("flag"))
            .await
            .unwrap_err();
        assert!(matches!(auth, CaresError::Authentication { ref message } if message == "Invalid API key"));

        let other = client
            .create_attribute("db", "c", &AttributeSpec::integer("n"))
            .await
            .unwrap_err();
        assert!(matches!(other, CaresError::Remote { status: 400, ref message } if message == "Invalid min"));
    }

    #[tokio::test]
    async fn test_requests_carry_credentials_and_parameters() {
        let seen: Arc<Mutex<Vec<(Option<String>, Value)>>> = Arc::default();
        let captured = seen.clone();
        let router = Router::new().route(
            "/v1/databases/db/collections/c/indexes",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let captured = captured.clone();
                async move {
                    let key = headers
                        .get("x-appwrite-key")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    captured.lock().unwrap().push((key, body));
                    (StatusCode::ACCEPTED, Json(json!({"key": "sender_idx"})))
                }
            }),
        );
        let client = client(serve(router).await);

        let index = IndexSpec::key("sender_idx").asc("senderId").desc("timestamp");
        client.create_index("db", "c", &index).await.unwrap();

        let seen = seen.lock().unwrap();
        let (key, body) = &seen[0];
        assert_eq!(key.as_deref(), Some("key"));
        assert_eq!(body["type"], "key");
        assert_eq!(body["attributes"], json!(["senderId", "timestamp"]));
        assert_eq!(body["orders"], json!(["ASC", "DESC"]));
    }

    #[tokio::test]
    async fn test_unreachable_store_is_fatal() {
        let client = client("http://127.0.0.1:1/v1".to_string());

        let err = client.get_collection("db", "messages").await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_attribute_bodies_per_kind() {
        let body = AppwriteClient::attribute_body(&AttributeSpec::string("attachments", 2000).array());
        assert_eq!(body["size"], 2000);
        assert_eq!(body["array"], true);
        assert!(body["default"].is_null());

        let body = AppwriteClient::attribute_body(
            &AttributeSpec::integer("unreadCount1").default_int(0).min(0),
        );
        assert_eq!(body["default"], 0);
        assert_eq!(body["min"], 0);
        assert!(body["max"].is_null());
        assert!(body.get("size").is_none());
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let result = AppwriteClient::new(AppwriteClientConfig {
            endpoint: "not a url".into(),
            ..Default::default()
        });
        assert!(matches!(result, Err(CaresError::Configuration { .. })));
    }
}
