//! HTTP client for a Conical server.
//!
//! # Endpoints
//!
//! All paths are relative to the configured server URL:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | product lookup | `GET api/products/{product}` |
//! | create run set | `POST api/products/{product}/testRunSets` |
//! | run set file | `POST .../testRunSets/{id}/additionalFiles?name=&description=` |
//! | create run | `POST .../testRunSets/{id}/testRuns` |
//! | run file | `POST .../testRuns/{runId}/additionalFiles?name=&description=` |
//! | run logs | `POST .../testRuns/{runId}/logs` |
//! | run set status | `PUT .../testRunSets/{id}/status` |
//!
//! A bearer token is sent when configured. Requests are not retried.

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tracing::debug;

use super::{
    FileUpload, NewRunSet, NewTestRun, Product, RunSetHandle, RunSetStatus, TestRunHandle,
    TrackingError, TrackingResult, TrackingSink,
};

const USER_AGENT_VALUE: &str = concat!("pytest-conical-uploader/", env!("CARGO_PKG_VERSION"));

impl From<reqwest::Error> for TrackingError {
    fn from(err: reqwest::Error) -> Self {
        TrackingError::Transport(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ProductResponse {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: u64,
}

#[derive(Debug, Serialize)]
struct StatusRequest {
    status: RunSetStatus,
}

/// [`TrackingSink`] backed by a Conical server's REST API.
#[derive(Debug, Clone)]
pub struct ConicalClient {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl ConicalClient {
    /// Creates a client for `server`, optionally authenticating with `token`.
    pub fn new(server: &str, token: Option<String>) -> TrackingResult<Self> {
        let base_url =
            Url::parse(server).map_err(|e| TrackingError::InvalidUrl(format!("{server}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(TrackingError::InvalidUrl(server.to_string()));
        }

        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .build()
            .map_err(|e| TrackingError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// Builds `{server}/api/products/{product}/{segments...}`.
    fn endpoint(&self, product: &str, segments: &[&str]) -> TrackingResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TrackingError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["api", "products", product])
            .extend(segments);
        Ok(url)
    }

    fn run_set_endpoint(&self, run_set: &RunSetHandle, segments: &[&str]) -> TrackingResult<Url> {
        let id = run_set.id.to_string();
        let mut all = vec!["testRunSets", id.as_str()];
        all.extend_from_slice(segments);
        self.endpoint(&run_set.product, &all)
    }

    fn test_run_endpoint(&self, run: &TestRunHandle, segments: &[&str]) -> TrackingResult<Url> {
        let run_set_id = run.run_set_id.to_string();
        let run_id = run.id.to_string();
        let mut all = vec!["testRunSets", run_set_id.as_str(), "testRuns", run_id.as_str()];
        all.extend_from_slice(segments);
        self.endpoint(&run.product, &all)
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        debug!(%method, %url, "conical request");
        let request = self.client.request(method, url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Sends a request, turning non-success statuses into errors.
    async fn send(&self, request: reqwest::RequestBuilder) -> TrackingResult<reqwest::Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        Err(TrackingError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    async fn read_id(response: reqwest::Response) -> TrackingResult<u64> {
        response
            .json::<IdResponse>()
            .await
            .map(|r| r.id)
            .map_err(|e| TrackingError::InvalidResponse(e.to_string()))
    }

    async fn upload(&self, mut url: Url, upload: FileUpload) -> TrackingResult<()> {
        url.query_pairs_mut()
            .append_pair("name", &upload.name)
            .append_pair("description", &upload.description);

        let body = reqwest::Body::wrap_stream(ReaderStream::new(upload.file));
        let request = self
            .request(Method::POST, url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body);

        self.send(request).await?;
        Ok(())
    }
}

#[async_trait]
impl TrackingSink for ConicalClient {
    async fn product(&self, name: &str) -> TrackingResult<Product> {
        let url = self.endpoint(name, &[])?;
        match self.send(self.request(Method::GET, url)).await {
            Ok(response) => {
                let body: ProductResponse = response
                    .json()
                    .await
                    .map_err(|e| TrackingError::InvalidResponse(e.to_string()))?;
                Ok(Product {
                    name: body.name.unwrap_or_else(|| name.to_string()),
                })
            }
            Err(TrackingError::Rejected { status, .. })
                if status == StatusCode::NOT_FOUND.as_u16() =>
            {
                Err(TrackingError::ProductNotFound(name.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn create_run_set(
        &self,
        product: &Product,
        run_set: &NewRunSet,
    ) -> TrackingResult<RunSetHandle> {
        let url = self.endpoint(&product.name, &["testRunSets"])?;
        let response = self
            .send(self.request(Method::POST, url).json(run_set))
            .await?;

        Ok(RunSetHandle {
            id: Self::read_id(response).await?,
            product: product.name.clone(),
        })
    }

    async fn publish_run_set_file(
        &self,
        run_set: &RunSetHandle,
        upload: FileUpload,
    ) -> TrackingResult<()> {
        let url = self.run_set_endpoint(run_set, &["additionalFiles"])?;
        self.upload(url, upload).await
    }

    async fn create_test_run(
        &self,
        run_set: &RunSetHandle,
        run: &NewTestRun,
    ) -> TrackingResult<TestRunHandle> {
        let url = self.run_set_endpoint(run_set, &["testRuns"])?;
        let response = self.send(self.request(Method::POST, url).json(run)).await?;

        Ok(TestRunHandle {
            id: Self::read_id(response).await?,
            run_set_id: run_set.id,
            product: run_set.product.clone(),
        })
    }

    async fn publish_test_run_file(
        &self,
        run: &TestRunHandle,
        upload: FileUpload,
    ) -> TrackingResult<()> {
        let url = self.test_run_endpoint(run, &["additionalFiles"])?;
        self.upload(url, upload).await
    }

    async fn publish_test_run_logs(
        &self,
        run: &TestRunHandle,
        lines: &[String],
    ) -> TrackingResult<()> {
        let url = self.test_run_endpoint(run, &["logs"])?;
        self.send(self.request(Method::POST, url).json(lines)).await?;
        Ok(())
    }

    async fn set_run_set_status(
        &self,
        run_set: &RunSetHandle,
        status: RunSetStatus,
    ) -> TrackingResult<()> {
        let url = self.run_set_endpoint(run_set, &["status"])?;
        self.send(
            self.request(Method::PUT, url)
                .json(&StatusRequest { status }),
        )
        .await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "conical"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    use wiremock::matchers::{body_json, body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::tracking::TestRunStatus;

    fn client(server: &MockServer) -> ConicalClient {
        ConicalClient::new(&server.uri(), Some("test-token".to_string())).unwrap()
    }

    fn run_set() -> RunSetHandle {
        RunSetHandle {
            id: 7,
            product: "calculator".to_string(),
        }
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let client = ConicalClient::new("https://conical.example.com/base/", None).unwrap();
        let url = client.endpoint("my product", &["testRunSets"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://conical.example.com/base/api/products/my%20product/testRunSets"
        );
    }

    #[test]
    fn test_rejects_relative_server() {
        let err = ConicalClient::new("conical.example.com", None).unwrap_err();
        assert!(matches!(err, TrackingError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_product_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/products/calculator"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "calculator",
                "description": "Desk calculator"
            })))
            .mount(&server)
            .await;

        let product = client(&server).product("calculator").await.unwrap();
        assert_eq!(product.name, "calculator");
    }

    #[tokio::test]
    async fn test_product_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/products/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client(&server).product("missing").await.unwrap_err();
        assert!(matches!(err, TrackingError::ProductNotFound(name) if name == "missing"));
    }

    #[tokio::test]
    async fn test_create_run_set_posts_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/products/calculator/testRunSets"))
            .and(body_json(serde_json::json!({
                "name": "nightly",
                "description": "desc",
                "refDate": null,
                "tags": ["a", "a"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 7})))
            .expect(1)
            .mount(&server)
            .await;

        let product = Product {
            name: "calculator".to_string(),
        };
        let request = NewRunSet {
            name: "nightly".to_string(),
            description: Some("desc".to_string()),
            ref_date: None,
            tags: vec!["a".to_string(), "a".to_string()],
        };

        let handle = client(&server)
            .create_run_set(&product, &request)
            .await
            .unwrap();
        assert_eq!(handle, run_set());
    }

    #[tokio::test]
    async fn test_file_upload_streams_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/products/calculator/testRunSets/7/additionalFiles"))
            .and(query_param("name", "Test spec output.txt"))
            .and(query_param("description", "Full log"))
            .and(body_string("collected 2 items\n"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut log = tempfile::NamedTempFile::new().unwrap();
        writeln!(log, "collected 2 items").unwrap();

        let upload = FileUpload::open(log.path(), "Test spec output.txt", "Full log")
            .await
            .unwrap();
        client(&server)
            .publish_run_set_file(&run_set(), upload)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_test_run_and_logs() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/products/calculator/testRunSets/7/testRuns"))
            .and(body_json(serde_json::json!({
                "name": "suite\\test_a",
                "description": "Pytest",
                "testRunType": "Regression",
                "status": "passed"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": 3})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/products/calculator/testRunSets/7/testRuns/3/logs"))
            .and(body_json(serde_json::json!(["=== STD OUT ===", "hi", ""])))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let run = client
            .create_test_run(
                &run_set(),
                &NewTestRun {
                    name: "suite\\test_a".to_string(),
                    framework: "Pytest".to_string(),
                    test_run_type: "Regression".to_string(),
                    status: TestRunStatus::Passed,
                },
            )
            .await
            .unwrap();
        assert_eq!(run.id, 3);
        assert_eq!(run.run_set_id, 7);

        let lines = vec!["=== STD OUT ===".to_string(), "hi".to_string(), String::new()];
        client.publish_test_run_logs(&run, &lines).await.unwrap();
    }

    #[tokio::test]
    async fn test_status_update_and_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/products/calculator/testRunSets/7/status"))
            .and(body_json(serde_json::json!({"status": "standard"})))
            .respond_with(ResponseTemplate::new(500).set_body_string("database offline"))
            .mount(&server)
            .await;

        let err = client(&server)
            .set_run_set_status(&run_set(), RunSetStatus::Standard)
            .await
            .unwrap_err();
        match err {
            TrackingError::Rejected { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "database offline");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_anonymous_access_sends_no_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/products/calculator"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let client = ConicalClient::new(&server.uri(), None).unwrap();
        let product = client.product("calculator").await.unwrap();
        assert_eq!(product.name, "calculator");

        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get("authorization").is_none());
    }
}
