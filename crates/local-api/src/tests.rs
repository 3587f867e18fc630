#[cfg(test)]
mod tests {
    use crate::{app, cors_layer, AppState};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;
    use twin_common::{Message, Result};
    use twin_config::{Persona, ProviderConfig};
    use twin_runtime::{ChatOrchestrator, CompletionProvider, ProviderHandle, ProviderRuntime};
    use twin_store::{FileSessionStore, SessionStore};

    /// Answers "R<n>: <last user message>"
    #[derive(Default)]
    struct EchoProvider {
        counter: AtomicUsize,
    }

    #[async_trait]
    impl CompletionProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, _model: &str, messages: &[Message]) -> Result<String> {
            let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            let last = messages.last().map(|m| m.content.as_str()).unwrap_or("");
            Ok(format!("R{}: {}", n, last))
        }
    }

    struct TestApp {
        router: Router,
        store: Arc<FileSessionStore>,
        _temp: TempDir,
    }

    async fn test_app(provider: ProviderHandle) -> TestApp {
        test_app_with_origins(provider, &["http://localhost:3000".to_string()]).await
    }

    async fn test_app_with_origins(provider: ProviderHandle, origins: &[String]) -> TestApp {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(FileSessionStore::open(temp.path().join("memory")).await.unwrap());
        let orchestrator = ChatOrchestrator::new(
            provider,
            store.clone(),
            Persona::new("You are a test persona."),
            "gpt-4o-mini",
        );
        let router = app(AppState::new(orchestrator), origins).unwrap();

        TestApp {
            router,
            store,
            _temp: temp,
        }
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_chat(body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_root() {
        let app = test_app(Arc::new(EchoProvider::default())).await;
        let (status, body) = send(&app.router, get("/")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"message": "AI Digital Twin App"}));
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app(Arc::new(EchoProvider::default())).await;
        let (status, body) = send(&app.router, get("/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert!(body["uptime_seconds"].is_u64());
    }

    #[tokio::test]
    async fn test_chat_creates_session() {
        let app = test_app(Arc::new(EchoProvider::default())).await;
        let (status, body) = send(&app.router, post_chat(json!({"message": "hello"}))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "R1: hello");
        let session_id = body["session_id"].as_str().unwrap();
        assert!(!session_id.is_empty());

        let stored = app.store.load(session_id).await.unwrap();
        assert_eq!(
            stored,
            vec![Message::user("hello"), Message::assistant("R1: hello")]
        );
        assert!(app.store.dir().join(format!("{}.json", session_id)).exists());
    }

    #[tokio::test]
    async fn test_chat_continues_session() {
        let app = test_app(Arc::new(EchoProvider::default())).await;

        let (_, first) = send(&app.router, post_chat(json!({"message": "hi"}))).await;
        let session_id = first["session_id"].as_str().unwrap().to_string();

        let (status, second) = send(
            &app.router,
            post_chat(json!({"message": "again", "session_id": session_id})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["session_id"], session_id.as_str());

        let stored = app.store.load(&session_id).await.unwrap();
        assert_eq!(
            stored,
            vec![
                Message::user("hi"),
                Message::assistant("R1: hi"),
                Message::user("again"),
                Message::assistant("R2: again"),
            ]
        );
    }

    #[tokio::test]
    async fn test_chat_without_credential_fails_and_persists_nothing() {
        let provider = ProviderRuntime::create(&ProviderConfig::default()).unwrap();
        let app = test_app(provider).await;

        let (status, body) = send(&app.router, post_chat(json!({"message": "hello"}))).await;

        assert!(status.is_server_error());
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["type"], "provider_not_configured");
        assert!(body["detail"].as_str().unwrap().contains("API key"));
        assert!(body["request_id"].is_string());

        assert!(app.store.list().await.unwrap().is_empty());
        assert_eq!(std::fs::read_dir(app.store.dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_list_sessions() {
        let app = test_app(Arc::new(EchoProvider::default())).await;

        let (status, body) = send(&app.router, get("/sessions")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"sessions": []}));

        let mut expected = Vec::new();
        for message in ["one", "two", "three"] {
            let (_, body) = send(&app.router, post_chat(json!({"message": message}))).await;
            expected.push((
                body["session_id"].as_str().unwrap().to_string(),
                body["response"].as_str().unwrap().to_string(),
            ));
        }

        let (status, body) = send(&app.router, get("/sessions")).await;
        assert_eq!(status, StatusCode::OK);
        let sessions = body["sessions"].as_array().unwrap();
        assert_eq!(sessions.len(), 3);

        for (session_id, response) in expected {
            let entry = sessions
                .iter()
                .find(|s| s["session_id"] == session_id.as_str())
                .unwrap();
            assert_eq!(entry["message_count"], 2);
            assert_eq!(entry["last_message"], response.as_str());
        }
    }

    #[tokio::test]
    async fn test_list_sessions_reports_empty_conversation() {
        let app = test_app(Arc::new(EchoProvider::default())).await;
        app.store.save("blank", &[]).await.unwrap();

        let (_, body) = send(&app.router, get("/sessions")).await;
        assert_eq!(
            body,
            json!({"sessions": [{"session_id": "blank", "message_count": 0, "last_message": null}]})
        );
    }

    #[tokio::test]
    async fn test_chat_rejects_traversal_session_id() {
        let app = test_app(Arc::new(EchoProvider::default())).await;
        let (status, body) = send(
            &app.router,
            post_chat(json!({"message": "hi", "session_id": "../secrets"})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["type"], "invalid_session_id");
        assert_eq!(body["error"]["code"], 400);
    }

    #[tokio::test]
    async fn test_chat_rejects_empty_message() {
        let app = test_app(Arc::new(EchoProvider::default())).await;
        let (status, body) = send(&app.router, post_chat(json!({"message": "  "}))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["type"], "bad_request");
        assert!(app.store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chat_rejects_malformed_body() {
        let app = test_app(Arc::new(EchoProvider::default())).await;

        let request = Request::builder()
            .method(Method::POST)
            .uri("/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"message\": "))
            .unwrap();
        let (status, _) = send(&app.router, request).await;
        assert!(status.is_client_error());

        let (status, _) = send(&app.router, post_chat(json!({"session_id": "abc"}))).await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn test_cors_preflight_allowed_origin() {
        let app = test_app(Arc::new(EchoProvider::default())).await;
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/chat")
            .header(header::ORIGIN, "http://localhost:3000")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
            .body(Body::empty())
            .unwrap();

        let response = app.router.clone().oneshot(request).await.unwrap();
        let headers = response.headers();
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://localhost:3000"
        );
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
            "true"
        );
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_METHODS).unwrap(),
            "POST"
        );
    }

    #[tokio::test]
    async fn test_cors_unknown_origin_not_allowed() {
        let app = test_app(Arc::new(EchoProvider::default())).await;
        let request = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "http://evil.test")
            .body(Body::empty())
            .unwrap();

        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }

    #[test]
    fn test_cors_layer_rejects_bad_origin() {
        assert!(cors_layer(&["http://ok.test".to_string()]).is_ok());
        assert!(cors_layer(&["bad\norigin".to_string()]).is_err());
    }

    #[test]
    fn test_cors_layer_wildcard_origin() {
        assert!(cors_layer(&["*".to_string()]).is_ok());
        assert!(cors_layer(&["http://a.test".to_string(), " * ".to_string()]).is_ok());
    }

    #[tokio::test]
    async fn test_cors_wildcard_echoes_any_origin() {
        let app = test_app_with_origins(Arc::new(EchoProvider::default()), &["*".to_string()]).await;
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/chat")
            .header(header::ORIGIN, "http://anywhere.test")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();

        let response = app.router.clone().oneshot(request).await.unwrap();
        let headers = response.headers();
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://anywhere.test"
        );
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
            "true"
        );
    }
}
