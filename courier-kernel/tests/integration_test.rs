//! Integration tests for courier-kernel against a mock platform API.

use courier_kernel::*;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const NO_QUERY: [(&str, &str); 0] = [];

#[derive(Debug, Deserialize, PartialEq)]
struct SendResult {
    errcode: i64,
    errmsg: String,
    msgid: u64,
}

fn config(server: &MockServer, response_type: ResponseType) -> ClientConfig {
    ClientConfig::builder()
        .base_url(format!("{}/cgi-bin/", server.uri()))
        .response_type(response_type)
        .build()
}

fn static_token(value: &str) -> Option<Arc<dyn AccessToken>> {
    Some(Arc::new(StaticAccessToken::new(value)))
}

/// Header lines of the multipart part whose raw text contains `marker`.
fn part_headers(body: &str, boundary: &str, marker: &str) -> Vec<String> {
    let delimiter = format!("--{boundary}");
    let part = body
        .split(delimiter.as_str())
        .find(|part| part.contains(marker))
        .unwrap_or_default();
    let head = part
        .trim_start_matches("\r\n")
        .split("\r\n\r\n")
        .next()
        .unwrap_or_default();
    head.lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_get_injects_token_and_decodes_map() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/menu/get"))
        .and(query_param("a", "1"))
        .and(query_param("access_token", "tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errcode": 0,
            "menu": {"button": []}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = BaseClient::new(config(&server, ResponseType::Map), static_token("tok")).unwrap();
    let result: CastResult = client.get("menu/get", [("a", "1")]).await.unwrap();

    let map = result.into_map().unwrap();
    assert_eq!(map["errcode"], 0);
    assert!(map["menu"]["button"].is_array());
}

#[tokio::test]
async fn test_post_form_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/cgi-bin/tags/create"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string("name=x"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"errcode": 0})))
        .expect(1)
        .mount(&server)
        .await;

    let client = BaseClient::new(config(&server, ResponseType::Map), None).unwrap();
    let result: CastResult = client.post("tags/create", &[("name", "x")]).await.unwrap();
    assert!(result.as_map().is_some());

    let received = server.received_requests().await.unwrap();
    assert_eq!(received[0].url.query(), None);
}

#[tokio::test]
async fn test_post_json_decodes_typed_object() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/cgi-bin/message/custom/send"))
        .and(query_param("access_token", "tok"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errcode": 0,
            "errmsg": "ok",
            "msgid": 42
        })))
        .mount(&server)
        .await;

    let client =
        BaseClient::new(config(&server, ResponseType::Object), static_token("tok")).unwrap();
    let result: CastResult<SendResult> = client
        .post_json(
            "message/custom/send",
            &json!({"touser": "OPENID", "msgtype": "text"}),
            NO_QUERY,
        )
        .await
        .unwrap();

    assert_eq!(
        result.into_object(),
        Some(SendResult {
            errcode: 0,
            errmsg: "ok".to_string(),
            msgid: 42
        })
    );

    let received = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(body["touser"], "OPENID");
}

#[tokio::test]
async fn test_upload_sends_multipart_parts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/cgi-bin/media/upload"))
        .and(query_param("type", "image"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"media_id\":\"m1\"}"))
        .expect(1)
        .mount(&server)
        .await;

    let client = BaseClient::new(config(&server, ResponseType::Map), None).unwrap();
    let raw = client
        .upload(
            "media/upload",
            [("media", b"fake-jpeg".to_vec())],
            [("filename", "pic.jpg")],
            [("type", "image")],
        )
        .await
        .unwrap();
    assert_eq!(raw.text().unwrap(), "{\"media_id\":\"m1\"}");

    let received = server.received_requests().await.unwrap();
    let content_type = received[0]
        .headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("multipart/form-data"));

    let boundary = content_type
        .split("boundary=")
        .nth(1)
        .unwrap()
        .trim_matches('"')
        .to_string();
    let body = String::from_utf8_lossy(&received[0].body).into_owned();

    let file_headers = part_headers(&body, &boundary, "fake-jpeg");
    let dispositions: Vec<&String> = file_headers
        .iter()
        .filter(|line| line.to_ascii_lowercase().starts_with("content-disposition:"))
        .collect();
    assert_eq!(dispositions.len(), 1, "file part headers: {file_headers:?}");
    assert!(dispositions[0].contains("name=\"media\""));
    assert!(dispositions[0].contains("filename=\"pic.jpg\""));

    let form_headers = part_headers(&body, &boundary, "\r\n\r\npic.jpg");
    assert!(
        form_headers
            .iter()
            .any(|line| line.contains("name=\"filename\""))
    );
}

#[tokio::test]
async fn test_upload_file_name_from_form_wins_over_path() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/cgi-bin/media/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let file = std::env::temp_dir().join("courier-upload-local-name.bin");
    tokio::fs::write(&file, b"local-bytes").await.unwrap();

    let client = BaseClient::new(config(&server, ResponseType::Map), None).unwrap();
    client
        .upload(
            "media/upload",
            [("media", PartContents::path(&file))],
            [("filename", "remote.png")],
            NO_QUERY,
        )
        .await
        .unwrap();
    let _ = tokio::fs::remove_file(&file).await;

    let received = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&received[0].body).into_owned();
    assert_eq!(body.matches("filename=\"remote.png\"").count(), 1);
    assert!(!body.contains("courier-upload-local-name.bin"));
}

#[tokio::test]
async fn test_raw_mode_returns_response_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/broken"))
        .respond_with(
            ResponseTemplate::new(502)
                .insert_header("x-trace", "t-1")
                .set_body_string("upstream down"),
        )
        .mount(&server)
        .await;

    let client = BaseClient::new(config(&server, ResponseType::Raw), None).unwrap();
    let result: CastResult = client.get("broken", NO_QUERY).await.unwrap();

    let raw = result.into_raw().unwrap();
    assert_eq!(raw.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(raw.header("x-trace"), Some("t-1"));
    assert_eq!(raw.text().unwrap(), "upstream down");
    assert_eq!(raw.bytes().as_ref(), b"upstream down");
}

#[tokio::test]
async fn test_decode_failure_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<xml><a>1</a></xml>"))
        .mount(&server)
        .await;

    let client = BaseClient::new(config(&server, ResponseType::Map), None).unwrap();
    let err = client
        .get::<Value, _, _, _>("xml", NO_QUERY)
        .await
        .unwrap_err();
    assert_eq!(err.stage(), ErrorStage::Decode);

    // The same call in raw mode still yields the body.
    let raw = client
        .request_raw("xml", Method::GET, RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(raw.text().unwrap(), "<xml><a>1</a></xml>");
}

#[tokio::test]
async fn test_cached_token_fetched_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/token"))
        .and(query_param("grant_type", "client_credential"))
        .and(query_param("appid", "APPID"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fetched",
            "expires_in": 7200
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/user/get"))
        .and(query_param("access_token", "fetched"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total": 1})))
        .expect(3)
        .mount(&server)
        .await;

    let fetcher = EndpointTokenFetcher::new(
        format!("{}/cgi-bin/token", server.uri()),
        [
            ("grant_type", "client_credential"),
            ("appid", "APPID"),
            ("secret", "SECRET"),
        ],
    );
    let token: Arc<dyn AccessToken> = Arc::new(CachedAccessToken::new(fetcher));
    let client = BaseClient::new(config(&server, ResponseType::Map), Some(token)).unwrap();

    for _ in 0..3 {
        let result: CastResult = client.get("user/get", NO_QUERY).await.unwrap();
        assert_eq!(result.as_map().unwrap()["total"], 1);
    }
}

#[tokio::test]
async fn test_token_endpoint_error_aborts_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errcode": 40013,
            "errmsg": "invalid appid"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/user/get"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let fetcher = EndpointTokenFetcher::new(format!("{}/cgi-bin/token", server.uri()), NO_QUERY);
    let token: Arc<dyn AccessToken> = Arc::new(CachedAccessToken::new(fetcher));
    let client = BaseClient::new(config(&server, ResponseType::Map), Some(token)).unwrap();

    let err = client
        .get::<Value, _, _, _>("user/get", NO_QUERY)
        .await
        .unwrap_err();
    assert_eq!(err.stage(), ErrorStage::Middleware);
    assert_eq!(err.middleware_name(), Some(ACCESS_TOKEN_MIDDLEWARE));
    assert!(err.to_string().contains("40013"));
}

#[tokio::test]
async fn test_bearer_header_placement() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/me"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 7})))
        .expect(1)
        .mount(&server)
        .await;

    let config = ClientConfig::builder()
        .base_url(format!("{}/cgi-bin/", server.uri()))
        .token_placement(TokenPlacement::bearer())
        .build();
    let client = BaseClient::new(config, static_token("tok")).unwrap();
    let result: CastResult = client.get("me", NO_QUERY).await.unwrap();
    assert_eq!(result.as_map().unwrap()["id"], 7);
}

#[tokio::test]
async fn test_request_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let config = ClientConfig::builder()
        .base_url(format!("{}/cgi-bin/", server.uri()))
        .timeout(Duration::from_millis(200))
        .build();
    let client = BaseClient::new(config, None).unwrap();

    let err = client
        .request_raw("slow", Method::GET, RequestOptions::new())
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(err.stage(), ErrorStage::Transport);
}

#[tokio::test]
async fn test_client_over_existing_reqwest_client() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/ip"))
        .and(header("x-tenant", "t-9"))
        .and(query_param("access_token", "tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ip_list": []})))
        .expect(1)
        .mount(&server)
        .await;

    let mut defaults = reqwest::header::HeaderMap::new();
    defaults.insert("x-tenant", reqwest::header::HeaderValue::from_static("t-9"));
    let http = reqwest::Client::builder()
        .default_headers(defaults)
        .build()
        .unwrap();
    let transport = Arc::new(ReqwestTransport::from_client(http));

    let client = BaseClient::with_transport(
        config(&server, ResponseType::Map),
        static_token("tok"),
        transport,
    )
    .unwrap();
    let result: CastResult = client.get("ip", NO_QUERY).await.unwrap();
    assert!(result.as_map().unwrap()["ip_list"].is_array());
}

#[tokio::test]
async fn test_token_fetcher_uses_client_config() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/token"))
        .and(header("user-agent", "courier-test/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "configured",
            "expires_in": 7200
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = ClientConfig::builder()
        .user_agent("courier-test/1.0")
        .build();
    let fetcher = EndpointTokenFetcher::from_config(
        format!("{}/cgi-bin/token", server.uri()),
        NO_QUERY,
        &config,
    )
    .unwrap();
    let issued = fetcher.fetch().await.unwrap();
    assert_eq!(issued.access_token, "configured");
}

#[tokio::test]
async fn test_token_fetcher_deadline() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "late", "expires_in": 7200}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let config = ClientConfig::builder()
        .timeout(Duration::from_millis(200))
        .build();
    let fetcher = EndpointTokenFetcher::from_config(
        format!("{}/cgi-bin/token", server.uri()),
        NO_QUERY,
        &config,
    )
    .unwrap();
    let err = fetcher.fetch().await.unwrap_err();
    assert!(matches!(err, KernelError::Credential(_)));
    assert!(err.to_string().contains("timed out"));

    let fetcher = EndpointTokenFetcher::new(format!("{}/cgi-bin/token", server.uri()), NO_QUERY)
        .with_timeout(Duration::from_millis(200));
    assert!(fetcher.fetch().await.is_err());
}

#[tokio::test]
async fn test_connection_failure_is_transport_error() {
    let config = ClientConfig::builder()
        .base_url("http://127.0.0.1:9/")
        .connect_timeout(Duration::from_millis(500))
        .build();
    let client = BaseClient::new(config, None).unwrap();

    let err = client
        .request_raw("unreachable", Method::GET, RequestOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.stage(), ErrorStage::Transport);
}
