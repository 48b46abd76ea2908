//! Integration tests for the upstream HTTP layer using wiremock
//!
//! These tests verify the soft-failing client, token verification and both
//! pagination conventions against mocked endpoints.

mod common;

use cap::cloud::auth::check_authorized;
use cap::cloud::http::{generate_headers, CloudHttpClient};
use cap::cloud::paginate::{fetch_paginated, ListRequest};
use cap::config::Endpoints;
use common::{client, http, TOKEN};
use reqwest::{Method, StatusCode};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod http_client_tests {
    use super::*;

    /// Successful GET returns parsed JSON and sends the token header
    #[tokio::test]
    async fn test_get_success_returns_json() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v2/123456/limits"))
            .and(header("X-Auth-Token", TOKEN))
            .and(header("Content-Type", "application/json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"limits": {"absolute": {"maxTotalInstances": 200}}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let headers = generate_headers(TOKEN).unwrap();
        let value = http()
            .get(&format!("{}/v2/123456/limits", server.uri()), &headers)
            .await
            .expect("should return data");

        assert_eq!(value["limits"]["absolute"]["maxTotalInstances"], 200);
    }

    #[tokio::test]
    async fn test_post_sends_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/echo"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let headers = generate_headers(TOKEN).unwrap();
        let body = json!({"name": "x"});
        let value = http()
            .fetch(&format!("{}/echo", server.uri()), Method::POST, Some(&body), &headers)
            .await;

        assert_eq!(value, Some(json!({"ok": true})));
    }

    /// Non-success statuses are no data
    #[tokio::test]
    async fn test_error_status_returns_none() {
        let server = MockServer::start().await;

        for (route, status) in [("/unauthorized", 401), ("/missing", 404), ("/broken", 500)] {
            Mock::given(method("GET"))
                .and(path(route))
                .respond_with(ResponseTemplate::new(status).set_body_json(json!({"message": "nope"})))
                .mount(&server)
                .await;
        }

        let headers = generate_headers(TOKEN).unwrap();
        for route in ["/unauthorized", "/missing", "/broken"] {
            let value = http().get(&format!("{}{}", server.uri(), route), &headers).await;
            assert_eq!(value, None, "{} should yield no data", route);
        }
    }

    #[tokio::test]
    async fn test_invalid_json_returns_none() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/garbage"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&server)
            .await;

        let headers = generate_headers(TOKEN).unwrap();
        assert_eq!(http().get(&format!("{}/garbage", server.uri()), &headers).await, None);
    }

    #[tokio::test]
    async fn test_timeout_returns_none() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let http = CloudHttpClient::new(Duration::from_millis(200)).unwrap();
        let headers = generate_headers(TOKEN).unwrap();
        assert_eq!(http.get(&format!("{}/slow", server.uri()), &headers).await, None);
    }

    #[tokio::test]
    async fn test_connection_refused_returns_none() {
        let headers = generate_headers(TOKEN).unwrap();
        assert_eq!(http().get("http://127.0.0.1:1/limits", &headers).await, None);
    }

    #[tokio::test]
    async fn test_status_reports_code() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let headers = generate_headers(TOKEN).unwrap();
        assert_eq!(
            http().status(&format!("{}/gone", server.uri()), "gone", &headers).await,
            Some(StatusCode::GONE)
        );
    }
}

mod auth_tests {
    use super::*;

    #[tokio::test]
    async fn test_token_accepted_on_200() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("/v2.0/tokens/{}", TOKEN)))
            .and(header("X-Auth-Token", TOKEN))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": {}})))
            .expect(1)
            .mount(&server)
            .await;

        assert!(check_authorized(&http(), &Endpoints::all_at(&server.uri()), TOKEN).await);
    }

    #[tokio::test]
    async fn test_token_rejected_on_other_statuses() {
        for status in [203, 401, 404, 500] {
            let server = MockServer::start().await;

            Mock::given(method("GET"))
                .and(path(format!("/v2.0/tokens/{}", TOKEN)))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;

            assert!(
                !check_authorized(&http(), &Endpoints::all_at(&server.uri()), TOKEN).await,
                "status {} should reject",
                status
            );
        }
    }

    #[tokio::test]
    async fn test_unreachable_identity_rejects() {
        assert!(!check_authorized(&http(), &Endpoints::all_at("http://127.0.0.1:1"), TOKEN).await);
    }

    /// In-memory sink for formatted log lines
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    /// Token verification never writes the token to the log, whether the
    /// identity service answers or cannot be reached
    #[tokio::test]
    async fn test_token_not_logged() {
        const SECRET: &str = "SECRET-TOKEN-123";

        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/v2.0/tokens/{}", SECRET)))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        assert!(check_authorized(&http(), &Endpoints::all_at(&server.uri()), SECRET).await);
        assert!(!check_authorized(&http(), &Endpoints::all_at("http://127.0.0.1:1"), SECRET).await);

        let output = logs.contents();
        assert!(output.contains("/v2.0/tokens/<redacted>"), "{}", output);
        assert!(!output.contains(SECRET), "token leaked into logs:\n{}", output);
    }
}

mod pagination_tests {
    use super::*;

    fn items(range: std::ops::Range<usize>) -> Vec<serde_json::Value> {
        range.map(|i| json!({"id": i})).collect()
    }

    /// Offset listings stop at the first short page
    #[tokio::test]
    async fn test_offset_pagination_stops_on_short_page() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1.0/123456/loadbalancers"))
            .and(query_param("offset", "0"))
            .and(query_param("limit", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"loadBalancers": items(0..100)})))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1.0/123456/loadbalancers"))
            .and(query_param("offset", "100"))
            .and(query_param("limit", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"loadBalancers": items(100..142)})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server.uri());
        let list = ListRequest::offset(client.load_balancers_url("loadbalancers"), "loadBalancers");
        let all = fetch_paginated(&client, &list, 100).await;

        assert_eq!(all.len(), 142);
        assert_eq!(all[141]["id"], 141);
    }

    /// Next-link listings follow the first link until a short page
    #[tokio::test]
    async fn test_next_link_pagination_follows_links() {
        let server = MockServer::start().await;
        let next = format!("{}/v2/123456/servers/detail?limit=2&marker=b", server.uri());

        Mock::given(method("GET"))
            .and(path("/v2/123456/servers/detail"))
            .and(query_param("marker", "b"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"servers": [{"id": "c"}]})))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v2/123456/servers/detail"))
            .and(query_param("limit", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "servers": [{"id": "a"}, {"id": "b"}],
                "servers_links": [{"href": next, "rel": "next"}]
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        let client = client(&server.uri());
        let list = ListRequest::next_link(client.servers_url("servers/detail"), "servers", "servers_links");
        let all = fetch_paginated(&client, &list, 2).await;

        let ids: Vec<&str> = all.iter().filter_map(|s| s["id"].as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_full_page_without_link_ends_listing() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v2.0/networks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"networks": items(0..2)})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server.uri());
        let list = ListRequest::next_link(client.networks_url("networks"), "networks", "networks_links");
        assert_eq!(fetch_paginated(&client, &list, 2).await.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_first_page_is_empty() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1.0/123456/loadbalancers"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client(&server.uri());
        let list = ListRequest::offset(client.load_balancers_url("loadbalancers"), "loadBalancers");
        assert!(fetch_paginated(&client, &list, 100).await.is_empty());
    }
}
