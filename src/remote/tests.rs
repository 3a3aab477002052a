//! Remote Fetch Client Tests
//!
//! Runs the HTTP client against small axum peers bound to ephemeral ports.

#[cfg(test)]
mod tests {
    use crate::directory::Member;
    use crate::gateway::protocol::KeyValue;
    use crate::remote::{FetchError, HttpFetchClient, RemoteFetch};
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::{Json, Router, routing::get};
    use std::time::{Duration, Instant};
    use tokio::net::TcpListener;

    async fn spawn_peer(app: Router) -> Member {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Member::new("127.0.0.1", port)
    }

    async fn closed_port() -> Member {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        Member::new("127.0.0.1", port)
    }

    fn echo_peer() -> Router {
        Router::new().route(
            "/internal/messages/:key",
            get(|Path(key): Path<String>| async move {
                match key.as_str() {
                    "missing" => Err(StatusCode::NOT_FOUND),
                    "restoring" => Err(StatusCode::SERVICE_UNAVAILABLE),
                    _ => Ok(Json(KeyValue::new(key.clone(), format!("value-of-{}", key)))),
                }
            }),
        )
    }

    const TIMEOUT: Duration = Duration::from_secs(2);

    #[test]
    fn test_lookup_url_encodes_key_as_one_segment() {
        let client = HttpFetchClient::new().unwrap();
        let member = Member::new("10.0.0.5", 8080);

        let url = client.lookup_url(&member, "a/b c").unwrap();
        assert_eq!(
            url.as_str(),
            "http://10.0.0.5:8080/internal/messages/a%2Fb%20c"
        );
    }

    #[tokio::test]
    async fn test_fetch_found_value() {
        let member = spawn_peer(echo_peer()).await;
        let client = HttpFetchClient::new().unwrap();

        let value = client.fetch_remote(&member, "c", TIMEOUT).await.unwrap();
        assert_eq!(value, Some("value-of-c".to_string()));
    }

    #[tokio::test]
    async fn test_fetch_roundtrips_encoded_key() {
        let member = spawn_peer(echo_peer()).await;
        let client = HttpFetchClient::new().unwrap();

        let value = client
            .fetch_remote(&member, "user/42 x", TIMEOUT)
            .await
            .unwrap();
        assert_eq!(value, Some("value-of-user/42 x".to_string()));
    }

    #[tokio::test]
    async fn test_fetch_not_found_is_absent() {
        let member = spawn_peer(echo_peer()).await;
        let client = HttpFetchClient::new().unwrap();

        let value = client.fetch_remote(&member, "missing", TIMEOUT).await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_fetch_non_success_status_is_error() {
        let member = spawn_peer(echo_peer()).await;
        let client = HttpFetchClient::new().unwrap();

        let err = client
            .fetch_remote(&member, "restoring", TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status(503)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_fetch_unreachable_member_is_connect_error() {
        let member = closed_port().await;
        let client = HttpFetchClient::new().unwrap();

        let err = client.fetch_remote(&member, "c", TIMEOUT).await.unwrap_err();
        assert!(matches!(err, FetchError::Connect(_)), "got {:?}", err);
        assert!(!err.is_timeout());
    }

    #[tokio::test]
    async fn test_fetch_slow_member_times_out() {
        let slow = Router::new().route(
            "/internal/messages/:key",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                StatusCode::OK
            }),
        );
        let member = spawn_peer(slow).await;
        let client = HttpFetchClient::new().unwrap();

        let started = Instant::now();
        let err = client
            .fetch_remote(&member, "c", Duration::from_millis(200))
            .await
            .unwrap_err();

        assert!(err.is_timeout(), "got {:?}", err);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_fetch_garbage_body_is_decode_error() {
        let garbage = Router::new().route(
            "/internal/messages/:key",
            get(|| async { "not json" }),
        );
        let member = spawn_peer(garbage).await;
        let client = HttpFetchClient::new().unwrap();

        let err = client.fetch_remote(&member, "c", TIMEOUT).await.unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)), "got {:?}", err);
    }
}
