//! Webhook ingestion: an axum endpoint that decodes one update per request
//! and forwards it into the dispatch path.

use std::{io::Read, net::SocketAddr, sync::Arc};

use {
    axum::{
        Router,
        body::Bytes,
        extract::State,
        http::{HeaderMap, StatusCode, header},
        routing::post,
    },
    switchboard_common::update::UpdateType,
    teloxide::{payloads::SetWebhookSetters, prelude::*},
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use switchboard_metrics::{counter, labels, updates as update_metrics};

use crate::{
    error::{Error, Result},
    fetch::allowed_updates,
};

pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Clone)]
struct WebhookState {
    sink: mpsc::Sender<Update>,
    secret: Option<Arc<str>>,
}

/// Router serving `POST path`. Mount it on an existing server or hand it to
/// [`WebhookListener`].
pub fn webhook_router(path: &str, sink: mpsc::Sender<Update>, secret: Option<String>) -> Router {
    let state = WebhookState {
        sink,
        secret: secret.map(Arc::from),
    };
    Router::new()
        .route(path, post(receive_update))
        .with_state(state)
}

async fn receive_update(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(expected) = &state.secret {
        let presented = headers
            .get(SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !constant_time_eq(presented, expected) {
            warn!("webhook request rejected: secret token mismatch");
            return StatusCode::UNAUTHORIZED;
        }
    }

    let update = match decode_update(&headers, &body) {
        Ok(update) => update,
        Err(e) => {
            // Acknowledge anyway so the platform does not redeliver it.
            warn!(error = %e, bytes = body.len(), "dropping undecodable webhook payload");

            #[cfg(feature = "metrics")]
            counter!(update_metrics::DROPPED_TOTAL, labels::REASON => "decode").increment(1);

            return StatusCode::OK;
        },
    };

    debug!(update_id = update.id.0, "webhook update received");

    #[cfg(feature = "metrics")]
    counter!(update_metrics::RECEIVED_TOTAL, labels::SOURCE => "webhook").increment(1);

    match state.sink.send(update).await {
        Ok(()) => StatusCode::OK,
        Err(_) => {
            warn!("webhook update not delivered: dispatcher stopped");
            StatusCode::SERVICE_UNAVAILABLE
        },
    }
}

/// Decode a webhook body, inflating it first when it is gzip-compressed
/// (by `Content-Encoding` or by its magic bytes).
pub fn decode_update(headers: &HeaderMap, body: &[u8]) -> Result<Update> {
    let gzipped = headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("gzip"))
        || body.starts_with(&GZIP_MAGIC);

    if gzipped {
        let mut inflated = Vec::new();
        flate2::read::GzDecoder::new(body)
            .read_to_end(&mut inflated)
            .map_err(Error::webhook_decode)?;
        serde_json::from_slice(&inflated).map_err(Error::webhook_decode)
    } else {
        serde_json::from_slice(body).map_err(Error::webhook_decode)
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Tell the platform where to deliver updates.
pub async fn register_webhook(
    bot: &Bot,
    url: &str,
    drop_pending: bool,
    secret: Option<&str>,
    allowed: &[UpdateType],
) -> Result<()> {
    let parsed = reqwest::Url::parse(url).map_err(|_| Error::InvalidUrl {
        url: url.to_string(),
    })?;

    let mut call = bot.set_webhook(parsed).drop_pending_updates(drop_pending);
    if let Some(secret) = secret {
        call = call.secret_token(secret.to_string());
    }
    if !allowed.is_empty() {
        call = call.allowed_updates(allowed_updates(allowed));
    }
    call.await?;

    info!(url, drop_pending, "telegram webhook registered");
    Ok(())
}

#[derive(Debug, Clone)]
pub struct WebhookListener {
    pub listen: SocketAddr,
    pub path: String,
    pub secret: Option<String>,
}

impl WebhookListener {
    /// Serve until `cancel` fires, then drain in-flight requests and return.
    pub async fn serve(&self, cancel: CancellationToken, sink: mpsc::Sender<Update>) -> Result<()> {
        let app = webhook_router(&self.path, sink, self.secret.clone());
        let listener = tokio::net::TcpListener::bind(self.listen).await?;
        info!(addr = %self.listen, path = %self.path, "webhook listener started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;

        info!("webhook listener stopped");
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::io::Write;

    use {
        axum::body::Body,
        flate2::{Compression, write::GzEncoder},
        http::Request,
        rstest::rstest,
        serde_json::json,
        switchboard_common::fixtures,
        tower::ServiceExt,
    };

    use super::*;

    fn update_body(id: u32) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "update_id": id,
            "message": fixtures::message(
                fixtures::private_chat(42),
                Some(fixtures::user(42)),
                Some("hello"),
            ),
        }))
        .unwrap()
    }

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    fn post(body: Vec<u8>, headers: &[(&str, &str)]) -> Request<Body> {
        let mut request = Request::builder().method("POST").uri("/telegram");
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        request.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn plain_update_is_forwarded() {
        let (tx, mut rx) = mpsc::channel(4);
        let app = webhook_router("/telegram", tx, None);

        let response = app.oneshot(post(update_body(9), &[])).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(rx.recv().await.unwrap().id.0, 9);
    }

    #[rstest]
    #[case::by_header(true)]
    #[case::by_magic_bytes(false)]
    #[tokio::test]
    async fn gzip_update_is_inflated(#[case] with_header: bool) {
        let (tx, mut rx) = mpsc::channel(4);
        let app = webhook_router("/telegram", tx, None);
        let headers: &[(&str, &str)] = if with_header {
            &[("content-encoding", "gzip")]
        } else {
            &[]
        };

        let response = app
            .oneshot(post(gzip(&update_body(11)), headers))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(rx.recv().await.unwrap().id.0, 11);
    }

    #[tokio::test]
    async fn malformed_payload_is_acknowledged_and_dropped() {
        let (tx, mut rx) = mpsc::channel(4);
        let app = webhook_router("/telegram", tx, None);

        let response = app
            .oneshot(post(b"{not json".to_vec(), &[]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(rx.try_recv().is_err());
    }

    #[rstest]
    #[case::missing(None, StatusCode::UNAUTHORIZED)]
    #[case::wrong(Some("nope"), StatusCode::UNAUTHORIZED)]
    #[case::matching(Some("s3cret"), StatusCode::OK)]
    #[tokio::test]
    async fn secret_token_is_enforced(#[case] presented: Option<&str>, #[case] expected: StatusCode) {
        let (tx, _rx) = mpsc::channel(4);
        let app = webhook_router("/telegram", tx, Some("s3cret".into()));
        let headers: Vec<(&str, &str)> = presented
            .map(|value| vec![(SECRET_HEADER, value)])
            .unwrap_or_default();

        let response = app.oneshot(post(update_body(1), &headers)).await.unwrap();
        assert_eq!(response.status(), expected);
    }

    #[tokio::test]
    async fn closed_sink_reports_unavailable() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let app = webhook_router("/telegram", tx, None);

        let response = app.oneshot(post(update_body(1), &[])).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn truncated_gzip_is_a_decode_error() {
        let mut body = gzip(&update_body(1));
        body.truncate(8);
        let err = decode_update(&HeaderMap::new(), &body).unwrap_err();
        assert!(matches!(err, Error::WebhookDecode { .. }));
    }

    #[test]
    fn constant_time_eq_compares_content() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
    }
}
