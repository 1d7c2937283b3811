//! Control-plane behavior against in-memory stores: subscription
//! lifecycle, validation, and the query endpoints.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use common::harness;
use tradingview_stream_ingest::application::services::{CandleIngestor, QuoteIngestor};
use tradingview_stream_ingest::infrastructure::http::router;
use tradingview_stream_ingest::infrastructure::tradingview::OutboundMessage;
use tradingview_stream_ingest::infrastructure::tradingview::messages::{
    Envelope, InboundMessage,
};

fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_and_info() {
    let harness = harness();
    let app = router(harness.state.clone());

    let response = app
        .clone()
        .oneshot(get_request("/health"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get_request("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let info = body_json(response).await;
    assert_eq!(info["status"], "running");
    assert_eq!(info["connection"], "connected");
}

#[tokio::test]
async fn candle_add_allocates_session_and_sends_sequence() {
    let harness = harness();
    let app = router(harness.state.clone());

    let response = app
        .oneshot(json_request(
            "POST",
            "/symbols",
            &json!({
                "exchange": "BINANCE",
                "symbol": "BTCUSDT",
                "kind": "candle",
                "timeframe": "1",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let session_id = body["provider_session_id"].as_str().unwrap();
    assert!(session_id.starts_with("cs_"));
    assert_eq!(session_id.len(), "cs_".len() + 12);
    assert!(session_id["cs_".len()..].chars().all(|c| c.is_ascii_alphanumeric()));
    assert_eq!(body["enabled"], json!(true));
    assert_eq!(body["kind"], "candle");
    assert_eq!(body["timeframe"], "1");

    assert_eq!(
        harness.connection.sent_methods(),
        vec![
            "chart_create_session",
            "switch_timezone",
            "resolve_symbol",
            "create_series",
        ]
    );

    let sent = harness.connection.sent();
    assert_eq!(
        sent[0],
        OutboundMessage::chart_create_session(session_id)
    );
    assert_eq!(sent[1], OutboundMessage::switch_timezone(session_id));
    assert_eq!(
        sent[2],
        OutboundMessage::resolve_symbol(session_id, "BINANCE:BTCUSDT")
    );
    assert_eq!(
        sent[3],
        OutboundMessage::create_series(session_id, "1", 300)
    );

    // The row is persisted enabled under the fresh session id.
    let rows = harness.subscriptions.rows();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].enabled);
    assert_eq!(rows[0].provider_session_id, session_id);
}

#[tokio::test]
async fn duplicate_add_is_rejected() {
    let harness = harness();
    let app = router(harness.state.clone());
    let body = json!({
        "exchange": "BINANCE",
        "symbol": "BTCUSDT",
        "kind": "candle",
        "timeframe": "5",
    });

    let response = app
        .clone()
        .oneshot(json_request("POST", "/symbols", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(json_request("POST", "/symbols", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = body_json(response).await;
    assert!(error["error"].as_str().unwrap().contains("already exists"));

    // Still exactly one enabled row for the key.
    let enabled: Vec<_> = harness
        .subscriptions
        .rows()
        .into_iter()
        .filter(|row| row.enabled)
        .collect();
    assert_eq!(enabled.len(), 1);
}

#[tokio::test]
async fn validation_failures_are_bad_requests() {
    let harness = harness();
    let app = router(harness.state.clone());

    // Unknown timeframe.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/symbols",
            &json!({"exchange": "BINANCE", "symbol": "BTCUSDT", "kind": "candle", "timeframe": "2H"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Unknown kind.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/symbols",
            &json!({"exchange": "BINANCE", "symbol": "BTCUSDT", "kind": "trade"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Candle without timeframe.
    let response = app
        .oneshot(json_request(
            "POST",
            "/symbols",
            &json!({"exchange": "BINANCE", "symbol": "BTCUSDT", "kind": "candle"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(harness.connection.sent().is_empty());
    assert!(harness.subscriptions.rows().is_empty());
}

#[tokio::test]
async fn quote_add_uses_quote_session_sequence() {
    let harness = harness();
    let app = router(harness.state.clone());

    let response = app
        .oneshot(json_request(
            "POST",
            "/symbols",
            &json!({"exchange": "NASDAQ", "symbol": "AAPL", "kind": "quote"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let session_id = body["provider_session_id"].as_str().unwrap();
    assert!(session_id.starts_with("qs_"));
    assert!(body["timeframe"].is_null());

    assert_eq!(
        harness.connection.sent_methods(),
        vec!["quote_create_session", "quote_set_fields", "quote_add_symbols"]
    );
    assert_eq!(
        *harness.connection.sent().last().unwrap(),
        OutboundMessage::quote_add_symbols(session_id, &["NASDAQ:AAPL"])
    );
}

#[tokio::test]
async fn delete_symbol_disables_the_row() {
    let harness = harness();
    let app = router(harness.state.clone());
    let body = json!({
        "exchange": "BINANCE",
        "symbol": "ETHUSDT",
        "kind": "candle",
        "timeframe": "1D",
    });

    let response = app
        .clone()
        .oneshot(json_request("POST", "/symbols", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created = body_json(response).await;
    let session_id = created["provider_session_id"].as_str().unwrap().to_string();

    harness.connection.clear();

    let response = app
        .clone()
        .oneshot(json_request("DELETE", "/symbols", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let deleted = body_json(response).await;
    assert_eq!(deleted["enabled"], json!(false));

    assert_eq!(
        harness.connection.sent(),
        vec![OutboundMessage::chart_delete_session(&session_id)]
    );
    assert!(harness.subscriptions.rows().iter().all(|row| !row.enabled));

    // A second delete finds nothing.
    let response = app
        .oneshot(json_request("DELETE", "/symbols", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unsubscribe_all_counts_rows() {
    let harness = harness();
    let app = router(harness.state.clone());

    for (symbol, timeframe) in [("BTCUSDT", "1"), ("ETHUSDT", "5")] {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/symbols",
                &json!({"exchange": "BINANCE", "symbol": symbol, "kind": "candle", "timeframe": timeframe}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/symbols/unsubscribe")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["count"], json!(2));

    let response = app.oneshot(get_request("/symbols")).await.unwrap();
    let listed = body_json(response).await;
    assert_eq!(listed.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn listing_and_session_status() {
    let harness = harness();
    let app = router(harness.state.clone());

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/symbols",
            &json!({"exchange": "BINANCE", "symbol": "BTCUSDT", "kind": "candle", "timeframe": "1"}),
        ))
        .await
        .unwrap();
    let created = body_json(response).await;
    let session_id = created["provider_session_id"].as_str().unwrap().to_string();

    let response = app.clone().oneshot(get_request("/symbols")).await.unwrap();
    let listed = body_json(response).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let response = app
        .clone()
        .oneshot(get_request("/symbols/BINANCE/BTCUSDT"))
        .await
        .unwrap();
    let listed = body_json(response).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let response = app
        .clone()
        .oneshot(get_request("/symbols/BINANCE/DOGEUSDT"))
        .await
        .unwrap();
    let listed = body_json(response).await;
    assert_eq!(listed.as_array().unwrap().len(), 0);

    let response = app
        .clone()
        .oneshot(get_request(&format!("/symbols/session/{session_id}/status")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get_request("/symbols/session/cs_doesnotexist/status"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reconnect_delegates_to_the_connection() {
    let harness = harness();
    let app = router(harness.state.clone());

    let response = app.oneshot(get_request("/reconnect")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(harness.connection.reconnect_count(), 1);
}

#[tokio::test]
async fn quote_endpoint_serves_merged_snapshots() {
    let harness = harness();
    let app = router(harness.state.clone());

    let response = app
        .clone()
        .oneshot(get_request("/quotes/NASDAQ/AAPL"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Two successive deltas: the zero fields must not clobber known values.
    let ingestor = QuoteIngestor::new(harness.quotes.clone());
    for frame in [
        r#"{"m":"qsd","p":["qs_x",{"n":"NASDAQ:AAPL","s":"ok","v":{"lp":190,"volume":0}}]}"#,
        r#"{"m":"qsd","p":["qs_x",{"n":"NASDAQ:AAPL","s":"ok","v":{"lp":0,"volume":500000}}]}"#,
    ] {
        let envelope: Envelope = serde_json::from_str(frame).unwrap();
        let Some(InboundMessage::QuoteData(message)) =
            InboundMessage::from_envelope(&envelope).unwrap()
        else {
            panic!("expected quote data");
        };
        ingestor.process(&message);
    }

    let response = app.oneshot(get_request("/quotes/NASDAQ/AAPL")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let snapshot = body_json(response).await;
    assert_eq!(snapshot["lp"], json!(190.0));
    assert_eq!(snapshot["volume"], json!(500000.0));
}

#[tokio::test]
async fn candle_ingest_upserts_one_row_per_bar() {
    let harness = harness();
    let app = router(harness.state.clone());

    let subscription = harness.subscriptions.seed_enabled(
        "BINANCE",
        "BTCUSDT",
        tradingview_stream_ingest::SubscriptionKind::Candle,
        Some(tradingview_stream_ingest::Timeframe::OneMinute),
    );
    let session_id = subscription.provider_session_id.clone();

    let ingestor = CandleIngestor::new(harness.subscriptions.clone(), harness.candles.clone());
    let frame = |close: f64| {
        format!(
            r#"{{"m":"du","p":["{session_id}",{{"sds_1":{{"s":[{{"i":0,"v":[1700000000,100,110,90,{close},1234]}}],"lbs":{{"bar_close_time":1700000060}},"t":"s1","ns":{{"d":"","indexes":"nochange"}}}}}}]}}"#
        )
    };

    for close in [105.0, 105.0, 106.0] {
        let envelope: Envelope = serde_json::from_str(&frame(close)).unwrap();
        let Some(InboundMessage::DataUpdate(message)) =
            InboundMessage::from_envelope(&envelope).unwrap()
        else {
            panic!("expected data update");
        };
        ingestor
            .process(&message.session_id, &message.update.series)
            .await
            .unwrap();
    }

    // Exactly one row, carrying the last-seen close.
    let rows = harness.candles.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].timestamp, 1_700_000_000);
    assert_eq!(rows[0].open, 100.0);
    assert_eq!(rows[0].close, 106.0);

    let response = app
        .oneshot(get_request("/candles/BINANCE/BTCUSDT/1/10"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["close"], json!(106.0));
}

#[tokio::test]
async fn candle_ingest_drops_unknown_sessions() {
    let harness = harness();

    let ingestor = CandleIngestor::new(harness.subscriptions.clone(), harness.candles.clone());
    let envelope: Envelope = serde_json::from_str(
        r#"{"m":"du","p":["cs_unknown12345",{"sds_1":{"s":[{"i":0,"v":[1700000000,1,2,0.5,1.5,10]}]}}]}"#,
    )
    .unwrap();
    let Some(InboundMessage::DataUpdate(message)) =
        InboundMessage::from_envelope(&envelope).unwrap()
    else {
        panic!("expected data update");
    };

    ingestor
        .process(&message.session_id, &message.update.series)
        .await
        .unwrap();
    assert!(harness.candles.rows().is_empty());
}

#[tokio::test]
async fn candles_endpoint_orders_ascending_with_limit() {
    let harness = harness();
    let app = router(harness.state.clone());

    let ingestor = CandleIngestor::new(harness.subscriptions.clone(), harness.candles.clone());
    let subscription = harness.subscriptions.seed_enabled(
        "BINANCE",
        "BTCUSDT",
        tradingview_stream_ingest::SubscriptionKind::Candle,
        Some(tradingview_stream_ingest::Timeframe::OneMinute),
    );
    let session_id = subscription.provider_session_id.clone();

    // Out-of-order arrivals across three bar timestamps.
    for timestamp in [1_700_000_120_i64, 1_700_000_000, 1_700_000_060] {
        let frame = format!(
            r#"{{"m":"du","p":["{session_id}",{{"sds_1":{{"s":[{{"i":0,"v":[{timestamp},1,2,0.5,1.5,10]}}]}}}}]}}"#
        );
        let envelope: Envelope = serde_json::from_str(&frame).unwrap();
        let Some(InboundMessage::DataUpdate(message)) =
            InboundMessage::from_envelope(&envelope).unwrap()
        else {
            panic!("expected data update");
        };
        ingestor
            .process(&message.session_id, &message.update.series)
            .await
            .unwrap();
    }

    let response = app
        .clone()
        .oneshot(get_request("/candles/BINANCE/BTCUSDT/1/2"))
        .await
        .unwrap();
    let body = body_json(response).await;
    let rows = body.as_array().unwrap();
    // The two most recent bars, ascending.
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["timestamp"], json!(1_700_000_060));
    assert_eq!(rows[1]["timestamp"], json!(1_700_000_120));

    // Bad timeframe and bad limit are validation errors.
    let response = app
        .clone()
        .oneshot(get_request("/candles/BINANCE/BTCUSDT/2H/10"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(get_request("/candles/BINANCE/BTCUSDT/1/0"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
