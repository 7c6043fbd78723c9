//! Audit pipeline demonstration.
//!
//! This example walks three requests through an [`Auditor`]:
//! 1. Capture and redact the request body, handing the replay to the handler
//! 2. Record internal steps and an outbound integration on the trail
//! 3. Finalize, chain and deliver each trail to a JSON-lines sink on stdout
//!
//! Run with: `cargo run --example audit_pipeline`

use std::io::Read;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use trail_core::web::{Auditor, RequestParts, ResponseParts};
use trail_core::{
    collect_headers, record_integration_async, trace_step, Backpressure, Config, DeliveryConfig,
    IntegrationKind, JsonLinesSink, Trail,
};

#[derive(Debug, Serialize)]
struct Payment {
    amount: u64,
}

fn parse_payment(body: &[u8]) -> Result<Payment, String> {
    let value: serde_json::Value = serde_json::from_slice(body).map_err(|e| e.to_string())?;
    value["amount"]
        .as_u64()
        .map(|amount| Payment { amount })
        .ok_or_else(|| "missing amount".to_string())
}

async fn charge(trail: Option<&Trail>, payment: &Payment) -> Result<String, String> {
    record_integration_async(
        trail,
        IntegrationKind::Http,
        "card-processor",
        Some(json!({"amount": payment.amount})),
        async move {
            if payment.amount > 1_000_000 {
                Err("amount over limit".to_string())
            } else {
                Ok(format!("auth-{}", payment.amount))
            }
        },
    )
    .await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("=== Audit Pipeline Example ===\n");

    let config = Config::default()
        .with_service_name("payments")
        .with_environment("demo")
        .with_immutable(true)
        .with_delivery(DeliveryConfig {
            queue_capacity: 16,
            workers: 2,
            backpressure: Backpressure::Block,
        });
    let auditor = Auditor::spawn(config, Arc::new(JsonLinesSink::stdout()))?;
    let cancel = CancellationToken::new();

    let bodies = [
        r#"{"amount":150000,"card":{"number":"4111","cvv":"123"},"password":"hunter2"}"#,
        r#"{"amount":5000000,"token":"tok_live_1"}"#,
        r#"not json at all"#,
    ];

    let mut previous_hash: Option<String> = None;
    for (i, body) in bodies.iter().enumerate() {
        println!("--- Request {} ---", i + 1);

        let trail = auditor.begin(format!("trace-{i}"), format!("req-{i}"));
        if let (Some(trail), Some(prev)) = (&trail, &previous_hash) {
            trail.set_previous_hash(prev.clone());
        }

        // The handler reads the replay, never the original stream.
        let (audit_body, replay) = auditor.capture_request_body(Some(body.as_bytes()));
        let mut handler_input = Vec::new();
        if let Some(mut replay) = replay {
            replay.read_to_end(&mut handler_input)?;
        }

        let parts = RequestParts::new("POST", "/payments")
            .with_query("currency=EUR")
            .with_headers(collect_headers([
                ("Authorization", "Bearer secret-token"),
                ("Content-Type", "application/json"),
            ]));
        auditor.record_request(trail.as_deref(), parts, audit_body);

        let parsed = trace_step(trail.as_deref(), "parse_payment", None, || {
            parse_payment(&handler_input)
        });

        let (status, response) = match parsed {
            Ok(payment) => match charge(trail.as_deref(), &payment).await {
                Ok(auth) => (200, json!({"authorization": auth})),
                Err(err) => {
                    if let Some(trail) = &trail {
                        trail.add_error_with_code("card-processor", err.clone(), "DECLINED");
                    }
                    (402, json!({"error": err}))
                }
            },
            Err(err) => {
                if let Some(trail) = &trail {
                    trail.add_error("parser", err.clone());
                }
                (400, json!({"error": err}))
            }
        };

        let response_bytes = serde_json::to_vec(&response)?;
        let audit_response = auditor.capture_response_body(&response_bytes);
        auditor.record_response(trail.as_deref(), ResponseParts::new(status), audit_response);

        auditor.finish(trail.as_deref(), &cancel).await?;
        previous_hash = trail.as_ref().and_then(|t| t.hash());
        println!("status {status}, hash {:?}\n", previous_hash);
    }

    auditor.shutdown().await?;

    let stats = auditor.stats();
    println!(
        "enqueued {}, delivered {}, dropped {}, failed {}",
        stats.enqueued, stats.delivered, stats.dropped, stats.failed
    );

    Ok(())
}
