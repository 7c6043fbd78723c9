//! Body capture and redaction demonstration.
//!
//! This example shows what ends up in an audit record for different bodies:
//! 1. Structured bodies with sensitive fields at several depths
//! 2. Bodies larger than the capture limit, with a full replay for the handler
//! 3. Non-JSON bodies, kept as opaque text unless the capture was cut
//! 4. Header filtering with deny-list masking and an allow-list
//!
//! Run with: `cargo run --example body_redaction`

use std::io::Read;

use serde_json::json;
use trail_core::{collect_headers, BodyCapture, HeaderFilter, Redactor};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("=== Body Redaction Example ===\n");

    let redactor = Redactor::new();

    println!("--- Scenario 1: Nested Sensitive Fields ---");
    let order = json!({
        "customer": {"name": "Ada", "password": "hunter2"},
        "payments": [
            {"credit_card": {"number": "4111111111111111", "cvv": "123"}},
            {"voucher": "SPRING", "PIN": 4242}
        ],
        "Authorization": "Bearer abc"
    });
    println!("Masked: {}", redactor.mask(order));

    println!("\n--- Scenario 2: Custom Field List ---");
    let custom = Redactor::new()
        .with_fields(["iban", "ssn"])
        .with_mask_value("[hidden]");
    println!(
        "Masked: {}",
        custom.mask(json!({"iban": "DE89370400440532013000", "password": "visible"}))
    );

    println!("\n--- Scenario 3: Truncated Capture, Full Replay ---");
    let body = format!(r#"{{"note":"{}","token":"t-1"}}"#, "x".repeat(64));
    let captured = BodyCapture::new(32)
        .capture(Some(body.as_bytes()))
        .map_err(|failure| failure.to_string())?
        .ok_or("no body")?;
    let truncated = captured.truncated();
    println!("Truncated: {truncated}");

    let (audit_bytes, mut replay) = captured.into_parts();
    let mut handler_input = String::new();
    replay.read_to_string(&mut handler_input)?;
    println!("Handler saw {} of {} bytes", handler_input.len(), body.len());
    println!("Audit copy: {:?}", redactor.mask_captured(&audit_bytes, truncated));

    println!("\n--- Scenario 4: Opaque Bodies ---");
    println!("Masked: {:?}", redactor.mask_body(b"password=hunter2&user=ada"));
    println!("Empty:  {:?}", redactor.mask_body(b""));

    println!("\n--- Scenario 5: Headers ---");
    let headers = collect_headers([
        ("Authorization", "Bearer abc"),
        ("Cookie", "session=1"),
        ("Content-Type", "application/json"),
        ("X-Request-Id", "req-1"),
    ]);
    println!("Deny-list: {:?}", HeaderFilter::new().filter(&headers));

    let allow = HeaderFilter::new().with_include(["authorization", "x-request-id"]);
    println!("Allow-list: {:?}", allow.filter(&headers));

    println!("\n=== Key Takeaways ===");
    println!("1. A sensitive key hides its whole value, whatever its shape");
    println!("2. The handler always reads the complete body");
    println!("3. A cut body that does not parse is recorded as a length marker");
    println!("4. Complete unparseable bodies are recorded as text, unmasked");
    println!("5. Denied headers stay visible by name only");

    Ok(())
}
