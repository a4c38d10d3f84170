//! Subscribe Demo - watch pushes for one URI over a plain framed stream.
//!
//! This example demonstrates:
//! - Splitting a TCP stream with `StreamTransport`
//! - Subscribing with a push callback and a one-shot ack
//! - Issuing a GET with `execute_async`
//! - Waiting for the connection to end with `closed()`
//!
//! # Running
//!
//! ```text
//! cargo run --example subscribe -- 127.0.0.1:4070 hm://remote/user/alice/
//! ```
//!
//! The peer must speak the unencrypted `[cmd][len u16][payload]` framing.

use mercury_client::transport::StreamTransport;
use mercury_client::{Engine, MercuryMethod, Termination};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let addr = args.next().unwrap_or_else(|| "127.0.0.1:4070".to_string());
    let uri = args
        .next()
        .unwrap_or_else(|| "hm://remote/user/alice/".to_string());

    let stream = tokio::net::TcpStream::connect(&addr).await?;
    let (reader, writer) = StreamTransport::new(stream).into_split();

    let engine = Engine::builder()
        .on_terminate(|reason| eprintln!("connection ended: {:?}", reason))
        .start(reader, writer);

    engine.subscribe(
        &uri,
        |push| {
            println!(
                "push for {} ({} parts)",
                push.uri().unwrap_or("?"),
                push.parts.len()
            );
        },
        |ack| match ack {
            Ok(_) => println!("subscribed"),
            Err(e) => eprintln!("subscribe failed: {}", e),
        },
    )?;

    // Look up the same URI once, for its current state
    match engine.execute_async(MercuryMethod::Get, &uri, vec![]).await {
        Ok(reply) => println!(
            "GET {} -> status {:?}, {} parts",
            uri,
            reply.status_code(),
            reply.parts.len()
        ),
        Err(e) => eprintln!("GET failed: {}", e),
    }

    if let Termination::Failed(reason) = engine.closed().await {
        return Err(reason.into());
    }
    Ok(())
}
