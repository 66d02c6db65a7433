//! Example frame echo server for the reconnecting client.
//!
//! Run with: `cargo run --example server`
//!
//! Stop and restart it while the client runs to watch the client reconnect.

use futures::{SinkExt, StreamExt};
use redial::transport::SizedFrameCodec;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::TcpListener;
use tokio_util::codec::Framed;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let addr: SocketAddr = "127.0.0.1:9000".parse()?;
    let listener = TcpListener::bind(addr).await?;
    let frames = Arc::new(AtomicU64::new(0));

    println!("Echo server listening on {}", addr);
    println!("Press Ctrl+C to stop");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (socket, peer) = accepted?;
                let frames = Arc::clone(&frames);
                tokio::spawn(async move {
                    println!("[Server] {} connected", peer);
                    let mut framed = Framed::new(socket, SizedFrameCodec::default());

                    while let Some(frame) = framed.next().await {
                        let payload = match frame {
                            Ok(payload) => payload,
                            Err(e) => {
                                tracing::warn!(%peer, error = %e, "bad frame");
                                break;
                            }
                        };

                        let count = frames.fetch_add(1, Ordering::Relaxed) + 1;
                        println!("[Server] Frame #{} from {}: {} bytes", count, peer, payload.len());

                        if let Err(e) = framed.send(payload.freeze()).await {
                            eprintln!("[Server] Failed to echo frame: {}", e);
                            break;
                        }
                    }

                    println!("[Server] {} disconnected", peer);
                });
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down server...");
                break;
            }
        }
    }

    println!("Server stopped");
    Ok(())
}
