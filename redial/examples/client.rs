//! Example reconnecting client sending a few frames and printing the echoes.
//!
//! Run with: `cargo run --example client`
//!
//! The server may start before or after the client: `cargo run --example server`

use redial::prelude::*;
use std::thread;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let driver = EngineDriver::tcp(TcpEngineConfig::default(), DriverConfig::default())?;
    let client = ClientBuilder::new("127.0.0.1", 9000)
        .max_reconnect_delay(Duration::from_millis(500))
        .build(driver.handle());

    println!("Connecting to {}:{}", client.host(), client.port());

    for i in 1..=20 {
        if client.is_connected() {
            let payload = format!("Hello from redial client! Message #{}", i);
            client.write_sized_frame(payload.as_bytes())?;
            println!("[Client] Sent message #{}", i);
        } else {
            println!("[Client] Waiting for server (backoff {:?})", client.current_backoff());
        }

        thread::sleep(Duration::from_millis(250));

        for frame in client.drain_frames()? {
            match std::str::from_utf8(&frame) {
                Ok(text) => println!("[Client] Echo: {}", text),
                Err(_) => println!("[Client] Echo: {} bytes", frame.len()),
            }
        }
    }

    println!(
        "\nConnected {} times, disconnected {} times",
        client.times_connected(),
        client.times_disconnected()
    );

    drop(client);
    driver.shutdown();
    println!("Client stopped");
    Ok(())
}
