//! Step Driver Example
//!
//! Runs a step-by-step driver against a consumer over one request id:
//! - the driver sends `step:1`, `step:2`, ... and waits for each response
//! - the consumer uppercases every event it receives
//!
//! Configuration is loaded the usual way (global, project, `RENDEZVOUS_*`).
//!
//! # Usage
//!
//! ```bash
//! cargo run --example step_driver
//! cargo run --example step_driver -- --steps 10 --request-id req-A --debug
//! ```

use anyhow::Result;
use clap::Parser;
use rendezvous_runtime::{Broker, ConfigLoader, HandlerError, RequestId};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "step_driver")]
#[command(about = "Drive synchronous steps through a rendezvous broker")]
struct Args {
    /// Number of steps to send
    #[arg(short, long, default_value_t = 5)]
    steps: u32,

    /// Request id shared by the driver and the consumer
    #[arg(long, default_value = "req-A")]
    request_id: String,

    /// Delay between steps in milliseconds
    #[arg(long, default_value_t = 100)]
    delay_ms: u64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_root = std::env::current_dir()?;
    let config = ConfigLoader::new()
        .with_project_root(project_root)
        .load()
        .map_err(|e| anyhow::anyhow!("Config error: {e}"))?;

    // Setup logging
    let filter = if args.debug || config.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    fmt().with_env_filter(filter).with_target(false).init();

    let broker: Broker<String, String> = Broker::with_config(config.broker);
    let _sweeper = broker.spawn_idle_sweeper();
    let request_id = RequestId::try_new(&args.request_id)?;

    println!("=== Rendezvous Step Driver ===");
    println!("Broker:     {}", broker.id());
    println!("Request id: {request_id}");
    println!();

    let consumer = {
        let broker = broker.clone();
        let request_id = request_id.clone();
        tokio::spawn(async move {
            broker
                .consume(&request_id, |event: String| -> Result<String, HandlerError> {
                    Ok(event.to_uppercase())
                })
                .await
        })
    };

    for step in 1..=args.steps {
        let event = format!("step:{step}");
        let response = broker.send(&request_id, event.clone()).await?;
        info!(%event, %response, "Step completed");
        println!("{event} -> {response}");
        tokio::time::sleep(Duration::from_millis(args.delay_ms)).await;
    }

    if let Some(stats) = broker.stats(&request_id) {
        println!();
        println!("Processed: {}", stats.processed);
    }

    broker.close(&request_id);
    consumer.await??;

    Ok(())
}
