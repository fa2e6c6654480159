//! Remoting throughput demo, sending side.
//!
//! Run `pong` first, then this binary:
//!
//! ```text
//! cargo run --example pong
//! cargo run --example ping
//! ```
//!
//! The ping node batches one million envelopes to the remote `pong` actor
//! and logs the send duration.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use aktos_rt::prelude::*;
use aktos_rt::remote::RemoteConfig;

const HOST: &str = "127.0.0.1";
const PING_PORT: u16 = 50051;
const PONG_PORT: u16 = 50052;
const TOTAL: usize = 1_000_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TestPing;

impl Message for TestPing {
    const TYPE_URL: &'static str = "demo/TestPing";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TestReady;

impl Message for TestReady {
    const TYPE_URL: &'static str = "demo/TestReady";
}

struct Ping {
    to_send: Vec<Payload>,
}

#[async_trait]
impl Actor for Ping {
    async fn receive(&mut self, ctx: &mut ReceiveContext) -> Result<(), BoxError> {
        if ctx.payload().is::<PostStart>() {
            return Ok(());
        }
        if ctx.payload().is::<TestReady>() {
            let Some(remote) = ctx.remote_lookup(HOST, PONG_PORT, "pong").await? else {
                return Err("pong is not running yet".into());
            };
            let batch = std::mem::take(&mut self.to_send);
            let count = batch.len();
            let start = Instant::now();
            ctx.remote_batch_tell(&remote, batch).await?;
            info!(
                count,
                to = %remote,
                elapsed = ?start.elapsed(),
                "batch sent"
            );
            return Ok(());
        }
        ctx.unhandled();
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let to_send: Vec<Payload> = (0..TOTAL)
        .map(|_| Payload::encode(&TestPing))
        .collect::<Result<_, _>>()?;

    let system = ActorSystem::new(
        SystemConfig::new("remoting-bench")
            .with_remote(RemoteConfig::new(HOST, PING_PORT))
            .with_supervisor(SupervisorStrategy::on_any(Directive::Resume)),
    )?;
    system.start().await?;

    let ping = system.spawn("ping", Ping { to_send }).await?;
    tokio::time::sleep(Duration::from_secs(1)).await;

    // Kick off the benchmark.
    ping.tell(&TestReady).await?;

    tokio::signal::ctrl_c().await?;
    system.stop().await?;
    Ok(())
}
