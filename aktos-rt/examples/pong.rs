//! Remoting throughput demo, receiving side. See `ping.rs`.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use aktos_rt::prelude::*;
use aktos_rt::remote::RemoteConfig;

const HOST: &str = "127.0.0.1";
const PONG_PORT: u16 = 50052;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TestPing;

impl Message for TestPing {
    const TYPE_URL: &'static str = "demo/TestPing";
}

struct Pong {
    count: u64,
    first_at: Option<Instant>,
}

#[async_trait]
impl Actor for Pong {
    async fn receive(&mut self, ctx: &mut ReceiveContext) -> Result<(), BoxError> {
        if ctx.payload().is::<TestPing>() {
            let first_at = *self.first_at.get_or_insert_with(Instant::now);
            self.count += 1;
            if self.count % 100_000 == 0 {
                let elapsed = first_at.elapsed().as_secs_f64();
                info!(
                    count = self.count,
                    rate = format!("{:.0}/s", self.count as f64 / elapsed),
                    "receiving"
                );
            }
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let system = ActorSystem::new(
        SystemConfig::new("remoting-bench")
            .with_remote(RemoteConfig::new(HOST, PONG_PORT)),
    )?;
    system.start().await?;

    system
        .spawn(
            "pong",
            Pong {
                count: 0,
                first_at: None,
            },
        )
        .await?;

    info!("pong listening on {HOST}:{PONG_PORT}");
    tokio::signal::ctrl_c().await?;
    system.stop().await?;
    Ok(())
}
