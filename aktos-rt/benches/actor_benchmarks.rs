//! Throughput benchmarks for the local messaging paths: tell and ask
//! across the mailbox disciplines.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use async_trait::async_trait;
use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use serde::{Deserialize, Serialize};
use tokio::runtime::Runtime;

use aktos_rt::prelude::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct BenchTell {
    priority: i64,
}

impl Message for BenchTell {
    const TYPE_URL: &'static str = "bench/BenchTell";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct BenchRequest;

impl Message for BenchRequest {
    const TYPE_URL: &'static str = "bench/BenchRequest";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct BenchReply;

impl Message for BenchReply {
    const TYPE_URL: &'static str = "bench/BenchReply";
}

struct BenchActor;

#[async_trait]
impl Actor for BenchActor {
    async fn receive(&mut self, ctx: &mut ReceiveContext) -> Result<(), BoxError> {
        if ctx.payload().is::<BenchRequest>() {
            ctx.reply(&BenchReply).await?;
        }
        Ok(())
    }
}

async fn started(name: &str) -> ActorSystem {
    let system = ActorSystem::new(SystemConfig::new(name).with_actor_init_max_retries(1)).unwrap();
    system.start().await.unwrap();
    system
}

fn bench_tell(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("tell");
    group.throughput(Throughput::Elements(1));

    group.bench_function("default_mailbox", |b| {
        let (system, actor) = rt.block_on(async {
            let system = started("bench-tell").await;
            let actor = system.spawn("bench", BenchActor).await.unwrap();
            (system, actor)
        });
        b.to_async(&rt)
            .iter(|| async { actor.tell(&BenchTell { priority: 0 }).await.unwrap() });
        rt.block_on(async { system.stop().await.unwrap() });
    });

    group.bench_function("bounded_mailbox", |b| {
        let (system, actor) = rt.block_on(async {
            let system = started("bench-tell-bounded").await;
            let actor = system
                .spawn_with(
                    "bench",
                    BenchActor,
                    SpawnOptions::new().with_mailbox(MailboxSpec::bounded(1_000_000)),
                )
                .await
                .unwrap();
            (system, actor)
        });
        b.to_async(&rt)
            .iter(|| async { actor.tell(&BenchTell { priority: 0 }).await.unwrap() });
        rt.block_on(async { system.stop().await.unwrap() });
    });

    group.bench_function("priority_mailbox", |b| {
        let (system, actor) = rt.block_on(async {
            let system = started("bench-tell-priority").await;
            // Larger priority first.
            let priority_of = |env: &aktos_rt::Envelope| {
                env.payload()
                    .decode::<BenchTell>()
                    .map(|m| m.priority)
                    .unwrap_or(0)
            };
            let actor = system
                .spawn_with(
                    "bench",
                    BenchActor,
                    SpawnOptions::new().with_mailbox(MailboxSpec::priority(move |a, b| {
                        priority_of(b).cmp(&priority_of(a))
                    })),
                )
                .await
                .unwrap();
            (system, actor)
        });
        let mut priority = 0i64;
        b.to_async(&rt).iter(|| {
            priority += 1;
            let actor = actor.clone();
            async move { actor.tell(&BenchTell { priority }).await.unwrap() }
        });
        rt.block_on(async { system.stop().await.unwrap() });
    });

    group.finish();
}

fn bench_ask(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("ask");
    group.throughput(Throughput::Elements(1));

    group.bench_function("default_mailbox", |b| {
        let (system, actor) = rt.block_on(async {
            let system = started("bench-ask").await;
            let actor = system.spawn("bench", BenchActor).await.unwrap();
            (system, actor)
        });
        b.to_async(&rt).iter(|| async {
            actor
                .ask(&BenchRequest, Duration::from_millis(100))
                .await
                .unwrap()
        });
        rt.block_on(async { system.stop().await.unwrap() });
    });

    group.finish();
}

criterion_group!(benches, bench_tell, bench_ask);
criterion_main!(benches);
