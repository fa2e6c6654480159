//! End-to-end tests of the local actor engine: delivery, ordering,
//! supervision, watching, and the ask path.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use aktos_rt::deadletter::DeadLetterReason;
use aktos_rt::mailbox::MailboxError;
use aktos_rt::prelude::*;
use aktos_rt::supervisor::FailureCause;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Echo {
    text: String,
}

impl Message for Echo {
    const TYPE_URL: &'static str = "test/Echo";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Numbered {
    n: u64,
}

impl Message for Numbered {
    const TYPE_URL: &'static str = "test/Numbered";
}

/// Replies with whatever `Echo` it receives and counts deliveries.
struct EchoActor {
    count: Arc<AtomicU64>,
}

#[async_trait]
impl Actor for EchoActor {
    async fn receive(&mut self, ctx: &mut ReceiveContext) -> Result<(), BoxError> {
        if ctx.payload().is::<PostStart>() {
            return Ok(());
        }
        if let Ok(echo) = ctx.message::<Echo>() {
            self.count.fetch_add(1, Ordering::SeqCst);
            if ctx.sender().is_some() {
                ctx.reply(&echo).await?;
            }
            return Ok(());
        }
        ctx.unhandled();
        Ok(())
    }
}

/// Records every `Numbered` it sees into a shared log; panics on a chosen
/// value the first `fail_times` times it meets it.
struct RecordingActor {
    seen: Arc<parking_lot::Mutex<Vec<u64>>>,
    starts: Arc<AtomicU64>,
    fail_on: Option<u64>,
    failures_left: Arc<AtomicU64>,
}

#[async_trait]
impl Actor for RecordingActor {
    async fn pre_start(&mut self, _ctx: &mut ActorContext) -> Result<(), BoxError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn receive(&mut self, ctx: &mut ReceiveContext) -> Result<(), BoxError> {
        if let Ok(msg) = ctx.message::<Numbered>() {
            if Some(msg.n) == self.fail_on
                && self
                    .failures_left
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                        left.checked_sub(1)
                    })
                    .is_ok()
            {
                return Err(format!("refusing message {}", msg.n).into());
            }
            self.seen.lock().push(msg.n);
        }
        Ok(())
    }
}

async fn started_system(name: &str) -> ActorSystem {
    let system = ActorSystem::new(SystemConfig::new(name).with_actor_init_max_retries(1)).unwrap();
    system.start().await.unwrap();
    system
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_tell_and_ask_round_trip() {
    let system = started_system("s1").await;
    let count = Arc::new(AtomicU64::new(0));
    let echo = system
        .spawn("echo", EchoActor { count: Arc::clone(&count) })
        .await
        .unwrap();

    echo.tell(&Echo { text: "hello".into() }).await.unwrap();
    settle().await;
    assert_eq!(count.load(Ordering::SeqCst), 1);

    let reply = echo
        .ask(&Echo { text: "hello".into() }, Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(reply.decode::<Echo>().unwrap().text, "hello");
    assert_eq!(count.load(Ordering::SeqCst), 2);

    system.stop().await.unwrap();
}

#[tokio::test]
async fn test_fifo_per_sender() {
    let system = started_system("fifo").await;
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let actor = system
        .spawn(
            "recorder",
            RecordingActor {
                seen: Arc::clone(&seen),
                starts: Arc::new(AtomicU64::new(0)),
                fail_on: None,
                failures_left: Arc::new(AtomicU64::new(0)),
            },
        )
        .await
        .unwrap();

    for n in 0..100 {
        actor.tell(&Numbered { n }).await.unwrap();
    }
    settle().await;

    assert_eq!(*seen.lock(), (0..100).collect::<Vec<_>>());
    system.stop().await.unwrap();
}

#[tokio::test]
async fn test_bounded_mailbox_fails_fifth_enqueue() {
    // A short drain window: the stuck actor below is force released at
    // system stop instead of holding the test for the default 30s.
    let system = ActorSystem::new(
        SystemConfig::new("bounded")
            .with_actor_init_max_retries(1)
            .with_shutdown_timeout(Duration::from_millis(200)),
    )
    .unwrap();
    system.start().await.unwrap();
    // An actor that never finishes its first message keeps the mailbox
    // from draining.
    struct Stuck;
    #[async_trait]
    impl Actor for Stuck {
        async fn receive(&mut self, _ctx: &mut ReceiveContext) -> Result<(), BoxError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    let actor = system
        .spawn_with("stuck", Stuck, SpawnOptions::new().with_mailbox(MailboxSpec::bounded(4)))
        .await
        .unwrap();
    // The dispatcher is parked on PostStart; the mailbox holds what we send.
    settle().await;

    for n in 0..4 {
        actor.tell(&Numbered { n }).await.unwrap();
    }
    let err = actor.tell(&Numbered { n: 4 }).await.unwrap_err();
    assert!(matches!(
        err,
        SystemError::Mailbox(MailboxError::Full { capacity: 4 })
    ));

    system.stop().await.unwrap();
}

#[tokio::test]
async fn test_name_conflict() {
    let system = started_system("names").await;
    let count = Arc::new(AtomicU64::new(0));
    system
        .spawn("worker", EchoActor { count: Arc::clone(&count) })
        .await
        .unwrap();

    let err = system
        .spawn("worker", EchoActor { count })
        .await
        .unwrap_err();
    assert!(matches!(err, SystemError::NameConflict(name) if name == "worker"));

    system.stop().await.unwrap();
}

#[tokio::test]
async fn test_restart_redelivers_tail_of_mailbox() {
    let system = started_system("restart").await;
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let starts = Arc::new(AtomicU64::new(0));
    let actor = system
        .spawn_with(
            "flaky",
            RecordingActor {
                seen: Arc::clone(&seen),
                starts: Arc::clone(&starts),
                fail_on: Some(3),
                failures_left: Arc::new(AtomicU64::new(1)),
            },
            SpawnOptions::new()
                .with_supervisor(SupervisorStrategy::on_any(Directive::Restart).with_max_retries(3)),
        )
        .await
        .unwrap();

    for n in 1..=5 {
        actor.tell(&Numbered { n }).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Message 3 failed once and was retried by a fresh tell after restart.
    actor.tell(&Numbered { n: 3 }).await.unwrap();
    settle().await;

    let seen = seen.lock().clone();
    assert_eq!(seen, vec![1, 2, 4, 5, 3]);
    // pre_start ran again on restart.
    assert_eq!(starts.load(Ordering::SeqCst), 2);

    system.stop().await.unwrap();
}

#[tokio::test]
async fn test_restart_budget_promotes_to_stop() {
    let system = started_system("budget").await;
    struct AlwaysFails;
    #[async_trait]
    impl Actor for AlwaysFails {
        async fn receive(&mut self, ctx: &mut ReceiveContext) -> Result<(), BoxError> {
            if ctx.payload().is::<PostStart>() {
                return Ok(());
            }
            Err("always".into())
        }
    }

    let actor = system
        .spawn_with(
            "doomed",
            AlwaysFails,
            SpawnOptions::new().with_supervisor(
                SupervisorStrategy::on_any(Directive::Restart)
                    .with_max_retries(2)
                    .within(Duration::from_secs(10)),
            ),
        )
        .await
        .unwrap();

    for n in 0..5 {
        let _ = actor.tell(&Numbered { n }).await;
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Budget exhausted -> stopped -> further tells are dead letters.
    let err = actor.tell(&Numbered { n: 9 }).await.unwrap_err();
    assert!(matches!(err, SystemError::DeadLetter(_)));

    system.stop().await.unwrap();
}

#[tokio::test]
async fn test_resume_keeps_state() {
    let system = started_system("resume").await;
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let starts = Arc::new(AtomicU64::new(0));
    let actor = system
        .spawn_with(
            "resilient",
            RecordingActor {
                seen: Arc::clone(&seen),
                starts: Arc::clone(&starts),
                fail_on: Some(2),
                failures_left: Arc::new(AtomicU64::new(1)),
            },
            SpawnOptions::new().with_supervisor(SupervisorStrategy::on_any(Directive::Resume)),
        )
        .await
        .unwrap();

    for n in 1..=4 {
        actor.tell(&Numbered { n }).await.unwrap();
    }
    settle().await;

    assert_eq!(*seen.lock(), vec![1, 3, 4]);
    // Resume never re-runs pre_start.
    assert_eq!(starts.load(Ordering::SeqCst), 1);

    system.stop().await.unwrap();
}

#[tokio::test]
async fn test_panic_is_supervision_input_not_a_crash() {
    let system = started_system("panics").await;
    struct Panics {
        survived: Arc<AtomicU64>,
    }
    #[async_trait]
    impl Actor for Panics {
        async fn receive(&mut self, ctx: &mut ReceiveContext) -> Result<(), BoxError> {
            if let Ok(msg) = ctx.message::<Numbered>() {
                if msg.n == 0 {
                    panic!("kaboom");
                }
                self.survived.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    let survived = Arc::new(AtomicU64::new(0));
    let actor = system
        .spawn_with(
            "panicky",
            Panics { survived: Arc::clone(&survived) },
            SpawnOptions::new().with_supervisor(
                SupervisorStrategy::new().with_rule(ErrorMatcher::Panics, Directive::Resume),
            ),
        )
        .await
        .unwrap();

    actor.tell(&Numbered { n: 0 }).await.unwrap();
    actor.tell(&Numbered { n: 1 }).await.unwrap();
    settle().await;

    assert_eq!(survived.load(Ordering::SeqCst), 1);
    system.stop().await.unwrap();
}

#[tokio::test]
async fn test_ask_timeout_frees_the_slot() {
    let system = started_system("asks").await;
    struct Silent;
    #[async_trait]
    impl Actor for Silent {
        async fn receive(&mut self, _ctx: &mut ReceiveContext) -> Result<(), BoxError> {
            Ok(())
        }
    }

    let actor = system.spawn("silent", Silent).await.unwrap();
    let err = actor
        .ask(&Echo { text: "anyone?".into() }, Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, SystemError::AskTimeout(_)));

    system.stop().await.unwrap();
}

#[tokio::test]
async fn test_unhandled_goes_to_dead_letters() {
    let system = started_system("unhandled").await;
    let mut dead_letters = system.subscribe_dead_letters();

    let count = Arc::new(AtomicU64::new(0));
    let echo = system.spawn("echo", EchoActor { count }).await.unwrap();

    // EchoActor only understands Echo.
    echo.tell(&Numbered { n: 1 }).await.unwrap();

    let letter = tokio::time::timeout(Duration::from_secs(1), dead_letters.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(letter.reason, DeadLetterReason::Unhandled);
    assert!(letter.envelope.payload().is::<Numbered>());

    system.stop().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_then_tell_is_dead_letter() {
    let system = started_system("shutdown").await;
    let count = Arc::new(AtomicU64::new(0));
    let echo = system.spawn("echo", EchoActor { count }).await.unwrap();

    echo.shutdown().await.unwrap();

    let err = echo.tell(&Echo { text: "late".into() }).await.unwrap_err();
    assert!(matches!(err, SystemError::DeadLetter(_)));
    assert!(system.actor_of("echo").is_none());

    system.stop().await.unwrap();
}

#[tokio::test]
async fn test_children_stop_with_parent_and_terminated_fires() {
    let system = started_system("tree").await;

    struct Parent {
        terminated: Arc<AtomicU64>,
    }
    #[async_trait]
    impl Actor for Parent {
        async fn receive(&mut self, ctx: &mut ReceiveContext) -> Result<(), BoxError> {
            if ctx.payload().is::<PostStart>() {
                ctx.spawn_child("child-a", Child).await?;
                ctx.spawn_child("child-b", Child).await?;
            } else if ctx.payload().is::<Terminated>() {
                self.terminated.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    struct Child;
    #[async_trait]
    impl Actor for Child {
        async fn receive(&mut self, _ctx: &mut ReceiveContext) -> Result<(), BoxError> {
            Ok(())
        }
    }

    let terminated = Arc::new(AtomicU64::new(0));
    let parent = system
        .spawn("parent", Parent { terminated: Arc::clone(&terminated) })
        .await
        .unwrap();
    settle().await;
    assert_eq!(system.actor_count(), 3);

    // Stopping one child notifies the parent.
    system
        .stop_actor(&parent.address().child("child-a"))
        .await
        .unwrap();
    settle().await;
    assert_eq!(terminated.load(Ordering::SeqCst), 1);

    // Stopping the parent takes the remaining child down post-order.
    parent.shutdown().await.unwrap();
    settle().await;
    assert_eq!(system.actor_count(), 0);

    system.stop().await.unwrap();
}

#[tokio::test]
async fn test_escalate_reaches_the_parent_supervisor() {
    let system = started_system("escalate").await;

    struct Parent {
        stopped_children: Arc<AtomicU64>,
    }
    #[async_trait]
    impl Actor for Parent {
        async fn receive(&mut self, ctx: &mut ReceiveContext) -> Result<(), BoxError> {
            if ctx.payload().is::<PostStart>() {
                ctx.spawn_child_with(
                    "fragile",
                    Fragile,
                    SpawnOptions::new()
                        .with_supervisor(SupervisorStrategy::on_any(Directive::Escalate)),
                )
                .await?;
            } else if ctx.payload().is::<Terminated>() {
                self.stopped_children.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    struct Fragile;
    #[async_trait]
    impl Actor for Fragile {
        async fn receive(&mut self, ctx: &mut ReceiveContext) -> Result<(), BoxError> {
            if ctx.payload().is::<PostStart>() {
                return Ok(());
            }
            Err("child failure".into())
        }
    }

    let stopped_children = Arc::new(AtomicU64::new(0));
    let parent_supervisor = SupervisorStrategy::new().with_rule(
        ErrorMatcher::Predicate(Arc::new(|cause| {
            matches!(cause, FailureCause::Escalated { .. })
        })),
        Directive::Resume,
    );
    system
        .spawn_with(
            "parent",
            Parent { stopped_children: Arc::clone(&stopped_children) },
            SpawnOptions::new().with_supervisor(parent_supervisor),
        )
        .await
        .unwrap();
    settle().await;

    let child = system.actor_of("fragile").unwrap();
    child.tell(&Numbered { n: 1 }).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // The child stopped; the parent survived the escalated failure.
    assert!(system.actor_of("fragile").is_none());
    assert!(system.actor_of("parent").is_some());
    assert_eq!(stopped_children.load(Ordering::SeqCst), 1);

    system.stop().await.unwrap();
}

#[tokio::test]
async fn test_at_most_one_receive_in_flight() {
    let system = started_system("inflight").await;

    struct Overlap {
        in_flight: Arc<AtomicU64>,
        overlaps: Arc<AtomicU64>,
    }
    #[async_trait]
    impl Actor for Overlap {
        async fn receive(&mut self, ctx: &mut ReceiveContext) -> Result<(), BoxError> {
            if ctx.payload().is::<PostStart>() {
                return Ok(());
            }
            if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    let in_flight = Arc::new(AtomicU64::new(0));
    let overlaps = Arc::new(AtomicU64::new(0));
    let actor = system
        .spawn(
            "serial",
            Overlap {
                in_flight: Arc::clone(&in_flight),
                overlaps: Arc::clone(&overlaps),
            },
        )
        .await
        .unwrap();

    let mut producers = Vec::new();
    for p in 0..8u64 {
        let actor = actor.clone();
        producers.push(tokio::spawn(async move {
            for i in 0..20 {
                actor.tell(&Numbered { n: p * 100 + i }).await.unwrap();
            }
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    system.stop().await.unwrap();
}

#[tokio::test]
async fn test_watch_outside_the_supervision_tree() {
    let system = started_system("watching").await;

    struct Target;
    #[async_trait]
    impl Actor for Target {
        async fn receive(&mut self, _ctx: &mut ReceiveContext) -> Result<(), BoxError> {
            Ok(())
        }
    }

    struct Watcher {
        target: Address,
        notified: Arc<AtomicU64>,
    }
    #[async_trait]
    impl Actor for Watcher {
        async fn receive(&mut self, ctx: &mut ReceiveContext) -> Result<(), BoxError> {
            if ctx.payload().is::<PostStart>() {
                ctx.watch(&self.target);
            } else if let Ok(t) = ctx.message::<Terminated>() {
                assert_eq!(t.address.name(), "target");
                self.notified.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    let target = system.spawn("target", Target).await.unwrap();
    let notified = Arc::new(AtomicU64::new(0));
    system
        .spawn(
            "watcher",
            Watcher {
                target: target.address().clone(),
                notified: Arc::clone(&notified),
            },
        )
        .await
        .unwrap();
    settle().await;

    target.shutdown().await.unwrap();
    settle().await;
    assert_eq!(notified.load(Ordering::SeqCst), 1);

    // Termination delivery is idempotent: a second stop cannot re-fire.
    assert!(system.stop_actor(target.address()).await.is_err());
    settle().await;
    assert_eq!(notified.load(Ordering::SeqCst), 1);

    system.stop().await.unwrap();
}

#[tokio::test]
async fn test_send_async_resolves_by_name() {
    let system = started_system("byname").await;
    let count = Arc::new(AtomicU64::new(0));
    system
        .spawn("echo", EchoActor { count: Arc::clone(&count) })
        .await
        .unwrap();

    system
        .send_async("echo", &Echo { text: "hi".into() })
        .await
        .unwrap();
    settle().await;
    assert_eq!(count.load(Ordering::SeqCst), 1);

    let err = system
        .send_async("missing", &Echo { text: "hi".into() })
        .await
        .unwrap_err();
    assert!(matches!(err, SystemError::UnknownAddress(_)));

    system.stop().await.unwrap();
}
