#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::mpsc::UnboundedReceiver;

use endocrine_broker::access::{AccessControlHandlers, AccessDenied, AllowAll};
use endocrine_broker::arbiter::Decision;
use endocrine_broker::engine::{Completion, MemoryEngine, MemoryEngineFactory, PublishHook};
use endocrine_broker::events::{ChannelSink, SystemEvent};
use endocrine_broker::gate::AuthorizationGate;
use endocrine_broker::obs::{BrokerMetrics, TrafficStats};
use endocrine_broker::{EndocrineSystem, SystemOptions};
use endocrine_core::PeerCertificate;

const BACKEND: &str = "memory://gate";

async fn deny(_cert: Arc<PeerCertificate>, _name: String) -> Result<(), AccessDenied> {
    Err(AccessDenied::new("not on the list"))
}

async fn boot(
    port: u16,
    handlers: AccessControlHandlers,
) -> (EndocrineSystem, Arc<MemoryEngine>, UnboundedReceiver<SystemEvent>) {
    let factory = MemoryEngineFactory::new();
    let (sink, rx) = ChannelSink::new();
    let options = SystemOptions::new(common::system_config(port, "ca.crt", BACKEND, 0))
        .with_access_control(handlers)
        .with_sink(Arc::new(sink));

    let system = EndocrineSystem::start(options, &factory).unwrap();
    system.ready().await.unwrap();
    let engine = factory.engine(port).unwrap();
    (system, engine, rx)
}

/// Audit events received so far, skipping `ready`.
fn audit_events(rx: &mut UnboundedReceiver<SystemEvent>) -> Vec<SystemEvent> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        if ev.audit_env().is_some() {
            out.push(ev);
        }
    }
    out
}

#[tokio::test]
async fn granted_managed_publish_emits_in_passed() {
    let (system, engine, mut rx) = boot(18001, AccessControlHandlers::deny_all().inbound(AllowAll)).await;
    let client = common::connect(&engine, "thyroid", true);

    let decision = client.publish("hormone/x", "T3", false).await.unwrap();
    assert_eq!(decision, Decision::Allow);

    let events = audit_events(&mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name(), "inPassed");
    let env = events[0].audit_env().unwrap();
    assert_eq!(env.topic, "hormone/x");
    assert_eq!(env.connection_id, "thyroid");
    assert_eq!(env.payload_length, 2);
    assert_eq!(env.certificate.as_ref().and_then(|c| c.common_name()), Some("thyroid"));

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn denied_other_publish_emits_in_rejected() {
    let handlers = AccessControlHandlers::deny_all().inbound(AllowAll).inbound_other(deny);
    let (system, engine, mut rx) = boot(18002, handlers).await;
    let client = common::connect(&engine, "thyroid", true);

    let decision = client.publish("sensors/x", "21.5", false).await.unwrap();
    assert_eq!(decision, Decision::Reject);

    let events = audit_events(&mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name(), "inRejected");
    assert_eq!(events[0].audit_env().unwrap().topic, "sensors/x");

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn accepted_publish_with_rejected_forward_reaches_nobody() {
    let handlers = AccessControlHandlers::deny_all().inbound(AllowAll).outbound(deny);
    let (system, engine, mut rx) = boot(18003, handlers).await;
    let publisher = common::connect(&engine, "thyroid", true);
    let mut subscriber = common::connect(&engine, "liver", true);
    subscriber.subscribe("hormone/#").await.unwrap();

    let decision = publisher.publish("hormone/x", "T4", true).await.unwrap();
    assert_eq!(decision, Decision::Allow);
    assert_eq!(engine.store().retained("hormone/x").as_deref(), Some(&b"T4"[..]));
    assert!(subscriber.try_recv().is_none());

    let names: Vec<_> = audit_events(&mut rx).iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["inPassed", "outRejected"]);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn granted_forward_is_delivered() {
    let handlers = AccessControlHandlers::deny_all().inbound(AllowAll).outbound(AllowAll);
    let (system, engine, mut rx) = boot(18004, handlers).await;
    let publisher = common::connect(&engine, "thyroid", true);
    let mut subscriber = common::connect(&engine, "liver", true);
    subscriber.subscribe("hormone/+").await.unwrap();

    publisher.publish("hormone/x", "T4", false).await.unwrap();
    let delivery = subscriber.recv().await.unwrap();
    assert_eq!(delivery.topic, "hormone/x");
    assert_eq!(&delivery.payload[..], b"T4");

    let events = audit_events(&mut rx);
    let out = events.iter().find(|e| e.name() == "outPassed").unwrap();
    assert_eq!(out.audit_env().unwrap().connection_id, "liver");

    let stats = system.stats().snapshot();
    assert_eq!((stats.messages_in, stats.bytes_in), (1, 2));
    assert_eq!((stats.messages_out, stats.bytes_out), (1, 2));

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn publish_without_certificate_is_rejected() {
    let handlers = AccessControlHandlers::deny_all().inbound(AllowAll).inbound_other(AllowAll);
    let (system, engine, mut rx) = boot(18005, handlers).await;
    let client = common::connect(&engine, "anonymous", false);

    assert_eq!(client.publish("hormone/x", "T3", false).await.unwrap(), Decision::Reject);

    let events = audit_events(&mut rx);
    assert_eq!(events[0].name(), "inRejected");
    assert!(events[0].audit_env().unwrap().certificate.is_none());

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn every_concurrent_publish_gets_exactly_one_decision() {
    let handlers = AccessControlHandlers::deny_all().inbound(|_c: Arc<PeerCertificate>, name: String| async move {
        tokio::task::yield_now().await;
        if name.ends_with('0') {
            Err(AccessDenied::default())
        } else {
            Ok(())
        }
    });
    let (system, engine, mut rx) = boot(18006, handlers).await;
    let client = common::connect(&engine, "thyroid", true);

    let topics: Vec<String> = (0..40).map(|i| format!("hormone/h{i}")).collect();
    let decisions = join_all(topics.iter().map(|t| client.publish(t, "x", false))).await;

    let decisions: Vec<Decision> = decisions.into_iter().map(Result::unwrap).collect();
    assert_eq!(decisions.len(), 40);
    assert_eq!(decisions.iter().filter(|d| **d == Decision::Reject).count(), 4);

    assert_eq!(audit_events(&mut rx).len(), 40);
    assert_eq!(system.metrics().decisions.total(), 40);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn closed_sink_does_not_change_decisions() {
    let (system, engine, rx) = boot(18007, AccessControlHandlers::deny_all().inbound(AllowAll)).await;
    drop(rx);
    let client = common::connect(&engine, "thyroid", true);

    assert_eq!(client.publish("hormone/x", "T3", false).await.unwrap(), Decision::Allow);
    assert_eq!(client.publish("other/x", "T3", false).await.unwrap(), Decision::Reject);

    let metrics = system.metrics();
    assert_eq!(metrics.events_dropped.get(&[("event", "inPassed")]), 1);
    assert_eq!(metrics.events_dropped.get(&[("event", "inRejected")]), 1);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn decisions_are_counted_by_class_and_reason() {
    let handlers = AccessControlHandlers::deny_all().inbound(AllowAll);
    let (system, engine, _rx) = boot(18008, handlers).await;
    let client = common::connect(&engine, "thyroid", true);
    let anon = common::connect(&engine, "anonymous", false);

    client.publish("definition/t3", "{}", false).await.unwrap();
    client.publish("sensors/x", "1", false).await.unwrap();
    anon.publish("hormone/x", "1", false).await.unwrap();

    let decisions = &system.metrics().decisions;
    let count = |class: &str, decision: &str, reason: &str| {
        decisions.get(&[("direction", "in"), ("class", class), ("decision", decision), ("reason", reason)])
    };
    assert_eq!(count("managed", "allow", "granted"), 1);
    assert_eq!(count("other", "reject", "denied"), 1);
    assert_eq!(count("none", "reject", "no_certificate"), 1);

    let rendered = system.metrics().render(&[]);
    assert!(rendered.contains("endocrine_decisions_total"));

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn departed_subscribers_get_no_forwards() {
    let handlers = AccessControlHandlers::deny_all().inbound(AllowAll).outbound(AllowAll);
    let (system, engine, mut rx) = boot(18009, handlers).await;
    let publisher = common::connect(&engine, "thyroid", true);

    for id in ["liver", "kidney", "heart"] {
        let subscriber = common::connect(&engine, id, true);
        subscriber.subscribe("hormone/#").await.unwrap();
    }
    assert_eq!(engine.connected_clients(), 1);

    assert_eq!(publisher.publish("hormone/x", "T4", false).await.unwrap(), Decision::Allow);

    let names: Vec<_> = audit_events(&mut rx).iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["inPassed"]);
    assert_eq!(system.stats().snapshot().messages_out, 0);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn decision_after_engine_gave_up_is_dropped_but_audited() {
    let (sink, mut rx) = ChannelSink::new();
    let metrics = Arc::new(BrokerMetrics::default());
    let gate = AuthorizationGate::new(
        AccessControlHandlers::deny_all().inbound(|_c: Arc<PeerCertificate>, _n: String| async {
            tokio::task::yield_now().await;
            Ok::<(), AccessDenied>(())
        }),
        Arc::new(sink),
        Arc::clone(&metrics),
        Arc::new(TrafficStats::default()),
    );
    let conn = Arc::new(common::connection("thyroid", true));

    let (done, waiting) = Completion::new();
    drop(waiting);
    gate.authorize_publish(conn, "hormone/x".into(), "T3".into(), done).await;

    let ev = rx.try_recv().unwrap();
    assert_eq!(ev.name(), "inPassed");
    assert_eq!(ev.audit_env().unwrap().topic, "hormone/x");
    assert_eq!(metrics.decisions.total(), 1);
}
