#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::sync::Arc;

use endocrine_broker::access::{AccessControlHandlers, AccessDenied, AllowAll};
use endocrine_broker::arbiter::Decision;
use endocrine_broker::engine::MemoryEngineFactory;
use endocrine_broker::{EndocrineSystem, SystemOptions};
use endocrine_core::PeerCertificate;

const PORT: u16 = 18201;

async fn only_thyroxine(_cert: Arc<PeerCertificate>, name: String) -> Result<(), AccessDenied> {
    if name == "thyroxine" {
        Ok(())
    } else {
        Err(AccessDenied::new(format!("{name} is not forwarded")))
    }
}

fn handlers() -> AccessControlHandlers {
    AccessControlHandlers::deny_all().inbound(AllowAll).outbound(only_thyroxine)
}

async fn publish_retained_then_stop(factory: &MemoryEngineFactory, backend: &str, topic: &str) {
    let options = SystemOptions::new(common::system_config(PORT, "ca.crt", backend, 0)).with_access_control(handlers());
    let first = EndocrineSystem::start(options, factory).unwrap();
    first.ready().await.unwrap();

    let engine = factory.engine(PORT).unwrap();
    let client = common::connect(&engine, "thyroid", true);
    assert_eq!(client.publish(topic, "42", true).await.unwrap(), Decision::Allow);

    first.shutdown().await.unwrap();
    assert!(engine.is_closed());
}

#[tokio::test]
async fn retained_message_survives_restart_when_forward_allowed() {
    let factory = MemoryEngineFactory::new();
    publish_retained_then_stop(&factory, "memory://restart-allow", "hormone/thyroxine").await;

    let options = SystemOptions::new(common::system_config(PORT, "ca.crt", "memory://restart-allow", 0))
        .with_access_control(handlers());
    let second = EndocrineSystem::start(options, &factory).unwrap();
    second.ready().await.unwrap();

    let engine = factory.engine(PORT).unwrap();
    let mut subscriber = common::connect(&engine, "liver", true);
    subscriber.subscribe("hormone/#").await.unwrap();

    let delivery = subscriber.try_recv().expect("retained message replayed");
    assert_eq!(delivery.topic, "hormone/thyroxine");
    assert_eq!(&delivery.payload[..], b"42");
    assert!(delivery.retain);

    second.shutdown().await.unwrap();
}

#[tokio::test]
async fn retained_message_withheld_after_restart_when_forward_rejected() {
    let factory = MemoryEngineFactory::new();
    publish_retained_then_stop(&factory, "memory://restart-reject", "hormone/cortisol").await;

    let options = SystemOptions::new(common::system_config(PORT, "ca.crt", "memory://restart-reject", 0))
        .with_access_control(handlers());
    let second = EndocrineSystem::start(options, &factory).unwrap();
    second.ready().await.unwrap();

    let engine = factory.engine(PORT).unwrap();
    assert_eq!(engine.store().retained_count(), 1);

    let mut subscriber = common::connect(&engine, "liver", true);
    subscriber.subscribe("hormone/#").await.unwrap();
    assert!(subscriber.try_recv().is_none());

    second.shutdown().await.unwrap();
}
