// tests/publisher_backpressure.rs

mod common;
use crate::common::*;

use std::sync::Arc;

use policywatch::engine::Publisher;
use policywatch::errors::PolicyWatchError;
use policywatch::policy::RuleSet;
use policywatch::types::EngineMode;

fn rules(generation: u64) -> Arc<RuleSet> {
    Arc::new(RuleSet::new(EngineMode::Alert, vec![], vec![]).with_generation(generation))
}

#[tokio::test]
async fn full_queue_drops_the_newest_set_and_keeps_the_rest() {
    init_tracing();
    let (publisher, mut rx) = Publisher::new(2);

    publisher.publish(rules(1)).unwrap();
    publisher.publish(rules(2)).unwrap();

    let err = publisher.publish(rules(3)).unwrap_err();
    assert!(matches!(
        err,
        PolicyWatchError::PublishBackpressure { generation: 3, capacity: 2 }
    ));

    assert_eq!(rx.recv().await.unwrap().generation(), 1);
    assert_eq!(rx.recv().await.unwrap().generation(), 2);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn stalled_consumer_does_not_stop_the_monitor() {
    init_tracing();
    let config = MonitorConfigBuilder::new(POLICIES).queue_capacity(1).build();
    let mut h = Harness::with_config(policies_fs(&[("a.yaml", rule_yaml("alpha"))]), config);
    h.monitor.start().unwrap();

    h.touch("a.yaml");
    eventually("first compile", || h.gateway.last_generation() == 1).await;

    // Nobody reads the queue; the second set is compiled, then dropped.
    h.fs.add_file(policy_path("a.yaml"), rule_yaml("alpha_v2"));
    h.touch("a.yaml");
    eventually("second compile", || h.gateway.last_generation() == 2).await;
    settle().await;

    assert_eq!(h.rx.recv().await.unwrap().generation(), 1);
    assert!(h.rx.try_recv().is_err());

    // The loop is still alive and publishes into the freed slot.
    h.fs.add_file(policy_path("a.yaml"), rule_yaml("alpha_v3"));
    h.touch("a.yaml");
    h.expect_generation(3).await;
}

#[tokio::test]
async fn closed_consumer_is_reported_per_publish() {
    init_tracing();
    let (publisher, rx) = Publisher::new(1);
    drop(rx);

    let err = publisher.publish(rules(7)).unwrap_err();
    assert!(matches!(err, PolicyWatchError::PublisherClosed { generation: 7 }));
}
