// tests/swap_atomicity.rs

mod common;
use crate::common::*;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use policywatch::engine::{spawn_swap_consumer, EvaluatorSlot, Publisher};
use policywatch::pipeline::evaluate_record;
use policywatch::policy::{CompiledPredicate, CompiledRule, Priority, Record, RuleSet};
use policywatch::types::EngineMode;

/// Every rule of generation `n` is named `g{n}_r{i}` and matches any record
/// with a `proc.name`.
fn generation_set(generation: u64, rule_count: usize) -> Arc<RuleSet> {
    let rules = (0..rule_count)
        .map(|i| CompiledRule {
            name: format!("g{generation}_r{i}"),
            desc: None,
            priority: Priority::Low,
            tags: vec![],
            enabled: true,
            condition: vec![CompiledPredicate::Exists { field: "proc.name".into() }],
        })
        .collect();
    Arc::new(RuleSet::new(EngineMode::Alert, rules, vec![]).with_generation(generation))
}

#[test]
fn records_never_straddle_two_generations() {
    init_tracing();
    const GENERATIONS: u64 = 200;
    const RULES: usize = 8;

    let slot = Arc::new(EvaluatorSlot::new());
    slot.adopt(generation_set(1, RULES));
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let slot = Arc::clone(&slot);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let record = Record::new().with("proc.name", "bash");
                let mut last_seen = 0;
                while !done.load(Ordering::Acquire) {
                    let result = evaluate_record(&slot, record.clone()).expect("slot is never empty");
                    assert!(result.generation >= last_seen, "generation went backwards");
                    last_seen = result.generation;

                    assert_eq!(result.rules.len(), RULES);
                    let prefix = format!("g{}_", result.generation);
                    assert!(
                        result.rules.iter().all(|m| m.rule.starts_with(&prefix)),
                        "record evaluated under mixed generations: {:?}",
                        result.rules
                    );
                }
            })
        })
        .collect();

    for generation in 2..=GENERATIONS {
        assert!(slot.adopt(generation_set(generation, RULES)));
        thread::yield_now();
    }
    done.store(true, Ordering::Release);

    for reader in readers {
        reader.join().expect("reader panicked");
    }
    assert_eq!(slot.generation(), Some(GENERATIONS));
}

#[tokio::test]
async fn consumer_ignores_stale_generations() {
    init_tracing();
    let slot = Arc::new(EvaluatorSlot::new());
    let (publisher, rx) = Publisher::new(4);
    let consumer = spawn_swap_consumer(rx, Arc::clone(&slot));

    publisher.publish(generation_set(2, 1)).unwrap();
    publisher.publish(generation_set(1, 1)).unwrap();
    publisher.publish(generation_set(3, 1)).unwrap();
    drop(publisher);

    with_timeout(consumer).await.unwrap();
    assert_eq!(slot.generation(), Some(3));
}
