//! Writers, version checks and optimistic updates across threads.

use std::sync::{Arc, Barrier};
use std::thread;

use serde_json::json;

use live_config::resilience::RetryPolicy;
use live_config::{Manager, MemorySource, Node};

mod common;

fn shared(document: &str, retry: RetryPolicy) -> Arc<Manager> {
    let source = MemorySource::new(document, "").unwrap();
    Arc::new(
        Manager::builder(Arc::new(source))
            .retry_policy(retry)
            .build()
            .unwrap(),
    )
}

#[test]
fn test_concurrent_inserts_are_serialized() {
    let m = Arc::new(common::manager(r#"{"events": []}"#));
    m.register_insert("/events", |_| Ok(())).unwrap();

    let workers: Vec<_> = (0..8)
        .map(|worker| {
            let m = Arc::clone(&m);
            thread::spawn(move || {
                for i in 0..25 {
                    m.insert("/events", 0, json!({"worker": worker, "seq": i})).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(m.get("/events").unwrap().as_array().unwrap().len(), 200);
    assert_eq!(m.version(), 201);
    let versions: Vec<i64> = m.history().unwrap().iter().map(|e| e.version).collect();
    assert_eq!(versions, (2..=201).collect::<Vec<_>>());
}

#[test]
fn test_compare_and_swap_has_one_winner() {
    let m = shared(r#"{"owner": "nobody"}"#, RetryPolicy::default());
    m.register_replace("/owner", |_| Ok(())).unwrap();
    let barrier = Arc::new(Barrier::new(8));

    let contenders: Vec<_> = (0..8)
        .map(|i| {
            let m = Arc::clone(&m);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                m.compare_and_swap("/owner", 1, format!("worker-{}", i))
            })
        })
        .collect();
    let results: Vec<_> = contenders.into_iter().map(|c| c.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        let conflict = err.conflict().expect("only conflicts expected");
        assert_eq!(conflict.expected_version, 1);
        assert_eq!(conflict.current_version, 2);
        assert!(matches!(conflict.current_value, Some(Node::String(_))));
    }
    assert_eq!(m.version(), 2);
}

#[test]
fn test_optimistic_increments_do_not_lose_updates() {
    let m = shared(r#"{"counter": 0}"#, RetryPolicy::immediate(10_000));
    m.register_replace("/counter", |_| Ok(())).unwrap();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let m = Arc::clone(&m);
            thread::spawn(move || {
                for _ in 0..25 {
                    m.optimistic_update("/counter", |current| Ok(Node::Integer(current.as_int()? + 1)))
                        .unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(m.get("/counter").unwrap(), Node::Integer(100));
    assert_eq!(m.version(), 101);
}

#[test]
fn test_readers_never_observe_partial_writes() {
    let m = Arc::new(common::manager(r#"{"pair": {"a": 0, "b": 0}}"#));
    m.register_replace("/pair", |_| Ok(())).unwrap();

    let writer = {
        let m = Arc::clone(&m);
        thread::spawn(move || {
            for i in 1..=200 {
                m.replace("/pair", json!({"a": i, "b": i})).unwrap();
            }
        })
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let m = Arc::clone(&m);
            thread::spawn(move || {
                for _ in 0..200 {
                    let (version, pair) = m.read_versioned("/pair").unwrap();
                    assert_eq!(pair.at("a").unwrap(), pair.at("b").unwrap());
                    assert_eq!(pair.at("a").unwrap().as_int().unwrap(), version - 1);
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(m.version(), 201);
}
