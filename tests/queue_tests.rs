//! Queue client integration tests
//!
//! Exercise enqueue/dequeue/acknowledge against the in-process store:
//! - payload round trip through range
//! - ordering and count of group reads
//! - blocking reads
//! - acknowledge + delete, orphaned history, max length

use std::time::{Duration, Instant};

use stream_queue::{
    fields, EntryId, Fields, LogStore, MemoryLogStore, QueueClient, QueueConfig, QueueOptions,
    ReadCursor,
};

fn task(n: usize) -> Fields {
    fields([("task", n.to_string())])
}

fn client_on(store: &MemoryLogStore) -> QueueClient<MemoryLogStore> {
    let config = QueueConfig::new("balltube", "127.0.0.1:6379").expect("valid config");
    QueueClient::with_store(config, store.clone()).expect("Failed to create client")
}

#[test]
fn test_enqueue_then_range_returns_payload() {
    let store = MemoryLogStore::new();
    let queue = client_on(&store);

    let id = queue.enqueue(&task(7)).expect("Failed to enqueue");
    let entry = queue.get(id).unwrap().expect("entry should exist");

    assert_eq!(entry.id, id);
    assert_eq!(entry.field("task"), Some("7"));
    assert_eq!(queue.range(id, id, None).unwrap().len(), 1);
}

#[test]
fn test_enqueued_tasks_are_not_pending() {
    let store = MemoryLogStore::new();
    let queue = client_on(&store);

    queue.enqueue(&task(1)).unwrap();
    assert!(queue.pending().summary().unwrap().is_empty());
}

#[test]
fn test_dequeue_returns_oldest_first() {
    let store = MemoryLogStore::new();
    let queue = client_on(&store);

    let ids: Vec<EntryId> = (0..10).map(|n| queue.enqueue(&task(n)).unwrap()).collect();

    let batch = queue.dequeue(ReadCursor::New, None, 4).unwrap();
    assert_eq!(batch.len(), 4);
    assert_eq!(batch.iter().map(|e| e.id).collect::<Vec<_>>(), ids[..4]);
    assert_eq!(batch[0].field("task"), Some("0"));

    // The next read continues where the group cursor stopped
    let next = queue.dequeue(ReadCursor::New, None, 100).unwrap();
    assert_eq!(next.len(), 6);
    assert_eq!(next[0].id, ids[4]);

    let summary = queue.pending().summary().unwrap();
    assert_eq!(summary.count, 10);
    assert_eq!(summary.min_id, Some(ids[0]));
    assert_eq!(summary.max_id, Some(ids[9]));
    assert_eq!(summary.count_for("balltube"), 10);
}

#[test]
fn test_blocking_dequeue_waits_for_timeout() {
    let store = MemoryLogStore::new();
    let queue = client_on(&store);

    let block = Duration::from_millis(150);
    let started = Instant::now();
    let batch = queue.dequeue(ReadCursor::New, Some(block), 1).unwrap();

    assert!(batch.is_empty());
    assert!(started.elapsed() >= block);
}

#[test]
fn test_blocking_dequeue_returns_task_from_other_thread() {
    let store = MemoryLogStore::new();
    let queue = client_on(&store);
    let producer = client_on(&store);

    let handle = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        producer.enqueue(&task(1)).unwrap()
    });

    let batch = queue
        .dequeue(ReadCursor::New, Some(Duration::from_secs(5)), 1)
        .unwrap();
    let id = handle.join().unwrap();

    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].id, id);
}

#[test]
fn test_acknowledge_and_delete_removes_everywhere() {
    let store = MemoryLogStore::new();
    let queue = client_on(&store);

    queue.enqueue(&task(1)).unwrap();
    let batch = queue.dequeue(ReadCursor::New, None, 1).unwrap();
    let id = batch[0].id;

    let removal = queue.acknowledge_and_delete(&[id]).unwrap();
    assert_eq!(removal.acknowledged, 1);
    assert_eq!(removal.deleted, 1);

    assert!(queue.get(id).unwrap().is_none());
    assert_eq!(queue.pending().summary().unwrap().count, 0);
    assert!(queue.dequeue(ReadCursor::history(), None, 10).unwrap().is_empty());
}

#[test]
fn test_acknowledge_keeps_entry_in_log() {
    let store = MemoryLogStore::new();
    let queue = client_on(&store);

    let id = queue.enqueue(&task(1)).unwrap();
    queue.dequeue(ReadCursor::New, None, 1).unwrap();

    assert_eq!(queue.acknowledge(&[id]).unwrap(), 1);
    assert_eq!(queue.pending().summary().unwrap().count, 0);
    assert!(queue.get(id).unwrap().is_some());
}

#[test]
fn test_history_dequeue_does_not_remove() {
    let store = MemoryLogStore::new();
    let queue = client_on(&store);

    for n in 0..3 {
        queue.enqueue(&task(n)).unwrap();
    }
    queue.dequeue(ReadCursor::New, None, 3).unwrap();

    let first = queue.dequeue(ReadCursor::history(), None, 10).unwrap();
    let second = queue.dequeue(ReadCursor::history(), None, 10).unwrap();
    assert_eq!(first.len(), 3);
    assert_eq!(first, second);

    // Strictly after the given id
    let tail = queue.dequeue(ReadCursor::After(first[0].id), None, 10).unwrap();
    assert_eq!(tail.len(), 2);
    assert_eq!(tail[0].id, first[1].id);
}

#[test]
fn test_history_skips_and_acknowledges_orphans() {
    let store = MemoryLogStore::new();
    let queue = client_on(&store);

    for n in 0..4 {
        queue.enqueue(&task(n)).unwrap();
    }
    let batch = queue.dequeue(ReadCursor::New, None, 4).unwrap();

    // Payloads of the first two disappear while still pending
    store
        .delete("balltube", &[batch[0].id, batch[1].id])
        .unwrap();

    let history = queue.dequeue(ReadCursor::history(), None, 2).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, batch[2].id);
    assert_eq!(queue.pending().summary().unwrap().count, 2);
}

#[test]
fn test_consumers_of_one_group_share_work() {
    let store = MemoryLogStore::new();
    let a = client_on(&store);
    let config = a.config().with_consumer("worker-b");
    let b = QueueClient::with_store(config, store.clone()).unwrap();

    for n in 0..4 {
        a.enqueue(&task(n)).unwrap();
    }

    let from_a = a.dequeue(ReadCursor::New, None, 2).unwrap();
    let from_b = b.dequeue(ReadCursor::New, None, 10).unwrap();
    assert_eq!(from_a.len(), 2);
    assert_eq!(from_b.len(), 2);
    assert!(from_a.iter().all(|e| !from_b.contains(e)));

    let summary = a.pending().summary().unwrap();
    assert_eq!(summary.count_for("balltube"), 2);
    assert_eq!(summary.count_for("worker-b"), 2);
}

#[test]
fn test_separate_groups_each_see_every_task() {
    let store = MemoryLogStore::new();
    let first = client_on(&store);
    let config = first.config().with_group("audit");
    let second = QueueClient::with_store(config, store.clone()).unwrap();

    for n in 0..3 {
        first.enqueue(&task(n)).unwrap();
    }

    assert_eq!(first.dequeue(ReadCursor::New, None, 10).unwrap().len(), 3);
    assert_eq!(second.dequeue(ReadCursor::New, None, 10).unwrap().len(), 3);
}

#[test]
fn test_max_length_trims_oldest() {
    let store = MemoryLogStore::new();
    let config = QueueOptions::new()
        .stream("bounded")
        .server("127.0.0.1:6379")
        .max_length(3)
        .build()
        .unwrap();
    let queue = QueueClient::with_store(config, store.clone()).unwrap();

    let ids: Vec<EntryId> = (0..5).map(|n| queue.enqueue(&task(n)).unwrap()).collect();

    assert_eq!(store.stream_len("bounded"), 3);
    assert!(queue.get(ids[0]).unwrap().is_none());
    assert!(queue.get(ids[4]).unwrap().is_some());
}

#[test]
fn test_destroy_stream() {
    let store = MemoryLogStore::new();
    let queue = client_on(&store);

    queue.enqueue(&task(1)).unwrap();
    queue.destroy_stream().unwrap();

    assert_eq!(store.stream_len("balltube"), 0);
    assert!(queue.dequeue(ReadCursor::New, None, 1).is_err());
}

#[test]
fn test_dequeue_count_zero_reads_one() {
    let store = MemoryLogStore::new();
    let queue = client_on(&store);
    queue.enqueue(&task(1)).unwrap();

    let started = Instant::now();
    let batch = queue
        .dequeue(ReadCursor::New, Some(Duration::from_secs(5)), 0)
        .unwrap();

    assert_eq!(batch.len(), 1);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_dequeue_with_unbounded_block() {
    let store = MemoryLogStore::new();
    let queue = client_on(&store);
    queue.enqueue(&task(1)).unwrap();

    let batch = queue
        .dequeue(ReadCursor::New, Some(Duration::MAX), 1)
        .unwrap();
    assert_eq!(batch.len(), 1);
}
