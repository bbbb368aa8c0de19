// Concurrent Access Tests for DeepDB
// Two independent opens of the same file contend through advisory
// locks, exactly as two processes would.

use deepdb::{Db, LockMode, Options, Value};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn contended_options() -> Options {
    Options::new().locking(true).autoflush(true)
}

/// A writer blocked on the exclusive lock proceeds once the holder
/// releases, and both sides observe each other's writes.
#[test]
fn test_exclusive_lock_contention() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shared.db");

    let a = Db::open(&path, contended_options()).unwrap();
    let b = Db::open(&path, contended_options()).unwrap();

    a.lock(LockMode::Exclusive).unwrap();
    a.put("from_a", "hi").unwrap();

    let writer = thread::spawn(move || {
        // Blocks until `a` releases the exclusive lock.
        b.put("from_b", "hello").unwrap();
        b
    });

    // Give the other handle time to block on the lock.
    thread::sleep(Duration::from_millis(200));
    a.unlock();

    let b = writer.join().unwrap();
    assert_eq!(b.get("from_a").unwrap(), Some(Value::from("hi")));
    assert_eq!(a.get("from_b").unwrap(), Some(Value::from("hello")));
}

/// The advisory lock is reentrant per handle: nested lock calls only
/// deepen a counter, and writes under an outer lock still work.
#[test]
fn test_reentrant_locking() {
    let dir = TempDir::new().unwrap();
    let db = Db::open(dir.path().join("reent.db"), contended_options()).unwrap();

    db.lock(LockMode::Exclusive).unwrap();
    db.lock(LockMode::Exclusive).unwrap();
    db.put("k", "v").unwrap();
    db.unlock();
    db.unlock();

    assert_eq!(db.get("k").unwrap(), Some(Value::from("v")));
}

/// One handle compacts while another writes: the writer blocks for the
/// duration of the rebuild, then its write is observable on its own
/// file handle.
#[test]
fn test_write_during_optimize() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("contended.db");

    let writer = Db::open(&path, contended_options()).unwrap();

    let compactor = thread::spawn({
        let path = path.clone();
        move || {
            let db = Db::open(&path, contended_options()).unwrap();
            for i in 0..1000 {
                db.put(format!("key{}", i), format!("value{}", i)).unwrap();
            }
            for i in 0..500 {
                db.delete(format!("key{}", i)).unwrap();
            }
            db.optimize().unwrap();
            db
        }
    });

    // Contends with the compactor's exclusive lock; lands either before
    // the rebuild starts or after it finishes.
    writer.put("parentfork", "hello").unwrap();
    assert_eq!(writer.get("parentfork").unwrap(), Some(Value::from("hello")));

    let db = compactor.join().unwrap();
    assert_eq!(db.get("key999").unwrap(), Some(Value::from("value999")));
    assert_eq!(db.get("key0").unwrap(), None);
}

/// Volatile mode refreshes the end-of-file offset so a handle notices
/// appends made through another handle without taking OS locks.
#[test]
fn test_volatile_end_refresh() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("volatile.db");

    let a = Db::open(&path, Options::new().volatile(true)).unwrap();
    let b = Db::open(&path, Options::new().volatile(true)).unwrap();

    a.put("written_by_a", "1").unwrap();
    assert_eq!(b.get("written_by_a").unwrap(), Some(Value::from("1")));
}

/// Many threads hammer one shared handle; the Root serializes them.
#[test]
fn test_shared_handle_across_threads() {
    let dir = TempDir::new().unwrap();
    let db = Db::open(dir.path().join("threads.db"), Options::default()).unwrap();

    let mut handles = vec![];
    for thread_id in 0..8 {
        let db = db.clone();
        handles.push(thread::spawn(move || {
            for i in 0..50 {
                let key = format!("t{}_{}", thread_id, i);
                db.put(&key, format!("v{}", i)).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for thread_id in 0..8 {
        for i in 0..50 {
            let key = format!("t{}_{}", thread_id, i);
            assert_eq!(
                db.get(&key).unwrap(),
                Some(Value::from(format!("v{}", i)))
            );
        }
    }
}
