//! End-to-end behaviour of JSON roots on a real filesystem.

use std::collections::BTreeMap;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use keepsake_persist::json::{JsonStore, open_list, open_map};
use keepsake_persist::{ContainerConfig, LockedAccess, PersistentData, PersistentMap};

const PATIENCE: Duration = Duration::from_secs(5);

fn manual() -> ContainerConfig {
    ContainerConfig {
        background_writer: false,
        flush_on_drop: false,
        ..ContainerConfig::default()
    }
}

fn read_map(path: &Path) -> BTreeMap<String, i64> {
    JsonStore::new(path).config(manual()).map().unwrap().to_map()
}

fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + PATIENCE;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    check()
}

#[test]
fn background_writer_persists_puts() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("scores.json");
    let scores: PersistentMap<String, i64> = open_map(&path).unwrap();
    scores.insert("a".into(), 1);
    scores.insert("b".into(), 2);
    assert!(scores.wait_for_flush(PATIENCE));

    let reopened = read_map(&path);
    assert_eq!(reopened, BTreeMap::from([("a".into(), 1), ("b".into(), 2)]));
}

#[test]
fn removing_absent_key_never_creates_file() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("scores.json");
    let scores: PersistentMap<String, i64> = open_map(&path).unwrap();
    assert_eq!(scores.remove("ghost"), None);
    assert!(!scores.is_dirty());
    assert!(scores.wait_for_flush(Duration::from_millis(50)));
    assert!(!path.exists());
}

#[test]
fn failed_write_stays_dirty_until_flushed() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("data");
    let parked = tmp.path().join("parked");
    let path = data.join("scores.json");

    let scores: PersistentMap<String, i64> = open_map(&path).unwrap();
    scores.insert("a".into(), 1);
    assert!(scores.wait_for_flush(PATIENCE));

    std::fs::rename(&data, &parked).unwrap();
    std::fs::write(&data, "not a directory").unwrap();

    scores.insert("b".into(), 2);
    assert!(eventually(|| scores.stats().failures >= 1));
    assert!(scores.is_dirty());

    std::fs::remove_file(&data).unwrap();
    std::fs::rename(&parked, &data).unwrap();
    assert_eq!(read_map(&path), BTreeMap::from([("a".into(), 1)]));

    assert!(scores.flush().unwrap());
    assert!(!scores.is_dirty());
    assert_eq!(
        read_map(&path),
        BTreeMap::from([("a".into(), 1), ("b".into(), 2)])
    );
}

#[test]
fn concurrent_merges_are_not_lost() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("counter.json");
    let counts: PersistentMap<String, i64> = open_map(&path).unwrap();

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let counts = counts.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    counts.merge("n".into(), 1, |a, b| Some(a + b));
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(counts.get("n"), Some(800));
    assert!(counts.wait_for_flush(PATIENCE));
    assert_eq!(read_map(&path).get("n"), Some(&800));
}

#[test]
fn key_views_share_the_map() {
    let tmp = tempfile::tempdir().unwrap();
    let scores: PersistentMap<String, i64> =
        JsonStore::new(tmp.path().join("scores.json")).config(manual()).map().unwrap();
    scores.extend([("a".into(), 1), ("b".into(), 2)]);

    let first = scores.keys();
    let second = scores.keys();
    assert!(first.remove("a"));
    assert!(!second.contains("a"));
    assert_eq!(second.len(), 1);
    assert_eq!(scores.to_map(), BTreeMap::from([("b".into(), 2)]));
}

#[test]
fn reload_after_flush_keeps_state() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("queue.json");
    let queue = JsonStore::new(&path).config(manual()).list::<String>().unwrap();
    queue.push("x".into());
    queue.push("y".into());
    assert!(queue.flush().unwrap());

    queue.reload().unwrap();
    assert_eq!(queue.to_vec(), vec!["x", "y"]);
    assert!(!queue.is_dirty());
}

#[test]
fn reload_picks_up_external_edits() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("queue.json");
    let queue = JsonStore::new(&path).config(manual()).list::<u32>().unwrap();
    let tail = queue.sub_list(0, 0).unwrap();
    std::fs::write(&path, "[4, 5, 6]").unwrap();

    queue.reload().unwrap();
    assert_eq!(queue.to_vec(), vec![4, 5, 6]);
    // Views resolve through the root, so existing handles see the new state.
    assert_eq!(queue.read_locked(|v| v.len()), 3);
    assert!(tail.is_empty());
}

#[test]
fn dropping_last_handle_flushes_pending_changes() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("log.json");
    {
        let log = JsonStore::new(&path)
            .config(ContainerConfig {
                background_writer: false,
                ..ContainerConfig::default()
            })
            .compact()
            .list::<u8>()
            .unwrap();
        let view = log.clone();
        drop(log);
        view.push(1);
        view.push(2);
    }
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "[1,2]");
}

#[test]
fn corrupt_document_fails_open() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("broken.json");
    std::fs::write(&path, "{\"a\": ").unwrap();
    let err = open_list::<u8>(&path).unwrap_err();
    assert!(err.to_string().contains("broken.json"));
}
