//! End-to-end lifecycle tests.
//!
//! Drive the poller against an in-memory queue and a real PKI tree in a
//! temporary directory.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use ork_core::OrkConfig;
use ork_keys::{KeyState, PkiKeyStore};
use ork_poller::{Poller, PollerError, run_with};
use ork_queue::{MemoryQueue, MessageQueue};
use tokio::sync::watch;

const TERMINATE_I123: &str =
    r#"{"Message": "{\"Event\":\"autoscaling:EC2_INSTANCE_TERMINATE\",\"EC2InstanceId\":\"i-123\"}"}"#;
const TEST_NOTIFICATION: &str = r#"{"Message": "{\"Event\":\"autoscaling:TEST_NOTIFICATION\"}"}"#;

fn launch(id: &str) -> String {
    let inner = serde_json::json!({
        "Event": "autoscaling:EC2_INSTANCE_LAUNCH",
        "EC2InstanceId": id,
    });
    serde_json::json!({ "Message": inner.to_string() }).to_string()
}

fn test_config(pki: &tempfile::TempDir) -> OrkConfig {
    OrkConfig {
        sqs_region: "us-west-2".to_string(),
        queue_name: "Q".to_string(),
        poll_pause: 0,
        delete_unknown_messages: true,
        pki_dir: pki.path().to_path_buf(),
        ..OrkConfig::default()
    }
}

fn write_key(store: &PkiKeyStore, state: KeyState, id: &str) {
    let path = store.key_path(state, id);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, "-----BEGIN PUBLIC KEY-----").unwrap();
}

fn setup(pki: &tempfile::TempDir) -> (Arc<MemoryQueue>, Arc<PkiKeyStore>, Poller) {
    let queue = Arc::new(MemoryQueue::new());
    let keys = Arc::new(PkiKeyStore::new(pki.path()));
    let poller = Poller::new(queue.clone(), keys.clone(), &test_config(pki));
    (queue, keys, poller)
}

#[tokio::test]
async fn terminate_revokes_key_and_deletes_message() {
    let pki = tempfile::tempdir().unwrap();
    let (queue, keys, poller) = setup(&pki);
    write_key(&keys, KeyState::Accepted, "i-123");
    let receipt = queue.push(TERMINATE_I123);

    let report = poller.poll_once().await;

    assert!(report.mutated);
    assert_eq!(keys.state_of("i-123").unwrap(), None);
    assert_eq!(queue.deleted(), vec![receipt]);
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_notification_deleted_without_key_action() {
    let pki = tempfile::tempdir().unwrap();
    let (queue, keys, poller) = setup(&pki);
    write_key(&keys, KeyState::Accepted, "i-123");
    queue.push(TEST_NOTIFICATION);

    let report = poller.poll_once().await;

    assert!(!report.mutated);
    assert_eq!(report.deleted, 1);
    assert_eq!(keys.state_of("i-123").unwrap(), Some(KeyState::Accepted));
    assert!(queue.is_empty());
}

#[tokio::test]
async fn launch_waits_for_pending_key() {
    let pki = tempfile::tempdir().unwrap();
    let (queue, keys, poller) = setup(&pki);
    let receipt = queue.push(launch("i-777"));

    // The minion has not submitted its key yet.
    let first = poller.poll_once().await;
    assert!(!first.mutated);
    assert_eq!(first.retained, 1);
    assert!(queue.contains(&receipt));

    // Key shows up; the redelivered message is now handled.
    write_key(&keys, KeyState::Pending, "i-777");
    let second = poller.poll_once().await;
    assert!(second.mutated);
    assert_eq!(keys.state_of("i-777").unwrap(), Some(KeyState::Accepted));
    assert!(queue.is_empty());
}

#[tokio::test]
async fn unparsable_messages_follow_policy() {
    let pki = tempfile::tempdir().unwrap();

    let queue = Arc::new(MemoryQueue::new());
    queue.push("{{{ garbage");
    let strict = OrkConfig {
        delete_unknown_messages: false,
        ..test_config(&pki)
    };
    let poller = Poller::new(queue.clone(), Arc::new(PkiKeyStore::new(pki.path())), &strict);
    poller.poll_once().await;
    assert_eq!(queue.len(), 1);

    let lenient = test_config(&pki);
    let poller = Poller::new(queue.clone(), Arc::new(PkiKeyStore::new(pki.path())), &lenient);
    poller.poll_once().await;
    assert!(queue.is_empty());
}

#[tokio::test]
async fn deleting_twice_is_not_an_error() {
    let queue = MemoryQueue::new();
    queue.push(TEST_NOTIFICATION);
    let message = queue.receive(10, Duration::ZERO).await.unwrap().remove(0);

    queue.delete(&message).await.unwrap();
    queue.delete(&message).await.unwrap();
}

#[tokio::test]
async fn unreachable_queue_fails_before_loop() {
    let pki = tempfile::tempdir().unwrap();
    let (_tx, rx) = watch::channel(false);

    let result = run_with(test_config(&pki), true, |_, _| async { None }, rx).await;

    match result {
        Err(PollerError::Connect { region, queue }) => {
            assert_eq!(region, "us-west-2");
            assert_eq!(queue, "Q");
        }
        other => panic!("expected connect error, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_processes_until_shutdown() {
    let pki = tempfile::tempdir().unwrap();
    let keys = PkiKeyStore::new(pki.path());
    write_key(&keys, KeyState::Accepted, "i-123");

    let queue = Arc::new(MemoryQueue::new());
    queue.push(TERMINATE_I123);

    let (tx, rx) = watch::channel(false);
    let connected = queue.clone();
    let config = test_config(&pki);
    let handle = tokio::spawn(async move {
        run_with(
            config,
            false,
            move |_, _| async move { Some(connected as Arc<dyn MessageQueue>) },
            rx,
        )
        .await
    });

    tokio::time::timeout(Duration::from_secs(5), async {
        while !queue.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("message should be handled");

    tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(keys.state_of("i-123").unwrap(), None);
    assert!(!queue.was_purged());
}

#[tokio::test]
async fn purge_on_start_clears_backlog() {
    let pki = tempfile::tempdir().unwrap();
    let queue = Arc::new(MemoryQueue::new());
    queue.push(launch("i-1"));

    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    let connected = queue.clone();
    run_with(
        test_config(&pki),
        true,
        move |_, _| async move { Some(connected as Arc<dyn MessageQueue>) },
        rx,
    )
    .await
    .unwrap();

    assert!(queue.was_purged());
    assert!(queue.is_empty());
}
