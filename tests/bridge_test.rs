mod common;

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use common::MemoryConnector;
use common::MemoryStore;
use common::SharedBuf;
use etcd_bridge::dispatch::Dispatcher;
use etcd_bridge::host::channel;
use etcd_bridge::host::channel::Completion;
use etcd_bridge::host::stdio::LineQueue;
use etcd_bridge::host::Status;
use etcd_bridge::registry::ConnectionRegistry;
use etcd_bridge::DispatchConfig;
use serde_json::json;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

async fn next(completions: &mut UnboundedReceiver<Completion>) -> Completion {
    timeout(Duration::from_secs(5), completions.recv())
        .await
        .expect("no completion within 5s")
        .expect("completion channel closed")
}

fn event_key(completion: &Completion) -> String {
    let v: Value = serde_json::from_slice(&completion.payload).unwrap();
    let key = v["Events"][0]["kv"]["key"].as_str().unwrap();
    String::from_utf8(STANDARD.decode(key).unwrap()).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_prefix_watch_delivers_matching_puts_in_order() {
    let store = MemoryStore::new();
    let registry = Arc::new(ConnectionRegistry::new(MemoryConnector::new(store.clone())));
    let dispatcher = Dispatcher::new(registry, Handle::current(), &DispatchConfig::default());
    let (submitter, mut queue, mut completions) = channel::channel();
    let dispatch_loop = tokio::task::spawn_blocking(move || dispatcher.run(&mut queue));

    submitter.submit(json!({"cmd": 0, "req": {"endpoints": ["mem://1"]}}).to_string());
    let connected = next(&mut completions).await;
    assert_eq!(connected.status, Status::Success);
    assert_eq!(connected.payload_str(), "1");

    submitter.submit(
        json!({"cmd": 2, "client": 1, "req": {"key": "app/", "is_prefix": true}}).to_string(),
    );
    let created = next(&mut completions).await;
    assert_eq!(created.payload_str(), "1");

    store.put("app/a", "1");
    store.put("other/x", "2");
    store.put("app/b", "3");

    let mut keys = Vec::new();
    for _ in 0..2 {
        submitter.submit(json!({"cmd": 3, "client": 1, "req": 1}).to_string());
        let completion = next(&mut completions).await;
        assert_eq!(completion.status, Status::Success);
        keys.push(event_key(&completion));
    }
    assert_eq!(keys, vec!["app/a", "app/b"]);

    submitter.submit(json!({"cmd": 1, "client": 1}).to_string());
    assert_eq!(next(&mut completions).await.status, Status::Success);
    assert_eq!(store.watcher_count(), 0);

    drop(submitter);
    dispatch_loop.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_new_connection_without_endpoints_fails() {
    let registry = Arc::new(ConnectionRegistry::new(MemoryConnector::new(MemoryStore::new())));
    let dispatcher = Dispatcher::new(registry.clone(), Handle::current(), &DispatchConfig::default());
    let (submitter, mut queue, mut completions) = channel::channel();
    let dispatch_loop = tokio::task::spawn_blocking(move || dispatcher.run(&mut queue));

    submitter.submit(json!({"cmd": 0, "req": {"endpoints": []}}).to_string());
    let completion = next(&mut completions).await;
    assert_eq!(completion.status, Status::Error);
    assert!(completion.payload_str().contains("no endpoints"));
    assert!(registry.is_empty());

    drop(submitter);
    dispatch_loop.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stdio_host_answers_inline_commands_in_order() {
    let input = concat!(
        "1 {\"cmd\":5,\"client\":1,\"req\":{}}\n",
        "\n",
        "2 {\"cmd\":3,\"client\":7,\"req\":1}\n",
        "3 {\"cmd\":9}\n",
    );
    let output = SharedBuf::default();
    let registry = Arc::new(ConnectionRegistry::new(MemoryConnector::new(MemoryStore::new())));
    let dispatcher = Dispatcher::new(registry, Handle::current(), &DispatchConfig::default());

    let writer = output.clone();
    tokio::task::spawn_blocking(move || {
        let mut queue = LineQueue::new(Cursor::new(input.as_bytes()), writer);
        dispatcher.run(&mut queue)
    })
    .await
    .unwrap()
    .unwrap();

    let lines: Vec<Value> = output
        .lines()
        .iter()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(
        lines,
        vec![
            json!({"id": 1, "status": 1, "payload": "unsupported command: KV_RANGE"}),
            json!({"id": 2, "status": 1, "payload": "invalid connection"}),
            json!({"id": 3, "status": 1, "payload": "unknown command 9"}),
        ]
    );
}
