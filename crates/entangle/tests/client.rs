//! End-to-end behavior of a client against a scripted server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use entangle::owner::{incoming_serial, I_HAVE, YOU_HAVE};
use entangle::{
    Client, ClientConfig, EntityHandle, Filter, FilterOptions, Operation, ResponseError,
    SyncEvent, WireMessage,
};
use entangle_testkit::fixtures::{memory_server, owned_doc, owner, test_registry, widget};
use entangle_testkit::TestServer;
use parking_lot::Mutex;
use serde_json::{json, Value};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn connected(config: ClientConfig) -> (Client, TestServer) {
    init_tracing();
    let (connector, mut server) = memory_server();
    let client = Client::connect(config, test_registry(), connector).unwrap();
    server.accept().await;
    client.wait_open().await.unwrap();
    (client, server)
}

/// Round-trip a request so every frame sent before it has been processed.
async fn flush(client: &Client, server: &mut TestServer) {
    let pending = client.manager().request(WireMessage::new("Flush")).unwrap();
    loop {
        let received = server.recv().await;
        if received.message.sync_type() == Some("Flush") {
            server.acknowledge(received.seq, "Flush");
            break;
        }
    }
    pending.await.unwrap();
}

fn counter(client: &Client, sync_type: &str, event: SyncEvent) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&count);
    client
        .subscribe_type(sync_type, event, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    count
}

fn find_widget(client: &Client, id: i64) -> Option<EntityHandle> {
    client.find("Widget", &[&json!(id)])
}

#[tokio::test]
async fn test_identity_and_replay() {
    let (client, mut server) = connected(ClientConfig::new("memory://it")).await;
    let syncs = counter(&client, "Widget", SyncEvent::Sync);

    server.send(&widget(1, "red"));
    flush(&client, &mut server).await;
    let first = find_widget(&client, 1).unwrap();
    let before = first.read().attributes().clone();

    server.send(&widget(1, "red"));
    flush(&client, &mut server).await;
    let second = find_widget(&client, 1).unwrap();

    assert!(first.ptr_eq(&second));
    assert_eq!(second.read().attributes(), &before);
    assert!(second.read().sync_modified().is_empty());
    assert_eq!(syncs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_category_changes_are_minimal() {
    let (client, mut server) = connected(ClientConfig::new("memory://it")).await;
    let log = Arc::new(Mutex::new(Vec::new()));
    let (adds, removes) = (Arc::clone(&log), Arc::clone(&log));
    let _filter = Filter::new(
        &client.class("Widget").unwrap(),
        FilterOptions::new(),
        |w| w.get("color"),
        move |_, color: &Value| adds.lock().push(format!("add {color}")),
        move |_, color: &Value| removes.lock().push(format!("remove {color}")),
    );

    for color in ["red", "red", "blue", "blue"] {
        server.send(&widget(1, color));
    }
    flush(&client, &mut server).await;

    assert_eq!(
        log.lock().as_slice(),
        &[r#"add "red""#, r#"remove "red""#, r#"add "blue""#]
    );
}

#[tokio::test]
async fn test_conflicting_update_breaks_transition_once() {
    let (client, mut server) = connected(ClientConfig::new("memory://it")).await;
    server.send(&widget(1, "red"));
    flush(&client, &mut server).await;
    let entity = find_widget(&client, 1).unwrap();
    let broken = counter(&client, "Widget", SyncEvent::BrokenTransition);

    entity.set("color", json!("blue"));
    let promise = client.transition(&entity, None).unwrap();
    let sent = server.expect("Widget").await;
    assert_eq!(sent.message.operation(), "transition");
    assert_eq!(sent.message.get("color"), Some(&json!("blue")));

    server.send(&widget(1, "green").with("size", json!(3)));
    server.send(&widget(1, "yellow"));
    flush(&client, &mut server).await;

    assert_eq!(broken.load(Ordering::SeqCst), 1);
    assert_eq!(entity.get("color"), Some(json!("yellow")));
    assert!(entity.read().transition().is_none());

    // Broken before the server got round to answering; the later rejection
    // changes nothing.
    server.reject(sent.seq, widget(1, "yellow"));
    match promise.await {
        Err(ResponseError::BrokenTransition(stale)) => {
            assert_eq!(Some(stale), sent.message.transition_id());
        }
        other => panic!("expected a broken transition, got {other:?}"),
    }
    assert_eq!(broken.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_override_without_attribute_rolls_back() {
    let (client, mut server) = connected(ClientConfig::new("memory://it")).await;
    server.send(&widget(1, "red").with("size", json!(1)));
    flush(&client, &mut server).await;
    let entity = find_widget(&client, 1).unwrap();
    let broken = counter(&client, "Widget", SyncEvent::BrokenTransition);

    entity.set("size", json!(2));
    let promise = client.transition(&entity, None).unwrap();
    let sent = server.expect("Widget").await;
    assert_eq!(sent.message.get("size"), Some(&json!(2)));

    // The terminating response belongs to another transition and leaves
    // `size` out, so only the rollback can restore it.
    let other = WireMessage::new("Widget")
        .with_operation(Operation::Transition)
        .with("id", json!(1))
        .with("color", json!("red"))
        .with("transition_id", json!("someone-else"));
    server.respond(sent.seq, other);

    assert!(matches!(promise.await, Err(ResponseError::BrokenTransition(_))));
    assert_eq!(entity.get("size"), Some(json!(1)));
    assert!(entity.read().sync_modified().is_empty());
    assert!(entity.read().transition().is_none());
    assert_eq!(broken.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_confirmed_transition_keeps_local_values() {
    let (client, mut server) =
        connected(ClientConfig::new("memory://it").with_transition_seed(11)).await;
    server.send(&widget(1, "red"));
    flush(&client, &mut server).await;
    let entity = find_widget(&client, 1).unwrap();
    let broken = counter(&client, "Widget", SyncEvent::BrokenTransition);

    entity.set("color", json!("blue"));
    let promise = client.transition(&entity, None).unwrap();
    let sent = server.expect("Widget").await;
    let id = sent.message.transition_id().unwrap();

    let confirmation = widget(1, "blue")
        .with_operation(Operation::Transition)
        .with("transition_id", json!(id.as_str()));
    server.respond(sent.seq, confirmation);

    let reply = promise.await.unwrap();
    assert!(reply.entity().unwrap().ptr_eq(&entity));
    assert_eq!(entity.get("color"), Some(json!("blue")));
    assert!(entity.read().transition().is_none());
    assert_eq!(broken.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_owner_epoch_change_cascades() {
    let (client, mut server) = connected(ClientConfig::new("memory://it")).await;
    let gone = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&gone);
    client.subscribe(SyncEvent::Disappear, move |cx| {
        sink.lock().push(cx.entity.get("id").unwrap_or(Value::Null));
        Ok(())
    });

    server.send(&owner("o1", 1));
    server.send(&owner("o2", 1));
    assert_eq!(server.expect(I_HAVE).await.message.owner(), Some(&json!("o1")));
    server.expect(I_HAVE).await;

    for (doc, owner_id) in [("x", "o1"), ("y", "o1"), ("z", "o2")] {
        server.send(&owned_doc(doc, owner_id));
    }
    server.send(
        &WireMessage::new(YOU_HAVE)
            .with("serial", json!(7))
            .with("epoch", json!(1))
            .with("_sync_owner", json!("o1")),
    );
    flush(&client, &mut server).await;
    let o1 = client.owner(&json!("o1")).unwrap();
    assert_eq!(incoming_serial(&o1), 7);

    server.send(&owner("o1", 2));
    let ack = server.expect(I_HAVE).await.message;
    assert_eq!(ack.get("serial"), Some(&json!(0)));
    assert_eq!(ack.get("epoch"), Some(&json!(2)));

    let mut gone = gone.lock().clone();
    gone.sort_by_key(Value::to_string);
    assert_eq!(gone, vec![json!("x"), json!("y")]);
    assert!(client.find("Doc", &[&json!("x")]).is_none());
    assert!(client.find("Doc", &[&json!("y")]).is_none());
    assert!(client.find("Doc", &[&json!("z")]).is_some());
    assert_eq!(incoming_serial(&o1), 0);
}

#[tokio::test]
async fn test_responses_correlate_out_of_order() {
    let (client, mut server) = connected(ClientConfig::new("memory://it")).await;
    server.send(&widget(1, "red"));
    server.send(&widget(2, "red"));
    flush(&client, &mut server).await;
    let (one, two) = (find_widget(&client, 1).unwrap(), find_widget(&client, 2).unwrap());

    one.set("color", json!("blue"));
    two.set("color", json!("green"));
    let first = client.sync_update(&one).unwrap();
    let second = client.sync_update(&two).unwrap();

    let a = server.expect("Widget").await;
    let b = server.expect("Widget").await;
    assert_eq!(a.message.operation(), "forward");
    assert_eq!(a.message.get("id"), Some(&json!(1)));
    assert!(!a.message.contains("size"));

    server.respond(b.seq, widget(2, "green"));
    server.respond(a.seq, widget(1, "blue"));

    assert!(second.await.unwrap().entity().unwrap().ptr_eq(&two));
    assert!(first.await.unwrap().entity().unwrap().ptr_eq(&one));
    assert!(one.read().sync_modified().is_empty());
}

#[tokio::test]
async fn test_create_then_delete() {
    let (client, mut server) = connected(ClientConfig::new("memory://it")).await;
    let deletes = counter(&client, "Doc", SyncEvent::Delete);

    let draft = client.create("Doc").unwrap();
    draft.set("title", json!("Draft"));
    draft.set("_sync_owner", json!("o1"));
    let created = client.sync_create(&draft).unwrap();

    let request = server.expect("Doc").await;
    assert_eq!(request.message.operation(), "create");
    assert_eq!(request.message.get("title"), Some(&json!("Draft")));
    assert_eq!(request.message.owner(), Some(&json!("o1")));
    assert!(!request.message.contains("id"));

    server.respond(
        request.seq,
        owned_doc("d1", "o1").with_operation(Operation::Create),
    );
    let stored = created.await.unwrap().entity().cloned().unwrap();
    assert!(client.find("Doc", &[&json!("d1")]).unwrap().ptr_eq(&stored));

    let deleted = client.sync_delete(&stored).unwrap();
    let request = server.expect("Doc").await;
    assert_eq!(request.message.operation(), "delete");
    assert_eq!(request.message.get("id"), Some(&json!("d1")));
    assert!(!request.message.contains("title"));

    server.respond(
        request.seq,
        WireMessage::new("Doc")
            .with_operation(Operation::Delete)
            .with("id", json!("d1")),
    );
    deleted.await.unwrap();
    assert!(client.find("Doc", &[&json!("d1")]).is_none());
    assert_eq!(deletes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_backoff_bounds() {
    let (connector, _server) = memory_server();
    connector.set_refusing(true);
    let client = Client::connect(ClientConfig::new("memory://it"), test_registry(), connector.clone())
        .unwrap();

    tokio::time::sleep(Duration::from_millis(70_000)).await;

    let gaps: Vec<u128> = connector
        .attempts()
        .windows(2)
        .map(|w| w[1].duration_since(w[0]).as_millis())
        .collect();
    assert_eq!(
        &gaps[..8],
        &[256, 512, 1024, 2048, 4096, 8192, 16384, 32768]
    );
    client.close();
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_abandons_pending_requests() {
    let (client, mut server) = connected(ClientConfig::new("memory://it")).await;
    let pending = client.manager().request(widget(1, "red")).unwrap();
    server.expect("Widget").await;

    server.disconnect();
    assert!(matches!(pending.await, Err(ResponseError::Abandoned)));

    server.accept().await;
    client.wait_open().await.unwrap();
    let again = client.manager().request(widget(1, "red")).unwrap();
    assert_eq!(again.sequence(), 0);
}
