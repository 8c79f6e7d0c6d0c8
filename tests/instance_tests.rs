mod common;

use chatstore::prelude::*;
use common::harness;

#[tokio::test]
async fn test_first_instance_becomes_active() {
    let h = harness().await;
    assert!(h.store.read(GetActiveInstance).await.unwrap().is_none());

    let home = h
        .store
        .write(CreateInstance::new("home", "https://agent.home.lan").auth_token("s3cret"))
        .await
        .unwrap();
    let office = h
        .store
        .write(CreateInstance::new("office", "wss://agent.office.lan:8443"))
        .await
        .unwrap();

    assert!(home.is_active);
    assert!(!office.is_active);
    assert_eq!(home.auth_token.as_deref(), Some("s3cret"));
    let active = h.store.read(GetActiveInstance).await.unwrap().unwrap();
    assert_eq!(active.id, home.id);
}

#[tokio::test]
async fn test_activation_leaves_exactly_one_active() {
    let h = harness().await;
    let mut ids = Vec::new();
    for (name, url) in [
        ("a", "http://a.local"),
        ("b", "http://b.local"),
        ("c", "http://c.local"),
    ] {
        ids.push(h.store.write(CreateInstance::new(name, url)).await.unwrap().id);
    }

    h.store.write(ActivateInstance(ids[2])).await.unwrap();
    let instances = h.store.read(ListInstances).await.unwrap();
    let active: Vec<_> = instances.iter().filter(|i| i.is_active).map(|i| i.id).collect();
    assert_eq!(active, vec![ids[2]]);

    h.store.write(ActivateInstance(ids[2])).await.unwrap();
    let instances = h.store.read(ListInstances).await.unwrap();
    assert_eq!(instances.iter().filter(|i| i.is_active).count(), 1);
}

#[tokio::test]
async fn test_deleting_active_instance_promotes_earliest() {
    let h = harness().await;
    let first = h
        .store
        .write(CreateInstance::new("first", "http://first.local"))
        .await
        .unwrap();
    let second = h
        .store
        .write(CreateInstance::new("second", "http://second.local"))
        .await
        .unwrap();
    let third = h
        .store
        .write(CreateInstance::new("third", "http://third.local"))
        .await
        .unwrap();
    h.store.write(ActivateInstance(third.id)).await.unwrap();

    h.store.write(DeleteInstance(third.id)).await.unwrap();
    let active = h.store.read(GetActiveInstance).await.unwrap().unwrap();
    assert_eq!(active.id, first.id);

    h.store.write(DeleteInstance(second.id)).await.unwrap();
    h.store.write(DeleteInstance(first.id)).await.unwrap();
    assert!(h.store.read(GetActiveInstance).await.unwrap().is_none());
}

#[tokio::test]
async fn test_instance_url_needs_scheme_and_host() {
    let h = harness().await;
    for url in ["agent.local", "ftp://agent.local", "https://", ""] {
        let err = h
            .store
            .write(CreateInstance::new("bad", url))
            .await
            .unwrap_err();
        assert!(err.is_invalid_input(), "{url}");
    }
    assert!(h.store.read(ListInstances).await.unwrap().is_empty());
}
