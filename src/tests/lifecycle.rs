use crate::error::Error;
use crate::index::IndexState;

use super::{definition, manager};

#[tokio::test]
async fn add_online_builds_a_runtime() {
    let (manager, _dir) = manager();
    manager.add_index(&definition("books", 2)).unwrap();

    assert_eq!(manager.index_status("books").unwrap(), IndexState::Online);
    let runtime = manager.runtime("BOOKS").unwrap();
    assert_eq!(runtime.shards().len(), 2);
}

#[tokio::test]
async fn add_offline_creates_no_runtime() {
    let (manager, _dir) = manager();
    let mut offline = definition("archive", 1);
    offline.online = false;
    manager.add_index(&offline).unwrap();

    assert_eq!(manager.index_status("archive").unwrap(), IndexState::Offline);
    assert!(matches!(
        manager.runtime("archive"),
        Err(Error::IndexIsOffline(_))
    ));
}

#[tokio::test]
async fn duplicate_add_is_rejected() {
    let (manager, _dir) = manager();
    manager.add_index(&definition("books", 1)).unwrap();
    assert!(matches!(
        manager.add_index(&definition("Books", 1)),
        Err(Error::IndexAlreadyExists(_))
    ));
}

#[tokio::test]
async fn close_then_open_cycles_state() {
    let (manager, _dir) = manager();
    manager.add_index(&definition("books", 1)).unwrap();

    manager.close_index("books").unwrap();
    assert_eq!(manager.index_status("books").unwrap(), IndexState::Offline);

    // closing an already-offline index fails cleanly, no crash, no deadlock
    assert!(matches!(
        manager.close_index("books"),
        Err(Error::IndexIsOffline(_))
    ));

    manager.open_index("books").unwrap();
    assert_eq!(manager.index_status("books").unwrap(), IndexState::Online);
}

#[tokio::test]
async fn delete_removes_all_trace() {
    let (manager, _dir) = manager();
    manager.add_index(&definition("books", 1)).unwrap();
    manager.versioning().add("books", "b1", 1);

    manager.delete_index("books").unwrap();
    assert!(!manager.index_exists("books"));
    assert!(manager.versioning().get("books", "b1").is_none());
    assert!(matches!(
        manager.index_status("books"),
        Err(Error::IndexNotFound(_))
    ));
    assert!(matches!(
        manager.delete_index("books"),
        Err(Error::IndexNotFound(_))
    ));
}

#[tokio::test]
async fn update_reopens_an_online_index() {
    let (manager, _dir) = manager();
    manager.add_index(&definition("books", 1)).unwrap();
    let first = manager.runtime("books").unwrap();

    let mut updated = definition("books", 3);
    manager.update_index(&updated).unwrap();
    let second = manager.runtime("books").unwrap();

    assert_eq!(manager.index_status("books").unwrap(), IndexState::Online);
    assert_eq!(second.shards().len(), 3);
    assert!(!std::sync::Arc::ptr_eq(&first, &second));

    updated.online = false;
    manager.close_index("books").unwrap();
    manager.update_index(&updated).unwrap();
    assert_eq!(manager.index_status("books").unwrap(), IndexState::Offline);
}

#[tokio::test]
async fn unknown_names_report_not_found() {
    let (manager, _dir) = manager();
    assert!(matches!(
        manager.open_index("ghost"),
        Err(Error::IndexNotFound(_))
    ));
    assert!(matches!(
        manager.close_index("ghost"),
        Err(Error::IndexNotFound(_))
    ));
    assert!(matches!(
        manager.get_index("ghost"),
        Err(Error::IndexNotFound(_))
    ));
    assert!(!manager.index_exists("ghost"));
}

#[tokio::test]
async fn shutdown_closes_everything() {
    let (manager, _dir) = manager();
    manager.add_index(&definition("books", 1)).unwrap();
    manager.add_index(&definition("films", 1)).unwrap();

    manager.shut_down().await;
    assert_eq!(manager.index_status("books").unwrap(), IndexState::Offline);
    assert_eq!(manager.index_status("films").unwrap(), IndexState::Offline);
}
