//! Session behavior over the on-device store, where change notices come
//! from the file watcher.

use std::sync::Arc;
use std::time::Duration;

use touchcode_core::{ProjectStore, Session};
use touchcode_store::LocalStore;

#[tokio::test]
async fn test_own_writes_keep_draft() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalStore::open(dir.path()).unwrap());
    let mut session = Session::new(store);
    session.create_project("Site", None).await.unwrap();
    session.create_file("index", "html").await.unwrap();
    // Give the watcher time to report the rename of our own record
    tokio::time::sleep(Duration::from_millis(200)).await;

    session.edit_content("<p>unsaved draft</p>").unwrap();
    assert!(!session.process_notifications().await.unwrap());

    assert!(session.has_unsaved_changes());
    assert_eq!(
        session.state().active_file().unwrap().content,
        "<p>unsaved draft</p>"
    );
}

#[tokio::test]
async fn test_write_from_other_process_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = Session::new(Arc::new(LocalStore::open(dir.path()).unwrap()));
    let id = session.create_project("Site", None).await.unwrap();
    let file = session.create_file("index", "html").await.unwrap();

    let other = LocalStore::open(dir.path()).unwrap();
    let mut copy = other.get(&id).await.unwrap().unwrap();
    copy.file_mut(&file).unwrap().content = "<p>from elsewhere</p>".to_string();
    copy.touch();
    other.save(&copy).await.unwrap();

    let fired = tokio::time::timeout(Duration::from_secs(5), session.wait_for_change())
        .await
        .expect("no change notice");
    assert!(fired);
    assert!(session.reload().await.unwrap());
    assert_eq!(
        session.state().active_file().unwrap().content,
        "<p>from elsewhere</p>"
    );
}
