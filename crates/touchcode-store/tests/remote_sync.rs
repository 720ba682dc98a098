//! Remote store behavior driven through the session, using the
//! in-process table as the backend.

use std::sync::Arc;
use std::time::Duration;

use touchcode_core::{CoreError, ProjectStore, Session};
use touchcode_store::{Identity, LocalStore, MemoryTable, RemoteStore};

fn store_for(table: &MemoryTable, user: &str) -> Arc<RemoteStore<MemoryTable>> {
    Arc::new(RemoteStore::new(table.clone(), Some(Identity::new(user))))
}

#[tokio::test]
async fn test_operations_require_identity() {
    let table = MemoryTable::new();
    let store = Arc::new(RemoteStore::new(table.clone(), None));
    let mut session = Session::new(store);

    assert!(matches!(
        session.list_projects().await,
        Err(CoreError::Authentication(_))
    ));
    assert!(matches!(
        session.create_project("Site", None).await,
        Err(CoreError::Authentication(_))
    ));
    assert!(table.is_empty());
    assert!(session.state().project().is_none());
}

#[tokio::test]
async fn test_failed_save_keeps_session_state() {
    let table = MemoryTable::new();
    let mut session = Session::new(store_for(&table, "alice"));
    let id = session.create_project("Site", None).await.unwrap();
    session.create_file("index", "html").await.unwrap();

    session.edit_content("<p>draft</p>").unwrap();
    let before = session.state().project().unwrap().clone();

    table.fail_next(1);
    assert!(matches!(session.save().await, Err(CoreError::Storage(_))));
    assert_eq!(session.state().project(), Some(&before));
    assert!(session.has_unsaved_changes());

    // Retry goes through
    session.save().await.unwrap();
    assert!(!session.has_unsaved_changes());
    let row = table.row(&id).unwrap();
    assert_eq!(row.files[0].content, "<p>draft</p>");
}

#[tokio::test]
async fn test_failed_file_creation_changes_nothing() {
    let table = MemoryTable::new();
    let mut session = Session::new(store_for(&table, "alice"));
    session.create_project("Site", None).await.unwrap();

    table.set_offline(true);
    assert!(session.create_file("style", "css").await.is_err());
    assert!(session.state().project().unwrap().files.is_empty());
    assert!(session.state().active_file_id().is_none());
}

#[tokio::test]
async fn test_other_client_save_reaches_open_session() {
    let table = MemoryTable::new();

    let mut first = Session::new(store_for(&table, "alice"));
    let id = first.create_project("Site", None).await.unwrap();
    first.create_file("index", "html").await.unwrap();
    let css = first.create_file("style", "css").await.unwrap();

    let mut second = Session::new(store_for(&table, "alice"));
    second.open_project(&id).await.unwrap();
    second.select_file(&css).unwrap();
    second.edit_content("body { color: red; }").unwrap();
    second.save().await.unwrap();

    let fired = tokio::time::timeout(Duration::from_secs(5), first.wait_for_change())
        .await
        .expect("no change notice");
    assert!(fired);
    assert!(first.reload().await.unwrap());

    let project = first.state().project().unwrap();
    assert_eq!(project.file(&css).unwrap().content, "body { color: red; }");
    assert_eq!(first.state().active_file_id(), Some(&css));
}

#[tokio::test]
async fn test_own_saves_do_not_clobber_draft() {
    let table = MemoryTable::new();
    let mut session = Session::new(store_for(&table, "alice"));
    session.create_project("Site", None).await.unwrap();
    session.create_file("index", "html").await.unwrap();
    // Let the change feed deliver the echo of our own upserts
    tokio::time::sleep(Duration::from_millis(50)).await;

    session.edit_content("<p>unsaved draft</p>").unwrap();
    assert!(!session.process_notifications().await.unwrap());

    assert!(session.has_unsaved_changes());
    assert_eq!(
        session.state().active_file().unwrap().content,
        "<p>unsaved draft</p>"
    );
}

#[tokio::test]
async fn test_is_saving_visible_to_other_session() {
    let table = MemoryTable::new();
    let store = store_for(&table, "alice");
    let mut first = Session::new(store.clone());
    let id = first.create_project("Site", None).await.unwrap();

    let mut second = Session::new(store.clone());
    second.open_project(&id).await.unwrap();
    assert!(!second.is_saving());

    let held = table.hold_writes().await;
    let pending = {
        let store = store.clone();
        let project = first.state().project().unwrap().clone();
        tokio::spawn(async move { store.save(&project).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(second.is_saving());

    drop(held);
    pending.await.unwrap().unwrap();
    assert!(!second.is_saving());
}

#[tokio::test]
async fn test_projects_are_private_to_their_owner() {
    let table = MemoryTable::new();
    let mut alice = Session::new(store_for(&table, "alice"));
    let mut bob = Session::new(store_for(&table, "bob"));

    let id = alice.create_project("Alice's site", None).await.unwrap();
    bob.create_project("Bob's site", None).await.unwrap();

    let names: Vec<_> = alice
        .list_projects()
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.name)
        .collect();
    assert_eq!(names, vec!["Alice's site"]);
    assert!(matches!(
        bob.open_project(&id).await,
        Err(CoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_reads_fall_back_to_local_mirror() {
    let dir = tempfile::tempdir().unwrap();
    let table = MemoryTable::new();
    let store = Arc::new(
        RemoteStore::new(table.clone(), Some(Identity::new("alice")))
            .with_fallback(LocalStore::open(dir.path()).unwrap()),
    );
    let mut session = Session::new(store.clone());
    let id = session.create_project("Site", Some("demo")).await.unwrap();
    session.create_file("index", "html").await.unwrap();

    table.set_offline(true);

    let list = session.list_projects().await.unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].file_count, 1);

    session.back_to_project_list();
    session.open_project(&id).await.unwrap();
    assert_eq!(session.state().project().unwrap().files.len(), 1);

    // Writes are not accepted by the mirror alone
    assert!(matches!(session.save().await, Err(CoreError::Storage(_))));
}

#[tokio::test]
async fn test_unauthorized_does_not_fall_back() {
    let dir = tempfile::tempdir().unwrap();
    let table = MemoryTable::new();
    let owner = store_for(&table, "alice");
    let project = touchcode_core::Project::new("Site", None).unwrap();
    owner.save(&project).await.unwrap();

    let mut stolen = project.clone();
    stolen.name = "Mine now".to_string();
    let intruder = RemoteStore::new(table.clone(), Some(Identity::new("bob")))
        .with_fallback(LocalStore::open(dir.path()).unwrap());

    // Bob's row would overwrite Alice's; the table refuses
    assert!(matches!(
        intruder.save(&stolen).await,
        Err(CoreError::Authentication(_))
    ));
    assert_eq!(table.row(&project.id).unwrap().name, "Site");
    assert!(intruder.get(&project.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let table = MemoryTable::new();
    let mut session = Session::new(store_for(&table, "alice"));
    let id = session.create_project("Site", None).await.unwrap();

    session.delete_project(&id).await.unwrap();
    session.delete_project(&id).await.unwrap();

    assert!(session.state().project().is_none());
    assert!(session.list_projects().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_export_import_between_accounts() {
    let table = MemoryTable::new();
    let mut alice = Session::new(store_for(&table, "alice"));
    let original = alice.create_project("Site", None).await.unwrap();
    alice.create_file("index", "html").await.unwrap();
    alice.edit_content("<h1>Hi</h1>").unwrap();
    let text = alice.export_current().unwrap();

    let bob = Session::new(store_for(&table, "bob"));
    let imported = bob.import_project(&text).await.unwrap();
    assert_ne!(imported.id, original);
    assert_eq!(imported.name, "Site");

    let project = bob.store().get(&imported.id).await.unwrap().unwrap();
    assert_eq!(project.files[0].content, "<h1>Hi</h1>");
}
