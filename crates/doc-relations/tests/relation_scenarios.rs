use elif_doc_relations::memory::{MemoryDocument, MemoryStore, Schema};
use elif_doc_relations::{
    HybridRelations, IdInput, Identifier, Record, RelationConfig, RelationError, SyncList,
};
use serde_json::json;

struct Post;
struct Tag;
struct User;
struct Role;
struct Group;

impl Schema for Post {
    const NAME: &'static str = "Post";
    const COLLECTION: &'static str = "posts";
}

impl Schema for Tag {
    const NAME: &'static str = "Tag";
    const COLLECTION: &'static str = "tags";
}

impl Schema for User {
    const NAME: &'static str = "User";
    const COLLECTION: &'static str = "users";
}

impl Schema for Role {
    const NAME: &'static str = "Role";
    const COLLECTION: &'static str = "roles";
}

impl Schema for Group {
    const NAME: &'static str = "Group";
    const COLLECTION: &'static str = "groups";
}

fn opaque() -> RelationConfig {
    RelationConfig::default().with_convert_ids(false)
}

#[tokio::test]
async fn sync_replaces_owner_array() {
    let store = MemoryStore::new();
    let mut post = MemoryDocument::<Post>::create(&store, json!({ "_id": 1, "tag_ids": [1, 2, 3] }))
        .await
        .unwrap();

    let mut tags = post.contains_few(store.query::<Tag>(), None, None, opaque());
    let report = tags.sync(SyncList::ids([2i64, 3, 4]), true).await.unwrap();

    assert_eq!(report.detached, vec![Identifier::Int(1)]);
    assert_eq!(report.attached, vec![Identifier::Int(4)]);
    assert!(report.updated.is_empty());

    let stored = store.find::<Post>(&Identifier::Int(1)).await.unwrap();
    assert_eq!(stored.get("tag_ids"), Some(json!([2, 3, 4])));
    assert_eq!(post.touches(), 1);
}

#[tokio::test]
async fn sync_reduces_embedded_references_before_diffing() {
    let store = MemoryStore::new();
    let mut post = MemoryDocument::<Post>::create(
        &store,
        json!({ "_id": 1, "tag_ids": [{ "_id": 1, "name": "rust" }, { "_id": 2, "name": "db" }] }),
    )
    .await
    .unwrap();

    let mut tags = post.contains_few(store.query::<Tag>(), None, None, opaque());
    let report = tags.sync(SyncList::ids([2i64, 3]), true).await.unwrap();

    assert_eq!(report.detached, vec![Identifier::Int(1)]);
    assert_eq!(report.attached, vec![Identifier::Int(3)]);

    let stored = store.find::<Post>(&Identifier::Int(1)).await.unwrap();
    assert_eq!(stored.get("tag_ids"), Some(json!([2, 3])));
}

#[tokio::test]
async fn sync_without_detaching_never_removes() {
    let store = MemoryStore::new();
    let mut post = MemoryDocument::<Post>::create(&store, json!({ "_id": 1, "tag_ids": [1, 2] }))
        .await
        .unwrap();

    let mut tags = post.contains_few(store.query::<Tag>(), None, None, opaque());
    let report = tags.sync(SyncList::ids([5i64]), false).await.unwrap();

    assert!(report.detached.is_empty());
    assert_eq!(post.get("tag_ids"), Some(json!([1, 2, 5])));
}

#[tokio::test]
async fn inverse_detach_leaves_other_owner_keys() {
    let store = MemoryStore::new();
    MemoryDocument::<Group>::create(&store, json!({ "_id": "g1", "users": ["P", "Q"] }))
        .await
        .unwrap();
    let user = MemoryDocument::<User>::create(&store, json!({ "_id": "P" })).await.unwrap();

    let groups = user.included_in_many(store.query::<Group>(), None, None, opaque());
    assert_eq!(groups.detach_id("g1").await.unwrap(), 1);

    let group = store.find::<Group>(&Identifier::from("g1")).await.unwrap();
    assert_eq!(group.get("users"), Some(json!(["Q"])));
}

#[tokio::test]
async fn pivot_attach_updates_both_records() {
    let store = MemoryStore::new();
    let role = MemoryDocument::<Role>::create(&store, json!({ "name": "admin" })).await.unwrap();
    let mut user = MemoryDocument::<User>::create(&store, json!({ "name": "ada" })).await.unwrap();
    let role_key = role.key().unwrap();
    let user_key = user.key().unwrap();

    let mut roles = user
        .belongs_to_many(store.query::<Role>(), "roles", None, None, RelationConfig::default())
        .document()
        .unwrap();
    assert_eq!(roles.attach(role_key.to_string()).await.unwrap(), 1);

    assert_eq!(user.get("role_ids"), Some(json!([role_key.to_value()])));
    let stored_role = store.find::<Role>(&role_key).await.unwrap();
    assert_eq!(stored_role.get("user_ids"), Some(json!([user_key.to_value()])));
}

#[tokio::test]
async fn pivot_attach_rejects_unconvertible_id() {
    let store = MemoryStore::new();
    let mut user = MemoryDocument::<User>::create(&store, json!({})).await.unwrap();

    let mut roles = user
        .belongs_to_many(store.query::<Role>(), "roles", None, None, RelationConfig::default())
        .document()
        .unwrap();
    let err = roles.attach(IdInput::from(42i64)).await.unwrap_err();
    assert!(matches!(err, RelationError::InvalidIdentifier(_)));
}

#[tokio::test]
async fn sync_failure_keeps_earlier_steps() {
    let store = MemoryStore::new();
    let mut post = MemoryDocument::<Post>::create(&store, json!({ "_id": 1, "tag_ids": [1, 2, 3] }))
        .await
        .unwrap();
    store.fail_writes_after(1).await;

    let mut tags = post.contains_few(store.query::<Tag>(), None, None, opaque());
    let err = tags.sync(SyncList::ids([2i64, 3, 4]), true).await.unwrap_err();
    assert!(err.is_persistence());

    assert_eq!(post.get("tag_ids"), Some(json!([2, 3])));
    assert_eq!(post.touches(), 0);
    let stored = store.find::<Post>(&Identifier::Int(1)).await.unwrap();
    assert_eq!(stored.get("tag_ids"), Some(json!([2, 3])));
}

#[tokio::test]
async fn pivot_failure_after_related_side_is_not_rolled_back() {
    let store = MemoryStore::new();
    MemoryDocument::<Role>::create(&store, json!({ "_id": "admin" })).await.unwrap();
    let mut user = MemoryDocument::<User>::create(&store, json!({ "_id": 1, "role_ids": [] }))
        .await
        .unwrap();
    store.fail_writes_after(1).await;

    let mut roles = user
        .belongs_to_many(store.query::<Role>(), "roles", None, None, opaque())
        .document()
        .unwrap();
    let err = roles.attach("admin").await.unwrap_err();
    assert!(err.is_persistence());

    assert_eq!(user.get("role_ids"), Some(json!([])));
    let role = store.find::<Role>(&Identifier::from("admin")).await.unwrap();
    assert_eq!(role.get("user_ids"), Some(json!([1])));
}
