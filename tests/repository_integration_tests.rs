use lfg_backend::{
    models::{GroupStatus, User},
    repository::{GroupChanges, NewGroup, Repository, SqliteRepository, init_pool},
};

// --- Test Context and Setup ---

/// Each test gets its own in-memory database with the migrations applied.
async fn setup() -> SqliteRepository {
    let pool = init_pool("sqlite::memory:", 1)
        .await
        .expect("Failed to open in-memory database");
    SqliteRepository::new(pool)
}

// --- Test Data Helpers ---

async fn create_test_user(repo: &SqliteRepository, username: &str) -> User {
    repo.create_user(username, "$argon2id$not-a-real-hash")
        .await
        .expect("Failed to create test user")
}

fn new_group(title: &str, max_size: i64) -> NewGroup {
    NewGroup {
        title: title.to_string(),
        description: "Looking for players".to_string(),
        max_size,
        password_hash: None,
    }
}

// --- User Tests ---

#[tokio::test]
async fn test_create_and_get_user() {
    let repo = setup().await;
    let user = create_test_user(&repo, "alice").await;

    assert_eq!(user.username, "alice");
    let fetched = repo.get_user(user.id).await.unwrap();
    assert_eq!(fetched, Some(user));
}

#[tokio::test]
async fn test_get_user_missing_returns_none() {
    let repo = setup().await;
    assert!(repo.get_user(999).await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_username_is_unique_violation() {
    let repo = setup().await;
    create_test_user(&repo, "alice").await;

    let err = repo
        .create_user("alice", "other-hash")
        .await
        .expect_err("second insert with the same username must fail");

    let is_unique = err
        .as_database_error()
        .map(|e| e.is_unique_violation())
        .unwrap_or(false);
    assert!(is_unique, "expected a unique violation, got {err:?}");
}

#[tokio::test]
async fn test_get_credentials_returns_hash() {
    let repo = setup().await;
    let user = create_test_user(&repo, "alice").await;

    let credentials = repo.get_credentials("alice").await.unwrap().unwrap();
    assert_eq!(credentials.id, user.id);
    assert_eq!(credentials.password_hash, "$argon2id$not-a-real-hash");
    assert!(repo.get_credentials("bob").await.unwrap().is_none());
}

// --- Group Tests ---

#[tokio::test]
async fn test_create_group_defaults() {
    let repo = setup().await;
    let owner = create_test_user(&repo, "owner").await;

    let group = repo.create_group(owner.id, new_group("Raid night", 5)).await.unwrap();

    assert_eq!(group.title, "Raid night");
    assert_eq!(group.status, GroupStatus::Open);
    assert_eq!(group.owner_id, owner.id);
    assert!(group.members.is_empty());
    assert!(!group.is_private());
}

#[tokio::test]
async fn test_list_groups_filters_by_status() {
    let repo = setup().await;
    let owner = create_test_user(&repo, "owner").await;
    let open = repo.create_group(owner.id, new_group("Open", 5)).await.unwrap();
    let closed = repo.create_group(owner.id, new_group("Closed", 5)).await.unwrap();
    repo.close_group(closed.id).await.unwrap();

    let all = repo.list_groups(None).await.unwrap();
    assert_eq!(all.len(), 2);

    let only_open = repo.list_groups(Some(GroupStatus::Open)).await.unwrap();
    assert_eq!(only_open.len(), 1);
    assert_eq!(only_open[0].id, open.id);

    let only_closed = repo.list_groups(Some(GroupStatus::Closed)).await.unwrap();
    assert_eq!(only_closed.len(), 1);
    assert_eq!(only_closed[0].id, closed.id);
}

#[tokio::test]
async fn test_list_groups_includes_members() {
    let repo = setup().await;
    let owner = create_test_user(&repo, "owner").await;
    let member = create_test_user(&repo, "member").await;
    let group = repo.create_group(owner.id, new_group("Party", 5)).await.unwrap();
    repo.add_member(group.id, member.id).await.unwrap();

    let groups = repo.list_groups(None).await.unwrap();
    assert_eq!(groups[0].members, vec![member]);
}

#[tokio::test]
async fn test_update_group_only_changes_provided_fields() {
    let repo = setup().await;
    let owner = create_test_user(&repo, "owner").await;
    let group = repo.create_group(owner.id, new_group("Before", 5)).await.unwrap();

    let updated = repo
        .update_group(
            group.id,
            GroupChanges {
                max_size: Some(10),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.title, "Before");
    assert_eq!(updated.description, group.description);
    assert_eq!(updated.max_size, 10);
}

#[tokio::test]
async fn test_update_missing_group_returns_none() {
    let repo = setup().await;
    let result = repo.update_group(42, GroupChanges::default()).await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_set_and_clear_group_password() {
    let repo = setup().await;
    let owner = create_test_user(&repo, "owner").await;
    let group = repo.create_group(owner.id, new_group("Secret", 5)).await.unwrap();

    let private = repo
        .set_group_password(group.id, Some("hash".to_string()))
        .await
        .unwrap()
        .unwrap();
    assert!(private.is_private());

    let public = repo.set_group_password(group.id, None).await.unwrap().unwrap();
    assert!(!public.is_private());
}

#[tokio::test]
async fn test_close_group_is_terminal() {
    let repo = setup().await;
    let owner = create_test_user(&repo, "owner").await;
    let group = repo.create_group(owner.id, new_group("Done", 5)).await.unwrap();

    let closed = repo.close_group(group.id).await.unwrap().unwrap();
    assert_eq!(closed.status, GroupStatus::Closed);

    assert!(repo.close_group(group.id).await.unwrap().is_none());
}

// --- Membership Tests ---

#[tokio::test]
async fn test_add_member_is_idempotent() {
    let repo = setup().await;
    let owner = create_test_user(&repo, "owner").await;
    let member = create_test_user(&repo, "member").await;
    let group = repo.create_group(owner.id, new_group("Party", 5)).await.unwrap();

    assert!(repo.add_member(group.id, member.id).await.unwrap());
    assert!(!repo.add_member(group.id, member.id).await.unwrap());

    let group = repo.get_group(group.id).await.unwrap().unwrap();
    assert_eq!(group.members.len(), 1);
}

#[tokio::test]
async fn test_add_member_respects_capacity_including_owner() {
    let repo = setup().await;
    let owner = create_test_user(&repo, "owner").await;
    let group = repo.create_group(owner.id, new_group("Five", 5)).await.unwrap();

    for i in 0..4 {
        let user = create_test_user(&repo, &format!("player{i}")).await;
        assert!(repo.add_member(group.id, user.id).await.unwrap());
    }

    let late = create_test_user(&repo, "late").await;
    assert!(!repo.add_member(group.id, late.id).await.unwrap());

    let group = repo.get_group(group.id).await.unwrap().unwrap();
    assert_eq!(group.members.len(), 4);
    assert!(group.is_full());
}

#[tokio::test]
async fn test_add_member_rejects_owner_and_closed_group() {
    let repo = setup().await;
    let owner = create_test_user(&repo, "owner").await;
    let member = create_test_user(&repo, "member").await;
    let group = repo.create_group(owner.id, new_group("Party", 5)).await.unwrap();

    assert!(!repo.add_member(group.id, owner.id).await.unwrap());

    repo.close_group(group.id).await.unwrap();
    assert!(!repo.add_member(group.id, member.id).await.unwrap());
}

#[tokio::test]
async fn test_remove_member() {
    let repo = setup().await;
    let owner = create_test_user(&repo, "owner").await;
    let member = create_test_user(&repo, "member").await;
    let group = repo.create_group(owner.id, new_group("Party", 5)).await.unwrap();
    repo.add_member(group.id, member.id).await.unwrap();

    assert!(repo.remove_member(group.id, member.id).await.unwrap());
    assert!(!repo.remove_member(group.id, member.id).await.unwrap());

    let group = repo.get_group(group.id).await.unwrap().unwrap();
    assert!(!group.is_member(member.id));
}

#[tokio::test]
async fn test_update_group_refuses_capacity_below_membership() {
    let repo = setup().await;
    let owner = create_test_user(&repo, "owner").await;
    let group = repo.create_group(owner.id, new_group("Big", 10)).await.unwrap();
    for i in 0..5 {
        let user = create_test_user(&repo, &format!("player{i}")).await;
        assert!(repo.add_member(group.id, user.id).await.unwrap());
    }

    // Five members plus the owner do not fit in five slots.
    let shrink = GroupChanges {
        max_size: Some(5),
        title: Some("Renamed".to_string()),
        ..Default::default()
    };
    assert!(repo.update_group(group.id, shrink).await.unwrap().is_none());

    let unchanged = repo.get_group(group.id).await.unwrap().unwrap();
    assert_eq!(unchanged.max_size, 10);
    assert_eq!(unchanged.title, "Big");
    assert!(!unchanged.is_full());

    // Six slots is exactly enough.
    let fit = GroupChanges {
        max_size: Some(6),
        ..Default::default()
    };
    let updated = repo.update_group(group.id, fit).await.unwrap().unwrap();
    assert_eq!(updated.max_size, 6);
    assert!(updated.is_full());
}
