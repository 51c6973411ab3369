use axum::http::StatusCode;
use chrono::Utc;
use lfg_backend::{
    auth::AuthUser,
    error::AppError,
    models::{Group, GroupStatus, User},
    password::hash_password,
    permissions::{Permission, check_group_password, enforce, policy},
};

const OWNER: i64 = 1;
const MEMBER: i64 = 2;
const STRANGER: i64 = 3;

fn user(id: i64) -> AuthUser {
    AuthUser {
        id,
        username: format!("user{id}"),
    }
}

fn group(status: GroupStatus, max_size: i64) -> Group {
    Group {
        id: 10,
        title: "Raid".to_string(),
        description: "d".to_string(),
        status,
        password_hash: None,
        max_size,
        owner_id: OWNER,
        created_at: Utc::now(),
        members: vec![User {
            id: MEMBER,
            username: "member".to_string(),
            created_at: Utc::now(),
        }],
    }
}

fn denial(result: Result<(), AppError>) -> (StatusCode, String) {
    let err = result.expect_err("expected the policy to deny");
    (err.status(), err.to_string())
}

#[test]
fn test_predicates() {
    let g = group(GroupStatus::Open, 5);
    assert!(Permission::GroupIsOpen.allows(&g, STRANGER));
    assert!(Permission::GroupIsNotFull.allows(&g, STRANGER));
    assert!(Permission::UserIsOwner.allows(&g, OWNER));
    assert!(Permission::UserIsNotOwner.allows(&g, MEMBER));
    assert!(Permission::UserIsMember.allows(&g, MEMBER));
    assert!(Permission::UserIsNotMember.allows(&g, OWNER));
    assert!(!Permission::UserIsMember.allows(&g, STRANGER));
}

#[test]
fn test_owner_policies_deny_non_owner_with_forbidden() {
    let g = group(GroupStatus::Open, 5);
    for p in [policy::CLOSE, policy::UPDATE, policy::UPDATE_PASSWORD, policy::KICK] {
        let (status, message) = denial(enforce(&g, &user(MEMBER), p));
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(message, "User is not the owner of the group");
    }
}

#[test]
fn test_owner_check_runs_before_open_check() {
    // A stranger touching a closed group learns they are not the owner, not that it is closed.
    let g = group(GroupStatus::Closed, 5);
    let (status, _) = denial(enforce(&g, &user(STRANGER), policy::CLOSE));
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, message) = denial(enforce(&g, &user(OWNER), policy::CLOSE));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(message, "Group is not open");
}

#[test]
fn test_kick_checks_open_before_owner() {
    let g = group(GroupStatus::Closed, 5);
    let (status, message) = denial(enforce(&g, &user(STRANGER), policy::KICK));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(message, "Group is not open");
}

#[test]
fn test_join_policy_order() {
    // Full wins over every other failure.
    let mut g = group(GroupStatus::Closed, 2);
    let (_, message) = denial(enforce(&g, &user(OWNER), policy::JOIN));
    assert_eq!(message, "Group is full");

    g.max_size = 5;
    let (_, message) = denial(enforce(&g, &user(MEMBER), policy::JOIN));
    assert_eq!(message, "User is a member of the group");

    let (_, message) = denial(enforce(&g, &user(OWNER), policy::JOIN));
    assert_eq!(message, "User is the owner of the group");

    let (_, message) = denial(enforce(&g, &user(STRANGER), policy::JOIN));
    assert_eq!(message, "Group is not open");

    g.status = GroupStatus::Open;
    assert!(enforce(&g, &user(STRANGER), policy::JOIN).is_ok());
}

#[test]
fn test_leave_policy() {
    let g = group(GroupStatus::Open, 5);
    assert!(enforce(&g, &user(MEMBER), policy::LEAVE).is_ok());

    let (status, message) = denial(enforce(&g, &user(STRANGER), policy::LEAVE));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(message, "User is not a member of the group");
}

#[test]
fn test_public_group_ignores_join_body() {
    let g = group(GroupStatus::Open, 5);
    assert!(check_group_password(&g, b"").is_ok());
    assert!(check_group_password(&g, b"not even json").is_ok());
}

#[test]
fn test_private_group_password_checks() {
    let mut g = group(GroupStatus::Open, 5);
    g.password_hash = Some(hash_password("hunter22").unwrap());

    let (status, message) = denial(check_group_password(&g, b"  "));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(message, "Group password is required");

    let (_, message) = denial(check_group_password(&g, br#"{"password": ""}"#));
    assert_eq!(message, "Group password is required");

    let (status, _) = denial(check_group_password(&g, b"{oops"));
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, message) = denial(check_group_password(&g, br#"{"password": "wrong"}"#));
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(message, "Incorrect password");

    assert!(check_group_password(&g, br#"{"password": "hunter22"}"#).is_ok());
}
