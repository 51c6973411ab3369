use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    FromRow, SqlitePool,
    migrate::Migrator,
    sqlite::SqlitePoolOptions,
};

use crate::models::{Group, GroupStatus, User, UserCredentials};

/// Embedded schema migrations from `./migrations`.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// init_pool
///
/// Opens a SQLite pool and brings the schema up to date. In-memory databases
/// (`sqlite::memory:`) are per connection, so callers pass `max_connections = 1` for them.
pub async fn init_pool(db_url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(db_url)
        .await?;
    MIGRATOR.run(&pool).await?;
    tracing::info!("database migrations applied");
    Ok(pool)
}

/// NewGroup
///
/// Validated input for `create_group`. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewGroup {
    pub title: String,
    pub description: String,
    pub max_size: i64,
    pub password_hash: Option<String>,
}

/// GroupChanges
///
/// Partial update for `update_group`; `None` leaves a column untouched.
#[derive(Debug, Clone, Default)]
pub struct GroupChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub max_size: Option<i64>,
}

/// Repository Trait
///
/// The persistence contract the handlers and extractors depend on. Shared as
/// `Arc<dyn Repository>`, so it must be `Send + Sync` and object safe (`async_trait`).
/// Database failures are returned, never swallowed; the HTTP layer turns them into 500s.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, sqlx::Error>;
    async fn get_user(&self, id: i64) -> Result<Option<User>, sqlx::Error>;
    async fn get_credentials(&self, username: &str)
    -> Result<Option<UserCredentials>, sqlx::Error>;

    // --- Groups ---
    async fn create_group(&self, owner_id: i64, group: NewGroup) -> Result<Group, sqlx::Error>;
    async fn list_groups(&self, status: Option<GroupStatus>) -> Result<Vec<Group>, sqlx::Error>;
    async fn get_group(&self, id: i64) -> Result<Option<Group>, sqlx::Error>;
    /// Returns `None` if the group is missing or its current members would not fit
    /// in the new `max_size` (the owner keeps one slot).
    async fn update_group(
        &self,
        id: i64,
        changes: GroupChanges,
    ) -> Result<Option<Group>, sqlx::Error>;
    /// `None` clears the password and makes the group public.
    async fn set_group_password(
        &self,
        id: i64,
        password_hash: Option<String>,
    ) -> Result<Option<Group>, sqlx::Error>;
    /// Transitions `open -> closed`. Returns `None` if the group is missing or already closed.
    async fn close_group(&self, id: i64) -> Result<Option<Group>, sqlx::Error>;

    // --- Membership ---
    /// Returns true only if a row was inserted: the group was open, had a free slot
    /// and the user was not already a member.
    async fn add_member(&self, group_id: i64, user_id: i64) -> Result<bool, sqlx::Error>;
    /// Returns true if the user was a member and has been removed.
    async fn remove_member(&self, group_id: i64, user_id: i64) -> Result<bool, sqlx::Error>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

#[derive(FromRow)]
struct GroupRow {
    id: i64,
    title: String,
    description: String,
    status: GroupStatus,
    password_hash: Option<String>,
    max_size: i64,
    owner_id: i64,
    created_at: DateTime<Utc>,
}

impl GroupRow {
    fn into_group(self, members: Vec<User>) -> Group {
        Group {
            id: self.id,
            title: self.title,
            description: self.description,
            status: self.status,
            password_hash: self.password_hash,
            max_size: self.max_size,
            owner_id: self.owner_id,
            created_at: self.created_at,
            members,
        }
    }
}

#[derive(FromRow)]
struct MemberRow {
    group_id: i64,
    #[sqlx(flatten)]
    user: User,
}

const GROUP_COLUMNS: &str =
    "id, title, description, status, password_hash, max_size, owner_id, created_at";

/// SqliteRepository
///
/// The `Repository` implementation backed by SQLite through `sqlx`.
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn members_of(&self, group_id: i64) -> Result<Vec<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.username, u.created_at
            FROM group_members m
            JOIN users u ON u.id = m.user_id
            WHERE m.group_id = ?
            ORDER BY m.joined_at ASC, u.id ASC
            "#,
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn load(&self, row: Option<GroupRow>) -> Result<Option<Group>, sqlx::Error> {
        match row {
            Some(row) => {
                let members = self.members_of(row.id).await?;
                Ok(Some(row.into_group(members)))
            }
            None => Ok(None),
        }
    }

    async fn fetch_row(&self, id: i64) -> Result<Option<GroupRow>, sqlx::Error> {
        sqlx::query_as::<_, GroupRow>(&format!(
            "SELECT {GROUP_COLUMNS} FROM lfg_groups WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, password_hash, created_at)
            VALUES (?, ?, ?)
            RETURNING id, username, created_at
            "#,
        )
        .bind(username)
        .bind(password_hash)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT id, username, created_at FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_credentials(
        &self,
        username: &str,
    ) -> Result<Option<UserCredentials>, sqlx::Error> {
        sqlx::query_as::<_, UserCredentials>(
            "SELECT id, username, password_hash, created_at FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
    }

    async fn create_group(&self, owner_id: i64, group: NewGroup) -> Result<Group, sqlx::Error> {
        let row = sqlx::query_as::<_, GroupRow>(&format!(
            r#"
            INSERT INTO lfg_groups (title, description, status, password_hash, max_size, owner_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING {GROUP_COLUMNS}
            "#
        ))
        .bind(group.title)
        .bind(group.description)
        .bind(GroupStatus::Open)
        .bind(group.password_hash)
        .bind(group.max_size)
        .bind(owner_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(group_id = row.id, owner_id, "group created");
        Ok(row.into_group(vec![]))
    }

    /// list_groups
    ///
    /// Loads the groups and all their members in two queries, newest group first.
    async fn list_groups(&self, status: Option<GroupStatus>) -> Result<Vec<Group>, sqlx::Error> {
        let rows = sqlx::query_as::<_, GroupRow>(&format!(
            r#"
            SELECT {GROUP_COLUMNS} FROM lfg_groups
            WHERE (?1 IS NULL OR status = ?1)
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        let member_rows = sqlx::query_as::<_, MemberRow>(
            r#"
            SELECT m.group_id, u.id, u.username, u.created_at
            FROM group_members m
            JOIN users u ON u.id = m.user_id
            ORDER BY m.joined_at ASC, u.id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut members: HashMap<i64, Vec<User>> = HashMap::new();
        for row in member_rows {
            members.entry(row.group_id).or_default().push(row.user);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let group_members = members.remove(&row.id).unwrap_or_default();
                row.into_group(group_members)
            })
            .collect())
    }

    async fn get_group(&self, id: i64) -> Result<Option<Group>, sqlx::Error> {
        let row = self.fetch_row(id).await?;
        self.load(row).await
    }

    /// update_group
    ///
    /// Uses `COALESCE` so only the provided columns change. The member count is
    /// checked against the new capacity in the same statement, so a join that lands
    /// after the caller validated cannot leave the group over capacity.
    async fn update_group(
        &self,
        id: i64,
        changes: GroupChanges,
    ) -> Result<Option<Group>, sqlx::Error> {
        let row = sqlx::query_as::<_, GroupRow>(&format!(
            r#"
            UPDATE lfg_groups
            SET title = COALESCE(?1, title),
                description = COALESCE(?2, description),
                max_size = COALESCE(?3, max_size)
            WHERE id = ?4
              AND (SELECT COUNT(*) FROM group_members m WHERE m.group_id = lfg_groups.id)
                  <= COALESCE(?3, max_size) - 1
            RETURNING {GROUP_COLUMNS}
            "#
        ))
        .bind(changes.title)
        .bind(changes.description)
        .bind(changes.max_size)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        self.load(row).await
    }

    async fn set_group_password(
        &self,
        id: i64,
        password_hash: Option<String>,
    ) -> Result<Option<Group>, sqlx::Error> {
        let row = sqlx::query_as::<_, GroupRow>(&format!(
            "UPDATE lfg_groups SET password_hash = ? WHERE id = ? RETURNING {GROUP_COLUMNS}"
        ))
        .bind(password_hash)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        self.load(row).await
    }

    async fn close_group(&self, id: i64) -> Result<Option<Group>, sqlx::Error> {
        let row = sqlx::query_as::<_, GroupRow>(&format!(
            "UPDATE lfg_groups SET status = ? WHERE id = ? AND status = ? RETURNING {GROUP_COLUMNS}"
        ))
        .bind(GroupStatus::Closed)
        .bind(id)
        .bind(GroupStatus::Open)
        .fetch_optional(&self.pool)
        .await?;

        self.load(row).await
    }

    /// add_member
    ///
    /// The capacity and status checks are repeated inside the statement, so two joins
    /// racing for the last slot cannot both succeed. `OR IGNORE` makes re-joining a no-op.
    async fn add_member(&self, group_id: i64, user_id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO group_members (group_id, user_id, joined_at)
            SELECT g.id, ?2, ?3
            FROM lfg_groups g
            WHERE g.id = ?1
              AND g.status = ?4
              AND g.owner_id <> ?2
              AND (SELECT COUNT(*) FROM group_members m WHERE m.group_id = g.id) < g.max_size - 1
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .bind(Utc::now())
        .bind(GroupStatus::Open)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_member(&self, group_id: i64, user_id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM group_members WHERE group_id = ? AND user_id = ?")
            .bind(group_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
