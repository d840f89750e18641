use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use keystone_models::users::{SearchScope, SortDirection, SortField};
use keystone_models::{NewUser, User, UserQuery};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;

    /// Whether another user already has `email`, ignoring `exclude`.
    async fn exists_by_email(&self, email: &str, exclude: Option<Uuid>) -> anyhow::Result<bool>;

    async fn create(&self, user: NewUser) -> anyhow::Result<User>;

    /// Persists every mutable field of `user`. `None` if the row is gone.
    async fn update(&self, user: &User) -> anyhow::Result<Option<User>>;

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool>;

    /// One page of matching users plus the total match count.
    async fn search(&self, query: &UserQuery) -> anyhow::Result<(Vec<User>, i64)>;
}

const USER_COLUMNS: &str =
    "id, name, email, password, role, is_email_verified, created_at, updated_at";

pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    #[instrument(skip(self), fields(db.table = "users"))]
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    #[instrument(skip(self, email), fields(db.table = "users"))]
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user =
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user)
    }

    async fn exists_by_email(&self, email: &str, exclude: Option<Uuid>) -> anyhow::Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1 AND ($2::uuid IS NULL OR id <> $2))",
        )
        .bind(email)
        .bind(exclude)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    #[instrument(skip(self, user), fields(db.table = "users"))]
    async fn create(&self, user: NewUser) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (id, name, email, password, role, is_email_verified) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.is_email_verified)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    #[instrument(skip(self, user), fields(db.table = "users", user.id = %user.id))]
    async fn update(&self, user: &User) -> anyhow::Result<Option<User>> {
        let updated = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET name = $2, email = $3, password = $4, role = $5, \
             is_email_verified = $6, updated_at = NOW() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password)
        .bind(user.role.as_str())
        .bind(user.is_email_verified)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    #[instrument(skip(self), fields(db.table = "users"))]
    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, query), fields(db.table = "users"))]
    async fn search(&self, query: &UserQuery) -> anyhow::Result<(Vec<User>, i64)> {
        let mut where_clause = String::new();
        let mut params: Vec<String> = Vec::new();

        if let Some(role) = query.role {
            params.push(role.as_str().to_string());
            where_clause.push_str(&format!(" AND role = ${}", params.len()));
        }

        if let Some(search) = &query.search {
            params.push(format!("%{search}%"));
            let n = params.len();
            let condition = match query.scope {
                SearchScope::All => format!(
                    "(name ILIKE ${n} OR email ILIKE ${n} OR role ILIKE ${n} OR CAST(id AS TEXT) ILIKE ${n})"
                ),
                SearchScope::Name => format!("name ILIKE ${n}"),
                SearchScope::Email => format!("email ILIKE ${n}"),
                SearchScope::Role => format!("role ILIKE ${n}"),
                SearchScope::Id => format!("CAST(id AS TEXT) ILIKE ${n}"),
            };
            where_clause.push_str(" AND ");
            where_clause.push_str(&condition);
        }

        let count_query = format!("SELECT COUNT(*) FROM users WHERE 1=1{where_clause}");
        let mut count_sql = sqlx::query_scalar::<_, i64>(&count_query);
        for param in &params {
            count_sql = count_sql.bind(param);
        }
        let total = count_sql.fetch_one(&self.pool).await?;

        let direction = match query.sort.direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        let mut data_query = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE 1=1{where_clause} ORDER BY {} {direction}, id",
            query.sort.field.column()
        );
        if let Some(limit) = query.page.limit {
            data_query.push_str(&format!(" LIMIT {} OFFSET {}", limit, query.page.offset()));
        }

        let mut data_sql = sqlx::query_as::<_, User>(&data_query);
        for param in params {
            data_sql = data_sql.bind(param);
        }
        let users = data_sql.fetch_all(&self.pool).await?;

        Ok((users, total))
    }
}

/// Process-local repository for the `memory` driver and tests.
#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> anyhow::Result<std::sync::RwLockReadGuard<'_, HashMap<Uuid, User>>> {
        self.users.read().map_err(|_| anyhow!("user store lock poisoned"))
    }

    fn write(&self) -> anyhow::Result<std::sync::RwLockWriteGuard<'_, HashMap<Uuid, User>>> {
        self.users.write().map_err(|_| anyhow!("user store lock poisoned"))
    }
}

fn matches_query(user: &User, query: &UserQuery) -> bool {
    if query.role.is_some_and(|role| role != user.role) {
        return false;
    }

    let Some(search) = &query.search else {
        return true;
    };
    let needle = search.to_lowercase();
    let contains = |haystack: &str| haystack.to_lowercase().contains(&needle);

    match query.scope {
        SearchScope::All => {
            contains(&user.name)
                || contains(&user.email)
                || contains(user.role.as_str())
                || contains(&user.id.to_string())
        }
        SearchScope::Name => contains(&user.name),
        SearchScope::Email => contains(&user.email),
        SearchScope::Role => contains(user.role.as_str()),
        SearchScope::Id => contains(&user.id.to_string()),
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.read()?.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self.read()?.values().find(|u| u.email == email).cloned())
    }

    async fn exists_by_email(&self, email: &str, exclude: Option<Uuid>) -> anyhow::Result<bool> {
        Ok(self
            .read()?
            .values()
            .any(|u| u.email == email && Some(u.id) != exclude))
    }

    async fn create(&self, user: NewUser) -> anyhow::Result<User> {
        let mut users = self.write()?;
        if users.values().any(|u| u.email == user.email) {
            return Err(anyhow!("duplicate email"));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password: user.password_hash,
            role: user.role,
            is_email_verified: user.is_email_verified,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update(&self, user: &User) -> anyhow::Result<Option<User>> {
        let mut users = self.write()?;
        let Some(stored) = users.get_mut(&user.id) else {
            return Ok(None);
        };

        *stored = User {
            created_at: stored.created_at,
            updated_at: Utc::now(),
            ..user.clone()
        };
        Ok(Some(stored.clone()))
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        Ok(self.write()?.remove(&id).is_some())
    }

    async fn search(&self, query: &UserQuery) -> anyhow::Result<(Vec<User>, i64)> {
        let mut found: Vec<User> = self
            .read()?
            .values()
            .filter(|u| matches_query(u, query))
            .cloned()
            .collect();

        found.sort_by(|a, b| {
            let ordering = match query.sort.field {
                SortField::Name => a.name.cmp(&b.name),
                SortField::Email => a.email.cmp(&b.email),
                SortField::Role => a.role.as_str().cmp(b.role.as_str()),
                SortField::CreatedAt => a.created_at.cmp(&b.created_at),
                SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            };
            let ordering = match query.sort.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            ordering.then_with(|| a.id.cmp(&b.id))
        });

        let total = found.len() as i64;
        let page = match query.page.limit {
            Some(limit) => found
                .into_iter()
                .skip(query.page.offset().max(0) as usize)
                .take(limit.max(0) as usize)
                .collect(),
            None => found,
        };

        Ok((page, total))
    }
}
