use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use keystone_core::pagination::{PageRequest, deserialize_optional_i64};
use keystone_core::{AppError, verify_password};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    /// bcrypt hash, never serialized.
    #[serde(skip)]
    pub password: String,
    pub role: Role,
    pub is_email_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn verify_password(&self, candidate: &str) -> Result<bool, AppError> {
        verify_password(candidate, &self.password)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl<'r> FromRow<'r, PgRow> for User {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let role: String = row.try_get("role")?;
        let role = role.parse::<Role>().map_err(|e| sqlx::Error::ColumnDecode {
            index: "role".to_string(),
            source: e.into(),
        })?;

        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            password: row.try_get("password")?,
            role,
            is_email_verified: row.try_get("is_email_verified")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Insert payload; the password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_email_verified: bool,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[validate(email(message = "email must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
    pub role: Role,
}

/// Partial update; absent or empty fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    #[validate(email(message = "email must be a valid email address"))]
    pub email: Option<String>,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: Option<String>,
}

/// Columns a search term is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchScope {
    #[default]
    All,
    Name,
    Email,
    Role,
    Id,
}

impl SearchScope {
    /// Unknown scopes narrow to `name`.
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") | Some("all") => SearchScope::All,
            Some("email") => SearchScope::Email,
            Some("role") => SearchScope::Role,
            Some("id") => SearchScope::Id,
            Some(_) => SearchScope::Name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Name,
    Email,
    Role,
    CreatedAt,
    UpdatedAt,
}

impl SortField {
    pub fn column(self) -> &'static str {
        match self {
            SortField::Name => "name",
            SortField::Email => "email",
            SortField::Role => "role",
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Default for Sort {
    fn default() -> Self {
        Self {
            field: SortField::CreatedAt,
            direction: SortDirection::Desc,
        }
    }
}

impl Sort {
    /// Parses `field:direction` (e.g. `name:asc`). Anything not on the
    /// whitelist falls back to newest first.
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        let Some((field, direction)) = raw.and_then(|r| r.trim().split_once(':')) else {
            return Self::default();
        };

        let field = match field {
            "name" => SortField::Name,
            "email" => SortField::Email,
            "role" => SortField::Role,
            "createdAt" | "created_at" => SortField::CreatedAt,
            "updatedAt" | "updated_at" => SortField::UpdatedAt,
            _ => return Self::default(),
        };
        let direction = match direction.to_ascii_lowercase().as_str() {
            "asc" => SortDirection::Asc,
            "desc" => SortDirection::Desc,
            _ => return Self::default(),
        };

        Self { field, direction }
    }
}

/// Raw query string for `GET /v1/users`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListUsersParams {
    /// Page number, starting at 1.
    #[serde(default, deserialize_with = "deserialize_optional_i64")]
    pub page: Option<i64>,
    /// Page size; `-1` returns every row.
    #[serde(default, deserialize_with = "deserialize_optional_i64")]
    pub limit: Option<i64>,
    /// `field:asc|desc`.
    pub sort_by: Option<String>,
    pub search: Option<String>,
    /// Legacy alias for `search`.
    pub name: Option<String>,
    /// One of `all`, `name`, `email`, `role`, `id`.
    pub scope: Option<String>,
    /// Exact role filter.
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserQuery {
    pub page: PageRequest,
    pub sort: Sort,
    pub search: Option<String>,
    pub scope: SearchScope,
    pub role: Option<Role>,
}

impl From<ListUsersParams> for UserQuery {
    fn from(params: ListUsersParams) -> Self {
        let search = params
            .search
            .or(params.name)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Self {
            page: PageRequest::new(params.page, params.limit),
            sort: Sort::parse_lenient(params.sort_by.as_deref()),
            search,
            scope: SearchScope::parse_lenient(params.scope.as_deref()),
            role: params.role.as_deref().and_then(|r| r.parse().ok()),
        }
    }
}
