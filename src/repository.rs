use crate::models::{NewUser, Role, UpdateUserRequest, User, UserCredentials};
use crate::permissions;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    InvalidReference(String),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Repository Trait
///
/// Abstract contract for all persistence operations, so handlers work the same
/// against Postgres and the in-memory store.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Auth ---
    /// Looks up a user and password hash by email (case-insensitive).
    async fn find_credentials(&self, email: &str) -> Result<Option<UserCredentials>, RepoError>;
    async fn permissions_for_role(&self, role: &str) -> Result<Vec<String>, RepoError>;

    // --- Users ---
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, RepoError>;
    async fn list_users(&self) -> Result<Vec<User>, RepoError>;
    /// Fails with `Conflict` on a duplicate email and `InvalidReference` on an unknown role.
    async fn create_user(&self, user: NewUser) -> Result<User, RepoError>;
    async fn update_user(&self, id: Uuid, req: UpdateUserRequest) -> Result<Option<User>, RepoError>;
    async fn delete_user(&self, id: Uuid) -> Result<bool, RepoError>;
    async fn set_user_photo(&self, id: Uuid, photo: &str) -> Result<Option<User>, RepoError>;

    // --- Roles ---
    async fn list_roles(&self) -> Result<Vec<Role>, RepoError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const USER_COLUMNS: &str = "id, name, email, role, photo, created_at, updated_at";

fn map_write_error(e: sqlx::Error) -> RepoError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return RepoError::Conflict("email already registered".to_string());
        }
        if db.is_foreign_key_violation() {
            return RepoError::InvalidReference("unknown role".to_string());
        }
    }
    RepoError::Db(e)
}

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL. Schema lives in
/// `migrations/`.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn find_credentials(&self, email: &str) -> Result<Option<UserCredentials>, RepoError> {
        let sql = format!(
            "SELECT {USER_COLUMNS}, password_hash FROM users WHERE lower(email) = lower($1)"
        );
        let row = sqlx::query_as::<_, UserCredentials>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn permissions_for_role(&self, role: &str) -> Result<Vec<String>, RepoError> {
        let codes = sqlx::query_scalar::<_, String>(
            "SELECT permission FROM role_permissions WHERE role = $1 ORDER BY permission",
        )
        .bind(role)
        .fetch_all(&self.pool)
        .await?;
        Ok(codes)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn list_users(&self) -> Result<Vec<User>, RepoError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC");
        let users = sqlx::query_as::<_, User>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn create_user(&self, user: NewUser) -> Result<User, RepoError> {
        let sql = format!(
            "INSERT INTO users (id, name, email, role, password_hash, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, NOW(), NOW()) RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.role)
            .bind(&user.password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(map_write_error)
    }

    /// Partial update; `COALESCE` keeps columns whose field is absent.
    async fn update_user(&self, id: Uuid, req: UpdateUserRequest) -> Result<Option<User>, RepoError> {
        let sql = format!(
            "UPDATE users SET \
                name = COALESCE($2, name), \
                email = COALESCE($3, email), \
                role = COALESCE($4, role), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(req.name)
            .bind(req.email)
            .bind(req.role)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_write_error)
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_user_photo(&self, id: Uuid, photo: &str) -> Result<Option<User>, RepoError> {
        let sql = format!(
            "UPDATE users SET photo = $2, updated_at = NOW() WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(photo)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn list_roles(&self) -> Result<Vec<Role>, RepoError> {
        let rows = sqlx::query_as::<_, (String, Vec<String>)>(
            r#"
            SELECT r.name,
                   COALESCE(
                       array_agg(rp.permission ORDER BY rp.permission)
                           FILTER (WHERE rp.permission IS NOT NULL),
                       '{}'
                   ) AS permissions
            FROM roles r
            LEFT JOIN role_permissions rp ON rp.role = r.name
            GROUP BY r.name
            ORDER BY r.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, permissions)| Role { name, permissions })
            .collect())
    }
}

/// InMemoryRepository
///
/// A `Repository` kept entirely in process memory. Seeded with the same roles
/// as the initial migration. Used by tests and for running the portal without a
/// database.
#[derive(Default)]
pub struct InMemoryRepository {
    users: RwLock<HashMap<Uuid, UserCredentials>>,
    roles: RwLock<BTreeMap<String, Vec<String>>>,
}

impl InMemoryRepository {
    /// `admin` holds every permission; `staff` may only browse users.
    pub fn with_default_roles() -> Self {
        let repo = Self::default();
        repo.put_role(
            "admin",
            permissions::ALL.iter().map(|code| code.to_string()).collect(),
        );
        repo.put_role(
            "staff",
            vec![
                permissions::VIEW_LIST_USER.to_string(),
                permissions::VIEW_USER.to_string(),
            ],
        );
        repo
    }

    pub fn put_role(&self, name: &str, mut codes: Vec<String>) {
        codes.sort();
        codes.dedup();
        if let Ok(mut roles) = self.roles.write() {
            roles.insert(name.to_string(), codes);
        }
    }

    fn role_exists(&self, name: &str) -> bool {
        self.roles
            .read()
            .map(|roles| roles.contains_key(name))
            .unwrap_or(false)
    }

    fn email_taken(users: &HashMap<Uuid, UserCredentials>, email: &str, except: Option<Uuid>) -> bool {
        users
            .values()
            .any(|c| c.user.email.eq_ignore_ascii_case(email) && Some(c.user.id) != except)
    }
}

// lock poisoning only follows a panic elsewhere; surface it as a db-level error
fn poisoned() -> RepoError {
    RepoError::Db(sqlx::Error::Protocol("in-memory repository lock poisoned".to_string()))
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn find_credentials(&self, email: &str) -> Result<Option<UserCredentials>, RepoError> {
        let users = self.users.read().map_err(|_| poisoned())?;
        Ok(users
            .values()
            .find(|c| c.user.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn permissions_for_role(&self, role: &str) -> Result<Vec<String>, RepoError> {
        let roles = self.roles.read().map_err(|_| poisoned())?;
        Ok(roles.get(role).cloned().unwrap_or_default())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        let users = self.users.read().map_err(|_| poisoned())?;
        Ok(users.get(&id).map(|c| c.user.clone()))
    }

    async fn list_users(&self) -> Result<Vec<User>, RepoError> {
        let users = self.users.read().map_err(|_| poisoned())?;
        let mut list: Vec<User> = users.values().map(|c| c.user.clone()).collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    async fn create_user(&self, user: NewUser) -> Result<User, RepoError> {
        if !self.role_exists(&user.role) {
            return Err(RepoError::InvalidReference("unknown role".to_string()));
        }

        let mut users = self.users.write().map_err(|_| poisoned())?;
        if Self::email_taken(&users, &user.email, None) {
            return Err(RepoError::Conflict("email already registered".to_string()));
        }

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            role: user.role,
            photo: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(
            created.id,
            UserCredentials {
                user: created.clone(),
                password_hash: user.password_hash,
            },
        );
        Ok(created)
    }

    async fn update_user(&self, id: Uuid, req: UpdateUserRequest) -> Result<Option<User>, RepoError> {
        if let Some(role) = &req.role {
            if !self.role_exists(role) {
                return Err(RepoError::InvalidReference("unknown role".to_string()));
            }
        }

        let mut users = self.users.write().map_err(|_| poisoned())?;
        if let Some(email) = &req.email {
            if Self::email_taken(&users, email, Some(id)) {
                return Err(RepoError::Conflict("email already registered".to_string()));
            }
        }

        Ok(users.get_mut(&id).map(|c| {
            if let Some(name) = req.name {
                c.user.name = name;
            }
            if let Some(email) = req.email {
                c.user.email = email;
            }
            if let Some(role) = req.role {
                c.user.role = role;
            }
            c.user.updated_at = Utc::now();
            c.user.clone()
        }))
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, RepoError> {
        let mut users = self.users.write().map_err(|_| poisoned())?;
        Ok(users.remove(&id).is_some())
    }

    async fn set_user_photo(&self, id: Uuid, photo: &str) -> Result<Option<User>, RepoError> {
        let mut users = self.users.write().map_err(|_| poisoned())?;
        Ok(users.get_mut(&id).map(|c| {
            c.user.photo = Some(photo.to_string());
            c.user.updated_at = Utc::now();
            c.user.clone()
        }))
    }

    async fn list_roles(&self) -> Result<Vec<Role>, RepoError> {
        let roles = self.roles.read().map_err(|_| poisoned())?;
        Ok(roles
            .iter()
            .map(|(name, permissions)| Role {
                name: name.clone(),
                permissions: permissions.clone(),
            })
            .collect())
    }
}
