use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::request::{self, FromRequest, Request};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use std::str::FromStr;
use std::sync::Arc;

use crate::data::DBConnection;
use crate::internal_error::{InternalError, InternalResult, SyncError};

pub const ACTIVE_STATUS: &str = "Active";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Basic,
    Admin,
    Guest,
}

impl Role {
    pub const ANY: [Role; 3] = [Role::Basic, Role::Admin, Role::Guest];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Basic => "Basic",
            Role::Admin => "Admin",
            Role::Guest => "Guest",
        }
    }

    /// Guests may add and update records but never delete them.
    pub fn is_restricted(self) -> bool {
        self == Role::Guest
    }
}

impl FromStr for Role {
    type Err = InternalError;

    fn from_str(s: &str) -> InternalResult<Role> {
        Role::ANY
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| InternalError::from(format!("unknown role {}", s)))
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct AuthUser {
    pub user_id: String,
    pub username: String,
    pub role: Role,
    pub status: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct AuthenticationResponse {
    pub authorized: bool,
    pub user: Option<AuthUser>,
    pub message: String,
    pub error: bool,
}

impl AuthenticationResponse {
    fn denied(message: &str) -> AuthenticationResponse {
        AuthenticationResponse {
            authorized: false,
            user: None,
            message: message.to_string(),
            error: false,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Services {
    pub name: String,
    pub up: bool,
    pub up_reason: String,
}

#[rocket::async_trait]
pub trait IdentityService: Send + Sync {
    /// Whether the identity backend is accepting requests.
    async fn service_status(&self) -> InternalResult<Services>;

    async fn authenticate(
        &self,
        token: &str,
        required_roles: &[Role],
    ) -> InternalResult<AuthenticationResponse>;
}

pub type SharedIdentity = Arc<dyn IdentityService>;

/// Bearer tokens, users and the service switch, kept in the same database as the records.
pub struct SqliteIdentity {
    connection: DBConnection,
    service_name: String,
}

impl SqliteIdentity {
    pub fn new(connection: DBConnection, service_name: &str) -> InternalResult<SqliteIdentity> {
        {
            let db_connection = connection.lock()?;
            db_connection.execute(
                "CREATE TABLE IF NOT EXISTS users (user_id TEXT PRIMARY KEY, username TEXT NOT NULL, email TEXT NOT NULL, status TEXT NOT NULL, role TEXT NOT NULL)",
                params![],
            )?;
            db_connection.execute(
                "CREATE TABLE IF NOT EXISTS tokens (token TEXT PRIMARY KEY, user_id TEXT NOT NULL, active INTEGER NOT NULL)",
                params![],
            )?;
            db_connection.execute(
                "CREATE TABLE IF NOT EXISTS services (name TEXT PRIMARY KEY, up INTEGER NOT NULL, up_reason TEXT NOT NULL)",
                params![],
            )?;
        }

        Ok(SqliteIdentity {
            connection,
            service_name: service_name.to_string(),
        })
    }

    pub fn add_user(
        &self,
        user_id: &str,
        username: &str,
        email: &str,
        role: Role,
        status: &str,
    ) -> InternalResult<()> {
        let db_connection = self.connection.lock()?;
        db_connection.execute(
            "INSERT OR REPLACE INTO users VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user_id, username, email, status, role.as_str()],
        )?;
        Ok(())
    }

    pub fn add_token(&self, token: &str, user_id: &str, active: bool) -> InternalResult<()> {
        let db_connection = self.connection.lock()?;
        db_connection.execute(
            "INSERT OR REPLACE INTO tokens VALUES (?1, ?2, ?3)",
            params![token, user_id, active],
        )?;
        Ok(())
    }

    pub fn set_service_status(&self, up: bool, reason: &str) -> InternalResult<()> {
        let db_connection = self.connection.lock()?;
        db_connection.execute(
            "INSERT OR REPLACE INTO services VALUES (?1, ?2, ?3)",
            params![self.service_name, up, reason],
        )?;
        Ok(())
    }
}

#[rocket::async_trait]
impl IdentityService for SqliteIdentity {
    async fn service_status(&self) -> InternalResult<Services> {
        let db_connection = self.connection.lock()?;
        let row: Option<(bool, String)> = db_connection
            .query_row(
                "SELECT up, up_reason FROM services WHERE name = (?1)",
                params![self.service_name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        // No row means nobody has switched the service off.
        let (up, up_reason) = row.unwrap_or((true, String::new()));

        Ok(Services {
            name: self.service_name.clone(),
            up,
            up_reason,
        })
    }

    async fn authenticate(
        &self,
        token: &str,
        required_roles: &[Role],
    ) -> InternalResult<AuthenticationResponse> {
        let db_connection = self.connection.lock()?;
        let row: Option<(String, String, String, String)> = db_connection
            .query_row(
                "SELECT users.user_id, users.username, users.role, users.status FROM tokens JOIN users ON users.user_id = tokens.user_id WHERE tokens.token = (?1) AND tokens.active = 1",
                params![token],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let (user_id, username, role, status) = match row {
            Some(row) => row,
            None => return Ok(AuthenticationResponse::denied("Invalid token.")),
        };

        let role = match Role::from_str(&role) {
            Ok(role) => role,
            Err(e) => {
                error!(user_id = %user_id, "stored user has a bad role: {}", e);
                return Ok(AuthenticationResponse::denied("Stored role is invalid."));
            }
        };
        if !required_roles.contains(&role) {
            return Ok(AuthenticationResponse::denied("Role not allowed."));
        }
        if status != ACTIVE_STATUS {
            return Ok(AuthenticationResponse::denied("User is not active."));
        }

        Ok(AuthenticationResponse {
            authorized: true,
            user: Some(AuthUser {
                user_id,
                username,
                role,
                status,
            }),
            message: String::new(),
            error: false,
        })
    }
}

/// An authenticated caller of the record endpoints.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user: AuthUser,
}

impl Caller {
    pub fn user_id(&self) -> &str {
        &self.user.user_id
    }

    pub fn is_restricted(&self) -> bool {
        self.user.role.is_restricted()
    }
}

fn bearer_token(header: &str) -> &str {
    header.strip_prefix("Bearer ").unwrap_or(header).trim()
}

pub async fn authorize(
    identity: &dyn IdentityService,
    authorization: Option<&str>,
    required_roles: &[Role],
) -> Result<Caller, SyncError> {
    match identity.service_status().await {
        Ok(service) if service.up => {}
        Ok(service) => {
            return Err(SyncError::ServiceUnavailable(format!(
                "Identity server unavailable: {}",
                service.up_reason
            )))
        }
        Err(e) => {
            error!("identity service status check failed: {}", e);
            return Err(SyncError::ServiceUnavailable(
                "Identity server unavailable.".to_string(),
            ));
        }
    }

    let token = match authorization.map(bearer_token) {
        Some(token) if !token.is_empty() => token,
        _ => return Err(SyncError::Unauthorized("missing bearer token".to_string())),
    };

    let response = identity.authenticate(token, required_roles).await?;
    match response.user {
        Some(user) if response.authorized => {
            debug!(user_id = %user.user_id, role = user.role.as_str(), "caller authorized");
            Ok(Caller { user })
        }
        _ => {
            debug!(reason = %response.message, "caller rejected");
            Err(SyncError::Unauthorized(response.message))
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Caller {
    type Error = SyncError;

    async fn from_request(request: &'r Request<'_>) -> request::Outcome<Caller, SyncError> {
        let identity = match request.rocket().state::<SharedIdentity>() {
            Some(identity) => identity,
            None => {
                let e = SyncError::Internal(InternalError::from("identity service not managed"));
                return Outcome::Error((Status::InternalServerError, e));
            }
        };

        let authorization = request.headers().get_one("Authorization");
        match authorize(identity.as_ref(), authorization, &Role::ANY).await {
            Ok(caller) => Outcome::Success(caller),
            Err(e) => Outcome::Error((e.status(), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal_error::UNAUTHORIZED;
    use rusqlite::Connection;
    use std::sync::Mutex;

    const USER: &str = "UserUserUserUserUserUserUserUserUserUser";

    fn identity() -> SqliteIdentity {
        let connection = Arc::new(Mutex::new(Connection::open_in_memory().unwrap()));
        let identity = SqliteIdentity::new(connection, "ObjectivesServer").unwrap();
        identity
            .add_user(USER, "ana", "ana@example.com", Role::Guest, ACTIVE_STATUS)
            .unwrap();
        identity.add_token("good", USER, true).unwrap();
        identity.add_token("revoked", USER, false).unwrap();
        identity
    }

    #[tokio::test]
    async fn bearer_token_resolves_to_its_user() {
        let caller = authorize(&identity(), Some("Bearer good"), &Role::ANY)
            .await
            .unwrap();

        assert_eq!(caller.user_id(), USER);
        assert!(caller.is_restricted());
    }

    #[tokio::test]
    async fn bad_tokens_are_unauthorized() {
        let identity = identity();
        for header in [None, Some("Bearer "), Some("Bearer revoked"), Some("Bearer nope")] {
            let result = authorize(&identity, header, &Role::ANY).await;
            assert!(matches!(result, Err(SyncError::Unauthorized(_))));
        }
    }

    #[tokio::test]
    async fn role_and_status_are_enforced() {
        let identity = identity();
        let wrong_role = authorize(&identity, Some("Bearer good"), &[Role::Admin]).await;
        let unknown = authorize(&identity, Some("Bearer nope"), &Role::ANY).await;

        identity
            .add_user(USER, "ana", "ana@example.com", Role::Basic, "Banned")
            .unwrap();
        let banned = authorize(&identity, Some("Bearer good"), &Role::ANY).await;

        for result in [wrong_role, unknown, banned] {
            match result {
                Err(e @ SyncError::Unauthorized(_)) => {
                    assert_eq!(e.public_message(), UNAUTHORIZED)
                }
                other => panic!("expected unauthorized, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn service_down_blocks_before_token_check() {
        let identity = identity();
        identity.set_service_status(false, "maintenance").unwrap();

        let result = authorize(&identity, Some("Bearer good"), &Role::ANY).await;
        match result {
            Err(SyncError::ServiceUnavailable(message)) => assert!(message.contains("maintenance")),
            other => panic!("expected service unavailable, got {:?}", other),
        }
    }
}
