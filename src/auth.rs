use crate::app::AppState;
use crate::config::AdminUser;
use crate::db::DbConnection;
use crate::models::{now_timestamp, CurrentUser, UserId};
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use bcrypt::{hash, verify, BcryptError, DEFAULT_COST};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rusqlite::{params, OptionalExtension};
use tracing::{info, warn};
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "session";

const RESET_TOKEN_TTL_SECS: i64 = 3600;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Hash(#[from] BcryptError),
}

pub fn hash_password(password: &str) -> Result<String, BcryptError> {
    hash(password, DEFAULT_COST)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    verify(password, hash).unwrap_or(false)
}

pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Seeds the configured credential table; existing rows keep their current hash.
pub async fn seed_users(conn: &DbConnection, users: &[AdminUser]) -> Result<(), AuthError> {
    let conn = conn.lock().await;
    for user in users {
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO users (id, username, password_hash, created_at) VALUES (?, ?, ?, ?)",
            params![user.id, user.username, hash_password(&user.password)?, now_timestamp()],
        )?;
        if inserted > 0 {
            info!(user_id = user.id, username = %user.username, "seeded user");
        }
    }
    Ok(())
}

pub async fn authenticate(
    conn: &DbConnection,
    username: &str,
    password: &str,
) -> Result<Option<CurrentUser>, AuthError> {
    let row = conn
        .lock()
        .await
        .query_row(
            "SELECT id, password_hash FROM users WHERE username = ?",
            [username],
            |row| Ok((row.get::<_, UserId>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;

    match row {
        Some((id, password_hash)) if verify_password(password, &password_hash) => {
            Ok(Some(CurrentUser { id, username: username.to_string() }))
        }
        _ => {
            warn!(username, "rejected login");
            Ok(None)
        }
    }
}

pub async fn create_session(conn: &DbConnection, user_id: UserId) -> Result<String, rusqlite::Error> {
    let token = generate_token();

    conn.lock().await.execute(
        "INSERT INTO sessions (token, user_id, created_at) VALUES (?, ?, ?)",
        params![token, user_id, now_timestamp()],
    )?;

    Ok(token)
}

pub async fn verify_session(
    conn: &DbConnection,
    token: &str,
) -> Result<Option<CurrentUser>, rusqlite::Error> {
    conn.lock()
        .await
        .query_row(
            "SELECT users.id, users.username FROM sessions
             JOIN users ON users.id = sessions.user_id
             WHERE sessions.token = ?",
            [token],
            |row| Ok(CurrentUser { id: row.get(0)?, username: row.get(1)? }),
        )
        .optional()
}

pub async fn end_session(conn: &DbConnection, token: &str) -> Result<(), rusqlite::Error> {
    conn.lock()
        .await
        .execute("DELETE FROM sessions WHERE token = ?", [token])?;
    Ok(())
}

pub fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

/// Issues a one-hour reset token, or `None` for an unknown username.
pub async fn issue_reset_token(
    conn: &DbConnection,
    username: &str,
) -> Result<Option<String>, rusqlite::Error> {
    let conn = conn.lock().await;
    let user_id: Option<UserId> = conn
        .query_row("SELECT id FROM users WHERE username = ?", [username], |row| row.get(0))
        .optional()?;

    let Some(user_id) = user_id else {
        return Ok(None);
    };

    let token = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO reset_tokens (token, user_id, created_at) VALUES (?, ?, ?)",
        params![token, user_id, now_timestamp()],
    )?;
    Ok(Some(token))
}

/// Username the token was issued for, if it is still valid.
pub async fn check_reset_token(
    conn: &DbConnection,
    token: &str,
) -> Result<Option<String>, rusqlite::Error> {
    let row = conn
        .lock()
        .await
        .query_row(
            "SELECT users.username, reset_tokens.created_at FROM reset_tokens
             JOIN users ON users.id = reset_tokens.user_id
             WHERE reset_tokens.token = ?",
            [token],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;

    Ok(row.and_then(|(username, issued)| {
        let issued = DateTime::parse_from_rfc3339(&issued).ok()?.with_timezone(&Utc);
        (Utc::now() - issued < Duration::seconds(RESET_TOKEN_TTL_SECS)).then_some(username)
    }))
}

/// Sets a new password and consumes the token. Returns false for invalid tokens.
pub async fn reset_password(
    conn: &DbConnection,
    token: &str,
    new_password: &str,
) -> Result<bool, AuthError> {
    if check_reset_token(conn, token).await?.is_none() {
        return Ok(false);
    }
    let password_hash = hash_password(new_password)?;

    let mut conn = conn.lock().await;
    let tx = conn.transaction()?;
    let updated = tx.execute(
        "UPDATE users SET password_hash = ?
         WHERE id = (SELECT user_id FROM reset_tokens WHERE token = ?)",
        params![password_hash, token],
    )?;
    tx.execute("DELETE FROM reset_tokens WHERE token = ?", [token])?;
    tx.commit()?;

    Ok(updated > 0)
}

/// Sends unauthenticated requests to the login page.
pub struct LoginRedirect;

impl IntoResponse for LoginRedirect {
    fn into_response(self) -> Response {
        crate::handlers::found("/login")
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = LoginRedirect;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let jar = CookieJar::from_headers(&parts.headers);
        let Some(token) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) else {
            return Err(LoginRedirect);
        };

        match verify_session(&state.db, &token).await {
            Ok(Some(user)) => Ok(user),
            Ok(None) => Err(LoginRedirect),
            Err(e) => {
                warn!("session lookup failed: {:?}", e);
                Err(LoginRedirect)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::establish_connection;

    fn admins() -> Vec<AdminUser> {
        vec![AdminUser { id: 1, username: "clerk".into(), password: "pw1".into() }]
    }

    #[tokio::test]
    async fn login_and_session_round_trip() {
        let conn = establish_connection(":memory:").unwrap();
        seed_users(&conn, &admins()).await.unwrap();

        assert!(authenticate(&conn, "clerk", "wrong").await.unwrap().is_none());
        assert!(authenticate(&conn, "nobody", "pw1").await.unwrap().is_none());
        let user = authenticate(&conn, "clerk", "pw1").await.unwrap().unwrap();
        assert_eq!(user.id, 1);

        let token = create_session(&conn, user.id).await.unwrap();
        assert_eq!(token.len(), 32);
        assert_eq!(verify_session(&conn, &token).await.unwrap(), Some(user));

        end_session(&conn, &token).await.unwrap();
        assert!(verify_session(&conn, &token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reseeding_keeps_a_reset_password() {
        let conn = establish_connection(":memory:").unwrap();
        seed_users(&conn, &admins()).await.unwrap();

        let token = issue_reset_token(&conn, "clerk").await.unwrap().unwrap();
        assert_eq!(check_reset_token(&conn, &token).await.unwrap().as_deref(), Some("clerk"));
        assert!(reset_password(&conn, &token, "new-pass").await.unwrap());
        assert!(!reset_password(&conn, &token, "again").await.unwrap());

        seed_users(&conn, &admins()).await.unwrap();
        assert!(authenticate(&conn, "clerk", "new-pass").await.unwrap().is_some());
        assert!(authenticate(&conn, "clerk", "pw1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_user_gets_no_reset_token() {
        let conn = establish_connection(":memory:").unwrap();
        seed_users(&conn, &admins()).await.unwrap();
        assert!(issue_reset_token(&conn, "ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_reset_token_is_rejected() {
        let conn = establish_connection(":memory:").unwrap();
        seed_users(&conn, &admins()).await.unwrap();
        let issued = (Utc::now() - Duration::hours(2)).to_rfc3339();
        conn.lock()
            .await
            .execute(
                "INSERT INTO reset_tokens (token, user_id, created_at) VALUES ('old', 1, ?)",
                [issued],
            )
            .unwrap();

        assert!(check_reset_token(&conn, "old").await.unwrap().is_none());
        assert!(!reset_password(&conn, "old", "x").await.unwrap());
    }
}
