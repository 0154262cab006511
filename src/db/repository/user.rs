use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{expect_affected, timestamp_column, uuid_column};
use crate::db::{format_timestamp, DatabaseError};
use crate::models::User;

const USER_COLUMNS: &str =
    "id, username, email, first_name, last_name, password_hash, date_joined";

pub fn insert_user(conn: &Connection, user: &User) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO users (id, username, email, first_name, last_name, password_hash, date_joined)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            user.id.to_string(),
            user.username,
            user.email,
            user.first_name,
            user.last_name,
            user.password_hash,
            format_timestamp(&user.date_joined),
        ],
    )
    .map_err(DatabaseError::from_write)?;
    Ok(())
}

pub fn get_user(conn: &Connection, id: &Uuid) -> Result<Option<User>, DatabaseError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    conn.query_row(&sql, params![id.to_string()], row_to_user)
        .optional()
        .map_err(DatabaseError::from)
}

pub fn get_user_by_username(
    conn: &Connection,
    username: &str,
) -> Result<Option<User>, DatabaseError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1");
    conn.query_row(&sql, params![username], row_to_user)
        .optional()
        .map_err(DatabaseError::from)
}

pub fn username_exists(conn: &Connection, username: &str) -> Result<bool, DatabaseError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)",
        params![username],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Overwrite the editable identity fields of a user.
pub fn update_user_names(
    conn: &Connection,
    id: &Uuid,
    first_name: &str,
    last_name: &str,
    email: &str,
) -> Result<(), DatabaseError> {
    let affected = conn
        .execute(
            "UPDATE users SET first_name = ?2, last_name = ?3, email = ?4 WHERE id = ?1",
            params![id.to_string(), first_name, last_name, email],
        )
        .map_err(DatabaseError::from_write)?;
    expect_affected(affected, "user", id)
}

pub fn count_users(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    Ok(count)
}

pub(crate) fn row_to_user(row: &rusqlite::Row) -> Result<User, rusqlite::Error> {
    Ok(User {
        id: uuid_column(row, 0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        password_hash: row.get(5)?,
        date_joined: timestamp_column(row, 6)?,
    })
}
