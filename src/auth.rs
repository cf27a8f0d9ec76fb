/*!
Authentication database interaction.

Credentials live in their own database, apart from the data store:

```sql
CREATE TABLE passwords (
    uname TEXT PRIMARY KEY,
    hash  TEXT NOT NULL    /* hex SHA-256 of salt+password */
);

CREATE TABLE keys (
    key   TEXT PRIMARY KEY,
    uname TEXT NOT NULL
);
```

A row in `keys` is a live session: issued at login, checked by the
session middleware on every protected request, deleted at logout.
Re-login replaces any prior key for the same uname.

Per-user salts are stored on the user record in the data store; this
module only ever sees them as arguments.
*/
use std::fmt::Write;

use rand::{Rng, distributions};
use sha2::{Digest, Sha256};
use tokio_postgres::{Client, NoTls};

const KEY_LENGTH: usize = 32;
const KEY_CHARS: &str =
"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

static SCHEMA: &[(&str, &str, &str)] = &[
    (
        "SELECT FROM information_schema.tables WHERE table_name = 'passwords'",
        "CREATE TABLE passwords (
            uname TEXT PRIMARY KEY,
            hash  TEXT NOT NULL
        )",
        "DROP TABLE passwords",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'keys'",
        "CREATE TABLE keys (
            key   TEXT PRIMARY KEY,
            uname TEXT NOT NULL
        )",
        "DROP TABLE keys",
    ),
];

#[derive(Debug, PartialEq)]
pub struct AuthError(String);

impl AuthError {
    /// Prepend some contextual `annotation` for the error.
    fn annotate(self, annotation: &str) -> Self {
        let s = format!("{}: {}", annotation, &self.0);
        Self(s)
    }

    pub fn display(&self) -> &str { &self.0 }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", &self.0)
    }
}

impl From<tokio_postgres::error::Error> for AuthError {
    fn from(e: tokio_postgres::error::Error) -> AuthError {
        let mut s = format!("Auth DB: {}", &e);
        if let Some(dbe) = e.as_db_error() {
            write!(&mut s, "; {}", dbe).unwrap();
        }
        AuthError(s)
    }
}

/// What came of asking the auth database something.
#[derive(Debug, PartialEq)]
pub enum AuthResult {
    Ok,
    /// Password good; here's a fresh session key.
    Key(String),
    BadPassword,
    NoSuchUser,
    InvalidKey,
}

/// Salted hex digest as stored in the `passwords` table.
fn password_hash(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    let digest = hasher.finalize();

    let mut hex = String::with_capacity(2 * digest.len());
    for byte in digest.iter() {
        write!(&mut hex, "{:02x}", byte).unwrap();
    }
    hex
}

pub struct Db {
    connection_string: String,
    key_chars: Vec<char>,
    key_length: usize,
}

impl Db {
    pub fn new(connection_string: String) -> Self {
        log::trace!("auth::Db::new( {:?} ) called.", &connection_string);

        let key_chars: Vec<char> = KEY_CHARS.chars().collect();
        let key_length = KEY_LENGTH;

        Self { connection_string, key_chars, key_length }
    }

    /// Generate a new session key.
    fn generate_key(&self) -> String {
        // self.key_chars should never have zero length.
        let dist = distributions::Slice::new(&self.key_chars).unwrap();
        let rng = rand::thread_rng();
        let new_key: String = rng.sample_iter(&dist)
            .take(self.key_length)
            .collect();
        new_key
    }

    async fn connect(&self) -> Result<Client, AuthError> {
        log::trace!(
            "auth::Db::connect() called w/connection string {:?}",
            &self.connection_string
        );

        match tokio_postgres::connect(&self.connection_string, NoTls).await {
            Ok((client, connection)) => {
                log::trace!("    ...connection successful.");
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        log::error!("Auth DB connection error: {}", &e);
                    } else {
                        log::trace!("tokio connection runtime drops.");
                    }
                });
                Ok(client)
            },
            Err(e) => {
                let autherr = AuthError::from(e);
                log::trace!("    ...connection failed: {:?}", &autherr);
                Err(autherr.annotate("Unable to connect"))
            }
        }
    }

    pub async fn ensure_db_schema(&self) -> Result<(), AuthError> {
        log::trace!("auth::Db::ensure_db_schema() called.");

        let mut client = self.connect().await?;
        let t = client.transaction().await
            .map_err(|e| AuthError::from(e)
                .annotate("Auth DB unable to begin transaction"))?;

        for (test_stmt, create_stmt, _) in SCHEMA.iter() {
            if t.query_opt(test_stmt.to_owned(), &[]).await?.is_none() {
                log::info!(
                    "{:?} returned no results; attempting to insert table.",
                    test_stmt
                );
                t.execute(create_stmt.to_owned(), &[]).await?;
            }
        }

        t.commit().await
            .map_err(|e| AuthError::from(e)
                .annotate("Error committing transaction"))
    }

    /// Drop all auth tables to fully reset database state. Testing only.
    #[cfg(test)]
    pub async fn nuke_database(&self) -> Result<(), AuthError> {
        log::trace!("auth::Db::nuke_database() called.");

        let client = self.connect().await?;

        for (_, _, drop_stmt) in SCHEMA.iter().rev() {
            if let Err(e) = client.execute(drop_stmt.to_owned(), &[]).await {
                let err = AuthError::from(e);
                log::error!("Error dropping: {:?}: {}", &drop_stmt, &err.display());
            }
        }

        Ok(())
    }

    /// Store the salted hash of a new user's password.
    pub async fn add_user(
        &self,
        uname: &str,
        password: &str,
        salt: &str,
    ) -> Result<(), AuthError> {
        log::trace!("auth::Db::add_user( {:?}, ..., {:?} ) called.", uname, salt);

        let client = self.connect().await?;
        client.execute(
            "INSERT INTO passwords (uname, hash) VALUES ($1, $2)",
            &[&uname, &password_hash(password, salt)]
        ).await.map_err(|e| AuthError::from(e)
            .annotate("Error inserting password hash"))?;

        Ok(())
    }

    /// Overwrite an existing user's password hash.
    pub async fn set_password(
        &self,
        uname: &str,
        password: &str,
        salt: &str,
    ) -> Result<AuthResult, AuthError> {
        log::trace!("auth::Db::set_password( {:?}, ..., {:?} ) called.", uname, salt);

        let client = self.connect().await?;
        let n = client.execute(
            "UPDATE passwords SET hash = $1 WHERE uname = $2",
            &[&password_hash(password, salt), &uname]
        ).await?;

        match n {
            0 => Ok(AuthResult::NoSuchUser),
            _ => Ok(AuthResult::Ok),
        }
    }

    /// Remove a user's password and any live session keys.
    pub async fn delete_user(&self, uname: &str) -> Result<(), AuthError> {
        log::trace!("auth::Db::delete_user( {:?} ) called.", uname);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        t.execute("DELETE FROM keys WHERE uname = $1", &[&uname]).await?;
        t.execute("DELETE FROM passwords WHERE uname = $1", &[&uname]).await?;

        t.commit().await?;
        Ok(())
    }

    pub async fn check_password(
        &self,
        uname: &str,
        password: &str,
        salt: &str,
    ) -> Result<AuthResult, AuthError> {
        log::trace!("auth::Db::check_password( {:?}, ..., {:?} ) called.", uname, salt);

        let client = self.connect().await?;
        let row = match client.query_opt(
            "SELECT hash FROM passwords WHERE uname = $1",
            &[&uname]
        ).await? {
            None => { return Ok(AuthResult::NoSuchUser); },
            Some(row) => row,
        };

        let stored: &str = row.try_get("hash")?;
        if stored == password_hash(password, salt).as_str() {
            Ok(AuthResult::Ok)
        } else {
            Ok(AuthResult::BadPassword)
        }
    }

    /**
    Check a password and, if it's good, issue a session key.

    Any key previously issued to the same uname is invalidated; one
    live session per user.
    */
    pub async fn check_password_and_issue_key(
        &self,
        uname: &str,
        password: &str,
        salt: &str,
    ) -> Result<AuthResult, AuthError> {
        log::trace!(
            "auth::Db::check_password_and_issue_key( {:?}, ..., {:?} ) called.",
            uname, salt
        );

        match self.check_password(uname, password, salt).await? {
            AuthResult::Ok => { /* Proceed to key issuance. */ },
            x => { return Ok(x); },
        }

        let key = self.generate_key();

        let mut client = self.connect().await?;
        let t = client.transaction().await?;
        t.execute("DELETE FROM keys WHERE uname = $1", &[&uname]).await?;
        t.execute(
            "INSERT INTO keys (key, uname) VALUES ($1, $2)",
            &[&key, &uname]
        ).await?;
        t.commit().await?;

        Ok(AuthResult::Key(key))
    }

    /// Is this (uname, key) pair a live session?
    pub async fn check_key(
        &self,
        uname: &str,
        key: &str,
    ) -> Result<AuthResult, AuthError> {
        log::trace!("auth::Db::check_key( {:?}, {:?} ) called.", uname, key);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT uname FROM keys WHERE key = $1",
            &[&key]
        ).await? {
            None => Ok(AuthResult::InvalidKey),
            Some(row) => {
                let key_uname: &str = row.try_get("uname")?;
                if key_uname == uname {
                    Ok(AuthResult::Ok)
                } else {
                    Ok(AuthResult::InvalidKey)
                }
            },
        }
    }

    /// End a user's session, if any. Logging out while not logged in
    /// is not an error.
    pub async fn delete_key(&self, uname: &str) -> Result<(), AuthError> {
        log::trace!("auth::Db::delete_key( {:?} ) called.", uname);

        let client = self.connect().await?;
        let n = client.execute(
            "DELETE FROM keys WHERE uname = $1",
            &[&uname]
        ).await?;
        log::trace!("    ...{} key(s) deleted.", &n);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    /*!
    Like the store tests, these assume a local Postgres with:

    ```text
    user: registrar_test
    password: registrar_test

    with write access to:

    database: registrar_auth_test
    ```
    */
    use super::*;
    use crate::tests::ensure_logging;

    use serial_test::serial;

    pub static TEST_CONNECTION: &str = "host=localhost user=registrar_test password='registrar_test' dbname=registrar_auth_test";

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn reset_auth() {
        ensure_logging();
        let db = Db::new(TEST_CONNECTION.to_owned());
        db.nuke_database().await.unwrap();
    }

    #[test]
    fn hashes_are_salted() {
        let a = password_hash("hunter2", "aaaa");
        let b = password_hash("hunter2", "bbbb");
        assert_ne!(a, b);
        assert_eq!(a, password_hash("hunter2", "aaaa"));
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    #[serial]
    async fn passwords() {
        ensure_logging();

        let db = Db::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        db.add_user("ada", "hunter2", "s4lt").await.unwrap();

        assert_eq!(
            db.check_password("ada", "hunter2", "s4lt").await.unwrap(),
            AuthResult::Ok
        );
        assert_eq!(
            db.check_password("ada", "wrong", "s4lt").await.unwrap(),
            AuthResult::BadPassword
        );
        assert_eq!(
            db.check_password("nobody", "hunter2", "s4lt").await.unwrap(),
            AuthResult::NoSuchUser
        );

        assert_eq!(
            db.set_password("ada", "xyzzy", "s4lt").await.unwrap(),
            AuthResult::Ok
        );
        assert_eq!(
            db.check_password("ada", "hunter2", "s4lt").await.unwrap(),
            AuthResult::BadPassword
        );
        assert_eq!(
            db.check_password("ada", "xyzzy", "s4lt").await.unwrap(),
            AuthResult::Ok
        );
        assert_eq!(
            db.set_password("nobody", "xyzzy", "s4lt").await.unwrap(),
            AuthResult::NoSuchUser
        );

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn session_keys() {
        ensure_logging();

        let db = Db::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        db.add_user("ada", "hunter2", "s4lt").await.unwrap();

        let key = match db.check_password_and_issue_key("ada", "hunter2", "s4lt")
            .await.unwrap()
        {
            AuthResult::Key(k) => k,
            x => panic!("expected a key, got {:?}", x),
        };
        assert_eq!(key.len(), KEY_LENGTH);
        assert_eq!(
            db.check_key("ada", &key).await.unwrap(),
            AuthResult::Ok
        );
        // The right key under the wrong uname is no session.
        assert_eq!(
            db.check_key("eve", &key).await.unwrap(),
            AuthResult::InvalidKey
        );

        // Bad password issues nothing.
        assert_eq!(
            db.check_password_and_issue_key("ada", "wrong", "s4lt")
                .await.unwrap(),
            AuthResult::BadPassword
        );

        // Re-login invalidates the old key.
        let key2 = match db.check_password_and_issue_key("ada", "hunter2", "s4lt")
            .await.unwrap()
        {
            AuthResult::Key(k) => k,
            x => panic!("expected a key, got {:?}", x),
        };
        assert_ne!(key, key2);
        assert_eq!(
            db.check_key("ada", &key).await.unwrap(),
            AuthResult::InvalidKey
        );
        assert_eq!(
            db.check_key("ada", &key2).await.unwrap(),
            AuthResult::Ok
        );

        // Logout.
        db.delete_key("ada").await.unwrap();
        assert_eq!(
            db.check_key("ada", &key2).await.unwrap(),
            AuthResult::InvalidKey
        );

        // Deleting a user takes his auth rows with him.
        db.delete_user("ada").await.unwrap();
        assert_eq!(
            db.check_password("ada", "hunter2", "s4lt").await.unwrap(),
            AuthResult::NoSuchUser
        );

        db.nuke_database().await.unwrap();
    }
}
