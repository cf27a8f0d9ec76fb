/*
`Store` methods for dealing with rows from the `users` table.
*/
use tokio_postgres::{Row, Transaction, types::ToSql};

use super::{Store, DbError};
use crate::user::{Role, User};

pub(crate) fn user_from_row(row: &Row) -> Result<User, DbError> {
    log::trace!("user_from_row( {:?} ) called.", row);

    let role_str: &str = row.try_get("role")?;
    let u = User {
        id: row.try_get("id")?,
        uname: row.try_get("uname")?,
        role: role_str.parse()?,
        name: row.try_get("name")?,
        salt: row.try_get("salt")?,
    };

    log::trace!("    ...user_from_row() returning {:?}", &u);
    Ok(u)
}

/// Return the role of extant user `uname`, if he exists.
///
/// This is used when inserting new users, mainly to ensure good error
/// messaging when a username is already in use.
async fn check_existing_user_role(
    t: &Transaction<'_>,
    uname: &str,
) -> Result<Option<Role>, DbError> {
    log::trace!("check_existing_user_role( T, {:?} ) called.", uname);

    match t.query_opt(
        "SELECT role FROM users WHERE uname = $1",
        &[&uname]
    ).await.map_err(|e|
        DbError(format!("{}", &e))
            .annotate("Error querying for preexisting uname")
    )? {
        None => Ok(None),
        Some(row) => {
            let role_str: &str = row.try_get("role")
                .map_err(|e|
                    DbError(format!("{}", &e))
                        .annotate("Error getting role of preexisting uname")
                )?;
            let role: Role = role_str.parse()
                .map_err(|e|
                    DbError(format!("{}", &e))
                        .annotate("Error parsing role of preexisting uname")
                )?;
            Ok(Some(role))
        },
    }
}

impl Store {
    /**
    Insert a new user, generating a fresh salt for him.

    Returns `Ok(None)` if the uname is already in use, so the
    account-creation flow can distinguish "taken" from a database error.
    */
    pub async fn insert_user(
        &self,
        uname: &str,
        role: Role,
        name: &str,
    ) -> Result<Option<User>, DbError> {
        log::trace!(
            "Store::insert_user( {:?}, {}, {:?} ) called.",
            uname, role, name
        );

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        if let Some(role) = check_existing_user_role(&t, uname).await? {
            log::trace!(
                "uname {:?} already in use with role {}; not inserting.",
                uname, &role
            );
            return Ok(None);
        }

        let salt = self.generate_salt();
        let row = t.query_one(
            "INSERT INTO users (uname, role, name, salt)
                VALUES ($1, $2, $3, $4)
                RETURNING id",
            &[&uname, &role.to_string(), &name, &salt]
        ).await?;
        let id: i64 = row.try_get("id")?;

        t.commit().await?;
        log::trace!("Inserted {} {:?} ({}).", &role, uname, name);

        Ok(Some(User {
            id,
            uname: uname.to_owned(),
            role,
            name: name.to_owned(),
            salt,
        }))
    }

    pub async fn get_user_by_uname(
        &self,
        uname: &str,
    ) -> Result<Option<User>, DbError> {
        log::trace!("Store::get_user_by_uname( {:?} ) called.", uname);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM users WHERE uname = $1",
            &[&uname]
        ).await? {
            None => Ok(None),
            Some(row) => Ok(Some(user_from_row(&row)?)),
        }
    }

    pub async fn get_user_by_id(
        &self,
        id: i64,
    ) -> Result<Option<User>, DbError> {
        log::trace!("Store::get_user_by_id( {} ) called.", id);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM users WHERE id = $1",
            &[&id]
        ).await? {
            None => Ok(None),
            Some(row) => Ok(Some(user_from_row(&row)?)),
        }
    }

    /// Every user in the system, ordered by uname. Admin-panel fodder.
    pub async fn get_users(&self) -> Result<Vec<User>, DbError> {
        log::trace!("Store::get_users() called.");

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM users ORDER BY uname",
            &[]
        ).await?;

        let mut users: Vec<User> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            users.push(user_from_row(row)?);
        }

        Ok(users)
    }

    /// Overwrite the mutable fields of the user with the given id.
    ///
    /// The salt is not touched; it was fixed when the account was created.
    pub async fn update_user(&self, u: &User) -> Result<(), DbError> {
        log::trace!("Store::update_user( {:?} ) called.", u);

        let client = self.connect().await?;
        let n = client.execute(
            "UPDATE users SET uname = $1, role = $2, name = $3
                WHERE id = $4",
            &[&u.uname, &u.role.to_string(), &u.name, &u.id]
        ).await?;

        if n == 0 {
            Err(DbError(format!("There is no user with id {}.", &u.id)))
        } else {
            Ok(())
        }
    }

    /**
    Deletes a user from the database, regardless of role.

    It's not clever; it shotgun deletes any grade records and enrollments
    hanging off the given `uname` before deleting the entry from the
    `users` table, so the enrollment foreign key can't object.
    */
    pub async fn delete_user(
        &self,
        uname: &str,
    ) -> Result<(), DbError> {
        log::trace!("Store::delete_user( {:?} ) called.", uname);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let params: [&(dyn ToSql + Sync); 1] = [&uname];

        let n = t.execute(
            "DELETE FROM students WHERE enrollment_id IN (
                SELECT enrollments.id FROM enrollments
                    JOIN users ON enrollments.user_id = users.id
                    WHERE users.uname = $1
            )",
            &params[..]
        ).await?;
        if n > 0 {
            log::trace!("{} grade record(s) of {} deleted.", &n, uname);
        }

        let n = t.execute(
            "DELETE FROM enrollments WHERE user_id IN (
                SELECT id FROM users WHERE uname = $1
            )",
            &params[..]
        ).await?;
        if n > 0 {
            log::trace!("{} enrollment(s) of {} deleted.", &n, uname);
        }

        let n = t.execute(
            "DELETE FROM users WHERE uname = $1",
            &[&uname]
        ).await?;

        if n == 0 {
            Err(DbError(format!("There is no user with uname {:?}.", uname)))
        } else {
            t.commit().await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;

    use crate::tests::ensure_logging;
    use crate::store::tests::TEST_CONNECTION;

    static USERS: &[(&str, Role, &str)] = &[
        ("thelma", Role::Admin, "Thelma Johnson"),
        ("mcurie", Role::Teacher, "Marie Curie"),
        ("jsmith", Role::Student, "John Smith"),
    ];

    #[tokio::test]
    #[serial]
    async fn insert_users() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        for (uname, role, name) in USERS.iter() {
            let u = db.insert_user(uname, *role, name).await.unwrap().unwrap();
            assert_eq!(
                (*uname, *role, *name),
                (u.uname.as_str(), u.role, u.name.as_str())
            );
            assert!(!u.salt.is_empty());
        }

        for (uname, role, name) in USERS.iter() {
            let u = db.get_user_by_uname(uname).await.unwrap().unwrap();
            assert_eq!(
                (*uname, *role, *name),
                (u.uname.as_str(), u.role, u.name.as_str())
            );
            let v = db.get_user_by_id(u.id).await.unwrap().unwrap();
            assert_eq!(u.uname, v.uname);
        }

        assert!(db.get_user_by_uname("nobody").await.unwrap().is_none());

        for (uname, _, _) in USERS.iter() {
            db.delete_user(uname).await.unwrap();
        }
        assert!(db.delete_user("thelma").await.is_err());

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn duplicate_uname_rejected() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        db.insert_user("jsmith", Role::Student, "John Smith")
            .await.unwrap().unwrap();
        // Same uname, even with a different role, should not go in.
        let dup = db.insert_user("jsmith", Role::Teacher, "Jane Smithe")
            .await.unwrap();
        assert!(dup.is_none());

        let all = db.get_users().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name.as_str(), "John Smith");

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn update_user_fields() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let mut u = db.insert_user("mcurie", Role::Student, "Marie Curie")
            .await.unwrap().unwrap();
        u.role = Role::Teacher;
        u.name = "Dr Marie Curie".to_owned();
        db.update_user(&u).await.unwrap();

        let v = db.get_user_by_uname("mcurie").await.unwrap().unwrap();
        assert_eq!(v.role, Role::Teacher);
        assert_eq!(v.name.as_str(), "Dr Marie Curie");
        assert_eq!(v.salt, u.salt);

        let ghost = User {
            id: v.id + 1000,
            uname: "ghost".to_owned(),
            role: Role::Student,
            name: "No One".to_owned(),
            salt: String::new(),
        };
        assert!(db.update_user(&ghost).await.is_err());

        db.nuke_database().await.unwrap();
    }
}
