/*
`Store` methods for the `courses` and `enrollments` tables, including
the capacity-checked registration workflow.
*/
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tokio_postgres::Row;

use super::{Store, DbError};
use crate::course::Course;

/// Outcome of a registration attempt.
#[derive(Debug, PartialEq)]
pub enum RegisterResult {
    Ok,
    NoSuchCourse,
    CourseFull,
}

/// Outcome of a drop attempt.
#[derive(Debug, PartialEq)]
pub enum DropResult {
    Ok,
    NotEnrolled,
}

/// A single row from the `enrollments` table.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct Enrollment {
    pub id: i64,
    pub user_id: i64,
    pub course_id: i64,
}

pub(crate) fn course_from_row(row: &Row) -> Result<Course, DbError> {
    Ok(Course {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        number: row.try_get("number")?,
        professor: row.try_get("professor")?,
        capacity: row.try_get("capacity")?,
        enrolled: row.try_get("enrolled")?,
    })
}

fn enrollment_from_row(row: &Row) -> Result<Enrollment, DbError> {
    Ok(Enrollment {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        course_id: row.try_get("course_id")?,
    })
}

impl Store {
    /// Insert a new course with an empty roster.
    pub async fn insert_course(
        &self,
        name: &str,
        number: &str,
        professor: &str,
        capacity: i32,
    ) -> Result<Course, DbError> {
        log::trace!(
            "Store::insert_course( {:?}, {:?}, {:?}, {} ) called.",
            name, number, professor, capacity
        );

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO courses (name, number, professor, capacity, enrolled)
                VALUES ($1, $2, $3, $4, 0)
                RETURNING id",
            &[&name, &number, &professor, &capacity]
        ).await?;
        let id: i64 = row.try_get("id")?;

        Ok(Course {
            id,
            name: name.to_owned(),
            number: number.to_owned(),
            professor: professor.to_owned(),
            capacity,
            enrolled: 0,
        })
    }

    pub async fn get_courses(&self) -> Result<Vec<Course>, DbError> {
        log::trace!("Store::get_courses() called.");

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM courses ORDER BY number",
            &[]
        ).await?;

        let mut courses: Vec<Course> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            courses.push(course_from_row(row)?);
        }

        Ok(courses)
    }

    pub async fn get_course_by_id(
        &self,
        id: i64,
    ) -> Result<Option<Course>, DbError> {
        log::trace!("Store::get_course_by_id( {} ) called.", id);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM courses WHERE id = $1",
            &[&id]
        ).await? {
            None => Ok(None),
            Some(row) => Ok(Some(course_from_row(&row)?)),
        }
    }

    /// Overwrite every mutable field of the course with the given id.
    ///
    /// This is the admin panel's blunt instrument; it will happily set
    /// the enrolled counter out from under the registration workflow.
    pub async fn update_course(&self, crs: &Course) -> Result<(), DbError> {
        log::trace!("Store::update_course( {:?} ) called.", crs);

        let client = self.connect().await?;
        let n = client.execute(
            "UPDATE courses SET
                name = $1, number = $2, professor = $3,
                capacity = $4, enrolled = $5
                WHERE id = $6",
            &[
                &crs.name, &crs.number, &crs.professor,
                &crs.capacity, &crs.enrolled, &crs.id
            ]
        ).await?;

        if n == 0 {
            Err(DbError(format!("There is no course with id {}.", &crs.id)))
        } else {
            Ok(())
        }
    }

    /// Delete a course along with its enrollments and their grade records.
    pub async fn delete_course(&self, id: i64) -> Result<(), DbError> {
        log::trace!("Store::delete_course( {} ) called.", id);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        t.execute(
            "DELETE FROM students WHERE enrollment_id IN (
                SELECT id FROM enrollments WHERE course_id = $1
            )",
            &[&id]
        ).await?;
        t.execute(
            "DELETE FROM enrollments WHERE course_id = $1",
            &[&id]
        ).await?;
        let n = t.execute(
            "DELETE FROM courses WHERE id = $1",
            &[&id]
        ).await?;

        if n == 0 {
            Err(DbError(format!("There is no course with id {}.", &id)))
        } else {
            t.commit().await?;
            Ok(())
        }
    }

    /**
    Register a user for a course.

    The whole read-check-increment-insert sequence runs in one
    transaction with the course row locked (`FOR UPDATE`), so two
    simultaneous registrations for the last seat can't both pass the
    capacity check, and a failed enrollment insert rolls the counter
    back. Invariant afterward: `0 <= enrolled <= capacity`.

    There is deliberately no check for an existing enrollment; a user
    who registers twice holds two enrollment rows and two seats.
    */
    pub async fn register(
        &self,
        user_id: i64,
        course_id: i64,
    ) -> Result<RegisterResult, DbError> {
        log::trace!(
            "Store::register( {}, {} ) called.",
            user_id, course_id
        );

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let crs = match t.query_opt(
            "SELECT * FROM courses WHERE id = $1 FOR UPDATE",
            &[&course_id]
        ).await? {
            None => { return Ok(RegisterResult::NoSuchCourse); },
            Some(row) => course_from_row(&row)?,
        };

        if !crs.has_capacity() {
            log::trace!(
                "Course {} ({:?}) is full ({}/{}).",
                &crs.id, &crs.name, &crs.enrolled, &crs.capacity
            );
            return Ok(RegisterResult::CourseFull);
        }

        t.execute(
            "UPDATE courses SET enrolled = enrolled + 1 WHERE id = $1",
            &[&course_id]
        ).await?;
        t.execute(
            "INSERT INTO enrollments (user_id, course_id) VALUES ($1, $2)",
            &[&user_id, &course_id]
        ).await?;

        t.commit().await?;
        log::trace!("User {} registered for course {}.", user_id, course_id);
        Ok(RegisterResult::Ok)
    }

    /**
    Drop a user's registration in a course.

    Deletes one enrollment row and decrements the course's enrolled
    counter, in one transaction. The counter never goes below zero,
    even if the admin panel has left it desynced from the actual
    enrollment count. Any grade record hanging off the enrollment is
    left in place.
    */
    pub async fn drop_course(
        &self,
        user_id: i64,
        course_id: i64,
    ) -> Result<DropResult, DbError> {
        log::trace!(
            "Store::drop_course( {}, {} ) called.",
            user_id, course_id
        );

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        // LIMIT 1: double registration is possible, and a drop sheds
        // one enrollment at a time.
        let enrollment_id: i64 = match t.query_opt(
            "SELECT id FROM enrollments
                WHERE user_id = $1 AND course_id = $2
                ORDER BY id LIMIT 1
                FOR UPDATE",
            &[&user_id, &course_id]
        ).await? {
            None => { return Ok(DropResult::NotEnrolled); },
            Some(row) => row.try_get("id")?,
        };

        t.execute(
            "UPDATE courses SET enrolled = GREATEST(enrolled - 1, 0)
                WHERE id = $1",
            &[&course_id]
        ).await?;
        t.execute(
            "DELETE FROM enrollments WHERE id = $1",
            &[&enrollment_id]
        ).await?;

        t.commit().await?;
        log::trace!("User {} dropped course {}.", user_id, course_id);
        Ok(DropResult::Ok)
    }

    /// The set of course ids the user is currently registered in, for
    /// highlighting in the all-courses view.
    pub async fn enrolled_course_ids(
        &self,
        user_id: i64,
    ) -> Result<HashSet<i64>, DbError> {
        log::trace!("Store::enrolled_course_ids( {} ) called.", user_id);

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT course_id FROM enrollments WHERE user_id = $1",
            &[&user_id]
        ).await?;

        let mut ids: HashSet<i64> = HashSet::with_capacity(rows.len());
        for row in rows.iter() {
            ids.insert(row.try_get("course_id")?);
        }

        Ok(ids)
    }

    /// Every course the user is registered in.
    pub async fn courses_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<Course>, DbError> {
        log::trace!("Store::courses_for_user( {} ) called.", user_id);

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT courses.* FROM enrollments
                JOIN courses ON enrollments.course_id = courses.id
                WHERE enrollments.user_id = $1
                ORDER BY courses.number",
            &[&user_id]
        ).await?;

        let mut courses: Vec<Course> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            courses.push(course_from_row(row)?);
        }

        Ok(courses)
    }

    /// Every course whose professor field textually matches the given
    /// display name. Professors aren't foreign-keyed, so a renamed
    /// teacher silently stops matching his courses.
    pub async fn courses_by_professor(
        &self,
        person_name: &str,
    ) -> Result<Vec<Course>, DbError> {
        log::trace!(
            "Store::courses_by_professor( {:?} ) called.",
            person_name
        );

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM courses WHERE professor = $1 ORDER BY number",
            &[&person_name]
        ).await?;

        let mut courses: Vec<Course> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            courses.push(course_from_row(row)?);
        }

        Ok(courses)
    }

    /// Every enrollment row. Admin-panel fodder.
    pub async fn get_enrollments(&self) -> Result<Vec<Enrollment>, DbError> {
        log::trace!("Store::get_enrollments() called.");

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM enrollments ORDER BY id",
            &[]
        ).await?;

        let mut enrollments: Vec<Enrollment> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            enrollments.push(enrollment_from_row(row)?);
        }

        Ok(enrollments)
    }

    /// Raw enrollment insert for the admin panel.
    ///
    /// Does not touch the course's enrolled counter; the admin panel
    /// operates below the registration workflow, as in the original
    /// system.
    pub async fn insert_enrollment(
        &self,
        user_id: i64,
        course_id: i64,
    ) -> Result<Enrollment, DbError> {
        log::trace!(
            "Store::insert_enrollment( {}, {} ) called.",
            user_id, course_id
        );

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO enrollments (user_id, course_id)
                VALUES ($1, $2)
                RETURNING id",
            &[&user_id, &course_id]
        ).await?;

        Ok(Enrollment {
            id: row.try_get("id")?,
            user_id,
            course_id,
        })
    }

    /// Raw enrollment delete for the admin panel. Grade records are
    /// left behind, as with a workflow drop.
    pub async fn delete_enrollment(&self, id: i64) -> Result<(), DbError> {
        log::trace!("Store::delete_enrollment( {} ) called.", id);

        let client = self.connect().await?;
        let n = client.execute(
            "DELETE FROM enrollments WHERE id = $1",
            &[&id]
        ).await?;

        if n == 0 {
            Err(DbError(format!("There is no enrollment with id {}.", &id)))
        } else {
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
    use crate::user::Role;

    async fn test_store() -> Store {
        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();
        db
    }

    #[tokio::test]
    #[serial]
    async fn insert_and_list_courses() {
        ensure_logging();
        let db = test_store().await;

        db.insert_course("Intro to Chemistry", "CHEM 101", "Marie Curie", 30)
            .await.unwrap();
        let phys = db.insert_course("Mechanics", "PHYS 201", "Isaac Newton", 25)
            .await.unwrap();
        assert_eq!(phys.enrolled, 0);

        let all = db.get_courses().await.unwrap();
        assert_eq!(all.len(), 2);
        // Ordered by course number.
        assert_eq!(all[0].number.as_str(), "CHEM 101");

        let crs = db.get_course_by_id(phys.id).await.unwrap().unwrap();
        assert_eq!(crs.professor.as_str(), "Isaac Newton");
        assert!(db.get_course_by_id(phys.id + 1000).await.unwrap().is_none());

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn register_until_full() {
        ensure_logging();
        let db = test_store().await;

        let crs = db.insert_course("Mechanics", "PHYS 201", "Isaac Newton", 2)
            .await.unwrap();
        let mut student_ids: Vec<i64> = Vec::new();
        for uname in ["ada", "grace", "edsger"] {
            let u = db.insert_user(uname, Role::Student, uname)
                .await.unwrap().unwrap();
            student_ids.push(u.id);
        }

        assert_eq!(
            db.register(student_ids[0], crs.id).await.unwrap(),
            RegisterResult::Ok
        );
        assert_eq!(
            db.register(student_ids[1], crs.id).await.unwrap(),
            RegisterResult::Ok
        );
        // Third seat doesn't exist.
        assert_eq!(
            db.register(student_ids[2], crs.id).await.unwrap(),
            RegisterResult::CourseFull
        );

        let crs = db.get_course_by_id(crs.id).await.unwrap().unwrap();
        assert_eq!(crs.enrolled, 2);
        assert!(!crs.has_capacity());

        assert_eq!(
            db.register(student_ids[0], crs.id + 1000).await.unwrap(),
            RegisterResult::NoSuchCourse
        );

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn register_then_drop_restores_state() {
        ensure_logging();
        let db = test_store().await;

        let crs = db.insert_course("Mechanics", "PHYS 201", "Isaac Newton", 5)
            .await.unwrap();
        let u = db.insert_user("ada", Role::Student, "Ada Lovelace")
            .await.unwrap().unwrap();

        assert_eq!(
            db.register(u.id, crs.id).await.unwrap(),
            RegisterResult::Ok
        );
        assert!(db.enrolled_course_ids(u.id).await.unwrap().contains(&crs.id));

        assert_eq!(
            db.drop_course(u.id, crs.id).await.unwrap(),
            DropResult::Ok
        );
        let crs = db.get_course_by_id(crs.id).await.unwrap().unwrap();
        assert_eq!(crs.enrolled, 0);
        assert!(db.enrolled_course_ids(u.id).await.unwrap().is_empty());

        // Dropping again is a no-op failure.
        assert_eq!(
            db.drop_course(u.id, crs.id).await.unwrap(),
            DropResult::NotEnrolled
        );

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn drop_never_underflows_counter() {
        ensure_logging();
        let db = test_store().await;

        let crs = db.insert_course("Mechanics", "PHYS 201", "Isaac Newton", 5)
            .await.unwrap();
        let u = db.insert_user("ada", Role::Student, "Ada Lovelace")
            .await.unwrap().unwrap();

        // An admin-panel insert bypasses the counter, leaving
        // enrolled at 0 with a live enrollment row.
        db.insert_enrollment(u.id, crs.id).await.unwrap();

        assert_eq!(
            db.drop_course(u.id, crs.id).await.unwrap(),
            DropResult::Ok
        );
        let crs = db.get_course_by_id(crs.id).await.unwrap().unwrap();
        assert_eq!(crs.enrolled, 0);

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn double_registration_holds_two_seats() {
        ensure_logging();
        let db = test_store().await;

        let crs = db.insert_course("Mechanics", "PHYS 201", "Isaac Newton", 5)
            .await.unwrap();
        let u = db.insert_user("ada", Role::Student, "Ada Lovelace")
            .await.unwrap().unwrap();

        db.register(u.id, crs.id).await.unwrap();
        db.register(u.id, crs.id).await.unwrap();

        let crs2 = db.get_course_by_id(crs.id).await.unwrap().unwrap();
        assert_eq!(crs2.enrolled, 2);
        assert_eq!(db.get_enrollments().await.unwrap().len(), 2);

        // Each drop sheds one seat.
        db.drop_course(u.id, crs.id).await.unwrap();
        let crs2 = db.get_course_by_id(crs.id).await.unwrap().unwrap();
        assert_eq!(crs2.enrolled, 1);

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn course_listings() {
        ensure_logging();
        let db = test_store().await;

        let chem = db.insert_course("Intro to Chemistry", "CHEM 101", "Marie Curie", 30)
            .await.unwrap();
        let phys = db.insert_course("Mechanics", "PHYS 201", "Isaac Newton", 25)
            .await.unwrap();
        db.insert_course("Waves", "PHYS 202", "Isaac Newton", 25)
            .await.unwrap();
        let u = db.insert_user("ada", Role::Student, "Ada Lovelace")
            .await.unwrap().unwrap();

        db.register(u.id, chem.id).await.unwrap();
        db.register(u.id, phys.id).await.unwrap();

        let mine = db.courses_for_user(u.id).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].number.as_str(), "CHEM 101");

        let newtons = db.courses_by_professor("Isaac Newton").await.unwrap();
        assert_eq!(newtons.len(), 2);
        assert!(db.courses_by_professor("I. Newton").await.unwrap().is_empty());

        db.nuke_database().await.unwrap();
    }
}
