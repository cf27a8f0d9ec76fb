/*
`Store` methods for the `students` table: the per-enrollment grade
records, the roster join, and grade updates.
*/
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;

use super::{Store, DbError};
use crate::course::Course;

/// A single row from the `students` table.
///
/// Distinct from a `User` with the Student role; this is the gradable
/// record tied to one enrollment.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StudentRecord {
    pub id: i64,
    pub name: String,
    pub grade: Option<String>,
    pub enrollment_id: i64,
}

/// One line of a course roster.
#[derive(Clone, Debug, Serialize)]
pub struct RosterRow {
    pub student_id: i64,
    pub name: String,
    pub grade: Option<String>,
}

/// Outcome of a grade update.
#[derive(Debug, PartialEq)]
pub enum GradeUpdate {
    /// Grade written; the id of the course to send the caller back to.
    Ok { course_id: i64 },
    NoSuchStudent,
    /// Grade written, but the record's enrollment no longer exists
    /// (its course was dropped), so there is no roster to return to.
    OrphanedRecord,
}

fn student_from_row(row: &Row) -> Result<StudentRecord, DbError> {
    Ok(StudentRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        grade: row.try_get("grade")?,
        enrollment_id: row.try_get("enrollment_id")?,
    })
}

impl Store {
    /**
    The course with the given id together with its roster: one row per
    live enrollment that has a grade record attached.

    Returns `Ok(None)` if the course doesn't exist. Grade records whose
    enrollment has been dropped don't appear; the join is driven from
    `enrollments`.
    */
    pub async fn roster(
        &self,
        course_id: i64,
    ) -> Result<Option<(Course, Vec<RosterRow>)>, DbError> {
        log::trace!("Store::roster( {} ) called.", course_id);

        let client = self.connect().await?;

        let crs = match client.query_opt(
            "SELECT * FROM courses WHERE id = $1",
            &[&course_id]
        ).await? {
            None => { return Ok(None); },
            Some(row) => super::courses::course_from_row(&row)?,
        };

        let rows = client.query(
            "SELECT students.id, students.name, students.grade
                FROM enrollments
                JOIN students ON students.enrollment_id = enrollments.id
                WHERE enrollments.course_id = $1
                ORDER BY students.name",
            &[&course_id]
        ).await?;

        let mut roster: Vec<RosterRow> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            roster.push(RosterRow {
                student_id: row.try_get("id")?,
                name: row.try_get("name")?,
                grade: row.try_get("grade")?,
            });
        }

        Ok(Some((crs, roster)))
    }

    /**
    Overwrite the grade of the student record with the given id.

    No validation is done on the grade text. The record's enrollment and
    course are then looked up step by step (rather than traversed
    implicitly) to find the roster to send the caller back to; a record
    whose enrollment is gone still gets its grade written, but reports
    `OrphanedRecord` instead of a course id.
    */
    pub async fn update_grade(
        &self,
        student_id: i64,
        new_grade: &str,
    ) -> Result<GradeUpdate, DbError> {
        log::trace!(
            "Store::update_grade( {}, {:?} ) called.",
            student_id, new_grade
        );

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let stud = match t.query_opt(
            "SELECT * FROM students WHERE id = $1 FOR UPDATE",
            &[&student_id]
        ).await? {
            None => { return Ok(GradeUpdate::NoSuchStudent); },
            Some(row) => student_from_row(&row)?,
        };

        t.execute(
            "UPDATE students SET grade = $1 WHERE id = $2",
            &[&new_grade, &student_id]
        ).await?;

        let course_id: Option<i64> = match t.query_opt(
            "SELECT course_id FROM enrollments WHERE id = $1",
            &[&stud.enrollment_id]
        ).await? {
            None => None,
            Some(row) => Some(row.try_get("course_id")?),
        };

        t.commit().await?;
        log::trace!(
            "Grade of student record {} set to {:?}.",
            student_id, new_grade
        );

        match course_id {
            Some(course_id) => Ok(GradeUpdate::Ok { course_id }),
            None => {
                log::warn!(
                    "Student record {} graded, but enrollment {} is gone.",
                    student_id, &stud.enrollment_id
                );
                Ok(GradeUpdate::OrphanedRecord)
            },
        }
    }

    /// Every student record, live or orphaned. Admin-panel fodder.
    pub async fn get_students(&self) -> Result<Vec<StudentRecord>, DbError> {
        log::trace!("Store::get_students() called.");

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM students ORDER BY id",
            &[]
        ).await?;

        let mut students: Vec<StudentRecord> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            students.push(student_from_row(row)?);
        }

        Ok(students)
    }

    pub async fn insert_student(
        &self,
        name: &str,
        grade: Option<&str>,
        enrollment_id: i64,
    ) -> Result<StudentRecord, DbError> {
        log::trace!(
            "Store::insert_student( {:?}, {:?}, {} ) called.",
            name, grade, enrollment_id
        );

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO students (name, grade, enrollment_id)
                VALUES ($1, $2, $3)
                RETURNING id",
            &[&name, &grade, &enrollment_id]
        ).await?;

        Ok(StudentRecord {
            id: row.try_get("id")?,
            name: name.to_owned(),
            grade: grade.map(|g| g.to_owned()),
            enrollment_id,
        })
    }

    pub async fn update_student(
        &self,
        stud: &StudentRecord,
    ) -> Result<(), DbError> {
        log::trace!("Store::update_student( {:?} ) called.", stud);

        let client = self.connect().await?;
        let n = client.execute(
            "UPDATE students SET name = $1, grade = $2, enrollment_id = $3
                WHERE id = $4",
            &[&stud.name, &stud.grade, &stud.enrollment_id, &stud.id]
        ).await?;

        if n == 0 {
            Err(DbError(format!(
                "There is no student record with id {}.", &stud.id
            )))
        } else {
            Ok(())
        }
    }

    pub async fn delete_student(&self, id: i64) -> Result<(), DbError> {
        log::trace!("Store::delete_student( {} ) called.", id);

        let client = self.connect().await?;
        let n = client.execute(
            "DELETE FROM students WHERE id = $1",
            &[&id]
        ).await?;

        if n == 0 {
            Err(DbError(format!(
                "There is no student record with id {}.", &id
            )))
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

    /// A course with one registered, graded student; returns
    /// (course_id, user_id, student_record_id).
    async fn seed_roster(db: &Store) -> (i64, i64, i64) {
        let crs = db.insert_course("Mechanics", "PHYS 201", "Isaac Newton", 5)
            .await.unwrap();
        let u = db.insert_user("ada", Role::Student, "Ada Lovelace")
            .await.unwrap().unwrap();
        db.register(u.id, crs.id).await.unwrap();
        let enr = &db.get_enrollments().await.unwrap()[0];
        let stud = db.insert_student("Ada Lovelace", None, enr.id)
            .await.unwrap();
        (crs.id, u.id, stud.id)
    }

    #[tokio::test]
    #[serial]
    async fn roster_and_grade_update() {
        ensure_logging();
        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let (course_id, _, student_id) = seed_roster(&db).await;

        let (crs, roster) = db.roster(course_id).await.unwrap().unwrap();
        assert_eq!(crs.id, course_id);
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].name.as_str(), "Ada Lovelace");
        assert!(roster[0].grade.is_none());

        assert_eq!(
            db.update_grade(student_id, "A-").await.unwrap(),
            GradeUpdate::Ok { course_id }
        );
        let (_, roster) = db.roster(course_id).await.unwrap().unwrap();
        assert_eq!(roster[0].grade.as_deref(), Some("A-"));

        // Grades are overwritten unconditionally; any text goes.
        assert_eq!(
            db.update_grade(student_id, "see me after class").await.unwrap(),
            GradeUpdate::Ok { course_id }
        );

        assert!(db.roster(course_id + 1000).await.unwrap().is_none());
        assert_eq!(
            db.update_grade(student_id + 1000, "A").await.unwrap(),
            GradeUpdate::NoSuchStudent
        );

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn dropped_course_orphans_grade_record() {
        ensure_logging();
        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let (course_id, user_id, student_id) = seed_roster(&db).await;

        db.drop_course(user_id, course_id).await.unwrap();

        // The record survives the drop but is off the roster.
        let (_, roster) = db.roster(course_id).await.unwrap().unwrap();
        assert!(roster.is_empty());
        assert_eq!(db.get_students().await.unwrap().len(), 1);

        // Grading it still works, but there's no course to return to.
        assert_eq!(
            db.update_grade(student_id, "B+").await.unwrap(),
            GradeUpdate::OrphanedRecord
        );
        let stud = &db.get_students().await.unwrap()[0];
        assert_eq!(stud.grade.as_deref(), Some("B+"));

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn student_record_crud() {
        ensure_logging();
        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let (_, _, student_id) = seed_roster(&db).await;

        let mut stud = db.get_students().await.unwrap().remove(0);
        assert_eq!(stud.id, student_id);
        stud.grade = Some("C".to_owned());
        db.update_student(&stud).await.unwrap();
        assert_eq!(
            db.get_students().await.unwrap()[0].grade.as_deref(),
            Some("C")
        );

        db.delete_student(student_id).await.unwrap();
        assert!(db.get_students().await.unwrap().is_empty());
        assert!(db.delete_student(student_id).await.is_err());

        db.nuke_database().await.unwrap();
    }
}
