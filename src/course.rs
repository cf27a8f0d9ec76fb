/*!
Course records.
*/
use serde::{Deserialize, Serialize};

/**
A single row from the `courses` table.

`professor` is the teaching user's display name, not a key into the
`users` table; the teacher-courses view matches on it textually.
*/
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Course {
    pub id: i64,
    pub name: String,
    pub number: String,
    pub professor: String,
    pub capacity: i32,
    pub enrolled: i32,
}

impl Course {
    /// Whether at least one seat remains.
    pub fn has_capacity(&self) -> bool {
        self.enrolled < self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course_with_seats(capacity: i32, enrolled: i32) -> Course {
        Course {
            id: 1,
            name: "Intro to Chemistry".to_owned(),
            number: "CHEM 101".to_owned(),
            professor: "Marie Curie".to_owned(),
            capacity,
            enrolled,
        }
    }

    #[test]
    fn capacity_predicate() {
        assert!(course_with_seats(2, 0).has_capacity());
        assert!(course_with_seats(2, 1).has_capacity());
        assert!(!course_with_seats(2, 2).has_capacity());
        assert!(!course_with_seats(0, 0).has_capacity());
    }
}
