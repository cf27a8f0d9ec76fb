/*!
Subcrate for interoperation with Admin users.

One POST endpoint, dispatched on the `x-registrar-action` header, doing
plain CRUD over the four data tables. The `admin_authenticate`
middleware has already established that the caller is a logged-in Admin
by the time anything here runs.
*/
use std::sync::Arc;

use axum::{
    extract::Extension,
    http::header::{HeaderMap, HeaderName, HeaderValue},
    Json,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;

use crate::{
    config::Glob,
    course::Course,
    store::StudentRecord,
    user::{Role, User},
};
use super::*;

pub async fn page(Extension(u): Extension<User>) -> Response {
    log::trace!("admin::page() called for {:?}.", &u.uname);

    let data = json!({
        "uname": &u.uname,
        "person_name": &u.name,
    });
    serve_template(StatusCode::OK, "admin", &data, vec![])
}

pub async fn api(
    headers: HeaderMap,
    Extension(u): Extension<User>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    body: Option<String>,
) -> Response {
    let action = match headers.get("x-registrar-action") {
        Some(act) => match act.to_str() {
            Ok(s) => s,
            Err(_) => { return respond_bad_request(
                "x-registrar-action header unrecognizable.".to_owned()
            ); },
        },
        None => { return respond_bad_request(
            "Request must have an x-registrar-action header.".to_owned()
        ); },
    };
    log::trace!("admin::api() action {:?} from {:?}.", action, &u.uname);

    match action {
        "populate-users" => populate_users(glob.clone()).await,
        "add-user" => add_user(body, glob.clone()).await,
        "update-user" => update_user(body, glob.clone()).await,
        "delete-user" => delete_user(body, glob.clone()).await,
        "populate-courses" => populate_courses(glob.clone()).await,
        "add-course" => add_course(body, glob.clone()).await,
        "update-course" => update_course(body, glob.clone()).await,
        "delete-course" => delete_course(body, glob.clone()).await,
        "populate-enrollments" => populate_enrollments(glob.clone()).await,
        "add-enrollment" => add_enrollment(body, glob.clone()).await,
        "delete-enrollment" => delete_enrollment(body, glob.clone()).await,
        "populate-students" => populate_students(glob.clone()).await,
        "add-student" => add_student(body, glob.clone()).await,
        "update-student" => update_student(body, glob.clone()).await,
        "delete-student" => delete_student(body, glob.clone()).await,
        x => respond_bad_request(
            format!("{:?} is not a recognized x-registrar-action value.", &x)
        ),
    }
}

fn populate_response<S: Serialize>(action: &'static str, data: &S) -> Response {
    (
        StatusCode::OK,
        [(
            HeaderName::from_static("x-registrar-action"),
            HeaderValue::from_static(action)
        )],
        Json(data),
    ).into_response()
}

fn deserialize_body<T>(body: Option<String>, what: &str) -> Result<T, Response>
where
    T: serde::de::DeserializeOwned,
{
    let body = match body {
        Some(body) => body,
        None => { return Err(respond_bad_request(
            "Request requires a JSON body.".to_owned()
        )); },
    };

    match serde_json::from_str(&body) {
        Ok(v) => Ok(v),
        Err(e) => {
            log::error!(
                "Error deserializing JSON {:?} as {}: {}",
                &body, what, &e
            );
            Err(respond_bad_request(
                format!("Unable to deserialize {} from request body.", what)
            ))
        },
    }
}

/*
Users.
*/

async fn populate_users(glob: Arc<RwLock<Glob>>) -> Response {
    let res = glob.read().await.data().read().await.get_users().await;

    match res {
        Err(e) => {
            log::error!("Store::get_users() error: {}", &e.display());
            text_500(Some("Unable to read users from database.".to_owned()))
        },
        Ok(users) => populate_response("populate-users", &users),
    }
}

#[derive(Debug, Deserialize)]
struct NewUser {
    uname: String,
    role: Role,
    name: String,
    password: String,
}

async fn add_user(body: Option<String>, glob: Arc<RwLock<Glob>>) -> Response {
    let nu: NewUser = match deserialize_body(body, "User") {
        Ok(nu) => nu,
        Err(r) => { return r; },
    };

    let res = glob.read().await.data().read().await.insert_user(
        &nu.uname, nu.role, &nu.name
    ).await;

    let u = match res {
        Err(e) => {
            log::error!(
                "Error inserting new user ({:?}) into database: {}",
                &nu.uname, &e.display()
            );
            return text_500(Some(
                format!("Unable to insert user into database: {}", &e.display())
            ));
        },
        Ok(None) => {
            return respond_bad_request(format!(
                "Username {:?} is already in use.", &nu.uname
            ));
        },
        Ok(Some(u)) => u,
    };

    let res = glob.read().await.auth().read().await.add_user(
        &u.uname, &nu.password, &u.salt
    ).await;
    if let Err(e) = res {
        log::error!(
            "Error inserting new user ({:?}) into auth database: {}",
            &u.uname, &e.display()
        );
        return text_500(Some(
            "Unable to insert user into auth database.".to_owned()
        ));
    }

    populate_users(glob).await
}

#[derive(Debug, Deserialize)]
struct UserUpdate {
    id: i64,
    uname: String,
    role: Role,
    name: String,
    password: Option<String>,
}

async fn update_user(body: Option<String>, glob: Arc<RwLock<Glob>>) -> Response {
    let uu: UserUpdate = match deserialize_body(body, "User") {
        Ok(uu) => uu,
        Err(r) => { return r; },
    };

    let u = User {
        id: uu.id,
        uname: uu.uname,
        role: uu.role,
        name: uu.name,
        salt: String::new(),
    };

    let res = glob.read().await.data().read().await.update_user(&u).await;
    if let Err(e) = res {
        log::error!(
            "Error updating user ({:?}) in database: {}",
            &u.uname, &e.display()
        );
        return text_500(Some(
            format!("Unable to update user: {}", &e.display())
        ));
    }

    if let Some(password) = uu.password {
        // The stored salt didn't ride in with the update body.
        let res = glob.read().await.data().read().await
            .get_user_by_uname(&u.uname).await;
        let salted = match res {
            Err(e) => {
                log::error!(
                    "Store::get_user_by_uname( {:?} ) error: {}",
                    &u.uname, &e.display()
                );
                return text_500(None);
            },
            Ok(None) => {
                return text_500(Some("Updated user has vanished.".to_owned()));
            },
            Ok(Some(u)) => u,
        };

        let res = glob.read().await.auth().read().await.set_password(
            &salted.uname, &password, &salted.salt
        ).await;
        if let Err(e) = res {
            log::error!(
                "Error setting password for {:?}: {}",
                &salted.uname, &e.display()
            );
            return text_500(Some("Unable to set password.".to_owned()));
        }
    }

    populate_users(glob).await
}

#[derive(Debug, Deserialize)]
struct UnameData {
    uname: String,
}

async fn delete_user(body: Option<String>, glob: Arc<RwLock<Glob>>) -> Response {
    let ud: UnameData = match deserialize_body(body, "uname") {
        Ok(ud) => ud,
        Err(r) => { return r; },
    };

    let res = glob.read().await.data().read().await
        .delete_user(&ud.uname).await;
    if let Err(e) = res {
        log::error!(
            "Error deleting user {:?} from database: {}",
            &ud.uname, &e.display()
        );
        return text_500(Some(
            format!("Unable to delete user: {}", &e.display())
        ));
    }

    let res = glob.read().await.auth().read().await
        .delete_user(&ud.uname).await;
    if let Err(e) = res {
        log::error!(
            "Error deleting user {:?} from auth database: {}",
            &ud.uname, &e.display()
        );
        return text_500(Some(
            "Unable to delete user from auth database.".to_owned()
        ));
    }

    populate_users(glob).await
}

/*
Courses.
*/

async fn populate_courses(glob: Arc<RwLock<Glob>>) -> Response {
    let res = glob.read().await.data().read().await.get_courses().await;

    match res {
        Err(e) => {
            log::error!("Store::get_courses() error: {}", &e.display());
            text_500(Some("Unable to read courses from database.".to_owned()))
        },
        Ok(courses) => populate_response("populate-courses", &courses),
    }
}

#[derive(Debug, Deserialize)]
struct NewCourse {
    name: String,
    number: String,
    professor: String,
    capacity: i32,
}

async fn add_course(body: Option<String>, glob: Arc<RwLock<Glob>>) -> Response {
    let nc: NewCourse = match deserialize_body(body, "Course") {
        Ok(nc) => nc,
        Err(r) => { return r; },
    };

    let res = glob.read().await.data().read().await.insert_course(
        &nc.name, &nc.number, &nc.professor, nc.capacity
    ).await;
    if let Err(e) = res {
        log::error!(
            "Error inserting new course ({:?}) into database: {}",
            &nc.number, &e.display()
        );
        return text_500(Some(
            format!("Unable to insert course: {}", &e.display())
        ));
    }

    populate_courses(glob).await
}

async fn update_course(body: Option<String>, glob: Arc<RwLock<Glob>>) -> Response {
    let crs: Course = match deserialize_body(body, "Course") {
        Ok(crs) => crs,
        Err(r) => { return r; },
    };

    let res = glob.read().await.data().read().await.update_course(&crs).await;
    if let Err(e) = res {
        log::error!(
            "Error updating course {} in database: {}",
            &crs.id, &e.display()
        );
        return text_500(Some(
            format!("Unable to update course: {}", &e.display())
        ));
    }

    populate_courses(glob).await
}

#[derive(Debug, Deserialize)]
struct IdData {
    id: i64,
}

async fn delete_course(body: Option<String>, glob: Arc<RwLock<Glob>>) -> Response {
    let idd: IdData = match deserialize_body(body, "id") {
        Ok(idd) => idd,
        Err(r) => { return r; },
    };

    let res = glob.read().await.data().read().await
        .delete_course(idd.id).await;
    if let Err(e) = res {
        log::error!(
            "Error deleting course {} from database: {}",
            &idd.id, &e.display()
        );
        return text_500(Some(
            format!("Unable to delete course: {}", &e.display())
        ));
    }

    populate_courses(glob).await
}

/*
Enrollments.
*/

async fn populate_enrollments(glob: Arc<RwLock<Glob>>) -> Response {
    let res = glob.read().await.data().read().await.get_enrollments().await;

    match res {
        Err(e) => {
            log::error!("Store::get_enrollments() error: {}", &e.display());
            text_500(Some("Unable to read enrollments from database.".to_owned()))
        },
        Ok(enrollments) => populate_response("populate-enrollments", &enrollments),
    }
}

/// Both ids are required; an enrollment row with either end dangling
/// is meaningless.
#[derive(Debug, Deserialize)]
struct NewEnrollment {
    user_id: i64,
    course_id: i64,
}

async fn add_enrollment(body: Option<String>, glob: Arc<RwLock<Glob>>) -> Response {
    let ne: NewEnrollment = match deserialize_body(body, "Enrollment") {
        Ok(ne) => ne,
        Err(r) => { return r; },
    };

    let res = glob.read().await.data().read().await.insert_enrollment(
        ne.user_id, ne.course_id
    ).await;
    if let Err(e) = res {
        log::error!(
            "Error inserting enrollment ({}, {}) into database: {}",
            &ne.user_id, &ne.course_id, &e.display()
        );
        return text_500(Some(
            format!("Unable to insert enrollment: {}", &e.display())
        ));
    }

    populate_enrollments(glob).await
}

async fn delete_enrollment(body: Option<String>, glob: Arc<RwLock<Glob>>) -> Response {
    let idd: IdData = match deserialize_body(body, "id") {
        Ok(idd) => idd,
        Err(r) => { return r; },
    };

    let res = glob.read().await.data().read().await
        .delete_enrollment(idd.id).await;
    if let Err(e) = res {
        log::error!(
            "Error deleting enrollment {} from database: {}",
            &idd.id, &e.display()
        );
        return text_500(Some(
            format!("Unable to delete enrollment: {}", &e.display())
        ));
    }

    populate_enrollments(glob).await
}

/*
Student records.
*/

async fn populate_students(glob: Arc<RwLock<Glob>>) -> Response {
    let res = glob.read().await.data().read().await.get_students().await;

    match res {
        Err(e) => {
            log::error!("Store::get_students() error: {}", &e.display());
            text_500(Some("Unable to read student records from database.".to_owned()))
        },
        Ok(students) => populate_response("populate-students", &students),
    }
}

#[derive(Debug, Deserialize)]
struct NewStudent {
    name: String,
    grade: Option<String>,
    enrollment_id: i64,
}

async fn add_student(body: Option<String>, glob: Arc<RwLock<Glob>>) -> Response {
    let ns: NewStudent = match deserialize_body(body, "StudentRecord") {
        Ok(ns) => ns,
        Err(r) => { return r; },
    };

    let res = glob.read().await.data().read().await.insert_student(
        &ns.name, ns.grade.as_deref(), ns.enrollment_id
    ).await;
    if let Err(e) = res {
        log::error!(
            "Error inserting student record ({:?}) into database: {}",
            &ns.name, &e.display()
        );
        return text_500(Some(
            format!("Unable to insert student record: {}", &e.display())
        ));
    }

    populate_students(glob).await
}

async fn update_student(body: Option<String>, glob: Arc<RwLock<Glob>>) -> Response {
    let stud: StudentRecord = match deserialize_body(body, "StudentRecord") {
        Ok(stud) => stud,
        Err(r) => { return r; },
    };

    let res = glob.read().await.data().read().await.update_student(&stud).await;
    if let Err(e) = res {
        log::error!(
            "Error updating student record {} in database: {}",
            &stud.id, &e.display()
        );
        return text_500(Some(
            format!("Unable to update student record: {}", &e.display())
        ));
    }

    populate_students(glob).await
}

async fn delete_student(body: Option<String>, glob: Arc<RwLock<Glob>>) -> Response {
    let idd: IdData = match deserialize_body(body, "id") {
        Ok(idd) => idd,
        Err(r) => { return r; },
    };

    let res = glob.read().await.data().read().await
        .delete_student(idd.id).await;
    if let Err(e) = res {
        log::error!(
            "Error deleting student record {} from database: {}",
            &idd.id, &e.display()
        );
        return text_500(Some(
            format!("Unable to delete student record: {}", &e.display())
        ));
    }

    populate_students(glob).await
}
