/*!
Subcrate for interoperation with Student users: the dashboard, the
course catalog, and the register/drop endpoints.
*/
use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    Json,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use tokio::sync::RwLock;

use crate::{
    config::Glob,
    course::Course,
    store::{DropResult, RegisterResult},
    user::User,
};
use super::*;

/// One row of the course catalog, flagged if the viewer is registered
/// in it so the page can highlight it.
#[derive(Debug, Serialize)]
struct CatalogRow<'a> {
    id: i64,
    name: &'a str,
    number: &'a str,
    professor: &'a str,
    capacity: i32,
    enrolled: i32,
    registered: bool,
}

impl<'a> CatalogRow<'a> {
    fn from_course(crs: &'a Course, registered: bool) -> CatalogRow<'a> {
        CatalogRow {
            id: crs.id,
            name: &crs.name,
            number: &crs.number,
            professor: &crs.professor,
            capacity: crs.capacity,
            enrolled: crs.enrolled,
            registered,
        }
    }
}

pub async fn dashboard(
    Path(uname): Path<String>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("student::dashboard( {:?} ) called.", &uname);

    let res = glob.read().await.data().read().await
        .get_user_by_uname(&uname).await;

    match res {
        Err(e) => {
            log::error!(
                "Store::get_user_by_uname( {:?} ) error: {}",
                &uname, &e.display()
            );
            html_500()
        },
        Ok(None) => (
            StatusCode::NOT_FOUND,
            format!("No user with username {:?}.", &uname),
        ).into_response(),
        Ok(Some(u)) => {
            let data = json!({
                "person_name": &u.name,
                "uname": &u.uname,
            });
            serve_template(StatusCode::OK, "student", &data, vec![])
        },
    }
}

/// The full catalog, with the viewer's registrations flagged.
pub async fn all_courses(
    Extension(u): Extension<User>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("student::all_courses() called for {:?}.", &u.uname);

    let (courses, enrolled_ids) = {
        let glob = glob.read().await;
        let data = glob.data();
        let data = data.read().await;

        let courses = match data.get_courses().await {
            Ok(courses) => courses,
            Err(e) => {
                log::error!("Store::get_courses() error: {}", &e.display());
                return html_500();
            },
        };
        let enrolled_ids = match data.enrolled_course_ids(u.id).await {
            Ok(ids) => ids,
            Err(e) => {
                log::error!(
                    "Store::enrolled_course_ids( {} ) error: {}",
                    &u.id, &e.display()
                );
                return html_500();
            },
        };

        (courses, enrolled_ids)
    };

    let rows: Vec<CatalogRow> = courses.iter()
        .map(|crs| CatalogRow::from_course(crs, enrolled_ids.contains(&crs.id)))
        .collect();

    let data = json!({
        "uname": &u.uname,
        "courses": rows,
    });
    serve_template(StatusCode::OK, "all_courses", &data, vec![])
}

pub async fn register(
    Path(course_id): Path<i64>,
    Extension(u): Extension<User>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!(
        "student::register( {} ) called for {:?}.",
        course_id, &u.uname
    );

    let res = glob.read().await.data().read().await
        .register(u.id, course_id).await;

    match res {
        Err(e) => {
            log::error!(
                "Store::register( {}, {} ) error: {}",
                &u.id, course_id, &e.display()
            );
            text_500(None)
        },
        Ok(RegisterResult::Ok) => Json(json!({
            "message": "Successfully registered for the course"
        })).into_response(),
        // The original doesn't distinguish these two, and neither do we.
        Ok(RegisterResult::CourseFull) | Ok(RegisterResult::NoSuchCourse) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "Course is full or not found" })),
        ).into_response(),
    }
}

pub async fn drop_course(
    Path(course_id): Path<i64>,
    Extension(u): Extension<User>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!(
        "student::drop_course( {} ) called for {:?}.",
        course_id, &u.uname
    );

    let res = glob.read().await.data().read().await
        .drop_course(u.id, course_id).await;

    match res {
        Err(e) => {
            log::error!(
                "Store::drop_course( {}, {} ) error: {}",
                &u.id, course_id, &e.display()
            );
            text_500(None)
        },
        Ok(DropResult::Ok) => Json(json!({
            "message": "Successfully dropped the course"
        })).into_response(),
        Ok(DropResult::NotEnrolled) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "You are not enrolled in this course" })),
        ).into_response(),
    }
}

/// The courses the viewer is currently registered in.
pub async fn registered_courses(
    Extension(u): Extension<User>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("student::registered_courses() called for {:?}.", &u.uname);

    let res = glob.read().await.data().read().await
        .courses_for_user(u.id).await;

    let courses = match res {
        Err(e) => {
            log::error!(
                "Store::courses_for_user( {} ) error: {}",
                &u.id, &e.display()
            );
            return html_500();
        },
        Ok(courses) => courses,
    };

    let data = json!({
        "person_name": &u.name,
        "uname": &u.uname,
        "courses": courses,
    });
    serve_template(StatusCode::OK, "student_courses", &data, vec![])
}
