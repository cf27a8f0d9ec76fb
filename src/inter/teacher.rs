/*!
Subcrate for interoperation with Teacher users: the dashboard, the
taught-course list, rosters, and grade updates.
*/
use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    Form, Json,
    response::{IntoResponse, Redirect, Response},
};
use serde_json::json;
use tokio::sync::RwLock;

use crate::{
    config::Glob,
    store::GradeUpdate,
    user::User,
};
use super::*;

pub async fn dashboard(
    Path(uname): Path<String>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("teacher::dashboard( {:?} ) called.", &uname);

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
            serve_template(StatusCode::OK, "teacher", &data, vec![])
        },
    }
}

/// The courses whose professor field matches the viewer's display name.
pub async fn courses(
    Extension(u): Extension<User>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("teacher::courses() called for {:?}.", &u.uname);

    let res = glob.read().await.data().read().await
        .courses_by_professor(&u.name).await;

    let courses = match res {
        Err(e) => {
            log::error!(
                "Store::courses_by_professor( {:?} ) error: {}",
                &u.name, &e.display()
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
    serve_template(StatusCode::OK, "teacher_courses", &data, vec![])
}

/// A course's roster: every registered student record and its grade.
pub async fn view_course(
    Path(course_id): Path<i64>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("teacher::view_course( {} ) called.", course_id);

    let res = glob.read().await.data().read().await
        .roster(course_id).await;

    let (crs, roster) = match res {
        Err(e) => {
            log::error!(
                "Store::roster( {} ) error: {}",
                course_id, &e.display()
            );
            return html_500();
        },
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                "Course not found".to_owned(),
            ).into_response();
        },
        Ok(Some(pair)) => pair,
    };

    let data = json!({
        "course": &crs,
        "students": roster,
    });
    serve_template(StatusCode::OK, "view_course", &data, vec![])
}

/**
Overwrite a student record's grade and bounce the caller back to the
roster he was looking at.

A grade written to a record whose enrollment has since been dropped has
no roster to go back to; the taught-course list is the next best place.
*/
pub async fn update_grade(
    Path(student_id): Path<i64>,
    Extension(u): Extension<User>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Form(form): Form<GradeData>,
) -> Response {
    log::trace!(
        "teacher::update_grade( {}, {:?} ) called by {:?}.",
        student_id, &form.new_grade, &u.uname
    );

    let res = glob.read().await.data().read().await
        .update_grade(student_id, &form.new_grade).await;

    match res {
        Err(e) => {
            log::error!(
                "Store::update_grade( {}, {:?} ) error: {}",
                student_id, &form.new_grade, &e.display()
            );
            text_500(None)
        },
        Ok(GradeUpdate::NoSuchStudent) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "Student not found" })),
        ).into_response(),
        Ok(GradeUpdate::Ok { course_id }) => {
            Redirect::to(&format!("/course/{}", course_id)).into_response()
        },
        Ok(GradeUpdate::OrphanedRecord) => {
            log::warn!(
                "Student record {} graded by {:?} with no live enrollment.",
                student_id, &u.uname
            );
            Redirect::to("/teacher/courses").into_response()
        },
    }
}
