/*!
The entry pages: login, account creation, logout.
*/
use std::sync::Arc;

use axum::{
    extract::Extension,
    Form,
    response::{Redirect, Response},
};
use serde_json::json;
use tokio::sync::RwLock;

use crate::{
    auth::AuthResult,
    config::Glob,
    user::{Role, User},
};
use super::*;

pub async fn login_page() -> Response {
    serve_template(StatusCode::OK, "login", &json!({}), vec![])
}

pub async fn create_acc_page() -> Response {
    serve_template(StatusCode::OK, "create_acc", &json!({}), vec![])
}

/// The course-listing page shell; the course table gets filled in by a
/// trip to `/get_all_courses` once the viewer is logged in.
pub async fn all_courses_page() -> Response {
    serve_template(StatusCode::OK, "all_courses", &json!({}), vec![])
}

fn landing_uri(u: &User) -> String {
    match u.role {
        Role::Admin => "/admin".to_owned(),
        Role::Teacher => format!("/teacher/{}", &u.uname),
        Role::Student => format!("/student/{}", &u.uname),
    }
}

pub async fn login(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Form(form): Form<LoginData>,
) -> Response {
    log::trace!("login( {:?}, ... ) called.", &form.uname);

    let res = glob.read().await.data().read().await
        .get_user_by_uname(&form.uname).await;

    let u = match res {
        Err(e) => {
            log::error!(
                "Store::get_user_by_uname( {:?} ) error: {}",
                &form.uname, &e.display()
            );
            return html_500();
        },
        // Same response as a bad password; don't leak which unames exist.
        Ok(None) => { return respond_bad_password(); },
        Ok(Some(u)) => u,
    };

    let auth_response = {
        glob.read().await.auth().read().await.check_password_and_issue_key(
            &u.uname,
            &form.password,
            &u.salt
        ).await
    };

    let auth_key = match auth_response {
        Err(e) => {
            log::error!(
                "auth::Db::check_password_and_issue_key( {:?}, ..., {:?} ): {}",
                &u.uname, &u.salt, &e.display()
            );
            return html_500();
        },
        Ok(AuthResult::Key(k)) => k,
        Ok(AuthResult::BadPassword) => { return respond_bad_password(); },
        Ok(x) => {
            log::warn!(
                "auth::Db::check_password_and_issue_key( {:?}, ..., {:?} ) returned {:?}, which shouldn't ever happen.",
                &u.uname, &u.salt, &x
            );
            return respond_bad_password();
        },
    };

    let cookies = match session_cookies(&u.uname, &auth_key) {
        Ok(cookies) => cookies,
        Err(e) => {
            log::error!("{}", &e);
            return html_500();
        },
    };

    Redirect::to(&landing_uri(&u)).add_headers(cookies)
}

pub async fn create_acc(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Form(form): Form<CreateAccData>,
) -> Response {
    log::trace!(
        "create_acc( {:?}, {:?}, {:?} ) called.",
        &form.uname, &form.person_name, &form.user_type
    );

    let role: Role = match form.user_type.parse() {
        Ok(role) => role,
        Err(_) => {
            let data = json!({
                "error_message": "Invalid user type selected."
            });
            return serve_template(
                StatusCode::BAD_REQUEST, "create_acc", &data, vec![]
            );
        },
    };

    let res = glob.read().await.data().read().await.insert_user(
        &form.uname, role, &form.person_name
    ).await;

    let u = match res {
        Err(e) => {
            log::error!(
                "Store::insert_user( {:?}, {}, {:?} ) error: {}",
                &form.uname, &role, &form.person_name, &e.display()
            );
            return html_500();
        },
        Ok(None) => {
            let data = json!({
                "error_message": "Account already exists under this Username"
            });
            return serve_template(
                StatusCode::BAD_REQUEST, "create_acc", &data, vec![]
            );
        },
        Ok(Some(u)) => u,
    };

    let res = glob.read().await.auth().read().await.add_user(
        &u.uname, &form.password, &u.salt
    ).await;

    if let Err(e) = res {
        log::error!(
            "auth::Db::add_user( {:?}, ..., {:?} ) error: {}",
            &u.uname, &u.salt, &e.display()
        );
        // Don't leave behind an account nobody can log in to.
        if let Err(e) = glob.read().await.data().read().await
            .delete_user(&u.uname).await
        {
            log::error!(
                "Error removing half-created user {:?}: {}",
                &u.uname, &e.display()
            );
        }
        return html_500();
    }

    let data = json!({
        "notice": "Account created successfully! Please log in."
    });
    serve_template(StatusCode::OK, "login", &data, vec![])
}

pub async fn logout(
    Extension(u): Extension<User>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("logout( {:?} ) called.", &u.uname);

    let res = glob.read().await.auth().read().await
        .delete_key(&u.uname).await;

    if let Err(e) = res {
        log::error!(
            "auth::Db::delete_key( {:?} ) error: {}",
            &u.uname, &e.display()
        );
        return html_500();
    }

    Redirect::to("/").add_headers(expired_session_cookies())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landing_by_role() {
        let mut u = User {
            id: 1,
            uname: "ada".to_owned(),
            role: Role::Student,
            name: "Ada Lovelace".to_owned(),
            salt: String::new(),
        };
        assert_eq!(landing_uri(&u).as_str(), "/student/ada");

        u.role = Role::Teacher;
        assert_eq!(landing_uri(&u).as_str(), "/teacher/ada");

        u.role = Role::Admin;
        assert_eq!(landing_uri(&u).as_str(), "/admin");
    }
}
