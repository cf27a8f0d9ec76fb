/*!
Interoperation between the client (user) and server.

(Not the application and the database; that's covered by `auth` and
`store`.)
*/
use std::{
    fmt::Debug,
    path::Path,
    sync::Arc,
};

use axum::{
    http::{header, Request, StatusCode},
    http::header::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
};
use handlebars::Handlebars;
use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::json;
use tokio::sync::RwLock;

use crate::auth::AuthResult;
use crate::config::Glob;
use crate::user::{Role, User};

pub mod admin;
pub mod login;
pub mod student;
pub mod teacher;

static TEMPLATES: OnceCell<Handlebars> = OnceCell::new();

/// Cookie names for the session pair set at login.
const UNAME_COOKIE: &str = "registrar-uname";
const KEY_COOKIE: &str = "registrar-key";

static HTML_500: &str = r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>registrar | Error</title>
<link rel="stylesheet" href="/static/registrar.css">
</head>
<body>
<h1>Internal Server Error</h1>
<p>(Error 500)</p>
<p>Something went wrong on our end. No further or more
helpful information is available about the problem.</p>
</body>
</html>"#;

static TEXT_500: &str = "An internal error occurred; an appropriate response was inconstructable.";

trait AddHeaders: IntoResponse + Sized {
    fn add_headers(self, mut new_headers: Vec<(HeaderName, HeaderValue)>) -> Response {
        let mut r = self.into_response();
        let r_headers = r.headers_mut();
        for (name, value) in new_headers.drain(..) {
            // append, not insert; there may be several Set-Cookie values
            r_headers.append(name, value);
        }

        r
    }
}

impl<T: IntoResponse + Sized> AddHeaders for T {}

/// Data type to read the form data from a front-page login request.
#[derive(serde::Deserialize, Debug)]
pub struct LoginData {
    pub uname: String,
    pub password: String,
}

/// Form data from the account-creation page.
#[derive(serde::Deserialize, Debug)]
pub struct CreateAccData {
    pub uname: String,
    pub person_name: String,
    pub password: String,
    pub user_type: String,
}

/// Form data from the grade box on a roster page.
#[derive(serde::Deserialize, Debug)]
pub struct GradeData {
    pub new_grade: String,
}

/**
Initializes the resources used in this module. This function should be
called before any functionality of this module or any of its submodules
is used.

Currently the only thing that happens here is loading the templates used
by `serve_template()`, which will panic unless `init()` has been called
first.

The argument is the path to the directory where the templates used by
`serve_template()` can be found.
*/
pub fn init<P: AsRef<Path>>(template_dir: P) -> Result<(), String> {
    if TEMPLATES.get().is_some() {
        log::warn!("Templates directory already initialized; ignoring.");
        return Ok(())
    }

    let template_dir = template_dir.as_ref();

    let mut h = Handlebars::new();
    #[cfg(debug_assertions)]
    h.set_dev_mode(true);
    h.register_templates_directory(".html", template_dir)
        .map_err(|e| format!(
            "Error registering templates directory {}: {}",
            template_dir.display(), &e
        ))?;

    TEMPLATES.set(h)
        .map_err(|old_h| {
            let mut estr = String::from("Templates directory already registered w/templates:");
            for template_name in old_h.get_templates().keys() {
                estr.push('\n');
                estr.push_str(template_name.as_str());
            }
            estr
        })?;

    Ok(())
}

/**
Return an HTML response in the case of an unrecoverable* error.

(*"Unrecoverable" from the perspective of fielding the current request,
not from the perspective of the program crashing.)
*/
pub fn html_500() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(HTML_500)
    ).into_response()
}

pub fn text_500(text: Option<String>) -> Response {
    match text {
        Some(text) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            text
        ).into_response(),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            TEXT_500.to_owned()
        ).into_response()
    }
}

pub fn serve_template<S>(
    code: StatusCode,
    template_name: &str,
    data: &S,
    addl_headers: Vec<(HeaderName, HeaderValue)>
) -> Response
where
    S: Serialize + Debug
{
    log::trace!("serve_template( {}, {:?}, ... ) called.", &code, template_name);

    match TEMPLATES.get().unwrap().render(template_name, data) {
        Ok(response_body) => (
            code,
            Html(response_body)
        ).add_headers(addl_headers),
        Err(e) => {
            log::error!(
                "Error rendering template {:?} with data {:?}:\n{}",
                template_name, data, &e
            );
            html_500()
        },
    }
}

/// Serve the login page with the generic credential-failure message.
///
/// Deliberately the same response whether the uname was unknown or the
/// password was wrong.
pub fn respond_bad_password() -> Response {
    log::trace!("respond_bad_password() called.");

    let data = json!({
        "error_message": "Invalid username or password."
    });

    serve_template(
        StatusCode::UNAUTHORIZED,
        "login",
        &data,
        vec![]
    )
}

pub fn respond_bad_request(msg: String) -> Response {
    log::trace!("respond_bad_request( {:?} ) called.", &msg);

    (
        StatusCode::BAD_REQUEST,
        msg
    ).into_response()
}

/// Pull the value of the cookie with the given name out of a request's
/// `Cookie` header, if it's there.
fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;

    for pair in cookies.split(';') {
        if let Some((k, v)) = pair.trim().split_once('=') {
            if k == name {
                return Some(v);
            }
        }
    }

    None
}

/// The pair of `Set-Cookie` headers that establishes a session.
pub(crate) fn session_cookies(
    uname: &str,
    key: &str,
) -> Result<Vec<(HeaderName, HeaderValue)>, String> {
    let uname_val = HeaderValue::from_str(
        &format!("{}={}; Path=/; HttpOnly", UNAME_COOKIE, uname)
    ).map_err(|e| format!(
        "Error making session cookie from uname {:?}: {}", uname, &e
    ))?;
    let key_val = HeaderValue::from_str(
        &format!("{}={}; Path=/; HttpOnly", KEY_COOKIE, key)
    ).map_err(|e| format!(
        "Error making session cookie from key {:?}: {}", key, &e
    ))?;

    Ok(vec![
        (header::SET_COOKIE, uname_val),
        (header::SET_COOKIE, key_val),
    ])
}

/// The pair of `Set-Cookie` headers that tears a session down.
pub(crate) fn expired_session_cookies() -> Vec<(HeaderName, HeaderValue)> {
    vec![
        (
            header::SET_COOKIE,
            HeaderValue::from_static("registrar-uname=; Path=/; HttpOnly; Max-Age=0"),
        ),
        (
            header::SET_COOKIE,
            HeaderValue::from_static("registrar-key=; Path=/; HttpOnly; Max-Age=0"),
        ),
    ]
}

/**
Validate a request's session cookie pair and fetch the user it belongs
to.

On any failure (missing cookies, stale key, vanished user) the caller
gets a redirect to the entry page to send back instead, which is what
the original system does for unauthenticated requests.
*/
async fn resolve_session<B>(req: &Request<B>) -> Result<User, Response> {
    let glob: &Arc<RwLock<Glob>> = req.extensions().get().unwrap();

    let uname = match cookie_value(req.headers(), UNAME_COOKIE) {
        Some(u) => u.to_owned(),
        None => { return Err(Redirect::to("/").into_response()); },
    };
    let key = match cookie_value(req.headers(), KEY_COOKIE) {
        Some(k) => k.to_owned(),
        None => { return Err(Redirect::to("/").into_response()); },
    };

    // We return the result, then match on the returned value, instead
    // of matching on the whole chain expression, so the locks release.
    let res = glob.read().await.auth().read().await.check_key(
        &uname, &key
    ).await;

    match res {
        Err(e) => {
            log::error!(
                "auth::Db::check_key( {:?}, {:?} ) returned error: {}",
                &uname, &key, &e.display()
            );
            return Err(text_500(None));
        },
        Ok(AuthResult::Ok) => { /* Live session; carry on. */ },
        Ok(AuthResult::InvalidKey) => {
            return Err(Redirect::to("/").into_response());
        },
        Ok(x) => {
            log::warn!(
                "auth::Db::check_key() returned {:?}, which should never happen.",
                &x
            );
            return Err(text_500(None));
        },
    }

    let res = glob.read().await.data().read().await
        .get_user_by_uname(&uname).await;

    match res {
        Err(e) => {
            log::error!(
                "Store::get_user_by_uname( {:?} ) returned error: {}",
                &uname, &e.display()
            );
            Err(text_500(None))
        },
        Ok(None) => {
            // A key for a user who no longer exists; the admin panel
            // can do that.
            log::warn!("Live session key for nonexistent user {:?}.", &uname);
            Err(Redirect::to("/").into_response())
        },
        Ok(Some(u)) => Ok(u),
    }
}

/// Middleware function guarding the routes that require a login.
///
/// Stashes the resolved `User` in the request's extensions, so handlers
/// get the current user handed to them instead of consulting any kind
/// of global.
pub async fn session_authenticate<B>(
    mut req: Request<B>,
    next: Next<B>
) -> Response {
    let u = match resolve_session(&req).await {
        Ok(u) => u,
        Err(r) => { return r; },
    };

    req.extensions_mut().insert(u);
    next.run(req).await
}

/// Middleware function guarding the admin panel: a valid session whose
/// user is an Admin. Anyone else gets sent back to the entry page
/// rather than an error.
pub async fn admin_authenticate<B>(
    mut req: Request<B>,
    next: Next<B>
) -> Response {
    let u = match resolve_session(&req).await {
        Ok(u) => u,
        Err(r) => { return r; },
    };

    if u.role != Role::Admin {
        log::trace!(
            "{:?} ({}) tried the admin panel; redirecting.",
            &u.uname, &u.role
        );
        return Redirect::to("/").into_response();
    }

    req.extensions_mut().insert(u);
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_map_with_cookies(value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(header::COOKIE, HeaderValue::from_str(value).unwrap());
        h
    }

    #[test]
    fn cookie_parsing() {
        let h = header_map_with_cookies(
            "registrar-uname=ada; registrar-key=abc123; theme=dark"
        );
        assert_eq!(cookie_value(&h, UNAME_COOKIE), Some("ada"));
        assert_eq!(cookie_value(&h, KEY_COOKIE), Some("abc123"));
        assert_eq!(cookie_value(&h, "theme"), Some("dark"));
        assert_eq!(cookie_value(&h, "flavor"), None);

        let empty = HeaderMap::new();
        assert_eq!(cookie_value(&empty, UNAME_COOKIE), None);
    }

    #[test]
    fn session_cookie_headers() {
        let cookies = session_cookies("ada", "abc123").unwrap();
        assert_eq!(cookies.len(), 2);
        for (name, _) in cookies.iter() {
            assert_eq!(name, &header::SET_COOKIE);
        }
        assert!(
            cookies[0].1.to_str().unwrap()
                .starts_with("registrar-uname=ada")
        );

        // A uname with control characters can't become a cookie.
        assert!(session_cookies("a\nda", "abc123").is_err());
    }
}
