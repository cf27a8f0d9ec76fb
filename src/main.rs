/*!
Server setup: logging, configuration, routes.
*/
use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    Router,
    routing::{get, get_service, post},
};
use simplelog::{ColorChoice, TerminalMode, TermLogger};
use tokio::sync::RwLock;
use tower_http::services::fs::ServeDir;

use registrar::config;
use registrar::inter;
use registrar::inter::{admin, login, student, teacher};

const DEFAULT_CONFIG_FILE: &str = "registrar.toml";

async fn catchall_error_handler(e: std::io::Error) -> impl IntoResponse {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Unhandled internal error: {}", &e)
    )
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let log_cfg = simplelog::ConfigBuilder::new()
        .add_filter_allow_str("registrar")
        .build();
    TermLogger::init(
        registrar::log_level_from_env(),
        log_cfg,
        TerminalMode::Stdout,
        ColorChoice::Auto
    ).unwrap();
    log::info!("Logging started.");

    let config_path = std::env::var("REGISTRAR_CONFIG")
        .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_owned());
    let glob = config::load_configuration(&config_path).await.unwrap();

    inter::init(&glob.templates_dir).unwrap();

    let addr = glob.addr;
    let glob = Arc::new(RwLock::new(glob));

    let serve_static = get_service(ServeDir::new("static"))
        .handle_error(catchall_error_handler);

    let authed = Router::new()
        .route("/student/:uname", get(student::dashboard))
        .route("/teacher/courses", get(teacher::courses))
        .route("/teacher/:uname", get(teacher::dashboard))
        .route("/get_all_courses", get(student::all_courses))
        .route("/register_for_course/:course_id", post(student::register))
        .route("/drop_course/:course_id", post(student::drop_course))
        .route("/student_courses", get(student::registered_courses))
        .route("/update_grade/:student_id", post(teacher::update_grade))
        .route("/logout", get(login::logout))
        .route_layer(middleware::from_fn(inter::session_authenticate));

    let admin_panel = Router::new()
        .route("/admin", get(admin::page))
        .route("/admin/api", post(admin::api))
        .route_layer(middleware::from_fn(inter::admin_authenticate));

    let app = Router::new()
        .route("/", get(login::login_page))
        .route("/create_acc_page", get(login::create_acc_page))
        .route("/all_courses", get(login::all_courses_page))
        .route("/login", post(login::login))
        .route("/create_acc", post(login::create_acc))
        // Roster pages are world-readable; only grade updates need a login.
        .route("/course/:course_id", get(teacher::view_course))
        .merge(authed)
        .merge(admin_panel)
        .nest_service("/static", serve_static)
        .layer(Extension(glob));

    log::info!("Listening on {}", &addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .unwrap();
}
