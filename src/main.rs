use std::path::PathBuf;
use std::time::Duration;

use axum::Router;
use clap::Parser;
use edify_server::{
    api::{
        AppState, public::get_public_scope, student::get_student_scope, teacher::get_teacher_scope,
    },
    config::Config,
    db, syllabus,
    utils::init_log,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::SqliteStore;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to database file
    #[arg(short, long, default_value = "database/edify.db")]
    database: PathBuf,

    /// Optional TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Syllabus TOML to import on first start
    #[arg(short, long)]
    syllabus: Option<PathBuf>,

    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Log directory (stdout if absent)
    #[arg(short, long)]
    log: Option<PathBuf>,
}

#[derive(OpenApi)]
#[openapi(paths(
    edify_server::api::public::signup,
    edify_server::api::public::login,
    edify_server::api::public::logout,
    edify_server::api::public::username_available,
    edify_server::api::public::topics,
    edify_server::api::public::chapters,
    edify_server::api::public::subtopics,
    edify_server::api::student::get_profile,
    edify_server::api::student::update_profile,
    edify_server::api::student::questions,
    edify_server::api::student::submit_quiz,
    edify_server::api::student::attempts,
    edify_server::api::student::leaderboard,
    edify_server::api::student::my_classes,
    edify_server::api::student::notifications,
    edify_server::api::student::mark_read,
    edify_server::api::student::mark_all_read,
    edify_server::api::student::delete_notification,
    edify_server::api::student::clear_notifications,
    edify_server::api::student::notification_stream,
))]
struct StudentApiDoc;

#[derive(OpenApi)]
#[openapi(paths(
    edify_server::api::public::login,
    edify_server::api::public::logout,
    edify_server::api::teacher::create_class,
    edify_server::api::teacher::my_classes,
    edify_server::api::teacher::add_student,
    edify_server::api::teacher::remove_student,
    edify_server::api::teacher::roster,
    edify_server::api::teacher::class_attempts,
    edify_server::api::teacher::notify,
))]
struct TeacherApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    let _guard = init_log(args.log.clone());

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let options = SqliteConnectOptions::new()
        .filename(&args.database)
        .create_if_missing(true)
        .foreign_keys(true);
    let database = SqlitePoolOptions::new().connect_with(options).await?;
    db::init_schema(&database).await?;

    if let Some(path) = &args.syllabus {
        if syllabus::list_topics(&database).await?.is_empty() {
            syllabus::import_from_toml(&database, path).await?;
        }
    }

    let session_store = SqliteStore::new(database.clone());
    session_store.migrate().await?;
    let session_layer = SessionManagerLayer::new(session_store).with_expiry(
        Expiry::OnInactivity(time::Duration::days(config.session_ttl_days)),
    );

    let state = AppState::new(database, config);

    println!("Starting server at http://{}:{}", args.host, args.port);
    println!(
        "Swagger UI available at http://{}:{}/swagger-ui/",
        args.host, args.port
    );

    let app = Router::new()
        .merge(
            SwaggerUi::new("/swagger-ui")
                .url("/api-docs/student/openapi.json", StudentApiDoc::openapi())
                .url("/api-docs/teacher/openapi.json", TeacherApiDoc::openapi()),
        )
        .nest(
            "/api",
            Router::new()
                .merge(get_public_scope())
                .merge(get_student_scope())
                .merge(get_teacher_scope())
                .layer(session_layer),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind((args.host.as_str(), args.port)).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
