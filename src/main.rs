use actix_cors::Cors;
use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::{
    cookie::Key,
    middleware::{DefaultHeaders, Logger},
    web, App, HttpResponse, HttpServer, Responder,
};
use clap::Parser;
use editorial_backend::{
    config::Config,
    helper::media_helpers::LocalObjectStorage,
    models::db_operations::{gateway::RedbGateway, users_db_operations::IdentityStore},
    routes, AppState,
};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

async fn root_handler() -> impl Responder {
    HttpResponse::Ok().content_type("text/plain").body("OK")
}

#[derive(Parser, Debug)]
#[command(name = "editorial_server", author, version, about = "Starts the editorial web server.")]
struct Cli {
    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

fn fatal(message: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("FATAL: {}", message))
}

fn build_cors(allowed_origins: &str) -> Cors {
    let cors = if allowed_origins.trim() == "*" {
        Cors::default().allow_any_origin()
    } else {
        allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    };
    cors.allowed_methods(vec!["GET", "POST"])
        .allowed_headers(vec![
            actix_web::http::header::AUTHORIZATION,
            actix_web::http::header::ACCEPT,
            actix_web::http::header::CONTENT_TYPE,
        ])
        .supports_credentials()
        .max_age(3600)
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env(&cli.env_file).map_err(fatal)?;

    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    fs::create_dir_all(&config.media_path)?;

    let content_path = config.content_db_path();
    let identity_path = config.identity_db_path();
    if !content_path.exists() || !identity_path.exists() {
        return Err(fatal(
            "databases not found. Run 'cargo run --bin setup_cli -- --env-file <path> db setup'",
        ));
    }

    let gateway = RedbGateway::open(&content_path).map_err(fatal)?;
    let pool = Pool::builder()
        .build(SqliteConnectionManager::file(&identity_path))
        .map_err(fatal)?;
    let storage = LocalObjectStorage::new(&config.media_path, &config.media_public_url).map_err(fatal)?;

    let app_state = web::Data::new(AppState {
        gateway: Arc::new(gateway),
        identity: IdentityStore::new(pool, config.session_ttl()),
        storage: Arc::new(storage),
        admin_url_prefix: config.admin_url_prefix.clone(),
        max_upload_size_mb: config.max_upload_size_mb,
    });

    let session_key_bytes = hex::decode(&config.session_secret_key).map_err(fatal)?;
    let session_key = Key::try_from(session_key_bytes.as_slice()).map_err(fatal)?;

    let server_address = format!("{}:{}", config.web.host, config.web.port);
    log::info!("Server starting at http://{}", server_address);
    println!("🚀 Server starting at http://{}", server_address);

    HttpServer::new(move || {
        let session_mw = SessionMiddleware::builder(CookieSessionStore::default(), session_key.clone())
            .cookie_secure(config.use_secure_cookies)
            .cookie_http_only(true)
            .cookie_same_site(actix_web::cookie::SameSite::Lax)
            .build();

        App::new()
            .wrap(build_cors(&config.allowed_origins))
            .wrap(Logger::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY"))
                    .add(("X-XSS-Protection", "1; mode=block")),
            )
            .app_data(app_state.clone())
            .configure(routes::public::config_api)
            .service(actix_files::Files::new("/media", &config.media_path))
            .route("/", web::get().to(root_handler))
            .service(
                web::scope("/management")
                    .wrap(session_mw)
                    .service(web::scope(&config.admin_url_prefix).configure(routes::admin::config_admin)),
            )
    })
    .bind(server_address)?
    .run()
    .await
}
