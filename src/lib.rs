//! Voucher system web shell: resolves the runtime configuration and serves
//! the application with the middleware stack it describes.
use actix_files::Files;
use actix_identity::IdentityMiddleware;
use actix_session::{SessionMiddleware, storage::CookieSessionStore};
use actix_web::body::MessageBody;
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::http::header;
use actix_web::{App, HttpServer, web};
use actix_web_flash_messages::{FlashMessagesFramework, storage::CookieMessageStore};
use tera::Tera;

use crate::middleware::{AllowedHosts, CsrfOriginCheck};
use crate::models::config::{RuntimeConfig, ServerConfig, StorageConfig};
use crate::routes::StaticUrl;
use crate::services::ServiceError;

pub mod domain;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

/// Log target of this crate, used to build the logger filter.
pub const LOG_TARGET: &str = "voucher_system";

/// Errors that stop the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to load templates: {0}")]
    Templates(#[from] tera::Error),
    #[error("failed to load static manifest: {0}")]
    StaticManifest(#[from] ServiceError),
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mount point for a URL prefix such as `/static/`.
fn mount_path(url: &str) -> &str {
    url.trim_end_matches('/')
}

/// Register routes plus the static and media file services.
pub fn configure(cfg: &mut web::ServiceConfig, runtime: &RuntimeConfig) {
    cfg.service(routes::main::home).service(routes::main::logout);

    let static_files = runtime.static_files();
    cfg.service(Files::new(
        mount_path(&static_files.url),
        static_files.root.clone(),
    ));

    // Remote storage serves media itself.
    if let StorageConfig::Local { root, url } = runtime.storage() {
        cfg.service(Files::new(mount_path(url), root.clone()));
    }
}

/// Templates from the configured directories, with `static_url` registered.
pub fn prepare_templates(runtime: &RuntimeConfig) -> Result<Tera, StartupError> {
    let mut tera = routes::load_templates(runtime.templates())?;
    tera.register_function("static_url", StaticUrl::new(runtime.static_files())?);
    Ok(tera)
}

/// Build the application with its full middleware stack.
///
/// Middleware, outermost first: request logging, response compression,
/// security and clickjacking headers, trailing-slash normalisation, host
/// allow-list, CSRF origin check, session, authentication, flash messages.
pub fn build_app(
    runtime: web::Data<RuntimeConfig>,
    templates: web::Data<Tera>,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let key = runtime.secret_key().cookie_key();
    let message_store = CookieMessageStore::builder(key.clone()).build();
    let message_framework = FlashMessagesFramework::builder(message_store).build();
    let session = SessionMiddleware::builder(CookieSessionStore::default(), key)
        .cookie_secure(!runtime.debug_enabled())
        .build();
    let allowed_hosts = AllowedHosts::new(runtime.allowed_hosts());

    App::new()
        .app_data(runtime.clone())
        .app_data(templates)
        .configure(|cfg| configure(cfg, &runtime))
        .wrap(message_framework)
        .wrap(IdentityMiddleware::default())
        .wrap(session)
        .wrap(CsrfOriginCheck)
        .wrap(allowed_hosts)
        .wrap(actix_web::middleware::NormalizePath::trim())
        .wrap(
            actix_web::middleware::DefaultHeaders::new()
                .add((header::X_CONTENT_TYPE_OPTIONS, "nosniff"))
                .add((header::REFERRER_POLICY, "same-origin"))
                .add((header::X_FRAME_OPTIONS, "DENY")),
        )
        .wrap(actix_web::middleware::Compress::default())
        .wrap(actix_web::middleware::Logger::default())
}

/// Start the HTTP server with the resolved configuration.
pub async fn run(server: ServerConfig, runtime: RuntimeConfig) -> Result<(), StartupError> {
    let templates = web::Data::new(prepare_templates(&runtime)?);

    log::info!(
        "Serving with {} database {}, debug={}",
        runtime.database().engine(),
        runtime.database(),
        runtime.debug_enabled()
    );
    log::debug!("Allowed hosts: {:?}", runtime.allowed_hosts());

    let runtime = web::Data::new(runtime);
    let bind_address = (server.address.clone(), server.port);

    HttpServer::new(move || build_app(runtime.clone(), templates.clone()))
        .bind(bind_address)?
        .run()
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use actix_identity::Identity;
    use actix_web::http::StatusCode;
    use actix_web::test::{TestRequest, call_and_read_body, call_service, init_service};
    use actix_web::{HttpMessage, HttpRequest, HttpResponse};
    use tempfile::tempdir;

    use super::*;
    use crate::models::environment::{EnvSnapshot, RENDER, SECRET_KEY};

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn runtime(base: &Path, vars: &[(&str, &str)]) -> web::Data<RuntimeConfig> {
        let mut all = vec![(SECRET_KEY, SECRET)];
        all.extend_from_slice(vars);
        web::Data::new(RuntimeConfig::resolve(&EnvSnapshot::from_map(all), base).unwrap())
    }

    fn templates() -> web::Data<Tera> {
        let mut tera = Tera::default();
        tera.add_raw_template("home.html", "home {{ request_path | safe }}")
            .unwrap();
        web::Data::new(tera)
    }

    async fn sign_in(req: HttpRequest) -> HttpResponse {
        Identity::login(&req.extensions(), "alice".into()).unwrap();
        HttpResponse::Ok().finish()
    }

    fn assert_security_headers<B>(resp: &ServiceResponse<B>) {
        let headers = resp.headers();
        assert_eq!(headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
        assert_eq!(headers.get(header::REFERRER_POLICY).unwrap(), "same-origin");
        assert_eq!(headers.get(header::X_FRAME_OPTIONS).unwrap(), "DENY");
    }

    #[test]
    fn mount_path_drops_trailing_slash() {
        assert_eq!(mount_path("/static/"), "/static");
        assert_eq!(mount_path("/media"), "/media");
    }

    #[actix_web::test]
    async fn serves_static_and_media_from_base_dir() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("staticfiles/css")).unwrap();
        fs::create_dir_all(dir.path().join("media")).unwrap();
        fs::write(dir.path().join("staticfiles/css/site.css"), "body {}").unwrap();
        fs::write(dir.path().join("media/logo.txt"), "logo").unwrap();

        let runtime = runtime(dir.path(), &[]);
        let app = init_service(App::new().configure(|cfg| configure(cfg, &runtime))).await;

        let req = TestRequest::get().uri("/static/css/site.css").to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = TestRequest::get().uri("/media/logo.txt").to_request();
        let body = call_and_read_body(&app, req).await;
        assert_eq!(&body[..], b"logo");

        let req = TestRequest::get().uri("/static/missing.css").to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn every_response_carries_security_headers() {
        let dir = tempdir().unwrap();
        let app = init_service(build_app(runtime(dir.path(), &[]), templates())).await;

        let req = TestRequest::get()
            .uri("/")
            .insert_header((header::HOST, "localhost:8000"))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_security_headers(&resp);

        let req = TestRequest::get()
            .uri("/")
            .insert_header((header::HOST, "evil.example.com"))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_security_headers(&resp);
    }

    #[actix_web::test]
    async fn logout_needs_same_origin_and_ignores_trailing_slash() {
        let dir = tempdir().unwrap();
        let app = init_service(build_app(runtime(dir.path(), &[]), templates())).await;

        let req = TestRequest::post()
            .uri("/logout")
            .insert_header((header::HOST, "localhost"))
            .to_request();
        assert_eq!(call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let req = TestRequest::post()
            .uri("/logout/")
            .insert_header((header::HOST, "localhost"))
            .insert_header((header::ORIGIN, "http://localhost"))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/");
    }

    #[actix_web::test]
    async fn session_cookie_is_secure_only_when_hosted() {
        for (vars, secure) in [(vec![], false), (vec![(RENDER, "true")], true)] {
            let dir = tempdir().unwrap();
            let app = init_service(
                build_app(runtime(dir.path(), &vars), templates())
                    .route("/sign-in", web::get().to(sign_in)),
            )
            .await;

            let req = TestRequest::get()
                .uri("/sign-in")
                .insert_header((header::HOST, "localhost"))
                .to_request();
            let resp = call_service(&app, req).await;
            let session = resp
                .response()
                .cookies()
                .find(|cookie| cookie.name() == "id")
                .unwrap();
            assert_eq!(session.secure().unwrap_or(false), secure);
        }
    }
}
