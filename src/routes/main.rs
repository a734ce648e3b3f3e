use actix_identity::Identity;
use actix_web::{HttpRequest, Responder, get, post, web};
use actix_web_flash_messages::{FlashMessage, IncomingFlashMessages};
use tera::Tera;

use crate::models::config::RuntimeConfig;
use crate::routes::{base_context, redirect, render_template, reverse};

#[get("/", name = "home")]
pub async fn home(
    req: HttpRequest,
    identity: Option<Identity>,
    flash_messages: IncomingFlashMessages,
    runtime: web::Data<RuntimeConfig>,
    templates: web::Data<Tera>,
) -> impl Responder {
    let context = base_context(&req, identity.as_ref(), &flash_messages, &runtime);
    render_template(&templates, "home.html", &context)
}

#[post("/logout")]
pub async fn logout(
    req: HttpRequest,
    identity: Option<Identity>,
    runtime: web::Data<RuntimeConfig>,
) -> impl Responder {
    if let Some(identity) = identity {
        identity.logout();
        FlashMessage::info("You have been logged out.").send();
    }
    redirect(&reverse(&req, &runtime.auth_redirects().logout))
}

#[cfg(test)]
mod tests {
    use actix_identity::IdentityMiddleware;
    use actix_session::{SessionMiddleware, storage::CookieSessionStore};
    use actix_web::cookie::{Cookie, Key};
    use actix_web::dev::ServiceResponse;
    use actix_web::http::{StatusCode, header};
    use actix_web::{App, HttpMessage, HttpResponse, test};
    use actix_web_flash_messages::{FlashMessagesFramework, storage::CookieMessageStore};
    use std::path::Path;

    use super::*;
    use crate::models::environment::{EnvSnapshot, RENDER, SECRET_KEY};

    const HOME_TEMPLATE: &str = r#"<html lang="{{ language_code }}">
{% if current_user %}user={{ current_user }}{% else %}anonymous{% endif %}
path={{ request_path | safe }} debug={{ debug }}
{% for alert in alerts %}[{{ alert.1 }}] {{ alert.0 }}{% endfor %}
</html>"#;

    fn runtime(vars: &[(&str, &str)]) -> RuntimeConfig {
        let mut all = vec![(SECRET_KEY, "0123456789abcdef0123456789abcdef")];
        all.extend_from_slice(vars);
        RuntimeConfig::resolve(&EnvSnapshot::from_map(all), Path::new("/srv/app")).unwrap()
    }

    fn templates() -> Tera {
        let mut tera = Tera::default();
        tera.add_raw_template("home.html", HOME_TEMPLATE).unwrap();
        tera
    }

    async fn sign_in(req: HttpRequest) -> HttpResponse {
        Identity::login(&req.extensions(), "alice".into()).unwrap();
        HttpResponse::Ok().finish()
    }

    fn cookie<B>(resp: &ServiceResponse<B>, name: &str) -> Cookie<'static> {
        resp.response()
            .cookies()
            .find(|cookie| cookie.name() == name)
            .unwrap_or_else(|| panic!("response sets no `{name}` cookie"))
            .into_owned()
    }

    macro_rules! test_app {
        ($runtime:expr) => {{
            let key = Key::generate();
            test::init_service(
                App::new()
                    .app_data(web::Data::new($runtime))
                    .app_data(web::Data::new(templates()))
                    .wrap(
                        FlashMessagesFramework::builder(
                            CookieMessageStore::builder(key.clone()).build(),
                        )
                        .build(),
                    )
                    .wrap(IdentityMiddleware::default())
                    .wrap(SessionMiddleware::new(CookieSessionStore::default(), key))
                    .service(home)
                    .service(logout)
                    .route("/sign-in", web::post().to(sign_in)),
            )
            .await
        }};
    }

    #[actix_web::test]
    async fn home_renders_context_processors() {
        let app = test_app!(runtime(&[]));

        let req = test::TestRequest::get().uri("/").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = test::read_body(resp).await;
        let body = std::str::from_utf8(&body).unwrap();
        assert!(body.contains(r#"lang="en-us""#));
        assert!(body.contains("anonymous"));
        assert!(body.contains("path=/ debug=true"));
    }

    #[actix_web::test]
    async fn home_reports_debug_off_when_hosted() {
        let app = test_app!(runtime(&[(RENDER, "true")]));

        let req = test::TestRequest::get().uri("/").to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert!(std::str::from_utf8(&body).unwrap().contains("debug=false"));
    }

    #[actix_web::test]
    async fn logout_redirects_home() {
        let app = test_app!(runtime(&[]));

        let req = test::TestRequest::post().uri("/logout").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/");
    }

    #[actix_web::test]
    async fn logout_forgets_identity_and_flashes_message() {
        let app = test_app!(runtime(&[]));

        let req = test::TestRequest::post().uri("/sign-in").to_request();
        let resp = test::call_service(&app, req).await;
        let session = cookie(&resp, "id");

        let req = test::TestRequest::get()
            .uri("/")
            .cookie(session.clone())
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert!(std::str::from_utf8(&body).unwrap().contains("user=alice"));

        let req = test::TestRequest::post()
            .uri("/logout")
            .cookie(session)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/");
        assert_eq!(cookie(&resp, "id").value(), "");
        let flash = cookie(&resp, "_flash");

        let req = test::TestRequest::get().uri("/").cookie(flash).to_request();
        let body = test::call_and_read_body(&app, req).await;
        let body = std::str::from_utf8(&body).unwrap();
        assert!(body.contains("[info] You have been logged out."));
        assert!(body.contains("anonymous"));
    }

    #[actix_web::test]
    async fn anonymous_logout_sets_no_flash() {
        let app = test_app!(runtime(&[]));

        let req = test::TestRequest::post().uri("/logout").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(cookie(&resp, "_flash").value(), "");
    }
}
