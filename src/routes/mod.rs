use std::collections::HashMap;

use actix_identity::Identity;
use actix_web::http::header;
use actix_web::{HttpRequest, HttpResponse};
use actix_web_flash_messages::{IncomingFlashMessages, Level};
use log::{error, warn};
use tera::{Context, Tera};

use crate::models::config::{ContextProcessor, RuntimeConfig, StaticConfig, TemplateConfig};
use crate::services::ServiceResult;
use crate::services::static_files::StaticManifest;

pub mod main;

/// Load every configured template directory into one Tera instance.
pub fn load_templates(config: &TemplateConfig) -> Result<Tera, tera::Error> {
    let mut tera = Tera::default();
    for glob in config.globs() {
        tera.extend(&Tera::new(&glob)?)?;
    }
    Ok(tera)
}

/// Template function `static_url(path="css/site.css")`.
///
/// Points at the content-hashed copy when the static root has a manifest,
/// at the plain file otherwise.
pub struct StaticUrl {
    prefix: String,
    manifest: Option<StaticManifest>,
}

impl StaticUrl {
    pub fn new(config: &StaticConfig) -> ServiceResult<Self> {
        let manifest = StaticManifest::load(&config.root)?;
        if manifest.is_none() {
            warn!(
                "No static manifest in {}, serving unhashed asset names",
                config.root.display()
            );
        }
        Ok(Self::with_manifest(&config.url, manifest))
    }

    fn with_manifest(url: &str, manifest: Option<StaticManifest>) -> Self {
        let prefix = format!("{}/", url.trim_end_matches('/'));
        Self { prefix, manifest }
    }
}

impl tera::Function for StaticUrl {
    fn call(&self, args: &HashMap<String, tera::Value>) -> tera::Result<tera::Value> {
        let path = args
            .get("path")
            .and_then(tera::Value::as_str)
            .ok_or_else(|| tera::Error::msg("static_url expects a `path` string"))?;
        let path = match &self.manifest {
            Some(manifest) => manifest.resolve(path),
            None => path,
        };
        Ok(tera::Value::String(format!(
            "{}{}",
            self.prefix,
            path.trim_start_matches('/')
        )))
    }

    fn is_safe(&self) -> bool {
        true
    }
}

fn alert_level_to_str(level: &Level) -> &'static str {
    match level {
        Level::Error => "danger",
        Level::Warning => "warning",
        Level::Success => "success",
        _ => "info",
    }
}

fn redirect(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, location))
        .finish()
}

/// Path of a named route, falling back to `/` when it is not registered.
fn reverse(req: &HttpRequest, name: &str) -> String {
    match req.url_for_static(name) {
        Ok(url) => url.path().to_string(),
        Err(err) => {
            warn!("Cannot resolve route {name}: {err}");
            "/".to_string()
        }
    }
}

/// Context shared by every page, filled by the enabled context processors.
fn base_context(
    req: &HttpRequest,
    identity: Option<&Identity>,
    flash_messages: &IncomingFlashMessages,
    runtime: &RuntimeConfig,
) -> Context {
    let templates = runtime.templates();
    let mut context = Context::new();
    let localization = runtime.localization();
    context.insert("language_code", &localization.language_code);
    context.insert("time_zone", &localization.time_zone);

    if templates.enables(ContextProcessor::Debug) {
        context.insert("debug", &runtime.debug_enabled());
    }
    if templates.enables(ContextProcessor::Request) {
        context.insert("request_path", req.path());
    }
    if templates.enables(ContextProcessor::Auth) {
        let current_user = identity.and_then(|identity| identity.id().ok());
        context.insert("current_user", &current_user);
    }
    if templates.enables(ContextProcessor::Messages) {
        let alerts: Vec<_> = flash_messages
            .iter()
            .map(|f| (f.content(), alert_level_to_str(&f.level())))
            .collect();
        context.insert("alerts", &alerts);
    }
    context
}

fn render_template(tera: &Tera, template: &str, context: &Context) -> HttpResponse {
    match tera.render(template, context) {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/html; charset=utf-8")
            .body(body),
        Err(e) => {
            error!("Failed to render template {template}: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}
