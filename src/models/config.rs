//! Runtime configuration resolved once at startup.
//!
//! [`RuntimeConfig::resolve`] is a pure function of an [`EnvSnapshot`] and the
//! application base directory. The result is shared read-only through
//! `web::Data` for the lifetime of the process.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::domain::{HostPattern, LogLevel, MIN_SECRET_KEY_LEN, SecretKey, TypeConstraintError};
use crate::models::database::{ConnectionOptions, DatabaseConfig, SQLITE_FILE_NAME};
use crate::models::environment::{AWS_STORAGE_BUCKET_NAME, EnvSnapshot};
use crate::models::{ConfigError, ConfigResult};

/// Allow-list entry used when the hosting provider does not name the host.
pub const DEFAULT_EXTERNAL_HOST: &str = ".onrender.com";

/// Hosts that are always accepted, after the external one.
pub const LOCAL_HOSTS: [&str; 2] = ["localhost", "127.0.0.1"];

pub const STATIC_URL: &str = "/static/";
pub const MEDIA_URL: &str = "/media/";

pub const S3_DEFAULT_REGION: &str = "us-east-1";
pub const S3_LOCATION: &str = "media";
pub const S3_CACHE_CONTROL: &str = "max-age=86400";

/// Route users land on after logging out.
pub const HOME_ROUTE: &str = "home";

#[derive(Clone, Debug, Deserialize)]
/// Bind settings for the HTTP server.
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
}

/// Static asset locations.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StaticConfig {
    pub url: String,
    /// Directories assets are collected from.
    pub source_dirs: Vec<PathBuf>,
    /// Directory collected assets are served from.
    pub root: PathBuf,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MediaConfig {
    pub url: String,
    pub root: PathBuf,
}

/// Where uploaded media lives.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StorageConfig {
    Local { root: PathBuf, url: String },
    S3(S3StorageConfig),
}

impl StorageConfig {
    /// Public URL prefix for media files.
    pub fn media_url(&self) -> String {
        match self {
            StorageConfig::Local { url, .. } => url.clone(),
            StorageConfig::S3(s3) => s3.media_url(),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, StorageConfig::Local { .. })
    }
}

#[derive(Clone, Eq, PartialEq)]
pub struct S3StorageConfig {
    pub bucket: String,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Key prefix inside the bucket.
    pub location: String,
    /// `None` leaves object ACLs to the bucket policy.
    pub default_acl: Option<String>,
    pub cache_control: String,
}

impl S3StorageConfig {
    pub fn custom_domain(&self) -> String {
        format!("{}.s3.amazonaws.com", self.bucket)
    }

    pub fn media_url(&self) -> String {
        format!("https://{}/{}/", self.custom_domain(), self.location)
    }
}

impl fmt::Debug for S3StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3StorageConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "**redacted**"),
            )
            .field("location", &self.location)
            .field("default_acl", &self.default_acl)
            .field("cache_control", &self.cache_control)
            .finish()
    }
}

/// Log levels for the application and the web framework.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub framework_level: LogLevel,
}

impl LoggingConfig {
    /// `env_logger` filter used when `RUST_LOG` is not set.
    pub fn filter_directive(&self) -> String {
        format!(
            "warn,{app}={level},actix_web={framework},actix_server={framework}",
            app = crate::LOG_TARGET,
            level = self.level,
            framework = self.framework_level,
        )
    }
}

/// Values a template context is populated with.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContextProcessor {
    Debug,
    Request,
    Auth,
    Messages,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TemplateConfig {
    pub dirs: Vec<PathBuf>,
    pub context_processors: Vec<ContextProcessor>,
}

impl TemplateConfig {
    /// Glob per template directory, in the form Tera expects.
    pub fn globs(&self) -> Vec<String> {
        self.dirs
            .iter()
            .map(|dir| format!("{}/**/*", dir.display()))
            .collect()
    }

    pub fn enables(&self, processor: ContextProcessor) -> bool {
        self.context_processors.contains(&processor)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LocalizationConfig {
    pub language_code: String,
    pub time_zone: String,
}

/// Named routes users are sent to by the authentication views.
///
/// Only logout has a view here; logging in happens outside this service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AuthRedirects {
    pub logout: String,
}

/// Complete, immutable runtime configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeConfig {
    debug_enabled: bool,
    secret_key: SecretKey,
    allowed_hosts: Vec<HostPattern>,
    database: DatabaseConfig,
    static_files: StaticConfig,
    media: MediaConfig,
    storage: StorageConfig,
    logging: LoggingConfig,
    templates: TemplateConfig,
    localization: LocalizationConfig,
    auth_redirects: AuthRedirects,
}

impl RuntimeConfig {
    /// Resolve the configuration from the current process environment.
    pub fn from_process_env(base_dir: &Path) -> ConfigResult<Self> {
        Self::resolve(&EnvSnapshot::from_process(), base_dir)
    }

    /// Derive the configuration from an environment snapshot.
    ///
    /// Fails on a missing or short `SECRET_KEY`, a malformed `DATABASE_URL`,
    /// or S3 storage without a bucket name.
    pub fn resolve(env: &EnvSnapshot, base_dir: &Path) -> ConfigResult<Self> {
        let raw = env.load()?;

        let secret_key = match raw.secret_key {
            Some(value) => SecretKey::try_new(value).map_err(|err| match err {
                TypeConstraintError::ShortSecret { len } => ConfigError::WeakSecret {
                    len,
                    min: MIN_SECRET_KEY_LEN,
                },
                _ => ConfigError::MissingSecret,
            })?,
            None => return Err(ConfigError::MissingSecret),
        };

        let debug_enabled = raw.render.is_none();

        let external_host = non_empty(raw.render_external_hostname)
            .unwrap_or_else(|| DEFAULT_EXTERNAL_HOST.to_string());
        let allowed_hosts = std::iter::once(external_host)
            .chain(LOCAL_HOSTS.iter().map(|host| host.to_string()))
            .map(|host| {
                HostPattern::try_new(host.clone()).map_err(|_| ConfigError::InvalidHost(host))
            })
            .collect::<ConfigResult<Vec<_>>>()?;

        let database = match non_empty(raw.database_url) {
            Some(url) => DatabaseConfig::parse(&url, ConnectionOptions::hosted())?,
            None => DatabaseConfig::sqlite(base_dir.join(SQLITE_FILE_NAME)),
        };

        let static_files = StaticConfig {
            url: STATIC_URL.to_string(),
            source_dirs: vec![base_dir.join("static")],
            root: base_dir.join("staticfiles"),
        };
        let media = MediaConfig {
            url: MEDIA_URL.to_string(),
            root: base_dir.join("media"),
        };

        let storage = match non_empty(raw.use_s3) {
            Some(_) => StorageConfig::S3(S3StorageConfig {
                bucket: non_empty(raw.aws_storage_bucket_name)
                    .ok_or(ConfigError::MissingVariable(AWS_STORAGE_BUCKET_NAME))?,
                region: S3_DEFAULT_REGION.to_string(),
                access_key_id: non_empty(raw.aws_access_key_id),
                secret_access_key: non_empty(raw.aws_secret_access_key),
                location: S3_LOCATION.to_string(),
                default_acl: None,
                cache_control: S3_CACHE_CONTROL.to_string(),
            }),
            None => StorageConfig::Local {
                root: media.root.clone(),
                url: media.url.clone(),
            },
        };

        let logging = LoggingConfig {
            level: if debug_enabled {
                LogLevel::Debug
            } else {
                LogLevel::Info
            },
            framework_level: LogLevel::Info,
        };

        let templates = TemplateConfig {
            dirs: vec![base_dir.join("templates")],
            context_processors: vec![
                ContextProcessor::Debug,
                ContextProcessor::Request,
                ContextProcessor::Auth,
                ContextProcessor::Messages,
            ],
        };

        let localization = LocalizationConfig {
            language_code: "en-us".to_string(),
            time_zone: "UTC".to_string(),
        };

        let auth_redirects = AuthRedirects {
            logout: HOME_ROUTE.to_string(),
        };

        Ok(Self {
            debug_enabled,
            secret_key,
            allowed_hosts,
            database,
            static_files,
            media,
            storage,
            logging,
            templates,
            localization,
            auth_redirects,
        })
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug_enabled
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    pub fn allowed_hosts(&self) -> &[HostPattern] {
        &self.allowed_hosts
    }

    /// Whether a `Host` header value passes the allow-list.
    pub fn is_host_allowed(&self, host: &str) -> bool {
        self.allowed_hosts.iter().any(|pattern| pattern.matches(host))
    }

    pub fn database(&self) -> &DatabaseConfig {
        &self.database
    }

    pub fn static_files(&self) -> &StaticConfig {
        &self.static_files
    }

    pub fn media(&self) -> &MediaConfig {
        &self.media
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }

    pub fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    pub fn templates(&self) -> &TemplateConfig {
        &self.templates
    }

    pub fn localization(&self) -> &LocalizationConfig {
        &self.localization
    }

    pub fn auth_redirects(&self) -> &AuthRedirects {
        &self.auth_redirects
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
