//! Snapshot of the environment variables the application reads.
use std::fmt;

use config::{Config, Environment, Map};
use serde::Deserialize;

pub const SECRET_KEY: &str = "SECRET_KEY";
pub const RENDER: &str = "RENDER";
pub const RENDER_EXTERNAL_HOSTNAME: &str = "RENDER_EXTERNAL_HOSTNAME";
pub const DATABASE_URL: &str = "DATABASE_URL";
pub const USE_S3: &str = "USE_S3";
pub const AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const AWS_STORAGE_BUCKET_NAME: &str = "AWS_STORAGE_BUCKET_NAME";

/// Every variable the resolver looks at. Anything else is ignored.
pub const KNOWN_VARIABLES: [&str; 8] = [
    SECRET_KEY,
    RENDER,
    RENDER_EXTERNAL_HOSTNAME,
    DATABASE_URL,
    USE_S3,
    AWS_ACCESS_KEY_ID,
    AWS_SECRET_ACCESS_KEY,
    AWS_STORAGE_BUCKET_NAME,
];

/// Immutable copy of the known environment variables taken at one instant.
#[derive(Clone, Default, PartialEq)]
pub struct EnvSnapshot {
    vars: Map<String, String>,
}

impl EnvSnapshot {
    /// Capture the known variables from the current process.
    /// Variables that are not valid unicode count as absent.
    pub fn from_process() -> Self {
        Self::from_map(
            KNOWN_VARIABLES
                .iter()
                .filter_map(|name| std::env::var(name).ok().map(|value| (*name, value))),
        )
    }

    pub fn from_map<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = vars
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .filter(|(name, _)| KNOWN_VARIABLES.contains(&name.as_str()))
            .collect();
        Self { vars }
    }

    pub(crate) fn load(&self) -> Result<RawEnvironment, config::ConfigError> {
        let source: Map<String, String> = self
            .vars
            .iter()
            .map(|(name, value)| (name.to_lowercase(), value.clone()))
            .collect();
        Config::builder()
            .add_source(Environment::default().source(Some(source)))
            .build()?
            .try_deserialize()
    }
}

impl fmt::Debug for EnvSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.vars.keys().collect();
        names.sort();
        f.debug_struct("EnvSnapshot").field("vars", &names).finish()
    }
}

/// Known variables as read through the `config` environment source.
/// Keys arrive lowercased; present-but-empty values stay `Some("")`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawEnvironment {
    pub secret_key: Option<String>,
    pub render: Option<String>,
    pub render_external_hostname: Option<String>,
    pub database_url: Option<String>,
    pub use_s3: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_storage_bucket_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_map_keeps_only_known_variables() {
        let snapshot = EnvSnapshot::from_map([("RENDER", "true"), ("PATH", "/usr/bin")]);

        assert_eq!(format!("{snapshot:?}"), r#"EnvSnapshot { vars: ["RENDER"] }"#);
        assert_eq!(snapshot.load().unwrap().render.as_deref(), Some("true"));
    }

    #[test]
    fn load_reads_values_through_config_source() {
        let snapshot = EnvSnapshot::from_map([
            (DATABASE_URL, "postgres://u:p@db/app"),
            (RENDER, ""),
        ]);

        let raw = snapshot.load().unwrap();
        assert_eq!(raw.database_url.as_deref(), Some("postgres://u:p@db/app"));
        assert_eq!(raw.render.as_deref(), Some(""));
        assert!(raw.secret_key.is_none());
    }

    #[test]
    fn empty_snapshot_loads_all_absent() {
        let raw = EnvSnapshot::default().load().unwrap();

        assert!(raw.render.is_none());
        assert!(raw.database_url.is_none());
        assert!(raw.use_s3.is_none());
    }

    #[test]
    fn debug_output_lists_names_only() {
        let snapshot = EnvSnapshot::from_map([(SECRET_KEY, "very-secret-value")]);

        let printed = format!("{snapshot:?}");
        assert!(printed.contains("SECRET_KEY"));
        assert!(!printed.contains("very-secret-value"));
    }
}
