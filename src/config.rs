use crate::storage::placement::DEFAULT_PUBLIC_BUCKET;
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, str::FromStr};

const DEFAULT_MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub url_signing_secret: String,
    pub public_base_url: String,
    pub public_bucket: String,
    pub max_upload_bytes: usize,
}

// Secrets stay out of logs.
impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("storage_dir", &self.storage_dir)
            .field("database_url", &self.database_url)
            .field("public_base_url", &self.public_base_url)
            .field("public_bucket", &self.public_bucket)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish_non_exhaustive()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Photo storage service")]
pub struct Args {
    /// Host to bind to (overrides PHOTO_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PHOTO_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where photo bytes are stored (overrides PHOTO_STORE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides PHOTO_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Base URL that signed download links point at (overrides PHOTO_STORE_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Name of the shared public bucket (overrides PHOTO_STORE_PUBLIC_BUCKET)
    #[arg(long)]
    pub public_bucket: Option<String>,

    /// Largest accepted upload body in bytes (overrides PHOTO_STORE_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::resolve(args, |name| env::var(name).ok())?, migrate))
    }

    /// Merge `args` over the variables returned by `lookup` over defaults.
    pub fn resolve(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = args
            .host
            .or_else(|| lookup("PHOTO_STORE_HOST"))
            .unwrap_or_else(|| "0.0.0.0".into());
        let port = match args.port {
            Some(port) => port,
            None => parse_var(&lookup, "PHOTO_STORE_PORT")?.unwrap_or(8080),
        };
        let storage_dir = args
            .storage_dir
            .or_else(|| lookup("PHOTO_STORE_STORAGE_DIR"))
            .unwrap_or_else(|| "./data/objects".into());
        let database_url = args
            .database_url
            .or_else(|| lookup("PHOTO_STORE_DATABASE_URL"))
            .unwrap_or_else(|| "sqlite://./data/meta/photo_store.db".into());
        let public_base_url = args
            .public_base_url
            .or_else(|| lookup("PHOTO_STORE_PUBLIC_BASE_URL"))
            .unwrap_or_else(|| format!("http://{}:{}", host, port));
        let public_bucket = args
            .public_bucket
            .or_else(|| lookup("PHOTO_STORE_PUBLIC_BUCKET"))
            .unwrap_or_else(|| DEFAULT_PUBLIC_BUCKET.into());
        let max_upload_bytes = match args.max_upload_bytes {
            Some(limit) => limit,
            None => parse_var(&lookup, "PHOTO_STORE_MAX_UPLOAD_BYTES")?
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
        };

        Ok(Self {
            jwt_secret: required_secret(&lookup, "PHOTO_STORE_JWT_SECRET")?,
            url_signing_secret: required_secret(&lookup, "PHOTO_STORE_URL_SIGNING_SECRET")?,
            host,
            port,
            storage_dir,
            database_url,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            public_bucket,
            max_upload_bytes,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(name)
        .map(|value| {
            value
                .parse::<T>()
                .with_context(|| format!("parsing {} value `{}`", name, value))
        })
        .transpose()
}

fn required_secret(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<String> {
    match lookup(name) {
        Some(secret) if !secret.is_empty() => Ok(secret),
        _ => bail!("{} must be set to a non-empty value", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn secrets() -> Vec<(&'static str, &'static str)> {
        vec![
            ("PHOTO_STORE_JWT_SECRET", "jwt"),
            ("PHOTO_STORE_URL_SIGNING_SECRET", "url"),
        ]
    }

    #[test]
    fn defaults_apply_when_only_secrets_are_set() {
        let cfg = AppConfig::resolve(Args::default(), env_of(&secrets())).unwrap();
        assert_eq!(cfg.addr(), "0.0.0.0:8080");
        assert_eq!(cfg.public_base_url, "http://0.0.0.0:8080");
        assert_eq!(cfg.public_bucket, DEFAULT_PUBLIC_BUCKET);
        assert_eq!(cfg.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
    }

    #[test]
    fn cli_wins_over_env() {
        let mut vars = secrets();
        vars.push(("PHOTO_STORE_PORT", "9000"));
        vars.push(("PHOTO_STORE_HOST", "10.0.0.1"));
        let args = Args {
            port: Some(7000),
            ..Args::default()
        };
        let cfg = AppConfig::resolve(args, env_of(&vars)).unwrap();
        assert_eq!(cfg.addr(), "10.0.0.1:7000");
    }

    #[test]
    fn missing_secret_is_an_error() {
        let vars = [("PHOTO_STORE_JWT_SECRET", "jwt")];
        assert!(AppConfig::resolve(Args::default(), env_of(&vars)).is_err());
    }

    #[test]
    fn unparsable_port_is_an_error() {
        let mut vars = secrets();
        vars.push(("PHOTO_STORE_PORT", "eighty"));
        assert!(AppConfig::resolve(Args::default(), env_of(&vars)).is_err());
    }
}
