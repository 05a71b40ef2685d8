use crate::vision::{GEMINI_ENDPOINT, GEMINI_MODEL, OPENAI_ENDPOINT, OPENAI_MODEL};
use failure::{Error, ResultExt};
use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8402";
const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
    OpenAi,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub provider: Provider,
    pub api_key: String,
    pub model: String,
    pub endpoint: Url,
    pub lookup_delay: Duration,
    pub registry_file: Option<PathBuf>,
    pub max_upload_bytes: u64,
}

impl Config {
    pub fn from_env() -> Result<Config, Error> {
        Config::from_vars(&env::vars().collect())
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Config, Error> {
        let var = |name: &str| {
            vars.get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        let bind_addr = var("BIND_ADDR")
            .unwrap_or(DEFAULT_BIND_ADDR)
            .parse::<SocketAddr>()
            .with_context(|_| "BIND_ADDR is not a socket address")?;

        let provider = match var("VISION_PROVIDER").map(str::to_ascii_lowercase).as_deref() {
            None | Some("gemini") => Provider::Gemini,
            Some("openai") => Provider::OpenAi,
            Some(other) => bail!("Unknown VISION_PROVIDER {}", other),
        };
        let (key_vars, default_model, default_endpoint) = match provider {
            Provider::Gemini => (
                &["VISION_API_KEY", "GEMINI_API_KEY", "GOOGLE_API_KEY"][..],
                GEMINI_MODEL,
                GEMINI_ENDPOINT,
            ),
            Provider::OpenAi => (
                &["VISION_API_KEY", "OPENAI_API_KEY"][..],
                OPENAI_MODEL,
                OPENAI_ENDPOINT,
            ),
        };
        let api_key = key_vars
            .iter()
            .find_map(|name| var(*name))
            .ok_or_else(|| format_err!("{} environment variable unset", key_vars.join(" or ")))?
            .to_string();

        let model = var("VISION_MODEL").unwrap_or(default_model).to_string();

        let mut endpoint = var("VISION_ENDPOINT").unwrap_or(default_endpoint).to_string();
        // Url::join replaces the last path segment unless the base ends in '/'.
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }
        let endpoint = Url::parse(&endpoint)
            .with_context(|_| format!("VISION_ENDPOINT {} is not a URL", endpoint))?;

        let lookup_delay = match var("LOOKUP_DELAY_MS") {
            Some(ms) => Duration::from_millis(
                ms.parse::<u64>()
                    .with_context(|_| format!("LOOKUP_DELAY_MS {} is not a number", ms))?,
            ),
            None => Duration::from_millis(0),
        };

        let max_upload_bytes = match var("MAX_UPLOAD_BYTES") {
            Some(n) => n
                .parse::<u64>()
                .with_context(|_| format!("MAX_UPLOAD_BYTES {} is not a number", n))?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        Ok(Config {
            bind_addr,
            provider,
            api_key,
            model,
            endpoint,
            lookup_delay,
            registry_file: var("REGISTRY_FILE").map(PathBuf::from),
            max_upload_bytes,
        })
    }
}
