#[macro_use]
extern crate failure;

pub mod config;
pub mod extractor;
pub mod photo;
pub mod plate;
pub mod registry;
pub mod server;
pub mod types;
pub mod vision;

use config::{Config, Provider};
use extractor::PlateExtractor;
use failure::{Error, ResultExt};
use log::info;
use registry::{Registry, VehicleLookup};
use server::Services;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use vision::{GeminiModel, OpenAiModel, VisionModel};

const MODEL_TIMEOUT: Duration = Duration::from_secs(60);

pub fn build_services(config: &Config) -> Result<Services, Error> {
    let client = reqwest::Client::builder().timeout(MODEL_TIMEOUT).build()?;
    let model: Arc<dyn VisionModel> = match config.provider {
        Provider::Gemini => Arc::new(GeminiModel::new(
            client,
            config.endpoint.clone(),
            config.model.clone(),
            config.api_key.clone(),
        )),
        Provider::OpenAi => Arc::new(OpenAiModel::new(
            client,
            config.endpoint.clone(),
            config.model.clone(),
            config.api_key.clone(),
        )),
    };
    info!(
        "Using {:?} model {} at {}",
        config.provider, config.model, config.endpoint
    );

    let registry = match &config.registry_file {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|_| format!("Unable to read {}", path.display()))?;
            Registry::from_json(&json)
                .with_context(|_| format!("Unable to load registry {}", path.display()))?
        }
        None => Registry::builtin(),
    };
    info!("Loaded {} vehicle records", registry.len());
    let lookup = VehicleLookup::new(Arc::new(registry)).with_delay(config.lookup_delay);

    Ok(Services {
        extractor: Arc::new(PlateExtractor::new(model)),
        lookup: Arc::new(lookup),
        max_upload_bytes: config.max_upload_bytes,
    })
}
