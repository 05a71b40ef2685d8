use crate::extractor::{ExtractError, PlateExtractor};
use crate::photo::EncodedImage;
use crate::registry::{LookupError, VehicleLookup};
use crate::types::{ErrorBody, ExtractRequest, VehicleRequest};
use bytes::Bytes;
use log::{error, info, warn};
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus};
use warp::{Filter, Rejection, Reply};

const MAX_JSON_BYTES: u64 = 64 * 1024;

#[derive(Clone)]
pub struct Services {
    pub extractor: Arc<PlateExtractor>,
    pub lookup: Arc<VehicleLookup>,
    pub max_upload_bytes: u64,
}

pub async fn run(services: Services, addr: SocketAddr) {
    info!("Listening on {}", addr);
    warp::serve(routes(services)).run(addr).await;
}

pub fn routes(
    services: Services,
) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    let upload_limit = services.max_upload_bytes;
    let with_services = warp::any().map(move || services.clone());

    let extract = warp::path!("api" / "extract")
        .and(warp::post())
        .and(warp::body::content_length_limit(upload_limit))
        .and(warp::body::json())
        .and(with_services.clone())
        .and_then(extract_plate);
    let extract_raw = warp::path!("api" / "extract" / "raw")
        .and(warp::post())
        .and(warp::body::content_length_limit(upload_limit))
        .and(warp::header::optional::<String>("content-type"))
        .and(warp::body::bytes())
        .and(with_services.clone())
        .and_then(extract_plate_raw);
    let vehicle = warp::path!("api" / "vehicle")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_JSON_BYTES))
        .and(warp::body::json())
        .and(with_services.clone())
        .and_then(fetch_vehicle);
    let vehicle_query = warp::path!("api" / "vehicle")
        .and(warp::get())
        .and(warp::query::<VehicleRequest>())
        .and(with_services)
        .and_then(fetch_vehicle);
    let health = warp::path!("health").and(warp::get()).map(|| "ok");

    extract
        .or(extract_raw)
        .or(vehicle)
        .or(vehicle_query)
        .or(health)
        .recover(handle_rejection)
}

fn json_reply<T: Serialize>(body: &T, status: StatusCode) -> WithStatus<Json> {
    warp::reply::with_status(warp::reply::json(body), status)
}

fn extraction_reply(
    request_id: &str,
    result: Result<impl Serialize, ExtractError>,
) -> WithStatus<Json> {
    match result {
        Ok(plate) => json_reply(&plate, StatusCode::OK),
        Err(e) => {
            let status = match &e {
                ExtractError::NoPlateDetected | ExtractError::EmptyExtraction => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                ExtractError::MalformedImage(_) => StatusCode::BAD_REQUEST,
                ExtractError::RemoteFailure(_) => StatusCode::BAD_GATEWAY,
            };
            info!("[{}] Extraction failed: {}", request_id, e);
            json_reply(&e.to_body(), status)
        }
    }
}

async fn extract_plate(
    request: ExtractRequest,
    services: Services,
) -> Result<WithStatus<Json>, Infallible> {
    let request_id = Uuid::new_v4().to_simple().to_string();
    info!(
        "[{}] Extract request ({} chars)",
        request_id,
        request.photo_data_uri.len()
    );
    let result = services
        .extractor
        .extract_data_uri(&request.photo_data_uri)
        .await;
    Ok(extraction_reply(&request_id, result))
}

async fn extract_plate_raw(
    content_type: Option<String>,
    body: Bytes,
    services: Services,
) -> Result<WithStatus<Json>, Infallible> {
    let request_id = Uuid::new_v4().to_simple().to_string();
    info!(
        "[{}] Raw extract request ({:?}, {} bytes)",
        request_id,
        content_type,
        body.len()
    );
    let result = match EncodedImage::from_upload(content_type.as_deref(), body) {
        Ok(image) => services.extractor.extract(&image).await,
        Err(e) => {
            warn!("[{}] Rejecting upload: {}", request_id, e);
            Err(ExtractError::from(e))
        }
    };
    Ok(extraction_reply(&request_id, result))
}

async fn fetch_vehicle(
    request: VehicleRequest,
    services: Services,
) -> Result<WithStatus<Json>, Infallible> {
    let request_id = Uuid::new_v4().to_simple().to_string();
    info!("[{}] Vehicle request {:?}", request_id, request.plate_number);
    Ok(match services.lookup.lookup(&request.plate_number).await {
        Ok(record) => json_reply(&record, StatusCode::OK),
        Err(e @ LookupError::InvalidFormat) => json_reply(&e.to_body(), StatusCode::BAD_REQUEST),
    })
}

async fn handle_rejection(rejection: Rejection) -> Result<WithStatus<Json>, Infallible> {
    let (status, message) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found.".to_string())
    } else if let Some(e) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e))
    } else if let Some(e) = rejection.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, format!("Invalid query: {}", e))
    } else if let Some(e) = rejection.find::<warp::reject::InvalidHeader>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = rejection.find::<warp::reject::MissingHeader>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Image is too large.".to_string())
    } else if rejection.find::<warp::reject::LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, "Content-Length is required.".to_string())
    } else if rejection.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Expected a JSON body.".to_string(),
        )
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed.".to_string(),
        )
    } else {
        error!("Unhandled rejection: {:?}", rejection);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal error.".to_string(),
        )
    };
    Ok(json_reply(&ErrorBody::new(message), status))
}
