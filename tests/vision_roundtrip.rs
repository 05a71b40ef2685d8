//! Runs the service against local stand-ins for the Gemini and OpenAI APIs.

use plate_lookup::config::Config;
use plate_lookup::server;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use warp::http::StatusCode;
use warp::Filter;

type Seen = Arc<Mutex<Vec<(String, String, Value)>>>;

const PHOTO: &str = "data:image/jpeg;base64,/9j/4AAQ";

fn start_gemini(status: StatusCode, text: &'static str) -> (SocketAddr, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let record = seen.clone();
    let route = warp::path!("v1beta" / "models" / String)
        .and(warp::post())
        .and(warp::header::<String>("x-goog-api-key"))
        .and(warp::body::json())
        .map(move |model: String, key: String, body: Value| {
            record.lock().unwrap().push((model, key, body));
            let reply = json!({
                "candidates": [{ "content": { "parts": [{ "text": text }], "role": "model" } }]
            });
            warp::reply::with_status(warp::reply::json(&reply), status)
        });
    let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    (addr, seen)
}

fn start_openai(text: &'static str) -> (SocketAddr, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let record = seen.clone();
    let route = warp::path!("v1" / "chat" / "completions")
        .and(warp::post())
        .and(warp::header::<String>("authorization"))
        .and(warp::body::json())
        .map(move |auth: String, body: Value| {
            record
                .lock()
                .unwrap()
                .push(("chat".to_string(), auth, body));
            warp::reply::json(&json!({
                "choices": [{ "message": { "role": "assistant", "content": text } }]
            }))
        });
    let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    (addr, seen)
}

fn config(pairs: &[(&str, &str)]) -> Config {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Config::from_vars(&vars).unwrap()
}

async fn extract(config: &Config) -> (StatusCode, Value) {
    let routes = server::routes(plate_lookup::build_services(config).unwrap());
    let response = warp::test::request()
        .method("POST")
        .path("/api/extract")
        .json(&json!({ "photoDataUri": PHOTO }))
        .reply(&routes)
        .await;
    (
        response.status(),
        serde_json::from_slice(response.body()).unwrap(),
    )
}

#[tokio::test]
async fn gemini_extraction_feeds_lookup() {
    let (addr, seen) = start_gemini(
        StatusCode::OK,
        r#"{"licensePlateNumber": "BWP-001", "isLicensePlateDetected": true}"#,
    );
    let endpoint = format!("http://{}", addr);
    let config = config(&[
        ("GEMINI_API_KEY", "secret"),
        ("VISION_MODEL", "test-model"),
        ("VISION_ENDPOINT", endpoint.as_str()),
    ]);

    let (status, body) = extract(&config).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "licensePlateNumber": "BWP-001", "isLicensePlateDetected": true })
    );

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let (model, key, request) = &seen[0];
    assert_eq!(model, "test-model:generateContent");
    assert_eq!(key, "secret");
    let inline = &request["contents"][0]["parts"][1]["inlineData"];
    assert_eq!(inline["mimeType"], "image/jpeg");
    assert_eq!(inline["data"], "/9j/4AAQ");
    let schema = &request["generationConfig"]["responseSchema"];
    assert_eq!(
        schema["required"],
        json!(["licensePlateNumber", "isLicensePlateDetected"])
    );
    assert_eq!(schema["properties"]["isLicensePlateDetected"]["type"], "BOOLEAN");
    drop(seen);

    let routes = server::routes(plate_lookup::build_services(&config).unwrap());
    let response = warp::test::request()
        .method("POST")
        .path("/api/vehicle")
        .json(&json!({ "plateNumber": body["licensePlateNumber"] }))
        .reply(&routes)
        .await;
    let record: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(record["owner"], "District Administration BWP");
}

#[tokio::test]
async fn gemini_error_status_is_remote_failure() {
    let (addr, _) = start_gemini(StatusCode::TOO_MANY_REQUESTS, "quota");
    let endpoint = format!("http://{}/", addr);
    let config = config(&[("GEMINI_API_KEY", "k"), ("VISION_ENDPOINT", endpoint.as_str())]);

    let (status, body) = extract(&config).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(
        body,
        json!({ "error": "Failed to process image due to an internal error." })
    );
}

#[tokio::test]
async fn gemini_fenced_no_plate_answer() {
    let (addr, _) = start_gemini(
        StatusCode::OK,
        "```json\n{\"licensePlateNumber\": \"\", \"isLicensePlateDetected\": false}\n```",
    );
    let endpoint = format!("http://{}", addr);
    let config = config(&[("GEMINI_API_KEY", "k"), ("VISION_ENDPOINT", endpoint.as_str())]);

    let (status, body) = extract(&config).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["isLicensePlateDetected"], false);
}

#[tokio::test]
async fn openai_extraction() {
    let (addr, seen) =
        start_openai(r#"{"licensePlateNumber": "", "isLicensePlateDetected": true}"#);
    let endpoint = format!("http://{}", addr);
    let config = config(&[
        ("VISION_PROVIDER", "openai"),
        ("OPENAI_API_KEY", "sk-test"),
        ("VISION_ENDPOINT", endpoint.as_str()),
    ]);

    let (status, body) = extract(&config).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body,
        json!({
            "error": "Could not extract license plate number from the image.",
            "isLicensePlateDetected": true
        })
    );

    let seen = seen.lock().unwrap();
    let (_, auth, request) = &seen[0];
    assert_eq!(auth, "Bearer sk-test");
    assert_eq!(request["model"], "gpt-4o");
    assert_eq!(request["messages"][0]["content"][1]["image_url"]["url"], PHOTO);
    assert_eq!(request["response_format"]["json_schema"]["strict"], true);
}

#[tokio::test]
async fn registry_file_replaces_builtin_set() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"[{{"plateNumber": "ISB-777", "status": "Government Registered", "make": "Toyota", "owner": "Islamabad Traffic Police"}}]"#
    )
    .unwrap();
    let path = file.path().to_str().unwrap().to_string();
    let config = config(&[("GEMINI_API_KEY", "k"), ("REGISTRY_FILE", path.as_str())]);
    let routes = server::routes(plate_lookup::build_services(&config).unwrap());

    let response = warp::test::request()
        .path("/api/vehicle?plateNumber=isb777")
        .reply(&routes)
        .await;
    let record: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(record["status"], "Government Registered");
    assert_eq!(record["owner"], "Islamabad Traffic Police");
    assert_eq!(record["model"], "N/A");

    let response = warp::test::request()
        .path("/api/vehicle?plateNumber=ABC-123")
        .reply(&routes)
        .await;
    let record: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(record["status"], "Not Found");
}

#[tokio::test]
async fn broken_registry_file_fails_startup() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"[{\"plateNumber\": \"X\"}]").unwrap();
    let path = file.path().to_str().unwrap().to_string();
    let config = config(&[("GEMINI_API_KEY", "k"), ("REGISTRY_FILE", path.as_str())]);
    assert!(plate_lookup::build_services(&config).is_err());
}
