use crate::photo::{EncodedImage, ImageError};
use crate::types::{ErrorBody, ExtractedPlate, ExtractionResult};
use crate::vision::{FieldKind, OutputSchema, SchemaField, StructuredPrompt, VisionModel};
use failure::Compat;
use log::{error, info, warn};
use std::sync::Arc;
use thiserror::Error;

const INSTRUCTION: &str = "You are an AI assistant designed to extract license plate numbers from images.\n\n\
Analyze the image and extract the license plate number. If no license plate is found set \
isLicensePlateDetected to false, otherwise set it to true and return the extracted license plate \
number. Return only the license plate number if found, do not include any other text.";

pub fn plate_prompt() -> StructuredPrompt {
    StructuredPrompt {
        name: "license_plate",
        instruction: INSTRUCTION,
        schema: OutputSchema {
            fields: vec![
                SchemaField {
                    name: "licensePlateNumber",
                    kind: FieldKind::String,
                    description: "The extracted license plate number.",
                },
                SchemaField {
                    name: "isLicensePlateDetected",
                    kind: FieldKind::Boolean,
                    description: "Whether or not a license plate was detected in the image.",
                },
            ],
        },
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("No license plate detected in the image.")]
    NoPlateDetected,
    /// The model claimed a plate but returned no text.
    #[error("Could not extract license plate number from the image.")]
    EmptyExtraction,
    #[error("Failed to process image due to an internal error.")]
    RemoteFailure(#[source] Compat<failure::Error>),
    #[error("Failed to process image due to an internal error.")]
    MalformedImage(#[from] ImageError),
}

impl ExtractError {
    pub fn detection_flag(&self) -> Option<bool> {
        match self {
            ExtractError::NoPlateDetected => Some(false),
            ExtractError::EmptyExtraction => Some(true),
            ExtractError::RemoteFailure(_) | ExtractError::MalformedImage(_) => None,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
            is_license_plate_detected: self.detection_flag(),
        }
    }
}

pub struct PlateExtractor {
    model: Arc<dyn VisionModel>,
    prompt: StructuredPrompt,
}

impl PlateExtractor {
    pub fn new(model: Arc<dyn VisionModel>) -> Self {
        PlateExtractor {
            model,
            prompt: plate_prompt(),
        }
    }

    pub async fn extract_data_uri(
        &self,
        photo_data_uri: &str,
    ) -> Result<ExtractedPlate, ExtractError> {
        let image = EncodedImage::from_data_uri(photo_data_uri).map_err(|e| {
            warn!("Rejecting photo: {}", e);
            ExtractError::from(e)
        })?;
        self.extract(&image).await
    }

    pub async fn extract(&self, image: &EncodedImage) -> Result<ExtractedPlate, ExtractError> {
        info!(
            "Extracting plate from {} image ({} bytes)",
            image.mime_type(),
            image.data().len()
        );
        let value = self
            .model
            .classify_image(image, &self.prompt)
            .await
            .map_err(|e| {
                error!("Error extracting license plate: {}", e);
                ExtractError::RemoteFailure(e.compat())
            })?;
        let result: ExtractionResult = serde_json::from_value(value).map_err(|e| {
            error!("Model response does not match schema: {}", e);
            ExtractError::RemoteFailure(failure::Error::from(e).compat())
        })?;
        classify(result)
    }
}

pub fn classify(result: ExtractionResult) -> Result<ExtractedPlate, ExtractError> {
    if !result.is_license_plate_detected {
        return Err(ExtractError::NoPlateDetected);
    }
    match result.license_plate_number {
        Some(plate) if !plate.trim().is_empty() => {
            info!("Extracted plate {}", plate);
            Ok(ExtractedPlate {
                license_plate_number: plate,
                is_license_plate_detected: true,
            })
        }
        _ => Err(ExtractError::EmptyExtraction),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use futures::future::{self, BoxFuture};
    use futures::FutureExt;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    pub(crate) struct CannedModel {
        answer: Result<Value, String>,
        pub(crate) seen: Mutex<Vec<(String, usize)>>,
    }

    impl CannedModel {
        pub(crate) fn answering(answer: Value) -> Self {
            CannedModel {
                answer: Ok(answer),
                seen: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing(message: &str) -> Self {
            CannedModel {
                answer: Err(message.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl VisionModel for CannedModel {
        fn classify_image<'a>(
            &'a self,
            image: &'a EncodedImage,
            prompt: &'a StructuredPrompt,
        ) -> BoxFuture<'a, Result<Value, failure::Error>> {
            self.seen
                .lock()
                .unwrap()
                .push((image.mime_type().to_string(), prompt.schema.fields.len()));
            let answer = match &self.answer {
                Ok(v) => Ok(v.clone()),
                Err(m) => Err(failure::err_msg(m.clone())),
            };
            future::ready(answer).boxed()
        }
    }

    fn extractor(model: CannedModel) -> PlateExtractor {
        PlateExtractor::new(Arc::new(model))
    }

    fn photo() -> EncodedImage {
        EncodedImage::new("image/jpeg", &b"\xFF\xD8\xFF"[..])
    }

    #[tokio::test]
    async fn passes_plate_through_verbatim() {
        let model = Arc::new(CannedModel::answering(
            json!({"licensePlateNumber": " abc-123 ", "isLicensePlateDetected": true}),
        ));
        let extractor = PlateExtractor::new(model.clone());
        let plate = extractor.extract(&photo()).await.unwrap();
        assert_eq!(plate.license_plate_number, " abc-123 ");
        assert!(plate.is_license_plate_detected);
        assert_eq!(
            *model.seen.lock().unwrap(),
            vec![("image/jpeg".to_string(), 2)]
        );
    }

    #[tokio::test]
    async fn not_detected_wins_over_text() {
        let extractor = extractor(CannedModel::answering(
            json!({"licensePlateNumber": "ABC-123", "isLicensePlateDetected": false}),
        ));
        let err = extractor.extract(&photo()).await.unwrap_err();
        assert!(matches!(err, ExtractError::NoPlateDetected));
        assert_eq!(
            err.to_body(),
            ErrorBody {
                error: "No license plate detected in the image.".to_string(),
                is_license_plate_detected: Some(false),
            }
        );
    }

    #[tokio::test]
    async fn blank_text_is_empty_extraction() {
        for text in &[json!(""), json!("   \t"), Value::Null] {
            let extractor = extractor(CannedModel::answering(
                json!({"licensePlateNumber": text, "isLicensePlateDetected": true}),
            ));
            let err = extractor.extract(&photo()).await.unwrap_err();
            assert!(matches!(err, ExtractError::EmptyExtraction), "text {}", text);
            assert_eq!(err.to_body().is_license_plate_detected, Some(true));
        }
    }

    #[tokio::test]
    async fn remote_failure_is_generic() {
        let extractor = extractor(CannedModel::failing("quota exceeded"));
        let err = extractor.extract(&photo()).await.unwrap_err();
        assert!(matches!(err, ExtractError::RemoteFailure(_)));
        assert_eq!(
            err.to_body(),
            ErrorBody::new("Failed to process image due to an internal error.")
        );
        let cause = std::error::Error::source(&err).unwrap();
        assert_eq!(cause.to_string(), "quota exceeded");
    }

    #[tokio::test]
    async fn off_schema_answer_is_remote_failure() {
        let extractor = extractor(CannedModel::answering(json!({"plate": "ABC-123"})));
        let err = extractor.extract(&photo()).await.unwrap_err();
        assert!(matches!(err, ExtractError::RemoteFailure(_)));
    }

    #[tokio::test]
    async fn malformed_data_uri_never_reaches_model() {
        let model = Arc::new(CannedModel::answering(json!({})));
        let extractor = PlateExtractor::new(model.clone());
        let err = extractor.extract_data_uri("not a photo").await.unwrap_err();
        assert!(matches!(err, ExtractError::MalformedImage(ImageError::NotADataUri)));
        assert_eq!(err.to_body().is_license_plate_detected, None);
        assert_eq!(
            std::error::Error::source(&err).unwrap().to_string(),
            "photo is not a data URI"
        );
        assert!(model.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn prompt_has_exactly_two_fields() {
        let prompt = plate_prompt();
        let names: Vec<_> = prompt.schema.fields.iter().map(|f| (f.name, f.kind)).collect();
        assert_eq!(
            names,
            vec![
                ("licensePlateNumber", FieldKind::String),
                ("isLicensePlateDetected", FieldKind::Boolean)
            ]
        );
    }
}
