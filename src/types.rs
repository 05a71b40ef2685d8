use serde::{Deserialize, Serialize};
use std::fmt;

pub const UNKNOWN: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationStatus {
    #[serde(rename = "Government Registered")]
    GovernmentRegistered,
    #[serde(rename = "Private/Commercial")]
    PrivateCommercial,
    #[serde(rename = "Not Found")]
    NotFound,
    #[serde(rename = "Invalid Plate Number")]
    InvalidPlate,
}

impl RegistrationStatus {
    pub fn is_registered(self) -> bool {
        match self {
            RegistrationStatus::GovernmentRegistered | RegistrationStatus::PrivateCommercial => {
                true
            }
            RegistrationStatus::NotFound | RegistrationStatus::InvalidPlate => false,
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RegistrationStatus::GovernmentRegistered => "Government Registered",
            RegistrationStatus::PrivateCommercial => "Private/Commercial",
            RegistrationStatus::NotFound => "Not Found",
            RegistrationStatus::InvalidPlate => "Invalid Plate Number",
        })
    }
}

/// A single vehicle attribute. Blank strings and the `N/A` marker both read
/// back as `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum Attribute {
    Known(String),
    Unknown,
}

impl Attribute {
    pub fn as_known(&self) -> Option<&str> {
        match self {
            Attribute::Known(s) => Some(s),
            Attribute::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        self.as_known().is_some()
    }
}

impl Default for Attribute {
    fn default() -> Self {
        Attribute::Unknown
    }
}

impl From<Option<String>> for Attribute {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(s) if !s.trim().is_empty() && s != UNKNOWN => Attribute::Known(s),
            _ => Attribute::Unknown,
        }
    }
}

impl From<&str> for Attribute {
    fn from(value: &str) -> Self {
        Attribute::from(Some(value.to_string()))
    }
}

impl From<Attribute> for String {
    fn from(value: Attribute) -> Self {
        match value {
            Attribute::Known(s) => s,
            Attribute::Unknown => UNKNOWN.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VehicleDetails {
    pub make: Attribute,
    pub model: Attribute,
    pub color: Attribute,
    pub owner: Attribute,
    pub registration_date: Attribute,
    pub engine_no: Attribute,
    pub chassis_no: Attribute,
}

impl VehicleDetails {
    fn any_known(&self) -> bool {
        [
            &self.make,
            &self.model,
            &self.color,
            &self.owner,
            &self.registration_date,
            &self.engine_no,
            &self.chassis_no,
        ]
        .iter()
        .any(|a| a.is_known())
    }
}

/// A registration record. Records whose status is not a registered one never
/// carry known attribute values; the constructors enforce this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleRecord {
    plate_number: String,
    status: RegistrationStatus,
    #[serde(flatten)]
    details: VehicleDetails,
}

impl VehicleRecord {
    pub fn new(
        plate_number: impl Into<String>,
        status: RegistrationStatus,
        details: VehicleDetails,
    ) -> Self {
        let details = if status.is_registered() {
            details
        } else {
            VehicleDetails::default()
        };
        VehicleRecord {
            plate_number: plate_number.into(),
            status,
            details,
        }
    }

    pub fn not_found(plate_number: impl Into<String>) -> Self {
        VehicleRecord::new(plate_number, RegistrationStatus::NotFound, VehicleDetails::default())
    }

    pub fn plate_number(&self) -> &str {
        &self.plate_number
    }

    pub fn status(&self) -> RegistrationStatus {
        self.status
    }

    pub fn details(&self) -> &VehicleDetails {
        &self.details
    }

    pub fn has_details(&self) -> bool {
        self.details.any_known()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    #[serde(default)]
    pub license_plate_number: Option<String>,
    pub is_license_plate_detected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedPlate {
    pub license_plate_number: String,
    pub is_license_plate_detected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_license_plate_detected: Option<bool>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        ErrorBody {
            error: error.into(),
            is_license_plate_detected: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractRequest {
    pub photo_data_uri: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleRequest {
    pub plate_number: String,
}
