use crate::plate;
use crate::types::{ErrorBody, RegistrationStatus, VehicleDetails, VehicleRecord};
use log::{info, warn};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Registry {
    records: Vec<VehicleRecord>,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid registry JSON: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("record {0:?} must be government or private/commercial")]
    UnregisteredStatus(String),
    #[error("record plate {0:?} is too short")]
    BadPlate(String),
    #[error("plate {0:?} appears more than once")]
    Duplicate(String),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordEntry {
    plate_number: String,
    status: RegistrationStatus,
    #[serde(flatten)]
    details: VehicleDetails,
}

fn record(
    plate_number: &str,
    status: RegistrationStatus,
    [make, model, color, owner, registration_date, engine_no, chassis_no]: [&str; 7],
) -> VehicleRecord {
    VehicleRecord::new(
        plate_number,
        status,
        VehicleDetails {
            make: make.into(),
            model: model.into(),
            color: color.into(),
            owner: owner.into(),
            registration_date: registration_date.into(),
            engine_no: engine_no.into(),
            chassis_no: chassis_no.into(),
        },
    )
}

impl Registry {
    #[rustfmt::skip]
    pub fn builtin() -> Self {
        use RegistrationStatus::{GovernmentRegistered, PrivateCommercial};
        Registry {
            records: vec![
                record(
                    "ABC-123",
                    GovernmentRegistered,
                    ["Toyota", "Corolla", "White", "Sindh Government", "2022-01-15", "XYZ12345", "CHASSIS9876"],
                ),
                record(
                    "XYZ-789",
                    PrivateCommercial,
                    ["Honda", "Civic", "Black", "John Doe", "2021-07-20", "ENG67890", "CHASSIS5432"],
                ),
                record(
                    "KHI-007",
                    GovernmentRegistered,
                    ["Suzuki", "Bolan", "Silver", "Karachi Police Department", "2020-03-10", "SPL007ENG", "SPL007CHS"],
                ),
                record(
                    "LHR-456",
                    PrivateCommercial,
                    ["Suzuki", "Alto", "Red", "Jane Smith", "2023-02-28", "ALTOLHR456", "CHASSISLHR456"],
                ),
                record(
                    "ATT-0CK",
                    GovernmentRegistered,
                    ["Ford", "Ranger", "Blue", "Punjab Police", "2022-11-10", "FORDRGR001", "CHASSISRGR001"],
                ),
                record(
                    "AKU-787",
                    PrivateCommercial,
                    ["Kia", "Sportage", "Grey", "Ahmad Khan", "2021-09-05", "KIASPORT787", "CHASSISKIA787"],
                ),
                record(
                    "BWP-001",
                    GovernmentRegistered,
                    ["Toyota", "Hilux", "Black", "District Administration BWP", "2023-01-01", "TOYHLXBWP001", "CHASSISHLXBWP001"],
                ),
            ],
        }
    }

    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let entries: Vec<RecordEntry> = serde_json::from_str(json).map_err(RegistryError::Parse)?;
        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            if !entry.status.is_registered() {
                return Err(RegistryError::UnregisteredStatus(entry.plate_number));
            }
            let key = plate::normalize(&entry.plate_number);
            if !plate::is_well_formed(&key) {
                return Err(RegistryError::BadPlate(entry.plate_number));
            }
            if !seen.insert(key) {
                return Err(RegistryError::Duplicate(entry.plate_number));
            }
            records.push(VehicleRecord::new(entry.plate_number, entry.status, entry.details));
        }
        Ok(Registry { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn find(&self, normalized: &str) -> Option<&VehicleRecord> {
        self.records
            .iter()
            .find(|r| plate::normalize(r.plate_number()) == normalized)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("Invalid license plate number format.")]
    InvalidFormat,
}

impl LookupError {
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody::new(self.to_string())
    }
}

pub struct VehicleLookup {
    registry: Arc<Registry>,
    delay: Duration,
}

impl VehicleLookup {
    pub fn new(registry: Arc<Registry>) -> Self {
        VehicleLookup {
            registry,
            delay: Duration::from_millis(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub async fn lookup(&self, raw: &str) -> Result<VehicleRecord, LookupError> {
        if self.delay > Duration::from_millis(0) {
            tokio::time::sleep(self.delay).await;
        }
        self.lookup_now(raw)
    }

    fn lookup_now(&self, raw: &str) -> Result<VehicleRecord, LookupError> {
        let normalized = plate::normalize(raw);
        if !plate::is_well_formed(&normalized) {
            warn!("Invalid plate {:?}", raw);
            return Err(LookupError::InvalidFormat);
        }
        match self.registry.find(&normalized) {
            Some(record) => {
                info!("Found {} ({})", record.plate_number(), record.status());
                Ok(record.clone())
            }
            None => {
                info!("No record for {}", normalized);
                Ok(VehicleRecord::not_found(raw))
            }
        }
    }
}
