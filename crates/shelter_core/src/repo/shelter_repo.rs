//! Animal shelter repository.
//!
//! # Responsibility
//! - Provide create/read/update/delete over the `animals` collection.
//! - Serve rescue-type searches and collection statistics.
//!
//! # Invariants
//! - Invalid input is rejected before the store is touched.
//! - Read paths degrade to empty results; write paths degrade to outcomes
//!   with `success() == false` carrying the failure.
//! - Update/delete criteria must be non-empty, so no call can hit the whole
//!   collection by accident.

use crate::config::{ConfigError, ShelterConfig};
use crate::model::record::{validate_record, ValidationError, AGE_FIELD, BREED_FIELD};
use crate::model::update::normalize_update;
use crate::model::{Document, RecordId};
use crate::query::rescue::RescueType;
use crate::store::{Accumulator, DocumentStore, GroupStage, MongoStore, Projection, StoreError};
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

const TOTAL_ANIMALS: &str = "total_animals";
const AVG_AGE_WEEKS: &str = "avg_age_weeks";
const BREEDS: &str = "breeds";

/// Failure reported by repository operations.
#[derive(Debug)]
pub enum ShelterError {
    /// Record was not a non-empty mapping.
    InvalidFormat,
    /// Record lacked required fields.
    MissingFields {
        required: &'static [&'static str],
        missing: Vec<&'static str>,
    },
    /// Update arguments were absent, empty or not mappings.
    InvalidArguments(String),
    /// Read/delete criteria were not usable mappings.
    InvalidCriteria(String),
    /// The document store faulted.
    StoreFailure(StoreError),
    /// Construction settings were rejected.
    Config(ConfigError),
}

impl ShelterError {
    /// Stable identifier used as `error_code` in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidFormat => "invalid_format",
            Self::MissingFields { .. } => "missing_fields",
            Self::InvalidArguments(_) => "invalid_arguments",
            Self::InvalidCriteria(_) => "invalid_criteria",
            Self::StoreFailure(_) => "store_failure",
            Self::Config(_) => "invalid_config",
        }
    }
}

impl Display for ShelterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidFormat => write!(f, "{}", ValidationError::InvalidFormat),
            Self::MissingFields { required, missing } => write!(
                f,
                "{}",
                ValidationError::MissingFields {
                    required: *required,
                    missing: missing.clone(),
                }
            ),
            Self::InvalidArguments(message) => write!(f, "invalid arguments: {message}"),
            Self::InvalidCriteria(message) => write!(f, "invalid criteria: {message}"),
            Self::StoreFailure(err) => write!(f, "store failure: {err}"),
            Self::Config(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ShelterError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StoreFailure(err) => Some(err),
            Self::Config(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for ShelterError {
    fn from(value: ValidationError) -> Self {
        match value {
            ValidationError::InvalidFormat => Self::InvalidFormat,
            ValidationError::MissingFields { required, missing } => {
                Self::MissingFields { required, missing }
            }
        }
    }
}

impl From<StoreError> for ShelterError {
    fn from(value: StoreError) -> Self {
        Self::StoreFailure(value)
    }
}

impl From<ConfigError> for ShelterError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

/// Result of [`AnimalShelter::create`].
#[derive(Debug)]
pub struct CreateOutcome {
    /// Identity assigned by the store.
    pub inserted_id: Option<RecordId>,
    pub error: Option<ShelterError>,
}

impl CreateOutcome {
    /// `true` iff the store assigned an identity to the new record.
    pub fn success(&self) -> bool {
        self.error.is_none() && self.inserted_id.is_some()
    }
}

/// Result of [`AnimalShelter::update`].
#[derive(Debug, Default)]
pub struct UpdateOutcome {
    pub matched_count: u64,
    pub modified_count: u64,
    pub error: Option<ShelterError>,
}

impl UpdateOutcome {
    /// `true` iff at least one document changed.
    ///
    /// Matching documents that already held the new values is not a success.
    pub fn success(&self) -> bool {
        self.error.is_none() && self.modified_count > 0
    }
}

/// Result of [`AnimalShelter::delete`].
#[derive(Debug, Default)]
pub struct DeleteOutcome {
    pub deleted_count: u64,
    pub error: Option<ShelterError>,
}

impl DeleteOutcome {
    /// `true` iff at least one document was removed.
    pub fn success(&self) -> bool {
        self.error.is_none() && self.deleted_count > 0
    }
}

/// Collection-wide summary computed per request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnimalStatistics {
    pub total_animals: u64,
    /// Mean of numeric ages; `None` when no record has a numeric age.
    pub avg_age_weeks: Option<f64>,
    pub unique_breeds: usize,
}

/// Validated CRUD access to the shelter's `animals` collection.
///
/// Holds one store handle for its whole lifetime; operations are stateless
/// and may be issued concurrently when the store allows it.
pub struct AnimalShelter<S = MongoStore> {
    store: S,
    database: String,
}

impl AnimalShelter<MongoStore> {
    /// Connects to MongoDB and verifies the server answers.
    ///
    /// # Errors
    /// Invalid settings or an unreachable server. Callers should treat this
    /// as fatal.
    pub fn connect(config: &ShelterConfig) -> Result<Self, ShelterError> {
        config.validate()?;
        info!(
            "event=store_connect module=repo status=start backend=mongodb uri={}",
            config.redacted_uri()
        );

        let store = MongoStore::connect(config).map_err(|err| {
            error!(
                "event=store_connect module=repo status=error backend=mongodb error_code=invalid_uri error={}",
                err
            );
            ShelterError::StoreFailure(err)
        })?;
        Self::open(store, config.db.clone())
    }
}

impl<S: DocumentStore> AnimalShelter<S> {
    /// Wraps an existing store after a connectivity probe.
    ///
    /// # Errors
    /// Returns `StoreFailure` when the store does not answer the probe.
    pub fn open(store: S, database: impl Into<String>) -> Result<Self, ShelterError> {
        let database = database.into();
        if let Err(err) = store.ping() {
            error!(
                "event=store_connect module=repo status=error db={} error_code=ping_failed error={}",
                database, err
            );
            return Err(ShelterError::StoreFailure(err));
        }

        info!("event=store_connect module=repo status=ok db={database}");
        Ok(Self { store, database })
    }

    /// Database name this repository was opened against.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Validates and inserts one record.
    pub fn create(&self, record: &Value) -> CreateOutcome {
        match self.insert(record) {
            Ok(inserted_id) => {
                if inserted_id.is_none() {
                    warn!("event=record_create module=repo status=error error_code=no_identity");
                }
                CreateOutcome {
                    inserted_id,
                    error: None,
                }
            }
            Err(err) => {
                log_failure(self.database(), "record_create", &err);
                CreateOutcome {
                    inserted_id: None,
                    error: Some(err),
                }
            }
        }
    }

    fn insert(&self, record: &Value) -> Result<Option<RecordId>, ShelterError> {
        let record = validate_record(record)?;
        let inserted_id = self.store.insert_one(record.as_document())?;
        debug!(
            "event=record_create module=repo status=ok db={} animal_type={} breed={}",
            self.database(),
            record.animal_type().unwrap_or("-"),
            record.breed().unwrap_or("-")
        );
        Ok(inserted_id)
    }

    /// Returns every record matching `criteria` (all records when `None`).
    ///
    /// The store identity is hidden unless `projection` says otherwise. Any
    /// failure yields an empty list.
    pub fn read(&self, criteria: Option<&Value>, projection: Option<&Projection>) -> Vec<Document> {
        self.try_read(criteria, projection).unwrap_or_else(|err| {
            log_failure(self.database(), "record_read", &err);
            Vec::new()
        })
    }

    /// Same query as [`read`](Self::read), with the failure made explicit.
    pub fn try_read(
        &self,
        criteria: Option<&Value>,
        projection: Option<&Projection>,
    ) -> Result<Vec<Document>, ShelterError> {
        let empty = Document::new();
        let criteria = match criteria {
            None => &empty,
            Some(Value::Object(criteria)) => criteria,
            Some(other) => {
                return Err(ShelterError::InvalidCriteria(format!(
                    "criteria must be a mapping, got {}",
                    value_kind(other)
                )));
            }
        };

        let default_projection;
        let projection = match projection {
            Some(projection) => projection,
            None => {
                default_projection = Projection::exclude_id();
                &default_projection
            }
        };

        let documents = self.store.find(criteria, projection)?;
        debug!(
            "event=record_read module=repo status=ok count={}",
            documents.len()
        );
        Ok(documents)
    }

    /// Applies `update` to every record matching `criteria`.
    ///
    /// Flat field maps become `$set` updates.
    pub fn update(&self, criteria: &Value, update: &Value) -> UpdateOutcome {
        match self.apply_update(criteria, update) {
            Ok(outcome) => outcome,
            Err(err) => {
                log_failure(self.database(), "record_update", &err);
                UpdateOutcome {
                    error: Some(err),
                    ..UpdateOutcome::default()
                }
            }
        }
    }

    fn apply_update(&self, criteria: &Value, update: &Value) -> Result<UpdateOutcome, ShelterError> {
        let (criteria, update) = match (non_empty_mapping(criteria), non_empty_mapping(update)) {
            (Some(criteria), Some(update)) => (criteria, update),
            _ => {
                return Err(ShelterError::InvalidArguments(
                    "criteria and update must both be non-empty mappings".to_string(),
                ));
            }
        };

        let update = normalize_update(update.clone());
        let counts = self.store.update_many(criteria, &update)?;
        debug!(
            "event=record_update module=repo status=ok matched={} modified={}",
            counts.matched, counts.modified
        );
        Ok(UpdateOutcome {
            matched_count: counts.matched,
            modified_count: counts.modified,
            error: None,
        })
    }

    /// Deletes every record matching `criteria`.
    pub fn delete(&self, criteria: &Value) -> DeleteOutcome {
        match self.remove(criteria) {
            Ok(deleted_count) => DeleteOutcome {
                deleted_count,
                error: None,
            },
            Err(err) => {
                log_failure(self.database(), "record_delete", &err);
                DeleteOutcome {
                    deleted_count: 0,
                    error: Some(err),
                }
            }
        }
    }

    fn remove(&self, criteria: &Value) -> Result<u64, ShelterError> {
        let criteria = non_empty_mapping(criteria).ok_or_else(|| {
            ShelterError::InvalidCriteria("delete criteria must be a non-empty mapping".to_string())
        })?;
        let deleted = self.store.delete_many(criteria)?;
        debug!("event=record_delete module=repo status=ok deleted={deleted}");
        Ok(deleted)
    }

    /// Returns dogs suited to the `water`, `mount` or `disaster` category.
    ///
    /// Unknown categories yield an empty list without querying the store.
    pub fn get_breeds_by_rescue_type(&self, rescue_type: &str) -> Vec<Document> {
        let Some(filter) = RescueType::lookup(rescue_type) else {
            warn!(
                "event=rescue_search module=repo status=error error_code=unknown_rescue_type rescue_type={}",
                crate::logging::single_line(rescue_type, 32)
            );
            return Vec::new();
        };
        self.read(Some(&Value::Object(filter)), None)
    }

    /// Computes record count, mean age and distinct breed count.
    ///
    /// Returns `None` for an empty collection or when the store faults.
    pub fn get_animal_statistics(&self) -> Option<AnimalStatistics> {
        self.statistics().unwrap_or_else(|err| {
            log_failure(self.database(), "animal_statistics", &err);
            None
        })
    }

    fn statistics(&self) -> Result<Option<AnimalStatistics>, ShelterError> {
        let stage = GroupStage::new()
            .with(TOTAL_ANIMALS, Accumulator::Count)
            .with(AVG_AGE_WEEKS, Accumulator::Average(AGE_FIELD.to_string()))
            .with(BREEDS, Accumulator::DistinctValues(BREED_FIELD.to_string()));

        let Some(row) = self.store.aggregate_group(&stage)? else {
            return Ok(None);
        };

        let total_animals = row
            .get(TOTAL_ANIMALS)
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                StoreError::InvalidData(format!("group row lacks numeric `{TOTAL_ANIMALS}`"))
            })?;
        let unique_breeds = row
            .get(BREEDS)
            .and_then(Value::as_array)
            .map(Vec::len)
            .ok_or_else(|| StoreError::InvalidData(format!("group row lacks `{BREEDS}` set")))?;

        Ok(Some(AnimalStatistics {
            total_animals,
            avg_age_weeks: row.get(AVG_AGE_WEEKS).and_then(Value::as_f64),
            unique_breeds,
        }))
    }
}

impl<S: DocumentStore> Display for AnimalShelter<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.statistics() {
            Ok(stats) => write!(
                f,
                "Animal Shelter Database - Total Animals: {}",
                stats.map_or(0, |stats| stats.total_animals)
            ),
            Err(_) => f.write_str("Animal Shelter Database - Status Unknown"),
        }
    }
}

fn non_empty_mapping(value: &Value) -> Option<&Document> {
    value.as_object().filter(|map| !map.is_empty())
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a mapping",
    }
}

fn log_failure(database: &str, event: &str, err: &ShelterError) {
    error!(
        "event={event} module=repo status=error db={database} error_code={} error={}",
        err.code(),
        crate::logging::single_line(&err.to_string(), 240)
    );
}
