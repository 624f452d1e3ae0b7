//! Search-and-rescue query catalog.
//!
//! # Responsibility
//! - Define the breed/sex/age profile of each rescue category.
//! - Build the filter predicate sent to the store for a category.
//!
//! # Invariants
//! - Age bounds are inclusive on both ends.
//! - Unknown category keys resolve to no predicate, never to an empty filter.

use crate::model::record::{AGE_FIELD, ANIMAL_TYPE_FIELD, BREED_FIELD, SEX_FIELD};
use crate::model::Document;
use serde_json::json;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Rescue category a dog may be trained for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RescueType {
    Water,
    Mount,
    Disaster,
}

/// Static selection criteria for one rescue category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RescueProfile {
    pub species: &'static str,
    pub breeds: &'static [&'static str],
    pub sex: &'static str,
    /// Inclusive minimum age in weeks.
    pub min_age_weeks: f64,
    /// Inclusive maximum age in weeks.
    pub max_age_weeks: f64,
}

const WATER: RescueProfile = RescueProfile {
    species: "Dog",
    breeds: &[
        "Labrador Retriever Mix",
        "Chesapeake Bay Retriever",
        "Newfoundland",
    ],
    sex: "Intact Female",
    min_age_weeks: 26.0,
    max_age_weeks: 156.0,
};

const MOUNT: RescueProfile = RescueProfile {
    species: "Dog",
    breeds: &[
        "German Shepherd",
        "Alaskan Malamute",
        "Old English Sheepdog",
        "Siberian Husky",
        "Rottweiler",
    ],
    sex: "Intact Male",
    min_age_weeks: 26.0,
    max_age_weeks: 156.0,
};

const DISASTER: RescueProfile = RescueProfile {
    species: "Dog",
    breeds: &[
        "Doberman Pinscher",
        "German Shepherd",
        "Golden Retriever",
        "Bloodhound",
        "Rottweiler",
    ],
    sex: "Intact Male",
    min_age_weeks: 20.0,
    max_age_weeks: 300.0,
};

impl RescueType {
    /// Every category in catalog order.
    pub const ALL: [RescueType; 3] = [Self::Water, Self::Mount, Self::Disaster];

    /// Symbolic key used by callers, e.g. `water`.
    pub fn key(self) -> &'static str {
        match self {
            Self::Water => "water",
            Self::Mount => "mount",
            Self::Disaster => "disaster",
        }
    }

    pub fn profile(self) -> &'static RescueProfile {
        match self {
            Self::Water => &WATER,
            Self::Mount => &MOUNT,
            Self::Disaster => &DISASTER,
        }
    }

    /// Builds the store filter for this category.
    pub fn filter(self) -> Document {
        self.profile().to_filter()
    }

    /// Resolves a symbolic key to its filter predicate.
    ///
    /// Returns `None` for keys outside the catalog.
    pub fn lookup(key: &str) -> Option<Document> {
        key.parse::<RescueType>().ok().map(RescueType::filter)
    }
}

impl RescueProfile {
    /// Returns whether `breed` belongs to this profile's breed set.
    pub fn accepts_breed(&self, breed: &str) -> bool {
        self.breeds.contains(&breed)
    }

    /// Returns whether `age_weeks` falls inside the inclusive age window.
    pub fn accepts_age(&self, age_weeks: f64) -> bool {
        (self.min_age_weeks..=self.max_age_weeks).contains(&age_weeks)
    }

    /// Encodes the profile as an equality/membership/range predicate.
    pub fn to_filter(&self) -> Document {
        let mut filter = Document::new();
        filter.insert(ANIMAL_TYPE_FIELD.to_string(), json!(self.species));
        filter.insert(BREED_FIELD.to_string(), json!({ "$in": self.breeds }));
        filter.insert(SEX_FIELD.to_string(), json!(self.sex));
        filter.insert(
            AGE_FIELD.to_string(),
            json!({ "$gte": self.min_age_weeks, "$lte": self.max_age_weeks }),
        );
        filter
    }
}

/// Error returned when parsing an unknown rescue key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRescueType(pub String);

impl Display for UnknownRescueType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unknown rescue type `{}`; expected water|mount|disaster",
            self.0
        )
    }
}

impl std::error::Error for UnknownRescueType {}

impl FromStr for RescueType {
    type Err = UnknownRescueType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "water" => Ok(Self::Water),
            "mount" => Ok(Self::Mount),
            "disaster" => Ok(Self::Disaster),
            other => Err(UnknownRescueType(other.to_string())),
        }
    }
}

impl Display for RescueType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::RescueType;
    use serde_json::{json, Value};

    #[test]
    fn water_filter_matches_catalog_shape() {
        let filter = RescueType::Water.filter();
        assert_eq!(
            Value::Object(filter),
            json!({
                "animal_type": "Dog",
                "breed": { "$in": [
                    "Labrador Retriever Mix",
                    "Chesapeake Bay Retriever",
                    "Newfoundland"
                ] },
                "sex_upon_outcome": "Intact Female",
                "age_upon_outcome_in_weeks": { "$gte": 26.0, "$lte": 156.0 }
            })
        );
    }

    #[test]
    fn keys_round_trip_through_parse() {
        for rescue in RescueType::ALL {
            assert_eq!(rescue.key().parse::<RescueType>().unwrap(), rescue);
        }
    }

    #[test]
    fn keys_are_case_sensitive() {
        assert!("Water".parse::<RescueType>().is_err());
        assert!(RescueType::lookup("WATER").is_none());
    }

    #[test]
    fn age_window_is_inclusive() {
        let disaster = RescueType::Disaster.profile();
        assert!(disaster.accepts_age(20.0));
        assert!(disaster.accepts_age(300.0));
        assert!(!disaster.accepts_age(19.9));
        assert!(!disaster.accepts_age(300.1));
    }
}
