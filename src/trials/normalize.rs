//! Flattening of raw registry studies into [`TrialRecord`]s.
//!
//! The registry nests every field under `protocolSection.<module>`. Any module
//! may be missing depending on the projection requested, so extraction never
//! fails: an absent module simply leaves its fields empty.

use super::query::{Phase, Recognized, Sex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Number of facilities shown to the model.
pub const FACILITY_DISPLAY_CAP: usize = 20;

/// A trial site.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub facility: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

impl Location {
    /// Trimmed `(facility, city, country)` tuple. Case is preserved.
    pub fn key(&self) -> (Option<&str>, Option<&str>, Option<&str>) {
        (
            self.facility.as_deref().map(str::trim),
            self.city.as_deref().map(str::trim),
            self.country.as_deref().map(str::trim),
        )
    }

    /// Whether the site is in `country`, ignoring case and surrounding space.
    pub fn in_country(&self, country: &str) -> bool {
        self.country
            .as_deref()
            .is_some_and(|c| c.trim().to_lowercase() == country.trim().to_lowercase())
    }

    fn trimmed(&self) -> Self {
        let (facility, city, country) = self.key();
        Self {
            facility: facility.map(str::to_string),
            city: city.map(str::to_string),
            country: country.map(str::to_string),
        }
    }
}

/// Flat view of one study.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialRecord {
    pub nct_id: String,
    pub brief_title: String,
    pub conditions: Vec<String>,
    pub phases: Vec<Recognized<Phase>>,
    pub overall_status: Option<String>,
    pub brief_summary: Option<String>,
    pub eligibility_criteria: Option<String>,
    pub sex: Option<Recognized<Sex>>,
    pub min_age: Option<String>,
    pub max_age: Option<String>,
    pub start_date: Option<String>,
    pub completion_date: Option<String>,
    pub locations: Vec<Location>,
}

/// Deduplicated facilities plus the count before truncation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSummary {
    pub total_facilities: usize,
    pub facilities: Vec<Location>,
}

fn text(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn strings(value: &Value, pointer: &str) -> Vec<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Project a raw study into a [`TrialRecord`]. Total over any JSON value.
pub fn normalize(study: &Value) -> TrialRecord {
    let Some(protocol) = study.get("protocolSection") else {
        return TrialRecord::default();
    };

    let locations = protocol
        .pointer("/contactsLocationsModule/locations")
        .and_then(Value::as_array)
        .map(|locs| {
            locs.iter()
                .filter(|loc| loc.is_object())
                .map(|loc| Location {
                    facility: text(loc, "/facility"),
                    city: text(loc, "/city"),
                    country: text(loc, "/country"),
                })
                .collect()
        })
        .unwrap_or_default();

    TrialRecord {
        nct_id: text(protocol, "/identificationModule/nctId").unwrap_or_default(),
        brief_title: text(protocol, "/identificationModule/briefTitle").unwrap_or_default(),
        conditions: strings(protocol, "/conditionsModule/conditions"),
        phases: strings(protocol, "/designModule/phases")
            .iter()
            .map(|p| Recognized::from_raw(p))
            .collect(),
        overall_status: text(protocol, "/statusModule/overallStatus"),
        brief_summary: text(protocol, "/descriptionModule/briefSummary"),
        eligibility_criteria: text(protocol, "/eligibilityModule/eligibilityCriteria"),
        sex: text(protocol, "/eligibilityModule/sex").map(|s| Recognized::from_raw(&s)),
        min_age: text(protocol, "/eligibilityModule/minimumAge"),
        max_age: text(protocol, "/eligibilityModule/maximumAge"),
        start_date: text(protocol, "/statusModule/startDateStruct/date"),
        completion_date: text(protocol, "/statusModule/completionDateStruct/date"),
        locations,
    }
}

/// Normalize every study on a page.
pub fn normalize_all(studies: &[Value]) -> Vec<TrialRecord> {
    studies.iter().map(normalize).collect()
}

/// Deduplicate locations on their trimmed key, keeping first-seen order.
pub fn dedup_locations<'a, I>(locations: I) -> Vec<Location>
where
    I: IntoIterator<Item = &'a Location>,
{
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for loc in locations {
        let loc = loc.trimmed();
        if seen.insert(loc.clone()) {
            unique.push(loc);
        }
    }
    unique
}

/// Unique facilities across `studies`, capped at [`FACILITY_DISPLAY_CAP`].
pub fn unique_locations(studies: &[TrialRecord]) -> LocationSummary {
    summarize(dedup_locations(studies.iter().flat_map(|s| s.locations.iter())))
}

/// Cap an already-deduplicated list for display.
pub fn summarize(mut unique: Vec<Location>) -> LocationSummary {
    let total_facilities = unique.len();
    unique.truncate(FACILITY_DISPLAY_CAP);
    LocationSummary {
        total_facilities,
        facilities: unique,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn loc(facility: &str, city: &str, country: &str) -> Location {
        Location {
            facility: Some(facility.into()),
            city: Some(city.into()),
            country: Some(country.into()),
        }
    }

    fn full_study() -> Value {
        json!({
            "protocolSection": {
                "identificationModule": {"nctId": "NCT01234567", "briefTitle": "Metformin in T2D"},
                "statusModule": {
                    "overallStatus": "RECRUITING",
                    "startDateStruct": {"date": "2023-01"},
                    "completionDateStruct": {"date": "2026-06-30"}
                },
                "descriptionModule": {"briefSummary": "A study."},
                "conditionsModule": {"conditions": ["Diabetes Mellitus, Type 2", "Obesity"]},
                "designModule": {"phases": ["PHASE2", "PHASE3"]},
                "eligibilityModule": {
                    "eligibilityCriteria": "Inclusion: adults",
                    "sex": "ALL",
                    "minimumAge": "18 Years",
                    "maximumAge": "75 Years"
                },
                "contactsLocationsModule": {"locations": [
                    {"facility": "Hopital Lariboisiere", "city": "Paris", "country": "France"},
                    {"city": "Lyon", "country": "France"}
                ]}
            }
        })
    }

    #[test]
    fn flattens_every_module() {
        let record = normalize(&full_study());

        assert_eq!(record.nct_id, "NCT01234567");
        assert_eq!(record.brief_title, "Metformin in T2D");
        assert_eq!(record.conditions.len(), 2);
        assert_eq!(
            record.phases,
            vec![Recognized::Known(Phase::Phase2), Recognized::Known(Phase::Phase3)]
        );
        assert_eq!(record.overall_status.as_deref(), Some("RECRUITING"));
        assert_eq!(record.brief_summary.as_deref(), Some("A study."));
        assert_eq!(record.sex, Some(Recognized::Known(Sex::All)));
        assert_eq!(record.min_age.as_deref(), Some("18 Years"));
        assert_eq!(record.max_age.as_deref(), Some("75 Years"));
        assert_eq!(record.start_date.as_deref(), Some("2023-01"));
        assert_eq!(record.completion_date.as_deref(), Some("2026-06-30"));
        assert_eq!(record.locations.len(), 2);
        assert_eq!(record.locations[1].facility, None);
    }

    #[test]
    fn missing_modules_yield_absent_fields() {
        let record = normalize(&json!({
            "protocolSection": {
                "identificationModule": {"nctId": "NCT07654321", "briefTitle": "Only ids"}
            }
        }));

        assert_eq!(record.nct_id, "NCT07654321");
        assert!(record.conditions.is_empty());
        assert!(record.phases.is_empty());
        assert!(record.eligibility_criteria.is_none());
        assert!(record.sex.is_none());
        assert!(record.start_date.is_none());
        assert!(record.locations.is_empty());
    }

    #[test]
    fn tolerates_arbitrary_shapes() {
        for raw in [
            json!(null),
            json!(42),
            json!([]),
            json!({}),
            json!({"protocolSection": "oops"}),
            json!({"protocolSection": {"designModule": {"phases": "PHASE1"}}}),
            json!({"protocolSection": {"contactsLocationsModule": {"locations": [1, null, {"city": 3}]}}}),
        ] {
            let record = normalize(&raw);
            assert!(record.phases.is_empty());
            assert!(record.locations.iter().all(|l| l.city.is_none()));
        }
    }

    #[test]
    fn unexpected_enum_values_pass_through() {
        let record = normalize(&json!({
            "protocolSection": {
                "designModule": {"phases": ["NA", "EARLY_PHASE1", "PHASE4"]},
                "eligibilityModule": {"sex": "UNSPECIFIED"}
            }
        }));

        assert_eq!(record.phases.len(), 3);
        assert_eq!(
            record.phases[0],
            Recognized::Unrecognized { unrecognized: "NA".into() }
        );
        assert_eq!(record.phases[2], Recognized::Known(Phase::Phase4));
        assert_eq!(
            record.sex,
            Some(Recognized::Unrecognized { unrecognized: "UNSPECIFIED".into() })
        );
    }

    #[test]
    fn dedup_trims_but_keeps_case() {
        let unique = dedup_locations(&[
            loc("Clinic A", "Madrid", "Spain"),
            loc(" Clinic A ", "Madrid ", "Spain"),
            loc("clinic a", "Madrid", "Spain"),
        ]);

        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0], loc("Clinic A", "Madrid", "Spain"));
        assert_eq!(unique[1].facility.as_deref(), Some("clinic a"));
    }

    #[test]
    fn unique_locations_preserves_first_seen_order_and_caps() {
        let locations: Vec<Location> = (0..30)
            .flat_map(|i| {
                let site = loc(&format!("Site {i}"), "Berlin", "Germany");
                [site.clone(), site]
            })
            .collect();
        let studies = vec![
            TrialRecord {
                locations: locations[..25].to_vec(),
                ..TrialRecord::default()
            },
            TrialRecord {
                locations: locations[25..].to_vec(),
                ..TrialRecord::default()
            },
        ];

        let summary = unique_locations(&studies);
        assert_eq!(summary.total_facilities, 30);
        assert_eq!(summary.facilities.len(), FACILITY_DISPLAY_CAP);
        assert_eq!(summary.facilities[0].facility.as_deref(), Some("Site 0"));
        assert_eq!(summary.facilities[19].facility.as_deref(), Some("Site 19"));
    }

    #[test]
    fn unique_locations_is_idempotent() {
        let studies = vec![TrialRecord {
            locations: vec![
                loc("B", "Rome", "Italy"),
                loc("A", "Rome", "Italy"),
                loc("B ", "Rome", "Italy"),
                Location::default(),
                Location::default(),
            ],
            ..TrialRecord::default()
        }];

        let once = unique_locations(&studies);
        let twice = unique_locations(&[TrialRecord {
            locations: once.facilities.clone(),
            ..TrialRecord::default()
        }]);
        assert_eq!(once, twice);
        assert_eq!(once.total_facilities, 3);
    }

    #[test]
    fn country_match_ignores_case() {
        let site = loc("Hospital", "Valencia", " Spain ");
        assert!(site.in_country("spain"));
        assert!(!site.in_country("Portugal"));
        assert!(!Location::default().in_country("Spain"));
    }

    #[test]
    fn country_match_folds_non_ascii_case() {
        let site = loc("Klinikum", "Graz", "ÖSTERREICH");
        assert!(site.in_country("österreich"));
        assert!(loc("Hôpital", "Lyon", "Réunion").in_country("RÉUNION"));
    }
}
