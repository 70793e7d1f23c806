//! State and district filtering over cached records
//!
//! Matching is whole-value and case-insensitive. A state matches either the
//! `state_name` or the `state` field; a district matches `district_name`. When
//! both are given a record must match both.

use serde::Deserialize;

use crate::data::Record;

/// Filter criteria, as taken from the query string
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RecordFilter {
    /// State to match against `state_name` or `state`
    pub state: Option<String>,
    /// District to match against `district_name`
    pub district: Option<String>,
}

impl RecordFilter {
    /// Creates a filter from optional criteria
    pub fn new(state: Option<&str>, district: Option<&str>) -> Self {
        Self {
            state: state.map(str::to_string),
            district: district.map(str::to_string),
        }
    }

    /// Whether the record passes every supplied criterion
    ///
    /// Empty criteria are treated as not supplied.
    pub fn matches(&self, record: &Record) -> bool {
        let state_ok = match non_empty(&self.state) {
            Some(state) => {
                eq_ignore_case(record.state_name(), state) || eq_ignore_case(record.state(), state)
            }
            None => true,
        };

        let district_ok = match non_empty(&self.district) {
            Some(district) => eq_ignore_case(record.district_name(), district),
            None => true,
        };

        state_ok && district_ok
    }

    /// Keeps the matching records, in their original order
    pub fn apply(&self, records: Vec<Record>) -> Vec<Record> {
        records.into_iter().filter(|r| self.matches(r)).collect()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn eq_ignore_case(field: Option<&str>, wanted: &str) -> bool {
    field.is_some_and(|value| value.to_lowercase() == wanted.to_lowercase())
}
