//! Ticket JSON codec (spec.md §3 "Ticket", §8 round-trip laws).

use crate::error::{AirportError, Result};
use serde::{Deserialize, Serialize};

/// A point in time for time-travel reads (spec.md §3 "Ticket").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimePoint {
    pub unit: String,
    pub value: String,
}

/// The structured, JSON-encoded query descriptor round-tripped through
/// `DoGet` tickets (spec.md §3).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Ticket {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,
    pub schema: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_params: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_point_unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_point_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<u8>>,
}

impl Ticket {
    /// Validate the invariants of spec.md §3: non-empty schema, exactly
    /// one of `table`/`table_function`, `function_params` only alongside
    /// `table_function`, and `time_point_unit`/`time_point_value` set
    /// together or not at all.
    pub fn validate(&self) -> Result<()> {
        if self.schema.is_empty() {
            return Err(AirportError::InvalidTicket("schema must not be empty".into()));
        }
        match (&self.table, &self.table_function) {
            (Some(_), None) | (None, Some(_)) => {}
            (Some(_), Some(_)) => {
                return Err(AirportError::InvalidTicket(
                    "ticket cannot set both table and table_function".into(),
                ));
            }
            (None, None) => {
                return Err(AirportError::InvalidTicket(
                    "ticket must set exactly one of table or table_function".into(),
                ));
            }
        }
        if self.function_params.is_some() && self.table_function.is_none() {
            return Err(AirportError::InvalidTicket(
                "function_params is only valid alongside table_function".into(),
            ));
        }
        if self.time_point_unit.is_some() != self.time_point_value.is_some() {
            return Err(AirportError::InvalidTicket(
                "time_point_unit and time_point_value must be set together".into(),
            ));
        }
        Ok(())
    }

    /// Encode to the JSON bytes carried on the wire, validating first.
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.validate()?;
        serde_json::to_vec(self).map_err(AirportError::from)
    }

    /// Decode ticket JSON bytes, validating the result.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let ticket: Ticket = serde_json::from_slice(bytes)?;
        ticket.validate()?;
        Ok(ticket)
    }

    /// The decoded time point, if both halves are present.
    #[must_use]
    pub fn time_point(&self) -> Option<TimePoint> {
        match (&self.time_point_unit, &self.time_point_value) {
            (Some(unit), Some(value)) => Some(TimePoint {
                unit: unit.clone(),
                value: value.clone(),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_ticket() -> Ticket {
        Ticket {
            schema: "main".into(),
            table: Some("orders".into()),
            ..Default::default()
        }
    }

    #[test]
    fn round_trips_table_ticket() {
        let t = table_ticket();
        let bytes = t.encode().unwrap();
        let back = Ticket::decode(&bytes).unwrap();
        assert_eq!(t, back);
    }

    #[test]
    fn round_trips_time_travel_ticket() {
        let mut t = table_ticket();
        t.time_point_unit = Some("timestamp".into());
        t.time_point_value = Some("1704067200".into());
        let bytes = t.encode().unwrap();
        let back = Ticket::decode(&bytes).unwrap();
        assert_eq!(t, back);
        assert_eq!(
            back.time_point(),
            Some(TimePoint {
                unit: "timestamp".into(),
                value: "1704067200".into()
            })
        );
    }

    #[test]
    fn rejects_empty_schema() {
        let t = Ticket {
            schema: String::new(),
            table: Some("x".into()),
            ..Default::default()
        };
        assert!(t.encode().is_err());
    }

    #[test]
    fn rejects_both_table_and_function() {
        let t = Ticket {
            schema: "main".into(),
            table: Some("x".into()),
            table_function: Some("y".into()),
            ..Default::default()
        };
        assert!(t.encode().is_err());
    }

    #[test]
    fn rejects_neither_table_nor_function() {
        let t = Ticket {
            schema: "main".into(),
            ..Default::default()
        };
        assert!(t.encode().is_err());
    }

    #[test]
    fn rejects_function_params_without_table_function() {
        let t = Ticket {
            schema: "main".into(),
            table: Some("x".into()),
            function_params: Some(vec![1, 2, 3]),
            ..Default::default()
        };
        assert!(t.encode().is_err());
    }

    #[test]
    fn rejects_partial_time_point() {
        let mut t = table_ticket();
        t.time_point_unit = Some("timestamp".into());
        assert!(t.encode().is_err());
    }

    #[test]
    fn no_time_point_when_absent() {
        let t = table_ticket();
        assert_eq!(t.time_point(), None);
    }
}
