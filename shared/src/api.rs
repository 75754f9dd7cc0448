use serde::{Deserialize, Serialize};

/// Payload for `POST /api/location`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SaveLocationRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
}

/// One stored location as returned by `GET /api/locations`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationRecord {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    pub timestamp: String,
}

impl LocationRecord {
    /// Epoch seconds of the record timestamp, if parseable.
    pub fn timestamp_secs(&self) -> Option<i64> {
        chrono::DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|dt| dt.timestamp())
    }
}

/// Response envelope for `GET /api/locations`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationsPage {
    #[serde(default)]
    pub locations: Vec<LocationRecord>,
}

/// Error body the API attaches to non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

/// Extract the server-provided error message from a response body, if any.
pub fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_error_field() {
        assert_eq!(
            error_message(r#"{"error":"token expired"}"#),
            Some("token expired".to_string())
        );
    }

    #[test]
    fn tolerates_missing_error_field() {
        assert_eq!(error_message(r#"{"status":"bad"}"#), None);
    }

    #[test]
    fn tolerates_non_json_body() {
        assert_eq!(error_message("<html>502</html>"), None);
    }

    #[test]
    fn parses_record_timestamp() {
        let record = LocationRecord {
            latitude: 37.0,
            longitude: -122.0,
            accuracy: Some(10.0),
            timestamp: "2025-06-01T12:00:00Z".to_string(),
        };
        assert_eq!(record.timestamp_secs(), Some(1_748_779_200));
    }

    #[test]
    fn rejects_unparseable_timestamp() {
        let record = LocationRecord {
            latitude: 0.0,
            longitude: 0.0,
            accuracy: None,
            timestamp: "yesterday".to_string(),
        };
        assert_eq!(record.timestamp_secs(), None);
    }

    #[test]
    fn locations_page_defaults_to_empty() {
        let page: LocationsPage = serde_json::from_str("{}").unwrap();
        assert!(page.locations.is_empty());
    }
}
