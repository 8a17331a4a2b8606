use serde::{Deserialize, Serialize};

/// One point-in-time snapshot of the playback engine, as pushed to clients.
///
/// Fields are declared in wire-key order so the encoded document comes out
/// with sorted keys:
///
/// ```json
/// {"file_name":"a.mp4","file_size":1024,"idle":false,"percent_complete":12,"time_position":3.5,"total_duration":30.0}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackStatus {
    #[serde(rename = "file_name")]
    pub loaded_file_name: String,
    pub file_size: i64,
    pub idle: bool,
    pub percent_complete: i64,
    pub time_position: f64,
    pub total_duration: f64,
}

impl PlaybackStatus {
    /// Nothing loaded.
    pub fn idle() -> Self {
        Self {
            loaded_file_name: String::new(),
            file_size: 0,
            idle: true,
            percent_complete: 0,
            time_position: 0.0,
            total_duration: 0.0,
        }
    }

    /// Encode to the flat status document sent to clients.
    ///
    /// Non-finite floats become `0.0` and the percentage is clamped to 0..=100,
    /// so every field keeps its declared wire type.
    pub fn encode(&self) -> serde_json::Result<String> {
        let wire = Self {
            loaded_file_name: self.loaded_file_name.clone(),
            file_size: self.file_size.max(0),
            idle: self.idle,
            percent_complete: self.percent_complete.clamp(0, 100),
            time_position: finite_or_zero(self.time_position),
            total_duration: finite_or_zero(self.total_duration),
        };
        serde_json::to_string(&wire)
    }
}

impl Default for PlaybackStatus {
    fn default() -> Self {
        Self::idle()
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn playing() -> PlaybackStatus {
        PlaybackStatus {
            loaded_file_name: "a.mp4".into(),
            file_size: 1_048_576,
            idle: false,
            percent_complete: 42,
            time_position: 12.25,
            total_duration: 29.5,
        }
    }

    #[test]
    fn encodes_every_field_under_its_wire_name() {
        let doc: Value = serde_json::from_str(&playing().encode().unwrap()).unwrap();
        let obj = doc.as_object().unwrap();
        assert_eq!(obj.len(), 6);
        assert_eq!(obj["file_name"], "a.mp4");
        assert_eq!(obj["file_size"].as_i64(), Some(1_048_576));
        assert_eq!(obj["idle"], false);
        assert_eq!(obj["percent_complete"].as_i64(), Some(42));
        assert_eq!(obj["time_position"].as_f64(), Some(12.25));
        assert_eq!(obj["total_duration"].as_f64(), Some(29.5));
    }

    #[test]
    fn encoded_keys_are_sorted() {
        let text = PlaybackStatus::idle().encode().unwrap();
        assert_eq!(
            text,
            r#"{"file_name":"","file_size":0,"idle":true,"percent_complete":0,"time_position":0.0,"total_duration":0.0}"#
        );
    }

    #[test]
    fn decoding_gives_back_the_same_snapshot() {
        let status = playing();
        let back: PlaybackStatus = serde_json::from_str(&status.encode().unwrap()).unwrap();
        assert_eq!(back, status);
    }

    #[test]
    fn out_of_range_values_keep_their_wire_types() {
        let status = PlaybackStatus {
            percent_complete: 140,
            time_position: f64::NAN,
            total_duration: f64::INFINITY,
            ..playing()
        };
        let doc: Value = serde_json::from_str(&status.encode().unwrap()).unwrap();
        assert_eq!(doc["percent_complete"].as_i64(), Some(100));
        assert_eq!(doc["time_position"].as_f64(), Some(0.0));
        assert_eq!(doc["total_duration"].as_f64(), Some(0.0));
    }
}
