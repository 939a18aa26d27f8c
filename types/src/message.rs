//! Raw records as returned by the external chat feed.

use serde::{Deserialize, Deserializer, Serialize};

/// One message from the public chat feed, exactly as the feed reports it.
///
/// `username` is usually `"<lang>/<name>"`, e.g. `"en/Alice"`. `timestamp`
/// is kept as the feed's own string; the matcher parses it. Feeds that send
/// the timestamp as a JSON number get its decimal form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawChatMessage {
    pub username: String,
    pub text: String,
    #[serde(default, deserialize_with = "timestamp_text")]
    pub timestamp: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireTimestamp {
    Text(String),
    Secs(u64),
    Fractional(f64),
    Missing(()),
}

fn timestamp_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match WireTimestamp::deserialize(deserializer)? {
        WireTimestamp::Text(text) => text,
        WireTimestamp::Secs(secs) => secs.to_string(),
        // Sub-second precision is dropped; the matcher works in whole seconds.
        WireTimestamp::Fractional(secs) if secs.is_finite() && secs >= 0.0 => {
            (secs.trunc() as u64).to_string()
        }
        WireTimestamp::Fractional(_) | WireTimestamp::Missing(()) => String::new(),
    })
}

impl RawChatMessage {
    pub fn new(
        username: impl Into<String>,
        text: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            text: text.into(),
            timestamp: timestamp.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_timestamp_defaults_to_empty() {
        let msg: RawChatMessage =
            serde_json::from_str(r#"{"username":"en/Alice","text":"hi"}"#).unwrap();
        assert_eq!(msg.timestamp, "");
        assert_eq!(msg.username, "en/Alice");
    }

    #[test]
    fn numeric_timestamps_become_decimal_text() {
        let batch: Vec<RawChatMessage> = serde_json::from_str(
            r#"[
                {"username":"en/Alice","text":"7f3a","timestamp":1714564800},
                {"username":"en/Bob","text":"hi","timestamp":1714564805.75},
                {"username":"en/Cara","text":"yo","timestamp":"2024-05-01T12:00:00Z"},
                {"username":"en/Dan","text":"hey","timestamp":null}
            ]"#,
        )
        .unwrap();
        assert_eq!(batch[0].timestamp, "1714564800");
        assert_eq!(batch[1].timestamp, "1714564805");
        assert_eq!(batch[2].timestamp, "2024-05-01T12:00:00Z");
        assert_eq!(batch[3].timestamp, "");
    }
}
