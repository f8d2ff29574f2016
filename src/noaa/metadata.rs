use chrono::{DateTime, Utc};
use thiserror::Error;

/// Validation failure for a pass metadata file. The pass is never retried in this process.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetadataError {
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("malformed {field}: `{value}`")]
    Malformed { field: &'static str, value: String },
    #[error("non-finite gain `{0}`")]
    NonFiniteGain(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PassMetadata {
    pub channel_a: String,
    pub channel_b: String,
    /// Already sign-adjusted, see [`stored_gain`].
    pub gain: f64,
    pub max_elevation: i32,
    pub end_time: Option<DateTime<Utc>>,
}

/// The recorder writes gain with the opposite sign of what the catalog stores.
pub fn stored_gain(raw: f64) -> f64 {
    -raw
}

fn field<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    text.lines().find_map(|line| {
        let line = line.strip_suffix('\r').unwrap_or(line);
        line.strip_prefix(key)?.strip_prefix('=')
    })
}

fn channel(text: &str, key: &'static str, label: &str) -> Result<String, MetadataError> {
    let raw = field(text, key).ok_or(MetadataError::Missing(key))?;
    let malformed = || MetadataError::Malformed {
        field: key,
        value: raw.to_string(),
    };

    let described = raw.strip_prefix(label).ok_or_else(malformed)?;
    if !described.ends_with(')') {
        return Err(malformed());
    }
    let idx = described.rfind(" (").ok_or_else(malformed)?;
    let id = &described[..idx];
    if id.is_empty() {
        return Err(malformed());
    }
    Ok(id.to_string())
}

fn gain(text: &str) -> Result<f64, MetadataError> {
    let raw = field(text, "GAIN").ok_or(MetadataError::Missing("GAIN"))?;
    let value = raw
        .strip_prefix("Gain: ")
        .and_then(|v| v.trim().parse::<f64>().ok())
        .ok_or_else(|| MetadataError::Malformed {
            field: "GAIN",
            value: raw.to_string(),
        })?;
    if !value.is_finite() {
        return Err(MetadataError::NonFiniteGain(raw.to_string()));
    }
    Ok(stored_gain(value))
}

fn max_elevation(text: &str) -> Result<i32, MetadataError> {
    let raw = field(text, "MAXELEV").ok_or(MetadataError::Missing("MAXELEV"))?;
    raw.trim()
        .parse::<i32>()
        .map_err(|_| MetadataError::Malformed {
            field: "MAXELEV",
            value: raw.to_string(),
        })
}

fn end_time(text: &str) -> Result<Option<DateTime<Utc>>, MetadataError> {
    let Some(raw) = field(text, "END_TIME") else {
        return Ok(None);
    };
    let malformed = || MetadataError::Malformed {
        field: "END_TIME",
        value: raw.to_string(),
    };

    let secs = raw.trim().parse::<f64>().map_err(|_| malformed())?;
    if !secs.is_finite() {
        return Err(malformed());
    }
    let millis = (secs * 1000.0).round();
    if millis.abs() > i64::MAX as f64 {
        return Err(malformed());
    }
    DateTime::<Utc>::from_timestamp_millis(millis as i64)
        .map(Some)
        .ok_or_else(malformed)
}

/// Parses `KEY=value` metadata lines. The first occurrence of a key wins.
pub fn parse(text: &str) -> Result<PassMetadata, MetadataError> {
    Ok(PassMetadata {
        channel_a: channel(text, "CHAN_A", "Channel A: ")?,
        channel_b: channel(text, "CHAN_B", "Channel B: ")?,
        gain: gain(text)?,
        max_elevation: max_elevation(text)?,
        end_time: end_time(text)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    const NOAA19: &str = "CHAN_A=Channel A: 2 (near infrared)\n\
                          CHAN_B=Channel B: 4 (thermal infrared)\n\
                          GAIN=Gain: -3.5\n\
                          MAXELEV=67\n";

    #[test]
    fn parses_channels_gain_and_elevation() {
        let meta = parse(NOAA19).expect("parse");
        assert_eq!(
            meta,
            PassMetadata {
                channel_a: "2".to_string(),
                channel_b: "4".to_string(),
                gain: 3.5,
                max_elevation: 67,
                end_time: None,
            }
        );
    }

    #[test]
    fn stored_gain_negates_recorded_value() {
        assert_eq!(stored_gain(-3.5), 3.5);
        assert_eq!(stored_gain(12.25), -12.25);
    }

    #[test]
    fn tolerates_crlf_and_keeps_first_occurrence() {
        let text = "CHAN_A=Channel A: 3B (mid infrared)\r\nCHAN_B=Channel B: 4 (thermal infrared)\r\n\
                    GAIN=Gain: 1.5\r\nMAXELEV= -3 \r\nMAXELEV=80\r\nEND_TIME=1680350400.25\r\n";
        let meta = parse(text).expect("parse");
        assert_eq!(meta.channel_a, "3B");
        assert_eq!(meta.gain, -1.5);
        assert_eq!(meta.max_elevation, -3);
        assert_eq!(
            meta.end_time,
            Utc.timestamp_millis_opt(1_680_350_400_250).single()
        );
    }

    #[test]
    fn channel_id_is_text_before_last_parenthesis() {
        let text = NOAA19.replace(
            "Channel A: 2 (near infrared)",
            "Channel A: 2 (x) (near infrared)",
        );
        assert_eq!(parse(&text).expect("parse").channel_a, "2 (x)");
    }

    #[test]
    fn rejects_malformed_elevation() {
        let text = NOAA19.replace("MAXELEV=67", "MAXELEV=abc");
        assert_eq!(
            parse(&text),
            Err(MetadataError::Malformed {
                field: "MAXELEV",
                value: "abc".to_string()
            })
        );
    }

    #[test]
    fn rejects_missing_fields_and_bad_channel_shapes() {
        let no_gain = NOAA19.replace("GAIN=Gain: -3.5\n", "");
        assert_eq!(parse(&no_gain), Err(MetadataError::Missing("GAIN")));

        let bare = NOAA19.replace("Channel B: 4 (thermal infrared)", "Channel B: 4");
        assert!(matches!(
            parse(&bare),
            Err(MetadataError::Malformed { field: "CHAN_B", .. })
        ));

        let wrong_letter = NOAA19.replace("CHAN_A=Channel A:", "CHAN_A=Channel B:");
        assert!(matches!(
            parse(&wrong_letter),
            Err(MetadataError::Malformed { field: "CHAN_A", .. })
        ));
    }

    #[test]
    fn rejects_non_finite_gain_and_bad_end_time() {
        let nan = NOAA19.replace("Gain: -3.5", "Gain: NaN");
        assert!(matches!(parse(&nan), Err(MetadataError::NonFiniteGain(_))));

        let garbled = format!("{NOAA19}END_TIME=yesterday\n");
        assert!(matches!(
            parse(&garbled),
            Err(MetadataError::Malformed { field: "END_TIME", .. })
        ));

        let huge = format!("{NOAA19}END_TIME=1e300\n");
        assert!(parse(&huge).is_err());
    }
}
