use crate::noaa::metadata::MetadataError;
use bitflags::bitflags;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Derived image variants a pass is expected to have. Serialized as the raw bit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnhancementTypes(u32);

bitflags! {
    impl EnhancementTypes: u32 {
        const ZA = 1;
        const NO = 2;
        const MSA = 4;
        const MCIR = 8;
        const THERM = 16;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectionTypes(u32);

bitflags! {
    impl ProjectionTypes: u32 {
        const MSA_STEREOGRAPHIC = 2;
        const MSA_MERCATOR = 4;
        const THERM_STEREOGRAPHIC = 8;
        const THERM_MERCATOR = 16;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThumbnailSource {
    #[serde(rename = "MSA")]
    Msa,
    #[serde(rename = "RAW")]
    Raw,
}

impl ThumbnailSource {
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Msa => "MSA",
            Self::Raw => "RAW",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SatellitePass {
    pub site: String,
    pub file_key: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub satellite_name: String,
    pub channel_a: String,
    pub channel_b: String,
    pub max_elevation: i32,
    pub gain: f64,
    pub enhancement_types: EnhancementTypes,
    pub projection_types: ProjectionTypes,
    pub thumbnail_uri: String,
    pub thumbnail_enhancement_type: ThumbnailSource,
    pub image_dir: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpcomingPass {
    pub site: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub satellite_name: String,
    pub max_elevation: i32,
}

const FILE_KEY_TIME_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Splits `<yyyyMMdd-HHmmss>-<satellite>` into its UTC start time and satellite name.
pub fn parse_file_key(file_key: &str) -> Result<(DateTime<Utc>, String), MetadataError> {
    let malformed = || MetadataError::Malformed {
        field: "FILE_KEY",
        value: file_key.to_string(),
    };

    let stamp = file_key.get(..15).ok_or_else(malformed)?;
    let start = NaiveDateTime::parse_from_str(stamp, FILE_KEY_TIME_FORMAT)
        .map_err(|_| malformed())?
        .and_utc();
    let name = file_key.get(16..).unwrap_or_default();
    if name.is_empty() {
        return Err(malformed());
    }
    Ok((start, name.to_string()))
}
