use crate::error::RemoteError;
use crate::noaa::model::{EnhancementTypes, ProjectionTypes};

/// Answers whether a derived image for the pass currently exists on the remote store.
pub trait ImageOracle {
    fn exists(&self, file_name: &str) -> Result<bool, RemoteError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Inference {
    pub enhancements: EnhancementTypes,
    pub projections: ProjectionTypes,
    /// Derived images that exist but contradict the channel set.
    pub stale_files: Vec<String>,
}

const MSA_SUFFIXES: &[&str] = &["MSA", "MSA-merc", "MSA-stereo"];
const CHANNEL_4_SUFFIXES: &[&str] = &[
    "MCIR",
    "THERM",
    "ZA",
    "NO",
    "THERM-merc",
    "THERM-stereo",
];

const PROJECTIONS: &[(EnhancementTypes, &str, ProjectionTypes)] = &[
    (EnhancementTypes::MSA, "MSA-merc", ProjectionTypes::MSA_MERCATOR),
    (EnhancementTypes::MSA, "MSA-stereo", ProjectionTypes::MSA_STEREOGRAPHIC),
    (EnhancementTypes::THERM, "THERM-merc", ProjectionTypes::THERM_MERCATOR),
    (EnhancementTypes::THERM, "THERM-stereo", ProjectionTypes::THERM_STEREOGRAPHIC),
];

pub fn derived_file_name(file_key: &str, suffix: &str) -> String {
    format!("{file_key}-{suffix}.png")
}

pub fn enhancements_for_channels(channel_a: &str, channel_b: &str) -> EnhancementTypes {
    let channels = [channel_a, channel_b];
    let has = |id: &str| channels.contains(&id);

    let mut out = EnhancementTypes::empty();
    if has("4") && (has("1") || has("2")) {
        out |= EnhancementTypes::MSA;
    }
    if has("4") {
        out |= EnhancementTypes::MCIR
            | EnhancementTypes::THERM
            | EnhancementTypes::ZA
            | EnhancementTypes::NO;
    }
    out
}

pub fn infer(
    file_key: &str,
    channel_a: &str,
    channel_b: &str,
    oracle: &dyn ImageOracle,
) -> Result<Inference, RemoteError> {
    let enhancements = enhancements_for_channels(channel_a, channel_b);

    let mut stale_candidates = Vec::new();
    if !enhancements.contains(EnhancementTypes::MSA) {
        stale_candidates.extend_from_slice(MSA_SUFFIXES);
    }
    if !enhancements.contains(EnhancementTypes::THERM) {
        stale_candidates.extend_from_slice(CHANNEL_4_SUFFIXES);
    }

    let mut stale_files = Vec::new();
    for suffix in stale_candidates {
        let name = derived_file_name(file_key, suffix);
        if oracle.exists(&name)? {
            stale_files.push(name);
        }
    }

    let mut projections = ProjectionTypes::empty();
    for (needs, suffix, projection) in PROJECTIONS {
        if enhancements.contains(*needs) && oracle.exists(&derived_file_name(file_key, suffix))? {
            projections |= *projection;
        }
    }

    Ok(Inference {
        enhancements,
        projections,
        stale_files,
    })
}
