/// Pipeline stage definitions
///
/// The pipeline is a fixed, ordered sequence of stages. A record only becomes
/// eligible for a stage once it is `done` with the previous one.
use std::fmt;

/// One phase of the fixed pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// Find entities on the target site and create records for them
    Discovery,

    /// Fetch metadata for each discovered entity
    Enrichment,

    /// Download the binary assets listed during enrichment
    AssetFetch,
}

impl Stage {
    /// All stages in pipeline order
    pub const ALL: [Stage; 3] = [Stage::Discovery, Stage::Enrichment, Stage::AssetFetch];

    /// Returns the stage that must be `done` before this one, if any
    pub fn previous(&self) -> Option<Stage> {
        match self {
            Self::Discovery => None,
            Self::Enrichment => Some(Self::Discovery),
            Self::AssetFetch => Some(Self::Enrichment),
        }
    }

    /// Returns the stage that follows this one, if any
    pub fn next(&self) -> Option<Stage> {
        match self {
            Self::Discovery => Some(Self::Enrichment),
            Self::Enrichment => Some(Self::AssetFetch),
            Self::AssetFetch => None,
        }
    }

    /// Converts the stage to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Enrichment => "enrichment",
            Self::AssetFetch => "asset_fetch",
        }
    }

    /// Parses a stage from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "discovery" => Some(Self::Discovery),
            "enrichment" => Some(Self::Enrichment),
            "asset_fetch" => Some(Self::AssetFetch),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
