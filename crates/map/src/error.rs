//! Error types for the map subsystem.

/// Result type alias
pub type Result<T> = std::result::Result<T, MapError>;

#[derive(Debug, thiserror::Error)]
pub enum MapError {
    /// The collaborator has no metadata for the requested map.
    #[error("no map metadata for {0:?}")]
    NoMapMeta(String),

    /// An operation needs a selected map and none is active.
    #[error("no map selected")]
    NoMapSelected,

    #[error("select a start marker first")]
    NoStartSelected,

    #[error("too many undone markers ({count}); narrow the filter (max {max})")]
    TooManyCandidates { count: usize, max: usize },

    #[error("unknown marker: {0}")]
    UnknownMarker(String),

    #[error("marker {0} has no coordinates")]
    MissingCoordinates(String),

    #[error("unknown cluster: {0}")]
    UnknownCluster(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// Failure reported by the persistence collaborator.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl From<serde_yaml::Error> for MapError {
    fn from(e: serde_yaml::Error) -> Self {
        MapError::Config(e.to_string())
    }
}
