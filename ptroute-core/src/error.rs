use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("No nearby points found for snapping")]
    NoPointsFound,
    #[error("Station not found: {0}")]
    StationNotFound(String),
    #[error("No route found")]
    NoRouteFound,
    #[error("Search budget exceeded after visiting {visited_nodes} nodes")]
    BudgetExceeded { visited_nodes: usize },
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    #[error("Transit graph store corrupted: {0}")]
    StoreCorrupted(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Not-found conditions a caller may answer with "no route"
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NoPointsFound | Error::StationNotFound(_) | Error::NoRouteFound
        )
    }
}
