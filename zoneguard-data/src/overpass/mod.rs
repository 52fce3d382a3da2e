//! Overpass API transport: query text, response decoding and HTTP sources.

mod error;
mod query;
mod response;
mod source;

pub use error::{FailureClass, FetchError, SourceBuildError};
pub use query::{DEFAULT_SERVER_TIMEOUT_SECS, SELECTORS, build_query};
pub use response::{OverpassResponse, parse_response};
pub use source::{
    DEFAULT_ENDPOINTS, DEFAULT_USER_AGENT, FeatureSource, HttpFeatureSource,
    HttpFeatureSourceConfig, TileRequest,
};
