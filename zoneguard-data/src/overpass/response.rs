//! Overpass JSON response decoding.

use serde::Deserialize;

use super::FetchError;
use crate::element::RawElement;

/// Top-level Overpass JSON body.
#[derive(Debug, Deserialize)]
pub struct OverpassResponse {
    /// Returned elements; a body without this array is malformed.
    pub elements: Vec<RawElement>,
}

/// Decode an Overpass JSON body received from `url`.
pub fn parse_response(url: &str, body: &str) -> Result<Vec<RawElement>, FetchError> {
    serde_json::from_str::<OverpassResponse>(body)
        .map(|response| response.elements)
        .map_err(|err| FetchError::MalformedResponse {
            url: url.to_owned(),
            message: err.to_string(),
        })
}
