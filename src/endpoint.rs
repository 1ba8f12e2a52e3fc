//! Shared plumbing for the remote turn and persistence services

use reqwest::Response;
use url::Url;

use crate::{Error, Result};

/// Append path segments to a base URL
///
/// Unlike `Url::join`, this keeps the last segment of the base
/// (`/api` + `dialogue` is `/api/dialogue`, not `/dialogue`) and
/// percent-encodes each segment.
///
/// # Errors
///
/// Returns error if the base URL cannot carry a path (e.g. `mailto:`)
pub fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| Error::Config(format!("base URL cannot have a path: {base}")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Pass a successful response through, or describe the failure as `status: body`
pub(crate) async fn check_status(response: Response) -> std::result::Result<Response, String> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(format!("{status}: {body}"))
}
