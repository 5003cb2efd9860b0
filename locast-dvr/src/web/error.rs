//! Handler errors and their HTTP statuses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use locast_dvr_lineup::LineupError;
use log::{error, warn};
use thiserror::Error;

use crate::transcoder::LaunchError;
use crate::tuner::AdmissionError;
use crate::upstream::UpstreamError;

/// Errors returned by the HTTP handlers.
///
/// All of them are produced before any response headers are sent.
#[derive(Debug, Error)]
pub enum WebError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Busy(#[from] AdmissionError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error("Failed to render document: {0}")]
    Render(#[from] LineupError),

    #[error("{0} is not a valid scan command")]
    InvalidScanCommand(String),
}

impl WebError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebError::Upstream(UpstreamError::NotFound(_)) => StatusCode::NOT_FOUND,
            WebError::Upstream(UpstreamError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            WebError::Upstream(_) => StatusCode::BAD_GATEWAY,
            WebError::Busy(_) => StatusCode::SERVICE_UNAVAILABLE,
            WebError::Launch(_) | WebError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WebError::InvalidScanCommand(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{}", self);
        } else {
            warn!("{}", self);
        }
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (WebError::from(UpstreamError::NotFound("1".into())), 404),
            (WebError::from(UpstreamError::Timeout), 504),
            (WebError::from(UpstreamError::Unavailable("down".into())), 502),
            (WebError::from(AdmissionError::AllTunersBusy(3)), 503),
            (WebError::InvalidScanCommand("bogus".into()), 400),
        ];
        for (err, status) in cases {
            assert_eq!(err.status().as_u16(), status, "{err}");
        }
    }

    #[test]
    fn test_invalid_scan_message() {
        assert_eq!(
            WebError::InvalidScanCommand("bogus".into()).to_string(),
            "bogus is not a valid scan command"
        );
        assert_eq!(
            WebError::InvalidScanCommand(String::new()).to_string(),
            " is not a valid scan command"
        );
    }
}
