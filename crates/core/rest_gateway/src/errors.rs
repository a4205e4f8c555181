use reqwest::StatusCode;
use std::error::Error;

#[derive(thiserror::Error, Debug)]
pub enum RestGatewayError {
    #[error("Part of the measures have been rejected by the gateway ({status}): {}", .reasons.join("; "))]
    GatewayBatchError {
        status: StatusCode,
        reasons: Vec<String>,
    },

    #[error("Request to the gateway failed: {reason}")]
    GatewayRequestError {
        /// None when no response has been received, e.g. on timeout
        status: Option<StatusCode>,
        reason: String,
    },

    #[error("The device alternate id must not be empty")]
    MissingDeviceId,

    #[error(transparent)]
    Identity(#[from] certificate::IdentityError),

    #[error("Fail to build the HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

impl RestGatewayError {
    /// The HTTP status returned by the gateway, if any
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RestGatewayError::GatewayBatchError { status, .. } => Some(*status),
            RestGatewayError::GatewayRequestError { status, .. } => *status,
            _ => None,
        }
    }

    /// A request that didn't get a response in time or failed at the transport level
    pub(crate) fn from_transport_error(err: reqwest::Error) -> Self {
        let reason = if err.is_timeout() {
            format!("no response within the timeout: {}", describe(&err))
        } else {
            describe(&err)
        };
        RestGatewayError::GatewayRequestError {
            status: err.status(),
            reason,
        }
    }
}

// reqwest errors only display the outermost context
fn describe(err: &reqwest::Error) -> String {
    let mut reason = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        reason.push_str(": ");
        reason.push_str(&cause.to_string());
        source = cause.source();
    }
    reason
}
