//! Endpoint validation and response classification on top of `crux_http`.
//!
//! The shell performs the exchange once; nothing here retries.

use crux_http::{Error as HttpError, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::{Host, Url};

pub const MAX_URL_LENGTH: usize = 2048;

/// What `Http::send` hands back for a byte-bodied request.
pub type HttpResult = crux_http::Result<Response<Vec<u8>>>;

// Ports of plaintext services a report endpoint has no business on.
const BLOCKED_PORTS: [u16; 5] = [22, 23, 25, 6379, 11211];

/// An absolute http(s) URL on a public host, without embedded credentials.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValidatedUrl(Url);

impl ValidatedUrl {
    pub fn new(raw: &str) -> Result<Self, UrlError> {
        let malformed = |reason: &str| UrlError::Malformed {
            url: shorten(raw),
            reason: reason.to_string(),
        };

        if raw.trim().is_empty() {
            return Err(malformed("empty"));
        }
        if raw.len() > MAX_URL_LENGTH {
            return Err(malformed("longer than 2048 bytes"));
        }
        let url = Url::parse(raw).map_err(|e| malformed(&e.to_string()))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(malformed("only http and https are allowed"));
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(malformed("credentials are not allowed"));
        }
        let host = url.host().ok_or_else(|| malformed("no host"))?;
        if is_internal(&host) || url.port().is_some_and(|p| BLOCKED_PORTS.contains(&p)) {
            return Err(UrlError::PrivateHost {
                host: host.to_string(),
            });
        }

        Ok(Self(url))
    }

    /// Appends slash-separated segments to the path, percent-encoding each.
    pub fn join_segments<'a>(
        &self,
        segments: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, UrlError> {
        let mut url = self.0.clone();
        url.path_segments_mut()
            .map_err(|()| UrlError::Malformed {
                url: shorten(self.as_str()),
                reason: "cannot take path segments".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(Self(url))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

fn is_internal(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(name) => {
            let name = name.to_ascii_lowercase();
            name == "localhost"
                || [".localhost", ".local", ".internal"]
                    .iter()
                    .any(|suffix| name.ends_with(suffix))
        }
        Host::Ipv4(ip) => {
            ip.is_private() || ip.is_loopback() || ip.is_link_local() || ip.is_unspecified()
        }
        Host::Ipv6(ip) => ip.is_loopback() || ip.is_unspecified(),
    }
}

fn shorten(url: &str) -> String {
    match url.char_indices().nth(100) {
        Some((cut, _)) => format!("{}...", &url[..cut]),
        None => url.to_string(),
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UrlError {
    #[error("endpoint '{url}' rejected: {reason}")]
    Malformed { url: String, reason: String },

    #[error("endpoint host {host} is not publicly routable")]
    PrivateHost { host: String },
}

/// How far a request got. Upload and submission read the same three cases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Delivery {
    /// The server answered 2xx.
    Accepted { status: u16 },
    /// The server answered, but not with 2xx.
    Rejected {
        status: u16,
        /// Best-effort server message for diagnostics, never shown to users.
        message: Option<String>,
    },
    /// No response was obtained.
    Unreachable { reason: String },
}

impl Delivery {
    #[must_use]
    pub fn from_result(result: HttpResult) -> Self {
        match result {
            Ok(response) => {
                let status = response.status();
                let code = status as u16;
                if status.is_success() {
                    Delivery::Accepted { status: code }
                } else {
                    Delivery::Rejected {
                        status: code,
                        message: response
                            .body()
                            .and_then(|body| server_message(body.as_slice())),
                    }
                }
            }
            Err(HttpError::Http(e)) => Delivery::Rejected {
                status: e.code as u16,
                message: Some(e.message),
            },
            Err(e) => Delivery::Unreachable {
                reason: e.to_string(),
            },
        }
    }

    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Delivery::Accepted { .. })
    }

    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Delivery::Accepted { status } | Delivery::Rejected { status, .. } => Some(*status),
            Delivery::Unreachable { .. } => None,
        }
    }
}

fn server_message(body: &[u8]) -> Option<String> {
    #[derive(Deserialize)]
    struct ApiError {
        #[serde(alias = "error", alias = "msg")]
        message: String,
    }

    serde_json::from_slice::<ApiError>(body)
        .ok()
        .map(|e| e.message)
}
