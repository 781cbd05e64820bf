//! Auth Failure Matching
//!
//! Decides whether a rejected response means "the token was bad" and is worth
//! one retry with a fresh token.

use crate::core::HttpResponse;

/// Marker substrings providers put in 400 bodies for dead tokens.
pub const DEFAULT_INVALID_TOKEN_MARKERS: &[&str] = &["invalid_grant", "Access Token not valid"];

/// Strategy for recognizing token rejections.
pub trait AuthFailureMatcher: Send + Sync {
    fn is_auth_failure(&self, response: &HttpResponse) -> bool;
}

impl<F> AuthFailureMatcher for F
where
    F: Fn(&HttpResponse) -> bool + Send + Sync,
{
    fn is_auth_failure(&self, response: &HttpResponse) -> bool {
        self(response)
    }
}

/// How a 400 response is treated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BadRequestPolicy {
    /// 400 is never a token rejection.
    Never,
    /// 400 is a token rejection when the body contains one of the markers.
    Markers(Vec<String>),
    /// Every 400 is a token rejection.
    Always,
}

impl Default for BadRequestPolicy {
    fn default() -> Self {
        Self::Markers(
            DEFAULT_INVALID_TOKEN_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
        )
    }
}

/// Status-based matcher: 401 and 403 always match, 400 per policy.
#[derive(Clone, Debug, Default)]
pub struct StatusMatcher {
    bad_request: BadRequestPolicy,
}

impl StatusMatcher {
    pub fn new(bad_request: BadRequestPolicy) -> Self {
        Self { bad_request }
    }

    pub fn never() -> Self {
        Self::new(BadRequestPolicy::Never)
    }

    pub fn always() -> Self {
        Self::new(BadRequestPolicy::Always)
    }

    pub fn markers<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(BadRequestPolicy::Markers(
            markers.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn policy(&self) -> &BadRequestPolicy {
        &self.bad_request
    }
}

impl AuthFailureMatcher for StatusMatcher {
    fn is_auth_failure(&self, response: &HttpResponse) -> bool {
        match response.status {
            401 | 403 => true,
            400 => match &self.bad_request {
                BadRequestPolicy::Never => false,
                BadRequestPolicy::Always => true,
                BadRequestPolicy::Markers(markers) => {
                    markers.iter().any(|m| response.body.contains(m.as_str()))
                }
            },
            _ => false,
        }
    }
}
