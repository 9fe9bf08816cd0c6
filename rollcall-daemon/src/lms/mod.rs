//! LMS (Canvas) client.
//!
//! [`LmsApi`] is what the services depend on; [`CanvasClient`] is the HTTP
//! implementation. Enrollment listings are lazy streams that follow the
//! `Link: <...>; rel="next"` header page by page.

mod client;
mod link;
mod types;

use std::pin::Pin;

use async_trait::async_trait;
use rollcall_core::{Credential, Enrollment, LmsCourseId};
use tokio_stream::Stream;
use url::Url;

pub use client::{CanvasClient, PAGE_SIZE};
pub use link::next_link;

/// A finite, single-pass sequence of enrollments.
///
/// The first error ends the sequence.
pub type EnrollmentStream<'a> =
    Pin<Box<dyn Stream<Item = Result<Enrollment, LmsError>> + Send + 'a>>;

/// Inputs for an OAuth authorization-code exchange.
#[derive(Debug, Clone)]
pub struct CodeExchange<'a> {
    pub code: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a Credential,
    /// Must equal the `redirect_uri` sent on the authorize request.
    pub redirect_uri: &'a str,
}

/// Errors talking to the LMS.
#[derive(Debug, thiserror::Error)]
pub enum LmsError {
    #[error("LMS request timed out")]
    Timeout,

    #[error("LMS request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("LMS returned status {status}")]
    Status { status: u16 },

    #[error("malformed LMS response: {0}")]
    Decode(String),

    #[error("LMS token response did not include an access token")]
    MissingAccessToken,

    #[error("LMS pagination exceeded {0} pages")]
    TooManyPages(usize),

    #[error("invalid LMS url: {0}")]
    InvalidUrl(String),
}

impl LmsError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

impl From<reqwest::Error> for LmsError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e)
        }
    }
}

/// Operations the services need from the LMS.
#[async_trait]
pub trait LmsApi: Send + Sync {
    /// Trade an authorization code for the member's access token.
    async fn exchange_code(&self, exchange: &CodeExchange<'_>) -> Result<Credential, LmsError>;

    /// Every enrollment in a course, using a course-level credential.
    fn fetch_enrollments<'a>(
        &'a self,
        credential: &'a Credential,
        course_id: &'a LmsCourseId,
    ) -> EnrollmentStream<'a>;

    /// The credential owner's own enrollments across courses.
    fn fetch_own_enrollments<'a>(&'a self, credential: &'a Credential) -> EnrollmentStream<'a>;

    /// Where to send a member to log in and approve access.
    fn authorize_url(&self, client_id: &str, redirect_uri: &str, state: &str)
        -> Result<Url, LmsError>;
}
