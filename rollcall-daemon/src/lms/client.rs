//! reqwest-backed Canvas client.

use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use reqwest::header::LINK;
use reqwest::Client;
use rollcall_core::{Credential, LmsCourseId};
use tracing::{debug, instrument, warn};
use url::Url;

use super::link::next_link;
use super::types::{EnrollmentRecord, TokenResponse};
use super::{CodeExchange, EnrollmentStream, LmsApi, LmsError};
use crate::config::DEFAULT_MAX_PAGES;

/// Records requested per page.
pub const PAGE_SIZE: u32 = 100;

/// One fetched page and where the next one lives.
struct Page {
    records: Vec<EnrollmentRecord>,
    next: Option<Url>,
}

/// HTTP client for a single Canvas installation.
#[derive(Clone)]
pub struct CanvasClient {
    client: Client,
    /// Installation root, always ending in `/`.
    base_url: Url,
    max_pages: usize,
}

impl CanvasClient {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, LmsError> {
        if base_url.cannot_be_a_base() {
            return Err(LmsError::InvalidUrl(base_url.to_string()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("rollcall/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(LmsError::Transport)?;

        Ok(Self {
            client,
            base_url,
            max_pages: DEFAULT_MAX_PAGES,
        })
    }

    /// Limit how many `next` links one listing may follow.
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, LmsError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| LmsError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn listing(&self, segments: &[&str]) -> Result<Url, LmsError> {
        let mut url = self.endpoint(segments)?;
        url.query_pairs_mut()
            .append_pair("per_page", &PAGE_SIZE.to_string());
        Ok(url)
    }

    async fn fetch_page(&self, credential: &Credential, url: Url) -> Result<Page, LmsError> {
        let response = self
            .client
            .get(url.clone())
            .bearer_auth(credential.expose())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LmsError::Status {
                status: status.as_u16(),
            });
        }

        let next = response
            .headers()
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| next_link(value, &url));

        // The bearer token must never be sent to another host.
        if let Some(next) = &next {
            if next.origin() != self.base_url.origin() {
                warn!(next = %next, "Refusing cross-origin pagination link");
                return Err(LmsError::Decode(
                    "pagination link points to a different origin".to_string(),
                ));
            }
        }

        let records: Vec<EnrollmentRecord> = response.json().await?;
        Ok(Page { records, next })
    }

    /// Lazily walk every page starting at `first`.
    ///
    /// Nothing is requested until the stream is polled, and polling stops
    /// when the consumer drops it.
    fn paginate<'a>(
        &'a self,
        credential: &'a Credential,
        first: Result<Url, LmsError>,
        scope: Option<&'a LmsCourseId>,
    ) -> EnrollmentStream<'a> {
        Box::pin(stream! {
            let mut next = match first {
                Ok(url) => Some(url),
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            let mut pages = 0usize;

            while let Some(url) = next.take() {
                if pages >= self.max_pages {
                    warn!(max_pages = self.max_pages, "Enrollment listing did not terminate");
                    yield Err(LmsError::TooManyPages(self.max_pages));
                    return;
                }
                pages += 1;

                let page = match self.fetch_page(credential, url).await {
                    Ok(page) => page,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                debug!(page = pages, records = page.records.len(), "Fetched enrollment page");
                next = page.next;

                for record in page.records {
                    match record.into_enrollment(scope) {
                        Some(enrollment) => yield Ok(enrollment),
                        None => debug!("Skipping enrollment without login or course id"),
                    }
                }
            }
        })
    }
}

#[async_trait]
impl LmsApi for CanvasClient {
    #[instrument(skip(self, exchange))]
    async fn exchange_code(&self, exchange: &CodeExchange<'_>) -> Result<Credential, LmsError> {
        let url = self.endpoint(&["login", "oauth2", "token"])?;
        let form = [
            ("grant_type", "authorization_code"),
            ("client_id", exchange.client_id),
            ("client_secret", exchange.client_secret.expose()),
            ("redirect_uri", exchange.redirect_uri),
            ("code", exchange.code),
        ];

        let response = self.client.post(url).form(&form).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "LMS rejected authorization code");
            return Err(LmsError::Status {
                status: status.as_u16(),
            });
        }

        let body: TokenResponse = response.json().await?;
        match body.access_token {
            Some(token) if !token.is_empty() => Ok(Credential::new(token)),
            _ => Err(LmsError::MissingAccessToken),
        }
    }

    fn fetch_enrollments<'a>(
        &'a self,
        credential: &'a Credential,
        course_id: &'a LmsCourseId,
    ) -> EnrollmentStream<'a> {
        let first = self.listing(&["api", "v1", "courses", course_id.as_str(), "enrollments"]);
        self.paginate(credential, first, Some(course_id))
    }

    fn fetch_own_enrollments<'a>(&'a self, credential: &'a Credential) -> EnrollmentStream<'a> {
        let first = self.listing(&["api", "v1", "users", "self", "enrollments"]);
        self.paginate(credential, first, None)
    }

    fn authorize_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
        state: &str,
    ) -> Result<Url, LmsError> {
        let mut url = self.endpoint(&["login", "oauth2", "auth"])?;
        url.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("state", state);
        Ok(url)
    }
}
