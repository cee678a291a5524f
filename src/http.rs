use std::fmt;
use std::io::Read;
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT_CHARSET, HeaderMap, HeaderValue, LOCATION, USER_AGENT};
use reqwest::redirect::Policy;

use crate::config::HttpSettings;
use crate::error::MirrorError;

pub struct HttpResponse {
    pub status: u16,
    pub location: Option<String>,
    pub body: Box<dyn Read + Send>,
}

impl HttpResponse {
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status) && self.status != 304
    }

    pub fn text(mut self) -> Result<String, MirrorError> {
        let mut text = String::new();
        self.body
            .read_to_string(&mut text)
            .map_err(|err| MirrorError::Http(err.to_string()))?;
        Ok(text)
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

/// Plain GET access to remote resources. Redirects are returned, not followed.
pub trait HttpSource: Send + Sync {
    fn get(&self, url: &str, query: &[(String, String)]) -> Result<HttpResponse, MirrorError>;
}

impl<T: HttpSource + ?Sized> HttpSource for &T {
    fn get(&self, url: &str, query: &[(String, String)]) -> Result<HttpResponse, MirrorError> {
        (**self).get(url, query)
    }
}

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    max_retries: usize,
    backoff: Duration,
}

impl HttpClient {
    pub fn new(settings: &HttpSettings) -> Result<Self, MirrorError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("catalog-mirror/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| MirrorError::Http(err.to_string()))?,
        );
        headers.insert(ACCEPT_CHARSET, HeaderValue::from_static("utf-8"));

        let client = Client::builder()
            .default_headers(headers)
            .redirect(Policy::none())
            .timeout(Duration::from_secs(settings.timeout_secs))
            .pool_max_idle_per_host(settings.pool_size)
            .build()
            .map_err(|err| MirrorError::Http(err.to_string()))?;

        Ok(Self {
            client,
            max_retries: settings.max_retries,
            backoff: Duration::from_millis(settings.backoff_ms),
        })
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<Response, MirrorError>
    where
        F: FnMut() -> RequestBuilder,
    {
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < self.max_retries && is_retryable_status(status) {
                        tracing::debug!(status, attempt, "retrying request");
                        thread::sleep(self.backoff * (attempt as u32 + 1));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < self.max_retries && is_retryable_error(&err) {
                        tracing::debug!(error = %err, attempt, "retrying request");
                        thread::sleep(self.backoff * (attempt as u32 + 1));
                        attempt += 1;
                        continue;
                    }
                    return Err(MirrorError::Http(err.to_string()));
                }
            }
        }
    }
}

impl HttpSource for HttpClient {
    fn get(&self, url: &str, query: &[(String, String)]) -> Result<HttpResponse, MirrorError> {
        let response = self.send_with_retries(|| {
            let request = self.client.get(url);
            if query.is_empty() {
                request
            } else {
                request.query(query)
            }
        })?;
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        Ok(HttpResponse {
            status: response.status().as_u16(),
            location,
            body: Box::new(response),
        })
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}
