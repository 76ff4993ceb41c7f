use std::{num::NonZeroU32, sync::Arc, time::Duration};

use bytes::Bytes;
use governor::{
    Quota, RateLimiter, clock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
};
use reqwest::{
    IntoUrl,
    header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT},
};
use thiserror::Error;

static BROWSER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36";

#[derive(Clone)]
pub struct Client {
    client: reqwest::Client,
    limiter: Option<Arc<RateLimiter<NotKeyed, InMemoryState, clock::DefaultClock, NoOpMiddleware>>>,
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request timed out: {0}")]
    Timeout(reqwest::Error),
    #[error("request failed: {0}")]
    Request(reqwest::Error),
    #[error("server returned HTTP {status}")]
    Status { status: u16 },
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(err)
        } else {
            FetchError::Request(err)
        }
    }
}

pub enum RequestType {
    Get,
    Post(serde_json::Value),
}

impl Client {
    /// Builds a client whose requests all give up after `timeout`.
    ///
    /// Requests carry browser-like headers; the ratings board serves a
    /// stripped page to unknown agents.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_AGENT));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("ko-KR,ko;q=0.9,en;q=0.8"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Client {
            client,
            limiter: None,
        })
    }

    pub fn with_limit(mut self, requests_per_second: NonZeroU32) -> Self {
        self.limiter = Some(Arc::new(RateLimiter::direct(Quota::per_second(
            requests_per_second,
        ))));
        self
    }

    pub async fn get<U: IntoUrl>(&self, url: U) -> Result<Bytes, FetchError> {
        self.get_or_post(url, RequestType::Get).await
    }

    pub async fn post<U: IntoUrl>(
        &self,
        url: U,
        body: serde_json::Value,
    ) -> Result<Bytes, FetchError> {
        self.get_or_post(url, RequestType::Post(body)).await
    }

    /// Fetches `url` and decodes the body as UTF-8, replacing invalid sequences.
    pub async fn get_text<U: IntoUrl>(&self, url: U) -> Result<String, FetchError> {
        let body = self.get(url).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    async fn get_or_post<U: IntoUrl>(
        &self,
        url: U,
        req_type: RequestType,
    ) -> Result<Bytes, FetchError> {
        let url = url.into_url()?;

        let request = match req_type {
            RequestType::Get => self.client.get(url),
            RequestType::Post(ref body) => self.client.post(url).json(body),
        };

        match &self.limiter {
            None => (),
            Some(limiter) => limiter.until_ready().await,
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        Ok(response.bytes().await?)
    }
}
