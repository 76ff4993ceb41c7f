use std::future::Future;

use reqwest::Url;
use tracing::debug;

use super::{CycleError, util::Client};

/// Source of raw search result markup.
pub trait Fetch {
    fn fetch(&self) -> impl Future<Output = Result<String, CycleError>> + Send;
}

/// The query the board's own search form submits. Only the keyword varies.
pub fn search_params(keyword: &str) -> [(&'static str, &str); 9] {
    [
        ("mCode", "MN132"),
        ("site_code", ""),
        ("category_code", "ORS"),
        ("category_code2", "MV"),
        ("category_code3", ""),
        ("grade_name", ""),
        ("rcv_no", ""),
        ("return_url", ""),
        ("searchKeyword", keyword),
    ]
}

/// Search URL for `keyword`, built on `base` with any existing query replaced.
pub fn search_url(base: &Url, keyword: &str) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(search_params(keyword));
    url
}

/// The search result page for one keyword.
#[derive(Clone)]
pub struct SearchPage {
    client: Client,
    url: Url,
}

impl SearchPage {
    pub fn new(client: Client, base: &Url, keyword: &str) -> Self {
        SearchPage {
            client,
            url: search_url(base, keyword),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Fetch for SearchPage {
    async fn fetch(&self) -> Result<String, CycleError> {
        debug!(url = %self.url, "fetching search page");
        Ok(self.client.get_text(self.url.clone()).await?)
    }
}
