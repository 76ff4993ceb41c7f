use std::future::Future;

use itertools::Itertools;
use reqwest::Url;
use tracing::info;

use super::{CycleError, extract::Record, fetch::search_url, util::Client};

pub static NO_RECORDS: &str = "영화 정보를 찾을 수 없습니다.";

/// Outbound channel for formatted notifications.
pub trait Notify {
    fn send(&self, text: &str) -> impl Future<Output = Result<(), CycleError>> + Send;
}

/// Escapes text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn headline(keyword: &str) -> String {
    format!("🎬 <b>{} 영등위 심의 완료!</b>", escape_html(keyword))
}

/// One HTML message listing `new`, each linked to a search for its own title
/// on the board.
///
/// `extracted` is everything the page yielded and `new` the leading part of
/// it being announced. Only a page with no records at all reads as "nothing
/// found"; an empty window still gets the headline.
pub fn format_message(
    keyword: &str,
    search_base: &Url,
    extracted: &[Record],
    new: &[Record],
) -> String {
    if extracted.is_empty() {
        return NO_RECORDS.to_string();
    }

    let lines = new
        .iter()
        .map(|record| {
            format!(
                "<a href=\"{}\">{} ({})</a>",
                escape_html(search_url(search_base, &record.title).as_str()),
                escape_html(&record.title),
                escape_html(&record.rating_display),
            )
        })
        .join("\n");

    if lines.is_empty() {
        return format!("{}\n", headline(keyword));
    }
    format!("{}\n\n{lines}\n", headline(keyword))
}

/// Message for a count that went down. No records are listed.
pub fn format_decrease(keyword: &str, previous: u64, current: u64) -> String {
    format!(
        "🎬 <b>{} 심의 건수 감소</b>\n\n{previous} → {current}",
        escape_html(keyword)
    )
}

/// Telegram bot API `sendMessage`.
#[derive(Clone)]
pub struct Telegram {
    client: Client,
    api_url: String,
    token: String,
    chat_id: String,
}

impl Telegram {
    pub fn new(client: Client, api_url: &str, token: String, chat_id: String) -> Self {
        Telegram {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
            chat_id,
        }
    }
}

impl Notify for Telegram {
    async fn send(&self, text: &str) -> Result<(), CycleError> {
        let url = format!("{}/bot{}/sendMessage", self.api_url, self.token);
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        self.client.post(url, body).await.map_err(CycleError::Send)?;
        info!(chat_id = %self.chat_id, "telegram notification sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use axum::{
        Json, Router,
        extract::{Path, State},
        http::StatusCode,
        routing::post,
    };

    use super::*;
    use crate::job::testing::spawn_server;

    fn base() -> Url {
        Url::parse("https://www.kmrb.or.kr/kor/CMS/TotalSearch/search.do").unwrap()
    }

    fn record(title: &str, rating: &str) -> Record {
        Record {
            title: title.to_string(),
            rating_raw: rating.to_string(),
            rating_display: rating.to_string(),
            reference_id: "R-1".to_string(),
        }
    }

    #[test]
    fn message_has_headline_and_one_linked_line_per_record() {
        let records = [
            record("판타스틱 4: 새로운 출발", "12세 관람가"),
            record("판타스틱 4", "19세 관람가"),
        ];
        let message = format_message("판타스틱 4", &base(), &records, &records);
        let lines: Vec<_> = message.lines().collect();

        assert_eq!(lines[0], "🎬 <b>판타스틱 4 영등위 심의 완료!</b>");
        assert_eq!(lines[1], "");
        assert_eq!(lines.len(), 4);
        assert!(lines[2].starts_with(
            "<a href=\"https://www.kmrb.or.kr/kor/CMS/TotalSearch/search.do?mCode=MN132&amp;"
        ));
        assert!(lines[2].ends_with(">판타스틱 4: 새로운 출발 (12세 관람가)</a>"));
        assert!(lines[3].ends_with(">판타스틱 4 (19세 관람가)</a>"));
    }

    #[test]
    fn link_searches_for_the_record_title() {
        let records = [record("하얼빈", "15세 관람가")];
        let message = format_message("키워드", &base(), &records, &records);
        let href = message
            .split("href=\"")
            .nth(1)
            .and_then(|rest| rest.split('"').next())
            .unwrap()
            .replace("&amp;", "&");
        let url = Url::parse(&href).unwrap();
        let keyword = url
            .query_pairs()
            .find(|(k, _)| k == "searchKeyword")
            .map(|(_, v)| v.into_owned());
        assert_eq!(keyword.as_deref(), Some("하얼빈"));
    }

    #[test]
    fn empty_listing_says_nothing_was_found() {
        assert_eq!(format_message("판타스틱 4", &base(), &[], &[]), NO_RECORDS);
    }

    #[test]
    fn empty_window_over_found_records_keeps_the_headline() {
        let records = [record("판타스틱 4: 새로운 출발", "12세 관람가")];
        let message = format_message("판타스틱 4", &base(), &records, &records[..0]);
        assert_eq!(message, "🎬 <b>판타스틱 4 영등위 심의 완료!</b>\n");
    }

    #[test]
    fn only_the_window_is_listed() {
        let records = [record("새것", "12세 관람가"), record("옛것", "전체 관람가")];
        let message = format_message("키워드", &base(), &records, &records[..1]);
        assert!(message.contains(">새것 (12세 관람가)</a>"));
        assert!(!message.contains("옛것"));
    }

    #[test]
    fn titles_are_escaped() {
        let records = [record("Tom & Jerry <3>", "전체 관람가")];
        let message = format_message("a<b", &base(), &records, &records);
        assert!(message.contains("a&lt;b"));
        assert!(message.contains(">Tom &amp; Jerry &lt;3&gt; (전체 관람가)</a>"));
    }

    #[test]
    fn decrease_message_names_both_counts() {
        let message = format_decrease("판타스틱 4", 5, 2);
        assert!(message.contains("5 → 2"));
        assert!(!message.contains("<a "));
    }

    type Captured = Arc<Mutex<Vec<(String, serde_json::Value)>>>;

    async fn fake_bot_api(status: StatusCode) -> (String, Captured) {
        let captured: Captured = Arc::default();
        let router = Router::new()
            .route(
                "/:bot/sendMessage",
                post(
                    move |State(captured): State<Captured>,
                          Path(bot): Path<String>,
                          Json(body): Json<serde_json::Value>| async move {
                        captured.lock().unwrap().push((bot, body));
                        status
                    },
                ),
            )
            .with_state(captured.clone());
        let addr = spawn_server(router).await;
        (format!("http://{addr}/"), captured)
    }

    #[tokio::test]
    async fn send_posts_html_message_without_preview() {
        let (api_url, captured) = fake_bot_api(StatusCode::OK).await;
        let telegram = Telegram::new(
            Client::new(Duration::from_secs(5)).unwrap(),
            &api_url,
            "123:abc".to_string(),
            "1680".to_string(),
        );

        telegram.send("<b>hi</b>").await.unwrap();

        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        let (bot, body) = &captured[0];
        assert_eq!(bot, "bot123:abc");
        assert_eq!(body["chat_id"], "1680");
        assert_eq!(body["text"], "<b>hi</b>");
        assert_eq!(body["parse_mode"], "HTML");
        assert_eq!(body["disable_web_page_preview"], true);
    }

    #[tokio::test]
    async fn rejected_send_is_a_send_error() {
        let (api_url, _) = fake_bot_api(StatusCode::BAD_REQUEST).await;
        let telegram = Telegram::new(
            Client::new(Duration::from_secs(5)).unwrap(),
            &api_url,
            "t".to_string(),
            "c".to_string(),
        );

        assert!(matches!(telegram.send("x").await, Err(CycleError::Send(_))));
    }
}
