//! Test support: a throwaway HTTP server and ratings-board page builders.

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;

/// Serves `router` on an ephemeral localhost port for the rest of the test.
pub async fn spawn_server(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// One search hit as the ratings board renders it. Handler arguments and the
/// title element are split across lines the way the live markup is.
pub fn result_anchor(rating: &str, reference_id: &str, title: &str) -> String {
    format!(
        r##"<li>
  <a href="#tab" class="link" onclick="gradeView('ORS','MV', '','{rating}','{reference_id}', '','N' );">
    <span class="grade">{rating}</span>
    <div class="info">
      <em class="tit">
        {title}
      </em>
    </div>
  </a>
</li>"##
    )
}

/// A full search result page with the printed count and the given hits,
/// newest first.
pub fn results_page(count: u64, hits: &[(&str, &str, &str)]) -> String {
    let anchors: String = hits
        .iter()
        .map(|(rating, reference_id, title)| result_anchor(rating, reference_id, title))
        .collect();
    format!(
        r#"<html><body>
<div class="tab_menu"><a href="?"><span class="text">영화({count})</span></a></div>
<ul class="result_list">
{anchors}
</ul>
</body></html>"#
    )
}
