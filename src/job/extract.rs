use std::sync::LazyLock;

use regex::Regex;

use super::CycleError;

static COUNT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<span[^>]*class="text"[^>]*>영화\((\d+)\)</span>"#)
        .expect("count pattern compiles")
});

// The handler arguments and the <em> title can be separated by arbitrary
// nested markup, hence dot-matches-newline and the lazy gap.
static RECORD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r##"(?s)<a[^>]*href="#tab"[^>]*onclick="gradeView\('ORS','MV',\s*'','([^']*)','([^']*)',\s*'','[^']*'\s*\);"[^>]*>.*?<em[^>]*>\s*([^<]+)\s*</em>"##,
    )
    .expect("record pattern compiles")
});

static RATINGS: [(&str, &str); 4] = [
    ("전체관람가", "전체 관람가"),
    ("12세이상관람가", "12세 관람가"),
    ("15세이상관람가", "15세 관람가"),
    ("청소년관람불가", "19세 관람가"),
];

/// One classification record from a search result page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub title: String,
    pub rating_raw: String,
    pub rating_display: String,
    pub reference_id: String,
}

/// Everything one fetch of the search page tells us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub total_count: u64,
    /// Newest first, as the board lists them. The length need not match
    /// `total_count`.
    pub records: Vec<Record>,
}

/// Maps a raw rating code to its display label. Unknown codes pass through.
pub fn rating_display(code: &str) -> &str {
    RATINGS
        .iter()
        .find(|(raw, _)| *raw == code)
        .map(|(_, display)| *display)
        .unwrap_or(code)
}

pub fn extract_count(markup: &str) -> Result<u64, CycleError> {
    let caps = COUNT_PATTERN
        .captures(markup)
        .ok_or_else(|| CycleError::Parse("movie count label not found".to_string()))?;
    caps[1]
        .parse()
        .map_err(|e| CycleError::Parse(format!("movie count {:?} is not a count: {e}", &caps[1])))
}

pub fn extract_records(markup: &str) -> Vec<Record> {
    RECORD_PATTERN
        .captures_iter(markup)
        .map(|caps| Record {
            title: caps[3].trim().to_string(),
            rating_display: rating_display(&caps[1]).to_string(),
            rating_raw: caps[1].to_string(),
            reference_id: caps[2].to_string(),
        })
        .collect()
}

/// Parses a search result page. A page without the count label is a
/// [`CycleError::Parse`]; a page with a count but no recognisable hits is not.
pub fn extract(markup: &str) -> Result<Snapshot, CycleError> {
    let total_count = extract_count(markup)?;
    Ok(Snapshot {
        total_count,
        records: extract_records(markup),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::testing::results_page;

    #[test]
    fn extracts_count_and_records_newest_first() {
        let page = results_page(
            3,
            &[
                ("12세이상관람가", "2025-MF01234", "판타스틱 4: 새로운 출발"),
                ("전체관람가", "2024-MF00777", "판타스틱 4 (더빙)"),
                ("청소년관람불가", "2015-MF00100", "판타스틱 4"),
            ],
        );

        let snapshot = extract(&page).unwrap();
        assert_eq!(snapshot.total_count, 3);
        assert_eq!(snapshot.records.len(), 3);

        let first = &snapshot.records[0];
        assert_eq!(first.title, "판타스틱 4: 새로운 출발");
        assert_eq!(first.rating_raw, "12세이상관람가");
        assert_eq!(first.rating_display, "12세 관람가");
        assert_eq!(first.reference_id, "2025-MF01234");

        assert_eq!(snapshot.records[1].rating_display, "전체 관람가");
        assert_eq!(snapshot.records[2].rating_display, "19세 관람가");
        assert_eq!(snapshot.records[2].title, "판타스틱 4");
    }

    #[test]
    fn extraction_is_stable_on_unchanged_markup() {
        let page = results_page(
            2,
            &[
                ("15세이상관람가", "A-2", "두 번째"),
                ("전체관람가", "A-1", "첫 번째"),
            ],
        );
        assert_eq!(extract(&page).unwrap(), extract(&page).unwrap());
    }

    #[test]
    fn rating_table_is_total() {
        assert_eq!(rating_display("전체관람가"), "전체 관람가");
        assert_eq!(rating_display("12세이상관람가"), "12세 관람가");
        assert_eq!(rating_display("15세이상관람가"), "15세 관람가");
        assert_eq!(rating_display("청소년관람불가"), "19세 관람가");
        assert_eq!(rating_display("제한상영가"), "제한상영가");
        assert_eq!(rating_display(""), "");
    }

    #[test]
    fn unknown_rating_codes_pass_through() {
        let page = results_page(1, &[("제한상영가", "X-9", "무언가")]);
        let snapshot = extract(&page).unwrap();
        assert_eq!(snapshot.records[0].rating_display, "제한상영가");
    }

    #[test]
    fn missing_count_label_is_a_parse_error() {
        let page = "<html><body><p>점검 중입니다</p></body></html>";
        assert!(matches!(extract(page), Err(CycleError::Parse(_))));
    }

    #[test]
    fn count_without_hits_is_not_an_error() {
        let page = results_page(5, &[]);
        let snapshot = extract(&page).unwrap();
        assert_eq!(snapshot.total_count, 5);
        assert!(snapshot.records.is_empty());
    }

    #[test]
    fn record_count_may_disagree_with_printed_count() {
        let page = results_page(7, &[("전체관람가", "B-1", "하나")]);
        let snapshot = extract(&page).unwrap();
        assert_eq!(snapshot.total_count, 7);
        assert_eq!(snapshot.records.len(), 1);
    }

    #[test]
    fn anchors_from_other_categories_are_ignored() {
        let page = format!(
            "{}{}",
            results_page(1, &[("전체관람가", "C-1", "영화")]),
            r##"<a href="#tab" onclick="gradeView('ORS','VD', '','전체관람가','V-1', '','N' );"><em>비디오</em></a>"##
        );
        let snapshot = extract(&page).unwrap();
        assert_eq!(snapshot.records.len(), 1);
        assert_eq!(snapshot.records[0].title, "영화");
    }
}
