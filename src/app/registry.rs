use scraper::{Html, Selector};
use url::Url;

use super::error::FetchError;
use super::fetch::{PageFetcher, REGISTRY_TIMEOUT};
use super::types::{RegistrySource, RegistryStatus};

const NO_RESULTS_MARKER: &str = "Ничего не найдено";
const DETAIL_LINK_SELECTOR: &str = "a[href*=\"/record-sources/details/\"]";

/// ISSN reduced to digits and `X`, cut to one ISSN and hyphenated.
///
/// `"0000000X"` becomes `"0000-000X"`; two glued ISSNs keep the first.
pub fn normalize_issn(raw: &str) -> String {
    let mut cleaned = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || c.eq_ignore_ascii_case(&'x'))
        .map(|c| c.to_ascii_uppercase())
        .take(8)
        .collect::<String>();
    if cleaned.len() == 8 {
        cleaned.insert(4, '-');
    }
    cleaned
}

fn normalize_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parsed registry detail page with its lowercased visible text.
pub struct DetailPage {
    doc: Html,
    text: String,
}

impl DetailPage {
    pub fn parse(html: &str) -> Self {
        let doc = Html::parse_document(html);
        let text = normalize_text(&doc.root_element().text().collect::<Vec<_>>().join(" "))
            .to_lowercase();
        Self { doc, text }
    }

    fn first_text(&self, selector: &str) -> Option<String> {
        let selector = Selector::parse(selector).ok()?;
        self.doc
            .select(&selector)
            .map(|el| normalize_text(&el.text().collect::<Vec<_>>().join(" ")))
            .find(|text| !text.is_empty())
    }

    fn has(&self, selector: &str) -> bool {
        Selector::parse(selector)
            .map(|sel| self.doc.select(&sel).next().is_some())
            .unwrap_or(false)
    }

    fn mentions(&self, phrase: &str) -> bool {
        self.text.contains(phrase)
    }
}

/// One heuristic reading of a detail page. `None` means "no signal".
type LevelSignal = fn(&DetailPage) -> Option<String>;
type MembershipSignal = fn(&DetailPage) -> Option<bool>;

/// Tried in order; the first definite level wins.
const LEVEL_SIGNALS: &[LevelSignal] = &[level_indicator, vak_list_badge, vak_list_phrase];

const MEMBERSHIP_SIGNALS: &[MembershipSignal] = &[rsci_badge, rsci_phrase];

fn level_indicator(page: &DetailPage) -> Option<String> {
    let value = page
        .first_text(".level-circle-value")
        .or_else(|| page.first_text(".level-value"))?;
    let token = value.split_whitespace().next()?;
    if !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()) {
        Some(token.to_string())
    } else {
        None
    }
}

fn vak_list_badge(page: &DetailPage) -> Option<String> {
    page.has("span.badge[title*=\"Перечень ВАК\"]")
        .then(|| "0".to_string())
}

fn vak_list_phrase(page: &DetailPage) -> Option<String> {
    page.mentions("перечень вак").then(|| "0".to_string())
}

fn rsci_badge(page: &DetailPage) -> Option<bool> {
    page.has("span.badge[title*=\"RSCI\"]").then_some(true)
}

fn rsci_phrase(page: &DetailPage) -> Option<bool> {
    (page.mentions("rsci") || page.mentions("ядро рниш")).then_some(true)
}

pub fn classify_level(page: &DetailPage) -> Option<String> {
    LEVEL_SIGNALS.iter().find_map(|signal| signal(page))
}

pub fn classify_membership(page: &DetailPage) -> Option<bool> {
    MEMBERSHIP_SIGNALS.iter().find_map(|signal| signal(page))
}

/// What the detail page alone says about the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailVerdict {
    pub white_level: Option<String>,
    pub in_second_registry: Option<bool>,
}

/// Membership is only read once a level is established.
pub fn classify_detail(html: &str) -> DetailVerdict {
    let page = DetailPage::parse(html);
    let white_level = classify_level(&page);
    let in_second_registry = if white_level.is_some() {
        classify_membership(&page)
    } else {
        None
    };
    DetailVerdict {
        white_level,
        in_second_registry,
    }
}

fn first_detail_link(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let selector = Selector::parse(DETAIL_LINK_SELECTOR).ok()?;
    doc.select(&selector)
        .find_map(|el| el.value().attr("href"))
        .map(|href| href.trim().to_string())
        .filter(|href| !href.is_empty())
}

/// Detail link from an exact ISSN search, unless the registry reports nothing.
fn issn_search_hit(html: &str) -> Option<String> {
    if html.contains(NO_RESULTS_MARKER) {
        return None;
    }
    first_detail_link(html)
}

fn resolve_link(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    Url::parse(base)
        .ok()
        .and_then(|base| base.join(href).ok())
        .map(|url| url.to_string())
        .unwrap_or_else(|| format!("{base}{href}"))
}

/// Looks journals up in the white-list registry.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    fetcher: PageFetcher,
    source: RegistrySource,
}

impl RegistryClient {
    pub fn new(fetcher: PageFetcher, source: RegistrySource) -> Self {
        Self { fetcher, source }
    }

    /// Resolves white-list level and RSCI membership for one journal.
    ///
    /// Never fails: any error returns whatever was established before it.
    pub async fn check(&self, issn: &str, name: &str) -> RegistryStatus {
        let mut status = RegistryStatus::default();
        let cleaned = normalize_issn(issn);
        let name = name.trim();
        if cleaned.is_empty() && name.is_empty() {
            return status;
        }
        if !cleaned.is_empty() {
            status.second_registry_url = self.source.elibrary_search_url(&cleaned);
        }

        if let Err(err) = self.resolve(&cleaned, name, &mut status).await {
            tracing::debug!(issn = %cleaned, %name, error = %err, "registry lookup incomplete");
        }
        status
    }

    async fn get(&self, url: &str) -> Result<String, FetchError> {
        self.fetcher.fetch_text(url, REGISTRY_TIMEOUT).await
    }

    async fn find_detail_link(&self, issn: &str, name: &str) -> Result<Option<String>, FetchError> {
        if !issn.is_empty() {
            let html = self.get(&self.source.issn_search_url(issn)).await?;
            if let Some(link) = issn_search_hit(&html) {
                return Ok(Some(link));
            }
        }
        if !name.is_empty() {
            let html = self.get(&self.source.name_search_url(name)).await?;
            return Ok(first_detail_link(&html));
        }
        Ok(None)
    }

    async fn resolve(
        &self,
        issn: &str,
        name: &str,
        status: &mut RegistryStatus,
    ) -> Result<(), FetchError> {
        let Some(href) = self.find_detail_link(issn, name).await? else {
            return Ok(());
        };
        let detail_url = resolve_link(&self.source.base_url, &href);
        status.primary_registry_url = detail_url.clone();

        let verdict = classify_detail(&self.get(&detail_url).await?);
        let Some(level) = verdict.white_level else {
            return Ok(());
        };
        status.white_level = level;

        match verdict.in_second_registry {
            Some(member) => status.in_second_registry = member,
            None if !issn.is_empty() => {
                let html = self.get(&self.source.membership_search_url(issn)).await?;
                status.in_second_registry = !html.contains(NO_RESULTS_MARKER);
            }
            None => {}
        }
        Ok(())
    }
}

/// Runs one lookup on `client`, or on a private connection context that is
/// released when the lookup ends.
pub async fn check_registry_status(
    issn: &str,
    name: &str,
    source: &RegistrySource,
    client: Option<&RegistryClient>,
) -> RegistryStatus {
    if let Some(client) = client {
        return client.check(issn, name).await;
    }
    if normalize_issn(issn).is_empty() && name.trim().is_empty() {
        return RegistryStatus::default();
    }
    match PageFetcher::new() {
        Ok(fetcher) => RegistryClient::new(fetcher, source.clone()).check(issn, name).await,
        Err(err) => {
            tracing::warn!(error = %err, "registry client unavailable");
            RegistryStatus::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const EMPTY_RESULTS: &str = "<html><body><p>Ничего не найдено</p></body></html>";

    fn results_page(href: &str) -> String {
        format!("<html><body><a href=\"{href}\">Journal</a></body></html>")
    }

    fn client_for(server: &mockito::Server) -> RegistryClient {
        let source = RegistrySource::new(server.url(), "https://elibrary.example");
        RegistryClient::new(PageFetcher::new().unwrap(), source)
    }

    #[test]
    fn issn_normalization() {
        assert_eq!(normalize_issn("0000000X"), "0000-000X");
        assert_eq!(normalize_issn("0000-000x"), "0000-000X");
        assert_eq!(normalize_issn("12345678extra"), "1234-5678");
        assert_eq!(normalize_issn("1234-5678 8765-4321"), "1234-5678");
        assert_eq!(normalize_issn("123"), "123");
        assert_eq!(normalize_issn(""), "");
        assert_eq!(normalize_issn("n/a"), "");
    }

    #[test]
    fn level_indicator_wins_over_vak_badge() {
        let page = DetailPage::parse(
            r#"<div class="level-circle-value">2 уровень</div>
               <span class="badge" title="Перечень ВАК">ВАК</span>"#,
        );
        assert_eq!(classify_level(&page).as_deref(), Some("2"));
    }

    #[test]
    fn secondary_level_selector_is_used() {
        let page = DetailPage::parse(r#"<span class="level-value">3</span>"#);
        assert_eq!(classify_level(&page).as_deref(), Some("3"));
    }

    #[test]
    fn vak_badge_or_phrase_marks_generic_level() {
        let badge = DetailPage::parse(r#"<span class="badge" title="Перечень ВАК 2023">В</span>"#);
        assert_eq!(classify_level(&badge).as_deref(), Some("0"));
        let phrase = DetailPage::parse("<p>Журнал входит в Перечень ВАК</p>");
        assert_eq!(classify_level(&phrase).as_deref(), Some("0"));
        let nothing = DetailPage::parse(r#"<div class="level-value">n/a</div>"#);
        assert_eq!(classify_level(&nothing), None);
    }

    #[test]
    fn membership_is_not_read_without_a_level() {
        let verdict = classify_detail(r#"<span class="badge" title="RSCI">RSCI</span>"#);
        assert_eq!(verdict.white_level, None);
        assert_eq!(verdict.in_second_registry, None);

        let verdict = classify_detail(
            r#"<div class="level-value">1</div><p>Входит в ядро РНИШ</p>"#,
        );
        assert_eq!(verdict.white_level.as_deref(), Some("1"));
        assert_eq!(verdict.in_second_registry, Some(true));
    }

    #[test]
    fn relative_links_resolve_against_registry() {
        assert_eq!(
            resolve_link("https://journalrank.rcsi.science", "/ru/record-sources/details/9/"),
            "https://journalrank.rcsi.science/ru/record-sources/details/9/"
        );
        assert_eq!(
            resolve_link("https://journalrank.rcsi.science", "https://other.example/x"),
            "https://other.example/x"
        );
    }

    #[tokio::test]
    async fn issn_hit_with_level_and_no_membership() {
        let mut server = mockito::Server::new_async().await;
        let search = server
            .mock("GET", "/ru/record-sources/")
            .match_query(Matcher::Exact("s=1234-5678&adv=true".into()))
            .with_status(200)
            .with_body(results_page("/ru/record-sources/details/42/"))
            .expect(1)
            .create_async()
            .await;
        let detail = server
            .mock("GET", "/ru/record-sources/details/42/")
            .with_status(200)
            .with_body(r#"<div class="level-circle-value">2</div><p>Издание</p>"#)
            .expect(1)
            .create_async()
            .await;
        let membership = server
            .mock("GET", "/ru/record-sources/")
            .match_query(Matcher::Exact("s=1234-5678&adv=true&rs=true".into()))
            .with_status(200)
            .with_body(EMPTY_RESULTS)
            .expect(1)
            .create_async()
            .await;

        let status = client_for(&server).check("1234 5678", "").await;
        assert_eq!(status.white_level, "2");
        assert!(!status.in_second_registry);
        assert_eq!(
            status.primary_registry_url,
            format!("{}/ru/record-sources/details/42/", server.url())
        );
        assert_eq!(
            status.second_registry_url,
            "https://elibrary.example/titles.asp?rubriccode=&sortorder=4&titlename=1234-5678&order=1"
        );
        search.assert_async().await;
        detail.assert_async().await;
        membership.assert_async().await;
    }

    #[tokio::test]
    async fn confirmatory_search_sets_membership() {
        let mut server = mockito::Server::new_async().await;
        let _search = server
            .mock("GET", "/ru/record-sources/")
            .match_query(Matcher::Exact("s=1234-5678&adv=true".into()))
            .with_body(results_page("/ru/record-sources/details/42/"))
            .create_async()
            .await;
        let _detail = server
            .mock("GET", "/ru/record-sources/details/42/")
            .with_body(r#"<span class="badge" title="Перечень ВАК">ВАК</span>"#)
            .create_async()
            .await;
        let _membership = server
            .mock("GET", "/ru/record-sources/")
            .match_query(Matcher::Exact("s=1234-5678&adv=true&rs=true".into()))
            .with_body(results_page("/ru/record-sources/details/42/"))
            .create_async()
            .await;

        let status = client_for(&server).check("1234-5678", "Journal").await;
        assert_eq!(status.white_level, "0");
        assert!(status.in_second_registry);
    }

    #[tokio::test]
    async fn falls_back_to_name_search() {
        let mut server = mockito::Server::new_async().await;
        let _search = server
            .mock("GET", "/ru/record-sources/")
            .match_query(Matcher::Exact("s=1234-5678&adv=true".into()))
            .with_body(EMPTY_RESULTS)
            .create_async()
            .await;
        let by_name = server
            .mock("GET", "/ru/search/")
            .match_query(Matcher::Exact("s=Journal+of+Things&adv=false".into()))
            .with_body(results_page("/ru/record-sources/details/7/"))
            .expect(1)
            .create_async()
            .await;
        let _detail = server
            .mock("GET", "/ru/record-sources/details/7/")
            .with_body(r#"<div class="level-value">1</div><span class="badge" title="RSCI">R</span>"#)
            .create_async()
            .await;

        let status = client_for(&server).check("1234-5678", "Journal of Things").await;
        assert_eq!(status.white_level, "1");
        assert!(status.in_second_registry);
        by_name.assert_async().await;
    }

    #[tokio::test]
    async fn unknown_everywhere_keeps_default_level() {
        let mut server = mockito::Server::new_async().await;
        let _search = server
            .mock("GET", "/ru/search/")
            .match_query(Matcher::Any)
            .with_body("<html><body>пусто</body></html>")
            .create_async()
            .await;

        let status = client_for(&server).check("", "Unknown").await;
        assert_eq!(status, RegistryStatus::default());
    }

    #[tokio::test]
    async fn detail_without_level_keeps_url_only() {
        let mut server = mockito::Server::new_async().await;
        let _search = server
            .mock("GET", "/ru/search/")
            .match_query(Matcher::Any)
            .with_body(results_page("/ru/record-sources/details/3/"))
            .create_async()
            .await;
        let _detail = server
            .mock("GET", "/ru/record-sources/details/3/")
            .with_body("<p>RSCI mentioned but no level</p>")
            .create_async()
            .await;

        let status = client_for(&server).check("", "Journal").await;
        assert_eq!(status.white_level, "none");
        assert!(!status.in_second_registry);
        assert!(status.primary_registry_url.ends_with("/details/3/"));
    }

    #[tokio::test]
    async fn no_identifiers_issue_no_request() {
        let mut server = mockito::Server::new_async().await;
        let any = server
            .mock("GET", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let status = client_for(&server).check("", "  ").await;
        assert_eq!(status, RegistryStatus::default());
        any.assert_async().await;
    }

    #[tokio::test]
    async fn unreachable_registry_yields_default_status() {
        let source = RegistrySource::new("http://127.0.0.1:1", "http://127.0.0.1:1");
        let status = check_registry_status("", "Journal", &source, None).await;
        assert_eq!(status, RegistryStatus::default());
    }

    #[tokio::test]
    async fn failing_detail_page_keeps_partial_status() {
        let mut server = mockito::Server::new_async().await;
        let _search = server
            .mock("GET", "/ru/record-sources/")
            .match_query(Matcher::Any)
            .with_body(results_page("/ru/record-sources/details/5/"))
            .create_async()
            .await;
        let _detail = server
            .mock("GET", "/ru/record-sources/details/5/")
            .with_status(502)
            .create_async()
            .await;

        let client = client_for(&server);
        let source = RegistrySource::new(server.url(), "https://elibrary.example");
        let status = check_registry_status("12345678", "", &source, Some(&client)).await;
        assert_eq!(status.white_level, "none");
        assert!(status.primary_registry_url.ends_with("/details/5/"));
        assert!(status.second_registry_url.contains("1234-5678"));
    }
}
