use std::collections::HashSet;

use chrono::NaiveDate;
use tokio::task::JoinSet;

use super::fetch::{LISTING_TIMEOUT, PageFetcher};
use super::listing::{ListingPage, parse_listing_page, plan_page_count};
use super::types::{JournalRecord, ListingSource};

async fn fetch_and_parse_page(
    fetcher: PageFetcher,
    url: String,
    specialty: String,
    today: NaiveDate,
) -> ListingPage {
    match fetcher.fetch_text(&url, LISTING_TIMEOUT).await {
        Ok(html) => parse_listing_page(&html, &specialty, today),
        Err(err) => {
            tracing::warn!(%url, timeout = err.is_timeout(), error = %err, "listing page skipped");
            ListingPage::default()
        }
    }
}

/// Concatenates pages in page order, keeping the first journal per `(id, issn)`.
pub fn merge_pages(mut pages: Vec<(usize, ListingPage)>) -> Vec<JournalRecord> {
    pages.sort_by_key(|(page, _)| *page);

    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for (_, page) in pages {
        for record in page.records {
            if seen.insert(record.dedup_key()) {
                merged.push(record);
            }
        }
    }
    merged
}

/// Crawls every listing page the source reports and returns the merged journals.
///
/// An unreachable first page yields an empty list; single failed pages are
/// skipped.
pub async fn crawl_listing(
    fetcher: &PageFetcher,
    source: &ListingSource,
    today: NaiveDate,
) -> Vec<JournalRecord> {
    let first_url = source.first_page_url();
    let total_pages = match fetcher.fetch_text(&first_url, LISTING_TIMEOUT).await {
        Ok(html) => plan_page_count(&html),
        Err(err) => {
            tracing::error!(url = %first_url, error = %err, "listing source unreachable");
            return Vec::new();
        }
    };
    tracing::info!(total_pages, specialty = %source.specialty, "crawling listing");

    let mut set = JoinSet::new();
    for page in 1..=total_pages {
        let fetcher = fetcher.clone();
        let url = source.page_url(page);
        let specialty = source.specialty.clone();
        set.spawn(async move { (page, fetch_and_parse_page(fetcher, url, specialty, today).await) });
    }

    let mut pages = Vec::with_capacity(total_pages);
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(result) => pages.push(result),
            Err(err) => tracing::warn!(error = %err, "listing worker failed"),
        }
    }

    let merged = merge_pages(pages);
    tracing::info!(
        journals = merged.len(),
        specialty = %source.specialty,
        "listing crawl finished"
    );
    merged
}
