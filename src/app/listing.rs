use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::types::{JournalRecord, NONE, Specialty};

pub const RECORDS_PER_PAGE: usize = 50;
pub const DEFAULT_PAGE_COUNT: usize = 2;

const NUMBER_COL: usize = 0;
const NAME_COL: usize = 1;
const ISSN_COL: usize = 2;
const SPECIALTY_COL: usize = 3;
const DATE_COL: usize = 4;
const CATEGORY_COL: usize = 5;

static RECORD_COUNT_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"из\s+(\d+)\s+записей").ok());
static END_DATE_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"по\s+(\d{1,2})\.(\d{1,2})\.(\d{4})").ok());

fn normalize_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(el: &ElementRef<'_>) -> String {
    normalize_text(&el.text().collect::<Vec<_>>().join(" "))
}

/// Number of listing pages the source reports for this query.
///
/// Falls back to the highest pagination link, then to [`DEFAULT_PAGE_COUNT`].
pub fn plan_page_count(html: &str) -> usize {
    let doc = Html::parse_document(html);
    page_count_from_caption(&doc)
        .or_else(|| page_count_from_links(&doc))
        .unwrap_or(DEFAULT_PAGE_COUNT)
}

fn page_count_from_caption(doc: &Html) -> Option<usize> {
    let selector = Selector::parse("div.dataTables_info").ok()?;
    let caption = doc.select(&selector).next().map(|el| element_text(&el))?;
    let total = RECORD_COUNT_RE
        .as_ref()?
        .captures(&caption)?
        .get(1)?
        .as_str()
        .parse::<usize>()
        .ok()?;
    Some(total.div_ceil(RECORDS_PER_PAGE))
}

fn page_count_from_links(doc: &Html) -> Option<usize> {
    let selector = Selector::parse("div.dataTables_paginate a").ok()?;
    doc.select(&selector)
        .filter_map(|link| element_text(&link).parse::<usize>().ok())
        .max()
}

/// Journals kept from one listing page.
#[derive(Debug, Default)]
pub struct ListingPage {
    pub records: Vec<JournalRecord>,
    pub keys: HashSet<String>,
}

impl ListingPage {
    fn push(&mut self, record: JournalRecord) {
        if self.keys.insert(record.dedup_key()) {
            self.records.push(record);
        }
    }
}

struct PendingRecord {
    record: JournalRecord,
    matched: bool,
    expired_entries: usize,
    live_entries: usize,
}

impl PendingRecord {
    fn new(record: JournalRecord) -> Self {
        Self {
            record,
            matched: false,
            expired_entries: 0,
            live_entries: 0,
        }
    }

    /// The journal is outdated only once every matching entry has ended.
    fn finish(mut self) -> Option<JournalRecord> {
        if !self.matched {
            return None;
        }
        if self.expired_entries > 0 && self.live_entries == 0 {
            self.record.is_current = false;
        }
        Some(self.record)
    }
}

/// Normalized VAK category: blank becomes `none`, `К1` becomes `1`.
pub fn normalize_category(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return NONE.to_string();
    }
    let mut chars = raw.chars();
    if let Some(first) = chars.next() {
        let rest = chars.as_str();
        if first.is_alphabetic() && !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) {
            return rest.to_string();
        }
    }
    raw.to_string()
}

/// End date from a "с 01.02.2022 по 31.12.2025" range, if present and valid.
pub fn parse_end_date(range: &str) -> Option<NaiveDate> {
    let caps = END_DATE_RE.as_ref()?.captures(range)?;
    let day = caps.get(1)?.as_str().parse::<u32>().ok()?;
    let month = caps.get(2)?.as_str().parse::<u32>().ok()?;
    let year = caps.get(3)?.as_str().parse::<i32>().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Extracts the journals listing `specialty` from one page of the table.
///
/// A journal spans one or more rows; a row with a new value in the number
/// column opens the next journal, rows with a blank number column add
/// specialties to the open one.
pub fn parse_listing_page(html: &str, specialty: &str, today: NaiveDate) -> ListingPage {
    let doc = Html::parse_document(html);
    let mut page = ListingPage::default();

    let (Ok(table_sel), Ok(row_sel), Ok(cell_sel)) = (
        Selector::parse("table"),
        Selector::parse("tr"),
        Selector::parse("td"),
    ) else {
        return page;
    };
    let Some(table) = doc.select(&table_sel).next() else {
        tracing::debug!("listing page has no table");
        return page;
    };

    let mut current: Option<PendingRecord> = None;
    let mut prev_number: Option<String> = None;

    for row in table.select(&row_sel).skip(1) {
        let cells = row
            .select(&cell_sel)
            .map(|cell| element_text(&cell))
            .collect::<Vec<_>>();
        if cells.is_empty() {
            continue;
        }

        let number = &cells[NUMBER_COL];
        if !number.is_empty() && prev_number.as_deref() != Some(number.as_str()) {
            if let Some(record) = current.take().and_then(PendingRecord::finish) {
                page.push(record);
            }

            let cell = |idx: usize| cells.get(idx).cloned().unwrap_or_default();
            let mut record = JournalRecord::new(number.clone(), cell(NAME_COL), cell(ISSN_COL));
            record.vak_category = normalize_category(&cell(CATEGORY_COL));
            current = Some(PendingRecord::new(record));
            prev_number = Some(number.clone());
        }

        let Some(pending) = current.as_mut() else {
            continue;
        };
        let Some(code) = cells.get(SPECIALTY_COL) else {
            continue;
        };
        if code.is_empty() || !code.contains(specialty) {
            continue;
        }
        pending.matched = true;

        let range = cells.get(DATE_COL).cloned().unwrap_or_default();
        match parse_end_date(&range) {
            Some(end) if end < today => pending.expired_entries += 1,
            _ => pending.live_entries += 1,
        }
        if !pending.record.has_specialty(code) {
            pending.record.specialties.push(Specialty {
                code: code.clone(),
                date_range_text: range,
            });
        }
    }

    if let Some(record) = current.and_then(PendingRecord::finish) {
        page.push(record);
    }

    page
}
