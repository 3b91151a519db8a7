use clap::{ArgAction, Args, FromArgMatches, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

/// Sentinel for every "not resolved yet" string field.
pub const NONE: &str = "none";

pub const DEFAULT_SPECIALTY: &str = "2.3.4";
pub const DEFAULT_LISTING_URL: &str = "https://vak.academy/";
pub const DEFAULT_REGISTRY_URL: &str = "https://journalrank.rcsi.science";
pub const DEFAULT_ELIBRARY_URL: &str = "https://elibrary.ru";
pub const DEFAULT_LOOKUP_CONCURRENCY: usize = 5;
pub const MAX_LOOKUP_CONCURRENCY: usize = 32;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "vakharvest",
    version,
    about = "Harvest VAK journals for a specialty and check white-list level and RSCI membership"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "FILE",
        env = "VAKHARVEST_STORE",
        default_value = "vak_journals_2.3.4.json"
    )]
    pub store: String,

    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Crawl the listing (on first run) and enrich unresolved journals.
    Harvest(HarvestArgs),
    /// Print totals, categories and levels of the stored journals.
    Stats,
    /// Filter the stored journals and write them to a CSV sheet.
    Export(ExportArgs),
    /// Run a single registry lookup and print the status.
    Lookup(LookupArgs),
}

#[derive(Debug, Args, Clone)]
pub struct HarvestArgs {
    #[arg(long, value_name = "CODE", env = "VAKHARVEST_SPECIALTY", default_value = DEFAULT_SPECIALTY)]
    pub specialty: String,

    #[arg(long, value_name = "URL", env = "VAKHARVEST_LISTING_URL", default_value = DEFAULT_LISTING_URL)]
    pub listing_url: String,

    #[command(flatten)]
    pub registry: RegistryArgs,

    #[arg(long, value_name = "N", default_value_t = DEFAULT_LOOKUP_CONCURRENCY)]
    pub lookup_concurrency: usize,

    #[arg(long, default_value_t = false)]
    pub recrawl: bool,
}

impl Default for HarvestArgs {
    fn default() -> Self {
        Self {
            specialty: DEFAULT_SPECIALTY.to_string(),
            listing_url: DEFAULT_LISTING_URL.to_string(),
            registry: RegistryArgs::default(),
            lookup_concurrency: DEFAULT_LOOKUP_CONCURRENCY,
            recrawl: false,
        }
    }
}

impl HarvestArgs {
    /// Options of a bare invocation, resolved through the same env and
    /// default chain as `vakharvest harvest`.
    pub fn from_env() -> Result<Self, clap::Error> {
        let matches = Self::augment_args(clap::Command::new("harvest"))
            .try_get_matches_from(["harvest"])?;
        Self::from_arg_matches(&matches)
    }
}

#[derive(Debug, Args, Clone)]
pub struct RegistryArgs {
    #[arg(long, value_name = "URL", env = "VAKHARVEST_REGISTRY_URL", default_value = DEFAULT_REGISTRY_URL)]
    pub registry_url: String,

    #[arg(long, value_name = "URL", env = "VAKHARVEST_ELIBRARY_URL", default_value = DEFAULT_ELIBRARY_URL)]
    pub elibrary_url: String,
}

impl Default for RegistryArgs {
    fn default() -> Self {
        Self {
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            elibrary_url: DEFAULT_ELIBRARY_URL.to_string(),
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct ExportArgs {
    #[arg(long = "category", value_name = "CATEGORY")]
    pub categories: Vec<String>,

    #[arg(long = "level", value_name = "LEVEL")]
    pub levels: Vec<String>,

    #[arg(long, value_enum, default_value_t = RsciArg::Any)]
    pub rsci: RsciArg,

    #[arg(short, long, value_name = "FILE", default_value = "vak_journals_filtered.csv")]
    pub output: String,
}

#[derive(Debug, Args, Clone)]
pub struct LookupArgs {
    #[arg(long, value_name = "ISSN", default_value = "")]
    pub issn: String,

    #[arg(long, value_name = "NAME", default_value = "")]
    pub name: String,

    #[command(flatten)]
    pub registry: RegistryArgs,
}

#[derive(Debug, Copy, Clone, ValueEnum, PartialEq, Eq)]
pub enum RsciArg {
    Yes,
    No,
    Any,
}

impl From<RsciArg> for Option<bool> {
    fn from(value: RsciArg) -> Self {
        match value {
            RsciArg::Yes => Some(true),
            RsciArg::No => Some(false),
            RsciArg::Any => None,
        }
    }
}

/// Where the paginated journal listing lives and which specialty to keep.
#[derive(Debug, Clone)]
pub struct ListingSource {
    pub base_url: String,
    pub specialty: String,
}

impl ListingSource {
    pub fn new(base_url: impl Into<String>, specialty: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            specialty: specialty.into(),
        }
    }

    fn base_without_query(&self) -> &str {
        self.base_url
            .split('?')
            .next()
            .unwrap_or(self.base_url.as_str())
    }

    /// Unpaged entry URL, used to read the record count.
    pub fn first_page_url(&self) -> String {
        format!(
            "{}?q=&issn=&scientific_specialties={}&category=&records_per_page={}",
            self.base_without_query(),
            self.specialty,
            crate::app::listing::RECORDS_PER_PAGE
        )
    }

    pub fn page_url(&self, page: usize) -> String {
        format!(
            "{}?page={page}&records_per_page={}&q=&issn=&scientific_specialties={}&category=",
            self.base_without_query(),
            crate::app::listing::RECORDS_PER_PAGE,
            self.specialty
        )
    }
}

/// Endpoints of the white-list registry and the secondary title search.
#[derive(Debug, Clone)]
pub struct RegistrySource {
    pub base_url: String,
    pub elibrary_url: String,
}

impl RegistrySource {
    pub fn new(base_url: impl Into<String>, elibrary_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            elibrary_url: elibrary_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn issn_search_url(&self, issn: &str) -> String {
        format!("{}/ru/record-sources/?s={issn}&adv=true", self.base_url)
    }

    pub fn name_search_url(&self, name: &str) -> String {
        format!(
            "{}/ru/search/?s={}&adv=false",
            self.base_url,
            form_urlencoded::byte_serialize(name.trim().as_bytes()).collect::<String>()
        )
    }

    pub fn membership_search_url(&self, issn: &str) -> String {
        format!("{}/ru/record-sources/?s={issn}&adv=true&rs=true", self.base_url)
    }

    pub fn elibrary_search_url(&self, issn: &str) -> String {
        format!(
            "{}/titles.asp?rubriccode=&sortorder=4&titlename={issn}&order=1",
            self.elibrary_url
        )
    }
}

impl From<&RegistryArgs> for RegistrySource {
    fn from(args: &RegistryArgs) -> Self {
        RegistrySource::new(&args.registry_url, &args.elibrary_url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Specialty {
    #[serde(alias = "scientific_specialty")]
    pub code: String,
    #[serde(alias = "date", default)]
    pub date_range_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalRecord {
    pub id: String,
    #[serde(alias = "name_of_publication", default)]
    pub name: String,
    #[serde(default)]
    pub issn: String,
    #[serde(default)]
    pub specialties: Vec<Specialty>,
    #[serde(alias = "vak_category", default = "none_string")]
    pub vak_category: String,
    #[serde(alias = "white_level", default = "none_string")]
    pub white_level: String,
    #[serde(alias = "RSCI", default)]
    pub in_second_registry: bool,
    #[serde(alias = "elibrary_url", default = "none_string")]
    pub second_registry_url: String,
    #[serde(alias = "rcsi_url", default = "none_string")]
    pub primary_registry_url: String,
    #[serde(alias = "relevance", default = "default_true")]
    pub is_current: bool,
}

fn none_string() -> String {
    NONE.to_string()
}

fn default_true() -> bool {
    true
}

impl JournalRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, issn: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            issn: issn.into(),
            specialties: Vec::new(),
            vak_category: none_string(),
            white_level: none_string(),
            in_second_registry: false,
            second_registry_url: none_string(),
            primary_registry_url: none_string(),
            is_current: true,
        }
    }

    /// Cross-page deduplication key.
    pub fn dedup_key(&self) -> String {
        format!("{}_{}", self.id, self.issn)
    }

    pub fn is_white_listed(&self) -> bool {
        self.white_level != NONE && !self.white_level.is_empty()
    }

    pub fn has_specialty(&self, code: &str) -> bool {
        self.specialties.iter().any(|s| s.code == code)
    }

    pub fn apply_status(&mut self, status: RegistryStatus) {
        self.white_level = status.white_level;
        self.in_second_registry = status.in_second_registry;
        self.primary_registry_url = status.primary_registry_url;
        self.second_registry_url = status.second_registry_url;
    }
}

/// Outcome of one registry lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStatus {
    pub white_level: String,
    pub in_second_registry: bool,
    pub primary_registry_url: String,
    pub second_registry_url: String,
}

impl Default for RegistryStatus {
    fn default() -> Self {
        Self {
            white_level: none_string(),
            in_second_registry: false,
            primary_registry_url: none_string(),
            second_registry_url: none_string(),
        }
    }
}

impl RegistryStatus {
    pub fn is_resolved(&self) -> bool {
        self.white_level != NONE
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub total: usize,
    pub updated: usize,
    pub white_listed: usize,
    pub in_second_registry: usize,
}

impl RunStats {
    pub fn tally(records: &[JournalRecord], updated: usize) -> Self {
        Self {
            total: records.len(),
            updated,
            white_listed: records.iter().filter(|r| r.is_white_listed()).count(),
            in_second_registry: records.iter().filter(|r| r.in_second_registry).count(),
        }
    }
}

/// What the front end shows after a harvest cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestSummary {
    pub processed: usize,
    pub white_listed: usize,
    pub in_second_registry: usize,
    pub error: Option<String>,
}

impl HarvestSummary {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

impl From<RunStats> for HarvestSummary {
    fn from(stats: RunStats) -> Self {
        Self {
            processed: stats.total,
            white_listed: stats.white_listed,
            in_second_registry: stats.in_second_registry,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct JournalFilter {
    pub vak_categories: Vec<String>,
    pub white_levels: Vec<String>,
    pub in_second_registry: Option<bool>,
}

impl JournalFilter {
    pub fn matches(&self, record: &JournalRecord) -> bool {
        if !record.is_current {
            return false;
        }
        if !self.vak_categories.is_empty() && !self.vak_categories.contains(&record.vak_category)
        {
            return false;
        }
        if !self.white_levels.is_empty() && !self.white_levels.contains(&record.white_level) {
            return false;
        }
        match self.in_second_registry {
            Some(expected) => record.in_second_registry == expected,
            None => true,
        }
    }
}

impl From<&ExportArgs> for JournalFilter {
    fn from(args: &ExportArgs) -> Self {
        Self {
            vak_categories: args.categories.clone(),
            white_levels: args.levels.clone(),
            in_second_registry: args.rsci.into(),
        }
    }
}
