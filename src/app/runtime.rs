use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{Local, NaiveDate};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use super::crawl::crawl_listing;
use super::data_io::{JournalStore, export_csv};
use super::enrich::enrich_records;
use super::error::HarvestError;
use super::fetch::PageFetcher;
use super::registry::{RegistryClient, check_registry_status};
use super::types::{
    ExportArgs, HarvestArgs, HarvestSummary, JournalFilter, ListingSource, LookupArgs,
    RegistrySource,
};

pub fn init_logging(verbose: u8) {
    let default_filter = match verbose {
        0 => "vakharvest=warn",
        1 => "vakharvest=info",
        _ => "vakharvest=debug",
    };
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

struct RunningGuard(Arc<AtomicBool>);

impl RunningGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag.clone()))
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs harvest cycles against one store; only one cycle runs at a time.
#[derive(Debug, Clone)]
pub struct Harvester {
    store_path: String,
    args: HarvestArgs,
    running: Arc<AtomicBool>,
}

impl Harvester {
    pub fn new(store_path: impl Into<String>, args: HarvestArgs) -> Self {
        Self {
            store_path: store_path.into(),
            args,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Crawl (first run or `--recrawl`), enrich, save. Failures end up in
    /// [`HarvestSummary::error`].
    pub async fn run_cycle(&self) -> HarvestSummary {
        self.run_cycle_on(Local::now().date_naive()).await
    }

    pub async fn run_cycle_on(&self, today: NaiveDate) -> HarvestSummary {
        let Some(_guard) = RunningGuard::acquire(&self.running) else {
            return HarvestSummary::failed(HarvestError::AlreadyRunning.to_string());
        };
        match self.harvest(today).await {
            Ok(summary) => summary,
            Err(err) => {
                tracing::error!(error = %err, "harvest failed");
                HarvestSummary::failed(err.to_string())
            }
        }
    }

    async fn harvest(&self, today: NaiveDate) -> Result<HarvestSummary, HarvestError> {
        let mut store = JournalStore::open(&self.store_path);
        let mut journals = store.load()?.to_vec();
        tracing::info!(loaded = journals.len(), store = %store.path().display(), "store loaded");

        let fetcher = PageFetcher::new()?;
        if journals.is_empty() || self.args.recrawl {
            let source = ListingSource::new(&self.args.listing_url, &self.args.specialty);
            journals = crawl_listing(&fetcher, &source, today).await;
        }
        if journals.is_empty() {
            return Ok(HarvestSummary::failed("no journals found"));
        }

        let client = RegistryClient::new(fetcher, RegistrySource::from(&self.args.registry));
        let stats = enrich_records(&mut journals, &client, self.args.lookup_concurrency).await;

        let mut summary = HarvestSummary::from(stats);
        if let Err(err) = store.save(journals) {
            tracing::error!(error = %err, "saving journals failed");
            summary.error = Some(err.to_string());
        }
        Ok(summary)
    }
}

pub async fn run_harvest(store_path: &str, args: HarvestArgs) -> HarvestSummary {
    let summary = Harvester::new(store_path, args).run_cycle().await;
    println!("journals processed:   {}", summary.processed);
    println!("white-listed:         {}", summary.white_listed);
    println!("in RSCI:              {}", summary.in_second_registry);
    if let Some(err) = &summary.error {
        println!("error:                {err}");
    }
    summary
}

pub fn run_stats(store_path: &str) -> Result<(), HarvestError> {
    let mut store = JournalStore::open(store_path);
    store.load()?;
    let journals = store.journals();
    let white_listed = journals.iter().filter(|j| j.is_white_listed()).count();
    let in_rsci = journals.iter().filter(|j| j.in_second_registry).count();
    let current = journals.iter().filter(|j| j.is_current).count();

    println!("journals:      {}", journals.len());
    println!("current:       {current}");
    println!("white-listed:  {white_listed}");
    println!("in RSCI:       {in_rsci}");
    println!("categories:    {}", store.vak_categories().join(", "));
    println!("levels:        {}", store.white_levels().join(", "));
    Ok(())
}

/// Returns the number of exported journals.
pub fn run_export(store_path: &str, args: &ExportArgs) -> Result<usize, HarvestError> {
    let mut store = JournalStore::open(store_path);
    store.load()?;
    let filter = JournalFilter::from(args);
    let selected = store.filter(&filter);
    if selected.is_empty() {
        println!("no journals match the selected filters");
        return Ok(0);
    }
    export_csv(&selected, &args.output)?;
    println!("exported {} journals to {}", selected.len(), args.output);
    Ok(selected.len())
}

pub async fn run_lookup(store_path: &str, args: &LookupArgs) -> Result<(), HarvestError> {
    let mut store = JournalStore::open(store_path);
    store.load()?;
    if let Some(known) = store.find_by_issn(&args.issn) {
        println!(
            "stored: {} (level {}, RSCI {})",
            known.name, known.white_level, known.in_second_registry
        );
    }

    let source = RegistrySource::from(&args.registry);
    let status = check_registry_status(&args.issn, &args.name, &source, None).await;
    let rendered = serde_json::to_string_pretty(&status).unwrap_or_else(|_| format!("{status:?}"));
    println!("{rendered}");
    Ok(())
}
