//! # Airport coordinate resolution
//!
//! - `AirportTable`: local reference table (TOML or JSON file, or a built-in seed).
//! - `RemoteAirportLookup`: optional HTTP lookup with a bounded timeout.
//! - `ChainedResolver`: table first, remote only when configured.
//!
//! Resolution never fails loudly: every problem degrades to `None` and the
//! flight processor turns that into a per-item discard.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::app::{AirportsConfig, RemoteLookupConfig};
use crate::geo::Coordinate;

/// Maps an airport code to its coordinate.
#[async_trait]
pub trait AirportResolver: Send + Sync {
    async fn resolve(&self, code: &str) -> Option<Coordinate>;
    fn name(&self) -> &'static str;
}

pub type DynResolver = Arc<dyn AirportResolver>;

/// Trimmed, upper-cased airport code. Empty input yields `None`.
pub fn normalize_code(code: &str) -> Option<String> {
    let c = code.trim().to_ascii_uppercase();
    if c.is_empty() {
        None
    } else {
        Some(c)
    }
}

/* ----------------------------
Local table
---------------------------- */

#[derive(Debug, Clone, Deserialize)]
pub struct AirportEntry {
    #[serde(alias = "iata", alias = "code")]
    pub iata_code: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Default)]
pub struct AirportTable {
    entries: HashMap<String, Coordinate>,
}

impl AirportTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I: IntoIterator<Item = AirportEntry>>(entries: I) -> Self {
        let mut t = Self::new();
        for e in entries {
            t.insert(&e.iata_code, Coordinate::new(e.latitude, e.longitude));
        }
        t
    }

    /// Invalid codes or coordinates are skipped.
    pub fn insert(&mut self, code: &str, coord: Coordinate) {
        if let Some(c) = normalize_code(code) {
            if coord.is_valid() {
                self.entries.insert(c, coord);
            }
        }
    }

    pub fn get(&self, code: &str) -> Option<Coordinate> {
        normalize_code(code).and_then(|c| self.entries.get(&c).copied())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load from a file. `.toml` expects `[[airport]]` tables; anything else
    /// is read as a JSON array of `{iata_code, latitude, longitude}`.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading airport table from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        Self::parse(&content, &ext)
    }

    fn parse(s: &str, hint_ext: &str) -> Result<Self> {
        #[derive(Deserialize)]
        struct TomlTable {
            airport: Vec<AirportEntry>,
        }

        if hint_ext == "toml" {
            let t: TomlTable = toml::from_str(s).context("parsing airport table toml")?;
            return Ok(Self::from_entries(t.airport));
        }
        if let Ok(v) = serde_json::from_str::<Vec<AirportEntry>>(s) {
            return Ok(Self::from_entries(v));
        }
        if let Ok(t) = toml::from_str::<TomlTable>(s) {
            return Ok(Self::from_entries(t.airport));
        }
        Err(anyhow!("unsupported airport table format"))
    }

    /// Built-in table of common airports; used when no file is configured.
    pub fn default_seed() -> Self {
        let mut t = Self::new();
        for (code, lat, lon) in [
            ("FCO", 41.8, 12.25),
            ("CIA", 41.7994, 12.5949),
            ("MXP", 45.6306, 8.7281),
            ("LIN", 45.4451, 9.2767),
            ("BGY", 45.6739, 9.7042),
            ("VCE", 45.5053, 12.3519),
            ("NAP", 40.886, 14.2908),
            ("BLQ", 44.5354, 11.2887),
            ("FLR", 43.81, 11.2051),
            ("PSA", 43.6839, 10.3927),
            ("TRN", 45.2008, 7.6496),
            ("CTA", 37.4668, 15.0664),
            ("PMO", 38.1759, 13.091),
            ("BRI", 41.1389, 16.7606),
            ("CAG", 39.2515, 9.0543),
            ("JFK", 40.64, -73.78),
            ("EWR", 40.6925, -74.1687),
            ("LGA", 40.7772, -73.8726),
            ("BOS", 42.3643, -71.0052),
            ("ORD", 41.9786, -87.9048),
            ("LAX", 33.9425, -118.4081),
            ("SFO", 37.619, -122.375),
            ("MIA", 25.7932, -80.2906),
            ("YYZ", 43.6772, -79.6306),
            ("LHR", 51.4706, -0.4619),
            ("LGW", 51.1481, -0.1903),
            ("CDG", 49.0097, 2.5479),
            ("ORY", 48.7233, 2.3794),
            ("FRA", 50.0333, 8.5706),
            ("MUC", 48.3538, 11.7861),
            ("AMS", 52.3086, 4.7639),
            ("BRU", 50.9014, 4.4844),
            ("ZRH", 47.4647, 8.5492),
            ("GVA", 46.2381, 6.1089),
            ("VIE", 48.1103, 16.5697),
            ("MAD", 40.4719, -3.5626),
            ("BCN", 41.2971, 2.0785),
            ("LIS", 38.7813, -9.1359),
            ("ATH", 37.9364, 23.9445),
            ("IST", 41.2753, 28.7519),
            ("CPH", 55.618, 12.656),
            ("ARN", 59.6519, 17.9186),
            ("OSL", 60.1939, 11.1004),
            ("HEL", 60.3172, 24.9633),
            ("DUB", 53.4213, -6.2701),
            ("WAW", 52.1657, 20.9671),
            ("PRG", 50.1008, 14.26),
            ("DXB", 25.2528, 55.3644),
            ("DOH", 25.2731, 51.6081),
            ("SIN", 1.3502, 103.9944),
            ("HND", 35.5523, 139.78),
            ("NRT", 35.7647, 140.3864),
            ("HKG", 22.308, 113.9185),
            ("PEK", 40.0801, 116.5846),
            ("SYD", -33.9461, 151.1772),
            ("GRU", -23.4356, -46.4731),
            ("JNB", -26.1392, 28.246),
        ] {
            t.insert(code, Coordinate::new(lat, lon));
        }
        t
    }
}

#[async_trait]
impl AirportResolver for AirportTable {
    async fn resolve(&self, code: &str) -> Option<Coordinate> {
        self.get(code)
    }
    fn name(&self) -> &'static str {
        "table"
    }
}

/* ----------------------------
Remote lookup
---------------------------- */

pub const API_KEY_HEADER: &str = "X-Api-Key";

/// HTTP coordinate lookup: `GET {base_url}?iata_code={code}`.
///
/// Accepts either a single object or an array of objects carrying
/// `latitude`/`longitude` (numbers or numeric strings); the first usable
/// entry wins.
pub struct RemoteAirportLookup {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RemoteAirportLookup {
    pub fn new(cfg: &RemoteLookupConfig) -> Result<Self> {
        let timeout = Duration::from_millis(cfg.timeout_ms);
        let http = reqwest::Client::builder()
            .user_agent("footprint-aggregator/0.1")
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .context("building airport lookup http client")?;
        Ok(Self {
            http,
            base_url: cfg.base_url.clone(),
            api_key: cfg.api_key.clone(),
        })
    }

    async fn fetch(&self, code: &str) -> Result<Coordinate> {
        let resp = self
            .http
            .get(&self.base_url)
            .query(&[("iata_code", code)])
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .context("sending lookup request")?;

        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("lookup returned {status}"));
        }
        let body: Value = resp.json().await.context("decoding lookup body")?;
        coordinate_from_body(&body).ok_or_else(|| anyhow!("no usable coordinate in body"))
    }
}

#[async_trait]
impl AirportResolver for RemoteAirportLookup {
    async fn resolve(&self, code: &str) -> Option<Coordinate> {
        let code = normalize_code(code)?;
        match self.fetch(&code).await {
            Ok(c) => {
                counter!("airport_remote_lookups_total", "outcome" => "hit").increment(1);
                debug!(target: "airports", %code, "remote lookup resolved");
                Some(c)
            }
            Err(e) => {
                counter!("airport_remote_lookups_total", "outcome" => "miss").increment(1);
                warn!(target: "airports", %code, error = %e, "remote lookup failed");
                None
            }
        }
    }
    fn name(&self) -> &'static str {
        "remote"
    }
}

fn coordinate_from_body(body: &Value) -> Option<Coordinate> {
    match body {
        Value::Array(items) => items.iter().find_map(coordinate_from_object),
        Value::Object(_) => coordinate_from_object(body),
        _ => None,
    }
}

fn coordinate_from_object(v: &Value) -> Option<Coordinate> {
    let lat = number(v.get("latitude")?)?;
    let lon = number(v.get("longitude")?)?;
    let c = Coordinate::new(lat, lon);
    c.is_valid().then_some(c)
}

fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/* ----------------------------
Chain
---------------------------- */

/// Local table first; remote only on a table miss and only if configured.
pub struct ChainedResolver {
    table: AirportTable,
    remote: Option<DynResolver>,
}

impl ChainedResolver {
    pub fn new(table: AirportTable, remote: Option<DynResolver>) -> Self {
        Self { table, remote }
    }

    pub fn table_only(table: AirportTable) -> Self {
        Self::new(table, None)
    }

    /// Table from `table_path` (or the built-in seed) plus the optional remote.
    pub fn from_config(cfg: &AirportsConfig) -> Result<Self> {
        let table = match &cfg.table_path {
            Some(p) => AirportTable::load_from(p)?,
            None => AirportTable::default_seed(),
        };
        let remote: Option<DynResolver> = match &cfg.remote {
            Some(r) => Some(Arc::new(RemoteAirportLookup::new(r)?)),
            None => None,
        };
        if table.is_empty() {
            warn!(target: "airports", "airport table is empty; flights resolve only remotely");
        }
        info!(
            target: "airports",
            entries = table.len(),
            remote = remote.is_some(),
            "airport resolver ready"
        );
        Ok(Self::new(table, remote))
    }

    pub fn table(&self) -> &AirportTable {
        &self.table
    }
}

#[async_trait]
impl AirportResolver for ChainedResolver {
    async fn resolve(&self, code: &str) -> Option<Coordinate> {
        if let Some(c) = self.table.get(code) {
            return Some(c);
        }
        match &self.remote {
            Some(r) => r.resolve(code).await,
            None => None,
        }
    }
    fn name(&self) -> &'static str {
        "chained"
    }
}
