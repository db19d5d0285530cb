use serde::Deserialize;
use std::collections::BTreeMap;

/// Main configuration structure for Registry-Harvester
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub harvest: HarvestConfig,
    pub site: SiteConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub merge: MergeConfig,
}

/// Region session behavior
#[derive(Debug, Clone, Deserialize)]
pub struct HarvestConfig {
    /// Jurisdiction code selected in the search form (e.g. "RR")
    pub region: String,

    /// Stop after this page has been extracted
    #[serde(rename = "max-pages", default)]
    pub max_pages: Option<u32>,

    /// Save a checkpoint every this many completed pages
    #[serde(rename = "checkpoint-interval", default = "default_checkpoint_interval")]
    pub checkpoint_interval: u32,

    /// Consecutive empty (but unblocked) pages tolerated before aborting
    #[serde(rename = "empty-page-threshold", default = "default_empty_page_threshold")]
    pub empty_page_threshold: u32,

    /// Failed recovery attempts tolerated after the first one
    #[serde(rename = "max-recovery-attempts", default = "default_max_recovery_attempts")]
    pub max_recovery_attempts: u32,
}

/// Target portal selectors and text markers
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// The search page; also the location every result page must stay on
    #[serde(rename = "search-url")]
    pub search_url: String,

    #[serde(rename = "region-select-selector", default = "default_region_select")]
    pub region_select_selector: String,

    #[serde(rename = "search-button-selector", default = "default_search_button")]
    pub search_button_selector: String,

    /// One element per result card
    #[serde(rename = "results-selector", default = "default_results_selector")]
    pub results_selector: String,

    /// Container searched for the end-of-results marker
    #[serde(rename = "result-area-selector", default = "default_result_area")]
    pub result_area_selector: String,

    /// Page-number links
    #[serde(rename = "pagination-selector", default = "default_pagination_selector")]
    pub pagination_selector: String,

    /// Fallback "next page" control texts tried when no page-number link exists
    #[serde(rename = "next-control-texts", default = "default_next_control_texts")]
    pub next_control_texts: Vec<String>,

    #[serde(rename = "end-marker", default = "default_end_marker")]
    pub end_marker: String,

    /// Case-insensitive substrings that signal throttling or rejection
    #[serde(rename = "block-indicators", default = "default_block_indicators")]
    pub block_indicators: Vec<String>,

    /// Script returning an array of card texts; replaces `results-selector`
    /// text collection when set
    #[serde(rename = "card-script", default)]
    pub card_script: Option<String>,
}

/// Explicit timeouts for every wait (milliseconds)
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutConfig {
    #[serde(rename = "navigation-ms", default = "default_navigation_ms")]
    pub navigation_ms: u64,

    #[serde(rename = "search-results-ms", default = "default_search_results_ms")]
    pub search_results_ms: u64,

    #[serde(rename = "page-refresh-ms", default = "default_page_refresh_ms")]
    pub page_refresh_ms: u64,

    #[serde(rename = "reload-ms", default = "default_navigation_ms")]
    pub reload_ms: u64,

    #[serde(rename = "poll-interval-ms", default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// A page-index band of the backoff step function
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BackoffBand {
    /// The multiplier applies to pages strictly above this index
    #[serde(rename = "after-page")]
    pub after_page: u32,
    pub multiplier: f64,
}

/// Backoff scheduler policy
#[derive(Debug, Clone, Deserialize)]
pub struct BackoffConfig {
    #[serde(rename = "base-delay-ms", default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Strictly positive lower bound of every delay
    #[serde(rename = "floor-ms", default = "default_floor_ms")]
    pub floor_ms: u64,

    /// Each consecutive failure adds this fraction of the delay
    #[serde(rename = "failure-factor", default = "default_failure_factor")]
    pub failure_factor: f64,

    /// Take a longer rest every this many pages (0 disables)
    #[serde(rename = "rest-interval", default = "default_rest_interval")]
    pub rest_interval: u32,

    #[serde(rename = "rest-multiplier", default = "default_rest_multiplier")]
    pub rest_multiplier: f64,

    /// Sleeps are sampled in `[delay, delay * spread]`
    #[serde(default = "default_spread")]
    pub spread: f64,

    #[serde(default = "default_bands")]
    pub bands: Vec<BackoffBand>,
}

/// Recovery strategy timings (milliseconds)
#[derive(Debug, Clone, Deserialize)]
pub struct RecoveryConfig {
    #[serde(rename = "min-wait-ms", default = "default_recovery_min_wait")]
    pub min_wait_ms: u64,

    #[serde(rename = "max-wait-ms", default = "default_recovery_max_wait")]
    pub max_wait_ms: u64,

    #[serde(rename = "settle-min-ms", default = "default_settle_min")]
    pub settle_min_ms: u64,

    #[serde(rename = "settle-max-ms", default = "default_settle_max")]
    pub settle_max_ms: u64,
}

/// Short humanlike pauses around interactions (milliseconds)
#[derive(Debug, Clone, Deserialize)]
pub struct PacingConfig {
    #[serde(rename = "hover-min-ms", default = "default_hover_min")]
    pub hover_min_ms: u64,

    #[serde(rename = "hover-max-ms", default = "default_hover_max")]
    pub hover_max_ms: u64,

    /// Longer pause between form steps
    #[serde(rename = "think-min-ms", default = "default_think_min")]
    pub think_min_ms: u64,

    #[serde(rename = "think-max-ms", default = "default_think_max")]
    pub think_max_ms: u64,

    /// Move the pointer around before interacting
    #[serde(rename = "mouse-moves", default = "default_true")]
    pub mouse_moves: bool,
}

/// Which page driver backs the session
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    Webdriver,
    Snapshot,
}

/// Browser session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_driver_kind")]
    pub kind: DriverKind,

    #[serde(rename = "webdriver-url", default = "default_webdriver_url")]
    pub webdriver_url: String,

    #[serde(rename = "browser-name", default = "default_browser_name")]
    pub browser_name: String,

    #[serde(default)]
    pub headless: bool,

    /// Directory of saved `page_<N>.html` files for the snapshot driver
    #[serde(rename = "snapshot-dir", default)]
    pub snapshot_dir: Option<String>,
}

/// Checkpoint persistence backend
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    File,
    Sqlite,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(rename = "csv-dir", default = "default_csv_dir")]
    pub csv_dir: String,

    #[serde(rename = "checkpoint-dir", default = "default_checkpoint_dir")]
    pub checkpoint_dir: String,

    #[serde(rename = "checkpoint-backend", default = "default_checkpoint_backend")]
    pub checkpoint_backend: CheckpointBackend,

    #[serde(rename = "file-prefix", default = "default_file_prefix")]
    pub file_prefix: String,

    /// Prefix CSV files with a UTF-8 byte order mark
    #[serde(rename = "utf8-bom", default = "default_true")]
    pub utf8_bom: bool,
}

/// Per-field pattern overrides, keyed by column name
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default)]
    pub patterns: BTreeMap<String, Vec<String>>,
}

/// A header canonicalization rule for the merge utility
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CanonicalRule {
    /// Full-match regex applied to the normalized header
    pub pattern: String,
    pub column: String,
}

/// Merge utility configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MergeConfig {
    #[serde(rename = "input-dir", default = "default_csv_dir")]
    pub input_dir: String,

    #[serde(rename = "output-path", default = "default_merge_output")]
    pub output_path: String,

    #[serde(default = "default_true")]
    pub recursive: bool,

    /// Re-parse with ';' when a ',' parse yields more columns than this
    #[serde(rename = "too-many-columns", default = "default_too_many_columns")]
    pub too_many_columns: usize,

    #[serde(rename = "priority-columns", default = "default_priority_columns")]
    pub priority_columns: Vec<String>,

    #[serde(default = "default_canonical_rules")]
    pub canonical: Vec<CanonicalRule>,
}

fn default_checkpoint_interval() -> u32 {
    10
}

fn default_empty_page_threshold() -> u32 {
    3
}

fn default_max_recovery_attempts() -> u32 {
    3
}

fn default_region_select() -> String {
    r#"select[name="uf"]"#.to_string()
}

fn default_search_button() -> String {
    "button.btn-buscar".to_string()
}

fn default_results_selector() -> String {
    r#"div.busca-resultado > div[class^="resultado-item"]"#.to_string()
}

fn default_result_area() -> String {
    "div.busca-resultado".to_string()
}

fn default_pagination_selector() -> String {
    "#paginacao a".to_string()
}

fn default_next_control_texts() -> Vec<String> {
    vec!["Próxima".to_string(), ">".to_string()]
}

fn default_end_marker() -> String {
    "Nenhum resultado a mostrar".to_string()
}

fn default_block_indicators() -> Vec<String> {
    [
        "blocked",
        "captcha",
        "verificação",
        "bot detected",
        "rate limit",
        "too many requests",
        "acesso negado",
        "forbidden",
        "erro 403",
        "erro 429",
        "suspeita",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_navigation_ms() -> u64 {
    60_000
}

fn default_search_results_ms() -> u64 {
    120_000
}

fn default_page_refresh_ms() -> u64 {
    60_000
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_base_delay_ms() -> u64 {
    2_000
}

fn default_floor_ms() -> u64 {
    1
}

fn default_failure_factor() -> f64 {
    0.5
}

fn default_rest_interval() -> u32 {
    25
}

fn default_rest_multiplier() -> f64 {
    2.5
}

fn default_spread() -> f64 {
    1.5
}

fn default_bands() -> Vec<BackoffBand> {
    [(10, 1.5), (50, 2.5), (70, 3.0), (90, 4.0)]
        .iter()
        .map(|&(after_page, multiplier)| BackoffBand {
            after_page,
            multiplier,
        })
        .collect()
}

fn default_recovery_min_wait() -> u64 {
    30_000
}

fn default_recovery_max_wait() -> u64 {
    90_000
}

fn default_settle_min() -> u64 {
    3_000
}

fn default_settle_max() -> u64 {
    6_000
}

fn default_hover_min() -> u64 {
    500
}

fn default_hover_max() -> u64 {
    1_200
}

fn default_think_min() -> u64 {
    1_500
}

fn default_think_max() -> u64 {
    3_500
}

fn default_true() -> bool {
    true
}

fn default_driver_kind() -> DriverKind {
    DriverKind::Webdriver
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}

fn default_browser_name() -> String {
    "chrome".to_string()
}

fn default_csv_dir() -> String {
    "./data/csv".to_string()
}

fn default_checkpoint_dir() -> String {
    "./data/checkpoints".to_string()
}

fn default_checkpoint_backend() -> CheckpointBackend {
    CheckpointBackend::File
}

fn default_file_prefix() -> String {
    "registry".to_string()
}

fn default_merge_output() -> String {
    "./data/registry_merged.csv".to_string()
}

fn default_too_many_columns() -> usize {
    60
}

fn default_priority_columns() -> Vec<String> {
    [
        "name",
        "registration_id",
        "region",
        "status",
        "specialty",
        "secondary_specialty",
        "practice_area",
        "city",
        "district",
        "address",
        "postal_code",
        "phone",
        "email",
        "registration_date",
        "graduation_institution",
        "graduation_year",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_canonical_rules() -> Vec<CanonicalRule> {
    [
        (r"(nome|name)( completo)?", "name"),
        (r"(crm|registration[ _]id)(/uf)?", "registration_id"),
        (r"uf|region", "region"),
        (r"situacao|status", "status"),
        (r"especialidade(s)?( principal)?|specialty", "specialty"),
        (r"especialidade(s)? secundaria(s)?", "secondary_specialty"),
        (r"area de atuacao", "practice_area"),
        (r"endereco|address", "address"),
        (r"bairro", "district"),
        (r"cidade|city", "city"),
        (r"cep", "postal_code"),
        (r"telefone(s)?|phone", "phone"),
        (r"email", "email"),
        (r"inscricao|data[ _]inscricao|registration[ _]date", "registration_date"),
        (r"instituicao[ _]graduacao|graduation[ _]institution", "graduation_institution"),
        (r"ano[ _]formatura|graduation[ _]year", "graduation_year"),
        (r"cpf", "cpf"),
    ]
    .iter()
    .map(|&(pattern, column)| CanonicalRule {
        pattern: pattern.to_string(),
        column: column.to_string(),
    })
    .collect()
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            navigation_ms: default_navigation_ms(),
            search_results_ms: default_search_results_ms(),
            page_refresh_ms: default_page_refresh_ms(),
            reload_ms: default_navigation_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            floor_ms: default_floor_ms(),
            failure_factor: default_failure_factor(),
            rest_interval: default_rest_interval(),
            rest_multiplier: default_rest_multiplier(),
            spread: default_spread(),
            bands: default_bands(),
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            min_wait_ms: default_recovery_min_wait(),
            max_wait_ms: default_recovery_max_wait(),
            settle_min_ms: default_settle_min(),
            settle_max_ms: default_settle_max(),
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            hover_min_ms: default_hover_min(),
            hover_max_ms: default_hover_max(),
            think_min_ms: default_think_min(),
            think_max_ms: default_think_max(),
            mouse_moves: true,
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            kind: default_driver_kind(),
            webdriver_url: default_webdriver_url(),
            browser_name: default_browser_name(),
            headless: false,
            snapshot_dir: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            csv_dir: default_csv_dir(),
            checkpoint_dir: default_checkpoint_dir(),
            checkpoint_backend: default_checkpoint_backend(),
            file_prefix: default_file_prefix(),
            utf8_bom: true,
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            input_dir: default_csv_dir(),
            output_path: default_merge_output(),
            recursive: true,
            too_many_columns: default_too_many_columns(),
            priority_columns: default_priority_columns(),
            canonical: default_canonical_rules(),
        }
    }
}

impl SiteConfig {
    /// Site settings with the portal defaults and the given search URL
    pub fn with_search_url(search_url: &str) -> Self {
        Self {
            search_url: search_url.to_string(),
            region_select_selector: default_region_select(),
            search_button_selector: default_search_button(),
            results_selector: default_results_selector(),
            result_area_selector: default_result_area(),
            pagination_selector: default_pagination_selector(),
            next_control_texts: default_next_control_texts(),
            end_marker: default_end_marker(),
            block_indicators: default_block_indicators(),
            card_script: None,
        }
    }
}

impl HarvestConfig {
    /// Session settings with the default thresholds for a region
    pub fn for_region(region: &str) -> Self {
        Self {
            region: region.to_string(),
            max_pages: None,
            checkpoint_interval: default_checkpoint_interval(),
            empty_page_threshold: default_empty_page_threshold(),
            max_recovery_attempts: default_max_recovery_attempts(),
        }
    }
}

impl Config {
    /// Builds a configuration with every optional section at its default
    pub fn new(region: &str, search_url: &str) -> Self {
        Self {
            harvest: HarvestConfig::for_region(region),
            site: SiteConfig::with_search_url(search_url),
            timeouts: TimeoutConfig::default(),
            backoff: BackoffConfig::default(),
            recovery: RecoveryConfig::default(),
            pacing: PacingConfig::default(),
            browser: BrowserConfig::default(),
            output: OutputConfig::default(),
            extraction: ExtractionConfig::default(),
            merge: MergeConfig::default(),
        }
    }
}
