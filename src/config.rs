use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PAGE_URL: &str = "https://www.17lands.com/";
const DEFAULT_FORMAT: &str = "PremierDraft";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub page_url: String,
    pub expansion: Option<String>,
    pub format: String,
    pub quiescence: Duration,
    pub cache_dir: Option<PathBuf>,
    pub pool_file: Option<PathBuf>,
    pub pack_size: usize,
    pub startup_delay: Duration,
}

impl Settings {
    pub fn from_env() -> Self {
        let page_url = non_empty_var("GIH_PAGE_URL").unwrap_or_else(|| DEFAULT_PAGE_URL.to_string());
        let expansion = non_empty_var("GIH_EXPANSION").map(|code| code.to_uppercase());
        let format = non_empty_var("GIH_FORMAT").unwrap_or_else(|| DEFAULT_FORMAT.to_string());
        let quiescence_ms = parsed_var::<u64>("GIH_DEBOUNCE_MS")
            .unwrap_or(200)
            .clamp(50, 5000);
        let pack_size = parsed_var::<usize>("GIH_PACK_SIZE").unwrap_or(14).clamp(1, 20);
        let startup_delay_ms = parsed_var::<u64>("GIH_STARTUP_DELAY_MS")
            .unwrap_or(1000)
            .min(30_000);
        Self {
            page_url,
            expansion,
            format,
            quiescence: Duration::from_millis(quiescence_ms),
            cache_dir: non_empty_var("GIH_CACHE_DIR").map(PathBuf::from),
            pool_file: non_empty_var("GIH_POOL_FILE").map(PathBuf::from),
            pack_size,
            startup_delay: Duration::from_millis(startup_delay_ms),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    non_empty_var(name).and_then(|val| val.parse::<T>().ok())
}
