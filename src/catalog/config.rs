use url::Url;

use crate::model::ShowId;
use crate::util::env::{env_opt, env_parse};

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub base_url: String,
    /// Single show with embedded cast; `{id}` is substituted.
    pub show_path: String,
    /// Full `{id: marker}` map of the catalog.
    pub updates_path: String,
    /// Paginated index used by the seed job; `{page}` is substituted.
    pub index_path: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.tvmaze.com".to_string(),
            show_path: "/shows/{id}?embed=cast".to_string(),
            updates_path: "/updates/shows".to_string(),
            index_path: "/shows?page={page}".to_string(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl CatalogConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_opt("CATALOG_BASE_URL") {
            cfg.base_url = v.trim().to_string();
        }
        if let Some(v) = env_opt("CATALOG_SHOW_PATH") {
            cfg.show_path = v.trim().to_string();
        }
        if let Some(v) = env_opt("CATALOG_UPDATES_PATH") {
            cfg.updates_path = v.trim().to_string();
        }
        if let Some(v) = env_opt("CATALOG_INDEX_PATH") {
            cfg.index_path = v.trim().to_string();
        }
        cfg.timeout_secs = env_parse("CATALOG_TIMEOUT_SECS", cfg.timeout_secs).max(1);
        cfg.max_retries = env_parse("CATALOG_MAX_RETRIES", cfg.max_retries);
        cfg
    }

    /// Base URL pointing at another host, keeping the default paths. Handy for local stubs.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn show_url(&self, id: ShowId) -> Result<Url, url::ParseError> {
        self.resolve(&self.show_path.replace("{id}", &id.to_string()))
    }

    pub fn updates_url(&self) -> Result<Url, url::ParseError> {
        self.resolve(&self.updates_path)
    }

    pub fn index_url(&self, page: i64) -> Result<Url, url::ParseError> {
        self.resolve(&self.index_path.replace("{page}", &page.to_string()))
    }

    fn resolve(&self, path: &str) -> Result<Url, url::ParseError> {
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            Url::parse(&format!("{base}{path}"))
        } else {
            Url::parse(&format!("{base}/{path}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_are_substituted_against_the_base() {
        let cfg = CatalogConfig::with_base_url("http://127.0.0.1:9000/");
        assert_eq!(
            cfg.show_url(ShowId::new(82)).unwrap().as_str(),
            "http://127.0.0.1:9000/shows/82?embed=cast"
        );
        assert_eq!(
            cfg.updates_url().unwrap().as_str(),
            "http://127.0.0.1:9000/updates/shows"
        );
        assert_eq!(
            cfg.index_url(3).unwrap().as_str(),
            "http://127.0.0.1:9000/shows?page=3"
        );
    }

    #[test]
    fn relative_paths_get_a_separator() {
        let cfg = CatalogConfig {
            updates_path: "updates/shows?since=day".into(),
            ..CatalogConfig::default()
        };
        assert_eq!(
            cfg.updates_url().unwrap().as_str(),
            "https://api.tvmaze.com/updates/shows?since=day"
        );
    }
}
