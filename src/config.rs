use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::semantic::{DEFAULT_BATCH_SIZE, DEFAULT_MODEL};

/// Default path of the products export file.
const DEFAULT_PRODUCTS_PATH: &str = "products.json";
/// Default path of the categories export file.
const DEFAULT_CATEGORIES_PATH: &str = "categories.json";
/// Default path of the persisted index.
const DEFAULT_INDEX_PATH: &str = "index.bin";
/// Default directory for downloaded model files.
const DEFAULT_DATA_DIR: &str = ".";
/// Default number of results per search.
const DEFAULT_SEARCH_LIMIT: usize = 5;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Products export file (JSON object with a "products" array)
    #[serde(default = "default_products_path")]
    pub products_path: String,

    /// Categories export file (JSON object with a "categories" array)
    #[serde(default = "default_categories_path")]
    pub categories_path: String,

    /// Persisted index file
    #[serde(default = "default_index_path")]
    pub index_path: String,

    /// Directory holding the model cache (`<data_dir>/models`)
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Embedding model name (e.g. "bge-small-en-v1.5", or "hashing" for
    /// the offline embedder)
    #[serde(default = "default_model")]
    pub model: String,

    /// Documents embedded per batch; bounds peak embedding memory
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Default number of search results
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            products_path: default_products_path(),
            categories_path: default_categories_path(),
            index_path: default_index_path(),
            data_dir: default_data_dir(),
            model: default_model(),
            batch_size: default_batch_size(),
            search_limit: default_search_limit(),
        }
    }
}

fn default_products_path() -> String {
    DEFAULT_PRODUCTS_PATH.to_string()
}

fn default_categories_path() -> String {
    DEFAULT_CATEGORIES_PATH.to_string()
}

fn default_index_path() -> String {
    DEFAULT_INDEX_PATH.to_string()
}

fn default_data_dir() -> String {
    DEFAULT_DATA_DIR.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_search_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

impl Config {
    /// Load configuration, falling back to defaults when no file is given.
    ///
    /// A missing config file is created with the defaults so it can be
    /// edited afterwards.
    pub fn load(path: Option<&Path>) -> Self {
        let mut config = match path {
            Some(path) => Self::load_from(path),
            None => Self::default(),
        };
        config.validate();
        config
    }

    fn load_from(path: &Path) -> Self {
        if !path.exists() {
            let defaults =
                serde_yml::to_string(&Self::default()).expect("default config serializes");
            std::fs::write(path, defaults).expect("config file is writable");
        }

        let config_str = std::fs::read_to_string(path).expect("config file is readable");
        serde_yml::from_str(&config_str).expect("config is malformed")
    }

    fn validate(&mut self) {
        if self.batch_size == 0 {
            self.batch_size = 1
        }

        if self.search_limit == 0 {
            self.search_limit = DEFAULT_SEARCH_LIMIT
        }

        if self.model.trim().is_empty() {
            panic!("model must not be empty");
        }
    }
}
