//! Dataset registry: static configuration describing every searchable dataset.
//!
//! Each dataset (one independently-schemaed collection of rows backed by one
//! columnar file) is described by a [`DatasetDescriptor`]: where its backing
//! file lives, which fields are displayed, which fields are searchable, the
//! semantic type of each field, and its sort/pagination defaults. Per-dataset
//! behavioral differences are data, not subclasses; the shared query path
//! reads the descriptor instead of branching on dataset identity.
//!
//! The registry is loaded once at process start from a JSON document and is
//! immutable afterwards. It is passed by `Arc` into the other components,
//! never held as a mutable singleton.
//!
//! # Registry document shape
//!
//! ```json
//! {
//!   "datasets": [
//!     {
//!       "category": "dataA",
//!       "subcategory": "safetykorea",
//!       "remote_url": "https://files.example.com/1_safetykorea_flattened.parquet",
//!       "display_fields": [
//!         { "field": "cert_num", "name": "Certification No.", "width": "15%" },
//!         { "field": "issue_date", "name": "Issue Date", "type": "date" }
//!       ],
//!       "search_fields": [
//!         { "field": "product_name", "name": "Product" },
//!         { "field": "cert_num", "name": "Certification No." }
//!       ],
//!       "field_types": { "cert_num": "text", "issue_date": "date" },
//!       "exact_match_fields": ["cert_num"],
//!       "default_search_field": "product_name",
//!       "default_sort_field": "issue_date",
//!       "default_sort_order": "desc",
//!       "page_size": 20
//!     }
//!   ]
//! }
//! ```

use hashbrown::HashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::SearchError;

/// Semantic type of a dataset field.
///
/// The field type is the single source of truth for how a column is matched
/// and sorted. The query path never inspects values to guess a type; it looks
/// the field up here. Fields absent from a descriptor's `field_types` map are
/// treated as opaque text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    Text,
    Integer,
    Double,
    Date,
    Array,
    /// Raw image URL, passed through untouched for the presentation layer.
    Image,
    /// Raw link URL, passed through untouched for the presentation layer.
    Link,
}

impl FieldType {
    /// Whether values of this type are compared numerically when sorting.
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Double)
    }
}

/// Sort direction for a dataset's default ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SortDirection {
    #[default]
    #[serde(rename = "asc")]
    Ascending,
    #[serde(rename = "desc")]
    Descending,
}

impl SortDirection {
    pub fn is_ascending(&self) -> bool {
        matches!(self, SortDirection::Ascending)
    }
}

/// One column shown in result listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayField {
    /// Column name in the backing file.
    pub field: String,
    /// Human-readable label.
    pub name: String,
    /// Column width hint for the presentation layer ("15%", "120px", "auto").
    #[serde(default = "default_width")]
    pub width: String,
    /// Semantic type, duplicated here for presentation convenience.
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
}

fn default_width() -> String {
    "auto".to_string()
}

/// One field offered as a keyword-search target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchField {
    /// Column name in the backing file.
    pub field: String,
    /// Label for the search-field selector.
    pub name: String,
    /// Placeholder text for the search input.
    #[serde(default)]
    pub placeholder: Option<String>,
}

/// Identity of one dataset: (category, subcategory, optional result type).
///
/// The same triple keys the prefetch state table and scopes readiness
/// signals, so listeners watching one dataset ignore events for another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetKey {
    pub category: String,
    pub subcategory: String,
    #[serde(default)]
    pub result_type: Option<String>,
}

impl DatasetKey {
    pub fn new(
        category: impl Into<String>,
        subcategory: impl Into<String>,
        result_type: Option<&str>,
    ) -> Self {
        DatasetKey {
            category: category.into(),
            subcategory: subcategory.into(),
            result_type: result_type.map(str::to_string),
        }
    }

    /// Filesystem- and filename-safe rendering of the key.
    pub fn slug(&self) -> String {
        match &self.result_type {
            Some(rt) => format!("{}_{}_{}", self.category, rt, self.subcategory),
            None => format!("{}_{}", self.category, self.subcategory),
        }
    }
}

impl fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.result_type {
            Some(rt) => write!(f, "{}/{}/{}", self.category, rt, self.subcategory),
            None => write!(f, "{}/{}", self.category, self.subcategory),
        }
    }
}

/// Full configuration record for one dataset.
///
/// Descriptors are immutable after registry construction. Every field named
/// in `search_fields`, `exact_match_fields`, or `default_sort_field` should
/// have an entry in `field_types`; names without one resolve to
/// [`FieldType::Text`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub category: String,
    pub subcategory: String,
    #[serde(default)]
    pub result_type: Option<String>,

    /// Remote file locator (`https://...`, `s3://bucket/key.parquet`).
    #[serde(default)]
    pub remote_url: Option<String>,
    /// Local file path, for datasets already on disk.
    #[serde(default)]
    pub local_path: Option<String>,

    /// Columns shown in result listings, in display order.
    pub display_fields: Vec<DisplayField>,
    /// Fields offered as keyword-search targets, in menu order.
    pub search_fields: Vec<SearchField>,
    /// Semantic type per field name. Missing names are opaque text.
    #[serde(default)]
    pub field_types: IndexMap<String, FieldType>,

    /// Columns included in export artifacts. Falls back to display fields
    /// when empty.
    #[serde(default)]
    pub download_fields: Vec<String>,
    /// Fields matched by exact comparison instead of substring (certification
    /// and registration numbers).
    #[serde(default)]
    pub exact_match_fields: Vec<String>,

    /// Search field used when the caller does not pick one.
    pub default_search_field: String,
    #[serde(default)]
    pub default_sort_field: Option<String>,
    #[serde(default)]
    pub default_sort_order: SortDirection,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page_size() -> usize {
    20
}

impl DatasetDescriptor {
    /// The dataset's identity triple.
    pub fn key(&self) -> DatasetKey {
        DatasetKey {
            category: self.category.clone(),
            subcategory: self.subcategory.clone(),
            result_type: self.result_type.clone(),
        }
    }

    /// Semantic type of a field, defaulting to opaque text for names the
    /// configuration does not mention.
    pub fn field_type(&self, name: &str) -> FieldType {
        self.field_types.get(name).copied().unwrap_or_default()
    }

    /// Whether a field is a valid keyword-search target for this dataset.
    pub fn is_searchable(&self, name: &str) -> bool {
        self.search_fields.iter().any(|sf| sf.field == name)
    }

    /// Whether a field is matched by exact comparison instead of substring.
    pub fn is_exact_match(&self, name: &str) -> bool {
        self.exact_match_fields.iter().any(|f| f == name)
    }

    /// The locator the retrieval engine should read when no staged copy is
    /// available: the local path if configured, otherwise the remote URL.
    pub fn locator(&self) -> Option<&str> {
        self.local_path
            .as_deref()
            .or(self.remote_url.as_deref())
    }
}

/// Top-level shape of the registry JSON document.
#[derive(Debug, Deserialize)]
struct RegistryDocument {
    datasets: Vec<DatasetDescriptor>,
    /// Extra subcategory aliases merged over the built-in ones.
    #[serde(default)]
    subcategory_aliases: HashMap<String, String>,
}

/// Subcategory spellings that changed over time but must keep resolving.
const BUILTIN_ALIASES: &[(&str, &str)] = &[
    ("approval-details", "approval"),
    ("rra-certification", "rra-cert"),
    ("rra-self-conformity", "rra-self-cert"),
];

/// Immutable mapping from dataset identity to descriptor.
///
/// Construct once at startup with [`DatasetRegistry::from_json_str`] or
/// [`DatasetRegistry::from_json_file`], then share by `Arc`. `resolve` is a
/// pure lookup with no I/O; a miss is an [`SearchError::UnknownDataset`] and
/// never silently substitutes another dataset's data.
#[derive(Debug)]
pub struct DatasetRegistry {
    datasets: HashMap<DatasetKey, DatasetDescriptor>,
    aliases: HashMap<String, String>,
}

impl DatasetRegistry {
    /// Builds a registry from a list of descriptors. Later descriptors with
    /// the same key replace earlier ones.
    pub fn new(descriptors: Vec<DatasetDescriptor>) -> Self {
        let mut registry = DatasetRegistry {
            datasets: HashMap::new(),
            aliases: BUILTIN_ALIASES
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
        };
        for descriptor in descriptors {
            registry.datasets.insert(descriptor.key(), descriptor);
        }
        registry
    }

    /// Parses the registry JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let document: RegistryDocument = serde_json::from_str(json)?;
        let mut registry = Self::new(document.datasets);
        for (from, to) in document.subcategory_aliases {
            registry.aliases.insert(from, to);
        }
        Ok(registry)
    }

    /// Reads and parses a registry JSON file.
    pub fn from_json_file(
        path: impl AsRef<Path>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Canonical spelling of a subcategory, resolving renamed aliases.
    pub fn normalize_subcategory<'a>(&'a self, subcategory: &'a str) -> &'a str {
        self.aliases
            .get(subcategory)
            .map(String::as_str)
            .unwrap_or(subcategory)
    }

    /// Looks up the descriptor for a dataset identity.
    ///
    /// Subcategory aliases are normalized before the lookup. Fails with
    /// [`SearchError::UnknownDataset`] when the triple has no entry.
    pub fn resolve(
        &self,
        category: &str,
        subcategory: &str,
        result_type: Option<&str>,
    ) -> Result<&DatasetDescriptor, SearchError> {
        let key = DatasetKey::new(
            category,
            self.normalize_subcategory(subcategory),
            result_type,
        );
        self.datasets
            .get(&key)
            .ok_or(SearchError::UnknownDataset { key })
    }

    /// Number of configured datasets.
    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    /// Iterates over all configured descriptors in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &DatasetDescriptor> {
        self.datasets.values()
    }
}

// Link to test module (only compiled during tests)
#[cfg(test)]
#[path = "registry/tests/mod.rs"]
mod tests;
