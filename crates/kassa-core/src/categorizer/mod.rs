//! Product categorization against a reloadable rule table.

mod table;

pub use table::{KeywordRule, RuleTable, SubcategoryRule};

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;
use tracing::{debug, info, trace};

use crate::error::RuleError;
use crate::models::category::Category;
use crate::models::record::PurchaseRecord;

/// Which rule decided the category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchSource {
    /// The key is listed in the product table.
    Exact,
    /// A priority keyword matched.
    Priority { keyword: String },
    /// An ordinary keyword matched.
    Keyword { keyword: String },
    Fallback,
}

/// Keyword rules of several categories matched one product key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorizationAmbiguity {
    pub product_key: String,
    pub chosen: Category,
    /// All matching categories in table order, `chosen` first.
    pub candidates: Vec<Category>,
}

impl fmt::Display for CategorizationAmbiguity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let candidates: Vec<&str> = self.candidates.iter().map(Category::as_str).collect();
        write!(
            f,
            "'{}' matches {}; using {}",
            self.product_key,
            candidates.join(", "),
            self.chosen
        )
    }
}

/// Outcome of resolving one product key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub category: Category,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    pub matched_by: MatchSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ambiguity: Option<CategorizationAmbiguity>,
}

/// Assigns categories to normalized product keys.
///
/// The rule table sits behind an `RwLock<Arc<_>>`: a resolution works on one
/// snapshot, and [`Categorizer::reload`] swaps in a new table without waiting
/// for ongoing imports.
pub struct Categorizer {
    table: RwLock<Arc<RuleTable>>,
    unknown: Mutex<Vec<String>>,
    record_unknown: bool,
}

impl Categorizer {
    pub fn new(table: RuleTable) -> Self {
        Self {
            table: RwLock::new(Arc::new(table)),
            unknown: Mutex::new(Vec::new()),
            record_unknown: true,
        }
    }

    /// Load the rule table from a file.
    pub fn from_file(path: &Path) -> Result<Self, RuleError> {
        Ok(Self::new(RuleTable::from_file(path)?))
    }

    /// Keep (or stop keeping) the in-memory list of unmatched keys.
    pub fn with_unknown_tracking(mut self, enabled: bool) -> Self {
        self.record_unknown = enabled;
        self
    }

    /// Snapshot of the current table.
    pub fn table(&self) -> Arc<RuleTable> {
        match self.table.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn version(&self) -> u32 {
        self.table().version
    }

    /// Replace the table with the one at `path`. The old table stays active if
    /// the new one fails to load.
    pub fn reload(&self, path: &Path) -> Result<u32, RuleError> {
        let table = RuleTable::from_file(path)?;
        let version = table.version;
        self.replace(table);
        info!("Reloaded category rules from {} (version {})", path.display(), version);
        Ok(version)
    }

    /// Swap in a new table.
    pub fn replace(&self, table: RuleTable) {
        let table = Arc::new(table);
        match self.table.write() {
            Ok(mut guard) => *guard = table,
            Err(poisoned) => *poisoned.into_inner() = table,
        }
    }

    /// Resolve a product key to a category.
    pub fn resolve(&self, key: &str) -> Resolution {
        let table = self.table();
        let resolution = resolve_with(&table, key);

        if resolution.matched_by == MatchSource::Fallback && self.record_unknown {
            self.remember_unknown(key);
        }
        resolution
    }

    /// Set the category and subcategory of a record.
    pub fn categorize(&self, record: &mut PurchaseRecord) -> Option<CategorizationAmbiguity> {
        let resolution = self.resolve(&record.product_key);
        record.category = resolution.category;
        record.subcategory = resolution.subcategory;
        resolution.ambiguity
    }

    /// Product keys no rule matched since this categorizer was created.
    pub fn unknown_products(&self) -> Vec<String> {
        match self.unknown.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Map a product key to a category. Returns the new table version.
    pub fn set_product(&self, key: &str, category: &str) -> Result<u32, RuleError> {
        self.edit(|table| table.set_product(key, category))
    }

    /// Add an ordinary keyword. Returns the new table version.
    pub fn add_keyword(&self, category: &str, keyword: &str) -> Result<u32, RuleError> {
        self.edit(|table| table.add_keyword(category, keyword))
    }

    /// Remove an ordinary keyword. Returns the new table version.
    pub fn remove_keyword(&self, category: &str, keyword: &str) -> Result<u32, RuleError> {
        self.edit(|table| table.remove_keyword(category, keyword))
    }

    /// Teach a receipt short name. Returns the new table version.
    pub fn add_abbreviation(&self, short: &str, full: &str) -> Result<u32, RuleError> {
        self.edit(|table| table.add_abbreviation(short, full))
    }

    /// Persist the current table.
    pub fn save(&self, path: &Path) -> Result<(), RuleError> {
        self.table().save(path)
    }

    fn edit<F>(&self, apply: F) -> Result<u32, RuleError>
    where
        F: FnOnce(&mut RuleTable) -> Result<(), RuleError>,
    {
        let mut guard = match self.table.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut table = RuleTable::clone(&guard);
        apply(&mut table)?;
        let version = table.version;
        *guard = Arc::new(table);
        debug!("Category rules now at version {}", version);
        Ok(version)
    }

    fn remember_unknown(&self, key: &str) {
        let mut unknown = match self.unknown.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !unknown.iter().any(|k| k == key) {
            unknown.push(key.to_string());
        }
    }
}

impl Default for Categorizer {
    fn default() -> Self {
        Self::new(RuleTable::default_table())
    }
}

/// Expand a receipt short name: exact, or as a whole-word prefix (longest first).
fn expand_abbreviation<'a>(table: &'a RuleTable, key: &'a str) -> std::borrow::Cow<'a, str> {
    use std::borrow::Cow;

    if let Some(full) = table.abbreviations.get(key) {
        return Cow::Borrowed(full.as_str());
    }

    let best = table
        .abbreviations
        .iter()
        .filter(|(short, _)| {
            key.strip_prefix(short.as_str())
                .is_some_and(|rest| rest.starts_with(' '))
        })
        .max_by_key(|(short, _)| short.len());

    match best {
        Some((short, full)) => Cow::Owned(format!("{}{}", full, &key[short.len()..])),
        None => Cow::Borrowed(key),
    }
}

fn resolve_with(table: &RuleTable, key: &str) -> Resolution {
    let key = key.trim().to_lowercase();
    let expanded = expand_abbreviation(table, &key);
    let padded = format!(" {} ", expanded);

    let subcategory_for = |category: &Category| {
        table
            .subcategories
            .iter()
            .filter(|rule| rule.category == category.as_str())
            .find(|rule| rule.keywords.iter().any(|k| padded.contains(k.as_str())))
            .map(|rule| rule.name.clone())
    };

    // 1. Exact product match
    let exact = table
        .products
        .get(&*expanded)
        .or_else(|| table.products.get(&key));
    if let Some(category) = exact {
        let category = Category::new(category.as_str());
        trace!("'{}' -> {} (exact)", key, category);
        return Resolution {
            subcategory: subcategory_for(&category),
            category,
            matched_by: MatchSource::Exact,
            ambiguity: None,
        };
    }

    // 2. Priority keywords, first hit wins
    for rule in &table.priority_rules {
        if let Some(keyword) = rule.keywords.iter().find(|k| padded.contains(k.as_str())) {
            let category = Category::new(rule.category.as_str());
            trace!("'{}' -> {} (priority '{}')", key, category, keyword);
            return Resolution {
                subcategory: subcategory_for(&category),
                category,
                matched_by: MatchSource::Priority {
                    keyword: keyword.clone(),
                },
                ambiguity: None,
            };
        }
    }

    // 3. Ordinary keywords: first category wins, others are reported
    let mut first: Option<(Category, String)> = None;
    let mut candidates: Vec<Category> = Vec::new();
    for rule in &table.keyword_rules {
        if let Some(keyword) = rule.keywords.iter().find(|k| padded.contains(k.as_str())) {
            let category = Category::new(rule.category.as_str());
            if !candidates.contains(&category) {
                candidates.push(category.clone());
            }
            if first.is_none() {
                first = Some((category, keyword.clone()));
            }
        }
    }

    if let Some((category, keyword)) = first {
        let ambiguity = (candidates.len() > 1).then(|| CategorizationAmbiguity {
            product_key: key.clone(),
            chosen: category.clone(),
            candidates,
        });
        trace!("'{}' -> {} (keyword '{}')", key, category, keyword);
        return Resolution {
            subcategory: subcategory_for(&category),
            category,
            matched_by: MatchSource::Keyword { keyword },
            ambiguity,
        };
    }

    Resolution {
        category: Category::uncategorized(),
        subcategory: None,
        matched_by: MatchSource::Fallback,
        ambiguity: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table(json: &str) -> RuleTable {
        RuleTable::from_json(json).unwrap()
    }

    const SMALL: &str = r#"{
        "version": 7,
        "categories": ["Dairy", "Soda", "Sauces & Spices", "Vegetables", "Snacks"],
        "products": { "ah halfvolle melk": "Dairy" },
        "abbreviations": { "ah hv melk": "ah halfvolle melk", "ah hv": "ah halfvolle" },
        "priority_rules": [{ "category": "Snacks", "keywords": ["chips"] }],
        "keyword_rules": [
            { "category": "Vegetables", "keywords": ["tomaten", "paprika"] },
            { "category": "Sauces & Spices", "keywords": ["saus"] },
            { "category": "Dairy", "keywords": ["melk", "yoghurt"] },
            { "category": "Soda", "keywords": ["cola"] }
        ],
        "subcategories": [
            { "category": "Dairy", "name": "Milk", "keywords": ["melk"] }
        ]
    }"#;

    #[test]
    fn test_exact_match_after_abbreviation() {
        let categorizer = Categorizer::new(table(SMALL));
        let resolution = categorizer.resolve("ah hv melk");

        assert_eq!(resolution.category, Category::new("Dairy"));
        assert_eq!(resolution.subcategory.as_deref(), Some("Milk"));
        assert_eq!(resolution.matched_by, MatchSource::Exact);
    }

    #[test]
    fn test_prefix_abbreviation() {
        let t = table(SMALL);
        assert_eq!(expand_abbreviation(&t, "ah hv yoghurt"), "ah halfvolle yoghurt");
        assert_eq!(expand_abbreviation(&t, "ah hvx"), "ah hvx");
    }

    #[test]
    fn test_priority_beats_keywords() {
        let categorizer = Categorizer::new(table(SMALL));
        let resolution = categorizer.resolve("ah paprika chips");

        assert_eq!(resolution.category, Category::new("Snacks"));
        assert_eq!(resolution.ambiguity, None);
    }

    #[test]
    fn test_ambiguous_keywords_first_wins() {
        let categorizer = Categorizer::new(table(SMALL));
        let resolution = categorizer.resolve("ah tomatensaus");

        assert_eq!(resolution.category, Category::new("Vegetables"));
        assert_eq!(
            resolution.ambiguity,
            Some(CategorizationAmbiguity {
                product_key: "ah tomatensaus".to_string(),
                chosen: Category::new("Vegetables"),
                candidates: vec![Category::new("Vegetables"), Category::new("Sauces & Spices")],
            })
        );
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let categorizer = Categorizer::new(table(SMALL));
        for key in ["ah tomatensaus", "melk", "ah cola", "onbekend"] {
            assert_eq!(categorizer.resolve(key), categorizer.resolve(key));
        }
    }

    #[test]
    fn test_unknown_products_recorded_once() {
        let categorizer = Categorizer::new(table(SMALL));
        categorizer.resolve("wc eend");
        categorizer.resolve("wc eend");
        categorizer.resolve("melk");

        assert_eq!(categorizer.unknown_products(), vec!["wc eend".to_string()]);
        assert_eq!(categorizer.resolve("wc eend").category, Category::uncategorized());
    }

    #[test]
    fn test_unknown_tracking_disabled() {
        let categorizer = Categorizer::new(table(SMALL)).with_unknown_tracking(false);
        categorizer.resolve("wc eend");

        assert!(categorizer.unknown_products().is_empty());
    }

    #[test]
    fn test_edits_bump_version_and_apply() {
        let categorizer = Categorizer::new(table(SMALL));
        assert_eq!(categorizer.resolve("ah cola").category, Category::new("Soda"));

        let version = categorizer.set_product("ah cola", "Snacks").unwrap();
        assert_eq!(version, 8);
        assert_eq!(categorizer.resolve("ah cola").category, Category::new("Snacks"));

        assert_eq!(categorizer.add_keyword("Soda", "fanta").unwrap(), 9);
        assert_eq!(categorizer.resolve("fanta zero").category, Category::new("Soda"));

        assert_eq!(categorizer.remove_keyword("Soda", "fanta").unwrap(), 10);
        assert!(categorizer.resolve("fanta zero").category.is_uncategorized());

        assert!(categorizer.set_product("x", "Nope").is_err());
        assert_eq!(categorizer.version(), 10);
    }

    #[test]
    fn test_reload_swaps_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        let categorizer = Categorizer::new(table(SMALL));

        let mut updated = table(SMALL);
        updated.set_product("ah cola", "Snacks").unwrap();
        updated.save(&path).unwrap();

        assert_eq!(categorizer.reload(&path).unwrap(), 8);
        assert_eq!(categorizer.resolve("ah cola").category, Category::new("Snacks"));

        std::fs::write(&path, "{ not json").unwrap();
        assert!(categorizer.reload(&path).is_err());
        assert_eq!(categorizer.version(), 8);
    }

    #[test]
    fn test_default_table_examples() {
        let categorizer = Categorizer::default();

        assert_eq!(categorizer.resolve("melk").category, Category::new("Dairy"));
        assert_eq!(categorizer.resolve("ah cola").category, Category::new("Soda"));
        assert_eq!(categorizer.resolve("trostomaat").category, Category::new("Vegetables"));
        assert_eq!(categorizer.resolve("statiegeld").category, Category::new("Deposit"));

        let beer = categorizer.resolve("leffe blond");
        assert_eq!(beer.category, Category::new("Beer & Wine"));
        assert_eq!(beer.subcategory.as_deref(), Some("Beer"));

        let cheese = categorizer.resolve("gruyere 48+");
        assert_eq!(cheese.category, Category::new("Dairy"));
        assert_eq!(cheese.subcategory.as_deref(), Some("Cheese"));
        assert_eq!(categorizer.resolve("red bull 250ml").category, Category::new("Soda"));
    }

    #[test]
    fn test_learned_abbreviation_resolves() {
        let categorizer = Categorizer::new(table(SMALL));
        assert_eq!(categorizer.resolve("ah yogh").category, Category::uncategorized());

        let version = categorizer.add_abbreviation("AH YOGH", "ah volle yoghurt").unwrap();

        assert_eq!(version, 8);
        let resolution = categorizer.resolve("ah yogh 500g");
        assert_eq!(resolution.category, Category::new("Dairy"));
        assert_eq!(
            resolution.matched_by,
            MatchSource::Keyword {
                keyword: "yoghurt".to_string()
            }
        );
        assert!(matches!(
            categorizer.add_abbreviation("ah yogh", " "),
            Err(RuleError::EmptyAbbreviation)
        ));
        assert_eq!(categorizer.version(), 8);
    }
}
