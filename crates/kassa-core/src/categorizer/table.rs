//! Versioned category rule table (rules as data).

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::RuleError;
use crate::models::category::UNCATEGORIZED;

/// Rule table shipped with the binary.
const DEFAULT_RULES: &str = include_str!("../../data/default_rules.json");

/// Keywords that map onto one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub category: String,
    pub keywords: Vec<String>,
}

/// Keywords that select a subcategory within a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubcategoryRule {
    pub category: String,
    pub name: String,
    pub keywords: Vec<String>,
}

/// Product key to category mapping.
///
/// Matching order: `products` (exact key), `priority_rules`, `keyword_rules`.
/// Rule lists are ordered; the first match wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTable {
    /// Bumped on every edit.
    pub version: u32,

    /// Declared category labels.
    pub categories: Vec<String>,

    /// Exact product key matches.
    #[serde(default)]
    pub products: BTreeMap<String, String>,

    /// Receipt short names and their full product keys.
    #[serde(default)]
    pub abbreviations: BTreeMap<String, String>,

    /// Keyword rules checked before the ordinary ones.
    #[serde(default)]
    pub priority_rules: Vec<KeywordRule>,

    #[serde(default)]
    pub keyword_rules: Vec<KeywordRule>,

    #[serde(default)]
    pub subcategories: Vec<SubcategoryRule>,
}

impl RuleTable {
    /// The embedded default table.
    pub fn default_table() -> Self {
        Self::from_json(DEFAULT_RULES).unwrap_or_else(|_| Self::empty())
    }

    /// A table with no rules: everything resolves to the fallback category.
    pub fn empty() -> Self {
        Self {
            version: 1,
            categories: vec![UNCATEGORIZED.to_string()],
            products: BTreeMap::new(),
            abbreviations: BTreeMap::new(),
            priority_rules: Vec::new(),
            keyword_rules: Vec::new(),
            subcategories: Vec::new(),
        }
    }

    /// Parse and validate a table from JSON.
    pub fn from_json(json: &str) -> Result<Self, RuleError> {
        let mut table: RuleTable = serde_json::from_str(json)?;
        table.normalize();
        table.validate()?;
        Ok(table)
    }

    /// Load rules from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, RuleError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Save the table as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), RuleError> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Every referenced category must be declared.
    pub fn validate(&self) -> Result<(), RuleError> {
        let declared: BTreeSet<&str> = self.categories.iter().map(String::as_str).collect();
        let check = |category: &str| {
            if category == UNCATEGORIZED || declared.contains(category) {
                Ok(())
            } else {
                Err(RuleError::UnknownCategory(category.to_string()))
            }
        };

        for category in self.products.values() {
            check(category)?;
        }
        for rule in self.priority_rules.iter().chain(&self.keyword_rules) {
            check(&rule.category)?;
            if rule.keywords.iter().any(|k| k.trim().is_empty()) {
                return Err(RuleError::EmptyKeyword);
            }
        }
        for rule in &self.subcategories {
            check(&rule.category)?;
        }
        Ok(())
    }

    /// Whether a category is declared (the fallback always is).
    pub fn has_category(&self, category: &str) -> bool {
        category == UNCATEGORIZED || self.categories.iter().any(|c| c == category)
    }

    /// Ordinary keywords per category, in table order.
    pub fn keywords(&self) -> Vec<(&str, Vec<&str>)> {
        let mut grouped: Vec<(&str, Vec<&str>)> = Vec::new();
        for rule in &self.keyword_rules {
            let words = rule.keywords.iter().map(String::as_str);
            match grouped.iter_mut().find(|(c, _)| *c == rule.category) {
                Some((_, existing)) => existing.extend(words),
                None => grouped.push((rule.category.as_str(), words.collect())),
            }
        }
        grouped
    }

    /// Map a product key to a category.
    pub fn set_product(&mut self, key: &str, category: &str) -> Result<(), RuleError> {
        if !self.has_category(category) {
            return Err(RuleError::UnknownCategory(category.to_string()));
        }
        self.products
            .insert(key.trim().to_lowercase(), category.to_string());
        self.version += 1;
        Ok(())
    }

    /// Add an ordinary keyword to a category.
    pub fn add_keyword(&mut self, category: &str, keyword: &str) -> Result<(), RuleError> {
        let keyword = keyword.to_lowercase();
        if keyword.trim().is_empty() {
            return Err(RuleError::EmptyKeyword);
        }
        if !self.has_category(category) {
            return Err(RuleError::UnknownCategory(category.to_string()));
        }

        let exists = self
            .keyword_rules
            .iter()
            .any(|r| r.category == category && r.keywords.contains(&keyword));
        if exists {
            return Err(RuleError::DuplicateKeyword {
                category: category.to_string(),
                keyword,
            });
        }

        match self.keyword_rules.iter_mut().find(|r| r.category == category) {
            Some(rule) => rule.keywords.push(keyword),
            None => self.keyword_rules.push(KeywordRule {
                category: category.to_string(),
                keywords: vec![keyword],
            }),
        }
        self.version += 1;
        Ok(())
    }

    /// Remove an ordinary keyword from a category.
    pub fn remove_keyword(&mut self, category: &str, keyword: &str) -> Result<(), RuleError> {
        let keyword = keyword.to_lowercase();
        let mut removed = false;
        for rule in self.keyword_rules.iter_mut().filter(|r| r.category == category) {
            let before = rule.keywords.len();
            rule.keywords.retain(|k| *k != keyword);
            removed |= rule.keywords.len() != before;
        }

        if !removed {
            return Err(RuleError::MissingKeyword {
                category: category.to_string(),
                keyword,
            });
        }
        self.keyword_rules.retain(|r| !r.keywords.is_empty());
        self.version += 1;
        Ok(())
    }

    /// Teach a receipt short name, replacing any earlier expansion.
    pub fn add_abbreviation(&mut self, short: &str, full: &str) -> Result<(), RuleError> {
        let short = short.trim().to_lowercase();
        let full = full.trim().to_lowercase();
        if short.is_empty() || full.is_empty() {
            return Err(RuleError::EmptyAbbreviation);
        }
        self.abbreviations.insert(short, full);
        self.version += 1;
        Ok(())
    }

    /// Keys and keywords are matched lowercase.
    fn normalize(&mut self) {
        self.products = std::mem::take(&mut self.products)
            .into_iter()
            .map(|(k, v)| (k.trim().to_lowercase(), v))
            .collect();
        self.abbreviations = std::mem::take(&mut self.abbreviations)
            .into_iter()
            .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_lowercase()))
            .collect();
        for rule in self.priority_rules.iter_mut().chain(self.keyword_rules.iter_mut()) {
            for keyword in &mut rule.keywords {
                *keyword = keyword.to_lowercase();
            }
        }
        for rule in &mut self.subcategories {
            for keyword in &mut rule.keywords {
                *keyword = keyword.to_lowercase();
            }
        }
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::default_table()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_embedded_table_is_valid() {
        let table = RuleTable::from_json(DEFAULT_RULES).unwrap();

        assert_eq!(table.version, 1);
        assert!(table.has_category("Dairy"));
        assert!(table.has_category("Soda"));
        assert!(!table.keyword_rules.is_empty());
    }

    #[test]
    fn test_unknown_category_rejected() {
        let json = r#"{
            "version": 1,
            "categories": ["Dairy"],
            "keyword_rules": [{ "category": "Dranken", "keywords": ["cola"] }]
        }"#;

        assert!(matches!(
            RuleTable::from_json(json),
            Err(RuleError::UnknownCategory(c)) if c == "Dranken"
        ));
    }

    #[test]
    fn test_keys_are_lowercased() {
        let json = r#"{
            "version": 3,
            "categories": ["Dairy"],
            "products": { "AH Halfvolle Melk": "Dairy" },
            "keyword_rules": [{ "category": "Dairy", "keywords": ["MELK"] }]
        }"#;
        let table = RuleTable::from_json(json).unwrap();

        assert!(table.products.contains_key("ah halfvolle melk"));
        assert_eq!(table.keyword_rules[0].keywords, vec!["melk"]);
    }

    #[test]
    fn test_keyword_edits_bump_version() {
        let mut table = RuleTable::empty();
        table.categories.push("Soda".to_string());

        table.add_keyword("Soda", "Cola").unwrap();
        assert_eq!(table.version, 2);
        assert_eq!(table.keywords(), vec![("Soda", vec!["cola"])]);

        assert!(matches!(
            table.add_keyword("Soda", "cola"),
            Err(RuleError::DuplicateKeyword { .. })
        ));
        assert!(matches!(
            table.add_keyword("Beer", "bier"),
            Err(RuleError::UnknownCategory(_))
        ));

        table.remove_keyword("Soda", "cola").unwrap();
        assert_eq!(table.version, 3);
        assert!(table.keyword_rules.is_empty());
        assert!(matches!(
            table.remove_keyword("Soda", "cola"),
            Err(RuleError::MissingKeyword { .. })
        ));
    }

    #[test]
    fn test_add_abbreviation() {
        let mut table = RuleTable::empty();

        table.add_abbreviation(" AH SPEKJ ", "AH Spekjes").unwrap();
        assert_eq!(table.version, 2);
        assert_eq!(table.abbreviations.get("ah spekj").map(String::as_str), Some("ah spekjes"));

        table.add_abbreviation("ah spekj", "ah spekblokjes").unwrap();
        assert_eq!(table.version, 3);
        assert_eq!(table.abbreviations.len(), 1);
        assert_eq!(
            table.abbreviations.get("ah spekj").map(String::as_str),
            Some("ah spekblokjes")
        );

        assert!(matches!(
            table.add_abbreviation("  ", "ah spekjes"),
            Err(RuleError::EmptyAbbreviation)
        ));
        assert_eq!(table.version, 3);
    }

    #[test]
    fn test_default_abbreviations() {
        let table = RuleTable::default_table();
        for (short, full) in [
            ("leffe", "leffe bier"),
            ("red bull", "red bull energy drink"),
            ("paprika geel", "ah paprika geel"),
            ("gruyere", "ah gruyere kaas"),
            ("picard", "picard diepvriesmaaltijd"),
        ] {
            assert_eq!(table.abbreviations.get(short).map(String::as_str), Some(full));
        }
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules").join("rules.json");

        let mut table = RuleTable::default_table();
        table.set_product("ah tomatensoep", "Vegetables").unwrap();
        table.save(&path).unwrap();

        let loaded = RuleTable::from_file(&path).unwrap();
        assert_eq!(loaded, table);
        assert_eq!(loaded.version, 2);
    }
}
