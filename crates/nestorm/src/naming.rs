//! Naming conventions used to infer foreign keys and junction tables.

use heck::ToLowerCamelCase;
use std::fmt;

/// Pluggable naming convention.
///
/// The relationship resolver never hard-codes column names: default foreign keys and
/// junction tables come from here, and a descriptor may carry its own strategy.
/// Descriptors hold their strategy in an `Arc` so table definitions stay `Send + Sync`.
pub trait NamingStrategy: Send + Sync + fmt::Debug {
    /// `users` -> `user`
    fn singularize(&self, word: &str) -> String;

    /// `blog_post` -> `blogPost`
    fn camelize(&self, word: &str) -> String;

    /// Suffix appended to foreign key names.
    fn reference_suffix(&self) -> &str;

    /// Foreign key referencing `table`: `camelize(singularize(table)) + suffix`.
    fn foreign_key(&self, table: &str) -> String {
        format!(
            "{}{}",
            self.camelize(&self.singularize(table)),
            self.reference_suffix()
        )
    }

    /// Junction table linking `a` and `b`: both names sorted and joined by `_`.
    fn junction_table(&self, a: &str, b: &str) -> String {
        if a <= b {
            format!("{a}_{b}")
        } else {
            format!("{b}_{a}")
        }
    }
}

const IRREGULAR: &[(&str, &str)] = &[
    ("movies", "movie"),
    ("cookies", "cookie"),
    ("series", "series"),
    ("people", "person"),
    ("children", "child"),
];

/// English-ish default convention with a configurable reference suffix (`_id`).
#[derive(Debug, Clone)]
pub struct DefaultNaming {
    reference_suffix: String,
}

impl Default for DefaultNaming {
    fn default() -> Self {
        Self {
            reference_suffix: "_id".to_string(),
        }
    }
}

impl DefaultNaming {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the foreign key suffix.
    pub fn reference_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.reference_suffix = suffix.into();
        self
    }
}

impl NamingStrategy for DefaultNaming {
    fn singularize(&self, word: &str) -> String {
        let lower = word.to_ascii_lowercase();
        let strip = |n: usize| word[..word.len() - n].to_string();

        for (plural, singular) in IRREGULAR {
            if lower.ends_with(plural) {
                return format!("{}{singular}", strip(plural.len()));
            }
        }

        if lower.ends_with("ies") && word.len() > 3 {
            return format!("{}y", strip(3));
        }
        if ["sses", "shes", "ches", "xes", "zes"]
            .iter()
            .any(|suffix| lower.ends_with(suffix))
        {
            return strip(2);
        }
        if lower.ends_with("ss") || lower.ends_with("us") || lower.ends_with("is") {
            return word.to_string();
        }
        if lower.ends_with('s') && word.len() > 1 {
            return strip(1);
        }
        word.to_string()
    }

    fn camelize(&self, word: &str) -> String {
        word.to_lower_camel_case()
    }

    fn reference_suffix(&self) -> &str {
        &self.reference_suffix
    }
}
