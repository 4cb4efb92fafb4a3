//! `{{variable}}` placeholder resolution for action parameters

use regex::{Captures, Regex};
use std::collections::{BTreeMap, HashMap};

/// Resolves `{{name}}` placeholders against instance variables
///
/// Unknown variables collapse to the empty string, so no literal placeholder
/// ever reaches a handler.
#[derive(Debug, Clone)]
pub struct TemplateResolver {
    placeholder_regex: Regex,
}

impl TemplateResolver {
    /// Create a resolver with the placeholder pattern compiled
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            placeholder_regex: Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}")?,
        })
    }

    /// Substitute every placeholder in a single string
    pub fn resolve_str(&self, input: &str, variables: &HashMap<String, String>) -> String {
        if !input.contains("{{") {
            return input.to_string();
        }
        self.placeholder_regex
            .replace_all(input, |caps: &Captures| {
                variables.get(&caps[1]).cloned().unwrap_or_default()
            })
            .into_owned()
    }

    /// Substitute placeholders in every parameter value
    pub fn resolve_params(
        &self,
        params: &BTreeMap<String, String>,
        variables: &HashMap<String, String>,
    ) -> BTreeMap<String, String> {
        params
            .iter()
            .map(|(key, value)| (key.clone(), self.resolve_str(value, variables)))
            .collect()
    }
}

impl Default for TemplateResolver {
    fn default() -> Self {
        Self::new().expect("Failed to compile placeholder pattern")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variables(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_resolves_multiple_placeholders_in_one_value() {
        let resolver = TemplateResolver::new().unwrap();
        let mut params = BTreeMap::new();
        params.insert("text".to_string(), "Hi {{first}} {{last}}".to_string());

        let resolved =
            resolver.resolve_params(&params, &variables(&[("first", "Jane"), ("last", "Doe")]));
        assert_eq!(resolved["text"], "Hi Jane Doe");
    }

    #[test]
    fn test_missing_variable_collapses_to_empty() {
        let resolver = TemplateResolver::new().unwrap();
        assert_eq!(resolver.resolve_str("Hello, {{name}}!", &HashMap::new()), "Hello, !");
    }

    #[test]
    fn test_whitespace_inside_braces() {
        let resolver = TemplateResolver::new().unwrap();
        let vars = variables(&[("city", "Oslo")]);
        assert_eq!(resolver.resolve_str("In {{ city }}", &vars), "In Oslo");
    }

    #[test]
    fn test_text_without_placeholders_is_unchanged() {
        let resolver = TemplateResolver::new().unwrap();
        let vars = variables(&[("a", "b")]);
        assert_eq!(resolver.resolve_str("plain {text}", &vars), "plain {text}");
    }

    #[test]
    fn test_values_are_not_re_expanded() {
        let resolver = TemplateResolver::new().unwrap();
        let vars = variables(&[("a", "{{b}}"), ("b", "nope")]);
        assert_eq!(resolver.resolve_str("{{a}}", &vars), "{{b}}");
    }
}
