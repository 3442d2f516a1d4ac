//! package.json parser

use indexmap::IndexMap;
use tracing::{debug, warn};
use tree_sitter::Node;

use crate::parser::traits::{ManifestParser, ParseError};
use crate::parser::types::Dependency;

/// Parser for package.json files
pub struct PackageJsonParser;

impl PackageJsonParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PackageJsonParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestParser for PackageJsonParser {
    fn can_parse(&self, uri: &str) -> bool {
        uri == "package.json" || uri.ends_with("/package.json") || uri.ends_with("\\package.json")
    }

    fn parse(&self, content: &str) -> Result<Vec<Dependency>, ParseError> {
        let mut parser = tree_sitter::Parser::new();
        let language = tree_sitter_json::LANGUAGE;
        parser.set_language(&language.into()).map_err(|e| {
            warn!("Failed to set JSON language for tree-sitter: {}", e);
            ParseError::TreeSitter(e.to_string())
        })?;

        let tree = parser.parse(content, None).ok_or_else(|| {
            warn!("Failed to parse JSON content");
            ParseError::ParseFailed("Failed to parse JSON".to_string())
        })?;

        let root = tree.root_node();
        if root.has_error() {
            let position = first_error_position(root);
            return Err(ParseError::InvalidSyntax(format!(
                "malformed JSON near line {}, column {}",
                position.row + 1,
                position.column + 1
            )));
        }

        let Some(document) = root.named_child(0).filter(|n| n.kind() == "object") else {
            return Ok(Vec::new());
        };

        let sections = Self::dependency_sections(document, content);
        let mut merged: IndexMap<String, Dependency> = IndexMap::new();

        for field in Self::DEPENDENCY_FIELDS {
            if let Some(section) = sections.get(field) {
                Self::collect_section(*section, content, &mut merged);
            }
        }

        debug!("Extracted {} dependencies from package.json", merged.len());
        Ok(merged.into_values().collect())
    }
}

impl PackageJsonParser {
    /// Dependency field names to extract, in merge order
    const DEPENDENCY_FIELDS: [&'static str; 2] = ["dependencies", "devDependencies"];

    /// Locate the object value of each dependency field (a repeated key keeps its last value)
    fn dependency_sections<'t>(
        document: Node<'t>,
        content: &str,
    ) -> IndexMap<&'static str, Node<'t>> {
        let mut sections = IndexMap::new();
        let mut cursor = document.walk();

        for pair in document.children(&mut cursor) {
            if pair.kind() != "pair" {
                continue;
            }

            let (Some(key_node), Some(value_node)) = (
                pair.child_by_field_name("key"),
                pair.child_by_field_name("value"),
            ) else {
                continue;
            };

            let key = string_value(key_node, content);
            let Some(field) = Self::DEPENDENCY_FIELDS.iter().find(|f| **f == key) else {
                continue;
            };

            if value_node.kind() == "object" {
                sections.insert(*field, value_node);
            } else {
                sections.shift_remove(field);
            }
        }

        sections
    }

    /// Merge one section into `merged`: an existing name keeps its position and takes the new range
    fn collect_section(section: Node, content: &str, merged: &mut IndexMap<String, Dependency>) {
        let mut cursor = section.walk();

        for pair in section.children(&mut cursor) {
            if pair.kind() != "pair" {
                continue;
            }

            let (Some(key_node), Some(value_node)) = (
                pair.child_by_field_name("key"),
                pair.child_by_field_name("value"),
            ) else {
                continue;
            };

            if value_node.kind() != "string" {
                continue;
            }

            let key = string_value(key_node, content);
            let raw_range = string_value(value_node, content);
            let (name, range) = match parse_npm_alias(&raw_range) {
                Some(alias) => alias,
                None => (key.clone(), raw_range),
            };

            let start = value_node.start_position();
            // The range starts after the opening quote
            merged.insert(key, Dependency::new(name, range, start.row, start.column + 1));
        }
    }
}

/// Split an npm alias (`npm:pkg@range`, `npm:@scope/pkg@range`) into name and range
///
/// An alias without a range resolves to `latest`.
fn parse_npm_alias(value: &str) -> Option<(String, String)> {
    let target = value.strip_prefix("npm:")?;

    // Skip the scope marker so its `@` is not taken as the range separator
    let search_from = if target.starts_with('@') {
        target.find('/')? + 1
    } else {
        0
    };

    match target[search_from..].find('@') {
        Some(at) => {
            let split = search_from + at;
            Some((target[..split].to_string(), target[split + 1..].to_string()))
        }
        None => Some((target.to_string(), "latest".to_string())),
    }
}

/// Get the text of a string node without its surrounding quotes
fn string_value(node: Node, content: &str) -> String {
    content[node.byte_range()]
        .trim()
        .trim_start_matches('"')
        .trim_end_matches('"')
        .to_string()
}

fn first_error_position(node: Node) -> tree_sitter::Point {
    if node.is_error() || node.is_missing() {
        return node.start_position();
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error() {
            return first_error_position(child);
        }
    }
    node.start_position()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn parse_extracts_dependencies() {
        let parser = PackageJsonParser::new();
        let content = r#"{
  "name": "my-app",
  "dependencies": {
    "lodash": "4.17.21"
  }
}"#;
        let result = parser.parse(content).unwrap();
        assert_eq!(result, vec![Dependency::new("lodash", "4.17.21", 3, 15)]);
    }

    #[test]
    fn parse_extracts_dev_dependencies() {
        let parser = PackageJsonParser::new();
        let content = r#"{
  "name": "my-app",
  "devDependencies": {
    "typescript": "^5.0.0"
  }
}"#;
        let result = parser.parse(content).unwrap();
        assert_eq!(result, vec![Dependency::new("typescript", "^5.0.0", 3, 19)]);
        assert_eq!(result[0].clean_version, "5.0.0");
    }

    #[test]
    fn parse_ignores_peer_and_optional_dependencies() {
        let parser = PackageJsonParser::new();
        let content = r#"{
  "peerDependencies": {
    "react": ">=16.8.0"
  },
  "optionalDependencies": {
    "fsevents": "2.3.3"
  }
}"#;
        assert!(parser.parse(content).unwrap().is_empty());
    }

    #[test]
    fn parse_handles_version_ranges() {
        let parser = PackageJsonParser::new();
        let content = r#"{
  "name": "my-app",
  "dependencies": {
    "lodash": "^4.17.21",
    "express": "~4.18.0",
    "uuid": ">=9.0.0"
  }
}"#;
        let result = parser.parse(content).unwrap();
        assert_eq!(
            result,
            vec![
                Dependency::new("lodash", "^4.17.21", 3, 15),
                Dependency::new("express", "~4.18.0", 4, 16),
                Dependency::new("uuid", ">=9.0.0", 5, 13),
            ]
        );
        let cleaned: Vec<&str> = result.iter().map(|d| d.clean_version.as_str()).collect();
        assert_eq!(cleaned, vec!["4.17.21", "4.18.0", ">=9.0.0"]);
    }

    #[test]
    fn parse_handles_scoped_packages() {
        let parser = PackageJsonParser::new();
        let content = r#"{
  "name": "my-app",
  "dependencies": {
    "@types/node": "20.0.0",
    "@babel/core": "7.22.0"
  }
}"#;
        let result = parser.parse(content).unwrap();
        assert_eq!(
            result,
            vec![
                Dependency::new("@types/node", "20.0.0", 3, 20),
                Dependency::new("@babel/core", "7.22.0", 4, 20),
            ]
        );
    }

    #[test]
    fn parse_reads_dependencies_before_dev_dependencies_regardless_of_file_order() {
        let parser = PackageJsonParser::new();
        let content = r#"{
  "devDependencies": {
    "typescript": "5.0.0"
  },
  "dependencies": {
    "lodash": "4.17.21"
  }
}"#;
        let names: Vec<String> = parser
            .parse(content)
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["lodash", "typescript"]);
    }

    #[test]
    fn parse_merges_duplicate_names_keeping_first_position_and_later_range() {
        let parser = PackageJsonParser::new();
        let content = r#"{
  "dependencies": {
    "a": "1.0.0",
    "b": "^2.0.0"
  },
  "devDependencies": {
    "a": "~1.5.0",
    "c": "3.0.0"
  }
}"#;
        let result = parser.parse(content).unwrap();
        assert_eq!(
            result,
            vec![
                Dependency::new("a", "~1.5.0", 6, 10),
                Dependency::new("b", "^2.0.0", 3, 10),
                Dependency::new("c", "3.0.0", 7, 10),
            ]
        );
    }

    #[test]
    fn parse_skips_non_string_values() {
        let parser = PackageJsonParser::new();
        let content = r#"{
  "dependencies": {
    "weird": 42,
    "lodash": "4.17.21"
  }
}"#;
        let result = parser.parse(content).unwrap();
        assert_eq!(result, vec![Dependency::new("lodash", "4.17.21", 3, 15)]);
    }

    #[test]
    fn parse_returns_empty_for_no_dependencies() {
        let parser = PackageJsonParser::new();
        let content = r#"{
  "name": "my-app",
  "version": "1.0.0"
}"#;
        assert!(parser.parse(content).unwrap().is_empty());
    }

    #[rstest]
    #[case(r#"{ "dependencies": { "lodash": "4.17.21" "#)]
    #[case(r#"{ "dependencies": { "lodash" "4.17.21" } }"#)]
    #[case("not json at all")]
    fn parse_rejects_invalid_json(#[case] content: &str) {
        let parser = PackageJsonParser::new();
        assert!(matches!(
            parser.parse(content),
            Err(ParseError::InvalidSyntax(_))
        ));
    }

    #[test]
    fn parse_extracts_npm_alias() {
        let parser = PackageJsonParser::new();
        let content = r#"{
  "dependencies": {
    "vite": "npm:rolldown-vite@7.2.2"
  }
}"#;
        let result = parser.parse(content).unwrap();
        assert_eq!(
            result,
            vec![Dependency::new("rolldown-vite", "7.2.2", 2, 13)]
        );
    }

    #[rstest]
    #[case("npm:rolldown-vite@7.2.2", Some(("rolldown-vite", "7.2.2")))]
    #[case("npm:@org/pkg@^1.0.0", Some(("@org/pkg", "^1.0.0")))]
    #[case("npm:npm-package-arg", Some(("npm-package-arg", "latest")))]
    #[case("npm:@org/pkg", Some(("@org/pkg", "latest")))]
    #[case("^1.0.0", None)]
    fn parse_npm_alias_splits_name_and_range(
        #[case] value: &str,
        #[case] expected: Option<(&str, &str)>,
    ) {
        let expected = expected.map(|(n, r)| (n.to_string(), r.to_string()));
        assert_eq!(parse_npm_alias(value), expected);
    }

    #[rstest]
    #[case("file:///project/package.json", true)]
    #[case("package.json", true)]
    #[case("C:\\project\\package.json", true)]
    #[case("/project/package-lock.json", false)]
    #[case("/project/deno.json", false)]
    fn can_parse_matches_package_json(#[case] uri: &str, #[case] expected: bool) {
        assert_eq!(PackageJsonParser::new().can_parse(uri), expected);
    }
}
