//! The markdown-splitter contract (spec §6, SPEC_FULL §6). The real
//! splitter is out of scope for this crate; this module defines the seam
//! and a default implementation sufficient for the shapes spec §1
//! describes, so the loader can be exercised without a richer splitter
//! plugged in.

use snapsql_helpers::IndexMap;

/// `{frontmatter-map, parameters-YAML-text, body-SQL-text}` (spec §6).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SplitMarkdown {
    pub frontmatter: IndexMap<String, String>,
    pub parameters_yaml: String,
    pub sql_body: String,
}

pub trait MarkdownSplit {
    fn split(input: &str) -> SplitMarkdown;
}

/// Default splitter: recognizes a leading `---\n<yaml>\n---` frontmatter
/// block and a `## Parameters` heading introducing a fenced YAML block;
/// everything else is treated as the SQL body.
pub struct DefaultMarkdownSplitter;

impl MarkdownSplit for DefaultMarkdownSplitter {
    fn split(input: &str) -> SplitMarkdown {
        let mut rest = input;
        let mut frontmatter = IndexMap::default();

        if let Some(after_open) = rest.strip_prefix("---\n") {
            if let Some(close_idx) = after_open.find("\n---") {
                let yaml_text = &after_open[..close_idx];
                if let Ok(doc) = serde_yaml::from_str::<serde_yaml::Value>(yaml_text) {
                    if let Some(map) = doc.as_mapping() {
                        for (k, v) in map.iter() {
                            if let (Some(k), Some(v)) = (k.as_str(), v.as_str()) {
                                frontmatter.insert(k.to_string(), v.to_string());
                            }
                        }
                    }
                }
                let after_close = &after_open[close_idx + "\n---".len()..];
                rest = after_close.trim_start_matches('\n');
            }
        }

        let mut parameters_yaml = String::new();
        let mut sql_body = rest.to_string();

        if let Some(heading_idx) = rest.find("## Parameters") {
            let after_heading = &rest[heading_idx + "## Parameters".len()..];
            if let Some(fence_start) = after_heading.find("```yaml") {
                let after_fence = &after_heading[fence_start + "```yaml".len()..];
                if let Some(fence_end) = after_fence.find("```") {
                    parameters_yaml = after_fence[..fence_end].trim().to_string();
                    let before = &rest[..heading_idx];
                    let after = &after_fence[fence_end + 3..];
                    sql_body = format!("{before}{after}");
                }
            }
        }

        SplitMarkdown {
            frontmatter,
            parameters_yaml,
            sql_body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_frontmatter_and_parameters_block() {
        let input = "---\nname: get_user\n---\n## Parameters\n```yaml\nuser_id: int\n```\nSELECT 1\n";
        let split = DefaultMarkdownSplitter::split(input);
        assert_eq!(split.frontmatter.get("name"), Some(&"get_user".to_string()));
        assert_eq!(split.parameters_yaml, "user_id: int");
        assert_eq!(split.sql_body.trim(), "SELECT 1");
    }

    #[test]
    fn plain_sql_with_no_markdown_structure_passes_through() {
        let input = "SELECT 1\n";
        let split = DefaultMarkdownSplitter::split(input);
        assert!(split.frontmatter.is_empty());
        assert!(split.parameters_yaml.is_empty());
        assert_eq!(split.sql_body, input);
    }
}
