//! Declarative pipeline items and pipeline file loading.
//!
//! A pipeline is an ordered list of items. Each item is either a plain step or
//! a debate group whose members take turns for a number of rounds:
//!
//! ```yaml
//! name: investment-debate
//! items:
//!   - id: market
//!     text: Market analyst
//!     ability: market_analyst
//!     inputs: [company_of_interest, trade_date]
//!     outputs: [market_report]
//!   - group: research
//!     rounds: 2
//!     memory: { strategy: history }
//!     members:
//!       - { id: bull, text: Bull researcher, ability: bull_researcher,
//!           inputs: [market_report, investment_debate_state],
//!           outputs: [investment_debate_state], order: 1 }
//!       - { id: bear, text: Bear researcher, ability: bear_researcher,
//!           inputs: [market_report, investment_debate_state],
//!           outputs: [investment_debate_state], order: 2 }
//! ```

use anyhow::{Context, Result};
use council_common::MemoryConfig;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

/// A plain step: one ability invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub text: String,
    pub ability: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryConfig>,
}

impl Step {
    pub fn new(id: &str, text: &str, ability: &str, inputs: &[&str], outputs: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            text: text.to_string(),
            ability: ability.to_string(),
            inputs: to_strings(inputs),
            outputs: to_strings(outputs),
            memory: None,
        }
    }

    pub fn with_memory(mut self, memory: MemoryConfig) -> Self {
        self.memory = Some(memory);
        self
    }
}

/// One viewpoint in a debate group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateMember {
    pub id: String,
    pub text: String,
    pub ability: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Position within a round; ties fall back to declaration order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i32>,
    /// Member-level round count, only consulted when the group declares none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rounds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryConfig>,
}

impl DebateMember {
    pub fn new(id: &str, text: &str, ability: &str, inputs: &[&str], outputs: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            text: text.to_string(),
            ability: ability.to_string(),
            inputs: to_strings(inputs),
            outputs: to_strings(outputs),
            order: None,
            rounds: None,
            memory: None,
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_rounds(mut self, rounds: u32) -> Self {
        self.rounds = Some(rounds);
        self
    }

    pub fn with_memory(mut self, memory: MemoryConfig) -> Self {
        self.memory = Some(memory);
        self
    }
}

/// Several members that each speak once per round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateGroup {
    pub group: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rounds: Option<u32>,
    pub members: Vec<DebateMember>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryConfig>,
}

impl DebateGroup {
    pub fn new(group: &str, members: Vec<DebateMember>) -> Self {
        Self {
            group: group.to_string(),
            rounds: None,
            members,
            memory: None,
        }
    }

    pub fn with_rounds(mut self, rounds: u32) -> Self {
        self.rounds = Some(rounds);
        self
    }

    pub fn with_memory(mut self, memory: MemoryConfig) -> Self {
        self.memory = Some(memory);
        self
    }
}

/// A pipeline item. Debate groups are recognised by their `group` key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PipelineItem {
    Debate(DebateGroup),
    Step(Step),
}

impl<'de> Deserialize<'de> for PipelineItem {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;

        let value = serde_json::Value::deserialize(deserializer)?;
        let Some(fields) = value.as_object() else {
            return Err(D::Error::custom("pipeline item must be a mapping"));
        };

        if let Some(group) = fields.get("group") {
            let label = group.as_str().unwrap_or("?").to_string();
            serde_json::from_value(value)
                .map(PipelineItem::Debate)
                .map_err(|e| D::Error::custom(format!("debate group '{}': {}", label, e)))
        } else {
            let label = fields
                .get("id")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("?")
                .to_string();
            serde_json::from_value(value)
                .map(PipelineItem::Step)
                .map_err(|e| D::Error::custom(format!("step '{}': {}", label, e)))
        }
    }
}

impl From<Step> for PipelineItem {
    fn from(step: Step) -> Self {
        PipelineItem::Step(step)
    }
}

impl From<DebateGroup> for PipelineItem {
    fn from(group: DebateGroup) -> Self {
        PipelineItem::Debate(group)
    }
}

/// On-disk pipeline declaration (`pipeline.yaml` or `pipeline.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineFile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Field names beyond the built-in investment schema this pipeline uses.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_fields: Vec<String>,
    pub items: Vec<PipelineItem>,
}

impl PipelineFile {
    /// Load a pipeline file; `.json` is parsed as JSON, anything else as YAML.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file: {}", path.display()))?;

        if is_json(path) {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse pipeline JSON: {}", path.display()))
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse pipeline YAML: {}", path.display()))
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = if is_json(path) {
            serde_json::to_string_pretty(self).context("Failed to serialize pipeline to JSON")?
        } else {
            serde_yaml::to_string(self).context("Failed to serialize pipeline to YAML")?
        };

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write pipeline file: {}", path.display()))?;

        Ok(())
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "json")
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use council_common::MemoryStrategy;
    use tempfile::tempdir;

    #[test]
    fn test_untagged_items_parse_by_shape() {
        let json = r#"[
            {"id": "a", "text": "A", "ability": "x", "inputs": ["trade_date"], "outputs": ["market_report"]},
            {"group": "g", "rounds": 2, "members": [
                {"id": "m", "text": "M", "ability": "y", "order": 1}
            ]}
        ]"#;
        let items: Vec<PipelineItem> = serde_json::from_str(json).unwrap();
        assert!(matches!(&items[0], PipelineItem::Step(s) if s.id == "a"));
        match &items[1] {
            PipelineItem::Debate(g) => {
                assert_eq!(g.rounds, Some(2));
                assert_eq!(g.members[0].order, Some(1));
                assert!(g.members[0].inputs.is_empty());
            }
            other => panic!("Expected debate group, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_group_member_reports_missing_field() {
        let yaml = r#"
name: test
items:
  - group: research
    members:
      - { id: bull, text: Bull }
"#;
        let err = serde_yaml::from_str::<PipelineFile>(yaml).unwrap_err().to_string();
        assert!(err.contains("debate group 'research'"), "{}", err);
        assert!(err.contains("ability"), "{}", err);
    }

    #[test]
    fn test_bad_step_names_the_step() {
        let json = r#"[{"id": "market", "text": "Market"}]"#;
        let err = serde_json::from_str::<Vec<PipelineItem>>(json).unwrap_err().to_string();
        assert!(err.contains("step 'market'"), "{}", err);
        assert!(err.contains("missing field `ability`"), "{}", err);

        let err = serde_json::from_str::<Vec<PipelineItem>>("[3]").unwrap_err().to_string();
        assert!(err.contains("mapping"), "{}", err);
    }

    #[test]
    fn test_yaml_memory_block() {
        let yaml = r#"
name: test
items:
  - group: research
    memory: { strategy: history }
    members:
      - { id: bull, text: Bull, ability: bull_researcher, memory: { strategy: situation, topK: 4 } }
"#;
        let file: PipelineFile = serde_yaml::from_str(yaml).unwrap();
        let PipelineItem::Debate(group) = &file.items[0] else {
            panic!("Expected debate group");
        };
        assert_eq!(group.memory.unwrap().strategy, MemoryStrategy::History);
        assert_eq!(group.members[0].memory.unwrap().top_k, Some(4));
    }

    #[test]
    fn test_save_and_load_both_formats() {
        let dir = tempdir().unwrap();
        let file = PipelineFile {
            name: "demo".into(),
            description: Some("two steps".into()),
            extra_fields: vec![],
            items: vec![
                Step::new("a", "A", "x", &[], &["market_report"]).into(),
                DebateGroup::new("g", vec![DebateMember::new("m", "M", "y", &[], &[])])
                    .with_rounds(3)
                    .into(),
            ],
        };

        for name in ["pipeline.yaml", "pipeline.json"] {
            let path = dir.path().join(name);
            file.save(&path).unwrap();
            let loaded = PipelineFile::load(&path).unwrap();
            assert_eq!(loaded.name, "demo");
            assert_eq!(loaded.items, file.items);
        }
    }

    #[test]
    fn test_load_missing_file_has_context() {
        let err = PipelineFile::load(Path::new("/nonexistent/pipeline.yaml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read pipeline file"));
    }
}
