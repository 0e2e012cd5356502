//! Skills type definitions.

use serde::{Deserialize, Serialize};

/// Loaded skill model.
#[derive(Debug, Clone)]
pub struct Skill {
    /// Skill name.
    pub name: String,
    /// Short description.
    pub description: String,
    /// Absolute path to `SKILL.md`.
    pub path: String,
    /// Source type: `workspace` or `builtin`.
    pub source: String,
    /// Parsed frontmatter metadata.
    pub metadata: SkillMetadata,
    /// Markdown body content.
    pub content: String,
}

/// Skill listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillInfo {
    pub name: String,
    pub path: String,
    /// `workspace` or `builtin`.
    pub source: String,
}

/// Parsed frontmatter metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillMetadata {
    pub name: String,
    pub description: String,
    /// Inject the full skill body into every system prompt.
    pub always: bool,
    pub requires: SkillRequirements,
    /// Namespaced extension block; `metadata.femtoclaw` may carry
    /// `always` and `requires` as well.
    pub metadata: Option<serde_json::Value>,
}

/// Requirement model for a skill.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SkillRequirements {
    /// Required binaries in `PATH` (all must be present).
    pub bins: Vec<String>,
    /// Required environment variables.
    pub env: Vec<String>,
}

/// The `metadata.femtoclaw` extension block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct FemtoMetadata {
    pub always: bool,
    pub requires: SkillRequirements,
}
