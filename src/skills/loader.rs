//! Skills loader and parser.
//!
//! A skill is a directory holding a `SKILL.md` file with optional YAML
//! frontmatter. Workspace skills shadow builtin skills of the same name.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::warn;

use crate::config::SkillsConfig;

use super::types::{FemtoMetadata, Skill, SkillInfo, SkillMetadata, SkillRequirements};

const BUILTIN_SKILLS_DIR: &str = "skills";

/// Discover and load markdown skills from workspace and builtin directories.
pub struct SkillsLoader {
    workspace_dir: PathBuf,
    builtin_dir: PathBuf,
    always_load: Vec<String>,
    disabled: HashSet<String>,
}

impl SkillsLoader {
    /// Create loader with explicit directories.
    pub fn new(workspace_dir: PathBuf, builtin_dir: Option<PathBuf>) -> Self {
        Self {
            workspace_dir,
            builtin_dir: builtin_dir.unwrap_or_else(default_builtin_skills_dir),
            always_load: Vec::new(),
            disabled: HashSet::new(),
        }
    }

    /// Create a loader from the `skills` config section. Without an explicit
    /// `workspace_dir`, skills are read from `<workspace>/skills`.
    pub fn from_config(config: &SkillsConfig, workspace: &Path) -> Self {
        let workspace_dir = config
            .workspace_dir
            .as_deref()
            .map(crate::config::expand_home)
            .unwrap_or_else(|| workspace.join("skills"));
        let mut loader = Self::new(workspace_dir, None);
        loader.always_load = config.always_load.clone();
        loader.disabled = config.disabled.iter().cloned().collect();
        loader
    }

    pub fn workspace_dir(&self) -> &Path {
        &self.workspace_dir
    }

    /// List known skills sorted by name (`workspace` overrides `builtin`).
    /// Disabled skills are never listed.
    pub fn list_skills(&self, filter_unavailable: bool) -> Vec<SkillInfo> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();

        collect_skill_infos(&self.workspace_dir, "workspace", &mut out, &mut seen);
        collect_skill_infos(&self.builtin_dir, "builtin", &mut out, &mut seen);

        out.retain(|info| !self.disabled.contains(&info.name));
        if filter_unavailable {
            out.retain(|info| {
                self.load_skill(&info.name)
                    .map(|skill| check_requirements(&skill))
                    .unwrap_or(false)
            });
        }

        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Load one skill by name.
    pub fn load_skill(&self, name: &str) -> Option<Skill> {
        if self.disabled.contains(name) {
            return None;
        }
        let workspace = self.workspace_dir.join(name).join("SKILL.md");
        if workspace.is_file() {
            return parse_skill_file(&workspace, name, "workspace");
        }

        let builtin = self.builtin_dir.join(name).join("SKILL.md");
        if builtin.is_file() {
            return parse_skill_file(&builtin, name, "builtin");
        }

        None
    }

    /// Names of skills that are always injected: those flagged `always` in
    /// their frontmatter plus `skills.always_load`, restricted to skills
    /// whose requirements are met.
    pub fn always_skills(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .list_skills(true)
            .into_iter()
            .filter_map(|info| self.load_skill(&info.name))
            .filter(|skill| is_always(skill) || self.always_load.contains(&skill.name))
            .map(|skill| skill.name)
            .collect();
        names.sort();
        names
    }
}

/// Check if required binaries and env vars are present.
pub fn check_requirements(skill: &Skill) -> bool {
    let requires = requirements(skill);
    requires.bins.iter().all(|bin| binary_in_path(bin))
        && requires.env.iter().all(|name| std::env::var(name).is_ok())
}

fn femto_metadata(skill: &Skill) -> FemtoMetadata {
    skill
        .metadata
        .metadata
        .as_ref()
        .and_then(|value| value.get("femtoclaw"))
        .and_then(|scoped| serde_json::from_value(scoped.clone()).ok())
        .unwrap_or_default()
}

fn is_always(skill: &Skill) -> bool {
    skill.metadata.always || femto_metadata(skill).always
}

fn requirements(skill: &Skill) -> SkillRequirements {
    let scoped = femto_metadata(skill).requires;
    let mut requires = skill.metadata.requires.clone();
    requires.bins.extend(scoped.bins);
    requires.env.extend(scoped.env);
    requires
}

fn parse_skill_file(path: &Path, fallback_name: &str, source: &str) -> Option<Skill> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read skill");
            return None;
        }
    };
    let (metadata, body) = parse_frontmatter(&raw);

    let name = if metadata.name.trim().is_empty() {
        fallback_name.to_string()
    } else {
        metadata.name.clone()
    };
    let description = if metadata.description.trim().is_empty() {
        format!("Skill '{}'", name)
    } else {
        metadata.description.clone()
    };

    // {baseDir} lets a skill reference files next to its SKILL.md
    let base_dir = path
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default();

    Some(Skill {
        name,
        description,
        path: path.to_string_lossy().to_string(),
        source: source.to_string(),
        metadata,
        content: body.replace("{baseDir}", &base_dir),
    })
}

fn parse_frontmatter(content: &str) -> (SkillMetadata, String) {
    let re = Regex::new(r"(?s)^---\r?\n(.*?)\r?\n---\r?\n?").ok();
    if let Some(captures) = re.as_ref().and_then(|re| re.captures(content)) {
        if let (Some(frontmatter), Some(full)) = (captures.get(1), captures.get(0)) {
            let metadata = match serde_yaml::from_str::<SkillMetadata>(frontmatter.as_str()) {
                Ok(meta) => meta,
                Err(e) => {
                    warn!("Failed to parse skill frontmatter: {}", e);
                    SkillMetadata::default()
                }
            };
            return (metadata, content[full.end()..].trim().to_string());
        }
    }

    (SkillMetadata::default(), content.to_string())
}

fn default_builtin_skills_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.parent().map(|p| p.join(BUILTIN_SKILLS_DIR)))
        .filter(|path| path.exists())
        .unwrap_or_else(|| PathBuf::from(BUILTIN_SKILLS_DIR))
}

fn collect_skill_infos(
    dir: &Path,
    source: &str,
    output: &mut Vec<SkillInfo>,
    seen: &mut HashSet<String>,
) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let skill_file = path.join("SKILL.md");
        if !path.is_dir() || !skill_file.is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        if !seen.insert(name.clone()) {
            continue;
        }
        output.push(SkillInfo {
            name,
            path: skill_file.to_string_lossy().to_string(),
            source: source.to_string(),
        });
    }
}

fn binary_in_path(bin: &str) -> bool {
    if bin.trim().is_empty() {
        return false;
    }
    let Some(path) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path).any(|dir| dir.join(bin).is_file())
}
