//! Skill subsystem — `SKILL.md`-described capabilities with progressive disclosure.
//!
//! A skill is a directory containing a `SKILL.md` file: YAML frontmatter
//! (name, description, optional compatibility/allowed-tools) followed by a
//! Markdown body carrying the full instructions. [`SkillLoader`] discovers
//! and parses skills from a root directory; callers see only metadata until
//! they explicitly activate a skill, at which point the full body becomes
//! available.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use regex::Regex;
use serde::Deserialize;

/// Maximum length of a skill `name`.
const MAX_NAME_LENGTH: usize = 64;
/// Description length past which [`SkillParser::parse`] emits a warning.
const DESCRIPTION_WARN_LENGTH: usize = 1024;
/// Compatibility note length past which [`SkillParser::parse`] emits a warning.
const COMPATIBILITY_WARN_LENGTH: usize = 500;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("skill name pattern is a valid regex")
    })
}

/// Errors produced while parsing or activating a skill.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SkillError {
    /// `SKILL.md` does not exist at the expected path.
    #[error("skill file not found: {0}")]
    FileNotFound(PathBuf),

    /// The file does not begin with the `---` frontmatter delimiter.
    #[error("missing frontmatter delimiter in {0}")]
    NoFrontmatterDelimiter(PathBuf),

    /// The frontmatter block failed to parse as YAML.
    #[error("invalid frontmatter YAML in {path}: {cause}")]
    InvalidFrontmatterYaml {
        /// Path of the offending `SKILL.md`.
        path: PathBuf,
        /// Underlying parse error.
        cause: String,
    },

    /// A required frontmatter field was absent.
    #[error("missing required field '{0}'")]
    MissingRequiredField(String),

    /// `name` failed validation (length or pattern).
    #[error("invalid skill name '{0}': must be <= 64 chars, lowercase kebab-case")]
    InvalidName(String),

    /// `name` does not match the directory it was loaded from.
    #[error("skill name '{name}' does not match directory '{dir}'")]
    NameMismatch {
        /// Name declared in frontmatter.
        name: String,
        /// Actual directory name.
        dir: String,
    },

    /// A lookup by name found no matching skill.
    #[error("skill not found: {0}")]
    SkillNotFound(String),

    /// A resolved path escaped the skill's own directory.
    #[error("path '{0}' escapes the skill directory")]
    PathEscapesRoot(String),

    /// Filesystem I/O failure while reading a skill.
    #[error("I/O error reading {path}: {cause}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        cause: String,
    },
}

/// Frontmatter fields parsed directly from a `SKILL.md`'s YAML block.
#[derive(Debug, Clone, Deserialize)]
struct SkillFrontmatter {
    name: Option<String>,
    description: Option<String>,
    compatibility: Option<String>,
    #[serde(rename = "allowed-tools")]
    allowed_tools: Option<String>,
}

/// Metadata about a skill — the "first tier" of progressive disclosure.
///
/// Cheap to load in bulk via [`SkillLoader::load_metadata`]; does not carry
/// the (potentially large) instruction body.
#[derive(Debug, Clone, PartialEq)]
pub struct SkillMetadata {
    /// Validated, directory-matching skill name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Optional compatibility notes.
    pub compatibility: Option<String>,
    /// Tool names this skill is allowed to invoke.
    pub allowed_tools: Vec<String>,
    /// Directory this skill was loaded from.
    pub path: PathBuf,
}

/// A fully loaded skill — metadata plus the Markdown instruction body.
#[derive(Debug, Clone, PartialEq)]
pub struct Skill {
    /// The skill's metadata.
    pub metadata: SkillMetadata,
    /// Markdown body following the frontmatter block.
    pub body: String,
}

impl Skill {
    /// Resolve `relative_path` against this skill's directory, rejecting any
    /// path that would escape it.
    ///
    /// Uses `canonicalize` + `starts_with` rather than string inspection of
    /// `..`, so symlinks and `.`/`..` segments are resolved before the
    /// containment check.
    pub fn url(&self, relative_path: &str) -> Result<PathBuf, SkillError> {
        let root = self
            .metadata
            .path
            .canonicalize()
            .map_err(|e| SkillError::Io {
                path: self.metadata.path.clone(),
                cause: e.to_string(),
            })?;

        let candidate = self.metadata.path.join(relative_path);
        let resolved = candidate.canonicalize().map_err(|e| SkillError::Io {
            path: candidate.clone(),
            cause: e.to_string(),
        })?;

        if resolved.starts_with(&root) {
            Ok(resolved)
        } else {
            Err(SkillError::PathEscapesRoot(relative_path.to_string()))
        }
    }
}

/// Parses `SKILL.md` files anchored to a directory.
pub struct SkillParser;

impl SkillParser {
    /// Parse the `SKILL.md` in `dir`, validating its frontmatter.
    pub fn parse(dir: &Path) -> Result<Skill, SkillError> {
        let skill_path = dir.join("SKILL.md");
        if !skill_path.exists() {
            return Err(SkillError::FileNotFound(skill_path));
        }

        let content = std::fs::read_to_string(&skill_path).map_err(|e| SkillError::Io {
            path: skill_path.clone(),
            cause: e.to_string(),
        })?;

        let trimmed = content.trim_start();
        if !trimmed.starts_with("---\n") {
            return Err(SkillError::NoFrontmatterDelimiter(skill_path));
        }

        let after_delim = &trimmed[4..];
        let close = after_delim
            .find("\n---")
            .ok_or_else(|| SkillError::NoFrontmatterDelimiter(skill_path.clone()))?;

        let yaml_str = &after_delim[..close];
        let body = after_delim[close + 4..].trim_start_matches('\n').to_string();

        let frontmatter: SkillFrontmatter =
            serde_yaml::from_str(yaml_str).map_err(|e| SkillError::InvalidFrontmatterYaml {
                path: skill_path.clone(),
                cause: e.to_string(),
            })?;

        let name = frontmatter
            .name
            .ok_or_else(|| SkillError::MissingRequiredField("name".to_string()))?;

        if name.len() > MAX_NAME_LENGTH || !name_pattern().is_match(&name) {
            return Err(SkillError::InvalidName(name));
        }

        let dir_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if name != dir_name {
            return Err(SkillError::NameMismatch { name, dir: dir_name });
        }

        let description = frontmatter
            .description
            .ok_or_else(|| SkillError::MissingRequiredField("description".to_string()))?;
        if description.len() > DESCRIPTION_WARN_LENGTH {
            tracing::warn!(
                "skill '{}' description is {} chars, exceeding the {}-char guideline",
                name,
                description.len(),
                DESCRIPTION_WARN_LENGTH
            );
        }

        if let Some(compat) = &frontmatter.compatibility {
            if compat.len() > COMPATIBILITY_WARN_LENGTH {
                tracing::warn!(
                    "skill '{}' compatibility note is {} chars, exceeding the {}-char guideline",
                    name,
                    compat.len(),
                    COMPATIBILITY_WARN_LENGTH
                );
            }
        }

        let allowed_tools = frontmatter
            .allowed_tools
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        Ok(Skill {
            metadata: SkillMetadata {
                name,
                description,
                compatibility: frontmatter.compatibility,
                allowed_tools,
                path: dir.to_path_buf(),
            },
            body,
        })
    }
}

/// Discovers, loads, and tracks activation state for skills rooted at a
/// directory.
///
/// Activation is in-memory only: it records which skills a caller has opted
/// into so their full instructions can be injected into subsequent prompts,
/// via [`SkillsToolProvider`].
pub struct SkillLoader {
    root: PathBuf,
    activated: Mutex<HashSet<String>>,
}

impl SkillLoader {
    /// Create a loader rooted at `root`. Does not touch the filesystem.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            activated: Mutex::new(HashSet::new()),
        }
    }

    /// Find subdirectories of the root containing a `SKILL.md`, sorted
    /// lexicographically by directory name.
    pub fn discover(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| path.is_dir() && path.join("SKILL.md").exists())
                .collect(),
            Err(e) => {
                tracing::debug!("skill root {} unreadable: {e}", self.root.display());
                Vec::new()
            }
        };

        dirs.sort();
        dirs
    }

    /// Parse every discovered skill's metadata, skipping and warning on
    /// parse failures rather than failing the whole batch.
    pub fn load_metadata(&self) -> Vec<SkillMetadata> {
        self.discover()
            .into_iter()
            .filter_map(|dir| match SkillParser::parse(&dir) {
                Ok(skill) => Some(skill.metadata),
                Err(e) => {
                    tracing::warn!("skipping skill at {}: {e}", dir.display());
                    None
                }
            })
            .collect()
    }

    /// Parse every discovered skill in full, skipping and warning on parse
    /// failures.
    pub fn load_skills(&self) -> Vec<Skill> {
        self.discover()
            .into_iter()
            .filter_map(|dir| match SkillParser::parse(&dir) {
                Ok(skill) => Some(skill),
                Err(e) => {
                    tracing::warn!("skipping skill at {}: {e}", dir.display());
                    None
                }
            })
            .collect()
    }

    /// Load a single skill by name, if a directory with that name exists
    /// under the root and parses successfully.
    pub fn load_skill(&self, name: &str) -> Option<Skill> {
        let dir = self.root.join(name);
        if !dir.join("SKILL.md").exists() {
            return None;
        }
        SkillParser::parse(&dir).ok()
    }

    /// Mark `skill` as activated.
    pub fn activate(&self, skill: &Skill) {
        self.activated
            .lock()
            .unwrap()
            .insert(skill.metadata.name.clone());
    }

    /// Load and activate the skill named `name`.
    pub fn activate_by_name(&self, name: &str) -> Result<Skill, SkillError> {
        let skill = self
            .load_skill(name)
            .ok_or_else(|| SkillError::SkillNotFound(name.to_string()))?;
        self.activate(&skill);
        Ok(skill)
    }

    /// Deactivate `name`. A no-op if it was not active.
    pub fn deactivate(&self, name: &str) {
        self.activated.lock().unwrap().remove(name);
    }

    /// Deactivate every currently active skill.
    pub fn deactivate_all(&self) {
        self.activated.lock().unwrap().clear();
    }

    /// Whether `name` is currently activated.
    pub fn is_activated(&self, name: &str) -> bool {
        self.activated.lock().unwrap().contains(name)
    }

    /// Currently activated skill names, sorted lexicographically.
    pub fn activated_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.activated.lock().unwrap().iter().cloned().collect();
        names.sort();
        names
    }
}

/// Exposes skill activation as three callable tools:
/// `agent-skill-activate`, `agent-skill-deactivate`, `agent-skills-list-active`.
///
/// Activation invokes an optional callback with the freshly loaded skill so
/// the caller can splice its instruction body into a prompt.
pub struct SkillsToolProvider {
    loader: SkillLoader,
    on_activated: Option<Box<dyn Fn(&Skill) + Send + Sync>>,
}

impl SkillsToolProvider {
    /// Wrap `loader` with no activation callback.
    pub fn new(loader: SkillLoader) -> Self {
        Self {
            loader,
            on_activated: None,
        }
    }

    /// Wrap `loader`, invoking `on_activated` every time a skill is
    /// successfully activated through [`Self::activate`].
    pub fn with_callback(loader: SkillLoader, on_activated: impl Fn(&Skill) + Send + Sync + 'static) -> Self {
        Self {
            loader,
            on_activated: Some(Box::new(on_activated)),
        }
    }

    /// The three tool definitions this provider exposes, as JSON Schema
    /// objects suitable for an LLM tool-use loop.
    pub fn tool_definitions(&self) -> Vec<serde_json::Value> {
        vec![
            serde_json::json!({
                "name": "agent-skill-activate",
                "description": "Activate a skill by name, loading its full instructions.",
                "parameters": {
                    "type": "object",
                    "properties": { "skill_name": { "type": "string" } },
                    "required": ["skill_name"]
                }
            }),
            serde_json::json!({
                "name": "agent-skill-deactivate",
                "description": "Deactivate a previously activated skill by name.",
                "parameters": {
                    "type": "object",
                    "properties": { "skill_name": { "type": "string" } },
                    "required": ["skill_name"]
                }
            }),
            serde_json::json!({
                "name": "agent-skills-list-active",
                "description": "List the names of all currently activated skills.",
                "parameters": { "type": "object", "properties": {} }
            }),
        ]
    }

    /// Handle `agent-skill-activate`.
    pub fn activate(&self, skill_name: &str) -> Result<Skill, SkillError> {
        let skill = self.loader.activate_by_name(skill_name)?;
        if let Some(callback) = &self.on_activated {
            callback(&skill);
        }
        Ok(skill)
    }

    /// Handle `agent-skill-deactivate`.
    pub fn deactivate(&self, skill_name: &str) -> Result<(), SkillError> {
        if !self.loader.is_activated(skill_name) {
            return Err(SkillError::SkillNotFound(skill_name.to_string()));
        }
        self.loader.deactivate(skill_name);
        Ok(())
    }

    /// Handle `agent-skills-list-active`.
    pub fn list_active(&self) -> Vec<String> {
        self.loader.activated_names()
    }
}
