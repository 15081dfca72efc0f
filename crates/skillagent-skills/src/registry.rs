//! Skill registry
//!
//! Loads every `*.yaml`/`*.yml` file in a config directory and indexes the
//! definitions by id and by intent tag. Files are visited in file-name
//! order, so ties between skills serving the same intent resolve to the
//! first file loaded.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::SkillError;
use crate::skill::SkillDefinition;

/// A skill file that was skipped during loading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadError {
    /// File that was skipped
    pub path: PathBuf,
    /// Why it was skipped
    pub message: String,
}

/// Registry of declarative skills
#[derive(Debug)]
pub struct SkillRegistry {
    config_dir: PathBuf,
    /// Skills in load order
    skills: Vec<SkillDefinition>,
    by_id: HashMap<String, usize>,
    by_intent: HashMap<String, Vec<usize>>,
    load_errors: Vec<LoadError>,
}

impl SkillRegistry {
    /// Create a registry and load every skill file in `config_dir`
    ///
    /// A missing directory yields an empty registry.
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        let mut registry = Self {
            config_dir: config_dir.into(),
            skills: Vec::new(),
            by_id: HashMap::new(),
            by_intent: HashMap::new(),
            load_errors: Vec::new(),
        };
        registry.load();
        registry
    }

    /// Directory the registry loads from
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    fn load(&mut self) {
        let dir = self.config_dir.clone();

        if !dir.is_dir() {
            warn!("Skills directory does not exist: {:?}", dir);
            return;
        }

        let mut files = match skill_files(&dir) {
            Ok(files) => files,
            Err(e) => {
                warn!("Failed to read skills directory {:?}: {}", dir, e);
                self.load_errors.push(LoadError {
                    path: dir,
                    message: e.to_string(),
                });
                return;
            }
        };
        files.sort();

        for path in files {
            match SkillDefinition::from_file(&path) {
                Ok(skill) => {
                    if let Err(e) = self.insert(skill, &path) {
                        warn!("Skipping {:?}: {}", path, e);
                        self.record_error(path, e);
                    }
                }
                Err(e) => {
                    warn!("Skipping {:?}: {}", path, e);
                    self.record_error(path, e);
                }
            }
        }

        info!(
            "Loaded {} skills from {:?} ({} skipped)",
            self.skills.len(),
            self.config_dir,
            self.load_errors.len()
        );
    }

    fn record_error(&mut self, path: PathBuf, error: SkillError) {
        self.load_errors.push(LoadError {
            path,
            message: error.to_string(),
        });
    }

    fn insert(&mut self, skill: SkillDefinition, path: &Path) -> Result<(), SkillError> {
        if self.by_id.contains_key(&skill.id) {
            return Err(SkillError::Duplicate {
                id: skill.id,
                path: path.to_path_buf(),
            });
        }

        let index = self.skills.len();
        debug!("Registered skill '{}' from {:?}", skill.id, path);

        self.by_id.insert(skill.id.clone(), index);
        for tag in &skill.intent_tags {
            let slots = self.by_intent.entry(tag.clone()).or_default();
            if !slots.contains(&index) {
                slots.push(index);
            }
        }
        self.skills.push(skill);
        Ok(())
    }

    /// Drop everything and load the directory again
    pub fn reload(&mut self) {
        info!("Reloading skills from {:?}", self.config_dir);
        self.skills.clear();
        self.by_id.clear();
        self.by_intent.clear();
        self.load_errors.clear();
        self.load();
    }

    /// Look up a skill by id
    pub fn get_skill(&self, id: &str) -> Option<&SkillDefinition> {
        self.by_id.get(id).map(|&i| &self.skills[i])
    }

    /// Skills serving an intent, in load order
    pub fn get_skills_by_intent(&self, intent: &str) -> Vec<&SkillDefinition> {
        self.by_intent
            .get(intent)
            .map(|slots| slots.iter().map(|&i| &self.skills[i]).collect())
            .unwrap_or_default()
    }

    /// All skills in load order
    pub fn list_all_skills(&self) -> &[SkillDefinition] {
        &self.skills
    }

    /// All skill ids in load order
    pub fn get_skill_ids(&self) -> Vec<&str> {
        self.skills.iter().map(|s| s.id.as_str()).collect()
    }

    /// Union of every skill's intent tags, sorted
    pub fn get_all_intents(&self) -> BTreeSet<&str> {
        self.by_intent.keys().map(String::as_str).collect()
    }

    /// Skills flagged as composable
    pub fn get_composable_skills(&self) -> Vec<&SkillDefinition> {
        self.skills.iter().filter(|s| s.composable).collect()
    }

    /// False when the skill is unknown or any declared dependency is missing
    pub fn validate_skill_dependencies(&self, id: &str) -> bool {
        let Some(skill) = self.get_skill(id) else {
            warn!("Dependency check for unknown skill '{}'", id);
            return false;
        };

        match skill
            .dependencies
            .iter()
            .find(|dep| !self.by_id.contains_key(dep.as_str()))
        {
            Some(missing) => {
                warn!("Skill '{}' depends on missing skill '{}'", id, missing);
                false
            }
            None => true,
        }
    }

    /// Files skipped by the last load
    pub fn load_errors(&self) -> &[LoadError] {
        &self.load_errors
    }

    /// Human-readable list of skills, sorted by id
    pub fn skills_overview(&self) -> String {
        if self.skills.is_empty() {
            return "No skills available".to_string();
        }

        let mut sorted: Vec<_> = self.skills.iter().collect();
        sorted.sort_by(|a, b| a.id.cmp(&b.id));

        sorted
            .iter()
            .map(|s| s.to_summary())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Number of loaded skills
    pub fn len(&self) -> usize {
        self.skills.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }
}

fn skill_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        if path.is_file() && is_yaml {
            files.push(path);
        }
    }
    Ok(files)
}
