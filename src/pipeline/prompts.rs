//! Prompt templates for the classification and rewrite stages.
//!
//! Each template carries an `{audience_name}` placeholder. The rendered
//! template is followed by a newline and the raw message text.

use std::path::Path;

use crate::error::{ConfigError, PipelineError};

/// Placeholder substituted with the audience name.
pub const AUDIENCE_PLACEHOLDER: &str = "{audience_name}";

/// File name of the classification template inside a prompts directory.
pub const CLASSIFY_FILE: &str = "classify.txt";

/// File name of the rewrite template inside a prompts directory.
pub const REWRITE_FILE: &str = "rewrite.txt";

const DEFAULT_CLASSIFY: &str = "\
You are the editor of a news channel whose readers are {audience_name}.
Decide whether the news item below is interesting and appropriate for these readers.
Answer with exactly two lines:
line 1: FIT or NOT_FIT
line 2: one sentence explaining the decision
News item:";

const DEFAULT_REWRITE: &str = "\
You are the editor of a news channel whose readers are {audience_name}.
Rewrite the news item below for these readers. Keep every fact, adapt tone and
vocabulary to the audience, and keep it short enough for a channel post.
Reply with the rewritten post only.
News item:";

/// A named prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    name: String,
    text: String,
}

impl PromptTemplate {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Substitute the audience name into the template.
    pub fn render(&self, audience_name: &str) -> Result<String, PipelineError> {
        if !self.text.contains(AUDIENCE_PLACEHOLDER) {
            return Err(PipelineError::Template {
                name: self.name.clone(),
                placeholder: AUDIENCE_PLACEHOLDER.to_string(),
            });
        }
        Ok(self.text.replace(AUDIENCE_PLACEHOLDER, audience_name))
    }

    /// Full prompt: rendered template, newline, message text.
    pub fn build(&self, audience_name: &str, text: &str) -> Result<String, PipelineError> {
        let mut prompt = self.render(audience_name)?;
        prompt.push('\n');
        prompt.push_str(text);
        Ok(prompt)
    }
}

/// The two templates the pipeline needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplates {
    pub classify: PromptTemplate,
    pub rewrite: PromptTemplate,
}

impl PromptTemplates {
    /// Built-in English templates.
    pub fn builtin() -> Self {
        Self {
            classify: PromptTemplate::new("classify", DEFAULT_CLASSIFY),
            rewrite: PromptTemplate::new("rewrite", DEFAULT_REWRITE),
        }
    }

    /// Load `classify.txt` and `rewrite.txt` from `dir`.
    ///
    /// Both files must exist and contain the audience placeholder.
    pub fn load_dir(dir: &Path) -> Result<Self, ConfigError> {
        Ok(Self {
            classify: load_template(dir, "classify", CLASSIFY_FILE)?,
            rewrite: load_template(dir, "rewrite", REWRITE_FILE)?,
        })
    }

    /// Templates from `dir` when given, otherwise the built-ins.
    pub fn from_dir_or_builtin(dir: Option<&Path>) -> Result<Self, ConfigError> {
        match dir {
            Some(dir) => Self::load_dir(dir),
            None => Ok(Self::builtin()),
        }
    }
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self::builtin()
    }
}

fn load_template(dir: &Path, name: &str, file: &str) -> Result<PromptTemplate, ConfigError> {
    let path = dir.join(file);
    let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::PromptFile {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    if !text.contains(AUDIENCE_PLACEHOLDER) {
        return Err(ConfigError::PromptFile {
            path: path.display().to_string(),
            reason: format!("missing {AUDIENCE_PLACEHOLDER} placeholder"),
        });
    }

    Ok(PromptTemplate::new(name, text.trim_end()))
}
