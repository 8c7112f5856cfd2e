//! Our prompt data type.
//!
//! Prompts are small TOML files. String fields are Handlebars templates, and
//! user messages may ask for the document's page images to be attached.
//!
//! ```toml
//! developer = "You extract fields from {{document_kind}} documents."
//!
//! [[messages]]
//! user = "Return the fields as JSON. The document language is {{language}}."
//! attach_pages = true
//! ```

use std::collections::HashMap;

use handlebars::Handlebars;
use serde_json::Map;

use crate::prelude::*;

/// A JSON Object value, without the surrounding [`Value::Object`] wrapper.
pub type JsonObject = Map<String, Value>;

/// A chat completion prompt.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatPrompt {
    /// The developer (aka "system") message, if any.
    #[serde(default)]
    pub developer: Option<String>,

    /// Messages.
    pub messages: Vec<Message>,
}

/// A user message, and optionally a canned assistant response.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Message {
    /// The user message.
    pub user: String,

    /// Should page images be attached to this message?
    #[serde(default)]
    pub attach_pages: bool,

    /// The assistant response (optional), used for few-shot examples.
    #[serde(default)]
    pub assistant: Option<String>,
}

impl ChatPrompt {
    /// Parse a prompt from TOML.
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).context("failed to parse prompt TOML")
    }

    /// Read a prompt from a TOML file.
    pub async fn read(path: &Path) -> Result<Self> {
        let data = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read prompt {:?}", path.display()))?;
        Self::from_toml_str(&data)
            .with_context(|| format!("failed to load prompt {:?}", path.display()))
    }

    /// Render the prompt as a list of OpenAI-style chat messages.
    ///
    /// `attachments` should be `data:` or `https:` URLs. They are added to
    /// every message with `attach_pages = true`.
    pub fn render_messages(
        &self,
        bindings: &JsonObject,
        attachments: &[String],
    ) -> Result<Vec<Value>> {
        let mut handlebars = Handlebars::new();
        // We render into JSON strings, not HTML.
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.set_strict_mode(true);

        let render = |template: &str| {
            handlebars
                .render_template(template, bindings)
                .with_context(|| format!("failed to render template {:?}", template))
        };

        let mut messages = Vec::new();
        if let Some(developer) = &self.developer {
            messages.push(json!({ "role": "system", "content": render(developer)? }));
        }
        for message in &self.messages {
            let text = render(&message.user)?;
            if message.attach_pages && !attachments.is_empty() {
                let mut content = vec![json!({ "type": "text", "text": text })];
                content.extend(attachments.iter().map(|url| {
                    json!({ "type": "image_url", "image_url": { "url": url } })
                }));
                messages.push(json!({ "role": "user", "content": content }));
            } else {
                messages.push(json!({ "role": "user", "content": text }));
            }
            if let Some(assistant) = &message.assistant {
                messages
                    .push(json!({ "role": "assistant", "content": render(assistant)? }));
            }
        }
        Ok(messages)
    }
}

/// Built-in prompts, by name.
const BUILTIN_PROMPTS: &[(&str, &str)] = &[
    ("cni_front", include_str!("prompts/cni_front.toml")),
    ("cni_back", include_str!("prompts/cni_back.toml")),
    ("work_contract", include_str!("prompts/work_contract.toml")),
    ("resume", include_str!("prompts/resume.toml")),
    ("generic", include_str!("prompts/generic.toml")),
    ("translate", include_str!("prompts/translate.toml")),
    ("question", include_str!("prompts/question.toml")),
];

/// All the prompts we use, loaded once at startup.
#[derive(Clone, Debug)]
pub struct PromptLibrary {
    prompts: HashMap<String, ChatPrompt>,
}

impl PromptLibrary {
    /// Load the built-in prompts. A file named `<name>.toml` in
    /// `override_dir` replaces the built-in prompt of the same name.
    #[instrument(level = "debug", skip_all)]
    pub async fn load(override_dir: Option<&Path>) -> Result<Self> {
        let mut prompts = HashMap::with_capacity(BUILTIN_PROMPTS.len());
        for (name, builtin) in BUILTIN_PROMPTS {
            let override_path = override_dir.map(|dir| dir.join(format!("{name}.toml")));
            let prompt = match override_path {
                Some(path) if tokio::fs::try_exists(&path).await.unwrap_or(false) => {
                    info!(prompt = name, path = %path.display(), "Using prompt override");
                    ChatPrompt::read(&path).await?
                }
                _ => ChatPrompt::from_toml_str(builtin)
                    .with_context(|| format!("failed to parse built-in prompt {name:?}"))?,
            };
            prompts.insert((*name).to_owned(), prompt);
        }
        Ok(Self { prompts })
    }

    /// Look up a prompt by name.
    pub fn get(&self, name: &str) -> Result<&ChatPrompt> {
        self.prompts
            .get(name)
            .ok_or_else(|| anyhow!("no prompt named {name:?}"))
    }
}
