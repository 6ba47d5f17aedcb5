//! Prompt templates and placeholder rendering
//!
//! Templates use `{source_lang}`, `{target_lang}` and `{text}` placeholders.
//! Literal braces are written `{{` and `}}`.

use crate::core::errors::{Result, TranslationError};
use crate::core::models::TranslationRequest;

/// Placeholders a template may reference
const KNOWN_PLACEHOLDERS: &[&str] = &["source_lang", "target_lang", "text"];

/// Values substituted into a template
#[derive(Debug, Clone, Copy)]
pub struct PromptVars<'a> {
    pub source_lang: &'a str,
    pub target_lang: &'a str,
    pub text: &'a str,
}

impl<'a> PromptVars<'a> {
    fn lookup(&self, name: &str) -> Option<&'a str> {
        match name {
            "source_lang" => Some(self.source_lang),
            "target_lang" => Some(self.target_lang),
            "text" => Some(self.text),
            _ => None,
        }
    }
}

/// A provider's default system/user templates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptSet {
    pub system: &'static str,
    pub user: &'static str,
}

/// Templates shared by the chat-completion providers
pub const DEFAULT_PROMPTS: PromptSet = PromptSet {
    system: "You are a professional translator, skilled at translating from {source_lang} to {target_lang}. \
             Preserve the tone and style of the original and keep the translation accurate and fluent.",
    user: "Translate the following content into {target_lang}:\n\n{text}",
};

/// Which half of the conversation a template renders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptRole {
    System,
    User,
}

impl PromptRole {
    fn required(&self) -> &'static [&'static str] {
        match self {
            PromptRole::System => &[],
            PromptRole::User => &["text"],
        }
    }
}

/// Check a template without rendering it
pub fn validate_template(template: &str, role: PromptRole) -> Result<()> {
    let names = placeholders(template)?;
    for required in role.required() {
        if !names.iter().any(|n| n == required) {
            return Err(TranslationError::InvalidPrompt {
                reason: format!("{:?} prompt is missing the {{{}}} placeholder", role, required),
            });
        }
    }
    Ok(())
}

/// Render a template, failing on unknown or missing placeholders
pub fn render(template: &str, role: PromptRole, vars: &PromptVars<'_>) -> Result<String> {
    validate_template(template, role)?;

    let mut out = String::with_capacity(template.len() + vars.text.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let name: String = chars.by_ref().take_while(|&ch| ch != '}').collect();
                // validate_template already rejected unknown names
                if let Some(value) = vars.lookup(&name) {
                    out.push_str(value);
                }
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

/// Render `(system, user)` for a request, falling back to `defaults`
pub fn render_request(request: &TranslationRequest, defaults: &PromptSet) -> Result<(String, String)> {
    let vars = PromptVars {
        source_lang: &request.source_lang,
        target_lang: &request.target_lang,
        text: &request.text,
    };

    let system_template = request.system_prompt.as_deref().unwrap_or(defaults.system);
    let user_template = request.user_prompt.as_deref().unwrap_or(defaults.user);

    Ok((
        render(system_template, PromptRole::System, &vars)?,
        render(user_template, PromptRole::User, &vars)?,
    ))
}

/// Collect placeholder names, rejecting malformed templates
fn placeholders(template: &str) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for ch in chars.by_ref() {
                    if ch == '}' {
                        closed = true;
                        break;
                    }
                    name.push(ch);
                }
                if !closed {
                    return Err(TranslationError::InvalidPrompt {
                        reason: "unclosed '{' in template".to_string(),
                    });
                }
                if !KNOWN_PLACEHOLDERS.contains(&name.as_str()) {
                    return Err(TranslationError::InvalidPrompt {
                        reason: format!("unknown placeholder {{{}}}", name),
                    });
                }
                names.push(name);
            }
            '}' => {
                return Err(TranslationError::InvalidPrompt {
                    reason: "single '}' in template".to_string(),
                });
            }
            _ => {}
        }
    }

    Ok(names)
}
