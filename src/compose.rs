//! Message templates and their expansion into a [`ComposeRequest`].
//!
//! Template text may contain `{recipient}` (the recipient's first name),
//! `{sender}` and `{timestamp}` (epoch milliseconds) placeholders.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ComposeRequest;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageTemplate {
    Fixed {
        subject: String,
        body: String,
    },
    /// One entry is drawn from each pool; the body is greeting, body and
    /// closing on separate paragraphs, signed with the sender's name.
    Randomized {
        subjects: Vec<String>,
        greetings: Vec<String>,
        bodies: Vec<String>,
        closings: Vec<String>,
    },
    /// The body is the compact JSON form of `payload`.
    Structured {
        subject: String,
        payload: serde_json::Value,
    },
}

impl Default for MessageTemplate {
    fn default() -> Self {
        MessageTemplate::Fixed {
            subject: "Hello".to_string(),
            body: "Hi {recipient},".to_string(),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TemplateError {
    #[error("recipient name is empty")]
    MissingRecipient,

    #[error("template pool `{0}` is empty")]
    EmptyPool(&'static str),
}

/// Index in `0..len` from the thread-local RNG; `0` for an empty range.
fn random_index(len: usize) -> usize {
    (rand::random::<u64>() % len.max(1) as u64) as usize
}

struct Vars<'a> {
    recipient_first: &'a str,
    sender: &'a str,
    timestamp: i64,
}

impl Vars<'_> {
    fn render(&self, text: &str) -> String {
        text.replace("{recipient}", self.recipient_first)
            .replace("{sender}", self.sender)
            .replace("{timestamp}", &self.timestamp.to_string())
    }
}

fn pick<'a>(
    pool: &'a [String],
    name: &'static str,
    pick: &mut dyn FnMut(usize) -> usize,
) -> Result<&'a str, TemplateError> {
    if pool.is_empty() {
        return Err(TemplateError::EmptyPool(name));
    }
    let idx = pick(pool.len()).min(pool.len() - 1);
    Ok(&pool[idx])
}

/// Expand `template` into a request for `recipient`.
pub fn compose(
    template: &MessageTemplate,
    recipient: &str,
    sender: Option<&str>,
    timestamp: i64,
    picker: &mut dyn FnMut(usize) -> usize,
) -> Result<ComposeRequest, TemplateError> {
    let recipient = recipient.trim();
    if recipient.is_empty() {
        return Err(TemplateError::MissingRecipient);
    }
    let sender = sender.map(str::trim).unwrap_or_default();
    let vars = Vars {
        recipient_first: recipient.split_whitespace().next().unwrap_or(recipient),
        sender,
        timestamp,
    };

    let (subject, body) = match template {
        MessageTemplate::Fixed { subject, body } => (vars.render(subject), vars.render(body)),
        MessageTemplate::Randomized {
            subjects,
            greetings,
            bodies,
            closings,
        } => {
            let subject = vars.render(pick(subjects, "subjects", picker)?);
            let greeting = vars.render(pick(greetings, "greetings", picker)?);
            let main = vars.render(pick(bodies, "bodies", picker)?);
            let closing = vars.render(pick(closings, "closings", picker)?);
            let mut body = format!("{greeting}\n\n{main}\n\n{closing}");
            if !sender.is_empty() {
                body.push('\n');
                body.push_str(sender);
            }
            (subject, body)
        }
        MessageTemplate::Structured { subject, payload } => {
            (vars.render(subject), payload.to_string())
        }
    };

    Ok(ComposeRequest::new(subject, body, recipient))
}

/// [`compose`] with pool entries drawn from the thread-local RNG.
pub fn compose_random(
    template: &MessageTemplate,
    recipient: &str,
    sender: Option<&str>,
    timestamp: i64,
) -> Result<ComposeRequest, TemplateError> {
    compose(template, recipient, sender, timestamp, &mut random_index)
}
