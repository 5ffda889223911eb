//! Trigger-based response resolution.
//!
//! A message is bot-directed iff it starts with the trigger prefix
//! (case-insensitive). The payload after the trigger is resolved against
//! the fixed corpus first and the generative fallback second; generative
//! failures are absorbed into the static fallback so a triggered message
//! always gets some reply.

pub mod fixed;
pub mod llm;

pub use fixed::FixedResponses;
pub use llm::{Generator, OllamaGenerator};

use tracing::{debug, warn};

pub struct Responder {
    trigger: String,
    fallback: String,
    use_llm: bool,
    fixed: FixedResponses,
    llm: Box<dyn Generator>,
}

impl Responder {
    pub fn new(
        trigger: impl Into<String>,
        fallback: impl Into<String>,
        use_llm: bool,
        fixed: FixedResponses,
        llm: Box<dyn Generator>,
    ) -> Self {
        Self {
            trigger: trigger.into(),
            fallback: fallback.into(),
            use_llm,
            fixed,
            llm,
        }
    }

    /// Resolve a raw message text to a reply.
    ///
    /// `None` means the text is not bot-directed; `Some` always carries a
    /// reply once the trigger matched.
    pub async fn resolve(&mut self, raw: &str) -> Option<String> {
        let payload = strip_trigger(raw, &self.trigger)?;

        if let Some(reply) = self.fixed.lookup(payload) {
            debug!(payload, "fixed corpus hit");
            return Some(reply);
        }

        if self.use_llm {
            match self.llm.generate(payload).await {
                Ok(text) => return Some(text),
                Err(e) => {
                    warn!(error = %e, "generative fallback failed");
                    return Some(self.fallback.clone());
                }
            }
        }

        Some(self.fallback.clone())
    }
}

/// Strip the trigger prefix (case-insensitive) and surrounding whitespace.
/// Returns `None` when the text is not bot-directed.
fn strip_trigger<'a>(text: &'a str, trigger: &str) -> Option<&'a str> {
    if text.is_empty() || trigger.is_empty() || text.len() < trigger.len() {
        return None;
    }
    if !text.is_char_boundary(trigger.len()) {
        return None;
    }
    let (head, rest) = text.split_at(trigger.len());
    head.eq_ignore_ascii_case(trigger).then(|| rest.trim())
}
