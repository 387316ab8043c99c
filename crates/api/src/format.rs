//! Renders structured producer input into chat-ready HTML.
//!
//! Everything a producer supplies is escaped; only the markup added here is
//! interpreted by the chat client.

use serde::Deserialize;

use relay_common::types::escape_html;

/// Longest context block included in an error report, in characters.
const MAX_CONTEXT_CHARS: usize = 1500;

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorReport {
    /// Where the error happened (`billing-worker`, `api`, ...).
    pub source: String,
    pub message: String,
    /// Free-form extra detail. Objects are pretty-printed.
    #[serde(default)]
    pub context: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Succeeded,
    Failed,
    Running,
}

impl PipelineState {
    fn icon(&self) -> &'static str {
        match self {
            PipelineState::Succeeded => "✅",
            PipelineState::Failed => "❌",
            PipelineState::Running => "⏳",
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Succeeded => write!(f, "succeeded"),
            PipelineState::Failed => write!(f, "failed"),
            PipelineState::Running => write!(f, "running"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineUpdate {
    pub pipeline: String,
    pub status: PipelineState,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

pub fn render_error(report: &ErrorReport) -> String {
    let mut text = format!(
        "🚨 <b>Error</b> · {}\n\n{}",
        escape_html(&report.source),
        escape_html(&report.message)
    );

    if let Some(context) = report.context.as_ref().filter(|c| !c.is_null()) {
        let raw = match context {
            serde_json::Value::String(s) => s.clone(),
            other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        };
        let clipped: String = raw.chars().take(MAX_CONTEXT_CHARS).collect();
        text.push_str(&format!("\n\n<pre>{}</pre>", escape_html(&clipped)));
    }

    text
}

pub fn render_pipeline(update: &PipelineUpdate) -> String {
    let mut text = format!(
        "{} <b>{}</b> {}",
        update.status.icon(),
        escape_html(&update.pipeline),
        update.status
    );

    if let Some(details) = update.details.as_deref().filter(|d| !d.trim().is_empty()) {
        text.push_str(&format!("\n\n{}", escape_html(details)));
    }
    if let Some(url) = update.url.as_deref().filter(|u| !u.trim().is_empty()) {
        text.push_str(&format!("\n\n<a href=\"{}\">Open run</a>", escape_html(url)));
    }

    text
}
