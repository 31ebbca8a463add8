//! Prompt Assembly
//!
//! Builds the normalized prompt envelope consumed by the provider adapters,
//! and defines the parsing contract for every analysis mode. Assembly is a
//! pure function of the research question, the segment text, and the existing
//! code/theme context; nothing here talks to a provider.
//!
//! Deductive coding injects the existing codebook as the allowed vocabulary;
//! inductive coding injects none and lets the model propose new labels, which
//! the coding engine deduplicates against existing labels before insertion.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::code::CodeId;
use crate::error::{CoreError, CoreResult};

/// Bumped whenever a template's wording or contract changes, so cached
/// responses from older templates are never served for new ones.
pub const PROMPT_TEMPLATE_VERSION: &str = "v1";

/// The analysis task a prompt is assembled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    Deductive,
    Inductive,
    Theme,
    Sentiment,
    Discourse,
    Narrative,
    ReliabilityRationale,
}

impl AnalysisMode {
    /// Stable identifier used in cache fingerprints.
    pub fn template_id(&self) -> &'static str {
        match self {
            AnalysisMode::Deductive => "coding.deductive",
            AnalysisMode::Inductive => "coding.inductive",
            AnalysisMode::Theme => "theme.identify",
            AnalysisMode::Sentiment => "insight.sentiment",
            AnalysisMode::Discourse => "insight.discourse",
            AnalysisMode::Narrative => "insight.narrative",
            AnalysisMode::ReliabilityRationale => "reliability.rationale",
        }
    }
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.template_id())
    }
}

/// Normalized prompt envelope: system instruction, user content, and the
/// machine-parseable output shape the response must follow (absent for
/// free-text modes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredPrompt {
    pub system: String,
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_hint: Option<String>,
}

impl StructuredPrompt {
    /// The user content as sent to the provider, with the schema hint
    /// appended when present.
    pub fn render_user(&self) -> String {
        match &self.schema_hint {
            Some(hint) => format!(
                "{}\n\nRespond with a single JSON object of this exact shape, and nothing else:\n{}",
                self.user, hint
            ),
            None => self.user.clone(),
        }
    }

    /// Re-prompt variant used after a malformed response: same task, hard
    /// JSON-only formatting instructions.
    pub fn stricter(&self) -> StructuredPrompt {
        StructuredPrompt {
            system: self.system.clone(),
            user: format!(
                "{}\n\nIMPORTANT: Your previous answer could not be parsed. \
                 Output raw JSON only. Do not wrap it in Markdown code fences, \
                 do not add commentary before or after, and follow the field \
                 names exactly.",
                self.user
            ),
            schema_hint: self.schema_hint.clone(),
        }
    }
}

const SYSTEM_CODING: &str = "You are a senior qualitative research methodologist with deep \
experience coding interview and field-note data. You ground every code in the participant's \
own words and never over-interpret.";

const SYSTEM_THEME: &str = "You are a senior qualitative research methodologist specializing \
in thematic analysis. You group related codes into coherent analytic themes and justify each \
grouping.";

const SYSTEM_SENTIMENT: &str = "You are an expert in sentiment and emotion analysis of \
qualitative data. You distinguish direct expression, implied feeling, and irony.";

const SYSTEM_DISCOURSE: &str = "You are a discourse analyst. You identify argumentation \
structure in text using the Toulmin model: claims, data, warrants, qualifiers, and rebuttals.";

const SYSTEM_NARRATIVE: &str = "You are a narrative analyst. You identify narrative structure \
in text using the Labov model: orientation, complicating action, evaluation, resolution, and \
coda.";

/// One codebook entry injected into a deductive prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodebookEntry {
    pub label: String,
    pub definition: String,
}

/// Aggregated usage of one code, injected into the theme-proposal prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeUsage {
    pub code_id: CodeId,
    pub label: String,
    pub frequency: usize,
    pub excerpts: Vec<String>,
}

fn format_codebook(codebook: &[CodebookEntry]) -> String {
    if codebook.is_empty() {
        return "(no codes defined yet)".to_string();
    }
    codebook
        .iter()
        .map(|entry| {
            if entry.definition.is_empty() {
                format!("- {}", entry.label)
            } else {
                format!("- {}: {}", entry.label, entry.definition)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn research_context(research_question: &str, methodology: &str) -> String {
    let mut lines = Vec::new();
    if !research_question.is_empty() {
        lines.push(format!("Research question: {}", research_question));
    }
    if !methodology.is_empty() {
        lines.push(format!("Methodology: {}", methodology));
    }
    lines.join("\n")
}

const CODING_SCHEMA_HINT: &str = r#"{"suggested_codes": [{"label": "short code label", "definition": "what the code means", "confidence": 0.0, "rationale": "why this code fits", "evidence": "verbatim supporting quote", "is_new": false}]}"#;

/// Deductive coding: the model must choose among the existing codes or
/// propose none.
pub fn deductive_prompt(
    research_question: &str,
    methodology: &str,
    codebook: &[CodebookEntry],
    text: &str,
) -> StructuredPrompt {
    let context = research_context(research_question, methodology);
    StructuredPrompt {
        system: SYSTEM_CODING.to_string(),
        user: format!(
            "{context}\n\nExisting codebook (the only allowed vocabulary):\n{codebook}\n\n\
             Apply the most fitting codes from the codebook to the following text segment. \
             Choose only labels that appear in the codebook; if none fit, return an empty \
             list rather than inventing a new label. Set is_new to false for every \
             suggestion.\n\nText segment:\n```\n{text}\n```",
            context = context,
            codebook = format_codebook(codebook),
            text = text,
        ),
        schema_hint: Some(CODING_SCHEMA_HINT.to_string()),
    }
}

/// Inductive (open) coding: no vocabulary injected, new labels welcome.
pub fn inductive_prompt(research_question: &str, methodology: &str, text: &str) -> StructuredPrompt {
    let context = research_context(research_question, methodology);
    StructuredPrompt {
        system: SYSTEM_CODING.to_string(),
        user: format!(
            "{context}\n\nPerform open coding on the following text segment: derive concise, \
             reusable code labels bottom-up from what the participant actually says, with a \
             one-sentence definition for each. Set is_new to true for every proposed code.\n\n\
             Text segment:\n```\n{text}\n```",
            context = context,
            text = text,
        ),
        schema_hint: Some(CODING_SCHEMA_HINT.to_string()),
    }
}

const THEME_SCHEMA_HINT: &str = r#"{"themes": [{"label": "theme label", "definition": "what unites the member codes", "code_ids": ["id of every member code"]}]}"#;

/// Theme proposal over aggregated code usage.
pub fn theme_prompt(research_question: &str, usage: &[CodeUsage]) -> StructuredPrompt {
    let mut lines = Vec::new();
    for entry in usage {
        lines.push(format!(
            "- [{}] \"{}\" applied to {} segment(s)",
            entry.code_id, entry.label, entry.frequency
        ));
        for excerpt in &entry.excerpts {
            lines.push(format!("    e.g. \"{}\"", excerpt));
        }
    }
    let context = research_context(research_question, "");
    StructuredPrompt {
        system: SYSTEM_THEME.to_string(),
        user: format!(
            "{context}\n\nThe codes below were applied across the data set, listed with their \
             usage frequency and example segment excerpts. Group related codes into a small \
             number of analytic themes. Reference member codes by the bracketed id exactly as \
             given; do not invent ids.\n\nCodes:\n{codes}",
            context = context,
            codes = lines.join("\n"),
        ),
        schema_hint: Some(THEME_SCHEMA_HINT.to_string()),
    }
}

const SENTIMENT_SCHEMA_HINT: &str = r#"{"sentiment": "positive|negative|neutral|mixed", "intensity": 0.0, "emotions": {"emotion name": 0.0}, "rationale": "analysis rationale"}"#;

pub fn sentiment_prompt(text: &str) -> StructuredPrompt {
    StructuredPrompt {
        system: SYSTEM_SENTIMENT.to_string(),
        user: format!(
            "Analyze the sentiment of the following text: overall polarity, intensity from \
             0 to 1, the specific emotions present with their strengths, and your rationale.\n\n\
             Text:\n```\n{}\n```",
            text
        ),
        schema_hint: Some(SENTIMENT_SCHEMA_HINT.to_string()),
    }
}

const DISCOURSE_SCHEMA_HINT: &str = r#"{"claims": [], "data": [], "warrants": [], "qualifiers": [], "rebuttals": [], "argument_strength": 0.0, "analysis": "overall analysis"}"#;

pub fn discourse_prompt(text: &str) -> StructuredPrompt {
    StructuredPrompt {
        system: SYSTEM_DISCOURSE.to_string(),
        user: format!(
            "Analyze the argumentation structure of the following text using the Toulmin \
             model. Identify the claims advanced, the data or evidence offered, the warrants \
             connecting them, any qualifiers, and any rebuttals.\n\nText:\n```\n{}\n```",
            text
        ),
        schema_hint: Some(DISCOURSE_SCHEMA_HINT.to_string()),
    }
}

const NARRATIVE_SCHEMA_HINT: &str = r#"{"orientation": "", "complicating_action": "", "evaluation": "", "resolution": "", "coda": "", "narrative_type": "", "analysis": "overall analysis"}"#;

pub fn narrative_prompt(text: &str) -> StructuredPrompt {
    StructuredPrompt {
        system: SYSTEM_NARRATIVE.to_string(),
        user: format!(
            "Analyze the narrative structure of the following text using the Labov model: \
             orientation, complicating action, evaluation, resolution, and coda. Classify \
             the narrative type.\n\nText:\n```\n{}\n```",
            text
        ),
        schema_hint: Some(NARRATIVE_SCHEMA_HINT.to_string()),
    }
}

/// Rationale for one coding decision, for human review of a code
/// application. Free-text response.
pub fn coding_rationale_prompt(
    code_label: &str,
    code_definition: &str,
    text: &str,
) -> StructuredPrompt {
    StructuredPrompt {
        system: SYSTEM_CODING.to_string(),
        user: format!(
            "Explain in a short paragraph why the code \"{label}\" (defined as: {definition}) \
             does or does not fit the following text segment. Quote the words that carry the \
             decision.\n\nText segment:\n```\n{text}\n```",
            label = code_label,
            definition = code_definition,
            text = text,
        ),
        schema_hint: None,
    }
}

/// Rationale for one inter-rater disagreement, for human review. Free-text
/// response; the engine never auto-resolves the disagreement.
pub fn disagreement_prompt(text: &str, labels_a: &[String], labels_b: &[String]) -> StructuredPrompt {
    let fmt_set = |labels: &[String]| {
        if labels.is_empty() {
            "(no codes)".to_string()
        } else {
            labels.join(", ")
        }
    };
    StructuredPrompt {
        system: SYSTEM_CODING.to_string(),
        user: format!(
            "Two coders disagreed on the following text segment. Coder A applied: {a}. \
             Coder B applied: {b}. Explain in a short paragraph what in the text could \
             support each reading, to help a human reviewer adjudicate. Do not pick a \
             winner.\n\nText segment:\n```\n{text}\n```",
            a = fmt_set(labels_a),
            b = fmt_set(labels_b),
            text = text,
        ),
        schema_hint: None,
    }
}

// ============================================================================
// Parsing contracts
// ============================================================================

/// One code suggested by the model for a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeSuggestion {
    pub label: String,
    #[serde(default)]
    pub definition: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub evidence: String,
    #[serde(default)]
    pub is_new: bool,
}

fn default_confidence() -> f64 {
    0.5
}

#[derive(Deserialize)]
struct CodingResponse {
    suggested_codes: Vec<CodeSuggestion>,
}

/// One theme suggested by the model over the aggregated codes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeSuggestion {
    pub label: String,
    #[serde(default)]
    pub definition: String,
    #[serde(default)]
    pub code_ids: Vec<CodeId>,
}

#[derive(Deserialize)]
struct ThemeResponse {
    themes: Vec<ThemeSuggestion>,
}

/// Parsed sentiment analysis of one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentOutcome {
    pub sentiment: String,
    #[serde(default)]
    pub intensity: f64,
    #[serde(default)]
    pub emotions: BTreeMap<String, f64>,
    #[serde(default)]
    pub rationale: String,
}

/// Parsed Toulmin-model discourse analysis of one segment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscourseOutcome {
    #[serde(default)]
    pub claims: Vec<String>,
    #[serde(default)]
    pub data: Vec<String>,
    #[serde(default)]
    pub warrants: Vec<String>,
    #[serde(default)]
    pub qualifiers: Vec<String>,
    #[serde(default)]
    pub rebuttals: Vec<String>,
    #[serde(default)]
    pub argument_strength: f64,
    #[serde(default)]
    pub analysis: String,
}

/// Parsed Labov-model narrative analysis of one segment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NarrativeOutcome {
    #[serde(default)]
    pub orientation: String,
    #[serde(default)]
    pub complicating_action: String,
    #[serde(default)]
    pub evaluation: String,
    #[serde(default)]
    pub resolution: String,
    #[serde(default)]
    pub coda: String,
    #[serde(default)]
    pub narrative_type: String,
    #[serde(default)]
    pub analysis: String,
}

/// Strip a Markdown code fence (```json ... ``` or ``` ... ```) wrapped
/// around a response body. Models frequently fence their JSON even when told
/// not to.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut body = raw.trim();
    if let Some(rest) = body.strip_prefix("```json") {
        body = rest;
    } else if let Some(rest) = body.strip_prefix("```") {
        body = rest;
    }
    if let Some(rest) = body.strip_suffix("```") {
        body = rest;
    }
    body.trim()
}

/// Parse a coding-mode response. Suggestions with an empty label are
/// discarded.
pub fn parse_code_suggestions(raw: &str) -> CoreResult<Vec<CodeSuggestion>> {
    let body = strip_code_fences(raw);
    let response: CodingResponse = serde_json::from_str(body)
        .map_err(|e| CoreError::parse(format!("coding response did not match contract: {}", e)))?;
    Ok(response
        .suggested_codes
        .into_iter()
        .filter(|s| !s.label.trim().is_empty())
        .collect())
}

/// Parse a theme-mode response. Suggestions with an empty label are
/// discarded; member id validation is the theme engine's job.
pub fn parse_theme_suggestions(raw: &str) -> CoreResult<Vec<ThemeSuggestion>> {
    let body = strip_code_fences(raw);
    let response: ThemeResponse = serde_json::from_str(body)
        .map_err(|e| CoreError::parse(format!("theme response did not match contract: {}", e)))?;
    Ok(response
        .themes
        .into_iter()
        .filter(|t| !t.label.trim().is_empty())
        .collect())
}

pub fn parse_sentiment(raw: &str) -> CoreResult<SentimentOutcome> {
    serde_json::from_str(strip_code_fences(raw))
        .map_err(|e| CoreError::parse(format!("sentiment response did not match contract: {}", e)))
}

pub fn parse_discourse(raw: &str) -> CoreResult<DiscourseOutcome> {
    serde_json::from_str(strip_code_fences(raw))
        .map_err(|e| CoreError::parse(format!("discourse response did not match contract: {}", e)))
}

pub fn parse_narrative(raw: &str) -> CoreResult<NarrativeOutcome> {
    serde_json::from_str(strip_code_fences(raw))
        .map_err(|e| CoreError::parse(format!("narrative response did not match contract: {}", e)))
}
