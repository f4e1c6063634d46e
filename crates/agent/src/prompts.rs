use std::fmt::Write as _;

use parley_core::domain::conversation::{CustomerMemory, Message, Sender};

/// Messages included in a transcript; older ones are dropped.
pub const TRANSCRIPT_WINDOW: usize = 20;

pub struct SuggestionPromptInput<'a> {
    pub transcript: &'a [Message],
    /// Latest customer message, already in the language replies are written in.
    pub customer_message: &'a str,
    pub reply_language: &'a str,
    pub brand_tone: &'a str,
    pub memory: Option<&'a CustomerMemory>,
}

pub fn render_transcript(messages: &[Message]) -> String {
    let start = messages.len().saturating_sub(TRANSCRIPT_WINDOW);
    let mut transcript = String::new();
    for message in &messages[start..] {
        let speaker = match message.sender {
            Sender::Customer => "Customer",
            Sender::Agent => "Agent",
            Sender::System => "System",
        };
        let _ = writeln!(transcript, "{speaker}: {}", message.content.trim());
    }
    transcript
}

pub fn suggestion_prompt(input: &SuggestionPromptInput<'_>) -> String {
    let mut prompt = String::from(
        "You help a customer support agent reply to a customer. \
         Propose up to 3 candidate replies.\n",
    );

    if !input.reply_language.trim().is_empty() {
        let _ = writeln!(prompt, "Write every reply in language `{}`.", input.reply_language);
    }
    if !input.brand_tone.trim().is_empty() {
        let _ = writeln!(prompt, "Brand tone: {}", input.brand_tone.trim());
    }
    if let Some(memory) = input.memory.filter(|memory| !memory.is_empty()) {
        prompt.push_str("What we know about this customer:\n");
        if let Some(sensitivity) = &memory.pricing_sensitivity {
            let _ = writeln!(prompt, "- pricing sensitivity: {sensitivity}");
        }
        if !memory.interests.is_empty() {
            let _ = writeln!(prompt, "- interests: {}", memory.interests.join(", "));
        }
        if !memory.past_objections.is_empty() {
            let _ = writeln!(prompt, "- past objections: {}", memory.past_objections.join(", "));
        }
    }

    let _ = write!(
        prompt,
        "\nConversation so far:\n{}\nLatest customer message:\n{}\n\n",
        render_transcript(input.transcript),
        input.customer_message.trim()
    );
    prompt.push_str(
        "Respond with only a JSON array. Each element must be an object with \
         `text` (string), `confidence` (number between 0 and 1), `reasoning` (string) \
         and `product_recommendations` (array of product names, possibly empty).",
    );
    prompt
}

pub fn translation_prompt(text: &str, target_language: &str) -> String {
    format!(
        "Translate the following text into language `{target_language}`. \
         Respond with only the translation.\n\n{text}"
    )
}

pub fn analysis_prompt(transcript: &[Message]) -> String {
    format!(
        "Analyse this customer conversation.\n\n{}\n\
         Respond with only a JSON object with keys `intent` (one of buying, inquiry, \
         complaint, support, other), `sentiment` (positive, neutral or negative), \
         `emotions` (array of strings) and `objections` (array of categories such as \
         price, timing, authority, need, trust, competition).",
        render_transcript(transcript)
    )
}
