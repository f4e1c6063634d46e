use parley_core::domain::auto_reply::EffectiveAutoReplyConfig;
use parley_core::domain::conversation::{Message, Sender};
use parley_core::suggestions::{Suggestion, SuggestionResponse};

pub const REASON_AUTO_REPLY_DISABLED: &str = "auto_reply_disabled";
pub const REASON_LAST_SENDER_NOT_CUSTOMER: &str = "last_sender_not_customer";
pub const REASON_EMPTY_CONVERSATION: &str = "empty_conversation";
pub const REASON_NO_QUALIFYING_SUGGESTION: &str = "no_qualifying_suggestion";

#[derive(Clone, Debug, PartialEq)]
pub enum AutoReplyDecision {
    Send { suggestion: Suggestion },
    Skip { reason_code: &'static str },
}

/// Decision gate in front of autonomous replies.
///
/// Never replies unless enabled, and never reacts to anything but a customer
/// message, so the service cannot answer its own output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AutoReplyGuard;

impl AutoReplyGuard {
    pub fn new() -> Self {
        Self
    }

    /// Checks that must pass before any suggestion is requested.
    pub fn precheck(
        &self,
        config: &EffectiveAutoReplyConfig,
        messages: &[Message],
    ) -> Option<&'static str> {
        if !config.enabled {
            return Some(REASON_AUTO_REPLY_DISABLED);
        }

        match messages.last() {
            None => Some(REASON_EMPTY_CONVERSATION),
            Some(last) if last.sender != Sender::Customer => Some(REASON_LAST_SENDER_NOT_CUSTOMER),
            Some(_) => None,
        }
    }

    pub fn evaluate(
        &self,
        config: &EffectiveAutoReplyConfig,
        messages: &[Message],
        response: &SuggestionResponse,
    ) -> AutoReplyDecision {
        if let Some(reason_code) = self.precheck(config, messages) {
            return AutoReplyDecision::Skip { reason_code };
        }

        match response.best_at_or_above(config.confidence_threshold) {
            Some(suggestion) => AutoReplyDecision::Send { suggestion: suggestion.clone() },
            None => AutoReplyDecision::Skip { reason_code: REASON_NO_QUALIFYING_SUGGESTION },
        }
    }
}
