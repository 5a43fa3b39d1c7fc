use crate::language::Language;
use crate::types::{CompletionRequest, Message, UpstreamMessage};

const PERSONA: &str = "You are a helpful and compassionate medical health assistant. Your role is to:
- Provide general health information and wellness advice
- Help users understand common symptoms and when to seek medical attention
- Offer guidance on healthy lifestyle choices
- Answer questions about medications, treatments, and medical procedures in general terms
- Support mental health and emotional well-being";

const DISCLAIMERS: &str = "IMPORTANT DISCLAIMERS you must follow:
- Always remind users that you are an AI assistant and cannot replace professional medical advice
- For serious symptoms or emergencies, always advise seeking immediate medical attention
- Never diagnose conditions or prescribe medications
- Encourage users to consult healthcare professionals for personalized medical advice";

const STYLE: &str =
    "Keep responses clear, concise, and empathetic. Use simple language that's easy to understand.";

/// Persona, hard language directive, then the mandatory disclaimers.
pub fn build_system_prompt(language: Language) -> String {
    format!(
        "{}\n\nCRITICAL LANGUAGE INSTRUCTION: {}\n\n{}\n\n{}",
        PERSONA,
        language.directive(),
        DISCLAIMERS,
        STYLE
    )
}

/// Prepends the system instruction to the caller's conversation, order kept.
pub fn build_completion_request(
    model: &str,
    conversation: &[Message],
    language: Language,
) -> CompletionRequest {
    let mut messages = Vec::with_capacity(conversation.len() + 1);
    messages.push(UpstreamMessage {
        role: "system".to_string(),
        content: build_system_prompt(language),
    });
    messages.extend(conversation.iter().map(|m| UpstreamMessage {
        role: m.role.as_str().to_string(),
        content: m.content.clone(),
    }));

    CompletionRequest {
        model: model.to_string(),
        messages,
        stream: true,
    }
}
