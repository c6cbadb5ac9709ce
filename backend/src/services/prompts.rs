//! Prompt composition
//!
//! Pure transformations from (instruction, context, history, new input) to
//! a model-ready request. No I/O happens here.

use crate::external::llm::{CompletionOptions, CompletionRequest, PromptMessage};
use shared::ChatTurn;

/// Sampling options for conversational endpoints
pub const CHAT_OPTIONS: CompletionOptions = CompletionOptions {
    temperature: 0.7,
    max_tokens: None,
};

/// Sampling options for image analysis (low temperature, bounded output)
pub const ANALYSIS_OPTIONS: CompletionOptions = CompletionOptions {
    temperature: 0.3,
    max_tokens: Some(300),
};

/// Number of recent turns echoed into the system-prompt transcript
const TRANSCRIPT_TURNS: usize = 10;

/// Render the most recent turns as a role-tagged transcript
fn transcript(history: &[ChatTurn]) -> String {
    let start = history.len().saturating_sub(TRANSCRIPT_TURNS);
    history[start..]
        .iter()
        .map(|turn| format!("{}: {}", turn.role.code(), turn.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// System instruction for the general crop advisor
///
/// Domain-restricted: off-topic questions get a fixed courteous redirect,
/// and responses are capped at 2-3 sentences.
pub fn crop_advisor_system_prompt(crop_context: &str, history: &[ChatTurn]) -> String {
    format!(
        "You are an expert agricultural AI assistant specializing in crop management. \
         You have access to comprehensive information about a specific crop and its recent history.\n\
         \n\
         IMPORTANT:\n\
         - Keep responses very short - maximum 2-3 sentences. Be direct and conversational like texting a friend.\n\
         - ONLY answer questions related to farming, agriculture, crops, plants, soil, weather, pests, diseases, irrigation, fertilizers, and crop management.\n\
         - If asked about anything unrelated to farming/agriculture (like human health, general topics, etc.), politely redirect: \"I'm your crop assistant - let's focus on your farming needs! What would you like to know about your crop?\"\n\
         \n\
         Your role is to provide personalized advice based on the specific crop's current state and history. \
         Reference recent activities, disease detections, and weather conditions when relevant. \
         Give actionable recommendations for crop care.\n\
         \n\
         CROP CONTEXT:\n\
         {}\n\
         \n\
         Current conversation:\n\
         {}",
        crop_context,
        transcript(history)
    )
}

/// System instruction for the disease specialist chat
///
/// Narrower framing: the conversation is about one diagnosed disease on
/// one crop, with the detection summary available as grounding.
pub fn disease_chat_system_prompt(
    crop_name: &str,
    crop_context: &str,
    disease_name: &str,
    detection_summary: &str,
) -> String {
    format!(
        "You are a plant pathologist expert on {crop_name}.\n\
         \n\
         Crop Context: {crop_context}\n\
         Analysis Context: {detection_summary}\n\
         \n\
         The user has a {crop_name} plant with analysis result: {disease_name}.\n\
         \n\
         IMPORTANT: Keep responses very short - maximum 2-3 sentences. Be direct and concise.\n\
         \n\
         Answer briefly and to the point. No long explanations.",
        crop_name = crop_name,
        crop_context = crop_context,
        disease_name = disease_name,
        detection_summary = detection_summary,
    )
}

/// System instruction for image analysis
///
/// Demands a strict machine-parseable JSON reply with the six analysis
/// fields; anything else is treated as a failed analysis by the caller.
fn disease_analysis_system_prompt(crop_name: &str, crop_context: &str) -> String {
    format!(
        "You are a plant pathologist. Analyze {crop_name} images for diseases.\n\
         \n\
         Crop Context: {crop_context}\n\
         \n\
         Respond in JSON format with very short, human-like answers:\n\
         {{\n\
         \x20   \"disease\": \"Disease name or 'Healthy Plant'\",\n\
         \x20   \"cause\": \"Short cause (5-8 words max)\",\n\
         \x20   \"confidence\": 85,\n\
         \x20   \"severity\": \"Low/Moderate/High or 'None'\",\n\
         \x20   \"precautions\": [\"Brief tip\", \"Brief tip\"],\n\
         \x20   \"treatment\": [\"Simple action\", \"Simple action\"]\n\
         }}\n\
         \n\
         Keep everything very short and conversational.",
        crop_name = crop_name,
        crop_context = crop_context,
    )
}

/// Compose the multimodal image-analysis request
pub fn disease_analysis_request(
    crop_name: &str,
    crop_context: &str,
    image_base64: &str,
) -> CompletionRequest {
    CompletionRequest {
        messages: vec![
            PromptMessage::system(disease_analysis_system_prompt(crop_name, crop_context)),
            PromptMessage::user_with_image(
                format!("Analyze this {} plant for diseases:", crop_name),
                image_base64,
            ),
        ],
        options: ANALYSIS_OPTIONS,
    }
}

/// Compose a chat request: system first, prior turns in order, new user
/// message last
pub fn compose_chat_request(
    system_prompt: String,
    history: &[ChatTurn],
    user_text: &str,
    options: CompletionOptions,
) -> CompletionRequest {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(PromptMessage::system(system_prompt));
    for turn in history {
        messages.push(PromptMessage {
            role: turn.role.code(),
            content: crate::external::llm::MessageContent::Text(turn.content.clone()),
        });
    }
    messages.push(PromptMessage::user(user_text));

    CompletionRequest { messages, options }
}
