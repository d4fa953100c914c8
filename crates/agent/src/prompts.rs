//! Prompt templates shared by the agents.

pub const DELIVERY_ACKNOWLEDGEMENT: &str =
    "Thank you very much for providing your information! What can I do for you today?";

pub const DELIVERY_PROFILE_REQUEST: &str = "My pleasure to serve you! Could you please provide \
your name, phone number and address? In the following JSON format only:\n\n\
{\"user_name\": \"<client_name>\", \"user_phone_number\": \"<client_phone_number>\", \
\"user_address\": \"<client_address>\"}";

/// Who is talking, on whose behalf, and about what.
#[derive(Clone, Copy, Debug)]
pub struct TaskFrame<'a> {
    pub agent_name: &'a str,
    pub owner: &'a str,
    pub user_intent: &'a str,
    pub counterpart_description: &'a str,
}

pub fn check_chat_state(frame: TaskFrame<'_>, history: &str) -> String {
    let TaskFrame { agent_name, owner, user_intent, counterpart_description } = frame;
    format!(
        "Here is a conversation history between {owner}'s personal AI agent and the service agent.
The conversation is about to complete a task.

# Task that {owner} wants to complete:
{user_intent}

# Description of the service agent:
{counterpart_description}

# Conversation history

{history}

# Task for you
You are {agent_name} to continue the conversation. Based on the conversation history above, please determine the state of the conversation.

Here are states you can choose from:
[CONTINUE]: The conversation is still in progress and the task is not completed. Participants are still discussing the task.
[CONVERSATION_ENDS]: The task is completed. Participants in the conversation are satisfied with the outcome. [CONVERSATION_ENDS] exists in the conversation history. [PAYMENT_SUCCEEDED] exists in the conversation history.

Only reply with one of the states above.
"
    )
}

pub struct NegotiationPrompt<'a> {
    pub frame: TaskFrame<'a>,
    pub counterpart_name: &'a str,
    pub owner_profile: &'a str,
    pub history: &'a str,
    pub notes: &'a str,
}

pub fn generate_response(prompt: &NegotiationPrompt<'_>) -> String {
    let TaskFrame { agent_name, owner, user_intent, counterpart_description } = prompt.frame;
    let NegotiationPrompt { counterpart_name, owner_profile, history, notes, .. } = prompt;
    format!(
        "You are {agent_name}. You fulfill tasks on behalf of {owner}.
You will be chatting with a service agent {counterpart_name} to complete a task.
You are provided {owner}'s personal information and the description of the service agent.

# Task the user wants to complete
{user_intent}

# {owner}'s personal information
{owner_profile}

# Service agent's description
{counterpart_description}

# Conversation history
{history}

{notes}

# Task for you
You are {agent_name} to generate a response to {counterpart_name}. Do not include {agent_name} at the beginning of your response. If you find it difficult to complete the task after a few attempts, end the conversation politely.
"
    )
}

pub fn validate_response(frame: TaskFrame<'_>, history: &str, draft: &str) -> String {
    let TaskFrame { owner, user_intent, counterpart_description, .. } = frame;
    format!(
        "Here is a conversation history between {owner}'s personal AI agent and the service agent.
The conversation is about to complete a task.

# Task that {owner} wants to complete:
{user_intent}

# Description of the service agent:
{counterpart_description}

# Conversation history
{history}

# Task for you
Now the personal AI is about to reply to the service agent with this response:
{draft}

If you think the response is appropriate, please only reply with [YES].

If you think the response is not appropriate, please reply with one paragraph to explain why the response is not appropriate.
"
    )
}

/// Guidance folded into the next draft after the validator rejects one.
pub fn rejection_notes(draft: &str, reason: &str) -> String {
    format!(
        "# Notes\nPlease do not generate response like this: \n{draft}\n\nThe reason is: \n{reason}"
    )
}

pub fn retrieve_personal_info(
    frame: TaskFrame<'_>,
    counterpart_name: &str,
    personal_data: &str,
) -> String {
    let TaskFrame { owner, user_intent, counterpart_description, .. } = frame;
    format!(
        "I am doing a task for my client {owner}. The agent I am working with is {counterpart_name}.

# The task description from my client
{user_intent}

# The description of the service agent
{counterpart_description}

# Your task
Search through {owner}'s personal information and select the information that is relevant to the task and the service agent.
Based on the selected personal info, estimate the personal information for the task and service agent. Generate one single paragraph of 50 words.

# The personal information of my client

{personal_data}
"
    )
}

pub fn summarize_personal_preferences(personal_data: &str) -> String {
    format!(
        "Please summarize the following personal information into one single paragraph of 100 words.

# Personal information
{personal_data}
"
    )
}

pub fn respond_to_user(agent_name: &str, owner: &str, user_message: &str) -> String {
    format!(
        "You are {agent_name}, a personal AI assistant for {owner}.

# User Message
{user_message}

# Task
Generate a helpful, informative response to the user's message.
If the message is related to health or fitness topics, inform the user that you will consult with a health specialist agent for more detailed information.

Respond in a friendly, conversational manner.
"
    )
}

pub fn summarize_agent_chat(
    agent_name: &str,
    owner: &str,
    transcript: &str,
    original_message: &str,
) -> String {
    format!(
        "You are {agent_name}, a personal AI assistant for {owner}.

# Original User Message
{original_message}

# Conversation with Health Agent
{transcript}

# Task
Summarize the key information from your conversation with the health agent and provide a helpful response to the user's original message.
Include specific advice, recommendations, or insights that were provided by the health agent.

Respond in a friendly, conversational manner and make it clear that this information comes from consulting with a health specialist.
"
    )
}

pub fn extract_goals(message: &str) -> String {
    format!(
        "Based on the user's message below, extract any health or fitness goals they mention.
If no goals are mentioned, return an empty list.

User message: {message}

Return ONLY a valid JSON array of strings, each representing a goal. Example: [\"lose weight\", \"build muscle\"]
"
    )
}

pub fn extract_dietary_restrictions(message: &str) -> String {
    format!(
        "Based on the user's message below, extract any dietary restrictions or preferences they mention.
If none are mentioned, return an empty list.

User message: {message}

Return ONLY a valid JSON array of strings. Example: [\"vegetarian\", \"no nuts\", \"low carb\"]
"
    )
}

pub struct AdvicePrompt<'a> {
    pub advisor_name: &'a str,
    pub counterpart_name: &'a str,
    pub counterpart_owner: &'a str,
    pub user_intent: &'a str,
    pub profile_json: &'a str,
    pub history: &'a str,
    pub latest_message: &'a str,
}

pub fn health_advice(prompt: &AdvicePrompt<'_>) -> String {
    let AdvicePrompt {
        advisor_name,
        counterpart_name,
        counterpart_owner,
        user_intent,
        profile_json,
        history,
        latest_message,
    } = prompt;
    format!(
        "You are a professional health and fitness advisor named {advisor_name}. You are chatting with {counterpart_name}, which is the personal AI assistant of {counterpart_owner}.

# User Task
{user_intent}

# Health Profile
{profile_json}

# Conversation History
{history}

# Latest Message
{latest_message}

# Your Task
Generate a helpful, informative response about health, fitness, nutrition, or wellness based on the conversation history and the user's health profile. Be supportive, encouraging, and provide actionable advice. Do not make up specific medical claims or diagnoses. When in doubt, suggest consulting a healthcare professional.

If the user is asking for a workout plan, meal plan, or tracking feature, you can offer to create one based on their goals and preferences.
"
    )
}

#[cfg(test)]
mod tests {
    use super::{
        check_chat_state, rejection_notes, validate_response, TaskFrame, DELIVERY_PROFILE_REQUEST,
    };

    fn frame() -> TaskFrame<'static> {
        TaskFrame {
            agent_name: "alice-ai",
            owner: "Alice",
            user_intent: "Order dinner",
            counterpart_description: "Food delivery agent",
        }
    }

    #[test]
    fn chat_state_prompt_lists_both_states_and_history() {
        let prompt = check_chat_state(frame(), "byte: hello");
        assert!(prompt.contains("[CONTINUE]"));
        assert!(prompt.contains("[CONVERSATION_ENDS]"));
        assert!(prompt.contains("byte: hello"));
        assert!(prompt.contains("You are alice-ai"));
    }

    #[test]
    fn validation_prompt_embeds_draft() {
        let prompt = validate_response(frame(), "history", "I'd like pad thai");
        assert!(prompt.contains("I'd like pad thai"));
        assert!(prompt.contains("only reply with [YES]"));
    }

    #[test]
    fn rejection_notes_quote_draft_and_reason() {
        let notes = rejection_notes("draft text", "too vague");
        assert!(notes.starts_with("# Notes"));
        assert!(notes.contains("draft text"));
        assert!(notes.ends_with("too vague"));
    }

    #[test]
    fn profile_request_contains_json_template() {
        assert!(DELIVERY_PROFILE_REQUEST.contains(r#"{"user_name": "<client_name>""#));
        assert!(DELIVERY_PROFILE_REQUEST.contains(r#""user_address": "<client_address>"}"#));
    }
}
