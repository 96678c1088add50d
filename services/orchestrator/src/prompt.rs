use datastore::ConversationTurn;

pub const PREAMBLE: &str = "You are a helpful business analytics assistant.";

/// Prompt for the general branch: preamble, prior turns oldest first, then
/// the new message.
pub fn build(context: &[ConversationTurn], message: &str) -> String {
    let mut prompt = format!("{PREAMBLE}\n\n");
    if !context.is_empty() {
        prompt.push_str("Recent conversation:\n");
        for turn in context {
            prompt.push_str(&format!("User: {}\nAssistant: {}\n", turn.message, turn.response));
        }
        prompt.push('\n');
    }
    prompt.push_str(&format!(
        "User: {message}\n\nProvide a helpful, concise response in under 150 words."
    ));
    prompt
}
