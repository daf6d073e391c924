use crate::config::Config;
use crate::persona::{transient_note, PersonaRegistry};

pub fn general(config: &Config<'_>) -> String {
    format!(
        "Send a message, question, or instruction to the chat API and get the response back in your launcher. \
Conversation history is preserved for context (up to {tokens} tokens and {minutes} minutes). \
Responses are cached for {cache} minutes.

Prefix your message with modifiers:

🏷️  “(persona name)”: Use a custom or predefined persona.
🏷️  “N.N”: Adjust response randomness with temperature “N.N”, e.g., “1.5 why is the sky blue?”.
🏷️  “4”: Use the GPT-4 model.
🏷️  “copy”: Copy the response to the clipboard.
🏷️  “image”: Generate an image and return its URL.
🏷️  “new”: Start a new conversation with no history.
🏷️  “transient”: Exclude conversation history for this message.
🏷️  “redo”: Regenerate the previous response with a random temperature between 0 and 1.

Modifiers can be combined, e.g., “code copy 4 js uuid function” sends “code js uuid function” to GPT-4 with the code persona and copies the response. All modifiers must go at the beginning of the message.

Commands:

⚡️  “help”: Display this message.
⚡️  “history”: Display recent conversation history.
⚡️  “export”: Save conversation history to a file in your downloads directory.
⚡️  “cache”: Open the response cache directory.
⚡️  “clear”: Erase all conversation history (otherwise, conversations are stored up to one week).
⚡️  “config list”: Show current configuration settings.
⚡️  “config reset”: Reset all configuration options to default.
⚡️  “config set OPTION VALUE”: Set the configuration OPTION to VALUE, e.g., “config set default_action copy”.
⚡️  “persona list”: View a summary of personas.
⚡️  “persona export”: Save all personas and their prompts to a file in your downloads directory.
⚡️  “persona delete NAME”: Delete a persona.
⚡️  “persona reset”: Reset personas to default. This erases any custom personas you added.
⚡️  “persona set default SYSTEM_MESSAGE”: Change the default persona’s system message.
⚡️  “persona set NAME SYSTEM_MESSAGE”: Add or modify a persona.
⚡️  “version”: Display the version and check if a new version is available.",
        tokens = config.max_history_tokens(),
        minutes = config.max_history_minutes(),
        cache = config.cache_expiration_minutes(),
    )
}

pub fn api_key() -> &'static str {
    "quickchat requires an OpenAI API key.

1. Create an OpenAI account at https://platform.openai.com/signup.
2. Get an API key at https://platform.openai.com/account/api-keys.
3. Save it with the command:

👉    config set api_key sk-×××××××××××××××××××

The OPENAI_API_KEY environment variable is used when no key is configured."
}

pub fn config(config: &Config<'_>) -> String {
    format!(
        "To change any of the following values, use the “config set” command, e.g., “config set default_action copy”.\n\n⎯\n\n{}",
        config.show()
    )
}

pub fn persona(personas: &PersonaRegistry<'_>) -> String {
    format!(
        "To add or update personas, use the “persona set NAME SYSTEM_MESSAGE” command, e.g., “persona set pierre Translate the following text into French”. Delete a persona with “persona delete NAME”. Revert all personas to default with “persona reset”.\n\n⎯\n\n{}\n\n{}",
        personas.show(),
        transient_note()
    )
}
