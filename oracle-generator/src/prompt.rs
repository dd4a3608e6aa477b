/// Instruction template sent to the content model

/// Wraps the user's prompt in the creative-generation instruction
///
/// The instruction asks for Markdown that starts with a `# Title` and tells
/// the model to mark specific named entities with `[[WIKISEARCH: Name]]`.
pub fn build_instruction(prompt: &str) -> String {
    format!(
        "Act as a Creative Content Generator. The user will give you a prompt, idea, or theme: \"{prompt}\".\n\
         Analyze the user's request to determine the best format (e.g., Story, Poem, Screenplay, YouTube Script, Article).\n\
         **IMAGE RULES:**\n\
         1. For SPECIFIC named entities (famous people, historical figures, specific places), use the tag: [[WIKISEARCH: Exact Name]].\n\
         2. Do NOT use tags for generic scenes.\n\
         Your Goal: Create a compelling piece of content based on this.\n\
         Format: Markdown.\n\
         Start with a # Creative Title.\n\
         Then provide the content.\n"
    )
}
