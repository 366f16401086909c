pub const EDIT_SYSTEM: &str = include_str!("../data/prompts/edit_system.txt");
pub const GENERATE_SYSTEM: &str = include_str!("../data/prompts/generate_system.txt");

/// Default system instruction: editing when an input image is supplied,
/// plain generation otherwise.
pub fn default_system_instruction(has_input_image: bool) -> &'static str {
    if has_input_image {
        EDIT_SYSTEM
    } else {
        GENERATE_SYSTEM
    }
}
