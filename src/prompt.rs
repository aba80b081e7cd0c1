//! Instruction prompts sent alongside each image.
//!
//! Templates may contain a `{LANGUAGE}` placeholder. It is replaced with the
//! display name of the configured language code when the code is in
//! [`LANGUAGES`], and with the raw code otherwise.

use crate::config::EnrichmentConfig;
use crate::types::Improvement;

/// Placeholder substituted with the target language.
pub const LANGUAGE_PLACEHOLDER: &str = "{LANGUAGE}";

/// Built-in instruction used when no custom template is configured.
pub const DEFAULT_TEMPLATE: &str = "\
You are an expert in accessibility and SEO, writing alt text for images. \
Analyze the image and write a concise, descriptive alt text that follows these rules:

Keep it short (1-2 sentences) and focus on the essential elements of the image rather than every detail.
Do not include phrases such as \"image of\" or \"picture of\".
Do not add prefixes like \"alt:\" or \"alt text:\".
Write the text in {LANGUAGE}, following the linguistic conventions of {LANGUAGE}.
For ambiguous images, describe them neutrally (e.g. \"A coffee cup on a wooden table\").
For abstract images with no clear focal point, describe general characteristics.
Include keywords relevant to the image's primary subject where they read naturally.
Use plain language a broad audience understands.

Output only the alt text, in {LANGUAGE}.";

/// Supported language codes and their display names.
pub const LANGUAGES: &[(&str, &str)] = &[
    ("sv", "Swedish"),
    ("no", "Norwegian"),
    ("dk", "Danish"),
    ("fi", "Finnish"),
    ("en", "English"),
    ("es", "Spanish"),
    ("fr", "French"),
    ("de", "German"),
    ("it", "Italian"),
    ("pt", "Portuguese"),
    ("nl", "Dutch"),
    ("ru", "Russian"),
    ("ja", "Japanese"),
    ("zh", "Chinese"),
    ("ko", "Korean"),
    ("ar", "Arabic"),
];

/// Display name for a language code, if known.
pub fn language_name(code: &str) -> Option<&'static str> {
    let code = code.trim();
    LANGUAGES
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(code))
        .map(|(_, name)| *name)
}

/// Substitute the language into `template`.
pub fn render(template: &str, language: &str) -> String {
    let language = language_name(language).unwrap_or(language);
    template.replace(LANGUAGE_PLACEHOLDER, language)
}

/// Instruction for a fresh generation under `config`.
///
/// A blank custom template counts as unset.
pub fn instruction(config: &EnrichmentConfig) -> String {
    let template = config
        .instruction_template
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(DEFAULT_TEMPLATE);
    render(template, &config.language)
}

/// Instruction asking the model to revise `previous` in the given direction.
pub fn improvement_instruction(
    config: &EnrichmentConfig,
    improvement: &Improvement,
    previous: &str,
) -> String {
    let direction = match improvement {
        Improvement::MoreDescriptive => {
            "Make it more descriptive: mention the important visual details it leaves out."
                .to_string()
        }
        Improvement::MoreConcise => {
            "Make it more concise: keep only the essential subject and context.".to_string()
        }
        Improvement::MoreAccessible => {
            "Make it more accessible: describe what a screen reader user needs to understand the image."
                .to_string()
        }
        Improvement::BetterSeo => {
            "Improve it for search: work in keywords for the main subject without stuffing."
                .to_string()
        }
        Improvement::TechnicalAccuracy => {
            "Make it technically accurate: name objects, materials and settings precisely."
                .to_string()
        }
        Improvement::BrandVoice => {
            "Match a professional brand voice: confident, friendly and consistent.".to_string()
        }
        Improvement::Custom(feedback) => format!("Apply this reviewer feedback: {feedback}"),
    };

    let mut prompt = instruction(config);
    prompt.push_str("\n\nA previous alt text for this image was:\n\"");
    prompt.push_str(previous.trim());
    prompt.push_str("\"\n\n");
    prompt.push_str(&direction);
    prompt.push_str("\nReturn only the revised alt text.");
    prompt
}
