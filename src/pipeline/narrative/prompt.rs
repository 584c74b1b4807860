//! Prompt contract for the narrative collaborator.
//!
//! Output is a pure function of (report, text, language): the same inputs
//! always produce byte-identical prompts.

use crate::models::TargetLanguage;

/// Stands in for the report when no image was analyzed.
pub const NO_XRAY_SENTINEL: &str = "No X-ray analysis provided.";
/// Stands in for the extracted text when the document had none.
pub const NO_TEXT_SENTINEL: &str = "No Medical Report Text provided.";

const SYSTEM_PREAMBLE: &str = "\
You are an expert doctor explaining a detailed diagnosis to a patient.

STRICT FORMATTING RULES:
1. PLAIN TEXT ONLY. Do not use markdown (no bold **, no headers #, no bullets -).
2. NO Emojis.
3. NO Numbered lists for sections.
4. Format exactly like the examples below.

REQUIRED OUTPUT FORMAT:

Vitals and Lab Data
[Medical Term] ([Simple Definition]): [Value] -> [Status]
[Medical Term] ([Simple Definition]): [Value] -> [Status]

X-Ray Findings
Condition: [Name]
Location: [Location]
Meaning: [Explanation]

Integrated Summary
[Detailed paragraph explaining the condition, evidence, and next steps in simple language.]
";

const ENGLISH_DIRECTIVE: &str = "\
OUTPUT LANGUAGE: ENGLISH.
- Provide a detailed layman explanation.
- Connect all dots between Vitals and X-Ray.
";

/// Section headers the narrative must use, in order.
pub const SECTION_HEADERS: [&str; 3] = ["Vitals and Lab Data", "X-Ray Findings", "Integrated Summary"];

/// Language directive. Every non-English target gets the full-length,
/// non-abbreviated translation instruction.
pub fn language_directive(language: TargetLanguage) -> String {
    if language.is_english() {
        return ENGLISH_DIRECTIVE.to_string();
    }
    let name = language.name().to_uppercase();
    format!(
        "OUTPUT LANGUAGE: {name}.
CRITICAL INSTRUCTION: DO NOT SHORTEN THE REPORT.
Provide a detailed and comprehensive explanation, same length as English.
Explain why a value is dangerous.
Use simple {lang} words, but keep the explanation long and clear.
Translate every single finding from the English logic.
",
        lang = language.name()
    )
}

pub fn build_system_prompt(language: TargetLanguage) -> String {
    format!("{SYSTEM_PREAMBLE}\n{}", language_directive(language))
}

/// User message carrying both data sources. Callers pass the already
/// sentinel-substituted strings.
pub fn build_user_message(report_json: &str, extracted_text: &str, language: TargetLanguage) -> String {
    format!(
        "Here is the raw data:

--- SOURCE 1: AI X-RAY ANALYSIS ---
{report_json}

--- SOURCE 2: MEDICAL REPORT TEXT ---
{extracted_text}

Please generate the Detailed Integrated Summary in {}.
",
        language.name()
    )
}
