//! Prompt assembly for the render and edit providers

use crate::planner::StagingPlan;
use crate::style::Style;

/// Constraints appended to every rendering prompt
pub const CONTINUITY_CONSTRAINTS: &str = "Preserve architectural layout and room structure. Do not change camera angle.
Allow subtle lighting and surface adjustments to maintain seamless continuity.
No visible seams or cut lines. Consistent wall shading and continuous surfaces.
Consistent lighting direction and color temperature. Preserve global perspective and vanishing points.";

const PLANNED_DEFAULT_POSITIVE: &str =
    "Edit this exact room photo. Add furniture per plan. Must visibly change room.";

const EDIT_DEFAULT_POSITIVE: &str = "Add NEW furniture that is clearly visible. At minimum add: a sofa, a coffee table, and a rug. Do not return the original image unchanged.";

/// Positive and negative text resolved from the style pack and user input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptSet {
    /// Style pack positive text and user refinement, blank-line separated
    pub positive: String,
    pub negative: String,
}

impl PromptSet {
    /// Merge the style's prompt pack with the user's refinement
    #[must_use]
    pub fn resolve(style: &Style, user_prompt: Option<&str>) -> Self {
        let pack = style.prompt_pack();
        let user = clean_user_prompt(user_prompt);

        let positive = [pack.map(|p| p.positive), user.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join("\n\n");

        Self {
            positive,
            negative: pack.map(|p| p.negative.to_string()).unwrap_or_default(),
        }
    }

    fn negative_suffix(&self) -> String {
        if self.negative.is_empty() {
            String::new()
        } else {
            format!("\n\nNegative prompts:\n{}", self.negative)
        }
    }
}

/// Drop empty refinements and the literal `"none"` some clients send
#[must_use]
pub fn clean_user_prompt(prompt: Option<&str>) -> Option<String> {
    prompt
        .map(str::trim)
        .filter(|p| !p.is_empty() && !p.eq_ignore_ascii_case("none"))
        .map(str::to_string)
}

/// Sentence naming the style's furniture to add
#[must_use]
pub fn furniture_note(style: &Style, more_furniture: bool) -> String {
    if more_furniture {
        format!(
            "Add NEW furniture objects: {}, additional decor items. Make them clearly visible and prominent.",
            style.furniture()
        )
    } else {
        format!(
            "Add NEW furniture objects: {}. Make them clearly visible and prominent.",
            style.furniture()
        )
    }
}

/// Prompt for the unmasked low-strength coherence pass
#[must_use]
pub fn coherence_prompt(style: &Style, prompts: &PromptSet) -> String {
    format!(
        "Enhance this room photo for {} style. {}\nImprove lighting consistency, surface materials, and atmospheric coherence.\nDo not add or remove furniture. Maintain exact camera angle and room structure.\nSubtle adjustments only for realistic rendering.{}",
        style,
        CONTINUITY_CONSTRAINTS,
        prompts.negative_suffix()
    )
}

/// Renderer prompt carrying a staging plan
#[must_use]
pub fn planned_staging_prompt(prompts: &PromptSet, plan: &StagingPlan) -> String {
    let positive = if prompts.positive.is_empty() {
        PLANNED_DEFAULT_POSITIVE
    } else {
        prompts.positive.as_str()
    };
    format!(
        "{}\n\n{}\n\nStaging Plan:\n{}{}",
        positive,
        CONTINUITY_CONSTRAINTS,
        plan.to_pretty_json(),
        prompts.negative_suffix()
    )
}

/// Renderer prompt when no planner is configured
#[must_use]
pub fn unplanned_staging_prompt(style: &Style, prompts: &PromptSet, more_furniture: bool) -> String {
    let positive = if prompts.positive.is_empty() {
        format!(
            "Edit this room photo in {} style. Add NEW furniture that is clearly visible: a sofa, a coffee table, and a rug. Must visibly change room. {}",
            style,
            furniture_note(style, more_furniture)
        )
    } else {
        prompts.positive.clone()
    };
    format!(
        "{}\n\n{}{}",
        positive,
        CONTINUITY_CONSTRAINTS,
        prompts.negative_suffix()
    )
}

/// Prompt for the edit API
#[must_use]
pub fn edit_prompt(style: &Style, prompts: &PromptSet, more_furniture: bool) -> String {
    let positive = if prompts.positive.is_empty() {
        format!("{} {}", EDIT_DEFAULT_POSITIVE, furniture_note(style, more_furniture))
    } else {
        prompts.positive.clone()
    };
    format!(
        "{}\n\n{}{}",
        positive,
        CONTINUITY_CONSTRAINTS,
        prompts.negative_suffix()
    )
}
