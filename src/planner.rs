//! Staging plan generation
//!
//! A text model looks at the room photo and proposes which furniture to add
//! and where. When the model fails or answers with something unusable, the
//! orchestrator substitutes [`fallback_plan`], a deterministic per-style plan.

use crate::error::{Result, StagingError};
use crate::prompts::clean_user_prompt;
use crate::providers::TextGenerator;
use crate::style::{Style, StylePalette};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Constraints every plan must respect
pub const PRESERVATION_CONSTRAINTS: [&str; 3] = [
    "do not block doors or windows",
    "preserve existing architecture",
    "keep walls and ceiling unchanged",
];

const DEFAULT_LIGHTING: &str = "natural daylight with warm ambient lighting";
const DEFAULT_ROOM_TYPE: &str = "living room";

/// One piece of furniture or decor to add
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanItem {
    pub item: String,
    pub placement: String,
    pub scale: String,
    pub material: String,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Structured staging plan in the planner's JSON shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingPlan {
    pub room_type: String,
    pub style: String,
    pub add_items: Vec<PlanItem>,
    #[serde(default)]
    pub avoid: Vec<String>,
    #[serde(default)]
    pub lighting: String,
    #[serde(default)]
    pub color_palette: Vec<String>,
}

impl StagingPlan {
    /// Reject plans missing the fields the renderer relies on
    ///
    /// # Errors
    /// - [`StagingError::Planner`] naming the first missing field
    pub fn validate(&self) -> Result<()> {
        if self.room_type.trim().is_empty() {
            return Err(StagingError::planner("plan is missing roomType"));
        }
        if self.style.trim().is_empty() {
            return Err(StagingError::planner("plan is missing style"));
        }
        if self.add_items.is_empty() {
            return Err(StagingError::planner("plan has no addItems"));
        }
        Ok(())
    }

    /// Pretty JSON with camelCase keys, as embedded in render prompts
    #[must_use]
    pub fn to_pretty_json(&self) -> String {
        // Serializing plain strings and vectors cannot fail
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// Build the extraction prompt sent to the text model
#[must_use]
pub fn planning_prompt(style: &Style, user_prompt: Option<&str>, more_furniture: bool) -> String {
    let requirements = clean_user_prompt(user_prompt)
        .map(|p| format!("Additional requirements: {}", p))
        .unwrap_or_default();
    let more = if more_furniture {
        "Include more furniture items and decor."
    } else {
        ""
    };

    format!(
        r#"Analyze this room photo and create a detailed staging plan in JSON format.

Style: {style}
{requirements}
{more}

Return ONLY valid JSON with this exact structure (no markdown, no code blocks):
{{
  "roomType": "living room" | "bedroom" | "dining room" | "kitchen" | "office" | "other",
  "style": "{style}",
  "addItems": [
    {{
      "item": "sofa",
      "placement": "on floor, center-left, facing window",
      "scale": "large",
      "material": "fabric",
      "color": "navy blue",
      "notes": "should be clearly visible"
    }},
    {{
      "item": "coffee table",
      "placement": "on floor, center, in front of sofa",
      "scale": "medium",
      "material": "wood",
      "color": "natural wood",
      "notes": "positioned for easy access"
    }},
    {{
      "item": "rug",
      "placement": "on floor, under sofa and coffee table",
      "scale": "large",
      "material": "wool",
      "color": "beige",
      "notes": "defines seating area"
    }}
  ],
  "avoid": [
    "do not block doors or windows",
    "preserve existing architecture",
    "keep walls and ceiling unchanged"
  ],
  "lighting": "natural daylight with warm ambient lighting",
  "colorPalette": ["navy blue", "beige", "natural wood", "white"]
}}

Requirements:
- Must include at least: sofa, coffee table, rug
- Each item must have specific placement instructions
- Avoid array must include preservation constraints
- Return ONLY the JSON object, no other text."#
    )
}

/// Strip a surrounding Markdown code fence, if any
#[must_use]
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"));
    match body {
        Some(inner) => inner.trim().strip_suffix("```").unwrap_or(inner).trim(),
        None => trimmed,
    }
}

/// Parse and validate a raw model response
///
/// # Errors
/// - [`StagingError::Planner`] for invalid JSON or missing fields
pub fn parse_plan_response(text: &str) -> Result<StagingPlan> {
    let json = strip_code_fences(text);
    let plan: StagingPlan = serde_json::from_str(json)
        .map_err(|e| StagingError::planner(format!("plan is not valid JSON: {}", e)))?;
    plan.validate()?;
    Ok(plan)
}

/// Deterministic plan used when the text model is unavailable
#[must_use]
pub fn fallback_plan(style: &Style, more_furniture: bool) -> StagingPlan {
    let StylePalette { items, colors } = style.palette();
    let item = |item: &str, placement: &str, scale: &str, material: &str, color: &str| PlanItem {
        item: item.to_string(),
        placement: placement.to_string(),
        scale: scale.to_string(),
        material: material.to_string(),
        color: color.to_string(),
        notes: None,
    };

    let mut add_items = vec![
        item(items[0], "on floor, center-left", "large", "fabric", colors[0]),
        item(items[1], "on floor, center, in front of sofa", "medium", "wood", colors[1]),
        item(items[2], "on floor, under sofa and coffee table", "large", "wool", colors[2]),
    ];
    if more_furniture {
        add_items.push(item(items[3], "on floor, behind sofa", "medium", "metal", colors[3]));
        add_items.push(item("side table", "on floor, next to sofa", "small", "wood", colors[1]));
    }

    StagingPlan {
        room_type: DEFAULT_ROOM_TYPE.to_string(),
        style: style.slug().to_string(),
        add_items,
        avoid: PRESERVATION_CONSTRAINTS.iter().map(|s| (*s).to_string()).collect(),
        lighting: DEFAULT_LIGHTING.to_string(),
        color_palette: colors.iter().map(|s| (*s).to_string()).collect(),
    }
}

/// Asks a text model for a staging plan
#[derive(Clone)]
pub struct PlanningAdvisor {
    generator: Arc<dyn TextGenerator>,
}

impl std::fmt::Debug for PlanningAdvisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanningAdvisor")
            .field("model", &self.generator.model_name())
            .finish()
    }
}

impl PlanningAdvisor {
    #[must_use]
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Produce a validated plan
    ///
    /// # Errors
    /// - [`StagingError::Planner`] when the model call fails or its answer
    ///   does not parse into a usable plan
    pub async fn plan(
        &self,
        style: &Style,
        user_prompt: Option<&str>,
        image_png: Option<&[u8]>,
        more_furniture: bool,
        request_id: &str,
    ) -> Result<StagingPlan> {
        let prompt = planning_prompt(style, user_prompt, more_furniture);
        tracing::debug!(
            request_id = %request_id,
            model = %self.generator.model_name(),
            prompt_len = prompt.len(),
            with_image = image_png.is_some(),
            "Requesting staging plan"
        );

        let text = self
            .generator
            .complete(&prompt, image_png, request_id)
            .await
            .map_err(|e| match e {
                StagingError::Planner(_) | StagingError::Cancelled => e,
                other => StagingError::planner(other.to_string()),
            })?;

        let plan = parse_plan_response(&text)?;
        tracing::info!(
            request_id = %request_id,
            room_type = %plan.room_type,
            items = plan.add_items.len(),
            "Planning succeeded"
        );
        Ok(plan)
    }
}
