use std::fmt;
use std::str::FromStr;

use crate::sanitize::{sanitize_for_prompt, MAX_CRITERIA_CHARS};

/// Named selection criteria with canned descriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriteriaPreset {
    Best,
    People,
    Landscape,
    Action,
    Storytelling,
}

impl CriteriaPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Best => "best",
            Self::People => "people",
            Self::Landscape => "landscape",
            Self::Action => "action",
            Self::Storytelling => "storytelling",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Best => {
                "the strongest photos overall: sharp focus, good exposure, pleasing \
                 composition and a clear subject"
            }
            Self::People => {
                "photos of people with natural expressions, open eyes, flattering light \
                 and faces in focus"
            }
            Self::Landscape => {
                "landscape and scenery photos with strong composition, interesting light, \
                 depth and a level horizon"
            }
            Self::Action => {
                "action and movement shots that freeze a decisive moment with the subject \
                 sharp and well framed"
            }
            Self::Storytelling => {
                "photos that together tell the story of the event: key moments, details \
                 and context, avoiding near-duplicates"
            }
        }
    }
}

impl FromStr for CriteriaPreset {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "best" => Ok(Self::Best),
            "people" => Ok(Self::People),
            "landscape" => Ok(Self::Landscape),
            "action" => Ok(Self::Action),
            "storytelling" => Ok(Self::Storytelling),
            _ => Err(()),
        }
    }
}

impl fmt::Display for CriteriaPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text describing what to look for. Presets expand to their description;
/// anything else is user text and gets sanitized. Blank input means `best`.
pub fn criteria_description(criteria: &str) -> String {
    if criteria.trim().is_empty() {
        return CriteriaPreset::Best.description().to_string();
    }
    match criteria.parse::<CriteriaPreset>() {
        Ok(preset) => preset.description().to_string(),
        Err(()) => sanitize_for_prompt(criteria, MAX_CRITERIA_CHARS),
    }
}

/// Roughly how many photos a model should pick from `photo_count` cells.
pub fn approximate_pick_count(photo_count: usize, target_pct: f64) -> usize {
    let raw = (photo_count as f64 * target_pct / 100.0).round() as usize;
    raw.clamp(1, photo_count.max(1))
}

/// Inputs for one grid's prompt.
#[derive(Debug, Clone)]
pub struct SelectionPrompt<'a> {
    pub coord_range: &'a str,
    pub photo_count: usize,
    pub target_pct: f64,
    pub criteria: &'a str,
}

pub fn build_selection_prompt(p: &SelectionPrompt<'_>) -> String {
    let pick = approximate_pick_count(p.photo_count, p.target_pct);
    format!(
        "You are helping a photographer cull a large shoot.\n\
         The image is a grid of {count} photo thumbnails. Rows are labeled with letters \
         and columns with numbers; the coordinate of each photo is printed directly \
         under it. Valid coordinates are in the range {range}.\n\n\
         Select {criteria}.\n\n\
         Pick about {pick} of the {count} photos (roughly {pct:.0}%). When unsure \
         about a photo, include it.\n\
         Reply with only a comma-separated list of coordinates, for example: A1, B3, C7",
        count = p.photo_count,
        range = p.coord_range,
        criteria = criteria_description(p.criteria),
        pick = pick,
        pct = p.target_pct,
    )
}
