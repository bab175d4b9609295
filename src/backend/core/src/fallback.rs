//! Canned responses served when generation is unavailable.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// The AI features that can fall back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    Roast,
    Personality,
    Story,
}

impl Feature {
    pub const ALL: [Feature; 3] = [Feature::Roast, Feature::Personality, Feature::Story];

    /// Field name of the generated text in a response envelope.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Roast => "roast",
            Self::Personality => "personality",
            Self::Story => "story",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "roast" => Ok(Self::Roast),
            "personality" => Ok(Self::Personality),
            "story" => Ok(Self::Story),
            other => Err(format!("unknown feature: {other}")),
        }
    }
}

const ROASTS: &[&str] = &[
    "Your top artists read like a gas-station playlist that gained sentience and immediately regretted it.",
    "You've listened to the same three songs so many times they've started charging you rent.",
    "Your taste is so mainstream the algorithm recommends you to itself as a safe default.",
    "Congratulations, your listening history is the audio equivalent of plain toast.",
    "Your genres span the full emotional range from 'sad in a car' to 'sad in a different car'.",
    "Even your shuffle button has given up trying to surprise you.",
];

const PERSONALITIES: &[&str] = &[
    "The Comfort Seeker: you return to familiar songs like a favourite sweater, and you are not sorry about it.",
    "The Mood Architect: every playlist is a carefully built room, and you decide exactly how it feels.",
    "The Quiet Explorer: you wander into new genres alone at 2 a.m. and tell nobody what you found.",
    "The Loyal Superfan: once an artist earns your trust, they have it for the whole discography.",
    "The Main Character: your life has a soundtrack and you are always mid-montage.",
];

const STORIES: &[&str] = &[
    "It started with one song on repeat during a rainy commute. By spring it had become a whole season of your life, and every track since has been a chapter you keep rereading.",
    "Somewhere between the late-night deep cuts and the morning anthems, your music became a diary. This year it wrote about restlessness, a few brave detours, and a lot of coming home.",
    "Your year in music reads like a road trip: a loud start, a long quiet stretch through unfamiliar genres, and a final stretch singing along with the windows down.",
    "The story of your listening is one of loyalty. New sounds came and went, but a handful of artists stayed beside you through every plot twist.",
];

/// Operator-supplied payloads. A non-empty list replaces that feature's
/// built-in payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackConfig {
    #[serde(default)]
    pub roast: Vec<String>,
    #[serde(default)]
    pub personality: Vec<String>,
    #[serde(default)]
    pub story: Vec<String>,
}

impl FallbackConfig {
    pub fn catalog(&self) -> FallbackCatalog {
        FallbackCatalog::with_entries([
            (Feature::Roast, self.roast.clone()),
            (Feature::Personality, self.personality.clone()),
            (Feature::Story, self.story.clone()),
        ])
    }
}

/// Immutable category → non-empty list of canned payloads.
#[derive(Debug, Clone)]
pub struct FallbackCatalog {
    entries: HashMap<Feature, Vec<String>>,
}

impl Default for FallbackCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FallbackCatalog {
    /// The built-in catalog.
    pub fn builtin() -> Self {
        let entries = [
            (Feature::Roast, ROASTS),
            (Feature::Personality, PERSONALITIES),
            (Feature::Story, STORIES),
        ]
        .into_iter()
        .map(|(feature, texts)| (feature, texts.iter().map(|t| t.to_string()).collect()))
        .collect();

        Self { entries }
    }

    /// Catalog with custom texts. Features without texts keep the built-in ones.
    pub fn with_entries(custom: impl IntoIterator<Item = (Feature, Vec<String>)>) -> Self {
        let mut catalog = Self::builtin();
        for (feature, texts) in custom {
            if !texts.is_empty() {
                catalog.entries.insert(feature, texts);
            }
        }
        catalog
    }

    /// All payloads for a feature.
    pub fn entries(&self, feature: Feature) -> &[String] {
        self.entries.get(&feature).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Uniform random pick for a feature.
    pub fn select(&self, feature: Feature) -> &str {
        self.entries(feature)
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(FALLBACK_OF_LAST_RESORT)
    }
}

const FALLBACK_OF_LAST_RESORT: &str = "Your music taste is beyond words. Literally: we're out of them right now.";
