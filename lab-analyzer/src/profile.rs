//! Optional user profile, rendered into the labeled text blob the
//! recommendation prompt embeds verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::ProfileForm;

pub const MIN_AGE: u8 = 1;
pub const MAX_AGE: u8 = 120;
const NONE_SPECIFIED: &str = "None specified";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "male" => Some(Self::Male),
            "female" => Some(Self::Female),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Male => "Male",
            Self::Female => "Female",
            Self::Other => "Other",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityLevel {
    Sedentary,
    LightlyActive,
    ModeratelyActive,
    VeryActive,
    ExtremelyActive,
}

impl ActivityLevel {
    pub const ALL: [Self; 5] = [
        Self::Sedentary,
        Self::LightlyActive,
        Self::ModeratelyActive,
        Self::VeryActive,
        Self::ExtremelyActive,
    ];

    /// Accepts the display label ("Lightly Active") or a snake/kebab variant.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_ascii_lowercase();
        Self::ALL.into_iter().find(|level| {
            level
                .to_string()
                .replace(' ', "")
                .eq_ignore_ascii_case(&normalized)
        })
    }
}

impl fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Sedentary => "Sedentary",
            Self::LightlyActive => "Lightly Active",
            Self::ModeratelyActive => "Moderately Active",
            Self::VeryActive => "Very Active",
            Self::ExtremelyActive => "Extremely Active",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub age: Option<u8>,
    pub gender: Option<Gender>,
    pub activity_level: Option<ActivityLevel>,
    pub conditions: String,
    pub medications: String,
    pub dietary_preferences: String,
}

impl UserProfile {
    /// Collects a profile from the submitted form. Nothing here fails: ages
    /// are clamped and unknown choices are dropped.
    pub fn from_form(form: &ProfileForm) -> Self {
        Self {
            age: form.age.map(clamp_age),
            gender: form.gender.as_deref().and_then(Gender::parse),
            activity_level: form.activity_level.as_deref().and_then(ActivityLevel::parse),
            conditions: form.conditions.trim().to_string(),
            medications: form.medications.trim().to_string(),
            dietary_preferences: form.dietary_preferences.trim().to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.age.is_none()
            && self.gender.is_none()
            && self.activity_level.is_none()
            && self.conditions.is_empty()
            && self.medications.is_empty()
            && self.dietary_preferences.is_empty()
    }

    /// One labeled line per field, "None specified" for anything left blank.
    pub fn to_blob(&self) -> String {
        let age = self
            .age
            .map(|a| format!("{a} years"))
            .unwrap_or_else(|| NONE_SPECIFIED.to_string());
        [
            format!("Age: {age}"),
            format!("Gender: {}", or_none(self.gender)),
            format!("Activity Level: {}", or_none(self.activity_level)),
            format!("Current Health Conditions: {}", text_or_none(&self.conditions)),
            format!("Current Medications: {}", text_or_none(&self.medications)),
            format!("Dietary Preferences: {}", text_or_none(&self.dietary_preferences)),
        ]
        .join("\n")
    }
}

fn clamp_age(age: i64) -> u8 {
    age.clamp(i64::from(MIN_AGE), i64::from(MAX_AGE)) as u8
}

fn or_none<T: fmt::Display>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| NONE_SPECIFIED.to_string())
}

fn text_or_none(text: &str) -> &str {
    if text.trim().is_empty() {
        NONE_SPECIFIED
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_labels_every_field() {
        let profile = UserProfile::from_form(&ProfileForm {
            age: Some(42),
            gender: Some("female".into()),
            activity_level: Some("Moderately Active".into()),
            conditions: "Hypothyroidism".into(),
            medications: String::new(),
            dietary_preferences: "  Vegetarian ".into(),
        });

        assert_eq!(
            profile.to_blob(),
            "Age: 42 years\n\
             Gender: Female\n\
             Activity Level: Moderately Active\n\
             Current Health Conditions: Hypothyroidism\n\
             Current Medications: None specified\n\
             Dietary Preferences: Vegetarian"
        );
    }

    #[test]
    fn age_is_clamped_not_rejected() {
        let old = UserProfile::from_form(&ProfileForm {
            age: Some(300),
            ..Default::default()
        });
        let young = UserProfile::from_form(&ProfileForm {
            age: Some(-4),
            ..Default::default()
        });
        assert_eq!(old.age, Some(MAX_AGE));
        assert_eq!(young.age, Some(MIN_AGE));
    }

    #[test]
    fn unknown_choices_fall_back_to_none_specified() {
        let profile = UserProfile::from_form(&ProfileForm {
            gender: Some("prefer not to say".into()),
            activity_level: Some("couch".into()),
            ..Default::default()
        });
        assert!(profile.is_empty());
        assert!(profile.to_blob().contains("Gender: None specified"));
        assert!(profile.to_blob().contains("Activity Level: None specified"));
    }

    #[test]
    fn activity_level_accepts_label_and_snake_case() {
        assert_eq!(
            ActivityLevel::parse("very_active"),
            Some(ActivityLevel::VeryActive)
        );
        assert_eq!(
            ActivityLevel::parse("Extremely Active"),
            Some(ActivityLevel::ExtremelyActive)
        );
        assert_eq!(ActivityLevel::parse("active"), None);
    }
}
