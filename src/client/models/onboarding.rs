//! First-run profile wizard.

use log::{error, info};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::client::services::api_client::{ApiError, DatingApi, OnboardingPayload};
use crate::common::models::Location;

pub const INTEREST_OPTIONS: [&str; 22] = [
    "Travel", "Music", "Sports", "Reading", "Cooking", "Art", "Photography", "Dancing", "Hiking", "Movies",
    "Gaming", "Fitness", "Yoga", "Meditation", "Food", "Wine", "Coffee", "Pets", "Nature", "Technology",
    "Fashion", "Shopping",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnboardingStep {
    Interests,
    Location,
    Photos,
    About,
    Preferences,
}

impl OnboardingStep {
    pub const ALL: [OnboardingStep; 5] = [
        OnboardingStep::Interests,
        OnboardingStep::Location,
        OnboardingStep::Photos,
        OnboardingStep::About,
        OnboardingStep::Preferences,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            OnboardingStep::Interests => "Interests",
            OnboardingStep::Location => "Location",
            OnboardingStep::Photos => "Photos",
            OnboardingStep::About => "About You",
            OnboardingStep::Preferences => "Preferences",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookingFor {
    Male,
    Female,
    Both,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        })
    }
}

impl fmt::Display for LookingFor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LookingFor::Male => "male",
            LookingFor::Female => "female",
            LookingFor::Both => "both",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    /// Server-side validation failed; the text lists every rejected field.
    #[error("{0}")]
    Rejected(String),

    #[error(transparent)]
    Api(ApiError),
}

#[derive(Debug, Clone, Default)]
pub struct OnboardingWizard {
    step: usize,
    pub interests: Vec<String>,
    pub location: Location,
    pub photos: Vec<String>,
    pub bio: String,
    pub age: String,
    pub gender: Option<Gender>,
    pub looking_for: Option<LookingFor>,
}

impl OnboardingWizard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self) -> OnboardingStep {
        OnboardingStep::ALL[self.step]
    }

    pub fn step_index(&self) -> usize {
        self.step
    }

    pub fn is_first(&self) -> bool {
        self.step == 0
    }

    pub fn is_last(&self) -> bool {
        self.step == OnboardingStep::ALL.len() - 1
    }

    pub fn next(&mut self) -> OnboardingStep {
        if !self.is_last() {
            self.step += 1;
        }
        self.step()
    }

    pub fn previous(&mut self) -> OnboardingStep {
        self.step = self.step.saturating_sub(1);
        self.step()
    }

    /// Adds or removes `interest`. Returns whether it is now selected.
    pub fn toggle_interest(&mut self, interest: &str) -> bool {
        if let Some(pos) = self.interests.iter().position(|i| i == interest) {
            self.interests.remove(pos);
            false
        } else {
            self.interests.push(interest.to_string());
            true
        }
    }

    pub fn add_photo(&mut self, url: impl Into<String>) {
        self.photos.push(url.into());
    }

    pub fn remove_photo(&mut self, index: usize) -> Option<String> {
        (index < self.photos.len()).then(|| self.photos.remove(index))
    }

    /// Leading digits of the age field, like a lenient integer parse.
    fn parsed_age(&self) -> Option<u32> {
        let digits: String = self.age.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse().ok()
    }

    pub fn payload(&self) -> OnboardingPayload {
        let non_empty = |s: &Option<String>| s.as_ref().map(|v| v.trim()).filter(|v| !v.is_empty()).map(str::to_string);
        OnboardingPayload {
            interests: self.interests.clone(),
            country: non_empty(&self.location.country),
            state: non_empty(&self.location.state),
            city: non_empty(&self.location.city),
            bio: Some(self.bio.trim().to_string()).filter(|b| !b.is_empty()),
            age: self.parsed_age(),
            gender: self.gender.map(|g| g.to_string()),
            looking_for: self.looking_for.map(|l| l.to_string()),
            photos: Some(self.photos.clone()).filter(|p| !p.is_empty()),
        }
    }

    pub async fn submit(&self, api: &dyn DatingApi) -> Result<(), OnboardingError> {
        match api.complete_onboarding(&self.payload()).await {
            Ok(_) => {
                info!("[ONBOARDING] Profile set up with {} interests", self.interests.len());
                Ok(())
            }
            Err(ApiError::Status { errors, .. }) if !errors.is_empty() => {
                let joined = errors.join(", ");
                error!("[ONBOARDING] Rejected: {}", joined);
                Err(OnboardingError::Rejected(joined))
            }
            Err(e) => {
                error!("[ONBOARDING] Error completing onboarding: {}", e);
                Err(OnboardingError::Api(e))
            }
        }
    }
}

/// True when the signed-in user still has to run the wizard.
pub async fn needs_onboarding(api: &dyn DatingApi) -> Result<bool, ApiError> {
    Ok(!api.onboarding_status().await?.onboarding_completed)
}
