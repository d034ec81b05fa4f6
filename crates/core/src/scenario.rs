//! Scenario Catalog and Session Configuration Builder
//!
//! A scenario is a short role-play (hotel front desk, restaurant, ...) in which
//! the model plays staff and the learner plays the customer. This module maps a
//! scenario identifier and a proficiency level to the one-time
//! [`SessionConfig`] sent to the backend.
//!
//! The catalog is loaded once at startup and is immutable afterwards; the
//! builder is a pure function of its inputs.

use crate::generic_types::{ProficiencyLevel, ResponseModality, SessionConfig, SessionParameters};
use anyhow::{Context, Result};
use std::{collections::HashMap, fs, path::Path};
use tracing::info;

/// Persona used for any scenario identifier the catalog does not know.
pub const DEFAULT_PERSONA: &str = "You are a friendly person having a casual conversation.
Your role: YOU are the helper, USER is the visitor.
Keep responses SHORT (1-2 sentences). Stay in character. Do NOT mention English practice.";

/// Opening line paired with [`DEFAULT_PERSONA`].
pub const DEFAULT_OPENING_LINE: &str = "Hello! How can I help?";

/// Voice used when none is configured.
pub const DEFAULT_VOICE: &str = "Puck";

/// The role the model plays in one scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub instructions: String,
    pub opening_line: String,
}

impl Persona {
    fn new(instructions: &str, opening_line: &str) -> Self {
        Self {
            instructions: instructions.to_string(),
            opening_line: opening_line.to_string(),
        }
    }
}

/// Maps scenario identifiers to personas.
#[derive(Debug, Clone)]
pub struct ScenarioCatalog {
    personas: HashMap<String, Persona>,
    fallback: Persona,
}

impl Default for ScenarioCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ScenarioCatalog {
    /// The five scenarios shipped with the service.
    pub fn builtin() -> Self {
        let personas = [
            (
                "hotel-checkin",
                Persona::new(
                    "You are a hotel front desk staff at Hilton Hotel.
Your role: YOU are the employee, USER is the guest.
Keep responses SHORT (1-2 sentences). Stay in character. Do NOT mention English practice.",
                    "Good evening! Welcome to Hilton Hotel. Do you have a reservation?",
                ),
            ),
            (
                "restaurant",
                Persona::new(
                    "You are a waiter at Olive Garden.
Your role: YOU are the waiter, USER is the customer.
Keep responses SHORT. Stay in character. Do NOT mention language learning.",
                    "Good evening! Welcome to Olive Garden. Table for how many?",
                ),
            ),
            (
                "grocery-shopping",
                Persona::new(
                    "You are a store employee.
Your role: YOU are the employee, USER is the customer.
Keep responses SHORT. Stay in character.",
                    "Hi there! Can I help you find something?",
                ),
            ),
            (
                "doctor-appointment",
                Persona::new(
                    "You are Dr. Smith, a family doctor.
Your role: YOU are the doctor, USER is the patient.
Keep responses SHORT. Professional but warm.",
                    "Hello! I'm Dr. Smith. What brings you in today?",
                ),
            ),
            (
                "bank-account",
                Persona::new(
                    "You are a bank teller.
Your role: YOU are the teller, USER is the customer.
Keep responses SHORT. Professional and clear.",
                    "Good afternoon! How can I help you today?",
                ),
            ),
        ]
        .into_iter()
        .map(|(id, persona)| (id.to_string(), persona))
        .collect();

        Self {
            personas,
            fallback: Persona::new(DEFAULT_PERSONA, DEFAULT_OPENING_LINE),
        }
    }

    /// Loads persona overrides from `<scenario>.md` files in `dir`.
    ///
    /// An override replaces the persona instructions of an existing scenario
    /// and keeps its opening line; an unknown stem adds a new scenario that
    /// opens with [`DEFAULT_OPENING_LINE`].
    pub fn with_overrides(mut self, dir: &Path) -> Result<Self> {
        for entry in fs::read_dir(dir)
            .with_context(|| format!("Could not read prompts directory {}", dir.display()))?
        {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("md") {
                continue;
            }
            let scenario = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let instructions = fs::read_to_string(&path)?.trim().to_string();
            info!(%scenario, "Loaded persona override");
            self.personas
                .entry(scenario)
                .and_modify(|p| p.instructions = instructions.clone())
                .or_insert_with(|| Persona::new(&instructions, DEFAULT_OPENING_LINE));
        }
        Ok(self)
    }

    /// Looks up a scenario, falling back to the generic persona.
    pub fn persona(&self, scenario: &str) -> &Persona {
        self.personas.get(scenario).unwrap_or(&self.fallback)
    }

    pub fn contains(&self, scenario: &str) -> bool {
        self.personas.contains_key(scenario)
    }

    /// Identifiers of every known scenario, sorted.
    pub fn scenarios(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.personas.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

/// Guidance for the model on how to pitch its language at a given level.
pub fn language_level_hint(level: ProficiencyLevel) -> Option<&'static str> {
    match level {
        ProficiencyLevel::A1 => Some(
            "The learner is a beginner (CEFR A1). Use very short sentences, basic everyday words and speak slowly.",
        ),
        ProficiencyLevel::A2 => Some(
            "The learner is elementary (CEFR A2). Use simple sentences and common phrases. Avoid idioms.",
        ),
        ProficiencyLevel::B1 => Some(
            "The learner is intermediate (CEFR B1). Use clear, natural language on familiar topics. Avoid rare idioms.",
        ),
        ProficiencyLevel::B2 => Some(
            "The learner is upper intermediate (CEFR B2). Speak naturally at a normal pace. Occasional idioms are fine.",
        ),
        ProficiencyLevel::C1 => Some(
            "The learner is advanced (CEFR C1). Speak as you would with a fluent speaker, including idiomatic language.",
        ),
        ProficiencyLevel::C2 => Some(
            "The learner is proficient (CEFR C2). Speak exactly as with a native speaker.",
        ),
        ProficiencyLevel::Unknown => None,
    }
}

/// Builds [`SessionConfig`]s from session parameters.
///
/// Holds only values fixed at startup, so one builder is shared by every session.
#[derive(Debug, Clone)]
pub struct SessionConfigBuilder {
    catalog: ScenarioCatalog,
    response_modality: ResponseModality,
    voice_identifier: String,
}

impl SessionConfigBuilder {
    pub fn new(
        catalog: ScenarioCatalog,
        response_modality: ResponseModality,
        voice_identifier: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            response_modality,
            voice_identifier: voice_identifier.into(),
        }
    }

    pub fn catalog(&self) -> &ScenarioCatalog {
        &self.catalog
    }

    /// The line the persona greets the learner with when the session opens.
    pub fn opening_line(&self, scenario: &str) -> &str {
        &self.catalog.persona(scenario).opening_line
    }

    /// Derives the backend setup for one session. Never fails: unknown
    /// scenarios get [`DEFAULT_PERSONA`] and unknown levels get no hint.
    pub fn build(&self, params: &SessionParameters) -> SessionConfig {
        let persona = self.catalog.persona(&params.scenario);
        let language_level_hint =
            language_level_hint(params.proficiency_level).map(str::to_string);

        let mut persona_instructions = format!(
            "{}\nStart: \"{}\"",
            persona.instructions, persona.opening_line
        );
        if let Some(hint) = &language_level_hint {
            persona_instructions.push_str("\n\n");
            persona_instructions.push_str(hint);
        }

        SessionConfig {
            persona_instructions,
            response_modality: self.response_modality,
            voice_identifier: self.voice_identifier.clone(),
            language_level_hint,
        }
    }
}

impl Default for SessionConfigBuilder {
    fn default() -> Self {
        Self::new(ScenarioCatalog::builtin(), ResponseModality::Audio, DEFAULT_VOICE)
    }
}
