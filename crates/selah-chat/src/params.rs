//! Request parameter selection.
//!
//! Pure lookup tables keyed on intent and persona. Crisis always maps to
//! the most conservative values: lowest temperature, short output, the
//! standard tier.

use std::time::Duration;

use selah_core::config::StreamingConfig;
use selah_core::{Intent, ModelTier, Persona};

use crate::types::RequestParameters;

/// Stateless selector. All methods are total.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParameterSelector;

impl ParameterSelector {
    pub fn new() -> Self {
        Self
    }

    pub fn temperature_for(&self, intent: Intent) -> f32 {
        match intent {
            Intent::Simple => 0.7,
            Intent::Pastoral => 0.6,
            Intent::Scholarly => 0.3,
            Intent::Devotional => 0.7,
            Intent::Apologetics => 0.4,
            Intent::Interfaith => 0.4,
            Intent::Crisis => 0.1,
            Intent::General => 0.5,
        }
    }

    pub fn max_tokens_for(&self, intent: Intent) -> u32 {
        match intent {
            Intent::Simple => 150,
            Intent::Pastoral => 1200,
            Intent::Scholarly => 2000,
            Intent::Devotional => 1000,
            Intent::Apologetics => 1800,
            Intent::Interfaith => 1500,
            Intent::Crisis => 600,
            Intent::General => 1000,
        }
    }

    pub fn model_tier_for(&self, intent: Intent) -> ModelTier {
        match intent {
            Intent::Simple => ModelTier::Fast,
            Intent::Scholarly | Intent::Apologetics => ModelTier::Premium,
            // Crisis stays on the most reliable tier
            _ => ModelTier::Standard,
        }
    }

    pub fn persona_temperature(&self, persona: Persona) -> f32 {
        match persona {
            Persona::Child => 0.5,
            Persona::Teen => 0.7,
            Persona::YoungAdult => 0.7,
            Persona::Adult => 0.6,
            Persona::Senior => 0.5,
        }
    }

    /// Three buckets: fast, extended for reasoning-heavy intents, standard.
    pub fn timeout_for(&self, intent: Intent, streaming: &StreamingConfig) -> Duration {
        let ms = match intent {
            Intent::Simple => streaming.fast_timeout_ms,
            Intent::Scholarly | Intent::Apologetics => streaming.extended_timeout_ms,
            _ => streaming.standard_timeout_ms,
        };
        Duration::from_millis(ms)
    }

    /// Final temperature: mean of intent and persona values. Crisis is
    /// exempt and keeps its table value.
    pub fn final_temperature(&self, intent: Intent, persona: Persona) -> f32 {
        let intent_temp = self.temperature_for(intent);
        if intent == Intent::Crisis {
            return intent_temp;
        }
        let mean = (intent_temp + self.persona_temperature(persona)) / 2.0;
        mean.clamp(0.0, 1.0)
    }

    pub fn select(
        &self,
        intent: Intent,
        persona: Persona,
        streaming: &StreamingConfig,
    ) -> RequestParameters {
        RequestParameters {
            model_tier: self.model_tier_for(intent),
            temperature: self.final_temperature(intent, persona),
            max_output_tokens: self.max_tokens_for(intent),
            timeout: self.timeout_for(intent, streaming),
        }
    }
}
