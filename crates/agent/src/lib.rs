//! Boundary to the external synthesis collaborator.
//!
//! The cycle hands the collaborator a prompt listing archived and edited
//! notes and lets it mutate the vault.  Only the terminal status matters to
//! the caller; intermediate stream events are kept for logging.

pub mod prompt;
pub mod synth;

use std::sync::Arc;

use vaultsweep_config::SynthesisConfig;

pub use prompt::{SynthesisContext, build_user_prompt, system_prompt};
pub use synth::{
    CommandSynthesizer, DisabledSynthesizer, SynthesisEvent, SynthesisReport, SynthesisRequest,
    SynthesisStatus, Synthesizer,
};

/// Subprocess synthesizer, or the no-op one when synthesis is disabled.
pub fn synthesizer_from_config(config: &SynthesisConfig) -> Arc<dyn Synthesizer> {
    if config.enabled {
        Arc::new(CommandSynthesizer::from_config(config))
    } else {
        Arc::new(DisabledSynthesizer)
    }
}
