//! Turns an operator's text into per-language variants.

use herald_core::languages::Language;
use herald_core::Variant;

/// Produces the variant for one language. Translation and speech synthesis
/// plug in here.
pub trait VariantComposer: Send + Sync {
    fn compose(&self, text: &str, language: &Language) -> Variant;
}

/// Uses the operator's text verbatim for every language, without audio.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityComposer;

impl VariantComposer for IdentityComposer {
    fn compose(&self, text: &str, language: &Language) -> Variant {
        language.variant(text)
    }
}
