//! Model file loading. The native format is a JSON document with species,
//! parameters, and reactions whose rate laws reference species by label.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SimError;
use crate::network::Network;
use crate::rate::RateLawSpec;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpeciesDef {
    pub label: String,
    pub count: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReactionDef {
    pub label: String,
    pub rate: RateLawSpec,
    #[serde(default)]
    pub reactants: Vec<(String, u32)>,
    #[serde(default)]
    pub products: Vec<(String, u32)>,
    #[serde(default)]
    pub modifiers: Vec<String>,
}

fn default_volume() -> f64 {
    1.0
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelFile {
    #[serde(default = "default_volume")]
    pub volume: f64,
    #[serde(default)]
    pub parameters: std::collections::HashMap<String, f64>,
    pub species: Vec<SpeciesDef>,
    #[serde(default)]
    pub reactions: Vec<ReactionDef>,
}

impl Network {
    /// Populate a network from a parsed model document. The returned network
    /// still needs [`Network::init`] before simulation.
    pub fn from_model(model: &ModelFile) -> Result<Self, SimError> {
        if model.species.is_empty() {
            return Err(SimError::InvalidNetwork("model contains no species".into()));
        }
        let mut net = Network::new();
        net.set_volume(model.volume)?;
        for (name, value) in &model.parameters {
            net.add_parameter(name, *value);
        }
        for s in &model.species {
            net.add_species(&s.label, s.count)?;
        }
        for r in &model.reactions {
            let reactants: Vec<(&str, u32)> = r
                .reactants
                .iter()
                .map(|(label, coeff)| (label.as_str(), *coeff))
                .collect();
            let products: Vec<(&str, u32)> = r
                .products
                .iter()
                .map(|(label, coeff)| (label.as_str(), *coeff))
                .collect();
            let modifiers: Vec<&str> = r.modifiers.iter().map(String::as_str).collect();
            net.add_reaction(&r.label, r.rate.clone(), &reactants, &products, &modifiers)?;
        }
        Ok(net)
    }

    /// Load a model file from disk.
    pub fn load(path: &Path) -> Result<Self, SimError> {
        let text = std::fs::read_to_string(path)?;
        let model: ModelFile = serde_json::from_str(&text)
            .map_err(|err| SimError::InvalidFormat(format!("{}: {err}", path.display())))?;
        let net = Self::from_model(&model)?;
        info!(
            path = %path.display(),
            species = net.num_species(),
            reactions = net.num_reactions(),
            "model loaded"
        );
        Ok(net)
    }
}
