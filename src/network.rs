//! Bipartite reaction network: species and reaction vertices with
//! stoichiometric edges, kept as two dense vectors with stable indices.

use std::collections::HashMap;

use meval::{Context, ContextProvider};
use tracing::debug;

use crate::digest::StepDigest;
use crate::error::SimError;
use crate::rate::{falling_factorial, scan_identifiers, RateLaw, RateLawSpec};

pub type SpeciesIndex = usize;
pub type ReactionIndex = usize;
pub type PartitionId = u32;

#[derive(Clone, Debug)]
pub struct Species {
    label: String,
    count: u64,
}

impl Species {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

/// Directed stoichiometric arc between a species and a reaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoichEdge {
    pub species: SpeciesIndex,
    pub coeff: u32,
}

#[derive(Clone, Debug)]
pub struct Reaction {
    label: String,
    law: RateLaw,
    rate: f64,
    reactants: Vec<StoichEdge>,
    products: Vec<StoichEdge>,
    modifiers: Vec<SpeciesIndex>,
}

impl Reaction {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Cached propensity from the last evaluation.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn law(&self) -> &RateLaw {
        &self.law
    }

    pub fn reactants(&self) -> &[StoichEdge] {
        &self.reactants
    }

    pub fn products(&self) -> &[StoichEdge] {
        &self.products
    }

    pub fn modifiers(&self) -> &[SpeciesIndex] {
        &self.modifiers
    }
}

/// Resolves rate-law variables against species counts first, then declared
/// parameters. Paired with `meval::Context` for the builtin functions.
struct SpeciesContext<'a> {
    species: &'a [Species],
    index: &'a HashMap<String, SpeciesIndex>,
    params: &'a HashMap<String, f64>,
}

impl ContextProvider for SpeciesContext<'_> {
    fn get_var(&self, name: &str) -> Option<f64> {
        self.index
            .get(name)
            .map(|&i| self.species[i].count as f64)
            .or_else(|| self.params.get(name).copied())
    }
}

#[derive(Clone, Debug)]
pub struct Network {
    species: Vec<Species>,
    reactions: Vec<Reaction>,
    species_index: HashMap<String, SpeciesIndex>,
    reaction_index: HashMap<String, ReactionIndex>,
    params: HashMap<String, f64>,
    volume: f64,
    /// Per reaction r: reactions whose rate-law inputs intersect the
    /// reactant/product footprint of r, excluding r itself. The scheduler
    /// handles the fired reaction separately.
    affected: Vec<Vec<ReactionIndex>>,
    pid: PartitionId,
    my_reactions: Vec<ReactionIndex>,
    my_species: Vec<SpeciesIndex>,
    etime_ulimit: f64,
    initialized: bool,
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    pub fn new() -> Self {
        Self {
            species: Vec::new(),
            reactions: Vec::new(),
            species_index: HashMap::new(),
            reaction_index: HashMap::new(),
            params: HashMap::new(),
            volume: 1.0,
            affected: Vec::new(),
            pid: 0,
            my_reactions: Vec::new(),
            my_species: Vec::new(),
            etime_ulimit: f64::MAX,
            initialized: false,
        }
    }

    pub fn add_species(&mut self, label: &str, count: u64) -> Result<SpeciesIndex, SimError> {
        if label.is_empty() {
            return Err(SimError::InvalidNetwork("empty species label".into()));
        }
        if self.species_index.contains_key(label) {
            return Err(SimError::InvalidNetwork(format!(
                "duplicate species label '{label}'"
            )));
        }
        let idx = self.species.len();
        self.species.push(Species {
            label: label.to_string(),
            count,
        });
        self.species_index.insert(label.to_string(), idx);
        Ok(idx)
    }

    pub fn add_parameter(&mut self, name: &str, value: f64) {
        self.params.insert(name.to_string(), value);
    }

    pub fn set_volume(&mut self, volume: f64) -> Result<(), SimError> {
        if !volume.is_finite() || volume <= 0.0 {
            return Err(SimError::InvalidNetwork(format!(
                "volume must be positive and finite, got {volume}"
            )));
        }
        self.volume = volume;
        Ok(())
    }

    pub fn add_reaction(
        &mut self,
        label: &str,
        law: RateLawSpec,
        reactants: &[(&str, u32)],
        products: &[(&str, u32)],
        modifiers: &[&str],
    ) -> Result<ReactionIndex, SimError> {
        if self.reaction_index.contains_key(label) {
            return Err(SimError::InvalidNetwork(format!(
                "duplicate reaction label '{label}'"
            )));
        }
        let reactants = self.resolve_edges(label, reactants)?;
        let products = self.resolve_edges(label, products)?;
        let modifiers = modifiers
            .iter()
            .map(|m| self.resolve_species(label, m))
            .collect::<Result<Vec<_>, _>>()?;
        let law = self.resolve_law(label, law)?;

        let idx = self.reactions.len();
        self.reactions.push(Reaction {
            label: label.to_string(),
            law,
            rate: 0.0,
            reactants,
            products,
            modifiers,
        });
        self.reaction_index.insert(label.to_string(), idx);
        Ok(idx)
    }

    fn resolve_species(&self, reaction: &str, label: &str) -> Result<SpeciesIndex, SimError> {
        self.species_index.get(label).copied().ok_or_else(|| {
            SimError::InvalidNetwork(format!(
                "reaction '{reaction}' references unknown species '{label}'"
            ))
        })
    }

    fn resolve_edges(
        &self,
        reaction: &str,
        edges: &[(&str, u32)],
    ) -> Result<Vec<StoichEdge>, SimError> {
        edges
            .iter()
            .map(|&(label, coeff)| {
                if coeff == 0 {
                    return Err(SimError::InvalidNetwork(format!(
                        "reaction '{reaction}' has zero stoichiometry on species '{label}'"
                    )));
                }
                Ok(StoichEdge {
                    species: self.resolve_species(reaction, label)?,
                    coeff,
                })
            })
            .collect()
    }

    fn resolve_law(&self, reaction: &str, spec: RateLawSpec) -> Result<RateLaw, SimError> {
        let check_constant = |name: &str, value: f64| {
            if !value.is_finite() || value < 0.0 {
                return Err(SimError::InvalidNetwork(format!(
                    "reaction '{reaction}' has non-finite or negative {name} ({value})"
                )));
            }
            Ok(())
        };
        match spec {
            RateLawSpec::MassAction { k } => {
                check_constant("rate constant", k)?;
                Ok(RateLaw::MassAction { k })
            }
            RateLawSpec::Hill {
                k,
                activator,
                n,
                k_half,
            } => {
                check_constant("rate constant", k)?;
                if n <= 0.0 || k_half <= 0.0 {
                    return Err(SimError::InvalidNetwork(format!(
                        "reaction '{reaction}' Hill parameters must be positive"
                    )));
                }
                Ok(RateLaw::Hill {
                    k,
                    activator: self.resolve_species(reaction, &activator)?,
                    n,
                    k_half_pow_n: k_half.powf(n),
                })
            }
            RateLawSpec::MichaelisMenten { k, substrate, k_m } => {
                check_constant("rate constant", k)?;
                if k_m <= 0.0 {
                    return Err(SimError::InvalidNetwork(format!(
                        "reaction '{reaction}' Michaelis-Menten k_m must be positive"
                    )));
                }
                Ok(RateLaw::MichaelisMenten {
                    k,
                    substrate: self.resolve_species(reaction, &substrate)?,
                    k_m,
                })
            }
            RateLawSpec::Expression { formula } => {
                let expr: meval::Expr = formula.parse().map_err(|err| {
                    SimError::InvalidFormat(format!(
                        "reaction '{reaction}' formula parse error: {err}"
                    ))
                })?;
                let mut inputs = Vec::new();
                for ident in scan_identifiers(&formula) {
                    if let Some(&s) = self.species_index.get(&ident) {
                        inputs.push(s);
                    } else if !self.params.contains_key(&ident)
                        && ident != "pi"
                        && ident != "e"
                    {
                        return Err(SimError::MissingSymbol {
                            symbol: ident,
                            reaction: reaction.to_string(),
                        });
                    }
                }
                Ok(RateLaw::Expression {
                    expr,
                    formula,
                    inputs,
                })
            }
        }
    }

    /// Sort species lexicographically, assign dense indices, and precompute
    /// the affected-reactions set of every reaction. Reactions keep load
    /// order. Index ordering is stable afterwards.
    pub fn init(&mut self) -> Result<(), SimError> {
        let n = self.species.len();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| self.species[a].label.cmp(&self.species[b].label));
        let mut remap = vec![0usize; n];
        for (new_idx, &old_idx) in order.iter().enumerate() {
            remap[old_idx] = new_idx;
        }

        let mut sorted = Vec::with_capacity(n);
        for &old in &order {
            sorted.push(self.species[old].clone());
        }
        self.species = sorted;
        self.species_index = self
            .species
            .iter()
            .enumerate()
            .map(|(i, s)| (s.label.clone(), i))
            .collect();

        for rxn in &mut self.reactions {
            for e in rxn.reactants.iter_mut().chain(rxn.products.iter_mut()) {
                e.species = remap[e.species];
            }
            for m in rxn.modifiers.iter_mut() {
                *m = remap[*m];
            }
            rxn.law.remap_species(&remap);
        }

        self.build_affected_sets();

        self.pid = 0;
        self.my_species = (0..self.species.len()).collect();
        self.my_reactions = (0..self.reactions.len()).collect();
        self.initialized = true;
        debug!(
            species = self.species.len(),
            reactions = self.reactions.len(),
            "network initialized"
        );
        Ok(())
    }

    fn build_affected_sets(&mut self) {
        // For each species, the reactions whose rate depends on it: through a
        // reactant edge, a declared modifier, or a rate-law input.
        let mut dependents: Vec<Vec<ReactionIndex>> = vec![Vec::new(); self.species.len()];
        for (ri, rxn) in self.reactions.iter().enumerate() {
            for e in &rxn.reactants {
                dependents[e.species].push(ri);
            }
            for &m in &rxn.modifiers {
                dependents[m].push(ri);
            }
            for &s in rxn.law.input_species() {
                dependents[s].push(ri);
            }
        }

        let mut affected = vec![Vec::new(); self.reactions.len()];
        let mut visit_markers = vec![0usize; self.reactions.len()];
        let mut stamp = 1usize;
        for (r, out) in affected.iter_mut().enumerate() {
            if stamp == usize::MAX {
                visit_markers.fill(0);
                stamp = 1;
            }
            let mark = stamp;
            stamp += 1;

            // The footprint of a firing is every species it touches, whether
            // or not the net change is zero (a catalyst still wakes its
            // consumers).
            visit_markers[r] = mark;
            let rxn = &self.reactions[r];
            for e in rxn.reactants.iter().chain(rxn.products.iter()) {
                for &dep in &dependents[e.species] {
                    if visit_markers[dep] != mark {
                        visit_markers[dep] = mark;
                        out.push(dep);
                    }
                }
            }
        }
        self.affected = affected;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn num_species(&self) -> usize {
        self.species.len()
    }

    pub fn num_reactions(&self) -> usize {
        self.reactions.len()
    }

    pub fn num_vertices(&self) -> usize {
        self.species.len() + self.reactions.len()
    }

    pub fn species(&self, s: SpeciesIndex) -> &Species {
        &self.species[s]
    }

    pub fn reaction(&self, r: ReactionIndex) -> &Reaction {
        &self.reactions[r]
    }

    pub fn species_counts(&self) -> Vec<u64> {
        self.species.iter().map(|s| s.count).collect()
    }

    /// Concentration view of a species count, scaled by the network volume.
    pub fn species_concentration(&self, s: SpeciesIndex) -> f64 {
        self.species[s].count as f64 / self.volume
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn find_species(&self, label: &str) -> Option<SpeciesIndex> {
        self.species_index.get(label).copied()
    }

    pub fn find_reaction(&self, label: &str) -> Option<ReactionIndex> {
        self.reaction_index.get(label).copied()
    }

    /// Reactions affected by firing `r`, excluding `r` itself.
    pub fn affected_reactions(&self, r: ReactionIndex) -> &[ReactionIndex] {
        &self.affected[r]
    }

    fn evaluate_rate(&self, r: ReactionIndex) -> f64 {
        let rxn = &self.reactions[r];
        let raw = match &rxn.law {
            RateLaw::MassAction { k } => {
                let mut propensity = *k;
                for e in &rxn.reactants {
                    let available = self.species[e.species].count;
                    if available < e.coeff as u64 {
                        return 0.0;
                    }
                    propensity *= falling_factorial(available, e.coeff);
                }
                propensity
            }
            RateLaw::Hill {
                k,
                activator,
                n,
                k_half_pow_n,
            } => {
                let power = (self.species[*activator].count as f64).powf(*n);
                let denom = k_half_pow_n + power;
                if denom == 0.0 {
                    0.0
                } else {
                    k * power / denom
                }
            }
            RateLaw::MichaelisMenten { k, substrate, k_m } => {
                let s = self.species[*substrate].count as f64;
                k * s / (k_m + s)
            }
            RateLaw::Expression { expr, .. } => {
                let ctx = (
                    SpeciesContext {
                        species: &self.species,
                        index: &self.species_index,
                        params: &self.params,
                    },
                    Context::new(),
                );
                expr.eval_with_context(ctx).unwrap_or(0.0)
            }
        };
        // Propensities are finite and non-negative by construction.
        if raw.is_finite() && raw > 0.0 {
            raw
        } else {
            0.0
        }
    }

    /// Evaluate the rate law at the current species counts, cache the result
    /// on the reaction, and return it.
    pub fn set_reaction_rate(&mut self, r: ReactionIndex) -> f64 {
        let rate = self.evaluate_rate(r);
        self.reactions[r].rate = rate;
        rate
    }

    /// Overwrite the cached rate without evaluating the law.
    pub fn assign_reaction_rate(&mut self, r: ReactionIndex, rate: f64) {
        self.reactions[r].rate = rate;
    }

    pub fn get_reaction_rate(&self, r: ReactionIndex) -> f64 {
        self.reactions[r].rate
    }

    /// True iff every reactant of `r` is available in the required
    /// stoichiometry, so firing cannot drive a count negative.
    pub fn check_reaction(&self, r: ReactionIndex) -> bool {
        self.reactions[r]
            .reactants
            .iter()
            .all(|e| self.species[e.species].count >= e.coeff as u64)
    }

    /// Apply the stoichiometric update of `r`, filling the digest with the
    /// net count updates and the affected-reactions set.
    pub fn fire(&mut self, r: ReactionIndex, digest: &mut StepDigest) -> Result<(), SimError> {
        let rxn = &self.reactions[r];
        for e in &rxn.reactants {
            if self.species[e.species].count < e.coeff as u64 {
                return Err(SimError::StoichiometryUnderflow {
                    reaction: rxn.label.clone(),
                    species: self.species[e.species].label.clone(),
                });
            }
        }
        for e in &rxn.reactants {
            self.species[e.species].count -= e.coeff as u64;
            digest.push_update(e.species, -(e.coeff as i64));
        }
        for e in &rxn.products {
            self.species[e.species].count += e.coeff as u64;
            digest.push_update(e.species, e.coeff as i64);
        }
        digest.affected.extend_from_slice(&self.affected[r]);
        Ok(())
    }

    /// Inverse of [`fire`](Self::fire). Precondition: `r` was the last firing
    /// and no intervening mutation has occurred.
    pub fn undo(&mut self, r: ReactionIndex) -> Result<(), SimError> {
        let rxn = &self.reactions[r];
        for e in &rxn.products {
            if self.species[e.species].count < e.coeff as u64 {
                return Err(SimError::StoichiometryUnderflow {
                    reaction: rxn.label.clone(),
                    species: self.species[e.species].label.clone(),
                });
            }
        }
        for e in &rxn.products {
            self.species[e.species].count -= e.coeff as u64;
        }
        for e in &rxn.reactants {
            self.species[e.species].count += e.coeff as u64;
        }
        Ok(())
    }

    /// Record a partition label per vertex (species first, reactions after)
    /// and keep the subsets assigned to `my_pid` as the local lists.
    pub fn set_partition(
        &mut self,
        parts: &[PartitionId],
        my_pid: PartitionId,
    ) -> Result<(), SimError> {
        if parts.len() != self.num_vertices() {
            return Err(SimError::InvalidArgument(format!(
                "partition vector length {} does not match vertex count {}",
                parts.len(),
                self.num_vertices()
            )));
        }
        let ns = self.species.len();
        self.pid = my_pid;
        self.my_species = (0..ns).filter(|&s| parts[s] == my_pid).collect();
        self.my_reactions = (0..self.reactions.len())
            .filter(|&r| parts[ns + r] == my_pid)
            .collect();
        Ok(())
    }

    pub fn partition_id(&self) -> PartitionId {
        self.pid
    }

    pub fn my_reaction_list(&self) -> &[ReactionIndex] {
        &self.my_reactions
    }

    pub fn my_species_list(&self) -> &[SpeciesIndex] {
        &self.my_species
    }

    /// Largest finite inter-event delay considered productive. Set before a
    /// run starts; read-only during it.
    pub fn set_etime_ulimit(&mut self, t: f64) {
        self.etime_ulimit = t;
    }

    pub fn etime_ulimit(&self) -> f64 {
        self.etime_ulimit
    }

    /// (min, max, sum) over the cached reaction rates.
    pub fn find_min_max_rate(&self) -> (f64, f64, f64) {
        let mut min = f64::MAX;
        let mut max = 0.0f64;
        let mut sum = 0.0;
        for rxn in &self.reactions {
            min = min.min(rxn.rate);
            max = max.max(rxn.rate);
            sum += rxn.rate;
        }
        if self.reactions.is_empty() {
            min = 0.0;
        }
        (min, max, sum)
    }

    pub fn show_species_labels(&self) -> String {
        self.species
            .iter()
            .map(|s| s.label.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn show_species_counts(&self) -> String {
        self.species
            .iter()
            .map(|s| s.count.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
