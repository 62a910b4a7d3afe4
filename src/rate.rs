//! Rate-law descriptors and their load-time resolution.

use meval::Expr;
use serde::{Deserialize, Serialize};

/// Rate law as written in a model file, with species referenced by label.
/// Resolved into a [`RateLaw`] when the reaction is added to a network.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RateLawSpec {
    MassAction { k: f64 },
    Hill { k: f64, activator: String, n: f64, k_half: f64 },
    MichaelisMenten { k: f64, substrate: String, k_m: f64 },
    Expression { formula: String },
}

/// Resolved rate law with species references as dense indices.
#[derive(Clone, Debug)]
pub enum RateLaw {
    MassAction {
        k: f64,
    },
    Hill {
        k: f64,
        activator: usize,
        n: f64,
        k_half_pow_n: f64, // cached k_half^n
    },
    MichaelisMenten {
        k: f64,
        substrate: usize,
        k_m: f64,
    },
    Expression {
        expr: Expr,
        formula: String,
        /// Species read by the formula, used for the affected-reactions graph.
        inputs: Vec<usize>,
    },
}

impl RateLaw {
    /// Species whose counts feed this law besides the reactants.
    pub fn input_species(&self) -> &[usize] {
        match self {
            RateLaw::MassAction { .. } => &[],
            RateLaw::Hill { activator, .. } => std::slice::from_ref(activator),
            RateLaw::MichaelisMenten { substrate, .. } => std::slice::from_ref(substrate),
            RateLaw::Expression { inputs, .. } => inputs,
        }
    }

    pub(crate) fn remap_species(&mut self, remap: &[usize]) {
        match self {
            RateLaw::MassAction { .. } => {}
            RateLaw::Hill { activator, .. } => *activator = remap[*activator],
            RateLaw::MichaelisMenten { substrate, .. } => *substrate = remap[*substrate],
            RateLaw::Expression { inputs, .. } => {
                for s in inputs.iter_mut() {
                    *s = remap[*s];
                }
            }
        }
    }
}

#[inline]
pub(crate) fn falling_factorial(value: u64, count: u32) -> f64 {
    match count {
        0 => 1.0,
        1 => value as f64,
        2 if value >= 2 => (value * (value - 1)) as f64,
        3 if value >= 3 => (value * (value - 1) * (value - 2)) as f64,
        _ if value < count as u64 => 0.0,
        _ => {
            let mut acc = 1.0;
            for i in 0..count as u64 {
                acc *= (value - i) as f64;
            }
            acc
        }
    }
}

/// Free identifiers of a formula, in order of first appearance.
/// Identifiers directly followed by `(` are function calls and are skipped.
pub(crate) fn scan_identifiers(formula: &str) -> Vec<String> {
    let bytes = formula.as_bytes();
    let mut idents = Vec::new();
    let mut idx = 0;
    while idx < bytes.len() {
        let ch = bytes[idx];
        if ch.is_ascii_alphabetic() || ch == b'_' {
            let start = idx;
            while idx < bytes.len() && (bytes[idx].is_ascii_alphanumeric() || bytes[idx] == b'_') {
                idx += 1;
            }
            let name = &formula[start..idx];
            let mut ahead = idx;
            while ahead < bytes.len() && bytes[ahead].is_ascii_whitespace() {
                ahead += 1;
            }
            let is_call = ahead < bytes.len() && bytes[ahead] == b'(';
            if !is_call && !idents.iter().any(|i| i == name) {
                idents.push(name.to_string());
            }
        } else {
            idx += 1;
        }
    }
    idents
}
