//! Utility function library
//!
//! A single tagged enum covers every supported utility shape, with
//! exhaustive dispatch for `evaluate` and `gradient` — no virtual calls
//! in solver inner loops. Wrapping kinds (threshold, satiation) compose
//! over a boxed base utility; nested CES composes substitution nests.
//!
//! # Gradient conventions
//!
//! Gradients are analytic and defined on the interior of the feasible
//! box. At boundaries the one-sided conventions are:
//! - Cobb–Douglas / CES with negative ρ: value 0 and zero gradient when
//!   any component is 0,
//! - Sqrt / CES with ρ in (0, 1): components are clamped to a small
//!   epsilon before differentiating,
//! - Leontief: the full marginal is attributed to the binding resource
//!   (first in canonical order on ties).

use crate::models::resource::ResourceType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Floor applied to allocations before logs, roots and negative powers.
const X_EPS: f64 = 1e-9;

/// One substitution nest inside a nested CES utility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CesNest {
    /// Weight of this nest in the outer aggregator.
    pub weight: f64,

    /// Substitution parameter within the nest (ρ < 1, ρ ≠ 0).
    pub rho: f64,

    /// Per-resource weights within the nest.
    pub components: BTreeMap<ResourceType, f64>,
}

/// Closed-form utility over an allocation vector.
///
/// # Example
/// ```
/// use arbitration_core::{ResourceType, UtilityFunction};
/// use std::collections::BTreeMap;
///
/// let utility = UtilityFunction::Linear {
///     weights: BTreeMap::from([(ResourceType::Compute, 2.0)]),
/// };
/// let x = BTreeMap::from([(ResourceType::Compute, 3.0)]);
/// assert_eq!(utility.evaluate(&x), 6.0);
/// assert_eq!(utility.gradient(&x)[&ResourceType::Compute], 2.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UtilityFunction {
    /// `U = Σ w_r · x_r`
    Linear {
        weights: BTreeMap<ResourceType, f64>,
    },

    /// `U = Σ w_r · √x_r`
    Sqrt {
        weights: BTreeMap<ResourceType, f64>,
    },

    /// `U = Σ w_r · ln(1 + x_r)`
    Log {
        weights: BTreeMap<ResourceType, f64>,
    },

    /// `U = Π x_r ^ w_r`; zero if any component is zero.
    CobbDouglas {
        exponents: BTreeMap<ResourceType, f64>,
    },

    /// `U = (Σ w_r · x_r^ρ)^{1/ρ}` with ρ < 1, ρ ≠ 0.
    Ces {
        weights: BTreeMap<ResourceType, f64>,
        rho: f64,
    },

    /// Outer CES over inner CES nests: complementarity across nests,
    /// substitutability within.
    NestedCes {
        nests: Vec<CesNest>,
        outer_rho: f64,
    },

    /// `U = min_r (x_r / w_r)`: perfect complements.
    Leontief {
        proportions: BTreeMap<ResourceType, f64>,
    },

    /// Base utility gated by a sigmoid on total allocation: softly damped
    /// below the threshold, full base utility above it.
    Threshold {
        base: Box<UtilityFunction>,
        threshold: f64,
        sharpness: f64,
    },

    /// `U = V_max · (1 − e^{−B/k})` over base utility B.
    Satiation {
        base: Box<UtilityFunction>,
        v_max: f64,
        k: f64,
    },

    /// `U = V_max · B / (B + k)` over base utility B.
    HyperbolicSatiation {
        base: Box<UtilityFunction>,
        v_max: f64,
        k: f64,
    },

    /// Smooth loss aversion around a reference point: deviations pass
    /// through softplus ramps, with losses multiplied by λ > 1.
    SoftplusLossAversion {
        reference: BTreeMap<ResourceType, f64>,
        lambda: f64,
        beta: f64,
    },

    /// Kinked logarithmic loss aversion: gains `ln(1 + Δ/β)`, losses
    /// `−λ · ln(1 + |Δ|/β)`.
    AsymmetricLogLossAversion {
        reference: BTreeMap<ResourceType, f64>,
        lambda: f64,
        beta: f64,
    },
}

fn component(x: &BTreeMap<ResourceType, f64>, resource: ResourceType) -> f64 {
    x.get(&resource).copied().unwrap_or(0.0)
}

fn sigmoid(z: f64) -> f64 {
    let z = z.clamp(-60.0, 60.0);
    1.0 / (1.0 + (-z).exp())
}

/// `softplus_β(z) = ln(1 + e^{βz}) / β`, numerically stable.
fn softplus(z: f64, beta: f64) -> f64 {
    let t = beta * z;
    if t > 30.0 {
        z
    } else if t < -30.0 {
        t.exp() / beta
    } else {
        t.exp().ln_1p() / beta
    }
}

impl UtilityFunction {
    /// Linear utility directly over an agent's preference weights.
    pub fn linear(weights: BTreeMap<ResourceType, f64>) -> Self {
        UtilityFunction::Linear { weights }
    }

    /// Short name of the utility kind, for validation messages and logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            UtilityFunction::Linear { .. } => "linear",
            UtilityFunction::Sqrt { .. } => "sqrt",
            UtilityFunction::Log { .. } => "log",
            UtilityFunction::CobbDouglas { .. } => "cobb_douglas",
            UtilityFunction::Ces { .. } => "ces",
            UtilityFunction::NestedCes { .. } => "nested_ces",
            UtilityFunction::Leontief { .. } => "leontief",
            UtilityFunction::Threshold { .. } => "threshold",
            UtilityFunction::Satiation { .. } => "satiation",
            UtilityFunction::HyperbolicSatiation { .. } => "hyperbolic_satiation",
            UtilityFunction::SoftplusLossAversion { .. } => "softplus_loss_aversion",
            UtilityFunction::AsymmetricLogLossAversion { .. } => "asymmetric_log_loss_aversion",
        }
    }

    /// Composition depth: leaves count 1, wrappers add a layer, nested
    /// CES counts its nest layer.
    pub fn depth(&self) -> u32 {
        match self {
            UtilityFunction::Threshold { base, .. }
            | UtilityFunction::Satiation { base, .. }
            | UtilityFunction::HyperbolicSatiation { base, .. } => 1 + base.depth(),
            UtilityFunction::NestedCes { .. } => 2,
            _ => 1,
        }
    }

    /// Whether the interior-point solver may handle this utility: it must
    /// be smooth, concave, and strictly positive on the interior so the
    /// log-welfare objective is well behaved. Non-qualifying kinds take
    /// the gradient path instead.
    pub fn is_smooth_concave(&self) -> bool {
        match self {
            UtilityFunction::Linear { .. }
            | UtilityFunction::Sqrt { .. }
            | UtilityFunction::Log { .. }
            | UtilityFunction::CobbDouglas { .. }
            | UtilityFunction::Ces { .. }
            | UtilityFunction::NestedCes { .. } => true,
            UtilityFunction::Satiation { base, .. }
            | UtilityFunction::HyperbolicSatiation { base, .. } => base.is_smooth_concave(),
            // The sigmoid gate is not concave; Leontief is not smooth;
            // loss-aversion utilities can go negative.
            UtilityFunction::Threshold { .. }
            | UtilityFunction::Leontief { .. }
            | UtilityFunction::SoftplusLossAversion { .. }
            | UtilityFunction::AsymmetricLogLossAversion { .. } => false,
        }
    }

    /// Resources this utility reads.
    pub fn resources(&self) -> Vec<ResourceType> {
        match self {
            UtilityFunction::Linear { weights }
            | UtilityFunction::Sqrt { weights }
            | UtilityFunction::Log { weights }
            | UtilityFunction::Ces { weights, .. } => weights.keys().copied().collect(),
            UtilityFunction::CobbDouglas { exponents } => exponents.keys().copied().collect(),
            UtilityFunction::Leontief { proportions } => proportions.keys().copied().collect(),
            UtilityFunction::NestedCes { nests, .. } => {
                let mut set = std::collections::BTreeSet::new();
                for nest in nests {
                    set.extend(nest.components.keys().copied());
                }
                set.into_iter().collect()
            }
            UtilityFunction::Threshold { base, .. }
            | UtilityFunction::Satiation { base, .. }
            | UtilityFunction::HyperbolicSatiation { base, .. } => base.resources(),
            UtilityFunction::SoftplusLossAversion { reference, .. }
            | UtilityFunction::AsymmetricLogLossAversion { reference, .. } => {
                reference.keys().copied().collect()
            }
        }
    }

    /// Evaluate the utility at an allocation.
    pub fn evaluate(&self, x: &BTreeMap<ResourceType, f64>) -> f64 {
        match self {
            UtilityFunction::Linear { weights } => weights
                .iter()
                .map(|(r, w)| w * component(x, *r))
                .sum(),

            UtilityFunction::Sqrt { weights } => weights
                .iter()
                .map(|(r, w)| w * component(x, *r).max(0.0).sqrt())
                .sum(),

            UtilityFunction::Log { weights } => weights
                .iter()
                .map(|(r, w)| w * component(x, *r).max(0.0).ln_1p())
                .sum(),

            UtilityFunction::CobbDouglas { exponents } => {
                let mut product = 1.0;
                for (r, w) in exponents {
                    if *w == 0.0 {
                        continue;
                    }
                    let xi = component(x, *r);
                    if xi <= 0.0 {
                        return 0.0;
                    }
                    product *= xi.powf(*w);
                }
                product
            }

            UtilityFunction::Ces { weights, rho } => ces_evaluate(weights, *rho, x),

            UtilityFunction::NestedCes { nests, outer_rho } => {
                let inner: Vec<f64> = nests
                    .iter()
                    .map(|nest| ces_evaluate(&nest.components, nest.rho, x))
                    .collect();
                ces_aggregate(
                    nests.iter().map(|n| n.weight).zip(inner.iter().copied()),
                    *outer_rho,
                )
            }

            UtilityFunction::Leontief { proportions } => {
                let mut value = f64::INFINITY;
                let mut any = false;
                for (r, w) in proportions {
                    if *w > 0.0 {
                        any = true;
                        value = value.min(component(x, *r).max(0.0) / w);
                    }
                }
                if any {
                    value
                } else {
                    0.0
                }
            }

            UtilityFunction::Threshold {
                base,
                threshold,
                sharpness,
            } => {
                let total: f64 = x.values().sum();
                base.evaluate(x) * sigmoid(sharpness * (total - threshold))
            }

            UtilityFunction::Satiation { base, v_max, k } => {
                let b = base.evaluate(x).max(0.0);
                v_max * (1.0 - (-b / k).exp())
            }

            UtilityFunction::HyperbolicSatiation { base, v_max, k } => {
                let b = base.evaluate(x).max(0.0);
                v_max * b / (b + k)
            }

            UtilityFunction::SoftplusLossAversion {
                reference,
                lambda,
                beta,
            } => reference
                .iter()
                .map(|(r, reference_level)| {
                    let delta = component(x, *r) - reference_level;
                    softplus(delta, *beta) - lambda * softplus(-delta, *beta)
                })
                .sum(),

            UtilityFunction::AsymmetricLogLossAversion {
                reference,
                lambda,
                beta,
            } => reference
                .iter()
                .map(|(r, reference_level)| {
                    let delta = component(x, *r) - reference_level;
                    if delta >= 0.0 {
                        (delta / beta).ln_1p()
                    } else {
                        -lambda * (-delta / beta).ln_1p()
                    }
                })
                .sum(),
        }
    }

    /// Analytic gradient at an allocation, over the resources this
    /// utility reads.
    pub fn gradient(&self, x: &BTreeMap<ResourceType, f64>) -> BTreeMap<ResourceType, f64> {
        match self {
            UtilityFunction::Linear { weights } => weights.clone(),

            UtilityFunction::Sqrt { weights } => weights
                .iter()
                .map(|(r, w)| {
                    let xi = component(x, *r).max(X_EPS);
                    (*r, w / (2.0 * xi.sqrt()))
                })
                .collect(),

            UtilityFunction::Log { weights } => weights
                .iter()
                .map(|(r, w)| (*r, w / (1.0 + component(x, *r).max(0.0))))
                .collect(),

            UtilityFunction::CobbDouglas { exponents } => {
                let value = self.evaluate(x);
                exponents
                    .iter()
                    .map(|(r, w)| {
                        let xi = component(x, *r);
                        if xi <= 0.0 || value <= 0.0 {
                            (*r, 0.0)
                        } else {
                            (*r, w * value / xi)
                        }
                    })
                    .collect()
            }

            UtilityFunction::Ces { weights, rho } => ces_gradient(weights, *rho, x),

            UtilityFunction::NestedCes { nests, outer_rho } => {
                // Chain rule: dU/dx = dU/dN_j · dN_j/dx, summed over
                // nests that read the resource.
                let inner: Vec<f64> = nests
                    .iter()
                    .map(|nest| ces_evaluate(&nest.components, nest.rho, x))
                    .collect();
                let outer_value = ces_aggregate(
                    nests.iter().map(|n| n.weight).zip(inner.iter().copied()),
                    *outer_rho,
                );
                let mut grad: BTreeMap<ResourceType, f64> = BTreeMap::new();
                if outer_value <= 0.0 {
                    for nest in nests {
                        for r in nest.components.keys() {
                            grad.entry(*r).or_insert(0.0);
                        }
                    }
                    return grad;
                }
                for (nest, nest_value) in nests.iter().zip(inner.iter()) {
                    if *nest_value <= 0.0 {
                        for r in nest.components.keys() {
                            grad.entry(*r).or_insert(0.0);
                        }
                        continue;
                    }
                    // dU/dN_j = U^{1-ρo} · v_j · N_j^{ρo-1}
                    let outer_marginal = outer_value.powf(1.0 - outer_rho)
                        * nest.weight
                        * nest_value.powf(outer_rho - 1.0);
                    let inner_grad = ces_gradient(&nest.components, nest.rho, x);
                    for (r, g) in inner_grad {
                        *grad.entry(r).or_insert(0.0) += outer_marginal * g;
                    }
                }
                grad
            }

            UtilityFunction::Leontief { proportions } => {
                let mut grad: BTreeMap<ResourceType, f64> =
                    proportions.keys().map(|r| (*r, 0.0)).collect();
                // Marginal on the binding resource only; canonical order
                // breaks ties deterministically.
                let binding = proportions
                    .iter()
                    .filter(|(_, w)| **w > 0.0)
                    .map(|(r, w)| (*r, component(x, *r).max(0.0) / w, *w))
                    .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
                if let Some((r, _, w)) = binding {
                    grad.insert(r, 1.0 / w);
                }
                grad
            }

            UtilityFunction::Threshold {
                base,
                threshold,
                sharpness,
            } => {
                let total: f64 = x.values().sum();
                let gate = sigmoid(sharpness * (total - threshold));
                let gate_slope = sharpness * gate * (1.0 - gate);
                let base_value = base.evaluate(x);
                let base_grad = base.gradient(x);
                base_grad
                    .into_iter()
                    .map(|(r, g)| (r, gate * g + base_value * gate_slope))
                    .collect()
            }

            UtilityFunction::Satiation { base, v_max, k } => {
                let b = base.evaluate(x).max(0.0);
                let outer = (v_max / k) * (-b / k).exp();
                scale_gradient(base.gradient(x), outer)
            }

            UtilityFunction::HyperbolicSatiation { base, v_max, k } => {
                let b = base.evaluate(x).max(0.0);
                let denom = b + k;
                let outer = v_max * k / (denom * denom);
                scale_gradient(base.gradient(x), outer)
            }

            UtilityFunction::SoftplusLossAversion {
                reference,
                lambda,
                beta,
            } => reference
                .iter()
                .map(|(r, reference_level)| {
                    let delta = component(x, *r) - reference_level;
                    // d/dΔ [sp(Δ) − λ·sp(−Δ)] = σ(βΔ) + λ·σ(−βΔ)
                    let slope = sigmoid(beta * delta) + lambda * sigmoid(-beta * delta);
                    (*r, slope)
                })
                .collect(),

            UtilityFunction::AsymmetricLogLossAversion {
                reference,
                lambda,
                beta,
            } => reference
                .iter()
                .map(|(r, reference_level)| {
                    let delta = component(x, *r) - reference_level;
                    let slope = if delta >= 0.0 {
                        1.0 / (beta + delta)
                    } else {
                        lambda / (beta - delta)
                    };
                    (*r, slope)
                })
                .collect(),
        }
    }
}

fn scale_gradient(
    grad: BTreeMap<ResourceType, f64>,
    factor: f64,
) -> BTreeMap<ResourceType, f64> {
    grad.into_iter().map(|(r, g)| (r, factor * g)).collect()
}

fn ces_evaluate(
    weights: &BTreeMap<ResourceType, f64>,
    rho: f64,
    x: &BTreeMap<ResourceType, f64>,
) -> f64 {
    ces_aggregate(
        weights.iter().map(|(r, w)| (*w, component(x, *r))),
        rho,
    )
}

/// `(Σ w_i · v_i^ρ)^{1/ρ}` over (weight, value) pairs.
fn ces_aggregate(terms: impl Iterator<Item = (f64, f64)>, rho: f64) -> f64 {
    let mut sum = 0.0;
    let mut any = false;
    for (w, v) in terms {
        if w == 0.0 {
            continue;
        }
        any = true;
        let v = v.max(0.0);
        if v <= 0.0 {
            if rho < 0.0 {
                // A zero component drives a complementary CES to zero.
                return 0.0;
            }
            continue;
        }
        sum += w * v.powf(rho);
    }
    if !any || sum <= 0.0 {
        return 0.0;
    }
    sum.powf(1.0 / rho)
}

fn ces_gradient(
    weights: &BTreeMap<ResourceType, f64>,
    rho: f64,
    x: &BTreeMap<ResourceType, f64>,
) -> BTreeMap<ResourceType, f64> {
    let value = ces_evaluate(weights, rho, x);
    weights
        .iter()
        .map(|(r, w)| {
            if *w == 0.0 || value <= 0.0 {
                return (*r, 0.0);
            }
            let xi = component(x, *r).max(X_EPS);
            // dU/dx_r = U^{1-ρ} · w_r · x_r^{ρ-1}
            (*r, value.powf(1.0 - rho) * w * xi.powf(rho - 1.0))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alloc(pairs: &[(ResourceType, f64)]) -> BTreeMap<ResourceType, f64> {
        pairs.iter().copied().collect()
    }

    /// Central finite difference check of the analytic gradient.
    fn check_gradient(utility: &UtilityFunction, x: &BTreeMap<ResourceType, f64>, tol: f64) {
        let grad = utility.gradient(x);
        let h = 1e-6;
        for (r, g) in &grad {
            let mut hi = x.clone();
            let mut lo = x.clone();
            *hi.entry(*r).or_insert(0.0) += h;
            *lo.entry(*r).or_insert(0.0) -= h;
            let numeric = (utility.evaluate(&hi) - utility.evaluate(&lo)) / (2.0 * h);
            assert!(
                (numeric - g).abs() <= tol * (1.0 + numeric.abs()),
                "{}: gradient mismatch on {}: analytic {} vs numeric {}",
                utility.kind_name(),
                r,
                g,
                numeric
            );
        }
    }

    #[test]
    fn test_cobb_douglas_zero_on_missing_component() {
        let u = UtilityFunction::CobbDouglas {
            exponents: alloc(&[(ResourceType::Compute, 0.5), (ResourceType::Memory, 0.5)]),
        };
        assert_eq!(u.evaluate(&alloc(&[(ResourceType::Compute, 9.0)])), 0.0);
        let both = alloc(&[(ResourceType::Compute, 9.0), (ResourceType::Memory, 4.0)]);
        assert!((u.evaluate(&both) - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_leontief_binding_resource_only() {
        let u = UtilityFunction::Leontief {
            proportions: alloc(&[(ResourceType::Compute, 2.0), (ResourceType::Memory, 1.0)]),
        };
        let x = alloc(&[(ResourceType::Compute, 10.0), (ResourceType::Memory, 3.0)]);
        assert_eq!(u.evaluate(&x), 3.0);
        let grad = u.gradient(&x);
        assert_eq!(grad[&ResourceType::Memory], 1.0);
        assert_eq!(grad[&ResourceType::Compute], 0.0);
    }

    #[test]
    fn test_interior_gradients_match_finite_differences() {
        let x = alloc(&[
            (ResourceType::Compute, 12.0),
            (ResourceType::Memory, 7.0),
        ]);
        let weights = alloc(&[(ResourceType::Compute, 0.6), (ResourceType::Memory, 0.4)]);

        let kinds = vec![
            UtilityFunction::Linear {
                weights: weights.clone(),
            },
            UtilityFunction::Sqrt {
                weights: weights.clone(),
            },
            UtilityFunction::Log {
                weights: weights.clone(),
            },
            UtilityFunction::CobbDouglas {
                exponents: weights.clone(),
            },
            UtilityFunction::Ces {
                weights: weights.clone(),
                rho: 0.5,
            },
            UtilityFunction::Ces {
                weights: weights.clone(),
                rho: -1.0,
            },
            UtilityFunction::Threshold {
                base: Box::new(UtilityFunction::Linear {
                    weights: weights.clone(),
                }),
                threshold: 15.0,
                sharpness: 0.8,
            },
            UtilityFunction::Satiation {
                base: Box::new(UtilityFunction::Linear {
                    weights: weights.clone(),
                }),
                v_max: 5.0,
                k: 8.0,
            },
            UtilityFunction::HyperbolicSatiation {
                base: Box::new(UtilityFunction::Linear {
                    weights: weights.clone(),
                }),
                v_max: 5.0,
                k: 8.0,
            },
            UtilityFunction::SoftplusLossAversion {
                reference: alloc(&[
                    (ResourceType::Compute, 10.0),
                    (ResourceType::Memory, 9.0),
                ]),
                lambda: 2.0,
                beta: 1.0,
            },
            UtilityFunction::NestedCes {
                nests: vec![
                    CesNest {
                        weight: 0.5,
                        rho: 0.5,
                        components: alloc(&[(ResourceType::Compute, 1.0)]),
                    },
                    CesNest {
                        weight: 0.5,
                        rho: 0.5,
                        components: alloc(&[(ResourceType::Memory, 1.0)]),
                    },
                ],
                outer_rho: -0.5,
            },
        ];

        for utility in &kinds {
            check_gradient(utility, &x, 1e-4);
        }
    }

    #[test]
    fn test_asymmetric_log_loss_punishes_losses_harder() {
        let u = UtilityFunction::AsymmetricLogLossAversion {
            reference: alloc(&[(ResourceType::Compute, 10.0)]),
            lambda: 2.5,
            beta: 2.0,
        };
        let gain = u.evaluate(&alloc(&[(ResourceType::Compute, 14.0)]));
        let loss = u.evaluate(&alloc(&[(ResourceType::Compute, 6.0)]));
        assert!(gain > 0.0);
        assert!(loss < 0.0);
        assert!(loss.abs() > gain.abs());
    }

    #[test]
    fn test_threshold_gates_below_total() {
        let base = UtilityFunction::Linear {
            weights: alloc(&[(ResourceType::Compute, 1.0)]),
        };
        let u = UtilityFunction::Threshold {
            base: Box::new(base),
            threshold: 50.0,
            sharpness: 2.0,
        };
        let below = u.evaluate(&alloc(&[(ResourceType::Compute, 10.0)]));
        let above = u.evaluate(&alloc(&[(ResourceType::Compute, 60.0)]));
        assert!(below < 0.1);
        assert!((above - 60.0).abs() < 1.0);
    }

    #[test]
    fn test_satiation_bounded_by_v_max() {
        let base = UtilityFunction::Linear {
            weights: alloc(&[(ResourceType::Compute, 1.0)]),
        };
        let u = UtilityFunction::Satiation {
            base: Box::new(base),
            v_max: 7.0,
            k: 3.0,
        };
        let huge = u.evaluate(&alloc(&[(ResourceType::Compute, 1e6)]));
        assert!(huge <= 7.0 && huge > 6.99);
    }

    #[test]
    fn test_depth_counts_wrappers() {
        let leaf = UtilityFunction::Linear {
            weights: alloc(&[(ResourceType::Compute, 1.0)]),
        };
        assert_eq!(leaf.depth(), 1);
        let wrapped = UtilityFunction::Satiation {
            base: Box::new(UtilityFunction::Threshold {
                base: Box::new(leaf),
                threshold: 5.0,
                sharpness: 1.0,
            }),
            v_max: 1.0,
            k: 1.0,
        };
        assert_eq!(wrapped.depth(), 3);
    }

    #[test]
    fn test_smooth_concave_classification() {
        let weights = alloc(&[(ResourceType::Compute, 1.0)]);
        assert!(UtilityFunction::Log {
            weights: weights.clone()
        }
        .is_smooth_concave());
        assert!(!UtilityFunction::Leontief {
            proportions: weights.clone()
        }
        .is_smooth_concave());
        assert!(!UtilityFunction::Threshold {
            base: Box::new(UtilityFunction::Linear { weights }),
            threshold: 1.0,
            sharpness: 1.0,
        }
        .is_smooth_concave());
    }
}
