//! Gradient-boosted regression trees for the fast engine.
//!
//! Squared-error objective with second-order leaf weights, so every sample
//! carries a hessian of 1 and a gradient of `prediction - target`.

use serde::{Deserialize, Serialize};

use super::features::TrainingRow;
use super::{Reading, Regressor};

const FEATURES: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostingParams {
    #[serde(default = "default_estimators")]
    pub n_estimators: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_lambda")]
    pub lambda: f64,
    #[serde(default = "default_min_child_weight")]
    pub min_child_weight: f64,
}

fn default_estimators() -> usize {
    100
}

fn default_learning_rate() -> f64 {
    0.3
}

fn default_max_depth() -> usize {
    6
}

fn default_lambda() -> f64 {
    1.0
}

fn default_min_child_weight() -> f64 {
    1.0
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: default_estimators(),
            learning_rate: default_learning_rate(),
            max_depth: default_max_depth(),
            lambda: default_lambda(),
            min_child_weight: default_min_child_weight(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict(&self, x: &[f64; FEATURES]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if x[*feature] < *threshold { *left } else { *right };
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedTrees {
    base_score: f64,
    trees: Vec<Tree>,
}

impl BoostedTrees {
    /// Fits on raw (voltage, current, temperature) -> SoC. `None` only for an
    /// empty row set.
    pub fn fit(rows: &[TrainingRow], params: &BoostingParams) -> Option<Self> {
        if rows.is_empty() {
            return None;
        }
        let xs: Vec<[f64; FEATURES]> = rows.iter().map(TrainingRow::features).collect();
        let ys: Vec<f64> = rows.iter().map(|row| row.soc).collect();

        let base_score = ys.iter().sum::<f64>() / ys.len() as f64;
        let mut preds = vec![base_score; ys.len()];
        let mut trees = Vec::with_capacity(params.n_estimators);

        for _ in 0..params.n_estimators {
            let grads: Vec<f64> = preds.iter().zip(&ys).map(|(p, y)| p - y).collect();
            let mut builder = TreeBuilder {
                xs: &xs,
                grads: &grads,
                params,
                nodes: Vec::new(),
            };
            let all: Vec<usize> = (0..xs.len()).collect();
            builder.grow(all, 0);
            let tree = Tree {
                nodes: builder.nodes,
            };
            for (pred, x) in preds.iter_mut().zip(&xs) {
                *pred += tree.predict(x);
            }
            trees.push(tree);
        }

        tracing::debug!(
            rows = rows.len(),
            trees = trees.len(),
            train_rmse = rmse(&preds, &ys),
            "fitted boosted trees"
        );

        Some(Self { base_score, trees })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Regressor for BoostedTrees {
    fn predict(&self, reading: &Reading) -> f64 {
        let x = reading.as_array();
        self.base_score + self.trees.iter().map(|tree| tree.predict(&x)).sum::<f64>()
    }
}

struct TreeBuilder<'a> {
    xs: &'a [[f64; FEATURES]],
    grads: &'a [f64],
    params: &'a BoostingParams,
    nodes: Vec<Node>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl TreeBuilder<'_> {
    /// Appends the subtree for `indices` and returns its root slot.
    fn grow(&mut self, indices: Vec<usize>, depth: usize) -> usize {
        let slot = self.nodes.len();
        self.nodes.push(Node::Leaf { value: 0.0 });

        let g: f64 = indices.iter().map(|&i| self.grads[i]).sum();
        let h = indices.len() as f64;

        let split = if depth < self.params.max_depth && indices.len() >= 2 {
            self.best_split(&indices, g, h)
        } else {
            None
        };

        let Some(split) = split else {
            self.nodes[slot] = Node::Leaf {
                value: -g / (h + self.params.lambda) * self.params.learning_rate,
            };
            return slot;
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.xs[i][split.feature] < split.threshold);
        let left = self.grow(left_idx, depth + 1);
        let right = self.grow(right_idx, depth + 1);
        self.nodes[slot] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        slot
    }

    fn best_split(&self, indices: &[usize], g: f64, h: f64) -> Option<SplitCandidate> {
        let lambda = self.params.lambda;
        let parent = g * g / (h + lambda);
        let mut best: Option<SplitCandidate> = None;

        let mut order = indices.to_vec();
        for feature in 0..FEATURES {
            order.sort_by(|&a, &b| self.xs[a][feature].total_cmp(&self.xs[b][feature]));

            let mut gl = 0.0;
            let mut hl = 0.0;
            for pos in 0..order.len() - 1 {
                gl += self.grads[order[pos]];
                hl += 1.0;
                let here = self.xs[order[pos]][feature];
                let next = self.xs[order[pos + 1]][feature];
                if here == next {
                    continue;
                }
                let gr = g - gl;
                let hr = h - hl;
                if hl < self.params.min_child_weight || hr < self.params.min_child_weight {
                    continue;
                }
                let gain = 0.5 * (gl * gl / (hl + lambda) + gr * gr / (hr + lambda) - parent);
                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: (here + next) / 2.0,
                        gain,
                    });
                }
            }
        }
        best
    }
}

fn rmse(preds: &[f64], ys: &[f64]) -> f64 {
    if ys.is_empty() {
        return 0.0;
    }
    let sse: f64 = preds.iter().zip(ys).map(|(p, y)| (p - y).powi(2)).sum();
    (sse / ys.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_rows() -> Vec<TrainingRow> {
        (0..=50)
            .map(|t| {
                let time = t as f64;
                TrainingRow {
                    voltage: 10.0 + time / 100.0,
                    current: 1.0,
                    temperature: 25.0,
                    soc: 100.0 - 2.0 * time,
                    time,
                    remaining_time: 50.0 - time,
                }
            })
            .collect()
    }

    #[test]
    fn recovers_linear_discharge_curve() {
        let model = BoostedTrees::fit(&linear_rows(), &BoostingParams::default()).unwrap();
        assert_eq!(model.n_trees(), 100);

        let soc = model.predict(&Reading::new(10.0 + 25.0 / 100.0, 1.0, 25.0));
        assert!((soc - 50.0).abs() <= 3.0, "predicted {soc}");

        let full = model.predict(&Reading::new(10.0, 1.0, 25.0));
        assert!((full - 100.0).abs() <= 3.0, "predicted {full}");
    }

    #[test]
    fn prediction_is_unclipped_and_deterministic() {
        let rows = linear_rows();
        let a = BoostedTrees::fit(&rows, &BoostingParams::default()).unwrap();
        let b = BoostedTrees::fit(&rows, &BoostingParams::default()).unwrap();
        assert_eq!(a, b);

        let reading = Reading::new(9.0, 1.0, 25.0);
        assert_eq!(a.predict(&reading), b.predict(&reading));
    }

    #[test]
    fn constant_target_yields_flat_model() {
        let rows: Vec<TrainingRow> = linear_rows()
            .into_iter()
            .map(|mut row| {
                row.soc = 42.0;
                row
            })
            .collect();
        let model = BoostedTrees::fit(&rows, &BoostingParams::default()).unwrap();
        let soc = model.predict(&Reading::new(10.3, 1.0, 25.0));
        assert!((soc - 42.0).abs() < 1e-9);
    }

    #[test]
    fn empty_rows_do_not_fit() {
        assert!(BoostedTrees::fit(&[], &BoostingParams::default()).is_none());
    }
}
