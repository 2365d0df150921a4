// =============================================================================
// Estimation Sample
// =============================================================================
//
// The subset of panel rows a given specification can use: both the outcome
// and the budget regressor must be defined. Lagged terms therefore lose each
// institution's first year, log terms lose non-positive values.
//
// Entity ids are re-densified (0..n_entities) after every filter so the
// estimators can index per-entity arrays directly.
//
// =============================================================================

use std::collections::BTreeMap;

use crate::panel::PanelDataset;
use crate::spec::ModelSpecification;

#[derive(Debug, Clone, Default)]
pub(crate) struct Sample {
    pub y: Vec<f64>,
    /// The budget regressor.
    pub x: Vec<f64>,
    pub post: Vec<f64>,
    pub entity: Vec<usize>,
    pub year: Vec<i32>,
    pub n_entities: usize,
}

impl Sample {
    pub fn select(panel: &PanelDataset, spec: &ModelSpecification) -> Self {
        let mut sample = Sample::default();
        for row in panel.rows() {
            if let (Some(y), Some(x)) = (row.outcome(spec.outcome), row.budget_term(spec.budget)) {
                sample.y.push(y);
                sample.x.push(x);
                sample.post.push(f64::from(row.post_policy));
                sample.entity.push(row.entity);
                sample.year.push(row.year);
            }
        }
        sample.densify_entities();
        sample
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    /// Number of distinct years in the sample.
    pub fn n_periods(&self) -> usize {
        let mut years = self.year.clone();
        years.sort_unstable();
        years.dedup();
        years.len()
    }

    /// Observations per entity, indexed by dense entity id.
    pub fn entity_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_entities];
        for &e in &self.entity {
            counts[e] += 1;
        }
        counts
    }

    /// Per-entity means of a column.
    pub fn entity_means(&self, values: &[f64]) -> Vec<f64> {
        let mut sums = vec![0.0; self.n_entities];
        for (&e, &v) in self.entity.iter().zip(values) {
            sums[e] += v;
        }
        sums.iter()
            .zip(self.entity_counts())
            .map(|(s, c)| if c > 0 { s / c as f64 } else { f64::NAN })
            .collect()
    }

    /// Drop entities observed in fewer than two periods. Returns how many
    /// entities were dropped.
    pub fn drop_single_period_entities(&mut self) -> usize {
        let counts = self.entity_counts();
        let dropped = counts.iter().filter(|&&c| c < 2).count();
        if dropped == 0 {
            return 0;
        }

        let keep: Vec<bool> = self.entity.iter().map(|&e| counts[e] >= 2).collect();
        let filter = |v: &mut Vec<f64>| {
            let mut it = keep.iter();
            v.retain(|_| *it.next().unwrap_or(&false));
        };
        filter(&mut self.y);
        filter(&mut self.x);
        filter(&mut self.post);
        let mut it = keep.iter();
        self.entity.retain(|_| *it.next().unwrap_or(&false));
        let mut it = keep.iter();
        self.year.retain(|_| *it.next().unwrap_or(&false));

        self.densify_entities();
        dropped
    }

    fn densify_entities(&mut self) {
        let mut map: BTreeMap<usize, usize> = BTreeMap::new();
        for &e in &self.entity {
            let next = map.len();
            map.entry(e).or_insert(next);
        }
        for e in &mut self.entity {
            *e = map[&*e];
        }
        self.n_entities = map.len();
    }
}
