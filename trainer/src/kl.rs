//! KL-divergence learning rate control
//!
//! After every training step the policy shift on a held-out batch is
//! compared with `kl_target`. Steps that moved the policy too far shrink the
//! learning rate, steps that barely moved it grow the rate.

/// Mean KL(old || new) over a batch of policy pairs.
///
/// Entries where `old` is zero contribute nothing; `new` is floored at a
/// small epsilon so a collapsed probability gives a large but finite value.
pub fn mean_kl(old: &[Vec<f32>], new: &[Vec<f32>]) -> f64 {
    const EPS: f64 = 1e-10;
    if old.is_empty() {
        return 0.0;
    }
    let total: f64 = old
        .iter()
        .zip(new)
        .map(|(p, q)| {
            p.iter()
                .zip(q)
                .filter(|(p, _)| **p > 0.0)
                .map(|(&p, &q)| {
                    let p = p as f64;
                    p * (p.ln() - (q as f64).max(EPS).ln())
                })
                .sum::<f64>()
        })
        .sum();
    total / old.len() as f64
}

/// Multiplicative learning-rate controller.
#[derive(Debug, Clone, PartialEq)]
pub struct KlController {
    pub kl_target: f64,
    /// Band half-width as a ratio: no change while
    /// `target / tolerance <= kl <= target * tolerance`
    pub tolerance: f64,
    pub factor: f64,
    pub min_multiplier: f64,
    pub max_multiplier: f64,
    multiplier: f64,
}

impl KlController {
    pub fn new(kl_target: f64) -> Self {
        Self {
            kl_target,
            tolerance: 2.0,
            factor: 1.5,
            min_multiplier: 0.1,
            max_multiplier: 10.0,
            multiplier: 1.0,
        }
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Effective learning rate for `base`.
    pub fn learning_rate(&self, base: f64) -> f64 {
        base * self.multiplier
    }

    /// Early-stop threshold for the epochs of one step.
    pub fn early_stop_kl(&self) -> f64 {
        4.0 * self.kl_target
    }

    /// Feed the KL of the last step; returns the new multiplier.
    pub fn update(&mut self, kl: f64) -> f64 {
        if kl > self.kl_target * self.tolerance {
            self.multiplier /= self.factor;
        } else if kl < self.kl_target / self.tolerance {
            self.multiplier *= self.factor;
        }
        self.multiplier = self
            .multiplier
            .clamp(self.min_multiplier, self.max_multiplier);
        self.multiplier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_above_band_shrinks_lr() {
        let mut kl = KlController::new(0.02);
        let before = kl.learning_rate(2e-3);
        kl.update(0.05);
        assert!(kl.learning_rate(2e-3) < before);
        assert!((kl.multiplier() - 1.0 / 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_below_band_grows_lr() {
        let mut kl = KlController::new(0.02);
        let before = kl.learning_rate(2e-3);
        kl.update(0.001);
        assert!(kl.learning_rate(2e-3) > before);
        assert!((kl.multiplier() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_inside_band_unchanged() {
        let mut kl = KlController::new(0.02);
        for value in [0.01, 0.02, 0.04] {
            kl.update(value);
            assert_eq!(kl.multiplier(), 1.0);
        }
    }

    #[test]
    fn test_multiplier_is_clamped() {
        let mut kl = KlController::new(0.02);
        for _ in 0..50 {
            kl.update(1.0);
        }
        assert_eq!(kl.multiplier(), 0.1);
        for _ in 0..50 {
            kl.update(0.0);
        }
        assert_eq!(kl.multiplier(), 10.0);
    }

    #[test]
    fn test_mean_kl() {
        let p = vec![vec![0.5, 0.5, 0.0]];
        assert_eq!(mean_kl(&p, &p), 0.0);

        let q = vec![vec![0.25, 0.75, 0.0]];
        let expected = 0.5 * (0.5f64 / 0.25).ln() + 0.5 * (0.5f64 / 0.75).ln();
        assert!((mean_kl(&p, &q) - expected).abs() < 1e-6);
        assert!(mean_kl(&p, &q) > 0.0);

        // Collapsed target probability stays finite
        let collapsed = vec![vec![1.0, 0.0, 0.0]];
        assert!(mean_kl(&p, &collapsed).is_finite());
        assert_eq!(mean_kl(&[], &[]), 0.0);
    }
}
