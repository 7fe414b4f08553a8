use crate::threshold::sign;

/// Per-coordinate rescaling applied on top of a step family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scaling {
    /// Use the family step unchanged.
    Classic,
    /// Scale by `|tau_j| / i`, where `tau` sums `sign(-g_j)` over iterations.
    Modified,
}

/// Sign-agreement counters and the flipping mask.
///
/// `tau` exists only for [`Scaling::Modified`]; `flags` only when flipping
/// is enabled. A set flag is never cleared.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingState {
    scaling: Scaling,
    lambda: f64,
    tau: Option<Vec<f64>>,
    flags: Option<Vec<bool>>,
    flagged: usize,
}

impl ScalingState {
    pub fn new(scaling: Scaling, flipping: bool, lambda: f64, n: usize) -> Self {
        Self {
            scaling,
            lambda,
            tau: (scaling == Scaling::Modified).then(|| vec![0.0; n]),
            flags: flipping.then(|| vec![false; n]),
            flagged: 0,
        }
    }

    pub fn scaling(&self) -> Scaling {
        self.scaling
    }

    pub fn is_flipping(&self) -> bool {
        self.flags.is_some()
    }

    /// Sign-agreement counter, if tracked.
    pub fn tau(&self) -> Option<&[f64]> {
        self.tau.as_deref()
    }

    /// Flip mask, if flipping is enabled.
    pub fn flags(&self) -> Option<&[bool]> {
        self.flags.as_deref()
    }

    /// Number of coordinates flagged so far.
    pub fn flagged_count(&self) -> usize {
        self.flagged
    }

    /// Flags every coordinate whose pre-threshold value exceeds `lambda`.
    ///
    /// Called with the value from before this iteration's update. Returns
    /// the number of newly flagged coordinates.
    pub fn refresh_flags(&mut self, pre_threshold: &[f64]) -> usize {
        let Some(flags) = self.flags.as_mut() else {
            return 0;
        };
        let mut newly = 0;
        for (flag, &v) in flags.iter_mut().zip(pre_threshold) {
            if !*flag && v.abs() > self.lambda {
                *flag = true;
                newly += 1;
            }
        }
        self.flagged += newly;
        newly
    }

    /// Adds `sign(-g)` to the counters.
    pub fn accumulate_signs(&mut self, gradient: &[f64]) {
        if let Some(tau) = self.tau.as_mut() {
            for (tj, &g) in tau.iter_mut().zip(gradient) {
                *tj += sign(-g);
            }
        }
    }

    /// Writes the effective per-coordinate step for iteration `iteration`
    /// (1-based) into `out`.
    ///
    /// Flagged coordinates fall back to the family step `t`.
    pub fn apply(&self, iteration: usize, t: &[f64], out: &mut [f64]) {
        debug_assert_eq!(t.len(), out.len());
        let Some(tau) = self.tau.as_deref() else {
            out.copy_from_slice(t);
            return;
        };
        let inv_iter = 1.0 / iteration as f64;
        for j in 0..t.len() {
            let frozen = self.flags.as_ref().is_some_and(|flags| flags[j]);
            out[j] = if frozen {
                t[j]
            } else {
                t[j] * tau[j].abs() * inv_iter
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classic_passes_step_through() {
        let state = ScalingState::new(Scaling::Classic, false, 1.0, 3);
        let mut out = [0.0; 3];
        state.apply(4, &[0.5, 1.0, 2.0], &mut out);
        assert_eq!(out, [0.5, 1.0, 2.0]);
        assert!(state.tau().is_none());
        assert!(state.flags().is_none());
    }

    #[test]
    fn modified_scales_by_sign_agreement() {
        let mut state = ScalingState::new(Scaling::Modified, false, 1.0, 3);
        state.accumulate_signs(&[-1.0, 2.0, 0.0]);
        state.accumulate_signs(&[-3.0, -2.0, 0.0]);
        assert_eq!(state.tau().unwrap(), &[2.0, 0.0, 0.0]);
        let mut out = [0.0; 3];
        state.apply(2, &[0.5, 0.5, 0.5], &mut out);
        assert_eq!(out, [0.5, 0.0, 0.0]);
    }

    #[test]
    fn flags_are_monotone_and_freeze_scaling() {
        let mut state = ScalingState::new(Scaling::Modified, true, 1.0, 3);
        state.accumulate_signs(&[1.0, 1.0, 1.0]);
        assert_eq!(state.refresh_flags(&[0.5, -1.5, 1.0]), 1);
        assert_eq!(state.flags().unwrap(), &[false, true, false]);

        // Falling back below the threshold does not clear the flag.
        assert_eq!(state.refresh_flags(&[0.0, 0.0, 0.0]), 0);
        assert_eq!(state.flags().unwrap(), &[false, true, false]);
        assert_eq!(state.flagged_count(), 1);

        let mut out = [0.0; 3];
        state.apply(2, &[0.25, 0.25, 0.25], &mut out);
        assert_eq!(out, [0.125, 0.25, 0.125]);
    }
}
