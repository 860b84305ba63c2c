use serde::{Deserialize, Serialize};

/// Press counters of one tutoring session.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccuracyStats {
    pub correct: u32,
    pub mistakes: u32,
}

impl AccuracyStats {
    pub fn presses(&self) -> u32 {
        self.correct + self.mistakes
    }

    /// Percentage of correct presses, rounded to two decimals.
    ///
    /// Before the first press there is nothing to score and the session counts
    /// as 100% accurate. That is a product policy, not a ratio.
    pub fn accuracy(&self) -> f64 {
        let presses = self.presses();
        if presses == 0 {
            return 100.0;
        }
        let ratio = f64::from(self.correct) / f64::from(presses) * 100.0;
        (ratio * 100.0).round() / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn no_presses_is_full_accuracy() {
        assert_eq!(AccuracyStats::default().accuracy(), 100.0);
    }

    #[test]
    fn accuracy_rounds_to_two_decimals() {
        let stats = AccuracyStats { correct: 5, mistakes: 1 };
        assert_relative_eq!(stats.accuracy(), 83.33);
        let stats = AccuracyStats { correct: 2, mistakes: 1 };
        assert_relative_eq!(stats.accuracy(), 66.67);
        let stats = AccuracyStats { correct: 0, mistakes: 4 };
        assert_eq!(stats.accuracy(), 0.0);
    }
}
