//! Measure names and the aggregated evaluation result.

use crate::error::EvalError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One reported quantity. Ranking measures carry their cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Measure {
    Precision(usize),
    Recall(usize),
    Map(usize),
    Ndcg(usize),
    Diversity(usize),
    /// Milliseconds spent training (validation included)
    TrainTime,
    /// Milliseconds spent evaluating
    TestTime,
}

impl Measure {
    /// The four accuracy measures reported at `cutoff`
    pub fn ranking_at(cutoff: usize) -> [Measure; 4] {
        [
            Measure::Precision(cutoff),
            Measure::Recall(cutoff),
            Measure::Map(cutoff),
            Measure::Ndcg(cutoff),
        ]
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measure::Precision(c) => write!(f, "Precision@{c}"),
            Measure::Recall(c) => write!(f, "Recall@{c}"),
            Measure::Map(c) => write!(f, "MAP@{c}"),
            Measure::Ndcg(c) => write!(f, "NDCG@{c}"),
            Measure::Diversity(c) => write!(f, "Diversity@{c}"),
            Measure::TrainTime => f.write_str("TrainTime"),
            Measure::TestTime => f.write_str("TestTime"),
        }
    }
}

impl FromStr for Measure {
    type Err = EvalError;

    /// Parses the `Display` form, case-insensitive (`ndcg@10`, `TrainTime`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || EvalError::UnknownMeasure(s.to_string());
        let lower = s.trim().to_lowercase();

        match lower.as_str() {
            "traintime" => return Ok(Measure::TrainTime),
            "testtime" => return Ok(Measure::TestTime),
            _ => {}
        }

        let (name, cutoff) = lower.split_once('@').ok_or_else(unknown)?;
        let cutoff: usize = cutoff.parse().map_err(|_| unknown())?;
        if cutoff == 0 {
            return Err(unknown());
        }
        match name {
            "precision" | "prec" => Ok(Measure::Precision(cutoff)),
            "recall" | "rec" => Ok(Measure::Recall(cutoff)),
            "map" => Ok(Measure::Map(cutoff)),
            "ndcg" => Ok(Measure::Ndcg(cutoff)),
            "diversity" | "div" => Ok(Measure::Diversity(cutoff)),
            _ => Err(unknown()),
        }
    }
}

impl TryFrom<String> for Measure {
    type Error = EvalError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Measure> for String {
    fn from(measure: Measure) -> Self {
        measure.to_string()
    }
}

/// Aggregated result of one evaluation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub measures: BTreeMap<Measure, f64>,
    /// Users that contributed metric values
    pub evaluated_users: usize,
    /// Users left out: no scoreable candidate
    pub skipped_users: usize,
    /// Users whose evaluation panicked
    pub failed_users: usize,
}

impl EvaluationResult {
    pub fn get(&self, measure: Measure) -> Option<f64> {
        self.measures.get(&measure).copied()
    }

    pub fn insert(&mut self, measure: Measure, value: f64) {
        self.measures.insert(measure, value);
    }

    /// Measures in display order
    pub fn iter(&self) -> impl Iterator<Item = (Measure, f64)> + '_ {
        self.measures.iter().map(|(&m, &v)| (m, v))
    }
}

impl fmt::Display for EvaluationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(m, v)| match m {
                Measure::TrainTime | Measure::TestTime => format!("{m}: {v:.0}ms"),
                _ => format!("{m}: {v:.6}"),
            })
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_display_forms() {
        for measure in [
            Measure::Precision(5),
            Measure::Recall(10),
            Measure::Map(10),
            Measure::Ndcg(3),
            Measure::Diversity(5),
            Measure::TrainTime,
            Measure::TestTime,
        ] {
            assert_eq!(measure.to_string().parse::<Measure>().unwrap(), measure);
        }
        assert_eq!("ndcg@10".parse::<Measure>().unwrap(), Measure::Ndcg(10));
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!("auc@10".parse::<Measure>().is_err());
        assert!("ndcg".parse::<Measure>().is_err());
        assert!("ndcg@0".parse::<Measure>().is_err());
    }

    #[test]
    fn test_result_serializes_with_measure_names() {
        let mut result = EvaluationResult::default();
        result.insert(Measure::Precision(5), 0.5);
        result.evaluated_users = 2;

        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"Precision@5\":0.5"));
        let back: EvaluationResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }
}
