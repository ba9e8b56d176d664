//! Flat key-value option store.
//!
//! Options are keyed by `Category.Name` strings (e.g.
//! `Dual.HyperplaneCuts.MaxPerIteration`). Every recognized key is
//! registered with its default at construction; setting an unknown key is
//! reported and ignored, never fatal. Typed getters fall back to the
//! registered default on a type mismatch.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{EngineError, OaResult};

/// A typed option value.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    /// Boolean option.
    Bool(bool),
    /// Integer option.
    Int(i64),
    /// Floating-point option.
    Float(f64),
    /// String option.
    Text(String),
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Bool(v) => write!(f, "{}", v),
            SettingValue::Int(v) => write!(f, "{}", v),
            SettingValue::Float(v) => write!(f, "{}", v),
            SettingValue::Text(v) => write!(f, "{}", v),
        }
    }
}

/// The option store with registered defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    values: BTreeMap<String, SettingValue>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut s = Self {
            values: BTreeMap::new(),
        };
        s.register_defaults();
        s
    }
}

impl Settings {
    fn register(&mut self, key: &str, value: SettingValue) {
        self.values.insert(key.to_string(), value);
    }

    fn register_defaults(&mut self) {
        use SettingValue::*;

        // Dual engine.
        self.register("Dual.CutStrategy", Text("ESH".into()));
        self.register("Dual.TreeStrategy", Text("MultiTree".into()));
        self.register("Dual.MIP.Solver", Text("BranchAndBound".into()));
        self.register("Dual.MIP.CutOff.Tolerance", Float(1e-5));
        self.register("Dual.MIP.SolutionLimit.Initial", Int(2_100_000_000));
        self.register("Dual.HyperplaneCuts.MaxPerIteration", Int(200));
        self.register("Dual.HyperplaneCuts.ConstraintSelectionFactor", Float(0.25));
        self.register("Dual.HyperplaneCuts.MaxConstraintFactor", Float(0.1));
        self.register("Dual.HyperplaneCuts.UseIntegerCuts", Bool(true));
        self.register("Dual.ESH.Rootsearch.UniqueConstraints", Bool(true));
        self.register("Dual.ESH.Rootsearch.ConstraintTolerance", Float(1e-8));
        self.register("Dual.ESH.InteriorPoint.Solver", Text("CuttingPlaneMiniMax".into()));
        self.register("Dual.ESH.InteriorPoint.UsePrimalSolution", Text("No".into()));
        self.register("Dual.ESH.InteriorPoint.CuttingPlane.IterationLimit", Int(100));
        self.register(
            "Dual.ESH.InteriorPoint.CuttingPlane.TerminationToleranceAbs",
            Float(1.0),
        );
        self.register(
            "Dual.ESH.InteriorPoint.CuttingPlane.TerminationToleranceRel",
            Float(1.0),
        );
        self.register(
            "Dual.ESH.InteriorPoint.CuttingPlane.ConstraintSelectionFactor",
            Float(0.25),
        );
        self.register("Dual.ESH.InteriorPoint.CuttingPlane.BitPrecision", Int(8));
        self.register(
            "Dual.ESH.InteriorPoint.CuttingPlane.IterationLimitSubsolver",
            Int(100),
        );
        self.register("Dual.ESH.InteriorPoint.MinimaxObjectiveLowerBound", Float(-1e10));
        self.register("Dual.ESH.InteriorPoint.MinimaxObjectiveUpperBound", Float(0.1));
        self.register("Dual.Relaxation.Use", Bool(true));
        self.register("Dual.Relaxation.IterationLimit", Int(3));
        self.register("Dual.Relaxation.MaxLazyConstraints", Int(500));

        // Primal engine.
        self.register("Primal.FixedInteger.Use", Bool(true));
        self.register("Primal.FixedInteger.Frequency.Iteration", Int(10));
        self.register("Primal.FixedInteger.Frequency.Time", Float(5.0));
        self.register("Primal.FixedInteger.Frequency.Dynamic", Bool(true));
        self.register("Primal.FixedInteger.Warmstart", Bool(true));
        self.register("Primal.FixedInteger.CreateInfeasibilityCut", Bool(true));
        self.register("Primal.Rootsearch.Use", Bool(true));
        self.register("Primal.Pool.MaxSize", Int(10));
        self.register("Primal.Tolerance.Integer", Float(1e-5));
        self.register("Primal.Tolerance.LinearConstraint", Float(1e-6));
        self.register("Primal.Tolerance.NonlinearConstraint", Float(1e-5));
        self.register("Primal.TrustLinearConstraintValues", Bool(false));

        // Subsolvers.
        self.register("Subsolver.Rootsearch.MaxIterations", Int(100));
        self.register("Subsolver.Rootsearch.TerminationTolerance", Float(1e-10));
        self.register("Subsolver.Rootsearch.ActiveConstraintTolerance", Float(1e-9));
        self.register("Subsolver.Lp.IterationLimit", Int(10_000));
        self.register("Subsolver.Lp.TimeLimit", Float(60.0));
        self.register("Subsolver.Nlp.IterationLimit", Int(100));
        self.register("Subsolver.Nlp.ConstraintTolerance", Float(1e-8));
        self.register("Subsolver.Mip.TimeLimit", Float(300.0));
        self.register("Subsolver.Mip.NodeLimit", Int(500_000));

        // Model / reformulation.
        self.register("Model.Reformulation.PartitionQuadraticSums", Bool(false));
        self.register("Model.Reformulation.PartitionSignomialSums", Bool(false));
        self.register("Model.Reformulation.Bilinear.UseMcCormick", Bool(true));
        self.register("Model.Quadratics.KeepInMaster", Bool(false));
        self.register("Model.BoundTightening.FeasibilityBased.Use", Bool(true));
        self.register("Model.BoundTightening.FeasibilityBased.UseNonlinear", Bool(true));
        self.register("Model.BoundTightening.FeasibilityBased.MaxIterations", Int(5));

        // Termination.
        self.register("Termination.ObjectiveGap.Absolute", Float(1e-6));
        self.register("Termination.ObjectiveGap.Relative", Float(1e-6));
        self.register("Termination.TimeLimit", Float(1e10));
        self.register("Termination.IterationLimit", Int(200));
        self.register("Termination.ConstraintTolerance", Float(1e-8));
        self.register("Termination.DualStagnation.IterationLimit", Int(50));
        self.register("Termination.InfeasibilityRepair.IterationLimit", Int(10));
        self.register("Termination.InfeasibilityRepair.TimeLimit", Float(10.0));

        // Convexity.
        self.register("Convexity.AssumeConvex", Bool(false));

        // Output / input.
        self.register("Output.IterationDetail", Bool(true));
        self.register("Input.ProblemFile", Text(String::new()));
    }

    /// Set a typed value. Unknown keys are reported and ignored; a type
    /// mismatch against the registered default is an error.
    pub fn set(&mut self, key: &str, value: SettingValue) -> OaResult<()> {
        match self.values.get(key) {
            None => {
                log::warn!("ignoring unknown option '{}'", key);
                Ok(())
            }
            Some(existing) => {
                let compatible = matches!(
                    (existing, &value),
                    (SettingValue::Bool(_), SettingValue::Bool(_))
                        | (SettingValue::Int(_), SettingValue::Int(_))
                        | (SettingValue::Float(_), SettingValue::Float(_))
                        | (SettingValue::Float(_), SettingValue::Int(_))
                        | (SettingValue::Text(_), SettingValue::Text(_))
                );
                if !compatible {
                    return Err(EngineError::InvalidOption {
                        key: key.to_string(),
                        reason: format!("expected a value like {:?}", existing),
                    });
                }
                let value = match (existing, value) {
                    (SettingValue::Float(_), SettingValue::Int(v)) => SettingValue::Float(v as f64),
                    (_, v) => v,
                };
                self.values.insert(key.to_string(), value);
                Ok(())
            }
        }
    }

    /// Parse and set a value from its string form (CLI `-o Key=Value`).
    pub fn set_from_str(&mut self, key: &str, raw: &str) -> OaResult<()> {
        let parsed = match self.values.get(key) {
            None => {
                log::warn!("ignoring unknown option '{}'", key);
                return Ok(());
            }
            Some(SettingValue::Bool(_)) => raw
                .parse::<bool>()
                .map(SettingValue::Bool)
                .map_err(|e| e.to_string()),
            Some(SettingValue::Int(_)) => raw
                .parse::<i64>()
                .map(SettingValue::Int)
                .map_err(|e| e.to_string()),
            Some(SettingValue::Float(_)) => raw
                .parse::<f64>()
                .map(SettingValue::Float)
                .map_err(|e| e.to_string()),
            Some(SettingValue::Text(_)) => Ok(SettingValue::Text(raw.to_string())),
        };
        match parsed {
            Ok(v) => self.set(key, v),
            Err(reason) => Err(EngineError::InvalidOption {
                key: key.to_string(),
                reason,
            }),
        }
    }

    /// Boolean option.
    pub fn get_bool(&self, key: &str) -> bool {
        match self.values.get(key) {
            Some(SettingValue::Bool(v)) => *v,
            other => {
                log::debug!("option '{}' not a bool ({:?}), using false", key, other);
                false
            }
        }
    }

    /// Integer option.
    pub fn get_int(&self, key: &str) -> i64 {
        match self.values.get(key) {
            Some(SettingValue::Int(v)) => *v,
            other => {
                log::debug!("option '{}' not an int ({:?}), using 0", key, other);
                0
            }
        }
    }

    /// Floating-point option.
    pub fn get_float(&self, key: &str) -> f64 {
        match self.values.get(key) {
            Some(SettingValue::Float(v)) => *v,
            Some(SettingValue::Int(v)) => *v as f64,
            other => {
                log::debug!("option '{}' not a float ({:?}), using 0", key, other);
                0.0
            }
        }
    }

    /// String option.
    pub fn get_text(&self, key: &str) -> String {
        match self.values.get(key) {
            Some(SettingValue::Text(v)) => v.clone(),
            other => {
                log::debug!("option '{}' not a string ({:?}), using empty", key, other);
                String::new()
            }
        }
    }

    /// Iterate over all keys and current values.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &SettingValue)> {
        self.values.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_registered() {
        let s = Settings::default();
        assert_eq!(s.get_text("Dual.CutStrategy"), "ESH");
        assert_eq!(s.get_int("Termination.IterationLimit"), 200);
        assert!(s.get_bool("Dual.HyperplaneCuts.UseIntegerCuts"));
        assert!((s.get_float("Termination.ObjectiveGap.Absolute") - 1e-6).abs() < 1e-20);
    }

    #[test]
    fn test_set_and_parse() {
        let mut s = Settings::default();
        s.set_from_str("Termination.IterationLimit", "50").unwrap();
        assert_eq!(s.get_int("Termination.IterationLimit"), 50);

        s.set_from_str("Dual.CutStrategy", "ECP").unwrap();
        assert_eq!(s.get_text("Dual.CutStrategy"), "ECP");

        s.set_from_str("Termination.TimeLimit", "12.5").unwrap();
        assert!((s.get_float("Termination.TimeLimit") - 12.5).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_key_is_ignored() {
        let mut s = Settings::default();
        assert!(s.set_from_str("No.Such.Key", "1").is_ok());
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let mut s = Settings::default();
        assert!(s.set_from_str("Termination.IterationLimit", "abc").is_err());
        assert!(s
            .set("Dual.CutStrategy", SettingValue::Int(3))
            .is_err());
    }

    #[test]
    fn test_int_promotes_to_float() {
        let mut s = Settings::default();
        s.set("Termination.TimeLimit", SettingValue::Int(30)).unwrap();
        assert!((s.get_float("Termination.TimeLimit") - 30.0).abs() < 1e-12);
    }
}
