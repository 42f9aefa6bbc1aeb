use std::collections::HashMap;

use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

/// Result of a satisfiability check.
#[derive(Debug, Clone, PartialEq)]
pub enum SatResult {
    Sat,
    Unsat,
    Unknown(String),
}

/// A model extracted from a SAT result.
///
/// Values are kept as the backend's canonical text (integers as decimal
/// digits, rationals as `num/den`, booleans as `true`/`false`) so that
/// narrowing to a working float happens in exactly one place,
/// [`crate::value::decode`].
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub values: HashMap<String, String>,
}

impl Model {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Abstract SMT solver interface.
///
/// One synthesis run is one-shot: declare, assert, check once, read the
/// model. There is no incremental push/pop surface.
pub trait SmtSolver {
    type Error: std::error::Error;

    /// Declare a new variable.
    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), Self::Error>;

    /// Assert a constraint.
    fn assert(&mut self, term: &SmtTerm) -> Result<(), Self::Error>;

    /// Check satisfiability.
    fn check_sat(&mut self) -> Result<SatResult, Self::Error>;

    /// Check satisfiability and, if SAT, evaluate the named variables.
    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), Self::Error>;

    /// Reset the solver state.
    fn reset(&mut self) -> Result<(), Self::Error>;

    /// Backend identification for session diagnostics (name, version).
    fn describe(&self) -> String {
        "unidentified solver backend".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct MockSolver {
        sat_result: SatResult,
        check_sat_calls: usize,
        reset_calls: usize,
    }

    impl MockSolver {
        fn new(sat_result: SatResult) -> Self {
            Self {
                sat_result,
                check_sat_calls: 0,
                reset_calls: 0,
            }
        }
    }

    impl SmtSolver for MockSolver {
        type Error = io::Error;

        fn declare_var(&mut self, _name: &str, _sort: &SmtSort) -> Result<(), Self::Error> {
            Ok(())
        }

        fn assert(&mut self, _term: &SmtTerm) -> Result<(), Self::Error> {
            Ok(())
        }

        fn check_sat(&mut self) -> Result<SatResult, Self::Error> {
            self.check_sat_calls += 1;
            Ok(self.sat_result.clone())
        }

        fn check_sat_with_model(
            &mut self,
            _var_names: &[(&str, &SmtSort)],
        ) -> Result<(SatResult, Option<Model>), Self::Error> {
            self.check_sat_calls += 1;
            Ok((self.sat_result.clone(), None))
        }

        fn reset(&mut self) -> Result<(), Self::Error> {
            self.reset_calls += 1;
            Ok(())
        }
    }

    #[test]
    fn model_lookup_returns_raw_text() {
        let mut values = HashMap::new();
        values.insert("x".to_string(), "42".to_string());
        values.insert("y".to_string(), "7/2".to_string());
        let model = Model { values };

        assert_eq!(model.get("x"), Some("42"));
        assert_eq!(model.get("y"), Some("7/2"));
        assert_eq!(model.get("missing"), None);
        assert_eq!(model.len(), 2);
        assert!(!model.is_empty());
    }

    #[test]
    fn mock_solver_counts_checks_and_resets() {
        let mut solver = MockSolver::new(SatResult::Unsat);
        assert_eq!(
            solver.check_sat().expect("check should succeed"),
            SatResult::Unsat
        );
        solver.reset().expect("reset should succeed");
        assert_eq!(solver.check_sat_calls, 1);
        assert_eq!(solver.reset_calls, 1);
    }
}
