use std::collections::HashMap;

use thiserror::Error;
use z3::SatResult as Z3SatResult;

use crate::solver::{Model, SatResult, SmtSolver};
use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

#[derive(Debug, Error)]
pub enum Z3Error {
    #[error("Z3 error: {0}")]
    Internal(String),
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),
}

pub struct Z3Solver {
    solver: z3::Solver,
    int_vars: HashMap<String, z3::ast::Int>,
    real_vars: HashMap<String, z3::ast::Real>,
    bool_vars: HashMap<String, z3::ast::Bool>,
    _params: Option<z3::Params>,
}

impl Z3Solver {
    pub fn new() -> Self {
        let solver = z3::Solver::new();
        Self {
            solver,
            int_vars: HashMap::new(),
            real_vars: HashMap::new(),
            bool_vars: HashMap::new(),
            _params: None,
        }
    }

    pub fn with_timeout_secs(timeout_secs: u64) -> Self {
        if timeout_secs == 0 {
            return Self::new();
        }
        let solver = z3::Solver::new();
        let mut params = z3::Params::new();
        let timeout_ms = timeout_secs.saturating_mul(1000);
        params.set_u32("timeout", timeout_ms as u32);
        solver.set_params(&params);
        Self {
            solver,
            int_vars: HashMap::new(),
            real_vars: HashMap::new(),
            bool_vars: HashMap::new(),
            _params: Some(params),
        }
    }

    fn translate_term(&self, term: &SmtTerm) -> Result<Z3Term, Z3Error> {
        match term {
            SmtTerm::Var(name) => {
                if let Some(v) = self.int_vars.get(name) {
                    Ok(Z3Term::Int(v.clone()))
                } else if let Some(v) = self.real_vars.get(name) {
                    Ok(Z3Term::Real(v.clone()))
                } else if let Some(v) = self.bool_vars.get(name) {
                    Ok(Z3Term::Bool(v.clone()))
                } else {
                    Err(Z3Error::UnknownVariable(name.clone()))
                }
            }
            SmtTerm::IntLit(n) => Ok(Z3Term::Int(z3::ast::Int::from_i64(*n))),
            SmtTerm::RealLit(x) => Ok(Z3Term::Real(real_from_decimal(*x))),
            SmtTerm::BoolLit(b) => Ok(Z3Term::Bool(z3::ast::Bool::from_bool(*b))),
            SmtTerm::Add(lhs, rhs) => {
                self.translate_arith(lhs, rhs, |l, r| l + r, |l, r| l + r)
            }
            SmtTerm::Sub(lhs, rhs) => {
                self.translate_arith(lhs, rhs, |l, r| l - r, |l, r| l - r)
            }
            SmtTerm::Mul(lhs, rhs) => {
                self.translate_arith(lhs, rhs, |l, r| l * r, |l, r| l * r)
            }
            SmtTerm::ToReal(inner) => {
                let i = self.translate_term(inner)?.into_int()?;
                Ok(Z3Term::Real(i.to_real()))
            }
            SmtTerm::Eq(lhs, rhs) => {
                let l = self.translate_term(lhs)?;
                let r = self.translate_term(rhs)?;
                match promote(l, r)? {
                    Promoted::Int(li, ri) => Ok(Z3Term::Bool(li.eq(&ri))),
                    Promoted::Real(lr, rr) => Ok(Z3Term::Bool(lr.eq(&rr))),
                    Promoted::Bool(lb, rb) => Ok(Z3Term::Bool(lb.eq(&rb))),
                }
            }
            SmtTerm::Lt(lhs, rhs) => self.translate_cmp(lhs, rhs, |l, r| l.lt(r), |l, r| l.lt(r)),
            SmtTerm::Le(lhs, rhs) => self.translate_cmp(lhs, rhs, |l, r| l.le(r), |l, r| l.le(r)),
            SmtTerm::Gt(lhs, rhs) => self.translate_cmp(lhs, rhs, |l, r| l.gt(r), |l, r| l.gt(r)),
            SmtTerm::Ge(lhs, rhs) => self.translate_cmp(lhs, rhs, |l, r| l.ge(r), |l, r| l.ge(r)),
            SmtTerm::And(terms) => {
                let bools: Result<Vec<_>, _> = terms
                    .iter()
                    .map(|t| self.translate_term(t).and_then(|z| z.into_bool()))
                    .collect();
                let bools = bools?;
                let refs: Vec<&z3::ast::Bool> = bools.iter().collect();
                Ok(Z3Term::Bool(z3::ast::Bool::and(&refs)))
            }
            SmtTerm::Or(terms) => {
                let bools: Result<Vec<_>, _> = terms
                    .iter()
                    .map(|t| self.translate_term(t).and_then(|z| z.into_bool()))
                    .collect();
                let bools = bools?;
                let refs: Vec<&z3::ast::Bool> = bools.iter().collect();
                Ok(Z3Term::Bool(z3::ast::Bool::or(&refs)))
            }
            SmtTerm::Not(inner) => {
                let b = self.translate_term(inner)?.into_bool()?;
                Ok(Z3Term::Bool(b.not()))
            }
            SmtTerm::Implies(lhs, rhs) => {
                let l = self.translate_term(lhs)?.into_bool()?;
                let r = self.translate_term(rhs)?.into_bool()?;
                Ok(Z3Term::Bool(l.implies(&r)))
            }
            SmtTerm::Ite(cond, then, els) => {
                let c = self.translate_term(cond)?.into_bool()?;
                let t = self.translate_term(then)?;
                let e = self.translate_term(els)?;
                match promote(t, e)? {
                    Promoted::Int(ti, ei) => Ok(Z3Term::Int(c.ite(&ti, &ei))),
                    Promoted::Real(tr, er) => Ok(Z3Term::Real(c.ite(&tr, &er))),
                    Promoted::Bool(tb, eb) => Ok(Z3Term::Bool(c.ite(&tb, &eb))),
                }
            }
        }
    }

    fn translate_arith(
        &self,
        lhs: &SmtTerm,
        rhs: &SmtTerm,
        int_op: fn(&z3::ast::Int, &z3::ast::Int) -> z3::ast::Int,
        real_op: fn(&z3::ast::Real, &z3::ast::Real) -> z3::ast::Real,
    ) -> Result<Z3Term, Z3Error> {
        let l = self.translate_term(lhs)?;
        let r = self.translate_term(rhs)?;
        match promote(l, r)? {
            Promoted::Int(li, ri) => Ok(Z3Term::Int(int_op(&li, &ri))),
            Promoted::Real(lr, rr) => Ok(Z3Term::Real(real_op(&lr, &rr))),
            Promoted::Bool(_, _) => {
                Err(Z3Error::Internal("Arithmetic over Bool operands".into()))
            }
        }
    }

    fn translate_cmp(
        &self,
        lhs: &SmtTerm,
        rhs: &SmtTerm,
        int_op: fn(&z3::ast::Int, &z3::ast::Int) -> z3::ast::Bool,
        real_op: fn(&z3::ast::Real, &z3::ast::Real) -> z3::ast::Bool,
    ) -> Result<Z3Term, Z3Error> {
        let l = self.translate_term(lhs)?;
        let r = self.translate_term(rhs)?;
        match promote(l, r)? {
            Promoted::Int(li, ri) => Ok(Z3Term::Bool(int_op(&li, &ri))),
            Promoted::Real(lr, rr) => Ok(Z3Term::Bool(real_op(&lr, &rr))),
            Promoted::Bool(_, _) => {
                Err(Z3Error::Internal("Ordering comparison over Bool operands".into()))
            }
        }
    }

    fn harvest(&self, z3_model: &z3::Model, var_names: &[(&str, &SmtSort)]) -> Model {
        let mut values = HashMap::new();
        for &(name, sort) in var_names {
            match sort {
                SmtSort::Int => {
                    if let Some(v) = self.int_vars.get(name) {
                        if let Some(val) = z3_model.eval::<z3::ast::Int>(v, true) {
                            if let Some(n) = val.as_i64() {
                                values.insert(name.to_string(), n.to_string());
                            }
                        }
                    }
                }
                SmtSort::Real => {
                    if let Some(v) = self.real_vars.get(name) {
                        if let Some(val) = z3_model.eval::<z3::ast::Real>(v, true) {
                            if let Some((num, den)) = val.as_real() {
                                let text = if den == 1 {
                                    num.to_string()
                                } else {
                                    format!("{num}/{den}")
                                };
                                values.insert(name.to_string(), text);
                            }
                        }
                    }
                }
                SmtSort::Bool => {
                    if let Some(v) = self.bool_vars.get(name) {
                        if let Some(val) = z3_model.eval::<z3::ast::Bool>(v, true) {
                            if let Some(b) = val.as_bool() {
                                values.insert(name.to_string(), b.to_string());
                            }
                        }
                    }
                }
            }
        }
        Model { values }
    }
}

/// Exact rational for a decimal literal: scale by powers of ten until the
/// fractional part vanishes (bounded; timing inputs are short decimals).
fn real_from_decimal(x: f64) -> z3::ast::Real {
    let mut den: i64 = 1;
    let mut scaled = x;
    while scaled.fract().abs() > 1e-9 && den < 1_000_000_000 {
        scaled *= 10.0;
        den *= 10;
    }
    let num = z3::ast::Int::from_i64(scaled.round() as i64).to_real();
    if den == 1 {
        num
    } else {
        &num / &z3::ast::Int::from_i64(den).to_real()
    }
}

#[derive(Debug)]
enum Z3Term {
    Int(z3::ast::Int),
    Real(z3::ast::Real),
    Bool(z3::ast::Bool),
}

enum Promoted {
    Int(z3::ast::Int, z3::ast::Int),
    Real(z3::ast::Real, z3::ast::Real),
    Bool(z3::ast::Bool, z3::ast::Bool),
}

/// Promote mixed Int/Real operands to Real; reject Bool/arith mixes.
fn promote(lhs: Z3Term, rhs: Z3Term) -> Result<Promoted, Z3Error> {
    match (lhs, rhs) {
        (Z3Term::Int(l), Z3Term::Int(r)) => Ok(Promoted::Int(l, r)),
        (Z3Term::Real(l), Z3Term::Real(r)) => Ok(Promoted::Real(l, r)),
        (Z3Term::Int(l), Z3Term::Real(r)) => Ok(Promoted::Real(l.to_real(), r)),
        (Z3Term::Real(l), Z3Term::Int(r)) => Ok(Promoted::Real(l, r.to_real())),
        (Z3Term::Bool(l), Z3Term::Bool(r)) => Ok(Promoted::Bool(l, r)),
        _ => Err(Z3Error::Internal("Sort mismatch between operands".into())),
    }
}

impl Z3Term {
    fn into_int(self) -> Result<z3::ast::Int, Z3Error> {
        match self {
            Z3Term::Int(i) => Ok(i),
            _ => Err(Z3Error::Internal("Expected Int operand".into())),
        }
    }

    fn into_bool(self) -> Result<z3::ast::Bool, Z3Error> {
        match self {
            Z3Term::Bool(b) => Ok(b),
            _ => Err(Z3Error::Internal("Expected Bool operand".into())),
        }
    }
}

impl Default for Z3Solver {
    fn default() -> Self {
        Self::new()
    }
}

impl SmtSolver for Z3Solver {
    type Error = Z3Error;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), Z3Error> {
        match sort {
            SmtSort::Int => {
                let v = z3::ast::Int::new_const(name);
                self.int_vars.insert(name.to_string(), v);
            }
            SmtSort::Real => {
                let v = z3::ast::Real::new_const(name);
                self.real_vars.insert(name.to_string(), v);
            }
            SmtSort::Bool => {
                let v = z3::ast::Bool::new_const(name);
                self.bool_vars.insert(name.to_string(), v);
            }
        }
        Ok(())
    }

    fn assert(&mut self, term: &SmtTerm) -> Result<(), Z3Error> {
        let z3_term = self.translate_term(term)?.into_bool()?;
        self.solver.assert(&z3_term);
        Ok(())
    }

    fn check_sat(&mut self) -> Result<SatResult, Z3Error> {
        match self.solver.check() {
            Z3SatResult::Sat => Ok(SatResult::Sat),
            Z3SatResult::Unsat => Ok(SatResult::Unsat),
            Z3SatResult::Unknown => Ok(SatResult::Unknown("Z3 returned unknown".into())),
        }
    }

    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), Z3Error> {
        match self.solver.check() {
            Z3SatResult::Sat => {
                let z3_model = self
                    .solver
                    .get_model()
                    .ok_or_else(|| Z3Error::Internal("SAT but no model available".into()))?;
                Ok((SatResult::Sat, Some(self.harvest(&z3_model, var_names))))
            }
            Z3SatResult::Unsat => Ok((SatResult::Unsat, None)),
            Z3SatResult::Unknown => Ok((SatResult::Unknown("Z3 returned unknown".into()), None)),
        }
    }

    fn reset(&mut self) -> Result<(), Z3Error> {
        self.solver.reset();
        // Z3 may drop per-solver parameters on reset; reapply if configured.
        if let Some(params) = &self._params {
            self.solver.set_params(params);
        }
        self.int_vars.clear();
        self.real_vars.clear();
        self.bool_vars.clear();
        Ok(())
    }

    fn describe(&self) -> String {
        format!("Z3 {}", z3::full_version())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn z3_basic_sat() -> TestResult {
        let mut solver = Z3Solver::new();

        solver.declare_var("x", &SmtSort::Real)?;
        solver.declare_var("y", &SmtSort::Real)?;

        // x > 0 && y > 0 && x + y == 10
        let term = SmtTerm::and(vec![
            SmtTerm::var("x").gt(SmtTerm::real(0.0)),
            SmtTerm::var("y").gt(SmtTerm::real(0.0)),
            SmtTerm::var("x")
                .add(SmtTerm::var("y"))
                .eq(SmtTerm::real(10.0)),
        ]);
        solver.assert(&term)?;
        assert_eq!(solver.check_sat()?, SatResult::Sat);
        Ok(())
    }

    #[test]
    fn z3_basic_unsat() -> TestResult {
        let mut solver = Z3Solver::new();

        solver.declare_var("x", &SmtSort::Real)?;

        let term = SmtTerm::and(vec![
            SmtTerm::var("x").gt(SmtTerm::real(0.0)),
            SmtTerm::var("x").lt(SmtTerm::real(0.0)),
        ]);
        solver.assert(&term)?;
        assert_eq!(solver.check_sat()?, SatResult::Unsat);
        Ok(())
    }

    #[test]
    fn z3_int_model_value_is_decimal_text() -> TestResult {
        let mut solver = Z3Solver::new();
        solver.declare_var("p", &SmtSort::Int)?;
        solver.assert(&SmtTerm::var("p").eq(SmtTerm::int(3)))?;

        let vars = vec![("p", &SmtSort::Int)];
        let (result, model) = solver.check_sat_with_model(&vars)?;
        assert_eq!(result, SatResult::Sat);
        let model = model.ok_or("expected model for SAT result")?;
        assert_eq!(model.get("p"), Some("3"));
        Ok(())
    }

    #[test]
    fn z3_rational_model_value_uses_fraction_text() -> TestResult {
        let mut solver = Z3Solver::new();
        solver.declare_var("x", &SmtSort::Real)?;
        // 2x == 7 forces x = 7/2.
        solver.assert(
            &SmtTerm::real(2.0)
                .mul(SmtTerm::var("x"))
                .eq(SmtTerm::real(7.0)),
        )?;

        let vars = vec![("x", &SmtSort::Real)];
        let (result, model) = solver.check_sat_with_model(&vars)?;
        assert_eq!(result, SatResult::Sat);
        let model = model.ok_or("expected model for SAT result")?;
        assert_eq!(model.get("x"), Some("7/2"));
        Ok(())
    }

    #[test]
    fn z3_mixed_int_real_arithmetic_promotes() -> TestResult {
        let mut solver = Z3Solver::new();
        solver.declare_var("n", &SmtSort::Int)?;
        solver.declare_var("dur", &SmtSort::Real)?;

        // n >= 1, dur == 2.5, to_real(n) * dur == 5.0  =>  n == 2
        solver.assert(&SmtTerm::var("n").ge(SmtTerm::int(1)))?;
        solver.assert(&SmtTerm::var("dur").eq(SmtTerm::real(2.5)))?;
        solver.assert(
            &SmtTerm::var("n")
                .to_real()
                .mul(SmtTerm::var("dur"))
                .eq(SmtTerm::real(5.0)),
        )?;

        let vars = vec![("n", &SmtSort::Int)];
        let (result, model) = solver.check_sat_with_model(&vars)?;
        assert_eq!(result, SatResult::Sat);
        assert_eq!(model.ok_or("expected model")?.get("n"), Some("2"));
        Ok(())
    }

    #[test]
    fn z3_ite_over_priorities_selects_branch() -> TestResult {
        let mut solver = Z3Solver::new();
        solver.declare_var("prio", &SmtSort::Int)?;
        solver.declare_var("start", &SmtSort::Real)?;

        // start == ite(prio == 0, 1.0, 4.0), prio == 1 => start == 4.0
        let lookup = SmtTerm::ite(
            SmtTerm::var("prio").eq(SmtTerm::int(0)),
            SmtTerm::real(1.0),
            SmtTerm::real(4.0),
        );
        solver.assert(&SmtTerm::var("start").eq(lookup))?;
        solver.assert(&SmtTerm::var("prio").eq(SmtTerm::int(1)))?;

        let vars = vec![("start", &SmtSort::Real)];
        let (result, model) = solver.check_sat_with_model(&vars)?;
        assert_eq!(result, SatResult::Sat);
        assert_eq!(model.ok_or("expected model")?.get("start"), Some("4"));
        Ok(())
    }

    #[test]
    fn z3_reset_clears_declarations() -> TestResult {
        let mut solver = Z3Solver::with_timeout_secs(2);
        solver.declare_var("x", &SmtSort::Real)?;
        solver.assert(&SmtTerm::var("x").eq(SmtTerm::real(1.0)))?;
        assert_eq!(solver.check_sat()?, SatResult::Sat);

        solver.reset()?;
        assert!(
            solver.assert(&SmtTerm::var("x").gt(SmtTerm::real(0.0))).is_err(),
            "variables should be gone after reset"
        );
        Ok(())
    }

    #[test]
    fn z3_describe_reports_backend_and_version() {
        let solver = Z3Solver::new();
        let description = solver.describe();
        assert!(description.starts_with("Z3 "), "got {description:?}");
        assert!(description.len() > "Z3 ".len());
    }

    #[test]
    fn z3_unknown_variable_is_reported() {
        let solver = Z3Solver::new();
        let err = solver
            .translate_term(&SmtTerm::var("ghost"))
            .expect_err("undeclared variable should fail translation");
        assert!(matches!(err, Z3Error::UnknownVariable(name) if name == "ghost"));
    }
}
