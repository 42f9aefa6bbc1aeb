use crate::solver::{Model, SatResult, SmtSolver};
use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

/// Print an SmtTerm as SMT-LIB2 format.
pub fn to_smtlib(term: &SmtTerm) -> String {
    match term {
        SmtTerm::Var(name) => name.clone(),
        SmtTerm::IntLit(n) => {
            if *n < 0 {
                format!("(- {})", -n)
            } else {
                n.to_string()
            }
        }
        SmtTerm::RealLit(x) => {
            if *x < 0.0 {
                format!("(- {:?})", -x)
            } else {
                format!("{x:?}")
            }
        }
        SmtTerm::BoolLit(b) => {
            if *b {
                "true".to_string()
            } else {
                "false".to_string()
            }
        }
        SmtTerm::Add(lhs, rhs) => format!("(+ {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Sub(lhs, rhs) => format!("(- {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Mul(lhs, rhs) => format!("(* {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::ToReal(inner) => format!("(to_real {})", to_smtlib(inner)),
        SmtTerm::Eq(lhs, rhs) => format!("(= {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Lt(lhs, rhs) => format!("(< {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Le(lhs, rhs) => format!("(<= {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Gt(lhs, rhs) => format!("(> {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Ge(lhs, rhs) => format!("(>= {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::And(terms) => {
            if terms.is_empty() {
                "true".to_string()
            } else if terms.len() == 1 {
                to_smtlib(&terms[0])
            } else {
                let inner: Vec<String> = terms.iter().map(to_smtlib).collect();
                format!("(and {})", inner.join(" "))
            }
        }
        SmtTerm::Or(terms) => {
            if terms.is_empty() {
                "false".to_string()
            } else if terms.len() == 1 {
                to_smtlib(&terms[0])
            } else {
                let inner: Vec<String> = terms.iter().map(to_smtlib).collect();
                format!("(or {})", inner.join(" "))
            }
        }
        SmtTerm::Not(inner) => format!("(not {})", to_smtlib(inner)),
        SmtTerm::Implies(lhs, rhs) => {
            format!("(=> {} {})", to_smtlib(lhs), to_smtlib(rhs))
        }
        SmtTerm::Ite(cond, then, els) => {
            format!(
                "(ite {} {} {})",
                to_smtlib(cond),
                to_smtlib(then),
                to_smtlib(els)
            )
        }
    }
}

/// Print a sort as SMT-LIB2 format.
pub fn sort_to_smtlib(sort: &SmtSort) -> &'static str {
    match sort {
        SmtSort::Bool => "Bool",
        SmtSort::Int => "Int",
        SmtSort::Real => "Real",
    }
}

/// Render declarations and assertions as a standalone SMT-LIB2 script.
pub fn to_script(declarations: &[(String, SmtSort)], assertions: &[SmtTerm]) -> String {
    let mut out = String::new();
    for (name, sort) in declarations {
        out.push_str(&format!(
            "(declare-const {name} {})\n",
            sort_to_smtlib(sort)
        ));
    }
    for term in assertions {
        out.push_str(&format!("(assert {})\n", to_smtlib(term)));
    }
    out.push_str("(check-sat)\n");
    out
}

/// Forwards every call to an inner solver while mirroring declarations and
/// assertions, so the constraint system can be rendered as an SMT-LIB
/// script after the fact.
pub struct ScriptRecorder<S> {
    inner: S,
    enabled: bool,
    declarations: Vec<(String, SmtSort)>,
    assertions: Vec<SmtTerm>,
}

impl<S> ScriptRecorder<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            enabled: true,
            declarations: Vec::new(),
            assertions: Vec::new(),
        }
    }

    /// A pure pass-through: nothing is recorded, [`ScriptRecorder::script`]
    /// renders an empty system.
    pub fn disabled(inner: S) -> Self {
        Self {
            inner,
            enabled: false,
            declarations: Vec::new(),
            assertions: Vec::new(),
        }
    }

    pub fn script(&self) -> String {
        to_script(&self.declarations, &self.assertions)
    }
}

impl<S: SmtSolver> SmtSolver for ScriptRecorder<S> {
    type Error = S::Error;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), Self::Error> {
        if self.enabled {
            self.declarations.push((name.to_string(), sort.clone()));
        }
        self.inner.declare_var(name, sort)
    }

    fn assert(&mut self, term: &SmtTerm) -> Result<(), Self::Error> {
        if self.enabled {
            self.assertions.push(term.clone());
        }
        self.inner.assert(term)
    }

    fn check_sat(&mut self) -> Result<SatResult, Self::Error> {
        self.inner.check_sat()
    }

    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), Self::Error> {
        self.inner.check_sat_with_model(var_names)
    }

    fn reset(&mut self) -> Result<(), Self::Error> {
        self.declarations.clear();
        self.assertions.clear();
        self.inner.reset()
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }
}
