use tracing::{debug, warn};
use weft_smt::solver::SmtSolver;

/// Owns a solver for the duration of one synthesis run.
///
/// Every exit path must release the solver through [`SolverSession::close`];
/// dropping an open session is a leak and is reported, then cleaned up on a
/// best-effort basis.
pub struct SolverSession<S: SmtSolver> {
    solver: S,
    closed: bool,
}

impl<S: SmtSolver> SolverSession<S> {
    pub fn open(solver: S) -> Self {
        debug!(backend = %solver.describe(), "solver session opened");
        Self {
            solver,
            closed: false,
        }
    }

    pub fn solver_mut(&mut self) -> &mut S {
        &mut self.solver
    }

    /// Release solver state. Failures are reported, never propagated; a
    /// teardown error must not mask the synthesis outcome.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        if let Err(err) = self.solver.reset() {
            warn!(error = %err, "failed to reset solver on session close");
        }
        self.closed = true;
        debug!("solver session closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<S: SmtSolver> Drop for SolverSession<S> {
    fn drop(&mut self) {
        if !self.closed {
            warn!("solver session dropped while still open");
            self.close();
        }
    }
}
