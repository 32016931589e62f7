use z3::ast::BV;

use crate::{
    solver::{
        cache::{SatCache, SolverCounters},
        translate::Translator,
        SolverConfig, SolverError, SolverStats,
    },
    state::ConstraintSet,
    symbolic::SymExpr,
};

/// Satisfiability checks and model extraction over constraint sets.
///
/// Each query builds a fresh Z3 solver on the calling thread, so one `Solver` can be
/// shared by reference across rayon workers. Definite satisfiability answers are
/// cached by the constraint set's digest; the same set is re-checked often because
/// forked siblings share their parent's constraints.
///
/// # Examples
///
/// ```rust,ignore
/// use symscope::prelude::*;
///
/// let solver = Solver::new(SolverConfig::default());
/// let input = SymExpr::variable("input", 8)?;
/// let mut constraints = ConstraintSet::new();
/// constraints.push(input.equals(&SymExpr::byte(0x41))?)?;
///
/// assert!(solver.is_satisfiable(&constraints)?);
/// assert_eq!(solver.evaluate(&input, &constraints)?, 0x41);
/// ```
pub struct Solver {
    config: SolverConfig,
    cache: SatCache,
    counters: SolverCounters,
}

impl Solver {
    /// Creates a solver with the given configuration.
    #[must_use]
    pub fn new(config: SolverConfig) -> Self {
        let capacity = if config.cache_results {
            config.max_cache_entries
        } else {
            0
        };
        Solver {
            config,
            cache: SatCache::new(capacity),
            counters: SolverCounters::default(),
        }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Decides whether `constraints` has a satisfying assignment.
    ///
    /// The answer for a given set is stable across calls.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::Timeout`] or [`SolverError::Unknown`] when the backend
    /// cannot decide the set. Such sets are neither confirmed nor discarded.
    pub fn is_satisfiable(&self, constraints: &ConstraintSet) -> Result<bool, SolverError> {
        SolverCounters::bump(&self.counters.queries);
        self.satisfiable(constraints)
    }

    /// Produces one concrete value of `expr` consistent with `constraints`.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::Unsatisfiable`] if no assignment exists, or the backend
    /// failure if the query could not be decided.
    pub fn evaluate(&self, expr: &SymExpr, constraints: &ConstraintSet) -> Result<u64, SolverError> {
        self.evaluate_many(expr, constraints, 1)?
            .first()
            .copied()
            .ok_or(SolverError::Unsatisfiable)
    }

    /// Enumerates up to `max_count` distinct values of `expr` under `constraints`.
    ///
    /// Values come back in the order the backend finds them. Each one is excluded
    /// before the next check, so the list never repeats. Fewer than `max_count`
    /// values means the feasible set is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::Unsatisfiable`] if `constraints` admits no value at all,
    /// or the backend failure if any check in the sequence could not be decided.
    pub fn evaluate_many(
        &self,
        expr: &SymExpr,
        constraints: &ConstraintSet,
        max_count: usize,
    ) -> Result<Vec<u64>, SolverError> {
        SolverCounters::bump(&self.counters.queries);

        if max_count == 0 {
            return Ok(Vec::new());
        }
        if let Some(value) = expr.as_const() {
            return if self.satisfiable(constraints)? {
                Ok(vec![value])
            } else {
                Err(SolverError::Unsatisfiable)
            };
        }
        if constraints.is_trivially_false() {
            SolverCounters::bump(&self.counters.fast_path);
            return Err(SolverError::Unsatisfiable);
        }

        let session = self.session();
        let mut translator = Translator::new();
        for constraint in constraints.iter() {
            session.assert(translator.assertion(constraint)?);
        }
        let target = translator.translate(expr)?;

        let mut values = Vec::new();
        while values.len() < max_count {
            if !self.check(&session)? {
                break;
            }
            let value = model_value(&session, &target)?;
            values.push(value);
            session.assert(target.eq(&BV::from_u64(value, expr.width())).not());
        }

        if values.is_empty() {
            self.remember(constraints, false);
            return Err(SolverError::Unsatisfiable);
        }
        self.remember(constraints, true);
        log::trace!("enumerated {} value(s) of {expr}", values.len());
        Ok(values)
    }

    /// Produces concrete values for several expressions from one joint model.
    ///
    /// Unlike calling [`Solver::evaluate`] per expression, the results are mutually
    /// consistent.
    ///
    /// # Errors
    ///
    /// Same as [`Solver::evaluate`].
    pub fn evaluate_all(
        &self,
        exprs: &[SymExpr],
        constraints: &ConstraintSet,
    ) -> Result<Vec<u64>, SolverError> {
        SolverCounters::bump(&self.counters.queries);

        if exprs.iter().all(SymExpr::is_const) {
            if !self.satisfiable(constraints)? {
                return Err(SolverError::Unsatisfiable);
            }
            return Ok(exprs.iter().filter_map(SymExpr::as_const).collect());
        }
        if constraints.is_trivially_false() {
            SolverCounters::bump(&self.counters.fast_path);
            return Err(SolverError::Unsatisfiable);
        }

        let session = self.session();
        let mut translator = Translator::new();
        for constraint in constraints.iter() {
            session.assert(translator.assertion(constraint)?);
        }
        let targets = exprs
            .iter()
            .map(|e| translator.translate(e))
            .collect::<Result<Vec<_>, _>>()?;

        if !self.check(&session)? {
            self.remember(constraints, false);
            return Err(SolverError::Unsatisfiable);
        }
        self.remember(constraints, true);
        targets
            .iter()
            .map(|target| model_value(&session, target))
            .collect()
    }

    /// Concretizes byte-wide expressions, e.g. the bytes of a symbolic input stream.
    ///
    /// Wider expressions are truncated to their low byte.
    ///
    /// # Errors
    ///
    /// Same as [`Solver::evaluate_all`].
    pub fn evaluate_bytes(
        &self,
        bytes: &[SymExpr],
        constraints: &ConstraintSet,
    ) -> Result<Vec<u8>, SolverError> {
        Ok(self
            .evaluate_all(bytes, constraints)?
            .into_iter()
            .map(|v| (v & 0xFF) as u8)
            .collect())
    }

    /// Snapshot of the query counters.
    #[must_use]
    pub fn stats(&self) -> SolverStats {
        self.counters.snapshot(self.cache.len())
    }

    /// Drops every cached result.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    fn satisfiable(&self, constraints: &ConstraintSet) -> Result<bool, SolverError> {
        if constraints.is_trivially_false() {
            SolverCounters::bump(&self.counters.fast_path);
            return Ok(false);
        }
        if constraints.is_concrete() {
            SolverCounters::bump(&self.counters.fast_path);
            return Ok(true);
        }
        if let Some(known) = self.cache.get(&constraints.digest()) {
            SolverCounters::bump(&self.counters.cache_hits);
            return Ok(known);
        }

        let session = self.session();
        let mut translator = Translator::new();
        for constraint in constraints.iter() {
            session.assert(translator.assertion(constraint)?);
        }
        let sat = self.check(&session)?;
        self.remember(constraints, sat);
        Ok(sat)
    }

    fn remember(&self, constraints: &ConstraintSet, satisfiable: bool) {
        if self.config.cache_results && !constraints.is_concrete() {
            self.cache.insert(constraints.digest(), satisfiable);
        }
    }

    fn session(&self) -> z3::Solver {
        let session = z3::Solver::new();
        if self.config.timeout_ms > 0 {
            let mut params = z3::Params::new();
            params.set_u32("timeout", self.config.timeout_ms);
            session.set_params(&params);
        }
        session
    }

    fn check(&self, session: &z3::Solver) -> Result<bool, SolverError> {
        SolverCounters::bump(&self.counters.solver_calls);
        match session.check() {
            z3::SatResult::Sat => Ok(true),
            z3::SatResult::Unsat => Ok(false),
            z3::SatResult::Unknown => {
                let reason = session
                    .get_reason_unknown()
                    .unwrap_or_else(|| "unknown".to_string());
                if reason.contains("timeout") || reason.contains("canceled") {
                    SolverCounters::bump(&self.counters.timeouts);
                    log::debug!("solver timed out after {} ms", self.config.timeout_ms);
                    Err(SolverError::Timeout {
                        timeout_ms: self.config.timeout_ms,
                    })
                } else {
                    SolverCounters::bump(&self.counters.unknowns);
                    log::warn!("solver returned unknown: {reason}");
                    Err(SolverError::Unknown(reason))
                }
            }
        }
    }
}

impl std::fmt::Debug for Solver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Solver")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

fn model_value(session: &z3::Solver, target: &BV) -> Result<u64, SolverError> {
    session
        .get_model()
        .and_then(|model| model.eval(target, true))
        .and_then(|value| value.as_u64())
        .ok_or_else(|| SolverError::Unknown("model has no value for expression".to_string()))
}
