//! Incremental decision procedure.
//!
//! Starting from a constraint diagram, the [`Decider`] walks a fixed order of
//! variables and fixes each one that the remaining formula still depends on.
//! Every decision is guided by the number of models left on either side,
//! and the chosen side becomes the new formula.

use std::fmt::{self, Display};
use std::str::FromStr;

use log::{debug, info, warn};
use num_bigint::BigUint;

use crate::bdd::Bdd;
use crate::error::{BddError, Result};
use crate::reference::Ref;
use crate::types::Var;

/// Built-in decision heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Policy {
    /// Take `true` whenever it has models.
    AlwaysInclude,
    /// Take `false` whenever it has models.
    AlwaysExclude,
    /// Take `true` if it strictly has more models, otherwise `false` if that has any.
    MaximizeIfTieInclude,
    /// Take `false` if it strictly has more models, otherwise `true` if that has any.
    MaximizeIfTieExclude,
}

impl Policy {
    pub const ALL: [Policy; 4] = [
        Policy::AlwaysInclude,
        Policy::AlwaysExclude,
        Policy::MaximizeIfTieInclude,
        Policy::MaximizeIfTieExclude,
    ];

    /// Picks a value for a variable given the model counts on both sides.
    ///
    /// Returns `None` only when neither side has a model.
    pub fn choose(self, c_true: &BigUint, c_false: &BigUint) -> Option<bool> {
        let has_true = *c_true > BigUint::ZERO;
        let has_false = *c_false > BigUint::ZERO;
        match self {
            Policy::AlwaysInclude if has_true => Some(true),
            Policy::AlwaysInclude if has_false => Some(false),
            Policy::AlwaysExclude if has_false => Some(false),
            Policy::AlwaysExclude if has_true => Some(true),
            Policy::MaximizeIfTieInclude if c_true > c_false => Some(true),
            Policy::MaximizeIfTieInclude if has_false => Some(false),
            Policy::MaximizeIfTieExclude if c_false > c_true => Some(false),
            Policy::MaximizeIfTieExclude if has_true => Some(true),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Policy::AlwaysInclude => "always-include",
            Policy::AlwaysExclude => "always-exclude",
            Policy::MaximizeIfTieInclude => "maximize-if-tie-include",
            Policy::MaximizeIfTieExclude => "maximize-if-tie-exclude",
        }
    }
}

impl Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Policy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Policy::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| {
                let names: Vec<_> = Policy::ALL.iter().map(|p| p.name()).collect();
                format!("unknown policy `{}`, expected one of: {}", s, names.join(", "))
            })
    }
}

/// What an external decision source is asked at one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepQuery {
    pub var: Var,
    pub name: String,
    pub c_true: BigUint,
    pub c_false: BigUint,
}

/// Externally driven decisions, e.g. a user at a terminal.
pub trait DecisionSource {
    fn decide(&mut self, query: &StepQuery) -> bool;
}

impl<F> DecisionSource for F
where
    F: FnMut(&StepQuery) -> bool,
{
    fn decide(&mut self, query: &StepQuery) -> bool {
        self(query)
    }
}

/// How the [`Decider`] picks values; selected once per run.
pub enum Strategy<'s> {
    Policy(Policy),
    Interactive(Box<dyn DecisionSource + 's>),
}

impl<'s> Strategy<'s> {
    pub fn interactive(source: impl DecisionSource + 's) -> Self {
        Strategy::Interactive(Box::new(source))
    }
}

impl From<Policy> for Strategy<'_> {
    fn from(policy: Policy) -> Self {
        Strategy::Policy(policy)
    }
}

impl fmt::Debug for Strategy<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Policy(policy) => write!(f, "Policy({})", policy),
            Strategy::Interactive(_) => write!(f, "Interactive"),
        }
    }
}

/// One entry of the decision log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub var: Var,
    pub value: bool,
    pub c_true: BigUint,
    pub c_false: BigUint,
}

impl Decision {
    /// Model count of the formula after this decision.
    pub fn count(&self) -> &BigUint {
        if self.value {
            &self.c_true
        } else {
            &self.c_false
        }
    }
}

impl Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} = {} (true: {}, false: {})",
            self.var, self.value, self.c_true, self.c_false
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The formula no longer depends on the variable.
    Skipped(Var),
    Decided(Decision),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionReport {
    pub initial_count: BigUint,
    pub final_count: BigUint,
    pub decisions: Vec<Decision>,
    pub skipped: Vec<Var>,
    /// Not retained once the [`Decider`] is dropped.
    pub final_diagram: Ref,
}

/// Walks a decision order over a diagram, one variable per step.
///
/// The current diagram is registered as a root of the store for as long as
/// the decider lives, so automatic collection never reclaims it.
///
/// ```
/// use bdd_decide::bdd::Bdd;
/// use bdd_decide::decide::{Decider, Policy};
///
/// let bdd = Bdd::default();
/// let x1 = bdd.declare_variable("x1").unwrap();
/// let x2 = bdd.declare_variable("x2").unwrap();
/// let f = bdd.apply_or(bdd.mk_var(x1).unwrap(), bdd.mk_var(x2).unwrap()).unwrap();
///
/// let mut decider = Decider::new(&bdd, f, vec![x1, x2], Policy::AlwaysInclude).unwrap();
/// let report = decider.run().unwrap();
/// assert_eq!(report.decisions.len(), 1);
/// assert_eq!(report.skipped, vec![x2]);
/// assert_eq!(report.final_count.to_string(), "2");
/// ```
pub struct Decider<'a, 's> {
    bdd: &'a Bdd,
    strategy: Strategy<'s>,
    order: Vec<Var>,
    num_vars: usize,
    index: usize,
    current: Ref,
    initial_count: BigUint,
    log: Vec<Decision>,
    skipped: Vec<Var>,
}

impl<'a, 's> Decider<'a, 's> {
    /// Prepares a run over `order` starting from `start`, counting models
    /// over all variables declared so far.
    pub fn new(
        bdd: &'a Bdd,
        start: Ref,
        order: Vec<Var>,
        strategy: impl Into<Strategy<'s>>,
    ) -> Result<Self> {
        Self::with_num_vars(bdd, start, order, strategy, bdd.num_vars())
    }

    /// Same as [`Decider::new`], counting models over the first `num_vars`
    /// variables.
    pub fn with_num_vars(
        bdd: &'a Bdd,
        start: Ref,
        order: Vec<Var>,
        strategy: impl Into<Strategy<'s>>,
        num_vars: usize,
    ) -> Result<Self> {
        for &var in &order {
            bdd.check_var(var)?;
        }
        let initial_count = bdd.model_count(start, num_vars)?;
        bdd.retain(start)?;

        let strategy = strategy.into();
        debug!(
            "Decider over {} variables with {:?}, initial count {}",
            order.len(),
            strategy,
            initial_count
        );

        Ok(Self {
            bdd,
            strategy,
            order,
            num_vars,
            index: 0,
            current: start,
            initial_count,
            log: Vec::new(),
            skipped: Vec::new(),
        })
    }

    pub fn current(&self) -> Ref {
        self.current
    }

    pub fn log(&self) -> &[Decision] {
        &self.log
    }

    pub fn skipped(&self) -> &[Var] {
        &self.skipped
    }

    /// Index of the next variable in the order.
    pub fn position(&self) -> usize {
        self.index
    }

    pub fn is_done(&self) -> bool {
        self.index >= self.order.len()
    }

    /// Model count of the current diagram.
    pub fn count(&self) -> Result<BigUint> {
        self.bdd.model_count(self.current, self.num_vars)
    }

    /// Handles the next variable of the order. Returns `None` once the order
    /// is exhausted.
    ///
    /// A failed step leaves the decider where it was.
    pub fn step(&mut self) -> Result<Option<StepOutcome>> {
        let Some(&var) = self.order.get(self.index) else {
            return Ok(None);
        };

        if !self.bdd.support(self.current)?.contains(&var) {
            debug!("Skipping {}: not in support", var);
            self.index += 1;
            self.skipped.push(var);
            return Ok(Some(StepOutcome::Skipped(var)));
        }

        let on_true = self.bdd.apply_and(self.current, self.bdd.mk_var(var)?)?;
        self.bdd.retain(on_true)?;
        let decided = self.decide(var, on_true);
        self.bdd.release(on_true)?;
        let decision = decided?;

        self.index += 1;
        self.log.push(decision.clone());
        Ok(Some(StepOutcome::Decided(decision)))
    }

    fn decide(&mut self, var: Var, on_true: Ref) -> Result<Decision> {
        let name = self.describe(var);
        let on_false = self.bdd.apply_and(self.current, self.bdd.mk_literal(var.neg())?)?;
        let c_true = self.bdd.model_count(on_true, self.num_vars)?;
        let c_false = self.bdd.model_count(on_false, self.num_vars)?;

        if c_true == BigUint::ZERO && c_false == BigUint::ZERO {
            return Err(BddError::InternalInvariantViolation(format!(
                "{} is in the support of the current diagram, but neither value has a model",
                name
            )));
        }

        let value = match &mut self.strategy {
            Strategy::Policy(policy) => policy.choose(&c_true, &c_false).ok_or_else(|| {
                BddError::InternalInvariantViolation(format!(
                    "{} found no value for {}",
                    policy, name
                ))
            })?,
            Strategy::Interactive(source) => {
                let query = StepQuery {
                    var,
                    name: name.clone(),
                    c_true: c_true.clone(),
                    c_false: c_false.clone(),
                };
                let value = source.decide(&query);
                let count = if value { &c_true } else { &c_false };
                if *count == BigUint::ZERO {
                    warn!("Choosing {} = {} leaves no models", query.name, value);
                }
                value
            }
        };

        let next = if value { on_true } else { on_false };
        self.bdd.retain(next)?;
        self.bdd.release(self.current)?;
        self.current = next;

        let decision = Decision {
            var,
            value,
            c_true,
            c_false,
        };
        info!("Decided {}: {}", name, decision);
        Ok(decision)
    }

    fn describe(&self, var: Var) -> String {
        self.bdd.var_name(var).unwrap_or_else(|| var.to_string())
    }

    /// Steps until the order is exhausted and reports the outcome.
    pub fn run(&mut self) -> Result<DecisionReport> {
        while self.step()?.is_some() {}

        let report = DecisionReport {
            initial_count: self.initial_count.clone(),
            final_count: self.count()?,
            decisions: self.log.clone(),
            skipped: self.skipped.clone(),
            final_diagram: self.current,
        };
        info!(
            "Made {} decisions, skipped {}, models {} -> {}",
            report.decisions.len(),
            report.skipped.len(),
            report.initial_count,
            report.final_count
        );
        Ok(report)
    }
}

impl Drop for Decider<'_, '_> {
    fn drop(&mut self) {
        let _ = self.bdd.release(self.current);
    }
}
