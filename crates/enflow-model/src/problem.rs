//! Linear/mixed-integer problem records.
//!
//! The model assembler accumulates immutable variable and constraint
//! records here instead of mutating a live solver model; the finished
//! description is lowered to the backend in one pass (see [`crate::solver`]).
//! This keeps partially-built state invisible and makes the integer
//! relaxation a plain in-place domain rewrite.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// Dense index of a decision variable inside one [`Problem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VarId(pub usize);

impl VarId {
    pub fn new(value: usize) -> Self {
        VarId(value)
    }

    pub fn value(&self) -> usize {
        self.0
    }
}

/// Variable domain; `relax` rewrites the integer domains to `Continuous`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Domain {
    Continuous,
    Integer,
    Binary,
}

/// An immutable variable record: name, bounds and domain.
#[derive(Debug, Clone)]
pub struct VarDef {
    pub name: String,
    pub lower: f64,
    pub upper: f64,
    pub domain: Domain,
}

/// A linear expression `sum(coefficient * variable) + constant`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinExpr {
    pub terms: Vec<(VarId, f64)>,
    pub constant: f64,
}

impl LinExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn term(coefficient: f64, var: VarId) -> Self {
        Self {
            terms: vec![(var, coefficient)],
            constant: 0.0,
        }
    }

    pub fn add_term(&mut self, coefficient: f64, var: VarId) {
        self.terms.push((var, coefficient));
    }

    /// Total coefficient of `var`, summed over duplicate terms.
    pub fn coefficient(&self, var: VarId) -> f64 {
        self.terms
            .iter()
            .filter(|(v, _)| *v == var)
            .map(|(_, c)| c)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.constant == 0.0
    }

    /// Evaluate against a dense value vector indexed by [`VarId`].
    pub fn eval(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(var, coefficient)| coefficient * values[var.value()])
            .sum::<f64>()
            + self.constant
    }
}

impl From<VarId> for LinExpr {
    fn from(var: VarId) -> Self {
        LinExpr::term(1.0, var)
    }
}

impl Add for LinExpr {
    type Output = LinExpr;
    fn add(mut self, rhs: LinExpr) -> LinExpr {
        self.terms.extend(rhs.terms);
        self.constant += rhs.constant;
        self
    }
}

impl AddAssign for LinExpr {
    fn add_assign(&mut self, rhs: LinExpr) {
        self.terms.extend(rhs.terms);
        self.constant += rhs.constant;
    }
}

impl Sub for LinExpr {
    type Output = LinExpr;
    fn sub(mut self, rhs: LinExpr) -> LinExpr {
        self.terms
            .extend(rhs.terms.into_iter().map(|(v, c)| (v, -c)));
        self.constant -= rhs.constant;
        self
    }
}

impl SubAssign for LinExpr {
    fn sub_assign(&mut self, rhs: LinExpr) {
        self.terms
            .extend(rhs.terms.into_iter().map(|(v, c)| (v, -c)));
        self.constant -= rhs.constant;
    }
}

impl Add<VarId> for LinExpr {
    type Output = LinExpr;
    fn add(mut self, rhs: VarId) -> LinExpr {
        self.terms.push((rhs, 1.0));
        self
    }
}

impl Sub<VarId> for LinExpr {
    type Output = LinExpr;
    fn sub(mut self, rhs: VarId) -> LinExpr {
        self.terms.push((rhs, -1.0));
        self
    }
}

impl Add<f64> for LinExpr {
    type Output = LinExpr;
    fn add(mut self, rhs: f64) -> LinExpr {
        self.constant += rhs;
        self
    }
}

impl Sub<f64> for LinExpr {
    type Output = LinExpr;
    fn sub(mut self, rhs: f64) -> LinExpr {
        self.constant -= rhs;
        self
    }
}

impl Mul<f64> for LinExpr {
    type Output = LinExpr;
    fn mul(mut self, rhs: f64) -> LinExpr {
        for (_, coefficient) in &mut self.terms {
            *coefficient *= rhs;
        }
        self.constant *= rhs;
        self
    }
}

impl Mul<LinExpr> for f64 {
    type Output = LinExpr;
    fn mul(self, rhs: LinExpr) -> LinExpr {
        rhs * self
    }
}

impl Mul<VarId> for f64 {
    type Output = LinExpr;
    fn mul(self, rhs: VarId) -> LinExpr {
        LinExpr::term(self, rhs)
    }
}

impl Neg for LinExpr {
    type Output = LinExpr;
    fn neg(self) -> LinExpr {
        self * -1.0
    }
}

/// How a constraint expression relates to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relation {
    Eq,
    Le,
    Ge,
}

/// An immutable constraint record: `expr relation 0`.
#[derive(Debug, Clone)]
pub struct ConstraintDef {
    pub name: String,
    pub expr: LinExpr,
    pub relation: Relation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ObjectiveSense {
    #[default]
    Minimize,
    Maximize,
}

/// A fully described linear (or mixed-integer linear) problem.
#[derive(Debug, Default)]
pub struct Problem {
    vars: Vec<VarDef>,
    constraints: Vec<ConstraintDef>,
    objective: LinExpr,
    sense: ObjectiveSense,
}

impl Problem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a continuous variable with the given bounds.
    pub fn add_var(&mut self, name: impl Into<String>, lower: f64, upper: f64) -> VarId {
        self.push_var(name.into(), lower, upper, Domain::Continuous)
    }

    /// Add a binary on/off variable.
    pub fn add_binary(&mut self, name: impl Into<String>) -> VarId {
        self.push_var(name.into(), 0.0, 1.0, Domain::Binary)
    }

    /// Add an integer variable with the given bounds.
    pub fn add_integer(&mut self, name: impl Into<String>, lower: f64, upper: f64) -> VarId {
        self.push_var(name.into(), lower, upper, Domain::Integer)
    }

    fn push_var(&mut self, name: String, lower: f64, upper: f64, domain: Domain) -> VarId {
        let id = VarId(self.vars.len());
        self.vars.push(VarDef {
            name,
            lower,
            upper,
            domain,
        });
        id
    }

    /// Fix a variable by collapsing its bounds to a point.
    pub fn fix(&mut self, var: VarId, value: f64) {
        let def = &mut self.vars[var.value()];
        def.lower = value;
        def.upper = value;
    }

    pub fn var(&self, var: VarId) -> &VarDef {
        &self.vars[var.value()]
    }

    pub fn vars(&self) -> &[VarDef] {
        &self.vars
    }

    pub fn add_constraint(&mut self, name: impl Into<String>, expr: LinExpr, relation: Relation) {
        self.constraints.push(ConstraintDef {
            name: name.into(),
            expr,
            relation,
        });
    }

    pub fn constraints(&self) -> &[ConstraintDef] {
        &self.constraints
    }

    pub fn constraint(&self, name: &str) -> Option<&ConstraintDef> {
        self.constraints.iter().find(|c| c.name == name)
    }

    pub fn constraints_with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = &'a ConstraintDef> {
        self.constraints.iter().filter(move |c| c.name.starts_with(prefix))
    }

    /// Replace the objective; the previous objective component is discarded.
    pub fn set_objective(&mut self, expr: LinExpr, sense: ObjectiveSense) {
        self.objective = expr;
        self.sense = sense;
    }

    pub fn objective(&self) -> &LinExpr {
        &self.objective
    }

    pub fn sense(&self) -> ObjectiveSense {
        self.sense
    }

    pub fn has_integer_vars(&self) -> bool {
        self.vars
            .iter()
            .any(|def| matches!(def.domain, Domain::Integer | Domain::Binary))
    }

    /// Relax every integer/binary domain to a continuous one, in place.
    ///
    /// Bounds are kept, so a binary variable becomes continuous on [0, 1].
    /// Intended for producing a cheaper relaxed bound, not a certified
    /// equivalent problem.
    pub fn relax(&mut self) {
        for def in &mut self.vars {
            def.domain = Domain::Continuous;
        }
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn stats(&self) -> ProblemStats {
        let num_integer = self
            .vars
            .iter()
            .filter(|def| matches!(def.domain, Domain::Integer | Domain::Binary))
            .count();
        ProblemStats {
            num_vars: self.vars.len(),
            num_integer_vars: num_integer,
            num_constraints: self.constraints.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProblemStats {
    pub num_vars: usize,
    pub num_integer_vars: usize,
    pub num_constraints: usize,
}

impl fmt::Display for ProblemStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} variables ({} integer), {} constraints",
            self.num_vars, self.num_integer_vars, self.num_constraints
        )
    }
}
