//! Solver-independent mixed-integer model.
//!
//! The encoder writes into this representation and the solver module
//! translates it into a `good_lp` problem. Keeping the two apart lets tests
//! count variables and inspect constraint families without a backend.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Tolerance used when checking assignments against constraints.
pub const FEASIBILITY_TOLERANCE: f64 = 1e-6;

/// Index of a variable inside its [`MipModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct VarId(usize);

impl VarId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VarKind {
    Binary,
    Continuous,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableSpec {
    pub name: String,
    pub kind: VarKind,
    pub lower: f64,
    /// `None` is unbounded above
    pub upper: Option<f64>,
}

impl VariableSpec {
    pub fn binary(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: VarKind::Binary,
            lower: 0.0,
            upper: Some(1.0),
        }
    }

    /// Continuous and non-negative.
    pub fn non_negative(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: VarKind::Continuous,
            lower: 0.0,
            upper: None,
        }
    }

    pub fn is_binary(&self) -> bool {
        self.kind == VarKind::Binary
    }
}

/// `Σ coef · var + constant`. Repeated terms on one variable are merged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearExpr {
    terms: BTreeMap<VarId, f64>,
    constant: f64,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constant(value: f64) -> Self {
        Self {
            terms: BTreeMap::new(),
            constant: value,
        }
    }

    pub fn add_term(&mut self, var: VarId, coef: f64) {
        *self.terms.entry(var).or_insert(0.0) += coef;
    }

    pub fn with_term(mut self, var: VarId, coef: f64) -> Self {
        self.add_term(var, coef);
        self
    }

    pub fn sum<I: IntoIterator<Item = VarId>>(vars: I) -> Self {
        let mut expr = Self::new();
        for var in vars {
            expr.add_term(var, 1.0);
        }
        expr
    }

    pub fn terms(&self) -> impl Iterator<Item = (VarId, f64)> + '_ {
        self.terms.iter().map(|(var, coef)| (*var, *coef))
    }

    pub fn constant_term(&self) -> f64 {
        self.constant
    }

    /// True when no variable appears with a non-zero coefficient.
    pub fn is_constant(&self) -> bool {
        self.terms.values().all(|coef| *coef == 0.0)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Value of the expression under `values` (indexed by [`VarId::index`]).
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(var, coef)| coef * values.get(var.0).copied().unwrap_or(0.0))
            .sum::<f64>()
            + self.constant
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConstraintSense {
    LessEq,
    GreaterEq,
    Equal,
}

impl ConstraintSense {
    fn holds(&self, lhs: f64, rhs: f64, tolerance: f64) -> bool {
        match self {
            ConstraintSense::LessEq => lhs <= rhs + tolerance,
            ConstraintSense::GreaterEq => lhs >= rhs - tolerance,
            ConstraintSense::Equal => (lhs - rhs).abs() <= tolerance,
        }
    }
}

impl fmt::Display for ConstraintSense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConstraintSense::LessEq => "<=",
            ConstraintSense::GreaterEq => ">=",
            ConstraintSense::Equal => "==",
        })
    }
}

/// Which part of the formulation a constraint belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintFamily {
    Coverage,
    Disjunction,
    FlowSource,
    FlowSensor,
    FlowSink,
    Projection,
}

impl fmt::Display for ConstraintFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConstraintFamily::Coverage => "coverage",
            ConstraintFamily::Disjunction => "disjunction",
            ConstraintFamily::FlowSource => "flow_source",
            ConstraintFamily::FlowSensor => "flow_sensor",
            ConstraintFamily::FlowSink => "flow_sink",
            ConstraintFamily::Projection => "projection",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    pub family: ConstraintFamily,
    pub name: String,
    pub expr: LinearExpr,
    pub sense: ConstraintSense,
    pub rhs: f64,
}

impl LinearConstraint {
    pub fn is_constant(&self) -> bool {
        self.expr.is_constant()
    }

    pub fn is_satisfied_by(&self, values: &[f64]) -> bool {
        self.sense
            .holds(self.expr.evaluate(values), self.rhs, FEASIBILITY_TOLERANCE)
    }
}

impl fmt::Display for LinearConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}]: {} terms {} {}",
            self.name,
            self.family,
            self.expr.len(),
            self.sense,
            self.rhs
        )
    }
}

/// A minimisation problem over binary and continuous variables.
#[derive(Debug, Clone, Default)]
pub struct MipModel {
    pub name: String,
    pub variables: Vec<VariableSpec>,
    pub constraints: Vec<LinearConstraint>,
    pub objective: LinearExpr,
}

/// Variable and constraint counts of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelSize {
    pub variables: usize,
    pub binary_variables: usize,
    pub constraints: usize,
}

impl MipModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn add_variable(&mut self, spec: VariableSpec) -> VarId {
        self.variables.push(spec);
        VarId(self.variables.len() - 1)
    }

    pub fn add_constraint(
        &mut self,
        family: ConstraintFamily,
        name: impl Into<String>,
        expr: LinearExpr,
        sense: ConstraintSense,
        rhs: f64,
    ) {
        self.constraints.push(LinearConstraint {
            family,
            name: name.into(),
            expr,
            sense,
            rhs,
        });
    }

    pub fn set_objective(&mut self, objective: LinearExpr) {
        self.objective = objective;
    }

    pub fn variable(&self, id: VarId) -> Option<&VariableSpec> {
        self.variables.get(id.0)
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_binary_variables(&self) -> usize {
        self.variables.iter().filter(|v| v.is_binary()).count()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn size(&self) -> ModelSize {
        ModelSize {
            variables: self.num_variables(),
            binary_variables: self.num_binary_variables(),
            constraints: self.num_constraints(),
        }
    }

    pub fn constraints_in(
        &self,
        family: ConstraintFamily,
    ) -> impl Iterator<Item = &LinearConstraint> + '_ {
        self.constraints.iter().filter(move |c| c.family == family)
    }

    /// Constraints without variables that can never hold. Any entry makes
    /// the model infeasible before a solver sees it.
    pub fn violated_constants(&self) -> Vec<&LinearConstraint> {
        self.constraints
            .iter()
            .filter(|c| c.is_constant() && !c.is_satisfied_by(&[]))
            .collect()
    }

    /// Checks bounds, integrality and every constraint.
    pub fn is_feasible(&self, values: &[f64]) -> bool {
        if values.len() != self.variables.len() {
            return false;
        }
        let bounds_hold = self.variables.iter().zip(values).all(|(spec, value)| {
            let within = *value >= spec.lower - FEASIBILITY_TOLERANCE
                && spec
                    .upper
                    .map_or(true, |upper| *value <= upper + FEASIBILITY_TOLERANCE);
            let integral =
                !spec.is_binary() || (value - value.round()).abs() <= FEASIBILITY_TOLERANCE;
            within && integral
        });
        bounds_hold && self.constraints.iter().all(|c| c.is_satisfied_by(values))
    }
}
