use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Deploy-time parameter values keyed by template parameter name.
pub type ParameterValues = BTreeMap<String, String>;

/// Boolean predicate over deploy-time parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Equals { parameter: String, value: String },
    Not(Box<Condition>),
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

impl Condition {
    pub fn equals(parameter: impl Into<String>, value: impl Into<String>) -> Self {
        Condition::Equals {
            parameter: parameter.into(),
            value: value.into(),
        }
    }

    pub fn negate(self) -> Self {
        Condition::Not(Box::new(self))
    }

    /// Evaluate against concrete parameter values. A parameter with no value
    /// compares as the empty string.
    pub fn evaluate(&self, values: &ParameterValues) -> bool {
        match self {
            Condition::Equals { parameter, value } => {
                values.get(parameter).map(String::as_str).unwrap_or("") == value
            }
            Condition::Not(inner) => !inner.evaluate(values),
            Condition::And(all) => all.iter().all(|c| c.evaluate(values)),
            Condition::Or(any) => any.iter().any(|c| c.evaluate(values)),
        }
    }

    /// Parameters this condition reads.
    pub fn parameters(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_parameters(&mut out);
        out.sort_unstable();
        out.dedup();
        out
    }

    fn collect_parameters<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Condition::Equals { parameter, .. } => out.push(parameter),
            Condition::Not(inner) => inner.collect_parameters(out),
            Condition::And(items) | Condition::Or(items) => {
                for item in items {
                    item.collect_parameters(out);
                }
            }
        }
    }

    /// CloudFormation intrinsic form (`Fn::Equals`, `Fn::Not`, ...).
    pub fn to_intrinsic(&self) -> Value {
        match self {
            Condition::Equals { parameter, value } => {
                json!({ "Fn::Equals": [{ "Ref": parameter }, value] })
            }
            Condition::Not(inner) => json!({ "Fn::Not": [inner.to_intrinsic()] }),
            Condition::And(items) => {
                json!({ "Fn::And": items.iter().map(Condition::to_intrinsic).collect::<Vec<_>>() })
            }
            Condition::Or(items) => {
                json!({ "Fn::Or": items.iter().map(Condition::to_intrinsic).collect::<Vec<_>>() })
            }
        }
    }
}

/// A condition together with the name it is declared under in a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedCondition {
    pub name: String,
    pub expr: Condition,
}

impl NamedCondition {
    pub fn new(name: impl Into<String>, expr: Condition) -> Self {
        Self {
            name: name.into(),
            expr,
        }
    }

    /// Conjunction of `self` (newly applied) with `existing`. The name is
    /// derived from both so distinct compositions never collide.
    pub fn and(&self, existing: &NamedCondition) -> NamedCondition {
        NamedCondition {
            name: format!("{}And{}", self.name, existing.name),
            expr: Condition::And(vec![self.expr.clone(), existing.expr.clone()]),
        }
    }

    pub fn evaluate(&self, values: &ParameterValues) -> bool {
        self.expr.evaluate(values)
    }
}

/// Two complementary conditions split from one base predicate.
///
/// `holds` is the base, `fails` is its negation. Both sides come from the
/// same expression, so for every parameter assignment exactly one is true.
/// There is no way to build a pair from two independent expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionPair {
    holds: NamedCondition,
    fails: NamedCondition,
}

impl ConditionPair {
    pub fn split(base: Condition, holds_name: &str, fails_name: &str) -> Self {
        Self {
            fails: NamedCondition::new(fails_name, base.clone().negate()),
            holds: NamedCondition::new(holds_name, base),
        }
    }

    pub fn holds(&self) -> &NamedCondition {
        &self.holds
    }

    pub fn fails(&self) -> &NamedCondition {
        &self.fails
    }

    /// The side that is true for `values`.
    pub fn live(&self, values: &ParameterValues) -> &NamedCondition {
        if self.holds.evaluate(values) {
            &self.holds
        } else {
            &self.fails
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> ParameterValues {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_equals_treats_missing_as_empty() {
        let cond = Condition::equals("ExistingRepoARN", "");
        assert!(cond.evaluate(&ParameterValues::new()));
        assert!(!cond.evaluate(&values(&[("ExistingRepoARN", "arn:x")])));
    }

    #[test]
    fn test_boolean_combinators() {
        let a = Condition::equals("A", "1");
        let b = Condition::equals("B", "1");
        let v = values(&[("A", "1"), ("B", "0")]);
        assert!(Condition::Or(vec![a.clone(), b.clone()]).evaluate(&v));
        assert!(!Condition::And(vec![a.clone(), b.clone()]).evaluate(&v));
        assert!(b.negate().evaluate(&v));
    }

    #[test]
    fn test_pair_is_exclusive_and_exhaustive() {
        let pair = ConditionPair::split(
            Condition::equals("RetentionPolicy", "Retain"),
            "RetainCondition",
            "DeleteCondition",
        );
        for value in ["Retain", "Delete", "", "retain"] {
            let v = values(&[("RetentionPolicy", value)]);
            let live = [pair.holds().evaluate(&v), pair.fails().evaluate(&v)];
            assert_eq!(live.iter().filter(|l| **l).count(), 1, "value {value:?}");
        }
        let v = values(&[("RetentionPolicy", "Retain")]);
        assert_eq!(pair.live(&v).name, "RetainCondition");
    }

    #[test]
    fn test_and_composes_names_and_expressions() {
        let outer = NamedCondition::new("Retain", Condition::equals("R", "Retain"));
        let inner = NamedCondition::new("Fresh", Condition::equals("E", ""));
        let both = outer.and(&inner);
        assert_eq!(both.name, "RetainAndFresh");
        assert!(both.evaluate(&values(&[("R", "Retain")])));
        assert!(!both.evaluate(&values(&[("R", "Retain"), ("E", "arn")])));
        assert_eq!(both.expr.parameters(), vec!["E", "R"]);
    }

    #[test]
    fn test_intrinsic_rendering() {
        let cond = Condition::equals("RetentionPolicy", "Retain").negate();
        assert_eq!(
            cond.to_intrinsic(),
            json!({ "Fn::Not": [{ "Fn::Equals": [{ "Ref": "RetentionPolicy" }, "Retain"] }] })
        );
    }
}
