//! Patterns selecting which values a taker accepts.
//!
//! | Pattern | Accepts |
//! |---------|---------|
//! | [`Pattern::Wildcard`] (`"*"`) | every value |
//! | [`Pattern::Type`] | actions whose type equals the tag |
//! | [`Pattern::Any`] | values accepted by at least one sub-pattern |
//! | [`Pattern::Predicate`] | values for which the function returns `true` |
//!
//! # Examples
//!
//! ```rust
//! use sagaflow::pattern::Pattern;
//! use sagaflow::value::{Action, Value};
//!
//! let pattern = Pattern::from(["LOGIN", "LOGOUT"]);
//! assert!(pattern.matches(&Value::from(Action::new("LOGOUT"))));
//! assert!(!pattern.matches(&Value::from(Action::new("FETCH"))));
//! assert!(Pattern::from("*").matches(&Value::from(42)));
//! ```

use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;

use crate::value::Value;

/// A predicate over values, shared between takers.
pub type Predicate = Rc<dyn Fn(&Value) -> bool>;

/// Selects which values a taker accepts.
#[derive(Clone, Default)]
pub enum Pattern {
    /// Accepts every value.
    #[default]
    Wildcard,
    /// Accepts actions whose type equals the tag.
    Type(String),
    /// Accepts values accepted by any of the sub-patterns.
    Any(Vec<Pattern>),
    /// Accepts values for which the predicate returns `true`.
    Predicate(Predicate),
}

impl Pattern {
    /// Creates a predicate pattern.
    pub fn predicate(predicate: impl Fn(&Value) -> bool + 'static) -> Self {
        Self::Predicate(Rc::new(predicate))
    }

    /// Returns `true` if `input` is accepted.
    pub fn matches(&self, input: &Value) -> bool {
        match self {
            Self::Wildcard => true,
            Self::Type(tag) => input
                .as_action()
                .is_some_and(|action| action.action_type() == tag),
            Self::Any(patterns) => patterns.iter().any(|pattern| pattern.matches(input)),
            Self::Predicate(predicate) => predicate(input),
        }
    }
}

impl From<&str> for Pattern {
    fn from(tag: &str) -> Self {
        if tag == "*" {
            Self::Wildcard
        } else {
            Self::Type(tag.to_string())
        }
    }
}

impl From<String> for Pattern {
    fn from(tag: String) -> Self {
        Self::from(tag.as_str())
    }
}

impl<const N: usize> From<[&str; N]> for Pattern {
    fn from(tags: [&str; N]) -> Self {
        Self::Any(tags.into_iter().map(Self::from).collect())
    }
}

impl From<Vec<Self>> for Pattern {
    fn from(patterns: Vec<Self>) -> Self {
        Self::Any(patterns)
    }
}

impl Debug for Pattern {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wildcard => formatter.write_str("*"),
            Self::Type(tag) => write!(formatter, "{tag:?}"),
            Self::Any(patterns) => formatter.debug_list().entries(patterns).finish(),
            Self::Predicate(_) => formatter.write_str("<predicate>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Action;
    use rstest::rstest;

    #[rstest]
    #[case(Pattern::Wildcard, Value::from(1), true)]
    #[case(Pattern::from("A"), Value::from(Action::new("A")), true)]
    #[case(Pattern::from("A"), Value::from(Action::new("B")), false)]
    #[case(Pattern::from("A"), Value::from("A"), false)]
    #[case(Pattern::from(["A", "B"]), Value::from(Action::new("B")), true)]
    #[case(Pattern::Any(Vec::new()), Value::from(Action::new("B")), false)]
    fn pattern_matches(#[case] pattern: Pattern, #[case] input: Value, #[case] expected: bool) {
        assert_eq!(pattern.matches(&input), expected);
    }

    #[rstest]
    fn predicate_pattern_delegates() {
        let pattern = Pattern::predicate(|value| value.as_i64().is_some_and(|n| n > 3));
        assert!(pattern.matches(&Value::from(4)));
        assert!(!pattern.matches(&Value::from(2)));
    }

    #[rstest]
    fn star_is_wildcard() {
        assert!(matches!(Pattern::from("*"), Pattern::Wildcard));
    }
}
