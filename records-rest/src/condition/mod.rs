//! Filter condition algebra
//!
//! Conditions form a tree of column predicates, spatial predicates and
//! boolean connectives. `Condition::None` is the identity: combining
//! anything with it yields the other operand, and compiling it yields no
//! WHERE clause at all.

pub mod compiler;
pub mod filters;

use crate::reflection::{ReflectedColumn, ReflectedTable};

pub use compiler::ConditionCompiler;
pub use filters::FilterInfo;

/// Comparison applied to a single column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnOperator {
    /// `cs`: contains string
    Contains,
    /// `sw`: starts with
    StartsWith,
    /// `ew`: ends with
    EndsWith,
    /// `eq`
    Equals,
    /// `lt`
    LessThan,
    /// `le`
    LessOrEqual,
    /// `ge`
    GreaterOrEqual,
    /// `gt`
    GreaterThan,
    /// `bt`: between two comma separated bounds
    Between,
    /// `in`: member of a comma separated list
    In,
    /// `is`: is null
    IsNull,
}

impl ColumnOperator {
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        let operator = match code {
            "cs" => Self::Contains,
            "sw" => Self::StartsWith,
            "ew" => Self::EndsWith,
            "eq" => Self::Equals,
            "lt" => Self::LessThan,
            "le" => Self::LessOrEqual,
            "ge" => Self::GreaterOrEqual,
            "gt" => Self::GreaterThan,
            "bt" => Self::Between,
            "in" => Self::In,
            "is" => Self::IsNull,
            _ => return None,
        };
        Some(operator)
    }

    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Contains => "cs",
            Self::StartsWith => "sw",
            Self::EndsWith => "ew",
            Self::Equals => "eq",
            Self::LessThan => "lt",
            Self::LessOrEqual => "le",
            Self::GreaterOrEqual => "ge",
            Self::GreaterThan => "gt",
            Self::Between => "bt",
            Self::In => "in",
            Self::IsNull => "is",
        }
    }
}

/// Spatial relation between a geometry column and a WKT value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpatialOperator {
    Contains,
    Crosses,
    Disjoint,
    Equals,
    Intersects,
    Overlaps,
    Touches,
    Within,
    IsClosed,
    IsSimple,
    IsValid,
}

impl SpatialOperator {
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        let operator = match code {
            "co" => Self::Contains,
            "cr" => Self::Crosses,
            "di" => Self::Disjoint,
            "eq" => Self::Equals,
            "in" => Self::Intersects,
            "ov" => Self::Overlaps,
            "to" => Self::Touches,
            "wi" => Self::Within,
            "ic" => Self::IsClosed,
            "is" => Self::IsSimple,
            "iv" => Self::IsValid,
            _ => return None,
        };
        Some(operator)
    }

    /// Name of the `ST_` function implementing the relation
    #[must_use]
    pub fn function(self) -> &'static str {
        match self {
            Self::Contains => "Contains",
            Self::Crosses => "Crosses",
            Self::Disjoint => "Disjoint",
            Self::Equals => "Equals",
            Self::Intersects => "Intersects",
            Self::Overlaps => "Overlaps",
            Self::Touches => "Touches",
            Self::Within => "Within",
            Self::IsClosed => "IsClosed",
            Self::IsSimple => "IsSimple",
            Self::IsValid => "IsValid",
        }
    }

    /// Unary predicates ignore the value
    #[must_use]
    pub fn takes_argument(self) -> bool {
        !matches!(self, Self::IsClosed | Self::IsSimple | Self::IsValid)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnCondition {
    pub column: ReflectedColumn,
    pub operator: ColumnOperator,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpatialCondition {
    pub column: ReflectedColumn,
    pub operator: SpatialOperator,
    pub value: String,
}

/// A filter predicate tree
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Condition {
    /// Matches everything; the identity of `and` and `or`
    #[default]
    None,
    Column(ColumnCondition),
    Spatial(SpatialCondition),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    /// Predicate on a column
    #[must_use]
    pub fn column(
        column: &ReflectedColumn,
        operator: ColumnOperator,
        value: impl Into<String>,
    ) -> Self {
        Self::Column(ColumnCondition {
            column: column.clone(),
            operator,
            value: value.into(),
        })
    }

    /// Equality on a column
    #[must_use]
    pub fn equals(column: &ReflectedColumn, value: impl Into<String>) -> Self {
        Self::column(column, ColumnOperator::Equals, value)
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Conjunction; nested conjunctions are flattened
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::None, other) => other,
            (this, Self::None) => this,
            (Self::And(mut left), Self::And(right)) => {
                left.extend(right);
                Self::And(left)
            }
            (Self::And(mut left), other) => {
                left.push(other);
                Self::And(left)
            }
            (this, other) => Self::And(vec![this, other]),
        }
    }

    /// Disjunction; nested disjunctions are flattened
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        match (self, other) {
            (Self::None, other) => other,
            (this, Self::None) => this,
            (Self::Or(mut left), Self::Or(right)) => {
                left.extend(right);
                Self::Or(left)
            }
            (Self::Or(mut left), other) => {
                left.push(other);
                Self::Or(left)
            }
            (this, other) => Self::Or(vec![this, other]),
        }
    }

    /// Negation; negating `None` stays `None`
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        match self {
            Self::None => Self::None,
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }

    /// Conjunction of all conditions
    pub fn all(conditions: impl IntoIterator<Item = Self>) -> Self {
        conditions.into_iter().fold(Self::None, Self::and)
    }

    /// Disjunction of all conditions
    pub fn any(conditions: impl IntoIterator<Item = Self>) -> Self {
        conditions.into_iter().fold(Self::None, Self::or)
    }

    /// Parse `column,op[,value]` against a table
    ///
    /// Operators longer than two characters may carry an `n` prefix for
    /// negation followed by an `s` prefix for spatial predicates. Unknown
    /// columns or operators parse to `None`.
    #[must_use]
    pub fn parse(table: &ReflectedTable, filter: &str) -> Self {
        let mut parts = filter.splitn(3, ',');
        let (Some(column_name), Some(code)) = (parts.next(), parts.next()) else {
            return Self::None;
        };
        let value = parts.next().unwrap_or("");
        let Some(column) = table.column(column_name) else {
            return Self::None;
        };

        let mut code = code;
        let mut negate = false;
        let mut spatial = false;
        if code.len() > 2 {
            if let Some(rest) = code.strip_prefix('n') {
                negate = true;
                code = rest;
            }
            if code.len() > 2 {
                if let Some(rest) = code.strip_prefix('s') {
                    spatial = true;
                    code = rest;
                }
            }
        }

        let condition = if spatial {
            SpatialOperator::from_code(code).map(|operator| {
                Self::Spatial(SpatialCondition {
                    column: column.clone(),
                    operator,
                    value: value.to_string(),
                })
            })
        } else {
            ColumnOperator::from_code(code).map(|operator| Self::column(column, operator, value))
        };

        match condition {
            Some(condition) if negate => condition.not(),
            Some(condition) => condition,
            None => Self::None,
        }
    }
}
