//! Compilation of conditions into parameterized SQL

use super::{ColumnCondition, ColumnOperator, Condition, SpatialCondition};
use crate::db::dialect::escape_like;
use crate::db::{Arguments, Dialect, ValueConverter};
use crate::reflection::ReflectedColumn;

/// Renders condition trees as WHERE clauses for one dialect
#[derive(Debug, Clone, Copy)]
pub struct ConditionCompiler {
    dialect: Dialect,
    values: ValueConverter,
}

impl ConditionCompiler {
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            values: ValueConverter::new(dialect),
        }
    }

    /// `" WHERE ..."`, or an empty string for `Condition::None`
    #[must_use]
    pub fn where_clause(&self, condition: &Condition, args: &mut Arguments) -> String {
        let sql = self.compile(condition, args);
        if sql.is_empty() {
            sql
        } else {
            format!(" WHERE {sql}")
        }
    }

    /// Render a condition; `Condition::None` renders as an empty string
    ///
    /// A value that does not fit its column type can match no row, so the
    /// condition holding it renders as the dialect's FALSE literal.
    #[must_use]
    pub fn compile(&self, condition: &Condition, args: &mut Arguments) -> String {
        match condition {
            Condition::None => String::new(),
            Condition::Column(column) => self.column_sql(column, args),
            Condition::Spatial(spatial) => self.spatial_sql(spatial, args),
            Condition::And(conditions) => self.join(conditions, " AND ", args),
            Condition::Or(conditions) => self.join(conditions, " OR ", args),
            Condition::Not(inner) => {
                let sql = self.compile(inner, args);
                if sql.is_empty() {
                    sql
                } else {
                    format!("(NOT {sql})")
                }
            }
        }
    }

    fn join(&self, conditions: &[Condition], glue: &str, args: &mut Arguments) -> String {
        let mut parts: Vec<String> = conditions
            .iter()
            .map(|condition| self.compile(condition, args))
            .filter(|sql| !sql.is_empty())
            .collect();
        match parts.len() {
            0 => String::new(),
            1 => parts.remove(0),
            _ => format!("({})", parts.join(glue)),
        }
    }

    /// Bind every item, or nothing when one of them does not convert
    fn bind_all(
        &self,
        column: &ReflectedColumn,
        items: &[&str],
        args: &mut Arguments,
    ) -> Option<Vec<String>> {
        let values = items
            .iter()
            .map(|item| self.values.convert_text(column, item))
            .collect::<Option<Vec<_>>>()?;
        Some(
            values
                .into_iter()
                .map(|value| self.values.bind_converted(column, value, args))
                .collect(),
        )
    }

    fn column_sql(&self, condition: &ColumnCondition, args: &mut Arguments) -> String {
        let column = &condition.column;
        let quoted = self.dialect.quote(&column.name);
        let value = condition.value.as_str();
        let never = self.dialect.false_literal().to_string();

        let comparison = |symbol: &str, args: &mut Arguments| match self.bind_all(column, &[value], args) {
            Some(placeholders) => format!("{quoted} {symbol} {}", placeholders[0]),
            None => never.clone(),
        };

        match condition.operator {
            ColumnOperator::Contains | ColumnOperator::StartsWith | ColumnOperator::EndsWith => {
                let escaped = escape_like(value);
                let pattern = match condition.operator {
                    ColumnOperator::Contains => format!("%{escaped}%"),
                    ColumnOperator::StartsWith => format!("{escaped}%"),
                    _ => format!("%{escaped}"),
                };
                let target = if self.dialect == Dialect::Postgres && !column.column_type.is_textual()
                {
                    format!("CAST({quoted} AS text)")
                } else {
                    quoted.clone()
                };
                let placeholder = args.push(pattern);
                format!("{target} LIKE {placeholder}{}", self.dialect.like_escape())
            }
            ColumnOperator::Equals => comparison("=", args),
            ColumnOperator::LessThan => comparison("<", args),
            ColumnOperator::LessOrEqual => comparison("<=", args),
            ColumnOperator::GreaterOrEqual => comparison(">=", args),
            ColumnOperator::GreaterThan => comparison(">", args),
            ColumnOperator::Between => {
                let bounds: Vec<&str> = value.split(',').collect();
                if bounds.len() != 2 {
                    return never;
                }
                match self.bind_all(column, &bounds, args).as_deref() {
                    Some([low, high]) => format!("({quoted} >= {low} AND {quoted} <= {high})"),
                    _ => never,
                }
            }
            ColumnOperator::In => {
                // items that cannot equal any stored value are left out
                let placeholders: Vec<String> = value
                    .split(',')
                    .filter_map(|item| self.values.convert_text(column, item))
                    .map(|converted| self.values.bind_converted(column, converted, args))
                    .collect();
                if value.is_empty() || placeholders.is_empty() {
                    return never;
                }
                format!("{quoted} IN ({})", placeholders.join(","))
            }
            ColumnOperator::IsNull => format!("{quoted} IS NULL"),
        }
    }

    fn spatial_sql(&self, condition: &SpatialCondition, args: &mut Arguments) -> String {
        let quoted = self.dialect.quote(&condition.column.name);
        let function = condition.operator.function();
        let argument = condition
            .operator
            .takes_argument()
            .then(|| args.push(condition.value.as_str()));

        match (self.dialect, argument) {
            (Dialect::SqlServer, Some(placeholder)) => format!(
                "{quoted}.ST{function}(geometry::STGeomFromText({placeholder},0))=1"
            ),
            (Dialect::SqlServer, None) => format!("{quoted}.ST{function}()=1"),
            (_, Some(placeholder)) => {
                format!("ST_{function}({quoted}, ST_GeomFromText({placeholder}))=TRUE")
            }
            (_, None) => format!("ST_{function}({quoted})=TRUE"),
        }
    }
}
