use regex::Regex;
use std::collections::HashMap;
use std::fmt;

use crate::core::error::{ImportError, ImportResult};
use crate::core::value::Value;

/// Named query parameters, keyed without the leading colon.
pub type Params = HashMap<String, Value>;

/// Placeholder flavour of a SQL engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    MySql,
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Positional placeholder for the `position`-th (1-based) bound value.
    pub fn placeholder(&self, position: usize) -> String {
        match self {
            Dialect::MySql | Dialect::Sqlite => "?".to_string(),
            Dialect::Postgres => format!("${}", position),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dialect::MySql => "mysql",
            Dialect::Postgres => "postgres",
            Dialect::Sqlite => "sqlite",
        };
        write!(f, "{}", name)
    }
}

/// Rewrites dialect-agnostic queries with `:name` parameters into the native
/// positional form of one engine, optionally renaming the source table prefix.
#[derive(Debug, Clone)]
pub struct SqlTransformer {
    dialect: Dialect,
    prefix_rewrite: Option<(Regex, String)>,
    tokens: Regex,
}

impl SqlTransformer {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            prefix_rewrite: None,
            // Casts and string literals are matched first so they are copied as-is.
            tokens: Regex::new(r"::|'(?:[^']|'')*'|:([A-Za-z_][A-Za-z0-9_]*)")
                .expect("parameter pattern is valid"),
        }
    }

    /// Rewrite every table name starting with `default_prefix` to start with
    /// `configured_prefix` instead.
    pub fn with_table_prefix(mut self, default_prefix: &str, configured_prefix: &str) -> Self {
        if default_prefix.is_empty() || default_prefix == configured_prefix {
            self.prefix_rewrite = None;
            return self;
        }
        let pattern = format!(r"\b{}", regex::escape(default_prefix));
        self.prefix_rewrite = Some((
            Regex::new(&pattern).expect("escaped prefix is a valid pattern"),
            configured_prefix.to_string(),
        ));
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Produce the native SQL and the values to bind, in placeholder order.
    pub fn transform(&self, sql: &str, params: &Params) -> ImportResult<(String, Vec<Value>)> {
        let mut output = String::with_capacity(sql.len());
        let mut values = Vec::new();
        let mut last = 0;

        for captures in self.tokens.captures_iter(sql) {
            let Some(token) = captures.get(0) else {
                continue;
            };
            self.push_code(&mut output, &sql[last..token.start()]);
            match captures.get(1) {
                Some(name) => {
                    let value = params
                        .get(name.as_str())
                        .ok_or_else(|| ImportError::MissingParameter(name.as_str().to_string()))?;
                    values.push(value.clone());
                    output.push_str(&self.dialect.placeholder(values.len()));
                }
                None => output.push_str(token.as_str()),
            }
            last = token.end();
        }
        self.push_code(&mut output, &sql[last..]);

        Ok((output, values))
    }

    /// Append SQL outside literals, renaming the table prefix if configured.
    fn push_code(&self, output: &mut String, code: &str) {
        match &self.prefix_rewrite {
            Some((pattern, replacement)) => {
                output.push_str(&pattern.replace_all(code, regex::NoExpand(replacement)))
            }
            None => output.push_str(code),
        }
    }
}

/// Build a parameter map from `(name, value)` pairs.
pub fn params<I, K, V>(pairs: I) -> Params
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_params() -> Params {
        params([("a", Value::Integer(5)), ("b", Value::from("x"))])
    }

    #[test]
    fn test_numbered_placeholders() {
        let transformer = SqlTransformer::new(Dialect::Postgres);
        let (sql, values) = transformer
            .transform("SELECT * FROM t WHERE x IN (:a, :b)", &sample_params())
            .unwrap();

        assert_eq!(sql, "SELECT * FROM t WHERE x IN ($1, $2)");
        assert_eq!(values, vec![Value::Integer(5), Value::from("x")]);
    }

    #[test]
    fn test_question_mark_placeholders() {
        let transformer = SqlTransformer::new(Dialect::MySql);
        let (sql, values) = transformer
            .transform("SELECT * FROM t WHERE x IN (:a, :b)", &sample_params())
            .unwrap();

        assert_eq!(sql, "SELECT * FROM t WHERE x IN (?, ?)");
        assert_eq!(values, vec![Value::Integer(5), Value::from("x")]);
    }

    #[test]
    fn test_missing_parameter_fails() {
        let transformer = SqlTransformer::new(Dialect::Sqlite);
        let result = transformer.transform("SELECT :a, :missing", &sample_params());

        assert!(matches!(result, Err(ImportError::MissingParameter(name)) if name == "missing"));
    }

    #[test]
    fn test_full_token_is_matched() {
        let transformer = SqlTransformer::new(Dialect::Postgres);
        let params = params([("id", 1i64), ("identifier", 2i64)]);
        let (sql, values) = transformer
            .transform("WHERE a = :identifier AND b = :id", &params)
            .unwrap();

        assert_eq!(sql, "WHERE a = $1 AND b = $2");
        assert_eq!(values, vec![Value::Integer(2), Value::Integer(1)]);
    }

    #[test]
    fn test_repeated_parameter_is_bound_per_occurrence() {
        let transformer = SqlTransformer::new(Dialect::Postgres);
        let (sql, values) = transformer
            .transform("WHERE a = :a OR b = :a", &sample_params())
            .unwrap();

        assert_eq!(sql, "WHERE a = $1 OR b = $2");
        assert_eq!(values, vec![Value::Integer(5), Value::Integer(5)]);
    }

    #[test]
    fn test_casts_and_literals_are_not_parameters() {
        let transformer = SqlTransformer::new(Dialect::Postgres);
        let (sql, values) = transformer
            .transform(
                "SELECT created_at::date, '10:30 :b' FROM t WHERE id = :a",
                &sample_params(),
            )
            .unwrap();

        assert_eq!(sql, "SELECT created_at::date, '10:30 :b' FROM t WHERE id = $1");
        assert_eq!(values, vec![Value::Integer(5)]);
    }

    #[test]
    fn test_table_prefix_rewrite() {
        let transformer =
            SqlTransformer::new(Dialect::MySql).with_table_prefix("phpbb_", "forum_");
        let (sql, _) = transformer
            .transform(
                "SELECT u.user_id FROM phpbb_users u JOIN phpbb_user_group g ON g.user_id = u.user_id",
                &Params::new(),
            )
            .unwrap();

        assert_eq!(
            sql,
            "SELECT u.user_id FROM forum_users u JOIN forum_user_group g ON g.user_id = u.user_id"
        );
    }

    #[test]
    fn test_table_prefix_inside_literal_is_kept() {
        let transformer =
            SqlTransformer::new(Dialect::Sqlite).with_table_prefix("phpbb_", "forum_");
        let (sql, values) = transformer
            .transform(
                "SELECT 'phpbb_users', config_value FROM phpbb_config WHERE config_name = :name",
                &params([("name", "phpbb_version")]),
            )
            .unwrap();

        assert_eq!(
            sql,
            "SELECT 'phpbb_users', config_value FROM forum_config WHERE config_name = ?"
        );
        assert_eq!(values, vec![Value::from("phpbb_version")]);
    }

    #[test]
    fn test_default_prefix_is_left_alone() {
        let transformer =
            SqlTransformer::new(Dialect::MySql).with_table_prefix("phpbb_", "phpbb_");
        let (sql, _) = transformer
            .transform("SELECT * FROM phpbb_posts", &Params::new())
            .unwrap();

        assert_eq!(sql, "SELECT * FROM phpbb_posts");
    }
}
