//! Runtime rewriting of Postgres-flavoured SQL for the SQLite and MySQL
//! backends.
//!
//! Queries in this crate are authored once, in Postgres syntax, and rewritten
//! right before dispatch. The rewrite is a fixed list of pattern
//! substitutions followed by a placeholder pass; it has no grammar awareness.
//! Known gaps: `UNNEST` is rejected outside Postgres, `~*` is rejected on
//! SQLite and `DISTINCT ON` is reduced to a plain `DISTINCT`. MySQL's
//! `REGEXP` follows the column collation, which is case-insensitive by
//! default.

use thiserror::Error;

mod rules;
mod scanner;

pub use scanner::PlaceholderStyle;

use crate::config::DbType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Mysql,
    Sqlite,
}

impl Dialect {
    pub fn placeholder_style(self) -> PlaceholderStyle {
        match self {
            Dialect::Postgres => PlaceholderStyle::Dollar,
            Dialect::Sqlite => PlaceholderStyle::NumberedQuestion,
            Dialect::Mysql => PlaceholderStyle::Question,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::Mysql => "mysql",
            Dialect::Sqlite => "sqlite",
        }
    }
}

impl From<DbType> for Dialect {
    fn from(value: DbType) -> Self {
        match value {
            DbType::Postgres => Dialect::Postgres,
            DbType::Mysql => Dialect::Mysql,
            DbType::Sqlite => Dialect::Sqlite,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TranslationError {
    #[error("{0} is not supported on this backend")]
    Unsupported(&'static str),
    #[error("invalid placeholder {0}")]
    InvalidPlaceholder(String),
}

/// A query ready for the target backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translated {
    pub sql: String,
    /// For positional `?` targets: the zero-based index of the original
    /// parameter behind each `?`, in textual order.
    pub bindings: Option<Vec<usize>>,
}

pub fn translate(sql: &str, dialect: Dialect) -> Result<Translated, TranslationError> {
    let rewritten = match dialect {
        Dialect::Postgres => {
            return Ok(Translated {
                sql: sql.to_string(),
                bindings: None,
            });
        }
        Dialect::Sqlite | Dialect::Mysql if rules::uses_unnest(sql) => {
            return Err(TranslationError::Unsupported("UNNEST"));
        }
        Dialect::Sqlite if rules::uses_case_insensitive_regex(sql) => {
            return Err(TranslationError::Unsupported("~*"));
        }
        Dialect::Sqlite => rules::to_sqlite(sql),
        Dialect::Mysql => rules::to_mysql(sql),
    };
    translate_placeholders(&rewritten, dialect)
}

/// Only the placeholder pass of [`translate`].
pub fn translate_placeholders(sql: &str, dialect: Dialect) -> Result<Translated, TranslationError> {
    let out = scanner::rewrite_placeholders(sql, dialect.placeholder_style())?;
    Ok(Translated {
        sql: out.sql,
        bindings: out.bindings,
    })
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn sqlite(sql: &str) -> String {
        translate(sql, Dialect::Sqlite).unwrap().sql
    }

    fn mysql(sql: &str) -> String {
        translate(sql, Dialect::Mysql).unwrap().sql
    }

    #[test]
    fn postgres_is_passed_through() {
        let sql = "SELECT * FROM t WHERE name ILIKE $1 AND d >= NOW() - INTERVAL '3 days'";
        let out = translate(sql, Dialect::Postgres).unwrap();
        assert_eq!(out.sql, sql);
        assert!(out.bindings.is_none());
    }

    #[test_case("SELECT * FROM t WHERE name ILIKE $1", "SELECT * FROM t WHERE name LIKE ?1" ; "ilike")]
    #[test_case("SELECT * FROM t WHERE name SIMILAR TO $1", "SELECT * FROM t WHERE name LIKE ?1" ; "similar to")]
    #[test_case("SELECT * FROM t WHERE name ~ $1", "SELECT * FROM t WHERE name GLOB ?1" ; "regex match")]
    #[test_case("SELECT * FROM t WHERE name !~ $1", "SELECT * FROM t WHERE name NOT GLOB ?1" ; "negated regex match")]
    #[test_case("SELECT NOW()", "SELECT datetime('now')" ; "now")]
    #[test_case("SELECT NOW() - INTERVAL '30 days'", "SELECT datetime('now', '-30 days')" ; "now minus interval")]
    #[test_case("SELECT CURRENT_DATE + INTERVAL '1 month'", "SELECT date('now', '+1 months')" ; "current date plus interval")]
    #[test_case("SELECT DATE_TRUNC('month', d)", "SELECT date(d, 'start of month')" ; "date trunc month")]
    #[test_case("SELECT DATE_TRUNC('year', d)", "SELECT date(d, 'start of year')" ; "date trunc year")]
    #[test_case("SELECT DATE_TRUNC('week', d)", "SELECT date(d, '-6 days', 'weekday 1')" ; "date trunc week")]
    #[test_case("SELECT DATE_TRUNC('day', NOW())", "SELECT date(datetime('now'))" ; "date trunc day of now")]
    #[test_case("SELECT TO_CHAR(d::date, 'YYYY-MM')", "SELECT strftime('%Y-%m', d)" ; "to char with cast")]
    #[test_case("SELECT EXTRACT(YEAR FROM d::date) = $1", "SELECT CAST(strftime('%Y', d) AS INTEGER) = ?1" ; "extract year")]
    #[test_case("SELECT EXTRACT(DOW FROM d)", "SELECT CAST(strftime('%w', d) AS INTEGER)" ; "extract dow")]
    #[test_case("SELECT DISTINCT ON (category) category, amount FROM t", "SELECT DISTINCT category, amount FROM t" ; "distinct on")]
    #[test_case("SELECT GREATEST(a, 0), LEAST(b, 1)", "SELECT MAX(a, 0), MIN(b, 1)" ; "greatest least")]
    #[test_case("SELECT STRING_AGG(name, ', ')", "SELECT GROUP_CONCAT(name, ', ')" ; "string agg")]
    fn sqlite_rewrites(input: &str, expected: &str) {
        assert_eq!(sqlite(input), expected);
    }

    #[test]
    fn sqlite_on_conflict_do_nothing_becomes_insert_or_ignore() {
        let out = sqlite(
            "INSERT INTO budget_history (id, month) VALUES ($1, $2) ON CONFLICT (user_id, month, category) DO NOTHING",
        );
        assert_eq!(
            out,
            "INSERT OR IGNORE INTO budget_history (id, month) VALUES (?1, ?2)"
        );
    }

    #[test]
    fn sqlite_keeps_native_upsert() {
        let sql = "INSERT INTO budget_limits (id, monthly_limit) VALUES ($1, $2) ON CONFLICT (user_id, category) DO UPDATE SET monthly_limit = EXCLUDED.monthly_limit";
        assert_eq!(
            sqlite(sql),
            "INSERT INTO budget_limits (id, monthly_limit) VALUES (?1, ?2) ON CONFLICT (user_id, category) DO UPDATE SET monthly_limit = EXCLUDED.monthly_limit"
        );
    }

    #[test]
    fn sqlite_nested_rewrites_compose() {
        assert_eq!(
            sqlite("SELECT TO_CHAR(DATE_TRUNC('month', d), 'YYYY-MM')"),
            "SELECT strftime('%Y-%m', date(d, 'start of month'))"
        );
    }

    #[test_case("SELECT * FROM t WHERE name ILIKE $1", "SELECT * FROM t WHERE name LIKE ?" ; "ilike")]
    #[test_case("SELECT NOW() - INTERVAL '30 days'", "SELECT NOW() - INTERVAL 30 DAY" ; "interval")]
    #[test_case("SELECT TO_CHAR(d::date, 'YYYY-MM')", "SELECT DATE_FORMAT(d, '%Y-%m')" ; "to char")]
    #[test_case("SELECT DATE_TRUNC('month', d)", "SELECT DATE_FORMAT(d, '%Y-%m-01')" ; "date trunc month")]
    #[test_case("SELECT EXTRACT(YEAR FROM d)", "SELECT EXTRACT(YEAR FROM d)" ; "extract year is native")]
    #[test_case("SELECT EXTRACT(DOW FROM d)", "SELECT (DAYOFWEEK(d) - 1)" ; "extract dow")]
    #[test_case("SELECT STRING_AGG(name, ', ')", "SELECT GROUP_CONCAT(name SEPARATOR ', ')" ; "string agg")]
    #[test_case("SELECT * FROM t WHERE name ~ $1", "SELECT * FROM t WHERE name REGEXP ?" ; "regex")]
    fn mysql_rewrites(input: &str, expected: &str) {
        assert_eq!(mysql(input), expected);
    }

    #[test]
    fn mysql_upsert_uses_on_duplicate_key() {
        let out = translate(
            "INSERT INTO exchange_rates (provider, currency, rate) VALUES ($1, $2, $3) ON CONFLICT (provider, currency) DO UPDATE SET rate = EXCLUDED.rate",
            Dialect::Mysql,
        )
        .unwrap();
        assert_eq!(
            out.sql,
            "INSERT INTO exchange_rates (provider, currency, rate) VALUES (?, ?, ?) ON DUPLICATE KEY UPDATE rate = VALUES(rate)"
        );
        assert_eq!(out.bindings, Some(vec![0, 1, 2]));
    }

    #[test]
    fn mysql_do_nothing_uses_insert_ignore() {
        assert_eq!(
            mysql("INSERT INTO push_subscriptions (id) VALUES ($1) ON CONFLICT DO NOTHING"),
            "INSERT IGNORE INTO push_subscriptions (id) VALUES (?)"
        );
    }

    #[test]
    fn mysql_repeated_placeholders_expand_bindings() {
        let out = translate(
            "SELECT * FROM t WHERE (a = $1 OR b = $1) AND c = $2",
            Dialect::Mysql,
        )
        .unwrap();
        assert_eq!(out.sql, "SELECT * FROM t WHERE (a = ? OR b = ?) AND c = ?");
        assert_eq!(out.bindings, Some(vec![0, 0, 1]));
    }

    #[test]
    fn unnest_is_rejected_outside_postgres() {
        let sql = "SELECT * FROM UNNEST($1::text[])";
        assert_eq!(
            translate(sql, Dialect::Sqlite),
            Err(TranslationError::Unsupported("UNNEST"))
        );
        assert_eq!(
            translate(sql, Dialect::Mysql),
            Err(TranslationError::Unsupported("UNNEST"))
        );
        assert!(translate(sql, Dialect::Postgres).is_ok());
    }

    #[test]
    fn case_insensitive_regex_is_rejected_on_sqlite() {
        for sql in [
            "SELECT * FROM t WHERE name ~* $1",
            "SELECT * FROM t WHERE name !~* $1",
        ] {
            assert_eq!(
                translate(sql, Dialect::Sqlite),
                Err(TranslationError::Unsupported("~*"))
            );
        }
        assert_eq!(
            mysql("SELECT * FROM t WHERE name ~* $1"),
            "SELECT * FROM t WHERE name REGEXP ?"
        );
        assert_eq!(
            sqlite("SELECT * FROM t WHERE name ~ $1"),
            "SELECT * FROM t WHERE name GLOB ?1"
        );
    }

    #[test]
    fn placeholders_inside_literals_survive_translation() {
        assert_eq!(
            sqlite("SELECT '$1' AS label, $1 AS value"),
            "SELECT '$1' AS label, ?1 AS value"
        );
    }

    #[test]
    fn placeholder_only_pass_leaves_functions_alone() {
        let out = translate_placeholders("SELECT NOW() WHERE a = $1", Dialect::Sqlite).unwrap();
        assert_eq!(out.sql, "SELECT NOW() WHERE a = ?1");
    }
}
