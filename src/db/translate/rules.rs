use once_cell::sync::Lazy;
use regex::{Captures, Regex};

// Rewrites run over authored SQL only; user data always arrives as bound
// parameters, so literals seen here are format strings and interval specs.

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| panic!("invalid rewrite pattern {pattern}: {err}"))
}

static CAST: Lazy<Regex> = Lazy::new(|| {
    re(r"(?i)::\s*(?:double\s+precision|timestamp\s+with(?:out)?\s+time\s+zone|[a-z_][a-z0-9_]*(?:\s*\(\s*\d+(?:\s*,\s*\d+)?\s*\))?)(?:\[\])?")
});
static NOW: Lazy<Regex> = Lazy::new(|| re(r"(?i)\bNOW\s*\(\s*\)"));
static TIMESTAMP_INTERVAL: Lazy<Regex> = Lazy::new(|| {
    re(r"(?i)(?:datetime\('now'\)|\bCURRENT_TIMESTAMP\b)\s*([+-])\s*INTERVAL\s*'\s*(\d+)\s*([a-z]+)\s*'")
});
static DATE_INTERVAL: Lazy<Regex> = Lazy::new(|| {
    re(r"(?i)\bCURRENT_DATE\b\s*([+-])\s*INTERVAL\s*'\s*(\d+)\s*([a-z]+)\s*'")
});
static QUOTED_INTERVAL: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)\bINTERVAL\s*'\s*(\d+)\s*([a-z]+?)s?\s*'"));
static DATE_TRUNC: Lazy<Regex> = Lazy::new(|| {
    re(r"(?i)\bDATE_TRUNC\s*\(\s*'(\w+)'\s*,\s*((?:[^()]|\([^()]*\))+?)\s*\)")
});
static TO_CHAR: Lazy<Regex> = Lazy::new(|| {
    re(r"(?i)\bTO_CHAR\s*\(\s*((?:[^()]|\([^()]*\))+?)\s*,\s*'([^']*)'\s*\)")
});
static EXTRACT: Lazy<Regex> = Lazy::new(|| {
    re(r"(?i)\bEXTRACT\s*\(\s*(\w+)\s+FROM\s+((?:[^()]|\([^()]*\))+?)\s*\)")
});
static CONFLICT_DO_NOTHING: Lazy<Regex> = Lazy::new(|| {
    re(r"(?is)\s*\bON\s+CONFLICT\b(?:\s*\([^)]*\))?\s*DO\s+NOTHING\b")
});
static CONFLICT_DO_UPDATE: Lazy<Regex> = Lazy::new(|| {
    re(r"(?is)\bON\s+CONFLICT\b(?:\s*\([^)]*\))?\s*DO\s+UPDATE\s+SET\b")
});
static EXCLUDED_COLUMN: Lazy<Regex> = Lazy::new(|| re(r"(?i)\bEXCLUDED\.(\w+)"));
static INSERT_INTO: Lazy<Regex> = Lazy::new(|| re(r"(?i)\bINSERT\s+INTO\b"));
static ILIKE: Lazy<Regex> = Lazy::new(|| re(r"(?i)\bILIKE\b"));
static SIMILAR_TO: Lazy<Regex> = Lazy::new(|| re(r"(?i)\bSIMILAR\s+TO\b"));
static NOT_REGEX_MATCH: Lazy<Regex> = Lazy::new(|| re(r"\s!~\*?\s"));
static REGEX_MATCH: Lazy<Regex> = Lazy::new(|| re(r"\s~\*?\s"));
static CASE_INSENSITIVE_REGEX: Lazy<Regex> = Lazy::new(|| re(r"\s!?~\*\s"));
static DISTINCT_ON: Lazy<Regex> = Lazy::new(|| re(r"(?i)\bDISTINCT\s+ON\s*\([^)]*\)"));
static GREATEST: Lazy<Regex> = Lazy::new(|| re(r"(?i)\bGREATEST\s*\("));
static LEAST: Lazy<Regex> = Lazy::new(|| re(r"(?i)\bLEAST\s*\("));
static BOOL_OR: Lazy<Regex> = Lazy::new(|| re(r"(?i)\bBOOL_OR\s*\("));
static BOOL_AND: Lazy<Regex> = Lazy::new(|| re(r"(?i)\bBOOL_AND\s*\("));
static STRING_AGG_OPEN: Lazy<Regex> = Lazy::new(|| re(r"(?i)\bSTRING_AGG\s*\("));
static STRING_AGG_CALL: Lazy<Regex> = Lazy::new(|| {
    re(r"(?i)\bSTRING_AGG\s*\(\s*((?:[^()]|\([^()]*\))+?)\s*,\s*('[^']*')\s*\)")
});
static UNNEST: Lazy<Regex> = Lazy::new(|| re(r"(?i)\bUNNEST\s*\("));

const SQLITE_FORMAT: &[(&str, &str)] = &[
    ("YYYY", "%Y"),
    ("HH24", "%H"),
    ("MM", "%m"),
    ("MI", "%M"),
    ("DD", "%d"),
    ("SS", "%S"),
];

const MYSQL_FORMAT: &[(&str, &str)] = &[
    ("YYYY", "%Y"),
    ("HH24", "%H"),
    ("MM", "%m"),
    ("MI", "%i"),
    ("DD", "%d"),
    ("SS", "%s"),
];

fn replace<F>(sql: String, pattern: &Regex, rep: F) -> String
where
    F: FnMut(&Captures) -> String,
{
    pattern.replace_all(&sql, rep).into_owned()
}

fn replace_str(sql: String, pattern: &Regex, rep: &str) -> String {
    pattern.replace_all(&sql, rep).into_owned()
}

pub(super) fn uses_unnest(sql: &str) -> bool {
    UNNEST.is_match(sql)
}

/// `~*` and `!~*` have no case-insensitive counterpart in SQLite's `GLOB`.
pub(super) fn uses_case_insensitive_regex(sql: &str) -> bool {
    CASE_INSENSITIVE_REGEX.is_match(sql)
}

/// Converts a Postgres `TO_CHAR` picture into a strftime style format.
pub(super) fn convert_format(picture: &str, table: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(picture.len());
    let mut rest = picture;
    'outer: while !rest.is_empty() {
        for (token, replacement) in table {
            if rest.starts_with(token) {
                out.push_str(replacement);
                rest = &rest[token.len()..];
                continue 'outer;
            }
        }
        let ch = rest.chars().next().unwrap_or_default();
        out.push(ch);
        rest = &rest[ch.len_utf8()..];
    }
    out
}

fn strip_casts(sql: String) -> String {
    replace_str(sql, &CAST, "")
}

fn sqlite_interval_modifier(sign: &str, amount: &str, unit: &str) -> String {
    let unit = unit.to_ascii_lowercase();
    let unit = unit.trim_end_matches('s');
    if unit == "week" {
        let days = amount.parse::<u64>().unwrap_or(0) * 7;
        return format!("{sign}{days} days");
    }
    format!("{sign}{amount} {unit}s")
}

fn sqlite_date_trunc(caps: &Captures) -> String {
    let expr = &caps[2];
    match caps[1].to_ascii_lowercase().as_str() {
        "day" => format!("date({expr})"),
        "week" => format!("date({expr}, '-6 days', 'weekday 1')"),
        "month" => format!("date({expr}, 'start of month')"),
        "year" => format!("date({expr}, 'start of year')"),
        "hour" => format!("strftime('%Y-%m-%d %H:00:00', {expr})"),
        _ => caps[0].to_string(),
    }
}

fn sqlite_extract(caps: &Captures) -> String {
    let expr = &caps[2];
    let field = match caps[1].to_ascii_lowercase().as_str() {
        "year" => "%Y",
        "month" => "%m",
        "day" => "%d",
        "hour" => "%H",
        "minute" => "%M",
        "second" => "%S",
        "dow" => "%w",
        "doy" => "%j",
        "epoch" => "%s",
        _ => return caps[0].to_string(),
    };
    format!("CAST(strftime('{field}', {expr}) AS INTEGER)")
}

fn insert_or(sql: String, conflict: &Regex, keyword: &str) -> String {
    if !conflict.is_match(&sql) {
        return sql;
    }
    let sql = replace_str(sql, conflict, "");
    INSERT_INTO.replace(&sql, keyword).into_owned()
}

pub(super) fn to_sqlite(sql: &str) -> String {
    let mut sql = strip_casts(sql.to_string());
    sql = replace_str(sql, &NOW, "datetime('now')");
    sql = replace(sql, &TIMESTAMP_INTERVAL, |caps| {
        format!(
            "datetime('now', '{}')",
            sqlite_interval_modifier(&caps[1], &caps[2], &caps[3])
        )
    });
    sql = replace(sql, &DATE_INTERVAL, |caps| {
        format!(
            "date('now', '{}')",
            sqlite_interval_modifier(&caps[1], &caps[2], &caps[3])
        )
    });
    sql = replace(sql, &DATE_TRUNC, sqlite_date_trunc);
    sql = replace(sql, &TO_CHAR, |caps| {
        format!(
            "strftime('{}', {})",
            convert_format(&caps[2], SQLITE_FORMAT),
            &caps[1]
        )
    });
    sql = replace(sql, &EXTRACT, sqlite_extract);
    sql = insert_or(sql, &CONFLICT_DO_NOTHING, "INSERT OR IGNORE INTO");
    sql = replace_str(sql, &ILIKE, "LIKE");
    sql = replace_str(sql, &SIMILAR_TO, "LIKE");
    sql = replace_str(sql, &NOT_REGEX_MATCH, " NOT GLOB ");
    sql = replace_str(sql, &REGEX_MATCH, " GLOB ");
    sql = replace_str(sql, &DISTINCT_ON, "DISTINCT");
    sql = replace_str(sql, &GREATEST, "MAX(");
    sql = replace_str(sql, &LEAST, "MIN(");
    sql = replace_str(sql, &BOOL_OR, "MAX(");
    sql = replace_str(sql, &BOOL_AND, "MIN(");
    replace_str(sql, &STRING_AGG_OPEN, "GROUP_CONCAT(")
}

fn mysql_date_trunc(caps: &Captures) -> String {
    let expr = &caps[2];
    match caps[1].to_ascii_lowercase().as_str() {
        "day" => format!("DATE({expr})"),
        "week" => format!("DATE(DATE_SUB({expr}, INTERVAL WEEKDAY({expr}) DAY))"),
        "month" => format!("DATE_FORMAT({expr}, '%Y-%m-01')"),
        "year" => format!("DATE_FORMAT({expr}, '%Y-01-01')"),
        "hour" => format!("DATE_FORMAT({expr}, '%Y-%m-%d %H:00:00')"),
        _ => caps[0].to_string(),
    }
}

fn mysql_extract(caps: &Captures) -> String {
    let expr = &caps[2];
    match caps[1].to_ascii_lowercase().as_str() {
        "dow" => format!("(DAYOFWEEK({expr}) - 1)"),
        "doy" => format!("DAYOFYEAR({expr})"),
        "epoch" => format!("UNIX_TIMESTAMP({expr})"),
        _ => caps[0].to_string(),
    }
}

pub(super) fn to_mysql(sql: &str) -> String {
    let mut sql = strip_casts(sql.to_string());
    sql = replace(sql, &QUOTED_INTERVAL, |caps| {
        format!("INTERVAL {} {}", &caps[1], caps[2].to_ascii_uppercase())
    });
    sql = replace(sql, &DATE_TRUNC, mysql_date_trunc);
    sql = replace(sql, &TO_CHAR, |caps| {
        format!(
            "DATE_FORMAT({}, '{}')",
            &caps[1],
            convert_format(&caps[2], MYSQL_FORMAT)
        )
    });
    sql = replace(sql, &EXTRACT, mysql_extract);
    sql = insert_or(sql, &CONFLICT_DO_NOTHING, "INSERT IGNORE INTO");
    if CONFLICT_DO_UPDATE.is_match(&sql) {
        sql = replace_str(sql, &CONFLICT_DO_UPDATE, "ON DUPLICATE KEY UPDATE");
        sql = replace_str(sql, &EXCLUDED_COLUMN, "VALUES($1)");
    }
    sql = replace_str(sql, &ILIKE, "LIKE");
    sql = replace_str(sql, &SIMILAR_TO, "LIKE");
    sql = replace_str(sql, &NOT_REGEX_MATCH, " NOT REGEXP ");
    sql = replace_str(sql, &REGEX_MATCH, " REGEXP ");
    sql = replace_str(sql, &DISTINCT_ON, "DISTINCT");
    sql = replace_str(sql, &BOOL_OR, "MAX(");
    sql = replace_str(sql, &BOOL_AND, "MIN(");
    replace(sql, &STRING_AGG_CALL, |caps| {
        format!("GROUP_CONCAT({} SEPARATOR {})", &caps[1], &caps[2])
    })
}
