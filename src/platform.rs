//! Identifier and value quoting per SQL dialect.
//!
//! [`Platform`] is pure string manipulation. Borrowing a live [`Connection`]
//! through [`Platform::with_connection`] lets value quoting use the native
//! escaping primitive instead of the generic fallback.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{NoExpand, Regex};

use crate::connection::Connection;
use crate::types::Backend;

static BACKTICK: LazyLock<Regex> = LazyLock::new(|| Regex::new("`").expect("valid pattern"));
static CLOSE_BRACKET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\]").expect("valid pattern"));
static DOUBLE_QUOTE: LazyLock<Regex> = LazyLock::new(|| Regex::new("\"").expect("valid pattern"));

/// Identifier characters and runs of everything else, in order.
static FRAGMENT_TOKENS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9A-Za-z$#_:]+|[^0-9A-Za-z$#_:]+").expect("valid pattern")
});

/// Quoting rules of one SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// Backtick identifiers.
    Mysql,
    /// Bracketed identifiers.
    SqlServer,
    Postgres,
    Sqlite,
    /// Plain ANSI double-quoted identifiers.
    Sql92,
}

impl Dialect {
    #[must_use]
    pub fn for_backend(backend: &Backend) -> Self {
        match backend {
            Backend::Mysql => Dialect::Mysql,
            Backend::Sqlsrv | Backend::Dblib => Dialect::SqlServer,
            Backend::Pgsql => Dialect::Postgres,
            Backend::Sqlite => Dialect::Sqlite,
            Backend::Other(_) => Dialect::Sql92,
        }
    }

    fn delimiters(self) -> (&'static str, &'static str) {
        match self {
            Dialect::Mysql => ("`", "`"),
            Dialect::SqlServer => ("[", "]"),
            Dialect::Postgres | Dialect::Sqlite | Dialect::Sql92 => ("\"", "\""),
        }
    }

    fn escape_pattern(self) -> (&'static Regex, &'static str) {
        match self {
            Dialect::Mysql => (&*BACKTICK, "``"),
            Dialect::SqlServer => (&*CLOSE_BRACKET, "]]"),
            Dialect::Postgres | Dialect::Sqlite | Dialect::Sql92 => (&*DOUBLE_QUOTE, "\"\""),
        }
    }
}

/// Stateless dialect descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    dialect: Dialect,
}

impl Platform {
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    #[must_use]
    pub fn for_backend(backend: &Backend) -> Self {
        Self::new(Dialect::for_backend(backend))
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self.dialect {
            Dialect::Mysql => "MySQL",
            Dialect::SqlServer => "SQLServer",
            Dialect::Postgres => "PostgreSQL",
            Dialect::Sqlite => "SQLite",
            Dialect::Sql92 => "SQL92",
        }
    }

    /// Opening and closing identifier delimiters.
    #[must_use]
    pub fn quote_identifier_symbol(&self) -> (&'static str, &'static str) {
        self.dialect.delimiters()
    }

    #[must_use]
    pub fn quote_value_symbol(&self) -> &'static str {
        "'"
    }

    #[must_use]
    pub fn identifier_separator(&self) -> &'static str {
        "."
    }

    /// Wrap one identifier in delimiters, doubling any embedded closing delimiter.
    #[must_use]
    pub fn quote_identifier(&self, identifier: &str) -> String {
        let (open, close) = self.dialect.delimiters();
        let (pattern, replacement) = self.dialect.escape_pattern();
        let escaped = pattern.replace_all(identifier, NoExpand(replacement));
        format!("{open}{escaped}{close}")
    }

    /// Quote every part and join them with the identifier separator.
    ///
    /// ```rust
    /// use sql_adapter::platform::{Dialect, Platform};
    ///
    /// let platform = Platform::new(Dialect::Mysql);
    /// assert_eq!(platform.quote_identifier_chain(["a`b", "c"]), "`a``b`.`c`");
    /// ```
    #[must_use]
    pub fn quote_identifier_chain<I, S>(&self, parts: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        parts
            .into_iter()
            .map(|part| self.quote_identifier(part.as_ref()))
            .collect::<Vec<_>>()
            .join(self.identifier_separator())
    }

    /// Quote the identifiers inside a fragment such as `t.col as alias`.
    ///
    /// Separators, `*` and the keyword `as` stay as written, and so do the
    /// caller's `safe_words` (compared case-insensitively).
    #[must_use]
    pub fn quote_identifier_in_fragment(&self, fragment: &str, safe_words: &[&str]) -> String {
        FRAGMENT_TOKENS
            .find_iter(fragment)
            .map(|token| {
                let token = token.as_str();
                let is_word = token
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '$' | '#' | '_' | ':'));
                let keep = !is_word
                    || token.eq_ignore_ascii_case("as")
                    || safe_words.iter().any(|w| w.eq_ignore_ascii_case(token));
                if keep {
                    Cow::Borrowed(token)
                } else {
                    Cow::Owned(self.quote_identifier(token))
                }
            })
            .collect()
    }

    /// Quote a value without a connection: generic backslash escaping, with a
    /// warning because it is not safe against every backend's string syntax.
    #[must_use]
    pub fn quote_value(&self, value: &str) -> String {
        tracing::warn!(
            platform = self.name(),
            "quoting a value without a driver escaping primitive is not safe"
        );
        self.quote_trusted_value(value)
    }

    /// Same quoting as [`quote_value`](Self::quote_value) for values the caller vouches for.
    #[must_use]
    pub fn quote_trusted_value(&self, value: &str) -> String {
        format!("'{}'", generic_escape(value))
    }

    /// Comma-joined quoted values.
    #[must_use]
    pub fn quote_value_list<I, S>(&self, values: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        values
            .into_iter()
            .map(|v| self.quote_value(v.as_ref()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Borrow a connection so value quoting can use its native escaping.
    #[must_use]
    pub fn with_connection<'c>(&self, connection: &'c Connection) -> ConnectedPlatform<'c> {
        ConnectedPlatform {
            platform: *self,
            connection,
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::new(Dialect::Sql92)
    }
}

/// A [`Platform`] with a non-owning reference to a connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectedPlatform<'c> {
    platform: Platform,
    connection: &'c Connection,
}

impl ConnectedPlatform<'_> {
    #[must_use]
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// `'` + native escape + `'` when the connection offers one, otherwise the
    /// generic fallback with its warning.
    #[must_use]
    pub fn quote_value(&self, value: &str) -> String {
        match self.connection.escape_string(value) {
            Some(escaped) => format!("'{escaped}'"),
            None => self.platform.quote_value(value),
        }
    }

    #[must_use]
    pub fn quote_trusted_value(&self, value: &str) -> String {
        match self.connection.escape_string(value) {
            Some(escaped) => format!("'{escaped}'"),
            None => self.platform.quote_trusted_value(value),
        }
    }

    #[must_use]
    pub fn quote_value_list<I, S>(&self, values: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        values
            .into_iter()
            .map(|v| self.quote_value(v.as_ref()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    #[must_use]
    pub fn quote_identifier_chain<I, S>(&self, parts: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.platform.quote_identifier_chain(parts)
    }
}

fn generic_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '\0' => out.push_str("\\000"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\x1a' => out.push_str("\\032"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_per_dialect() {
        assert_eq!(
            Platform::new(Dialect::Mysql).quote_identifier("a`b"),
            "`a``b`"
        );
        assert_eq!(
            Platform::new(Dialect::SqlServer).quote_identifier("a]b"),
            "[a]]b]"
        );
        assert_eq!(
            Platform::new(Dialect::Postgres).quote_identifier("a\"b"),
            "\"a\"\"b\""
        );
        assert_eq!(
            Platform::new(Dialect::Sqlite).quote_identifier("t"),
            "\"t\""
        );
    }

    #[test]
    fn chains_are_never_partial() {
        let platform = Platform::new(Dialect::SqlServer);
        assert_eq!(
            platform.quote_identifier_chain(["dbo", "users"]),
            "[dbo].[users]"
        );
        assert_eq!(platform.quote_identifier_chain(Vec::<String>::new()), "");
    }

    #[test]
    fn fragments_keep_keywords_and_safe_words() {
        let platform = Platform::new(Dialect::Postgres);
        assert_eq!(
            platform.quote_identifier_in_fragment("t.col AS alias", &[]),
            "\"t\".\"col\" AS \"alias\""
        );
        assert_eq!(platform.quote_identifier_in_fragment("t.*", &[]), "\"t\".*");
        assert_eq!(
            platform.quote_identifier_in_fragment("count(id)", &["COUNT"]),
            "count(\"id\")"
        );
    }

    #[test]
    fn generic_value_quoting_escapes_control_characters() {
        let platform = Platform::new(Dialect::Mysql);
        assert_eq!(platform.quote_trusted_value("it's"), r"'it\'s'");
        assert_eq!(
            platform.quote_value("a\"b\\c\nd\0\x1a"),
            r#"'a\"b\\c\nd\000\032'"#
        );
        assert_eq!(platform.quote_value_list(["a", "b"]), "'a', 'b'");
    }

    #[test]
    fn backend_selects_dialect() {
        assert_eq!(Platform::for_backend(&Backend::Dblib).name(), "SQLServer");
        assert_eq!(
            Platform::for_backend(&Backend::Other("odbc".into())).name(),
            "SQL92"
        );
        assert_eq!(Platform::default().quote_identifier_symbol(), ("\"", "\""));
    }
}
