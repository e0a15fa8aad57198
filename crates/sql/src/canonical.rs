use sqlbox_core::{Error, ExecutionInput, Result};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::tokenizer::{Location, Token, Tokenizer, Word};
use std::borrow::Cow;

/// SQLite's reserved and non-reserved keywords, sorted
///
/// Only these are uppercased. Anything else (`count`, `value`, `name`) may
/// end up in a result header and is copied as written.
const SQLITE_KEYWORDS: &[&str] = &[
    "ABORT", "ACTION", "ADD", "AFTER", "ALL", "ALTER", "ALWAYS", "ANALYZE", "AND", "AS", "ASC",
    "ATTACH", "AUTOINCREMENT", "BEFORE", "BEGIN", "BETWEEN", "BY", "CASCADE", "CASE", "CAST",
    "CHECK", "COLLATE", "COLUMN", "COMMIT", "CONFLICT", "CONSTRAINT", "CREATE", "CROSS",
    "CURRENT", "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "DATABASE", "DEFAULT",
    "DEFERRABLE", "DEFERRED", "DELETE", "DESC", "DETACH", "DISTINCT", "DO", "DROP", "EACH",
    "ELSE", "END", "ESCAPE", "EXCEPT", "EXCLUDE", "EXCLUSIVE", "EXISTS", "EXPLAIN", "FAIL",
    "FILTER", "FIRST", "FOLLOWING", "FOR", "FOREIGN", "FROM", "FULL", "GENERATED", "GLOB",
    "GROUP", "GROUPS", "HAVING", "IF", "IGNORE", "IMMEDIATE", "IN", "INDEX", "INDEXED",
    "INITIALLY", "INNER", "INSERT", "INSTEAD", "INTERSECT", "INTO", "IS", "ISNULL", "JOIN",
    "KEY", "LAST", "LEFT", "LIKE", "LIMIT", "MATCH", "MATERIALIZED", "NATURAL", "NO", "NOT",
    "NOTHING", "NOTNULL", "NULL", "NULLS", "OF", "OFFSET", "ON", "OR", "ORDER", "OTHERS",
    "OUTER", "OVER", "PARTITION", "PLAN", "PRAGMA", "PRECEDING", "PRIMARY", "QUERY", "RAISE",
    "RANGE", "RECURSIVE", "REFERENCES", "REGEXP", "REINDEX", "RELEASE", "RENAME", "REPLACE",
    "RESTRICT", "RETURNING", "RIGHT", "ROLLBACK", "ROW", "ROWS", "SAVEPOINT", "SELECT", "SET",
    "TABLE", "TEMP", "TEMPORARY", "THEN", "TIES", "TO", "TRANSACTION", "TRIGGER", "UNBOUNDED",
    "UNION", "UNIQUE", "UPDATE", "USING", "VACUUM", "VALUES", "VIEW", "VIRTUAL", "WHEN", "WHERE",
    "WINDOW", "WITH", "WITHOUT",
];

/// An unquoted word SQLite reads as a keyword
fn is_keyword(word: &Word) -> bool {
    word.quote_style.is_none()
        && SQLITE_KEYWORDS
            .binary_search(&word.value.to_ascii_uppercase().as_str())
            .is_ok()
}

/// Normalize raw query text into its canonical form
///
/// SQLite keywords are uppercased, comments dropped, whitespace collapsed to
/// single spaces (none inside parentheses, between a function name and its
/// `(`, before separators or around the period of a qualified name), empty
/// statements and the trailing `;` removed.
/// Multiple statements are joined with `"; "`. Literals and identifiers are
/// copied byte for byte.
///
/// The result is stable under re-normalization.
pub fn normalize(raw: &str) -> Result<String> {
    Ok(statements(raw)?.join("; "))
}

/// Normalize the query of an input; the init script is left untouched
pub fn normalize_input(input: &ExecutionInput) -> Result<ExecutionInput> {
    Ok(input.with_query(normalize(&input.query)?))
}

/// Split query text into individually executable, normalized statements
pub fn split_statements(raw: &str) -> Result<Vec<String>> {
    statements(raw)
}

/// A token together with the exact source text it was read from
struct Lexeme<'a> {
    token: Token,
    text: &'a str,
}

fn tokenize(raw: &str) -> Result<Vec<Lexeme<'_>>> {
    let dialect = SQLiteDialect {};
    let located = Tokenizer::new(&dialect, raw)
        .tokenize_with_location()
        .map_err(|e| {
            tracing::debug!(error = %e, "query could not be tokenized");
            Error::malformed_query(e.to_string())
        })?;

    let index = LineIndex::new(raw);
    let starts: Vec<usize> = located
        .iter()
        .map(|t| index.offset(&t.location))
        .collect();

    let mut lexemes = Vec::with_capacity(located.len());
    for (i, located) in located.into_iter().enumerate() {
        let start = starts[i];
        let end = starts.get(i + 1).copied().unwrap_or(raw.len()).max(start);
        lexemes.push(Lexeme {
            token: located.token,
            text: raw[start..end].trim_end(),
        });
    }
    Ok(lexemes)
}

/// Significant statements of `raw`, each rendered in canonical form
fn statements(raw: &str) -> Result<Vec<String>> {
    let source = blank_block_comments(raw);
    Ok(group_statements(tokenize(&source)?)
        .iter()
        .map(|s| render(s))
        .collect())
}

/// Significant lexemes grouped per statement, empty statements skipped
fn group_statements(lexemes: Vec<Lexeme<'_>>) -> Vec<Vec<Lexeme<'_>>> {
    let mut statements = Vec::new();
    let mut current = Vec::new();

    for lexeme in lexemes {
        match lexeme.token {
            Token::Whitespace(_) | Token::EOF => continue,
            Token::SemiColon => {
                if !current.is_empty() {
                    statements.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(lexeme),
        }
    }
    if !current.is_empty() {
        statements.push(current);
    }

    statements
}

/// Replace every `/* ... */` comment with spaces, keeping line breaks
///
/// SQLite block comments do not nest and may run to the end of the input;
/// the tokenizer nests them and rejects an unterminated one.
fn blank_block_comments(raw: &str) -> Cow<'_, str> {
    if !raw.contains("/*") {
        return Cow::Borrowed(raw);
    }

    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\'' | '"' | '`' | '[' => {
                let close = if ch == '[' { ']' } else { ch };
                out.push(ch);
                for inner in chars.by_ref() {
                    out.push(inner);
                    if inner == close {
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                out.push(ch);
                for inner in chars.by_ref() {
                    out.push(inner);
                    if inner == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str("  ");
                let mut prev = ' ';
                for inner in chars.by_ref() {
                    out.push(if inner == '\n' { '\n' } else { ' ' });
                    if prev == '*' && inner == '/' {
                        break;
                    }
                    prev = inner;
                }
            }
            _ => out.push(ch),
        }
    }
    Cow::Owned(out)
}

fn render(lexemes: &[Lexeme<'_>]) -> String {
    let mut out = String::new();
    let mut prev: Option<&Token> = None;

    for lexeme in lexemes {
        if let Some(prev) = prev {
            if needs_space(prev, &lexeme.token) {
                out.push(' ');
            }
        }
        match &lexeme.token {
            Token::Word(word) if is_keyword(word) => {
                out.push_str(&word.value.to_ascii_uppercase());
            }
            _ => out.push_str(lexeme.text),
        }
        prev = Some(&lexeme.token);
    }

    out
}

fn needs_space(prev: &Token, next: &Token) -> bool {
    match (prev, next) {
        (Token::LParen, _) => false,
        (_, Token::RParen | Token::Comma | Token::SemiColon) => false,
        // function call: `count(*)`, `"my fn"(x)`
        (Token::Word(word), Token::LParen) => is_keyword(word),
        // qualified names (`t.col`, `t.*`); a period next to a number keeps
        // its space so it cannot fuse into a decimal literal
        (Token::Word(_), Token::Period) => false,
        (Token::Period, Token::Word(_) | Token::Mul) => false,
        _ => true,
    }
}

/// Maps the tokenizer's 1-based line/column locations to byte offsets
struct LineIndex<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(source: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .char_indices()
                .filter(|(_, ch)| *ch == '\n')
                .map(|(i, _)| i + 1),
        );
        Self {
            source,
            line_starts,
        }
    }

    fn offset(&self, location: &Location) -> usize {
        let line = usize::try_from(location.line.saturating_sub(1)).unwrap_or(usize::MAX);
        let Some(&line_start) = self.line_starts.get(line) else {
            return self.source.len();
        };
        let column = usize::try_from(location.column.saturating_sub(1)).unwrap_or(usize::MAX);
        self.source[line_start..]
            .char_indices()
            .nth(column)
            .map_or(self.source.len(), |(i, _)| line_start + i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_table() {
        let cases = [
            ("SELECT * FROM table", "SELECT * FROM TABLE"),
            ("SELECT * FROM table WHERE uid = 1", "SELECT * FROM TABLE WHERE uid = 1"),
            ("SELECT * FROM table WHERE uid = 1;", "SELECT * FROM TABLE WHERE uid = 1"),
            (
                "SELECT * FROM table WHERE uid = 1; -- comment",
                "SELECT * FROM TABLE WHERE uid = 1",
            ),
            (
                "SELECT * FROM table WHERE uid = 1; -- comment\n",
                "SELECT * FROM TABLE WHERE uid = 1",
            ),
            (
                "SELECT *, aaa FROM table WHERE uid = 1; -- comment\n",
                "SELECT *, aaa FROM TABLE WHERE uid = 1",
            ),
            (
                "SELECT * FROM table;\nSELECT * FROM abc;",
                "SELECT * FROM TABLE; SELECT * FROM abc",
            ),
            ("SELECT *     FROM   table", "SELECT * FROM TABLE"),
            ("seLect * fRom table", "SELECT * FROM TABLE"),
        ];

        for (raw, expected) in cases {
            assert_eq!(normalize(raw).unwrap(), expected, "normalizing {raw:?}");
        }
    }

    #[test]
    fn test_case_comment_and_whitespace_insensitive() {
        assert_eq!(
            normalize("select * from t").unwrap(),
            normalize("SELECT   * FROM t -- c\n").unwrap()
        );
        assert_eq!(
            normalize("select /* block */ id from t").unwrap(),
            normalize("SELECT id\n\tFROM t").unwrap()
        );
    }

    #[test]
    fn test_parentheses_spacing() {
        assert_eq!(
            normalize("SELECT count( * ) FROM t WHERE uid IN ( 1 ,2 )").unwrap(),
            "SELECT count(*) FROM t WHERE uid IN (1, 2)"
        );
        assert_eq!(
            normalize("select \"my fn\" (x), coalesce (a, b) from t").unwrap(),
            "SELECT \"my fn\"(x), coalesce(a, b) FROM t"
        );
        assert_eq!(
            normalize("select t.id from t").unwrap(),
            normalize("SELECT t . id FROM t").unwrap()
        );
    }

    #[test]
    fn test_only_sqlite_keywords_are_uppercased() {
        assert_eq!(
            normalize("select name as value, type, date, status, user from t").unwrap(),
            "SELECT name AS value, type, date, status, user FROM t"
        );
        assert_eq!(
            normalize("select key from t order by key desc").unwrap(),
            "SELECT KEY FROM t ORDER BY KEY DESC"
        );
    }

    #[test]
    fn test_block_comments_do_not_nest() {
        assert_eq!(normalize("/* a /* b */ SELECT 1").unwrap(), "SELECT 1");
        assert_eq!(normalize("SELECT 1 /* runs to the end").unwrap(), "SELECT 1");
        assert_eq!(
            normalize("SELECT '/* kept */' -- /* also a comment\n").unwrap(),
            "SELECT '/* kept */'"
        );
        assert_eq!(
            normalize("SELECT \"a/*b\" /* x */ FROM t").unwrap(),
            "SELECT \"a/*b\" FROM t"
        );
    }

    #[test]
    fn test_literals_and_identifiers_are_significant() {
        assert_ne!(
            normalize("SELECT * FROM t WHERE name = 'Alice'").unwrap(),
            normalize("SELECT * FROM t WHERE name = 'alice'").unwrap()
        );
        assert_ne!(
            normalize("SELECT * FROM t WHERE uid = 1").unwrap(),
            normalize("SELECT * FROM t WHERE id = 2").unwrap()
        );
        assert_ne!(
            normalize("SELECT a FROM t").unwrap(),
            normalize("SELECT b FROM t").unwrap()
        );
    }

    #[test]
    fn test_string_literal_preserved() {
        assert_eq!(
            normalize("select 'it''s  -- not a comment'").unwrap(),
            "SELECT 'it''s  -- not a comment'"
        );
    }

    #[test]
    fn test_period_next_to_number_is_stable() {
        for raw in ["SELECT 1 .t", "SELECT t. 5", "SELECT . 5"] {
            if let Ok(once) = normalize(raw) {
                assert_eq!(normalize(&once).unwrap(), once, "re-normalizing {raw:?}");
            }
        }
    }

    #[test]
    fn test_quoted_identifier_preserved() {
        let normalized = normalize("SELECT \"select\" FROM \"my table\"").unwrap();
        assert_eq!(normalized, "SELECT \"select\" FROM \"my table\"");
        assert_eq!(normalize(&normalized).unwrap(), normalized);
    }

    #[test]
    fn test_empty_statements_dropped() {
        assert_eq!(normalize("SELECT 1;;").unwrap(), "SELECT 1");
        assert_eq!(normalize(";SELECT 1; ;SELECT 2;").unwrap(), "SELECT 1; SELECT 2");
        assert_eq!(normalize("-- only a comment").unwrap(), "");
        assert_eq!(normalize("").unwrap(), "");
    }

    #[test]
    fn test_malformed_query() {
        let err = normalize("SELECT * FROM test WHERE id = ':D)D)D))D)D)D)D)D;").unwrap_err();
        assert!(matches!(err, Error::MalformedQuery { .. }));
    }

    #[test]
    fn test_normalize_input_keeps_init() {
        let input =
            ExecutionInput::new("CREATE TABLE t (uid INTEGER); -- setup", "select uid from t;");
        let normalized = normalize_input(&input).unwrap();
        assert_eq!(normalized.init, input.init);
        assert_eq!(normalized.query, "SELECT uid FROM t");
    }

    #[test]
    fn test_split_statements() {
        let statements =
            split_statements("UPDATE t SET nick = 'x' WHERE uid = 1; select * from t;").unwrap();
        assert_eq!(
            statements,
            vec![
                "UPDATE t SET nick = 'x' WHERE uid = 1".to_string(),
                "SELECT * FROM t".to_string(),
            ]
        );
        assert!(split_statements("  -- nothing\n").unwrap().is_empty());
    }

    fn arb_fragment() -> impl Strategy<Value = &'static str> {
        prop::sample::select(vec![
            "select", "SELECT", "from", "FROM", "where", "t", "id", "name", "*", "(", ")",
            ",", ";", "=", "<", ">", "-", "+", "1", "42", "3.5", "'a b'", "'it''s'",
            "\"q\"", "-- note\n", "/* c */", ".", "count",
        ])
    }

    fn arb_separator() -> impl Strategy<Value = &'static str> {
        prop::sample::select(vec!["", " ", "   ", "\n", "\t"])
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(
            parts in prop::collection::vec((arb_fragment(), arb_separator()), 0..24)
        ) {
            let raw: String = parts.iter().map(|(f, s)| format!("{f}{s}")).collect();
            if let Ok(once) = normalize(&raw) {
                let twice = normalize(&once).unwrap();
                prop_assert_eq!(once, twice);
            }
        }

        #[test]
        fn prop_whitespace_runs_do_not_matter(
            parts in prop::collection::vec(arb_fragment(), 1..16)
        ) {
            let single = parts.join(" ");
            let spaced = parts.join("  \n ");
            if let (Ok(a), Ok(b)) = (normalize(&single), normalize(&spaced)) {
                prop_assert_eq!(a, b);
            }
        }
    }
}
