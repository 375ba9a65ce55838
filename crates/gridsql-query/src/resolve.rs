//! Macro resolution against the current row.
//!
//! A macro is a sigil followed by a name made of letters, digits and `_`:
//!
//! - `#name` reads the column `name` of the current row,
//! - `@name` reads the record field `name` (its database name),
//! - `#row`/`@row` and `#col`/`@col` expand to the current row and column indices.
//!
//! Resolution is a separate phase: filters and clauses are turned into
//! literal copies first and only those copies are rendered.

use gridsql_core::error::{MacroError, MacroErrorKind};
use gridsql_core::{Error, Result, Row, Value};

use crate::filter::Filter;

/// Read access to the row a macro refers to.
pub trait RowAccessor {
    /// Index of the current row, if the accessor has one.
    fn row_index(&self) -> Option<usize>;

    /// Index of the current column, if the accessor has one.
    fn col_index(&self) -> Option<usize>;

    /// Value of a displayed column.
    fn column_value(&self, name: &str) -> Option<Value>;

    /// Value of a record field by its database name.
    fn field_value(&self, name: &str) -> Option<Value>;
}

/// A bare row: columns and fields are the same thing and there is no position.
impl RowAccessor for Row {
    fn row_index(&self) -> Option<usize> {
        None
    }

    fn col_index(&self) -> Option<usize> {
        None
    }

    fn column_value(&self, name: &str) -> Option<Value> {
        self.get_by_name(name).cloned()
    }

    fn field_value(&self, name: &str) -> Option<Value> {
        self.get_by_name(name).cloned()
    }
}

/// A row positioned inside a result set.
#[derive(Debug, Clone, Copy)]
pub struct CurrentRow<'a> {
    pub row: &'a Row,
    pub row_index: usize,
    pub col_index: usize,
}

impl RowAccessor for CurrentRow<'_> {
    fn row_index(&self) -> Option<usize> {
        Some(self.row_index)
    }

    fn col_index(&self) -> Option<usize> {
        Some(self.col_index)
    }

    fn column_value(&self, name: &str) -> Option<Value> {
        self.row.column_value(name)
    }

    fn field_value(&self, name: &str) -> Option<Value> {
        self.row.field_value(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sigil {
    Column,
    Field,
}

impl Sigil {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '#' => Some(Sigil::Column),
            '@' => Some(Sigil::Field),
            _ => None,
        }
    }

    const fn as_char(self) -> char {
        match self {
            Sigil::Column => '#',
            Sigil::Field => '@',
        }
    }
}

enum Token<'a> {
    Literal(&'a str),
    Macro(Sigil, &'a str),
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut literal_start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let Some(sigil) = Sigil::from_char(c) else {
            continue;
        };
        if literal_start < i {
            tokens.push(Token::Literal(&text[literal_start..i]));
        }
        let name_start = i + c.len_utf8();
        let mut name_end = name_start;
        while let Some(&(j, n)) = chars.peek() {
            if !is_name_char(n) {
                break;
            }
            name_end = j + n.len_utf8();
            chars.next();
        }
        tokens.push(Token::Macro(sigil, &text[name_start..name_end]));
        literal_start = name_end;
    }
    if literal_start < text.len() {
        tokens.push(Token::Literal(&text[literal_start..]));
    }
    tokens
}

fn missing(kind: MacroErrorKind, sigil: Sigil, name: &str) -> Error {
    let message = match kind {
        MacroErrorKind::MissingColumn if name.is_empty() => {
            format!("empty macro name after '{}'", sigil.as_char())
        }
        MacroErrorKind::MissingColumn => {
            format!("macro {}{name} names no column or field", sigil.as_char())
        }
        MacroErrorKind::MissingRow => {
            format!("macro {}{name} needs a current row", sigil.as_char())
        }
    };
    Error::Macro(MacroError {
        kind,
        name: name.to_string(),
        message,
    })
}

/// Expands `#`/`@` macros.
#[derive(Debug, Clone, Copy, Default)]
pub struct MacroResolver {
    /// Quote non-numeric substitutions as SQL string literals.
    pub quote: bool,
}

impl MacroResolver {
    pub const fn new(quote: bool) -> Self {
        Self { quote }
    }

    /// Resolve a single macro to its value.
    fn lookup(sigil: Sigil, name: &str, row: &dyn RowAccessor) -> Result<Value> {
        let index = match name {
            "row" => Some(row.row_index()),
            "col" => Some(row.col_index()),
            _ => None,
        };
        if let Some(index) = index {
            let index = index.ok_or_else(|| missing(MacroErrorKind::MissingRow, sigil, name))?;
            return Ok(Value::BigInt(i64::try_from(index).unwrap_or(i64::MAX)));
        }
        if name.is_empty() {
            return Err(missing(MacroErrorKind::MissingColumn, sigil, name));
        }
        let value = match sigil {
            Sigil::Column => row.column_value(name),
            Sigil::Field => row.field_value(name),
        };
        value.ok_or_else(|| missing(MacroErrorKind::MissingColumn, sigil, name))
    }

    fn splice(&self, value: &Value) -> String {
        if self.quote && !value.is_numeric() && !value.is_null() {
            format!("'{}'", value.to_string().replace('\'', "''"))
        } else {
            value.to_string()
        }
    }

    /// Expand every macro in `text`.
    ///
    /// `#` macros are resolved before `@` macros; substituted text is
    /// never scanned again.
    pub fn resolve_text(&self, text: &str, row: &dyn RowAccessor) -> Result<String> {
        let tokens = tokenize(text);
        let mut resolved: Vec<Option<String>> = vec![None; tokens.len()];
        for pass in [Sigil::Column, Sigil::Field] {
            for (slot, token) in resolved.iter_mut().zip(&tokens) {
                if let Token::Macro(sigil, name) = token {
                    if *sigil == pass {
                        *slot = Some(self.splice(&Self::lookup(*sigil, name, row)?));
                    }
                }
            }
        }
        let mut out = String::with_capacity(text.len());
        for (token, value) in tokens.iter().zip(resolved) {
            match (token, value) {
                (_, Some(value)) => out.push_str(&value),
                (Token::Literal(lit), None) => out.push_str(lit),
                (Token::Macro(..), None) => {}
            }
        }
        Ok(out)
    }

    /// Resolve a predicate value.
    ///
    /// Text that is exactly one macro becomes the referenced value with its
    /// type intact; text with embedded macros is expanded without quoting.
    pub fn resolve_value(&self, value: &Value, row: &dyn RowAccessor) -> Result<Value> {
        match value {
            Value::Text(text) => {
                let trimmed = text.trim();
                let tokens = tokenize(trimmed);
                match tokens.as_slice() {
                    [Token::Macro(sigil, name)] => Self::lookup(*sigil, name, row),
                    _ if tokens.iter().any(|t| matches!(t, Token::Macro(..))) => Ok(Value::Text(
                        MacroResolver::new(false).resolve_text(text, row)?,
                    )),
                    _ => Ok(value.clone()),
                }
            }
            Value::Array(items) => Ok(Value::Array(
                items
                    .iter()
                    .map(|v| self.resolve_value(v, row))
                    .collect::<Result<_>>()?,
            )),
            other => Ok(other.clone()),
        }
    }

    /// Produce a literal copy of `filter` with every macro resolved.
    pub fn resolve_filter(&self, filter: &Filter, row: &dyn RowAccessor) -> Result<Filter> {
        let mut out = filter.clone();
        for p in &mut out.predicates {
            p.value = self.resolve_value(&p.value, row)?;
        }
        for b in &mut out.between {
            b.low = self.resolve_value(&b.low, row)?;
            b.high = self.resolve_value(&b.high, row)?;
        }
        for stmt in &mut out.free_where {
            *stmt = self.resolve_text(stmt, row)?;
        }
        for a in out.updates.iter_mut().chain(out.inserts.iter_mut()) {
            a.value = self.resolve_value(&a.value, row)?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::DialectKind;
    use crate::filter::Operator;
    use crate::kind::ValueKind;

    fn row() -> Row {
        Row::new(
            vec!["id".into(), "name".into(), "tag".into()],
            vec![Value::BigInt(42), Value::Text("O'Hara".into()), Value::Text("@id".into())],
        )
    }

    #[test]
    fn test_resolve_text_quoting() {
        let r = row();
        let quoted = MacroResolver::new(true);
        assert_eq!(
            quoted.resolve_text("id=#id AND name=@name", &r).unwrap(),
            "id=42 AND name='O''Hara'"
        );
        let plain = MacroResolver::new(false);
        assert_eq!(plain.resolve_text("#name!", &r).unwrap(), "O'Hara!");
    }

    #[test]
    fn test_substitutions_are_not_rescanned() {
        let r = row();
        let out = MacroResolver::new(false).resolve_text("#tag", &r).unwrap();
        assert_eq!(out, "@id");
    }

    #[test]
    fn test_row_and_col_indices() {
        let r = row();
        let at = CurrentRow {
            row: &r,
            row_index: 3,
            col_index: 1,
        };
        let out = MacroResolver::new(true).resolve_text("#row/@col", &at).unwrap();
        assert_eq!(out, "3/1");
        match MacroResolver::new(true).resolve_text("#row", &r) {
            Err(Error::Macro(e)) => assert_eq!(e.kind, MacroErrorKind::MissingRow),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_and_empty_names() {
        let r = row();
        for text in ["#nope", "a # b"] {
            match MacroResolver::new(false).resolve_text(text, &r) {
                Err(Error::Macro(e)) => assert_eq!(e.kind, MacroErrorKind::MissingColumn),
                other => panic!("unexpected for {text}: {other:?}"),
            }
        }
    }

    #[test]
    fn test_resolve_filter_is_literal() {
        let r = row();
        let mut f = Filter::new();
        f.add_where("parent_id", Operator::Equal, "#id", ValueKind::Integer)
            .unwrap()
            .add_where("label", Operator::Equal, "@name", ValueKind::String)
            .unwrap();
        f.add_free_where("owner = @name");
        let resolved = MacroResolver::new(true).resolve_filter(&f, &r).unwrap();
        assert_eq!(resolved.predicates[0].value, Value::BigInt(42));
        let sql = resolved
            .render_where(DialectKind::Postgres.dialect(), false)
            .unwrap()
            .unwrap();
        assert_eq!(
            sql,
            "parent_id=42 AND label='O''Hara' AND (owner = 'O''Hara')"
        );
        // the source filter keeps its macros
        assert_eq!(f.predicates[0].value, Value::Text("#id".into()));
    }

    #[test]
    fn test_macro_resolved_to_null_drops_predicate() {
        let r = Row::new(vec!["parent".into()], vec![Value::Null]);
        let mut f = Filter::new();
        f.add_where("parent_id", Operator::Equal, "#parent", ValueKind::Integer)
            .unwrap();
        let resolved = MacroResolver::new(true).resolve_filter(&f, &r).unwrap();
        assert_eq!(resolved.predicates[0].value, Value::Null);
        let sql = resolved
            .render_where(DialectKind::Postgres.dialect(), false)
            .unwrap();
        assert_eq!(sql, None);
    }
}
