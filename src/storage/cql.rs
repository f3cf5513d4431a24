//! Parser for the small CQL subset issued by the pipelines.
//!
//! Supported shapes:
//!
//! ```text
//! INSERT INTO table (col, ...) VALUES (?, ...)
//! SELECT col, ... | * FROM table [WHERE col op ? [AND col op ?]...] [ALLOW FILTERING]
//! ```
//!
//! `op` is one of `=`, `<`, `<=`, `>`, `>=`. Values are always bound through
//! `?` placeholders; literals are rejected. Unquoted identifiers are
//! case-insensitive and normalised to lowercase.

use super::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    pub fn holds(&self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Comparison::Eq => ordering == Equal,
            Comparison::Lt => ordering == Less,
            Comparison::Le => ordering != Greater,
            Comparison::Gt => ordering == Greater,
            Comparison::Ge => ordering != Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub column: String,
    pub comparison: Comparison,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    All,
    Columns(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Insert {
        table: String,
        columns: Vec<String>,
    },
    Select {
        table: String,
        projection: Projection,
        predicates: Vec<Predicate>,
    },
}

impl Statement {
    pub fn parse(cql: &str) -> Result<Self, StoreError> {
        let tokens = tokenize(cql)?;
        let mut parser = Parser { tokens, pos: 0, cql };
        let statement = match parser.next_keyword()?.as_str() {
            "insert" => parser.insert()?,
            "select" => parser.select()?,
            other => return Err(parser.unsupported(&format!("statement kind '{}'", other))),
        };
        parser.eat(&Token::Semicolon);
        if parser.pos != parser.tokens.len() {
            return Err(parser.unsupported("trailing tokens"));
        }
        Ok(statement)
    }

    pub fn table(&self) -> &str {
        match self {
            Statement::Insert { table, .. } | Statement::Select { table, .. } => table,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    LParen,
    RParen,
    Comma,
    Placeholder,
    Star,
    Semicolon,
    Op(Comparison),
}

fn tokenize(cql: &str) -> Result<Vec<Token>, StoreError> {
    let mut tokens = Vec::new();
    let mut chars = cql.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' | ')' | ',' | '?' | '*' | ';' | '=' => {
                chars.next();
                tokens.push(match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    ',' => Token::Comma,
                    '?' => Token::Placeholder,
                    '*' => Token::Star,
                    ';' => Token::Semicolon,
                    _ => Token::Op(Comparison::Eq),
                });
            }
            '<' | '>' => {
                chars.next();
                let inclusive = chars.next_if_eq(&'=').is_some();
                tokens.push(Token::Op(match (c, inclusive) {
                    ('<', false) => Comparison::Lt,
                    ('<', true) => Comparison::Le,
                    ('>', false) => Comparison::Gt,
                    _ => Comparison::Ge,
                }));
            }
            c if c.is_ascii_alphanumeric() || c == '_' => {
                let mut ident = String::new();
                while let Some(c) = chars.next_if(|c| c.is_ascii_alphanumeric() || *c == '_') {
                    ident.push(c.to_ascii_lowercase());
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(StoreError::Unsupported(format!(
                    "unexpected character '{}' in statement: {}",
                    other,
                    cql.trim()
                )))
            }
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    cql: &'a str,
}

impl Parser<'_> {
    fn unsupported(&self, what: &str) -> StoreError {
        StoreError::Unsupported(format!("{} in statement: {}", what, self.cql.trim()))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), StoreError> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.unsupported(&format!("expected {:?}", token)))
        }
    }

    fn next_keyword(&mut self) -> Result<String, StoreError> {
        self.ident()
    }

    fn keyword(&mut self, keyword: &str) -> Result<(), StoreError> {
        let found = self.ident()?;
        if found == keyword {
            Ok(())
        } else {
            Err(self.unsupported(&format!("expected '{}', found '{}'", keyword, found)))
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(found)) if found == keyword)
    }

    fn ident(&mut self) -> Result<String, StoreError> {
        match self.tokens.get(self.pos).cloned() {
            Some(Token::Ident(ident)) => {
                self.pos += 1;
                Ok(ident)
            }
            _ => Err(self.unsupported("expected identifier")),
        }
    }

    fn ident_list(&mut self) -> Result<Vec<String>, StoreError> {
        let mut idents = vec![self.ident()?];
        while self.eat(&Token::Comma) {
            idents.push(self.ident()?);
        }
        Ok(idents)
    }

    fn insert(&mut self) -> Result<Statement, StoreError> {
        self.keyword("into")?;
        let table = self.ident()?;

        self.expect(Token::LParen)?;
        let columns = self.ident_list()?;
        self.expect(Token::RParen)?;

        self.keyword("values")?;
        self.expect(Token::LParen)?;
        let mut placeholders = 0;
        loop {
            self.expect(Token::Placeholder)?;
            placeholders += 1;
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RParen)?;

        if placeholders != columns.len() {
            return Err(self.unsupported(&format!(
                "{} columns but {} placeholders",
                columns.len(),
                placeholders
            )));
        }

        Ok(Statement::Insert { table, columns })
    }

    fn select(&mut self) -> Result<Statement, StoreError> {
        let projection = if self.eat(&Token::Star) {
            Projection::All
        } else {
            Projection::Columns(self.ident_list()?)
        };

        self.keyword("from")?;
        let table = self.ident()?;

        let mut predicates = Vec::new();
        if self.peek_keyword("where") {
            self.pos += 1;
            loop {
                let column = self.ident()?;
                let comparison = match self.tokens.get(self.pos).cloned() {
                    Some(Token::Op(op)) => {
                        self.pos += 1;
                        op
                    }
                    _ => return Err(self.unsupported("expected comparison operator")),
                };
                self.expect(Token::Placeholder)?;
                predicates.push(Predicate { column, comparison });

                if self.peek_keyword("and") {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }

        if self.peek_keyword("allow") {
            self.pos += 1;
            self.keyword("filtering")?;
        }

        Ok(Statement::Select {
            table,
            projection,
            predicates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_insert() {
        let statement = Statement::parse(
            "INSERT INTO measurements (station_code, measurement_date, ts)\n VALUES (?, ?, ?)",
        )
        .unwrap();

        assert_eq!(
            statement,
            Statement::Insert {
                table: "measurements".to_string(),
                columns: vec![
                    "station_code".to_string(),
                    "measurement_date".to_string(),
                    "ts".to_string()
                ],
            }
        );
    }

    #[test]
    fn test_parse_select_with_range() {
        let statement = Statement::parse(
            "SELECT average_value, pollutant_code FROM measurements \
             WHERE station_code = ? AND measurement_date >= ? AND measurement_date <= ? ALLOW FILTERING;",
        )
        .unwrap();

        match statement {
            Statement::Select {
                table,
                projection,
                predicates,
            } => {
                assert_eq!(table, "measurements");
                assert_eq!(
                    projection,
                    Projection::Columns(vec![
                        "average_value".to_string(),
                        "pollutant_code".to_string()
                    ])
                );
                let ops: Vec<Comparison> = predicates.iter().map(|p| p.comparison).collect();
                assert_eq!(ops, vec![Comparison::Eq, Comparison::Ge, Comparison::Le]);
            }
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn test_parse_select_star_without_where() {
        let statement = Statement::parse("select * from stations").unwrap();
        assert_eq!(statement.table(), "stations");
        assert!(matches!(
            &statement,
            Statement::Select {
                projection: Projection::All,
                predicates,
                ..
            } if predicates.is_empty()
        ));
    }

    #[test]
    fn test_rejects_unsupported_statements() {
        assert!(Statement::parse("DELETE FROM stations").is_err());
        assert!(Statement::parse("INSERT INTO t (a, b) VALUES (?)").is_err());
        assert!(Statement::parse("SELECT a FROM t WHERE a = 5").is_err());
        assert!(Statement::parse("SELECT a FROM t extra").is_err());
    }
}
