use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;

use crate::binder::Slot;
use crate::error::CrudMiddlewareError;
use crate::placeholders::{ParsedExpr, Piece, Placeholder};
use crate::protocol::ShapeDescriptor;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Check a table or column name before it is spliced into statement text.
///
/// # Errors
/// Returns `ValidationError` for anything but a plain identifier.
pub fn validate_identifier(name: &str) -> Result<(), CrudMiddlewareError> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(CrudMiddlewareError::ValidationError(format!(
            "`{name}` is not a valid identifier"
        )))
    }
}

/// Statement text plus the source of every numbered slot in it.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedStatement {
    pub descriptor: ShapeDescriptor,
    pub slots: Vec<Slot>,
}

/// Accumulates statement text and assigns `$N` slots.
///
/// A named placeholder gets one slot no matter how often it appears; each `?` gets its own.
#[derive(Debug, Default)]
pub(crate) struct SqlWriter {
    sql: String,
    slots: Vec<Slot>,
    named: HashMap<String, usize>,
    params: usize,
}

impl SqlWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, text: &str) -> &mut Self {
        self.sql.push_str(text);
        self
    }

    pub(crate) fn push_slot(&mut self, slot: Slot) -> &mut Self {
        self.slots.push(slot);
        let number = self.slots.len();
        let _ = write!(self.sql, "${number}");
        self
    }

    fn push_param(&mut self, placeholder: &Placeholder) {
        if let Placeholder::Named(name) = placeholder
            && let Some(number) = self.named.get(name)
        {
            let _ = write!(self.sql, "${number}");
            return;
        }

        let position = self.params;
        self.params += 1;
        self.push_slot(Slot::Param {
            placeholder: placeholder.clone(),
            position,
        });
        if let Placeholder::Named(name) = placeholder {
            self.named.insert(name.clone(), self.slots.len());
        }
    }

    pub(crate) fn push_expr(&mut self, expr: &ParsedExpr) -> &mut Self {
        for piece in &expr.pieces {
            match piece {
                Piece::Text(text) => self.sql.push_str(text),
                Piece::Placeholder(placeholder) => self.push_param(placeholder),
            }
        }
        self
    }

    /// Write `exprs` separated by `, `.
    pub(crate) fn push_list(&mut self, exprs: &[ParsedExpr]) -> &mut Self {
        for (idx, expr) in exprs.iter().enumerate() {
            if idx > 0 {
                self.sql.push_str(", ");
            }
            self.push_expr(expr);
        }
        self
    }

    pub(crate) fn finish(self, returns_rows: bool) -> RenderedStatement {
        RenderedStatement {
            descriptor: ShapeDescriptor::new(self.sql, returns_rows),
            slots: self.slots,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placeholders::parse_expression;

    #[test]
    fn repeated_names_share_a_slot() {
        let mut writer = SqlWriter::new();
        writer
            .push("a = ")
            .push_expr(&parse_expression(":x or b = ? or c = :x").unwrap());
        let rendered = writer.finish(true);
        assert_eq!(rendered.descriptor.sql.as_ref(), "a = $1 or b = $2 or c = $1");
        assert_eq!(
            rendered.slots,
            vec![
                Slot::Param {
                    placeholder: Placeholder::Named("x".into()),
                    position: 0
                },
                Slot::Param {
                    placeholder: Placeholder::Positional,
                    position: 1
                },
            ]
        );
    }

    #[test]
    fn identifiers_are_plain_names() {
        assert!(validate_identifier("docs_2024").is_ok());
        assert!(validate_identifier("_id").is_ok());
        assert!(validate_identifier("1abc").is_err());
        assert!(validate_identifier("docs; drop table x").is_err());
        assert!(validate_identifier("").is_err());
    }
}
