//! Parse `{{node}}` / `{{node.alias}}` references out of a SQL template.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    Lit(String),
    /// `{{node}}`: the node's view as a table.
    Table(String),
    /// `{{node.alias}}`: one column of that view.
    Column { table: String, column: String },
}

impl TemplatePart {
    pub fn table(&self) -> Option<&str> {
        match self {
            TemplatePart::Lit(_) => None,
            TemplatePart::Table(table) | TemplatePart::Column { table, .. } => Some(table),
        }
    }
}

pub fn parse_template(input: &str) -> Vec<TemplatePart> {
    let mut parts = Vec::new();
    let mut remaining = input;

    while let Some(start) = remaining.find("{{") {
        if start > 0 {
            parts.push(TemplatePart::Lit(remaining[..start].to_string()));
        }

        let after_open = &remaining[start + 2..];
        match after_open.find("}}") {
            Some(end) => {
                parts.push(parse_single_ref(&after_open[..end]));
                remaining = &after_open[end + 2..];
            }
            None => {
                // Unterminated: rest is literal.
                parts.push(TemplatePart::Lit(remaining[start..].to_string()));
                return parts;
            }
        }
    }

    if !remaining.is_empty() {
        parts.push(TemplatePart::Lit(remaining.to_string()));
    }
    parts
}

fn parse_single_ref(inner: &str) -> TemplatePart {
    match inner.trim().split_once('.') {
        Some((table, column)) => TemplatePart::Column {
            table: table.trim().to_string(),
            column: column.trim().to_string(),
        },
        None => TemplatePart::Table(inner.trim().to_string()),
    }
}

/// Referenced table names in order of first appearance.
pub fn referenced_tables(parts: &[TemplatePart]) -> Vec<&str> {
    let mut out: Vec<&str> = Vec::new();
    for table in parts.iter().filter_map(TemplatePart::table) {
        if !out.contains(&table) {
            out.push(table);
        }
    }
    out
}

/// Substitute every reference: tables become aliased subqueries over
/// `fragments[name]`, columns become quoted qualified names.
pub fn compile(parts: &[TemplatePart], fragments: &HashMap<String, String>) -> Option<String> {
    let mut sql = String::new();
    for part in parts {
        match part {
            TemplatePart::Lit(value) => sql.push_str(value),
            TemplatePart::Table(table) => {
                let fragment = fragments.get(table)?;
                sql.push_str(&format!("({}) AS {}", fragment, quote(table)));
            }
            TemplatePart::Column { table, column } => {
                sql.push_str(&format!("{}.{}", quote(table), quote(column)));
            }
        }
    }
    Some(sql)
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pure_literal() {
        let parts = parse_template("select 1");
        assert_eq!(parts, vec![TemplatePart::Lit("select 1".into())]);
    }

    #[test]
    fn table_and_column_refs() {
        let parts = parse_template("select {{ orders.amount }} from {{orders}}");
        assert_eq!(
            parts,
            vec![
                TemplatePart::Lit("select ".into()),
                TemplatePart::Column {
                    table: "orders".into(),
                    column: "amount".into()
                },
                TemplatePart::Lit(" from ".into()),
                TemplatePart::Table("orders".into()),
            ]
        );
        assert_eq!(referenced_tables(&parts), vec!["orders"]);
    }

    #[test]
    fn unterminated_ref_is_literal() {
        let parts = parse_template("select {{orders");
        assert_eq!(
            parts,
            vec![
                TemplatePart::Lit("select ".into()),
                TemplatePart::Lit("{{orders".into())
            ]
        );
    }

    #[test]
    fn compile_substitutes_fragments() {
        let parts = parse_template("select {{o.amount}} from {{o}}");
        let fragments = HashMap::from([("o".to_string(), "SELECT * FROM t".to_string())]);
        assert_eq!(
            compile(&parts, &fragments).as_deref(),
            Some(r#"select "o"."amount" from (SELECT * FROM t) AS "o""#)
        );
        assert_eq!(compile(&parts, &HashMap::new()), None);
    }

    #[test]
    fn stray_open_braces_compile_verbatim() {
        let parts = parse_template("select 1 as x from {{o}} where note = '{{'");
        let fragments = HashMap::from([("o".to_string(), "SELECT * FROM t".to_string())]);
        assert_eq!(
            compile(&parts, &fragments).as_deref(),
            Some(r#"select 1 as x from (SELECT * FROM t) AS "o" where note = '{{'"#)
        );
    }
}
