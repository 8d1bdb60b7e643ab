//! Condition expression parser and evaluator.
//!
//! Conditions read fields of the candidate (as serialized JSON) and of the
//! pipeline run:
//!
//! ```text
//! rec.score > 0.9
//! rec.action_kind == "defer" AND rec.target_kind == "task"
//! rec.title MATCHES "(?i)tomorrow"
//! rec.action_payload.mode == "minimum"
//! tier == "tier2_executed" OR rec.source_rule NOT STARTS_WITH "habit"
//! ```
//!
//! Grammar:
//! ```text
//! expr   = and ("OR" and)*
//! and    = unary ("AND" unary)*
//! unary  = "NOT" unary | "(" expr ")" | atom
//! atom   = field ["NOT"] OP value
//! field  = "rec." PATH | "tier" | "user_id"
//! OP     = "CONTAINS" | "MATCHES" | "STARTS_WITH" | "ENDS_WITH"
//!        | "==" | "!=" | ">" | "<" | ">=" | "<="
//! value  = QUOTED_STRING | NUMBER | IDENT
//! ```

use regex_lite::Regex;
use std::borrow::Cow;

/// A parsed condition tree.
#[derive(Debug, Clone)]
pub enum Condition {
    Atom(Atom),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
    /// Empty condition.
    Always,
}

#[derive(Debug, Clone)]
pub struct Atom {
    pub field: Field,
    pub op: Op,
    pub negated: bool,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// Dotted path into the serialized candidate.
    Rec(String),
    /// The stopping tier of the run (`tier0_only`, `tier1_stop`, `tier2_executed`).
    Tier,
    UserId,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    Contains,
    Matches,
    StartsWith,
    EndsWith,
    Eq,
    NotEq,
    Gt,
    Lt,
    Gte,
    Lte,
}

impl Op {
    fn negatable(self) -> bool {
        matches!(
            self,
            Op::Contains | Op::Matches | Op::StartsWith | Op::EndsWith
        )
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Str(String),
    Num(f64),
}

impl Value {
    fn as_text(&self) -> Cow<'_, str> {
        match self {
            Value::Str(s) => Cow::Borrowed(s),
            Value::Num(n) => Cow::Owned(n.to_string()),
        }
    }
}

/// What a condition is evaluated against.
pub struct EvalContext<'a> {
    /// The candidate, serialized.
    pub rec: &'a serde_json::Value,
    pub tier: Option<&'a str>,
    pub user_id: &'a str,
}

impl Condition {
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> bool {
        match self {
            Condition::Always => true,
            Condition::Atom(atom) => atom.evaluate(ctx),
            Condition::And(a, b) => a.evaluate(ctx) && b.evaluate(ctx),
            Condition::Or(a, b) => a.evaluate(ctx) || b.evaluate(ctx),
            Condition::Not(inner) => !inner.evaluate(ctx),
        }
    }
}

impl Atom {
    fn evaluate(&self, ctx: &EvalContext<'_>) -> bool {
        let Some(actual) = self.resolve(ctx) else {
            // A missing field never satisfies a positive test.
            return self.negated || self.op == Op::NotEq;
        };
        let expected = self.value.as_text();
        let hit = match self.op {
            Op::Contains => actual.contains(expected.as_ref()),
            Op::Matches => Regex::new(&expected).is_ok_and(|re| re.is_match(&actual)),
            Op::StartsWith => actual.starts_with(expected.as_ref()),
            Op::EndsWith => actual.ends_with(expected.as_ref()),
            Op::Eq => equals(&actual, &self.value),
            Op::NotEq => !equals(&actual, &self.value),
            Op::Gt => compare(&actual, &self.value, |a, b| a > b),
            Op::Lt => compare(&actual, &self.value, |a, b| a < b),
            Op::Gte => compare(&actual, &self.value, |a, b| a >= b),
            Op::Lte => compare(&actual, &self.value, |a, b| a <= b),
        };
        hit != self.negated
    }

    fn resolve(&self, ctx: &EvalContext<'_>) -> Option<String> {
        match &self.field {
            Field::Tier => ctx.tier.map(str::to_string),
            Field::UserId => Some(ctx.user_id.to_string()),
            Field::Rec(path) => {
                let mut current = ctx.rec;
                for part in path.split('.') {
                    current = match current {
                        serde_json::Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                        other => other.get(part)?,
                    };
                }
                match current {
                    serde_json::Value::Null => None,
                    serde_json::Value::String(s) => Some(s.clone()),
                    other => Some(other.to_string()),
                }
            }
        }
    }
}

fn equals(actual: &str, expected: &Value) -> bool {
    match expected {
        Value::Str(s) => actual == s,
        Value::Num(n) => actual
            .parse::<f64>()
            .is_ok_and(|x| (x - n).abs() < f64::EPSILON),
    }
}

fn compare(actual: &str, expected: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match expected {
        Value::Num(n) => actual.parse::<f64>().is_ok_and(|x| cmp(x, *n)),
        Value::Str(_) => false,
    }
}

// ─── Parser ──────────────────────────────────────────────────────────

/// Parse a condition expression. Empty input parses to [`Condition::Always`].
pub fn parse_condition(input: &str) -> Result<Condition, String> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(Condition::Always);
    }
    let tokens = tokenize(input)?;
    let (cond, rest) = parse_or(&tokens)?;
    if !rest.is_empty() {
        return Err(format!("unexpected tokens after expression: {rest:?}"));
    }
    Ok(cond)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    And,
    Or,
    Not,
    Op(Op),
    LParen,
    RParen,
}

fn keyword(word: &str) -> Option<Token> {
    let token = match word.to_ascii_uppercase().as_str() {
        "AND" => Token::And,
        "OR" => Token::Or,
        "NOT" => Token::Not,
        "CONTAINS" => Token::Op(Op::Contains),
        "MATCHES" => Token::Op(Op::Matches),
        "STARTS_WITH" => Token::Op(Op::StartsWith),
        "ENDS_WITH" => Token::Op(Op::EndsWith),
        _ => return None,
    };
    Some(token)
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '"' | '\'' => {
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('\\') => s.extend(chars.next()),
                        Some(ch) if ch == c => break,
                        Some(ch) => s.push(ch),
                        None => return Err("unterminated string literal".into()),
                    }
                }
                Token::Str(s)
            }
            '>' | '<' | '=' | '!' => {
                let followed_by_eq = chars.next_if_eq(&'=').is_some();
                match (c, followed_by_eq) {
                    ('>', true) => Token::Op(Op::Gte),
                    ('>', false) => Token::Op(Op::Gt),
                    ('<', true) => Token::Op(Op::Lte),
                    ('<', false) => Token::Op(Op::Lt),
                    ('=', _) => Token::Op(Op::Eq),
                    ('!', true) => Token::Op(Op::NotEq),
                    _ => Token::Not,
                }
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut num = String::from(c);
                while let Some(d) = chars.next_if(|d| d.is_ascii_digit() || *d == '.') {
                    num.push(d);
                }
                Token::Num(
                    num.parse::<f64>()
                        .map_err(|_| format!("invalid number: {num}"))?,
                )
            }
            c if c.is_alphanumeric() || c == '_' => {
                let mut word = String::from(c);
                while let Some(w) = chars.next_if(|w| w.is_alphanumeric() || *w == '_' || *w == '.')
                {
                    word.push(w);
                }
                keyword(&word).unwrap_or(Token::Ident(word))
            }
            other => return Err(format!("unexpected character: {other}")),
        };
        tokens.push(token);
    }

    Ok(tokens)
}

type Parsed<'t> = Result<(Condition, &'t [Token]), String>;

fn parse_or(tokens: &[Token]) -> Parsed<'_> {
    let (mut left, mut rest) = parse_and(tokens)?;
    while let [Token::Or, tail @ ..] = rest {
        let (right, remaining) = parse_and(tail)?;
        left = Condition::Or(Box::new(left), Box::new(right));
        rest = remaining;
    }
    Ok((left, rest))
}

fn parse_and(tokens: &[Token]) -> Parsed<'_> {
    let (mut left, mut rest) = parse_unary(tokens)?;
    while let [Token::And, tail @ ..] = rest {
        let (right, remaining) = parse_unary(tail)?;
        left = Condition::And(Box::new(left), Box::new(right));
        rest = remaining;
    }
    Ok((left, rest))
}

fn parse_unary(tokens: &[Token]) -> Parsed<'_> {
    match tokens {
        [Token::Not, tail @ ..] => {
            let (inner, rest) = parse_unary(tail)?;
            Ok((Condition::Not(Box::new(inner)), rest))
        }
        [Token::LParen, tail @ ..] => {
            let (inner, rest) = parse_or(tail)?;
            match rest {
                [Token::RParen, rest @ ..] => Ok((inner, rest)),
                _ => Err("expected closing parenthesis".into()),
            }
        }
        _ => parse_atom(tokens),
    }
}

fn parse_atom(tokens: &[Token]) -> Parsed<'_> {
    let (field, rest) = match tokens {
        [Token::Ident(name), rest @ ..] => (parse_field(name)?, rest),
        _ => return Err(format!("expected field name, got {:?}", tokens.first())),
    };

    let (negated, rest) = match rest {
        [Token::Not, rest @ ..] => (true, rest),
        _ => (false, rest),
    };

    let (op, rest) = match rest {
        [Token::Op(op), rest @ ..] => (*op, rest),
        _ => return Err(format!("expected operator, got {:?}", rest.first())),
    };
    if negated && !op.negatable() {
        return Err(format!("cannot negate operator: {op:?}"));
    }

    let (value, rest) = match rest {
        [Token::Str(s), rest @ ..] | [Token::Ident(s), rest @ ..] => (Value::Str(s.clone()), rest),
        [Token::Num(n), rest @ ..] => (Value::Num(*n), rest),
        _ => {
            return Err(format!(
                "expected value (string or number), got {:?}",
                rest.first()
            ));
        }
    };

    if op == Op::Matches {
        if let Value::Str(pattern) = &value {
            Regex::new(pattern).map_err(|e| format!("invalid pattern '{pattern}': {e}"))?;
        }
    }

    Ok((
        Condition::Atom(Atom {
            field,
            op,
            negated,
            value,
        }),
        rest,
    ))
}

fn parse_field(name: &str) -> Result<Field, String> {
    match name {
        "tier" => Ok(Field::Tier),
        "user_id" => Ok(Field::UserId),
        _ => match name.strip_prefix("rec.") {
            Some(path) if !path.is_empty() => Ok(Field::Rec(path.to_string())),
            _ => Err(format!("unknown field '{name}' (expected rec.<path>, tier or user_id)")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stride_core::{ActionKind, RecommendationCandidate, TargetKind};

    fn rec_json() -> serde_json::Value {
        serde_json::to_value(
            RecommendationCandidate::new(ActionKind::Defer, TargetKind::Task, "Move report to tomorrow")
                .with_target("t1", "Write report")
                .with_score(0.85)
                .with_payload(serde_json::json!({ "task_id": "t1", "until": "2026-03-11" }))
                .with_signals(vec!["s1".into(), "s2".into()])
                .from_rule("energy_mismatch"),
        )
        .unwrap()
    }

    fn holds(expr: &str, tier: Option<&str>) -> bool {
        let rec = rec_json();
        let ctx = EvalContext {
            rec: &rec,
            tier,
            user_id: "u1",
        };
        parse_condition(expr).unwrap().evaluate(&ctx)
    }

    #[test]
    fn numeric_comparison_on_score() {
        assert!(holds("rec.score > 0.8", None));
        assert!(!holds("rec.score >= 0.9", None));
        assert!(holds("rec.score <= 0.85", None));
    }

    #[test]
    fn enum_fields_compare_as_snake_case() {
        assert!(holds(r#"rec.action_kind == "defer""#, None));
        assert!(holds("rec.target_kind == task", None));
        assert!(holds(r#"rec.type != "warning""#, None));
    }

    #[test]
    fn nested_payload_and_array_paths() {
        assert!(holds(r#"rec.action_payload.until STARTS_WITH "2026-03""#, None));
        assert!(holds(r#"rec.contributing_signal_ids.1 == "s2""#, None));
        assert!(!holds(r#"rec.contributing_signal_ids.5 == "s2""#, None));
    }

    #[test]
    fn negated_operators_and_logical_not() {
        assert!(holds(r#"rec.source_rule NOT STARTS_WITH "habit""#, None));
        assert!(holds(r#"NOT rec.title CONTAINS "today""#, None));
        assert!(!holds(r#"NOT (rec.score > 0.5 AND rec.action_kind == "defer")"#, None));
    }

    #[test]
    fn regex_match() {
        assert!(holds(r#"rec.title MATCHES "(?i)TOMORROW$""#, None));
        assert!(!holds(r#"rec.title MATCHES "^Skip""#, None));
    }

    #[test]
    fn tier_and_user_fields() {
        assert!(holds(r#"tier == "tier0_only" AND user_id == "u1""#, Some("tier0_only")));
        assert!(!holds(r#"tier == "tier0_only""#, None));
        assert!(holds(r#"tier != "tier2_executed""#, None));
    }

    #[test]
    fn or_binds_looser_than_and() {
        assert!(holds(
            r#"rec.score > 0.99 AND rec.action_kind == "reflect" OR rec.action_kind == "defer""#,
            None
        ));
    }

    #[test]
    fn missing_field_fails_positive_tests() {
        assert!(!holds(r#"rec.nope == "x""#, None));
        assert!(holds(r#"rec.nope NOT CONTAINS "x""#, None));
    }

    #[test]
    fn empty_condition_is_always() {
        assert!(holds("   ", None));
    }

    #[test]
    fn invalid_conditions_reject() {
        assert!(parse_condition("CONTAINS").is_err());
        assert!(parse_condition(r#"rec.x BADOP "y""#).is_err());
        assert!(parse_condition(r#"score > 1"#).is_err());
        assert!(parse_condition(r#"rec.score NOT > 1"#).is_err());
        assert!(parse_condition(r#"rec.title MATCHES "(unclosed""#).is_err());
        assert!(parse_condition(r#"(rec.score > 1"#).is_err());
        assert!(parse_condition(r#"rec.title == "open"#).is_err());
    }
}
