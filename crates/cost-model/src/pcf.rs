//! Programmable cost function (PCF) grammar, parser, and evaluator.
//!
//! Grounded in `original_source/MaTor-ShorTor/src/{pcf.hpp,pcf_parser.hpp}`:
//! a PCF list is one or more `<predicate> ? <effect>` entries separated by
//! `;`. Predicates combine field comparisons with `AND`/`XOR`/`OR`/`NOT`,
//! precedence `NOT` > `AND` > `XOR` > `OR`, associating left-to-right
//! within a tier. Effects are `SET|MUL|ADD (<number>|BANDWIDTH|AVGBANDWIDTH)`.
//!
//! The parser is hand-rolled recursive descent over a small token stream,
//! in the style of `tor_netdoc::parse::tokenize` rather than built on a
//! parser-combinator crate.

use crate::err::Error;
use netdir_sim::Relay;

/// A relay field a PCF predicate may compare against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Field {
    Fingerprint,
    Name,
    Country,
    Flags,
    Lat,
    Lon,
    Bandwidth,
    Platform,
    Version,
    Published,
}

/// A comparison operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Lt,
    Gt,
}

/// A literal value on the right-hand side of a comparison.
#[derive(Clone, Debug, PartialEq)]
enum Value {
    Number(f64),
    Text(String),
}

/// A single field/operator/value comparison.
#[derive(Clone, Debug, PartialEq)]
struct Comparison {
    field: Field,
    op: CmpOp,
    value: Value,
}

impl Comparison {
    fn eval(&self, relay: &Relay) -> bool {
        match (self.field, &self.value) {
            (Field::Fingerprint, Value::Text(t)) => cmp_text(&relay.fingerprint, self.op, t),
            (Field::Name, Value::Text(t)) => cmp_text(&relay.nickname, self.op, t),
            (Field::Country, Value::Text(t)) => relay
                .geo
                .map(|g| cmp_text(g.country_str(), self.op, t))
                .unwrap_or(false),
            (Field::Flags, Value::Text(t)) => flag_named(&relay.flags, t)
                .map(|has| match self.op {
                    CmpOp::Eq => has,
                    _ => false,
                })
                .unwrap_or(false),
            (Field::Lat, Value::Number(n)) => relay
                .geo
                .map(|g| cmp_num(g.lat, self.op, *n))
                .unwrap_or(false),
            (Field::Lon, Value::Number(n)) => relay
                .geo
                .map(|g| cmp_num(g.lon, self.op, *n))
                .unwrap_or(false),
            (Field::Bandwidth, Value::Number(n)) => {
                cmp_num(relay.effective_bandwidth() as f64, self.op, *n)
            }
            (Field::Platform, Value::Text(t)) => cmp_text(&relay.platform, self.op, t),
            (Field::Version, Value::Text(t)) => cmp_text(&relay.version, self.op, t),
            (Field::Published, Value::Number(n)) => cmp_num(relay.published as f64, self.op, *n),
            // A field/value-kind mismatch (e.g. BANDWIDTH == "x") is
            // rejected at parse time; eval never reaches an inconsistent
            // pairing.
            _ => false,
        }
    }
}

fn cmp_num(lhs: f64, op: CmpOp, rhs: f64) -> bool {
    match op {
        CmpOp::Eq => (lhs - rhs).abs() < f64::EPSILON,
        CmpOp::Lt => lhs < rhs,
        CmpOp::Gt => lhs > rhs,
    }
}

fn cmp_text(lhs: &str, op: CmpOp, rhs: &str) -> bool {
    match op {
        CmpOp::Eq => lhs == rhs,
        CmpOp::Lt => lhs < rhs,
        CmpOp::Gt => lhs > rhs,
    }
}

fn flag_named(flags: &netdir_sim::RelayFlags, name: &str) -> Option<bool> {
    use netdir_sim::RelayFlags as F;
    let flag = match name {
        "Authority" => F::AUTHORITY,
        "BadExit" => F::BAD_EXIT,
        "Exit" => F::EXIT,
        "Fast" => F::FAST,
        "Guard" => F::GUARD,
        "HSDir" => F::HS_DIR,
        "Named" => F::NAMED,
        "Stable" => F::STABLE,
        "Running" => F::RUNNING,
        "Unnamed" => F::UNNAMED,
        "Valid" => F::VALID,
        "V2Dir" => F::V2_DIR,
        _ => return None,
    };
    Some(flags.contains(flag))
}

/// A predicate expression tree.
#[derive(Clone, Debug, PartialEq)]
enum Predicate {
    Cmp(Comparison),
    Not(Box<Predicate>),
    And(Box<Predicate>, Box<Predicate>),
    Xor(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    /// The literal `ANY` predicate, matching every relay.
    Any,
}

impl Predicate {
    fn eval(&self, relay: &Relay) -> bool {
        match self {
            Predicate::Cmp(c) => c.eval(relay),
            Predicate::Not(p) => !p.eval(relay),
            Predicate::And(a, b) => a.eval(relay) && b.eval(relay),
            Predicate::Xor(a, b) => a.eval(relay) != b.eval(relay),
            Predicate::Or(a, b) => a.eval(relay) || b.eval(relay),
            Predicate::Any => true,
        }
    }
}

/// Which arithmetic operation an [`Effect`] performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EffectOp {
    Set,
    Mul,
    Add,
}

/// The right-hand operand of an effect.
#[derive(Clone, Copy, Debug, PartialEq)]
enum EffectOperand {
    Literal(f64),
    Bandwidth,
    AvgBandwidth,
}

impl EffectOperand {
    fn resolve(&self, relay: &Relay) -> f64 {
        match self {
            EffectOperand::Literal(v) => *v,
            EffectOperand::Bandwidth => relay.bandwidth as f64,
            EffectOperand::AvgBandwidth => relay.effective_bandwidth() as f64,
        }
    }
}

/// One `SET|MUL|ADD` effect.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Effect {
    op: EffectOp,
    operand: EffectOperand,
}

impl Effect {
    fn apply(&self, relay: &Relay, current_cost: f64) -> f64 {
        let v = self.operand.resolve(relay);
        match self.op {
            EffectOp::Set => v,
            EffectOp::Mul => current_cost * v,
            EffectOp::Add => current_cost + v,
        }
    }
}

/// One `<predicate> ? <effect>` entry.
#[derive(Clone, Debug, PartialEq)]
pub struct Pcf {
    predicate: Predicate,
    effect: Effect,
}

impl Pcf {
    /// Apply this PCF to `relay`, given the cost computed so far. Returns
    /// `current_cost` unchanged if the predicate doesn't match.
    pub fn apply(&self, relay: &Relay, current_cost: f64) -> f64 {
        if self.predicate.eval(relay) {
            self.effect.apply(relay, current_cost)
        } else {
            current_cost
        }
    }

    /// Parse a `;`-separated PCF list from `source`.
    pub fn parse_list(source: &str) -> Result<Vec<Pcf>, Error> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            source,
        };
        let list = parser.parse_pcf_list()?;
        parser.expect_end()?;
        Ok(list)
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Tok {
    Ident(String),
    Number(f64),
    Text(String),
    EqEq,
    Lt,
    Gt,
    Question,
    Semi,
    LParen,
    RParen,
}

struct Spanned {
    tok: Tok,
    pos: usize,
}

fn tokenize(source: &str) -> Result<Vec<Spanned>, Error> {
    let bytes = source.as_bytes();
    let mut out = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            c if c.is_whitespace() => i += 1,
            '?' => {
                out.push(Spanned {
                    tok: Tok::Question,
                    pos: i,
                });
                i += 1;
            }
            ';' => {
                out.push(Spanned {
                    tok: Tok::Semi,
                    pos: i,
                });
                i += 1;
            }
            '(' => {
                out.push(Spanned {
                    tok: Tok::LParen,
                    pos: i,
                });
                i += 1;
            }
            ')' => {
                out.push(Spanned {
                    tok: Tok::RParen,
                    pos: i,
                });
                i += 1;
            }
            '<' => {
                out.push(Spanned { tok: Tok::Lt, pos: i });
                i += 1;
            }
            '>' => {
                out.push(Spanned { tok: Tok::Gt, pos: i });
                i += 1;
            }
            '=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    out.push(Spanned {
                        tok: Tok::EqEq,
                        pos: i,
                    });
                    i += 2;
                } else {
                    return Err(Error::PcfParseError {
                        pos: i,
                        message: "expected '==', found a single '='".into(),
                    });
                }
            }
            '"' => {
                let start = i;
                i += 1;
                let text_start = i;
                while i < bytes.len() && bytes[i] != b'"' {
                    i += 1;
                }
                if i >= bytes.len() {
                    return Err(Error::PcfParseError {
                        pos: start,
                        message: "unterminated string literal".into(),
                    });
                }
                let text = source[text_start..i].to_string();
                i += 1; // closing quote
                out.push(Spanned {
                    tok: Tok::Text(text),
                    pos: start,
                });
            }
            c if c.is_ascii_digit() || (c == '-' && i + 1 < bytes.len() && (bytes[i + 1] as char).is_ascii_digit()) => {
                let start = i;
                i += 1;
                while i < bytes.len()
                    && (bytes[i].is_ascii_digit() || bytes[i] == b'.' || bytes[i] == b'e' || bytes[i] == b'E')
                {
                    i += 1;
                }
                let text = &source[start..i];
                let n: f64 = text.parse().map_err(|_| Error::PcfParseError {
                    pos: start,
                    message: format!("invalid number literal '{text}'"),
                })?;
                out.push(Spanned {
                    tok: Tok::Number(n),
                    pos: start,
                });
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                i += 1;
                while i < bytes.len() && ((bytes[i] as char).is_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                let text = source[start..i].to_string();
                out.push(Spanned {
                    tok: Tok::Ident(text),
                    pos: start,
                });
            }
            other => {
                return Err(Error::PcfParseError {
                    pos: i,
                    message: format!("unexpected character '{other}'"),
                });
            }
        }
    }
    Ok(out)
}

struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    source: &'a str,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|s| &s.tok)
    }

    fn peek_pos(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|s| s.pos)
            .unwrap_or(self.source.len())
    }

    fn advance(&mut self) -> Option<&Tok> {
        let t = self.tokens.get(self.pos).map(|s| &s.tok);
        self.pos += 1;
        t
    }

    fn err(&self, message: impl Into<String>) -> Error {
        Error::PcfParseError {
            pos: self.peek_pos(),
            message: message.into(),
        }
    }

    fn expect_end(&self) -> Result<(), Error> {
        if self.pos != self.tokens.len() {
            Err(self.err("trailing input after last PCF entry"))
        } else {
            Ok(())
        }
    }

    fn parse_pcf_list(&mut self) -> Result<Vec<Pcf>, Error> {
        let mut out = vec![self.parse_pcf()?];
        while matches!(self.peek(), Some(Tok::Semi)) {
            self.advance();
            if self.pos == self.tokens.len() {
                break; // tolerate a trailing separator
            }
            out.push(self.parse_pcf()?);
        }
        Ok(out)
    }

    fn parse_pcf(&mut self) -> Result<Pcf, Error> {
        let predicate = self.parse_or()?;
        match self.advance() {
            Some(Tok::Question) => {}
            _ => return Err(self.err("expected '?' between predicate and effect")),
        }
        let effect = self.parse_effect()?;
        Ok(Pcf { predicate, effect })
    }

    fn parse_or(&mut self) -> Result<Predicate, Error> {
        let mut lhs = self.parse_xor()?;
        while self.match_ident_ci("OR") {
            let rhs = self.parse_xor()?;
            lhs = Predicate::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_xor(&mut self) -> Result<Predicate, Error> {
        let mut lhs = self.parse_and()?;
        while self.match_ident_ci("XOR") {
            let rhs = self.parse_and()?;
            lhs = Predicate::Xor(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Predicate, Error> {
        let mut lhs = self.parse_not()?;
        while self.match_ident_ci("AND") {
            let rhs = self.parse_not()?;
            lhs = Predicate::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Predicate, Error> {
        if self.match_ident_ci("NOT") {
            let inner = self.parse_not()?;
            return Ok(Predicate::Not(Box::new(inner)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Predicate, Error> {
        if matches!(self.peek(), Some(Tok::LParen)) {
            self.advance();
            let inner = self.parse_or()?;
            match self.advance() {
                Some(Tok::RParen) => {}
                _ => return Err(self.err("expected ')'")),
            }
            return Ok(inner);
        }
        if self.match_ident_ci("ANY") {
            return Ok(Predicate::Any);
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Predicate, Error> {
        let field = self.parse_field()?;
        let op = match self.advance() {
            Some(Tok::EqEq) => CmpOp::Eq,
            Some(Tok::Lt) => CmpOp::Lt,
            Some(Tok::Gt) => CmpOp::Gt,
            _ => return Err(self.err("expected a comparison operator ('==', '<', '>')")),
        };
        let value = self.parse_value(field)?;
        Ok(Predicate::Cmp(Comparison { field, op, value }))
    }

    fn parse_field(&mut self) -> Result<Field, Error> {
        match self.advance() {
            Some(Tok::Ident(name)) => match name.to_ascii_uppercase().as_str() {
                "FINGERPRINT" => Ok(Field::Fingerprint),
                "NAME" => Ok(Field::Name),
                "COUNTRY" => Ok(Field::Country),
                "FLAGS" => Ok(Field::Flags),
                "LAT" => Ok(Field::Lat),
                "LON" => Ok(Field::Lon),
                "BANDWIDTH" => Ok(Field::Bandwidth),
                "PLATFORM" => Ok(Field::Platform),
                "VERSION" => Ok(Field::Version),
                "PUBLISHED" => Ok(Field::Published),
                other => Err(self.err(format!("unknown relay field '{other}'"))),
            },
            _ => Err(self.err("expected a relay field name")),
        }
    }

    fn parse_value(&mut self, field: Field) -> Result<Value, Error> {
        let numeric = matches!(
            field,
            Field::Lat | Field::Lon | Field::Bandwidth | Field::Published
        );
        match self.advance() {
            Some(Tok::Number(n)) if numeric => Ok(Value::Number(*n)),
            Some(Tok::Text(t)) if !numeric => Ok(Value::Text(t.clone())),
            Some(other) => Err(self.err(format!(
                "value type mismatch for this field near token {other:?}"
            ))),
            None => Err(self.err("expected a value")),
        }
    }

    fn parse_effect(&mut self) -> Result<Effect, Error> {
        let op = match self.advance() {
            Some(Tok::Ident(name)) => match name.to_ascii_uppercase().as_str() {
                "SET" => EffectOp::Set,
                "MUL" => EffectOp::Mul,
                "ADD" => EffectOp::Add,
                other => return Err(self.err(format!("unknown effect kind '{other}'"))),
            },
            _ => return Err(self.err("expected an effect kind (SET, MUL, ADD)")),
        };
        let operand = match self.advance() {
            Some(Tok::Number(n)) => EffectOperand::Literal(*n),
            Some(Tok::Ident(name)) => match name.to_ascii_uppercase().as_str() {
                "BANDWIDTH" => EffectOperand::Bandwidth,
                "AVGBANDWIDTH" => EffectOperand::AvgBandwidth,
                other => return Err(self.err(format!("unknown effect operand '{other}'"))),
            },
            _ => return Err(self.err("expected an effect operand")),
        };
        Ok(Effect { op, operand })
    }

    fn match_ident_ci(&mut self, keyword: &str) -> bool {
        if let Some(Tok::Ident(name)) = self.peek() {
            if name.eq_ignore_ascii_case(keyword) {
                self.advance();
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use netdir_sim::testnet;

    #[test]
    fn flat_cost_pcf() {
        let list = Pcf::parse_list("ANY ? SET 1").unwrap();
        assert_eq!(list.len(), 1);
        let relay = &testnet::small_relay_vec()[0];
        assert_eq!(list[0].apply(relay, 1.0), 1.0);
    }

    #[test]
    fn country_restricted_pcf() {
        let list = Pcf::parse_list(r#"COUNTRY == "DE" ? MUL 2"#).unwrap();
        let relays = testnet::small_relay_vec();
        // relay 2 is DE in the fixture, relay 0 is US.
        assert_eq!(list[0].apply(&relays[2], 1.0), 2.0);
        assert_eq!(list[0].apply(&relays[0], 1.0), 1.0);
    }

    #[test]
    fn precedence_and_over_xor_over_or() {
        // Guard XOR Exit AND BadExit ==> Guard XOR (Exit AND BadExit)
        let list =
            Pcf::parse_list(r#"FLAGS == "Guard" XOR FLAGS == "Exit" AND FLAGS == "BadExit" ? SET 9"#)
                .unwrap();
        let relays = testnet::small_relay_vec();
        // relay 0 is Guard+Exit, not BadExit: Guard XOR (Exit AND false) = true XOR false = true
        assert_eq!(list[0].apply(&relays[0], 1.0), 9.0);
        // relay 4 is Exit+BadExit, not Guard: false XOR (true AND true) = true
        assert_eq!(list[0].apply(&relays[4], 1.0), 9.0);
        // relay 3 is neither: false XOR (false AND false) = false
        assert_eq!(list[0].apply(&relays[3], 1.0), 1.0);
    }

    #[test]
    fn not_and_parens() {
        let list = Pcf::parse_list(r#"NOT (FLAGS == "BadExit") ? SET 5"#).unwrap();
        let relays = testnet::small_relay_vec();
        assert_eq!(list[0].apply(&relays[4], 1.0), 1.0); // relay 4 is BadExit
        assert_eq!(list[0].apply(&relays[0], 1.0), 5.0);
    }

    #[test]
    fn multi_entry_list_applies_in_order() {
        let list = Pcf::parse_list("ANY ? SET 1; ANY ? MUL 3").unwrap();
        assert_eq!(list.len(), 2);
        let relay = &testnet::small_relay_vec()[0];
        let mut cost = 1.0;
        for pcf in &list {
            cost = pcf.apply(relay, cost);
        }
        assert_eq!(cost, 3.0);
    }

    #[test]
    fn bandwidth_keyword_operand() {
        let list = Pcf::parse_list("ANY ? SET BANDWIDTH").unwrap();
        let relay = &testnet::small_relay_vec()[0];
        assert_eq!(list[0].apply(relay, 1.0), relay.bandwidth as f64);
    }

    #[test]
    fn bad_equals_reports_position() {
        let err = Pcf::parse_list("BANDWIDTH = 5 ? SET 1").unwrap_err();
        match err {
            Error::PcfParseError { pos, .. } => assert_eq!(pos, 10),
        }
    }

    #[test]
    fn value_type_mismatch_is_rejected() {
        assert!(Pcf::parse_list(r#"BANDWIDTH == "x" ? SET 1"#).is_err());
    }
}
