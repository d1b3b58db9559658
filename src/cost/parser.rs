use super::ast::*;
use super::lexer::{Token, TokenKind};
use crate::graph::DistanceMetric;

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub span: (usize, usize),
}

/// Something outside the formula that has to exist for it to evaluate.
#[derive(Debug, Clone, PartialEq)]
pub enum Reference {
    Field(String),
    Raster(usize),
    Polygon(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub expr: Expr,
    /// Every reference with the span it was written at
    pub references: Vec<(Reference, (usize, usize))>,
}

enum RasterTerm {
    Value(Expr),
    Aggregate(PixelSource, PixelAggregate),
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    source_len: usize,
    references: Vec<(Reference, (usize, usize))>,
    depth: usize,
}

/// Deepest expression tree a formula may produce. Bracket nesting, unary
/// signs and chained operators all count.
pub const MAX_DEPTH: usize = 256;

type PResult<T> = Result<T, ParseError>;

pub fn parse(tokens: &[Token], source_len: usize) -> PResult<Parsed> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        source_len,
        references: Vec::new(),
        depth: 0,
    };
    if tokens.is_empty() {
        return Err(ParseError {
            message: "Formula is empty".to_string(),
            span: (0, source_len),
        });
    }
    let expr = parser.expr()?;
    if let Some(token) = parser.peek() {
        return Err(ParseError {
            message: format!("Unexpected {}", token.kind.describe()),
            span: token.span,
        });
    }
    Ok(Parsed {
        expr,
        references: parser.references,
    })
}

impl<'t> Parser<'t> {
    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&'t TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Ident(s)) if s.eq_ignore_ascii_case(keyword))
    }

    fn here(&self) -> (usize, usize) {
        self.peek()
            .map(|t| t.span)
            .unwrap_or((self.source_len, self.source_len))
    }

    fn error<T>(&self, message: impl Into<String>) -> PResult<T> {
        let found = match self.peek() {
            Some(token) => format!(", found {}", token.kind.describe()),
            None => ", found end of formula".to_string(),
        };
        Err(ParseError {
            message: format!("{}{found}", message.into()),
            span: self.here(),
        })
    }

    fn descend(&mut self) -> PResult<()> {
        if self.depth >= MAX_DEPTH {
            return Err(ParseError {
                message: format!("Nesting too deep, at most {MAX_DEPTH} levels are allowed"),
                span: self.here(),
            });
        }
        self.depth += 1;
        Ok(())
    }

    /// Runs `f` one level deeper.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        self.descend()?;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn expect(&mut self, kind: TokenKind) -> PResult<()> {
        if self.eat(&kind) {
            Ok(())
        } else {
            self.error(format!("Expected {}", kind.describe()))
        }
    }

    fn ident(&mut self) -> PResult<(&'t str, (usize, usize))> {
        match self.peek() {
            Some(Token {
                kind: TokenKind::Ident(name),
                span,
            }) => {
                self.pos += 1;
                Ok((name.as_str(), *span))
            }
            _ => self.error("Expected a name"),
        }
    }

    fn number(&mut self) -> PResult<(f64, (usize, usize))> {
        match self.peek() {
            Some(Token {
                kind: TokenKind::Number(n),
                span,
            }) => {
                self.pos += 1;
                Ok((*n, *span))
            }
            _ => self.error("Expected a number"),
        }
    }

    fn index(&mut self) -> PResult<(usize, (usize, usize))> {
        let (value, span) = self.number()?;
        if value.fract() != 0.0 || value < 0.0 {
            return Err(ParseError {
                message: format!("Index {value} is not a whole number"),
                span,
            });
        }
        Ok((value as usize, span))
    }

    fn heuristic(&mut self) -> PResult<u8> {
        let (value, span) = self.index()?;
        if value > 3 {
            return Err(ParseError {
                message: format!("Heuristic {value} is not one of 0, 1, 2, 3"),
                span,
            });
        }
        Ok(value as u8)
    }

    // ------------------------------------------------------------------
    // arithmetic
    // ------------------------------------------------------------------

    // every chained operator deepens the left-leaning tree by one level
    fn chain<O, T>(
        &mut self,
        operand: impl Fn(&mut Self) -> PResult<T>,
        operator: impl Fn(&Self) -> Option<O>,
        combine: impl Fn(O, T, T) -> T,
    ) -> PResult<T> {
        let start = self.depth;
        let result: PResult<T> = (|| {
            let mut lhs = operand(self)?;
            while let Some(op) = operator(self) {
                self.descend()?;
                self.pos += 1;
                let rhs = operand(self)?;
                lhs = combine(op, lhs, rhs);
            }
            Ok(lhs)
        })();
        self.depth = start;
        result
    }

    fn expr(&mut self) -> PResult<Expr> {
        self.chain(
            Self::term,
            |p| match p.peek_kind() {
                Some(TokenKind::Plus) => Some(BinaryOp::Add),
                Some(TokenKind::Minus) => Some(BinaryOp::Sub),
                _ => None,
            },
            binary,
        )
    }

    fn term(&mut self) -> PResult<Expr> {
        self.chain(
            Self::unary,
            |p| match p.peek_kind() {
                Some(TokenKind::Star) => Some(BinaryOp::Mul),
                Some(TokenKind::Slash) => Some(BinaryOp::Div),
                _ => None,
            },
            binary,
        )
    }

    fn unary(&mut self) -> PResult<Expr> {
        self.nested(|p| {
            if p.eat(&TokenKind::Minus) {
                return Ok(Expr::Neg(Box::new(p.unary()?)));
            }
            if p.eat(&TokenKind::Plus) {
                return p.unary();
            }
            p.primary()
        })
    }

    fn primary(&mut self) -> PResult<Expr> {
        let Some(token) = self.peek() else {
            return self.error("Expected a value");
        };
        match &token.kind {
            TokenKind::Number(n) => {
                self.pos += 1;
                Ok(Expr::Literal(*n))
            }
            TokenKind::LParen => {
                self.pos += 1;
                let inner = self.expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Ident(name) => {
                self.pos += 1;
                self.keyword(name, token.span)
            }
            _ => self.error("Expected a value"),
        }
    }

    fn keyword(&mut self, name: &str, span: (usize, usize)) -> PResult<Expr> {
        match name {
            "euclidean" => Ok(Expr::Distance(DistanceMetric::Euclidean)),
            "manhattan" => Ok(Expr::Distance(DistanceMetric::Manhattan)),
            "geodesic" => Ok(Expr::Distance(DistanceMetric::Geodesic)),
            "ellipsoidal" => Ok(Expr::Distance(DistanceMetric::Ellipsoidal)),
            "True" | "true" => Ok(Expr::Literal(1.0)),
            "False" | "false" => Ok(Expr::Literal(0.0)),
            "field" => self.field(),
            "raster" => match self.raster()? {
                RasterTerm::Value(expr) => Ok(expr),
                RasterTerm::Aggregate(..) => Err(ParseError {
                    message: "Pixel tests are only allowed on the left of a comparison inside a condition"
                        .to_string(),
                    span: (span.0, self.previous_end()),
                }),
            },
            "polygon" => self.polygon(),
            "if" => self.conditional(),
            "math" => self.math(),
            "rnd" => {
                self.expect(TokenKind::Question)?;
                let low = self.expr()?;
                self.expect(TokenKind::DoubleQuestion)?;
                let high = self.expr()?;
                self.expect(TokenKind::Ampersand)?;
                Ok(Expr::RandomRange {
                    low: Box::new(low),
                    high: Box::new(high),
                })
            }
            "random" => {
                self.expect(TokenKind::LParen)?;
                let low = self.expr()?;
                self.expect(TokenKind::Comma)?;
                let high = self.expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(Expr::RandomRange {
                    low: Box::new(low),
                    high: Box::new(high),
                })
            }
            other => Err(ParseError {
                message: format!("Unknown term '{other}'"),
                span,
            }),
        }
    }

    fn previous_end(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(self.source_len, |t| t.span.1)
    }

    fn field(&mut self) -> PResult<Expr> {
        self.expect(TokenKind::Colon)?;
        let (name, span) = match self.peek() {
            Some(Token {
                kind: TokenKind::Ident(name) | TokenKind::Str(name),
                span,
            }) => (name.clone(), *span),
            _ => return self.error("Expected a field name"),
        };
        self.pos += 1;
        self.references.push((Reference::Field(name.clone()), span));
        Ok(Expr::Field(name))
    }

    fn bracketed_index(&mut self, reference: fn(usize) -> Reference) -> PResult<usize> {
        self.expect(TokenKind::LBracket)?;
        let (index, span) = self.index()?;
        self.expect(TokenKind::RBracket)?;
        self.references.push((reference(index), span));
        self.expect(TokenKind::Colon)?;
        Ok(index)
    }

    fn raster(&mut self) -> PResult<RasterTerm> {
        let raster = self.bracketed_index(Reference::Raster)?;
        let (name, span) = self.ident()?;
        let line = PixelSource::Line { raster };

        match name {
            "pixelValue" => return Ok(RasterTerm::Aggregate(line, PixelAggregate::Any)),
            "percentOfValues" => {
                self.expect(TokenKind::LParen)?;
                let percent = self.percent()?;
                self.expect(TokenKind::RParen)?;
                return Ok(RasterTerm::Aggregate(line, PixelAggregate::Percent(percent)));
            }
            _ => {}
        }
        if let Some(stat) = RasterStat::from_name(name) {
            return Ok(RasterTerm::Value(Expr::RasterStat { source: line, stat }));
        }

        let Some(rest) = name.strip_prefix("sp") else {
            return Err(ParseError {
                message: format!("Unknown raster statistic '{name}'"),
                span,
            });
        };
        self.expect(TokenKind::LParen)?;
        let heuristic = self.heuristic()?;
        let path = PixelSource::Path { raster, heuristic };

        let metric = match rest.to_ascii_lowercase().as_str() {
            "euclidean" => Some(DistanceMetric::Euclidean),
            "manhattan" => Some(DistanceMetric::Manhattan),
            "geodesic" => Some(DistanceMetric::Geodesic),
            "ellipsoidal" => Some(DistanceMetric::Ellipsoidal),
            _ => None,
        };

        let term = if let Some(metric) = metric {
            RasterTerm::Value(Expr::RasterPathLength {
                raster,
                heuristic,
                metric,
            })
        } else if rest == "PixelValue" {
            RasterTerm::Aggregate(path, PixelAggregate::Any)
        } else if rest == "PercentOfValues" {
            self.expect(TokenKind::Comma)?;
            RasterTerm::Aggregate(path, PixelAggregate::Percent(self.percent()?))
        } else if let Some(stat) = RasterStat::from_name(rest) {
            // a trailing sample count is accepted and ignored
            if self.eat(&TokenKind::Comma) {
                self.number()?;
            }
            RasterTerm::Value(Expr::RasterStat { source: path, stat })
        } else {
            return Err(ParseError {
                message: format!("Unknown raster statistic '{name}'"),
                span,
            });
        };
        self.expect(TokenKind::RParen)?;
        Ok(term)
    }

    fn percent(&mut self) -> PResult<f64> {
        let (value, span) = self.number()?;
        if !(0.0..=100.0).contains(&value) {
            return Err(ParseError {
                message: format!("Percentage {value} is outside 0..100"),
                span,
            });
        }
        Ok(value)
    }

    fn polygon(&mut self) -> PResult<Expr> {
        let index = self.bracketed_index(Reference::Polygon)?;
        let (name, span) = self.ident()?;
        let test = match name {
            "crossesPolygon" => PolygonTest::Crosses,
            "insidePolygon" => PolygonTest::Inside,
            other => {
                return Err(ParseError {
                    message: format!("Unknown polygon test '{other}'"),
                    span,
                });
            }
        };
        Ok(Expr::Polygon { index, test })
    }

    fn conditional(&mut self) -> PResult<Expr> {
        let close = if self.eat(&TokenKind::LBrace) {
            TokenKind::RBrace
        } else if self.eat(&TokenKind::LParen) {
            TokenKind::RParen
        } else {
            return self.error("Expected '{' or '(' after 'if'");
        };

        let condition = self.condition()?;
        self.separator()?;
        let then = self.expr()?;
        self.separator()?;
        let otherwise = self.expr()?;
        self.expect(close)?;
        Ok(Expr::Conditional {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn separator(&mut self) -> PResult<()> {
        if self.eat(&TokenKind::Semicolon) || self.eat(&TokenKind::Comma) {
            Ok(())
        } else {
            self.error("Expected ';'")
        }
    }

    fn math(&mut self) -> PResult<Expr> {
        self.expect(TokenKind::Dot)?;
        let (name, span) = self.ident()?;
        if let Some(value) = MathFunction::constant(name) {
            return Ok(Expr::Literal(value));
        }
        let Some(function) = MathFunction::from_name(name) else {
            return Err(ParseError {
                message: format!("Unknown math function '{name}'"),
                span,
            });
        };

        let close = if self.eat(&TokenKind::Percent) {
            TokenKind::Dollar
        } else if self.eat(&TokenKind::LParen) {
            TokenKind::RParen
        } else {
            return self.error(format!("Expected arguments for math.{name}"));
        };
        let mut args = vec![self.expr()?];
        while self.eat(&TokenKind::Comma) {
            args.push(self.expr()?);
        }
        self.expect(close)?;

        let (min, max) = function.arity();
        if args.len() < min || args.len() > max {
            let expected = match (min, max) {
                (min, max) if min == max => min.to_string(),
                (min, usize::MAX) => format!("at least {min}"),
                (min, max) => format!("{min} or {max}"),
            };
            return Err(ParseError {
                message: format!(
                    "math.{name} takes {expected} argument(s), got {}",
                    args.len()
                ),
                span: (span.0, self.previous_end()),
            });
        }
        Ok(Expr::MathCall { function, args })
    }

    // ------------------------------------------------------------------
    // conditions
    // ------------------------------------------------------------------

    fn condition(&mut self) -> PResult<Condition> {
        self.chain(
            Self::and_condition,
            |p| p.peek_keyword("or").then_some(()),
            |_, lhs, rhs| Condition::Or(Box::new(lhs), Box::new(rhs)),
        )
    }

    fn and_condition(&mut self) -> PResult<Condition> {
        self.chain(
            Self::not_condition,
            |p| p.peek_keyword("and").then_some(()),
            |_, lhs, rhs| Condition::And(Box::new(lhs), Box::new(rhs)),
        )
    }

    fn not_condition(&mut self) -> PResult<Condition> {
        self.nested(|p| {
            if p.peek_keyword("not") {
                p.pos += 1;
                return Ok(Condition::Not(Box::new(p.not_condition()?)));
            }
            p.atom_condition()
        })
    }

    fn atom_condition(&mut self) -> PResult<Condition> {
        let start = self.pos;
        let references = self.references.len();

        if self.peek_kind() == Some(&TokenKind::LParen) {
            // `(a + b) > c` is arithmetic, `(a > b) and c` is grouping
            match self.comparison() {
                Ok(cond) => return Ok(cond),
                Err(_) => {
                    self.pos = start + 1;
                    self.references.truncate(references);
                    let inner = self.condition()?;
                    self.expect(TokenKind::RParen)?;
                    return Ok(inner);
                }
            }
        }

        if matches!(self.peek_kind(), Some(TokenKind::Ident(s)) if s == "raster") {
            self.pos += 1;
            if let RasterTerm::Aggregate(source, aggregate) = self.raster()? {
                let Some(op) = self.compare_op() else {
                    return self.error("Expected a comparison after a pixel test");
                };
                let rhs = self.expr()?;
                return Ok(Condition::Pixels {
                    source,
                    aggregate,
                    op,
                    rhs,
                });
            }
            self.pos = start;
            self.references.truncate(references);
        }

        self.comparison()
    }

    fn comparison(&mut self) -> PResult<Condition> {
        let lhs = self.expr()?;
        match self.compare_op() {
            Some(op) => Ok(Condition::Compare {
                op,
                lhs,
                rhs: self.expr()?,
            }),
            None => Ok(Condition::Truthy(lhs)),
        }
    }

    fn compare_op(&mut self) -> Option<CompareOp> {
        let op = match self.peek_kind()? {
            TokenKind::Lt => CompareOp::Lt,
            TokenKind::Gt => CompareOp::Gt,
            TokenKind::Le => CompareOp::Le,
            TokenKind::Ge => CompareOp::Ge,
            TokenKind::EqEq => CompareOp::Eq,
            TokenKind::NotEq => CompareOp::Ne,
            _ => return None,
        };
        self.pos += 1;
        Some(op)
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}
