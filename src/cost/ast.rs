use crate::graph::DistanceMetric;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RasterStat {
    Sum,
    Mean,
    Median,
    Min,
    Max,
    Variance,
    StandDev,
    GradientSum,
    GradientMin,
    GradientMax,
    Ascent,
    Descent,
    TotalClimb,
}

impl RasterStat {
    pub const ALL: &'static [(&'static str, RasterStat)] = &[
        ("sum", RasterStat::Sum),
        ("mean", RasterStat::Mean),
        ("median", RasterStat::Median),
        ("min", RasterStat::Min),
        ("max", RasterStat::Max),
        ("variance", RasterStat::Variance),
        ("standDev", RasterStat::StandDev),
        ("gradientSum", RasterStat::GradientSum),
        ("gradientMin", RasterStat::GradientMin),
        ("gradientMax", RasterStat::GradientMax),
        ("ascent", RasterStat::Ascent),
        ("descent", RasterStat::Descent),
        ("totalClimb", RasterStat::TotalClimb),
    ];

    pub fn from_name(name: &str) -> Option<RasterStat> {
        Self::ALL
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, s)| *s)
    }
}

/// Where raster values for a term come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PixelSource {
    /// Pixels under the straight edge
    Line { raster: usize },
    /// Pixels on the cheapest 8-connected path between the edge's endpoints
    Path { raster: usize, heuristic: u8 },
}

impl PixelSource {
    pub fn raster(&self) -> usize {
        match self {
            PixelSource::Line { raster } | PixelSource::Path { raster, .. } => *raster,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PolygonTest {
    Crosses,
    Inside,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
}

impl CompareOp {
    pub fn apply(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            CompareOp::Lt => lhs < rhs,
            CompareOp::Gt => lhs > rhs,
            CompareOp::Le => lhs <= rhs,
            CompareOp::Ge => lhs >= rhs,
            CompareOp::Eq => lhs == rhs,
            CompareOp::Ne => lhs != rhs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PixelAggregate {
    /// Any sampled pixel satisfies the comparison
    Any,
    /// At least this percentage of pixels satisfy it
    Percent(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathFunction {
    Acos,
    Acosh,
    Asin,
    Asinh,
    Atan,
    Atan2,
    Ceil,
    Comb,
    Copysign,
    Cos,
    Cosh,
    Degrees,
    Exp,
    Fabs,
    Factorial,
    Floor,
    Fmod,
    Hypot,
    Isqrt,
    Ldexp,
    Log,
    Log10,
    Log2,
    Pow,
    Radians,
    Remainder,
    Sin,
    Sinh,
    Sqrt,
    Tan,
    Tanh,
    Trunc,
}

const MAX_FACTORIAL: f64 = 170.0;

fn is_integral(x: f64) -> bool {
    x.is_finite() && x.fract() == 0.0
}

impl MathFunction {
    pub fn from_name(name: &str) -> Option<MathFunction> {
        use MathFunction::*;
        Some(match name {
            "acos" => Acos,
            "acosh" => Acosh,
            "asin" => Asin,
            "asinh" => Asinh,
            "atan" => Atan,
            "atan2" => Atan2,
            "ceil" => Ceil,
            "comb" => Comb,
            "copysign" => Copysign,
            "cos" => Cos,
            "cosh" => Cosh,
            "degrees" => Degrees,
            "exp" => Exp,
            "fabs" => Fabs,
            "factorial" => Factorial,
            "floor" => Floor,
            "fmod" => Fmod,
            "hypot" => Hypot,
            "isqrt" => Isqrt,
            "ldexp" => Ldexp,
            "log" => Log,
            "log10" => Log10,
            "log2" => Log2,
            "pow" => Pow,
            "radians" => Radians,
            "remainder" => Remainder,
            "sin" => Sin,
            "sinh" => Sinh,
            "sqrt" => Sqrt,
            "tan" => Tan,
            "tanh" => Tanh,
            "trunc" => Trunc,
            _ => return None,
        })
    }

    /// Named constants usable as `math.pi` and friends.
    pub fn constant(name: &str) -> Option<f64> {
        match name {
            "pi" => Some(std::f64::consts::PI),
            "e" => Some(std::f64::consts::E),
            "tau" => Some(std::f64::consts::TAU),
            _ => None,
        }
    }

    /// Accepted argument counts (min, max).
    pub fn arity(&self) -> (usize, usize) {
        use MathFunction::*;
        match self {
            Atan2 | Comb | Copysign | Fmod | Ldexp | Pow | Remainder => (2, 2),
            Hypot => (1, usize::MAX),
            Log => (1, 2),
            _ => (1, 1),
        }
    }

    /// `None` on a domain error or a result that does not fit an f64.
    pub fn apply(&self, args: &[f64]) -> Option<f64> {
        use MathFunction::*;
        let x = *args.first()?;
        let y = args.get(1).copied();
        let value = match self {
            Acos if (-1.0..=1.0).contains(&x) => x.acos(),
            Acosh if x >= 1.0 => x.acosh(),
            Asin if (-1.0..=1.0).contains(&x) => x.asin(),
            Asinh => x.asinh(),
            Atan => x.atan(),
            Atan2 => x.atan2(y?),
            Ceil => x.ceil(),
            Comb => {
                let k = y?;
                if !is_integral(x) || !is_integral(k) || x < 0.0 || k < 0.0 {
                    return None;
                }
                if k > x {
                    0.0
                } else {
                    // the running product only grows, stop once it overflows
                    let k = k.min(x - k) as u64;
                    (0..k)
                        .try_fold(1.0, |acc: f64, i| {
                            let next = acc * (x - i as f64) / (i as f64 + 1.0);
                            next.is_finite().then_some(next)
                        })?
                        .round()
                }
            }
            Copysign => x.copysign(y?),
            Cos => x.cos(),
            Cosh => x.cosh(),
            Degrees => x.to_degrees(),
            Exp => x.exp(),
            Fabs => x.abs(),
            // 171! no longer fits an f64
            Factorial if is_integral(x) && (0.0..=MAX_FACTORIAL).contains(&x) => {
                (1..=x as u64).fold(1.0, |acc, i| acc * i as f64)
            }
            Floor => x.floor(),
            Fmod if y? != 0.0 => x % y?,
            Hypot => args.iter().map(|a| a * a).sum::<f64>().sqrt(),
            Isqrt if is_integral(x) && x >= 0.0 => x.sqrt().floor(),
            Ldexp if is_integral(y?) => x * 2f64.powi(y? as i32),
            Log if x > 0.0 => match y {
                None => x.ln(),
                Some(base) if base > 0.0 && base != 1.0 => x.ln() / base.ln(),
                Some(_) => return None,
            },
            Log10 if x > 0.0 => x.log10(),
            Log2 if x > 0.0 => x.log2(),
            Pow => x.powf(y?),
            Radians => x.to_radians(),
            Remainder if y? != 0.0 => x - (x / y?).round_ties_even() * y?,
            Sin => x.sin(),
            Sinh => x.sinh(),
            Sqrt if x >= 0.0 => x.sqrt(),
            Tan => x.tan(),
            Tanh => x.tanh(),
            Trunc => x.trunc(),
            _ => return None,
        };
        value.is_finite().then_some(value)
    }
}

/// Numeric expression tree of a cost formula.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(f64),
    Distance(DistanceMetric),
    Field(String),
    RasterStat {
        source: PixelSource,
        stat: RasterStat,
    },
    /// Length of the pixel path measured with a metric
    RasterPathLength {
        raster: usize,
        heuristic: u8,
        metric: DistanceMetric,
    },
    /// 1 when the predicate holds, 0 otherwise
    Polygon {
        index: usize,
        test: PolygonTest,
    },
    Conditional {
        condition: Box<Condition>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    MathCall {
        function: MathFunction,
        args: Vec<Expr>,
    },
    RandomRange {
        low: Box<Expr>,
        high: Box<Expr>,
    },
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Or(Box<Condition>, Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
    Compare {
        op: CompareOp,
        lhs: Expr,
        rhs: Expr,
    },
    /// Raster pixel values tested one by one against `rhs`
    Pixels {
        source: PixelSource,
        aggregate: PixelAggregate,
        op: CompareOp,
        rhs: Expr,
    },
    /// Non-zero is true
    Truthy(Expr),
}

/// Everything a formula refers to outside itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct References {
    pub fields: BTreeSet<String>,
    pub line_rasters: BTreeSet<usize>,
    pub path_rasters: BTreeSet<(usize, u8)>,
    pub polygons: BTreeSet<(usize, PolygonTest)>,
}

impl References {
    fn add_source(&mut self, source: &PixelSource) {
        match source {
            PixelSource::Line { raster } => {
                self.line_rasters.insert(*raster);
            }
            PixelSource::Path { raster, heuristic } => {
                self.path_rasters.insert((*raster, *heuristic));
            }
        }
    }
}

impl Expr {
    pub fn references(&self) -> References {
        let mut refs = References::default();
        self.collect(&mut refs);
        refs
    }

    fn collect(&self, refs: &mut References) {
        match self {
            Expr::Literal(_) | Expr::Distance(_) => {}
            Expr::Field(name) => {
                refs.fields.insert(name.clone());
            }
            Expr::RasterStat { source, .. } => refs.add_source(source),
            Expr::RasterPathLength {
                raster, heuristic, ..
            } => {
                refs.path_rasters.insert((*raster, *heuristic));
            }
            Expr::Polygon { index, test } => {
                refs.polygons.insert((*index, *test));
            }
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                condition.collect(refs);
                then.collect(refs);
                otherwise.collect(refs);
            }
            Expr::MathCall { args, .. } => args.iter().for_each(|a| a.collect(refs)),
            Expr::RandomRange { low, high } => {
                low.collect(refs);
                high.collect(refs);
            }
            Expr::Neg(inner) => inner.collect(refs),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect(refs);
                rhs.collect(refs);
            }
        }
    }
}

impl Condition {
    fn collect(&self, refs: &mut References) {
        match self {
            Condition::Or(a, b) | Condition::And(a, b) => {
                a.collect(refs);
                b.collect(refs);
            }
            Condition::Not(inner) => inner.collect(refs),
            Condition::Compare { lhs, rhs, .. } => {
                lhs.collect(refs);
                rhs.collect(refs);
            }
            Condition::Pixels { source, rhs, .. } => {
                refs.add_source(source);
                rhs.collect(refs);
            }
            Condition::Truthy(expr) => expr.collect(refs),
        }
    }
}
