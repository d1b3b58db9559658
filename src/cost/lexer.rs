use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TOKEN: Regex = Regex::new(
        r#"^(?:(?P<ws>\s+)|(?P<num>\d+(?:\.\d+)?(?:[eE][+-]?\d+)?|\.\d+(?:[eE][+-]?\d+)?)|(?P<ident>[A-Za-z_][A-Za-z0-9_]*)|(?P<str>"[^"]*")|(?P<op><=|>=|==|!=|\?\?|[-+*/()\[\]{};,:.%$?&<>]))"#
    )
    .unwrap();
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Ident(String),
    /// Double quoted text, quotes stripped
    Str(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Semicolon,
    Comma,
    Colon,
    Dot,
    Percent,
    Dollar,
    Question,
    DoubleQuestion,
    Ampersand,
    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    NotEq,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Number(n) => format!("number {n}"),
            TokenKind::Ident(s) => format!("'{s}'"),
            TokenKind::Str(s) => format!("\"{s}\""),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Semicolon => ";",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Dot => ".",
            TokenKind::Percent => "%",
            TokenKind::Dollar => "$",
            TokenKind::Question => "?",
            TokenKind::DoubleQuestion => "??",
            TokenKind::Ampersand => "&",
            TokenKind::Lt => "<",
            TokenKind::Gt => ">",
            TokenKind::Le => "<=",
            TokenKind::Ge => ">=",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Number(_) | TokenKind::Ident(_) | TokenKind::Str(_) => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offsets into the formula
    pub span: (usize, usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub message: String,
    pub span: (usize, usize),
}

fn operator(text: &str) -> Option<TokenKind> {
    Some(match text {
        "<=" => TokenKind::Le,
        ">=" => TokenKind::Ge,
        "==" => TokenKind::EqEq,
        "!=" => TokenKind::NotEq,
        "??" => TokenKind::DoubleQuestion,
        "+" => TokenKind::Plus,
        "-" => TokenKind::Minus,
        "*" => TokenKind::Star,
        "/" => TokenKind::Slash,
        "(" => TokenKind::LParen,
        ")" => TokenKind::RParen,
        "[" => TokenKind::LBracket,
        "]" => TokenKind::RBracket,
        "{" => TokenKind::LBrace,
        "}" => TokenKind::RBrace,
        ";" => TokenKind::Semicolon,
        "," => TokenKind::Comma,
        ":" => TokenKind::Colon,
        "." => TokenKind::Dot,
        "%" => TokenKind::Percent,
        "$" => TokenKind::Dollar,
        "?" => TokenKind::Question,
        "&" => TokenKind::Ampersand,
        "<" => TokenKind::Lt,
        ">" => TokenKind::Gt,
        _ => return None,
    })
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < input.len() {
        let rest = &input[pos..];
        let Some(caps) = TOKEN.captures(rest) else {
            let len = rest.chars().next().map_or(1, |c| c.len_utf8());
            return Err(LexError {
                message: format!("Unexpected character '{}'", &rest[..len]),
                span: (pos, pos + len),
            });
        };
        let Some(whole) = caps.get(0) else {
            break;
        };
        let end = pos + whole.end();
        let span = (pos, end);

        let kind = if caps.name("ws").is_some() {
            None
        } else if let Some(m) = caps.name("num") {
            let value = m.as_str().parse::<f64>().map_err(|_| LexError {
                message: format!("Invalid number '{}'", m.as_str()),
                span,
            })?;
            Some(TokenKind::Number(value))
        } else if let Some(m) = caps.name("ident") {
            Some(TokenKind::Ident(m.as_str().to_string()))
        } else if let Some(m) = caps.name("str") {
            let text = m.as_str();
            Some(TokenKind::Str(text[1..text.len() - 1].to_string()))
        } else {
            operator(whole.as_str())
        };

        if let Some(kind) = kind {
            tokens.push(Token { kind, span });
        }
        pos = end;
    }

    Ok(tokens)
}
