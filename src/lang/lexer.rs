//! RB-020: Indentation-aware tokenizer for the script dialect.
//!
//! Tokens are recognized by a `chumsky` character parser. A layout pass then
//! turns physical newlines into `Newline`/`Indent`/`Dedent` tokens: newlines
//! and indentation are significant only outside brackets, and blank or
//! comment-only lines never produce tokens. The layout pass also bounds how
//! deeply brackets, blocks and operator chains may nest.

use crate::core::error::{Error, Result};
use chumsky::prelude::*;
use std::fmt;

pub type Span = SimpleSpan;
pub type LexError<'src> = Rich<'src, char, Span>;

/// Deepest bracket nesting accepted in one logical line.
pub const MAX_BRACKET_DEPTH: usize = 32;
/// Deepest block indentation accepted.
pub const MAX_BLOCK_DEPTH: usize = 32;
/// Bound on the operators and brackets enclosing any one operand.
pub const MAX_EXPR_NESTING: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Ident(String),
    Int(i128),
    Str(String),

    Def,
    If,
    Elif,
    Else,
    For,
    In,
    Not,
    And,
    Or,
    Return,
    Pass,
    Break,
    Continue,
    None,
    True,
    False,

    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,

    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    SlashSlash,
    Percent,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    Newline,
    Indent,
    Dedent,
}

impl fmt::Display for Tok {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tok::Ident(s) => write!(f, "identifier {}", s),
            Tok::Int(i) => write!(f, "int {}", i),
            Tok::Str(s) => write!(f, "string {:?}", s),
            Tok::Newline => write!(f, "newline"),
            Tok::Indent => write!(f, "indent"),
            Tok::Dedent => write!(f, "outdent"),
            other => write!(f, "{}", punct_text(other)),
        }
    }
}

fn punct_text(t: &Tok) -> &'static str {
    match t {
        Tok::Def => "def",
        Tok::If => "if",
        Tok::Elif => "elif",
        Tok::Else => "else",
        Tok::For => "for",
        Tok::In => "in",
        Tok::Not => "not",
        Tok::And => "and",
        Tok::Or => "or",
        Tok::Return => "return",
        Tok::Pass => "pass",
        Tok::Break => "break",
        Tok::Continue => "continue",
        Tok::None => "None",
        Tok::True => "True",
        Tok::False => "False",
        Tok::LParen => "(",
        Tok::RParen => ")",
        Tok::LBracket => "[",
        Tok::RBracket => "]",
        Tok::LBrace => "{",
        Tok::RBrace => "}",
        Tok::Comma => ",",
        Tok::Colon => ":",
        Tok::Dot => ".",
        Tok::Assign => "=",
        Tok::PlusAssign => "+=",
        Tok::MinusAssign => "-=",
        Tok::StarAssign => "*=",
        Tok::Plus => "+",
        Tok::Minus => "-",
        Tok::Star => "*",
        Tok::StarStar => "**",
        Tok::Slash => "/",
        Tok::SlashSlash => "//",
        Tok::Percent => "%",
        Tok::Eq => "==",
        Tok::Ne => "!=",
        Tok::Lt => "<",
        Tok::Le => "<=",
        Tok::Gt => ">",
        Tok::Ge => ">=",
        _ => "?",
    }
}

/// Maps byte offsets back to 1-based line and column numbers.
pub struct SourceMap<'src> {
    src: &'src str,
    line_starts: Vec<usize>,
}

impl<'src> SourceMap<'src> {
    pub fn new(src: &'src str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(src.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { src, line_starts }
    }

    pub fn src(&self) -> &'src str {
        self.src
    }

    fn line_index(&self, offset: usize) -> usize {
        self.line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1)
    }

    pub fn line(&self, offset: usize) -> usize {
        self.line_index(offset) + 1
    }

    /// Line and character column of `offset`.
    pub fn position(&self, offset: usize) -> (usize, usize) {
        let idx = self.line_index(offset);
        let start = self.line_starts[idx];
        let offset = offset.min(self.src.len());
        let col = self.src.get(start..offset).map_or(0, |s| s.chars().count());
        (idx + 1, col + 1)
    }

    /// Byte offset of a line/column pair, clamped to the source.
    pub fn offset(&self, line: usize, col: usize) -> usize {
        let Some(&start) = self.line_starts.get(line.saturating_sub(1)) else {
            return self.src.len();
        };
        self.src[start..]
            .char_indices()
            .nth(col.saturating_sub(1))
            .map_or(self.src.len(), |(i, _)| start + i)
    }

    /// Indentation width before `offset` on its line. Tabs advance to the
    /// next multiple of eight.
    fn indent_width(&self, offset: usize) -> usize {
        let start = self.line_starts[self.line_index(offset)];
        self.src[start..offset].chars().fold(0, |w, c| match c {
            '\t' => w + 8 - w % 8,
            ' ' => w + 1,
            _ => w,
        })
    }

    pub fn syntax_error(&self, file: &str, offset: usize, msg: impl Into<String>) -> Error {
        let (line, col) = self.position(offset);
        Error::Syntax {
            file: file.to_string(),
            line,
            col,
            msg: msg.into(),
        }
    }
}

/// Tokenize a source file. `file` is used only for error positions.
pub fn tokenize(map: &SourceMap<'_>, file: &str) -> Result<Vec<(Tok, Span)>> {
    let (tokens, errors) = lexer().parse(map.src()).into_output_errors();
    if let Some(err) = errors.into_iter().next() {
        return Err(map.syntax_error(file, err.span().start, err.reason().to_string()));
    }
    layout(map, file, tokens.unwrap_or_default())
}

#[derive(Clone)]
enum Fragment<'src> {
    Char(char),
    Slice(&'src str),
    Skip,
}

fn int_literal(text: &str, radix: u32) -> std::result::Result<i128, String> {
    let digits: String = text.chars().filter(|c| *c != '_').collect();
    if radix == 10 && digits.len() > 1 && digits.starts_with('0') {
        return Err(format!(
            "invalid int literal {}: use 0o prefix for octal",
            digits
        ));
    }
    i128::from_str_radix(&digits, radix)
        .map_err(|e| format!("invalid int literal {:?}: {}", digits, e))
}

fn keyword(word: &str) -> Tok {
    match word {
        "def" => Tok::Def,
        "if" => Tok::If,
        "elif" => Tok::Elif,
        "else" => Tok::Else,
        "for" => Tok::For,
        "in" => Tok::In,
        "not" => Tok::Not,
        "and" => Tok::And,
        "or" => Tok::Or,
        "return" => Tok::Return,
        "pass" => Tok::Pass,
        "break" => Tok::Break,
        "continue" => Tok::Continue,
        "None" => Tok::None,
        "True" => Tok::True,
        "False" => Tok::False,
        _ => Tok::Ident(word.to_string()),
    }
}

fn cooked_escape<'src>(
) -> impl Parser<'src, &'src str, Fragment<'src>, extra::Err<LexError<'src>>> + Clone {
    let hex = just('x')
        .ignore_then(
            any()
                .filter(char::is_ascii_hexdigit)
                .repeated()
                .exactly(2)
                .to_slice(),
        )
        .validate(|hex: &str, e, emitter| {
            match u32::from_str_radix(hex, 16).ok().and_then(char::from_u32) {
                Some(c) => Fragment::Char(c),
                None => {
                    emitter.emit(Rich::custom(e.span(), format!("invalid escape \\x{}", hex)));
                    Fragment::Skip
                }
            }
        });

    just('\\').ignore_then(choice((
        just('n').to(Fragment::Char('\n')),
        just('t').to(Fragment::Char('\t')),
        just('r').to(Fragment::Char('\r')),
        just('0').to(Fragment::Char('\0')),
        just('\\').to(Fragment::Char('\\')),
        just('\'').to(Fragment::Char('\'')),
        just('"').to(Fragment::Char('"')),
        just('\n').to(Fragment::Skip),
        hex,
    )))
    .or(just('\\').then(any()).to_slice().map(Fragment::Slice))
}

/// A string literal between `delim`s. Only triple-quoted strings may span
/// lines; raw strings keep every backslash.
fn string_literal<'src>(
    delim: &'static str,
    raw: bool,
) -> impl Parser<'src, &'src str, String, extra::Err<LexError<'src>>> + Clone {
    let forbidden = if delim.len() == 3 { "\\" } else { "\\\n" };
    let escape = if raw {
        just('\\').then(any()).to_slice().map(Fragment::Slice).boxed()
    } else {
        cooked_escape().boxed()
    };
    let plain = none_of(forbidden)
        .and_is(just(delim).not())
        .map(Fragment::Char);

    just(delim)
        .ignore_then(choice((escape, plain.boxed())).repeated().collect::<Vec<_>>())
        .then_ignore(just(delim))
        .map(|fragments| {
            let mut out = String::new();
            for fragment in fragments {
                match fragment {
                    Fragment::Char(c) => out.push(c),
                    Fragment::Slice(s) => out.push_str(s),
                    Fragment::Skip => {}
                }
            }
            out
        })
}

fn lexer<'src>() -> impl Parser<'src, &'src str, Vec<(Tok, Span)>, extra::Err<LexError<'src>>> {
    let word_char = |c: &char| c.is_ascii_alphanumeric() || *c == '_';

    let radix_int = just('0')
        .ignore_then(choice((
            one_of("xX").to(16u32),
            one_of("oO").to(8),
            one_of("bB").to(2),
        )))
        .then(any().filter(word_char).repeated().to_slice())
        .validate(|(radix, digits): (u32, &str), e, emitter| {
            match int_literal(digits, radix) {
                Ok(n) => Tok::Int(n),
                Err(msg) => {
                    emitter.emit(Rich::custom(e.span(), msg));
                    Tok::Int(0)
                }
            }
        });

    let decimal_int = any()
        .filter(char::is_ascii_digit)
        .then(any().filter(word_char).repeated())
        .to_slice()
        .then(just('.').then(text::digits(10)).or_not())
        .validate(|(digits, fraction): (&str, Option<_>), e, emitter| {
            let parsed = match fraction {
                Some(_) => Err("floating-point numbers are not supported".to_string()),
                None => int_literal(digits, 10),
            };
            match parsed {
                Ok(n) => Tok::Int(n),
                Err(msg) => {
                    emitter.emit(Rich::custom(e.span(), msg));
                    Tok::Int(0)
                }
            }
        });

    let string = choice((
        just('r').ignore_then(choice((
            string_literal("'''", true),
            string_literal("\"\"\"", true),
            string_literal("'", true),
            string_literal("\"", true),
        ))),
        string_literal("'''", false),
        string_literal("\"\"\"", false),
        string_literal("'", false),
        string_literal("\"", false),
    ))
    .map(Tok::Str);

    let word = any()
        .filter(|c: &char| c.is_alphabetic() || *c == '_')
        .then(any().filter(|c: &char| c.is_alphanumeric() || *c == '_').repeated())
        .to_slice()
        .map(keyword);

    let bracket = choice((
        just('(').to(Tok::LParen),
        just(')').to(Tok::RParen),
        just('[').to(Tok::LBracket),
        just(']').to(Tok::RBracket),
        just('{').to(Tok::LBrace),
        just('}').to(Tok::RBrace),
    ));

    let compound = choice((
        just("**").to(Tok::StarStar),
        just("*=").to(Tok::StarAssign),
        just("//").to(Tok::SlashSlash),
        just("+=").to(Tok::PlusAssign),
        just("-=").to(Tok::MinusAssign),
        just("==").to(Tok::Eq),
        just("!=").to(Tok::Ne),
        just("<=").to(Tok::Le),
        just(">=").to(Tok::Ge),
    ));

    let single = choice((
        just(',').to(Tok::Comma),
        just(':').to(Tok::Colon),
        just('.').to(Tok::Dot),
        just('=').to(Tok::Assign),
        just('<').to(Tok::Lt),
        just('>').to(Tok::Gt),
        just('+').to(Tok::Plus),
        just('-').to(Tok::Minus),
        just('*').to(Tok::Star),
        just('/').to(Tok::Slash),
        just('%').to(Tok::Percent),
        just('\n').to(Tok::Newline),
    ));

    let token = choice((
        radix_int,
        decimal_int,
        string,
        word,
        bracket,
        compound,
        single,
    ));

    let blank = choice((
        one_of(" \t\r\x0c").ignored(),
        just('#').then(none_of('\n').repeated()).ignored(),
        just("\\\n").ignored(),
    ))
    .repeated();

    blank.clone().ignore_then(
        token
            .map_with(|tok, e| (tok, e.span()))
            .then_ignore(blank)
            .repeated()
            .collect(),
    )
    .then_ignore(end())
}

/// Operator-chain depth per open bracket, used to bound expression nesting.
struct Nesting {
    levels: Vec<usize>,
    total: usize,
}

impl Nesting {
    fn depth(&self) -> usize {
        self.total + self.levels.len() - 1
    }

    fn bump(&mut self) {
        if let Some(top) = self.levels.last_mut() {
            *top += 1;
            self.total += 1;
        }
    }

    fn reset(&mut self) {
        if let Some(top) = self.levels.last_mut() {
            self.total -= *top;
            *top = 0;
        }
    }

    fn open(&mut self) {
        self.levels.push(0);
    }

    /// Closing a bracket leaves one operand behind in the enclosing level.
    fn close(&mut self) {
        if self.levels.len() > 1 {
            if let Some(ops) = self.levels.pop() {
                self.total -= ops;
            }
        }
        self.bump();
    }
}

fn layout(map: &SourceMap<'_>, file: &str, raw: Vec<(Tok, Span)>) -> Result<Vec<(Tok, Span)>> {
    let mut out: Vec<(Tok, Span)> = Vec::with_capacity(raw.len() + 16);
    let mut indents = vec![0usize];
    let mut nesting = Nesting {
        levels: vec![0],
        total: 0,
    };
    let mut line_start = true;
    let ends_line = |out: &[(Tok, Span)]| {
        matches!(
            out.last(),
            None | Some((Tok::Newline | Tok::Indent | Tok::Dedent, _))
        )
    };

    for (tok, span) in raw {
        let depth = nesting.levels.len() - 1;
        if tok == Tok::Newline {
            if depth == 0 {
                if !ends_line(&out) {
                    out.push((Tok::Newline, span));
                }
                nesting.reset();
                line_start = true;
            }
            continue;
        }

        if line_start {
            line_start = false;
            let width = map.indent_width(span.start);
            let at = Span::from(span.start..span.start);
            if width > indents.last().copied().unwrap_or(0) {
                if indents.len() > MAX_BLOCK_DEPTH {
                    return Err(map.syntax_error(file, span.start, "too many levels of indentation"));
                }
                indents.push(width);
                out.push((Tok::Indent, at));
            } else {
                while width < indents.last().copied().unwrap_or(0) {
                    indents.pop();
                    out.push((Tok::Dedent, at));
                }
                if width != indents.last().copied().unwrap_or(0) {
                    return Err(map.syntax_error(
                        file,
                        span.start,
                        "unindent does not match any outer indentation level",
                    ));
                }
            }
        }

        match tok {
            Tok::LParen | Tok::LBracket | Tok::LBrace => {
                if depth >= MAX_BRACKET_DEPTH {
                    return Err(map.syntax_error(file, span.start, "too many nested brackets"));
                }
                nesting.open();
            }
            Tok::RParen | Tok::RBracket | Tok::RBrace => nesting.close(),
            Tok::Comma
            | Tok::Colon
            | Tok::Assign
            | Tok::PlusAssign
            | Tok::MinusAssign
            | Tok::StarAssign => nesting.reset(),
            Tok::Ident(_) | Tok::Int(_) | Tok::Str(_) => {}
            Tok::None | Tok::True | Tok::False => {}
            Tok::Def | Tok::Return | Tok::Pass | Tok::Break | Tok::Continue | Tok::Elif => {}
            _ => nesting.bump(),
        }
        if nesting.depth() > MAX_EXPR_NESTING {
            return Err(map.syntax_error(file, span.start, "expression nested too deeply"));
        }
        out.push((tok, span));
    }

    let end = out.last().map_or(0, |(_, span)| span.end);
    let eof = Span::from(end..end);
    if !ends_line(&out) {
        out.push((Tok::Newline, eof));
    }
    while indents.len() > 1 {
        indents.pop();
        out.push((Tok::Dedent, eof));
    }
    Ok(out)
}
