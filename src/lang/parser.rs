//! RB-021: Token parser for the script dialect, built on `chumsky`.
//!
//! Operator precedence is handled by a Pratt parser. Context rules that the
//! grammar alone cannot express (targets, parameter order, `return` and
//! `load` placement) are checked with `validate`, so every violation comes
//! back as a positioned syntax error.

use super::ast::*;
use super::lexer::{tokenize, SourceMap, Span, Tok};
use crate::core::error::{Error, Result};
use ariadne::{Config, Label, Report, ReportKind, Source};
use chumsky::input::ValueInput;
use chumsky::pratt::*;
use chumsky::prelude::*;
use chumsky::recursive::{Indirect, Recursive};
use std::rc::Rc;

type Extra<'src> = extra::Err<Rich<'src, Tok, Span>>;
type Boxed<'src, I, O> = chumsky::Boxed<'src, 'src, I, O, Extra<'src>>;

/// Parse a whole file.
pub fn parse(src: &str, file: &str) -> Result<Program> {
    let map = SourceMap::new(src);
    let tokens = tokenize(&map, file)?;
    let end = tokens.last().map_or(0, |(_, span)| span.end);
    let eoi = Span::from(end..end);
    let (stmts, errors) = program(&map)
        .parse(tokens.as_slice().map(eoi, |(t, s)| (t, s)))
        .into_output_errors();
    if let Some(err) = errors.into_iter().next() {
        return Err(map.syntax_error(file, err.span().start, err.reason().to_string()));
    }
    Ok(Program {
        file: file.to_string(),
        stmts: stmts.unwrap_or_default(),
    })
}

/// Render a syntax error against its source as an annotated snippet.
/// Returns `None` for any other kind of error.
pub fn report(src: &str, err: &Error) -> Option<String> {
    let Error::Syntax {
        file,
        line,
        col,
        msg,
    } = err
    else {
        return None;
    };
    let map = SourceMap::new(src);
    let start = map.offset(*line, *col);
    let end = src[start..]
        .chars()
        .next()
        .map_or(start, |c| start + c.len_utf8());
    let mut buf = Vec::new();
    Report::build(ReportKind::Error, (file.as_str(), start..end))
        .with_config(Config::default().with_color(false))
        .with_message("syntax error")
        .with_label(Label::new((file.as_str(), start..end)).with_message(msg))
        .finish()
        .write((file.as_str(), Source::from(src)), &mut buf)
        .ok()?;
    String::from_utf8(buf).ok()
}

/// Expression parsers shared by every statement form.
struct Grammar<'src, I: ValueInput<'src, Token = Tok, Span = Span>> {
    map: &'src SourceMap<'src>,
    test: Boxed<'src, I, Expr>,
    exprs: Boxed<'src, I, Expr>,
    targets: Boxed<'src, I, Expr>,
}

enum ListTail {
    Clauses(Vec<Clause>),
    Items(Vec<Expr>),
}

enum Trailer {
    Attr(String),
    Call(Vec<Arg>),
    Index(Expr),
    Slice(Option<Expr>, Option<Expr>),
}

fn ident<'src, I>() -> impl Parser<'src, I, String, Extra<'src>> + Clone
where
    I: ValueInput<'src, Token = Tok, Span = Span>,
{
    select! { Tok::Ident(name) => name }
}

fn string<'src, I>() -> impl Parser<'src, I, String, Extra<'src>> + Clone
where
    I: ValueInput<'src, Token = Tok, Span = Span>,
{
    select! { Tok::Str(s) => s }
}

/// `item (',' item)* ','?`, yielding a tuple when a comma is present.
fn tuple_of<'src, I, P>(
    item: P,
    map: &'src SourceMap<'src>,
) -> impl Parser<'src, I, Expr, Extra<'src>> + Clone
where
    I: ValueInput<'src, Token = Tok, Span = Span>,
    P: Parser<'src, I, Expr, Extra<'src>> + Clone,
{
    item.clone()
        .then(just(Tok::Comma).ignore_then(item).repeated().collect::<Vec<_>>())
        .then(just(Tok::Comma).or_not())
        .map_with(move |((first, rest), trailing), e| {
            if rest.is_empty() && trailing.is_none() {
                return first;
            }
            let mut items = vec![first];
            items.extend(rest);
            Expr {
                kind: ExprKind::Tuple(items),
                line: map.line(e.span().start),
            }
        })
}

fn check_target(e: &Expr, augmented: bool) -> bool {
    match &e.kind {
        ExprKind::Name(_) | ExprKind::Attr(..) | ExprKind::Index(..) => true,
        ExprKind::Tuple(items) | ExprKind::List(items) if !augmented => {
            items.iter().all(|i| check_target(i, false))
        }
        _ => false,
    }
}

fn node(map: &SourceMap<'_>, span: Span, kind: ExprKind) -> Expr {
    Expr {
        kind,
        line: map.line(span.start),
    }
}

fn expressions<'src, I>(map: &'src SourceMap<'src>) -> Grammar<'src, I>
where
    I: ValueInput<'src, Token = Tok, Span = Span>,
{
    let mut test: Recursive<Indirect<'src, 'src, I, Expr, Extra<'src>>> = Recursive::declare();
    let mut primary: Recursive<Indirect<'src, 'src, I, Expr, Extra<'src>>> = Recursive::declare();

    let targets = tuple_of(primary.clone(), map)
        .validate(|target: Expr, e, emitter| {
            if !check_target(&target, false) {
                emitter.emit(Rich::custom(e.span(), "cannot assign to this expression"));
            }
            target
        })
        .boxed();

    let or_test = primary
        .clone()
        .pratt((
            infix(left(1), just(Tok::Or), move |l, _, r, e| {
                node(map, e.span(), ExprKind::Or(Box::new(l), Box::new(r)))
            }),
            infix(left(2), just(Tok::And), move |l, _, r, e| {
                node(map, e.span(), ExprKind::And(Box::new(l), Box::new(r)))
            }),
            prefix(3, just(Tok::Not), move |_, operand, e| {
                node(map, e.span(), ExprKind::Unary(UnaryOp::Not, Box::new(operand)))
            }),
            infix(
                left(4),
                choice((
                    select! {
                        Tok::Eq => BinOp::Eq,
                        Tok::Ne => BinOp::Ne,
                        Tok::Lt => BinOp::Lt,
                        Tok::Le => BinOp::Le,
                        Tok::Gt => BinOp::Gt,
                        Tok::Ge => BinOp::Ge,
                        Tok::In => BinOp::In,
                    },
                    just(Tok::Not).then(just(Tok::In)).to(BinOp::NotIn),
                )),
                move |l, op, r, e| node(map, e.span(), ExprKind::Binary(Box::new(l), op, Box::new(r))),
            ),
            infix(
                left(5),
                select! { Tok::Plus => BinOp::Add, Tok::Minus => BinOp::Sub },
                move |l, op, r, e| node(map, e.span(), ExprKind::Binary(Box::new(l), op, Box::new(r))),
            ),
            infix(
                left(6),
                select! {
                    Tok::Star => BinOp::Mul,
                    Tok::Slash => BinOp::FloorDiv,
                    Tok::SlashSlash => BinOp::FloorDiv,
                    Tok::Percent => BinOp::Mod,
                },
                move |l, op, r, e| node(map, e.span(), ExprKind::Binary(Box::new(l), op, Box::new(r))),
            ),
            prefix(
                7,
                select! { Tok::Minus => UnaryOp::Neg, Tok::Plus => UnaryOp::Pos },
                move |op, operand, e| node(map, e.span(), ExprKind::Unary(op, Box::new(operand))),
            ),
        ))
        .boxed();

    let exprs = tuple_of(test.clone(), map).boxed();

    let literal = select! {
        Tok::None => ExprKind::None,
        Tok::True => ExprKind::Bool(true),
        Tok::False => ExprKind::Bool(false),
        Tok::Int(i) => ExprKind::Int(i),
        Tok::Str(s) => ExprKind::Str(Rc::from(s)),
        Tok::Ident(name) => ExprKind::Name(name),
    }
    .map_with(move |kind, e| node(map, e.span(), kind));

    let parenthesized = tuple_of(test.clone(), map)
        .or_not()
        .delimited_by(just(Tok::LParen), just(Tok::RParen))
        .map_with(move |inner, e| {
            let span = e.span();
            inner.unwrap_or_else(|| node(map, span, ExprKind::Tuple(Vec::new())))
        });

    let for_clause = just(Tok::For)
        .ignore_then(targets.clone())
        .then_ignore(just(Tok::In))
        .then(or_test.clone())
        .map(|(target, iter)| Clause::For(target, iter));
    let clause = choice((
        for_clause.clone(),
        just(Tok::If).ignore_then(or_test.clone()).map(Clause::If),
    ));
    let comprehension = for_clause
        .then(clause.repeated().collect::<Vec<_>>())
        .map(|(first, rest)| {
            let mut clauses = vec![first];
            clauses.extend(rest);
            clauses
        });

    let list = test
        .clone()
        .then(choice((
            comprehension.map(ListTail::Clauses),
            just(Tok::Comma)
                .ignore_then(test.clone())
                .repeated()
                .collect::<Vec<_>>()
                .then_ignore(just(Tok::Comma).or_not())
                .map(ListTail::Items),
        )))
        .or_not()
        .delimited_by(just(Tok::LBracket), just(Tok::RBracket))
        .map_with(move |display, e| {
            let kind = match display {
                None => ExprKind::List(Vec::new()),
                Some((elt, ListTail::Clauses(clauses))) => ExprKind::Comprehension {
                    elt: Box::new(elt),
                    clauses,
                },
                Some((first, ListTail::Items(rest))) => {
                    let mut items = vec![first];
                    items.extend(rest);
                    ExprKind::List(items)
                }
            };
            node(map, e.span(), kind)
        });

    let dict = test
        .clone()
        .then_ignore(just(Tok::Colon))
        .then(test.clone())
        .separated_by(just(Tok::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Tok::LBrace), just(Tok::RBrace))
        .map_with(move |entries, e| node(map, e.span(), ExprKind::Dict(entries)));

    let operand = choice((literal, parenthesized, list, dict));

    let arg = choice((
        just(Tok::Star).ignore_then(test.clone()).map(Arg::Star),
        just(Tok::StarStar).ignore_then(test.clone()).map(Arg::StarStar),
        ident()
            .then_ignore(just(Tok::Assign))
            .then(test.clone())
            .map(|(name, value)| Arg::Named(name, value)),
        test.clone().map(Arg::Positional),
    ));
    let call_args = arg
        .separated_by(just(Tok::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
        .validate(|args: Vec<Arg>, e, emitter| {
            let mut named = false;
            for arg in &args {
                match arg {
                    Arg::Named(..) | Arg::StarStar(_) => named = true,
                    Arg::Positional(_) if named => {
                        emitter.emit(Rich::custom(
                            e.span(),
                            "positional argument may not follow named",
                        ));
                        break;
                    }
                    _ => {}
                }
            }
            args
        })
        .delimited_by(just(Tok::LParen), just(Tok::RParen));

    let subscript = choice((
        exprs
            .clone()
            .or_not()
            .then_ignore(just(Tok::Colon))
            .then(test.clone().or_not())
            .map(|(lo, hi)| Trailer::Slice(lo, hi)),
        exprs.clone().map(Trailer::Index),
    ))
    .delimited_by(just(Tok::LBracket), just(Tok::RBracket));

    let trailer = choice((
        just(Tok::Dot).ignore_then(ident()).map(Trailer::Attr),
        call_args.map(Trailer::Call),
        subscript,
    ));

    primary.define(operand.foldl_with(trailer.repeated(), move |obj, trailer, e| {
        let obj = Box::new(obj);
        let kind = match trailer {
            Trailer::Attr(name) => ExprKind::Attr(obj, name),
            Trailer::Call(args) => ExprKind::Call { func: obj, args },
            Trailer::Index(index) => ExprKind::Index(obj, Box::new(index)),
            Trailer::Slice(lo, hi) => ExprKind::Slice {
                obj,
                lo: lo.map(Box::new),
                hi: hi.map(Box::new),
            },
        };
        node(map, e.span(), kind)
    }));

    test.define(
        or_test
            .clone()
            .then(
                just(Tok::If)
                    .ignore_then(or_test)
                    .then_ignore(just(Tok::Else))
                    .then(test.clone())
                    .or_not(),
            )
            .map_with(move |(then, cond), e| match cond {
                None => then,
                Some((cond, otherwise)) => node(
                    map,
                    e.span(),
                    ExprKind::Cond {
                        cond: Box::new(cond),
                        then: Box::new(then),
                        otherwise: Box::new(otherwise),
                    },
                ),
            }),
    );

    Grammar {
        map,
        test: test.boxed(),
        exprs,
        targets,
    }
}

fn simple_statement<'src, I>(g: &Grammar<'src, I>, in_function: bool) -> Boxed<'src, I, Stmt>
where
    I: ValueInput<'src, Token = Tok, Span = Span>,
{
    let map = g.map;

    let return_stmt = just(Tok::Return)
        .ignore_then(g.exprs.clone().or_not())
        .validate(move |value, e, emitter| {
            if !in_function {
                emitter.emit(Rich::custom(e.span(), "return statement not within a function"));
            }
            StmtKind::Return(value)
        });

    let symbol = choice((
        string().map(|s| (s.clone(), s)),
        ident().then_ignore(just(Tok::Assign)).then(string()),
    ));
    let load_stmt = select! { Tok::Ident(name) if name == "load" => () }
        .ignore_then(
            string()
                .then(just(Tok::Comma).ignore_then(symbol).repeated().collect::<Vec<_>>())
                .then_ignore(just(Tok::Comma).or_not())
                .delimited_by(just(Tok::LParen), just(Tok::RParen)),
        )
        .validate(move |(module, symbols): (String, Vec<(String, String)>), e, emitter| {
            if in_function {
                emitter.emit(Rich::custom(e.span(), "load statement within a function"));
            } else if symbols.is_empty() {
                emitter.emit(Rich::custom(
                    e.span(),
                    "load statement must import at least 1 symbol",
                ));
            }
            StmtKind::Load { module, symbols }
        });

    let assign_op = select! {
        Tok::Assign => None,
        Tok::PlusAssign => Some(BinOp::Add),
        Tok::MinusAssign => Some(BinOp::Sub),
        Tok::StarAssign => Some(BinOp::Mul),
    };
    let assign_or_expr = g
        .exprs
        .clone()
        .then(assign_op.then(g.exprs.clone()).or_not())
        .validate(|(lhs, rhs), e, emitter| match rhs {
            None => StmtKind::Expr(lhs),
            Some((op, rhs)) => {
                if !check_target(&lhs, op.is_some()) {
                    emitter.emit(Rich::custom(e.span(), "cannot assign to this expression"));
                }
                match op {
                    None => StmtKind::Assign(lhs, rhs),
                    Some(op) => StmtKind::AugAssign(lhs, op, rhs),
                }
            }
        });

    choice((
        just(Tok::Pass).to(StmtKind::Pass),
        just(Tok::Break).to(StmtKind::Break),
        just(Tok::Continue).to(StmtKind::Continue),
        return_stmt,
        load_stmt,
        assign_or_expr,
    ))
    .map_with(move |kind, e| Stmt {
        kind,
        line: map.line(e.span().start),
    })
    .boxed()
}

/// `':' simple NEWLINE` or `':' NEWLINE INDENT stmt+ DEDENT`.
fn suite<'src, I>(
    stmt: Boxed<'src, I, Stmt>,
    simple: Boxed<'src, I, Stmt>,
) -> impl Parser<'src, I, Vec<Stmt>, Extra<'src>> + Clone
where
    I: ValueInput<'src, Token = Tok, Span = Span>,
{
    let block = just(Tok::Newline).ignore_then(
        stmt.repeated()
            .at_least(1)
            .collect::<Vec<_>>()
            .delimited_by(just(Tok::Indent), just(Tok::Dedent)),
    );
    just(Tok::Colon).ignore_then(choice((
        block,
        simple.then_ignore(just(Tok::Newline)).map(|s| vec![s]),
    )))
}

fn statement<'src, I>(g: &Grammar<'src, I>, in_function: bool) -> Boxed<'src, I, Stmt>
where
    I: ValueInput<'src, Token = Tok, Span = Span>,
{
    let map = g.map;
    let function_body = (!in_function).then(|| (statement(g, true), simple_statement(g, true)));
    let simple = simple_statement(g, in_function);
    let test = g.test.clone();
    let exprs = g.exprs.clone();
    let targets = g.targets.clone();

    recursive(move |stmt| {
        let stmt = stmt.boxed();
        let at = move |span: Span| map.line(span.start);
        let body = suite(stmt.clone(), simple.clone());
        let fn_body = match &function_body {
            Some((stmt, simple)) => suite(stmt.clone(), simple.clone()).boxed(),
            None => body.clone().boxed(),
        };

        let param = ident()
            .then(just(Tok::Assign).ignore_then(test.clone()).or_not())
            .map(|(name, default)| Param { name, default });
        let params = param
            .separated_by(just(Tok::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Tok::LParen), just(Tok::RParen))
            .validate(|params: Vec<Param>, e, emitter| {
                for (i, p) in params.iter().enumerate() {
                    if params[..i].iter().any(|q| q.name == p.name) {
                        emitter.emit(Rich::custom(
                            e.span(),
                            format!("duplicate parameter: {}", p.name),
                        ));
                    } else if p.default.is_none() && params[..i].iter().any(|q| q.default.is_some()) {
                        emitter.emit(Rich::custom(
                            e.span(),
                            format!("required parameter {} may not follow optional", p.name),
                        ));
                    }
                }
                params
            });
        let def_stmt = just(Tok::Def)
            .ignore_then(ident())
            .then(params)
            .then(fn_body)
            .map_with(move |((name, params), body), e| Stmt {
                kind: StmtKind::Def(Rc::new(FuncDef { name, params, body })),
                line: at(e.span()),
            });

        let if_stmt = just(Tok::If)
            .ignore_then(test.clone())
            .then(body.clone())
            .then(
                just(Tok::Elif)
                    .ignore_then(test.clone())
                    .then(body.clone())
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .then(just(Tok::Else).ignore_then(body.clone()).or_not())
            .map_with(move |(((cond, then), elifs), otherwise), e| {
                let mut arms = vec![(cond, then)];
                arms.extend(elifs);
                Stmt {
                    kind: StmtKind::If(arms, otherwise),
                    line: at(e.span()),
                }
            });

        let for_stmt = just(Tok::For)
            .ignore_then(targets.clone())
            .then_ignore(just(Tok::In))
            .then(exprs.clone())
            .then(body)
            .map_with(move |((target, iter), body), e| Stmt {
                kind: StmtKind::For(target, iter, body),
                line: at(e.span()),
            });

        choice((
            def_stmt,
            if_stmt,
            for_stmt,
            simple.clone().then_ignore(just(Tok::Newline)),
        ))
    })
    .boxed()
}

fn program<'src, I>(map: &'src SourceMap<'src>) -> impl Parser<'src, I, Vec<Stmt>, Extra<'src>>
where
    I: ValueInput<'src, Token = Tok, Span = Span>,
{
    let g = expressions(map);
    let newlines = just(Tok::Newline).repeated();
    newlines
        .clone()
        .ignore_then(
            statement(&g, false)
                .then_ignore(newlines)
                .repeated()
                .collect(),
        )
        .then_ignore(end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_def_with_defaults() {
        let prog = parse(
            "def configure(image, lease=60*60*12, hostname=None):\n  return image\n",
            "t.star",
        )
        .unwrap();
        let StmtKind::Def(def) = &prog.stmts[0].kind else {
            panic!("expected def");
        };
        assert_eq!(def.name, "configure");
        assert_eq!(def.params.len(), 3);
        assert!(def.params[0].default.is_none());
        assert!(def.params[1].default.is_some());
    }

    #[test]
    fn test_parser_parameter_rules() {
        let err = parse("def f(a, a):\n  pass\n", "t.star").unwrap_err();
        assert!(err.to_string().contains("duplicate parameter: a"), "{}", err);
        let err = parse("def f(a=1, b):\n  pass\n", "t.star").unwrap_err();
        assert!(err.to_string().contains("may not follow optional"), "{}", err);
    }

    #[test]
    fn test_parser_load_symbols_and_alias() {
        let prog = parse(r#"load("pi.lib", "pi", unix="unix_helpers")"#, "t.star").unwrap();
        let StmtKind::Load { module, symbols } = &prog.stmts[0].kind else {
            panic!("expected load");
        };
        assert_eq!(module, "pi.lib");
        assert_eq!(
            symbols,
            &vec![
                ("pi".to_string(), "pi".to_string()),
                ("unix".to_string(), "unix_helpers".to_string())
            ]
        );
    }

    #[test]
    fn test_parser_load_needs_a_symbol() {
        let err = parse("load('a.star')\n", "t.star").unwrap_err();
        assert!(err.to_string().contains("at least 1 symbol"), "{}", err);
    }

    #[test]
    fn test_parser_load_rejected_inside_function() {
        let err = parse("def f():\n  load('a', 'b')\n", "t.star").unwrap_err();
        assert!(err.to_string().contains("load statement within a function"));
    }

    #[test]
    fn test_parser_return_outside_function() {
        let err = parse("return 1\n", "t.star").unwrap_err();
        assert!(err.to_string().contains("return statement not within a function"));
        assert!(parse("def f():\n  if x:\n    return\n  return 1\n", "t.star").is_ok());
    }

    #[test]
    fn test_parser_if_elif_else() {
        let prog = parse(
            "if a:\n  x = 1\nelif b:\n  x = 2\nelse:\n  x = 3\n",
            "t.star",
        )
        .unwrap();
        let StmtKind::If(arms, otherwise) = &prog.stmts[0].kind else {
            panic!("expected if");
        };
        assert_eq!(arms.len(), 2);
        assert!(otherwise.is_some());
    }

    #[test]
    fn test_parser_tuple_assignment_and_for() {
        let prog = parse("a, b = 1, 2\nfor k, v in items:\n  pass\n", "t.star").unwrap();
        assert!(matches!(prog.stmts[0].kind, StmtKind::Assign(..)));
        assert!(matches!(prog.stmts[1].kind, StmtKind::For(..)));
    }

    #[test]
    fn test_parser_rejects_bad_target() {
        assert!(parse("f() = 1\n", "t.star").is_err());
        assert!(parse("a, b += 1\n", "t.star").is_err());
        assert!(parse("for f() in x:\n  pass\n", "t.star").is_err());
    }

    #[test]
    fn test_parser_precedence() {
        let prog = parse("x = not a == b and c or 1 + 2 * -3\n", "t.star").unwrap();
        let StmtKind::Assign(_, rhs) = &prog.stmts[0].kind else {
            panic!("expected assign");
        };
        let ExprKind::Or(lhs, rhs) = &rhs.kind else {
            panic!("expected or at the top");
        };
        assert!(matches!(lhs.kind, ExprKind::And(..)));
        let ExprKind::Binary(_, BinOp::Add, product) = &rhs.kind else {
            panic!("expected addition");
        };
        assert!(matches!(product.kind, ExprKind::Binary(_, BinOp::Mul, _)));
    }

    #[test]
    fn test_parser_not_in_and_conditional() {
        let prog = parse("x = a not in b\ny = 1 if c else 2\n", "t.star").unwrap();
        let StmtKind::Assign(_, rhs) = &prog.stmts[0].kind else {
            panic!("expected assign");
        };
        assert!(matches!(rhs.kind, ExprKind::Binary(_, BinOp::NotIn, _)));
        let StmtKind::Assign(_, rhs) = &prog.stmts[1].kind else {
            panic!("expected assign");
        };
        assert!(matches!(rhs.kind, ExprKind::Cond { .. }));
    }

    #[test]
    fn test_parser_slices_and_comprehension() {
        let prog = parse("x = s[0:2]\ny = [i for i in r if i]\nz = s[:]\n", "t.star").unwrap();
        let StmtKind::Assign(_, rhs) = &prog.stmts[1].kind else {
            panic!("expected assign");
        };
        assert!(matches!(rhs.kind, ExprKind::Comprehension { .. }));
        let StmtKind::Assign(_, rhs) = &prog.stmts[2].kind else {
            panic!("expected assign");
        };
        assert!(matches!(rhs.kind, ExprKind::Slice { lo: None, hi: None, .. }));
    }

    #[test]
    fn test_parser_displays() {
        let prog = parse("a = ()\nb = (1,)\nc = (1)\nd = {'k': [1, 2,]}\n", "t.star").unwrap();
        let kinds: Vec<&ExprKind> = prog
            .stmts
            .iter()
            .map(|s| match &s.kind {
                StmtKind::Assign(_, rhs) => &rhs.kind,
                _ => panic!("expected assign"),
            })
            .collect();
        assert!(matches!(kinds[0], ExprKind::Tuple(items) if items.is_empty()));
        assert!(matches!(kinds[1], ExprKind::Tuple(items) if items.len() == 1));
        assert!(matches!(kinds[2], ExprKind::Int(1)));
        assert!(matches!(kinds[3], ExprKind::Dict(entries) if entries.len() == 1));
    }

    #[test]
    fn test_parser_call_arguments() {
        assert!(parse("f(1, a=2, *rest, **kw)\n", "t.star").is_ok());
        assert!(parse("f(a=2, 1)\n", "t.star").is_err());
        assert!(parse("x.y(1)[0].z\n", "t.star").is_ok());
    }

    #[test]
    fn test_parser_single_line_suite() {
        let prog = parse("if x: crash('no')\ny = 1\n", "t.star").unwrap();
        assert_eq!(prog.stmts.len(), 2);
    }

    #[test]
    fn test_parser_lines() {
        let prog = parse("\n\nx = 1\n\ndef f():\n  return 2\n", "t.star").unwrap();
        assert_eq!(prog.stmts[0].line, 3);
        assert_eq!(prog.stmts[1].line, 5);
    }

    #[test]
    fn test_parser_error_has_position() {
        let err = parse("x = 1\ny = (1,\n", "pos.star").unwrap_err();
        let Error::Syntax { file, line, .. } = err else {
            panic!("expected syntax error");
        };
        assert_eq!(file, "pos.star");
        assert_eq!(line, 2);
    }

    #[test]
    fn test_parser_rejects_deep_nesting() {
        let src = format!("x = {}1{}\n", "(".repeat(200_000), ")".repeat(200_000));
        assert!(matches!(parse(&src, "deep.star"), Err(Error::Syntax { .. })));

        let src = format!("x = {}1{}\n", "[".repeat(16), "]".repeat(16));
        assert!(parse(&src, "t.star").is_ok());
    }

    #[test]
    fn test_report_renders_snippet() {
        let src = "x = 1\ny = )\n";
        let err = parse(src, "snip.star").unwrap_err();
        let text = report(src, &err).unwrap();
        assert!(text.contains("snip.star"), "{}", text);
        assert!(text.contains("y = )"), "{}", text);
        assert!(report(src, &Error::eval("boom")).is_none());
    }
}
