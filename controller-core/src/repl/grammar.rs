#![allow(clippy::module_name_repetitions)]

//! Tokenizer and command parser for the operator REPL.
//!
//! The lexer uses `regal` to produce a bounded token stream, while the parser
//! walks the [`catalog`](super::catalog) grammar with `winnow` combinators
//! over those tokens to build structured command values.

use super::catalog::{self, ArgumentKind, CommandTag, Node, OptionSpec, OptionTag};
use core::fmt;
use core::ops::Range;

use heapless::Vec as HeaplessVec;
use regal::IncrementalError;
use regal::TokenCache;
use regal_macros::RegalLexer;
use winnow::error::ErrMode;
use winnow::prelude::*;

use crate::channels::{ChannelId, channel_by_label};
use crate::registers::{RegisterAddress, register_by_name};

/// Longest token sequence accepted on one line.
pub const MAX_TOKENS: usize = 32;
const MAX_CACHE_RECORDS: usize = MAX_TOKENS * 2;

/// Token classes produced by the REPL lexer.
#[derive(RegalLexer, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TokenKind {
    /// Hexadecimal literal with a `0x` prefix.
    #[regex(r"0[xX][0-9A-Fa-f]+", priority = 2)]
    Hex,
    /// Unsuffixed decimal literal.
    #[regex(r"[0-9]+")]
    Integer,
    /// Keyword, register name or channel label; matched case-insensitively.
    #[regex(r"[A-Za-z][A-Za-z0-9_-]*")]
    Ident,
    /// `=` between an option name and its value.
    #[token("=")]
    Equals,
    /// Spaces and tabs between tokens.
    #[regex(r"[ \t]+", skip)]
    Whitespace,
    /// Line terminator.
    #[token("\r\n")]
    #[token("\n")]
    #[token("\r")]
    Eol,
    /// Any character no other rule accepts.
    #[default]
    #[regex(r".", priority = 1024)]
    Error,
}

/// Lexed token with its byte span in the line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub lexeme: &'a str,
    pub span: Range<usize>,
}

/// Fixed-capacity token storage for one line.
pub type TokenBuffer<'a> = HeaplessVec<Token<'a>, MAX_TOKENS>;

/// Lexer errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LexError {
    /// The line has more than [`MAX_TOKENS`] tokens.
    TooManyTokens { processed: usize },
    /// The lexer engine failed.
    Engine,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::TooManyTokens { processed } => {
                write!(f, "line has too many tokens ({processed})")
            }
            LexError::Engine => write!(f, "lexer failure"),
        }
    }
}

/// Rejected token sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GrammarErrorKind<'a> {
    UnexpectedToken {
        expected: &'static str,
        found: Option<TokenKind>,
        span: Range<usize>,
    },
    UnexpectedEnd {
        expected: &'static str,
    },
    InvalidInteger {
        span: Range<usize>,
    },
    UnknownRegister {
        span: Range<usize>,
        lexeme: &'a str,
    },
    UnknownChannel {
        span: Range<usize>,
        lexeme: &'a str,
    },
    UnknownOption {
        span: Range<usize>,
        lexeme: &'a str,
    },
    DuplicateOption {
        span: Range<usize>,
        lexeme: &'a str,
    },
    InvalidToken {
        span: Range<usize>,
        lexeme: &'a str,
    },
}

impl fmt::Display for GrammarErrorKind<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarErrorKind::UnexpectedToken {
                expected,
                found,
                span,
            } => write!(f, "expected {expected}, found {found:?} at {span:?}"),
            GrammarErrorKind::UnexpectedEnd { expected } => {
                write!(f, "unexpected end of input, expected {expected}")
            }
            GrammarErrorKind::InvalidInteger { span } => {
                write!(f, "invalid integer literal at {span:?}")
            }
            GrammarErrorKind::UnknownRegister { span, lexeme } => {
                write!(f, "unknown register `{lexeme}` at {span:?}")
            }
            GrammarErrorKind::UnknownChannel { span, lexeme } => {
                write!(f, "unknown channel `{lexeme}` at {span:?}")
            }
            GrammarErrorKind::UnknownOption { span, lexeme } => {
                write!(f, "unknown option `{lexeme}` at {span:?}")
            }
            GrammarErrorKind::DuplicateOption { span, lexeme } => {
                write!(f, "option `{lexeme}` given twice at {span:?}")
            }
            GrammarErrorKind::InvalidToken { span, lexeme } => {
                write!(f, "unsupported token `{lexeme}` at {span:?}")
            }
        }
    }
}

/// Parser failure with the offending token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrammarError<'a> {
    pub kind: GrammarErrorKind<'a>,
}

impl fmt::Display for GrammarError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

impl<'a> GrammarError<'a> {
    fn unexpected(expected: &'static str, token: Option<&Token<'a>>) -> Self {
        GrammarError {
            kind: match token {
                Some(tok) => GrammarErrorKind::UnexpectedToken {
                    expected,
                    found: Some(tok.kind),
                    span: tok.span.clone(),
                },
                None => GrammarErrorKind::UnexpectedEnd { expected },
            },
        }
    }

    fn invalid_integer(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::InvalidInteger {
                span: token.span.clone(),
            },
        }
    }

    fn unknown_register(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::UnknownRegister {
                span: token.span.clone(),
                lexeme: token.lexeme,
            },
        }
    }

    fn unknown_channel(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::UnknownChannel {
                span: token.span.clone(),
                lexeme: token.lexeme,
            },
        }
    }

    fn unknown_option(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::UnknownOption {
                span: token.span.clone(),
                lexeme: token.lexeme,
            },
        }
    }

    fn duplicate_option(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::DuplicateOption {
                span: token.span.clone(),
                lexeme: token.lexeme,
            },
        }
    }

    fn invalid_token(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::InvalidToken {
                span: token.span.clone(),
                lexeme: token.lexeme,
            },
        }
    }
}

type Input<'src, 'slice> = &'slice [Token<'src>];

/// Result type threaded through the token parsers.
type ModalResult<'src, T> = Result<T, ErrMode<GrammarError<'src>>>;

/// Failure from either stage of [`parse`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseError<'a> {
    Lex(LexError),
    Grammar(GrammarError<'a>),
}

impl fmt::Display for ParseError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Lex(err) => err.fmt(f),
            ParseError::Grammar(err) => err.fmt(f),
        }
    }
}

/// Parsed REPL command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Read(RegisterRef),
    Write { register: RegisterRef, value: u32 },
    Start(StartCommand),
    Stop(StopTarget),
    Standby,
    Reset,
    Status,
    Help(HelpCommand<'a>),
}

/// Register named on the command line.
///
/// Numeric addresses are kept raw so that out-of-window addresses surface as
/// register errors from the device rather than parse errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterRef {
    Named(RegisterAddress),
    Raw(u8),
}

impl RegisterRef {
    /// Wire address for the reference.
    #[must_use]
    pub const fn raw(self) -> u8 {
        match self {
            RegisterRef::Named(address) => address.raw(),
            RegisterRef::Raw(raw) => raw,
        }
    }
}

/// `start` arguments; `None` keeps the channel's current register value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StartCommand {
    pub channel: Option<ChannelId>,
    pub on: Option<u16>,
    pub off: Option<u16>,
    pub pulses: Option<u16>,
    pub tail: Option<u16>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopTarget {
    Channel(ChannelId),
    All,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HelpCommand<'a> {
    pub topic: Option<&'a str>,
}

pub(crate) fn parse_tokens_partial<'src, 'slice>(
    tokens: &'slice [Token<'src>],
) -> Result<(Command<'src>, &'slice [Token<'src>]), GrammarError<'src>>
where
    'src: 'slice,
{
    let mut input = tokens;
    match command().parse_next(&mut input) {
        Ok(cmd) => Ok((cmd, input)),
        Err(ErrMode::Backtrack(err) | ErrMode::Cut(err)) => Err(err),
        Err(ErrMode::Incomplete(_)) => Err(GrammarError::unexpected("token", input.first())),
    }
}

/// Splits `line` into tokens.
///
/// # Errors
///
/// Returns [`LexError`] when the line overflows the token buffer.
pub fn lex(line: &str) -> Result<TokenBuffer<'_>, LexError> {
    let compiled = TokenKind::lexer();
    let mut cache: TokenCache<TokenKind, MAX_CACHE_RECORDS> = TokenCache::new();
    let partial = cache
        .rebuild(compiled, line)
        .map_err(map_incremental_error)?;
    let mut buffer = TokenBuffer::new();

    for record in cache.tokens() {
        if record.skipped {
            continue;
        }

        let span = record.start..record.end;
        let lexeme = &line[span.clone()];
        if buffer
            .push(Token {
                kind: record.token,
                lexeme,
                span,
            })
            .is_err()
        {
            return Err(LexError::TooManyTokens {
                processed: buffer.len() + 1,
            });
        }
    }

    if let Some(partial) = partial.filter(|partial| !partial.fragment.is_empty()) {
        let start = partial.start;
        let end = start + partial.fragment.len();
        if buffer
            .push(Token {
                kind: TokenKind::Error,
                lexeme: partial.fragment,
                span: start..end,
            })
            .is_err()
        {
            return Err(LexError::TooManyTokens {
                processed: buffer.len() + 1,
            });
        }
    }

    Ok(buffer)
}

fn map_incremental_error(error: IncrementalError) -> LexError {
    match error {
        IncrementalError::TokenOverflow => LexError::TooManyTokens {
            processed: MAX_TOKENS,
        },
        _ => LexError::Engine,
    }
}

/// Parses one REPL line into a [`Command`].
///
/// # Errors
///
/// Returns [`ParseError`] describing the first lexical or grammar problem.
pub fn parse(line: &str) -> Result<Command<'_>, ParseError<'_>> {
    let tokens = lex(line).map_err(ParseError::Lex)?;

    if let Some(token) = tokens.iter().find(|token| token.kind == TokenKind::Error) {
        return Err(ParseError::Grammar(GrammarError::invalid_token(token)));
    }

    let (command, mut rest) =
        parse_tokens_partial(tokens.as_slice()).map_err(ParseError::Grammar)?;

    while let Some((token, remaining)) = rest.split_first() {
        if token.kind == TokenKind::Eol {
            rest = remaining;
        } else {
            return Err(ParseError::Grammar(GrammarError::unexpected(
                "end of command",
                Some(token),
            )));
        }
    }

    Ok(command)
}

fn command<'src, 'slice>() -> impl Parser<Input<'src, 'slice>, Command<'src>, ErrMode<GrammarError<'src>>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| {
        let snapshot = *input;
        let command_token = expect_kind(TokenKind::Ident, "command keyword").parse_next(input)?;

        if let Some(spec) = catalog::find(command_token.lexeme) {
            let mut state = CommandState::new(spec.tag);
            parse_node(spec.grammar, input, &mut state)?;
            state.finish()
        } else {
            *input = snapshot;
            Err(ErrMode::Backtrack(GrammarError::unexpected(
                "command keyword",
                Some(&command_token),
            )))
        }
    }
}

fn parse_node<'src, 'slice>(
    node: &'static Node,
    input: &mut Input<'src, 'slice>,
    state: &mut CommandState<'src>,
) -> ModalResult<'src, ()>
where
    'src: 'slice,
{
    match node {
        Node::End => Ok(()),
        Node::Argument { kind, label, next } => {
            let value = parse_argument(input, *kind, label)?;
            state.apply_argument(value);
            parse_node(next, input, state)
        }
        Node::Options(options) => parse_options(input, options, state),
        Node::Topic { next } => {
            parse_topic(input, state)?;
            parse_node(next, input, state)
        }
    }
}

fn parse_argument<'src, 'slice>(
    input: &mut Input<'src, 'slice>,
    kind: ArgumentKind,
    label: &'static str,
) -> ModalResult<'src, ArgumentValue>
where
    'src: 'slice,
{
    let Some((token, rest)) = input.split_first() else {
        return Err(ErrMode::Backtrack(GrammarError::unexpected(label, None)));
    };

    let value = match (kind, token.kind) {
        (ArgumentKind::Register, TokenKind::Ident) => register_by_name(token.lexeme)
            .map(|address| ArgumentValue::Register(RegisterRef::Named(address)))
            .ok_or_else(|| ErrMode::Cut(GrammarError::unknown_register(token)))?,
        (ArgumentKind::Register, TokenKind::Integer | TokenKind::Hex) => {
            let raw = parse_number(token)?;
            let raw = u8::try_from(raw)
                .map_err(|_| ErrMode::Cut(GrammarError::invalid_integer(token)))?;
            ArgumentValue::Register(RegisterRef::Raw(raw))
        }
        (ArgumentKind::Channel | ArgumentKind::ChannelOrAll, TokenKind::Ident) => {
            if kind == ArgumentKind::ChannelOrAll && token.lexeme.eq_ignore_ascii_case("all") {
                ArgumentValue::AllChannels
            } else {
                channel_by_label(token.lexeme)
                    .map(ArgumentValue::Channel)
                    .ok_or_else(|| ErrMode::Cut(GrammarError::unknown_channel(token)))?
            }
        }
        (ArgumentKind::Value, TokenKind::Integer | TokenKind::Hex) => {
            ArgumentValue::Integer(parse_number(token)?)
        }
        _ => return Err(ErrMode::Backtrack(GrammarError::unexpected(label, Some(token)))),
    };

    *input = rest;
    Ok(value)
}

fn parse_options<'src, 'slice>(
    input: &mut Input<'src, 'slice>,
    options: &'static [OptionSpec],
    state: &mut CommandState<'src>,
) -> ModalResult<'src, ()>
where
    'src: 'slice,
{
    loop {
        match input.first() {
            None => return Ok(()),
            Some(token) if token.kind == TokenKind::Eol => return Ok(()),
            Some(_) => {}
        }

        let keyword = expect_kind(TokenKind::Ident, "option").parse_next(input)?;
        let spec = options
            .iter()
            .find(|spec| spec.keyword.eq_ignore_ascii_case(keyword.lexeme))
            .ok_or_else(|| ErrMode::Cut(GrammarError::unknown_option(&keyword)))?;
        expect_kind(TokenKind::Equals, "=").parse_next(input)?;

        let value_token = input
            .first()
            .filter(|token| matches!(token.kind, TokenKind::Integer | TokenKind::Hex))
            .cloned()
            .ok_or_else(|| ErrMode::Cut(GrammarError::unexpected("integer", input.first())))?;
        let value = u16::try_from(parse_number(&value_token)?)
            .map_err(|_| ErrMode::Cut(GrammarError::invalid_integer(&value_token)))?;
        *input = &input[1..];

        if !state.apply_option(spec.tag, value) {
            return Err(ErrMode::Cut(GrammarError::duplicate_option(&keyword)));
        }
    }
}

fn parse_topic<'src, 'slice>(
    input: &mut Input<'src, 'slice>,
    state: &mut CommandState<'src>,
) -> ModalResult<'src, ()>
where
    'src: 'slice,
{
    state.set_topic(None);

    match input.split_first() {
        Some((token, rest)) if token.kind == TokenKind::Ident => {
            state.set_topic(Some(token.lexeme));
            *input = rest;
            Ok(())
        }
        Some((token, _)) if token.kind == TokenKind::Eol => Ok(()),
        Some((token, _)) => Err(ErrMode::Backtrack(GrammarError::unexpected(
            "identifier",
            Some(token),
        ))),
        None => Ok(()),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ArgumentValue {
    Register(RegisterRef),
    Channel(ChannelId),
    AllChannels,
    Integer(u32),
}

enum CommandState<'a> {
    Read {
        register: Option<RegisterRef>,
    },
    Write {
        register: Option<RegisterRef>,
        value: Option<u32>,
    },
    Start(StartCommand),
    Stop {
        target: Option<StopTarget>,
    },
    Standby,
    Reset,
    Status,
    Help {
        topic: Option<&'a str>,
    },
}

impl<'a> CommandState<'a> {
    fn new(tag: CommandTag) -> Self {
        match tag {
            CommandTag::Read => CommandState::Read { register: None },
            CommandTag::Write => CommandState::Write {
                register: None,
                value: None,
            },
            CommandTag::Start => CommandState::Start(StartCommand::default()),
            CommandTag::Stop => CommandState::Stop { target: None },
            CommandTag::Standby => CommandState::Standby,
            CommandTag::Reset => CommandState::Reset,
            CommandTag::Status => CommandState::Status,
            CommandTag::Help => CommandState::Help { topic: None },
        }
    }

    fn apply_argument(&mut self, value: ArgumentValue) {
        match (self, value) {
            (
                CommandState::Read { register } | CommandState::Write { register, .. },
                ArgumentValue::Register(reference),
            ) => *register = Some(reference),
            (CommandState::Write { value: slot, .. }, ArgumentValue::Integer(value)) => {
                *slot = Some(value);
            }
            (CommandState::Start(start), ArgumentValue::Channel(id)) => start.channel = Some(id),
            (CommandState::Stop { target }, ArgumentValue::Channel(id)) => {
                *target = Some(StopTarget::Channel(id));
            }
            (CommandState::Stop { target }, ArgumentValue::AllChannels) => {
                *target = Some(StopTarget::All);
            }
            _ => {}
        }
    }

    /// Returns `false` when the option was already set.
    fn apply_option(&mut self, tag: OptionTag, value: u16) -> bool {
        let CommandState::Start(start) = self else {
            return false;
        };

        let slot = match tag {
            OptionTag::On => &mut start.on,
            OptionTag::Off => &mut start.off,
            OptionTag::Pulses => &mut start.pulses,
            OptionTag::Tail => &mut start.tail,
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(value);
        true
    }

    fn set_topic(&mut self, topic: Option<&'a str>) {
        if let CommandState::Help { topic: slot } = self {
            *slot = topic;
        }
    }

    fn finish(self) -> ModalResult<'a, Command<'a>> {
        match self {
            CommandState::Read {
                register: Some(register),
            } => Ok(Command::Read(register)),
            CommandState::Write {
                register: Some(register),
                value: Some(value),
            } => Ok(Command::Write { register, value }),
            CommandState::Start(start) if start.channel.is_some() => Ok(Command::Start(start)),
            CommandState::Stop {
                target: Some(target),
            } => Ok(Command::Stop(target)),
            CommandState::Standby => Ok(Command::Standby),
            CommandState::Reset => Ok(Command::Reset),
            CommandState::Status => Ok(Command::Status),
            CommandState::Help { topic } => Ok(Command::Help(HelpCommand { topic })),
            CommandState::Read { .. } | CommandState::Write { .. } => Err(ErrMode::Backtrack(
                GrammarError::unexpected("register", None),
            )),
            CommandState::Start(_) | CommandState::Stop { .. } => Err(ErrMode::Backtrack(
                GrammarError::unexpected("channel", None),
            )),
        }
    }
}

fn expect_kind<'src, 'slice>(
    kind: TokenKind,
    label: &'static str,
) -> impl Parser<Input<'src, 'slice>, Token<'src>, ErrMode<GrammarError<'src>>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| match input.split_first() {
        Some((token, rest)) if token.kind == kind => {
            *input = rest;
            Ok(token.clone())
        }
        Some((token, _)) => Err(ErrMode::Backtrack(GrammarError::unexpected(
            label,
            Some(token),
        ))),
        None => Err(ErrMode::Backtrack(GrammarError::unexpected(label, None))),
    }
}

fn parse_number<'a>(token: &Token<'a>) -> ModalResult<'a, u32> {
    let parsed = match token.kind {
        TokenKind::Hex => u32::from_str_radix(&token.lexeme[2..], 16),
        _ => token.lexeme.parse::<u32>(),
    };
    parsed.map_err(|_| ErrMode::Cut(GrammarError::invalid_integer(token)))
}
