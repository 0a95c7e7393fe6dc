//! Prefix command parsing.
//!
//! A message such as `>reposition "never gonna" 2` is split into a command name and
//! arguments. Double quotes group words into one argument; everything else splits on
//! whitespace. Commands taking several queries (`add`, `remove`, ...) treat every
//! argument as its own query.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("comando desconocido: `{0}`")]
    UnknownCommand(String),

    #[error("falta el argumento `{argument}` para `{command}`")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    #[error("`{0}` no es un índice válido")]
    InvalidIndex(String),

    #[error("formato de tiempo inválido `{0}`, usa **MM:SS**")]
    InvalidTimestamp(String),

    #[error("comillas sin cerrar")]
    UnclosedQuote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join,
    Leave,
    Add(Vec<String>),
    PlayNow(String),
    Remove(Vec<String>),
    /// `index` is 1-based as typed by the user.
    Reposition { query: String, index: usize },
    Select(String),
    Skip,
    Pause,
    Resume,
    Stop,
    Restart,
    Clear,
    RemoveDupes,
    Loop,
    Random,
    LoopQueue,
    Shuffle,
    Sort,
    List,
    History,
    Seek(u64),
    Rewind(u64),
    Forward(u64),
    Duration,
    NowPlaying,
    GetIndex(String),
    PlaylistCreate,
    PlaylistAdd(Vec<String>),
    PlaylistAddCurrent,
    PlaylistDelete,
    PlaylistSelect,
    PlaylistQueue,
    PlaylistFetch(Vec<String>),
    PlaylistRemove(Vec<String>),
    PlaylistReposition { query: String, index: usize },
    PlaylistShuffle,
    PlaylistRewrite,
    PlaylistGetIndex(String),
    Yoink,
    YtSearch(String),
    Bitrate,
    Ping,
    Help,
}

impl Command {
    /// Parses a message body. Returns `Ok(None)` when it doesn't start with `prefix`
    /// immediately followed by a command name, so `> quoted text` is plain chat.
    pub fn parse(content: &str, prefix: &str) -> Result<Option<Self>, ParseError> {
        let Some(body) = content.trim_start().strip_prefix(prefix) else {
            return Ok(None);
        };
        if body.starts_with(char::is_whitespace) {
            return Ok(None);
        }

        let mut args = tokenize(body)?.into_iter();
        let Some(name) = args.next() else {
            return Ok(None);
        };
        let args: Vec<String> = args.collect();
        let name = name.to_lowercase();

        let command = match name.as_str() {
            "join" => Command::Join,
            "leave" => Command::Leave,
            "add" => Command::Add(many(args, "add", "query")?),
            "playnow" => Command::PlayNow(one(args, "playnow", "query")?),
            "remove" => Command::Remove(many(args, "remove", "track")?),
            "reposition" => {
                let (query, index) = query_and_index(args, "reposition")?;
                Command::Reposition { query, index }
            }
            "select" => Command::Select(one(args, "select", "track")?),
            "skip" => Command::Skip,
            "pause" => Command::Pause,
            "resume" => Command::Resume,
            "stop" => Command::Stop,
            "restart" => Command::Restart,
            "clear" => Command::Clear,
            "removedupes" => Command::RemoveDupes,
            "loop" => Command::Loop,
            "random" => Command::Random,
            "loopqueue" => Command::LoopQueue,
            "shuffle" => Command::Shuffle,
            "sort" => Command::Sort,
            "list" => Command::List,
            "history" => Command::History,
            "seek" => Command::Seek(timestamp(args, "seek")?),
            "rewind" => Command::Rewind(timestamp(args, "rewind")?),
            "forward" => Command::Forward(timestamp(args, "forward")?),
            "duration" => Command::Duration,
            "nowplaying" => Command::NowPlaying,
            "getindex" => Command::GetIndex(one(args, "getindex", "track")?),
            "playlistcreate" => Command::PlaylistCreate,
            "playlistadd" => Command::PlaylistAdd(many(args, "playlistadd", "query")?),
            "playlistaddcurrent" => Command::PlaylistAddCurrent,
            "playlistdelete" => Command::PlaylistDelete,
            "playlistselect" => Command::PlaylistSelect,
            "playlistqueue" => Command::PlaylistQueue,
            "playlistfetch" => Command::PlaylistFetch(many(args, "playlistfetch", "track")?),
            "playlistremove" => Command::PlaylistRemove(many(args, "playlistremove", "track")?),
            "playlistreposition" => {
                let (query, index) = query_and_index(args, "playlistreposition")?;
                Command::PlaylistReposition { query, index }
            }
            "playlistshuffle" => Command::PlaylistShuffle,
            "playlistrewrite" => Command::PlaylistRewrite,
            "playlistgetindex" => Command::PlaylistGetIndex(one(args, "playlistgetindex", "track")?),
            "yoink" => Command::Yoink,
            "ytsearch" => Command::YtSearch(one(args, "ytsearch", "query")?),
            "bitrate" => Command::Bitrate,
            "ping" => Command::Ping,
            "help" | "musichelp" => Command::Help,
            _ => return Err(ParseError::UnknownCommand(name)),
        };

        Ok(Some(command))
    }

    /// Commands that join the caller's voice channel when the bot isn't connected yet.
    pub fn joins_voice(&self) -> bool {
        matches!(
            self,
            Command::Join
                | Command::Add(_)
                | Command::PlayNow(_)
                | Command::PlaylistSelect
                | Command::PlaylistFetch(_)
        )
    }

    /// Commands that only touch the stored playlist and work without a voice connection.
    pub fn is_offline(&self) -> bool {
        matches!(
            self,
            Command::Help
                | Command::Ping
                | Command::Yoink
                | Command::YtSearch(_)
                | Command::PlaylistAdd(_)
                | Command::PlaylistDelete
                | Command::PlaylistQueue
                | Command::PlaylistRemove(_)
                | Command::PlaylistReposition { .. }
                | Command::PlaylistShuffle
                | Command::PlaylistRewrite
                | Command::PlaylistGetIndex(_)
        )
    }
}

/// Splits on whitespace, keeping double-quoted sections together.
pub fn tokenize(input: &str) -> Result<Vec<String>, ParseError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut quoted = false;

    for c in input.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                quoted = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() || quoted {
                    tokens.push(std::mem::take(&mut current));
                }
                quoted = false;
            }
            c => current.push(c),
        }
    }

    if in_quotes {
        return Err(ParseError::UnclosedQuote);
    }
    if !current.is_empty() || quoted {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Parses `MM:SS` or a bare number of seconds.
pub fn parse_timestamp(raw: &str) -> Result<u64, ParseError> {
    let invalid = || ParseError::InvalidTimestamp(raw.to_string());

    match raw.split_once(':') {
        Some((minutes, seconds)) => {
            let minutes: u64 = minutes.trim().parse().map_err(|_| invalid())?;
            let seconds: u64 = seconds.trim().parse().map_err(|_| invalid())?;
            minutes
                .checked_mul(60)
                .and_then(|m| m.checked_add(seconds))
                .ok_or_else(invalid)
        }
        None => raw.trim().parse().map_err(|_| invalid()),
    }
}

fn one(args: Vec<String>, command: &'static str, argument: &'static str) -> Result<String, ParseError> {
    args.into_iter()
        .next()
        .filter(|a| !a.trim().is_empty())
        .ok_or(ParseError::MissingArgument { command, argument })
}

fn many(args: Vec<String>, command: &'static str, argument: &'static str) -> Result<Vec<String>, ParseError> {
    let args: Vec<String> = args.into_iter().filter(|a| !a.trim().is_empty()).collect();
    if args.is_empty() {
        return Err(ParseError::MissingArgument { command, argument });
    }
    Ok(args)
}

fn query_and_index(args: Vec<String>, command: &'static str) -> Result<(String, usize), ParseError> {
    let mut args = args.into_iter();
    let query = args
        .next()
        .ok_or(ParseError::MissingArgument { command, argument: "track" })?;
    let raw = args
        .next()
        .ok_or(ParseError::MissingArgument { command, argument: "index" })?;
    let index = raw.parse().map_err(|_| ParseError::InvalidIndex(raw))?;
    Ok((query, index))
}

fn timestamp(args: Vec<String>, command: &'static str) -> Result<u64, ParseError> {
    let raw = one(args, command, "time")?;
    parse_timestamp(&raw)
}
