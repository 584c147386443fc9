//! Line-oriented TCP front-end: one command per line, every reply
//! terminated by a line holding a single `.`.

use std::sync::Arc;

use chrono::NaiveDate;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, warn};

use crate::codec;
use crate::engine::{Engine, EngineError};
use crate::limits::MAX_LINE_LEN;
use crate::model::{Admission, Reservation, ReservationRequest};
use crate::observability;
use crate::rooms::RoomDirectory;
use crate::store::Store;
use crate::view;

pub const END_OF_REPLY: &str = ".";

/// Parsed protocol command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ping,
    Rooms,
    Reserve(ReservationRequest),
    /// Today's reservations.
    List,
    /// Every stored day, oldest first.
    ListAll,
    Raw,
    Reset,
}

impl Command {
    pub fn label(&self) -> &'static str {
        match self {
            Command::Ping => "ping",
            Command::Rooms => "rooms",
            Command::Reserve(_) => "reserve",
            Command::List => "list",
            Command::ListAll => "list_all",
            Command::Raw => "raw",
            Command::Reset => "reset",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown command: {0}")]
    Unknown(String),
    #[error("usage: reserve <room> <HH:MM> <HH:MM> <owner>")]
    ReserveUsage,
}

/// `reserve` takes the rest of the line after the end time as the owner, so
/// owners may contain spaces. A blank line means `list`.
pub fn parse_command(line: &str) -> Result<Command, ParseError> {
    let line = line.trim();
    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    match word.to_ascii_lowercase().as_str() {
        "" => Ok(Command::List),
        "ping" => Ok(Command::Ping),
        "rooms" => Ok(Command::Rooms),
        "list" if rest.trim().eq_ignore_ascii_case("all") => Ok(Command::ListAll),
        "list" => Ok(Command::List),
        "raw" => Ok(Command::Raw),
        "reset" => Ok(Command::Reset),
        "reserve" => {
            let mut parts = rest.trim_start().splitn(4, char::is_whitespace);
            let (Some(room), Some(start), Some(end), Some(owner)) =
                (parts.next(), parts.next(), parts.next(), parts.next())
            else {
                return Err(ParseError::ReserveUsage);
            };
            let owner = owner.trim();
            if owner.is_empty() {
                return Err(ParseError::ReserveUsage);
            }
            Ok(Command::Reserve(ReservationRequest::new(room, start, end, owner)))
        }
        other => Err(ParseError::Unknown(other.to_string())),
    }
}

/// Run `admit` on the blocking pool, retrying up to `attempts` times in total
/// while the store reports a commit race. Each retry validates afresh.
pub async fn admit_with_retry<S: Store + 'static>(
    engine: Arc<Engine<S>>,
    day: NaiveDate,
    request: ReservationRequest,
    attempts: u32,
) -> Result<Admission, EngineError> {
    let request = Arc::new(request);
    let mut attempt = 1;
    loop {
        let engine = engine.clone();
        let req = request.clone();
        let result = tokio::task::spawn_blocking(move || engine.admit(day, &req))
            .await
            .map_err(|e| EngineError::Internal(format!("admission task failed: {e}")))?;
        match result {
            Err(e) if e.is_retryable() && attempt < attempts => {
                debug!(attempt, room = %request.room, "commit race, retrying");
                attempt += 1;
            }
            other => return other,
        }
    }
}

async fn blocking<S, T, F>(engine: &Arc<Engine<S>>, f: F) -> Result<T, EngineError>
where
    S: Store + 'static,
    T: Send + 'static,
    F: FnOnce(&Engine<S>) -> Result<T, EngineError> + Send + 'static,
{
    let engine = engine.clone();
    tokio::task::spawn_blocking(move || f(&engine))
        .await
        .map_err(|e| EngineError::Internal(format!("blocking task failed: {e}")))?
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// `<day> reservations` followed by the per-room listing, or by
/// `no reservations`.
fn render_day(rooms: &RoomDirectory, day: NaiveDate, list: &[Reservation]) -> Vec<String> {
    let mut reply = vec![format!("{day} reservations")];
    if list.is_empty() {
        reply.push("no reservations".into());
    } else {
        reply.extend(view::format_by_room(rooms, list).lines().map(str::to_string));
    }
    reply
}

/// Reply lines for one command, without the terminator. Reservation replies
/// come in two steps: an acknowledgement, then the outcome.
pub async fn execute<S: Store + 'static>(
    engine: &Arc<Engine<S>>,
    cmd: Command,
    admit_attempts: u32,
) -> Vec<String> {
    metrics::counter!(observability::COMMANDS_TOTAL, "command" => cmd.label()).increment(1);
    match cmd {
        Command::Ping => vec!["pong".into()],
        Command::Rooms => engine
            .rooms()
            .all()
            .iter()
            .map(|r| format!("{}: {}", r.name, r.description))
            .collect(),
        Command::Reserve(request) => {
            let mut reply = vec![format!("reserving {}...", request.room)];
            let result = admit_with_retry(engine.clone(), today(), request, admit_attempts).await;
            reply.push(match result {
                Ok(Admission::Admitted(r)) => format!(
                    "booked {} {} ~ {} for {}",
                    r.room, r.span.start, r.span.end, r.owner
                ),
                Ok(Admission::Denied { held_by }) => format!("already held by {held_by}"),
                Err(EngineError::InvalidRequest(reason)) => format!("invalid request: {reason}"),
                Err(e) => {
                    warn!("reserve failed: {e}");
                    "something went wrong".into()
                }
            });
            reply
        }
        Command::List => {
            let day = today();
            match blocking(engine, move |e| e.list_day(day)).await {
                Ok(list) => render_day(engine.rooms(), day, &list),
                Err(e) => {
                    warn!("list failed: {e}");
                    vec!["something went wrong".into()]
                }
            }
        }
        Command::ListAll => match blocking(engine, |e| e.list_all()).await {
            Ok(list) if list.is_empty() => vec!["no reservations".into()],
            Ok(list) => list
                .chunk_by(|a, b| a.day == b.day)
                .flat_map(|same_day| render_day(engine.rooms(), same_day[0].day, same_day))
                .collect(),
            Err(e) => {
                warn!("list failed: {e}");
                vec!["something went wrong".into()]
            }
        },
        Command::Raw => match blocking(engine, |e| e.raw_entries()).await {
            Ok(entries) => entries
                .iter()
                .map(|(k, v)| format!("{} => {}", codec::display_raw(k), codec::display_raw(v)))
                .collect(),
            Err(e) => {
                warn!("raw dump failed: {e}");
                vec!["something went wrong".into()]
            }
        },
        Command::Reset => match blocking(engine, |e| e.reset_all()).await {
            Ok(()) => vec!["all reservations cleared".into()],
            Err(e) => {
                warn!("reset failed: {e}");
                vec!["something went wrong".into()]
            }
        },
    }
}

/// Serve one client until it disconnects.
pub async fn process_connection<S: Store + 'static>(
    socket: TcpStream,
    engine: Arc<Engine<S>>,
    admit_attempts: u32,
) -> Result<(), LinesCodecError> {
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));
    while let Some(line) = framed.next().await {
        let line = line?;
        let reply = match parse_command(&line) {
            Ok(cmd) => execute(&engine, cmd, admit_attempts).await,
            Err(e) => vec![e.to_string()],
        };
        for l in reply {
            framed.feed(l).await?;
        }
        framed.send(END_OF_REPLY.to_string()).await?;
    }
    Ok(())
}
