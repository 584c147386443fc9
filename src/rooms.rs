use crate::limits::*;
use crate::model::Room;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("room not found: {0}")]
    NotFound(String),
    #[error("room directory is empty")]
    Empty,
    #[error("too many rooms")]
    TooMany,
    #[error("duplicate room: {0}")]
    Duplicate(String),
    #[error("invalid room name {0:?}")]
    InvalidName(String),
    #[error("invalid description for room {0}")]
    InvalidDescription(String),
    #[error("malformed room table entry {0:?}, expected name:description")]
    MalformedEntry(String),
}

/// Immutable catalog of bookable rooms, in declaration order.
#[derive(Debug, Clone)]
pub struct RoomDirectory {
    rooms: Vec<Room>,
}

impl RoomDirectory {
    pub fn new(rooms: Vec<Room>) -> Result<Self, RoomError> {
        if rooms.is_empty() {
            return Err(RoomError::Empty);
        }
        if rooms.len() > MAX_ROOMS {
            return Err(RoomError::TooMany);
        }
        for (i, room) in rooms.iter().enumerate() {
            if !is_valid_room_name(&room.name) {
                return Err(RoomError::InvalidName(room.name.clone()));
            }
            if room.description.len() > MAX_DESCRIPTION_LEN
                || room.description.chars().any(char::is_control)
            {
                return Err(RoomError::InvalidDescription(room.name.clone()));
            }
            if rooms[..i].iter().any(|r| r.name == room.name) {
                return Err(RoomError::Duplicate(room.name.clone()));
            }
        }
        Ok(Self { rooms })
    }

    /// Parse `name:description,name:description`.
    pub fn parse(table: &str) -> Result<Self, RoomError> {
        let mut rooms = Vec::new();
        for entry in table.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, description) = entry
                .split_once(':')
                .ok_or_else(|| RoomError::MalformedEntry(entry.to_string()))?;
            rooms.push(Room::new(name.trim(), description.trim()));
        }
        Self::new(rooms)
    }

    pub fn is_valid(&self, name: &str) -> bool {
        self.rooms.iter().any(|r| r.name == name)
    }

    pub fn describe(&self, name: &str) -> Result<&str, RoomError> {
        self.rooms
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.description.as_str())
            .ok_or_else(|| RoomError::NotFound(name.to_string()))
    }

    pub fn all(&self) -> &[Room] {
        &self.rooms
    }

    /// Declaration index of a room, used for stable ordering.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.rooms.iter().position(|r| r.name == name)
    }
}

/// Room names travel inside store keys and whitespace-split commands, so they
/// may not contain whitespace, control characters or the field separator.
fn is_valid_room_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_ROOM_NAME_LEN
        && !name
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == FIELD_SEPARATOR)
}
