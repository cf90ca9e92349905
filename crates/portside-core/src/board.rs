//! Static track definition.
//!
//! The board is data: a YAML document compiled into a validated tile table at
//! game start and read-only afterwards. Malformed board data is a fatal
//! configuration error; the game cannot proceed without a coherent track.

use portside_protocol::{Money, TileIndex, TileKind};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("board has no tiles")]
    Empty,
    #[error("tile 0 must be the start tile")]
    StartNotFirst,
    #[error("board must have exactly one start tile")]
    DuplicateStart,
    #[error("tile {index} sends players to jail but the board has no jail tile")]
    MissingJail { index: TileIndex },
    #[error("port tiles need at least one other port to teleport to")]
    LonePort,
    #[error("non-property tile '{name}' carries property economics")]
    NonPropertyEconomics { name: String },
    #[error("property tile '{name}' needs a positive price")]
    MissingPrice { name: String },
}

pub enum BoardSource<'a> {
    Embedded,
    Path(String),
    Bytes(&'a [u8]),
}

#[derive(Debug, Deserialize)]
struct RawBoard {
    tiles: Vec<RawTile>,
}

#[derive(Debug, Deserialize)]
struct RawTile {
    name: String,
    kind: TileKind,
    #[serde(default)]
    price: Money,
    #[serde(default)]
    base_rent: Money,
    #[serde(default)]
    tier1_cost: Money,
    #[serde(default)]
    tier2_cost: Money,
}

/// One tile of the compiled track. Economics fields are zero for
/// non-property tiles.
#[derive(Clone, Debug)]
pub struct TileDef {
    pub name: String,
    pub kind: TileKind,
    pub price: Money,
    pub base_rent: Money,
    pub tier1_cost: Money,
    pub tier2_cost: Money,
}

impl TileDef {
    pub fn cost_of(&self, tier: portside_protocol::Tier) -> Money {
        match tier {
            portside_protocol::Tier::One => self.tier1_cost,
            portside_protocol::Tier::Two => self.tier2_cost,
        }
    }
}

/// The compiled circular track. Read-only after load.
#[derive(Clone, Debug)]
pub struct Board {
    tiles: Vec<TileDef>,
    jail: Option<TileIndex>,
    ports: Vec<TileIndex>,
}

pub fn load_board(source: BoardSource<'_>) -> Result<Board, BoardError> {
    let raw: RawBoard = match source {
        BoardSource::Embedded => serde_yaml::from_str(include_str!("../data/board.yaml"))?,
        BoardSource::Path(path) => serde_yaml::from_str(&std::fs::read_to_string(path)?)?,
        BoardSource::Bytes(bytes) => serde_yaml::from_str(std::str::from_utf8(bytes)?)?,
    };
    compile_board(raw)
}

fn compile_board(raw: RawBoard) -> Result<Board, BoardError> {
    if raw.tiles.is_empty() {
        return Err(BoardError::Empty);
    }
    if raw.tiles[0].kind != TileKind::Start {
        return Err(BoardError::StartNotFirst);
    }

    let mut jail = None;
    let mut ports = Vec::new();
    let mut sends_to_jail = None;

    for (index, tile) in raw.tiles.iter().enumerate() {
        match tile.kind {
            TileKind::Start if index != 0 => return Err(BoardError::DuplicateStart),
            TileKind::Jail if jail.is_none() => jail = Some(index),
            TileKind::GoToJail => sends_to_jail = Some(index),
            TileKind::Port => ports.push(index),
            _ => {}
        }

        if tile.kind.ownable() {
            if tile.price <= 0 {
                return Err(BoardError::MissingPrice {
                    name: tile.name.clone(),
                });
            }
        } else if tile.price != 0
            || tile.base_rent != 0
            || tile.tier1_cost != 0
            || tile.tier2_cost != 0
        {
            return Err(BoardError::NonPropertyEconomics {
                name: tile.name.clone(),
            });
        }
    }

    if let Some(index) = sends_to_jail {
        if jail.is_none() {
            return Err(BoardError::MissingJail { index });
        }
    }
    if ports.len() == 1 {
        return Err(BoardError::LonePort);
    }

    let tiles = raw
        .tiles
        .into_iter()
        .map(|t| TileDef {
            name: t.name,
            kind: t.kind,
            price: t.price,
            base_rent: t.base_rent,
            tier1_cost: t.tier1_cost,
            tier2_cost: t.tier2_cost,
        })
        .collect();

    Ok(Board { tiles, jail, ports })
}

impl Board {
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Tile lookup. Out-of-range indices are programmer errors and panic.
    pub fn tile(&self, index: TileIndex) -> &TileDef {
        &self.tiles[index]
    }

    pub fn start_index(&self) -> TileIndex {
        0
    }

    pub fn jail_index(&self) -> Option<TileIndex> {
        self.jail
    }

    pub fn has_ports(&self) -> bool {
        !self.ports.is_empty()
    }

    /// The next port strictly after `from` in track order, wrapping around.
    /// `from` itself is never returned.
    pub fn next_port_after(&self, from: TileIndex) -> Option<TileIndex> {
        if self.ports.is_empty() {
            return None;
        }
        self.ports
            .iter()
            .copied()
            .find(|&p| p > from)
            .or_else(|| self.ports.iter().copied().find(|&p| p != from))
    }

    pub fn tiles_of_kind(&self, kind: TileKind) -> impl Iterator<Item = TileIndex> + '_ {
        self.tiles
            .iter()
            .enumerate()
            .filter(move |(_, t)| t.kind == kind)
            .map(|(i, _)| i)
    }
}
