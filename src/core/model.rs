//! Wire data exchanged with the simulation server.
//!
//! Everything here is plain value data: a [`Layout`] is fetched once and never
//! changes, a [`Snapshot`] is replaced wholesale by the next one.

use std::fmt;
use std::str::FromStr;

use hashbrown::HashMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ClientError, ClientResult};

// ═══════════════════════════════════════════════════════════════════════════
// Layout
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellKind {
    Road,
    House,
    Office,
    Park,
    EnergyStation,
    Empty,
}

impl CellKind {
    pub fn glyph(self) -> char {
        match self {
            CellKind::Road => 'R',
            CellKind::House => 'H',
            CellKind::Office => 'O',
            CellKind::Park => 'P',
            CellKind::EnergyStation => 'E',
            CellKind::Empty => '.',
        }
    }
}

/// One layout cell. The server sends more (position, occupants); only the
/// kind is part of the static layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub cell_type: CellKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub width: usize,
    pub height: usize,
    /// Row-major: `cells[y][x]`.
    pub cells: Vec<Vec<Cell>>,
}

impl Layout {
    /// Checks that `cells` really is `height` rows of `width` cells.
    pub fn validate(&self) -> Result<(), String> {
        if self.cells.len() != self.height {
            return Err(format!(
                "layout declares height {} but has {} rows",
                self.height,
                self.cells.len()
            ));
        }
        for (y, row) in self.cells.iter().enumerate() {
            if row.len() != self.width {
                return Err(format!(
                    "layout row {} has {} cells, expected width {}",
                    y,
                    row.len(),
                    self.width
                ));
            }
        }
        Ok(())
    }

    pub fn contains(&self, pos: Position) -> bool {
        (pos.x as usize) < self.width && (pos.y as usize) < self.height
    }

    pub fn cell(&self, pos: Position) -> Option<&Cell> {
        self.cells.get(pos.y as usize)?.get(pos.x as usize)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Positions
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: u32,
    pub y: u32,
}

impl Position {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

impl FromStr for Position {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (x, y) = s
            .split_once(',')
            .ok_or_else(|| format!("position key {s:?} is not \"x,y\""))?;
        let x = x
            .trim()
            .parse()
            .map_err(|e| format!("position key {s:?}: bad x: {e}"))?;
        let y = y
            .trim()
            .parse()
            .map_err(|e| format!("position key {s:?}: bad y: {e}"))?;
        Ok(Self { x, y })
    }
}

/// Congestion map key. Travels as the string `"x,y"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridKey(pub Position);

impl Serialize for GridKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for GridKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map(GridKey).map_err(serde::de::Error::custom)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Agents
// ═══════════════════════════════════════════════════════════════════════════

/// Agent identity. Servers send either numbers or strings; both are kept as
/// sent so a snapshot re-encodes to the same frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgentId {
    Number(u64),
    Text(String),
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentId::Number(n) => write!(f, "{n}"),
            AgentId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentState {
    AtHome,
    GoingToWork,
    AtWork,
    GoingHome,
    GoingToPark,
    AtPark,
    Wandering,
}

impl AgentState {
    pub fn is_commuting(self) -> bool {
        matches!(
            self,
            AgentState::GoingToWork | AgentState::GoingHome | AgentState::GoingToPark
        )
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AgentState::AtHome => "At Home",
            AgentState::GoingToWork => "Going to Work",
            AgentState::AtWork => "At Work",
            AgentState::GoingHome => "Going Home",
            AgentState::GoingToPark => "Going to Park",
            AgentState::AtPark => "At Park",
            AgentState::Wandering => "Wandering",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub position: Position,
    pub state: AgentState,
}

// ═══════════════════════════════════════════════════════════════════════════
// Metrics / Snapshot
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub timestamp: i64,
    pub average_commute_time: f64,
    pub average_distance: f64,
    pub energy_usage: f64,
    pub max_congestion: u32,
    #[serde(default)]
    pub most_congested_position: Option<Position>,
    #[serde(default)]
    pub congestion_map: HashMap<GridKey, u32>,
}

impl Metrics {
    pub fn congestion_at(&self, pos: Position) -> u32 {
        self.congestion_map.get(&GridKey(pos)).copied().unwrap_or(0)
    }
}

/// One complete simulation state update. Never merged: the newest replaces
/// whatever was shown before.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    pub agents: Vec<Agent>,
    pub metrics: Metrics,
}

impl Snapshot {
    /// Decodes one stream frame.
    pub fn decode(frame: &str) -> ClientResult<Self> {
        serde_json::from_str(frame).map_err(ClientError::from)
    }

    pub fn encode(&self) -> ClientResult<String> {
        serde_json::to_string(self).map_err(ClientError::from)
    }
}
