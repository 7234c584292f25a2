use hashbrown::HashMap;

use crate::model::{AgentId, AgentState, CellKind, Layout, Metrics, Position, Snapshot};

/// Congestion bucket for a road cell, by agent count: 1 is low, 2 medium,
/// 3 or more high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CongestionLevel {
    None,
    Low,
    Medium,
    High,
}

impl CongestionLevel {
    pub fn from_count(count: u32) -> Self {
        match count {
            0 => CongestionLevel::None,
            1 => CongestionLevel::Low,
            2 => CongestionLevel::Medium,
            _ => CongestionLevel::High,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TileView {
    pub kind: CellKind,
    pub congestion: CongestionLevel,
    /// Agents standing on this tile, in snapshot order.
    pub agents: Vec<(AgentId, AgentState)>,
}

/// The layout with the latest snapshot overlaid, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct CityView {
    pub width: usize,
    pub height: usize,
    tiles: Vec<TileView>,
    /// Agents whose position lies outside the layout.
    pub off_grid: usize,
}

impl CityView {
    pub fn build(layout: &Layout, snapshot: Option<&Snapshot>) -> Self {
        let mut tiles: Vec<TileView> = layout
            .cells
            .iter()
            .flat_map(|row| row.iter())
            .map(|cell| TileView {
                kind: cell.cell_type,
                congestion: CongestionLevel::None,
                agents: Vec::new(),
            })
            .collect();

        let mut off_grid = 0;
        if let Some(snapshot) = snapshot {
            for agent in &snapshot.agents {
                match Self::index(layout, agent.position).and_then(|i| tiles.get_mut(i)) {
                    Some(tile) => tile.agents.push((agent.id.clone(), agent.state)),
                    None => off_grid += 1,
                }
            }
            for (key, &count) in &snapshot.metrics.congestion_map {
                if let Some(tile) = Self::index(layout, key.0).and_then(|i| tiles.get_mut(i)) {
                    tile.congestion = CongestionLevel::from_count(count);
                }
            }
        }

        Self {
            width: layout.width,
            height: layout.height,
            tiles,
            off_grid,
        }
    }

    fn index(layout: &Layout, pos: Position) -> Option<usize> {
        layout
            .contains(pos)
            .then(|| pos.y as usize * layout.width + pos.x as usize)
    }

    pub fn tile(&self, pos: Position) -> Option<&TileView> {
        if (pos.x as usize) < self.width && (pos.y as usize) < self.height {
            self.tiles.get(pos.y as usize * self.width + pos.x as usize)
        } else {
            None
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = &[TileView]> {
        // `max(1)` keeps `chunks` happy for a zero-width layout (no tiles).
        self.tiles.chunks(self.width.max(1))
    }
}

/// Headline numbers plus the most congested positions.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsView {
    pub timestamp: i64,
    pub average_commute_time: f64,
    pub average_distance: f64,
    pub energy_usage: f64,
    pub max_congestion: u32,
    pub most_congested_position: Option<Position>,
    /// Highest counts first; ties broken by position.
    pub top_congested: Vec<(Position, u32)>,
    pub agents_by_state: Vec<(AgentState, usize)>,
    pub commuting: usize,
}

impl MetricsView {
    pub const TOP_N: usize = 5;

    pub fn build(snapshot: &Snapshot) -> Self {
        let metrics: &Metrics = &snapshot.metrics;

        let mut top: Vec<(Position, u32)> = metrics
            .congestion_map
            .iter()
            .map(|(key, &count)| (key.0, count))
            .collect();
        top.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        top.truncate(Self::TOP_N);

        let mut by_state: HashMap<AgentState, usize> = HashMap::new();
        for agent in &snapshot.agents {
            *by_state.entry(agent.state).or_insert(0) += 1;
        }
        let mut agents_by_state: Vec<(AgentState, usize)> = by_state.into_iter().collect();
        agents_by_state.sort_by_key(|(state, _)| *state as u8);

        Self {
            timestamp: metrics.timestamp,
            average_commute_time: metrics.average_commute_time,
            average_distance: metrics.average_distance,
            energy_usage: metrics.energy_usage,
            max_congestion: metrics.max_congestion,
            most_congested_position: metrics.most_congested_position,
            top_congested: top,
            commuting: snapshot
                .agents
                .iter()
                .filter(|a| a.state.is_commuting())
                .count(),
            agents_by_state,
        }
    }
}
