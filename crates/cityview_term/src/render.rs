//! Text rendering of the city map and metrics.

use std::io::{self, Write};
use std::sync::Arc;

use cityview::prelude::*;
use cityview::observer::{CongestionLevel, TileView};
use tracing::warn;

/// Writes a fresh frame to `out` whenever the layout or snapshot changes.
///
/// Tiles with one agent show the agent's state, tiles with several show the
/// count; empty road tiles show congestion. Without a layout nothing is drawn.
pub struct TerminalPresenter<W: Write> {
    out: W,
    layout: Option<Arc<Layout>>,
    snapshot: Option<Arc<Snapshot>>,
}

impl<W: Write> TerminalPresenter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            layout: None,
            snapshot: None,
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }

    fn draw(&mut self) -> io::Result<()> {
        let Some(layout) = &self.layout else {
            return Ok(());
        };
        let view = CityView::build(layout, self.snapshot.as_deref());

        writeln!(self.out)?;
        for row in view.rows() {
            let line: String = row.iter().map(tile_glyph).collect();
            writeln!(self.out, "{line}")?;
        }
        if view.off_grid > 0 {
            writeln!(self.out, "({} agents off the map)", view.off_grid)?;
        }

        if let Some(snapshot) = &self.snapshot {
            let m = MetricsView::build(snapshot);
            writeln!(
                self.out,
                "t={}  commute={:.2}  distance={:.2}  energy={:.2}  commuting={}/{}",
                m.timestamp,
                m.average_commute_time,
                m.average_distance,
                m.energy_usage,
                m.commuting,
                snapshot.agents.len()
            )?;
            if !m.top_congested.is_empty() {
                let top: Vec<String> = m
                    .top_congested
                    .iter()
                    .map(|(pos, count)| format!("{pos}:{count}"))
                    .collect();
                writeln!(
                    self.out,
                    "congestion (max {}): {}",
                    m.max_congestion,
                    top.join("  ")
                )?;
            }
            let states: Vec<String> = m
                .agents_by_state
                .iter()
                .map(|(state, n)| format!("{state} {n}"))
                .collect();
            if !states.is_empty() {
                writeln!(self.out, "agents: {}", states.join(", "))?;
            }
        }
        self.out.flush()
    }

    fn line(&mut self, text: std::fmt::Arguments<'_>) {
        if let Err(e) = writeln!(self.out, "{text}").and_then(|_| self.out.flush()) {
            warn!("stdout: {}", e);
        }
    }

    fn redraw(&mut self) {
        if let Err(e) = self.draw() {
            warn!("stdout: {}", e);
        }
    }
}

fn agent_glyph(state: AgentState) -> char {
    match state {
        AgentState::AtHome => 'h',
        AgentState::GoingToWork => '>',
        AgentState::AtWork => 'w',
        AgentState::GoingHome => '<',
        AgentState::GoingToPark => '^',
        AgentState::AtPark => 'p',
        AgentState::Wandering => '~',
    }
}

fn tile_glyph(tile: &TileView) -> char {
    match tile.agents.as_slice() {
        [] => match (tile.kind, tile.congestion) {
            (CellKind::Road, CongestionLevel::Low) => '-',
            (CellKind::Road, CongestionLevel::Medium) => '=',
            (CellKind::Road, CongestionLevel::High) => '#',
            (kind, _) => kind.glyph(),
        },
        [(_, state)] => agent_glyph(*state),
        many => char::from_digit(many.len() as u32, 10).unwrap_or('*'),
    }
}

impl<W: Write> Presenter for TerminalPresenter<W> {
    fn on_layout_loaded(&mut self, layout: &Arc<Layout>) {
        self.layout = Some(Arc::clone(layout));
        self.redraw();
    }

    fn on_layout_unavailable(&mut self, error: &ClientError) {
        self.layout = None;
        self.line(format_args!("map unavailable: {error}"));
    }

    fn on_snapshot_updated(&mut self, snapshot: &Arc<Snapshot>) {
        self.snapshot = Some(Arc::clone(snapshot));
        self.redraw();
    }

    fn on_snapshot_cleared(&mut self) {
        self.snapshot = None;
        self.redraw();
    }

    fn on_session_state_changed(&mut self, state: SessionState) {
        self.line(format_args!("session: {state:?}"));
    }

    fn on_session_fault(&mut self, error: &ClientError) {
        self.line(format_args!("session fault: {error}"));
    }
}
