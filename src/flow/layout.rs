use crate::flow::model::{Node, Position};

pub const GRID_COLUMNS: usize = 4;
pub const COLUMN_SPACING: f64 = 250.0;
pub const ROW_SPACING: f64 = 150.0;
pub const GRID_ORIGIN: f64 = 100.0;

/// Grid slot for the node at `index` in array order.
pub fn grid_position(index: usize) -> Position {
    let column = (index % GRID_COLUMNS) as f64;
    let row = (index / GRID_COLUMNS) as f64;
    Position::new(
        column * COLUMN_SPACING + GRID_ORIGIN,
        row * ROW_SPACING + GRID_ORIGIN,
    )
}

/// Places nodes on the grid in their current order. Only positions change.
pub fn apply_grid(nodes: &mut [Node]) {
    for (index, node) in nodes.iter_mut().enumerate() {
        node.position = grid_position(index);
    }
}
