//! Plain-text views of trees, mazes, paths and run histories for the console.

use crate::evolution::GenerationRecord;
use crate::maze::{Cell, Direction, Maze, Position};
use crate::vm::node::Node;

/// Indented outline of a tree, one node per line, with each child labelled by
/// the branch it sits on.
pub fn tree_structure(node: &Node) -> String {
    let mut lines = Vec::new();
    outline(node, 0, &mut lines);
    finish(lines)
}

fn outline(node: &Node, depth: usize, lines: &mut Vec<String>) {
    let indent = "  ".repeat(depth);
    let (label, branches, first, second) = match node {
        Node::Move(direction) => {
            lines.push(format!("{}- MOVE({})", indent, direction));
            return;
        }
        Node::IfWallNearby(a, b) => ("IF_WALL_NEARBY?", ["IF YES", "IF NO"], a, b),
        Node::IfGoalClose(a, b) => ("IF_GOAL_CLOSE?", ["IF YES", "IF NO"], a, b),
        Node::Sequence(a, b) => ("SEQUENCE", ["FIRST", "THEN"], a, b),
    };
    lines.push(format!("{}- {}", indent, label));
    lines.push(format!("{}  + {}:", indent, branches[0]));
    outline(first, depth + 2, lines);
    lines.push(format!("{}  + {}:", indent, branches[1]));
    outline(second, depth + 2, lines);
}

fn finish(lines: Vec<String>) -> String {
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Framed grid with the cells of `path` marked.
///
/// `S` is the start, `G` the goal, `#` a wall, `.` a visited open cell and a
/// space an unvisited open cell. Positions off the grid are ignored.
pub fn maze_with_path(maze: &Maze, path: &[Position]) -> String {
    let mut grid: Vec<Vec<char>> = (0..maze.height())
        .map(|y| {
            (0..maze.width())
                .map(|x| match maze.cell(Position::new(x, y)) {
                    Some(Cell::Wall) => '#',
                    _ => ' ',
                })
                .collect()
        })
        .collect();

    for position in path {
        if let Some(c) = grid
            .get_mut(position.y)
            .and_then(|row| row.get_mut(position.x))
        {
            if *c == ' ' {
                *c = '.';
            }
        }
    }
    let start = maze.start();
    let goal = maze.goal();
    grid[start.y][start.x] = 'S';
    grid[goal.y][goal.x] = 'G';

    let border = format!("+{}+", "-".repeat(maze.width() * 2 - 1));
    let mut lines = vec![border.clone()];
    for row in grid {
        let cells: Vec<String> = row.into_iter().map(String::from).collect();
        lines.push(format!("|{}|", cells.join(" ")));
    }
    lines.push(border);
    finish(lines)
}

/// The direction of every move between consecutive positions of a path.
/// Repeated positions (from blocked moves) contribute nothing.
pub fn movement_sequence(path: &[Position]) -> Vec<Direction> {
    path.windows(2)
        .filter_map(|pair| {
            let (from, to) = (pair[0], pair[1]);
            if to.x > from.x {
                Some(Direction::Right)
            } else if to.x < from.x {
                Some(Direction::Left)
            } else if to.y > from.y {
                Some(Direction::Down)
            } else if to.y < from.y {
                Some(Direction::Up)
            } else {
                None
            }
        })
        .collect()
}

/// Run-length form of a move list, e.g. `3xRIGHT -> 2xDOWN`.
pub fn compress_moves(moves: &[Direction]) -> String {
    let mut runs: Vec<(Direction, usize)> = Vec::new();
    for &direction in moves {
        match runs.last_mut() {
            Some((last, count)) if *last == direction => *count += 1,
            _ => runs.push((direction, 1)),
        }
    }
    runs.iter()
        .map(|(direction, count)| format!("{}x{}", count, direction))
        .collect::<Vec<_>>()
        .join(" -> ")
}

pub fn history_table(history: &[GenerationRecord]) -> String {
    let mut lines = vec![
        format!(
            "{:>5} | {:>10} | {:>10} | {:>10} | {:>10} | {:>8} | {:>8}",
            "Gen", "Best", "Avg", "Worst", "Std", "Avg Size", "Failures"
        ),
        "-".repeat(85),
    ];
    for record in history {
        lines.push(format!(
            "{:>5} | {:>10.2} | {:>10.2} | {:>10.2} | {:>10.2} | {:>8.1} | {:>8}",
            record.generation,
            record.best,
            record.average,
            record.worst,
            record.std_dev,
            record.average_size,
            record.structural_failures
        ));
    }
    finish(lines)
}
