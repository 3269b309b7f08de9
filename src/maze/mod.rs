use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MazeError {
    #[error("Failed to read maze file: {0}")]
    FileReadError(#[from] std::io::Error),
    #[error("Maze grid contains no cells")]
    EmptyGrid,
    #[error("Maze row {row} has {found} cells, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Unknown cell character '{character}' on row {row}")]
    UnknownCell { row: usize, character: char },
    #[error("{role} position {position} lies outside the {width}x{height} grid")]
    PositionOutOfBounds {
        role: &'static str,
        position: Position,
        width: usize,
        height: usize,
    },
    #[error("{role} position {position} is a wall cell")]
    PositionOnWall {
        role: &'static str,
        position: Position,
    },
}

/// A single grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Open,
    Wall,
}

impl Cell {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '0' | '.' => Some(Cell::Open),
            '1' | '#' => Some(Cell::Wall),
            _ => None,
        }
    }
}

/// Grid coordinate, `x` is the column and `y` the row (row 0 at the top).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(from = "(usize, usize)")]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

impl Position {
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    pub fn manhattan(&self, other: &Position) -> usize {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

impl From<(usize, usize)> for Position {
    fn from((x, y): (usize, usize)) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// The four moves available to an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Unit offset as `(dx, dy)`.
    pub fn offset(self) -> (isize, isize) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
            Direction::Left => "LEFT",
            Direction::Right => "RIGHT",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Direction::ALL.into_iter().find(|d| d.name() == name)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable rectangular grid with a start and a goal cell.
///
/// A `Maze` is only ever read during simulation, so a single instance is shared
/// by reference across every evaluation (including the parallel ones).
#[derive(Debug, Clone, PartialEq)]
pub struct Maze {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
    start: Position,
    goal: Position,
}

impl Maze {
    /// Builds a maze from rows of cells, validating shape, start and goal.
    ///
    /// # Arguments
    /// * `rows` - The grid, row 0 first. Every row must have the same length.
    /// * `start` - Where every agent begins.
    /// * `goal` - The cell agents try to reach.
    ///
    /// # Returns
    /// * `Result<Self, MazeError>` - The maze, or the first shape/position problem found.
    pub fn new(rows: Vec<Vec<Cell>>, start: Position, goal: Position) -> Result<Self, MazeError> {
        let width = rows.first().map(Vec::len).unwrap_or(0);
        if width == 0 {
            return Err(MazeError::EmptyGrid);
        }
        for (row, cells) in rows.iter().enumerate() {
            if cells.len() != width {
                return Err(MazeError::RaggedRow {
                    row,
                    expected: width,
                    found: cells.len(),
                });
            }
        }
        let height = rows.len();
        let maze = Self {
            width,
            height,
            cells: rows.into_iter().flatten().collect(),
            start,
            goal,
        };
        maze.check_position("start", start)?;
        maze.check_position("goal", goal)?;
        Ok(maze)
    }

    /// Parses a textual grid. `0`/`.` are open cells, `1`/`#` are walls;
    /// whitespace and commas are ignored and blank lines are skipped.
    pub fn parse(text: &str, start: Position, goal: Position) -> Result<Self, MazeError> {
        let mut rows = Vec::new();
        for line in text.lines() {
            let mut cells = Vec::new();
            for c in line.chars() {
                if c.is_whitespace() || c == ',' {
                    continue;
                }
                let cell = Cell::from_char(c).ok_or(MazeError::UnknownCell {
                    row: rows.len(),
                    character: c,
                })?;
                cells.push(cell);
            }
            if !cells.is_empty() {
                rows.push(cells);
            }
        }
        Self::new(rows, start, goal)
    }

    /// Reads and parses a maze file.
    pub fn load(path: &Path, start: Position, goal: Position) -> Result<Self, MazeError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content, start, goal)
    }

    fn check_position(&self, role: &'static str, position: Position) -> Result<(), MazeError> {
        match self.cell(position) {
            None => Err(MazeError::PositionOutOfBounds {
                role,
                position,
                width: self.width,
                height: self.height,
            }),
            Some(Cell::Wall) => Err(MazeError::PositionOnWall { role, position }),
            Some(Cell::Open) => Ok(()),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn start(&self) -> Position {
        self.start
    }

    pub fn goal(&self) -> Position {
        self.goal
    }

    /// Returns the cell at `position`, or `None` when it is off the grid.
    pub fn cell(&self, position: Position) -> Option<Cell> {
        if position.x < self.width && position.y < self.height {
            Some(self.cells[position.y * self.width + position.x])
        } else {
            None
        }
    }

    pub fn is_open(&self, position: Position) -> bool {
        self.cell(position) == Some(Cell::Open)
    }

    /// The grid-adjacent coordinate in `direction`, or `None` if it would leave the grid.
    pub fn neighbor(&self, position: Position, direction: Direction) -> Option<Position> {
        let (dx, dy) = direction.offset();
        let x = position.x.checked_add_signed(dx)?;
        let y = position.y.checked_add_signed(dy)?;
        let candidate = Position::new(x, y);
        self.cell(candidate).map(|_| candidate)
    }

    /// True when any of the four adjacent cells is a wall or off the grid.
    pub fn wall_nearby(&self, position: Position) -> bool {
        Direction::ALL.into_iter().any(|direction| {
            self.neighbor(position, direction)
                .is_none_or(|candidate| !self.is_open(candidate))
        })
    }

    pub fn distance_to_goal(&self, position: Position) -> usize {
        position.manhattan(&self.goal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn open_3x3() -> Maze {
        Maze::parse("000\n000\n000", Position::new(0, 0), Position::new(2, 2)).unwrap()
    }

    #[test]
    fn test_parse_accepts_both_notations() {
        let maze = Maze::parse(
            "0 1 0\n. # .\n\n",
            Position::new(0, 0),
            Position::new(2, 1),
        )
        .unwrap();
        assert_eq!(maze.width(), 3);
        assert_eq!(maze.height(), 2);
        assert_eq!(maze.cell(Position::new(1, 0)), Some(Cell::Wall));
        assert_eq!(maze.cell(Position::new(1, 1)), Some(Cell::Wall));
        assert_eq!(maze.cell(Position::new(2, 1)), Some(Cell::Open));
        assert_eq!(maze.cell(Position::new(3, 1)), None);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let result = Maze::parse("000\n00", Position::new(0, 0), Position::new(1, 1));
        assert!(matches!(
            result,
            Err(MazeError::RaggedRow {
                row: 1,
                expected: 3,
                found: 2
            })
        ));
    }

    #[test]
    fn test_empty_grid_rejected() {
        let result = Maze::parse("\n  \n", Position::new(0, 0), Position::new(0, 0));
        assert!(matches!(result, Err(MazeError::EmptyGrid)));
    }

    #[test]
    fn test_unknown_character_rejected() {
        let result = Maze::parse("00\n0x", Position::new(0, 0), Position::new(1, 1));
        assert!(matches!(
            result,
            Err(MazeError::UnknownCell {
                row: 1,
                character: 'x'
            })
        ));
    }

    #[test]
    fn test_start_and_goal_validated() {
        let out = Maze::parse("00\n00", Position::new(0, 0), Position::new(2, 0));
        assert!(matches!(
            out,
            Err(MazeError::PositionOutOfBounds { role: "goal", .. })
        ));

        let wall = Maze::parse("01\n00", Position::new(1, 0), Position::new(1, 1));
        assert!(matches!(
            wall,
            Err(MazeError::PositionOnWall { role: "start", .. })
        ));
    }

    #[test]
    fn test_neighbor_respects_bounds() {
        let maze = open_3x3();
        let origin = Position::new(0, 0);
        assert_eq!(maze.neighbor(origin, Direction::Up), None);
        assert_eq!(maze.neighbor(origin, Direction::Left), None);
        assert_eq!(
            maze.neighbor(origin, Direction::Right),
            Some(Position::new(1, 0))
        );
        assert_eq!(
            maze.neighbor(origin, Direction::Down),
            Some(Position::new(0, 1))
        );
        assert_eq!(maze.neighbor(Position::new(2, 2), Direction::Down), None);
    }

    #[test]
    fn test_wall_nearby() {
        let maze = open_3x3();
        // The centre of an open 3x3 grid has four open neighbours.
        assert!(!maze.wall_nearby(Position::new(1, 1)));
        // Any edge cell borders the outside of the grid.
        assert!(maze.wall_nearby(Position::new(1, 0)));

        let walled = Maze::parse("000\n001\n000", Position::new(0, 0), Position::new(0, 2)).unwrap();
        assert!(walled.wall_nearby(Position::new(1, 1)));
    }

    #[test]
    fn test_manhattan_distance() {
        let maze = open_3x3();
        assert_eq!(maze.distance_to_goal(Position::new(0, 0)), 4);
        assert_eq!(maze.distance_to_goal(Position::new(2, 2)), 0);
        assert_eq!(Position::new(3, 1).manhattan(&Position::new(0, 5)), 7);
    }

    #[test]
    fn test_direction_names_round_trip() {
        for direction in Direction::ALL {
            assert_eq!(Direction::from_name(direction.name()), Some(direction));
        }
        assert_eq!(Direction::from_name("NORTH"), None);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("maze.txt");
        let mut file = File::create(&file_path).unwrap();
        write!(file, "0,1,0\n0,0,0\n").unwrap();
        let maze = Maze::load(&file_path, Position::new(0, 0), Position::new(2, 0)).unwrap();
        assert_eq!(maze.width(), 3);
        assert_eq!(maze.height(), 2);
        assert!(!maze.is_open(Position::new(1, 0)));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let result = Maze::load(
            &dir.path().join("missing.txt"),
            Position::new(0, 0),
            Position::new(0, 0),
        );
        assert!(matches!(result, Err(MazeError::FileReadError(_))));
    }
}
