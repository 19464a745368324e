//! Arena with a square grid of tiles.
//!
//! Rows bucket the x axis and columns bucket the y axis. Each tile references at most one robot
//! and each robot is referenced by at most one tile.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Position, RobotNumber};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub row: usize,
    pub col: usize,
}

impl TileCoord {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl From<(usize, usize)> for TileCoord {
    fn from(value: (usize, usize)) -> Self {
        TileCoord::new(value.0, value.1)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    coord: TileCoord,
    center: Position,
    goal: bool,
    occupant: Option<RobotNumber>,
}

impl Tile {
    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    pub fn center(&self) -> Position {
        self.center
    }

    pub fn is_goal(&self) -> bool {
        self.goal
    }

    pub fn occupant(&self) -> Option<RobotNumber> {
        self.occupant
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Arena {
    size: usize,
    size_cm: f64,
    tiles: Vec<Tile>,
}

impl Arena {
    pub fn new(size: usize, size_cm: f64, goals: &[TileCoord]) -> Result<Self, ArenaError> {
        if size == 0 {
            return Err(ArenaError::EmptyGrid);
        }
        if size_cm.is_nan() || size_cm <= 0.0 {
            return Err(ArenaError::InvalidSideLength(size_cm));
        }
        if let Some(goal) = goals.iter().find(|g| g.row >= size || g.col >= size) {
            return Err(ArenaError::GoalOutOfBounds(*goal, size));
        }

        let cm_per_tile = size_cm / size as f64;
        let tiles = (0..size)
            .flat_map(|row| (0..size).map(move |col| TileCoord::new(row, col)))
            .map(|coord| Tile {
                coord,
                center: Position::new(
                    (coord.row as f64 + 0.5) * cm_per_tile,
                    (coord.col as f64 + 0.5) * cm_per_tile,
                ),
                goal: goals.contains(&coord),
                occupant: None,
            })
            .collect();

        Ok(Self {
            size,
            size_cm,
            tiles,
        })
    }

    #[cfg(test)]
    pub fn size(&self) -> usize {
        self.size
    }

    #[cfg(test)]
    pub fn size_cm(&self) -> f64 {
        self.size_cm
    }

    pub fn cm_per_tile(&self) -> f64 {
        self.size_cm / self.size as f64
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn tile(&self, coord: TileCoord) -> Option<&Tile> {
        self.index(coord).map(|idx| &self.tiles[idx])
    }

    /// Tile currently occupied by the given robot.
    pub fn tile_for(&self, robot: RobotNumber) -> Option<&Tile> {
        self.tiles.iter().find(|t| t.occupant == Some(robot))
    }

    /// Tile whose physical region contains `position`.
    pub fn tile_at(&self, position: Position) -> Option<&Tile> {
        if position.x() < 0.0 || position.y() < 0.0 {
            return None;
        }
        let cm_per_tile = self.cm_per_tile();
        let row = (position.x() / cm_per_tile).floor() as usize;
        let col = (position.y() / cm_per_tile).floor() as usize;
        self.tile(TileCoord::new(row, col))
    }

    /// Makes `robot` the occupant of the tile at `coord`, vacating whichever tile held it before.
    ///
    /// A robot previously occupying the target tile loses its tile.
    pub fn place(&mut self, coord: TileCoord, robot: RobotNumber) -> Result<(), ArenaError> {
        let idx = self
            .index(coord)
            .ok_or(ArenaError::TileOutOfBounds(coord, self.size))?;
        if let Some(previous) = self.tile_for(robot).map(Tile::coord) {
            self.vacate(previous);
        }
        self.tiles[idx].occupant = Some(robot);
        Ok(())
    }

    pub fn vacate(&mut self, coord: TileCoord) {
        if let Some(idx) = self.index(coord) {
            self.tiles[idx].occupant = None;
        }
    }

    fn index(&self, coord: TileCoord) -> Option<usize> {
        if coord.row < self.size && coord.col < self.size {
            Some(coord.row * self.size + coord.col)
        } else {
            None
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ArenaError {
    #[error("arena must have at least one tile")]
    EmptyGrid,
    #[error("invalid arena side length {0} cm")]
    InvalidSideLength(f64),
    #[error("goal {0:?} outside of {1}x{1} arena")]
    GoalOutOfBounds(TileCoord, usize),
    #[error("tile {0:?} outside of {1}x{1} arena")]
    TileOutOfBounds(TileCoord, usize),
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn arena() -> Arena {
        Arena::new(5, 100.0, &[TileCoord::new(2, 1), TileCoord::new(2, 2)]).unwrap()
    }

    #[test]
    fn test_arena_layout() {
        let arena = arena();
        assert_eq!(arena.tiles().len(), 25);
        assert_abs_diff_eq!(arena.cm_per_tile(), 20.0);

        let tile = arena.tile(TileCoord::new(2, 1)).unwrap();
        assert!(tile.is_goal());
        assert_eq!(tile.center(), Position::new(50.0, 30.0));
        assert!(!arena.tile(TileCoord::new(0, 0)).unwrap().is_goal());
        assert_eq!(arena.tiles().iter().filter(|t| t.is_goal()).count(), 2);
    }

    #[rstest]
    #[case::zero_tiles(0, 100.0, vec![], ArenaError::EmptyGrid)]
    #[case::zero_length(5, 0.0, vec![], ArenaError::InvalidSideLength(0.0))]
    #[case::goal_outside(
        5,
        100.0,
        vec![TileCoord::new(5, 0)],
        ArenaError::GoalOutOfBounds(TileCoord::new(5, 0), 5)
    )]
    fn test_arena_invalid(
        #[case] size: usize,
        #[case] size_cm: f64,
        #[case] goals: Vec<TileCoord>,
        #[case] expected: ArenaError,
    ) {
        assert_eq!(Arena::new(size, size_cm, &goals), Err(expected));
    }

    #[rstest]
    #[case::origin(Position::new(0.0, 0.0), Some(TileCoord::new(0, 0)))]
    #[case::inside(Position::new(51.0, 29.0), Some(TileCoord::new(2, 1)))]
    #[case::boundary(Position::new(20.0, 40.0), Some(TileCoord::new(1, 2)))]
    #[case::far_corner(Position::new(99.9, 99.9), Some(TileCoord::new(4, 4)))]
    #[case::outside_right(Position::new(100.0, 10.0), None)]
    #[case::negative(Position::new(-0.1, 10.0), None)]
    fn test_arena_tile_at(#[case] position: Position, #[case] expected: Option<TileCoord>) {
        assert_eq!(arena().tile_at(position).map(Tile::coord), expected);
    }

    #[test]
    fn test_arena_place_moves_occupant() {
        let mut arena = arena();
        let robot = RobotNumber(1);

        arena.place(TileCoord::new(0, 0), robot).unwrap();
        arena.place(TileCoord::new(3, 4), robot).unwrap();

        assert_eq!(arena.tile_for(robot).map(Tile::coord), Some(TileCoord::new(3, 4)));
        assert_eq!(arena.tile(TileCoord::new(0, 0)).unwrap().occupant(), None);
        assert_eq!(
            arena
                .tiles()
                .iter()
                .filter(|t| t.occupant() == Some(robot))
                .count(),
            1
        );
    }

    #[test]
    fn test_arena_place_displaces_other_robot() {
        let mut arena = arena();
        arena.place(TileCoord::new(1, 1), RobotNumber(0)).unwrap();
        arena.place(TileCoord::new(1, 1), RobotNumber(1)).unwrap();

        assert_eq!(arena.tile_for(RobotNumber(0)), None);
        assert_eq!(
            arena.tile_for(RobotNumber(1)).map(Tile::coord),
            Some(TileCoord::new(1, 1))
        );
    }

    #[test]
    fn test_arena_place_out_of_bounds() {
        let mut arena = arena();
        assert_eq!(
            arena.place(TileCoord::new(0, 7), RobotNumber(0)),
            Err(ArenaError::TileOutOfBounds(TileCoord::new(0, 7), 5))
        );
    }

    #[test]
    fn test_arena_vacate() {
        let mut arena = arena();
        arena.place(TileCoord::new(4, 0), RobotNumber(2)).unwrap();
        arena.vacate(TileCoord::new(4, 0));
        assert_eq!(arena.tile_for(RobotNumber(2)), None);
    }
}
